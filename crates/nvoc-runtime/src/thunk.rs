//! Offset thunks
//!
//! A virtual method declared at one level of a class may be implemented at
//! another. The vtable slot always receives a pointer typed as the declaring
//! level, so the entry installed there is a thunk that shifts the pointer by
//! the ancestor's static offset and forwards the call unchanged:
//!
//! - a *down* thunk takes a base pointer and calls the derived implementation
//!   (`KernelBif` overriding an `OBJENGSTATE` hook)
//! - an *up* thunk takes a derived pointer and calls the base implementation
//!   (`KernelBif` inheriting an `OBJENGSTATE` hook in its own vtable)
//!
//! ```ignore
//! down_thunk! {
//!     fn engstate_state_load(EngState => KernelBif, flags: u32) -> NvResult<()> = kbif_state_load;
//! }
//! up_thunk! {
//!     fn kbif_is_present(KernelBif => EngState) -> bool = engstate_is_present;
//! }
//! ```

use crate::ptr::ObjPtr;
use crate::rtti::cast::{static_cast, StaticCast};
use crate::rtti::NvocClass;

/// Recover the derived object from a pointer to its embedded `B`.
///
/// # Safety
///
/// `obj` must point at the `B` embedded in a live `D`.
#[inline]
pub unsafe fn down<B: NvocClass, D: StaticCast<B>>(obj: ObjPtr<B>) -> ObjPtr<D> {
    obj.cast::<D>().byte_sub(<D as StaticCast<B>>::OFFSET)
}

/// Move from a derived object to its embedded `B`.
#[inline]
pub fn up<D: StaticCast<B>, B: NvocClass>(obj: ObjPtr<D>) -> ObjPtr<B> {
    static_cast::<B, D>(obj)
}

/// Define thunks from a base-typed vtable slot to a derived implementation.
#[macro_export]
macro_rules! down_thunk {
    ($(
        $(#[$meta:meta])*
        $vis:vis fn $name:ident($base:ty => $derived:ty $(, $arg:ident : $argty:ty)*)
            $(-> $ret:ty)? = $imp:path;
    )+) => {
        $(
            $(#[$meta])*
            $vis fn $name(this: $crate::ptr::ObjPtr<$base> $(, $arg: $argty)*) $(-> $ret)? {
                // SAFETY: only installed in the metadata of classes that embed
                // the base level in the derived one.
                let derived = unsafe { $crate::thunk::down::<$base, $derived>(this) };
                $imp(derived $(, $arg)*)
            }
        )+
    };
}

/// Define thunks from a derived-typed vtable slot to a base implementation.
#[macro_export]
macro_rules! up_thunk {
    ($(
        $(#[$meta:meta])*
        $vis:vis fn $name:ident($derived:ty => $base:ty $(, $arg:ident : $argty:ty)*)
            $(-> $ret:ty)? = $imp:path;
    )+) => {
        $(
            $(#[$meta])*
            $vis fn $name(this: $crate::ptr::ObjPtr<$derived> $(, $arg: $argty)*) $(-> $ret)? {
                $imp($crate::thunk::up::<$derived, $base>(this) $(, $arg)*)
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::engstate::EngState;
    use crate::classes::gpu::{Gpu, GpuArgs};
    use crate::classes::kernel_bif::KernelBif;
    use crate::classes::object::Object;
    use crate::hal::{Chip, DispIpVersion, HalSpec, RmVariant};
    use crate::lifecycle::{obj_create, obj_delete, CreateFlags};

    fn leaf_addr(this: ObjPtr<KernelBif>, extra: usize) -> usize {
        this.addr() + extra
    }

    fn object_addr(this: ObjPtr<Object>) -> usize {
        this.addr()
    }

    down_thunk! {
        fn engstate_to_leaf(EngState => KernelBif, extra: usize) -> usize = leaf_addr;
    }

    up_thunk! {
        fn leaf_to_object(KernelBif => Object) -> usize = object_addr;
    }

    #[test]
    fn test_thunks_shift_by_static_offset() {
        let spec = HalSpec::new(Chip::GA102, RmVariant::PfKernelOnly, DispIpVersion::V04_01);
        let gpu = obj_create::<Gpu>(None, CreateFlags::NONE, GpuArgs::new(spec, 0)).unwrap();
        let bif = obj_create::<KernelBif>(Some(gpu.as_dynamic()), CreateFlags::NONE, ()).unwrap();

        let engstate = up::<KernelBif, EngState>(bif);
        assert_eq!(engstate_to_leaf(engstate, 3), bif.addr() + 3);
        assert_eq!(
            leaf_to_object(bif),
            bif.addr() + <KernelBif as StaticCast<Object>>::OFFSET
        );
        assert_eq!(unsafe { down::<EngState, KernelBif>(engstate) }, bif);

        unsafe {
            obj_delete(bif).unwrap();
            obj_delete(gpu).unwrap();
        }
    }
}
