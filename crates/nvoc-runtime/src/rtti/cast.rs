//! Static and dynamic casts across the composition graph
//!
//! A dynamic cast first recovers the most-derived object by subtracting the
//! offset recorded in the addressed level's header, then scans the
//! most-derived class's cast graph for the target and adds its offset. A miss
//! is a normal outcome, not an error.
//!
//! A static cast uses the compile-time offset of a known ancestor field
//! ([`StaticCast`]) and never touches the metadata.

use log::trace;

use super::{ClassId, ClassDef, Dynamic, NvocClass};
use crate::ptr::ObjPtr;

/// Recover the most-derived object from any embedded level.
///
/// Returns `None` for an uninitialised (zeroed) object.
pub fn fully_derive(obj: ObjPtr<Dynamic>) -> Option<ObjPtr<Dynamic>> {
    let rtti = obj.rtti()?;
    // SAFETY: the header was installed by initialisation with the offset of
    // this level inside the most-derived object.
    Some(unsafe { obj.byte_sub(rtti.offset) })
}

/// Class of the most-derived object behind `obj`.
pub fn class_of(obj: ObjPtr<Dynamic>) -> Option<&'static ClassDef> {
    let derived = fully_derive(obj)?;
    derived.rtti().map(|rtti| rtti.class_def)
}

/// Cast to the embedded sub-object of class `target`, if the object has one.
pub fn dynamic_cast_by_id(obj: ObjPtr<Dynamic>, target: ClassId) -> Option<ObjPtr<Dynamic>> {
    let derived = fully_derive(obj)?;
    let leaf = derived.rtti()?;
    match leaf.class_def.cast_info.find(target) {
        Some(relative) => {
            trace!(
                "cast {} -> {} at +{}",
                leaf.class_def.name(),
                relative.class_def.name(),
                relative.offset
            );
            // SAFETY: offsets in the cast graph lie inside the most-derived object.
            Some(unsafe { derived.byte_add(relative.offset) })
        }
        None => {
            trace!("cast {} -> {} missed", leaf.class_def.name(), target);
            None
        }
    }
}

/// Typed dynamic cast.
pub fn dynamic_cast<T: NvocClass, S: NvocClass>(obj: ObjPtr<S>) -> Option<ObjPtr<T>> {
    obj.as_dynamic().dynamic_cast::<T>()
}

impl ObjPtr<Dynamic> {
    /// Typed dynamic cast from an untyped object pointer
    pub fn dynamic_cast<T: NvocClass>(self) -> Option<ObjPtr<T>> {
        dynamic_cast_by_id(self, T::class_def().id()).map(ObjPtr::cast)
    }
}

/// Compile-time knowledge that `A` is embedded in `Self`
///
/// # Safety
///
/// `OFFSET` must be the byte offset of the `A` sub-object reached by
/// `upcast`, and `A` must be listed in `Self`'s cast graph at that offset.
pub unsafe trait StaticCast<A: NvocClass>: NvocClass {
    /// Byte offset of the `A` sub-object
    const OFFSET: usize;

    /// Borrow the ancestor sub-object
    fn upcast(&self) -> &A;

    /// Mutably borrow the ancestor sub-object
    fn upcast_mut(&mut self) -> &mut A;
}

unsafe impl<T: NvocClass> StaticCast<T> for T {
    const OFFSET: usize = 0;

    #[inline]
    fn upcast(&self) -> &T {
        self
    }

    #[inline]
    fn upcast_mut(&mut self) -> &mut T {
        self
    }
}

/// Pointer form of a static cast: shift by the known ancestor offset.
#[inline]
pub fn static_cast<A: NvocClass, S: StaticCast<A>>(obj: ObjPtr<S>) -> ObjPtr<A> {
    // SAFETY: `StaticCast` guarantees the offset lies inside `S`.
    unsafe { obj.byte_add(<S as StaticCast<A>>::OFFSET) }.cast()
}

/// Declare the ancestors embedded in a class, by field path.
///
/// ```ignore
/// impl_static_cast!(KernelBif => EngState: engstate; Object: engstate.object);
/// ```
#[macro_export]
macro_rules! impl_static_cast {
    ($derived:ty => $($ancestor:ty : $($field:ident).+);+ $(;)?) => {
        $(
            unsafe impl $crate::rtti::cast::StaticCast<$ancestor> for $derived {
                const OFFSET: usize = ::core::mem::offset_of!($derived, $($field).+);

                #[inline]
                fn upcast(&self) -> &$ancestor {
                    &self.$($field).+
                }

                #[inline]
                fn upcast_mut(&mut self) -> &mut $ancestor {
                    &mut self.$($field).+
                }
            }
        )+
    };
}
