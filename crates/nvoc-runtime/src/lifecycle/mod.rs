//! Object creation and deletion
//!
//! Creation runs in fixed phases:
//!
//! 1. Validate the request: resolve the halspec the class binds to and the
//!    parent object it links under. Nothing is allocated before this succeeds.
//! 2. Allocate zeroed memory, or zero the caller's storage in place.
//! 3. Record the create flags and link the new object under its parent.
//! 4. Initialise every level (headers and HAL slots, ancestors first).
//! 5. Construct, root ancestor first. A failing level unwinds every level
//!    already built, in reverse.
//!
//! When construction fails the object is unlinked and its memory released
//! (heap) or zeroed (in place). The caller never observes the object.
//!
//! Deletion orphans any children still attached, unlinks the object from its
//! parent, runs the destructor recorded in the cast graph (leaf first, then
//! ancestors in reverse construction order) and releases the memory. In-place
//! objects are zeroed instead, leaving the storage inert.

pub mod alloc;
pub mod dynamic;

pub use alloc::{ObjAllocator, SystemAllocator};
pub use dynamic::{
    create_dynamic, destruct_dynamic, destruct_from_base, obj_create_dynamic,
    obj_create_dynamic_in_place, obj_create_dynamic_with, CreateArgs, DynamicCreateFn, Placement,
};

use std::alloc::Layout;
use std::fmt;
use std::ops::BitOr;
use std::ptr::NonNull;

use log::{debug, warn};

use crate::classes::object::Object;
use crate::error::{NvResult, NvocError};
use crate::hal::HalSpec;
use crate::ptr::ObjPtr;
use crate::rtti::cast::{fully_derive, static_cast, StaticCast};
use crate::rtti::{Dynamic, NvocClass};

/// Flags accepted by object creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CreateFlags(u32);

impl CreateFlags {
    /// No special handling
    pub const NONE: Self = Self(0x0);
    /// Use the parent only to locate the halspec; do not link into the tree
    pub const PARENT_HALSPEC_ONLY: Self = Self(0x1);
    /// Caller-owned storage; cleanup never reaches the allocator
    pub const IN_PLACE_CONSTRUCT: Self = Self(0x2);

    /// Create from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Get raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if all bits of `other` are set
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of flags
    pub const fn union(&self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for CreateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for CreateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::PARENT_HALSPEC_ONLY) {
            names.push("PARENT_HALSPEC_ONLY");
        }
        if self.contains(Self::IN_PLACE_CONSTRUCT) {
            names.push("IN_PLACE_CONSTRUCT");
        }
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// A concrete, creatable class
///
/// `init` wires every level (headers, vtables, HAL slots) and cannot fail.
/// `construct` runs the ancestor constructors in declaration order and then
/// the class's own; on failure it must destruct the levels it already built
/// before returning. `destruct` runs the class's own destructor and then the
/// ancestors' in strict reverse order.
pub trait Construct: NvocClass + StaticCast<Object> {
    /// Constructor arguments
    type Args: 'static;

    /// Resolve the halspec this object binds to, before anything is allocated
    fn bind_halspec(
        parent: Option<ObjPtr<Dynamic>>,
        args: &Self::Args,
    ) -> NvResult<Option<HalSpec>> {
        let _ = (parent, args);
        Ok(None)
    }

    /// Initialise every level of a zeroed object
    fn init(&mut self, halspec: Option<&HalSpec>);

    /// Construct every level, unwinding on failure
    fn construct(&mut self, halspec: Option<&HalSpec>, args: Self::Args) -> NvResult<()>;

    /// Destruct every level, leaf first
    fn destruct(&mut self);
}

/// Create an object on the heap with the system allocator.
pub fn obj_create<T: Construct>(
    parent: Option<ObjPtr<Dynamic>>,
    flags: CreateFlags,
    args: T::Args,
) -> NvResult<ObjPtr<T>> {
    obj_create_with::<T>(&SystemAllocator, parent, flags, args)
}

/// Create an object on the heap with an explicit allocator.
///
/// `IN_PLACE_CONSTRUCT` is rejected here; use [`obj_create_in_place`].
pub fn obj_create_with<T: Construct>(
    allocator: &dyn ObjAllocator,
    parent: Option<ObjPtr<Dynamic>>,
    flags: CreateFlags,
    args: T::Args,
) -> NvResult<ObjPtr<T>> {
    if flags.contains(CreateFlags::IN_PLACE_CONSTRUCT) {
        return Err(NvocError::InvalidArgument);
    }

    let halspec = T::bind_halspec(parent, &args)?;
    let parent = link_target(parent)?;

    let layout = Layout::new::<T>();
    let raw = allocator.alloc_zeroed(layout).ok_or(NvocError::NoMemory)?;
    // SAFETY: fresh, zeroed memory sized and aligned for `T`.
    let obj = unsafe { ObjPtr::new(raw.cast::<T>()) };

    // SAFETY: `obj` is zeroed storage for `T` owned by this call.
    match unsafe { bring_up(obj, parent, flags, halspec, args) } {
        Ok(()) => Ok(obj),
        Err(err) => {
            // SAFETY: allocated above with the same layout, never handed out.
            unsafe { allocator.free(raw, layout) };
            Err(err)
        }
    }
}

/// Create an object in caller-provided storage.
///
/// The storage must be at least `size_of::<T>()` bytes and aligned for `T`,
/// otherwise `InvalidArgument` is returned and the storage is left untouched.
/// On failure the storage is zeroed.
///
/// # Safety
///
/// The storage must outlive the object and must not be accessed except
/// through the returned pointer until the object is deleted.
pub unsafe fn obj_create_in_place<T: Construct>(
    storage: &mut [u8],
    parent: Option<ObjPtr<Dynamic>>,
    flags: CreateFlags,
    args: T::Args,
) -> NvResult<ObjPtr<T>> {
    let size = std::mem::size_of::<T>();
    if storage.len() < size || storage.as_ptr() as usize % std::mem::align_of::<T>() != 0 {
        warn!(
            "{}: in-place storage of {} bytes at {:p} unusable",
            T::class_def().name(),
            storage.len(),
            storage.as_ptr()
        );
        return Err(NvocError::InvalidArgument);
    }

    let halspec = T::bind_halspec(parent, &args)?;
    let parent = link_target(parent)?;

    let bytes = &mut storage[..size];
    bytes.fill(0);
    let obj = ObjPtr::new(NonNull::from(bytes).cast::<T>());

    let flags = flags | CreateFlags::IN_PLACE_CONSTRUCT;
    match bring_up(obj, parent, flags, halspec, args) {
        Ok(()) => Ok(obj),
        Err(err) => {
            std::ptr::write_bytes(obj.as_ptr().cast::<u8>(), 0, size);
            Err(err)
        }
    }
}

/// Delete an object created with the system allocator.
///
/// # Safety
///
/// `obj` must address a live object (or one of its ancestors) created by this
/// module and not yet deleted. No pointer into the object may be used
/// afterwards.
pub unsafe fn obj_delete<T: NvocClass>(obj: ObjPtr<T>) -> NvResult<()> {
    obj_delete_with(&SystemAllocator, obj)
}

/// Delete an object, returning heap memory to `allocator`.
///
/// Deleting a zeroed (inert) object fails with `InvalidState`.
///
/// # Safety
///
/// As for [`obj_delete`]; heap objects must have come from `allocator`.
pub unsafe fn obj_delete_with<T: NvocClass>(
    allocator: &dyn ObjAllocator,
    obj: ObjPtr<T>,
) -> NvResult<()> {
    obj_delete_dynamic_with(allocator, obj.as_dynamic())
}

/// Delete an object through an untyped pointer, such as one returned by
/// [`obj_create_dynamic`].
///
/// # Safety
///
/// As for [`obj_delete_with`].
pub unsafe fn obj_delete_dynamic_with(
    allocator: &dyn ObjAllocator,
    obj: ObjPtr<Dynamic>,
) -> NvResult<()> {
    let derived = fully_derive(obj).ok_or(NvocError::InvalidState)?;
    let leaf = derived.rtti().ok_or(NvocError::InvalidState)?;
    let class_def = leaf.class_def;
    let dtor = leaf.dtor.ok_or(NvocError::InvalidState)?;
    let object = derived.dynamic_cast::<Object>().ok_or(NvocError::InvalidState)?;
    let flags = object.create_flags();

    Object::orphan_children(object);
    if let Some(parent) = object.parent() {
        Object::remove_child(parent, object);
    }

    dtor(derived);
    debug!("deleted {} at {}", class_def.name(), derived);

    let size = class_def.info.size;
    if flags.contains(CreateFlags::IN_PLACE_CONSTRUCT) {
        std::ptr::write_bytes(derived.as_ptr().cast::<u8>(), 0, size);
    } else {
        let layout = Layout::from_size_align(size, class_def.info.align)
            .map_err(|_| NvocError::InvalidState)?;
        allocator.free(derived.as_non_null().cast::<u8>(), layout);
    }
    Ok(())
}

/// The object a new child links under, if any
fn link_target(parent: Option<ObjPtr<Dynamic>>) -> NvResult<Option<ObjPtr<Object>>> {
    parent
        .map(|parent| parent.dynamic_cast::<Object>().ok_or(NvocError::InvalidObjectParent))
        .transpose()
}

/// Link, initialise and construct a zeroed object.
///
/// On failure the object is unlinked again; releasing the memory is left to
/// the caller.
unsafe fn bring_up<T: Construct>(
    obj: ObjPtr<T>,
    parent: Option<ObjPtr<Object>>,
    flags: CreateFlags,
    halspec: Option<HalSpec>,
    args: T::Args,
) -> NvResult<()> {
    let mut object = static_cast::<Object, T>(obj);
    object.set_create_flags(flags);

    let linked = match parent {
        Some(parent) if !flags.contains(CreateFlags::PARENT_HALSPEC_ONLY) => {
            Object::add_child(parent, object);
            Some(parent)
        }
        _ => None,
    };

    let result = {
        let this = &mut *obj.as_ptr();
        this.init(halspec.as_ref());
        this.construct(halspec.as_ref(), args)
    };

    match result {
        Ok(()) => {
            debug!(
                "created {} at {} (flags {})",
                T::class_def().name(),
                obj,
                flags
            );
            Ok(())
        }
        Err(err) => {
            warn!(
                "construction of {} failed: {} ({})",
                T::class_def().name(),
                err,
                err.symbol()
            );
            if let Some(parent) = linked {
                Object::remove_child(parent, object);
            }
            Err(err)
        }
    }
}
