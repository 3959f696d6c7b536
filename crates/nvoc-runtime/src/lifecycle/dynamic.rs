//! Type-erased creation and destruction entry points
//!
//! Each concrete class records [`create_dynamic::<T>`](create_dynamic) in its
//! [`ClassDef`] so generic call sites can create an object of a class picked
//! at run time. The constructor arguments travel as a boxed [`Any`] and must
//! be exactly the class's `Construct::Args`. The [`Placement`] carries the
//! allocation mode through, so a class picked at run time can still go to a
//! custom allocator or into caller storage.

use std::any::Any;

use log::warn;

use super::{obj_create_in_place, obj_create_with, Construct, CreateFlags, ObjAllocator, SystemAllocator};
use crate::error::{NvResult, NvocError};
use crate::ptr::ObjPtr;
use crate::rtti::cast::fully_derive;
use crate::rtti::{ClassDef, Dynamic, NvocClass};

/// Type-erased constructor arguments
pub type CreateArgs = Box<dyn Any>;

/// Where a dynamically created object lives
pub enum Placement<'a> {
    /// Heap memory from the allocator
    Heap(&'a dyn ObjAllocator),
    /// Caller-provided storage
    InPlace(&'a mut [u8]),
}

/// Type-erased creation entry point stored in a [`ClassDef`]
///
/// # Safety
///
/// For [`Placement::InPlace`] the contract of [`obj_create_in_place`] holds.
pub type DynamicCreateFn = for<'a> unsafe fn(
    Placement<'a>,
    Option<ObjPtr<Dynamic>>,
    CreateFlags,
    CreateArgs,
) -> NvResult<ObjPtr<Dynamic>>;

/// Create a `T` from type-erased arguments.
///
/// # Safety
///
/// For [`Placement::InPlace`] the storage must outlive the object and must
/// not be accessed except through the returned pointer until it is deleted.
pub unsafe fn create_dynamic<T: Construct>(
    placement: Placement<'_>,
    parent: Option<ObjPtr<Dynamic>>,
    flags: CreateFlags,
    args: CreateArgs,
) -> NvResult<ObjPtr<Dynamic>> {
    let args = args.downcast::<T::Args>().map_err(|_| {
        warn!(
            "{}: dynamic create with mismatched arguments",
            T::class_def().name()
        );
        NvocError::InvalidArgument
    })?;
    let obj = match placement {
        Placement::Heap(allocator) => obj_create_with::<T>(allocator, parent, flags, *args)?,
        Placement::InPlace(storage) => obj_create_in_place::<T>(storage, parent, flags, *args)?,
    };
    Ok(obj.as_dynamic())
}

/// Create an object of the class described by `class_def` on the heap.
///
/// Abstract classes have no creation entry point and yield `InvalidClass`.
pub fn obj_create_dynamic(
    class_def: &ClassDef,
    parent: Option<ObjPtr<Dynamic>>,
    flags: CreateFlags,
    args: CreateArgs,
) -> NvResult<ObjPtr<Dynamic>> {
    obj_create_dynamic_with(class_def, &SystemAllocator, parent, flags, args)
}

/// [`obj_create_dynamic`] with an explicit allocator.
pub fn obj_create_dynamic_with(
    class_def: &ClassDef,
    allocator: &dyn ObjAllocator,
    parent: Option<ObjPtr<Dynamic>>,
    flags: CreateFlags,
    args: CreateArgs,
) -> NvResult<ObjPtr<Dynamic>> {
    let create = class_def.create_fn.ok_or(NvocError::InvalidClass)?;
    // SAFETY: heap placement carries no storage contract.
    unsafe { create(Placement::Heap(allocator), parent, flags, args) }
}

/// [`obj_create_dynamic`] into caller-provided storage.
///
/// # Safety
///
/// Same contract as [`obj_create_in_place`].
pub unsafe fn obj_create_dynamic_in_place(
    class_def: &ClassDef,
    storage: &mut [u8],
    parent: Option<ObjPtr<Dynamic>>,
    flags: CreateFlags,
    args: CreateArgs,
) -> NvResult<ObjPtr<Dynamic>> {
    let create = class_def.create_fn.ok_or(NvocError::InvalidClass)?;
    create(Placement::InPlace(storage), parent, flags, args)
}

/// Destructor recorded for the class itself in its cast graph.
///
/// # Safety
///
/// `obj` must point at a live, fully constructed `T`.
pub unsafe fn destruct_dynamic<T: Construct>(obj: ObjPtr<Dynamic>) {
    let mut this = obj.cast::<T>();
    this.destruct();
}

/// Destructor recorded for embedded ancestors: forwards to the most-derived
/// class's own destructor.
///
/// # Safety
///
/// `obj` must point at an ancestor embedded in a live, fully constructed
/// object.
pub unsafe fn destruct_from_base(obj: ObjPtr<Dynamic>) {
    let Some(derived) = fully_derive(obj) else {
        return;
    };
    if let Some(dtor) = derived.rtti().and_then(|rtti| rtti.dtor) {
        dtor(derived);
    }
}
