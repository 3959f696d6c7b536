//! NVOC object runtime
//!
//! A composition-based object system for the GPU resource manager:
//! - Class identity and run-time type information with static and dynamic casts
//! - Rollback-safe object creation and ordered destruction, on the heap or in place
//! - Per-object HAL binding from a chip / runtime-variant / display-IP halspec
//! - Offset thunks bridging virtual methods across composition levels
//! - Per-class export tables consulted by the control dispatcher
//!
//! # Object layout
//!
//! Every class is a `#[repr(C)]` struct whose first field is a [`Header`]
//! pointing at the class metadata for that level. Ancestor classes are
//! embedded by value, each carrying its own header:
//!
//! ```text
//! KernelBif
//! ┌────────────────────────────┐ ← offset 0   header → KernelBif rtti
//! │ header                     │
//! ├────────────────────────────┤ ← offset 8   header → OBJENGSTATE rtti (offset 8)
//! │ OBJENGSTATE                │
//! │ ┌────────────────────────┐ │ ← offset 16  header → Object rtti (offset 16)
//! │ │ Object                 │ │
//! │ └────────────────────────┘ │
//! ├────────────────────────────┤
//! │ HAL slots, fields          │
//! └────────────────────────────┘
//! ```
//!
//! Any embedded header is enough to recover the most-derived object and,
//! through its cast graph, any other ancestor.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod classes;
pub mod config;
pub mod error;
pub mod export;
pub mod hal;
pub mod lifecycle;
pub mod ptr;
pub mod rtti;
pub mod thunk;

pub use classes::device::Device;
pub use classes::engstate::EngState;
pub use classes::gpu::Gpu;
pub use classes::halspec_owner::HalspecOwner;
pub use classes::kernel_bif::KernelBif;
pub use classes::notifier::Notifier;
pub use classes::object::Object;
pub use classes::resource::RsResource;
pub use config::{ConfigError, RuntimeConfig};
pub use error::{NvResult, NvocError, NV_OK};
pub use export::{
    invoke_control, lookup_export, merged_exports, read_param_u32, validate_export_table,
    write_param_u32, AccessRights, ControlFn, ExportEntry, ExportFlags, ExportInfo, ExportIssue,
};
pub use hal::{
    Chip, ChipFamily, DispIpVersion, HalImpl, HalSlot, HalSpec, PdbProperty, PropertySet,
    RawHalSpec, RmVariant, SlotBinding,
};
pub use lifecycle::{
    obj_create, obj_create_dynamic, obj_create_dynamic_in_place, obj_create_dynamic_with,
    obj_create_in_place, obj_create_with, obj_delete, obj_delete_dynamic_with, obj_delete_with,
    Construct, CreateArgs, CreateFlags, ObjAllocator, Placement, SystemAllocator,
};
pub use ptr::ObjPtr;
pub use rtti::cast::{dynamic_cast, dynamic_cast_by_id, fully_derive, static_cast, StaticCast};
pub use rtti::registry::ClassRegistry;
pub use rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Dynamic, Header, Metadata, NvocClass, Rtti};
