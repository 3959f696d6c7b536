//! Built-in class hierarchy
//!
//! ```text
//! Object ─┬─ OBJGPU (+ HalspecOwner)
//!         ├─ OBJENGSTATE ── KernelBif
//!         └─ RsResource ── Device (+ Notifier)
//! ```

pub mod device;
pub mod engstate;
pub mod gpu;
pub mod halspec_owner;
pub mod kernel_bif;
pub mod notifier;
pub mod object;
pub mod resource;

use crate::rtti::ClassDef;

static BUILTIN: [&ClassDef; 8] = [
    &object::CLASS_DEF,
    &notifier::CLASS_DEF,
    &halspec_owner::CLASS_DEF,
    &gpu::CLASS_DEF,
    &engstate::CLASS_DEF,
    &kernel_bif::CLASS_DEF,
    &resource::CLASS_DEF,
    &device::CLASS_DEF,
];

/// Every built-in class, bases before the classes deriving from them
pub fn builtin_classes() -> &'static [&'static ClassDef] {
    &BUILTIN
}
