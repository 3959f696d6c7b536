//! Halspec owner base class
//!
//! Holds the classifier values for an object subtree. The values are stored
//! raw so a zeroed owner is simply "not yet bound"; they are written once
//! during initialisation and never change afterwards.

use log::debug;

use crate::error::{NvResult, NvocError};
use crate::export::ExportInfo;
use crate::hal::{HalSpec, RawHalSpec};
use crate::ptr::ObjPtr;
use crate::rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Dynamic, Header, Metadata, NvocClass, Rtti};

use super::object::Object;

/// Class id of `HalspecOwner`
pub const HALSPEC_OWNER_CLASS_ID: ClassId = ClassId(0x3e6a2c);

/// Metadata of the `HalspecOwner` level
pub type HalspecOwnerMeta = Metadata<()>;

/// Owner of a halspec
#[repr(C)]
pub struct HalspecOwner {
    header: Header<HalspecOwnerMeta>,
    raw: RawHalSpec,
    bound: bool,
}

/// Class descriptor of `HalspecOwner`
pub static CLASS_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<HalspecOwner>(HALSPEC_OWNER_CLASS_ID, "HalspecOwner"),
    create_fn: None,
    cast_info: &CAST_INFO,
    export_info: &ExportInfo::EMPTY,
};

static RTTI: Rtti = Rtti {
    class_def: &CLASS_DEF,
    dtor: None,
    offset: 0,
};

static CAST_INFO: CastInfo = CastInfo {
    relatives: &[&RTTI],
};

unsafe impl NvocClass for HalspecOwner {
    fn class_def() -> &'static ClassDef {
        &CLASS_DEF
    }
}

impl HalspecOwner {
    /// Install the level's metadata and record the halspec
    pub fn init_level(&mut self, meta: &'static HalspecOwnerMeta, halspec: &HalSpec) {
        self.header.set(meta);
        debug_assert!(!self.bound, "halspec bound twice");
        self.raw = halspec.to_raw();
        self.bound = true;
    }

    /// Fails unless initialisation recorded a halspec
    pub fn ctor(&mut self) -> NvResult<()> {
        if self.bound {
            Ok(())
        } else {
            Err(NvocError::InvalidState)
        }
    }

    /// Nothing to release
    pub fn dtor(&mut self) {}

    /// The owned halspec, `None` before initialisation
    pub fn halspec(&self) -> Option<HalSpec> {
        if !self.bound {
            return None;
        }
        HalSpec::from_raw(self.raw).ok()
    }

    /// Raw classifier values
    pub fn raw(&self) -> RawHalSpec {
        self.raw
    }

    /// Find the halspec a child of `parent` inherits: the parent's own if it
    /// is an owner, otherwise the nearest owning ancestor's.
    pub fn locate(parent: Option<ObjPtr<Dynamic>>) -> NvResult<HalSpec> {
        let parent = parent.ok_or_else(|| {
            debug!("halspec lookup without a parent");
            NvocError::InvalidArgument
        })?;
        let owner = match parent.dynamic_cast::<HalspecOwner>() {
            Some(owner) => owner,
            None => parent
                .dynamic_cast::<Object>()
                .and_then(|object| object.find_ancestor::<HalspecOwner>())
                .ok_or_else(|| {
                    debug!("no halspec owner above {}", parent);
                    NvocError::InvalidArgument
                })?,
        };
        owner.halspec().ok_or(NvocError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::gpu::{Gpu, GpuArgs};
    use crate::hal::{Chip, DispIpVersion, RmVariant};
    use crate::lifecycle::{obj_create, obj_delete, CreateFlags};

    #[test]
    fn test_locate_through_ancestors() {
        let spec = HalSpec::new(Chip::GH100, RmVariant::PfKernelOnly, DispIpVersion::None);
        let gpu = obj_create::<Gpu>(None, CreateFlags::NONE, GpuArgs::new(spec, 0)).unwrap();
        let plain = obj_create::<Object>(Some(gpu.as_dynamic()), CreateFlags::NONE, ()).unwrap();

        assert_eq!(HalspecOwner::locate(Some(gpu.as_dynamic())).unwrap(), spec);
        assert_eq!(HalspecOwner::locate(Some(plain.as_dynamic())).unwrap(), spec);

        unsafe {
            obj_delete(plain).unwrap();
            obj_delete(gpu).unwrap();
        }
    }

    #[test]
    fn test_locate_without_owner() {
        assert_eq!(
            HalspecOwner::locate(None).unwrap_err(),
            NvocError::InvalidArgument
        );

        let root = obj_create::<Object>(None, CreateFlags::NONE, ()).unwrap();
        assert_eq!(
            HalspecOwner::locate(Some(root.as_dynamic())).unwrap_err(),
            NvocError::InvalidArgument
        );
        unsafe { obj_delete(root).unwrap() };
    }

    #[test]
    fn test_unbound_owner() {
        // SAFETY: HalspecOwner is valid when zeroed.
        let owner: HalspecOwner = unsafe { std::mem::zeroed() };
        assert!(owner.halspec().is_none());
    }
}
