//! RsResource: a client-visible resource
//!
//! Resources are `Object`s addressed by a client handle. Control calls enter
//! through [`RsResource::control`], which dispatches on the export table of
//! the most-derived class.

use log::debug;

use crate::error::{NvResult, NvocError};
use crate::export::{
    invoke_control, write_param_u32, AccessRights, ExportEntry, ExportFlags, ExportInfo,
};
use crate::hal::HalSpec;
use crate::lifecycle::{create_dynamic, destruct_dynamic, destruct_from_base, Construct};
use crate::ptr::ObjPtr;
use crate::rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Dynamic, Header, Metadata, NvocClass, Rtti};

use super::object::{self, Object, ObjectMeta};

/// Class id of `RsResource`
pub const RESOURCE_CLASS_ID: ClassId = ClassId(0xd551cb);

/// Control that does nothing; used to exercise dispatch
pub const CTRL_CMD_NULL: u32 = 0x0;
/// Control returning the resource handle
pub const CTRL_CMD_GET_HANDLE: u32 = 0x1;

/// Metadata of the `RsResource` level
pub type RsResourceMeta = Metadata<(), ObjectMeta>;

/// RsResource creation arguments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceArgs {
    /// Owning client
    pub client: u32,
    /// Handle of this resource, never 0
    pub handle: u32,
    /// Handle of the parent resource
    pub parent_handle: u32,
}

impl ResourceArgs {
    /// Arguments for `handle` owned by `client`
    pub fn new(client: u32, handle: u32) -> Self {
        Self {
            client,
            handle,
            parent_handle: 0,
        }
    }
}

/// Client-visible resource
#[repr(C)]
pub struct RsResource {
    header: Header<RsResourceMeta>,
    pub(crate) object: Object,
    client: u32,
    handle: u32,
    parent_handle: u32,
    control_count: u64,
}

static EXPORTS: [ExportEntry; 2] = [
    ExportEntry {
        method_id: CTRL_CMD_NULL,
        name: "resCtrlCmdNull",
        access_rights: AccessRights::NONE,
        flags: ExportFlags::NONE,
        param_size: 0,
        func: Some(ctrl_cmd_null),
        owner: &CLASS_DEF.info,
    },
    ExportEntry {
        method_id: CTRL_CMD_GET_HANDLE,
        name: "resCtrlCmdGetHandle",
        access_rights: AccessRights::NONE,
        flags: ExportFlags::NONE,
        param_size: 4,
        func: Some(ctrl_cmd_get_handle),
        owner: &CLASS_DEF.info,
    },
];

static EXPORT_INFO: ExportInfo = ExportInfo { entries: &EXPORTS };

/// Class descriptor of `RsResource`
pub static CLASS_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<RsResource>(RESOURCE_CLASS_ID, "RsResource"),
    create_fn: Some(create_dynamic::<RsResource>),
    cast_info: &CAST_INFO,
    export_info: &EXPORT_INFO,
};

static META: RsResourceMeta = Metadata {
    rtti: Rtti {
        class_def: &CLASS_DEF,
        dtor: Some(destruct_dynamic::<RsResource>),
        offset: 0,
    },
    vtable: (),
    base: Metadata {
        rtti: Rtti {
            class_def: &object::CLASS_DEF,
            dtor: Some(destruct_from_base),
            offset: core::mem::offset_of!(RsResource, object),
        },
        vtable: (),
        base: (),
    },
};

static CAST_INFO: CastInfo = CastInfo {
    relatives: &[&META.rtti, &META.base.rtti],
};

unsafe impl NvocClass for RsResource {
    fn class_def() -> &'static ClassDef {
        &CLASS_DEF
    }
}

crate::impl_static_cast!(RsResource => Object: object);

fn ctrl_cmd_null(_obj: ObjPtr<Dynamic>, _params: &mut [u8]) -> NvResult<()> {
    Ok(())
}

fn ctrl_cmd_get_handle(obj: ObjPtr<Dynamic>, params: &mut [u8]) -> NvResult<()> {
    let resource = obj.cast::<RsResource>();
    write_param_u32(params, 0, resource.handle)
}

impl RsResource {
    /// Install the level's metadata and its base's
    pub fn init_level(&mut self, meta: &'static RsResourceMeta) {
        self.header.set(meta);
        self.object.init_level(&meta.base);
    }

    /// Construct the `Object` base, then this level
    pub fn ctor(&mut self, args: &ResourceArgs) -> NvResult<()> {
        self.object.ctor()?;
        if args.handle == 0 {
            debug!("resource for client {:#x} without a handle", args.client);
            self.object.dtor();
            return Err(NvocError::InvalidArgument);
        }
        self.client = args.client;
        self.handle = args.handle;
        self.parent_handle = args.parent_handle;
        Ok(())
    }

    /// Destruct this level, then the `Object` base
    pub fn dtor(&mut self) {
        debug!(
            "resource {:#x}/{:#x} freed after {} controls",
            self.client, self.handle, self.control_count
        );
        self.object.dtor();
    }

    /// Owning client
    pub fn client(&self) -> u32 {
        self.client
    }

    /// Resource handle
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Parent resource handle
    pub fn parent_handle(&self) -> u32 {
        self.parent_handle
    }

    /// Number of controls dispatched through [`RsResource::control`]
    pub fn control_count(&self) -> u64 {
        self.control_count
    }

    /// Control entry point
    pub fn control(
        mut this: ObjPtr<RsResource>,
        method_id: u32,
        params: &mut [u8],
        granted: AccessRights,
        disabled: ExportFlags,
    ) -> NvResult<()> {
        this.control_count += 1;
        invoke_control(this.as_dynamic(), method_id, params, granted, disabled)
    }
}

impl Construct for RsResource {
    type Args = ResourceArgs;

    fn init(&mut self, _halspec: Option<&HalSpec>) {
        self.init_level(&META);
    }

    fn construct(&mut self, _halspec: Option<&HalSpec>, args: ResourceArgs) -> NvResult<()> {
        self.ctor(&args)
    }

    fn destruct(&mut self) {
        self.dtor();
    }
}
