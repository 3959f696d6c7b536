//! Device: the client's handle on a GPU
//!
//! Composes `RsResource` and `Notifier`. A device is created under an object
//! that leads to a halspec owner, and two of its exported controls are HAL
//! methods bound from that halspec.
#![deny(unreachable_patterns)]

use log::debug;

use crate::error::{NvResult, NvocError};
use crate::export::{
    read_param_u32, write_param_u32, AccessRights, ExportEntry, ExportFlags, ExportInfo,
};
use crate::hal::{HalImpl, HalSlot, HalSpec, RmVariant, SlotBinding};
use crate::lifecycle::{create_dynamic, destruct_dynamic, destruct_from_base, Construct};
use crate::ptr::ObjPtr;
use crate::rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Dynamic, Header, Metadata, NvocClass, Rtti};

use super::gpu::{GPU_CLASS_ID, MAX_GPU_INSTANCES};
use super::halspec_owner::HalspecOwner;
use super::kernel_bif::KERNEL_BIF_CLASS_ID;
use super::notifier::{self, Notifier, NotifierMeta};
use super::object::{self, Object};
use super::resource::{self, ResourceArgs, RsResource, RsResourceMeta};

/// Class id of `Device`
pub const DEVICE_CLASS_ID: ClassId = ClassId(0xe0ac20);

/// Control ids exported by `Device`
pub mod ctrl {
    /// Set the ASPM feature mask
    pub const BIF_SET_ASPM_FEATURE: u32 = 0x800104;
    /// List the classes allocatable under the device
    pub const GPU_GET_CLASSLIST: u32 = 0x800201;
    /// Number of subdevices
    pub const GPU_GET_NUM_SUBDEVICES: u32 = 0x800280;
    /// Virtualization mode of the device
    pub const GPU_GET_VIRTUALIZATION_MODE: u32 = 0x800289;
    /// Engine context buffer properties
    pub const FIFO_GET_ENGINE_CONTEXT_PROPERTIES: u32 = 0x801707;
    /// Flush pending DMA
    pub const DMA_FLUSH: u32 = 0x801805;
    /// Lift the CUDA limit
    pub const INTERNAL_PERF_CUDA_LIMIT_DISABLE: u32 = 0x802004;
}

/// Virtualization modes reported by the device
pub mod virtualization_mode {
    /// Bare metal
    pub const NONE: u32 = 0;
    /// SR-IOV virtual function
    pub const VF: u32 = 2;
}

/// Engine context buffer alignment reported to VF clients
pub const ENGINE_CONTEXT_ALIGNMENT: u32 = 0x1000;

/// Metadata of the `Device` level
pub type DeviceMeta = Metadata<(), (RsResourceMeta, NotifierMeta)>;

type EngineContextPropertiesFn = fn(&mut Device, &mut [u8]) -> NvResult<()>;
type DmaFlushFn = fn(&mut Device, &mut [u8]) -> NvResult<()>;

/// Device creation arguments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceArgs {
    /// Resource identity
    pub resource: ResourceArgs,
    /// Device instance
    pub device_inst: u32,
}

impl DeviceArgs {
    /// Arguments for device `device_inst` at `handle`
    pub fn new(client: u32, handle: u32, device_inst: u32) -> Self {
        Self {
            resource: ResourceArgs::new(client, handle),
            device_inst,
        }
    }
}

/// Device resource
#[repr(C)]
pub struct Device {
    header: Header<DeviceMeta>,
    resource: RsResource,
    notifier: Notifier,
    device_inst: u32,
    virtualization_mode: u32,
    aspm_feature: u32,
    dma_flush_count: u64,
    cuda_limit_disabled: bool,
    fifo_get_engine_context_properties: HalSlot<EngineContextPropertiesFn>,
    dma_flush: HalSlot<DmaFlushFn>,
}

macro_rules! export {
    ($method_id:expr, $name:literal, $flags:literal, $param_size:literal, $func:path $(,)?) => {
        ExportEntry {
            method_id: $method_id,
            name: $name,
            access_rights: AccessRights::NONE,
            flags: ExportFlags::from_bits($flags),
            param_size: $param_size,
            func: Some($func),
            owner: &CLASS_DEF.info,
        }
    };
}

static EXPORTS: [ExportEntry; 7] = [
    export!(
        ctrl::BIF_SET_ASPM_FEATURE,
        "deviceCtrlCmdBifSetAspmFeature",
        0x40,
        4,
        ctrl_bif_set_aspm_feature,
    ),
    export!(
        ctrl::GPU_GET_CLASSLIST,
        "deviceCtrlCmdGpuGetClasslist",
        0x10b,
        16,
        ctrl_gpu_get_classlist,
    ),
    export!(
        ctrl::GPU_GET_NUM_SUBDEVICES,
        "deviceCtrlCmdGpuGetNumSubdevices",
        0x509,
        4,
        ctrl_gpu_get_num_subdevices,
    ),
    export!(
        ctrl::GPU_GET_VIRTUALIZATION_MODE,
        "deviceCtrlCmdGpuGetVirtualizationMode",
        0x109,
        4,
        ctrl_gpu_get_virtualization_mode,
    ),
    export!(
        ctrl::FIFO_GET_ENGINE_CONTEXT_PROPERTIES,
        "deviceCtrlCmdFifoGetEngineContextProperties",
        0x40148,
        8,
        ctrl_fifo_get_engine_context_properties,
    ),
    export!(
        ctrl::DMA_FLUSH,
        "deviceCtrlCmdDmaFlush",
        0x40048,
        4,
        ctrl_dma_flush,
    ),
    export!(
        ctrl::INTERNAL_PERF_CUDA_LIMIT_DISABLE,
        "deviceCtrlCmdInternalPerfCudaLimitDisable",
        0xc0,
        0,
        ctrl_internal_perf_cuda_limit_disable,
    ),
];

static EXPORT_INFO: ExportInfo = ExportInfo { entries: &EXPORTS };

/// Class descriptor of `Device`
pub static CLASS_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<Device>(DEVICE_CLASS_ID, "Device"),
    create_fn: Some(create_dynamic::<Device>),
    cast_info: &CAST_INFO,
    export_info: &EXPORT_INFO,
};

static META: DeviceMeta = Metadata {
    rtti: Rtti {
        class_def: &CLASS_DEF,
        dtor: Some(destruct_dynamic::<Device>),
        offset: 0,
    },
    vtable: (),
    base: (
        Metadata {
            rtti: Rtti {
                class_def: &resource::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: core::mem::offset_of!(Device, resource),
            },
            vtable: (),
            base: Metadata {
                rtti: Rtti {
                    class_def: &object::CLASS_DEF,
                    dtor: Some(destruct_from_base),
                    offset: core::mem::offset_of!(Device, resource.object),
                },
                vtable: (),
                base: (),
            },
        },
        Metadata {
            rtti: Rtti {
                class_def: &notifier::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: core::mem::offset_of!(Device, notifier),
            },
            vtable: (),
            base: (),
        },
    ),
};

static CAST_INFO: CastInfo = CastInfo {
    relatives: &[
        &META.rtti,
        &META.base.0.rtti,
        &META.base.0.base.rtti,
        &META.base.1.rtti,
    ],
};

unsafe impl NvocClass for Device {
    fn class_def() -> &'static ClassDef {
        &CLASS_DEF
    }
}

crate::impl_static_cast!(
    Device => RsResource: resource; Object: resource.object; Notifier: notifier
);

// exported controls

fn ctrl_bif_set_aspm_feature(obj: ObjPtr<Dynamic>, params: &mut [u8]) -> NvResult<()> {
    let mut device = obj.cast::<Device>();
    device.aspm_feature = read_param_u32(params, 0)?;
    Ok(())
}

fn ctrl_gpu_get_classlist(_obj: ObjPtr<Dynamic>, params: &mut [u8]) -> NvResult<()> {
    let classes = [GPU_CLASS_ID, KERNEL_BIF_CLASS_ID, DEVICE_CLASS_ID];
    write_param_u32(params, 0, classes.len() as u32)?;
    for (idx, class_id) in classes.iter().enumerate() {
        write_param_u32(params, 4 * (idx + 1), class_id.0)?;
    }
    Ok(())
}

fn ctrl_gpu_get_num_subdevices(_obj: ObjPtr<Dynamic>, params: &mut [u8]) -> NvResult<()> {
    write_param_u32(params, 0, 1)
}

fn ctrl_gpu_get_virtualization_mode(obj: ObjPtr<Dynamic>, params: &mut [u8]) -> NvResult<()> {
    let device = obj.cast::<Device>();
    write_param_u32(params, 0, device.virtualization_mode)
}

fn ctrl_fifo_get_engine_context_properties(
    obj: ObjPtr<Dynamic>,
    params: &mut [u8],
) -> NvResult<()> {
    let mut device = obj.cast::<Device>();
    let func = device.fifo_get_engine_context_properties.get()?;
    func(&mut *device, params)
}

fn ctrl_dma_flush(obj: ObjPtr<Dynamic>, params: &mut [u8]) -> NvResult<()> {
    let mut device = obj.cast::<Device>();
    let func = device.dma_flush.get()?;
    func(&mut *device, params)
}

fn ctrl_internal_perf_cuda_limit_disable(obj: ObjPtr<Dynamic>, _params: &mut [u8]) -> NvResult<()> {
    let mut device = obj.cast::<Device>();
    device.cuda_limit_disabled = true;
    Ok(())
}

// fifo_get_engine_context_properties

fn fifo_get_engine_context_properties_vf(_device: &mut Device, params: &mut [u8]) -> NvResult<()> {
    let engine = read_param_u32(params, 0)?;
    debug!("engine {} context properties from host", engine);
    write_param_u32(params, 4, ENGINE_CONTEXT_ALIGNMENT)
}

fn ctrl_not_supported(_device: &mut Device, _params: &mut [u8]) -> NvResult<()> {
    Err(NvocError::NotSupported)
}

static ENGINE_CONTEXT_PROPERTIES_VF: HalImpl<EngineContextPropertiesFn> =
    HalImpl::new("VF", fifo_get_engine_context_properties_vf);
static ENGINE_CONTEXT_PROPERTIES_STUB: HalImpl<EngineContextPropertiesFn> =
    HalImpl::new("92bfc3", ctrl_not_supported);

fn resolve_fifo_get_engine_context_properties(
    spec: &HalSpec,
) -> &'static HalImpl<EngineContextPropertiesFn> {
    match spec.rm_variant {
        RmVariant::Vf => &ENGINE_CONTEXT_PROPERTIES_VF,
        RmVariant::PfKernelOnly => &ENGINE_CONTEXT_PROPERTIES_STUB,
    }
}

// dma_flush

fn dma_flush_vf(device: &mut Device, params: &mut [u8]) -> NvResult<()> {
    let targets = read_param_u32(params, 0)?;
    if targets != 0 {
        device.dma_flush_count += 1;
    }
    Ok(())
}

static DMA_FLUSH_VF: HalImpl<DmaFlushFn> = HalImpl::new("VF", dma_flush_vf);
static DMA_FLUSH_STUB: HalImpl<DmaFlushFn> = HalImpl::new("5baef9", ctrl_not_supported);

fn resolve_dma_flush(spec: &HalSpec) -> &'static HalImpl<DmaFlushFn> {
    match spec.rm_variant {
        RmVariant::Vf => &DMA_FLUSH_VF,
        RmVariant::PfKernelOnly => &DMA_FLUSH_STUB,
    }
}

impl Device {
    /// Device instance
    pub fn device_inst(&self) -> u32 {
        self.device_inst
    }

    /// The `RsResource` sub-object
    pub fn resource(&self) -> &RsResource {
        &self.resource
    }

    /// The `Notifier` sub-object
    pub fn notifier(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    /// Last ASPM feature mask set by control
    pub fn aspm_feature(&self) -> u32 {
        self.aspm_feature
    }

    /// DMA flushes performed
    pub fn dma_flush_count(&self) -> u64 {
        self.dma_flush_count
    }

    /// True once the CUDA limit was lifted
    pub fn cuda_limit_disabled(&self) -> bool {
        self.cuda_limit_disabled
    }

    /// Bound implementation of every HAL method
    pub fn hal_bindings(&self) -> Vec<SlotBinding> {
        vec![
            SlotBinding::of(
                "ctrlCmdFifoGetEngineContextProperties",
                &self.fifo_get_engine_context_properties,
            ),
            SlotBinding::of("ctrlCmdDmaFlush", &self.dma_flush),
        ]
    }

    fn bind_hal(&mut self, spec: &HalSpec) {
        self.fifo_get_engine_context_properties
            .bind(resolve_fifo_get_engine_context_properties(spec));
        self.dma_flush.bind(resolve_dma_flush(spec));
    }

    fn ctor(&mut self, spec: &HalSpec, args: &DeviceArgs) -> NvResult<()> {
        if args.device_inst >= MAX_GPU_INSTANCES {
            debug!("device instance {} out of range", args.device_inst);
            return Err(NvocError::InvalidArgument);
        }
        self.device_inst = args.device_inst;
        self.virtualization_mode = match spec.rm_variant {
            RmVariant::Vf => virtualization_mode::VF,
            RmVariant::PfKernelOnly => virtualization_mode::NONE,
        };
        Ok(())
    }

    fn dtor(&mut self) {
        debug!("device {} torn down", self.device_inst);
    }
}

impl Construct for Device {
    type Args = DeviceArgs;

    fn bind_halspec(
        parent: Option<ObjPtr<Dynamic>>,
        _args: &DeviceArgs,
    ) -> NvResult<Option<HalSpec>> {
        HalspecOwner::locate(parent).map(Some)
    }

    fn init(&mut self, halspec: Option<&HalSpec>) {
        self.header.set(&META);
        self.resource.init_level(&META.base.0);
        self.notifier.init_level(&META.base.1);
        if let Some(spec) = halspec {
            self.bind_hal(spec);
        }
    }

    fn construct(&mut self, halspec: Option<&HalSpec>, args: DeviceArgs) -> NvResult<()> {
        let spec = halspec.copied().ok_or(NvocError::InvalidState)?;

        self.resource.ctor(&args.resource)?;
        if let Err(err) = self.notifier.ctor() {
            self.resource.dtor();
            return Err(err);
        }
        if let Err(err) = self.ctor(&spec, &args) {
            self.notifier.dtor();
            self.resource.dtor();
            return Err(err);
        }
        Ok(())
    }

    fn destruct(&mut self) {
        self.dtor();
        self.notifier.dtor();
        self.resource.dtor();
    }
}
