//! OBJGPU: the per-GPU root object
//!
//! A GPU composes `Object` and `HalspecOwner`. Its halspec arrives with the
//! creation arguments and every object created beneath it inherits it.
#![deny(unreachable_patterns)]

use log::debug;

use crate::error::{NvResult, NvocError};
use crate::export::ExportInfo;
use crate::hal::{
    Chip, ChipFamily, DispIpVersion, HalImpl, HalSlot, HalSpec, PdbProperty, PropertySet,
    RawHalSpec, RmVariant, SlotBinding,
};
use crate::lifecycle::{create_dynamic, destruct_dynamic, destruct_from_base, Construct};
use crate::ptr::ObjPtr;
use crate::rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Dynamic, Header, Metadata, NvocClass, Rtti};

use super::halspec_owner::{self, HalspecOwner, HalspecOwnerMeta};
use super::object::{self, Object, ObjectMeta};

/// Class id of `OBJGPU`
pub const GPU_CLASS_ID: ClassId = ClassId(0x7ef3cb);

/// Number of GPU instances the driver supports
pub const MAX_GPU_INSTANCES: u32 = 32;

/// Metadata of the `OBJGPU` level
pub type GpuMeta = Metadata<(), (ObjectMeta, HalspecOwnerMeta)>;

/// HAL-dependent GPU properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum GpuProperty {
    IsConnected,
    KeepWprAcrossGc6Supported,
    TegraSocNvdisplay,
    AtsSupported,
    TriggerPcieFlr,
    ClksInTegraSoc,
    PreinitializedWprRegion,
    PowerManagementSupported,
    UnixDynamicPowerSupported,
}

impl PdbProperty for GpuProperty {
    const ALL: &'static [Self] = &[
        GpuProperty::IsConnected,
        GpuProperty::KeepWprAcrossGc6Supported,
        GpuProperty::TegraSocNvdisplay,
        GpuProperty::AtsSupported,
        GpuProperty::TriggerPcieFlr,
        GpuProperty::ClksInTegraSoc,
        GpuProperty::PreinitializedWprRegion,
        GpuProperty::PowerManagementSupported,
        GpuProperty::UnixDynamicPowerSupported,
    ];

    fn bit(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            GpuProperty::IsConnected => "IS_CONNECTED",
            GpuProperty::KeepWprAcrossGc6Supported => "KEEP_WPR_ACROSS_GC6_SUPPORTED",
            GpuProperty::TegraSocNvdisplay => "TEGRA_SOC_NVDISPLAY",
            GpuProperty::AtsSupported => "ATS_SUPPORTED",
            GpuProperty::TriggerPcieFlr => "TRIGGER_PCIE_FLR",
            GpuProperty::ClksInTegraSoc => "CLKS_IN_TEGRA_SOC",
            GpuProperty::PreinitializedWprRegion => "PREINITIALIZED_WPR_REGION",
            GpuProperty::PowerManagementSupported => "POWER_MANAGEMENT_SUPPORTED",
            GpuProperty::UnixDynamicPowerSupported => "UNIX_DYNAMIC_POWER_SUPPORTED",
        }
    }
}

/// Where the device info table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DeviceInfoSource {
    /// Not constructed, or the chip has no table
    None = 0,
    /// Fetched from the GSP firmware
    Firmware = 1,
    /// Fetched from the host over the VF channel
    Host = 2,
}

/// Engine descriptors recorded in the device info table
pub mod engine {
    /// Graphics
    pub const GR: u32 = 0;
    /// Copy engine
    pub const CE: u32 = 1;
    /// Bus interface
    pub const BIF: u32 = 2;
    /// Display
    pub const DISP: u32 = 3;
    /// Video decoder
    pub const NVDEC: u32 = 4;
}

type DeviceInfoFn = fn(&mut Gpu) -> NvResult<()>;
type NameStringFn = fn(&Gpu) -> String;
type CheckEngineFn = fn(&Gpu, u32) -> bool;
type HasDisplayFn = fn(&Gpu) -> bool;

/// OBJGPU creation arguments
#[derive(Debug, Clone, Copy)]
pub struct GpuArgs {
    /// Classifiers of this GPU
    pub halspec: RawHalSpec,
    /// Driver-wide GPU instance number
    pub gpu_instance: u32,
}

impl GpuArgs {
    /// Arguments for a GPU with a decoded halspec
    pub fn new(halspec: HalSpec, gpu_instance: u32) -> Self {
        Self {
            halspec: halspec.to_raw(),
            gpu_instance,
        }
    }

    /// Arguments for a GPU with raw classifier values
    pub fn from_raw(halspec: RawHalSpec, gpu_instance: u32) -> Self {
        Self {
            halspec,
            gpu_instance,
        }
    }
}

/// Per-GPU root object
#[repr(C)]
pub struct Gpu {
    header: Header<GpuMeta>,
    object: Object,
    halspec_owner: HalspecOwner,
    gpu_instance: u32,
    properties: PropertySet<GpuProperty>,
    device_info_source: DeviceInfoSource,
    engine_mask: u64,
    construct_device_info_table: HalSlot<DeviceInfoFn>,
    get_name_string: HalSlot<NameStringFn>,
    check_engine: HalSlot<CheckEngineFn>,
    has_display: HalSlot<HasDisplayFn>,
}

/// Class descriptor of `OBJGPU`
pub static CLASS_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<Gpu>(GPU_CLASS_ID, "OBJGPU"),
    create_fn: Some(create_dynamic::<Gpu>),
    cast_info: &CAST_INFO,
    export_info: &ExportInfo::EMPTY,
};

static META: GpuMeta = Metadata {
    rtti: Rtti {
        class_def: &CLASS_DEF,
        dtor: Some(destruct_dynamic::<Gpu>),
        offset: 0,
    },
    vtable: (),
    base: (
        Metadata {
            rtti: Rtti {
                class_def: &object::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: core::mem::offset_of!(Gpu, object),
            },
            vtable: (),
            base: (),
        },
        Metadata {
            rtti: Rtti {
                class_def: &halspec_owner::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: core::mem::offset_of!(Gpu, halspec_owner),
            },
            vtable: (),
            base: (),
        },
    ),
};

static CAST_INFO: CastInfo = CastInfo {
    relatives: &[&META.rtti, &META.base.0.rtti, &META.base.1.rtti],
};

unsafe impl NvocClass for Gpu {
    fn class_def() -> &'static ClassDef {
        &CLASS_DEF
    }
}

crate::impl_static_cast!(Gpu => Object: object; HalspecOwner: halspec_owner);

// construct_device_info_table

fn construct_device_info_table_fwclient(gpu: &mut Gpu) -> NvResult<()> {
    gpu.device_info_source = DeviceInfoSource::Firmware;
    gpu.engine_mask = engine_bit(engine::GR)
        | engine_bit(engine::CE)
        | engine_bit(engine::BIF)
        | engine_bit(engine::NVDEC);
    if gpu.has_display().unwrap_or(false) {
        gpu.engine_mask |= engine_bit(engine::DISP);
    }
    Ok(())
}

fn construct_device_info_table_vf(gpu: &mut Gpu) -> NvResult<()> {
    gpu.device_info_source = DeviceInfoSource::Host;
    gpu.engine_mask = engine_bit(engine::GR) | engine_bit(engine::CE) | engine_bit(engine::BIF);
    Ok(())
}

fn construct_device_info_table_stub(_gpu: &mut Gpu) -> NvResult<()> {
    Ok(())
}

static DEVICE_INFO_FWCLIENT: HalImpl<DeviceInfoFn> =
    HalImpl::new("FWCLIENT", construct_device_info_table_fwclient);
static DEVICE_INFO_VF: HalImpl<DeviceInfoFn> = HalImpl::new("VF", construct_device_info_table_vf);
static DEVICE_INFO_STUB: HalImpl<DeviceInfoFn> =
    HalImpl::new("56cd7a", construct_device_info_table_stub);

fn resolve_construct_device_info_table(spec: &HalSpec) -> &'static HalImpl<DeviceInfoFn> {
    match (spec.family(), spec.rm_variant) {
        (ChipFamily::Turing | ChipFamily::Tegra, _) => &DEVICE_INFO_STUB,
        (_, RmVariant::Vf) => &DEVICE_INFO_VF,
        (_, RmVariant::PfKernelOnly) => &DEVICE_INFO_FWCLIENT,
    }
}

// get_name_string

fn get_name_string_fwclient(gpu: &Gpu) -> String {
    format!("NVIDIA {}", gpu.chip_name())
}

fn get_name_string_vf(gpu: &Gpu) -> String {
    format!("NVIDIA {} (virtual function)", gpu.chip_name())
}

fn get_name_string_t234d(gpu: &Gpu) -> String {
    format!("NVIDIA Tegra {} display", gpu.chip_name())
}

static NAME_STRING_FWCLIENT: HalImpl<NameStringFn> =
    HalImpl::new("FWCLIENT", get_name_string_fwclient);
static NAME_STRING_VF: HalImpl<NameStringFn> = HalImpl::new("VF", get_name_string_vf);
static NAME_STRING_T234D: HalImpl<NameStringFn> = HalImpl::new("T234D", get_name_string_t234d);

fn resolve_get_name_string(spec: &HalSpec) -> &'static HalImpl<NameStringFn> {
    match (spec.rm_variant, spec.chip) {
        (RmVariant::Vf, _) => &NAME_STRING_VF,
        (RmVariant::PfKernelOnly, Chip::T234D | Chip::T264D) => &NAME_STRING_T234D,
        (RmVariant::PfKernelOnly, _) => &NAME_STRING_FWCLIENT,
    }
}

// check_engine

fn check_engine_kernel(gpu: &Gpu, eng_desc: u32) -> bool {
    gpu.engine_mask & engine_bit(eng_desc) != 0
}

fn check_engine_stub(_gpu: &Gpu, _eng_desc: u32) -> bool {
    true
}

static CHECK_ENGINE_KERNEL: HalImpl<CheckEngineFn> = HalImpl::new("KERNEL", check_engine_kernel);
static CHECK_ENGINE_STUB: HalImpl<CheckEngineFn> = HalImpl::new("88bc07", check_engine_stub);

fn resolve_check_engine(spec: &HalSpec) -> &'static HalImpl<CheckEngineFn> {
    match spec.family() {
        ChipFamily::Tegra => &CHECK_ENGINE_STUB,
        ChipFamily::Turing
        | ChipFamily::Ampere
        | ChipFamily::Ada
        | ChipFamily::Hopper
        | ChipFamily::Blackwell => &CHECK_ENGINE_KERNEL,
    }
}

// has_display (display IP axis)

fn has_display_v04(_gpu: &Gpu) -> bool {
    true
}

fn has_display_v05(_gpu: &Gpu) -> bool {
    true
}

fn has_display_none(_gpu: &Gpu) -> bool {
    false
}

static HAS_DISPLAY_V04: HalImpl<HasDisplayFn> = HalImpl::new("v04_00", has_display_v04);
static HAS_DISPLAY_V05: HalImpl<HasDisplayFn> = HalImpl::new("v05_00", has_display_v05);
static HAS_DISPLAY_NONE: HalImpl<HasDisplayFn> = HalImpl::new("3dd2c9", has_display_none);

fn resolve_has_display(spec: &HalSpec) -> &'static HalImpl<HasDisplayFn> {
    match spec.disp_ip {
        DispIpVersion::None => &HAS_DISPLAY_NONE,
        DispIpVersion::V04_00
        | DispIpVersion::V04_01
        | DispIpVersion::V04_02
        | DispIpVersion::V04_04 => &HAS_DISPLAY_V04,
        DispIpVersion::V05_00 | DispIpVersion::V05_01 => &HAS_DISPLAY_V05,
    }
}

fn engine_bit(eng_desc: u32) -> u64 {
    1u64.checked_shl(eng_desc).unwrap_or(0)
}

impl Gpu {
    /// Driver-wide instance number
    pub fn gpu_instance(&self) -> u32 {
        self.gpu_instance
    }

    /// The GPU's halspec
    pub fn halspec(&self) -> Option<HalSpec> {
        self.halspec_owner.halspec()
    }

    /// The halspec owner sub-object
    pub fn halspec_owner(&self) -> &HalspecOwner {
        &self.halspec_owner
    }

    /// Read a HAL property
    pub fn property(&self, property: GpuProperty) -> bool {
        self.properties.get(property)
    }

    /// Every HAL property
    pub fn properties(&self) -> PropertySet<GpuProperty> {
        self.properties
    }

    /// Source of the device info table
    pub fn device_info_source(&self) -> DeviceInfoSource {
        self.device_info_source
    }

    /// Build the device info table
    pub fn construct_device_info_table(&mut self) -> NvResult<()> {
        let construct = self.construct_device_info_table.get()?;
        construct(self)
    }

    /// Marketing name of the GPU
    pub fn name_string(&self) -> NvResult<String> {
        Ok((self.get_name_string.get()?)(self))
    }

    /// True if the engine is present on this GPU
    pub fn check_engine(&self, eng_desc: u32) -> NvResult<bool> {
        Ok((self.check_engine.get()?)(self, eng_desc))
    }

    /// True if the GPU drives a display engine
    pub fn has_display(&self) -> NvResult<bool> {
        Ok((self.has_display.get()?)(self))
    }

    /// Bound implementation of every HAL method
    pub fn hal_bindings(&self) -> Vec<SlotBinding> {
        vec![
            SlotBinding::of("constructDeviceInfoTable", &self.construct_device_info_table),
            SlotBinding::of("getNameString", &self.get_name_string),
            SlotBinding::of("checkEngine", &self.check_engine),
            SlotBinding::of("hasDisplay", &self.has_display),
        ]
    }

    fn chip_name(&self) -> &'static str {
        self.halspec().map_or("unknown", |spec| spec.chip.name())
    }

    fn bind_hal(&mut self, spec: &HalSpec) {
        self.construct_device_info_table
            .bind(resolve_construct_device_info_table(spec));
        self.get_name_string.bind(resolve_get_name_string(spec));
        self.check_engine.bind(resolve_check_engine(spec));
        self.has_display.bind(resolve_has_display(spec));
        debug!("OBJGPU HAL bound for {}: {:?}", spec, self.hal_bindings());
    }

    fn init_properties(&mut self, spec: &HalSpec) {
        let chip = spec.chip;
        let props = &mut self.properties;
        props.set(GpuProperty::IsConnected, true);
        props.set(
            GpuProperty::KeepWprAcrossGc6Supported,
            matches!(
                chip,
                Chip::GB202
                    | Chip::GB203
                    | Chip::GB205
                    | Chip::GB206
                    | Chip::GB207
                    | Chip::GB20B
                    | Chip::GB20C
            ),
        );
        props.set(
            GpuProperty::TegraSocNvdisplay,
            matches!(chip, Chip::T234D | Chip::T264D),
        );
        props.set(
            GpuProperty::AtsSupported,
            matches!(chip, Chip::GB10B | Chip::GB20B | Chip::GB20C),
        );
        props.set(GpuProperty::TriggerPcieFlr, chip == Chip::GB10B);
        props.set(GpuProperty::ClksInTegraSoc, chip == Chip::GB10B);
        props.set(
            GpuProperty::PreinitializedWprRegion,
            matches!(chip, Chip::GB10B | Chip::GB20B | Chip::GB20C),
        );
        let power_management = match spec.rm_variant {
            RmVariant::Vf | RmVariant::PfKernelOnly => {
                !matches!(chip, Chip::GB20B | Chip::GB20C)
            }
        };
        props.set(GpuProperty::PowerManagementSupported, power_management);
        props.set(
            GpuProperty::UnixDynamicPowerSupported,
            spec.family() != ChipFamily::Tegra,
        );
    }

    fn ctor(&mut self, spec: &HalSpec, args: &GpuArgs) -> NvResult<()> {
        if args.gpu_instance >= MAX_GPU_INSTANCES {
            debug!("gpu instance {} out of range", args.gpu_instance);
            return Err(NvocError::InvalidArgument);
        }
        self.gpu_instance = args.gpu_instance;
        self.init_properties(spec);
        Ok(())
    }

    fn dtor(&mut self) {
        debug!("OBJGPU {} torn down", self.gpu_instance);
        self.engine_mask = 0;
        self.device_info_source = DeviceInfoSource::None;
    }
}

impl Construct for Gpu {
    type Args = GpuArgs;

    fn bind_halspec(
        _parent: Option<ObjPtr<Dynamic>>,
        args: &GpuArgs,
    ) -> NvResult<Option<HalSpec>> {
        HalSpec::from_raw(args.halspec).map(Some)
    }

    fn init(&mut self, halspec: Option<&HalSpec>) {
        self.header.set(&META);
        self.object.init_level(&META.base.0);
        if let Some(spec) = halspec {
            self.halspec_owner.init_level(&META.base.1, spec);
            self.bind_hal(spec);
        }
    }

    fn construct(&mut self, halspec: Option<&HalSpec>, args: GpuArgs) -> NvResult<()> {
        let spec = halspec.copied().ok_or(NvocError::InvalidState)?;

        self.object.ctor()?;
        if let Err(err) = self.halspec_owner.ctor() {
            self.object.dtor();
            return Err(err);
        }
        if let Err(err) = self.ctor(&spec, &args) {
            self.halspec_owner.dtor();
            self.object.dtor();
            return Err(err);
        }
        Ok(())
    }

    fn destruct(&mut self) {
        self.dtor();
        self.halspec_owner.dtor();
        self.object.dtor();
    }
}
