//! KernelBif: the bus interface engine
//!
//! An `OBJENGSTATE` subclass. It overrides the construct/init/load/unload
//! hooks through down-thunks in the `OBJENGSTATE` vtable and inherits the
//! destroy and presence hooks through up-thunks in its own.
//!
//! Most of its behaviour is chip dependent and is bound per object from the
//! halspec of the owning GPU. Part of its destruction runs through a HAL slot
//! as well.
#![deny(unreachable_patterns)]

use log::{debug, trace};

use crate::error::{NvResult, NvocError};
use crate::export::ExportInfo;
use crate::hal::{Chip, ChipFamily, HalImpl, HalSlot, HalSpec, PdbProperty, PropertySet, RmVariant, SlotBinding};
use crate::lifecycle::{create_dynamic, destruct_dynamic, destruct_from_base, Construct};
use crate::ptr::ObjPtr;
use crate::rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Dynamic, Header, Metadata, NvocClass, Rtti};

use super::engstate::{self, EngDesc, EngState, EngStateMeta, EngStateVtable};
use super::halspec_owner::HalspecOwner;
use super::object::{self, Object};

/// Class id of `KernelBif`
pub const KERNEL_BIF_CLASS_ID: ClassId = ClassId(0xdbe523);

/// Words of PCIe config space mirrored by the engine
pub const CONFIG_SPACE_WORDS: usize = 4;

const PCI_COMMAND_IO: u32 = 0x1;
const PCI_COMMAND_MEMORY: u32 = 0x2;
const PCI_COMMAND_MASTER: u32 = 0x4;
const PCI_STATUS_CAP_LIST: u32 = 0x0010_0000;
const PCI_MSI_ENABLE: u32 = 0x0001_0000;
const XVE_MSI_ENABLE: u32 = 0x1;

/// Virtual methods of the `KernelBif` level
pub struct KernelBifVtable {
    /// True if the engine exists on this GPU
    pub is_present: fn(ObjPtr<KernelBif>) -> bool,
    /// Release engine-specific state
    pub state_destroy: fn(ObjPtr<KernelBif>),
}

/// Metadata of the `KernelBif` level
pub type KernelBifMeta = Metadata<KernelBifVtable, EngStateMeta>;

/// HAL-dependent bus interface properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BifProperty {
    IsMissing,
    CheckIfGpuExistsDef,
    IsFmodelMsiBroken,
    UseConfigSpaceToRearmMsi,
    AllowRearmMsiForVf,
    P2pReadsDisabled,
    P2pWritesDisabled,
    UpstreamLtrSupportWar,
    SupportNoncoherent,
    SecondaryBusResetEnabled,
    FlrPreConditioningRequired,
    FlrHandledByOs,
}

impl PdbProperty for BifProperty {
    const ALL: &'static [Self] = &[
        BifProperty::IsMissing,
        BifProperty::CheckIfGpuExistsDef,
        BifProperty::IsFmodelMsiBroken,
        BifProperty::UseConfigSpaceToRearmMsi,
        BifProperty::AllowRearmMsiForVf,
        BifProperty::P2pReadsDisabled,
        BifProperty::P2pWritesDisabled,
        BifProperty::UpstreamLtrSupportWar,
        BifProperty::SupportNoncoherent,
        BifProperty::SecondaryBusResetEnabled,
        BifProperty::FlrPreConditioningRequired,
        BifProperty::FlrHandledByOs,
    ];

    fn bit(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            BifProperty::IsMissing => "IS_MISSING",
            BifProperty::CheckIfGpuExistsDef => "CHECK_IF_GPU_EXISTS_DEF",
            BifProperty::IsFmodelMsiBroken => "IS_FMODEL_MSI_BROKEN",
            BifProperty::UseConfigSpaceToRearmMsi => "USE_CONFIG_SPACE_TO_REARM_MSI",
            BifProperty::AllowRearmMsiForVf => "ALLOW_REARM_MSI_FOR_VF",
            BifProperty::P2pReadsDisabled => "P2P_READS_DISABLED",
            BifProperty::P2pWritesDisabled => "P2P_WRITES_DISABLED",
            BifProperty::UpstreamLtrSupportWar => "UPSTREAM_LTR_SUPPORT_WAR_BUG_200634944",
            BifProperty::SupportNoncoherent => "SUPPORT_NONCOHERENT",
            BifProperty::SecondaryBusResetEnabled => "SECONDARY_BUS_RESET_ENABLED",
            BifProperty::FlrPreConditioningRequired => "FLR_PRE_CONDITIONING_REQUIRED",
            BifProperty::FlrHandledByOs => "FLR_HANDLED_BY_OS",
        }
    }
}

type StatePostLoadFn = fn(&mut KernelBif, u32) -> NvResult<()>;
type DestructFn = fn(&mut KernelBif);
type InitLtrFn = fn(&mut KernelBif) -> NvResult<()>;
type InitDmaCapsFn = fn(&mut KernelBif);
type PcieConfigFn = fn(&mut KernelBif) -> NvResult<()>;
type XveStatusFn = fn(&KernelBif) -> NvResult<u32>;
type MsiEnabledFn = fn(&KernelBif) -> bool;
type PciIoAccessFn = fn(&KernelBif) -> bool;

/// Bus interface engine
#[repr(C)]
pub struct KernelBif {
    header: Header<KernelBifMeta>,
    engstate: EngState,
    properties: PropertySet<BifProperty>,
    config_space: [u32; CONFIG_SPACE_WORDS],
    saved_config: [u32; CONFIG_SPACE_WORDS],
    config_saved: bool,
    dma_addr_width: u32,
    ltr_enabled: bool,
    post_loaded: bool,
    state_post_load: HalSlot<StatePostLoadFn>,
    destruct: HalSlot<DestructFn>,
    init_ltr: HalSlot<InitLtrFn>,
    init_dma_caps: HalSlot<InitDmaCapsFn>,
    save_pcie_config_registers: HalSlot<PcieConfigFn>,
    restore_pcie_config_registers: HalSlot<PcieConfigFn>,
    get_xve_status_bits: HalSlot<XveStatusFn>,
    is_msi_enabled_in_hw: HalSlot<MsiEnabledFn>,
    is_pci_io_access_enabled: HalSlot<PciIoAccessFn>,
}

/// Class descriptor of `KernelBif`
pub static CLASS_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<KernelBif>(KERNEL_BIF_CLASS_ID, "KernelBif"),
    create_fn: Some(create_dynamic::<KernelBif>),
    cast_info: &CAST_INFO,
    export_info: &ExportInfo::EMPTY,
};

static META: KernelBifMeta = Metadata {
    rtti: Rtti {
        class_def: &CLASS_DEF,
        dtor: Some(destruct_dynamic::<KernelBif>),
        offset: 0,
    },
    vtable: KernelBifVtable {
        is_present: kbif_is_present,
        state_destroy: kbif_state_destroy,
    },
    base: Metadata {
        rtti: Rtti {
            class_def: &engstate::CLASS_DEF,
            dtor: Some(destruct_from_base),
            offset: core::mem::offset_of!(KernelBif, engstate),
        },
        vtable: EngStateVtable {
            construct_engine: engstate_construct_engine,
            state_init_locked: engstate_state_init_locked,
            state_load: engstate_state_load,
            state_post_load: engstate_state_post_load,
            state_unload: engstate_state_unload,
            state_destroy: engstate::base::state_destroy,
            is_present: engstate::base::is_present,
        },
        base: Metadata {
            rtti: Rtti {
                class_def: &object::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: core::mem::offset_of!(KernelBif, engstate.object),
            },
            vtable: (),
            base: (),
        },
    },
};

static CAST_INFO: CastInfo = CastInfo {
    relatives: &[&META.rtti, &META.base.rtti, &META.base.base.rtti],
};

unsafe impl NvocClass for KernelBif {
    fn class_def() -> &'static ClassDef {
        &CLASS_DEF
    }
}

crate::impl_static_cast!(KernelBif => EngState: engstate; Object: engstate.object);

crate::down_thunk! {
    fn engstate_construct_engine(EngState => KernelBif, eng_desc: EngDesc) -> NvResult<()> = construct_engine;
    fn engstate_state_init_locked(EngState => KernelBif) -> NvResult<()> = state_init_locked;
    fn engstate_state_load(EngState => KernelBif, flags: u32) -> NvResult<()> = state_load;
    fn engstate_state_post_load(EngState => KernelBif, flags: u32) -> NvResult<()> = state_post_load;
    fn engstate_state_unload(EngState => KernelBif, flags: u32) -> NvResult<()> = state_unload;
}

crate::up_thunk! {
    fn kbif_is_present(KernelBif => EngState) -> bool = engstate::base::is_present;
    fn kbif_state_destroy(KernelBif => EngState) = engstate::base::state_destroy;
}

// OBJENGSTATE overrides

fn construct_engine(mut this: ObjPtr<KernelBif>, eng_desc: EngDesc) -> NvResult<()> {
    if this.property(BifProperty::IsMissing) {
        debug!("KernelBif {}: bus interface missing, nothing to construct", eng_desc);
        return Ok(());
    }
    let init_dma_caps = this.init_dma_caps.get()?;
    init_dma_caps(&mut *this);
    Ok(())
}

fn state_init_locked(mut this: ObjPtr<KernelBif>) -> NvResult<()> {
    let init_ltr = this.init_ltr.get()?;
    init_ltr(&mut *this)
}

fn state_load(mut this: ObjPtr<KernelBif>, flags: u32) -> NvResult<()> {
    trace!("KernelBif load, flags {:#x}", flags);
    if this.config_saved {
        this.restore_pcie_config_registers()?;
    }
    Ok(())
}

fn state_post_load(mut this: ObjPtr<KernelBif>, flags: u32) -> NvResult<()> {
    let post_load = this.state_post_load.get()?;
    post_load(&mut *this, flags)
}

fn state_unload(mut this: ObjPtr<KernelBif>, flags: u32) -> NvResult<()> {
    trace!("KernelBif unload, flags {:#x}", flags);
    this.post_loaded = false;
    this.save_pcie_config_registers()
}

// state_post_load

fn state_post_load_impl(bif: &mut KernelBif, _flags: u32) -> NvResult<()> {
    bif.post_loaded = true;
    Ok(())
}

fn state_post_load_stub(_bif: &mut KernelBif, _flags: u32) -> NvResult<()> {
    Ok(())
}

static STATE_POST_LOAD_IMPL: HalImpl<StatePostLoadFn> = HalImpl::new("IMPL", state_post_load_impl);
static STATE_POST_LOAD_STUB: HalImpl<StatePostLoadFn> = HalImpl::new("56cd7a", state_post_load_stub);

fn resolve_state_post_load(spec: &HalSpec) -> &'static HalImpl<StatePostLoadFn> {
    match spec.rm_variant {
        RmVariant::Vf => &STATE_POST_LOAD_STUB,
        RmVariant::PfKernelOnly => &STATE_POST_LOAD_IMPL,
    }
}

// destruct

fn destruct_gm107(bif: &mut KernelBif) {
    bif.saved_config = [0; CONFIG_SPACE_WORDS];
    bif.config_saved = false;
    bif.dma_addr_width = 0;
}

fn destruct_stub(_bif: &mut KernelBif) {}

static DESTRUCT_GM107: HalImpl<DestructFn> = HalImpl::new("GM107", destruct_gm107);
static DESTRUCT_STUB: HalImpl<DestructFn> = HalImpl::new("b3696a", destruct_stub);

fn resolve_destruct(spec: &HalSpec) -> &'static HalImpl<DestructFn> {
    match spec.family() {
        ChipFamily::Tegra => &DESTRUCT_STUB,
        ChipFamily::Turing
        | ChipFamily::Ampere
        | ChipFamily::Ada
        | ChipFamily::Hopper
        | ChipFamily::Blackwell => &DESTRUCT_GM107,
    }
}

// init_ltr

fn init_ltr_gb202(bif: &mut KernelBif) -> NvResult<()> {
    bif.ltr_enabled = !bif.property(BifProperty::UpstreamLtrSupportWar);
    Ok(())
}

fn init_ltr_stub(_bif: &mut KernelBif) -> NvResult<()> {
    Ok(())
}

static INIT_LTR_GB202: HalImpl<InitLtrFn> = HalImpl::new("GB202", init_ltr_gb202);
static INIT_LTR_STUB: HalImpl<InitLtrFn> = HalImpl::new("b3696a", init_ltr_stub);

fn resolve_init_ltr(spec: &HalSpec) -> &'static HalImpl<InitLtrFn> {
    match spec.chip {
        Chip::GB202 | Chip::GB203 | Chip::GB205 | Chip::GB206 | Chip::GB207 => &INIT_LTR_GB202,
        _ => &INIT_LTR_STUB,
    }
}

// init_dma_caps

fn init_dma_caps_impl(bif: &mut KernelBif) {
    bif.dma_addr_width = 64;
}

fn init_dma_caps_vf(bif: &mut KernelBif) {
    bif.dma_addr_width = 52;
}

static INIT_DMA_CAPS_IMPL: HalImpl<InitDmaCapsFn> = HalImpl::new("IMPL", init_dma_caps_impl);
static INIT_DMA_CAPS_VF: HalImpl<InitDmaCapsFn> = HalImpl::new("VF", init_dma_caps_vf);

fn resolve_init_dma_caps(spec: &HalSpec) -> &'static HalImpl<InitDmaCapsFn> {
    match spec.rm_variant {
        RmVariant::Vf => &INIT_DMA_CAPS_VF,
        RmVariant::PfKernelOnly => &INIT_DMA_CAPS_IMPL,
    }
}

// save / restore PCIe config registers

fn save_pcie_config_registers_gm107(bif: &mut KernelBif) -> NvResult<()> {
    bif.saved_config[..2].copy_from_slice(&bif.config_space[..2]);
    bif.config_saved = true;
    Ok(())
}

fn save_pcie_config_registers_gh100(bif: &mut KernelBif) -> NvResult<()> {
    bif.saved_config = bif.config_space;
    bif.config_saved = true;
    Ok(())
}

fn restore_pcie_config_registers_gm107(bif: &mut KernelBif) -> NvResult<()> {
    if !bif.config_saved {
        return Err(NvocError::InvalidState);
    }
    bif.config_space[..2].copy_from_slice(&bif.saved_config[..2]);
    bif.config_saved = false;
    Ok(())
}

fn restore_pcie_config_registers_gh100(bif: &mut KernelBif) -> NvResult<()> {
    if !bif.config_saved {
        return Err(NvocError::InvalidState);
    }
    bif.config_space = bif.saved_config;
    bif.config_saved = false;
    Ok(())
}

fn pcie_config_registers_stub(_bif: &mut KernelBif) -> NvResult<()> {
    Ok(())
}

static SAVE_PCIE_CONFIG_GM107: HalImpl<PcieConfigFn> =
    HalImpl::new("GM107", save_pcie_config_registers_gm107);
static SAVE_PCIE_CONFIG_GH100: HalImpl<PcieConfigFn> =
    HalImpl::new("GH100", save_pcie_config_registers_gh100);
static RESTORE_PCIE_CONFIG_GM107: HalImpl<PcieConfigFn> =
    HalImpl::new("GM107", restore_pcie_config_registers_gm107);
static RESTORE_PCIE_CONFIG_GH100: HalImpl<PcieConfigFn> =
    HalImpl::new("GH100", restore_pcie_config_registers_gh100);
static PCIE_CONFIG_STUB: HalImpl<PcieConfigFn> = HalImpl::new("56cd7a", pcie_config_registers_stub);

fn resolve_save_pcie_config_registers(spec: &HalSpec) -> &'static HalImpl<PcieConfigFn> {
    match spec.family() {
        ChipFamily::Tegra => &PCIE_CONFIG_STUB,
        ChipFamily::Turing | ChipFamily::Ampere | ChipFamily::Ada => &SAVE_PCIE_CONFIG_GM107,
        ChipFamily::Hopper | ChipFamily::Blackwell => &SAVE_PCIE_CONFIG_GH100,
    }
}

fn resolve_restore_pcie_config_registers(spec: &HalSpec) -> &'static HalImpl<PcieConfigFn> {
    match spec.family() {
        ChipFamily::Tegra => &PCIE_CONFIG_STUB,
        ChipFamily::Turing | ChipFamily::Ampere | ChipFamily::Ada => &RESTORE_PCIE_CONFIG_GM107,
        ChipFamily::Hopper | ChipFamily::Blackwell => &RESTORE_PCIE_CONFIG_GH100,
    }
}

// get_xve_status_bits

fn get_xve_status_bits_gm107(bif: &KernelBif) -> NvResult<u32> {
    Ok(bif.config_space[1] >> 16)
}

fn get_xve_status_bits_gh100(bif: &KernelBif) -> NvResult<u32> {
    Ok((bif.config_space[1] >> 16) | ((bif.config_space[3] & 0xff) << 16))
}

fn get_xve_status_bits_gb100(bif: &KernelBif) -> NvResult<u32> {
    Ok(bif.config_space[3] & 0xff)
}

fn get_xve_status_bits_stub(_bif: &KernelBif) -> NvResult<u32> {
    Ok(0)
}

static XVE_STATUS_GM107: HalImpl<XveStatusFn> = HalImpl::new("GM107", get_xve_status_bits_gm107);
static XVE_STATUS_GH100: HalImpl<XveStatusFn> = HalImpl::new("GH100", get_xve_status_bits_gh100);
static XVE_STATUS_GB100: HalImpl<XveStatusFn> = HalImpl::new("GB100", get_xve_status_bits_gb100);
static XVE_STATUS_STUB: HalImpl<XveStatusFn> = HalImpl::new("56cd7a", get_xve_status_bits_stub);

fn resolve_get_xve_status_bits(spec: &HalSpec) -> &'static HalImpl<XveStatusFn> {
    match (spec.family(), spec.chip) {
        (ChipFamily::Tegra, _) => &XVE_STATUS_STUB,
        (ChipFamily::Turing | ChipFamily::Ampere | ChipFamily::Ada, _) => &XVE_STATUS_GM107,
        (_, Chip::GB100 | Chip::GB102 | Chip::GB110 | Chip::GB112) => &XVE_STATUS_GB100,
        (ChipFamily::Hopper | ChipFamily::Blackwell, _) => &XVE_STATUS_GH100,
    }
}

// is_msi_enabled_in_hw

fn is_msi_enabled_in_hw_gm107(bif: &KernelBif) -> bool {
    bif.config_space[2] & PCI_MSI_ENABLE != 0
}

fn is_msi_enabled_in_hw_gh100(bif: &KernelBif) -> bool {
    bif.config_space[3] & XVE_MSI_ENABLE != 0
}

fn is_msi_enabled_in_hw_stub(_bif: &KernelBif) -> bool {
    false
}

static MSI_ENABLED_GM107: HalImpl<MsiEnabledFn> = HalImpl::new("GM107", is_msi_enabled_in_hw_gm107);
static MSI_ENABLED_GH100: HalImpl<MsiEnabledFn> = HalImpl::new("GH100", is_msi_enabled_in_hw_gh100);
static MSI_ENABLED_STUB: HalImpl<MsiEnabledFn> = HalImpl::new("3dd2c9", is_msi_enabled_in_hw_stub);

fn resolve_is_msi_enabled_in_hw(spec: &HalSpec) -> &'static HalImpl<MsiEnabledFn> {
    match spec.chip {
        chip if chip.is_pre_hopper() => &MSI_ENABLED_GM107,
        Chip::GH100
        | Chip::GB10B
        | Chip::GB202
        | Chip::GB203
        | Chip::GB205
        | Chip::GB206
        | Chip::GB207
        | Chip::GB20B
        | Chip::GB20C => &MSI_ENABLED_GH100,
        _ => &MSI_ENABLED_STUB,
    }
}

// is_pci_io_access_enabled

fn is_pci_io_access_enabled_gm107(bif: &KernelBif) -> bool {
    bif.config_space[0] & PCI_COMMAND_IO != 0
}

fn is_pci_io_access_enabled_gb202(bif: &KernelBif) -> bool {
    bif.config_space[0] & (PCI_COMMAND_IO | PCI_COMMAND_MEMORY) == PCI_COMMAND_IO | PCI_COMMAND_MEMORY
}

fn is_pci_io_access_enabled_stub(_bif: &KernelBif) -> bool {
    false
}

static PCI_IO_GM107: HalImpl<PciIoAccessFn> = HalImpl::new("GM107", is_pci_io_access_enabled_gm107);
static PCI_IO_GB202: HalImpl<PciIoAccessFn> = HalImpl::new("GB202", is_pci_io_access_enabled_gb202);
static PCI_IO_STUB: HalImpl<PciIoAccessFn> = HalImpl::new("3dd2c9", is_pci_io_access_enabled_stub);

fn resolve_is_pci_io_access_enabled(spec: &HalSpec) -> &'static HalImpl<PciIoAccessFn> {
    match spec.chip {
        Chip::GA100 => &PCI_IO_STUB,
        chip if chip.is_pre_hopper() => &PCI_IO_GM107,
        Chip::GB10B
        | Chip::GB202
        | Chip::GB203
        | Chip::GB205
        | Chip::GB206
        | Chip::GB207
        | Chip::GB20B
        | Chip::GB20C => &PCI_IO_GB202,
        _ => &PCI_IO_STUB,
    }
}

impl KernelBif {
    /// Read a HAL property
    pub fn property(&self, property: BifProperty) -> bool {
        self.properties.get(property)
    }

    /// Every HAL property
    pub fn properties(&self) -> PropertySet<BifProperty> {
        self.properties
    }

    /// The `OBJENGSTATE` sub-object
    pub fn engstate(&self) -> &EngState {
        &self.engstate
    }

    /// DMA address width configured by `construct_engine`, 0 before
    pub fn dma_addr_width(&self) -> u32 {
        self.dma_addr_width
    }

    /// True once latency tolerance reporting was enabled
    pub fn ltr_enabled(&self) -> bool {
        self.ltr_enabled
    }

    /// True between a successful post-load and the next unload
    pub fn is_post_loaded(&self) -> bool {
        self.post_loaded
    }

    /// Mirrored PCIe config space
    pub fn config_space(&self) -> &[u32; CONFIG_SPACE_WORDS] {
        &self.config_space
    }

    /// Overwrite one mirrored config space word
    pub fn write_config(&mut self, word: usize, value: u32) -> NvResult<()> {
        let slot = self
            .config_space
            .get_mut(word)
            .ok_or(NvocError::InvalidArgument)?;
        *slot = value;
        Ok(())
    }

    /// Snapshot the config space ahead of a reset or unload
    pub fn save_pcie_config_registers(&mut self) -> NvResult<()> {
        let save = self.save_pcie_config_registers.get()?;
        save(self)
    }

    /// Write back the snapshot taken by [`KernelBif::save_pcie_config_registers`]
    pub fn restore_pcie_config_registers(&mut self) -> NvResult<()> {
        let restore = self.restore_pcie_config_registers.get()?;
        restore(self)
    }

    /// Error status bits of the bus interface
    pub fn xve_status_bits(&self) -> NvResult<u32> {
        (self.get_xve_status_bits.get()?)(self)
    }

    /// True if MSI is enabled in hardware
    pub fn is_msi_enabled_in_hw(&self) -> NvResult<bool> {
        Ok((self.is_msi_enabled_in_hw.get()?)(self))
    }

    /// True if legacy I/O space decoding is enabled
    pub fn is_pci_io_access_enabled(&self) -> NvResult<bool> {
        Ok((self.is_pci_io_access_enabled.get()?)(self))
    }

    /// Presence check through this level's vtable
    pub fn is_present(this: ObjPtr<KernelBif>) -> NvResult<bool> {
        let meta = this.header.get().ok_or(NvocError::InvalidState)?;
        Ok((meta.vtable.is_present)(this))
    }

    /// Bound implementation of every HAL method
    pub fn hal_bindings(&self) -> Vec<SlotBinding> {
        vec![
            SlotBinding::of("statePostLoad", &self.state_post_load),
            SlotBinding::of("destruct", &self.destruct),
            SlotBinding::of("initLtr", &self.init_ltr),
            SlotBinding::of("initDmaCaps", &self.init_dma_caps),
            SlotBinding::of("savePcieConfigRegisters", &self.save_pcie_config_registers),
            SlotBinding::of("restorePcieConfigRegisters", &self.restore_pcie_config_registers),
            SlotBinding::of("getXveStatusBits", &self.get_xve_status_bits),
            SlotBinding::of("isMsiEnabledInHw", &self.is_msi_enabled_in_hw),
            SlotBinding::of("isPciIoAccessEnabled", &self.is_pci_io_access_enabled),
        ]
    }

    fn bind_hal(&mut self, spec: &HalSpec) {
        self.state_post_load.bind(resolve_state_post_load(spec));
        self.destruct.bind(resolve_destruct(spec));
        self.init_ltr.bind(resolve_init_ltr(spec));
        self.init_dma_caps.bind(resolve_init_dma_caps(spec));
        self.save_pcie_config_registers
            .bind(resolve_save_pcie_config_registers(spec));
        self.restore_pcie_config_registers
            .bind(resolve_restore_pcie_config_registers(spec));
        self.get_xve_status_bits.bind(resolve_get_xve_status_bits(spec));
        self.is_msi_enabled_in_hw.bind(resolve_is_msi_enabled_in_hw(spec));
        self.is_pci_io_access_enabled
            .bind(resolve_is_pci_io_access_enabled(spec));
        debug!("KernelBif HAL bound for {}: {:?}", spec, self.hal_bindings());
    }

    fn init_properties(&mut self, spec: &HalSpec) {
        let chip = spec.chip;
        let family = spec.family();
        let discrete = family != ChipFamily::Tegra;
        let hopper_plus = matches!(family, ChipFamily::Hopper | ChipFamily::Blackwell);
        let props = &mut self.properties;

        props.set(BifProperty::IsMissing, !discrete);
        props.set(BifProperty::CheckIfGpuExistsDef, discrete);
        props.set(BifProperty::IsFmodelMsiBroken, chip.is_pre_hopper());
        props.set(BifProperty::UseConfigSpaceToRearmMsi, !hopper_plus);
        props.set(BifProperty::AllowRearmMsiForVf, chip == Chip::GB10B);
        props.set(BifProperty::P2pReadsDisabled, !discrete);
        props.set(BifProperty::P2pWritesDisabled, !discrete);
        props.set(BifProperty::UpstreamLtrSupportWar, discrete && chip != Chip::GA100);
        props.set(BifProperty::SupportNoncoherent, true);
        props.set(BifProperty::SecondaryBusResetEnabled, discrete);
        props.set(
            BifProperty::FlrPreConditioningRequired,
            family == ChipFamily::Turing,
        );
        props.set(BifProperty::FlrHandledByOs, hopper_plus);
    }

    fn ctor(&mut self, spec: &HalSpec) -> NvResult<()> {
        self.init_properties(spec);
        if !self.property(BifProperty::IsMissing) {
            self.config_space = [
                PCI_COMMAND_IO | PCI_COMMAND_MEMORY | PCI_COMMAND_MASTER,
                PCI_STATUS_CAP_LIST,
                PCI_MSI_ENABLE,
                XVE_MSI_ENABLE,
            ];
        }
        Ok(())
    }

    fn dtor(&mut self) {
        match self.destruct.get() {
            Ok(destruct) => destruct(self),
            Err(_) => trace!("KernelBif destructed before HAL binding"),
        }
    }
}

impl Construct for KernelBif {
    type Args = ();

    fn bind_halspec(parent: Option<ObjPtr<Dynamic>>, _args: &()) -> NvResult<Option<HalSpec>> {
        HalspecOwner::locate(parent).map(Some)
    }

    fn init(&mut self, halspec: Option<&HalSpec>) {
        self.header.set(&META);
        self.engstate.init_level(&META.base);
        if let Some(spec) = halspec {
            self.bind_hal(spec);
        }
    }

    fn construct(&mut self, halspec: Option<&HalSpec>, _args: ()) -> NvResult<()> {
        let spec = halspec.copied().ok_or(NvocError::InvalidState)?;

        self.engstate.ctor()?;
        if let Err(err) = self.ctor(&spec) {
            self.engstate.dtor();
            return Err(err);
        }
        Ok(())
    }

    fn destruct(&mut self) {
        self.dtor();
        self.engstate.dtor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::gpu::{Gpu, GpuArgs};
    use crate::hal::DispIpVersion;
    use crate::lifecycle::{obj_create, obj_delete, CreateFlags};
    use crate::rtti::cast::{dynamic_cast, static_cast};

    struct Fixture {
        gpu: ObjPtr<Gpu>,
        bif: ObjPtr<KernelBif>,
    }

    impl Fixture {
        fn new(chip: Chip, variant: RmVariant) -> Self {
            let spec = HalSpec::new(chip, variant, DispIpVersion::None);
            let gpu = obj_create::<Gpu>(None, CreateFlags::NONE, GpuArgs::new(spec, 0)).unwrap();
            let bif =
                obj_create::<KernelBif>(Some(gpu.as_dynamic()), CreateFlags::NONE, ()).unwrap();
            Self { gpu, bif }
        }

        fn binding(&self, method: &str) -> Option<&'static str> {
            self.bif
                .hal_bindings()
                .into_iter()
                .find(|binding| binding.method == method)
                .and_then(|binding| binding.variant)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            unsafe {
                obj_delete(self.bif).unwrap();
                obj_delete(self.gpu).unwrap();
            }
        }
    }

    #[test]
    fn test_requires_halspec_owner() {
        assert_eq!(
            obj_create::<KernelBif>(None, CreateFlags::NONE, ()).unwrap_err(),
            NvocError::InvalidArgument
        );
    }

    #[test]
    fn test_xve_status_resolution() {
        let cases = [
            (Chip::TU117, "GM107"),
            (Chip::AD107, "GM107"),
            (Chip::GH100, "GH100"),
            (Chip::GB100, "GB100"),
            (Chip::GB112, "GB100"),
            (Chip::GB10B, "GH100"),
            (Chip::GB20C, "GH100"),
            (Chip::T234D, "56cd7a"),
        ];
        for (chip, expected) in cases {
            let fixture = Fixture::new(chip, RmVariant::PfKernelOnly);
            assert_eq!(fixture.binding("getXveStatusBits"), Some(expected), "{}", chip);
        }
    }

    #[test]
    fn test_pci_io_access_excludes_ga100() {
        let fixture = Fixture::new(Chip::GA100, RmVariant::PfKernelOnly);
        assert_eq!(fixture.binding("isPciIoAccessEnabled"), Some("3dd2c9"));
        assert!(!fixture.bif.is_pci_io_access_enabled().unwrap());
        drop(fixture);

        let fixture = Fixture::new(Chip::GA102, RmVariant::PfKernelOnly);
        assert_eq!(fixture.binding("isPciIoAccessEnabled"), Some("GM107"));
        assert!(fixture.bif.is_pci_io_access_enabled().unwrap());
        drop(fixture);

        let fixture = Fixture::new(Chip::GB205, RmVariant::Vf);
        assert_eq!(fixture.binding("isPciIoAccessEnabled"), Some("GB202"));
        assert_eq!(fixture.binding("initLtr"), Some("GB202"));
        assert_eq!(fixture.binding("initDmaCaps"), Some("VF"));
    }

    #[test]
    fn test_msi_resolution() {
        let fixture = Fixture::new(Chip::GB102, RmVariant::PfKernelOnly);
        assert_eq!(fixture.binding("isMsiEnabledInHw"), Some("3dd2c9"));
        assert!(!fixture.bif.is_msi_enabled_in_hw().unwrap());
        drop(fixture);

        let fixture = Fixture::new(Chip::GH100, RmVariant::PfKernelOnly);
        assert!(fixture.bif.is_msi_enabled_in_hw().unwrap());
    }

    #[test]
    fn test_properties_follow_halspec() {
        let fixture = Fixture::new(Chip::T264D, RmVariant::PfKernelOnly);
        let bif = fixture.bif;
        assert!(bif.property(BifProperty::IsMissing));
        assert!(bif.property(BifProperty::P2pReadsDisabled));
        assert!(!bif.property(BifProperty::FlrHandledByOs));
        assert!(bif.property(BifProperty::SupportNoncoherent));
        assert_eq!(bif.xve_status_bits().unwrap(), 0);
        assert_eq!(fixture.binding("initLtr"), Some("b3696a"));
        drop(fixture);

        let fixture = Fixture::new(Chip::GB10B, RmVariant::PfKernelOnly);
        let bif = fixture.bif;
        assert!(!bif.property(BifProperty::IsMissing));
        assert!(bif.property(BifProperty::FlrHandledByOs));
        assert!(bif.property(BifProperty::AllowRearmMsiForVf));
        assert!(!bif.property(BifProperty::UseConfigSpaceToRearmMsi));
        drop(fixture);

        let fixture = Fixture::new(Chip::TU102, RmVariant::PfKernelOnly);
        assert!(fixture.bif.property(BifProperty::FlrPreConditioningRequired));
        assert!(fixture.bif.property(BifProperty::IsFmodelMsiBroken));
    }

    #[test]
    fn test_engine_hooks_through_thunks() {
        let fixture = Fixture::new(Chip::GB202, RmVariant::PfKernelOnly);
        let mut bif = fixture.bif;
        let engstate = static_cast::<EngState, _>(bif);

        EngState::construct_engine(engstate, 2).unwrap();
        assert_eq!(bif.dma_addr_width(), 64);
        EngState::state_init_locked(engstate).unwrap();
        assert!(!bif.ltr_enabled());
        EngState::state_load(engstate, 0).unwrap();
        EngState::state_post_load(engstate, 0).unwrap();
        assert!(bif.is_post_loaded());

        EngState::state_unload(engstate, 0).unwrap();
        assert!(!bif.is_post_loaded());
        bif.write_config(3, 0).unwrap();
        assert!(!bif.is_msi_enabled_in_hw().unwrap());
        EngState::state_load(engstate, 0).unwrap();
        assert!(bif.is_msi_enabled_in_hw().unwrap());

        assert!(EngState::is_present(engstate).unwrap());
        assert!(KernelBif::is_present(bif).unwrap());
    }

    #[test]
    fn test_gm107_restore_keeps_upper_words() {
        let fixture = Fixture::new(Chip::AD103, RmVariant::PfKernelOnly);
        let mut bif = fixture.bif;
        assert_eq!(
            bif.restore_pcie_config_registers().unwrap_err(),
            NvocError::InvalidState
        );
        bif.save_pcie_config_registers().unwrap();
        bif.write_config(0, 0).unwrap();
        bif.write_config(2, 0).unwrap();
        bif.restore_pcie_config_registers().unwrap();
        assert!(bif.is_pci_io_access_enabled().unwrap());
        assert!(!bif.is_msi_enabled_in_hw().unwrap());
        assert_eq!(bif.write_config(4, 0).unwrap_err(), NvocError::InvalidArgument);
    }

    #[test]
    fn test_vf_post_load_is_stubbed() {
        let fixture = Fixture::new(Chip::GA104, RmVariant::Vf);
        let engstate = static_cast::<EngState, _>(fixture.bif);
        EngState::construct_engine(engstate, 2).unwrap();
        EngState::state_init_locked(engstate).unwrap();
        EngState::state_load(engstate, 0).unwrap();
        EngState::state_post_load(engstate, 0).unwrap();
        assert!(!fixture.bif.is_post_loaded());
        assert_eq!(fixture.bif.dma_addr_width(), 52);
    }

    #[test]
    fn test_cast_graph() {
        let fixture = Fixture::new(Chip::GA106, RmVariant::PfKernelOnly);
        let object = dynamic_cast::<Object, _>(fixture.bif).unwrap();
        assert_eq!(object, static_cast::<Object, _>(fixture.bif));
        let back = dynamic_cast::<KernelBif, _>(object).unwrap();
        assert_eq!(back, fixture.bif);
        assert_eq!(KernelBif::class_def().cast_info.len(), 3);
        assert!(dynamic_cast::<Gpu, _>(fixture.bif).is_none());
    }
}
