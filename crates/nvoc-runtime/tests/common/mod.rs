//! Shared fixtures for the integration tests
//!
//! Every class here is declared from outside the runtime crate, through the
//! same public surface a generated class would use: `#[repr(C)]` layouts,
//! static metadata, `impl_static_cast!` and the thunk macros.

#![allow(dead_code)]

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use nvoc::classes::notifier::{self, NotifierMeta};
use nvoc::classes::object::{self, ObjectMeta};
use nvoc::classes::resource::{self, ResourceArgs, RsResourceMeta, CTRL_CMD_NULL};
use nvoc::lifecycle::{create_dynamic, destruct_dynamic, destruct_from_base, Construct};
use nvoc::{
    write_param_u32, AccessRights, CastInfo, Chip, ClassDef, ClassId, ClassInfo, DispIpVersion,
    Dynamic, ExportEntry, ExportFlags, ExportInfo, HalImpl, HalSlot, HalSpec, HalspecOwner, Header,
    Metadata, Notifier, NvResult, NvocClass, NvocError, ObjAllocator, ObjPtr, Object, RmVariant,
    Rtti, RsResource, StaticCast, SystemAllocator,
};

// ============================================================================
// Journal
// ============================================================================

static JOURNAL: Mutex<Vec<(u32, &'static str)>> = parking_lot::const_mutex(Vec::new());

/// Record a lifecycle event for the object tagged `tag`
pub fn record(tag: u32, event: &'static str) {
    JOURNAL.lock().push((tag, event));
}

/// Remove and return the events recorded for `tag`, oldest first
pub fn take(tag: u32) -> Vec<&'static str> {
    let mut journal = JOURNAL.lock();
    let (mine, rest): (Vec<_>, Vec<_>) = journal.drain(..).partition(|(t, _)| *t == tag);
    *journal = rest;
    mine.into_iter().map(|(_, event)| event).collect()
}

/// Halspec used by tests that don't care about the chip
pub fn spec(chip: Chip, variant: RmVariant) -> HalSpec {
    HalSpec::new(chip, variant, DispIpVersion::None)
}

// ============================================================================
// ChainC -> ChainB -> ChainA -> Object
// ============================================================================

pub const CHAIN_A_ID: ClassId = ClassId(0xc0a001);
pub const CHAIN_B_ID: ClassId = ClassId(0xc0a002);
pub const CHAIN_C_ID: ClassId = ClassId(0xc0a003);

/// Which level of the chain should refuse to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailAt {
    #[default]
    Nowhere,
    A,
    B,
    C,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChainArgs {
    pub tag: u32,
    pub fail_at: FailAt,
}

impl ChainArgs {
    pub fn new(tag: u32) -> Self {
        Self {
            tag,
            fail_at: FailAt::Nowhere,
        }
    }

    pub fn failing(tag: u32, fail_at: FailAt) -> Self {
        Self { tag, fail_at }
    }
}

pub struct ChainAVtable {
    pub describe: fn(ObjPtr<ChainA>) -> &'static str,
}

pub type ChainAMeta = Metadata<ChainAVtable, ObjectMeta>;
pub type ChainBMeta = Metadata<(), ChainAMeta>;
pub type ChainCMeta = Metadata<(), ChainBMeta>;

#[repr(C)]
pub struct ChainA {
    header: Header<ChainAMeta>,
    pub object: Object,
    pub tag: u32,
}

#[repr(C)]
pub struct ChainB {
    header: Header<ChainBMeta>,
    pub a: ChainA,
    pub depth: u32,
}

#[repr(C)]
pub struct ChainC {
    header: Header<ChainCMeta>,
    pub b: ChainB,
    pub payload: [u64; 4],
}

pub static CHAIN_A_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<ChainA>(CHAIN_A_ID, "ChainA"),
    create_fn: None,
    cast_info: &CHAIN_A_CAST,
    export_info: &ExportInfo::EMPTY,
};

static CHAIN_A_SELF: Rtti = Rtti {
    class_def: &CHAIN_A_DEF,
    dtor: None,
    offset: 0,
};

static CHAIN_A_OBJECT: Rtti = Rtti {
    class_def: &object::CLASS_DEF,
    dtor: None,
    offset: core::mem::offset_of!(ChainA, object),
};

static CHAIN_A_CAST: CastInfo = CastInfo {
    relatives: &[&CHAIN_A_SELF, &CHAIN_A_OBJECT],
};

pub static CHAIN_B_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<ChainB>(CHAIN_B_ID, "ChainB"),
    create_fn: None,
    cast_info: &CHAIN_B_CAST,
    export_info: &ExportInfo::EMPTY,
};

static CHAIN_B_SELF: Rtti = Rtti {
    class_def: &CHAIN_B_DEF,
    dtor: None,
    offset: 0,
};

static CHAIN_B_A: Rtti = Rtti {
    class_def: &CHAIN_A_DEF,
    dtor: None,
    offset: core::mem::offset_of!(ChainB, a),
};

static CHAIN_B_OBJECT: Rtti = Rtti {
    class_def: &object::CLASS_DEF,
    dtor: None,
    offset: core::mem::offset_of!(ChainB, a.object),
};

static CHAIN_B_CAST: CastInfo = CastInfo {
    relatives: &[&CHAIN_B_SELF, &CHAIN_B_A, &CHAIN_B_OBJECT],
};

pub static CHAIN_C_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<ChainC>(CHAIN_C_ID, "ChainC"),
    create_fn: Some(create_dynamic::<ChainC>),
    cast_info: &CHAIN_C_CAST,
    export_info: &ExportInfo::EMPTY,
};

static CHAIN_C_META: ChainCMeta = Metadata {
    rtti: Rtti {
        class_def: &CHAIN_C_DEF,
        dtor: Some(destruct_dynamic::<ChainC>),
        offset: 0,
    },
    vtable: (),
    base: Metadata {
        rtti: Rtti {
            class_def: &CHAIN_B_DEF,
            dtor: Some(destruct_from_base),
            offset: core::mem::offset_of!(ChainC, b),
        },
        vtable: (),
        base: Metadata {
            rtti: Rtti {
                class_def: &CHAIN_A_DEF,
                dtor: Some(destruct_from_base),
                offset: core::mem::offset_of!(ChainC, b.a),
            },
            vtable: ChainAVtable {
                describe: chain_a_describe,
            },
            base: Metadata {
                rtti: Rtti {
                    class_def: &object::CLASS_DEF,
                    dtor: Some(destruct_from_base),
                    offset: core::mem::offset_of!(ChainC, b.a.object),
                },
                vtable: (),
                base: (),
            },
        },
    },
};

static CHAIN_C_CAST: CastInfo = CastInfo {
    relatives: &[
        &CHAIN_C_META.rtti,
        &CHAIN_C_META.base.rtti,
        &CHAIN_C_META.base.base.rtti,
        &CHAIN_C_META.base.base.base.rtti,
    ],
};

unsafe impl NvocClass for ChainA {
    fn class_def() -> &'static ClassDef {
        &CHAIN_A_DEF
    }
}

unsafe impl NvocClass for ChainB {
    fn class_def() -> &'static ClassDef {
        &CHAIN_B_DEF
    }
}

unsafe impl NvocClass for ChainC {
    fn class_def() -> &'static ClassDef {
        &CHAIN_C_DEF
    }
}

nvoc::impl_static_cast!(ChainA => Object: object);
nvoc::impl_static_cast!(ChainB => ChainA: a; Object: a.object);
nvoc::impl_static_cast!(ChainC => ChainB: b; ChainA: b.a; Object: b.a.object);

nvoc::down_thunk! {
    fn chain_a_describe(ChainA => ChainC) -> &'static str = ChainC::describe_leaf;
}

impl ChainA {
    fn init_level(&mut self, meta: &'static ChainAMeta) {
        self.header.set(meta);
        self.object.init_level(&meta.base);
    }

    fn ctor(&mut self, args: &ChainArgs) -> NvResult<()> {
        self.object.ctor()?;
        if args.fail_at == FailAt::A {
            record(args.tag, "A.ctor(fail)");
            self.object.dtor();
            return Err(NvocError::GenericFailure);
        }
        self.tag = args.tag;
        record(self.tag, "A.ctor");
        Ok(())
    }

    fn dtor(&mut self) {
        record(self.tag, "A.dtor");
        self.object.dtor();
    }

    /// Virtual: answered by the most-derived override
    pub fn describe(this: ObjPtr<ChainA>) -> Option<&'static str> {
        let meta = this.header.get()?;
        Some((meta.vtable.describe)(this))
    }
}

impl ChainB {
    fn init_level(&mut self, meta: &'static ChainBMeta) {
        self.header.set(meta);
        self.a.init_level(&meta.base);
    }

    fn ctor(&mut self, args: &ChainArgs) -> NvResult<()> {
        self.a.ctor(args)?;
        if args.fail_at == FailAt::B {
            record(args.tag, "B.ctor(fail)");
            self.a.dtor();
            return Err(NvocError::GenericFailure);
        }
        self.depth = 2;
        record(args.tag, "B.ctor");
        Ok(())
    }

    fn dtor(&mut self) {
        record(self.a.tag, "B.dtor");
        self.a.dtor();
    }
}

impl ChainC {
    fn describe_leaf(_this: ObjPtr<ChainC>) -> &'static str {
        "ChainC"
    }

    pub fn tag(&self) -> u32 {
        self.b.a.tag
    }
}

impl Construct for ChainC {
    type Args = ChainArgs;

    fn init(&mut self, _halspec: Option<&HalSpec>) {
        self.header.set(&CHAIN_C_META);
        self.b.init_level(&CHAIN_C_META.base);
    }

    fn construct(&mut self, _halspec: Option<&HalSpec>, args: ChainArgs) -> NvResult<()> {
        self.b.ctor(&args)?;
        if args.fail_at == FailAt::C {
            record(args.tag, "C.ctor(fail)");
            self.b.dtor();
            return Err(NvocError::GenericFailure);
        }
        self.payload = [u64::from(args.tag); 4];
        record(args.tag, "C.ctor");
        Ok(())
    }

    fn destruct(&mut self) {
        record(self.tag(), "C.dtor");
        self.b.dtor();
    }
}

// ============================================================================
// HalLeaf: [Object, Notifier] with one HAL slot
// ============================================================================

pub const HAL_LEAF_ID: ClassId = ClassId(0xc0a010);

type LeafFn = fn(&HalLeaf) -> &'static str;

pub type HalLeafMeta = Metadata<(), (ObjectMeta, NotifierMeta)>;

#[repr(C)]
pub struct HalLeaf {
    header: Header<HalLeafMeta>,
    pub object: Object,
    pub notifier: Notifier,
    slot: HalSlot<LeafFn>,
    pub tag: u32,
}

pub static HAL_LEAF_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<HalLeaf>(HAL_LEAF_ID, "HalLeaf"),
    create_fn: Some(create_dynamic::<HalLeaf>),
    cast_info: &HAL_LEAF_CAST,
    export_info: &ExportInfo::EMPTY,
};

static HAL_LEAF_META: HalLeafMeta = Metadata {
    rtti: Rtti {
        class_def: &HAL_LEAF_DEF,
        dtor: Some(destruct_dynamic::<HalLeaf>),
        offset: 0,
    },
    vtable: (),
    base: (
        Metadata {
            rtti: Rtti {
                class_def: &object::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: core::mem::offset_of!(HalLeaf, object),
            },
            vtable: (),
            base: (),
        },
        Metadata {
            rtti: Rtti {
                class_def: &notifier::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: core::mem::offset_of!(HalLeaf, notifier),
            },
            vtable: (),
            base: (),
        },
    ),
};

static HAL_LEAF_CAST: CastInfo = CastInfo {
    relatives: &[
        &HAL_LEAF_META.rtti,
        &HAL_LEAF_META.base.0.rtti,
        &HAL_LEAF_META.base.1.rtti,
    ],
};

unsafe impl NvocClass for HalLeaf {
    fn class_def() -> &'static ClassDef {
        &HAL_LEAF_DEF
    }
}

nvoc::impl_static_cast!(HalLeaf => Object: object; Notifier: notifier);

fn impl_a(_this: &HalLeaf) -> &'static str {
    "implA"
}

fn impl_b(_this: &HalLeaf) -> &'static str {
    "implB"
}

static LEAF_GA100: HalImpl<LeafFn> = HalImpl::new("GA100", impl_a);
static LEAF_DEFAULT: HalImpl<LeafFn> = HalImpl::new("DEFAULT", impl_b);

fn resolve_leaf(spec: &HalSpec) -> &'static HalImpl<LeafFn> {
    match spec.chip {
        Chip::GA100 => &LEAF_GA100,
        _ => &LEAF_DEFAULT,
    }
}

impl HalLeaf {
    pub fn resolved(&self) -> NvResult<&'static str> {
        let resolved = self.slot.get()?;
        Ok(resolved(self))
    }

    pub fn slot_binding(&self) -> Option<&'static str> {
        self.slot.name()
    }
}

impl Construct for HalLeaf {
    type Args = u32;

    fn bind_halspec(parent: Option<ObjPtr<Dynamic>>, _tag: &u32) -> NvResult<Option<HalSpec>> {
        HalspecOwner::locate(parent).map(Some)
    }

    fn init(&mut self, halspec: Option<&HalSpec>) {
        self.header.set(&HAL_LEAF_META);
        self.object.init_level(&HAL_LEAF_META.base.0);
        self.notifier.init_level(&HAL_LEAF_META.base.1);
        if let Some(spec) = halspec {
            self.slot.bind(resolve_leaf(spec));
        }
    }

    fn construct(&mut self, _halspec: Option<&HalSpec>, tag: u32) -> NvResult<()> {
        self.object.ctor()?;
        if let Err(err) = self.notifier.ctor() {
            self.object.dtor();
            return Err(err);
        }
        self.tag = tag;
        record(tag, "HalLeaf.ctor");
        Ok(())
    }

    fn destruct(&mut self) {
        record(self.tag, "HalLeaf.dtor");
        self.notifier.dtor();
        self.object.dtor();
    }
}

// ============================================================================
// Exporter: RsResource with its own control table
// ============================================================================

pub const EXPORTER_ID: ClassId = ClassId(0xc0a020);

/// Needs `AccessRights::DEBUG`; writes [`DEBUG_MAGIC`]
pub const CTRL_DEBUG_ONLY: u32 = 0xc0a0_0010;
/// Declared but compiled out
pub const CTRL_COMPILED_OUT: u32 = 0xc0a0_0020;
/// Enabled unless [`GATED_FLAG`] is disabled
pub const CTRL_GATED: u32 = 0xc0a0_0030;

pub const GATED_FLAG: u32 = 0x100;
pub const DEBUG_MAGIC: u32 = 0xdeb6;

pub type ExporterMeta = Metadata<(), RsResourceMeta>;

#[repr(C)]
pub struct Exporter {
    header: Header<ExporterMeta>,
    pub resource: RsResource,
    pub null_calls: u32,
    pub gated_calls: u32,
}

static EXPORTER_EXPORTS: [ExportEntry; 4] = [
    ExportEntry {
        method_id: CTRL_CMD_NULL,
        name: "exporterCtrlCmdNull",
        access_rights: AccessRights::NONE,
        flags: ExportFlags::NONE,
        param_size: 0,
        func: Some(exporter_null),
        owner: &EXPORTER_DEF.info,
    },
    ExportEntry {
        method_id: CTRL_DEBUG_ONLY,
        name: "exporterCtrlCmdDebugOnly",
        access_rights: AccessRights::DEBUG,
        flags: ExportFlags::NONE,
        param_size: 4,
        func: Some(exporter_debug_only),
        owner: &EXPORTER_DEF.info,
    },
    ExportEntry {
        method_id: CTRL_COMPILED_OUT,
        name: "exporterCtrlCmdCompiledOut",
        access_rights: AccessRights::NONE,
        flags: ExportFlags::NONE,
        param_size: 0,
        func: None,
        owner: &EXPORTER_DEF.info,
    },
    ExportEntry {
        method_id: CTRL_GATED,
        name: "exporterCtrlCmdGated",
        access_rights: AccessRights::NONE,
        flags: ExportFlags::from_bits(GATED_FLAG),
        param_size: 0,
        func: Some(exporter_gated),
        owner: &EXPORTER_DEF.info,
    },
];

static EXPORTER_EXPORT_INFO: ExportInfo = ExportInfo {
    entries: &EXPORTER_EXPORTS,
};

pub static EXPORTER_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<Exporter>(EXPORTER_ID, "Exporter"),
    create_fn: Some(create_dynamic::<Exporter>),
    cast_info: &EXPORTER_CAST,
    export_info: &EXPORTER_EXPORT_INFO,
};

static EXPORTER_META: ExporterMeta = Metadata {
    rtti: Rtti {
        class_def: &EXPORTER_DEF,
        dtor: Some(destruct_dynamic::<Exporter>),
        offset: 0,
    },
    vtable: (),
    base: Metadata {
        rtti: Rtti {
            class_def: &resource::CLASS_DEF,
            dtor: Some(destruct_from_base),
            offset: core::mem::offset_of!(Exporter, resource),
        },
        vtable: (),
        base: Metadata {
            rtti: Rtti {
                class_def: &object::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: <Exporter as StaticCast<Object>>::OFFSET,
            },
            vtable: (),
            base: (),
        },
    },
};

static EXPORTER_CAST: CastInfo = CastInfo {
    relatives: &[
        &EXPORTER_META.rtti,
        &EXPORTER_META.base.rtti,
        &EXPORTER_META.base.base.rtti,
    ],
};

unsafe impl NvocClass for Exporter {
    fn class_def() -> &'static ClassDef {
        &EXPORTER_DEF
    }
}

nvoc::impl_static_cast!(Exporter => RsResource: resource);

// The Object inside RsResource is private to the runtime, so go through
// RsResource's own cast.
unsafe impl StaticCast<Object> for Exporter {
    const OFFSET: usize =
        core::mem::offset_of!(Exporter, resource) + <RsResource as StaticCast<Object>>::OFFSET;

    fn upcast(&self) -> &Object {
        self.resource.upcast()
    }

    fn upcast_mut(&mut self) -> &mut Object {
        self.resource.upcast_mut()
    }
}

fn exporter_null(obj: ObjPtr<Dynamic>, _params: &mut [u8]) -> NvResult<()> {
    let mut exporter = obj.cast::<Exporter>();
    exporter.null_calls += 1;
    Ok(())
}

fn exporter_debug_only(_obj: ObjPtr<Dynamic>, params: &mut [u8]) -> NvResult<()> {
    write_param_u32(params, 0, DEBUG_MAGIC)
}

fn exporter_gated(obj: ObjPtr<Dynamic>, _params: &mut [u8]) -> NvResult<()> {
    let mut exporter = obj.cast::<Exporter>();
    exporter.gated_calls += 1;
    Ok(())
}

impl Construct for Exporter {
    type Args = ResourceArgs;

    fn init(&mut self, _halspec: Option<&HalSpec>) {
        self.header.set(&EXPORTER_META);
        self.resource.init_level(&EXPORTER_META.base);
    }

    fn construct(&mut self, _halspec: Option<&HalSpec>, args: ResourceArgs) -> NvResult<()> {
        self.resource.ctor(&args)
    }

    fn destruct(&mut self) {
        self.resource.dtor();
    }
}

// ============================================================================
// Allocators
// ============================================================================

/// System allocator that counts what passes through it
#[derive(Default)]
pub struct CountingAllocator {
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl CountingAllocator {
    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.allocs() - self.frees()
    }
}

impl ObjAllocator for CountingAllocator {
    fn alloc_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = SystemAllocator.alloc_zeroed(layout)?;
        self.allocs.fetch_add(1, Ordering::SeqCst);
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        SystemAllocator.free(ptr, layout);
    }
}

/// Allocator that is always out of memory
pub struct ExhaustedAllocator;

impl ObjAllocator for ExhaustedAllocator {
    fn alloc_zeroed(&self, _layout: Layout) -> Option<NonNull<u8>> {
        None
    }

    unsafe fn free(&self, _ptr: NonNull<u8>, _layout: Layout) {
        unreachable!("nothing was ever allocated");
    }
}

/// Storage aligned for any test class
#[repr(C, align(16))]
pub struct Storage<const N: usize>(pub [u8; N]);

impl<const N: usize> Storage<N> {
    pub fn new() -> Self {
        Self([0xa5; N])
    }
}
