//! OBJENGSTATE: abstract engine state machine
//!
//! Every engine object walks the same sequence of hooks driven by the GPU
//! state machine:
//!
//! ```text
//! construct_engine -> state_init_locked -> state_load -> state_post_load
//!                                              ^                |
//!                                              +-- state_unload <+
//! state_destroy (from any state after construction)
//! ```
//!
//! The hooks are virtual. Their slots live in the `OBJENGSTATE` level's
//! vtable and are typed against `ObjPtr<EngState>`, so engines that override
//! a hook install a down-thunk there.

use log::debug;

use crate::error::{NvResult, NvocError};
use crate::export::ExportInfo;
use crate::ptr::ObjPtr;
use crate::rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Header, Metadata, NvocClass, Rtti};

use super::object::{self, Object, ObjectMeta};

/// Class id of `OBJENGSTATE`
pub const ENGSTATE_CLASS_ID: ClassId = ClassId(0x7a7ed6);

/// Engine descriptor
pub type EngDesc = u32;

/// Virtual methods of the `OBJENGSTATE` level
pub struct EngStateVtable {
    /// Construct engine-specific state
    pub construct_engine: fn(ObjPtr<EngState>, EngDesc) -> NvResult<()>,
    /// Initialise with the GPU lock held
    pub state_init_locked: fn(ObjPtr<EngState>) -> NvResult<()>,
    /// Load engine state
    pub state_load: fn(ObjPtr<EngState>, u32) -> NvResult<()>,
    /// Finish loading once every engine is loaded
    pub state_post_load: fn(ObjPtr<EngState>, u32) -> NvResult<()>,
    /// Unload engine state
    pub state_unload: fn(ObjPtr<EngState>, u32) -> NvResult<()>,
    /// Release engine-specific state
    pub state_destroy: fn(ObjPtr<EngState>),
    /// True if the engine exists on this GPU
    pub is_present: fn(ObjPtr<EngState>) -> bool,
}

/// Metadata of the `OBJENGSTATE` level
pub type EngStateMeta = Metadata<EngStateVtable, ObjectMeta>;

/// Position in the engine state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EngineState {
    /// Created, no hook has run
    Undefined = 0,
    /// `construct_engine` succeeded
    Constructed = 1,
    /// `state_init_locked` succeeded
    Initialized = 2,
    /// `state_load` succeeded
    Loaded = 3,
    /// `state_post_load` succeeded
    PostLoaded = 4,
    /// `state_unload` succeeded
    Unloaded = 5,
    /// `state_destroy` ran
    Destroyed = 6,
}

/// Engine state base
#[repr(C)]
pub struct EngState {
    header: Header<EngStateMeta>,
    pub(crate) object: Object,
    eng_desc: EngDesc,
    state: EngineState,
}

/// Class descriptor of `OBJENGSTATE`
pub static CLASS_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<EngState>(ENGSTATE_CLASS_ID, "OBJENGSTATE"),
    create_fn: None,
    cast_info: &CAST_INFO,
    export_info: &ExportInfo::EMPTY,
};

static RTTI: Rtti = Rtti {
    class_def: &CLASS_DEF,
    dtor: None,
    offset: 0,
};

static OBJECT_RTTI: Rtti = Rtti {
    class_def: &object::CLASS_DEF,
    dtor: None,
    offset: core::mem::offset_of!(EngState, object),
};

static CAST_INFO: CastInfo = CastInfo {
    relatives: &[&RTTI, &OBJECT_RTTI],
};

unsafe impl NvocClass for EngState {
    fn class_def() -> &'static ClassDef {
        &CLASS_DEF
    }
}

crate::impl_static_cast!(EngState => Object: object);

impl EngState {
    /// Install the level's metadata and its bases'
    pub fn init_level(&mut self, meta: &'static EngStateMeta) {
        self.header.set(meta);
        self.object.init_level(&meta.base);
    }

    /// Construct the `Object` base, then this level
    pub fn ctor(&mut self) -> NvResult<()> {
        self.object.ctor()?;
        self.state = EngineState::Undefined;
        Ok(())
    }

    /// Destruct this level, then the `Object` base
    pub fn dtor(&mut self) {
        if !matches!(self.state, EngineState::Undefined | EngineState::Destroyed) {
            debug!("engine {} destructed in state {:?}", self.eng_desc, self.state);
        }
        self.object.dtor();
    }

    /// Current position in the state machine
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Engine descriptor recorded by `construct_engine`
    pub fn eng_desc(&self) -> EngDesc {
        self.eng_desc
    }

    fn vtable(&self) -> NvResult<&'static EngStateVtable> {
        self.header
            .get()
            .map(|meta| &meta.vtable)
            .ok_or(NvocError::InvalidState)
    }

    fn expect_state(&self, allowed: &[EngineState], hook: &str) -> NvResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            debug!("engine {}: {} in state {:?}", self.eng_desc, hook, self.state);
            Err(NvocError::InvalidState)
        }
    }

    /// Run the `construct_engine` hook
    pub fn construct_engine(mut this: ObjPtr<EngState>, eng_desc: EngDesc) -> NvResult<()> {
        this.expect_state(&[EngineState::Undefined], "construct_engine")?;
        (this.vtable()?.construct_engine)(this, eng_desc)?;
        this.eng_desc = eng_desc;
        this.state = EngineState::Constructed;
        Ok(())
    }

    /// Run the `state_init_locked` hook
    pub fn state_init_locked(mut this: ObjPtr<EngState>) -> NvResult<()> {
        this.expect_state(&[EngineState::Constructed], "state_init_locked")?;
        (this.vtable()?.state_init_locked)(this)?;
        this.state = EngineState::Initialized;
        Ok(())
    }

    /// Run the `state_load` hook
    pub fn state_load(mut this: ObjPtr<EngState>, flags: u32) -> NvResult<()> {
        this.expect_state(
            &[EngineState::Initialized, EngineState::Unloaded],
            "state_load",
        )?;
        (this.vtable()?.state_load)(this, flags)?;
        this.state = EngineState::Loaded;
        Ok(())
    }

    /// Run the `state_post_load` hook
    pub fn state_post_load(mut this: ObjPtr<EngState>, flags: u32) -> NvResult<()> {
        this.expect_state(&[EngineState::Loaded], "state_post_load")?;
        (this.vtable()?.state_post_load)(this, flags)?;
        this.state = EngineState::PostLoaded;
        Ok(())
    }

    /// Run the `state_unload` hook
    pub fn state_unload(mut this: ObjPtr<EngState>, flags: u32) -> NvResult<()> {
        this.expect_state(
            &[EngineState::Loaded, EngineState::PostLoaded],
            "state_unload",
        )?;
        (this.vtable()?.state_unload)(this, flags)?;
        this.state = EngineState::Unloaded;
        Ok(())
    }

    /// Run the `state_destroy` hook
    pub fn state_destroy(mut this: ObjPtr<EngState>) -> NvResult<()> {
        if matches!(this.state, EngineState::Undefined | EngineState::Destroyed) {
            return Err(NvocError::InvalidState);
        }
        (this.vtable()?.state_destroy)(this);
        this.state = EngineState::Destroyed;
        Ok(())
    }

    /// Run the `is_present` hook
    pub fn is_present(this: ObjPtr<EngState>) -> NvResult<bool> {
        Ok((this.vtable()?.is_present)(this))
    }
}

/// Base implementations installed by engines that do not override a hook
pub mod base {
    use super::{EngDesc, EngState};
    use crate::error::NvResult;
    use crate::ptr::ObjPtr;

    /// Nothing to construct
    pub fn construct_engine(_this: ObjPtr<EngState>, _eng_desc: EngDesc) -> NvResult<()> {
        Ok(())
    }

    /// Nothing to initialise
    pub fn state_init_locked(_this: ObjPtr<EngState>) -> NvResult<()> {
        Ok(())
    }

    /// Nothing to load
    pub fn state_load(_this: ObjPtr<EngState>, _flags: u32) -> NvResult<()> {
        Ok(())
    }

    /// Nothing to finish
    pub fn state_post_load(_this: ObjPtr<EngState>, _flags: u32) -> NvResult<()> {
        Ok(())
    }

    /// Nothing to unload
    pub fn state_unload(_this: ObjPtr<EngState>, _flags: u32) -> NvResult<()> {
        Ok(())
    }

    /// Nothing to release
    pub fn state_destroy(_this: ObjPtr<EngState>) {}

    /// Engines are present unless they override this
    pub fn is_present(_this: ObjPtr<EngState>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::gpu::{Gpu, GpuArgs};
    use crate::classes::kernel_bif::KernelBif;
    use crate::hal::{Chip, DispIpVersion, HalSpec, RmVariant};
    use crate::lifecycle::{obj_create, obj_delete, CreateFlags};
    use crate::rtti::cast::static_cast;

    #[test]
    fn test_abstract_class_def() {
        let def = EngState::class_def();
        assert!(def.is_abstract());
        assert_eq!(def.name(), "OBJENGSTATE");
        assert!(def.derives_from(object::OBJECT_CLASS_ID));
    }

    #[test]
    fn test_state_machine_order() {
        let spec = HalSpec::new(Chip::AD104, RmVariant::PfKernelOnly, DispIpVersion::V04_04);
        let gpu = obj_create::<Gpu>(None, CreateFlags::NONE, GpuArgs::new(spec, 0)).unwrap();
        let bif = obj_create::<KernelBif>(Some(gpu.as_dynamic()), CreateFlags::NONE, ()).unwrap();
        let engstate = static_cast::<EngState, _>(bif);

        assert_eq!(
            EngState::state_load(engstate, 0).unwrap_err(),
            NvocError::InvalidState
        );
        EngState::construct_engine(engstate, 2).unwrap();
        EngState::state_init_locked(engstate).unwrap();
        EngState::state_load(engstate, 0).unwrap();
        EngState::state_post_load(engstate, 0).unwrap();
        assert_eq!(engstate.state(), EngineState::PostLoaded);
        EngState::state_unload(engstate, 0).unwrap();
        EngState::state_load(engstate, 0).unwrap();
        EngState::state_destroy(engstate).unwrap();
        assert_eq!(engstate.state(), EngineState::Destroyed);
        assert_eq!(engstate.eng_desc(), 2);

        unsafe {
            obj_delete(bif).unwrap();
            obj_delete(gpu).unwrap();
        }
    }
}
