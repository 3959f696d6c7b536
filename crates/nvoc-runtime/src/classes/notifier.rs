//! Event notification mixin
//!
//! `Notifier` is abstract and does not embed `Object`; classes compose it
//! next to their `Object` lineage. It keeps the list of event handles
//! registered against the owning resource.

use log::debug;

use crate::error::{NvResult, NvocError};
use crate::export::ExportInfo;
use crate::rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Header, Metadata, NvocClass, Rtti};

/// Class id of `Notifier`
pub const NOTIFIER_CLASS_ID: ClassId = ClassId(0xa8683b);

/// Maximum number of events a notifier tracks
pub const MAX_EVENTS: usize = 8;

/// Metadata of the `Notifier` level
pub type NotifierMeta = Metadata<()>;

/// Event notifier
#[repr(C)]
pub struct Notifier {
    header: Header<NotifierMeta>,
    events: [u32; MAX_EVENTS],
    event_count: u32,
    notify_count: u64,
}

/// Class descriptor of `Notifier`
pub static CLASS_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<Notifier>(NOTIFIER_CLASS_ID, "Notifier"),
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

unsafe impl NvocClass for Notifier {
    fn class_def() -> &'static ClassDef {
        &CLASS_DEF
    }
}

impl Notifier {
    /// Install the level's metadata
    pub fn init_level(&mut self, meta: &'static NotifierMeta) {
        self.header.set(meta);
    }

    /// Notifier constructor
    pub fn ctor(&mut self) -> NvResult<()> {
        Ok(())
    }

    /// Drops every registered event
    pub fn dtor(&mut self) {
        if self.event_count != 0 {
            debug!("notifier dropped {} registered events", self.event_count);
        }
        self.event_count = 0;
    }

    /// Register an event handle
    pub fn register_event(&mut self, handle: u32) -> NvResult<()> {
        if self.events().contains(&handle) {
            return Err(NvocError::InvalidArgument);
        }
        let slot = self
            .events
            .get_mut(self.event_count as usize)
            .ok_or(NvocError::NoMemory)?;
        *slot = handle;
        self.event_count += 1;
        Ok(())
    }

    /// Unregister an event handle
    pub fn unregister_event(&mut self, handle: u32) -> NvResult<()> {
        let count = self.event_count as usize;
        let idx = self.events[..count]
            .iter()
            .position(|&event| event == handle)
            .ok_or(NvocError::InvalidArgument)?;
        self.events.copy_within(idx + 1..count, idx);
        self.event_count -= 1;
        Ok(())
    }

    /// Registered event handles
    pub fn events(&self) -> &[u32] {
        &self.events[..self.event_count as usize]
    }

    /// Signal every registered event; returns how many were signalled
    pub fn notify(&mut self) -> usize {
        self.notify_count += 1;
        self.event_count as usize
    }

    /// Number of times [`Notifier::notify`] ran
    pub fn notify_count(&self) -> u64 {
        self.notify_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed() -> Box<Notifier> {
        // SAFETY: every field of Notifier is valid when zeroed.
        unsafe { Box::new(std::mem::zeroed()) }
    }

    #[test]
    fn test_register_and_unregister() {
        let mut notifier = zeroed();
        notifier.register_event(10).unwrap();
        notifier.register_event(20).unwrap();
        notifier.register_event(30).unwrap();
        assert_eq!(
            notifier.register_event(20).unwrap_err(),
            NvocError::InvalidArgument
        );

        notifier.unregister_event(20).unwrap();
        assert_eq!(notifier.events(), &[10, 30]);
        assert_eq!(notifier.notify(), 2);
        assert_eq!(notifier.notify_count(), 1);
    }

    #[test]
    fn test_event_capacity() {
        let mut notifier = zeroed();
        for handle in 0..MAX_EVENTS as u32 {
            notifier.register_event(handle + 1).unwrap();
        }
        assert_eq!(notifier.register_event(99).unwrap_err(), NvocError::NoMemory);
    }

    #[test]
    fn test_abstract() {
        assert!(Notifier::class_def().is_abstract());
        assert_eq!(Notifier::class_def().cast_info.len(), 1);
    }
}
