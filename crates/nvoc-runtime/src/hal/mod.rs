//! HAL variant resolution
//!
//! A [`HalSpec`] classifies the hardware an object subtree runs on along three
//! axes: chip, runtime variant and display IP version. Classes that dispatch
//! through the HAL hold one [`HalSlot`] per method; during initialisation each
//! slot is bound exactly once to a static [`HalImpl`] picked by a resolver
//! function that `match`es on the halspec.
//!
//! Resolvers are exhaustive matches over closed enums. A chip or variant with
//! no implementation is a compile error, and overlapping arms are rejected by
//! `deny(unreachable_patterns)` in the class modules, so resolution itself
//! cannot fail at run time.
//!
//! ```ignore
//! fn resolve_init_ltr(spec: &HalSpec) -> &'static HalImpl<InitLtrFn> {
//!     match spec.chip {
//!         Chip::GB202 | Chip::GB203 | Chip::GB205 | Chip::GB206 | Chip::GB207 => &INIT_LTR_GB202,
//!         _ => &INIT_LTR_STUB,
//!     }
//! }
//! ```

pub mod chip;
pub mod property;
pub mod variant;

pub use chip::{Chip, ChipFamily};
pub use property::{PdbProperty, PropertySet};
pub use variant::{DispIpVersion, RmVariant};

use std::fmt;

use log::debug;

use crate::error::{NvResult, NvocError};

/// Raw classifier values as supplied by the caller that creates a halspec
/// owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHalSpec {
    /// Chip HAL variant index
    pub chip: u32,
    /// Runtime-variant HAL variant index
    pub rm_variant: u32,
    /// Display IP version (low half-word ignored)
    pub disp_ipver: u32,
}

/// Decoded halspec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HalSpec {
    /// Chip classifier
    pub chip: Chip,
    /// Runtime-variant classifier
    pub rm_variant: RmVariant,
    /// Display IP classifier
    pub disp_ip: DispIpVersion,
}

impl HalSpec {
    /// Create a halspec from decoded classifiers
    pub const fn new(chip: Chip, rm_variant: RmVariant, disp_ip: DispIpVersion) -> Self {
        Self {
            chip,
            rm_variant,
            disp_ip,
        }
    }

    /// Decode raw classifiers, rejecting values no variant is listed for
    pub fn from_raw(raw: RawHalSpec) -> NvResult<Self> {
        let chip = Chip::from_hal_var_idx(raw.chip).ok_or_else(|| {
            debug!("no chip HAL variant {}", raw.chip);
            NvocError::NotSupported
        })?;
        let rm_variant = RmVariant::from_hal_var_idx(raw.rm_variant).ok_or_else(|| {
            debug!("no rm variant HAL variant {}", raw.rm_variant);
            NvocError::NotSupported
        })?;
        let disp_ip = DispIpVersion::from_ipver(raw.disp_ipver).ok_or_else(|| {
            debug!("no display IP HAL variant for {:#010x}", raw.disp_ipver);
            NvocError::NotSupported
        })?;
        Ok(Self::new(chip, rm_variant, disp_ip))
    }

    /// Encode back to raw classifiers
    pub const fn to_raw(&self) -> RawHalSpec {
        RawHalSpec {
            chip: self.chip.hal_var_idx(),
            rm_variant: self.rm_variant.hal_var_idx(),
            disp_ipver: self.disp_ip.ipver(),
        }
    }

    /// Chip family
    #[inline]
    pub const fn family(&self) -> ChipFamily {
        self.chip.family()
    }

    /// True when running as an SR-IOV virtual function
    #[inline]
    pub fn is_vf(&self) -> bool {
        self.rm_variant == RmVariant::Vf
    }
}

impl fmt::Display for HalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.chip, self.rm_variant, self.disp_ip)
    }
}

/// One concrete implementation of a HAL method
#[derive(Debug)]
pub struct HalImpl<F: 'static> {
    /// Variant tag, e.g. `GM107` or `VF`
    pub name: &'static str,
    /// The implementation
    pub func: F,
}

impl<F: 'static> HalImpl<F> {
    /// Declare an implementation
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

/// Per-instance binding of a HAL method
///
/// Zeroed (unbound) until initialisation binds it; never rebound afterwards.
#[repr(transparent)]
pub struct HalSlot<F: 'static>(Option<&'static HalImpl<F>>);

impl<F: Copy + 'static> HalSlot<F> {
    /// Bind the slot; called once during initialisation
    #[inline]
    pub fn bind(&mut self, imp: &'static HalImpl<F>) {
        debug_assert!(self.0.is_none(), "HAL slot bound twice");
        self.0 = Some(imp);
    }

    /// The bound implementation, `InvalidState` before initialisation
    #[inline]
    pub fn get(&self) -> NvResult<F> {
        self.0.map(|imp| imp.func).ok_or(NvocError::InvalidState)
    }

    /// The bound implementation record
    #[inline]
    pub fn binding(&self) -> Option<&'static HalImpl<F>> {
        self.0
    }

    /// Variant tag of the bound implementation
    pub fn name(&self) -> Option<&'static str> {
        self.0.map(|imp| imp.name)
    }

    /// True once bound
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.0.is_some()
    }
}

impl<F: 'static> fmt::Debug for HalSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(imp) => write!(f, "HalSlot({})", imp.name),
            None => f.write_str("HalSlot(unbound)"),
        }
    }
}

/// A named HAL binding, as reported by introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBinding {
    /// Method name
    pub method: &'static str,
    /// Bound variant tag, `None` if unbound
    pub variant: Option<&'static str>,
}

impl SlotBinding {
    /// Describe `slot` under the name `method`
    pub fn of<F: Copy + 'static>(method: &'static str, slot: &HalSlot<F>) -> Self {
        Self {
            method,
            variant: slot.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type ScaleFn = fn(u32) -> u32;

    fn double(x: u32) -> u32 {
        x * 2
    }

    static DOUBLE: HalImpl<ScaleFn> = HalImpl::new("DOUBLE", double);

    #[test]
    fn test_halspec_raw_round_trip() {
        let spec = HalSpec::new(Chip::AD104, RmVariant::Vf, DispIpVersion::V04_04);
        assert_eq!(HalSpec::from_raw(spec.to_raw()).unwrap(), spec);
        assert_eq!(spec.to_string(), "AD104/vf/v04_04");
    }

    #[test]
    fn test_halspec_rejects_unknown_classifiers() {
        let raw = RawHalSpec {
            chip: 36,
            rm_variant: 1,
            disp_ipver: 0,
        };
        assert_eq!(HalSpec::from_raw(raw).unwrap_err(), NvocError::NotSupported);

        let raw = RawHalSpec {
            chip: Chip::GA100.hal_var_idx(),
            rm_variant: 7,
            disp_ipver: 0,
        };
        assert_eq!(HalSpec::from_raw(raw).unwrap_err(), NvocError::NotSupported);

        let raw = RawHalSpec {
            chip: Chip::GA100.hal_var_idx(),
            rm_variant: 1,
            disp_ipver: 0x0301_0000,
        };
        assert_eq!(HalSpec::from_raw(raw).unwrap_err(), NvocError::NotSupported);
    }

    #[test]
    fn test_hal_slot_binding() {
        let mut slot: HalSlot<ScaleFn> = HalSlot(None);
        assert_eq!(slot.get().unwrap_err(), NvocError::InvalidState);
        assert!(!slot.is_bound());

        slot.bind(&DOUBLE);
        assert_eq!((slot.get().unwrap())(21), 42);
        assert_eq!(slot.name(), Some("DOUBLE"));
        assert_eq!(SlotBinding::of("scale", &slot).variant, Some("DOUBLE"));
    }
}
