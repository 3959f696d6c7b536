//! Chip classifier
//!
//! Every supported chip is one variant of [`Chip`]; its discriminant is the
//! HAL variant index used by the halspec. HAL resolvers match on the enum, so
//! a chip added here without a resolver arm fails to compile.

use std::fmt;
use std::str::FromStr;

/// Chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChipFamily {
    /// TU10x, TU11x
    Turing,
    /// GA10x
    Ampere,
    /// AD10x
    Ada,
    /// GH100
    Hopper,
    /// GB1xx, GB2xx
    Blackwell,
    /// Tegra display-only SoCs
    Tegra,
}

impl ChipFamily {
    /// Family name
    pub fn name(&self) -> &'static str {
        match self {
            ChipFamily::Turing => "Turing",
            ChipFamily::Ampere => "Ampere",
            ChipFamily::Ada => "Ada",
            ChipFamily::Hopper => "Hopper",
            ChipFamily::Blackwell => "Blackwell",
            ChipFamily::Tegra => "Tegra",
        }
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Chip HAL variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum Chip {
    TU102 = 37,
    TU104 = 38,
    TU106 = 39,
    TU116 = 40,
    TU117 = 41,
    GA100 = 42,
    GA102 = 43,
    GA103 = 44,
    GA104 = 45,
    GA106 = 46,
    GA107 = 47,
    AD102 = 52,
    AD103 = 53,
    AD104 = 54,
    AD106 = 55,
    AD107 = 56,
    GH100 = 60,
    GB100 = 61,
    GB102 = 62,
    GB10B = 63,
    GB110 = 65,
    GB112 = 66,
    GB202 = 69,
    GB203 = 70,
    GB205 = 71,
    GB206 = 72,
    GB207 = 73,
    GB20B = 74,
    GB20C = 75,
    T234D = 108,
    T264D = 110,
}

impl Chip {
    /// All chips, in HAL variant index order
    pub const ALL: [Chip; 31] = [
        Chip::TU102,
        Chip::TU104,
        Chip::TU106,
        Chip::TU116,
        Chip::TU117,
        Chip::GA100,
        Chip::GA102,
        Chip::GA103,
        Chip::GA104,
        Chip::GA106,
        Chip::GA107,
        Chip::AD102,
        Chip::AD103,
        Chip::AD104,
        Chip::AD106,
        Chip::AD107,
        Chip::GH100,
        Chip::GB100,
        Chip::GB102,
        Chip::GB10B,
        Chip::GB110,
        Chip::GB112,
        Chip::GB202,
        Chip::GB203,
        Chip::GB205,
        Chip::GB206,
        Chip::GB207,
        Chip::GB20B,
        Chip::GB20C,
        Chip::T234D,
        Chip::T264D,
    ];

    /// HAL variant index
    #[inline]
    pub const fn hal_var_idx(self) -> u32 {
        self as u32
    }

    /// Decode a HAL variant index
    pub fn from_hal_var_idx(idx: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|chip| chip.hal_var_idx() == idx)
    }

    /// Family this chip belongs to
    pub const fn family(self) -> ChipFamily {
        match self {
            Chip::TU102 | Chip::TU104 | Chip::TU106 | Chip::TU116 | Chip::TU117 => {
                ChipFamily::Turing
            }
            Chip::GA100 | Chip::GA102 | Chip::GA103 | Chip::GA104 | Chip::GA106 | Chip::GA107 => {
                ChipFamily::Ampere
            }
            Chip::AD102 | Chip::AD103 | Chip::AD104 | Chip::AD106 | Chip::AD107 => ChipFamily::Ada,
            Chip::GH100 => ChipFamily::Hopper,
            Chip::GB100
            | Chip::GB102
            | Chip::GB10B
            | Chip::GB110
            | Chip::GB112
            | Chip::GB202
            | Chip::GB203
            | Chip::GB205
            | Chip::GB206
            | Chip::GB207
            | Chip::GB20B
            | Chip::GB20C => ChipFamily::Blackwell,
            Chip::T234D | Chip::T264D => ChipFamily::Tegra,
        }
    }

    /// Chip name
    pub fn name(self) -> &'static str {
        match self {
            Chip::TU102 => "TU102",
            Chip::TU104 => "TU104",
            Chip::TU106 => "TU106",
            Chip::TU116 => "TU116",
            Chip::TU117 => "TU117",
            Chip::GA100 => "GA100",
            Chip::GA102 => "GA102",
            Chip::GA103 => "GA103",
            Chip::GA104 => "GA104",
            Chip::GA106 => "GA106",
            Chip::GA107 => "GA107",
            Chip::AD102 => "AD102",
            Chip::AD103 => "AD103",
            Chip::AD104 => "AD104",
            Chip::AD106 => "AD106",
            Chip::AD107 => "AD107",
            Chip::GH100 => "GH100",
            Chip::GB100 => "GB100",
            Chip::GB102 => "GB102",
            Chip::GB10B => "GB10B",
            Chip::GB110 => "GB110",
            Chip::GB112 => "GB112",
            Chip::GB202 => "GB202",
            Chip::GB203 => "GB203",
            Chip::GB205 => "GB205",
            Chip::GB206 => "GB206",
            Chip::GB207 => "GB207",
            Chip::GB20B => "GB20B",
            Chip::GB20C => "GB20C",
            Chip::T234D => "T234D",
            Chip::T264D => "T264D",
        }
    }

    /// True for the pre-Hopper discrete families sharing the GM107-era bus
    /// interface
    pub const fn is_pre_hopper(self) -> bool {
        matches!(
            self.family(),
            ChipFamily::Turing | ChipFamily::Ampere | ChipFamily::Ada
        )
    }
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chip {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|chip| chip.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown chip '{}'", s))
    }
}
