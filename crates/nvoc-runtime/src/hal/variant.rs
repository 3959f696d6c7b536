//! Runtime-variant and display-IP classifiers

use std::fmt;
use std::str::FromStr;

/// Runtime variant the resource manager runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum RmVariant {
    /// SR-IOV virtual function guest
    Vf = 0,
    /// Physical function, kernel RM only (firmware client)
    PfKernelOnly = 1,
}

impl RmVariant {
    /// All variants
    pub const ALL: [RmVariant; 2] = [RmVariant::Vf, RmVariant::PfKernelOnly];

    /// HAL variant index
    #[inline]
    pub const fn hal_var_idx(self) -> u32 {
        self as u32
    }

    /// Decode a HAL variant index
    pub fn from_hal_var_idx(idx: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|variant| variant.hal_var_idx() == idx)
    }

    /// Configuration name
    pub fn name(self) -> &'static str {
        match self {
            RmVariant::Vf => "vf",
            RmVariant::PfKernelOnly => "pf-kernel-only",
        }
    }
}

impl fmt::Display for RmVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RmVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vf" => Ok(RmVariant::Vf),
            "pf-kernel-only" | "pf_kernel_only" | "pf" => Ok(RmVariant::PfKernelOnly),
            _ => Err(format!("unknown rm variant '{}'", s)),
        }
    }
}

/// Display engine IP version
///
/// The raw classifier is the IP version with the low half-word masked off,
/// e.g. `0x0400_0000` for v04_00. Zero means the chip has no display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum DispIpVersion {
    None,
    V04_00,
    V04_01,
    V04_02,
    V04_04,
    V05_00,
    V05_01,
}

impl DispIpVersion {
    /// All versions
    pub const ALL: [DispIpVersion; 7] = [
        DispIpVersion::None,
        DispIpVersion::V04_00,
        DispIpVersion::V04_01,
        DispIpVersion::V04_02,
        DispIpVersion::V04_04,
        DispIpVersion::V05_00,
        DispIpVersion::V05_01,
    ];

    /// Raw IP version value
    pub const fn ipver(self) -> u32 {
        match self {
            DispIpVersion::None => 0x0000_0000,
            DispIpVersion::V04_00 => 0x0400_0000,
            DispIpVersion::V04_01 => 0x0401_0000,
            DispIpVersion::V04_02 => 0x0402_0000,
            DispIpVersion::V04_04 => 0x0404_0000,
            DispIpVersion::V05_00 => 0x0500_0000,
            DispIpVersion::V05_01 => 0x0501_0000,
        }
    }

    /// Decode a raw IP version; the low half-word is ignored
    pub fn from_ipver(ipver: u32) -> Option<Self> {
        let masked = ipver & 0xFFFF_0000;
        Self::ALL.into_iter().find(|version| version.ipver() == masked)
    }

    /// Major IP version, zero when absent
    pub const fn major(self) -> u32 {
        self.ipver() >> 24
    }

    /// Configuration name
    pub fn name(self) -> &'static str {
        match self {
            DispIpVersion::None => "none",
            DispIpVersion::V04_00 => "v04_00",
            DispIpVersion::V04_01 => "v04_01",
            DispIpVersion::V04_02 => "v04_02",
            DispIpVersion::V04_04 => "v04_04",
            DispIpVersion::V05_00 => "v05_00",
            DispIpVersion::V05_01 => "v05_01",
        }
    }
}

impl fmt::Display for DispIpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DispIpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|version| version.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown display IP version '{}'", s))
    }
}
