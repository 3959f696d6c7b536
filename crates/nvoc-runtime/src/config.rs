//! Runtime configuration (nvoc.toml)
//!
//! Selects the halspec used when the tooling creates a GPU and the export
//! gating applied at dispatch time.
//!
//! ```toml
//! [halspec]
//! chip = "AD104"
//! rm_variant = "pf-kernel-only"
//! disp_ip = "v04_04"
//!
//! [exports]
//! disabled_flags = ["0x40000", 8]
//! granted_rights = "0x1"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::export::{AccessRights, ExportFlags};
use crate::hal::{Chip, DispIpVersion, HalSpec, RmVariant};

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Hardware classifiers
    #[serde(default)]
    pub halspec: HalspecConfig,

    /// Export gating
    #[serde(default)]
    pub exports: ExportConfig,
}

/// `[halspec]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HalspecConfig {
    /// Chip name, e.g. "GA100"
    #[serde(default = "default_chip")]
    pub chip: String,

    /// "pf-kernel-only" or "vf"
    #[serde(default = "default_rm_variant")]
    pub rm_variant: String,

    /// Display IP version, e.g. "v04_00" or "none"
    #[serde(default = "default_disp_ip")]
    pub disp_ip: String,
}

fn default_chip() -> String {
    "GA100".to_string()
}

fn default_rm_variant() -> String {
    "pf-kernel-only".to_string()
}

fn default_disp_ip() -> String {
    "v04_00".to_string()
}

impl Default for HalspecConfig {
    fn default() -> Self {
        Self {
            chip: default_chip(),
            rm_variant: default_rm_variant(),
            disp_ip: default_disp_ip(),
        }
    }
}

/// A mask written either as an integer or as a string ("0x40")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Mask {
    /// Plain integer
    Int(u32),
    /// Decimal or hex string
    Text(String),
}

impl Mask {
    /// Numeric value, `None` if the string does not parse
    pub fn value(&self) -> Option<u32> {
        match self {
            Mask::Int(value) => Some(*value),
            Mask::Text(text) => ExportFlags::from_str(text).map(|flags| flags.bits()),
        }
    }
}

/// `[exports]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Flag masks whose entries are disabled at dispatch
    #[serde(default)]
    pub disabled_flags: Vec<Mask>,

    /// Rights granted to the dispatcher's caller
    #[serde(default = "default_granted_rights")]
    pub granted_rights: Mask,
}

fn default_granted_rights() -> Mask {
    Mask::Int(0)
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            disabled_flags: Vec::new(),
            granted_rights: default_granted_rights(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.halspec()?;
        self.disabled_mask()?;
        self.granted_rights()?;
        Ok(())
    }

    /// Resolve the configured classifier names
    pub fn halspec(&self) -> Result<HalSpec, ConfigError> {
        let chip = self
            .halspec
            .chip
            .parse::<Chip>()
            .map_err(ConfigError::ValidationError)?;
        let rm_variant = self
            .halspec
            .rm_variant
            .parse::<RmVariant>()
            .map_err(ConfigError::ValidationError)?;
        let disp_ip = self
            .halspec
            .disp_ip
            .parse::<DispIpVersion>()
            .map_err(ConfigError::ValidationError)?;
        Ok(HalSpec::new(chip, rm_variant, disp_ip))
    }

    /// Union of every disabled flag mask
    pub fn disabled_mask(&self) -> Result<ExportFlags, ConfigError> {
        self.exports
            .disabled_flags
            .iter()
            .try_fold(ExportFlags::NONE, |acc, mask| {
                let value = mask.value().ok_or_else(|| {
                    ConfigError::ValidationError(format!("bad export flag mask {:?}", mask))
                })?;
                Ok(acc.union(ExportFlags::from_bits(value)))
            })
    }

    /// Rights granted to the dispatcher's caller
    pub fn granted_rights(&self) -> Result<AccessRights, ConfigError> {
        match &self.exports.granted_rights {
            Mask::Int(value) => Ok(AccessRights::from_bits(*value)),
            Mask::Text(text) => AccessRights::from_str(text).ok_or_else(|| {
                ConfigError::ValidationError(format!("bad access rights '{}'", text))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        let spec = config.halspec().unwrap();
        assert_eq!(spec.chip, Chip::GA100);
        assert_eq!(spec.rm_variant, RmVariant::PfKernelOnly);
        assert_eq!(spec.disp_ip, DispIpVersion::V04_00);
        assert_eq!(config.disabled_mask().unwrap(), ExportFlags::NONE);
        assert_eq!(config.granted_rights().unwrap(), AccessRights::NONE);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [halspec]
            chip = "gb202"
            rm_variant = "vf"
            disp_ip = "v05_00"

            [exports]
            disabled_flags = ["0x40000", 8]
            granted_rights = "DEBUG"
        "#;
        let config = RuntimeConfig::from_str(toml).unwrap();
        let spec = config.halspec().unwrap();
        assert_eq!(spec.chip, Chip::GB202);
        assert!(spec.is_vf());
        assert_eq!(config.disabled_mask().unwrap().bits(), 0x40008);
        assert_eq!(config.granted_rights().unwrap(), AccessRights::DEBUG);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config = RuntimeConfig::from_str("[halspec]\nchip = \"TU104\"\n").unwrap();
        assert_eq!(config.halspec.rm_variant, "pf-kernel-only");
        assert_eq!(config.halspec().unwrap().chip, Chip::TU104);
    }

    #[test]
    fn test_unknown_chip_rejected() {
        let err = RuntimeConfig::from_str("[halspec]\nchip = \"NV50\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_bad_mask_rejected() {
        let err = RuntimeConfig::from_str("[exports]\ndisabled_flags = [\"0xZZ\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = RuntimeConfig::from_str("[halspec\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[halspec]\nchip = \"GH100\"\ndisp_ip = \"none\"").unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        let spec = config.halspec().unwrap();
        assert_eq!(spec.chip, Chip::GH100);
        assert_eq!(spec.disp_ip, DispIpVersion::None);
    }

    #[test]
    fn test_missing_file() {
        let err = RuntimeConfig::from_file(Path::new("/nonexistent/nvoc.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
