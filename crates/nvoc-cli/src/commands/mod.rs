//! Subcommand implementations

pub mod cast_graph;
pub mod check;
pub mod classes;
pub mod dispatch;
pub mod exports;
pub mod hal;

use std::path::Path;

use anyhow::{bail, Context as _};
use log::{debug, warn};
use nvoc::{obj_delete, ClassDef, ClassId, ClassRegistry, NvocClass, ObjPtr, RuntimeConfig};
use termcolor::ColorChoice;

use crate::output::StyledOutput;

/// State shared by every subcommand
pub struct Context {
    pub config: RuntimeConfig,
    pub out: StyledOutput,
}

impl Context {
    pub fn new(config: RuntimeConfig, choice: ColorChoice) -> Self {
        Self {
            config,
            out: StyledOutput::new(choice),
        }
    }
}

/// Load `path`, or fall back to `nvoc.toml` in the working directory, or the
/// defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => {
            let local = Path::new("nvoc.toml");
            if local.exists() {
                debug!("using {}", local.display());
                RuntimeConfig::from_file(local).context("loading nvoc.toml")
            } else {
                Ok(RuntimeConfig::default())
            }
        }
    }
}

/// Resolve a class by name or by id (`0x...` or decimal).
pub fn find_class(registry: &ClassRegistry, query: &str) -> anyhow::Result<&'static ClassDef> {
    if let Some(def) = registry.get_by_name(query) {
        return Ok(def);
    }
    let id = match query.strip_prefix("0x").or_else(|| query.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => query.parse::<u32>().ok(),
    };
    match id.and_then(|id| registry.get(ClassId(id))) {
        Some(def) => Ok(def),
        None => bail!("unknown class '{}'", query),
    }
}

/// Object created for the duration of a command, deleted on drop
pub struct Owned<T: NvocClass>(pub ObjPtr<T>);

impl<T: NvocClass> Drop for Owned<T> {
    fn drop(&mut self) {
        // SAFETY: the pointer came from `obj_create` and is dropped once.
        if let Err(err) = unsafe { obj_delete(self.0) } {
            warn!("deleting {} failed: {}", T::class_def().name(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_find_class_by_name_and_id() {
        let registry = ClassRegistry::global().unwrap();
        assert_eq!(find_class(registry, "KernelBif").unwrap().name(), "KernelBif");
        assert_eq!(find_class(registry, "0xe0ac20").unwrap().name(), "Device");
        assert_eq!(
            find_class(registry, &0x497031u32.to_string()).unwrap().name(),
            "Object"
        );
        assert!(find_class(registry, "Nope").is_err());
        assert!(find_class(registry, "0xzz").is_err());
    }

    #[test]
    fn test_load_explicit_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[halspec]\nchip = \"GH100\"\nrm_variant = \"vf\"").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.halspec().unwrap().chip, nvoc::Chip::GH100);

        let missing = load_config(Some(Path::new("/nonexistent/nvoc.toml")));
        assert!(missing.is_err());
    }
}
