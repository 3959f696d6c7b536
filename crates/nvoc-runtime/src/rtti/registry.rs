//! Class registry
//!
//! Immutable lookup from class id and class name to the process-wide
//! [`ClassDef`]. Registries are assembled with [`ClassRegistryBuilder`]; the
//! built-in hierarchy is available through [`ClassRegistry::global`].

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use super::{ClassDef, ClassId, NvocClass};
use crate::error::{NvResult, NvocError};

/// Registry of class descriptors
#[derive(Debug)]
pub struct ClassRegistry {
    by_id: FxHashMap<ClassId, &'static ClassDef>,
    by_name: FxHashMap<&'static str, ClassId>,
    /// Registration order
    order: Vec<&'static ClassDef>,
}

static GLOBAL: Lazy<NvResult<ClassRegistry>> =
    Lazy::new(|| ClassRegistry::from_defs(crate::classes::builtin_classes()));

impl ClassRegistry {
    /// Create a registry builder
    pub fn builder() -> ClassRegistryBuilder {
        ClassRegistryBuilder {
            defs: Vec::new(),
        }
    }

    /// Build a registry from `defs`, in order
    pub fn from_defs(defs: &[&'static ClassDef]) -> NvResult<ClassRegistry> {
        defs.iter()
            .fold(ClassRegistry::builder(), |builder, def| builder.register(def))
            .build()
    }

    /// Registry of the built-in class hierarchy, built on first use.
    ///
    /// A colliding built-in table is reported on every call.
    pub fn global() -> NvResult<&'static ClassRegistry> {
        GLOBAL.as_ref().map_err(|err| *err)
    }

    /// Get a class by id
    pub fn get(&self, class_id: ClassId) -> Option<&'static ClassDef> {
        self.by_id.get(&class_id).copied()
    }

    /// Get a class by name
    pub fn get_by_name(&self, name: &str) -> Option<&'static ClassDef> {
        self.by_name.get(name).and_then(|id| self.get(*id))
    }

    /// Check if a class is registered
    pub fn contains(&self, class_id: ClassId) -> bool {
        self.by_id.contains_key(&class_id)
    }

    /// Iterate over classes in registration order
    pub fn iter(&self) -> impl Iterator<Item = &'static ClassDef> + '_ {
        self.order.iter().copied()
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Builder for [`ClassRegistry`]
pub struct ClassRegistryBuilder {
    defs: Vec<&'static ClassDef>,
}

impl ClassRegistryBuilder {
    /// Register a class descriptor
    pub fn register(mut self, def: &'static ClassDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Register the descriptor of `T`
    pub fn register_class<T: NvocClass>(self) -> Self {
        self.register(T::class_def())
    }

    /// Build the registry, rejecting duplicate ids or names
    pub fn build(self) -> NvResult<ClassRegistry> {
        let mut registry = ClassRegistry {
            by_id: FxHashMap::default(),
            by_name: FxHashMap::default(),
            order: Vec::with_capacity(self.defs.len()),
        };

        for def in self.defs {
            if registry.by_id.contains_key(&def.id()) {
                log::warn!("duplicate class id {} ({})", def.id(), def.name());
                return Err(NvocError::InvalidClass);
            }
            if registry.by_name.contains_key(def.name()) {
                log::warn!("duplicate class name {}", def.name());
                return Err(NvocError::InvalidClass);
            }
            registry.by_id.insert(def.id(), def);
            registry.by_name.insert(def.name(), def.id());
            registry.order.push(def);
        }

        Ok(registry)
    }
}
