//! Exported control methods
//!
//! Each class publishes an [`ExportInfo`]: its externally callable control
//! methods, sorted by method id. Lookup for an object walks the most-derived
//! class's cast graph self-first and stops at the first class declaring the
//! id, so a leaf entry shadows an ancestor entry with the same id.
//!
//! An entry is disabled when it has no function or when any of its flags is
//! in the caller's disabled mask. Disabled entries dispatch as
//! `NotSupported`; they are never an error in the table itself.

use std::fmt;

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::{NvResult, NvocError};
use crate::ptr::ObjPtr;
use crate::rtti::cast::{class_of, dynamic_cast_by_id};
use crate::rtti::{ClassDef, ClassInfo, Dynamic};

/// Control entry point; receives the owning class's sub-object
pub type ControlFn = fn(ObjPtr<Dynamic>, &mut [u8]) -> NvResult<()>;

/// Feature-gating flags on an export entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExportFlags(u32);

impl ExportFlags {
    /// No flags
    pub const NONE: Self = Self(0);

    /// Create from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Get raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True if any bit is shared with `other`
    pub const fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Union of flags
    pub const fn union(&self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Parse decimal or `0x`-prefixed hex
    pub fn from_str(s: &str) -> Option<Self> {
        parse_u32(s).map(Self)
    }
}

impl fmt::Display for ExportFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Access rights a caller must hold to invoke a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessRights(u32);

impl AccessRights {
    /// No rights required
    pub const NONE: Self = Self(0x0);
    /// Duplicate the object into another client
    pub const DUP_OBJECT: Self = Self(0x1);
    /// Change scheduling priority
    pub const NICE: Self = Self(0x2);
    /// Debugger access
    pub const DEBUG: Self = Self(0x4);
    /// Every known right
    pub const ALL: Self = Self(0x7);

    /// Create from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Get raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if every right in `other` is held
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of rights
    pub const fn union(&self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Parse a right name, `ALL`, or a numeric mask
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NONE" => Some(Self::NONE),
            "DUP_OBJECT" => Some(Self::DUP_OBJECT),
            "NICE" => Some(Self::NICE),
            "DEBUG" => Some(Self::DEBUG),
            "ALL" => Some(Self::ALL),
            _ => parse_u32(s).map(Self),
        }
    }
}

impl fmt::Display for AccessRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (right, name) in [
            (Self::DUP_OBJECT, "DUP_OBJECT"),
            (Self::NICE, "NICE"),
            (Self::DEBUG, "DEBUG"),
        ] {
            if self.contains(right) && right.0 != 0 {
                names.push(name);
            }
        }
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse::<u32>().ok(),
    }
}

/// One exported control method
pub struct ExportEntry {
    /// Numeric control id
    pub method_id: u32,
    /// Method name (debug only)
    pub name: &'static str,
    /// Rights required to invoke
    pub access_rights: AccessRights,
    /// Feature-gating flags
    pub flags: ExportFlags,
    /// Exact size of the parameter buffer
    pub param_size: u32,
    /// Implementation, `None` when compiled out
    pub func: Option<ControlFn>,
    /// Class that declares the entry
    pub owner: &'static ClassInfo,
}

impl ExportEntry {
    /// True unless compiled out or gated by `disabled`
    pub fn is_enabled(&self, disabled: ExportFlags) -> bool {
        self.func.is_some() && !self.flags.intersects(disabled)
    }
}

impl fmt::Debug for ExportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportEntry")
            .field("method_id", &format_args!("{:#x}", self.method_id))
            .field("name", &self.name)
            .field("access_rights", &self.access_rights)
            .field("flags", &self.flags)
            .field("param_size", &self.param_size)
            .field("has_func", &self.func.is_some())
            .field("owner", &self.owner.name)
            .finish()
    }
}

/// A class's export table, sorted by method id
#[derive(Debug)]
pub struct ExportInfo {
    /// Entries in method-id order
    pub entries: &'static [ExportEntry],
}

impl ExportInfo {
    /// Table of a class that exports nothing
    pub const EMPTY: ExportInfo = ExportInfo { entries: &[] };

    /// Find an entry declared by this class
    pub fn find(&self, method_id: u32) -> Option<&'static ExportEntry> {
        self.entries
            .binary_search_by_key(&method_id, |entry| entry.method_id)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the entry `method_id` resolves to for objects of `class_def`.
pub fn lookup_export(class_def: &ClassDef, method_id: u32) -> Option<&'static ExportEntry> {
    class_def
        .cast_info
        .iter()
        .find_map(|relative| relative.class_def.export_info.find(method_id))
}

/// Entries visible from `class_def` after shadowing, sorted by method id.
pub fn merged_exports(class_def: &ClassDef) -> Vec<&'static ExportEntry> {
    let mut seen: FxHashMap<u32, &'static ExportEntry> = FxHashMap::default();
    for relative in class_def.cast_info.iter() {
        for entry in relative.class_def.export_info.entries {
            seen.entry(entry.method_id).or_insert(entry);
        }
    }
    let mut merged: Vec<_> = seen.into_values().collect();
    merged.sort_by_key(|entry| entry.method_id);
    merged
}

/// Problem found in a class's export tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportIssue {
    /// A table is not sorted by method id
    Unsorted {
        /// Class whose own table is out of order
        class: &'static str,
        /// First id found out of order
        method_id: u32,
    },
    /// Two enabled entries share an id at the same level
    Duplicate {
        /// Class declaring both entries
        class: &'static str,
        /// The shared id
        method_id: u32,
    },
    /// An entry names a different class as its owner than the one declaring it
    WrongOwner {
        /// Class declaring the entry
        class: &'static str,
        /// The entry's id
        method_id: u32,
    },
}

impl fmt::Display for ExportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportIssue::Unsorted { class, method_id } => {
                write!(f, "{}: export table unsorted at {:#x}", class, method_id)
            }
            ExportIssue::Duplicate { class, method_id } => {
                write!(f, "{}: duplicate enabled export {:#x}", class, method_id)
            }
            ExportIssue::WrongOwner { class, method_id } => {
                write!(f, "{}: export {:#x} names another owner", class, method_id)
            }
        }
    }
}

/// Check every table reachable from `class_def`.
///
/// An id declared by both a class and one of its ancestors is a deliberate
/// override and is not reported.
pub fn validate_export_table(class_def: &ClassDef) -> Vec<ExportIssue> {
    let mut issues = Vec::new();
    for relative in class_def.cast_info.iter() {
        let def = relative.class_def;
        let entries = def.export_info.entries;
        for pair in entries.windows(2) {
            if pair[1].method_id < pair[0].method_id {
                issues.push(ExportIssue::Unsorted {
                    class: def.name(),
                    method_id: pair[1].method_id,
                });
            }
            if pair[1].method_id == pair[0].method_id
                && pair[0].func.is_some()
                && pair[1].func.is_some()
            {
                issues.push(ExportIssue::Duplicate {
                    class: def.name(),
                    method_id: pair[1].method_id,
                });
            }
        }
        for entry in entries {
            if entry.owner.class_id != def.id() {
                issues.push(ExportIssue::WrongOwner {
                    class: def.name(),
                    method_id: entry.method_id,
                });
            }
        }
    }
    issues
}

/// Read a little-endian `u32` from a parameter buffer
pub fn read_param_u32(params: &[u8], offset: usize) -> NvResult<u32> {
    offset
        .checked_add(4)
        .and_then(|end| params.get(offset..end))
        .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        .map(u32::from_le_bytes)
        .ok_or(NvocError::InvalidParamStruct)
}

/// Write a little-endian `u32` into a parameter buffer
pub fn write_param_u32(params: &mut [u8], offset: usize, value: u32) -> NvResult<()> {
    let slot = offset
        .checked_add(4)
        .and_then(|end| params.get_mut(offset..end))
        .ok_or(NvocError::InvalidParamStruct)?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Dispatch control `method_id` on `obj`.
///
/// Fails with `NotSupported` for unknown or disabled ids,
/// `InvalidParamStruct` when `params` is not exactly the declared size and
/// `InsufficientPermissions` when `granted` lacks a required right.
pub fn invoke_control(
    obj: ObjPtr<Dynamic>,
    method_id: u32,
    params: &mut [u8],
    granted: AccessRights,
    disabled: ExportFlags,
) -> NvResult<()> {
    let class_def = class_of(obj).ok_or(NvocError::InvalidState)?;
    let entry = lookup_export(class_def, method_id).ok_or_else(|| {
        debug!("{}: no control {:#x}", class_def.name(), method_id);
        NvocError::NotSupported
    })?;

    let func = match entry.func {
        Some(func) if !entry.flags.intersects(disabled) => func,
        _ => {
            debug!("{}: control {} disabled", class_def.name(), entry.name);
            return Err(NvocError::NotSupported);
        }
    };
    if params.len() != entry.param_size as usize {
        return Err(NvocError::InvalidParamStruct);
    }
    if !granted.contains(entry.access_rights) {
        return Err(NvocError::InsufficientPermissions);
    }

    let target = dynamic_cast_by_id(obj, entry.owner.class_id).ok_or(NvocError::InvalidState)?;
    debug!(
        "{}: control {} ({:#x}) via {}",
        class_def.name(),
        entry.name,
        method_id,
        entry.owner.name
    );
    func(target, params)
}
