//! Class identity and run-time type information
//!
//! Each class publishes one immutable [`ClassDef`] for the life of the
//! process. The definition names the class, records its size, points at the
//! dynamic creation entry point (absent for abstract classes), the cast graph
//! ([`CastInfo`]) and the export table.
//!
//! The cast graph lists the class itself followed by every ancestor embedded in
//! it, each as an [`Rtti`] entry carrying the byte offset of that ancestor
//! inside the most-derived object and the destructor entry point used when
//! destruction starts from that level.
//!
//! Per-level metadata ([`Metadata`]) wraps an `Rtti` together with the level's
//! vtable and the nested metadata of its own bases, mirroring the object
//! layout. A level's [`Header`] points at its metadata; because `rtti` is the
//! first field, the same word read through [`Dynamic`] yields the `Rtti`.

pub mod cast;
pub mod registry;

use std::fmt;

use crate::export::ExportInfo;
use crate::lifecycle::DynamicCreateFn;
use crate::ptr::ObjPtr;

/// Stable numeric class identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08x}", self.0)
    }
}

/// Size and identity of a class
#[derive(Debug, Clone, Copy)]
pub struct ClassInfo {
    /// Size of the most-derived struct in bytes
    pub size: usize,
    /// Alignment of the most-derived struct
    pub align: usize,
    /// Class identity
    pub class_id: ClassId,
    /// Class name (debug only)
    pub name: &'static str,
}

impl ClassInfo {
    /// Class info for the struct `T`
    pub const fn of<T>(class_id: ClassId, name: &'static str) -> Self {
        Self {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            class_id,
            name,
        }
    }
}

/// Destructor entry point recorded in the cast graph
pub type DtorFn = unsafe fn(ObjPtr<Dynamic>);

/// One entry in a class's cast graph
pub struct Rtti {
    /// Class of the sub-object at `offset`
    pub class_def: &'static ClassDef,
    /// Destructor reached from this level, `None` when destruction is
    /// handled structurally by the most-derived class
    pub dtor: Option<DtorFn>,
    /// Byte offset of this sub-object inside the most-derived object
    pub offset: usize,
}

impl Rtti {
    /// Class id of the sub-object
    #[inline]
    pub fn class_id(&self) -> ClassId {
        self.class_def.info.class_id
    }
}

impl fmt::Debug for Rtti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rtti")
            .field("class", &self.class_def.info.name)
            .field("offset", &self.offset)
            .field("has_dtor", &self.dtor.is_some())
            .finish()
    }
}

/// Ordered cast graph: the class itself first, then every embedded ancestor
pub struct CastInfo {
    /// Relatives in declaration order, self at index 0
    pub relatives: &'static [&'static Rtti],
}

impl CastInfo {
    /// Find the entry for `class_id`
    pub fn find(&self, class_id: ClassId) -> Option<&'static Rtti> {
        self.relatives
            .iter()
            .copied()
            .find(|rtti| rtti.class_id() == class_id)
    }

    /// Iterate over the relatives
    pub fn iter(&self) -> impl Iterator<Item = &'static Rtti> + '_ {
        self.relatives.iter().copied()
    }

    /// Number of relatives, self included
    pub fn len(&self) -> usize {
        self.relatives.len()
    }

    /// True for an empty graph (never the case for a registered class)
    pub fn is_empty(&self) -> bool {
        self.relatives.is_empty()
    }
}

impl fmt::Debug for CastInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.relatives.iter()).finish()
    }
}

/// Immutable per-class descriptor
pub struct ClassDef {
    /// Size and identity
    pub info: ClassInfo,
    /// Type-erased creation entry point, `None` for abstract classes
    pub create_fn: Option<DynamicCreateFn>,
    /// Cast graph
    pub cast_info: &'static CastInfo,
    /// Exported control methods declared by this class
    pub export_info: &'static ExportInfo,
}

impl ClassDef {
    /// Class id
    #[inline]
    pub fn id(&self) -> ClassId {
        self.info.class_id
    }

    /// Class name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.info.name
    }

    /// True when the class cannot be created on its own
    pub fn is_abstract(&self) -> bool {
        self.create_fn.is_none()
    }

    /// True if `class_id` is this class or one of its embedded ancestors
    pub fn derives_from(&self, class_id: ClassId) -> bool {
        self.cast_info.find(class_id).is_some()
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.info.name)
            .field("class_id", &self.info.class_id)
            .field("size", &self.info.size)
            .field("abstract", &self.is_abstract())
            .field("relatives", &self.cast_info.len())
            .field("exports", &self.export_info.entries.len())
            .finish()
    }
}

/// Static metadata for one level of a concrete class
///
/// `V` is the level's vtable of virtual methods, `B` the nested metadata of the
/// level's own bases (a single `Metadata`, a tuple of them, or `()`).
#[repr(C)]
pub struct Metadata<V: 'static, B: 'static = ()> {
    /// Cast-graph entry for this level
    pub rtti: Rtti,
    /// Virtual methods as seen from this level
    pub vtable: V,
    /// Metadata of the embedded bases
    pub base: B,
}

/// First field of every class struct: the level's metadata pointer
///
/// A zeroed header means the level has not been initialised (or the object
/// was deleted in place).
#[repr(transparent)]
pub struct Header<M: 'static>(Option<&'static M>);

impl<M: 'static> Header<M> {
    /// Metadata installed by initialisation
    #[inline]
    pub fn get(&self) -> Option<&'static M> {
        self.0
    }

    /// Install the metadata; called once per level during initialisation
    #[inline]
    pub fn set(&mut self, meta: &'static M) {
        self.0 = Some(meta);
    }

    /// True once initialisation has run
    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl<M: 'static> fmt::Debug for Header<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(meta) => write!(f, "Header({:p})", meta),
            None => f.write_str("Header(unset)"),
        }
    }
}

/// Any object viewed through its first word
#[repr(C)]
pub struct Dynamic {
    rtti: Option<&'static Rtti>,
}

impl Dynamic {
    /// Cast-graph entry of the level this pointer addresses
    #[inline]
    pub fn rtti(&self) -> Option<&'static Rtti> {
        self.rtti
    }
}

/// A class laid out for the runtime
///
/// # Safety
///
/// Implementors must guarantee that:
/// - the struct is `#[repr(C)]` and its first field is a [`Header`] whose
///   metadata type is a [`Metadata`] (so the header reads as `Option<&Rtti>`)
/// - every embedded ancestor is stored by value and recorded in the cast graph
///   at its `offset_of!` position
/// - the all-zero bit pattern is a valid value of the struct
pub unsafe trait NvocClass: Sized + 'static {
    /// The class descriptor
    fn class_def() -> &'static ClassDef;
}

impl<T: NvocClass> ObjPtr<T> {
    /// View the object through its metadata word
    #[inline]
    pub fn as_dynamic(self) -> ObjPtr<Dynamic> {
        self.cast()
    }
}
