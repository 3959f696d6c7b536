//! Root of every concrete class
//!
//! `Object` carries the create flags and the intrusive links that place an
//! object in the parent/child tree. Children are kept in a singly linked list
//! threaded through `next_sibling`, newest first.

use log::trace;

use crate::error::NvResult;
use crate::export::ExportInfo;
use crate::lifecycle::{create_dynamic, destruct_dynamic, Construct, CreateFlags};
use crate::ptr::ObjPtr;
use crate::rtti::cast::dynamic_cast_by_id;
use crate::rtti::{CastInfo, ClassDef, ClassId, ClassInfo, Dynamic, Header, Metadata, NvocClass, Rtti};
use crate::hal::HalSpec;

/// Class id of `Object`
pub const OBJECT_CLASS_ID: ClassId = ClassId(0x497031);

/// Metadata of the `Object` level
pub type ObjectMeta = Metadata<()>;

/// Base object
#[repr(C)]
pub struct Object {
    header: Header<ObjectMeta>,
    create_flags: CreateFlags,
    parent: Option<ObjPtr<Object>>,
    first_child: Option<ObjPtr<Object>>,
    next_sibling: Option<ObjPtr<Object>>,
}

/// Class descriptor of `Object`
pub static CLASS_DEF: ClassDef = ClassDef {
    info: ClassInfo::of::<Object>(OBJECT_CLASS_ID, "Object"),
    create_fn: Some(create_dynamic::<Object>),
    cast_info: &CAST_INFO,
    export_info: &ExportInfo::EMPTY,
};

static META: ObjectMeta = Metadata {
    rtti: Rtti {
        class_def: &CLASS_DEF,
        dtor: Some(destruct_dynamic::<Object>),
        offset: 0,
    },
    vtable: (),
    base: (),
};

static CAST_INFO: CastInfo = CastInfo {
    relatives: &[&META.rtti],
};

unsafe impl NvocClass for Object {
    fn class_def() -> &'static ClassDef {
        &CLASS_DEF
    }
}

/// Children of an object, newest first
pub struct Children {
    next: Option<ObjPtr<Object>>,
}

impl Iterator for Children {
    type Item = ObjPtr<Object>;

    fn next(&mut self) -> Option<ObjPtr<Object>> {
        let current = self.next?;
        self.next = current.next_sibling;
        Some(current)
    }
}

impl Object {
    /// Install the level's metadata
    pub fn init_level(&mut self, meta: &'static ObjectMeta) {
        self.header.set(meta);
    }

    /// Object constructor
    pub fn ctor(&mut self) -> NvResult<()> {
        Ok(())
    }

    /// Object destructor
    pub fn dtor(&mut self) {
        trace!("object dtor, flags {}", self.create_flags);
    }

    /// Flags the object was created with
    pub fn create_flags(&self) -> CreateFlags {
        self.create_flags
    }

    pub(crate) fn set_create_flags(&mut self, flags: CreateFlags) {
        self.create_flags = flags;
    }

    /// Parent in the object tree
    pub fn parent(&self) -> Option<ObjPtr<Object>> {
        self.parent
    }

    /// Iterate over the direct children
    pub fn children(&self) -> Children {
        Children {
            next: self.first_child,
        }
    }

    /// Link `child` under `parent`.
    ///
    /// # Safety
    ///
    /// Both objects must be live and `child` must not be linked anywhere.
    pub unsafe fn add_child(mut parent: ObjPtr<Object>, mut child: ObjPtr<Object>) {
        debug_assert!(child.parent.is_none(), "child already linked");
        child.parent = Some(parent);
        child.next_sibling = parent.first_child;
        parent.first_child = Some(child);
    }

    /// Unlink `child` from `parent`; false if it was not a child.
    ///
    /// # Safety
    ///
    /// Both objects and every child of `parent` must be live.
    pub unsafe fn remove_child(mut parent: ObjPtr<Object>, mut child: ObjPtr<Object>) -> bool {
        let mut prev: Option<ObjPtr<Object>> = None;
        let mut cursor = parent.first_child;
        while let Some(mut node) = cursor {
            if node == child {
                match prev {
                    Some(mut prev) => prev.next_sibling = node.next_sibling,
                    None => parent.first_child = node.next_sibling,
                }
                node.next_sibling = None;
                child.parent = None;
                return true;
            }
            prev = Some(node);
            cursor = node.next_sibling;
        }
        false
    }

    /// Detach every child of `obj`, leaving them as roots.
    ///
    /// # Safety
    ///
    /// `obj` and its children must be live.
    pub unsafe fn orphan_children(mut obj: ObjPtr<Object>) {
        let mut cursor = obj.first_child.take();
        while let Some(mut child) = cursor {
            cursor = child.next_sibling.take();
            child.parent = None;
        }
    }

    /// First ancestor (parent, grandparent, ...) that is a `class_id`,
    /// returned as that class's sub-object.
    pub fn find_ancestor_of_type(&self, class_id: ClassId) -> Option<ObjPtr<Dynamic>> {
        let mut cursor = self.parent;
        while let Some(ancestor) = cursor {
            if let Some(hit) = dynamic_cast_by_id(ancestor.as_dynamic(), class_id) {
                return Some(hit);
            }
            cursor = ancestor.parent;
        }
        None
    }

    /// Typed form of [`Object::find_ancestor_of_type`]
    pub fn find_ancestor<T: NvocClass>(&self) -> Option<ObjPtr<T>> {
        self.find_ancestor_of_type(T::class_def().id())
            .map(ObjPtr::cast)
    }
}

impl Construct for Object {
    type Args = ();

    fn init(&mut self, _halspec: Option<&HalSpec>) {
        self.init_level(&META);
    }

    fn construct(&mut self, _halspec: Option<&HalSpec>, _args: ()) -> NvResult<()> {
        self.ctor()
    }

    fn destruct(&mut self) {
        self.dtor();
    }
}
