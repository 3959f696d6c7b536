//! Object pointers
//!
//! This module provides `ObjPtr<T>`, the pointer type handed out by the
//! lifecycle manager and passed through casts, thunks and dispatch.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// A pointer to an object (or an embedded ancestor sub-object)
///
/// # Memory Layout
///
/// ```text
/// ┌─────────────────────────────────────────┐  ← most-derived object
/// │ header (leaf)                           │
/// ├─────────────────────────────────────────┤  ← ObjPtr<Ancestor> points here
/// │ header (ancestor)                       │
/// │ ancestor fields                         │
/// ├─────────────────────────────────────────┤
/// │ leaf fields                             │
/// └─────────────────────────────────────────┘
/// ```
///
/// # Safety
///
/// - The pointer carries no ownership; the creator owns the object until it
///   calls `obj_delete`
/// - Offsets applied with [`ObjPtr::byte_add`] / [`ObjPtr::byte_sub`] must stay
///   inside the same object, which the cast graph guarantees
pub struct ObjPtr<T: ?Sized> {
    ptr: NonNull<T>,
    _phantom: PhantomData<T>,
}

impl<T: ?Sized> ObjPtr<T> {
    /// Wrap a raw object pointer
    ///
    /// # Safety
    ///
    /// The pointer must point to a live object (or an ancestor embedded in one)
    /// for as long as the returned pointer is dereferenced.
    #[inline]
    pub unsafe fn new(ptr: NonNull<T>) -> Self {
        Self {
            ptr,
            _phantom: PhantomData,
        }
    }

    /// Get the raw pointer
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Get the underlying `NonNull`
    #[inline]
    pub fn as_non_null(&self) -> NonNull<T> {
        self.ptr
    }

    /// Get the address as usize (for hashing/comparison)
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as *const () as usize
    }
}

impl<T> ObjPtr<T> {
    /// Pointer to an object the caller already holds exclusively
    #[inline]
    pub fn from_mut(obj: &mut T) -> Self {
        Self {
            ptr: NonNull::from(obj),
            _phantom: PhantomData,
        }
    }

    /// Reinterpret the pointee type without moving the address
    #[inline]
    pub fn cast<U>(self) -> ObjPtr<U> {
        ObjPtr {
            ptr: self.ptr.cast(),
            _phantom: PhantomData,
        }
    }

    /// Move the pointer forward by `offset` bytes
    ///
    /// # Safety
    ///
    /// The result must stay within the object this pointer belongs to.
    #[inline]
    pub unsafe fn byte_add(self, offset: usize) -> Self {
        let raw = self.ptr.as_ptr().cast::<u8>().add(offset).cast::<T>();
        Self::new(NonNull::new_unchecked(raw))
    }

    /// Move the pointer backward by `offset` bytes
    ///
    /// # Safety
    ///
    /// The result must stay within the object this pointer belongs to.
    #[inline]
    pub unsafe fn byte_sub(self, offset: usize) -> Self {
        let raw = self.ptr.as_ptr().cast::<u8>().sub(offset).cast::<T>();
        Self::new(NonNull::new_unchecked(raw))
    }
}

// Clone creates a new pointer to the same object (shallow copy)
impl<T: ?Sized> Clone for ObjPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for ObjPtr<T> {}

// Equality based on pointer address
impl<T: ?Sized> PartialEq for ObjPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for ObjPtr<T> {}

impl<T: ?Sized> std::hash::Hash for ObjPtr<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized> Deref for ObjPtr<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized> DerefMut for ObjPtr<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: ?Sized> fmt::Debug for ObjPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjPtr({:#x})", self.addr())
    }
}

impl<T: ?Sized> fmt::Display for ObjPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjPtr({:#x})", self.addr())
    }
}

// Objects are read-only after construction; sharing the pointer is as safe as
// sharing a reference to the pointee.
unsafe impl<T: ?Sized + Sync> Send for ObjPtr<T> {}
unsafe impl<T: ?Sized + Sync> Sync for ObjPtr<T> {}
