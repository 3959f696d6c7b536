//! Pluggable object allocators
//!
//! Heap-mode creation asks an [`ObjAllocator`] for zeroed memory and hands it
//! back on rollback or deletion. In-place creation never reaches the
//! allocator.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Source of object memory
pub trait ObjAllocator: Sync {
    /// Allocate zero-filled memory for `layout`, or `None` when exhausted
    fn alloc_zeroed(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return memory obtained from [`ObjAllocator::alloc_zeroed`]
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this allocator with the same `layout` and must
    /// not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Allocator backed by the global Rust allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl ObjAllocator for SystemAllocator {
    fn alloc_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: the layout has a non-zero size.
        NonNull::new(unsafe { alloc_zeroed(layout) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        dealloc(ptr.as_ptr(), layout);
    }
}
