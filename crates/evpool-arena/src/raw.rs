//! Low-level primitives for block memory.
//!
//! [`RawRegion`] owns one system allocation and releases it on drop. It is
//! the only place in the crate that talks to the global allocator.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{PoolError, Result};

/// An exclusively owned, uninitialised allocation.
pub(crate) struct RawRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl RawRegion {
    /// Allocate a region for `layout`.
    ///
    /// `layout` must have a non-zero size; block layouts always include a
    /// header, so this holds for every caller.
    pub(crate) fn allocate(layout: Layout) -> Result<Self> {
        debug_assert!(layout.size() > 0, "zero-sized block region");
        // SAFETY: the layout has a non-zero size (asserted above and
        // guaranteed by the header that precedes every element run).
        let ptr = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or(PoolError::AllocationFailed {
            bytes: layout.size(),
            align: layout.align(),
        })?;
        Ok(Self { ptr, layout })
    }

    /// Base address of the region.
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Layout the region was allocated with.
    pub(crate) fn layout(&self) -> Layout {
        self.layout
    }
}

impl Drop for RawRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `alloc::alloc` with exactly this layout
        // and is released only here.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: the region is plain bytes owned by exactly one `RawRegion`.
// Whether the values placed in it may cross threads is decided by the
// typed layer above.
unsafe impl Send for RawRegion {}
