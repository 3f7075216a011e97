//! Reserved Memory
//!
//! The error record regions must stay at a fixed physical address for the lifetime of the system and must not be
//! reused by the operating system. They are obtained from a [`ReservedMemory`] provider, which on UEFI is backed by
//! `EfiReservedMemoryType` page allocations.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::ptr::NonNull;

use altra_sdk::{base::uefi_pages_to_size, error::Result};
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// A page-granular reserved memory region owned by the holder.
#[derive(Debug)]
pub struct ReservedRegion {
    base: NonNull<u8>,
    pages: usize,
}

impl ReservedRegion {
    /// Wraps `pages` pages of memory at `base`, or returns `None` for a null base.
    ///
    /// ## Safety
    ///
    /// - `base` must point to `pages` pages of memory that stay mapped and unused by any other code until the region
    ///   is returned to its provider.
    pub unsafe fn from_raw_parts(base: *mut u8, pages: usize) -> Option<Self> {
        NonNull::new(base).map(|base| Self { base, pages })
    }

    /// Physical address of the region. Boot firmware runs identity mapped.
    pub fn address(&self) -> u64 {
        self.base.as_ptr() as u64
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn len(&self) -> usize {
        uefi_pages_to_size(self.pages)
    }

    pub fn is_empty(&self) -> bool {
        self.pages == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: The region is valid for `len` bytes and exclusively owned, per `from_raw_parts`.
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: The region is valid for `len` bytes and exclusively owned, per `from_raw_parts`.
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.len()) }
    }
}

/// Provider of reserved memory.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait ReservedMemory {
    /// Allocates `pages` pages of reserved memory. Fails with `OutOfResources` when no memory is available.
    fn allocate_pages(&self, pages: usize) -> Result<ReservedRegion>;

    /// Returns a region to the provider.
    ///
    /// The region must not be accessed after a successful return. On failure it stays owned by the caller.
    fn free_pages(&self, region: &ReservedRegion) -> Result<()>;
}

#[cfg(any(test, feature = "std"))]
pub use heap::HeapReservedMemory;

#[cfg(any(test, feature = "std"))]
mod heap {
    extern crate alloc;
    use alloc::{boxed::Box, vec};
    use core::cell::Cell;

    use altra_sdk::{
        base::uefi_pages_to_size,
        error::{EfiError, Result},
    };

    use super::{ReservedMemory, ReservedRegion};

    /// Heap-backed reserved memory that keeps allocation statistics, for host-based tests.
    ///
    /// Fresh allocations are filled with `0xA5` so that callers relying on zeroed memory are caught.
    #[derive(Debug, Default)]
    pub struct HeapReservedMemory {
        allocations: Cell<usize>,
        frees: Cell<usize>,
        fail_after: Cell<Option<usize>>,
        failing_frees: Cell<usize>,
    }

    impl HeapReservedMemory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fails every allocation after the first `count` successful ones.
        pub fn fail_after(&self, count: usize) {
            self.fail_after.set(Some(count));
        }

        /// Fails the next `count` calls to `free_pages`, leaving their regions allocated.
        pub fn fail_next_frees(&self, count: usize) {
            self.failing_frees.set(count);
        }

        pub fn allocations(&self) -> usize {
            self.allocations.get()
        }

        pub fn frees(&self) -> usize {
            self.frees.get()
        }

        /// Regions handed out and not yet returned.
        pub fn outstanding(&self) -> usize {
            self.allocations() - self.frees()
        }
    }

    impl ReservedMemory for HeapReservedMemory {
        fn allocate_pages(&self, pages: usize) -> Result<ReservedRegion> {
            if self.fail_after.get().is_some_and(|count| self.allocations() >= count) {
                return Err(EfiError::OutOfResources);
            }
            let memory = Box::leak(vec![0xA5u8; uefi_pages_to_size(pages)].into_boxed_slice());
            self.allocations.set(self.allocations() + 1);
            // SAFETY: The leaked allocation is valid and owned by the region until it is freed.
            unsafe { ReservedRegion::from_raw_parts(memory.as_mut_ptr(), pages) }.ok_or(EfiError::OutOfResources)
        }

        fn free_pages(&self, region: &ReservedRegion) -> Result<()> {
            if self.failing_frees.get() > 0 {
                self.failing_frees.set(self.failing_frees.get() - 1);
                return Err(EfiError::DeviceError);
            }
            let slice = core::ptr::slice_from_raw_parts_mut(region.as_ptr(), region.len());
            // SAFETY: The region was leaked from a boxed slice of the same length by `allocate_pages`.
            drop(unsafe { Box::from_raw(slice) });
            self.frees.set(self.frees() + 1);
            Ok(())
        }
    }
}
