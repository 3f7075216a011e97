//! Data Cache Maintenance
//!
//! Memory handed to an agent outside of the coherency domain (the secure monitor reading through a non-cacheable
//! mapping, or a management processor) must be written back and invalidated before its address is published.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Data cache line size of the Neoverse N1 cores.
pub const DATA_CACHE_LINE_SIZE: u64 = 64;

/// Data cache maintenance by virtual address.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait CacheMaintenance {
    /// Writes back and invalidates every data cache line that overlaps `[address, address + length)`.
    fn invalidate_data_cache_range(&self, address: u64, length: usize);
}

impl<T: CacheMaintenance + ?Sized> CacheMaintenance for &T {
    fn invalidate_data_cache_range(&self, address: u64, length: usize) {
        (**self).invalidate_data_cache_range(address, length)
    }
}

/// Cache maintenance with `DC CIVAC` to the point of coherency.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArmCache;

impl CacheMaintenance for ArmCache {
    fn invalidate_data_cache_range(&self, address: u64, length: usize) {
        if length == 0 {
            return;
        }
        let start = address & !(DATA_CACHE_LINE_SIZE - 1);
        let end = address.saturating_add(length as u64);
        log::trace!(target: "cache", "Invalidating data cache range {:#X}..{:#X}", start, end);

        cfg_if::cfg_if! {
            if #[cfg(target_arch = "aarch64")] {
                use aarch64_cpu::asm::barrier;
                let mut line = start;
                while line < end {
                    // SAFETY: Cache maintenance by address does not change memory contents. Dirty lines reach
                    // memory before they are dropped.
                    unsafe { core::arch::asm!("dc civac, {}", in(reg) line, options(nostack, preserves_flags)) };
                    line += DATA_CACHE_LINE_SIZE;
                }
                barrier::dsb(barrier::SY);
                barrier::isb(barrier::SY);
            } else {
                core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
            }
        }
    }
}
