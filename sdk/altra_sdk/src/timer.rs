//! Microsecond Stall Support
//!
//! Boot firmware has no blocking primitive; every wait is a busy-wait. Components that poll hardware take a
//! [`Stall`] implementation so that host tests can substitute a simulated clock.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Busy-wait delay.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait Stall {
    /// Stalls execution for at least `microseconds`.
    fn stall(&self, microseconds: u64);
}

impl<T: Stall + ?Sized> Stall for &T {
    fn stall(&self, microseconds: u64) {
        (**self).stall(microseconds)
    }
}

/// Stall implementation backed by the Arm generic timer.
///
/// Uses `CNTFRQ_EL0` and `CNTPCT_EL0`. On other architectures the stall degrades to a bounded spin hint loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericTimer;

impl GenericTimer {
    /// Returns the counter frequency in Hz.
    pub fn frequency(&self) -> u64 {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "aarch64")] {
                use aarch64_cpu::registers::{Readable, CNTFRQ_EL0};
                CNTFRQ_EL0.get()
            } else {
                crate::base::MICROSECONDS_PER_SECOND
            }
        }
    }

    /// Returns the current counter value.
    pub fn counter(&self) -> u64 {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "aarch64")] {
                use aarch64_cpu::registers::{Readable, CNTPCT_EL0};
                CNTPCT_EL0.get()
            } else {
                0
            }
        }
    }
}

impl Stall for GenericTimer {
    fn stall(&self, microseconds: u64) {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "aarch64")] {
                let ticks = microseconds.saturating_mul(self.frequency()) / crate::base::MICROSECONDS_PER_SECOND;
                let start = self.counter();
                while self.counter().wrapping_sub(start) < ticks {
                    core::hint::spin_loop();
                }
            } else {
                for _ in 0..microseconds {
                    core::hint::spin_loop();
                }
            }
        }
    }
}
