//! Secure Monitor Call (SMC) Support
//!
//! Implements calls that follow the Arm SMC Calling Convention (SMCCC). The secure monitor (TF-A) and the secure
//! partitions behind it are reached through the [`SecureMonitor`] seam.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// SMCCC return value for a successful call.
pub const SMCCC_SUCCESS: i64 = 0;
/// SMCCC return value for an unknown function identifier.
pub const SMCCC_NOT_SUPPORTED: i64 = -1;
/// SMCCC return value for invalid arguments.
pub const SMCCC_INVALID_PARAMETER: i64 = -3;

/// Arguments of a secure monitor call.
///
/// `function_id` is placed in `W0` and `args[n]` in `X(n + 1)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SmcArgs {
    pub function_id: u32,
    pub args: [u64; 7],
}

impl SmcArgs {
    /// Creates call arguments with every argument register zeroed.
    pub const fn new(function_id: u32) -> Self {
        Self { function_id, args: [0; 7] }
    }

    /// Sets argument register `X(index)`. Index 0 is the function identifier and is ignored.
    pub fn with_arg(mut self, index: usize, value: u64) -> Self {
        if index >= 1 && index <= 7 {
            self.args[index - 1] = value;
        }
        self
    }

    /// Returns argument register `X(index)` for `index` in `1..=7`.
    pub fn arg(&self, index: usize) -> u64 {
        if index >= 1 && index <= 7 { self.args[index - 1] } else { 0 }
    }
}

/// Result registers `X0..X3` of a secure monitor call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SmcReturn {
    pub x: [u64; 4],
}

impl SmcReturn {
    pub const fn new(x0: u64, x1: u64, x2: u64, x3: u64) -> Self {
        Self { x: [x0, x1, x2, x3] }
    }

    /// Returns `X0` interpreted as a signed SMCCC status.
    pub const fn status(&self) -> i64 {
        self.x[0] as i64
    }
}

impl From<i64> for SmcReturn {
    fn from(status: i64) -> Self {
        Self::new(status as u64, 0, 0, 0)
    }
}

/// A conduit to the secure monitor.
///
/// Calls are synchronous and not reentrant.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait SecureMonitor {
    /// Issues a secure monitor call and returns the result registers.
    fn call(&self, args: SmcArgs) -> SmcReturn;
}

impl<T: SecureMonitor + ?Sized> SecureMonitor for &T {
    fn call(&self, args: SmcArgs) -> SmcReturn {
        (**self).call(args)
    }
}

/// The `SMC #0` conduit used on Arm platforms.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArmSmc;

impl SecureMonitor for ArmSmc {
    fn call(&self, args: SmcArgs) -> SmcReturn {
        log::trace!(target: "smc", "SMC {:#010X} args {:X?}", args.function_id, args.args);
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "aarch64")] {
                let mut x0 = args.function_id as u64;
                let mut x1 = args.args[0];
                let mut x2 = args.args[1];
                let mut x3 = args.args[2];
                // SAFETY: SMCCC preserves X18 and above. X4-X17 may be clobbered by the callee.
                unsafe {
                    core::arch::asm!(
                        "smc #0",
                        inout("x0") x0,
                        inout("x1") x1,
                        inout("x2") x2,
                        inout("x3") x3,
                        inout("x4") args.args[3] => _,
                        inout("x5") args.args[4] => _,
                        inout("x6") args.args[5] => _,
                        inout("x7") args.args[6] => _,
                        out("x8") _, out("x9") _, out("x10") _, out("x11") _,
                        out("x12") _, out("x13") _, out("x14") _, out("x15") _,
                        out("x16") _, out("x17") _,
                        options(nostack)
                    );
                }
                SmcReturn::new(x0, x1, x2, x3)
            } else {
                SmcReturn::from(SMCCC_NOT_SUPPORTED)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_indexing() {
        let args = SmcArgs::new(0xC400_0041).with_arg(1, 0x1000).with_arg(7, 7).with_arg(0, 99).with_arg(8, 99);
        assert_eq!(args.function_id, 0xC400_0041);
        assert_eq!(args.arg(1), 0x1000);
        assert_eq!(args.arg(7), 7);
        assert_eq!(args.arg(0), 0);
        assert_eq!(args.args[1..6], [0; 5]);
    }

    #[test]
    fn test_return_status_is_signed() {
        let ret = SmcReturn::from(SMCCC_NOT_SUPPORTED);
        assert_eq!(ret.status(), -1);
        assert_eq!(ret.x[0], u64::MAX);
    }

    #[cfg(not(target_arch = "aarch64"))]
    #[test]
    fn test_host_conduit_reports_not_supported() {
        assert_eq!(ArmSmc.call(SmcArgs::new(0x8400_0000)).status(), SMCCC_NOT_SUPPORTED);
    }
}
