//! Doorbell Configuration
//!
//! Platform constants and the configuration consumed by [`Mailbox`](crate::doorbell::Mailbox). The defaults describe
//! an Altra (Mt. Jade class) platform. Other SoC generations use a different socket stride, so platforms must provide
//! the matching configuration.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use altra_sdk::error::{EfiError, Result};

/// Base address of the SMpro doorbell block of socket 0.
pub const SMPRO_DB_BASE_REG: u64 = 0x1000_0054_0000;

/// Base address of the PMpro doorbell block of socket 0.
pub const PMPRO_DB_BASE_REG: u64 = 0x1000_0154_0000;

/// Distance between the register spaces of two sockets.
pub const SOCKET_BASE_OFFSET: u64 = 0x4000_0000_0000;

/// Maximum number of sockets on the platform.
pub const PLATFORM_CPU_MAX_SOCKET: u8 = 2;

/// Interval between two polls of the doorbell status register.
pub const MB_POLL_INTERVAL_US: u64 = 1_000;

/// Upper bound on the time spent waiting for an acknowledge or a response.
pub const MB_POLL_TIMEOUT_US: u64 = 10_000_000;

/// The management processor that owns a doorbell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagementProcessor {
    /// System Management processor.
    SmPro,
    /// Power Management processor.
    PmPro,
}

/// Doorbell configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorbellConfig {
    /// Base of the SMpro doorbell block of socket 0.
    pub smpro_base: u64,
    /// Base of the PMpro doorbell block of socket 0.
    pub pmpro_base: u64,
    /// Distance between the register spaces of two sockets.
    pub socket_stride: u64,
    /// Number of populated sockets.
    pub socket_count: u8,
    /// Interval between two polls.
    pub poll_interval_us: u64,
    /// Total time budget for one acknowledge or response wait.
    pub timeout_us: u64,
}

impl Default for DoorbellConfig {
    fn default() -> Self {
        Self {
            smpro_base: SMPRO_DB_BASE_REG,
            pmpro_base: PMPRO_DB_BASE_REG,
            socket_stride: SOCKET_BASE_OFFSET,
            socket_count: PLATFORM_CPU_MAX_SOCKET,
            poll_interval_us: MB_POLL_INTERVAL_US,
            timeout_us: MB_POLL_TIMEOUT_US,
        }
    }
}

impl DoorbellConfig {
    /// Returns the base address of a processor's doorbell block in `socket`.
    ///
    /// The address is `processor base + socket * socket_stride`.
    pub fn socket_base(&self, socket: u8, processor: ManagementProcessor) -> Result<u64> {
        if socket >= self.socket_count {
            log::warn!(target: "mailbox", "Socket {} out of range (socket count {})", socket, self.socket_count);
            return Err(EfiError::InvalidParameter);
        }
        let base = match processor {
            ManagementProcessor::SmPro => self.smpro_base,
            ManagementProcessor::PmPro => self.pmpro_base,
        };
        Ok(base + socket as u64 * self.socket_stride)
    }

    /// Number of polls that fit in the timeout budget. The status register is always polled at least once.
    pub fn poll_iterations(&self) -> u64 {
        if self.poll_interval_us == 0 {
            return self.timeout_us.max(1);
        }
        (self.timeout_us / self.poll_interval_us).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_poll_budget() {
        assert_eq!(DoorbellConfig::default().poll_iterations(), 10_000);
    }

    #[test]
    fn test_short_timeout_still_polls_once() {
        let config = DoorbellConfig { timeout_us: 500, ..Default::default() };
        assert_eq!(config.poll_iterations(), 1);
        let config = DoorbellConfig { poll_interval_us: 0, timeout_us: 0, ..Default::default() };
        assert_eq!(config.poll_iterations(), 1);
    }

    #[test]
    fn test_socket_base() {
        let config = DoorbellConfig::default();
        assert_eq!(config.socket_base(0, ManagementProcessor::SmPro), Ok(SMPRO_DB_BASE_REG));
        assert_eq!(config.socket_base(1, ManagementProcessor::SmPro), Ok(SMPRO_DB_BASE_REG + SOCKET_BASE_OFFSET));
        assert_eq!(config.socket_base(1, ManagementProcessor::PmPro), Ok(PMPRO_DB_BASE_REG + SOCKET_BASE_OFFSET));
    }

    #[test]
    fn test_socket_out_of_range() {
        let config = DoorbellConfig { socket_count: 1, ..Default::default() };
        assert_eq!(config.socket_base(1, ManagementProcessor::SmPro), Err(EfiError::InvalidParameter));
    }
}
