//! SPCI Client
//!
//! ## Register usage
//!
//! | Call             | Arguments                                          | Results                        |
//! |------------------|----------------------------------------------------|--------------------------------|
//! | version          | none                                               | `X0` = major `[31:16]`, minor `[15:0]` |
//! | handle open      | `X1..X4` = service GUID words, `X7` = client id    | `X0` = status, `X2` = handle   |
//! | request blocking | `X1..X5` = request words, `X7` = client and handle | `X0` = status, `X1..X3` = reply |
//! | handle close     | `X7` = client and handle                           | `X0` = status                  |
//!
//! The combined client and handle word carries the client id in `[47:32]` and the handle in `[31:0]`.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use altra_sdk::{
    error::{EfiError, Result},
    smc::{SecureMonitor, SmcArgs, SmcReturn},
};
use r_efi::efi;

pub const SPCI_VERSION: u32 = 0x8400_0060;
pub const SPCI_SERVICE_HANDLE_OPEN: u32 = 0x8400_0061;
pub const SPCI_SERVICE_HANDLE_CLOSE: u32 = 0x8400_0062;
pub const SPCI_SERVICE_REQUEST_BLOCKING_AARCH64: u32 = 0xC400_0066;

/// Maximum number of request words in one blocking request.
pub const SPCI_MAX_REQUEST_WORDS: usize = 5;

/// Status codes returned in `X0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum SpciStatus {
    Success = 0,
    NotSupported = -1,
    InvalidParameter = -2,
    NoMemory = -3,
    Busy = -4,
    Queued = -5,
    Denied = -6,
    NotPresent = -7,
}

impl SpciStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Success,
            -1 => Self::NotSupported,
            -2 => Self::InvalidParameter,
            -3 => Self::NoMemory,
            -4 => Self::Busy,
            -5 => Self::Queued,
            -6 => Self::Denied,
            -7 => Self::NotPresent,
            _ => return None,
        })
    }

    fn check(code: i64) -> Result<()> {
        match Self::from_code(code) {
            Some(Self::Success) => Ok(()),
            Some(status) => Err(status.into()),
            None => Err(EfiError::DeviceError),
        }
    }
}

impl From<SpciStatus> for EfiError {
    fn from(status: SpciStatus) -> Self {
        match status {
            SpciStatus::Success => EfiError::DeviceError,
            SpciStatus::NotSupported => EfiError::Unsupported,
            SpciStatus::InvalidParameter => EfiError::InvalidParameter,
            SpciStatus::NoMemory => EfiError::OutOfResources,
            SpciStatus::Busy | SpciStatus::Queued => EfiError::NotReady,
            SpciStatus::Denied => EfiError::AccessDenied,
            SpciStatus::NotPresent => EfiError::NotFound,
        }
    }
}

impl fmt::Display for SpciStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Splits a GUID into the four little-endian words passed in `X1..X4`.
pub fn guid_words(guid: &efi::Guid) -> [u64; 4] {
    let bytes = guid.as_bytes();
    core::array::from_fn(|word| {
        u32::from_le_bytes([bytes[word * 4], bytes[word * 4 + 1], bytes[word * 4 + 2], bytes[word * 4 + 3]]) as u64
    })
}

/// The SPCI version reported by the secure world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpciVersion {
    pub major: u16,
    pub minor: u16,
}

/// Client side of the SPCI protocol.
pub struct SpciClient<M: SecureMonitor> {
    monitor: M,
    client_id: u16,
}

impl<M: SecureMonitor> SpciClient<M> {
    pub fn new(monitor: M, client_id: u16) -> Self {
        Self { monitor, client_id }
    }

    pub fn client_id(&self) -> u16 {
        self.client_id
    }

    pub fn version(&self) -> Result<SpciVersion> {
        let result = self.monitor.call(SmcArgs::new(SPCI_VERSION));
        if result.status() < 0 {
            log::warn!(target: "spci", "SPCI version query failed with {}", result.status());
            SpciStatus::check(result.status())?;
        }
        Ok(SpciVersion { major: (result.x[0] >> 16) as u16, minor: result.x[0] as u16 })
    }

    /// Opens a handle to the service identified by `service`.
    pub fn open(&self, service: &efi::Guid) -> Result<SpciHandle<'_, M>> {
        let [w0, w1, w2, w3] = guid_words(service);
        let args = SmcArgs::new(SPCI_SERVICE_HANDLE_OPEN)
            .with_arg(1, w0)
            .with_arg(2, w1)
            .with_arg(3, w2)
            .with_arg(4, w3)
            .with_arg(7, self.client_id as u64);
        let result = self.monitor.call(args);
        SpciStatus::check(result.status()).inspect_err(|err| {
            log::warn!(target: "spci", "Failed to open a handle to service {:?}: {:?}", service, err);
        })?;

        let handle = result.x[2] as u32;
        log::debug!(target: "spci", "Client {:#X} opened handle {:#X}", self.client_id, handle);
        Ok(SpciHandle { client: self, handle, open: true })
    }

    fn call_on_handle(&self, args: SmcArgs, handle: u32) -> SmcReturn {
        let target = ((self.client_id as u64) << 32) | handle as u64;
        self.monitor.call(args.with_arg(7, target))
    }
}

/// An open service handle.
///
/// The handle is closed when the guard is dropped. [`SpciHandle::close`] closes it explicitly and reports the
/// outcome.
pub struct SpciHandle<'a, M: SecureMonitor> {
    client: &'a SpciClient<M>,
    handle: u32,
    open: bool,
}

impl<M: SecureMonitor> SpciHandle<'_, M> {
    pub fn id(&self) -> u32 {
        self.handle
    }

    /// Sends `request` and waits for the reply words `X1..X3`.
    ///
    /// `request` holds between one and [`SPCI_MAX_REQUEST_WORDS`] words.
    pub fn request_blocking(&self, request: &[u64]) -> Result<[u64; 3]> {
        if request.is_empty() || request.len() > SPCI_MAX_REQUEST_WORDS {
            return Err(EfiError::InvalidParameter);
        }
        let args = request
            .iter()
            .enumerate()
            .fold(SmcArgs::new(SPCI_SERVICE_REQUEST_BLOCKING_AARCH64), |args, (index, word)| {
                args.with_arg(index + 1, *word)
            });
        let result = self.client.call_on_handle(args, self.handle);
        SpciStatus::check(result.status()).inspect_err(|err| {
            log::warn!(target: "spci", "Request {:#X} on handle {:#X} failed: {:?}", request[0], self.handle, err);
        })?;
        log::debug!(target: "spci", "Request {:#X} on handle {:#X} completed", request[0], self.handle);
        Ok([result.x[1], result.x[2], result.x[3]])
    }

    pub fn close(mut self) -> Result<()> {
        self.close_handle()
    }

    fn close_handle(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let result = self.client.call_on_handle(SmcArgs::new(SPCI_SERVICE_HANDLE_CLOSE), self.handle);
        SpciStatus::check(result.status()).inspect_err(|err| {
            log::warn!(target: "spci", "Failed to close handle {:#X}: {:?}", self.handle, err);
        })
    }
}

impl<M: SecureMonitor> Drop for SpciHandle<'_, M> {
    fn drop(&mut self) {
        let _ = self.close_handle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::ScriptedSecureMonitor;
    use altra_sdk::smc::MockSecureMonitor;
    use mockall::Sequence;

    const SERVICE: efi::Guid =
        efi::Guid::from_fields(0x0403_0201, 0x0605, 0x0807, 0x09, 0x0A, &[0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10]);

    #[test]
    fn test_status_mapping() {
        assert_eq!(SpciStatus::check(0), Ok(()));
        assert_eq!(SpciStatus::check(-1), Err(EfiError::Unsupported));
        assert_eq!(SpciStatus::check(-2), Err(EfiError::InvalidParameter));
        assert_eq!(SpciStatus::check(-3), Err(EfiError::OutOfResources));
        assert_eq!(SpciStatus::check(-4), Err(EfiError::NotReady));
        assert_eq!(SpciStatus::check(-6), Err(EfiError::AccessDenied));
        assert_eq!(SpciStatus::check(-7), Err(EfiError::NotFound));
        assert_eq!(SpciStatus::check(-42), Err(EfiError::DeviceError));
    }

    #[test]
    fn test_guid_words() {
        assert_eq!(guid_words(&SERVICE), [0x0403_0201, 0x0807_0605, 0x0C0B_0A09, 0x100F_0E0D]);
    }

    #[test]
    fn test_version() {
        let mut monitor = MockSecureMonitor::new();
        monitor
            .expect_call()
            .withf(|args| args.function_id == SPCI_VERSION)
            .times(1)
            .return_const(SmcReturn::new(0x0000_0001, 0, 0, 0));
        let client = SpciClient::new(monitor, 1);
        assert_eq!(client.version(), Ok(SpciVersion { major: 0, minor: 1 }));
    }

    #[test]
    fn test_open_request_close_sequence() {
        let mut seq = Sequence::new();
        let mut monitor = MockSecureMonitor::new();
        monitor
            .expect_call()
            .withf(|args| {
                args.function_id == SPCI_SERVICE_HANDLE_OPEN
                    && args.args[..4] == [0x0403_0201, 0x0807_0605, 0x0C0B_0A09, 0x100F_0E0D]
                    && args.arg(7) == 0x7
            })
            .times(1)
            .in_sequence(&mut seq)
            .return_const(SmcReturn::new(0, 0, 0x12, 0));
        monitor
            .expect_call()
            .withf(|args| {
                args.function_id == SPCI_SERVICE_REQUEST_BLOCKING_AARCH64
                    && args.args[..3] == [4, 1, 2]
                    && args.arg(4) == 0
                    && args.arg(7) == 0x7_0000_0012
            })
            .times(1)
            .in_sequence(&mut seq)
            .return_const(SmcReturn::new(0, 0xA, 0xB, 0xC));
        monitor
            .expect_call()
            .withf(|args| args.function_id == SPCI_SERVICE_HANDLE_CLOSE && args.arg(7) == 0x7_0000_0012)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(SmcReturn::from(0));

        let client = SpciClient::new(monitor, 7);
        let handle = client.open(&SERVICE).unwrap();
        assert_eq!(handle.id(), 0x12);
        assert_eq!(handle.request_blocking(&[4, 1, 2]), Ok([0xA, 0xB, 0xC]));
        assert_eq!(handle.close(), Ok(()));
    }

    #[test]
    fn test_drop_closes_handle_once() {
        let monitor = ScriptedSecureMonitor::new();
        monitor.push_result(SmcReturn::new(0, 0, 3, 0));
        monitor.push_result(SmcReturn::from(SpciStatus::Busy as i64));
        let client = SpciClient::new(&monitor, 1);
        {
            let handle = client.open(&SERVICE).unwrap();
            assert_eq!(handle.request_blocking(&[1]), Err(EfiError::NotReady));
        }
        let calls = monitor.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].function_id, SPCI_SERVICE_HANDLE_CLOSE);
        assert_eq!(calls[2].arg(7), 0x1_0000_0003);
    }

    #[test]
    fn test_failed_open_issues_no_close() {
        let monitor = ScriptedSecureMonitor::new();
        monitor.push_result(SmcReturn::from(SpciStatus::NotPresent as i64));
        let client = SpciClient::new(&monitor, 1);
        assert!(matches!(client.open(&SERVICE), Err(EfiError::NotFound)));
        assert_eq!(monitor.calls().len(), 1);
    }

    #[test]
    fn test_request_length_is_checked() {
        let monitor = ScriptedSecureMonitor::new();
        let client = SpciClient::new(&monitor, 1);
        let handle = client.open(&SERVICE).unwrap();
        assert_eq!(handle.request_blocking(&[]), Err(EfiError::InvalidParameter));
        assert_eq!(handle.request_blocking(&[0; 6]), Err(EfiError::InvalidParameter));
        drop(handle);
        assert_eq!(monitor.calls().len(), 2);
    }

    #[test]
    fn test_close_reports_failure() {
        let monitor = ScriptedSecureMonitor::new();
        monitor.push_result(SmcReturn::from(0));
        monitor.push_result(SmcReturn::from(SpciStatus::InvalidParameter as i64));
        let client = SpciClient::new(&monitor, 1);
        let handle = client.open(&SERVICE).unwrap();
        assert_eq!(handle.close(), Err(EfiError::InvalidParameter));
        assert_eq!(monitor.calls().len(), 2);
    }
}
