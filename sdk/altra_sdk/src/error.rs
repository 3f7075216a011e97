//! Module for converting UEFI errors to rusty errors.
//!
//! Every component in this workspace reports failures through [`EfiError`]. Backend specific status codes (SMCCC
//! return values, SPCI status codes, NVParam response words) are translated at the boundary of the component that
//! receives them and never reach a caller.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// A specialized [`Result`](core::result::Result) type for EFI operations.
pub type Result<T> = core::result::Result<T, EfiError>;

use r_efi::efi;

/// EDK II Error Code equivalent as a Rust Error enum
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EfiError {
    /// The parameter was incorrect.
    InvalidParameter,
    /// The operation is not supported.
    Unsupported,
    /// The buffer was not large enough to hold the requested data.
    BufferTooSmall,
    /// There is no data pending upon return, or the resource is held by another owner.
    NotReady,
    /// The physical device reported an error while attempting the operation.
    DeviceError,
    /// The resource has run out.
    OutOfResources,
    /// The item was not found.
    NotFound,
    /// Access was denied.
    AccessDenied,
    /// A timeout time expired.
    Timeout,
    /// The protocol has already been started.
    AlreadyStarted,
    /// An unknown EFI status code was encountered.
    Unknown(efi::Status),
}

impl EfiError {
    /// Converts an `r_efi::efi::Status` to a `Result`.
    ///
    /// If the status is `SUCCESS`, it returns `Ok(())`.
    /// Otherwise, it returns an `Err` with the corresponding `EfiError`.
    pub fn status_to_result(status: efi::Status) -> Result<()> {
        match status {
            efi::Status::SUCCESS => Ok(()),
            efi::Status::INVALID_PARAMETER => Err(EfiError::InvalidParameter),
            efi::Status::UNSUPPORTED => Err(EfiError::Unsupported),
            efi::Status::BUFFER_TOO_SMALL => Err(EfiError::BufferTooSmall),
            efi::Status::NOT_READY => Err(EfiError::NotReady),
            efi::Status::DEVICE_ERROR => Err(EfiError::DeviceError),
            efi::Status::OUT_OF_RESOURCES => Err(EfiError::OutOfResources),
            efi::Status::NOT_FOUND => Err(EfiError::NotFound),
            efi::Status::ACCESS_DENIED => Err(EfiError::AccessDenied),
            efi::Status::TIMEOUT => Err(EfiError::Timeout),
            efi::Status::ALREADY_STARTED => Err(EfiError::AlreadyStarted),
            _ => Err(EfiError::Unknown(status)),
        }
    }

    /// Converts a `Result` back into the `r_efi::efi::Status` reported from a module entry point.
    pub fn result_to_status<T>(result: Result<T>) -> efi::Status {
        match result {
            Ok(_) => efi::Status::SUCCESS,
            Err(err) => err.into(),
        }
    }
}

impl From<EfiError> for efi::Status {
    fn from(e: EfiError) -> efi::Status {
        match e {
            EfiError::InvalidParameter => efi::Status::INVALID_PARAMETER,
            EfiError::Unsupported => efi::Status::UNSUPPORTED,
            EfiError::BufferTooSmall => efi::Status::BUFFER_TOO_SMALL,
            EfiError::NotReady => efi::Status::NOT_READY,
            EfiError::DeviceError => efi::Status::DEVICE_ERROR,
            EfiError::OutOfResources => efi::Status::OUT_OF_RESOURCES,
            EfiError::NotFound => efi::Status::NOT_FOUND,
            EfiError::AccessDenied => efi::Status::ACCESS_DENIED,
            EfiError::Timeout => efi::Status::TIMEOUT,
            EfiError::AlreadyStarted => efi::Status::ALREADY_STARTED,
            EfiError::Unknown(status) => status,
        }
    }
}

impl From<efi::Status> for EfiError {
    fn from(status: efi::Status) -> EfiError {
        match EfiError::status_to_result(status) {
            Ok(()) => EfiError::Unknown(status),
            Err(err) => err,
        }
    }
}

impl core::fmt::Display for EfiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EfiError::Unknown(status) => write!(f, "Unknown({:#X})", status.as_usize()),
            other => write!(f, "{other:?}"),
        }
    }
}

impl core::error::Error for EfiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_for_taxonomy() {
        let errors = [
            EfiError::Timeout,
            EfiError::AccessDenied,
            EfiError::NotFound,
            EfiError::Unsupported,
            EfiError::InvalidParameter,
            EfiError::DeviceError,
            EfiError::OutOfResources,
        ];
        for err in errors {
            let status: efi::Status = err.into();
            assert_eq!(EfiError::status_to_result(status), Err(err));
        }
    }

    #[test]
    fn test_success_is_ok() {
        assert_eq!(EfiError::status_to_result(efi::Status::SUCCESS), Ok(()));
        assert_eq!(EfiError::result_to_status(Ok(5u32)), efi::Status::SUCCESS);
    }

    #[test]
    fn test_unlisted_status_is_unknown() {
        let err: EfiError = efi::Status::VOLUME_FULL.into();
        assert_eq!(err, EfiError::Unknown(efi::Status::VOLUME_FULL));
        assert_eq!(efi::Status::from(err), efi::Status::VOLUME_FULL);
    }

    #[test]
    fn test_result_to_status_maps_error() {
        assert_eq!(EfiError::result_to_status::<()>(Err(EfiError::Timeout)), efi::Status::TIMEOUT);
    }
}
