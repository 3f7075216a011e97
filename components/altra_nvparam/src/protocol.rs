//! NVParam Wire Protocol
//!
//! Requests and responses exchanged with the NVParam owner. Over MM communicate they travel as little-endian
//! fixed-layout messages; over SMC the same fields are carried in argument registers.
//!
//! ```text
//! Request  (20 bytes): operation:u32 | param_id:u32 | read_acl:u32 | write_acl:u32 | value:u32
//! Response  (8 bytes): status:u32 | value:u32
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use altra_sdk::error::{EfiError, Result};
use zerocopy::{FromBytes, IntoBytes, LittleEndian, U32};
use zerocopy_derive::*;

use crate::param::Acl;

pub const NV_PARAM_STATUS_SUCCESS: u32 = 0xAABB_CC00;
pub const NV_PARAM_STATUS_NOT_SET: u32 = 0xAABB_CC01;
pub const NV_PARAM_STATUS_NO_PERMISSION: u32 = 0xAABB_CC02;
pub const NV_PARAM_STATUS_INVALID: u32 = 0xAABB_CC03;
pub const NV_PARAM_STATUS_FAIL: u32 = 0xAABB_CCFF;

/// NVParam operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NvParamOperation {
    Get = 1,
    Set = 2,
    Clear = 3,
    ClearAll = 4,
}

impl TryFrom<u32> for NvParamOperation {
    type Error = NvParamStatus;

    fn try_from(value: u32) -> core::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Get),
            2 => Ok(Self::Set),
            3 => Ok(Self::Clear),
            4 => Ok(Self::ClearAll),
            _ => Err(NvParamStatus::Invalid),
        }
    }
}

/// Outcome reported by the NVParam owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvParamStatus {
    Success,
    NotSet,
    NoPermission,
    Invalid,
    Fail,
}

impl NvParamStatus {
    pub const fn word(self) -> u32 {
        match self {
            Self::Success => NV_PARAM_STATUS_SUCCESS,
            Self::NotSet => NV_PARAM_STATUS_NOT_SET,
            Self::NoPermission => NV_PARAM_STATUS_NO_PERMISSION,
            Self::Invalid => NV_PARAM_STATUS_INVALID,
            Self::Fail => NV_PARAM_STATUS_FAIL,
        }
    }

    /// Decodes a status word. Unknown words are reported as [`NvParamStatus::Fail`].
    pub const fn from_word(word: u32) -> Self {
        match word {
            NV_PARAM_STATUS_SUCCESS => Self::Success,
            NV_PARAM_STATUS_NOT_SET => Self::NotSet,
            NV_PARAM_STATUS_NO_PERMISSION => Self::NoPermission,
            NV_PARAM_STATUS_INVALID => Self::Invalid,
            _ => Self::Fail,
        }
    }
}

impl From<NvParamStatus> for EfiError {
    fn from(status: NvParamStatus) -> Self {
        match status {
            NvParamStatus::NotSet => EfiError::NotFound,
            NvParamStatus::NoPermission => EfiError::AccessDenied,
            NvParamStatus::Invalid => EfiError::InvalidParameter,
            NvParamStatus::Success | NvParamStatus::Fail => EfiError::DeviceError,
        }
    }
}

/// A decoded NVParam request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvParamRequest {
    pub operation: NvParamOperation,
    pub param_id: u32,
    pub read_acl: Acl,
    pub write_acl: Acl,
    pub value: u32,
}

impl NvParamRequest {
    pub const fn get(param_id: u32, read_acl: Acl) -> Self {
        Self { operation: NvParamOperation::Get, param_id, read_acl, write_acl: Acl::empty(), value: 0 }
    }

    pub const fn set(param_id: u32, read_acl: Acl, write_acl: Acl, value: u32) -> Self {
        Self { operation: NvParamOperation::Set, param_id, read_acl, write_acl, value }
    }

    pub const fn clear(param_id: u32, write_acl: Acl) -> Self {
        Self { operation: NvParamOperation::Clear, param_id, read_acl: Acl::empty(), write_acl, value: 0 }
    }

    pub const fn clear_all() -> Self {
        Self {
            operation: NvParamOperation::ClearAll,
            param_id: 0,
            read_acl: Acl::empty(),
            write_acl: Acl::empty(),
            value: 0,
        }
    }

    pub fn to_message(&self) -> NvParamRequestMessage {
        NvParamRequestMessage {
            operation: U32::new(self.operation as u32),
            param_id: U32::new(self.param_id),
            read_acl: U32::new(self.read_acl.bits()),
            write_acl: U32::new(self.write_acl.bits()),
            value: U32::new(self.value),
        }
    }

    /// Decodes a request message. A short message or an unknown operation decodes as [`NvParamStatus::Invalid`].
    pub fn from_bytes(bytes: &[u8]) -> core::result::Result<Self, NvParamStatus> {
        let (message, _) = NvParamRequestMessage::read_from_prefix(bytes).map_err(|_| NvParamStatus::Invalid)?;
        Ok(Self {
            operation: NvParamOperation::try_from(message.operation.get())?,
            param_id: message.param_id.get(),
            read_acl: Acl::from_bits_retain(message.read_acl.get()),
            write_acl: Acl::from_bits_retain(message.write_acl.get()),
            value: message.value.get(),
        })
    }
}

/// A decoded NVParam response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvParamResponse {
    pub status: NvParamStatus,
    pub value: u32,
}

impl NvParamResponse {
    pub const fn new(status: NvParamStatus, value: u32) -> Self {
        Self { status, value }
    }

    pub fn to_message(&self) -> NvParamResponseMessage {
        NvParamResponseMessage { status: U32::new(self.status.word()), value: U32::new(self.value) }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (message, _) = NvParamResponseMessage::read_from_prefix(bytes).map_err(|_| {
            log::error!(target: "nvparam", "Truncated NVParam response ({} bytes)", bytes.len());
            EfiError::DeviceError
        })?;
        Ok(Self { status: NvParamStatus::from_word(message.status.get()), value: message.value.get() })
    }

    /// Maps the response to the value it carries or the error its status stands for.
    pub fn into_result(self) -> Result<u32> {
        match self.status {
            NvParamStatus::Success => Ok(self.value),
            status => Err(status.into()),
        }
    }
}

/// Request as laid out in a communicate buffer.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct NvParamRequestMessage {
    pub operation: U32<LittleEndian>,
    pub param_id: U32<LittleEndian>,
    pub read_acl: U32<LittleEndian>,
    pub write_acl: U32<LittleEndian>,
    pub value: U32<LittleEndian>,
}

/// Response as laid out in a communicate buffer.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct NvParamResponseMessage {
    pub status: U32<LittleEndian>,
    pub value: U32<LittleEndian>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let request = NvParamRequest::set(0x1000, Acl::ATF | Acl::BIOS, Acl::ATF, 42);
        assert_eq!(
            request.to_message().as_bytes(),
            &[2, 0, 0, 0, 0x00, 0x10, 0, 0, 0x09, 0, 0, 0, 0x01, 0, 0, 0, 42, 0, 0, 0]
        );
        assert_eq!(NvParamRequest::from_bytes(request.to_message().as_bytes()), Ok(request));
    }

    #[test]
    fn test_malformed_requests() {
        assert_eq!(NvParamRequest::from_bytes(&[1, 0, 0]), Err(NvParamStatus::Invalid));
        let mut bytes = NvParamRequest::get(0, Acl::BIOS).to_message();
        bytes.operation = U32::new(9);
        assert_eq!(NvParamRequest::from_bytes(bytes.as_bytes()), Err(NvParamStatus::Invalid));
    }

    #[test]
    fn test_response_layout() {
        let response = NvParamResponse::new(NvParamStatus::Success, 42);
        assert_eq!(response.to_message().as_bytes(), &[0x00, 0xCC, 0xBB, 0xAA, 42, 0, 0, 0]);
        assert_eq!(
            NvParamResponse::from_bytes(&[0x01, 0xCC, 0xBB, 0xAA, 0, 0, 0, 0]).map(|r| r.status),
            Ok(NvParamStatus::NotSet)
        );
        assert_eq!(NvParamResponse::from_bytes(&[0; 4]), Err(EfiError::DeviceError));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(NvParamResponse::new(NvParamStatus::Success, 7).into_result(), Ok(7));
        assert_eq!(NvParamResponse::new(NvParamStatus::NotSet, 0).into_result(), Err(EfiError::NotFound));
        assert_eq!(NvParamResponse::new(NvParamStatus::NoPermission, 0).into_result(), Err(EfiError::AccessDenied));
        assert_eq!(NvParamResponse::new(NvParamStatus::Invalid, 0).into_result(), Err(EfiError::InvalidParameter));
        assert_eq!(NvParamResponse::new(NvParamStatus::Fail, 0).into_result(), Err(EfiError::DeviceError));
        assert_eq!(NvParamStatus::from_word(0x1234), NvParamStatus::Fail);
    }
}
