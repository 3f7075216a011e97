//! NVParam Identifiers and Access Control
//!
//! Parameter identifiers are byte offsets into the NVParam storage. Every entry is 8 bytes wide, so a valid
//! identifier is 8-byte aligned and falls into one of four bands:
//!
//! | Band            | Range                 |
//! |-----------------|-----------------------|
//! | Pre-boot        | `0x0000..0x4000`      |
//! | Manufacturing   | `0x4000..0x8000`      |
//! | User            | `0x8000..0xC000`      |
//! | Board           | `0xC000..0x10000`     |
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use altra_sdk::error::{EfiError, Result};
use bitflags::bitflags;

/// Size of one NVParam entry in the storage.
pub const NV_PARAM_ENTRY_SIZE: u32 = 8;

pub const NV_PREBOOT_PARAM_START: u32 = 0x0000;
pub const NV_MANU_PARAM_START: u32 = 0x4000;
pub const NV_USER_PARAM_START: u32 = 0x8000;
pub const NV_BOARD_PARAM_START: u32 = 0xC000;
pub const NV_PARAM_MAX: u32 = 0x10000;

bitflags! {
    /// Execution contexts allowed to read or write a parameter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Acl: u32 {
        /// Trusted firmware (EL3).
        const ATF = 0x01;
        /// Secure OS.
        const OPTEE = 0x04;
        /// Boot firmware.
        const BIOS = 0x08;
        /// Manufacturing tools.
        const MANU = 0x10;
        /// Baseboard management controller.
        const BMC = 0x20;
        const ALL = 0xFFFF;
    }
}

/// The band a parameter identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvParamBand {
    PreBoot,
    Manufacturing,
    User,
    Board,
}

impl NvParamBand {
    /// Returns the band holding `param_id`, or `None` when the identifier is outside every band or not aligned to an
    /// entry.
    pub fn of(param_id: u32) -> Option<Self> {
        if param_id % NV_PARAM_ENTRY_SIZE != 0 {
            return None;
        }
        match param_id {
            NV_PREBOOT_PARAM_START..NV_MANU_PARAM_START => Some(Self::PreBoot),
            NV_MANU_PARAM_START..NV_USER_PARAM_START => Some(Self::Manufacturing),
            NV_USER_PARAM_START..NV_BOARD_PARAM_START => Some(Self::User),
            NV_BOARD_PARAM_START..NV_PARAM_MAX => Some(Self::Board),
            _ => None,
        }
    }
}

/// Fails with `InvalidParameter` unless `param_id` is a valid parameter identifier.
pub fn validate_param_id(param_id: u32) -> Result<NvParamBand> {
    NvParamBand::of(param_id).ok_or_else(|| {
        log::warn!(target: "nvparam", "Invalid parameter ID {:#X}", param_id);
        EfiError::InvalidParameter
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        assert_eq!(NvParamBand::of(0x0000), Some(NvParamBand::PreBoot));
        assert_eq!(NvParamBand::of(0x3FF8), Some(NvParamBand::PreBoot));
        assert_eq!(NvParamBand::of(0x4000), Some(NvParamBand::Manufacturing));
        assert_eq!(NvParamBand::of(0x8000), Some(NvParamBand::User));
        assert_eq!(NvParamBand::of(0xC000), Some(NvParamBand::Board));
        assert_eq!(NvParamBand::of(0xFFF8), Some(NvParamBand::Board));
        assert_eq!(NvParamBand::of(0x10000), None);
        assert_eq!(NvParamBand::of(u32::MAX & !7), None);
    }

    #[test]
    fn test_unaligned_ids_are_rejected() {
        assert_eq!(NvParamBand::of(0x1004), None);
        assert_eq!(validate_param_id(0x1001), Err(EfiError::InvalidParameter));
        assert_eq!(validate_param_id(0x1000), Ok(NvParamBand::PreBoot));
    }

    #[test]
    fn test_acl_bits() {
        assert_eq!((Acl::ATF | Acl::BIOS).bits(), 0x09);
        assert!(Acl::ALL.contains(Acl::BMC | Acl::MANU | Acl::OPTEE));
        assert!(!(Acl::ATF | Acl::BIOS).intersects(Acl::BMC));
    }
}
