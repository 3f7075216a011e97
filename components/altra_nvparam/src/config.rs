//! NVParam Configuration
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;

/// SMC64 function identifier of the NVParam service in trusted firmware.
pub const NV_PARAM_SMC_FUNCTION_ID: u32 = 0xC200_FF20;

/// Communicate buffer used for NVParam requests.
pub const NV_PARAM_MM_BUFFER_ID: u8 = 0;

/// GUID of the NVParam MM handler.
pub const NV_PARAM_MM_GUID: efi::Guid =
    efi::Guid::from_fields(0xE6B1_4F4A, 0x8B70, 0x4D23, 0xA1, 0x5C, &[0x4E, 0x3D, 0x9B, 0x7A, 0x21, 0x0F]);

/// The conduit NVParam requests travel through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvParamBackend {
    /// Direct secure monitor call.
    Smc { function_id: u32 },
    /// MM communicate to the NVParam handler in the secure partition.
    Mm { buffer_id: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvParamConfig {
    pub backend: NvParamBackend,
}

impl Default for NvParamConfig {
    fn default() -> Self {
        Self { backend: NvParamBackend::Mm { buffer_id: NV_PARAM_MM_BUFFER_ID } }
    }
}
