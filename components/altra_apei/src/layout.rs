//! APEI Shared Memory Layout
//!
//! Byte-exact layout of the error record regions. Trusted firmware and the management processors write these
//! regions directly, so every size and offset below is part of the interface and is checked at compile time. All
//! fields are little-endian and no structure contains padding.
//!
//! ```text
//! Region       := TableHeader ErrorSource[error_source_count]
//! TableHeader  := resv1:u64 resv2:u64 total_length:u32 error_source_count:u32             (24 bytes)
//! ErrorSource  := error_data_entry_count:u32 length:u32 ErrorStatusBlock                   (8 bytes + ESB)
//!
//! GHES ESB     := GenericErrorStatus (GenericErrorDataEntry Payload)[23] Scratch[984]
//! BERT ESB     := (GenericErrorStatus GenericErrorDataEntry BootErrorPayload)[8]
//! ```
//!
//! Only the second revision of this layout is supported.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;
use zerocopy::{LittleEndian, U16, U32, U64};
use zerocopy_derive::*;

/// Number of GHES error sources.
pub const ACPI_APEI_GHES_MAX: usize = 8;
/// Generic error data entries in one GHES error status block.
pub const GHES_ERROR_DATA_ENTRY_MAX: usize = 23;
/// Firmware scratch area at the end of a GHES error status block.
pub const GHES_SCRATCH_SIZE: usize = 984;
/// Boot error slots in the BERT region.
pub const BERT_ERROR_MAX: usize = 8;

pub const TABLE_HEADER_SIZE: usize = 24;
pub const ERROR_SOURCE_HEADER_SIZE: usize = 8;
pub const GENERIC_ERROR_STATUS_SIZE: usize = 20;
pub const GENERIC_ERROR_DATA_ENTRY_SIZE: usize = 72;
pub const ERROR_PAYLOAD_SIZE: usize = 64;

pub const GHES_ERROR_DATA_SIZE: usize = GENERIC_ERROR_DATA_ENTRY_SIZE + ERROR_PAYLOAD_SIZE;
pub const GHES_ESB_SIZE: usize =
    GENERIC_ERROR_STATUS_SIZE + GHES_ERROR_DATA_ENTRY_MAX * GHES_ERROR_DATA_SIZE + GHES_SCRATCH_SIZE;
pub const GHES_SOURCE_SIZE: usize = ERROR_SOURCE_HEADER_SIZE + GHES_ESB_SIZE;
pub const GHES_REGION_SIZE: usize = TABLE_HEADER_SIZE + ACPI_APEI_GHES_MAX * GHES_SOURCE_SIZE;

pub const BERT_SLOT_SIZE: usize = GENERIC_ERROR_STATUS_SIZE + GENERIC_ERROR_DATA_ENTRY_SIZE + ERROR_PAYLOAD_SIZE;
pub const BERT_SOURCE_SIZE: usize = ERROR_SOURCE_HEADER_SIZE + BERT_ERROR_MAX * BERT_SLOT_SIZE;
pub const BERT_REGION_SIZE: usize = TABLE_HEADER_SIZE + BERT_SOURCE_SIZE;

/// Length of the message carried by a boot error payload.
pub const BOOT_ERROR_MESSAGE_SIZE: usize = 60;

/// Generic error status block status bits.
pub const BLOCK_STATUS_UNCORRECTABLE_VALID: u32 = 1 << 0;
pub const BLOCK_STATUS_CORRECTABLE_VALID: u32 = 1 << 1;
pub const BLOCK_STATUS_ENTRY_COUNT_SHIFT: u32 = 4;

/// Generic error data entry revision with the timestamp field.
pub const GENERIC_ERROR_DATA_ENTRY_REVISION: u16 = 0x0300;

/// Section type of a boot error payload.
pub const BOOT_ERROR_SECTION_GUID: efi::Guid =
    efi::Guid::from_fields(0x2826_CC9F, 0x448C, 0x4C2B, 0x86, 0xB6, &[0xA9, 0x53, 0x5C, 0x6B, 0x1E, 0x0B]);

/// Error severity of a generic error status block or data entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorSeverity {
    Recoverable = 0,
    Fatal = 1,
    Corrected = 2,
    None = 3,
}

#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TableHeader {
    pub resv1: U64<LittleEndian>,
    pub resv2: U64<LittleEndian>,
    pub total_length: U32<LittleEndian>,
    pub error_source_count: U32<LittleEndian>,
}

#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ErrorSourceHeader {
    pub error_data_entry_count: U32<LittleEndian>,
    pub length: U32<LittleEndian>,
}

/// ACPI Generic Error Status Block header.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct GenericErrorStatus {
    pub block_status: U32<LittleEndian>,
    pub raw_data_offset: U32<LittleEndian>,
    pub raw_data_length: U32<LittleEndian>,
    pub data_length: U32<LittleEndian>,
    pub error_severity: U32<LittleEndian>,
}

/// ACPI 6.3 Generic Error Data Entry header.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct GenericErrorDataEntry {
    pub section_type: [u8; 16],
    pub error_severity: U32<LittleEndian>,
    pub revision: U16<LittleEndian>,
    pub validation_bits: u8,
    pub flags: u8,
    pub error_data_length: U32<LittleEndian>,
    pub fru_id: [u8; 16],
    pub fru_text: [u8; 20],
    pub timestamp: U64<LittleEndian>,
}

/// Payload of a boot error record.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct BootErrorPayload {
    pub error_type: u8,
    pub subtype: u8,
    pub instance: U16<LittleEndian>,
    pub message: [u8; BOOT_ERROR_MESSAGE_SIZE],
}

const _: () = assert!(core::mem::size_of::<TableHeader>() == TABLE_HEADER_SIZE);
const _: () = assert!(core::mem::size_of::<ErrorSourceHeader>() == ERROR_SOURCE_HEADER_SIZE);
const _: () = assert!(core::mem::size_of::<GenericErrorStatus>() == GENERIC_ERROR_STATUS_SIZE);
const _: () = assert!(core::mem::size_of::<GenericErrorDataEntry>() == GENERIC_ERROR_DATA_ENTRY_SIZE);
const _: () = assert!(core::mem::size_of::<BootErrorPayload>() == ERROR_PAYLOAD_SIZE);
const _: () = assert!(GHES_SOURCE_SIZE == 4140);
const _: () = assert!(GHES_REGION_SIZE == 33144);
const _: () = assert!(BERT_REGION_SIZE == 1280);

/// Offset of GHES error source `index` in the GHES region.
pub const fn ghes_source_offset(index: usize) -> usize {
    TABLE_HEADER_SIZE + index * GHES_SOURCE_SIZE
}

/// Offset of the error status block of GHES error source `index` in the GHES region.
pub const fn ghes_esb_offset(index: usize) -> usize {
    ghes_source_offset(index) + ERROR_SOURCE_HEADER_SIZE
}

/// Offset of the BERT error source in the BERT region.
pub const fn bert_source_offset() -> usize {
    TABLE_HEADER_SIZE
}

/// Offset of boot error slot `slot` in the BERT region.
pub const fn bert_slot_offset(slot: usize) -> usize {
    bert_source_offset() + ERROR_SOURCE_HEADER_SIZE + slot * BERT_SLOT_SIZE
}
