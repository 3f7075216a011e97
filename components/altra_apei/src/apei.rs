//! APEI Error Record Store
//!
//! Owns the GHES and BERT regions, publishes them to trusted firmware and controls hardware error detection.
//!
//! ## Lifecycle
//!
//! 1. [`Apei::init`] allocates both regions, zeroes them and stamps their headers. A second call is a no-op.
//! 2. [`Apei::enable`] cleans the regions out of the data cache, publishes their addresses to trusted firmware and
//!    turns error detection on or off. The management processors are told to start or stop RAS polling when they are
//!    the detection backend.
//! 3. Consumers read records through [`Apei::get_ghes_data`] and [`Apei::get_bert_data`], which return `None` when
//!    the store is not initialized or the index is out of range.
//!
//! The regions are written by trusted firmware without any locking. Once published they are treated as owned by the
//! consumer that reads them.
//!
//! ## Logging
//!
//! Detailed logging is available under the `apei` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use altra_mailbox::{
    config::ManagementProcessor,
    doorbell::{DoorbellChannel, Mailbox},
    smpro,
};
use altra_sdk::{
    base::uefi_size_to_pages,
    cache::CacheMaintenance,
    error::{EfiError, Result},
    mmio::RegisterIo,
    smc::{SecureMonitor, SmcArgs, SMCCC_INVALID_PARAMETER, SMCCC_NOT_SUPPORTED, SMCCC_SUCCESS},
    timer::Stall,
};
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use zerocopy::{FromBytes, IntoBytes, U16, U32};

use crate::{
    layout::*,
    memory::{ReservedMemory, ReservedRegion},
};

/// SMC64 function publishing the address of an error record region.
pub const APEI_SET_ADDRESS_SMC_ID: u32 = 0xC200_FF10;
/// SMC64 function turning hardware error detection on or off.
pub const APEI_ENABLE_DETECTION_SMC_ID: u32 = 0xC200_FF11;

/// Doorbell used for RAS control messages.
pub const RAS_DOORBELL_INDEX: u8 = 0;

/// Region identifier passed in `X1` of [`APEI_SET_ADDRESS_SMC_ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ApeiRegionKind {
    Ghes = 0,
    Bert = 1,
}

/// The agent that polls the hardware error registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum DetectionBackend {
    /// Trusted firmware handles error interrupts itself.
    Atf = 0,
    SmPro = 1,
    PmPro = 2,
}

impl DetectionBackend {
    fn processor(self) -> Option<ManagementProcessor> {
        match self {
            Self::Atf => None,
            Self::SmPro => Some(ManagementProcessor::SmPro),
            Self::PmPro => Some(ManagementProcessor::PmPro),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApeiConfig {
    pub set_address_function_id: u32,
    pub enable_function_id: u32,
}

impl Default for ApeiConfig {
    fn default() -> Self {
        Self { set_address_function_id: APEI_SET_ADDRESS_SMC_ID, enable_function_id: APEI_ENABLE_DETECTION_SMC_ID }
    }
}

/// Control of RAS error polling in the management processors.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait RasPollingControl {
    fn set_ras_polling(&self, processor: ManagementProcessor, enable: bool) -> Result<()>;
}

impl<T: RasPollingControl + ?Sized> RasPollingControl for &T {
    fn set_ras_polling(&self, processor: ManagementProcessor, enable: bool) -> Result<()> {
        (**self).set_ras_polling(processor, enable)
    }
}

impl<R: RegisterIo, S: Stall> RasPollingControl for Mailbox<R, S> {
    /// Sends the polling control message to `processor` on every populated socket.
    fn set_ras_polling(&self, processor: ManagementProcessor, enable: bool) -> Result<()> {
        let channel = DoorbellChannel::new(processor, RAS_DOORBELL_INDEX)?;
        for socket in 0..self.config().socket_count {
            let mut handle = self.acquire(socket, channel)?;
            smpro::set_ras_polling(&mut handle, enable)?;
        }
        Ok(())
    }
}

/// A boot error to be reported through the BERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootError<'a> {
    pub error_type: u8,
    pub subtype: u8,
    pub instance: u16,
    pub severity: ErrorSeverity,
    /// Truncated to the payload message size.
    pub message: &'a [u8],
}

/// The APEI error record store.
pub struct Apei<A: ReservedMemory, M: SecureMonitor, C: CacheMaintenance, P: RasPollingControl> {
    config: ApeiConfig,
    memory: A,
    monitor: M,
    cache: C,
    ras: P,
    ghes: Option<ReservedRegion>,
    bert: Option<ReservedRegion>,
    /// The region addresses were handed to trusted firmware.
    published: bool,
}

impl<A: ReservedMemory, M: SecureMonitor, C: CacheMaintenance, P: RasPollingControl> Apei<A, M, C, P> {
    pub fn new(config: ApeiConfig, memory: A, monitor: M, cache: C, ras: P) -> Self {
        Self { config, memory, monitor, cache, ras, ghes: None, bert: None, published: false }
    }

    pub fn is_initialized(&self) -> bool {
        self.ghes.is_some() && self.bert.is_some()
    }

    pub fn memory(&self) -> &A {
        &self.memory
    }

    /// Allocates and formats the GHES and BERT regions.
    ///
    /// Fails with `OutOfResources` when either region cannot be allocated, leaving nothing allocated.
    pub fn init(&mut self) -> Result<()> {
        if self.is_initialized() {
            log::debug!(target: "apei", "APEI regions already initialized");
            return Ok(());
        }
        // Releases a region left behind by a failed `free`.
        self.free()?;

        let mut ghes = self.memory.allocate_pages(uefi_size_to_pages(GHES_REGION_SIZE)).map_err(|err| {
            log::error!(target: "apei", "Failed to allocate GHES region: {:?}", err);
            EfiError::OutOfResources
        })?;
        let mut bert = match self.memory.allocate_pages(uefi_size_to_pages(BERT_REGION_SIZE)) {
            Ok(region) => region,
            Err(err) => {
                log::error!(target: "apei", "Failed to allocate BERT region: {:?}", err);
                if let Err(err) = self.memory.free_pages(&ghes) {
                    log::warn!(target: "apei", "Failed to release GHES region: {:?}", err);
                }
                return Err(EfiError::OutOfResources);
            }
        };

        format_ghes(ghes.as_mut_slice());
        format_bert(bert.as_mut_slice());
        log::info!(target: "apei", "GHES region at {:#X}, BERT region at {:#X}", ghes.address(), bert.address());

        self.ghes = Some(ghes);
        self.bert = Some(bert);
        Ok(())
    }

    /// Releases both regions.
    ///
    /// A region the provider fails to release stays with the store, so a later call retries it.
    pub fn free(&mut self) -> Result<()> {
        for slot in [&mut self.ghes, &mut self.bert] {
            if let Some(region) = slot.as_ref() {
                self.memory.free_pages(region).inspect_err(|err| {
                    log::error!(target: "apei", "Failed to release region at {:#X}: {:?}", region.address(), err);
                })?;
                *slot = None;
            }
        }
        self.published = false;
        Ok(())
    }

    /// Turns hardware error detection by `backend` on or off.
    ///
    /// When enabling, the regions are cleaned to the point of coherency and their addresses published before
    /// detection is switched on. Fails with `NotReady` if [`Apei::init`] has not succeeded.
    pub fn enable(&mut self, enable: bool, backend: DetectionBackend) -> Result<()> {
        if enable {
            let (Some(ghes), Some(bert)) = (&self.ghes, &self.bert) else {
                log::error!(target: "apei", "APEI regions are not initialized");
                return Err(EfiError::NotReady);
            };
            for (kind, region, size) in
                [(ApeiRegionKind::Ghes, ghes, GHES_REGION_SIZE), (ApeiRegionKind::Bert, bert, BERT_REGION_SIZE)]
            {
                self.cache.invalidate_data_cache_range(region.address(), size);
                self.secure_call(
                    SmcArgs::new(self.config.set_address_function_id)
                        .with_arg(1, kind as u64)
                        .with_arg(2, region.address())
                        .with_arg(3, size as u64),
                )?;
            }
            self.published = true;
        }

        self.secure_call(
            SmcArgs::new(self.config.enable_function_id).with_arg(1, enable as u64).with_arg(2, backend as u64),
        )?;

        if let Some(processor) = backend.processor() {
            self.ras.set_ras_polling(processor, enable)?;
        }
        log::info!(target: "apei", "Error detection {} ({:?})", if enable { "enabled" } else { "disabled" }, backend);
        Ok(())
    }

    /// Returns GHES error source `index`, header included, or `None`.
    pub fn get_ghes_data(&self, index: usize) -> Option<&[u8]> {
        if index >= ACPI_APEI_GHES_MAX {
            return None;
        }
        let offset = ghes_source_offset(index);
        self.ghes.as_ref().map(|region| &region.as_slice()[offset..offset + GHES_SOURCE_SIZE])
    }

    /// Address of the error status block of GHES error source `index`, as referenced from the HEST.
    pub fn ghes_block_address(&self, index: usize) -> Option<u64> {
        if index >= ACPI_APEI_GHES_MAX {
            return None;
        }
        self.ghes.as_ref().map(|region| region.address() + ghes_esb_offset(index) as u64)
    }

    /// Returns the whole BERT region, or `None`.
    pub fn get_bert_data(&self) -> Option<&[u8]> {
        self.bert.as_ref().map(|region| &region.as_slice()[..BERT_REGION_SIZE])
    }

    pub fn bert_address(&self) -> Option<u64> {
        self.bert.as_ref().map(ReservedRegion::address)
    }

    /// Records a boot error in the next free BERT slot.
    ///
    /// Once the BERT is published the slot is cleaned to the point of coherency after it is written.
    ///
    /// Fails with `NotReady` before [`Apei::init`] and with `OutOfResources` once every slot is used.
    pub fn record_boot_error(&mut self, error: &BootError<'_>) -> Result<()> {
        let bert = self.bert.as_mut().ok_or(EfiError::NotReady)?;
        let bert_address = bert.address();
        let region = bert.as_mut_slice();
        let slot = (0..BERT_ERROR_MAX).find(|slot| slot_is_free(region, *slot)).ok_or_else(|| {
            log::warn!(
                target: "apei",
                "BERT is full, dropping boot error {:#X}:{:#X}",
                error.error_type,
                error.subtype
            );
            EfiError::OutOfResources
        })?;

        let mut message = [0u8; BOOT_ERROR_MESSAGE_SIZE];
        let length = error.message.len().min(BOOT_ERROR_MESSAGE_SIZE);
        message[..length].copy_from_slice(&error.message[..length]);

        let status = GenericErrorStatus {
            block_status: U32::new(block_status(error.severity, 1)),
            data_length: U32::new((GENERIC_ERROR_DATA_ENTRY_SIZE + ERROR_PAYLOAD_SIZE) as u32),
            error_severity: U32::new(error.severity as u32),
            ..Default::default()
        };
        let entry = GenericErrorDataEntry {
            section_type: *BOOT_ERROR_SECTION_GUID.as_bytes(),
            error_severity: U32::new(error.severity as u32),
            revision: U16::new(GENERIC_ERROR_DATA_ENTRY_REVISION),
            error_data_length: U32::new(ERROR_PAYLOAD_SIZE as u32),
            ..Default::default()
        };
        let payload = BootErrorPayload {
            error_type: error.error_type,
            subtype: error.subtype,
            instance: U16::new(error.instance),
            message,
        };

        let offset = bert_slot_offset(slot);
        let entry_offset = offset + GENERIC_ERROR_STATUS_SIZE;
        let payload_offset = entry_offset + GENERIC_ERROR_DATA_ENTRY_SIZE;
        region[offset..entry_offset].copy_from_slice(status.as_bytes());
        region[entry_offset..payload_offset].copy_from_slice(entry.as_bytes());
        region[payload_offset..payload_offset + ERROR_PAYLOAD_SIZE].copy_from_slice(payload.as_bytes());

        if self.published {
            self.cache.invalidate_data_cache_range(bert_address + offset as u64, BERT_SLOT_SIZE);
        }
        log::debug!(
            target: "apei",
            "Boot error {:#X}:{:#X} recorded in BERT slot {}",
            error.error_type,
            error.subtype,
            slot
        );
        Ok(())
    }

    fn secure_call(&self, args: SmcArgs) -> Result<()> {
        match self.monitor.call(args).status() {
            SMCCC_SUCCESS => Ok(()),
            SMCCC_NOT_SUPPORTED => {
                log::warn!(target: "apei", "SMC {:#010X} not supported", args.function_id);
                Err(EfiError::Unsupported)
            }
            SMCCC_INVALID_PARAMETER => {
                log::error!(target: "apei", "SMC {:#010X} rejected its arguments", args.function_id);
                Err(EfiError::InvalidParameter)
            }
            status => {
                log::error!(target: "apei", "SMC {:#010X} failed with {}", args.function_id, status);
                Err(EfiError::DeviceError)
            }
        }
    }
}

fn block_status(severity: ErrorSeverity, entries: u32) -> u32 {
    let valid = match severity {
        ErrorSeverity::Corrected => BLOCK_STATUS_CORRECTABLE_VALID,
        _ => BLOCK_STATUS_UNCORRECTABLE_VALID,
    };
    valid | (entries << BLOCK_STATUS_ENTRY_COUNT_SHIFT)
}

fn slot_is_free(region: &[u8], slot: usize) -> bool {
    let offset = bert_slot_offset(slot);
    GenericErrorStatus::read_from_prefix(&region[offset..])
        .map(|(status, _)| status.block_status.get() == 0)
        .unwrap_or(false)
}

fn write_table_header(region: &mut [u8], total_length: usize, error_source_count: usize) {
    let header = TableHeader {
        total_length: U32::new(total_length as u32),
        error_source_count: U32::new(error_source_count as u32),
        ..Default::default()
    };
    region[..TABLE_HEADER_SIZE].copy_from_slice(header.as_bytes());
}

fn write_source_header(region: &mut [u8], offset: usize, entries: usize, length: usize) {
    let header =
        ErrorSourceHeader { error_data_entry_count: U32::new(entries as u32), length: U32::new(length as u32) };
    region[offset..offset + ERROR_SOURCE_HEADER_SIZE].copy_from_slice(header.as_bytes());
}

fn format_ghes(region: &mut [u8]) {
    region.fill(0);
    write_table_header(region, GHES_REGION_SIZE, ACPI_APEI_GHES_MAX);
    for index in 0..ACPI_APEI_GHES_MAX {
        write_source_header(region, ghes_source_offset(index), GHES_ERROR_DATA_ENTRY_MAX, GHES_ESB_SIZE);
    }
}

fn format_bert(region: &mut [u8]) {
    region.fill(0);
    write_table_header(region, BERT_REGION_SIZE, 1);
    write_source_header(region, bert_source_offset(), BERT_ERROR_MAX, BERT_SOURCE_SIZE - ERROR_SOURCE_HEADER_SIZE);
}
