//! Management Mode (MM) Configuration
//!
//! Defines the communicate buffer shared with the secure partition and the configuration needed to reach MM
//! handlers.
//!
//! ## MM Configuration Usage
//!
//! The platform populates the communication buffers from the non-secure buffer region reserved for MM during boot
//! and hands the configuration to [`MmCommunicator`](crate::communicator::MmCommunicator). The buffers must stay
//! mapped at the same physical address for as long as the communicator is in use.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::vec::Vec;
use core::fmt;
use core::pin::Pin;
use core::ptr::NonNull;

use r_efi::efi;
use zerocopy::{FromBytes, IntoBytes, LittleEndian, U64};
use zerocopy_derive::*;

/// SMC64 function identifier of `MM_COMMUNICATE`.
pub const MM_COMMUNICATE_SMC64_ID: u32 = 0xC400_0041;

/// Management Mode (MM) Configuration
///
/// A standardized configuration structure for MM components to use when initializing and using MM services.
#[derive(Debug, Clone)]
pub struct MmCommunicationConfiguration {
    /// Function identifier of the `MM_COMMUNICATE` secure monitor call.
    pub smc_function_id: u32,
    pub comm_buffers: Vec<CommunicateBuffer>,
}

impl Default for MmCommunicationConfiguration {
    fn default() -> Self {
        MmCommunicationConfiguration { smc_function_id: MM_COMMUNICATE_SMC64_ID, comm_buffers: Vec::new() }
    }
}

/// UEFI MM Communicate Header
///
/// A standard header that must be present at the beginning of any MM communication buffer. The message length is a
/// `UINTN`, which is 64 bits wide on every platform this crate targets.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct EfiMmCommunicateHeader {
    /// Identifies the MM handler that should be given the message.
    pub header_guid: [u8; 16],
    /// The size of the message in bytes, not including the header.
    pub message_length: U64<LittleEndian>,
}

impl EfiMmCommunicateHeader {
    pub fn new(recipient: &efi::Guid, message_length: usize) -> Self {
        Self { header_guid: *recipient.as_bytes(), message_length: U64::new(message_length as u64) }
    }

    pub fn recipient(&self) -> efi::Guid {
        efi::Guid::from_bytes(&self.header_guid)
    }

    pub fn message_length(&self) -> usize {
        self.message_length.get() as usize
    }

    /// Returns the size of the header in bytes.
    pub const fn size() -> usize {
        core::mem::size_of::<Self>()
    }
}

/// Communicate Buffer Status Codes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommunicateBufferStatus {
    /// The buffer is too small to hold the header.
    TooSmallForHeader,
    /// The buffer is too small to hold the message.
    TooSmallForMessage,
    /// A valid recipient GUID was not provided.
    InvalidRecipient,
    /// The buffer is empty.
    Empty,
    /// The buffer pointer is null.
    NullPointer,
}

/// Management Mode (MM) Communicate Buffer
///
/// A buffer used for communication between the MM handler and the caller.
#[derive(Clone)]
pub struct CommunicateBuffer {
    /// Pointer to the buffer in memory.
    buffer: NonNull<u8>,
    /// ID of the buffer.
    id: u8,
    /// Length of the total buffer in bytes.
    length: usize,
    /// Length of the message last placed in the buffer.
    message_length: usize,
    /// Recipient GUID of the MM handler.
    recipient: Option<efi::Guid>,
}

impl CommunicateBuffer {
    /// Creates a new `CommunicateBuffer` with the given buffer and ID.
    ///
    /// ## Safety
    ///
    /// - The buffer must not be moved in memory while it is being used.
    /// - The buffer must not be accessed by any other code in the normal world while it is in use.
    pub unsafe fn new(buffer: Pin<&'static mut [u8]>, id: u8) -> Self {
        let slice = Pin::into_inner(buffer);
        let length = slice.len();
        Self { buffer: NonNull::from(slice).cast::<u8>(), id, length, message_length: 0, recipient: None }
    }

    /// Creates a new `CommunicateBuffer` from a raw pointer and size.
    ///
    /// ## Safety
    ///
    /// - The buffer must be a valid pointer to a memory region of at least `size` bytes.
    /// - The buffer must have a static lifetime.
    /// - The buffer must not be moved in memory while it is being used.
    /// - The buffer must not be used by any other code.
    pub unsafe fn from_raw_parts(buffer: *mut u8, size: usize, id: u8) -> Result<Self, CommunicateBufferStatus> {
        if size == 0 {
            return Err(CommunicateBufferStatus::Empty);
        }
        if buffer.is_null() {
            return Err(CommunicateBufferStatus::NullPointer);
        }
        // SAFETY: The caller guarantees the region is valid, static and exclusively owned.
        Ok(unsafe { Self::new(Pin::new(core::slice::from_raw_parts_mut(buffer, size)), id) })
    }

    /// Returns the buffer as a slice of bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: The constructor guarantees `length` valid bytes at `buffer` for the static lifetime.
        unsafe { core::slice::from_raw_parts(self.buffer.as_ptr(), self.length) }
    }

    /// Returns the buffer as a mutable slice of bytes.
    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        // SAFETY: The constructor guarantees `length` valid bytes at `buffer` for the static lifetime.
        unsafe { core::slice::from_raw_parts_mut(self.buffer.as_ptr(), self.length) }
    }

    /// Returns the physical address of the buffer. Boot firmware runs identity mapped.
    pub fn physical_address(&self) -> u64 {
        self.buffer.as_ptr() as u64
    }

    /// Returns the length of the buffer.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the ID of the buffer.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Clears the buffer contents and the tracked message state.
    pub fn reset(&mut self) {
        self.as_slice_mut().fill(0);
        self.message_length = 0;
        self.recipient = None;
    }

    /// Sets the information needed for a communication message to be sent to the MM handler.
    pub fn set_message_info(&mut self, recipient: efi::Guid) -> Result<(), CommunicateBufferStatus> {
        if self.len() < Self::message_start_offset() {
            return Err(CommunicateBufferStatus::TooSmallForHeader);
        }

        self.recipient = Some(recipient);
        Ok(())
    }

    /// Sets the data message used for communication with the MM handler.
    ///
    /// The message length in the communicate header is set to the length of `message`.
    pub fn set_message(&mut self, message: &[u8]) -> Result<(), CommunicateBufferStatus> {
        if message.len() > self.message_capacity() {
            return Err(CommunicateBufferStatus::TooSmallForMessage);
        }
        let recipient = self.recipient.ok_or(CommunicateBufferStatus::InvalidRecipient)?;
        self.message_length = message.len();

        let header = EfiMmCommunicateHeader::new(&recipient, message.len());
        let start = Self::message_start_offset();
        let buffer = self.as_slice_mut();
        buffer[..start].copy_from_slice(header.as_bytes());
        buffer[start..start + message.len()].copy_from_slice(message);

        Ok(())
    }

    /// Reads the communicate header currently in the buffer.
    pub fn header(&self) -> Result<EfiMmCommunicateHeader, CommunicateBufferStatus> {
        EfiMmCommunicateHeader::read_from_prefix(self.as_slice())
            .map(|(header, _)| header)
            .map_err(|_| CommunicateBufferStatus::TooSmallForHeader)
    }

    /// Returns the GUID in the communicate header currently in the buffer.
    pub fn get_header_guid(&self) -> Result<efi::Guid, CommunicateBufferStatus> {
        Ok(self.header()?.recipient())
    }

    /// Returns the message currently in the buffer.
    ///
    /// The length is taken from the communicate header, so this returns the handler's response after an MM
    /// transition. The header must still address the recipient set with [`Self::set_message_info`] and its length
    /// must fit in the buffer.
    pub fn get_message(&self) -> Result<Vec<u8>, CommunicateBufferStatus> {
        let header = self.header()?;
        if let Some(recipient) = self.recipient {
            if header.recipient() != recipient {
                return Err(CommunicateBufferStatus::InvalidRecipient);
            }
        }
        let length = header.message_length();
        if length > self.message_capacity() {
            return Err(CommunicateBufferStatus::TooSmallForMessage);
        }
        let start = Self::message_start_offset();
        Ok(self.as_slice()[start..start + length].to_vec())
    }

    /// Returns the length of the message last placed in the buffer by this side.
    pub fn message_length(&self) -> usize {
        self.message_length
    }

    /// Returns the available capacity for the message part of the communicate buffer.
    ///
    /// Zero is returned if the buffer is too small to hold the header.
    pub fn message_capacity(&self) -> usize {
        self.len().saturating_sub(Self::message_start_offset())
    }

    /// Returns the offset in the buffer where the message starts.
    pub const fn message_start_offset() -> usize {
        EfiMmCommunicateHeader::size()
    }
}

#[cfg(not(tarpaulin_include))]
impl fmt::Debug for CommunicateBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CommunicateBuffer(id: 0x{:X}. len: 0x{:X})", self.id(), self.len())?;
        for (i, chunk) in self.as_slice().chunks(16).enumerate() {
            write!(f, "{:08X}: ", i * 16)?;
            for byte in chunk {
                write!(f, "{:02X} ", byte)?;
            }
            if chunk.len() < 16 {
                write!(f, "{}", "   ".repeat(16 - chunk.len()))?;
            }
            write!(f, " |")?;
            for byte in chunk {
                if byte.is_ascii_graphic() || *byte == b' ' {
                    write!(f, "{}", *byte as char)?;
                } else {
                    write!(f, ".")?;
                }
            }
            writeln!(f, "|")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_efi::efi::Guid;

    const RECIPIENT: Guid =
        Guid::from_fields(0x12345678, 0x1234, 0x5678, 0x90, 0xAB, &[0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67]);

    fn leaked_buffer<const N: usize>(id: u8) -> CommunicateBuffer {
        let buffer: &'static mut [u8; N] = Box::leak(Box::new([0u8; N]));
        unsafe { CommunicateBuffer::new(Pin::new(buffer), id) }
    }

    #[test]
    fn test_header_is_guid_and_uintn() {
        assert_eq!(EfiMmCommunicateHeader::size(), 24);
    }

    #[test]
    fn test_set_message_info_failure_too_small_for_header() {
        let mut comm_buffer = leaked_buffer::<2>(1);
        assert_eq!(comm_buffer.set_message_info(RECIPIENT), Err(CommunicateBufferStatus::TooSmallForHeader));
    }

    #[test]
    fn test_set_message_failure_too_small_for_message() {
        let mut comm_buffer = leaked_buffer::<{ CommunicateBuffer::message_start_offset() }>(1);
        assert_eq!(comm_buffer.set_message_info(RECIPIENT), Ok(()));
        assert_eq!(
            comm_buffer.set_message("Test message data".as_bytes()),
            Err(CommunicateBufferStatus::TooSmallForMessage)
        );
    }

    #[test]
    fn test_set_message_failure_invalid_recipient() {
        let mut comm_buffer = leaked_buffer::<64>(1);
        assert_eq!(comm_buffer.set_message(b"Test message data"), Err(CommunicateBufferStatus::InvalidRecipient));
    }

    #[test]
    fn test_set_message_writes_header_and_payload() {
        let mut comm_buffer = leaked_buffer::<64>(1);
        let message = b"MM Handler!";
        comm_buffer.set_message_info(RECIPIENT).unwrap();
        comm_buffer.set_message(message).unwrap();

        assert_eq!(comm_buffer.message_length(), message.len());
        assert_eq!(&comm_buffer.as_slice()[..16], RECIPIENT.as_bytes());
        assert_eq!(comm_buffer.as_slice()[16..24], (message.len() as u64).to_le_bytes());
        assert_eq!(&comm_buffer.as_slice()[24..24 + message.len()], message);
        assert_eq!(comm_buffer.get_header_guid(), Ok(RECIPIENT));
        assert_eq!(comm_buffer.get_message(), Ok(message.to_vec()));
    }

    #[test]
    fn test_get_message_uses_header_length() {
        let mut comm_buffer = leaked_buffer::<64>(1);
        comm_buffer.set_message_info(RECIPIENT).unwrap();
        comm_buffer.set_message(b"request payload").unwrap();

        // A handler answering with a shorter response rewrites the length in place.
        comm_buffer.as_slice_mut()[16..24].copy_from_slice(&4u64.to_le_bytes());
        assert_eq!(comm_buffer.get_message(), Ok(b"requ".to_vec()));
    }

    #[test]
    fn test_get_message_rejects_oversized_length() {
        let mut comm_buffer = leaked_buffer::<64>(1);
        comm_buffer.set_message_info(RECIPIENT).unwrap();
        comm_buffer.set_message(b"abc").unwrap();
        comm_buffer.as_slice_mut()[16..24].copy_from_slice(&41u64.to_le_bytes());
        assert_eq!(comm_buffer.get_message(), Err(CommunicateBufferStatus::TooSmallForMessage));
    }

    #[test]
    fn test_get_message_rejects_foreign_recipient() {
        let mut comm_buffer = leaked_buffer::<64>(1);
        comm_buffer.set_message_info(RECIPIENT).unwrap();
        comm_buffer.set_message(b"abc").unwrap();
        comm_buffer.as_slice_mut()[0] ^= 0xFF;
        assert_eq!(comm_buffer.get_message(), Err(CommunicateBufferStatus::InvalidRecipient));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut comm_buffer = leaked_buffer::<64>(3);
        comm_buffer.set_message_info(RECIPIENT).unwrap();
        comm_buffer.set_message(b"abc").unwrap();
        comm_buffer.reset();
        assert!(comm_buffer.as_slice().iter().all(|byte| *byte == 0));
        assert_eq!(comm_buffer.message_length(), 0);
        assert_eq!(comm_buffer.set_message(b"abc"), Err(CommunicateBufferStatus::InvalidRecipient));
    }

    #[test]
    fn test_from_raw_parts() {
        let buffer: &'static mut [u8; 64] = Box::leak(Box::new([0u8; 64]));
        let address = buffer.as_ptr() as u64;
        let comm_buffer = unsafe { CommunicateBuffer::from_raw_parts(buffer.as_mut_ptr(), 64, 7) }.unwrap();
        assert_eq!(comm_buffer.len(), 64);
        assert_eq!(comm_buffer.id(), 7);
        assert_eq!(comm_buffer.physical_address(), address);

        assert_eq!(
            unsafe { CommunicateBuffer::from_raw_parts(core::ptr::null_mut(), 64, 1) }.err(),
            Some(CommunicateBufferStatus::NullPointer)
        );
        assert_eq!(
            unsafe { CommunicateBuffer::from_raw_parts(address as *mut u8, 0, 1) }.err(),
            Some(CommunicateBufferStatus::Empty)
        );
    }

    #[test]
    fn test_default_configuration() {
        let config = MmCommunicationConfiguration::default();
        assert_eq!(config.smc_function_id, 0xC400_0041);
        assert!(config.comm_buffers.is_empty());
    }
}
