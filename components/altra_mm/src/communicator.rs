//! Management Mode (MM) Communicator Service
//!
//! Provides a MM communication service that can be used to send and receive messages to MM handlers.
//!
//! ## Logging
//!
//! Detailed logging is available for this component using the `mm_comm` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::config::{CommunicateBuffer, EfiMmCommunicateHeader, MmCommunicationConfiguration};
extern crate alloc;
use alloc::{boxed::Box, vec::Vec};

use core::cell::RefCell;
use core::fmt::{self, Debug};

use altra_sdk::{
    error::EfiError,
    smc::{SecureMonitor, SmcArgs},
};
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use r_efi::efi;

/// `MM_COMMUNICATE` return value for success.
pub const ARM_SMC_MM_RET_SUCCESS: i64 = 0;
/// `MM_COMMUNICATE` return value when no partition or handler serves the request.
pub const ARM_SMC_MM_RET_NOT_SUPPORTED: i64 = -1;
pub const ARM_SMC_MM_RET_INVALID_PARAMS: i64 = -2;
pub const ARM_SMC_MM_RET_DENIED: i64 = -3;
pub const ARM_SMC_MM_RET_NO_MEMORY: i64 = -5;

/// Trait for handling MM execution behavior.
///
/// This trait abstracts the world switch into the secure partition so testing can be performed without invoking
/// real MM transitions.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MmExecutor {
    /// Execute MM with the given communication buffer.
    ///
    /// The MM handler addressed by the buffer header processes the request in place and leaves its response in the
    /// same buffer.
    fn execute_mm(&self, comm_buffer: &mut CommunicateBuffer) -> Result<(), Status>;
}

/// MM executor that issues `MM_COMMUNICATE` through the secure monitor.
pub struct SmcMmExecutor<M: SecureMonitor> {
    monitor: M,
    function_id: u32,
}

impl<M: SecureMonitor> SmcMmExecutor<M> {
    pub fn new(monitor: M, function_id: u32) -> Self {
        Self { monitor, function_id }
    }
}

impl<M: SecureMonitor> MmExecutor for SmcMmExecutor<M> {
    fn execute_mm(&self, comm_buffer: &mut CommunicateBuffer) -> Result<(), Status> {
        // X1 and X3 are cookies that must be zero. X2 carries the buffer address.
        let args = SmcArgs::new(self.function_id).with_arg(2, comm_buffer.physical_address());
        log::debug!(target: "mm_comm", "Issuing MM_COMMUNICATE {:#010X} buffer={:#X}", self.function_id, args.arg(2));

        let status = self.monitor.call(args).status();
        match status {
            ARM_SMC_MM_RET_SUCCESS => Ok(()),
            ARM_SMC_MM_RET_NOT_SUPPORTED => Err(Status::NotSupported),
            ARM_SMC_MM_RET_INVALID_PARAMS => Err(Status::InvalidParameter),
            ARM_SMC_MM_RET_DENIED => Err(Status::Denied),
            ARM_SMC_MM_RET_NO_MEMORY => Err(Status::NoMemory),
            other => {
                log::error!(target: "mm_comm", "MM_COMMUNICATE failed with {}", other);
                Err(Status::ExecutionFailed)
            }
        }
    }
}

/// MM Communicator Service Status Codes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    /// No communication buffers are available.
    NoCommBuffer,
    /// The specified communication buffer was not found.
    CommBufferNotFound,
    /// The specified communication buffer is too small for the operation.
    CommBufferTooSmall,
    /// An error occurred while initializing the communication buffer contents.
    CommBufferInitError,
    /// The given data buffer is empty or invalid.
    InvalidDataBuffer,
    /// No MM handler serves the request.
    NotSupported,
    /// The secure partition rejected the call arguments.
    InvalidParameter,
    /// The secure partition refused the call.
    Denied,
    /// The secure partition ran out of memory.
    NoMemory,
    /// The MM transition failed.
    ExecutionFailed,
    /// Failed to retrieve a valid response from the communication buffer.
    InvalidResponse,
}

impl From<Status> for EfiError {
    fn from(status: Status) -> Self {
        match status {
            Status::NoCommBuffer | Status::CommBufferNotFound | Status::NotSupported => EfiError::Unsupported,
            Status::CommBufferTooSmall => EfiError::BufferTooSmall,
            Status::InvalidDataBuffer | Status::InvalidParameter => EfiError::InvalidParameter,
            Status::Denied => EfiError::AccessDenied,
            Status::NoMemory => EfiError::OutOfResources,
            Status::CommBufferInitError | Status::ExecutionFailed | Status::InvalidResponse => EfiError::DeviceError,
        }
    }
}

/// MM Communication Trait
///
/// Provides a mechanism for components to communicate with MM handlers.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MmCommunication {
    /// Sends messages via a communication ("comm") buffer to a MM handler and receives a response.
    ///
    /// # Parameters
    ///
    /// - `id`: The ID of the comm buffer to use.
    /// - `data_buffer`: The data to send to the MM handler.
    /// - `recipient`: The GUID of the recipient MM handler.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<u8>)`: The response data from the MM handler.
    /// - `Err(Status)`: An error status indicating the failure reason.
    fn communicate(&self, id: u8, data_buffer: &[u8], recipient: efi::Guid) -> Result<Vec<u8>, Status>;
}

impl<T: MmCommunication + ?Sized> MmCommunication for &T {
    fn communicate(&self, id: u8, data_buffer: &[u8], recipient: efi::Guid) -> Result<Vec<u8>, Status> {
        (**self).communicate(id, data_buffer, recipient)
    }
}

/// MM Communicator Service
///
/// Allows sending messages via a communication ("comm") buffer and receiving responses from the MM handler where
/// the response is stored in the same buffer.
pub struct MmCommunicator {
    comm_buffers: RefCell<Vec<CommunicateBuffer>>,
    mm_executor: Box<dyn MmExecutor>,
}

impl MmCommunicator {
    /// Create a new `MmCommunicator` over the configured buffers with a custom MM executor.
    pub fn new(config: MmCommunicationConfiguration, executor: Box<dyn MmExecutor>) -> Self {
        log::info!(
            target: "mm_comm",
            "MM Communicator initialized with {} communication buffers",
            config.comm_buffers.len()
        );
        Self { comm_buffers: RefCell::new(config.comm_buffers), mm_executor: executor }
    }

    /// Create a new `MmCommunicator` that enters MM through `monitor`.
    pub fn with_secure_monitor<M: SecureMonitor + 'static>(config: MmCommunicationConfiguration, monitor: M) -> Self {
        let executor = SmcMmExecutor::new(monitor, config.smc_function_id);
        Self::new(config, Box::new(executor))
    }
}

impl Debug for MmCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MM Communicator:")?;
        for buffer in self.comm_buffers.borrow().iter() {
            writeln!(f, "Comm Buffer: {buffer:?}")?;
        }
        Ok(())
    }
}

impl MmCommunication for MmCommunicator {
    fn communicate(&self, id: u8, data_buffer: &[u8], recipient: efi::Guid) -> Result<Vec<u8>, Status> {
        log::debug!(
            target: "mm_comm",
            "Starting MM communication: buffer_id={}, data_size={}, recipient={:?}",
            id,
            data_buffer.len(),
            recipient
        );

        if self.comm_buffers.borrow().is_empty() {
            log::warn!(target: "mm_comm", "No communication buffers available");
            return Err(Status::NoCommBuffer);
        }

        if data_buffer.is_empty() {
            log::warn!(target: "mm_comm", "Invalid data buffer: empty");
            return Err(Status::InvalidDataBuffer);
        }

        let mut comm_buffers = self.comm_buffers.borrow_mut();
        let comm_buffer: &mut CommunicateBuffer = comm_buffers.iter_mut().find(|x| x.id() == id).ok_or_else(|| {
            log::warn!(target: "mm_comm", "Communication buffer not found: id={}", id);
            Status::CommBufferNotFound
        })?;

        let total_required_comm_buffer_length = EfiMmCommunicateHeader::size() + data_buffer.len();
        log::trace!(
            target: "mm_comm",
            "Buffer validation: buffer_len={}, required_len={}",
            comm_buffer.len(),
            total_required_comm_buffer_length
        );

        if comm_buffer.len() < total_required_comm_buffer_length {
            log::warn!(
                target: "mm_comm",
                "Communication buffer too small: available={}, required={}",
                comm_buffer.len(),
                total_required_comm_buffer_length
            );
            return Err(Status::CommBufferTooSmall);
        }

        log::trace!(target: "mm_comm", "Resetting the comm buffer and internal tracking state");
        comm_buffer.reset();

        comm_buffer.set_message_info(recipient).map_err(|err| {
            log::error!(target: "mm_comm", "Failed to set message info: {:?}", err);
            Status::CommBufferInitError
        })?;
        comm_buffer.set_message(data_buffer).map_err(|err| {
            log::error!(target: "mm_comm", "Failed to set message data: {:?}", err);
            Status::CommBufferInitError
        })?;

        log::debug!(
            target: "mm_comm",
            "Request Data (hex): {:02X?}",
            &data_buffer[..core::cmp::min(data_buffer.len(), 64)]
        );
        log::trace!(target: "mm_comm", "Comm buffer before request: {:?}", comm_buffer);

        self.mm_executor.execute_mm(comm_buffer)?;

        let response = comm_buffer.get_message().map_err(|err| {
            log::error!(target: "mm_comm", "Failed to retrieve response from communication buffer: {:?}", err);
            Status::InvalidResponse
        })?;
        log::debug!(target: "mm_comm", "MM communication response received: size={}", response.len());

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerDispatcher, MmHandler};
    use altra_sdk::smc::{MockSecureMonitor, SmcReturn};
    use core::pin::Pin;
    use mockall::predicate::function;

    static TEST_DATA: [u8; 3] = [0x01, 0x02, 0x03];
    const TEST_RECIPIENT: efi::Guid =
        efi::Guid::from_fields(0x12345678, 0x1234, 0x5678, 0x12, 0x34, &[0x56, 0x78, 0x90, 0xab, 0xcd, 0xef]);

    struct Reverse;

    impl MmHandler for Reverse {
        fn handle_request(&self, data: &[u8]) -> Result<Vec<u8>, Status> {
            let mut reversed = data.to_vec();
            reversed.reverse();
            Ok(reversed)
        }
    }

    fn buffer(size: usize, id: u8) -> CommunicateBuffer {
        let memory: &'static mut [u8] = Box::leak(vec![0u8; size].into_boxed_slice());
        unsafe { CommunicateBuffer::new(Pin::new(memory), id) }
    }

    fn communicator(buffers: Vec<CommunicateBuffer>, executor: impl MmExecutor + 'static) -> MmCommunicator {
        let config = MmCommunicationConfiguration { comm_buffers: buffers, ..Default::default() };
        MmCommunicator::new(config, Box::new(executor))
    }

    fn echo() -> HandlerDispatcher {
        HandlerDispatcher::new().with_handler(TEST_RECIPIENT, Reverse)
    }

    #[test]
    fn test_communicate_no_comm_buffer() {
        let mut mock_executor = MockMmExecutor::new();
        mock_executor.expect_execute_mm().never();

        let communicator = communicator(vec![], mock_executor);
        assert_eq!(communicator.communicate(0, &TEST_DATA, TEST_RECIPIENT), Err(Status::NoCommBuffer));
    }

    #[test]
    fn test_communicate_empty_data_buffer() {
        let mut mock_executor = MockMmExecutor::new();
        mock_executor.expect_execute_mm().never();

        let communicator = communicator(vec![buffer(1024, 0)], mock_executor);
        assert_eq!(communicator.communicate(0, &[], TEST_RECIPIENT), Err(Status::InvalidDataBuffer));
    }

    #[test]
    fn test_communicate_buffer_not_found() {
        let mut mock_executor = MockMmExecutor::new();
        mock_executor.expect_execute_mm().never();

        let communicator = communicator(vec![buffer(1024, 0)], mock_executor);
        assert_eq!(communicator.communicate(99, &TEST_DATA, TEST_RECIPIENT), Err(Status::CommBufferNotFound));
    }

    #[test]
    fn test_communicate_buffer_too_small() {
        let mut mock_executor = MockMmExecutor::new();
        mock_executor.expect_execute_mm().never();

        let communicator = communicator(vec![buffer(10, 0)], mock_executor);
        assert_eq!(communicator.communicate(0, &[0x42; 100], TEST_RECIPIENT), Err(Status::CommBufferTooSmall));
    }

    #[test]
    fn test_communicate_successful_transform() {
        let communicator = communicator(vec![buffer(1024, 0)], echo());
        assert_eq!(communicator.communicate(0, &[1, 2, 3, 4, 5], TEST_RECIPIENT), Ok(vec![5, 4, 3, 2, 1]));
    }

    #[test]
    fn test_communicate_with_multiple_buffers() {
        let communicator = communicator(vec![buffer(512, 1), buffer(1024, 5), buffer(256, 10)], echo());
        assert_eq!(communicator.communicate(1, b"ab", TEST_RECIPIENT), Ok(b"ba".to_vec()));
        assert_eq!(communicator.communicate(5, b"abc", TEST_RECIPIENT), Ok(b"cba".to_vec()));
        assert_eq!(communicator.communicate(10, b"abcd", TEST_RECIPIENT), Ok(b"dcba".to_vec()));
    }

    #[test]
    fn test_communicate_largest_message() {
        let communicator = communicator(vec![buffer(4096, 0)], echo());
        let large_data = vec![0x55; 4096 - EfiMmCommunicateHeader::size()];
        assert_eq!(communicator.communicate(0, &large_data, TEST_RECIPIENT), Ok(large_data));
    }

    #[test]
    fn test_communicate_unknown_recipient() {
        let communicator = communicator(vec![buffer(1024, 0)], HandlerDispatcher::new());
        assert_eq!(communicator.communicate(0, &TEST_DATA, TEST_RECIPIENT), Err(Status::NotSupported));
    }

    #[test]
    fn test_communicate_mm_executor_error() {
        let mut mock_executor = MockMmExecutor::new();
        mock_executor.expect_execute_mm().times(1).returning(|_| Err(Status::ExecutionFailed));

        let communicator = communicator(vec![buffer(1024, 0)], mock_executor);
        assert_eq!(communicator.communicate(0, &TEST_DATA, TEST_RECIPIENT), Err(Status::ExecutionFailed));
    }

    #[test]
    fn test_communicate_detects_corrupted_response() {
        let mut mock_executor = MockMmExecutor::new();
        mock_executor.expect_execute_mm().times(1).returning(|comm_buffer| {
            comm_buffer.as_slice_mut()[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
            Ok(())
        });

        let communicator = communicator(vec![buffer(1024, 0)], mock_executor);
        assert_eq!(communicator.communicate(0, &TEST_DATA, TEST_RECIPIENT), Err(Status::InvalidResponse));
    }

    #[test]
    fn test_smc_executor_passes_buffer_address() {
        let mut comm_buffer = buffer(64, 0);
        let address = comm_buffer.physical_address();

        let mut monitor = MockSecureMonitor::new();
        monitor
            .expect_call()
            .with(function(move |args: &SmcArgs| {
                args.function_id == 0xC400_0041 && args.arg(1) == 0 && args.arg(2) == address && args.arg(3) == 0
            }))
            .times(1)
            .return_const(SmcReturn::from(ARM_SMC_MM_RET_SUCCESS));

        let executor = SmcMmExecutor::new(monitor, 0xC400_0041);
        assert_eq!(executor.execute_mm(&mut comm_buffer), Ok(()));
    }

    #[test]
    fn test_smc_executor_maps_status() {
        for (ret, expected) in [
            (ARM_SMC_MM_RET_NOT_SUPPORTED, Status::NotSupported),
            (ARM_SMC_MM_RET_INVALID_PARAMS, Status::InvalidParameter),
            (ARM_SMC_MM_RET_DENIED, Status::Denied),
            (ARM_SMC_MM_RET_NO_MEMORY, Status::NoMemory),
            (-4, Status::ExecutionFailed),
        ] {
            let mut monitor = MockSecureMonitor::new();
            monitor.expect_call().return_const(SmcReturn::from(ret));
            let executor = SmcMmExecutor::new(monitor, 0xC400_0041);
            assert_eq!(executor.execute_mm(&mut buffer(64, 0)), Err(expected));
        }
    }

    #[test]
    fn test_status_to_efi_error() {
        assert_eq!(EfiError::from(Status::NotSupported), EfiError::Unsupported);
        assert_eq!(EfiError::from(Status::CommBufferTooSmall), EfiError::BufferTooSmall);
        assert_eq!(EfiError::from(Status::InvalidResponse), EfiError::DeviceError);
    }
}
