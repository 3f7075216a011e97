//! MM Handler Dispatch
//!
//! The secure partition side of a communicate exchange: a handler registered for a GUID receives the message of
//! every request addressed to that GUID and produces the response that is written back into the buffer.
//!
//! [`HandlerDispatcher`] implements [`MmExecutor`] by dispatching in place of a real world switch. Services that
//! define an MM protocol use it to run their handler model against the normal world client.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::{boxed::Box, vec::Vec};

use r_efi::efi;

use crate::{
    communicator::{MmExecutor, Status},
    config::CommunicateBuffer,
};

/// A handler for MM requests addressed to one GUID.
pub trait MmHandler {
    /// Handles a request message and returns the response message.
    fn handle_request(&self, data: &[u8]) -> Result<Vec<u8>, Status>;
}

/// Routes communicate buffers to the handler registered for their header GUID.
#[derive(Default)]
pub struct HandlerDispatcher {
    handlers: Vec<(efi::Guid, Box<dyn MmHandler>)>,
}

impl HandlerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for requests addressed to `guid`, replacing any previous registration.
    pub fn with_handler(mut self, guid: efi::Guid, handler: impl MmHandler + 'static) -> Self {
        self.handlers.retain(|(registered, _)| *registered != guid);
        self.handlers.push((guid, Box::new(handler)));
        self
    }
}

impl MmExecutor for HandlerDispatcher {
    fn execute_mm(&self, comm_buffer: &mut CommunicateBuffer) -> Result<(), Status> {
        let recipient = comm_buffer.get_header_guid().map_err(|_| Status::InvalidDataBuffer)?;
        let request = comm_buffer.get_message().map_err(|_| Status::InvalidDataBuffer)?;

        let (_, handler) = self.handlers.iter().find(|(guid, _)| *guid == recipient).ok_or_else(|| {
            log::warn!(target: "mm_comm", "No MM handler registered for {:?}", recipient);
            Status::NotSupported
        })?;
        let response = handler.handle_request(&request)?;

        comm_buffer.reset();
        comm_buffer.set_message_info(recipient).map_err(|_| Status::CommBufferInitError)?;
        comm_buffer.set_message(&response).map_err(|_| Status::CommBufferTooSmall)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::pin::Pin;

    const GUID_A: efi::Guid = efi::Guid::from_fields(1, 2, 3, 4, 5, &[6, 7, 8, 9, 10, 11]);
    const GUID_B: efi::Guid = efi::Guid::from_fields(11, 2, 3, 4, 5, &[6, 7, 8, 9, 10, 11]);

    struct Constant(&'static [u8]);

    impl MmHandler for Constant {
        fn handle_request(&self, _data: &[u8]) -> Result<Vec<u8>, Status> {
            Ok(self.0.to_vec())
        }
    }

    fn request(recipient: efi::Guid, data: &[u8]) -> CommunicateBuffer {
        let memory: &'static mut [u8; 64] = Box::leak(Box::new([0u8; 64]));
        let mut buffer = unsafe { CommunicateBuffer::new(Pin::new(memory), 0) };
        buffer.set_message_info(recipient).unwrap();
        buffer.set_message(data).unwrap();
        buffer
    }

    #[test]
    fn test_dispatch_by_guid() {
        let dispatcher =
            HandlerDispatcher::new().with_handler(GUID_A, Constant(b"a")).with_handler(GUID_B, Constant(b"b"));

        let mut buffer = request(GUID_B, b"x");
        assert_eq!(dispatcher.execute_mm(&mut buffer), Ok(()));
        assert_eq!(buffer.get_message(), Ok(b"b".to_vec()));
    }

    #[test]
    fn test_later_registration_replaces() {
        let dispatcher =
            HandlerDispatcher::new().with_handler(GUID_A, Constant(b"old")).with_handler(GUID_A, Constant(b"new"));
        let mut buffer = request(GUID_A, b"x");
        dispatcher.execute_mm(&mut buffer).unwrap();
        assert_eq!(buffer.get_message(), Ok(b"new".to_vec()));
    }

    #[test]
    fn test_response_larger_than_buffer() {
        let dispatcher = HandlerDispatcher::new().with_handler(GUID_A, Constant(&[0u8; 41]));
        let mut buffer = request(GUID_A, b"x");
        assert_eq!(dispatcher.execute_mm(&mut buffer), Err(Status::CommBufferTooSmall));
    }
}
