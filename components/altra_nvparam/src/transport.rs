//! NVParam Transports
//!
//! The NVParam owner is reachable either directly through a secure monitor call or through MM communicate. Both
//! conduits implement [`NvParamTransport`] and carry the same request/response contract.
//!
//! ## SMC Register Usage
//!
//! | Register | Request          | Response                     |
//! |----------|------------------|------------------------------|
//! | `X0`     | function id      | SMCCC status                 |
//! | `X1`     | operation        | NVParam status word          |
//! | `X2`     | parameter id     | value                        |
//! | `X3`     | read ACL         |                              |
//! | `X4`     | write ACL        |                              |
//! | `X5`     | value            |                              |
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::boxed::Box;

use altra_mm::communicator::MmCommunication;
use altra_sdk::{
    error::{EfiError, Result},
    smc::{SecureMonitor, SmcArgs, SMCCC_INVALID_PARAMETER, SMCCC_NOT_SUPPORTED, SMCCC_SUCCESS},
};
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use r_efi::efi;
use zerocopy::IntoBytes;

use crate::{
    config::{NvParamBackend, NvParamConfig, NV_PARAM_MM_GUID},
    protocol::{NvParamRequest, NvParamResponse, NvParamStatus},
};

/// A synchronous conduit to the NVParam owner.
///
/// Errors are conduit failures. Outcomes decided by the owner (not set, no permission, ...) are carried in the
/// response status.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait NvParamTransport {
    fn dispatch(&self, request: &NvParamRequest) -> Result<NvParamResponse>;
}

impl<T: NvParamTransport + ?Sized> NvParamTransport for Box<T> {
    fn dispatch(&self, request: &NvParamRequest) -> Result<NvParamResponse> {
        (**self).dispatch(request)
    }
}

/// NVParam requests over a direct secure monitor call.
pub struct SmcTransport<M: SecureMonitor> {
    monitor: M,
    function_id: u32,
}

impl<M: SecureMonitor> SmcTransport<M> {
    pub fn new(monitor: M, function_id: u32) -> Self {
        Self { monitor, function_id }
    }
}

impl<M: SecureMonitor> NvParamTransport for SmcTransport<M> {
    fn dispatch(&self, request: &NvParamRequest) -> Result<NvParamResponse> {
        let args = SmcArgs::new(self.function_id)
            .with_arg(1, request.operation as u64)
            .with_arg(2, request.param_id as u64)
            .with_arg(3, request.read_acl.bits() as u64)
            .with_arg(4, request.write_acl.bits() as u64)
            .with_arg(5, request.value as u64);

        let ret = self.monitor.call(args);
        match ret.status() {
            SMCCC_SUCCESS => {
                Ok(NvParamResponse::new(NvParamStatus::from_word(ret.x[1] as u32), ret.x[2] as u32))
            }
            SMCCC_NOT_SUPPORTED => {
                log::warn!(target: "nvparam", "NVParam SMC {:#010X} not supported", self.function_id);
                Err(EfiError::Unsupported)
            }
            SMCCC_INVALID_PARAMETER => {
                log::warn!(target: "nvparam", "NVParam SMC rejected {:?}", request);
                Err(EfiError::InvalidParameter)
            }
            status => {
                log::error!(target: "nvparam", "NVParam SMC failed with {}", status);
                Err(EfiError::DeviceError)
            }
        }
    }
}

/// NVParam requests over MM communicate.
pub struct MmTransport<C: MmCommunication> {
    communicator: C,
    buffer_id: u8,
    recipient: efi::Guid,
}

impl<C: MmCommunication> MmTransport<C> {
    pub fn new(communicator: C, buffer_id: u8) -> Self {
        Self { communicator, buffer_id, recipient: NV_PARAM_MM_GUID }
    }
}

impl<C: MmCommunication> NvParamTransport for MmTransport<C> {
    fn dispatch(&self, request: &NvParamRequest) -> Result<NvParamResponse> {
        let message = request.to_message();
        let response =
            self.communicator.communicate(self.buffer_id, message.as_bytes(), self.recipient).map_err(|status| {
                log::warn!(target: "nvparam", "NVParam MM communicate failed: {:?}", status);
                EfiError::from(status)
            })?;
        NvParamResponse::from_bytes(&response)
    }
}

/// The transport selected by an [`NvParamConfig`].
pub enum ConfiguredTransport<M: SecureMonitor, C: MmCommunication> {
    Smc(SmcTransport<M>),
    Mm(MmTransport<C>),
}

impl<M: SecureMonitor, C: MmCommunication> ConfiguredTransport<M, C> {
    /// Builds the transport named by `config`. Only the conduit it selects is kept.
    pub fn from_config(config: &NvParamConfig, monitor: M, communicator: C) -> Self {
        match config.backend {
            NvParamBackend::Smc { function_id } => Self::Smc(SmcTransport::new(monitor, function_id)),
            NvParamBackend::Mm { buffer_id } => Self::Mm(MmTransport::new(communicator, buffer_id)),
        }
    }
}

impl<M: SecureMonitor, C: MmCommunication> NvParamTransport for ConfiguredTransport<M, C> {
    fn dispatch(&self, request: &NvParamRequest) -> Result<NvParamResponse> {
        match self {
            Self::Smc(transport) => transport.dispatch(request),
            Self::Mm(transport) => transport.dispatch(request),
        }
    }
}
