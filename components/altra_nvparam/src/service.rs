//! NVParam Service
//!
//! The permission-checked get/set/clear interface used by boot firmware. Every call validates its arguments before
//! any request leaves the service, dispatches synchronously through an [`NvParamTransport`] and translates the
//! owner's status into an [`EfiError`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use altra_sdk::error::{EfiError, Result};

use crate::{
    param::{validate_param_id, Acl},
    protocol::NvParamRequest,
    transport::NvParamTransport,
};

/// Access to the NVParam store through one transport.
pub struct NvParamService<T: NvParamTransport> {
    transport: T,
}

impl<T: NvParamTransport> NvParamService<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reads parameter `param_id` as the contexts in `read_acl`.
    ///
    /// Fails with `NotFound` when the parameter was never set and `AccessDenied` when none of the contexts in
    /// `read_acl` may read it.
    pub fn get(&self, param_id: u32, read_acl: Acl) -> Result<u32> {
        validate_param_id(param_id)?;
        require_caller(read_acl)?;
        let value = self.transport.dispatch(&NvParamRequest::get(param_id, read_acl))?.into_result()?;
        log::debug!(target: "nvparam", "Get {:#X} = {:#X}", param_id, value);
        Ok(value)
    }

    /// Writes `value` to parameter `param_id`.
    ///
    /// The first write creates the parameter with `read_acl` and `write_acl` and these stay attached to it until
    /// it is cleared. Later writes must come from a context in the stored write ACL.
    pub fn set(&self, param_id: u32, read_acl: Acl, write_acl: Acl, value: u32) -> Result<()> {
        validate_param_id(param_id)?;
        require_caller(write_acl)?;
        log::debug!(
            target: "nvparam",
            "Set {:#X} = {:#X} (read {:?}, write {:?})",
            param_id,
            value,
            read_acl,
            write_acl
        );
        self.transport.dispatch(&NvParamRequest::set(param_id, read_acl, write_acl, value))?.into_result()?;
        Ok(())
    }

    /// Erases parameter `param_id`. Clearing a parameter that is not set succeeds.
    pub fn clear(&self, param_id: u32, write_acl: Acl) -> Result<()> {
        validate_param_id(param_id)?;
        require_caller(write_acl)?;
        log::debug!(target: "nvparam", "Clear {:#X}", param_id);
        self.transport.dispatch(&NvParamRequest::clear(param_id, write_acl))?.into_result()?;
        Ok(())
    }

    /// Erases every parameter. This cannot be undone.
    pub fn clear_all(&self) -> Result<()> {
        log::warn!(target: "nvparam", "Clearing all NVParams");
        self.transport.dispatch(&NvParamRequest::clear_all())?.into_result()?;
        Ok(())
    }
}

fn require_caller(acl: Acl) -> Result<()> {
    if acl.is_empty() {
        log::warn!(target: "nvparam", "Request without a caller ACL");
        return Err(EfiError::InvalidParameter);
    }
    Ok(())
}
