//! NVParam Store Model
//!
//! The owner side of the NVParam protocol: an in-memory parameter store that enforces the access control contract,
//! and the MM and SMC handlers that serve protocol requests from it.
//!
//! ## Access Control
//!
//! - The first `Set` of a parameter creates it and fixes its read and write ACLs.
//! - A later `Set` or `Clear` must come from a context in the stored write ACL. The ACLs are not changed by it.
//! - A `Get` must come from a context in the stored read ACL.
//! - `Clear` of a parameter that is not set succeeds. `ClearAll` ignores ACLs.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::{collections::BTreeMap, rc::Rc, vec::Vec};
use core::cell::RefCell;

use altra_mm::{communicator::Status, handler::MmHandler};
use altra_sdk::smc::{SecureMonitor, SmcArgs, SmcReturn, SMCCC_NOT_SUPPORTED, SMCCC_SUCCESS};
use zerocopy::IntoBytes;

use crate::{
    param::{Acl, NvParamBand},
    protocol::{NvParamOperation, NvParamRequest, NvParamResponse, NvParamStatus},
};

/// A stored parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvParamEntry {
    pub value: u32,
    pub read_acl: Acl,
    pub write_acl: Acl,
}

/// In-memory NVParam storage.
#[derive(Debug, Default)]
pub struct NvParamStore {
    entries: BTreeMap<u32, NvParamEntry>,
}

pub type SharedNvParamStore = Rc<RefCell<NvParamStore>>;

impl NvParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedNvParamStore {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn entry(&self, param_id: u32) -> Option<&NvParamEntry> {
        self.entries.get(&param_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, param_id: u32, read_acl: Acl) -> Result<u32, NvParamStatus> {
        Self::check_id(param_id)?;
        let entry = self.entries.get(&param_id).ok_or(NvParamStatus::NotSet)?;
        if !entry.read_acl.intersects(read_acl) {
            return Err(NvParamStatus::NoPermission);
        }
        Ok(entry.value)
    }

    pub fn set(&mut self, param_id: u32, read_acl: Acl, write_acl: Acl, value: u32) -> Result<(), NvParamStatus> {
        Self::check_id(param_id)?;
        match self.entries.get_mut(&param_id) {
            Some(entry) => {
                if !entry.write_acl.intersects(write_acl) {
                    return Err(NvParamStatus::NoPermission);
                }
                entry.value = value;
            }
            None => {
                if write_acl.is_empty() {
                    return Err(NvParamStatus::Invalid);
                }
                self.entries.insert(param_id, NvParamEntry { value, read_acl, write_acl });
            }
        }
        Ok(())
    }

    pub fn clear(&mut self, param_id: u32, write_acl: Acl) -> Result<(), NvParamStatus> {
        Self::check_id(param_id)?;
        if let Some(entry) = self.entries.get(&param_id) {
            if !entry.write_acl.intersects(write_acl) {
                return Err(NvParamStatus::NoPermission);
            }
            self.entries.remove(&param_id);
        }
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Applies a protocol request and returns the protocol response.
    pub fn apply(&mut self, request: &NvParamRequest) -> NvParamResponse {
        let result = match request.operation {
            NvParamOperation::Get => self.get(request.param_id, request.read_acl),
            NvParamOperation::Set => {
                self.set(request.param_id, request.read_acl, request.write_acl, request.value).map(|_| 0)
            }
            NvParamOperation::Clear => self.clear(request.param_id, request.write_acl).map(|_| 0),
            NvParamOperation::ClearAll => {
                self.clear_all();
                Ok(0)
            }
        };
        match result {
            Ok(value) => NvParamResponse::new(NvParamStatus::Success, value),
            Err(status) => NvParamResponse::new(status, 0),
        }
    }

    fn check_id(param_id: u32) -> Result<(), NvParamStatus> {
        NvParamBand::of(param_id).map(|_| ()).ok_or(NvParamStatus::Invalid)
    }
}

/// Serves NVParam requests arriving through MM communicate.
pub struct NvParamMmHandler {
    store: SharedNvParamStore,
}

impl NvParamMmHandler {
    pub fn new(store: SharedNvParamStore) -> Self {
        Self { store }
    }
}

impl MmHandler for NvParamMmHandler {
    fn handle_request(&self, data: &[u8]) -> Result<Vec<u8>, Status> {
        let response = match NvParamRequest::from_bytes(data) {
            Ok(request) => self.store.borrow_mut().apply(&request),
            Err(status) => NvParamResponse::new(status, 0),
        };
        Ok(response.to_message().as_bytes().to_vec())
    }
}

/// Serves NVParam requests arriving through a secure monitor call.
pub struct NvParamSmcHandler {
    function_id: u32,
    store: SharedNvParamStore,
}

impl NvParamSmcHandler {
    pub fn new(function_id: u32, store: SharedNvParamStore) -> Self {
        Self { function_id, store }
    }
}

impl SecureMonitor for NvParamSmcHandler {
    fn call(&self, args: SmcArgs) -> SmcReturn {
        if args.function_id != self.function_id {
            return SmcReturn::from(SMCCC_NOT_SUPPORTED);
        }
        let Ok(operation) = NvParamOperation::try_from(args.arg(1) as u32) else {
            return SmcReturn::new(SMCCC_SUCCESS as u64, NvParamStatus::Invalid.word() as u64, 0, 0);
        };
        let request = NvParamRequest {
            operation,
            param_id: args.arg(2) as u32,
            read_acl: Acl::from_bits_retain(args.arg(3) as u32),
            write_acl: Acl::from_bits_retain(args.arg(4) as u32),
            value: args.arg(5) as u32,
        };
        let response = self.store.borrow_mut().apply(&request);
        SmcReturn::new(SMCCC_SUCCESS as u64, response.status.word() as u64, response.value as u64, 0)
    }
}
