//! NVParam Support
//!
//! NVParams are persistent 32-bit configuration values shared by every firmware component of the platform (trusted
//! firmware, secure OS, boot firmware, manufacturing tools and the BMC). Each parameter carries a read ACL and a
//! write ACL naming the contexts allowed to access it. The store itself lives with trusted firmware; boot firmware
//! reaches it either with a direct secure monitor call or through an MM handler in the secure partition.
//!
//! - [`service::NvParamService`] is the client interface: `get`, `set`, `clear` and `clear_all`.
//! - [`transport`] holds the [`transport::NvParamTransport`] seam and its SMC and MM implementations.
//! - [`protocol`] defines the request/response contract shared by both transports.
//! - [`store`] models the owner side, enforcing the access control contract.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use altra_nvparam::{config::NvParamConfig, param::Acl, service::NvParamService, transport::ConfiguredTransport};
//!
//! let transport = ConfiguredTransport::from_config(&NvParamConfig::default(), ArmSmc, &communicator);
//! let service = NvParamService::new(transport);
//! service.set(0x1000, Acl::ATF | Acl::BIOS, Acl::ATF, 42)?;
//! ```
//!
//! ## Logging
//!
//! Requests and failures are logged under the `nvparam` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

pub mod config;
pub mod param;
pub mod protocol;
pub mod service;
pub mod store;
pub mod transport;
