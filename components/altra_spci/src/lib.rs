//! Secure Partition Client Interface
//!
//! Services isolated in a secure partition are reached through a handle based protocol carried by secure monitor
//! calls. A client opens a handle to a service identified by GUID, issues blocking requests of up to five argument
//! words on it, and closes it again:
//!
//! ```text
//! Closed --open--> Opened --request_blocking--> Opened --close--> Closed
//! ```
//!
//! - [`spci`]: the protocol client and the [`spci::SpciHandle`] guard that closes its handle when dropped.
//! - [`hotplug`]: the PCIe hot-plug service client.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use altra_sdk::smc::ArmSmc;
//! use altra_spci::hotplug::{HotPlugClient, HotPlugConfig};
//!
//! let hotplug = HotPlugClient::new(HotPlugConfig::default(), ArmSmc);
//! hotplug.clear_port_map()?;
//! hotplug.lock_port_map()?;
//! hotplug.start()?;
//! ```
//!
//! ## Logging
//!
//! Protocol level logging is available under the `spci` log target and service level logging under the `hotplug`
//! log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

pub mod hotplug;
pub mod spci;

#[cfg(any(test, feature = "std"))]
pub mod simulator;
