//! ## MM Technology Background (Arm Architecture)
//!
//! On Arm server platforms, Management Mode (MM) services run in a secure partition (Standalone MM) at a higher
//! privilege level than the boot firmware and the operating system. The normal world reaches them through a shared,
//! non-secure communication buffer and the `MM_COMMUNICATE` secure monitor call: the caller places an
//! `EFI_MM_COMMUNICATE_HEADER` followed by the message in the buffer, issues the SMC with the buffer address and,
//! once the call returns, finds the handler's response in the same buffer.
//!
//! The header GUID selects the MM handler. The header length field describes the message that follows it, both for
//! the request and for the response.
//!
//! ## Crate Layout
//!
//! - [`config`]: the communicate buffer and the MM communication configuration.
//! - [`communicator`]: the [`communicator::MmCommunication`] trait, its [`communicator::MmCommunicator`]
//!   implementation and the [`communicator::MmExecutor`] seam that performs the world switch.
//! - [`handler`]: the handler side of the exchange, used to model MM services in host-based tests.
//!
//! ## Examples and Usage
//!
//! ```rust,ignore
//! use altra_mm::{communicator::{MmCommunication, MmCommunicator}, config::MmCommunicationConfiguration};
//! use altra_sdk::smc::ArmSmc;
//!
//! let communicator = MmCommunicator::with_secure_monitor(config, ArmSmc);
//! let response = communicator.communicate(0, &request, NVPARAM_MM_GUID)?;
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

pub mod communicator;
pub mod config;
pub mod handler;
