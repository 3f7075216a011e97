//! SMpro/PMpro Mailbox Support
//!
//! The Altra SoC carries two management co-processors: the System Management processor (SMpro) and the Power
//! Management processor (PMpro). Boot firmware exchanges short messages with each of them through a set of
//! memory-mapped doorbells. Every doorbell is a half-duplex, single-slot mailbox: one 32-bit command word and two
//! 32-bit parameter words travel in each direction, with an acknowledge bit for requests and an available bit for
//! responses.
//!
//! This crate is organized in three layers:
//!
//! - [`doorbell`]: the register-level request/acknowledge protocol and the [`doorbell::Mailbox`] that hands out
//!   exclusive [`doorbell::DoorbellHandle`]s per (socket, doorbell) pair.
//! - [`message`]: bit-exact encoders and decoders for the command words understood by the management firmware.
//! - [`smpro`]: the system firmware interface (register debug access, I2C pass-through, boot progress, TRNG, RAS
//!   polling control) built on the two layers above.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use altra_mailbox::{config::DoorbellConfig, doorbell::{DoorbellChannel, Mailbox}, smpro};
//! use altra_sdk::{mmio::Mmio, timer::GenericTimer};
//!
//! let mailbox = Mailbox::new(DoorbellConfig::default(), unsafe { Mmio::new() }, GenericTimer);
//! let mut handle = mailbox.acquire(0, DoorbellChannel::smpro(0)?)?;
//! let random = smpro::get_random_number64(&mut handle)?;
//! ```
//!
//! ## Logging
//!
//! Register level logging is available under the `mailbox` log target and message level logging under the `smpro`
//! log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod config;
pub mod doorbell;
pub mod message;
pub mod smpro;

#[cfg(any(test, feature = "std"))]
pub mod simulator;
