//! APEI Error Record Support
//!
//! Hardware errors on Altra are collected by trusted firmware or by the management processors and reported to the
//! operating system through the ACPI Platform Error Interfaces:
//!
//! - The Generic Hardware Error Source (GHES) region holds one error status block per error source. Its blocks are
//!   referenced from the HEST and filled in at runtime.
//! - The Boot Error Record (BERT) region holds errors that happened before the operating system took over.
//!
//! [`apei::Apei`] owns both regions. [`layout`] describes their binary layout and [`memory`] the reserved memory
//! they live in.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use altra_apei::apei::{Apei, ApeiConfig, DetectionBackend};
//!
//! let mut apei = Apei::new(ApeiConfig::default(), reserved_memory, ArmSmc, ArmCache, &mailbox);
//! apei.init()?;
//! apei.enable(true, DetectionBackend::SmPro)?;
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

pub mod apei;
pub mod layout;
pub mod memory;
