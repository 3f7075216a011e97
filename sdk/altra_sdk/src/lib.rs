//! Altra Platform Software Development Kit (SDK)
//!
//! Common types shared by the Altra platform firmware components along with the narrow hardware access seams that
//! the components are written against:
//!
//! - [`mmio`]: 32-bit memory-mapped register access.
//! - [`timer`]: microsecond busy-wait stalls.
//! - [`smc`]: SMC Calling Convention (SMCCC) secure monitor calls.
//! - [`cache`]: data cache maintenance for memory shared with agents outside the coherency domain.
//!
//! Each seam is a trait so that components can be exercised against simulated peers in host-based tests.
//!
//! ## Features
//!
//! - `mockall`: Exposes `mockall` generated mocks for each hardware seam.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

pub mod base;
pub mod cache;
pub mod error;
pub mod mmio;
pub mod smc;
pub mod timer;
