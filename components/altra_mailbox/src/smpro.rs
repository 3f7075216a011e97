//! SMpro/PMpro System Firmware Interface
//!
//! Typed operations on top of a [`DoorbellHandle`]. Notifications (register writes, I2C writes, boot progress,
//! configuration and RAS polling control) complete when the peer acknowledges them. Queries additionally wait for the
//! response message and validate it before decoding the payload.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use altra_sdk::{error::Result, mmio::RegisterIo, timer::Stall};

use crate::{
    doorbell::DoorbellHandle,
    message::{self, BootStage, BootStatus, I2cOperation},
};

/// Reads a 32-bit management processor register.
pub fn read_register<R: RegisterIo, S: Stall>(handle: &mut DoorbellHandle<'_, R, S>, address: u32) -> Result<u32> {
    let response = handle.exchange(&message::debug_register_read(address))?;
    log::debug!(target: "smpro", "Register {:#010X} = {:#010X}", address, response.param0);
    Ok(response.param0)
}

/// Writes a 32-bit management processor register.
pub fn write_register<R: RegisterIo, S: Stall>(
    handle: &mut DoorbellHandle<'_, R, S>,
    address: u32,
    value: u32,
) -> Result<()> {
    log::debug!(target: "smpro", "Register {:#010X} <- {:#010X}", address, value);
    handle.write(&message::debug_register_write(address, value))
}

/// Reads `operation.data_length` bytes from `register` of an I2C target behind the management processor.
///
/// The bytes are returned little-endian in the low bits of the result.
pub fn i2c_read<R: RegisterIo, S: Stall>(
    handle: &mut DoorbellHandle<'_, R, S>,
    operation: &I2cOperation,
    register: u32,
) -> Result<u32> {
    let request = message::i2c_read(operation, register)?;
    let response = handle.exchange(&request)?;
    let data = response.param0 & data_mask(operation.data_length);
    log::debug!(target: "smpro", "I2C {:#04X}:{:#X} read {:#X}", operation.chip, register, data);
    Ok(data)
}

/// Writes the low `operation.data_length` bytes of `data` to `register` of an I2C target.
pub fn i2c_write<R: RegisterIo, S: Stall>(
    handle: &mut DoorbellHandle<'_, R, S>,
    operation: &I2cOperation,
    register: u32,
    data: u32,
) -> Result<()> {
    let request = message::i2c_write(operation, register, data & data_mask(operation.data_length))?;
    log::debug!(target: "smpro", "I2C {:#04X}:{:#X} write {:#X}", operation.chip, register, request.param1);
    handle.write(&request)
}

/// Reports boot progress of `stage` to the SMpro.
pub fn set_boot_progress<R: RegisterIo, S: Stall>(
    handle: &mut DoorbellHandle<'_, R, S>,
    stage: BootStage,
    status: BootStatus,
    checkpoint: u32,
) -> Result<()> {
    log::debug!(target: "smpro", "Boot progress {:?} {:?} checkpoint {:#X}", stage, status, checkpoint);
    handle.write(&message::boot_progress(stage, status, checkpoint))
}

/// Fetches a 64-bit random number from the SMpro TRNG proxy.
pub fn get_random_number64<R: RegisterIo, S: Stall>(handle: &mut DoorbellHandle<'_, R, S>) -> Result<u64> {
    let response = handle.exchange(&message::trng_get_random_number())?;
    Ok(message::decode_random_number(&response))
}

/// Enables or disables RAS error polling in the management processor.
pub fn set_ras_polling<R: RegisterIo, S: Stall>(handle: &mut DoorbellHandle<'_, R, S>, enable: bool) -> Result<()> {
    log::debug!(target: "smpro", "RAS polling on socket {}: {}", handle.socket(), enable);
    handle.write(&message::ras_polling(enable))
}

/// Sets configuration item `id` to `value`.
pub fn set_configuration<R: RegisterIo, S: Stall>(
    handle: &mut DoorbellHandle<'_, R, S>,
    id: u8,
    value: u32,
) -> Result<()> {
    log::debug!(target: "smpro", "Configuration {:#X} <- {:#X}", id, value);
    handle.write(&message::set_configuration(id, value))
}

fn data_mask(length: u8) -> u32 {
    match length {
        0 => 0,
        1..=3 => (1u32 << (length as u32 * 8)) - 1,
        _ => u32::MAX,
    }
}
