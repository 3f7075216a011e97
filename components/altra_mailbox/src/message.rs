//! Mailbox Message Codec
//!
//! Every doorbell transaction carries a [`MailboxMessage`]: one 32-bit command word and two 32-bit parameter words.
//! The management firmware checks the command word bit for bit, so every message kind is produced by an explicit
//! shift/mask encoder below rather than a packed structure.
//!
//! ## Command Word Layout
//!
//! ```text
//!  31    28 27    24 23            16 15             8 7              0
//! +--------+--------+----------------+----------------+----------------+
//! | class  | subtype|  control byte  |  parameter 0   |  parameter 1   |   user / RAS messages
//! +--------+--------+-+--------------+---+-+-+-------+----------------+
//! | class  | subtype|D|  chip addr   |   |P| | alen  |  data length   |   I2C debug messages
//! +--------+--------+-+--------------+---+-+-+-------+----------------+
//! ```
//!
//! A response is trusted only when its top byte echoes the request class and subtype and its control byte is zero.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use altra_sdk::error::{EfiError, Result};

pub const MESSAGE_CLASS_SHIFT: u32 = 28;
pub const MESSAGE_CLASS_MASK: u32 = 0xF000_0000;
pub const MESSAGE_SUBTYPE_SHIFT: u32 = 24;
pub const MESSAGE_SUBTYPE_MASK: u32 = 0x0F00_0000;
pub const MESSAGE_CONTROL_SHIFT: u32 = 16;
pub const MESSAGE_CONTROL_MASK: u32 = 0x00FF_0000;
pub const MESSAGE_PARAM0_SHIFT: u32 = 8;
pub const MESSAGE_PARAM0_MASK: u32 = 0x0000_FF00;
pub const MESSAGE_PARAM1_MASK: u32 = 0x0000_00FF;

/// Bits of a response that must match [`response_sentinel`].
pub const RESPONSE_SENTINEL_MASK: u32 = MESSAGE_CLASS_MASK | MESSAGE_SUBTYPE_MASK | MESSAGE_CONTROL_MASK;

pub const DEBUG_SUBTYPE_REGISTER_READ: u8 = 0x1;
pub const DEBUG_SUBTYPE_REGISTER_WRITE: u8 = 0x2;
pub const DEBUG_SUBTYPE_I2C_READ: u8 = 0x4;
pub const DEBUG_SUBTYPE_I2C_WRITE: u8 = 0x5;

pub const USER_SUBTYPE_SET_CONFIGURATION: u8 = 0x2;
pub const USER_SUBTYPE_BOOT_PROGRESS: u8 = 0x6;
pub const USER_SUBTYPE_TRNG_PROXY: u8 = 0x7;

pub const BOOT_PROGRESS_COMMAND_SET: u8 = 0x1;
pub const TRNG_PROXY_GET_RANDOM_NUMBER: u8 = 0x1;

pub const RAS_SUBTYPE_POLLING: u8 = 0x1;

pub const I2C_DEVICE_SHIFT: u32 = 23;
pub const I2C_DEVICE_MASK: u32 = 0x0080_0000;
pub const I2C_CHIP_SHIFT: u32 = 16;
pub const I2C_CHIP_MASK: u32 = 0x007F_0000;
pub const I2C_PROTOCOL_SHIFT: u32 = 12;
pub const I2C_PROTOCOL_MASK: u32 = 0x0000_1000;
pub const I2C_ADDRESS_LENGTH_SHIFT: u32 = 8;
pub const I2C_ADDRESS_LENGTH_MASK: u32 = 0x0000_0700;
pub const I2C_DATA_LENGTH_MASK: u32 = 0x0000_00FF;

/// Largest register address width of an I2C pass-through transfer, in bytes.
pub const I2C_MAX_ADDRESS_LENGTH: u8 = 4;
/// Largest in-band data payload of an I2C pass-through transfer, in bytes.
pub const I2C_MAX_DATA_LENGTH: u8 = 4;

/// The message class held in the top nibble of the command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageClass {
    Debug = 0x0,
    User = 0x6,
    Ras = 0xB,
}

impl TryFrom<u8> for MessageClass {
    type Error = EfiError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(MessageClass::Debug),
            0x6 => Ok(MessageClass::User),
            0xB => Ok(MessageClass::Ras),
            _ => Err(EfiError::InvalidParameter),
        }
    }
}

/// One doorbell transaction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MailboxMessage {
    /// Command word, written last to `DIN` / read last from `DOUT`.
    pub opcode: u32,
    /// First parameter word (`DIN0` / `DOUT0`).
    pub param0: u32,
    /// Second parameter word (`DIN1` / `DOUT1`).
    pub param1: u32,
}

impl MailboxMessage {
    pub const fn new(opcode: u32, param0: u32, param1: u32) -> Self {
        Self { opcode, param0, param1 }
    }

    /// Returns the decoded common header of the command word.
    pub fn header(&self) -> MessageHeader {
        MessageHeader::decode(self.opcode)
    }
}

/// The fields shared by every command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub class: u8,
    pub subtype: u8,
    pub control: u8,
}

impl MessageHeader {
    pub fn decode(opcode: u32) -> Self {
        Self {
            class: ((opcode & MESSAGE_CLASS_MASK) >> MESSAGE_CLASS_SHIFT) as u8,
            subtype: ((opcode & MESSAGE_SUBTYPE_MASK) >> MESSAGE_SUBTYPE_SHIFT) as u8,
            control: ((opcode & MESSAGE_CONTROL_MASK) >> MESSAGE_CONTROL_SHIFT) as u8,
        }
    }
}

/// Encodes the class, subtype and control byte of a command word.
pub const fn encode_header(class: MessageClass, subtype: u8, control: u8) -> u32 {
    ((class as u32) << MESSAGE_CLASS_SHIFT)
        | (((subtype as u32) << MESSAGE_SUBTYPE_SHIFT) & MESSAGE_SUBTYPE_MASK)
        | ((control as u32) << MESSAGE_CONTROL_SHIFT)
}

/// Encodes a command word that carries two 8-bit parameters.
pub const fn encode_parameters(class: MessageClass, subtype: u8, control: u8, param0: u8, param1: u8) -> u32 {
    encode_header(class, subtype, control) | ((param0 as u32) << MESSAGE_PARAM0_SHIFT) | param1 as u32
}

/// Returns the two 8-bit parameters of a command word.
pub const fn decode_parameters(opcode: u32) -> (u8, u8) {
    (((opcode & MESSAGE_PARAM0_MASK) >> MESSAGE_PARAM0_SHIFT) as u8, (opcode & MESSAGE_PARAM1_MASK) as u8)
}

/// The response pattern the peer returns for a request with the given command word.
pub const fn response_sentinel(request_opcode: u32) -> u32 {
    request_opcode & (MESSAGE_CLASS_MASK | MESSAGE_SUBTYPE_MASK)
}

/// Validates a response against the request that produced it.
pub fn check_response(request_opcode: u32, response: &MailboxMessage) -> Result<()> {
    if response.opcode & RESPONSE_SENTINEL_MASK == response_sentinel(request_opcode) {
        Ok(())
    } else {
        log::warn!(
            target: "smpro",
            "Unexpected response {:#010X} to request {:#010X}",
            response.opcode,
            request_opcode
        );
        Err(EfiError::DeviceError)
    }
}

/// Builds a debug register read of the 32-bit register at `address`.
pub const fn debug_register_read(address: u32) -> MailboxMessage {
    MailboxMessage::new(encode_header(MessageClass::Debug, DEBUG_SUBTYPE_REGISTER_READ, 0), address, 0)
}

/// Builds a debug register write of `value` to the 32-bit register at `address`.
pub const fn debug_register_write(address: u32, value: u32) -> MailboxMessage {
    MailboxMessage::new(encode_header(MessageClass::Debug, DEBUG_SUBTYPE_REGISTER_WRITE, 0), address, value)
}

/// I2C transfer protocol selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum I2cProtocol {
    I2c = 0,
    Smbus = 1,
}

/// The I2C specific fields of a pass-through command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cOperation {
    /// I2C controller behind the management processor (0 or 1).
    pub device: u8,
    /// 7-bit target address.
    pub chip: u8,
    pub protocol: I2cProtocol,
    /// Width of the target register address, in bytes.
    pub address_length: u8,
    /// Number of data bytes to transfer.
    pub data_length: u8,
}

impl I2cOperation {
    fn validate(&self) -> Result<()> {
        if self.device > 1
            || self.chip > 0x7F
            || self.address_length > I2C_MAX_ADDRESS_LENGTH
            || self.data_length == 0
            || self.data_length > I2C_MAX_DATA_LENGTH
        {
            log::warn!(target: "smpro", "Invalid I2C operation {:?}", self);
            return Err(EfiError::InvalidParameter);
        }
        Ok(())
    }

    fn encode(&self, subtype: u8) -> Result<u32> {
        self.validate()?;
        Ok(encode_header(MessageClass::Debug, subtype, 0)
            | ((self.device as u32) << I2C_DEVICE_SHIFT)
            | ((self.chip as u32) << I2C_CHIP_SHIFT)
            | ((self.protocol as u32) << I2C_PROTOCOL_SHIFT)
            | ((self.address_length as u32) << I2C_ADDRESS_LENGTH_SHIFT)
            | self.data_length as u32)
    }

    /// Decodes the I2C fields of a pass-through command word.
    pub fn decode(opcode: u32) -> Self {
        Self {
            device: ((opcode & I2C_DEVICE_MASK) >> I2C_DEVICE_SHIFT) as u8,
            chip: ((opcode & I2C_CHIP_MASK) >> I2C_CHIP_SHIFT) as u8,
            protocol: if opcode & I2C_PROTOCOL_MASK != 0 { I2cProtocol::Smbus } else { I2cProtocol::I2c },
            address_length: ((opcode & I2C_ADDRESS_LENGTH_MASK) >> I2C_ADDRESS_LENGTH_SHIFT) as u8,
            data_length: (opcode & I2C_DATA_LENGTH_MASK) as u8,
        }
    }
}

/// Builds an I2C pass-through read of `operation.data_length` bytes from `register` on the target.
pub fn i2c_read(operation: &I2cOperation, register: u32) -> Result<MailboxMessage> {
    Ok(MailboxMessage::new(operation.encode(DEBUG_SUBTYPE_I2C_READ)?, register, 0))
}

/// Builds an I2C pass-through write of the low `operation.data_length` bytes of `data` to `register` on the target.
pub fn i2c_write(operation: &I2cOperation, register: u32, data: u32) -> Result<MailboxMessage> {
    Ok(MailboxMessage::new(operation.encode(DEBUG_SUBTYPE_I2C_WRITE)?, register, data))
}

/// Boot progress status reported to the SMpro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootStatus {
    NotStarted = 0,
    Started = 1,
    Complete = 2,
    Failed = 3,
}

/// Firmware stage reported in a boot progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootStage {
    SmPro = 0x00,
    PmPro = 0x01,
    AtfBl1 = 0x02,
    Dde = 0x03,
    AtfBl2 = 0x04,
    DdrInit = 0x05,
    AtfBl31 = 0x06,
    AtfBl32 = 0x07,
    Uefi = 0x08,
    Os = 0x09,
}

/// Builds a boot progress notification.
///
/// `param0` packs the stage, the status and the low 16 bits of the checkpoint; `param1` holds the high 16 bits of
/// the checkpoint.
pub const fn boot_progress(stage: BootStage, status: BootStatus, checkpoint: u32) -> MailboxMessage {
    MailboxMessage::new(
        encode_parameters(MessageClass::User, USER_SUBTYPE_BOOT_PROGRESS, 0, BOOT_PROGRESS_COMMAND_SET, 0),
        (stage as u32) | ((status as u32) << 8) | ((checkpoint & 0xFFFF) << 16),
        checkpoint >> 16,
    )
}

/// Builds a request for a 64-bit random number from the SMpro TRNG proxy.
pub const fn trng_get_random_number() -> MailboxMessage {
    MailboxMessage::new(
        encode_parameters(MessageClass::User, USER_SUBTYPE_TRNG_PROXY, 0, TRNG_PROXY_GET_RANDOM_NUMBER, 0),
        0,
        0,
    )
}

/// Returns the 64-bit random number carried by a TRNG proxy response.
pub const fn decode_random_number(response: &MailboxMessage) -> u64 {
    (response.param0 as u64) | ((response.param1 as u64) << 32)
}

/// Builds a set-configuration message for configuration item `id`.
pub const fn set_configuration(id: u8, value: u32) -> MailboxMessage {
    MailboxMessage::new(encode_parameters(MessageClass::User, USER_SUBTYPE_SET_CONFIGURATION, 0, id, 0), value, 0)
}

/// Builds a RAS error polling control message.
pub const fn ras_polling(enable: bool) -> MailboxMessage {
    MailboxMessage::new(encode_parameters(MessageClass::Ras, RAS_SUBTYPE_POLLING, 0, enable as u8, 0), 0, 0)
}
