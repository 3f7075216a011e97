//! Doorbell Transport
//!
//! Implements the register-level request/acknowledge protocol of one doorbell and the ownership model around it.
//!
//! ## Register Block
//!
//! Each doorbell occupies a 4KB register block:
//!
//! | Offset | Register      | Direction          |
//! |--------|---------------|--------------------|
//! | `0x00` | `DIN`         | command word in    |
//! | `0x04` | `DIN0`        | parameter 0 in     |
//! | `0x08` | `DIN1`        | parameter 1 in     |
//! | `0x10` | `DOUT`        | command word out   |
//! | `0x14` | `DOUT0`       | parameter 0 out    |
//! | `0x18` | `DOUT1`       | parameter 1 out    |
//! | `0x20` | `STATUS`      | bit 0 ack, bit 16 available (write 1 to clear) |
//! | `0x24` | `STATUS_MASK` | interrupt mask     |
//!
//! ## Ownership
//!
//! A doorbell holds exactly one outstanding request. [`Mailbox::acquire`] hands out a [`DoorbellHandle`] per
//! (socket, doorbell) pair and refuses a second handle for the same pair until the first one is dropped, so the
//! single-slot rule is enforced rather than assumed.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::vec::Vec;

use altra_sdk::{
    error::{EfiError, Result},
    mmio::RegisterIo,
    timer::Stall,
};
use spin::{Mutex, MutexGuard};

use crate::{
    config::{DoorbellConfig, ManagementProcessor},
    message::{self, MailboxMessage},
};

pub const DB_IN_REG_OFST: u64 = 0x00;
pub const DB_DIN0_REG_OFST: u64 = 0x04;
pub const DB_DIN1_REG_OFST: u64 = 0x08;
pub const DB_OUT_REG_OFST: u64 = 0x10;
pub const DB_DOUT0_REG_OFST: u64 = 0x14;
pub const DB_DOUT1_REG_OFST: u64 = 0x18;
pub const DB_STATUS_REG_OFST: u64 = 0x20;
pub const DB_STATUS_MASK_REG_OFST: u64 = 0x24;

pub const DB_STATUS_ACK_BIT: u32 = 1 << 0;
pub const DB_STATUS_AVAIL_BIT: u32 = 1 << 16;

/// Distance between two doorbell register blocks.
pub const DOORBELL_STRIDE: u64 = 0x1000;

/// Number of doorbells served by each management processor.
pub const DOORBELLS_PER_PROCESSOR: u8 = 8;

const CHANNELS_PER_SOCKET: usize = 2 * DOORBELLS_PER_PROCESSOR as usize;

/// Identifies one doorbell of one management processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DoorbellChannel {
    processor: ManagementProcessor,
    index: u8,
}

impl DoorbellChannel {
    /// Creates a channel, failing with `InvalidParameter` if `index` is not below [`DOORBELLS_PER_PROCESSOR`].
    pub fn new(processor: ManagementProcessor, index: u8) -> Result<Self> {
        if index >= DOORBELLS_PER_PROCESSOR {
            log::warn!(target: "mailbox", "Doorbell index {} out of range", index);
            return Err(EfiError::InvalidParameter);
        }
        Ok(Self { processor, index })
    }

    /// SMpro doorbell `index`.
    pub fn smpro(index: u8) -> Result<Self> {
        Self::new(ManagementProcessor::SmPro, index)
    }

    /// PMpro doorbell `index`.
    pub fn pmpro(index: u8) -> Result<Self> {
        Self::new(ManagementProcessor::PmPro, index)
    }

    pub fn processor(&self) -> ManagementProcessor {
        self.processor
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    fn slot(&self) -> usize {
        match self.processor {
            ManagementProcessor::SmPro => self.index as usize,
            ManagementProcessor::PmPro => DOORBELLS_PER_PROCESSOR as usize + self.index as usize,
        }
    }
}

/// Raw doorbell protocol over a register accessor and a stall source.
///
/// The transport performs no locking. Callers must not start a second transaction on the same doorbell before the
/// previous one completed; [`Mailbox`] enforces this for its handles.
pub struct DoorbellTransport<R: RegisterIo, S: Stall> {
    io: R,
    stall: S,
    poll_interval_us: u64,
    poll_iterations: u64,
}

impl<R: RegisterIo, S: Stall> DoorbellTransport<R, S> {
    pub fn new(io: R, stall: S, poll_interval_us: u64, poll_iterations: u64) -> Self {
        Self { io, stall, poll_interval_us, poll_iterations }
    }

    pub fn io(&self) -> &R {
        &self.io
    }

    pub fn stall_source(&self) -> &S {
        &self.stall
    }

    /// Returns the register block address of `doorbell_index` within a processor's per-socket doorbell space.
    pub fn doorbell_address(doorbell_index: u8, socket_base: u64) -> u64 {
        socket_base + doorbell_index as u64 * DOORBELL_STRIDE
    }

    /// Sends `message` and waits for the peer to acknowledge it.
    ///
    /// The parameter registers are written before the command register because the peer starts processing as soon as
    /// `DIN` is written. The acknowledge bit is cleared before returning.
    pub fn write(&self, doorbell_index: u8, message: &MailboxMessage, socket_base: u64) -> Result<()> {
        let address = Self::doorbell_address(doorbell_index, socket_base);

        if self.io.read32(address + DB_STATUS_REG_OFST) & DB_STATUS_ACK_BIT != 0 {
            log::trace!(target: "mailbox", "Clearing stale acknowledge at {:#X}", address);
            self.io.write32(address + DB_STATUS_REG_OFST, DB_STATUS_ACK_BIT);
        }

        log::trace!(target: "mailbox", "Doorbell {:#X} write {:X?}", address, message);
        self.io.write32(address + DB_DIN0_REG_OFST, message.param0);
        self.io.write32(address + DB_DIN1_REG_OFST, message.param1);
        self.io.write32(address + DB_IN_REG_OFST, message.opcode);

        self.poll(address, DB_STATUS_ACK_BIT)?;
        self.io.write32(address + DB_STATUS_REG_OFST, DB_STATUS_ACK_BIT);

        Ok(())
    }

    /// Waits for a message from the peer and consumes it.
    ///
    /// The data registers are read in the order `DOUT0`, `DOUT1`, `DOUT` and the available bit is written back to
    /// release the slot to the peer.
    pub fn read(&self, doorbell_index: u8, socket_base: u64) -> Result<MailboxMessage> {
        let address = Self::doorbell_address(doorbell_index, socket_base);

        self.poll(address, DB_STATUS_AVAIL_BIT)?;

        let param0 = self.io.read32(address + DB_DOUT0_REG_OFST);
        let param1 = self.io.read32(address + DB_DOUT1_REG_OFST);
        let opcode = self.io.read32(address + DB_OUT_REG_OFST);
        self.io.write32(address + DB_STATUS_REG_OFST, DB_STATUS_AVAIL_BIT);

        let message = MailboxMessage { opcode, param0, param1 };
        log::trace!(target: "mailbox", "Doorbell {:#X} read {:X?}", address, message);
        Ok(message)
    }

    /// Enables the available interrupt of a doorbell.
    pub fn unmask_interrupt(&self, doorbell_index: u8, socket_base: u64) {
        let address = Self::doorbell_address(doorbell_index, socket_base) + DB_STATUS_MASK_REG_OFST;
        let mask = self.io.read32(address);
        self.io.write32(address, mask & !DB_STATUS_AVAIL_BIT);
    }

    fn poll(&self, address: u64, bit: u32) -> Result<()> {
        for _ in 0..self.poll_iterations {
            self.stall.stall(self.poll_interval_us);
            if self.io.read32(address + DB_STATUS_REG_OFST) & bit != 0 {
                return Ok(());
            }
        }
        log::error!(target: "mailbox", "Doorbell {:#X} timed out waiting for status bit {:#X}", address, bit);
        Err(EfiError::Timeout)
    }
}

/// Owner of every doorbell on the platform.
///
/// Transactions are only possible through a [`DoorbellHandle`], and at most one handle exists per (socket, doorbell)
/// pair at any time.
pub struct Mailbox<R: RegisterIo, S: Stall> {
    config: DoorbellConfig,
    transport: DoorbellTransport<R, S>,
    owners: Vec<Mutex<()>>,
}

impl<R: RegisterIo, S: Stall> Mailbox<R, S> {
    pub fn new(config: DoorbellConfig, io: R, stall: S) -> Self {
        let transport = DoorbellTransport::new(io, stall, config.poll_interval_us, config.poll_iterations());
        let owners = (0..config.socket_count as usize * CHANNELS_PER_SOCKET).map(|_| Mutex::new(())).collect();
        Self { config, transport, owners }
    }

    pub fn config(&self) -> &DoorbellConfig {
        &self.config
    }

    pub fn transport(&self) -> &DoorbellTransport<R, S> {
        &self.transport
    }

    /// Takes exclusive ownership of `channel` on `socket`.
    ///
    /// Fails with `InvalidParameter` for an unpopulated socket and with `NotReady` when another handle for the same
    /// doorbell is alive.
    pub fn acquire(&self, socket: u8, channel: DoorbellChannel) -> Result<DoorbellHandle<'_, R, S>> {
        let socket_base = self.config.socket_base(socket, channel.processor())?;
        let slot = socket as usize * CHANNELS_PER_SOCKET + channel.slot();
        let guard = self.owners.get(slot).ok_or(EfiError::InvalidParameter)?.try_lock().ok_or_else(|| {
            log::warn!(target: "mailbox", "Doorbell {:?} on socket {} is busy", channel, socket);
            EfiError::NotReady
        })?;

        Ok(DoorbellHandle { transport: &self.transport, _guard: guard, socket, channel, socket_base })
    }
}

/// Exclusive access to one doorbell. Dropping the handle releases the doorbell.
pub struct DoorbellHandle<'a, R: RegisterIo, S: Stall> {
    transport: &'a DoorbellTransport<R, S>,
    _guard: MutexGuard<'a, ()>,
    socket: u8,
    channel: DoorbellChannel,
    socket_base: u64,
}

impl<R: RegisterIo, S: Stall> DoorbellHandle<'_, R, S> {
    pub fn socket(&self) -> u8 {
        self.socket
    }

    pub fn channel(&self) -> DoorbellChannel {
        self.channel
    }

    /// Sends a message and waits for its acknowledge.
    pub fn write(&mut self, message: &MailboxMessage) -> Result<()> {
        self.transport.write(self.channel.index(), message, self.socket_base)
    }

    /// Waits for and consumes a message from the peer.
    pub fn read(&mut self) -> Result<MailboxMessage> {
        self.transport.read(self.channel.index(), self.socket_base)
    }

    /// Sends a request, waits for the response and validates it against the request.
    pub fn exchange(&mut self, request: &MailboxMessage) -> Result<MailboxMessage> {
        self.write(request)?;
        let response = self.read()?;
        message::check_response(request.opcode, &response)?;
        Ok(response)
    }

    pub fn unmask_interrupt(&mut self) {
        self.transport.unmask_interrupt(self.channel.index(), self.socket_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PMPRO_DB_BASE_REG, SMPRO_DB_BASE_REG, SOCKET_BASE_OFFSET};
    use crate::simulator::{SimulatedClock, SimulatedDoorbell};
    use altra_sdk::{mmio::MockRegisterIo, timer::MockStall};
    use mockall::{predicate::eq, Sequence};

    const BASE: u64 = 0x1000;

    fn transport<'a>(
        peer: &'a SimulatedDoorbell,
        clock: &'a SimulatedClock,
    ) -> DoorbellTransport<&'a SimulatedDoorbell, &'a SimulatedClock> {
        DoorbellTransport::new(peer, clock, 1_000, 10_000)
    }

    #[test]
    fn test_write_orders_data_before_command() {
        let mut io = MockRegisterIo::new();
        let mut seq = Sequence::new();
        let address = BASE + 3 * DOORBELL_STRIDE;

        io.expect_read32().with(eq(address + DB_STATUS_REG_OFST)).times(1).in_sequence(&mut seq).return_const(0u32);
        io.expect_write32().with(eq(address + DB_DIN0_REG_OFST), eq(1)).times(1).in_sequence(&mut seq).return_const(());
        io.expect_write32().with(eq(address + DB_DIN1_REG_OFST), eq(2)).times(1).in_sequence(&mut seq).return_const(());
        io.expect_write32()
            .with(eq(address + DB_IN_REG_OFST), eq(0x6700_0100))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        io.expect_read32()
            .with(eq(address + DB_STATUS_REG_OFST))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(DB_STATUS_ACK_BIT);
        io.expect_write32()
            .with(eq(address + DB_STATUS_REG_OFST), eq(DB_STATUS_ACK_BIT))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mut stall = MockStall::new();
        stall.expect_stall().with(eq(1_000)).times(1).return_const(());

        let transport = DoorbellTransport::new(io, stall, 1_000, 10_000);
        assert_eq!(transport.write(3, &MailboxMessage::new(0x6700_0100, 1, 2), BASE), Ok(()));
    }

    #[test]
    fn test_write_clears_stale_ack_first() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        peer.set_status(BASE, DB_STATUS_ACK_BIT);
        peer.ack_after(1);

        assert_eq!(transport(&peer, &clock).write(0, &MailboxMessage::new(0x10, 0, 0), BASE), Ok(()));
        let writes = peer.writes();
        assert_eq!(writes[0], (BASE + DB_STATUS_REG_OFST, DB_STATUS_ACK_BIT));
        assert_eq!(writes[1].0, BASE + DB_DIN0_REG_OFST);
    }

    #[test]
    fn test_write_acknowledged_after_five_polls() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        peer.ack_after(5);

        let base = BASE;
        assert_eq!(transport(&peer, &clock).write(3, &MailboxMessage::new(0x6700_0100, 1, 2), base), Ok(()));
        assert_eq!(clock.elapsed_us(), 5_000);
        assert_eq!(clock.stalls(), 5);

        let address = base + 3 * DOORBELL_STRIDE;
        assert_eq!(peer.register(address + DB_DIN0_REG_OFST), 1);
        assert_eq!(peer.register(address + DB_DIN1_REG_OFST), 2);
        assert_eq!(peer.register(address + DB_IN_REG_OFST), 0x6700_0100);
        // The acknowledge was cleared as a post-condition.
        assert_eq!(peer.register(address + DB_STATUS_REG_OFST) & DB_STATUS_ACK_BIT, 0);
    }

    #[test]
    fn test_write_times_out_after_exact_poll_budget() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();

        assert_eq!(
            transport(&peer, &clock).write(0, &MailboxMessage::new(0x10, 0, 0), BASE),
            Err(EfiError::Timeout)
        );
        assert_eq!(clock.stalls(), 10_000);
        assert_eq!(clock.elapsed_us(), 10_000_000);
    }

    #[test]
    fn test_read_consumes_response() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        peer.post_response(BASE, MailboxMessage::new(0x6700_0000, 0xAA, 0xBB), 2);

        let message = transport(&peer, &clock).read(0, BASE).unwrap();
        assert_eq!(message, MailboxMessage::new(0x6700_0000, 0xAA, 0xBB));
        assert_eq!(clock.stalls(), 2);
        assert_eq!(peer.register(BASE + DB_STATUS_REG_OFST) & DB_STATUS_AVAIL_BIT, 0);
    }

    #[test]
    fn test_read_register_order() {
        let mut io = MockRegisterIo::new();
        let mut seq = Sequence::new();
        io.expect_read32()
            .with(eq(BASE + DB_STATUS_REG_OFST))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(DB_STATUS_AVAIL_BIT);
        io.expect_read32().with(eq(BASE + DB_DOUT0_REG_OFST)).times(1).in_sequence(&mut seq).return_const(7u32);
        io.expect_read32().with(eq(BASE + DB_DOUT1_REG_OFST)).times(1).in_sequence(&mut seq).return_const(8u32);
        io.expect_read32().with(eq(BASE + DB_OUT_REG_OFST)).times(1).in_sequence(&mut seq).return_const(9u32);
        io.expect_write32()
            .with(eq(BASE + DB_STATUS_REG_OFST), eq(DB_STATUS_AVAIL_BIT))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mut stall = MockStall::new();
        stall.expect_stall().return_const(());

        let transport = DoorbellTransport::new(io, stall, 1_000, 10);
        assert_eq!(transport.read(0, BASE), Ok(MailboxMessage::new(9, 7, 8)));
    }

    #[test]
    fn test_read_times_out() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        assert_eq!(transport(&peer, &clock).read(1, BASE), Err(EfiError::Timeout));
        assert_eq!(clock.stalls(), 10_000);
    }

    #[test]
    fn test_unmask_interrupt_clears_available_mask() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        let address = BASE + 2 * DOORBELL_STRIDE + DB_STATUS_MASK_REG_OFST;
        peer.set_register(address, 0xFFFF_FFFF);
        transport(&peer, &clock).unmask_interrupt(2, BASE);
        assert_eq!(peer.register(address), 0xFFFE_FFFF);
    }

    #[test]
    fn test_channel_validation() {
        assert!(DoorbellChannel::smpro(7).is_ok());
        assert_eq!(DoorbellChannel::pmpro(8), Err(EfiError::InvalidParameter));
    }

    #[test]
    fn test_acquire_is_exclusive_per_channel() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        let mailbox = Mailbox::new(DoorbellConfig::default(), &peer, &clock);

        let first = mailbox.acquire(0, DoorbellChannel::smpro(1).unwrap()).unwrap();
        assert_eq!(mailbox.acquire(0, DoorbellChannel::smpro(1).unwrap()).err(), Some(EfiError::NotReady));

        // Other doorbells, processors and sockets are independent.
        assert!(mailbox.acquire(0, DoorbellChannel::smpro(2).unwrap()).is_ok());
        assert!(mailbox.acquire(0, DoorbellChannel::pmpro(1).unwrap()).is_ok());
        assert!(mailbox.acquire(1, DoorbellChannel::smpro(1).unwrap()).is_ok());

        drop(first);
        assert!(mailbox.acquire(0, DoorbellChannel::smpro(1).unwrap()).is_ok());
    }

    #[test]
    fn test_timeout_below_poll_interval_still_reads_status() {
        let peer = SimulatedDoorbell::new();
        peer.ack_after(1);
        let clock = SimulatedClock::default();
        let config = DoorbellConfig { timeout_us: 500, ..Default::default() };
        let mailbox = Mailbox::new(config, &peer, &clock);

        let mut handle = mailbox.acquire(0, DoorbellChannel::smpro(0).unwrap()).unwrap();
        assert_eq!(handle.write(&MailboxMessage::new(0x10, 0, 0)), Ok(()));
        assert_eq!(clock.stalls(), 1);
    }

    #[test]
    fn test_acquire_rejects_unpopulated_socket() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        let mailbox = Mailbox::new(DoorbellConfig { socket_count: 1, ..Default::default() }, &peer, &clock);
        assert_eq!(mailbox.acquire(1, DoorbellChannel::smpro(0).unwrap()).err(), Some(EfiError::InvalidParameter));
    }

    #[test]
    fn test_handle_addresses_per_socket_and_processor() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        peer.ack_after(1);
        let mailbox = Mailbox::new(DoorbellConfig::default(), &peer, &clock);

        let mut handle = mailbox.acquire(1, DoorbellChannel::pmpro(2).unwrap()).unwrap();
        handle.write(&MailboxMessage::new(0xB100_0100, 0, 0)).unwrap();

        let address = PMPRO_DB_BASE_REG + SOCKET_BASE_OFFSET + 2 * DOORBELL_STRIDE;
        assert_eq!(peer.register(address + DB_IN_REG_OFST), 0xB100_0100);
        assert_eq!(peer.register(SMPRO_DB_BASE_REG + DB_IN_REG_OFST), 0);
    }

    #[test]
    fn test_exchange_validates_response() {
        let peer = SimulatedDoorbell::new();
        let clock = SimulatedClock::default();
        peer.ack_after(1);
        let mailbox = Mailbox::new(DoorbellConfig::default(), &peer, &clock);
        let mut handle = mailbox.acquire(0, DoorbellChannel::smpro(0).unwrap()).unwrap();

        peer.respond_with(|request| MailboxMessage::new(request.opcode & 0xFF00_0000, 0x55, 0));
        assert_eq!(handle.exchange(&MailboxMessage::new(0x6700_0100, 0, 0)).map(|r| r.param0), Ok(0x55));

        peer.respond_with(|_| MailboxMessage::new(0x67FF_0000, 0, 0));
        assert_eq!(handle.exchange(&MailboxMessage::new(0x6700_0100, 0, 0)), Err(EfiError::DeviceError));
    }
}
