//! Simulated Doorbell Peer
//!
//! A host-side model of the doorbell register blocks used to test code that talks to the management processors
//! without hardware. The model keeps a sparse register map, implements the write-1-to-clear semantics of the status
//! register and can play the peer: acknowledge requests after a configurable number of status polls and answer
//! them through a responder callback.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};
use core::cell::{Cell, RefCell};

use altra_sdk::{mmio::RegisterIo, timer::Stall};

use crate::{
    doorbell::{
        DB_DIN0_REG_OFST, DB_DIN1_REG_OFST, DB_DOUT0_REG_OFST, DB_DOUT1_REG_OFST, DB_IN_REG_OFST, DB_OUT_REG_OFST,
        DB_STATUS_ACK_BIT, DB_STATUS_AVAIL_BIT, DB_STATUS_REG_OFST, DOORBELL_STRIDE,
    },
    message::MailboxMessage,
};

type Responder = Box<dyn Fn(&MailboxMessage) -> MailboxMessage>;

#[derive(Default)]
struct PendingBits {
    ack_in: Option<u32>,
    avail_in: Option<u32>,
}

/// Simulated register space of any number of doorbells.
#[derive(Default)]
pub struct SimulatedDoorbell {
    registers: RefCell<BTreeMap<u64, u32>>,
    pending: RefCell<BTreeMap<u64, PendingBits>>,
    writes: RefCell<Vec<(u64, u32)>>,
    ack_after: Cell<Option<u32>>,
    responder: RefCell<Option<Responder>>,
}

impl SimulatedDoorbell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledge every request on the `polls`-th status read after the command word was written.
    pub fn ack_after(&self, polls: u32) {
        self.ack_after.set(Some(polls.max(1)));
    }

    /// Never acknowledge requests.
    pub fn never_ack(&self) {
        self.ack_after.set(None);
    }

    /// Answer every acknowledged request with the message produced by `responder`.
    pub fn respond_with(&self, responder: impl Fn(&MailboxMessage) -> MailboxMessage + 'static) {
        *self.responder.borrow_mut() = Some(Box::new(responder));
    }

    /// Places `message` in the outbound registers of the doorbell at `doorbell` and raises the available bit on the
    /// `polls`-th status read.
    pub fn post_response(&self, doorbell: u64, message: MailboxMessage, polls: u32) {
        self.store_response(doorbell, &message);
        self.pending.borrow_mut().entry(doorbell).or_default().avail_in = Some(polls.max(1));
    }

    pub fn register(&self, address: u64) -> u32 {
        self.registers.borrow().get(&address).copied().unwrap_or(0)
    }

    pub fn set_register(&self, address: u64, value: u32) {
        self.registers.borrow_mut().insert(address, value);
    }

    /// Overwrites the status register of the doorbell at `doorbell`.
    pub fn set_status(&self, doorbell: u64, value: u32) {
        self.set_register(doorbell + DB_STATUS_REG_OFST, value);
    }

    /// Every register write observed so far, in order.
    pub fn writes(&self) -> Vec<(u64, u32)> {
        self.writes.borrow().clone()
    }

    /// The last request written to the doorbell at `doorbell`.
    pub fn last_request(&self, doorbell: u64) -> MailboxMessage {
        MailboxMessage {
            opcode: self.register(doorbell + DB_IN_REG_OFST),
            param0: self.register(doorbell + DB_DIN0_REG_OFST),
            param1: self.register(doorbell + DB_DIN1_REG_OFST),
        }
    }

    fn store_response(&self, doorbell: u64, message: &MailboxMessage) {
        self.set_register(doorbell + DB_DOUT0_REG_OFST, message.param0);
        self.set_register(doorbell + DB_DOUT1_REG_OFST, message.param1);
        self.set_register(doorbell + DB_OUT_REG_OFST, message.opcode);
    }

    fn raise(&self, doorbell: u64, bit: u32) {
        let status = self.register(doorbell + DB_STATUS_REG_OFST);
        self.set_register(doorbell + DB_STATUS_REG_OFST, status | bit);
    }

    fn acknowledge(&self, doorbell: u64) {
        self.raise(doorbell, DB_STATUS_ACK_BIT);
        let response = self.responder.borrow().as_ref().map(|responder| responder(&self.last_request(doorbell)));
        if let Some(response) = response {
            self.store_response(doorbell, &response);
            self.raise(doorbell, DB_STATUS_AVAIL_BIT);
        }
    }

    fn countdown(counter: &mut Option<u32>) -> bool {
        match counter {
            Some(1) => {
                *counter = None;
                true
            }
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        }
    }

    fn on_status_read(&self, doorbell: u64) {
        let (ack, avail) = match self.pending.borrow_mut().get_mut(&doorbell) {
            Some(pending) => (Self::countdown(&mut pending.ack_in), Self::countdown(&mut pending.avail_in)),
            None => (false, false),
        };
        if ack {
            self.acknowledge(doorbell);
        }
        if avail {
            self.raise(doorbell, DB_STATUS_AVAIL_BIT);
        }
    }
}

impl RegisterIo for SimulatedDoorbell {
    fn read32(&self, address: u64) -> u32 {
        let doorbell = address & !(DOORBELL_STRIDE - 1);
        if address - doorbell == DB_STATUS_REG_OFST {
            self.on_status_read(doorbell);
        }
        self.register(address)
    }

    fn write32(&self, address: u64, value: u32) {
        self.writes.borrow_mut().push((address, value));
        let doorbell = address & !(DOORBELL_STRIDE - 1);
        match address - doorbell {
            DB_STATUS_REG_OFST => {
                let status = self.register(address);
                self.set_register(address, status & !value);
            }
            DB_IN_REG_OFST => {
                self.set_register(address, value);
                self.pending.borrow_mut().entry(doorbell).or_default().ack_in = self.ack_after.get();
            }
            _ => self.set_register(address, value),
        }
    }
}

/// Stall source that advances a simulated clock instead of waiting.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    elapsed_us: Cell<u64>,
    stalls: Cell<u64>,
}

impl SimulatedClock {
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us.get()
    }

    pub fn stalls(&self) -> u64 {
        self.stalls.get()
    }
}

impl Stall for SimulatedClock {
    fn stall(&self, microseconds: u64) {
        self.elapsed_us.set(self.elapsed_us.get() + microseconds);
        self.stalls.set(self.stalls.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_write_one_to_clear() {
        let peer = SimulatedDoorbell::new();
        peer.set_status(0, DB_STATUS_ACK_BIT | DB_STATUS_AVAIL_BIT);
        peer.write32(DB_STATUS_REG_OFST, DB_STATUS_ACK_BIT);
        assert_eq!(peer.register(DB_STATUS_REG_OFST), DB_STATUS_AVAIL_BIT);
    }

    #[test]
    fn test_ack_countdown_starts_at_command_write() {
        let peer = SimulatedDoorbell::new();
        peer.ack_after(2);
        assert_eq!(peer.read32(DB_STATUS_REG_OFST), 0);
        peer.write32(DB_IN_REG_OFST, 1);
        assert_eq!(peer.read32(DB_STATUS_REG_OFST), 0);
        assert_eq!(peer.read32(DB_STATUS_REG_OFST), DB_STATUS_ACK_BIT);
    }

    #[test]
    fn test_responder_sees_request() {
        let peer = SimulatedDoorbell::new();
        peer.ack_after(1);
        peer.respond_with(|request| MailboxMessage::new(request.opcode, request.param1, request.param0));
        peer.write32(DB_DIN0_REG_OFST, 1);
        peer.write32(DB_DIN1_REG_OFST, 2);
        peer.write32(DB_IN_REG_OFST, 3);
        assert_eq!(peer.read32(DB_STATUS_REG_OFST), DB_STATUS_ACK_BIT | DB_STATUS_AVAIL_BIT);
        assert_eq!(peer.register(DB_DOUT0_REG_OFST), 2);
        assert_eq!(peer.register(DB_DOUT1_REG_OFST), 1);
        assert_eq!(peer.register(DB_OUT_REG_OFST), 3);
    }
}
