//! PCIe Hot-Plug Service
//!
//! The hot-plug controller runs in a secure partition. Boot firmware describes the port layout to it, locks the
//! layout and starts the service. Each command opens its own handle and closes it before returning.
//!
//! Hot-plug is an auxiliary feature: callers usually log a failed command and continue booting without it.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use altra_sdk::{
    error::{EfiError, Result},
    smc::SecureMonitor,
};
use r_efi::efi;

use crate::spci::SpciClient;

pub const HOTPLUG_ALERT_IRQ: u64 = 1;
pub const HOTPLUG_START: u64 = 2;
pub const HOTPLUG_CHANGE: u64 = 3;
pub const HOTPLUG_LED: u64 = 4;
pub const HOTPLUG_PORTMAP_CLEAR: u64 = 5;
pub const HOTPLUG_PORTMAP_SET: u64 = 6;
pub const HOTPLUG_PORTMAP_LOCK: u64 = 7;
pub const HOTPLUG_GPIOMAP: u64 = 8;

/// Client id used by boot firmware.
pub const HOTPLUG_CLIENT_ID: u16 = 0xABCD;

pub const HOTPLUG_SERVICE_GUID: efi::Guid =
    efi::Guid::from_fields(0x5F5D_9C3E, 0x1D7B, 0x4B1A, 0x93, 0x2C, &[0x6E, 0x11, 0x0D, 0x4A, 0x8B, 0x57]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotPlugConfig {
    pub client_id: u16,
    pub service_guid: efi::Guid,
}

impl Default for HotPlugConfig {
    fn default() -> Self {
        Self { client_id: HOTPLUG_CLIENT_ID, service_guid: HOTPLUG_SERVICE_GUID }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum LedKind {
    Attention = 1,
    Fault = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum LedState {
    Off = 0,
    On = 1,
    Blink = 2,
}

/// Location of a hot-plug capable root port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLocation {
    pub socket: u8,
    pub root_complex: u8,
    pub root_port: u8,
}

impl PortLocation {
    /// Packs the location as socket `[7:0]`, root complex `[15:8]`, root port `[23:16]`.
    pub const fn encode(&self) -> u64 {
        self.socket as u64 | (self.root_complex as u64) << 8 | (self.root_port as u64) << 16
    }
}

/// One entry of the hot-plug port map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapEntry {
    /// Physical slot number.
    pub slot: u8,
    pub location: PortLocation,
    /// Address of the I2C GPIO expander serving the slot.
    pub i2c_address: u8,
}

pub struct HotPlugClient<M: SecureMonitor> {
    spci: SpciClient<M>,
    service: efi::Guid,
}

impl<M: SecureMonitor> HotPlugClient<M> {
    pub fn new(config: HotPlugConfig, monitor: M) -> Self {
        Self { spci: SpciClient::new(monitor, config.client_id), service: config.service_guid }
    }

    /// Routes hot-plug alerts to the OS interrupt.
    pub fn enable_alert_irq(&self) -> Result<()> {
        self.send("enable alert IRQ", &[HOTPLUG_ALERT_IRQ])
    }

    /// Starts hot-plug monitoring. The port map must be locked first.
    pub fn start(&self) -> Result<()> {
        self.send("start", &[HOTPLUG_START])
    }

    /// Notifies the service that the slot population changed.
    pub fn notify_change(&self) -> Result<()> {
        self.send("notify change", &[HOTPLUG_CHANGE])
    }

    pub fn set_led(&self, port: PortLocation, kind: LedKind, state: LedState) -> Result<()> {
        self.send("set LED", &[HOTPLUG_LED, port.encode(), kind as u64, state as u64])
    }

    pub fn clear_port_map(&self) -> Result<()> {
        self.send("clear port map", &[HOTPLUG_PORTMAP_CLEAR])
    }

    pub fn set_port_map(&self, entry: &PortMapEntry) -> Result<()> {
        self.send(
            "set port map",
            &[HOTPLUG_PORTMAP_SET, entry.slot as u64, entry.location.encode(), entry.i2c_address as u64],
        )
    }

    /// Freezes the port map until the next reset.
    pub fn lock_port_map(&self) -> Result<()> {
        self.send("lock port map", &[HOTPLUG_PORTMAP_LOCK])
    }

    /// Selects GPIO based presence and reset signalling instead of the I2C expanders.
    pub fn set_gpio_map(&self, enable: bool) -> Result<()> {
        self.send("set GPIO map", &[HOTPLUG_GPIOMAP, enable as u64])
    }

    /// Replaces the port map with `entries` and locks it.
    pub fn configure_port_map(&self, entries: &[PortMapEntry]) -> Result<()> {
        self.clear_port_map()?;
        for entry in entries {
            self.set_port_map(entry)?;
        }
        self.lock_port_map()
    }

    fn send(&self, name: &str, request: &[u64]) -> Result<()> {
        let result = self.spci.open(&self.service).and_then(|handle| {
            handle.request_blocking(request)?;
            handle.close()
        });
        match result {
            Ok(()) => {
                log::debug!(target: "hotplug", "Hot-plug {} done", name);
                Ok(())
            }
            Err(err) => {
                log::warn!(target: "hotplug", "Hot-plug {} failed: {:?}", name, err);
                Err(map_service_error(err))
            }
        }
    }
}

fn map_service_error(err: EfiError) -> EfiError {
    match err {
        EfiError::NotFound => EfiError::Unsupported,
        err => err,
    }
}
