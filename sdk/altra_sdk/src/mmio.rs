//! Memory Mapped I/O (MMIO) Register Access
//!
//! Provides the [`RegisterIo`] seam used by components that drive memory-mapped hardware blocks. The [`Mmio`]
//! implementation performs volatile 32-bit accesses at physical addresses, which is valid while firmware runs with
//! an identity mapping.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// 32-bit register access.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait RegisterIo {
    /// Reads the 32-bit register at `address`.
    fn read32(&self, address: u64) -> u32;

    /// Writes `value` to the 32-bit register at `address`.
    fn write32(&self, address: u64, value: u32);
}

impl<T: RegisterIo + ?Sized> RegisterIo for &T {
    fn read32(&self, address: u64) -> u32 {
        (**self).read32(address)
    }

    fn write32(&self, address: u64, value: u32) {
        (**self).write32(address, value)
    }
}

/// Volatile MMIO access through identity mapped physical addresses.
#[derive(Debug, Default)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Creates a new MMIO accessor.
    ///
    /// ## Safety
    ///
    /// Every address later passed to [`RegisterIo`] methods must be a 4-byte aligned device register that is mapped
    /// at its physical address as device memory.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterIo for Mmio {
    fn read32(&self, address: u64) -> u32 {
        // SAFETY: The creator of this accessor guaranteed that register addresses are mapped and aligned.
        unsafe { (address as usize as *const u32).read_volatile() }
    }

    fn write32(&self, address: u64, value: u32) {
        // SAFETY: The creator of this accessor guaranteed that register addresses are mapped and aligned.
        unsafe { (address as usize as *mut u32).write_volatile(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmio_volatile_access() {
        let mut backing = Box::new([0u32; 4]);
        let base = backing.as_mut_ptr() as u64;

        let mmio = unsafe { Mmio::new() };
        mmio.write32(base + 4, 0xDEAD_BEEF);
        assert_eq!(mmio.read32(base + 4), 0xDEAD_BEEF);
        assert_eq!(backing[1], 0xDEAD_BEEF);
        assert_eq!(mmio.read32(base), 0);
    }
}
