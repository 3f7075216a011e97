//! Altra Base Definitions
//!
//! Basic definitions shared by the platform components.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
/// EFI memory allocation functions work in units of EFI_PAGEs that are 4KB.
pub const UEFI_PAGE_SIZE: usize = 0x1000;

/// The mask to apply to an address to get the page offset in UEFI.
pub const UEFI_PAGE_MASK: usize = UEFI_PAGE_SIZE - 1;

/// The shift to apply to an address to get the page frame number in UEFI.
pub const UEFI_PAGE_SHIFT: usize = 12;

/// Microseconds in one second.
pub const MICROSECONDS_PER_SECOND: u64 = 1_000_000;

/// Returns the number of UEFI pages needed to hold `size` bytes.
pub const fn uefi_size_to_pages(size: usize) -> usize {
    (size >> UEFI_PAGE_SHIFT) + if size & UEFI_PAGE_MASK == 0 { 0 } else { 1 }
}

/// Returns the size in bytes of `pages` UEFI pages.
pub const fn uefi_pages_to_size(pages: usize) -> usize {
    pages << UEFI_PAGE_SHIFT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_to_pages() {
        assert_eq!(uefi_size_to_pages(0), 0);
        assert_eq!(uefi_size_to_pages(1), 1);
        assert_eq!(uefi_size_to_pages(UEFI_PAGE_SIZE), 1);
        assert_eq!(uefi_size_to_pages(UEFI_PAGE_SIZE + 1), 2);
        assert_eq!(uefi_pages_to_size(3), 3 * UEFI_PAGE_SIZE);
    }
}
