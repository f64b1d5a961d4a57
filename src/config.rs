// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

use crate::flash::FlashGeometry;

/// Value of an erased NOR flash cell. Padding bytes use it so a partial
/// block write leaves the rest of the block programmable.
pub const ERASED_BYTE: u8 = 0xFF;

/// CPU address of the RP2040 execute-in-place window. The boot ROM flash
/// routines address flash relative to this, starting at 0.
pub const RP2040_XIP_BASE: u32 = 0x1000_0000;

/// RP2040 page program granularity.
pub const RP2040_WRITE_BLOCK_SIZE: u32 = 256;

/// RP2040 sector erase granularity.
pub const RP2040_ERASE_BLOCK_SIZE: u32 = 4096;

/// Flash fitted on a Raspberry Pi Pico.
pub const PICO_FLASH_SIZE: u32 = 2 * 1024 * 1024;

/// Code occupies the lower half of the Pico flash; the upper half is data.
pub const PICO_DATA_SIZE: u32 = 1024 * 1024;

/// Flash layout for a Raspberry Pi Pico.
pub const PICO_GEOMETRY: FlashGeometry = FlashGeometry {
    controller_base: RP2040_XIP_BASE,
    data_start: RP2040_XIP_BASE + PICO_FLASH_SIZE - PICO_DATA_SIZE,
    data_end: RP2040_XIP_BASE + PICO_FLASH_SIZE,
    write_block_size: RP2040_WRITE_BLOCK_SIZE,
    erase_block_size: RP2040_ERASE_BLOCK_SIZE,
};
