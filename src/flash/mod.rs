// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Self-programming flash access.
//!
//! Erasing or programming flash can stall instruction fetches from the same
//! bank for the length of the command. An interrupt taken meanwhile would
//! fetch its handler from that bank and hang or execute garbage, so every
//! command the device issues runs with interrupts masked.

#[cfg(feature = "embedded-storage")]
pub mod nor;
#[cfg(all(feature = "rp2040", target_arch = "arm", target_os = "none"))]
pub mod rp2040;

use alloc::vec::Vec;

use crate::config::ERASED_BYTE;
use crate::error::{FlashError, Result};
use crate::interrupt::InterruptMask;
use crate::log;

/// Raw flash controller commands.
///
/// Addresses are in the controller's own address space, which starts at
/// [`FlashGeometry::controller_base`]. Commands are synchronous and are
/// assumed to succeed once issued.
pub trait FlashController {
    /// Copies flash contents into `buf`.
    fn read(&self, address: u32, buf: &mut [u8]);

    /// Programs `data` at `address`. `data` must not live in flash.
    fn program(&mut self, address: u32, data: &[u8]);

    /// Erases `len` bytes starting at `address`.
    fn erase(&mut self, address: u32, len: u32);

    /// Clocks `tx` out to the flash chip while filling `rx` with its reply.
    /// Both buffers have the same length.
    fn transaction(&mut self, tx: &[u8], rx: &mut [u8]);

    /// Resets into the ROM bootloader.
    fn enter_bootloader(&mut self) -> !;
}

/// Where the data region sits and how the controller carves it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashGeometry {
    /// CPU address the controller addresses as 0.
    pub controller_base: u32,
    /// CPU address of the first byte reserved for data.
    pub data_start: u32,
    /// CPU address one past the data region.
    pub data_end: u32,
    pub write_block_size: u32,
    pub erase_block_size: u32,
}

impl FlashGeometry {
    /// Checks the layout is something the device can address safely.
    pub fn validate(&self) -> Result<()> {
        let blocks_ok = |size: u32| size != 0 && size.is_power_of_two();
        if !blocks_ok(self.write_block_size) {
            return Err(FlashError::InvalidGeometry("write block size must be a power of two"));
        }
        if !blocks_ok(self.erase_block_size) {
            return Err(FlashError::InvalidGeometry("erase block size must be a power of two"));
        }
        if self.erase_block_size % self.write_block_size != 0 {
            return Err(FlashError::InvalidGeometry("erase block must hold whole write blocks"));
        }
        if self.data_start < self.controller_base {
            return Err(FlashError::InvalidGeometry("data region starts below the controller base"));
        }
        if self.data_end < self.data_start {
            return Err(FlashError::InvalidGeometry("data region ends before it starts"));
        }
        if (self.data_start - self.controller_base) % self.erase_block_size != 0 {
            return Err(FlashError::InvalidGeometry("data region is not erase-block aligned"));
        }
        if self.size() % self.erase_block_size != 0 {
            return Err(FlashError::InvalidGeometry("data region is not a whole number of erase blocks"));
        }
        Ok(())
    }

    /// Bytes available in the data region.
    pub const fn size(&self) -> u32 {
        self.data_end.wrapping_sub(self.data_start)
    }

    /// Number of erase blocks in the data region.
    pub const fn erase_block_count(&self) -> u32 {
        match self.size().checked_div(self.erase_block_size) {
            Some(count) => count,
            None => 0,
        }
    }

    /// Controller address of a data-region offset.
    ///
    /// Some controllers (RP2040) number flash from zero instead of from the
    /// CPU-visible base, so this is a subtraction rather than an identity.
    ///
    /// Wraps instead of panicking on a geometry that has not been validated.
    pub const fn physical_address(&self, offset: u32) -> u32 {
        self.data_start
            .wrapping_sub(self.controller_base)
            .wrapping_add(offset)
    }

    /// Bytes programmed for `len` bytes at `offset`: the span from the start
    /// of the enclosing write block, rounded up to whole write blocks.
    pub fn padded_len(&self, offset: u32, len: usize) -> usize {
        let block = self.write_block_size as usize;
        let head = offset as usize % block;
        (head + len).div_ceil(block) * block
    }
}

/// Places `data` `head` bytes into a buffer that is a whole number of
/// `block`s long. The head and tail hold the erased value, which programs
/// nothing, so neighbouring cells stay untouched.
pub fn pad_to_blocks(data: &[u8], head: usize, block: usize) -> Vec<u8> {
    let padded_len = (head + data.len()).div_ceil(block) * block;
    let mut padded = Vec::with_capacity(padded_len);
    padded.resize(head, ERASED_BYTE);
    padded.extend_from_slice(data);
    padded.resize(padded_len, ERASED_BYTE);
    padded
}

/// Byte-addressed storage that is erased and programmed in blocks.
///
/// Offsets are relative to the start of the device's data region.
pub trait BlockDevice {
    /// Bytes addressable through this device.
    fn size(&self) -> u32;

    /// Programming granularity; writes are widened to whole blocks of it.
    fn write_block_size(&self) -> u32;

    /// Erase granularity.
    fn erase_block_size(&self) -> u32;

    /// Reads `buf.len()` bytes at `offset`.
    fn read_at(&mut self, buf: &mut [u8], offset: u32) -> Result<usize>;

    /// Writes `data` at `offset`, returning the padded number of bytes
    /// programmed. `offset` need not be block aligned.
    fn write_at(&mut self, data: &[u8], offset: u32) -> Result<usize>;

    /// Erases `count` erase blocks starting at block `first_block`.
    fn erase_blocks(&mut self, first_block: u32, count: u32) -> Result<()>;
}

/// Flash data region of the chip the program is running from.
pub struct FlashBlockDevice<C, M> {
    controller: C,
    interrupts: M,
    geometry: FlashGeometry,
}

impl<C: FlashController, M: InterruptMask> FlashBlockDevice<C, M> {
    pub fn new(controller: C, interrupts: M, geometry: FlashGeometry) -> Result<Self> {
        geometry.validate()?;
        log::debug!(
            data_start = geometry.data_start,
            size = geometry.size(),
            write_block = geometry.write_block_size,
            erase_block = geometry.erase_block_size,
            "flash block device ready"
        );
        Ok(Self {
            controller,
            interrupts,
            geometry,
        })
    }

    pub fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn interrupts(&self) -> &M {
        &self.interrupts
    }

    pub fn into_parts(self) -> (C, M) {
        (self.controller, self.interrupts)
    }

    /// Sends a raw command to the flash chip and collects its reply.
    pub fn transaction(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(FlashError::LengthMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        if tx.is_empty() {
            return Ok(());
        }

        // The controller may run with flash unmapped, so keep tx in RAM.
        let tx = tx.to_vec();
        log::debug!(len = tx.len(), command = tx[0], "flash transaction");

        let _cs = self.interrupts.critical_section();
        self.controller.transaction(&tx, rx);
        Ok(())
    }

    /// Resets into the ROM bootloader.
    pub fn enter_bootloader(&mut self) -> ! {
        log::info!("entering bootloader");
        self.controller.enter_bootloader()
    }
}

impl<C: FlashController, M: InterruptMask> BlockDevice for FlashBlockDevice<C, M> {
    fn size(&self) -> u32 {
        self.geometry.size()
    }

    fn write_block_size(&self) -> u32 {
        self.geometry.write_block_size
    }

    fn erase_block_size(&self) -> u32 {
        self.geometry.erase_block_size
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u32) -> Result<usize> {
        let size = self.geometry.size();
        if offset as u64 + buf.len() as u64 > size as u64 {
            log::warn!(offset, len = buf.len(), size, "flash read past end of data region");
            return Err(FlashError::ReadPastEnd {
                offset,
                len: buf.len(),
                size,
            });
        }
        if buf.is_empty() {
            return Ok(0);
        }

        self.controller
            .read(self.geometry.physical_address(offset), buf);
        Ok(buf.len())
    }

    fn write_at(&mut self, data: &[u8], offset: u32) -> Result<usize> {
        let size = self.geometry.size();
        if offset as u64 + data.len() as u64 > size as u64 {
            log::warn!(offset, len = data.len(), size, "flash write past end of data region");
            return Err(FlashError::WritePastEnd {
                offset,
                len: data.len(),
                size,
            });
        }
        if data.is_empty() {
            return Ok(0);
        }

        // The region is a whole number of write blocks, so a write that fits
        // still fits once widened to the blocks around it.
        let block = self.geometry.write_block_size;
        let head = offset % block;
        let padded = pad_to_blocks(data, head as usize, block as usize);
        let address = self.geometry.physical_address(offset - head);
        log::debug!(address, len = padded.len(), "programming flash");

        let _cs = self.interrupts.critical_section();
        self.controller.program(address, &padded);
        Ok(padded.len())
    }

    fn erase_blocks(&mut self, first_block: u32, count: u32) -> Result<()> {
        let size = self.geometry.size();
        let block = self.geometry.erase_block_size as u64;
        let end = (first_block as u64 + count as u64) * block;
        if end > size as u64 {
            log::warn!(first_block, count, size, "flash erase past end of data region");
            return Err(FlashError::ErasePastEnd {
                first_block,
                count,
                size,
            });
        }
        if count == 0 {
            return Ok(());
        }

        // Both fit in u32: end <= size.
        let address = self
            .geometry
            .physical_address(first_block * self.geometry.erase_block_size);
        let len = count * self.geometry.erase_block_size;
        log::debug!(address, len, "erasing flash");

        let _cs = self.interrupts.critical_section();
        self.controller.erase(address, len);
        Ok(())
    }
}
