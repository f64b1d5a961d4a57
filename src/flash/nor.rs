// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! `embedded-storage` NOR flash view of a [`BlockDevice`], for storage
//! layers written against those traits.
//!
//! The traits fix block sizes at compile time, so the adapter carries them as
//! const parameters and checks them against the device once, on construction.
//! Unlike [`BlockDevice::write_at`], writes through the adapter must be whole
//! aligned write blocks, as the traits require.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::error::{FlashError, Result};
use crate::flash::BlockDevice;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlashError::Misaligned { .. } => NorFlashErrorKind::NotAligned,
            FlashError::InvertedRange { .. } => NorFlashErrorKind::OutOfBounds,
            e if e.is_out_of_range() => NorFlashErrorKind::OutOfBounds,
            _ => NorFlashErrorKind::Other,
        }
    }
}

/// A [`BlockDevice`] whose write and erase block sizes are `WRITE` and
/// `ERASE` bytes.
pub struct NorFlashDevice<D, const WRITE: usize, const ERASE: usize> {
    device: D,
}

impl<D: BlockDevice, const WRITE: usize, const ERASE: usize> NorFlashDevice<D, WRITE, ERASE> {
    pub fn new(device: D) -> Result<Self> {
        if device.write_block_size() as usize != WRITE {
            return Err(FlashError::InvalidGeometry("write block size differs from the adapter's"));
        }
        if device.erase_block_size() as usize != ERASE {
            return Err(FlashError::InvalidGeometry("erase block size differs from the adapter's"));
        }
        Ok(Self { device })
    }

    pub fn inner(&self) -> &D {
        &self.device
    }

    pub fn into_inner(self) -> D {
        self.device
    }
}

impl<D: BlockDevice, const WRITE: usize, const ERASE: usize> ErrorType
    for NorFlashDevice<D, WRITE, ERASE>
{
    type Error = FlashError;
}

impl<D: BlockDevice, const WRITE: usize, const ERASE: usize> ReadNorFlash
    for NorFlashDevice<D, WRITE, ERASE>
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<()> {
        self.device.read_at(bytes, offset).map(|_| ())
    }

    fn capacity(&self) -> usize {
        self.device.size() as usize
    }
}

impl<D: BlockDevice, const WRITE: usize, const ERASE: usize> NorFlash
    for NorFlashDevice<D, WRITE, ERASE>
{
    const WRITE_SIZE: usize = WRITE;
    const ERASE_SIZE: usize = ERASE;

    fn erase(&mut self, from: u32, to: u32) -> Result<()> {
        if from > to {
            return Err(FlashError::InvertedRange { from, to });
        }
        let block = ERASE as u32;
        for edge in [from, to] {
            if edge % block != 0 {
                return Err(FlashError::Misaligned {
                    offset: edge,
                    align: block,
                });
            }
        }
        self.device.erase_blocks(from / block, (to - from) / block)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        let block = WRITE as u32;
        if offset % block != 0 {
            return Err(FlashError::Misaligned {
                offset,
                align: block,
            });
        }
        if bytes.len() % WRITE != 0 {
            return Err(FlashError::Misaligned {
                offset: offset.wrapping_add(bytes.len() as u32),
                align: block,
            });
        }
        self.device.write_at(bytes, offset).map(|_| ())
    }
}
