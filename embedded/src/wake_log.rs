// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-only log of wake-ups kept in a flash data region.
//!
//! Records are appended back to back. When the next record would not fit,
//! the whole region is erased and the log starts over at offset 0.

use mcu_runtime::{BlockDevice, Result};

pub const RECORD_LEN: usize = 16;

/// "WAKE" in little-endian byte order.
const RECORD_MAGIC: u32 = 0x454B_4157;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeRecord {
    pub sequence: u32,
    /// Number of times the region had been erased when the record was written.
    pub generation: u32,
}

impl WakeRecord {
    fn encode(&self) -> [u8; RECORD_LEN] {
        // Trailing bytes stay erased.
        let mut raw = [0xFF; RECORD_LEN];
        raw[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        raw[4..8].copy_from_slice(&self.sequence.to_le_bytes());
        raw[8..12].copy_from_slice(&self.generation.to_le_bytes());
        raw
    }

    fn decode(raw: &[u8; RECORD_LEN]) -> Option<Self> {
        let word = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        if word(0) != RECORD_MAGIC {
            return None;
        }
        Some(Self {
            sequence: word(4),
            generation: word(8),
        })
    }
}

pub struct WakeLog<D> {
    device: D,
    next_offset: u32,
    sequence: u32,
    erases: u32,
}

impl<D: BlockDevice> WakeLog<D> {
    /// Assumes the region starts out erased.
    pub fn new(device: D) -> Self {
        Self {
            device,
            next_offset: 0,
            sequence: 0,
            erases: 0,
        }
    }

    /// Appends the next record and returns the offset it was written at.
    pub fn append(&mut self) -> Result<u32> {
        if self.next_offset as usize + RECORD_LEN > self.device.size() as usize {
            let blocks = self.device.size() / self.device.erase_block_size();
            self.device.erase_blocks(0, blocks)?;
            self.next_offset = 0;
            self.erases += 1;
        }

        let record = WakeRecord {
            sequence: self.sequence,
            generation: self.erases,
        };
        let offset = self.next_offset;
        let written = self.device.write_at(&record.encode(), offset)?;
        self.next_offset += written as u32;
        self.sequence += 1;
        Ok(offset)
    }

    /// Reads back a record; `None` if the slot holds no record.
    pub fn read(&mut self, offset: u32) -> Result<Option<WakeRecord>> {
        let mut raw = [0u8; RECORD_LEN];
        self.device.read_at(&mut raw, offset)?;
        Ok(WakeRecord::decode(&raw))
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn erases(&self) -> u32 {
        self.erases
    }

    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }
}
