// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

/// Recoverable flash failures. Every variant is reported before any command
/// reaches the flash controller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    #[error("cannot read past end of flash data: offset {offset:#x} + {len} bytes exceeds {size:#x}")]
    ReadPastEnd { offset: u32, len: usize, size: u32 },

    #[error("cannot write past end of flash data: offset {offset:#x} + {len} bytes exceeds {size:#x}")]
    WritePastEnd { offset: u32, len: usize, size: u32 },

    #[error("cannot erase past end of flash data: blocks {first_block}..+{count} exceed {size:#x}")]
    ErasePastEnd { first_block: u32, count: u32, size: u32 },

    #[error("offset {offset:#x} is not aligned to {align} bytes")]
    Misaligned { offset: u32, align: u32 },

    #[error("erase range {from:#x}..{to:#x} ends before it starts")]
    InvertedRange { from: u32, to: u32 },

    #[error("transaction buffers differ in length: tx {tx}, rx {rx}")]
    LengthMismatch { tx: usize, rx: usize },

    #[error("invalid flash geometry: {0}")]
    InvalidGeometry(&'static str),
}

impl FlashError {
    /// True for the errors raised when a request leaves the data region.
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            FlashError::ReadPastEnd { .. }
                | FlashError::WritePastEnd { .. }
                | FlashError::ErasePastEnd { .. }
        )
    }
}

pub type Result<T> = core::result::Result<T, FlashError>;
