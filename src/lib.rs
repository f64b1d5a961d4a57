// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![no_std]

//! mcu-runtime: interrupt-resumable checkpoints and self-programming flash
//! access for single-core bare-metal microcontrollers.

extern crate alloc;

#[cfg(any(test, feature = "std"))]
#[macro_use]
extern crate std;

#[cfg(feature = "tracing")]
pub(crate) use tracing as log;

#[cfg(not(feature = "tracing"))]
pub(crate) mod log {
    macro_rules! trace {
        ( $( $t:tt )* ) => {};
    }
    pub(crate) use trace;
    macro_rules! debug {
        ( $( $t:tt )* ) => {};
    }
    pub(crate) use debug;
    macro_rules! info {
        ( $( $t:tt )* ) => {};
    }
    pub(crate) use info;
    macro_rules! warner {
        ( $( $t:tt )* ) => {};
    }
    pub(crate) use warner as warn;
}

pub mod arch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod flash;
pub mod interrupt;
pub mod sim;

pub use checkpoint::{Checkpoint, ContextSwitch, Outcome};
pub use error::{FlashError, Result};
pub use flash::{BlockDevice, FlashBlockDevice, FlashController, FlashGeometry};
#[cfg(feature = "embedded-storage")]
pub use flash::nor::NorFlashDevice;
pub use interrupt::{CriticalSection, InterruptMask};

#[cfg(test)]
pub mod tests;
