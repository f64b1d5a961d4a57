// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Simulated platform.
//!
//! RAM-backed stand-ins for the flash controller and the interrupt mask, so
//! the device logic runs on targets without self-programmable flash and in
//! host tests. With `std` and unwinding panics, a simulated context switch
//! lets host code drive a checkpoint through a full arm/resume cycle.

use alloc::vec::Vec;
use core::cell::Cell;

use crate::config::ERASED_BYTE;
use crate::flash::{FlashController, FlashGeometry};
use crate::interrupt::InterruptMask;

/// Interrupt mask that only tracks state and counts calls.
#[derive(Debug)]
pub struct SimulatedInterrupts {
    enabled: Cell<bool>,
    disables: Cell<usize>,
    restores: Cell<usize>,
}

impl SimulatedInterrupts {
    /// Starts with interrupts enabled.
    pub fn new() -> Self {
        Self {
            enabled: Cell::new(true),
            disables: Cell::new(0),
            restores: Cell::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn disable_count(&self) -> usize {
        self.disables.get()
    }

    pub fn restore_count(&self) -> usize {
        self.restores.get()
    }
}

impl Default for SimulatedInterrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptMask for SimulatedInterrupts {
    type State = bool;

    fn disable(&self) -> bool {
        self.disables.set(self.disables.get() + 1);
        self.enabled.replace(false)
    }

    unsafe fn restore(&self, state: bool) {
        self.restores.set(self.restores.get() + 1);
        self.enabled.set(state);
    }
}

/// A command as the simulated controller received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashCommand {
    Program {
        address: u32,
        data: Vec<u8>,
        interrupts_enabled: Option<bool>,
    },
    Erase {
        address: u32,
        len: u32,
        interrupts_enabled: Option<bool>,
    },
    Transaction {
        tx: Vec<u8>,
        interrupts_enabled: Option<bool>,
    },
}

impl FlashCommand {
    /// Interrupt state seen while the command ran, when an observer is
    /// attached.
    pub fn interrupts_enabled(&self) -> Option<bool> {
        match self {
            FlashCommand::Program { interrupts_enabled, .. }
            | FlashCommand::Erase { interrupts_enabled, .. }
            | FlashCommand::Transaction { interrupts_enabled, .. } => *interrupts_enabled,
        }
    }
}

/// NOR flash kept in RAM. Erasing sets cells to `0xFF`; programming can only
/// clear bits, as on the real part. Every command is logged.
#[derive(Debug)]
pub struct SimulatedFlash<'a> {
    cells: Vec<u8>,
    commands: Vec<FlashCommand>,
    reply: Vec<u8>,
    observer: Option<&'a SimulatedInterrupts>,
}

impl<'a> SimulatedFlash<'a> {
    /// Erased flash covering controller addresses `0..len`.
    pub fn new(len: usize) -> Self {
        Self {
            cells: alloc::vec![ERASED_BYTE; len],
            commands: Vec::new(),
            reply: Vec::new(),
            observer: None,
        }
    }

    /// Erased flash large enough for the data region of `geometry`.
    pub fn for_geometry(geometry: &FlashGeometry) -> Self {
        Self::new(geometry.data_end.wrapping_sub(geometry.controller_base) as usize)
    }

    /// Records the interrupt state of `interrupts` with every command.
    pub fn observing(mut self, interrupts: &'a SimulatedInterrupts) -> Self {
        self.observer = Some(interrupts);
        self
    }

    /// Bytes the chip answers with during transactions; the rest read as
    /// `0xFF`.
    pub fn set_reply(&mut self, reply: &[u8]) {
        self.reply = reply.to_vec();
    }

    pub fn commands(&self) -> &[FlashCommand] {
        &self.commands
    }

    /// Raw cell contents at a controller address.
    pub fn cells(&self, address: u32, len: usize) -> &[u8] {
        let start = address as usize;
        &self.cells[start..start + len]
    }

    fn observed(&self) -> Option<bool> {
        self.observer.map(SimulatedInterrupts::is_enabled)
    }

    fn span(&self, address: u32, len: usize, what: &str) -> core::ops::Range<usize> {
        let start = address as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.cells.len() => start..end,
            _ => panic!(
                "simulated flash: {} of {} bytes at {:#x} is outside {:#x} bytes of flash",
                what,
                len,
                address,
                self.cells.len()
            ),
        }
    }
}

impl<'a> FlashController for SimulatedFlash<'a> {
    fn read(&self, address: u32, buf: &mut [u8]) {
        let span = self.span(address, buf.len(), "read");
        buf.copy_from_slice(&self.cells[span]);
    }

    fn program(&mut self, address: u32, data: &[u8]) {
        let span = self.span(address, data.len(), "program");
        for (cell, byte) in self.cells[span].iter_mut().zip(data) {
            *cell &= *byte;
        }
        let interrupts_enabled = self.observed();
        self.commands.push(FlashCommand::Program {
            address,
            data: data.to_vec(),
            interrupts_enabled,
        });
    }

    fn erase(&mut self, address: u32, len: u32) {
        let span = self.span(address, len as usize, "erase");
        self.cells[span].fill(ERASED_BYTE);
        let interrupts_enabled = self.observed();
        self.commands.push(FlashCommand::Erase {
            address,
            len,
            interrupts_enabled,
        });
    }

    fn transaction(&mut self, tx: &[u8], rx: &mut [u8]) {
        for (i, byte) in rx.iter_mut().enumerate() {
            *byte = self.reply.get(i).copied().unwrap_or(ERASED_BYTE);
        }
        let interrupts_enabled = self.observed();
        self.commands.push(FlashCommand::Transaction {
            tx: tx.to_vec(),
            interrupts_enabled,
        });
    }

    fn enter_bootloader(&mut self) -> ! {
        panic!("simulated flash: reset into bootloader");
    }
}

// Resuming unwinds, so the harness only exists where panics unwind. The
// workspace profiles abort on panic; test builds always unwind.
#[cfg(all(any(test, feature = "std"), panic = "unwind"))]
pub use self::resume::{catch_resume, Resumption, SimContext, SimulatedSwitch};

#[cfg(all(any(test, feature = "std"), panic = "unwind"))]
mod resume {
    use core::sync::atomic::{AtomicU32, Ordering};
    use std::boxed::Box;
    use std::panic::{self, AssertUnwindSafe};

    use crate::checkpoint::ContextSwitch;

    /// Stand-in resume address; any non-zero value works on the host.
    const SIM_RESUME_ADDRESS: usize = 0x1;

    static NEXT_SERIAL: AtomicU32 = AtomicU32::new(1);

    /// A simulated capture. `serial` is unique per capture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SimContext {
        pub resume_address: usize,
        pub serial: u32,
    }

    /// Context switch whose resume unwinds back to the nearest
    /// [`catch_resume`] instead of jumping.
    #[derive(Debug, Clone, Copy)]
    pub struct SimulatedSwitch;

    struct ResumePayload(SimContext);

    unsafe impl ContextSwitch for SimulatedSwitch {
        type Context = SimContext;

        const EMPTY: SimContext = SimContext {
            resume_address: 0,
            serial: 0,
        };

        unsafe fn capture(context: *mut SimContext) -> bool {
            context.write(SimContext {
                resume_address: SIM_RESUME_ADDRESS,
                serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            });
            true
        }

        fn resume_address(context: &SimContext) -> usize {
            context.resume_address
        }

        unsafe fn restore(context: *const SimContext) -> ! {
            panic::resume_unwind(Box::new(ResumePayload(*context)))
        }
    }

    /// How a [`catch_resume`] body finished.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Resumption<R> {
        /// The body returned normally.
        Returned(R),
        /// A checkpoint was resumed with this context.
        Resumed(SimContext),
    }

    /// Runs `body`, catching a simulated resume that unwinds out of it.
    /// Other panics keep propagating.
    ///
    /// Needs `panic = "unwind"`. Outside of tests, build with a profile that
    /// overrides the workspace's `panic = "abort"`.
    pub fn catch_resume<R>(body: impl FnOnce() -> R) -> Resumption<R> {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(value) => Resumption::Returned(value),
            Err(payload) => match payload.downcast::<ResumePayload>() {
                Ok(resumed) => Resumption::Resumed(resumed.0),
                Err(other) => panic::resume_unwind(other),
            },
        }
    }
}
