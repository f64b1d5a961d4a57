// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![no_std]
#![no_main]

// Demo firmware for QEMU's lm3s6965evb (Cortex-M3).
//
// The foreground parks on a checkpoint and sleeps. SysTick resumes the
// checkpoint, the foreground appends a wake record to a flash data region
// (simulated in RAM, since QEMU's flash is not self-programmable) and reads
// it back, then parks again. Every tenth wake a JSON status report goes out
// over UART0.

extern crate alloc; // SimulatedFlash keeps its cells on the heap

mod report;
mod transport;
mod wake_log;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::{entry, exception};
use embedded_alloc::Heap;
use panic_halt as _;

use mcu_runtime::arch::cortex_m::{system_reset, wait_for_interrupt, CortexMInterrupts, CortexMSwitch};
use mcu_runtime::sim::SimulatedFlash;
use mcu_runtime::{Checkpoint, FlashBlockDevice, FlashGeometry};

use report::StatusReport;
use wake_log::WakeLog;

#[global_allocator]
static HEAP: Heap = Heap::empty();

// Flash cells plus one padded write buffer at a time.
const HEAP_SIZE: usize = 16 * 1024;
static mut HEAP_MEM: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Resumed by SysTick while the foreground sleeps.
static WAKE: Checkpoint<CortexMSwitch> = Checkpoint::new();

const LOG_GEOMETRY: FlashGeometry = FlashGeometry {
    controller_base: 0,
    data_start: 0,
    data_end: 4096,
    write_block_size: 16,
    erase_block_size: 1024,
};

/// QEMU clocks the core at 12 MHz; wake ten times a second.
const SYSTICK_RELOAD: u32 = 12_000_000 / 10 - 1;

const REPORT_EVERY: u32 = 10;

#[entry]
fn main() -> ! {
    unsafe {
        let ptr = core::ptr::addr_of_mut!(HEAP_MEM);
        HEAP.init(ptr as usize, HEAP_SIZE);
    }

    let Some(mut peripherals) = cortex_m::Peripherals::take() else {
        fail(b"PERIPHERALS_TAKEN")
    };
    peripherals.SYST.set_clock_source(SystClkSource::Core);
    peripherals.SYST.set_reload(SYSTICK_RELOAD);
    peripherals.SYST.clear_current();
    peripherals.SYST.enable_counter();

    let flash = SimulatedFlash::for_geometry(&LOG_GEOMETRY);
    let device = match FlashBlockDevice::new(flash, CortexMInterrupts, LOG_GEOMETRY) {
        Ok(d) => d,
        Err(_) => fail(b"GEOMETRY_FAIL"),
    };
    let mut log = WakeLog::new(device);

    loop {
        WAKE.wait(&mut || peripherals.SYST.enable_interrupt(), &mut wait_for_interrupt);
        peripherals.SYST.disable_interrupt();

        let offset = match log.append() {
            Ok(o) => o,
            Err(_) => fail(b"FLASH_WRITE_FAIL"),
        };
        let record = match log.read(offset) {
            Ok(Some(r)) => r,
            Ok(None) => fail(b"RECORD_MISSING"),
            Err(_) => fail(b"FLASH_READ_FAIL"),
        };

        if log.sequence() % REPORT_EVERY == 0 {
            report::export(&StatusReport {
                wakes: log.sequence(),
                erases: log.erases(),
                next_offset: log.next_offset(),
                last_sequence: record.sequence,
                geometry: LOG_GEOMETRY,
            });
        }
    }
}

#[exception]
fn SysTick() {
    if WAKE.is_armed() {
        WAKE.resume();
    }
}

/// Reports the error, halts for an attached debugger, then starts over.
fn fail(code: &[u8]) -> ! {
    transport::export_error(code);
    cortex_m::asm::bkpt();
    system_reset()
}
