// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! RP2040 flash controller backed by the boot ROM routines.
//!
//! The ROM routines take flash out of execute-in-place mode while they run,
//! so the code driving them lives in RAM (`.data.ram_func`) and only calls
//! through function pointers resolved beforehand. Afterwards the copy of
//! boot2 saved at construction is re-run to bring back fast XIP.

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{compiler_fence, Ordering};

use crate::config::RP2040_XIP_BASE;
use crate::flash::FlashController;

const ROM_FUNC_TABLE: *const u16 = 0x0000_0014 as *const u16;
const ROM_TABLE_LOOKUP: *const u16 = 0x0000_0018 as *const u16;

/// Largest erase the ROM issues with a single command, and its opcode.
const BLOCK_ERASE_SIZE: u32 = 1 << 16;
const BLOCK_ERASE_CMD: u8 = 0xD8;

const SSI_SR: *const u32 = 0x1800_0028 as *const u32;
const SSI_DR0: *mut u32 = 0x1800_0060 as *mut u32;
const SSI_SR_TFNF: u32 = 1 << 1;
const SSI_SR_RFNE: u32 = 1 << 3;

const IO_QSPI_SS_CTRL: *mut u32 = 0x4001_800C as *mut u32;
const SS_OUTOVER_MASK: u32 = 0x3 << 8;
const SS_OUTOVER_LOW: u32 = 0x2 << 8;
const SS_OUTOVER_HIGH: u32 = 0x3 << 8;

/// Keeps the 16-entry SSI FIFOs from overflowing if we get delayed.
const MAX_IN_FLIGHT: usize = 16 - 2;

const BOOT2_WORDS: usize = 64;

static mut BOOT2_RAM: [u32; BOOT2_WORDS] = [0; BOOT2_WORDS];

type RomTableLookupFn = unsafe extern "C" fn(table: *const u16, code: u32) -> usize;

#[derive(Clone, Copy)]
#[repr(C)]
struct RomFunctions {
    connect_internal_flash: unsafe extern "C" fn(),
    flash_exit_xip: unsafe extern "C" fn(),
    flash_range_erase: unsafe extern "C" fn(u32, usize, u32, u8),
    flash_range_program: unsafe extern "C" fn(u32, *const u8, usize),
    flash_flush_cache: unsafe extern "C" fn(),
    reset_to_usb_boot: unsafe extern "C" fn(u32, u32),
    boot2: unsafe extern "C" fn(),
}

unsafe fn rom_lookup(tag: &[u8; 2]) -> usize {
    let lookup: RomTableLookupFn =
        core::mem::transmute(read_volatile(ROM_TABLE_LOOKUP) as usize);
    let table = read_volatile(ROM_FUNC_TABLE) as usize as *const u16;
    lookup(table, u16::from_le_bytes(*tag) as u32)
}

/// Internal QSPI flash of the RP2040.
pub struct Rp2040Flash {
    rom: RomFunctions,
}

impl Rp2040Flash {
    /// Resolves the ROM routines and saves a RAM copy of boot2.
    ///
    /// # Safety
    ///
    /// Must be called while flash is in XIP mode, and only one instance may
    /// exist. The second core must not be executing from flash while any
    /// command runs.
    pub unsafe fn new() -> Self {
        let boot2 = core::ptr::addr_of_mut!(BOOT2_RAM) as *mut u32;
        core::ptr::copy_nonoverlapping(RP2040_XIP_BASE as *const u32, boot2, BOOT2_WORDS);
        compiler_fence(Ordering::SeqCst);

        let rom = RomFunctions {
            connect_internal_flash: core::mem::transmute(rom_lookup(b"IF")),
            flash_exit_xip: core::mem::transmute(rom_lookup(b"EX")),
            flash_range_erase: core::mem::transmute(rom_lookup(b"RE")),
            flash_range_program: core::mem::transmute(rom_lookup(b"RP")),
            flash_flush_cache: core::mem::transmute(rom_lookup(b"FC")),
            reset_to_usb_boot: core::mem::transmute(rom_lookup(b"UB")),
            // Thumb bit set: boot2 is entered as a function.
            boot2: core::mem::transmute(boot2 as usize + 1),
        };
        Self { rom }
    }
}

impl FlashController for Rp2040Flash {
    fn read(&self, address: u32, buf: &mut [u8]) {
        let src = (RP2040_XIP_BASE + address) as *const u8;
        // SAFETY: the device bounds-checks `address` against the flash size,
        // and flash is memory-mapped whenever no command is running.
        unsafe { core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) }
    }

    fn program(&mut self, address: u32, data: &[u8]) {
        // SAFETY: interrupts are masked by the caller and `data` is in RAM.
        unsafe { program_from_ram(&self.rom, address, data.as_ptr(), data.len()) }
    }

    fn erase(&mut self, address: u32, len: u32) {
        // SAFETY: interrupts are masked by the caller.
        unsafe { erase_from_ram(&self.rom, address, len as usize) }
    }

    fn transaction(&mut self, tx: &[u8], rx: &mut [u8]) {
        // SAFETY: interrupts are masked by the caller and both buffers are in
        // RAM with equal length.
        unsafe { transact_from_ram(&self.rom, tx.as_ptr(), rx.as_mut_ptr(), tx.len()) }
    }

    fn enter_bootloader(&mut self) -> ! {
        // SAFETY: the ROM resets the chip and does not return.
        unsafe { (self.rom.reset_to_usb_boot)(0, 0) };
        loop {
            cortex_m::asm::wfi();
        }
    }
}

#[inline(never)]
#[link_section = ".data.ram_func"]
unsafe fn program_from_ram(rom: *const RomFunctions, address: u32, data: *const u8, len: usize) {
    let connect = (*rom).connect_internal_flash;
    let exit_xip = (*rom).flash_exit_xip;
    let program = (*rom).flash_range_program;
    let flush = (*rom).flash_flush_cache;
    let boot2 = (*rom).boot2;
    compiler_fence(Ordering::SeqCst);

    connect();
    exit_xip();
    program(address, data, len);
    flush();
    boot2();
}

#[inline(never)]
#[link_section = ".data.ram_func"]
unsafe fn erase_from_ram(rom: *const RomFunctions, address: u32, len: usize) {
    let connect = (*rom).connect_internal_flash;
    let exit_xip = (*rom).flash_exit_xip;
    let erase = (*rom).flash_range_erase;
    let flush = (*rom).flash_flush_cache;
    let boot2 = (*rom).boot2;
    compiler_fence(Ordering::SeqCst);

    connect();
    exit_xip();
    erase(address, len, BLOCK_ERASE_SIZE, BLOCK_ERASE_CMD);
    flush();
    boot2();
}

#[inline(never)]
#[link_section = ".data.ram_func"]
unsafe fn transact_from_ram(rom: *const RomFunctions, tx: *const u8, rx: *mut u8, count: usize) {
    let connect = (*rom).connect_internal_flash;
    let exit_xip = (*rom).flash_exit_xip;
    let flush = (*rom).flash_flush_cache;
    let boot2 = (*rom).boot2;
    compiler_fence(Ordering::SeqCst);

    connect();
    exit_xip();
    force_chip_select(SS_OUTOVER_LOW);

    let mut tx_remaining = count;
    let mut rx_remaining = count;
    let mut tx = tx;
    let mut rx = rx;
    while tx_remaining > 0 || rx_remaining > 0 {
        let flags = read_volatile(SSI_SR);
        let can_put = flags & SSI_SR_TFNF != 0;
        let can_get = flags & SSI_SR_RFNE != 0;
        if can_put && tx_remaining > 0 && rx_remaining - tx_remaining < MAX_IN_FLIGHT {
            write_volatile(SSI_DR0, *tx as u32);
            tx = tx.add(1);
            tx_remaining -= 1;
        }
        if can_get && rx_remaining > 0 {
            *rx = read_volatile(SSI_DR0) as u8;
            rx = rx.add(1);
            rx_remaining -= 1;
        }
    }

    force_chip_select(SS_OUTOVER_HIGH);
    flush();
    boot2();
}

#[inline(always)]
unsafe fn force_chip_select(level: u32) {
    let ctrl = read_volatile(IO_QSPI_SS_CTRL);
    write_volatile(IO_QSPI_SS_CTRL, (ctrl & !SS_OUTOVER_MASK) | level);
}
