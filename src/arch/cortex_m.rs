// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Cortex-M backend.
//!
//! Interrupt masking goes through PRIMASK. Checkpoints save r4-r11, SP and LR
//! from thread mode and are resumed from handler mode by faking an exception
//! frame at the saved stack pointer and performing an exception return into
//! thread mode on the main stack. The assembly sticks to ARMv6-M
//! instructions so it runs on Cortex-M0+ as well as M3/M4/M7.

use core::arch::global_asm;

use cortex_m::interrupt;
use cortex_m::peripheral::scb::VectActive;
use cortex_m::peripheral::SCB;
use cortex_m::register::primask;

use crate::checkpoint::ContextSwitch;
use crate::interrupt::InterruptMask;

/// PRIMASK-based interrupt mask for the current core.
#[derive(Debug, Default, Clone, Copy)]
pub struct CortexMInterrupts;

impl InterruptMask for CortexMInterrupts {
    /// Whether interrupts were enabled before `disable`.
    type State = bool;

    fn disable(&self) -> bool {
        let was_active = primask::read().is_active();
        interrupt::disable();
        was_active
    }

    unsafe fn restore(&self, was_active: bool) {
        if was_active {
            interrupt::enable();
        }
    }
}

/// Registers preserved across a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CortexMContext {
    /// r4-r11.
    pub callee_saved: [u32; 8],
    pub sp: u32,
    /// Return address of the capture call, Thumb bit included.
    pub pc: u32,
}

/// Checkpoint context switch for Cortex-M thread mode on the main stack.
#[derive(Debug, Clone, Copy)]
pub struct CortexMSwitch;

extern "C" {
    fn mcu_runtime_checkpoint_capture(context: *mut CortexMContext) -> u32;
    fn mcu_runtime_checkpoint_restore(context: *const CortexMContext) -> !;
}

unsafe impl ContextSwitch for CortexMSwitch {
    type Context = CortexMContext;

    const EMPTY: CortexMContext = CortexMContext {
        callee_saved: [0; 8],
        sp: 0,
        pc: 0,
    };

    #[inline(always)]
    unsafe fn capture(context: *mut CortexMContext) -> bool {
        mcu_runtime_checkpoint_capture(context) != 0
    }

    fn resume_address(context: &CortexMContext) -> usize {
        context.pc as usize
    }

    unsafe fn restore(context: *const CortexMContext) -> ! {
        if let VectActive::ThreadMode = SCB::vect_active() {
            panic!("checkpoint: resume must be called from an exception handler");
        }
        mcu_runtime_checkpoint_restore(context)
    }
}

/// Requests a system reset through the SCB.
pub fn system_reset() -> ! {
    SCB::sys_reset()
}

/// Sleeps until the next interrupt.
#[inline(always)]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

// r0 = *mut CortexMContext. Stores r4-r11, sp, lr and returns 1.
global_asm!(
    ".syntax unified",
    ".thumb",
    ".section .text.mcu_runtime_checkpoint_capture,\"ax\",%progbits",
    ".global mcu_runtime_checkpoint_capture",
    ".type mcu_runtime_checkpoint_capture,%function",
    ".thumb_func",
    "mcu_runtime_checkpoint_capture:",
    "    stmia r0!, {{r4-r7}}",
    "    mov r1, r8",
    "    mov r2, r9",
    "    mov r3, r10",
    "    stmia r0!, {{r1-r3}}",
    "    mov r1, r11",
    "    mov r2, sp",
    "    mov r3, lr",
    "    stmia r0!, {{r1-r3}}",
    "    movs r0, #1",
    "    bx lr",
    ".size mcu_runtime_checkpoint_capture, . - mcu_runtime_checkpoint_capture",
);

// r0 = *const CortexMContext. Loads every saved register before touching the
// stack, builds a basic exception frame just below the saved sp (stacked
// r0 = 0 so the capture call returns 0, pc = saved lr with the Thumb bit
// cleared, xPSR = Thumb state), then exception-returns to thread mode on MSP.
global_asm!(
    ".syntax unified",
    ".thumb",
    ".section .text.mcu_runtime_checkpoint_restore,\"ax\",%progbits",
    ".global mcu_runtime_checkpoint_restore",
    ".type mcu_runtime_checkpoint_restore,%function",
    ".thumb_func",
    "mcu_runtime_checkpoint_restore:",
    "    ldmia r0!, {{r4-r7}}",
    "    ldmia r0!, {{r1-r3}}",
    "    mov r8, r1",
    "    mov r9, r2",
    "    mov r10, r3",
    "    ldmia r0!, {{r1-r3}}",
    "    mov r11, r1",
    "    subs r2, #32",
    "    movs r1, #1",
    "    bics r3, r1",
    "    str r3, [r2, #24]",
    "    lsls r1, r1, #24",
    "    str r1, [r2, #28]",
    "    movs r1, #0",
    "    str r1, [r2, #0]",
    "    str r1, [r2, #20]",
    "    mov sp, r2",
    "    movs r0, #6",
    "    mvns r0, r0",
    "    bx r0",
    ".size mcu_runtime_checkpoint_restore, . - mcu_runtime_checkpoint_restore",
);
