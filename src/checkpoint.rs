// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Interrupt-resumable checkpoints.
//!
//! A checkpoint is a one-shot, setjmp-like resume point. Foreground code arms
//! it right before going idle, and an interrupt handler resumes it to hand
//! control back to the foreground without returning through its own frames:
//!
//! ```ignore
//! static WAKE: Checkpoint<CortexMSwitch> = Checkpoint::new();
//!
//! // foreground
//! WAKE.wait(&mut || enable_wake_irq(), &mut || cortex_m::asm::wfi());
//!
//! // inside the interrupt handler
//! if WAKE.is_armed() {
//!     WAKE.resume();
//! }
//! ```

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::log;

/// Platform routine that captures and restores an execution context.
///
/// # Safety
///
/// `capture` must return `true` after storing a context and must return
/// `false`, at the same call site and with the same stack pointer and
/// callee-saved registers, when that context is passed to `restore`.
/// `restore` must never return to its caller.
pub unsafe trait ContextSwitch {
    type Context: Copy;

    /// Context value of a checkpoint that has nothing saved.
    const EMPTY: Self::Context;

    /// Saves the caller's resume point into `context`.
    ///
    /// # Safety
    ///
    /// `context` must be valid for writes. See [`Checkpoint::arm`] for the
    /// requirements on the calling frame.
    unsafe fn capture(context: *mut Self::Context) -> bool;

    /// Address execution continues at when `context` is restored.
    fn resume_address(context: &Self::Context) -> usize;

    /// Transfers control to a previously captured context.
    ///
    /// # Safety
    ///
    /// `context` must hold a capture whose frame is still live.
    unsafe fn restore(context: *const Self::Context) -> !;
}

/// Which of its two returns [`Checkpoint::arm`] is making.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// The checkpoint was just saved.
    Armed,
    /// Control came back through [`Checkpoint::resume`].
    Resumed,
}

/// A resumable execution point, consumable exactly once per arm.
///
/// The empty state is tracked by a separate flag, so a captured context is
/// never confused with "nothing saved" whatever its contents.
pub struct Checkpoint<S: ContextSwitch> {
    armed: AtomicBool,
    context: UnsafeCell<S::Context>,
    _switch: PhantomData<fn() -> S>,
}

// SAFETY: single core. The foreground writes the context only while the flag
// is clear, and a single interrupt handler consumes it.
unsafe impl<S: ContextSwitch> Sync for Checkpoint<S> {}

impl<S: ContextSwitch> Checkpoint<S> {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            context: UnsafeCell::new(S::EMPTY),
            _switch: PhantomData,
        }
    }

    /// Saves the current execution point, replacing any earlier one.
    ///
    /// Returns twice: [`Outcome::Armed`] right away, and [`Outcome::Resumed`]
    /// from the same call once an interrupt handler calls [`resume`].
    ///
    /// # Safety
    ///
    /// - The function containing this call must not return while the
    ///   checkpoint is armed; resuming into a dead frame is undefined.
    /// - Locals modified between the two returns may hold either value after
    ///   `Resumed`.
    ///
    /// [`resume`]: Checkpoint::resume
    #[inline(always)]
    pub unsafe fn arm(&self) -> Outcome {
        // Clear first so an interrupt never sees a half-written context.
        self.armed.store(false, Ordering::SeqCst);
        if S::capture(self.context.get()) {
            self.armed.store(true, Ordering::SeqCst);
            Outcome::Armed
        } else {
            Outcome::Resumed
        }
    }

    /// Whether a capture is outstanding.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// The outstanding capture, if any.
    pub fn saved_context(&self) -> Option<S::Context> {
        if self.is_armed() {
            // SAFETY: the foreground does not write the context while armed.
            Some(unsafe { *self.context.get() })
        } else {
            None
        }
    }

    /// Abandons the outstanding capture without resuming it.
    pub fn disarm(&self) {
        if self.is_armed() {
            self.armed.store(false, Ordering::SeqCst);
            log::trace!("checkpoint disarmed");
        }
    }

    /// Jumps back to the armed point. Only call this from an interrupt
    /// handler.
    ///
    /// # Panics
    ///
    /// Panics if nothing is armed, or if the saved resume address is zero.
    pub fn resume(&self) -> ! {
        if !self.is_armed() {
            panic!("checkpoint: resume called with no saved checkpoint");
        }
        // Disarm before leaving so a repeated interrupt cannot consume it twice.
        self.armed.store(false, Ordering::SeqCst);

        // SAFETY: the flag was set, so the foreground finished writing.
        let context = unsafe {
            let saved = *self.context.get();
            *self.context.get() = S::EMPTY;
            saved
        };
        if S::resume_address(&context) == 0 {
            panic!("checkpoint: resume address is zero");
        }

        // SAFETY: `arm` requires the capturing frame to stay live while armed.
        unsafe { S::restore(&context) }
    }

    /// Low-power wait loop: arms the checkpoint, runs `setup` once and then
    /// `idle` until an interrupt handler resumes the checkpoint. Returns after
    /// the resume.
    ///
    /// `setup` usually enables the wake-up interrupt; `idle` is usually a
    /// wait-for-interrupt instruction.
    #[inline(never)]
    pub fn wait(&self, setup: &mut dyn FnMut(), idle: &mut dyn FnMut()) {
        log::trace!("checkpoint wait");
        // SAFETY: this frame is live until the resume: the armed branch never
        // returns, and nothing owned is dropped across the two returns.
        match unsafe { self.arm() } {
            Outcome::Armed => {
                setup();
                loop {
                    idle();
                }
            }
            Outcome::Resumed => {}
        }
        log::trace!("checkpoint resumed");
    }
}

impl<S: ContextSwitch> Default for Checkpoint<S> {
    fn default() -> Self {
        Self::new()
    }
}
