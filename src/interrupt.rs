// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Interrupt masking.
//!
//! The only mutual exclusion this crate needs is between foreground code and
//! interrupt handlers on a single core, so masking interrupts is the whole
//! locking story. `disable` reports the state it replaced and `restore` puts
//! exactly that state back, which keeps nested critical sections correct.

/// Platform primitive for masking interrupts on the current core.
pub trait InterruptMask {
    /// Interrupt-enable state captured by [`InterruptMask::disable`].
    type State: Copy;

    /// Masks interrupts and returns the state that was active before.
    fn disable(&self) -> Self::State;

    /// Restores a state previously returned by `disable`.
    ///
    /// # Safety
    ///
    /// `state` must come from the matching `disable` call, and calls must
    /// nest. Restoring out of order can unmask interrupts inside someone
    /// else's critical section.
    unsafe fn restore(&self, state: Self::State);

    /// Masks interrupts until the returned guard is dropped.
    fn critical_section(&self) -> CriticalSection<'_, Self> {
        let state = self.disable();
        CriticalSection { mask: self, state }
    }

    /// Runs `f` with interrupts masked.
    fn free<R>(&self, f: impl FnOnce() -> R) -> R {
        let _cs = self.critical_section();
        f()
    }
}

impl<M: InterruptMask + ?Sized> InterruptMask for &M {
    type State = M::State;

    fn disable(&self) -> Self::State {
        (**self).disable()
    }

    unsafe fn restore(&self, state: Self::State) {
        (**self).restore(state)
    }
}

/// Scoped interrupt mask. The prior state is restored exactly once, on drop,
/// including on early returns and unwinding.
#[must_use = "interrupts are unmasked again as soon as the guard is dropped"]
pub struct CriticalSection<'a, M: InterruptMask + ?Sized> {
    mask: &'a M,
    state: M::State,
}

impl<'a, M: InterruptMask + ?Sized> CriticalSection<'a, M> {
    /// State that will be restored when the guard drops.
    pub fn prior_state(&self) -> M::State {
        self.state
    }
}

impl<'a, M: InterruptMask + ?Sized> Drop for CriticalSection<'a, M> {
    fn drop(&mut self) {
        // SAFETY: the state came from the matching `disable` in
        // `critical_section`; scoped guards drop in reverse creation order.
        unsafe { self.mask.restore(self.state) }
    }
}
