use core::marker::PhantomData;

use crate::CpuOps;

/// Interrupts stay masked on the executing core for the lifetime of the
/// guard; the previous state comes back on drop.
///
/// The guard is `!Send`: it describes the core it was created on and must not
/// travel to another one.
pub struct IrqGuard<CPU: CpuOps> {
    flags: usize,
    _cpu: PhantomData<*const CPU>,
}

impl<CPU: CpuOps> IrqGuard<CPU> {
    pub fn new() -> Self {
        Self {
            flags: CPU::disable_interrupts(),
            _cpu: PhantomData,
        }
    }

    /// Runs `f` with interrupts enabled, then masks them again.
    ///
    /// `f` may block, and the caller may come back on a different core.
    /// Taking the guard mutably ends every per-core borrow derived from it, so
    /// such state has to be looked up again afterwards.
    pub fn with_interrupts_enabled<R>(&mut self, f: impl FnOnce() -> R) -> R {
        CPU::enable_interrupts();
        let ret = f();
        CPU::disable_interrupts();
        ret
    }
}

impl<CPU: CpuOps> Default for IrqGuard<CPU> {
    fn default() -> Self {
        Self::new()
    }
}

impl<CPU: CpuOps> Drop for IrqGuard<CPU> {
    fn drop(&mut self) {
        CPU::restore_interrupt_state(self.flags);
    }
}
