use core::{cell::UnsafeCell, marker::PhantomData};

use super::irq::IrqGuard;
use crate::CpuOps;

pub const MAX_CPUS: usize = 4;

/// One `T` per core.
///
/// The only way in is [`PerCpu::get`], which hands out the executing core's
/// slot for as long as the caller's [`IrqGuard`] is mutably borrowed. With
/// interrupts masked nothing else on this core can run, and no other core
/// ever touches this slot.
pub struct PerCpu<T, CPU: CpuOps> {
    slots: UnsafeCell<[T; MAX_CPUS]>,
    _cpu: PhantomData<CPU>,
}

unsafe impl<T: Send, CPU: CpuOps> Sync for PerCpu<T, CPU> {}

impl<T, CPU: CpuOps> PerCpu<T, CPU> {
    pub const fn new(slots: [T; MAX_CPUS]) -> Self {
        Self {
            slots: UnsafeCell::new(slots),
            _cpu: PhantomData,
        }
    }

    pub fn get<'g>(&'g self, _irq: &'g mut IrqGuard<CPU>) -> &'g mut T {
        let id = CPU::id();
        assert!(id < MAX_CPUS, "cpu{id} exceeds MAX_CPUS");

        // SAFETY: the slot belongs to the executing core, interrupts are
        // masked and the guard is exclusively borrowed for 'g.
        unsafe { &mut *(self.slots.get() as *mut T).add(id) }
    }
}
