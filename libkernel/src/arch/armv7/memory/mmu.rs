use core::ops::Range;

use log::debug;

use super::{
    layout::MemoryLayout,
    pg_descriptors::L1Descriptor,
    pg_tables::{L1_ENTRY_SIZE, L1Table, PageAllocator, PageTableMapper},
    tlb::TranslationCache,
};
use crate::{
    CpuOps,
    error::{KernelError, Result},
    memory::address::VA,
    sync::{
        irq::IrqGuard,
        per_cpu::{MAX_CPUS, PerCpu},
    },
};

/// External services the table code leans on.
pub struct MmuContext<'a> {
    pub allocator: &'a mut dyn PageAllocator,
    pub mapper: &'a dyn PageTableMapper,
    pub cache: &'a dyn TranslationCache,
}

/// State one core keeps about its own first-level table.
///
/// `lo` and `hi` count slots inward from the two ends of the user range.
/// Every user slot that may be non-Fault lies within `lo` slots of the bottom
/// or `hi` slots of the top.
#[derive(Debug)]
pub struct CpuMmu {
    l1: Option<VA>,
    lo: usize,
    hi: usize,
}

impl CpuMmu {
    pub const EMPTY: Self = Self {
        l1: None,
        lo: 0,
        hi: 0,
    };

    pub fn table(&mut self) -> &mut L1Table {
        let Some(l1) = self.l1 else {
            panic!("L1 table used before init_cpu");
        };

        // SAFETY: registered through `init_cpu`, exclusively owned by this
        // core and only reached with interrupts masked.
        unsafe { &mut *l1.cast::<L1Table>().as_ptr_mut() }
    }

    pub fn span(&self) -> (usize, usize) {
        (self.lo, self.hi)
    }

    /// Widens the tracked span to cover slot `x`, from whichever end is
    /// closer. Slots already inside the span, or outside the user range,
    /// leave it alone.
    pub(super) fn grow_span(&mut self, x: usize, user: &Range<usize>) {
        if x >= user.start + self.lo && x < user.end - self.hi {
            if x + 1 - user.start < user.end - x {
                self.lo = x + 1 - user.start;
            } else {
                self.hi = user.end - x;
            }
        }
    }

    /// Faults every user slot inside the tracked span and resets it,
    /// returning the span that was cleared.
    pub(super) fn clear_user_span(&mut self, user: &Range<usize>) -> (usize, usize) {
        let (lo, hi) = (self.lo, self.hi);
        let l1 = self.table();

        if lo == 1 {
            l1.entries[user.start] = L1Descriptor::FAULT;
        } else if lo > 1 {
            l1.clear(user.start..user.start + lo);
        }

        if hi == 1 {
            l1.entries[user.end - 1] = L1Descriptor::FAULT;
        } else if hi > 1 {
            l1.clear(user.end - hi..user.end);
        }

        self.lo = 0;
        self.hi = 0;
        (lo, hi)
    }

    pub(super) fn write_back_entries(
        &mut self,
        cache: &dyn TranslationCache,
        range: Range<usize>,
    ) {
        if range.is_empty() {
            return;
        }

        let va = self.table().entry_va(range.start);
        cache.write_back_tables(va, range.len() * L1_ENTRY_SIZE);
    }
}

/// The per-core first-level tables of a system sharing one [`MemoryLayout`].
pub struct Mmu<CPU: CpuOps> {
    cpus: PerCpu<CpuMmu, CPU>,
    layout: MemoryLayout,
}

impl<CPU: CpuOps> Mmu<CPU> {
    pub const fn new(layout: MemoryLayout) -> Self {
        Self {
            cpus: PerCpu::new([CpuMmu::EMPTY; MAX_CPUS]),
            layout,
        }
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// Registers `l1` as the executing core's first-level table.
    pub fn init_cpu(&self, l1: VA) -> Result<()> {
        if CPU::id() >= MAX_CPUS {
            return Err(KernelError::InvalidValue);
        }

        let mut irq = IrqGuard::<CPU>::new();
        let cpu = self.cpus.get(&mut irq);

        if cpu.l1.is_some() {
            return Err(KernelError::InUse);
        }

        cpu.l1 = Some(l1);
        debug!("cpu{}: L1 table at {l1}", CPU::id());

        Ok(())
    }

    /// The executing core's state. The borrow of `irq` keeps it from
    /// outliving the critical section.
    pub(super) fn cpu<'g>(&'g self, irq: &'g mut IrqGuard<CPU>) -> &'g mut CpuMmu {
        self.cpus.get(irq)
    }

    pub(super) fn user_range(&self) -> Range<usize> {
        self.layout.user_l1_range()
    }

    /// The executing core's tracked user span, as `(lo, hi)`.
    pub fn user_span(&self) -> (usize, usize) {
        let mut irq = IrqGuard::<CPU>::new();
        self.cpu(&mut irq).span()
    }
}
