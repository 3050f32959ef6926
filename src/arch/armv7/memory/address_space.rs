//! Entry points for the scheduler.

use libkernel::arch::armv7::memory::{l2_pool::ProcessMmu, pg_tables::PageAllocator};

use super::{MMU, kernel_ctx, tlb::Cp15Cache};

/// Makes `proc` the user address space of the executing core, or leaves only
/// the kernel mapped for `None`.
pub fn mmu_switch(proc: Option<&mut ProcessMmu>) {
    MMU.switch(&Cp15Cache, proc);
}

/// Rebuilds the running address space after its mappings changed.
pub fn flush_mmu(proc: &mut ProcessMmu) {
    MMU.flush(&Cp15Cache, proc);
}

/// Frees every table of an exiting address space. Call once, then switch.
pub fn mmu_release(allocator: &mut dyn PageAllocator, proc: &mut ProcessMmu) {
    MMU.release(&mut kernel_ctx(allocator), proc);
}
