use libkernel::{
    arch::armv7::memory::{l2_pool::ProcessMmu, pg_descriptors::EncodedPa, pg_tables::PageAllocator},
    memory::{address::VA, page::PageFrame},
};

use super::{MMU, kernel_ctx};

/// Installs the translation for a faulting user page. Called by the fault
/// handler with interrupts in any state; may sleep in `allocator`.
pub fn put_mmu(
    allocator: &mut dyn PageAllocator,
    proc: &mut ProcessMmu,
    va: VA,
    pa: EncodedPa,
    page: &PageFrame,
) {
    MMU.put(&mut kernel_ctx(allocator), proc, va, pa, page);
}
