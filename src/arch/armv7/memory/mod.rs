use libkernel::{
    arch::armv7::memory::{
        mmu::{Mmu, MmuContext},
        pg_tables::{PageAllocator, PageTableMapper},
    },
    memory::address::{PA, VA},
};

use super::Armv7;
use crate::config::LAYOUT;
use tlb::Cp15Cache;

pub mod address_space;
pub mod fault;
pub mod kmap;
pub mod tlb;

/// Every core's first-level table bookkeeping.
pub static MMU: Mmu<Armv7> = Mmu::new(LAYOUT);

/// Reaches physical memory through the `KZERO` direct map.
#[derive(Clone, Copy, Debug, Default)]
pub struct PageOffsetMapper;

impl PageTableMapper for PageOffsetMapper {
    fn phys_to_virt(&self, pa: PA) -> VA {
        LAYOUT.kaddr(pa)
    }
}

/// The context the table code runs with on real hardware, drawing table
/// pages from `allocator`.
pub fn kernel_ctx(allocator: &mut dyn PageAllocator) -> MmuContext<'_> {
    MmuContext {
        allocator,
        mapper: &PageOffsetMapper,
        cache: &Cp15Cache,
    }
}
