use libkernel::{
    arch::armv7::memory::kmap::Expect,
    error::Result,
    memory::address::{PA, VA},
};

use super::{MMU, PageOffsetMapper, tlb::Cp15Cache};

/// Maps `size` bytes at `pa` into kernel space at the 1MB-aligned `va`.
pub fn mmu_kmap(va: VA, pa: PA, size: usize) -> Result<VA> {
    MMU.kmap_sections(&Cp15Cache, va, pa, size)
}

pub fn cankaddr(pa: PA) -> usize {
    MMU.cankaddr(pa)
}

pub fn mmu_uncache(va: VA, size: usize) -> Result<VA> {
    MMU.uncache_section(&Cp15Cache, va, size)
}

pub fn check_mmu(va: VA, expect: Expect) -> bool {
    MMU.check(&PageOffsetMapper, va, expect)
}

pub fn translate(va: VA) -> Option<PA> {
    MMU.translate(&PageOffsetMapper, va)
}
