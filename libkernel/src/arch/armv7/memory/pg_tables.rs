use core::ops::Range;

use super::pg_descriptors::{L1Descriptor, L2Descriptor};
use crate::{
    error::Result,
    memory::{
        PAGE_SHIFT, SECTION_SHIFT,
        address::{PA, VA},
    },
};

pub const L1_ENTRIES: usize = 4096;
pub const L2_ENTRIES: usize = 256;

/// Bytes occupied by one second-level table. The rest of its 4KB page is
/// unused.
pub const L2_TABLE_SIZE: usize = L2_ENTRIES * size_of::<L2Descriptor>();

pub const L1_ENTRY_SIZE: usize = size_of::<L1Descriptor>();

pub fn l1_index(va: VA) -> usize {
    (va.value() >> SECTION_SHIFT) & (L1_ENTRIES - 1)
}

pub fn l2_index(va: VA) -> usize {
    (va.value() >> PAGE_SHIFT) & (L2_ENTRIES - 1)
}

#[derive(Clone)]
#[repr(C, align(16384))]
pub struct L1Table {
    pub entries: [L1Descriptor; L1_ENTRIES],
}

impl L1Table {
    pub const fn new() -> Self {
        Self {
            entries: [L1Descriptor::FAULT; L1_ENTRIES],
        }
    }

    /// Kernel virtual address of entry `idx`, as needed for cache
    /// maintenance on it.
    pub fn entry_va(&self, idx: usize) -> VA {
        VA::from_ptr(&self.entries[idx])
    }

    pub fn clear(&mut self, range: Range<usize>) {
        self.entries[range].fill(L1Descriptor::FAULT);
    }
}

impl Default for L1Table {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
#[repr(C, align(1024))]
pub struct L2Table {
    pub entries: [L2Descriptor; L2_ENTRIES],
}

impl L2Table {
    pub const fn new() -> Self {
        Self {
            entries: [L2Descriptor::FAULT; L2_ENTRIES],
        }
    }

    pub fn entry_va(&self, idx: usize) -> VA {
        VA::from_ptr(&self.entries[idx])
    }

    pub fn zero(&mut self) {
        self.entries.fill(L2Descriptor::FAULT);
    }
}

impl Default for L2Table {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of physical pages for second-level tables.
pub trait PageAllocator {
    /// Allocates one zero-filled page. May block, so it must only be called
    /// with interrupts enabled.
    fn alloc_zeroed_page(&mut self) -> Result<PA>;

    fn free_pages(&mut self, pages: &mut dyn Iterator<Item = PA>);
}

/// Kernel access to physical memory.
pub trait PageTableMapper {
    /// Address of `pa` in the kernel's direct RAM alias.
    fn phys_to_virt(&self, pa: PA) -> VA;

    /// A kernel alias for the page at `pa`, usable for CPU-side edits.
    fn kmap(&self, pa: PA) -> VA {
        self.phys_to_virt(pa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_split_virtual_address() {
        let va = VA::from_value(0xffff_0fff);
        assert_eq!(l1_index(va), 0xfff);
        assert_eq!(l2_index(va), 0xf0);

        let va = VA::from_value(0x8034_5678);
        assert_eq!(l1_index(va), 0x803);
        assert_eq!(l2_index(va), 0x45);
    }

    #[test]
    fn table_sizes_match_hardware() {
        assert_eq!(size_of::<L1Table>(), 16 * 1024);
        assert_eq!(align_of::<L1Table>(), 16 * 1024);
        assert_eq!(L2_TABLE_SIZE, 1024);
        assert_eq!(size_of::<L2Table>(), 1024);
    }
}
