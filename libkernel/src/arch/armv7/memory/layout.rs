use core::ops::Range;

use super::pg_descriptors::MemAttrs;
use crate::memory::{
    MIB, SECTION_SHIFT,
    address::{PA, VA},
};

const DRAM_ATTRS: MemAttrs = MemAttrs::CACHEABLE.union(MemAttrs::BUFFERABLE);

/// Fixed address-space layout of a particular SoC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Virtual base of the kernel's direct map of RAM.
    pub kzero: usize,
    pub phys_dram: usize,
    pub dram_size: usize,

    /// Peripheral window: `io_size` bytes at `phys_io`, mapped at `virt_io`.
    pub phys_io: usize,
    pub virt_io: usize,
    pub io_size: usize,

    /// ARM-local peripherals (one section), mapped right after the
    /// peripheral window.
    pub arm_local: Option<usize>,

    /// High exception-vector page.
    pub hvectors: usize,

    pub uzero: usize,
    pub ustktop: usize,

    /// Attributes of cached RAM in section and small-page entries.
    pub l1_dram_attrs: MemAttrs,
    pub l2_dram_attrs: MemAttrs,
}

impl MemoryLayout {
    /// BCM2835 (Raspberry Pi 1, Zero): single ARM1176 core.
    pub const fn bcm2835() -> Self {
        Self {
            kzero: 0x8000_0000,
            phys_dram: 0,
            dram_size: 512 * MIB,
            phys_io: 0x2000_0000,
            virt_io: 0x7e00_0000,
            io_size: 16 * MIB,
            arm_local: None,
            hvectors: 0xffff_0000,
            uzero: 0,
            ustktop: 0x4000_0000,
            l1_dram_attrs: DRAM_ATTRS,
            l2_dram_attrs: DRAM_ATTRS,
        }
    }

    /// BCM2836/BCM2837 (Raspberry Pi 2, 3): SMP Cortex cores, so RAM is
    /// shareable and write-allocate.
    pub const fn bcm2836() -> Self {
        const SMP_DRAM: MemAttrs = DRAM_ATTRS
            .union(MemAttrs::WRITE_ALLOC)
            .union(MemAttrs::SHAREABLE);

        Self {
            kzero: 0x8000_0000,
            phys_dram: 0,
            dram_size: 1024 * MIB,
            phys_io: 0x3f00_0000,
            virt_io: 0x7e00_0000,
            io_size: 16 * MIB,
            arm_local: Some(0x4000_0000),
            hvectors: 0xffff_0000,
            uzero: 0,
            ustktop: 0x4000_0000,
            l1_dram_attrs: SMP_DRAM,
            l2_dram_attrs: SMP_DRAM,
        }
    }

    /// The same layout with the RAM size reported by firmware.
    pub const fn with_dram_size(mut self, dram_size: usize) -> Self {
        self.dram_size = dram_size;
        self
    }

    /// First-level slots that may hold user mappings.
    pub const fn user_l1_range(&self) -> Range<usize> {
        (self.uzero >> SECTION_SHIFT)..((self.ustktop + MIB - 1) >> SECTION_SHIFT)
    }

    pub const fn dram_end(&self) -> usize {
        self.phys_dram + self.dram_size
    }

    /// Bytes reachable through the kernel's direct map starting at `pa`, or
    /// zero if `pa` is not in RAM.
    pub const fn kaddr_reach(&self, pa: PA) -> usize {
        let pa = pa.value();
        if pa >= self.phys_dram && pa < self.dram_end() {
            self.dram_end() - pa
        } else {
            0
        }
    }

    pub const fn kaddr(&self, pa: PA) -> VA {
        VA::from_value(pa.value() - self.phys_dram + self.kzero)
    }

    pub const fn paddr(&self, va: VA) -> PA {
        PA::from_value(va.value() - self.kzero + self.phys_dram)
    }
}
