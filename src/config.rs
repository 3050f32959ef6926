use libkernel::arch::armv7::memory::layout::MemoryLayout;

#[cfg(feature = "soc-bcm2835")]
pub const LAYOUT: MemoryLayout = MemoryLayout::bcm2835();

#[cfg(not(feature = "soc-bcm2835"))]
pub const LAYOUT: MemoryLayout = MemoryLayout::bcm2836();

/// Cacheability of the hardware table walk, or'd into TTBR0.
#[cfg(feature = "soc-bcm2835")]
pub const TTBR_WALK_ATTRS: usize = 0;

/// Inner and outer write-back write-allocate, shareable.
#[cfg(not(feature = "soc-bcm2835"))]
pub const TTBR_WALK_ATTRS: usize = (1 << 6) | (1 << 3) | (1 << 1);
