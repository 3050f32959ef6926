pub mod address;
pub mod page;

pub const PAGE_SHIFT: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Granule of a first-level section mapping.
pub const SECTION_SHIFT: usize = 20;
pub const SECTION_SIZE: usize = 1 << SECTION_SHIFT;
pub const SECTION_MASK: usize = SECTION_SIZE - 1;

pub const MIB: usize = 1024 * 1024;
