//! ARMv6/ARMv7 short-descriptor translation tables.

pub mod memory;
