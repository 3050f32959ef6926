pub mod boot;
mod cpu_ops;
pub mod memory;

/// ARM1176 (BCM2835) and Cortex-A7 (BCM2836) cores.
pub struct Armv7;
