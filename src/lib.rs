//! BCM283x glue for the ARMv7 MMU code in `libkernel`.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "arch-armv7")]
pub mod arch;
#[cfg(feature = "arch-armv7")]
pub mod config;
