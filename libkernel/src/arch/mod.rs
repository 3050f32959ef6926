#[cfg(feature = "arch-armv7")]
pub mod armv7;
