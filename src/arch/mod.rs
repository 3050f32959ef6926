pub mod armv7;

pub use self::armv7::Armv7 as ArchImpl;
