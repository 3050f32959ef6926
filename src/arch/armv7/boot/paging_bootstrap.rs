//! Turning translation on.

use libkernel::memory::address::PA;
use tock_registers::{
    interfaces::{ReadWriteable, Readable},
    register_bitfields,
    registers::InMemoryRegister,
};

use crate::config::TTBR_WALK_ATTRS;

register_bitfields![u32,
    SCTLR [
        /// MMU enable
        M OFFSET(0) NUMBITS(1) [],
        /// Alignment checking
        A OFFSET(1) NUMBITS(1) [],
        /// Data cache
        C OFFSET(2) NUMBITS(1) [],
        /// Branch prediction
        Z OFFSET(11) NUMBITS(1) [],
        /// Instruction cache
        I OFFSET(12) NUMBITS(1) [],
        /// Vectors at 0xffff0000
        V OFFSET(13) NUMBITS(1) [],
        /// ARMv6 extended page tables; reads as one on ARMv7
        XP OFFSET(23) NUMBITS(1) []
    ]
];

/// Domain 0 as client: permissions are checked.
const DACR_DOMAIN0_CLIENT: usize = 0b01;

/// The SCTLR value that enables translation, caches and high vectors on top
/// of `current`.
pub fn sctlr_with_mmu(current: u32) -> u32 {
    let reg = InMemoryRegister::<u32, SCTLR::Register>::new(current);
    reg.modify(
        SCTLR::M::SET
            + SCTLR::C::SET
            + SCTLR::Z::SET
            + SCTLR::I::SET
            + SCTLR::V::SET
            + SCTLR::XP::SET
            + SCTLR::A::CLEAR,
    );
    reg.get()
}

pub fn ttbr0_value(l1: PA) -> usize {
    l1.value() | TTBR_WALK_ATTRS
}

#[cfg(target_arch = "arm")]
unsafe fn load_translation_regs(ttbr0: usize, dacr: usize) {
    use core::arch::asm;

    // SAFETY: caller guarantees the tables are valid.
    unsafe {
        asm!(
            "mcr p15, 0, {z}, c2, c0, 2", // TTBCR: TTBR0 covers everything
            "mcr p15, 0, {ttb}, c2, c0, 0",
            "mcr p15, 0, {dac}, c3, c0, 0",
            "mcr p15, 0, {z}, c8, c7, 0", // TLBIALL
            "mcr p15, 0, {z}, c7, c10, 4", // DSB
            z = in(reg) 0usize,
            ttb = in(reg) ttbr0,
            dac = in(reg) dacr,
            options(nostack, preserves_flags)
        );
    }
}

#[cfg(target_arch = "arm")]
unsafe fn write_sctlr(f: impl FnOnce(u32) -> u32) {
    use core::arch::asm;

    let cur: u32;
    // SAFETY: caller guarantees the new value is consistent with the tables.
    unsafe {
        asm!("mrc p15, 0, {}, c1, c0, 0", out(reg) cur, options(nomem, nostack, preserves_flags));
        asm!(
            "mcr p15, 0, {v}, c1, c0, 0",
            "mcr p15, 0, {z}, c7, c5, 4", // ISB
            v = in(reg) f(cur),
            z = in(reg) 0usize,
            options(nostack, preserves_flags)
        );
    }
}

#[cfg(not(target_arch = "arm"))]
unsafe fn load_translation_regs(_ttbr0: usize, _dacr: usize) {}

#[cfg(not(target_arch = "arm"))]
unsafe fn write_sctlr(_f: impl FnOnce(u32) -> u32) {}

/// Points the walker at `l1` and turns on the MMU and caches.
///
/// # Safety
///
/// `l1` must hold a complete boot table, including an identity mapping of
/// the code executing this call.
pub unsafe fn enable_mmu(l1: PA) {
    // SAFETY: forwarded from the caller.
    unsafe {
        load_translation_regs(ttbr0_value(l1), DACR_DOMAIN0_CLIENT);
        write_sctlr(sctlr_with_mmu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sctlr_enables_translation_and_caches() {
        let v = sctlr_with_mmu(0x0000_0002);
        assert_eq!(v & 1, 1);
        assert_eq!(v & 0b10, 0);
        assert_ne!(v & (1 << 2), 0);
        assert_ne!(v & (1 << 12), 0);
        assert_ne!(v & (1 << 13), 0);
        assert_ne!(v & (1 << 23), 0);

        // Unrelated bits are preserved.
        assert_eq!(sctlr_with_mmu(1 << 22) & (1 << 22), 1 << 22);
    }

    #[test]
    fn ttbr0_carries_table_and_walk_attributes() {
        let v = ttbr0_value(PA::from_value(0x0000_4000));
        assert_eq!(v & !0x3fff, 0x4000);
        assert_eq!(v & 0x3fff, TTBR_WALK_ATTRS);
    }
}
