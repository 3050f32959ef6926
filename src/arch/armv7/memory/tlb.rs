//! CP15 cache and TLB maintenance.
//!
//! Barriers use the CP15 encodings so the same code runs on ARMv6.

use libkernel::{arch::armv7::memory::tlb::TranslationCache, memory::address::VA};

/// Smallest D/I cache line of the supported cores.
const CACHE_LINE: usize = 32;

#[cfg(target_arch = "arm")]
macro_rules! mcr {
    ($crn:literal, $crm:literal, $op2:literal, $val:expr) => {
        // SAFETY: maintenance operations do not change memory contents.
        unsafe {
            core::arch::asm!(
                concat!("mcr p15, 0, {0}, ", $crn, ", ", $crm, ", ", $op2),
                in(reg) $val,
                options(nostack, preserves_flags)
            )
        }
    };
}

#[cfg(not(target_arch = "arm"))]
macro_rules! mcr {
    ($crn:literal, $crm:literal, $op2:literal, $val:expr) => {{
        let _: usize = $val;
    }};
}

fn dsb() {
    mcr!("c7", "c10", "4", 0);
}

fn isb() {
    mcr!("c7", "c5", "4", 0);
}

fn for_each_line(va: VA, len: usize, mut op: impl FnMut(usize)) {
    let start = va.value() & !(CACHE_LINE - 1);
    let end = va.value() + len;

    for line in (start..end).step_by(CACHE_LINE) {
        op(line);
    }
}

/// The executing core's caches and TLB.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cp15Cache;

impl TranslationCache for Cp15Cache {
    fn write_back_tables(&self, va: VA, len: usize) {
        // DCCMVAC
        for_each_line(va, len, |l| mcr!("c7", "c10", "1", l));
        dsb();
    }

    fn invalidate_page(&self, va: VA) {
        // TLBIMVA
        mcr!("c8", "c7", "1", va.page_aligned().value());
        dsb();
        isb();
    }

    fn invalidate_all(&self) {
        // TLBIALL, then BPIALL
        mcr!("c8", "c7", "0", 0);
        mcr!("c7", "c5", "6", 0);
        dsb();
        isb();
    }

    fn clean_dcache(&self, va: VA, len: usize) {
        for_each_line(va, len, |l| mcr!("c7", "c10", "1", l));
        dsb();
    }

    fn clean_invalidate_dcache(&self, va: VA, len: usize) {
        // DCCIMVAC
        for_each_line(va, len, |l| mcr!("c7", "c14", "1", l));
        dsb();
    }

    fn invalidate_icache(&self, va: VA, len: usize) {
        // ICIMVAU
        for_each_line(va, len, |l| mcr!("c7", "c5", "1", l));
        mcr!("c7", "c5", "6", 0);
        dsb();
        isb();
    }
}
