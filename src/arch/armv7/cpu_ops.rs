use libkernel::CpuOps;

use super::Armv7;

/// CPSR IRQ mask bit.
const CPSR_I: usize = 1 << 7;

#[cfg(target_arch = "arm")]
mod hw {
    use core::arch::asm;

    #[inline(always)]
    pub fn cpsr() -> usize {
        let v: usize;
        // SAFETY: reads the status register only.
        unsafe { asm!("mrs {}, cpsr", out(reg) v, options(nomem, nostack, preserves_flags)) };
        v
    }

    #[inline(always)]
    pub fn cpsid() {
        // SAFETY: masking IRQs cannot break memory safety.
        unsafe { asm!("cpsid i", options(nostack, preserves_flags)) };
    }

    #[inline(always)]
    pub fn cpsie() {
        // SAFETY: as above.
        unsafe { asm!("cpsie i", options(nostack, preserves_flags)) };
    }

    #[cfg(not(feature = "soc-bcm2835"))]
    #[inline(always)]
    pub fn mpidr() -> usize {
        let v: usize;
        // SAFETY: MPIDR is read-only.
        unsafe { asm!("mrc p15, 0, {}, c0, c0, 5", out(reg) v, options(nomem, nostack, preserves_flags)) };
        v
    }

    // ARM1176 has no MPIDR and only one core.
    #[cfg(feature = "soc-bcm2835")]
    #[inline(always)]
    pub fn mpidr() -> usize {
        0
    }

    #[inline(always)]
    pub fn wfi() {
        // SAFETY: waits for an interrupt.
        unsafe { asm!("wfi", options(nomem, nostack, preserves_flags)) };
    }
}

#[cfg(not(target_arch = "arm"))]
mod hw {
    pub fn cpsr() -> usize {
        super::CPSR_I
    }

    pub fn cpsid() {}

    pub fn cpsie() {}

    pub fn mpidr() -> usize {
        0
    }

    pub fn wfi() {
        core::hint::spin_loop();
    }
}

impl CpuOps for Armv7 {
    #[inline(always)]
    fn id() -> usize {
        hw::mpidr() & 0x3
    }

    fn halt() -> ! {
        loop {
            hw::wfi();
        }
    }

    #[inline(always)]
    fn disable_interrupts() -> usize {
        let flags = hw::cpsr();
        hw::cpsid();
        flags
    }

    #[inline(always)]
    fn restore_interrupt_state(flags: usize) {
        if flags & CPSR_I == 0 {
            hw::cpsie();
        }
    }

    #[inline(always)]
    fn enable_interrupts() {
        hw::cpsie();
    }
}
