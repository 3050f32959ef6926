use log::trace;

use super::{
    l2_pool::ProcessMmu,
    mmu::{Mmu, MmuContext},
    pg_descriptors::{DOMAIN0, L1Descriptor},
    tlb::TranslationCache,
};
use crate::{CpuOps, sync::irq::IrqGuard};

impl<CPU: CpuOps> Mmu<CPU> {
    /// Installs `proc`'s second-level tables in the executing core's L1,
    /// replacing whatever user mappings were there. `None` leaves only the
    /// kernel mapped.
    pub fn switch(&self, cache: &dyn TranslationCache, mut proc: Option<&mut ProcessMmu>) {
        let mut irq = IrqGuard::<CPU>::new();
        let user = self.user_range();
        let cpu = self.cpu(&mut irq);

        if let Some(p) = proc.as_deref_mut() {
            if p.take_dirty() {
                p.clear(cpu, cache, true);
            }
        }

        let (old_lo, old_hi) = cpu.clear_user_span(&user);

        if let Some(p) = proc.as_deref() {
            for pg in p.active() {
                cpu.table().entries[pg.daddr] = L1Descriptor::coarse(pg.pa, DOMAIN0);
                cpu.grow_span(pg.daddr, &user);
            }
        }

        // Cover both what was just cleared and what was just installed.
        let (lo, hi) = cpu.span();
        let lo = lo.max(old_lo);
        let hi = hi.max(old_hi);
        trace!("switch: user span lo={lo} hi={hi}");

        if lo + hi >= user.len() {
            cpu.write_back_entries(cache, user.clone());
        } else {
            cpu.write_back_entries(cache, user.start..user.start + lo);
            cpu.write_back_entries(cache, user.end - hi..user.end);
        }

        cache.invalidate_all();
    }

    /// Throws away the running address space's installed tables and rebuilds
    /// them, for when its mappings changed underneath it.
    pub fn flush(&self, cache: &dyn TranslationCache, proc: &mut ProcessMmu) {
        let _irq = IrqGuard::<CPU>::new();
        proc.mark_dirty();
        self.switch(cache, Some(proc));
    }

    /// Tears down `proc`'s address space and returns its table pages to the
    /// allocator.
    ///
    /// Must be called at most once per address space. The executing core is
    /// left with no user mappings; the caller switches to the next address
    /// space afterwards.
    pub fn release(&self, ctx: &mut MmuContext, proc: &mut ProcessMmu) {
        let mut irq = IrqGuard::<CPU>::new();
        let user = self.user_range();
        let cpu = self.cpu(&mut irq);

        proc.clear(cpu, ctx.cache, false);
        proc.free_cached(ctx.allocator);

        cpu.clear_user_span(&user);
        cpu.write_back_entries(ctx.cache, user);
        ctx.cache.invalidate_all();
    }
}
