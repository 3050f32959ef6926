use log::trace;

use super::{
    l2_pool::ProcessMmu,
    mmu::{Mmu, MmuContext},
    pg_descriptors::{
        AccessPermission, DOMAIN0, Descriptor, EncodedPa, L1Descriptor, L2Descriptor, MemAttrs,
        PteFlags,
    },
    pg_tables::{L2_TABLE_SIZE, L2Table, l1_index, l2_index},
};
use crate::{
    CpuOps,
    memory::{PAGE_SIZE, address::VA, page::PageFrame},
    sync::irq::IrqGuard,
};

impl<CPU: CpuOps> Mmu<CPU> {
    /// Maps the user page at `va` to `pa` in the executing core's tables,
    /// giving it a second-level table first if its 1MB slot has none.
    ///
    /// `page` is the frame behind `pa`; a pending instruction-cache flush on
    /// it is carried out here. Running out of memory for a table is fatal.
    pub fn put(
        &self,
        ctx: &mut MmuContext,
        proc: &mut ProcessMmu,
        va: VA,
        pa: EncodedPa,
        page: &PageFrame,
    ) {
        let mut irq = IrqGuard::<CPU>::new();
        let x = l1_index(va);

        let needs_table = match self.cpu(&mut irq).table().entries[x].decode() {
            Descriptor::Fault => true,
            Descriptor::Coarse { .. } => false,
            other => panic!("put: {va} lies in a {other:?} slot"),
        };

        if needs_table {
            let h = match proc.pop_cached() {
                Some(h) => h,
                None => {
                    let new = irq.with_interrupts_enabled(|| ctx.allocator.alloc_zeroed_page());
                    let table_pa = match new {
                        Ok(pa) => pa,
                        Err(e) => panic!("put: no L2 table for {va}: {e}"),
                    };
                    trace!("cpu{}: new L2 table {table_pa} for slot {x:#x}", CPU::id());
                    proc.insert(table_pa, ctx.mapper.kmap(table_pa))
                }
            };
            proc.activate(h, x);

            let pg = proc.page(h);
            ctx.cache.write_back_tables(pg.va, L2_TABLE_SIZE);

            // May be a different core than before the allocation.
            let user = self.user_range();
            let cpu = self.cpu(&mut irq);
            let l1 = cpu.table();
            l1.entries[x] = L1Descriptor::coarse(pg.pa, DOMAIN0);
            ctx.cache.write_back_tables(l1.entry_va(x), size_of::<L1Descriptor>());
            cpu.grow_span(x, &user);
        }

        let Some(table_pa) = self.cpu(&mut irq).table().entries[x].next_table_address() else {
            unreachable!("slot {x:#x} has no L2 table after install");
        };

        // SAFETY: the table page belongs to `proc` and is reached through the
        // kernel's direct map.
        let l2 = unsafe {
            &mut *ctx
                .mapper
                .phys_to_virt(table_pa)
                .cast::<L2Table>()
                .as_ptr_mut()
        };

        let flags = pa.flags();
        let attrs = if flags.contains(PteFlags::UNCACHED) {
            MemAttrs::empty()
        } else {
            self.layout().l2_dram_attrs
        };
        let ap = if flags.contains(PteFlags::KERNEL) {
            AccessPermission::KernelRw
        } else if flags.contains(PteFlags::WRITE) {
            AccessPermission::UserRw
        } else {
            AccessPermission::UserRo
        };
        let exec = !flags.contains(PteFlags::NOEXEC);

        let y = l2_index(va);
        l2.entries[y] = L2Descriptor::small(pa.frame(), ap, attrs, exec);
        ctx.cache.write_back_tables(l2.entry_va(y), size_of::<L2Descriptor>());
        ctx.cache.invalidate_page(va.page_aligned());

        let cpu = CPU::id();
        if page.needs_text_flush(cpu) {
            ctx.cache.clean_dcache(ctx.mapper.kmap(page.pa()), PAGE_SIZE);
            ctx.cache.invalidate_icache(page.va().page_aligned(), PAGE_SIZE);
            page.done_text_flush(cpu);
        }
    }
}
