//! Second-level tables owned by one user address space.
//!
//! Every table page lives in an arena slot and sits on exactly one of two
//! lists: `active` (installed in some core's L1 at `daddr`) or `cache`
//! (cleared and waiting for reuse). Pages only go back to the page allocator
//! when the whole address space is released.

use alloc::vec::Vec;
use core::iter;

use super::{
    mmu::CpuMmu,
    pg_descriptors::L1Descriptor,
    pg_tables::{L2Table, PageAllocator},
    tlb::TranslationCache,
};
use crate::memory::address::{PA, VA};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2Handle(usize);

#[derive(Debug)]
pub struct L2Page {
    pub pa: PA,
    /// Kernel alias used for CPU-side edits.
    pub va: VA,
    /// L1 slot this table backs while it is active.
    pub daddr: usize,
    next: Option<L2Handle>,
}

impl L2Page {
    pub(super) fn table(&mut self) -> &mut L2Table {
        // SAFETY: `va` is the kernel alias of a page owned by this arena, and
        // the arena hands out at most one `&mut L2Page` at a time.
        unsafe { &mut *self.va.cast::<L2Table>().as_ptr_mut() }
    }
}

#[derive(Debug, Default)]
pub struct ProcessMmu {
    pages: Vec<L2Page>,
    active: Option<L2Handle>,
    cache: Option<L2Handle>,
    newtlb: bool,
}

impl ProcessMmu {
    pub const fn new() -> Self {
        Self {
            pages: Vec::new(),
            active: None,
            cache: None,
            newtlb: false,
        }
    }

    /// Forces the next switch into this address space to rebuild from
    /// scratch.
    pub fn mark_dirty(&mut self) {
        self.newtlb = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.newtlb
    }

    pub(super) fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.newtlb)
    }

    pub fn active(&self) -> impl Iterator<Item = &L2Page> {
        self.walk(self.active)
    }

    pub fn cached(&self) -> impl Iterator<Item = &L2Page> {
        self.walk(self.cache)
    }

    fn walk(&self, head: Option<L2Handle>) -> impl Iterator<Item = &L2Page> {
        iter::successors(head.map(|h| &self.pages[h.0]), |pg| {
            pg.next.map(|h| &self.pages[h.0])
        })
    }

    pub(super) fn page(&self, h: L2Handle) -> &L2Page {
        &self.pages[h.0]
    }

    /// Adopts a freshly allocated table page.
    pub(super) fn insert(&mut self, pa: PA, va: VA) -> L2Handle {
        self.pages.push(L2Page {
            pa,
            va,
            daddr: 0,
            next: None,
        });
        L2Handle(self.pages.len() - 1)
    }

    pub(super) fn pop_cached(&mut self) -> Option<L2Handle> {
        let h = self.cache?;
        self.cache = self.pages[h.0].next.take();
        Some(h)
    }

    /// Puts `h` at the head of the active list, backing L1 slot `daddr`.
    pub(super) fn activate(&mut self, h: L2Handle, daddr: usize) {
        let pg = &mut self.pages[h.0];
        pg.daddr = daddr;
        pg.next = self.active;
        self.active = Some(h);
    }

    /// Removes every active table from `cpu`'s L1, optionally zeroing it, and
    /// moves the whole active list onto the reuse cache.
    pub(super) fn clear(&mut self, cpu: &mut CpuMmu, cache: &dyn TranslationCache, zero: bool) {
        let Some(head) = self.active.take() else {
            return;
        };

        let l1 = cpu.table();
        let mut edited: Option<(usize, usize)> = None;
        let mut tail = head;

        loop {
            let pg = &mut self.pages[tail.0];
            if zero {
                pg.table().zero();
            }
            l1.entries[pg.daddr] = L1Descriptor::FAULT;

            edited = Some(match edited {
                None => (pg.daddr, pg.daddr),
                Some((lo, hi)) => (lo.min(pg.daddr), hi.max(pg.daddr)),
            });

            match pg.next {
                Some(next) => tail = next,
                None => break,
            }
        }

        if let Some((lo, hi)) = edited {
            cpu.write_back_entries(cache, lo..hi + 1);
        }

        self.pages[tail.0].next = self.cache;
        self.cache = Some(head);
    }

    /// Hands every cached table page back to `allocator` and empties the
    /// arena. Nothing may be active.
    pub(super) fn free_cached(&mut self, allocator: &mut dyn PageAllocator) {
        debug_assert!(self.active.is_none());

        {
            let mut pages = self.cached().map(|pg| pg.pa);
            allocator.free_pages(&mut pages);
        }

        self.cache = None;
        self.pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::{
        arch::armv7::memory::{
            pg_descriptors::{AccessPermission, L2Descriptor, MemAttrs},
            pg_tables::PageTableMapper,
        },
        sync::irq::IrqGuard,
        test_support::{CacheOp, Fixture, MockCpu},
    };

    fn adopt(fx: &Fixture, proc: &mut ProcessMmu, daddr: usize) -> L2Handle {
        let h = fx.with_ctx(|ctx| {
            let pa = ctx.allocator.alloc_zeroed_page().unwrap();
            proc.insert(pa, ctx.mapper.phys_to_virt(pa))
        });
        proc.activate(h, daddr);
        h
    }

    fn clear(fx: &Fixture, proc: &mut ProcessMmu, zero: bool) {
        let mut irq = IrqGuard::<MockCpu>::new();
        proc.clear(fx.mmu.cpu(&mut irq), &fx.cache, zero);
    }

    #[test]
    fn clear_zeroes_tables_and_parks_them_for_reuse() {
        let fx = Fixture::new(1);
        let mut proc = ProcessMmu::new();

        for daddr in [2, 9] {
            let h = adopt(&fx, &mut proc, daddr);
            proc.pages[h.0].table().entries[7] = L2Descriptor::small(
                PA::from_value(0x0010_0000),
                AccessPermission::UserRw,
                MemAttrs::empty(),
                false,
            );
        }
        assert!(proc.active().all(|pg| !fx.mem.is_zero(pg.va)));

        clear(&fx, &mut proc, true);

        assert_eq!(proc.active().count(), 0);
        let parked: Vec<usize> = proc.cached().map(|pg| pg.daddr).collect();
        assert_eq!(parked, [9, 2]);
        assert!(proc.cached().all(|pg| fx.mem.is_zero(pg.va)));
        assert_eq!(
            fx.cache.take(),
            [CacheOp::WriteBack {
                va: fx.l1(0).entry_va(2),
                len: 8 * 4,
            }]
        );
    }

    #[test]
    fn free_cached_returns_every_page_once() {
        let fx = Fixture::new(1);
        let mut proc = ProcessMmu::new();
        adopt(&fx, &mut proc, 2);
        adopt(&fx, &mut proc, 9);
        clear(&fx, &mut proc, false);

        let h = proc.pop_cached().unwrap();
        assert_eq!(proc.page(h).daddr, 9);
        proc.activate(h, 4);
        clear(&fx, &mut proc, false);

        fx.with_ctx(|ctx| proc.free_cached(ctx.allocator));

        assert_eq!(fx.freed().len(), 2);
        assert_eq!(proc.cached().count(), 0);
        assert_eq!(proc.active().count(), 0);
    }
}
