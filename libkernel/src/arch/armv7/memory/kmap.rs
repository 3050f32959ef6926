use log::{debug, warn};

use super::{
    mmu::Mmu,
    pg_descriptors::{AccessPermission, DOMAIN0, Descriptor, L1Descriptor, MemAttrs},
    pg_tables::{L1_ENTRIES, L1_ENTRY_SIZE, L2Table, PageTableMapper, l1_index, l2_index},
    tlb::TranslationCache,
};
use crate::{
    CpuOps,
    error::{MapError, Result},
    memory::{
        SECTION_SIZE,
        address::{PA, VA},
    },
    sync::irq::IrqGuard,
};

/// What [`Mmu::check`] expects to find at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Any,
    Unmapped,
    Frame(PA),
}

impl<CPU: CpuOps> Mmu<CPU> {
    /// How many bytes from `pa` on are reachable through the kernel's direct
    /// map; zero if `pa` is outside it.
    pub fn cankaddr(&self, pa: PA) -> usize {
        self.layout().kaddr_reach(pa)
    }

    /// Maps `size` bytes of physical memory at `pa` with kernel-only,
    /// non-executable sections starting at the section-aligned `va`.
    ///
    /// Fails with [`MapError::AlreadyMapped`] without touching anything if any
    /// slot in the range is in use. Returns the address `pa` ended up at.
    pub fn kmap_sections(
        &self,
        cache: &dyn TranslationCache,
        va: VA,
        pa: PA,
        size: usize,
    ) -> Result<VA> {
        assert!(va.is_section_aligned(), "kmap_sections: {va} not 1MB aligned");

        let offset = pa.section_offset();
        let base = pa.section_aligned();
        let slots = (size + offset).div_ceil(SECTION_SIZE);
        let first = l1_index(va);
        assert!(
            first + slots <= L1_ENTRIES,
            "kmap_sections: {va} +{size:#x} runs past the end of the address space"
        );

        let mut irq = IrqGuard::<CPU>::new();
        let l1 = self.cpu(&mut irq).table();

        if l1.entries[first..first + slots].iter().any(|e| !e.is_fault()) {
            debug!("kmap_sections: {va} (+{slots} sections) already mapped");
            return Err(MapError::AlreadyMapped.into());
        }

        for n in 0..slots {
            l1.entries[first + n] = L1Descriptor::section(
                base.add_bytes(n * SECTION_SIZE),
                DOMAIN0,
                AccessPermission::KernelRw,
                MemAttrs::empty(),
                false,
            );
            cache.invalidate_page(va.add_bytes(n * SECTION_SIZE));
        }
        cache.write_back_tables(l1.entry_va(first), slots * L1_ENTRY_SIZE);

        debug!("kmap_sections: {base} -> {va}, {slots} sections");
        Ok(va.add_bytes(offset))
    }

    /// Turns off caching for the RAM section mapped at `va`.
    pub fn uncache_section(
        &self,
        cache: &dyn TranslationCache,
        va: VA,
        size: usize,
    ) -> Result<VA> {
        assert!(
            va.is_section_aligned() && size == SECTION_SIZE,
            "uncache_section: bad range {va} +{size:#x}"
        );

        let x = l1_index(va);
        let mut irq = IrqGuard::<CPU>::new();
        let l1 = self.cpu(&mut irq).table();

        let entry = l1.entries[x];
        if !matches!(entry.decode(), Descriptor::Section { .. }) {
            return Err(MapError::NotSectionMapped.into());
        }

        l1.entries[x] = entry.without_attrs(self.layout().l1_dram_attrs);
        cache.invalidate_page(va);
        cache.clean_invalidate_dcache(l1.entry_va(x), L1_ENTRY_SIZE);

        Ok(va)
    }

    /// The leaf entry translating `va` on the executing core: a section, a
    /// small page or a fault.
    pub fn walk(&self, mapper: &dyn PageTableMapper, va: VA) -> Descriptor {
        let mut irq = IrqGuard::<CPU>::new();
        let l1e = self.cpu(&mut irq).table().entries[l1_index(va)];

        match l1e.decode() {
            Descriptor::Coarse { table, .. } => {
                // SAFETY: coarse entries only ever point at live L2 tables.
                let l2 = unsafe { &*mapper.phys_to_virt(table).cast::<L2Table>().as_ptr() };
                l2.entries[l2_index(va)].decode()
            }
            leaf => leaf,
        }
    }

    pub fn translate(&self, mapper: &dyn PageTableMapper, va: VA) -> Option<PA> {
        self.walk(mapper, va).output_address(va)
    }

    /// Compares the translation of `va` against `expect`, logging any
    /// disagreement. Never changes anything.
    pub fn check(&self, mapper: &dyn PageTableMapper, va: VA, expect: Expect) -> bool {
        let leaf = self.walk(mapper, va);
        let found = leaf.output_address(va).map(PA::page_aligned);

        let ok = match expect {
            Expect::Any => found.is_some(),
            Expect::Unmapped => found.is_none(),
            Expect::Frame(pa) => found == Some(pa.page_aligned()),
        };

        if !ok {
            warn!(
                "checkmmu cpu{}: va={va} expected {expect:?}, found {leaf:?}",
                CPU::id()
            );
        }

        ok
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::{
        arch::armv7::memory::{
            l2_pool::ProcessMmu,
            pg_descriptors::{EncodedPa, PteFlags},
        },
        error::KernelError,
        memory::{MIB, page::PageFrame},
        test_support::{CacheOp, Fixture},
    };

    #[test]
    fn kmap_sections_folds_offset_into_size() {
        let fx = Fixture::new(1);
        let va = VA::from_value(0xc000_0000);

        let got = fx
            .mmu
            .kmap_sections(&fx.cache, va, PA::from_value(0x2010_0800), 2 * MIB)
            .unwrap();
        assert_eq!(got, VA::from_value(0xc000_0800));

        // 0x800 + 2MB spans three sections.
        for n in 0..3 {
            assert_eq!(
                fx.l1(0).entries[0xc00 + n].decode(),
                Descriptor::Section {
                    base: PA::from_value(0x2010_0000 + n * MIB),
                    domain: DOMAIN0,
                    ap: AccessPermission::KernelRw,
                    attrs: MemAttrs::empty(),
                    exec: false,
                }
            );
        }
        assert!(fx.l1(0).entries[0xc03].is_fault());

        assert_eq!(
            fx.cache.take(),
            vec![
                CacheOp::InvalidatePage(VA::from_value(0xc000_0000)),
                CacheOp::InvalidatePage(VA::from_value(0xc010_0000)),
                CacheOp::InvalidatePage(VA::from_value(0xc020_0000)),
                CacheOp::WriteBack {
                    va: fx.l1(0).entry_va(0xc00),
                    len: 3 * L1_ENTRY_SIZE
                },
            ]
        );
    }

    #[test]
    fn kmap_sections_refuses_overlap_untouched() {
        let fx = Fixture::new(1);
        let va = VA::from_value(0xc000_0000);
        fx.mmu
            .kmap_sections(&fx.cache, va.add_bytes(2 * MIB), PA::from_value(0x2000_0000), MIB)
            .unwrap();
        let before = fx.l1(0).entries;
        fx.cache.take();

        let err = fx
            .mmu
            .kmap_sections(&fx.cache, va, PA::from_value(0x2100_0000), 4 * MIB)
            .unwrap_err();

        assert_eq!(err, KernelError::MappingError(MapError::AlreadyMapped));
        assert_eq!(fx.l1(0).entries, before);
        assert!(fx.cache.take().is_empty());
    }

    #[test]
    #[should_panic(expected = "not 1MB aligned")]
    fn kmap_sections_requires_aligned_va() {
        let fx = Fixture::new(1);
        let _ = fx.mmu.kmap_sections(
            &fx.cache,
            VA::from_value(0xc000_1000),
            PA::from_value(0x2000_0000),
            MIB,
        );
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn kmap_sections_rejects_range_wrapping_the_address_space() {
        let fx = Fixture::new(1);
        let _ = fx.mmu.kmap_sections(
            &fx.cache,
            VA::from_value(0xffe0_0000),
            PA::from_value(0x2000_0000),
            4 * MIB,
        );
    }

    #[test]
    fn cankaddr_reports_remaining_ram() {
        let fx = Fixture::new(1);
        let end = fx.mmu.layout().dram_end();
        assert_eq!(fx.mmu.cankaddr(PA::from_value(end - 0x1000)), 0x1000);
        assert_eq!(fx.mmu.cankaddr(PA::from_value(end)), 0);
        assert_eq!(fx.mmu.cankaddr(PA::from_value(0x3f00_0000)), 0);
    }

    #[test]
    fn uncache_section_strips_dram_attributes() {
        let fx = Fixture::new(1);
        let va = VA::from_value(0x8010_0000);

        assert_eq!(fx.mmu.uncache_section(&fx.cache, va, MIB), Ok(va));
        match fx.l1(0).entries[0x801].decode() {
            Descriptor::Section { attrs, base, .. } => {
                assert_eq!(attrs, MemAttrs::empty());
                assert_eq!(base, PA::from_value(0x0010_0000));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            fx.cache.take(),
            vec![
                CacheOp::InvalidatePage(va),
                CacheOp::CleanInvalidateDcache {
                    va: fx.l1(0).entry_va(0x801),
                    len: L1_ENTRY_SIZE
                },
            ]
        );

        assert_eq!(
            fx.mmu.uncache_section(&fx.cache, VA::from_value(0x0010_0000), MIB),
            Err(MapError::NotSectionMapped.into())
        );
    }

    #[test]
    fn check_compares_against_expectation() {
        let fx = Fixture::new(1);
        let mut proc = ProcessMmu::new();
        let va = VA::from_value(0x0020_4000);
        let pa = PA::from_value(0x0150_0000);

        assert!(fx.mmu.check(&fx.mem, va, Expect::Unmapped));
        assert!(!fx.mmu.check(&fx.mem, va, Expect::Any));

        fx.with_ctx(|ctx| {
            fx.mmu.put(
                ctx,
                &mut proc,
                va,
                EncodedPa::new(pa, PteFlags::VALID),
                &PageFrame::new(pa, va),
            )
        });

        assert!(fx.mmu.check(&fx.mem, va, Expect::Any));
        assert!(fx.mmu.check(&fx.mem, va.add_bytes(0x123), Expect::Frame(pa)));
        assert!(!fx.mmu.check(&fx.mem, va, Expect::Frame(pa.add_bytes(0x1000))));
        assert!(!fx.mmu.check(&fx.mem, va, Expect::Unmapped));
        // Neighbouring page in the same table is still empty.
        assert!(fx.mmu.check(&fx.mem, va.add_bytes(0x1000), Expect::Unmapped));

        // Kernel direct map resolves through sections.
        assert!(fx.mmu.check(
            &fx.mem,
            VA::from_value(0x8123_4000),
            Expect::Frame(PA::from_value(0x0123_4000))
        ));
    }
}
