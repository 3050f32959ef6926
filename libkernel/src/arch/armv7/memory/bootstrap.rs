//! First-level table set up for the boot core and its secondaries.
//!
//! The boot core builds its table with translation off, turns the MMU on and,
//! once running at `kzero`, publishes the table in a [`BootTables`]. Each
//! secondary gets a copy prepared by the boot core before it is released.

use super::{
    layout::MemoryLayout,
    mmu::Mmu,
    pg_descriptors::{AccessPermission, DOMAIN0, L1Descriptor, L2Descriptor, MemAttrs},
    pg_tables::{L1Table, L2Table, l1_index, l2_index},
    tlb::TranslationCache,
};
use crate::{
    CpuOps,
    error::{KernelError, Result},
    memory::{
        MIB,
        address::{PA, VA},
    },
    sync::{irq::IrqGuard, per_cpu::MAX_CPUS},
};

fn dram_section(layout: &MemoryLayout, pa: usize) -> L1Descriptor {
    L1Descriptor::section(
        PA::from_value(pa),
        DOMAIN0,
        AccessPermission::KernelRw,
        layout.l1_dram_attrs,
        true,
    )
}

fn io_section(pa: usize) -> L1Descriptor {
    L1Descriptor::section(
        PA::from_value(pa),
        DOMAIN0,
        AccessPermission::KernelRw,
        MemAttrs::empty(),
        false,
    )
}

/// Builds the boot core's first-level table.
///
/// Maps all of RAM at `kzero`, the first MB of RAM at its own address so the
/// MMU can be switched on, the peripherals, and the high vector page onto the
/// start of RAM through `vectors` (whose physical address is `vectors_pa`).
/// No cache maintenance is done; the MMU and caches are still off.
pub fn build_boot_tables(
    l1: &mut L1Table,
    vectors: &mut L2Table,
    vectors_pa: PA,
    layout: &MemoryLayout,
) {
    l1.clear(0..l1.entries.len());
    vectors.zero();

    let mut va = layout.kzero;
    for pa in (layout.phys_dram..layout.dram_end()).step_by(MIB) {
        l1.entries[l1_index(VA::from_value(va))] = dram_section(layout, pa);
        va += MIB;
    }

    l1.entries[l1_index(VA::from_value(layout.phys_dram))] =
        dram_section(layout, layout.phys_dram);

    let mut va = layout.virt_io;
    for pa in (layout.phys_io..layout.phys_io + layout.io_size).step_by(MIB) {
        l1.entries[l1_index(VA::from_value(va))] = io_section(pa);
        va += MIB;
    }
    if let Some(pa) = layout.arm_local {
        l1.entries[l1_index(VA::from_value(va))] = io_section(pa);
    }

    let hvec = VA::from_value(layout.hvectors);
    l1.entries[l1_index(hvec)] = L1Descriptor::coarse(vectors_pa, DOMAIN0);
    vectors.entries[l2_index(hvec)] = L2Descriptor::small(
        PA::from_value(layout.phys_dram),
        AccessPermission::KernelRw,
        layout.l2_dram_attrs,
        true,
    );
}

/// Gives a secondary core a copy of the boot core's kernel mappings.
///
/// The vector page's second-level table is shared, not copied. User slots
/// start out empty apart from the identity section at the start of RAM,
/// which the secondary needs to switch translation on. It is mapped even if
/// the boot core has already dropped its own.
pub fn clone_boot_tables(boot: &L1Table, l1: &mut L1Table, layout: &MemoryLayout) {
    l1.entries = boot.entries;
    l1.clear(layout.user_l1_range());

    let ident = l1_index(VA::from_value(layout.phys_dram));
    l1.entries[ident] = dram_section(layout, layout.phys_dram);
}

/// Where a first-level table lives: `pa` for TTBR0, `va` for the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableAddr {
    pub pa: PA,
    pub va: VA,
}

/// Every core's first-level table, as handed out during bring-up.
#[derive(Debug)]
pub struct BootTables {
    boot: Option<TableAddr>,
    cores: [Option<TableAddr>; MAX_CPUS],
}

impl BootTables {
    pub const fn new() -> Self {
        Self {
            boot: None,
            cores: [None; MAX_CPUS],
        }
    }

    /// Records the boot core's table, which doubles as core `cpu`'s own.
    ///
    /// # Safety
    ///
    /// `table.va` must point at a live [`L1Table`] that is never freed or
    /// moved.
    pub unsafe fn publish_boot(&mut self, cpu: usize, table: TableAddr) -> Result<()> {
        if cpu >= MAX_CPUS {
            return Err(KernelError::InvalidValue);
        }
        if self.boot.is_some() || self.cores[cpu].is_some() {
            return Err(KernelError::InUse);
        }

        self.boot = Some(table);
        self.cores[cpu] = Some(table);
        Ok(())
    }

    /// Fills `l1`, found at physical address `pa`, with the boot core's
    /// kernel mappings and records it as core `cpu`'s table.
    ///
    /// `l1` is left untouched on error.
    pub fn prepare_secondary(
        &mut self,
        cpu: usize,
        l1: &mut L1Table,
        pa: PA,
        layout: &MemoryLayout,
    ) -> Result<TableAddr> {
        if cpu >= MAX_CPUS {
            return Err(KernelError::InvalidValue);
        }
        let Some(boot) = self.boot else {
            return Err(KernelError::Other("secondary prepared before boot tables"));
        };
        if self.cores[cpu].is_some() {
            return Err(KernelError::InUse);
        }

        // SAFETY: `publish_boot` requires the boot table to stay live.
        let boot_table = unsafe { &*boot.va.cast::<L1Table>().as_ptr() };
        clone_boot_tables(boot_table, l1, layout);

        let table = TableAddr {
            pa,
            va: VA::from_ptr(l1),
        };
        self.cores[cpu] = Some(table);
        Ok(table)
    }

    pub fn core_table(&self, cpu: usize) -> Option<TableAddr> {
        self.cores.get(cpu).copied().flatten()
    }
}

impl Default for BootTables {
    fn default() -> Self {
        Self::new()
    }
}

impl<CPU: CpuOps> Mmu<CPU> {
    /// Adopts the table `tables` holds for the executing core, once it runs
    /// with translation on, and drops its identity mapping.
    pub fn bring_up_cpu(
        &self,
        tables: &BootTables,
        cache: &dyn TranslationCache,
    ) -> Result<TableAddr> {
        let Some(table) = tables.core_table(CPU::id()) else {
            return Err(KernelError::Other("no L1 table prepared for this core"));
        };

        self.init_cpu(table.va)?;
        self.identity_map(cache, false);

        Ok(table)
    }

    /// Maps or unmaps the identity section at the start of RAM on the
    /// executing core.
    pub fn identity_map(&self, cache: &dyn TranslationCache, on: bool) {
        let phys_dram = self.layout().phys_dram;
        let va = VA::from_value(phys_dram);
        let x = l1_index(va);

        let mut irq = IrqGuard::<CPU>::new();
        let l1 = self.cpu(&mut irq).table();

        l1.entries[x] = if on {
            dram_section(self.layout(), phys_dram)
        } else {
            L1Descriptor::FAULT
        };
        cache.write_back_tables(l1.entry_va(x), size_of::<L1Descriptor>());
        cache.invalidate_page(va);
        cache.invalidate_all();
    }
}
