//! MMU bring-up for the boot core and its secondaries.
//!
//! The boot core builds its table with translation off, turns the MMU on and,
//! once running at `KZERO`, publishes its table. Secondaries get a copy of it
//! prepared by the boot core before they are released.

use libkernel::{
    CpuOps,
    arch::armv7::memory::{
        bootstrap::{BootTables, TableAddr, build_boot_tables},
        pg_tables::{L1Table, L2Table},
    },
    error::Result,
    memory::{
        MIB,
        address::{PA, VA},
    },
};
use log::info;
use spinning_top::Spinlock;

use super::{
    Armv7,
    memory::{MMU, tlb::Cp15Cache},
};
use crate::config::LAYOUT;

mod paging_bootstrap;

pub use paging_bootstrap::enable_mmu;

static BOOT_TABLES: Spinlock<BootTables> = Spinlock::new(BootTables::new());

/// Builds the boot core's tables and switches translation on.
///
/// # Safety
///
/// Translation must be off. `l1` and `vectors` must be the physical addresses
/// of otherwise unused, suitably aligned memory for an [`L1Table`] and an
/// [`L2Table`], and the caller's code must lie in the first MB of RAM.
pub unsafe fn setup_boot_tables(l1: PA, vectors: PA) {
    // SAFETY: with translation off physical addresses are used as-is, and the
    // caller hands us exclusive use of both tables.
    let (l1_table, vectors_table) = unsafe {
        (
            &mut *(l1.value() as *mut L1Table),
            &mut *(vectors.value() as *mut L2Table),
        )
    };

    build_boot_tables(l1_table, vectors_table, vectors, &LAYOUT);

    // SAFETY: the table was just built, identity slot included.
    unsafe { enable_mmu(l1) };
}

/// Registers the boot core's table once it runs from kernel addresses and
/// drops the identity mapping.
pub fn init_boot_mmu(l1: PA) -> Result<()> {
    let table = TableAddr {
        pa: l1,
        va: LAYOUT.kaddr(l1),
    };
    // SAFETY: the boot table sits in RAM below the kernel image, reached
    // through the direct map, and is never freed.
    unsafe { BOOT_TABLES.lock().publish_boot(Armv7::id(), table)? };

    info!(
        "mmu: {}MB RAM at {:#010x}, io {:#010x} at {:#010x}",
        LAYOUT.dram_size / MIB,
        LAYOUT.kzero,
        LAYOUT.phys_io,
        LAYOUT.virt_io
    );

    init_cpu_mmu()
}

/// Fills `l1` with the boot core's kernel mappings for core `cpu`, and
/// returns the physical address that core has to load into TTBR0.
pub fn prepare_secondary(cpu: usize, l1: &'static mut L1Table) -> Result<PA> {
    let pa = LAYOUT.paddr(VA::from_ptr(&*l1));
    let table = BOOT_TABLES
        .lock()
        .prepare_secondary(cpu, l1, pa, &LAYOUT)?;

    Ok(table.pa)
}

/// Registers a secondary core's table after it has enabled translation with
/// the address from [`prepare_secondary`].
pub fn init_secondary_mmu() -> Result<()> {
    init_cpu_mmu()
}

fn init_cpu_mmu() -> Result<()> {
    let table = MMU.bring_up_cpu(&BOOT_TABLES.lock(), &Cp15Cache)?;
    info!("cpu{}: mmu on, L1 at {}", Armv7::id(), table.pa);

    Ok(())
}
