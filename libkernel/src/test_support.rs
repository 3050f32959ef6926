//! Host-side stand-ins for the hardware and the rest of the kernel.

use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};
use core::cell::{Cell, RefCell};

use crate::{
    CpuOps,
    arch::armv7::memory::{
        bootstrap::{build_boot_tables, clone_boot_tables},
        layout::MemoryLayout,
        mmu::{Mmu, MmuContext},
        pg_tables::{L1Table, L2_TABLE_SIZE, L2Table, PageAllocator, PageTableMapper},
        tlb::TranslationCache,
    },
    error::{KernelError, Result},
    memory::{
        MIB, PAGE_SIZE,
        address::{PA, VA},
    },
};

thread_local! {
    static CPU_ID: Cell<usize> = const { Cell::new(0) };
    static IRQS_ON: Cell<bool> = const { Cell::new(true) };
}

pub fn set_cpu(id: usize) {
    CPU_ID.with(|c| c.set(id));
}

pub fn irqs_enabled() -> bool {
    IRQS_ON.with(Cell::get)
}

pub struct MockCpu;

impl CpuOps for MockCpu {
    fn id() -> usize {
        CPU_ID.with(Cell::get)
    }

    fn halt() -> ! {
        panic!("halt");
    }

    fn disable_interrupts() -> usize {
        IRQS_ON.with(|c| c.replace(false)) as usize
    }

    fn restore_interrupt_state(flags: usize) {
        IRQS_ON.with(|c| c.set(flags != 0));
    }

    fn enable_interrupts() {
        IRQS_ON.with(|c| c.set(true));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    WriteBack { va: VA, len: usize },
    InvalidatePage(VA),
    InvalidateAll,
    CleanDcache { va: VA, len: usize },
    CleanInvalidateDcache { va: VA, len: usize },
    InvalidateIcache { va: VA, len: usize },
}

#[derive(Default)]
pub struct RecordingCache {
    ops: RefCell<Vec<CacheOp>>,
}

impl RecordingCache {
    pub fn take(&self) -> Vec<CacheOp> {
        self.ops.take()
    }

    fn push(&self, op: CacheOp) {
        self.ops.borrow_mut().push(op);
    }
}

impl TranslationCache for RecordingCache {
    fn write_back_tables(&self, va: VA, len: usize) {
        self.push(CacheOp::WriteBack { va, len });
    }

    fn invalidate_page(&self, va: VA) {
        self.push(CacheOp::InvalidatePage(va));
    }

    fn invalidate_all(&self) {
        self.push(CacheOp::InvalidateAll);
    }

    fn clean_dcache(&self, va: VA, len: usize) {
        self.push(CacheOp::CleanDcache { va, len });
    }

    fn clean_invalidate_dcache(&self, va: VA, len: usize) {
        self.push(CacheOp::CleanInvalidateDcache { va, len });
    }

    fn invalidate_icache(&self, va: VA, len: usize) {
        self.push(CacheOp::InvalidateIcache { va, len });
    }
}

#[repr(C, align(4096))]
struct MockPage([u8; PAGE_SIZE]);

const MOCK_PA_BASE: usize = 0x0800_0000;

/// Physical pages backed by heap memory, handed out at made-up physical
/// addresses. Addresses it never handed out translate through the layout's
/// direct map, which is never dereferenced by the code under test.
pub struct MockMemory {
    layout: MemoryLayout,
    pages: RefCell<BTreeMap<usize, Box<MockPage>>>,
    next_pa: Cell<usize>,
    allocs: Cell<usize>,
    freed: RefCell<Vec<PA>>,
    irq_at_alloc: RefCell<Vec<bool>>,
    fail_next: Cell<Option<KernelError>>,
    migrate_to: Cell<Option<usize>>,
}

impl MockMemory {
    pub fn new(layout: MemoryLayout) -> Self {
        Self {
            layout,
            pages: RefCell::new(BTreeMap::new()),
            next_pa: Cell::new(MOCK_PA_BASE),
            allocs: Cell::new(0),
            freed: RefCell::new(Vec::new()),
            irq_at_alloc: RefCell::new(Vec::new()),
            fail_next: Cell::new(None),
            migrate_to: Cell::new(None),
        }
    }

    fn alloc(&self) -> Result<PA> {
        self.irq_at_alloc.borrow_mut().push(irqs_enabled());

        if let Some(cpu) = self.migrate_to.take() {
            set_cpu(cpu);
        }
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }

        let pa = self.next_pa.get();
        self.next_pa.set(pa + PAGE_SIZE);
        self.pages
            .borrow_mut()
            .insert(pa, Box::new(MockPage([0; PAGE_SIZE])));
        self.allocs.set(self.allocs.get() + 1);

        Ok(PA::from_value(pa))
    }

    fn free(&self, pa: PA) {
        let page = self.pages.borrow_mut().remove(&pa.value());
        assert!(page.is_some(), "double free or foreign page {pa}");
        self.freed.borrow_mut().push(pa);
    }

    pub fn fail_next_alloc(&self, e: KernelError) {
        self.fail_next.set(Some(e));
    }

    /// The next allocation resumes on core `cpu`, as if it had slept and been
    /// picked up elsewhere.
    pub fn migrate_on_alloc(&self, cpu: usize) {
        self.migrate_to.set(Some(cpu));
    }

    pub fn irq_state_at_alloc(&self) -> Vec<bool> {
        self.irq_at_alloc.borrow().clone()
    }

    /// Whether the second-level table at kernel address `va` is all zero.
    pub fn is_zero(&self, va: VA) -> bool {
        // SAFETY: `va` came from this allocator and the page is still live.
        let bytes = unsafe { core::slice::from_raw_parts(va.value() as *const u8, L2_TABLE_SIZE) };
        bytes.iter().all(|&b| b == 0)
    }
}

impl PageTableMapper for MockMemory {
    fn phys_to_virt(&self, pa: PA) -> VA {
        let frame = pa.page_aligned().value();
        match self.pages.borrow().get(&frame) {
            Some(pg) => VA::from_value(pg.0.as_ptr() as usize + pa.page_offset()),
            None => self.layout.kaddr(pa),
        }
    }
}

pub struct MockAllocator<'a> {
    mem: &'a MockMemory,
}

impl PageAllocator for MockAllocator<'_> {
    fn alloc_zeroed_page(&mut self) -> Result<PA> {
        self.mem.alloc()
    }

    fn free_pages(&mut self, pages: &mut dyn Iterator<Item = PA>) {
        for pa in pages {
            self.mem.free(pa);
        }
    }
}

/// An [`Mmu`] over mock hardware, with every core booted the way the kernel
/// does it: boot tables built, secondaries cloned, identity map dropped.
pub struct Fixture {
    pub mmu: Mmu<MockCpu>,
    pub mem: MockMemory,
    pub cache: RecordingCache,
    l1s: Vec<Box<L1Table>>,
    _vectors: Box<L2Table>,
}

impl Fixture {
    pub fn new(cpus: usize) -> Self {
        let layout = MemoryLayout::bcm2836().with_dram_size(256 * MIB);
        set_cpu(0);
        IRQS_ON.with(|c| c.set(true));

        let mut boot = Box::new(L1Table::new());
        let mut vectors = Box::new(L2Table::new());
        build_boot_tables(&mut boot, &mut vectors, PA::from_value(0x4000), &layout);

        let mut l1s = Vec::new();
        for _ in 0..cpus {
            let mut l1 = Box::new(L1Table::new());
            clone_boot_tables(&boot, &mut l1, &layout);
            l1s.push(l1);
        }

        let fx = Self {
            mmu: Mmu::new(layout),
            mem: MockMemory::new(layout),
            cache: RecordingCache::default(),
            l1s,
            _vectors: vectors,
        };

        for (id, l1) in fx.l1s.iter().enumerate() {
            set_cpu(id);
            fx.mmu
                .init_cpu(VA::from_ptr(&**l1))
                .expect("fresh fixture core");
            fx.mmu.identity_map(&fx.cache, false);
        }
        set_cpu(0);
        fx.cache.take();

        fx
    }

    /// Runs `f` with a context drawing tables from this fixture's memory.
    pub fn with_ctx<R>(&self, f: impl FnOnce(&mut MmuContext<'_>) -> R) -> R {
        let mut allocator = MockAllocator { mem: &self.mem };
        let mut ctx = MmuContext {
            allocator: &mut allocator,
            mapper: &self.mem,
            cache: &self.cache,
        };
        f(&mut ctx)
    }

    pub fn l1(&self, cpu: usize) -> &L1Table {
        &self.l1s[cpu]
    }

    pub fn l2(&self, table: PA) -> &L2Table {
        // SAFETY: `table` is a live mock page.
        unsafe { &*self.mem.phys_to_virt(table).cast::<L2Table>().as_ptr() }
    }

    pub fn allocs(&self) -> usize {
        self.mem.allocs.get()
    }

    pub fn freed(&self) -> Vec<PA> {
        self.mem.freed.borrow().clone()
    }
}
