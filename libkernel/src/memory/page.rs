use core::sync::atomic::{AtomicU32, Ordering};

use super::address::{PA, VA};

/// A physical page as seen by the fault path.
///
/// `va` is the user address the page is being mapped at. The text-flush mask
/// has one bit per core; a set bit means that core's instruction cache has
/// not yet been reconciled with freshly written contents of the page.
#[derive(Debug)]
pub struct PageFrame {
    pa: PA,
    va: VA,
    txtflush: AtomicU32,
}

impl PageFrame {
    pub const fn new(pa: PA, va: VA) -> Self {
        Self {
            pa,
            va,
            txtflush: AtomicU32::new(0),
        }
    }

    pub fn pa(&self) -> PA {
        self.pa
    }

    pub fn va(&self) -> VA {
        self.va
    }

    /// Marks the page as needing an instruction-cache flush on every core.
    pub fn mark_text_flush_all(&self) {
        self.txtflush.store(u32::MAX, Ordering::Release);
    }

    pub fn needs_text_flush(&self, cpu: usize) -> bool {
        self.txtflush.load(Ordering::Acquire) & (1 << cpu) != 0
    }

    pub fn done_text_flush(&self, cpu: usize) {
        self.txtflush.fetch_and(!(1 << cpu), Ordering::AcqRel);
    }
}
