use crate::memory::address::VA;

/// Cache and TLB maintenance needed to keep the table walker coherent with
/// CPU-side table edits.
///
/// A table edit becomes visible to the walker only after
/// [`write_back_tables`](Self::write_back_tables) over the touched bytes, and
/// a changed translation is only gone after the matching invalidate. Callers
/// always write back first.
pub trait TranslationCache {
    /// Pushes table entries in `[va, va + len)` out to where the walker reads
    /// them.
    fn write_back_tables(&self, va: VA, len: usize);

    /// Drops any cached translation for the page containing `va`.
    fn invalidate_page(&self, va: VA);

    fn invalidate_all(&self);

    /// Data-cache clean by address range.
    fn clean_dcache(&self, va: VA, len: usize);

    fn clean_invalidate_dcache(&self, va: VA, len: usize);

    fn invalidate_icache(&self, va: VA, len: usize);
}
