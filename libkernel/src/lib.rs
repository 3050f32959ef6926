#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod error;
pub mod memory;
pub mod sync;

#[cfg(test)]
pub mod test_support;

/// Per-core primitives the memory code needs from the running architecture.
///
/// Implementors are zero-sized marker types; every method acts on the core
/// that executes it.
pub trait CpuOps: 'static {
    /// Index of the executing core, starting at zero.
    fn id() -> usize;

    fn halt() -> !;

    /// Masks interrupts and returns an opaque token describing the previous
    /// state, to be handed back to [`CpuOps::restore_interrupt_state`].
    fn disable_interrupts() -> usize;

    fn restore_interrupt_state(flags: usize);

    fn enable_interrupts();
}
