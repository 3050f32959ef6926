pub mod irq;
pub mod per_cpu;
