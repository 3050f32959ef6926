pub mod address_space;
pub mod bootstrap;
pub mod fault;
pub mod kmap;
pub mod l2_pool;
pub mod layout;
pub mod mmu;
pub mod pg_descriptors;
pub mod pg_tables;
pub mod tlb;
