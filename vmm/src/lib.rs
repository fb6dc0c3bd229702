//! Paging-based virtual memory manager for an OS teaching simulator.
//!
//! This crate implements the memory side of a simulated process: the
//! virtual address space layout (a data area and a heap area), a flat
//! page table, and the policy for moving pages between a fixed-size RAM
//! frame pool and a swap-device frame pool when RAM runs out.
//!
//! # Architecture
//!
//! - Named regions: callers address storage through small integer
//!   variable ids resolved by a per-process region table, never through
//!   raw addresses
//! - First-fit region allocation inside per-area free lists, with
//!   on-demand area growth when no gap fits
//! - Demand paging with strict FIFO replacement between the shared RAM
//!   and swap frame pools
//!
//! # Collaborators
//!
//! The instruction interpreter, scheduler and process-control-block
//! lifecycle live outside this crate; they drive a [`MemoryManager`]
//! through its synchronous alloc/free/read/write surface and call
//! [`MemoryManager::reclaim_all`] at process teardown.

pub mod config;
pub mod memory;

pub use config::{HeapGrowth, MemoryConfig};
pub use memory::manager::MemoryManager;
pub use memory::phys::{PhysMem, SharedPhysMem};
pub use memory::{MemError, MemResult, MemStats, ProcessId};
