//! Memory Management Subsystem
//!
//! This module implements the paging engine of the simulator:
//!
//! - Physical frame pools for RAM and swap ([`phys`])
//! - Packed page-table-entry codec ([`pte`])
//! - Virtual memory areas with first-fit free-region lists ([`vma`])
//! - FIFO resident-page queue for victim selection ([`fifo`])
//! - The per-process [`manager::MemoryManager`] tying them together
//!
//! # Design Principles
//!
//! - Frames, pages and regions are integer handles into owned arrays;
//!   no linked-node surgery
//! - Per-process structures are exclusively owned by the thread running
//!   that process; only the shared frame pools carry a lock
//! - Every fallible operation returns [`MemResult`] and leaves no frame
//!   reserved behind an error

pub mod fifo;
pub mod manager;
pub mod phys;
pub mod pte;
pub mod vma;

use thiserror::Error;

/// Number of region-table slots per process (one per variable id).
pub const MAX_REGIONS: usize = 30;

/// Ceiling on the RAM pool size; also the FIFO queue capacity, since at
/// most one queue entry exists per resident frame.
pub const MAX_RAM_FRAMES: usize = 1024;

/// Ceiling on the swap pool size.
pub const MAX_SWAP_FRAMES: usize = 65536;

/// Ceiling on the per-process page table length.
pub const MAX_PAGES: usize = 16384;

/// Capacity of each virtual memory area's free-region list.
pub const MAX_FREE_REGIONS: usize = 64;

/// Memory management errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemError {
    /// Allocate named a variable id that already holds a live region.
    #[error("variable id already names a live region")]
    RegionInUse,
    /// The variable id names no live region.
    #[error("variable id names no live region")]
    InvalidHandle,
    /// Growing the area would intersect another area of the process.
    #[error("area growth would overlap a sibling area")]
    Overlap,
    /// No free region fits and the area could not grow.
    #[error("virtual address space exhausted")]
    OutOfMemory,
    /// The RAM pool is empty and no victim is available.
    #[error("RAM frame pool exhausted")]
    FrameExhausted,
    /// The swap pool is empty while evicting.
    #[error("swap frame pool exhausted")]
    SwapExhausted,
    /// The FIFO queue is empty but a victim is required.
    #[error("no resident page available for eviction")]
    NoVictim,
    /// Address translation hit a page with no backing location.
    #[error("virtual page is unmapped")]
    UnmappedPage,
    /// Region access beyond the region end (only with `bounds_check`).
    #[error("offset past the region end")]
    OutOfRange,
    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Result type for memory operations.
pub type MemResult<T> = Result<T, MemError>;

/// Identifier of a simulated process, used to tag frame ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Create a new process ID.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Per-process memory activity counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemStats {
    /// Successful region allocations.
    pub allocations: u64,
    /// Successful region frees.
    pub frees: u64,
    /// Translations that found the page swapped out.
    pub page_faults: u64,
    /// Pages copied out of RAM to make room.
    pub evictions: u64,
    /// Pages copied back in from swap.
    pub swap_ins: u64,
    /// Bytes added to the areas by growth, after page alignment.
    pub grown_bytes: u64,
}
