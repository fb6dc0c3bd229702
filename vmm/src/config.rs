//! Memory manager configuration.
//!
//! Frame counts, page size and address-space size are simulation
//! parameters, not wire formats: anything the packed page-table-entry
//! fields can address is accepted, everything larger is rejected by
//! [`MemoryConfig::validate`]. Loading these values from the command
//! line or a scenario file is the surrounding simulator's job.

use crate::memory::{MemError, MemResult, MAX_PAGES, MAX_RAM_FRAMES, MAX_SWAP_FRAMES};

/// Growth direction of the heap area (VMA 1).
///
/// The data area always grows upward from address zero. The heap either
/// grows upward from the middle of the address space or downward from
/// its top; both layouts exist in the field, so the choice is explicit
/// configuration rather than a build switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeapGrowth {
    /// Heap anchored at `vmem_size / 2`, growing toward higher addresses.
    #[default]
    Upward,
    /// Heap anchored at `vmem_size`, growing toward lower addresses.
    Downward,
}

/// Per-process memory manager parameters.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Page and frame size in bytes. Must be a power of two.
    pub page_size: usize,
    /// Number of frames in the shared RAM pool.
    pub ram_frames: usize,
    /// Number of frames in the shared swap pool.
    pub swap_frames: usize,
    /// Virtual address space size in bytes. Must be a multiple of
    /// `2 * page_size` so the upward heap anchor is page-aligned.
    pub vmem_size: usize,
    /// Growth direction of the heap area.
    pub heap_growth: HeapGrowth,
    /// Check region read/write offsets against the region end.
    ///
    /// Off by default: the historical behavior trusts callers not to
    /// overrun a region. Turning this on makes overruns fail with
    /// [`MemError::OutOfRange`] instead.
    pub bounds_check: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            page_size: 256,
            ram_frames: 64,
            swap_frames: 256,
            vmem_size: 16384,
            heap_growth: HeapGrowth::default(),
            bounds_check: false,
        }
    }
}

impl MemoryConfig {
    /// Validate the configuration against the simulator ceilings.
    pub fn validate(&self) -> MemResult<()> {
        if !self.page_size.is_power_of_two() {
            return Err(MemError::InvalidConfig("page_size must be a power of two"));
        }
        if self.ram_frames == 0 || self.ram_frames > MAX_RAM_FRAMES {
            return Err(MemError::InvalidConfig("ram_frames outside supported range"));
        }
        if self.swap_frames > MAX_SWAP_FRAMES {
            return Err(MemError::InvalidConfig("swap_frames outside supported range"));
        }
        if self.vmem_size == 0 || self.vmem_size % (2 * self.page_size) != 0 {
            return Err(MemError::InvalidConfig(
                "vmem_size must be a non-zero multiple of 2 * page_size",
            ));
        }
        if self.page_count() > MAX_PAGES {
            return Err(MemError::InvalidConfig("vmem_size exceeds the page table ceiling"));
        }
        Ok(())
    }

    /// Number of virtual pages covered by the page table.
    pub fn page_count(&self) -> usize {
        self.vmem_size / self.page_size
    }

    /// Round `size` up to the next page boundary.
    ///
    /// `None` when the rounded size does not fit in `usize`.
    pub fn align_up(&self, size: usize) -> Option<usize> {
        size.checked_add(self.page_size - 1).map(|s| s & !(self.page_size - 1))
    }

    /// Anchor address of the heap area for the configured direction.
    pub fn heap_base(&self) -> usize {
        match self.heap_growth {
            HeapGrowth::Upward => self.vmem_size / 2,
            HeapGrowth::Downward => self.vmem_size,
        }
    }
}
