//! Virtual memory areas and their free-region lists.
//!
//! Each process owns two areas: `DATA_VMA` growing upward from address
//! zero and `HEAP_VMA` growing from the configured anchor in the
//! configured direction. An area hands out byte ranges from its owned
//! free-region list by first fit and grows on demand when nothing fits.
//!
//! Free regions are always stored normalized (`start < end`) no matter
//! which way the area grows; a downward area simply carves from the
//! high end of a region. Zero-length regions are spliced out after
//! every search so repeated exact fits cannot grow the list without
//! bound.

use heapless::Vec;

use crate::memory::{MemError, MemResult, MAX_FREE_REGIONS};

/// Area id of the data segment.
pub const DATA_VMA: usize = 0;
/// Area id of the heap segment.
pub const HEAP_VMA: usize = 1;

/// Growth direction of an area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Mapped extent grows toward higher addresses.
    Upward,
    /// Mapped extent grows toward lower addresses.
    Downward,
}

/// A normalized free byte range inside one area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRegion {
    /// First free byte.
    pub start: usize,
    /// One past the last free byte.
    pub end: usize,
}

impl FreeRegion {
    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// A region with no bytes left; pruned after every search.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// One contiguous sub-range of a process's virtual address space.
#[derive(Debug)]
pub struct VirtualMemoryArea {
    id: usize,
    /// Fixed anchor: the low bound of an upward area, the high bound of
    /// a downward one.
    base: usize,
    /// Growth frontier. Coincides with the moving bound of the mapped
    /// extent `[lower, upper)`.
    brk: usize,
    growth: Growth,
    free_regions: Vec<FreeRegion, MAX_FREE_REGIONS>,
}

impl VirtualMemoryArea {
    /// Create an empty area anchored at `base`.
    pub fn new(id: usize, base: usize, growth: Growth) -> Self {
        Self { id, base, brk: base, growth, free_regions: Vec::new() }
    }

    /// Area id.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Current growth frontier.
    pub fn brk(&self) -> usize {
        self.brk
    }

    /// Low bound of the mapped extent.
    pub fn lower(&self) -> usize {
        match self.growth {
            Growth::Upward => self.base,
            Growth::Downward => self.brk,
        }
    }

    /// High bound (exclusive) of the mapped extent.
    pub fn upper(&self) -> usize {
        match self.growth {
            Growth::Upward => self.brk,
            Growth::Downward => self.base,
        }
    }

    /// Whether the mapped extent intersects `[start, end)`.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.lower() < end && start < self.upper()
    }

    /// Whether `[start, end)` lies inside the mapped extent.
    pub fn contains_range(&self, start: usize, end: usize) -> bool {
        self.lower() <= start && end <= self.upper()
    }

    /// Current free-region list, in first-fit search order.
    pub fn free_regions(&self) -> &[FreeRegion] {
        &self.free_regions
    }

    /// Whether another `enlist` would overflow the bookkeeping list.
    pub fn free_list_full(&self) -> bool {
        self.free_regions.is_full()
    }

    /// First-fit search: carve `size` bytes out of the earliest region
    /// that holds them and return the low address of the carved run.
    ///
    /// An upward area consumes a region from its low end, a downward
    /// one from its high end. Empty leftovers are pruned before
    /// returning.
    pub fn first_fit(&mut self, size: usize) -> Option<usize> {
        let growth = self.growth;
        let mut found = None;
        for region in self.free_regions.iter_mut() {
            if region.len() >= size {
                let start = match growth {
                    Growth::Upward => {
                        let start = region.start;
                        region.start += size;
                        start
                    }
                    Growth::Downward => {
                        region.end -= size;
                        region.end
                    }
                };
                found = Some(start);
                break;
            }
        }
        self.free_regions.retain(|r| !r.is_empty());
        found
    }

    /// Append `[start, end)` to the free list. Empty ranges are ignored
    /// rather than enlisted.
    ///
    /// Neighbors are not coalesced; fragmentation is tolerated and the
    /// pruning pass keeps the list bounded.
    pub fn enlist(&mut self, start: usize, end: usize) -> MemResult<()> {
        if start >= end {
            return Ok(());
        }
        self.free_regions
            .push(FreeRegion { start, end })
            .map_err(|_| MemError::OutOfMemory)
    }

    /// Byte range the area would cover by growing `aligned` bytes.
    ///
    /// Returned normalized; the caller validates it against the sibling
    /// areas and the address-space bounds before mapping.
    pub fn plan_growth(&self, aligned: usize, ceiling: usize) -> MemResult<(usize, usize)> {
        match self.growth {
            Growth::Upward => {
                let end = self.brk.checked_add(aligned).ok_or(MemError::OutOfMemory)?;
                if end > ceiling {
                    return Err(MemError::OutOfMemory);
                }
                Ok((self.brk, end))
            }
            Growth::Downward => {
                let start = self.brk.checked_sub(aligned).ok_or(MemError::OutOfMemory)?;
                Ok((start, self.brk))
            }
        }
    }

    /// Advance the frontier after a successful growth mapping.
    pub fn commit_growth(&mut self, aligned: usize) {
        match self.growth {
            Growth::Upward => self.brk += aligned,
            Growth::Downward => self.brk -= aligned,
        }
    }

    /// Drop all free regions; teardown path.
    pub fn clear(&mut self) {
        self.free_regions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upward() -> VirtualMemoryArea {
        VirtualMemoryArea::new(DATA_VMA, 0, Growth::Upward)
    }

    #[test]
    fn first_fit_prefers_earliest_region() {
        let mut vma = upward();
        vma.enlist(0, 100).unwrap();
        vma.enlist(200, 400).unwrap();

        // Both regions fit 50 bytes; the earlier one wins.
        assert_eq!(vma.first_fit(50), Some(0));
        assert_eq!(vma.free_regions(), &[
            FreeRegion { start: 50, end: 100 },
            FreeRegion { start: 200, end: 400 },
        ]);
    }

    #[test]
    fn first_fit_skips_too_small_regions() {
        let mut vma = upward();
        vma.enlist(0, 10).unwrap();
        vma.enlist(100, 300).unwrap();

        assert_eq!(vma.first_fit(50), Some(100));
    }

    #[test]
    fn exact_fit_prunes_the_region() {
        let mut vma = upward();
        vma.enlist(0, 64).unwrap();
        assert_eq!(vma.first_fit(64), Some(0));
        assert!(vma.free_regions().is_empty());
    }

    #[test]
    fn downward_area_carves_from_the_high_end() {
        let mut vma = VirtualMemoryArea::new(HEAP_VMA, 1024, Growth::Downward);
        vma.enlist(768, 1024).unwrap();

        assert_eq!(vma.first_fit(64), Some(960));
        assert_eq!(vma.free_regions(), &[FreeRegion { start: 768, end: 960 }]);
    }

    #[test]
    fn enlist_ignores_empty_ranges() {
        let mut vma = upward();
        vma.enlist(10, 10).unwrap();
        assert!(vma.free_regions().is_empty());
    }

    #[test]
    fn growth_plan_and_commit_move_the_frontier_up() {
        let mut vma = upward();
        assert_eq!(vma.plan_growth(512, 1024).unwrap(), (0, 512));
        vma.commit_growth(512);
        assert_eq!(vma.brk(), 512);
        assert_eq!((vma.lower(), vma.upper()), (0, 512));

        // Past the ceiling.
        assert_eq!(vma.plan_growth(1024, 1024), Err(MemError::OutOfMemory));
    }

    #[test]
    fn growth_plan_and_commit_move_the_frontier_down() {
        let mut vma = VirtualMemoryArea::new(HEAP_VMA, 1024, Growth::Downward);
        assert_eq!(vma.plan_growth(256, 1024).unwrap(), (768, 1024));
        vma.commit_growth(256);
        assert_eq!(vma.brk(), 768);
        assert_eq!((vma.lower(), vma.upper()), (768, 1024));

        // Below address zero.
        assert_eq!(vma.plan_growth(4096, 1024), Err(MemError::OutOfMemory));
    }

    #[test]
    fn contains_range_tracks_the_mapped_extent() {
        let mut vma = upward();
        vma.commit_growth(512);
        assert!(vma.contains_range(0, 512));
        assert!(vma.contains_range(100, 200));
        assert!(!vma.contains_range(256, 768));
        assert!(!vma.contains_range(512, 513));
    }

    #[test]
    fn empty_extent_overlaps_nothing() {
        let vma = upward();
        assert!(!vma.overlaps(0, 1024));
    }

    #[test]
    fn overlap_is_strict_intersection() {
        let mut vma = upward();
        vma.commit_growth(512);
        assert!(vma.overlaps(256, 768));
        assert!(vma.overlaps(0, 1));
        assert!(!vma.overlaps(512, 1024));
    }
}
