//! Per-process memory manager.
//!
//! One [`MemoryManager`] exists per simulated process. It owns the flat
//! page table, the region (symbol) table mapping variable ids to live
//! byte ranges, the two virtual memory areas, and the FIFO queue of
//! resident pages, and it holds handles to the shared RAM and swap
//! frame pools.
//!
//! # Control flow
//!
//! allocate/free/read/write by variable id -> region table -> first-fit
//! inside the target area (growing it on demand) -> address translation
//! through the page table -> on a fault, FIFO eviction moves the oldest
//! resident page to swap and its RAM frame is reused directly for the
//! faulting page.
//!
//! # Failure discipline
//!
//! Errors return synchronously and leave no partial state: frames
//! reserved by an operation that then fails are released before the
//! error is returned, and a victim popped for an eviction that cannot
//! complete goes back to the queue head.
//!
//! Lock order for the shared pools is always RAM before swap.

use log::{debug, trace};

use crate::config::{HeapGrowth, MemoryConfig};
use crate::memory::fifo::FifoQueue;
use crate::memory::phys::{self, SharedPhysMem};
use crate::memory::pte::{Pte, PteState};
use crate::memory::vma::{Growth, VirtualMemoryArea, DATA_VMA, HEAP_VMA};
use crate::memory::{
    MemError, MemResult, MemStats, ProcessId, MAX_RAM_FRAMES, MAX_REGIONS, MAX_SWAP_FRAMES,
};

/// The simulator models a single swap device.
const SWAP_TYPE: u32 = 0;

/// A live entry of the region table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RegionEntry {
    start: usize,
    end: usize,
    vma_id: usize,
}

/// Paging-based memory manager of one process.
pub struct MemoryManager {
    owner: ProcessId,
    cfg: MemoryConfig,
    /// One entry per virtual page number.
    page_table: Vec<Pte>,
    /// Variable id -> live region; `None` is the vacant sentinel.
    regions: [Option<RegionEntry>; MAX_REGIONS],
    /// Area 0 is data, area 1 is heap.
    vmas: [VirtualMemoryArea; 2],
    fifo: FifoQueue,
    ram: SharedPhysMem,
    swap: SharedPhysMem,
    stats: MemStats,
}

impl MemoryManager {
    /// Create the manager for a freshly started process.
    ///
    /// Both areas start empty: data anchored at address zero, heap at
    /// the configured anchor. The pools must use the configured page
    /// size and fit the packed page-table-entry fields.
    pub fn new(
        owner: ProcessId,
        cfg: MemoryConfig,
        ram: SharedPhysMem,
        swap: SharedPhysMem,
    ) -> MemResult<Self> {
        cfg.validate()?;
        {
            let pool = phys::lock(&ram);
            if pool.page_size() != cfg.page_size {
                return Err(MemError::InvalidConfig("RAM pool frame size differs from page_size"));
            }
            if pool.frame_count() > MAX_RAM_FRAMES {
                return Err(MemError::InvalidConfig("RAM pool larger than the frame ceiling"));
            }
        }
        {
            let pool = phys::lock(&swap);
            if pool.page_size() != cfg.page_size {
                return Err(MemError::InvalidConfig("swap pool frame size differs from page_size"));
            }
            if pool.frame_count() > MAX_SWAP_FRAMES {
                return Err(MemError::InvalidConfig("swap pool larger than the frame ceiling"));
            }
        }

        let data = VirtualMemoryArea::new(DATA_VMA, 0, Growth::Upward);
        let heap_growth = match cfg.heap_growth {
            HeapGrowth::Upward => Growth::Upward,
            HeapGrowth::Downward => Growth::Downward,
        };
        let heap = VirtualMemoryArea::new(HEAP_VMA, cfg.heap_base(), heap_growth);
        let page_table = vec![Pte::UNMAPPED; cfg.page_count()];

        Ok(Self {
            owner,
            cfg,
            page_table,
            regions: [None; MAX_REGIONS],
            vmas: [data, heap],
            fifo: FifoQueue::new(),
            ram,
            swap,
            stats: MemStats::default(),
        })
    }

    /// Owning process.
    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    /// Activity counters.
    pub fn stats(&self) -> &MemStats {
        &self.stats
    }

    /// Active configuration.
    pub fn config(&self) -> &MemoryConfig {
        &self.cfg
    }

    /// Allocate `size` bytes in the data area under `var_id`.
    pub fn alloc_data(&mut self, size: usize, var_id: usize) -> MemResult<usize> {
        self.alloc_in(DATA_VMA, size, var_id)
    }

    /// Allocate `size` bytes in the heap area under `var_id`.
    pub fn alloc_heap(&mut self, size: usize, var_id: usize) -> MemResult<usize> {
        self.alloc_in(HEAP_VMA, size, var_id)
    }

    fn alloc_in(&mut self, vma_id: usize, size: usize, var_id: usize) -> MemResult<usize> {
        if var_id >= MAX_REGIONS || size == 0 {
            return Err(MemError::InvalidHandle);
        }
        if self.regions[var_id].is_some() {
            return Err(MemError::RegionInUse);
        }

        let start = match self.vmas[vma_id].first_fit(size) {
            Some(start) => start,
            None => {
                // Nothing fits: grow the area once and retry.
                self.grow_vma(vma_id, size)?;
                self.vmas[vma_id].first_fit(size).ok_or(MemError::OutOfMemory)?
            }
        };

        debug_assert!(
            self.vmas[vma_id].contains_range(start, start + size),
            "carved region escapes its area"
        );
        self.regions[var_id] = Some(RegionEntry { start, end: start + size, vma_id });
        self.stats.allocations += 1;
        debug!(
            "pid {}: alloc var {var_id} -> [{start}, {}) in area {vma_id}",
            self.owner.as_u32(),
            start + size,
        );
        Ok(start)
    }

    /// Return the region named by `var_id` to its area's free list.
    ///
    /// The region's pages stay mapped; only [`Self::reclaim_all`]
    /// releases frames.
    pub fn free(&mut self, var_id: usize) -> MemResult<()> {
        if var_id >= MAX_REGIONS {
            return Err(MemError::InvalidHandle);
        }
        let entry = self.regions[var_id].ok_or(MemError::InvalidHandle)?;
        if self.vmas[entry.vma_id].free_list_full() {
            // Keep the region live rather than lose track of its bytes.
            return Err(MemError::OutOfMemory);
        }
        self.vmas[entry.vma_id].enlist(entry.start, entry.end)?;
        self.regions[var_id] = None;
        self.stats.frees += 1;
        debug!(
            "pid {}: free var {var_id} -> [{}, {}) back to area {}",
            self.owner.as_u32(),
            entry.start,
            entry.end,
            entry.vma_id,
        );
        Ok(())
    }

    /// Grow area `vma_id` by `requested` bytes, rounded up to the page
    /// size, mapping fresh frames for the new range.
    ///
    /// The grown byte range joins the area's free list; returns the new
    /// growth frontier. Fails with [`MemError::Overlap`] if the planned
    /// range intersects the sibling area, and never leaks frames
    /// reserved before a failure.
    pub fn grow_vma(&mut self, vma_id: usize, requested: usize) -> MemResult<usize> {
        if vma_id >= self.vmas.len() {
            return Err(MemError::InvalidHandle);
        }
        let aligned = self.cfg.align_up(requested).ok_or(MemError::OutOfMemory)?;
        if aligned == 0 {
            return Ok(self.vmas[vma_id].brk());
        }

        let (start, end) = self.vmas[vma_id].plan_growth(aligned, self.cfg.vmem_size)?;
        if self.vmas.iter().any(|v| v.id() != vma_id && v.overlaps(start, end)) {
            return Err(MemError::Overlap);
        }
        // Bookkeeping capacity checks come before any frame moves so a
        // late failure cannot strand reserved frames.
        if self.vmas[vma_id].free_list_full() {
            return Err(MemError::OutOfMemory);
        }
        let pages = aligned / self.cfg.page_size;
        if self.fifo.len() + pages > MAX_RAM_FRAMES {
            return Err(MemError::FrameExhausted);
        }

        let frames = self.reserve_frames(pages)?;
        let first_pgn = start / self.cfg.page_size;
        for (i, &fpn) in frames.iter().enumerate() {
            let pgn = first_pgn + i;
            self.page_table[pgn] = Pte::resident(fpn);
            self.fifo.record_resident(pgn as u32)?;
        }

        self.vmas[vma_id].commit_growth(aligned);
        self.vmas[vma_id].enlist(start, end)?;
        self.stats.grown_bytes += aligned as u64;
        debug!(
            "pid {}: area {vma_id} grew by {aligned} bytes, mapped pages [{first_pgn}, {})",
            self.owner.as_u32(),
            first_pgn + pages,
        );
        Ok(self.vmas[vma_id].brk())
    }

    /// Reserve `pages` RAM frames, evicting resident pages to swap when
    /// the pool is exhausted. On failure every frame reserved so far is
    /// released before the error returns.
    fn reserve_frames(&mut self, pages: usize) -> MemResult<Vec<u32>> {
        let mut frames = Vec::with_capacity(pages);
        for _ in 0..pages {
            match self.take_ram_frame() {
                Ok(fpn) => frames.push(fpn),
                Err(err) => {
                    let mut ram = phys::lock(&self.ram);
                    for fpn in frames {
                        ram.release_frame(fpn);
                    }
                    return Err(err);
                }
            }
        }
        Ok(frames)
    }

    fn take_ram_frame(&mut self) -> MemResult<u32> {
        if let Some(fpn) = phys::lock(&self.ram).acquire_frame(self.owner) {
            return Ok(fpn);
        }
        // RAM exhausted with nothing of ours resident is fatal here.
        self.swap_out_victim().map_err(|err| match err {
            MemError::NoVictim => MemError::FrameExhausted,
            other => other,
        })
    }

    /// Evict the oldest resident page to swap and return its RAM frame
    /// for direct reuse. The frame is never round-tripped through the
    /// pool, so a frame is guaranteed once a victim exists.
    fn swap_out_victim(&mut self) -> MemResult<u32> {
        let victim = self.fifo.select_victim().ok_or(MemError::NoVictim)?;
        let vic_pgn = victim as usize;
        // Queued pages are resident by invariant.
        let vic_fpn = self.page_table[vic_pgn].frame_number().ok_or(MemError::UnmappedPage)?;

        let swap_fpn = match phys::lock(&self.swap).acquire_frame(self.owner) {
            Some(fpn) => fpn,
            None => {
                self.fifo.unselect(victim);
                return Err(MemError::SwapExhausted);
            }
        };

        {
            let ram = phys::lock(&self.ram);
            let mut swap = phys::lock(&self.swap);
            swap.copy_frame_from(&ram, vic_fpn, swap_fpn);
        }
        self.page_table[vic_pgn] = Pte::swapped(SWAP_TYPE, swap_fpn);
        self.stats.evictions += 1;
        trace!(
            "pid {}: evicted page {vic_pgn} from frame {vic_fpn} to swap {swap_fpn}",
            self.owner.as_u32(),
        );
        Ok(vic_fpn)
    }

    /// Translate a virtual address to the RAM frame holding its page,
    /// faulting the page in from swap if needed.
    pub fn resolve(&mut self, vaddr: usize) -> MemResult<u32> {
        let pgn = vaddr / self.cfg.page_size;
        let pte = *self.page_table.get(pgn).ok_or(MemError::UnmappedPage)?;
        match pte.state() {
            PteState::Resident { fpn } => Ok(fpn),
            PteState::Swapped { swap_off, .. } => self.swap_in(pgn, swap_off),
            PteState::Unmapped => Err(MemError::UnmappedPage),
        }
    }

    /// Page-fault path: bring page `pgn` back from swap frame
    /// `tgt_swap` into the frame vacated by the FIFO victim.
    fn swap_in(&mut self, pgn: usize, tgt_swap: u32) -> MemResult<u32> {
        self.stats.page_faults += 1;
        let vic_fpn = self.swap_out_victim()?;

        {
            let mut ram = phys::lock(&self.ram);
            let mut swap = phys::lock(&self.swap);
            ram.copy_frame_from(&swap, tgt_swap, vic_fpn);
            swap.release_frame(tgt_swap);
        }
        self.page_table[pgn] = Pte::resident(vic_fpn);
        self.fifo.record_resident(pgn as u32)?;
        self.stats.swap_ins += 1;
        trace!(
            "pid {}: page {pgn} faulted in from swap {tgt_swap} to frame {vic_fpn}",
            self.owner.as_u32(),
        );
        Ok(vic_fpn)
    }

    /// Read the byte at a raw virtual address.
    pub fn read_byte(&mut self, vaddr: usize) -> MemResult<u8> {
        let fpn = self.resolve(vaddr)?;
        let offset = vaddr & (self.cfg.page_size - 1);
        let ram = phys::lock(&self.ram);
        Ok(ram.read_byte(ram.frame_offset(fpn, offset)))
    }

    /// Write the byte at a raw virtual address, marking the page dirty.
    pub fn write_byte(&mut self, vaddr: usize, value: u8) -> MemResult<()> {
        let fpn = self.resolve(vaddr)?;
        let pgn = vaddr / self.cfg.page_size;
        self.page_table[pgn].set_dirty();
        let offset = vaddr & (self.cfg.page_size - 1);
        let mut ram = phys::lock(&self.ram);
        let phys_offset = ram.frame_offset(fpn, offset);
        ram.write_byte(phys_offset, value);
        Ok(())
    }

    /// Read byte `offset` of the region named by `var_id`.
    pub fn read(&mut self, var_id: usize, offset: usize) -> MemResult<u8> {
        let entry = self.region(var_id)?;
        self.check_bounds(&entry, offset)?;
        self.read_byte(entry.start + offset)
    }

    /// Write byte `offset` of the region named by `var_id`.
    pub fn write(&mut self, var_id: usize, offset: usize, value: u8) -> MemResult<()> {
        let entry = self.region(var_id)?;
        self.check_bounds(&entry, offset)?;
        self.write_byte(entry.start + offset, value)
    }

    fn region(&self, var_id: usize) -> MemResult<RegionEntry> {
        if var_id >= MAX_REGIONS {
            return Err(MemError::InvalidHandle);
        }
        self.regions[var_id].ok_or(MemError::InvalidHandle)
    }

    fn check_bounds(&self, entry: &RegionEntry, offset: usize) -> MemResult<()> {
        // Historical behavior trusts the caller; the check is opt-in.
        if self.cfg.bounds_check && offset >= entry.end - entry.start {
            return Err(MemError::OutOfRange);
        }
        Ok(())
    }

    /// Release every frame this process holds, in RAM and on swap.
    ///
    /// Process-teardown path. Returns `(ram_freed, swap_freed)`;
    /// idempotent, a second call finds only unmapped entries and frees
    /// nothing.
    pub fn reclaim_all(&mut self) -> (usize, usize) {
        let mut ram_freed = 0;
        let mut swap_freed = 0;
        {
            let mut ram = phys::lock(&self.ram);
            let mut swap = phys::lock(&self.swap);
            for pte in self.page_table.iter_mut() {
                match pte.state() {
                    PteState::Resident { fpn } => {
                        ram.release_frame(fpn);
                        ram_freed += 1;
                    }
                    PteState::Swapped { swap_off, .. } => {
                        swap.release_frame(swap_off);
                        swap_freed += 1;
                    }
                    PteState::Unmapped => {}
                }
                *pte = Pte::UNMAPPED;
            }
        }
        self.fifo.clear();
        self.regions = [None; MAX_REGIONS];
        for vma in &mut self.vmas {
            vma.clear();
        }
        debug!(
            "pid {}: reclaimed {ram_freed} RAM and {swap_freed} swap frames",
            self.owner.as_u32(),
        );
        (ram_freed, swap_freed)
    }

    /// Residency of virtual page `pgn`; inspection surface for dump
    /// tooling and tests.
    pub fn page_state(&self, pgn: usize) -> PteState {
        self.page_table.get(pgn).copied().unwrap_or(Pte::UNMAPPED).state()
    }

    /// Whether virtual page `pgn` has been written since it became
    /// resident.
    pub fn page_dirty(&self, pgn: usize) -> bool {
        self.page_table.get(pgn).copied().unwrap_or(Pte::UNMAPPED).is_dirty()
    }

    /// `(start, end, vma_id)` of the live region named by `var_id`.
    pub fn region_bounds(&self, var_id: usize) -> Option<(usize, usize, usize)> {
        self.regions
            .get(var_id)
            .copied()
            .flatten()
            .map(|e| (e.start, e.end, e.vma_id))
    }

    /// Current `[lower, upper)` extent of an area.
    pub fn vma_bounds(&self, vma_id: usize) -> (usize, usize) {
        (self.vmas[vma_id].lower(), self.vmas[vma_id].upper())
    }

    /// Length of an area's free-region list.
    pub fn free_region_count(&self, vma_id: usize) -> usize {
        self.vmas[vma_id].free_regions().len()
    }

    /// Number of this process's pages currently resident in RAM.
    pub fn resident_pages(&self) -> usize {
        self.fifo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::phys::PhysMem;

    fn manager(cfg: MemoryConfig) -> MemoryManager {
        let ram = PhysMem::new(cfg.ram_frames, cfg.page_size).into_shared();
        let swap = PhysMem::new(cfg.swap_frames, cfg.page_size).into_shared();
        MemoryManager::new(ProcessId::new(1), cfg, ram, swap).unwrap()
    }

    #[test]
    fn alloc_grows_the_area_and_maps_pages() {
        let mut mm = manager(MemoryConfig::default());
        let addr = mm.alloc_data(100, 0).unwrap();
        assert_eq!(addr, 0);
        // One page mapped, alignment slack left on the free list.
        assert!(matches!(mm.page_state(0), PteState::Resident { .. }));
        assert_eq!(mm.free_region_count(DATA_VMA), 1);
        assert_eq!(mm.vma_bounds(DATA_VMA), (0, 256));
    }

    #[test]
    fn alloc_on_live_id_is_rejected() {
        let mut mm = manager(MemoryConfig::default());
        mm.alloc_data(10, 3).unwrap();
        assert_eq!(mm.alloc_data(10, 3), Err(MemError::RegionInUse));
    }

    #[test]
    fn alloc_reuses_freed_bytes_without_growing() {
        let mut mm = manager(MemoryConfig::default());
        mm.alloc_data(64, 0).unwrap();
        let grown = mm.stats().grown_bytes;
        mm.free(0).unwrap();
        let addr = mm.alloc_data(64, 1).unwrap();
        assert_eq!(addr, 0);
        assert_eq!(mm.stats().grown_bytes, grown);
    }

    #[test]
    fn free_of_unknown_id_is_invalid() {
        let mut mm = manager(MemoryConfig::default());
        assert_eq!(mm.free(5), Err(MemError::InvalidHandle));
        assert_eq!(mm.free(MAX_REGIONS + 1), Err(MemError::InvalidHandle));
    }

    #[test]
    fn absurd_allocation_size_is_out_of_memory() {
        let mut mm = manager(MemoryConfig::default());
        // Sizes whose page rounding cannot even be represented must
        // fail like any other request too big for the address space.
        assert_eq!(mm.alloc_heap(usize::MAX, 0), Err(MemError::OutOfMemory));
        assert_eq!(mm.alloc_data(usize::MAX - 7, 1), Err(MemError::OutOfMemory));
        assert_eq!(mm.region_bounds(0), None);
        assert_eq!(mm.region_bounds(1), None);
    }

    #[test]
    fn zero_sized_alloc_is_invalid() {
        let mut mm = manager(MemoryConfig::default());
        assert_eq!(mm.alloc_data(0, 0), Err(MemError::InvalidHandle));
    }

    #[test]
    fn bytes_round_trip_without_eviction() {
        let mut mm = manager(MemoryConfig::default());
        mm.alloc_heap(300, 2).unwrap();
        mm.write(2, 0, 11).unwrap();
        mm.write(2, 299, 22).unwrap();
        assert_eq!(mm.read(2, 0).unwrap(), 11);
        assert_eq!(mm.read(2, 299).unwrap(), 22);
    }

    #[test]
    fn writes_mark_the_page_dirty() {
        let mut mm = manager(MemoryConfig::default());
        let addr = mm.alloc_data(16, 0).unwrap();
        let pgn = addr / mm.config().page_size;
        assert!(!mm.page_dirty(pgn));
        mm.write(0, 3, 1).unwrap();
        assert!(mm.page_dirty(pgn));
    }

    #[test]
    fn data_growth_into_grown_heap_overlaps() {
        // Upward heap anchored at vmem / 2 = 2048.
        let cfg = MemoryConfig { vmem_size: 4096, ..Default::default() };
        let mut mm = manager(cfg);
        mm.alloc_heap(1, 0).unwrap();
        // Data may fill its half...
        mm.grow_vma(DATA_VMA, 2048).unwrap();
        // ...but not cross into the heap's mapped extent.
        assert_eq!(mm.grow_vma(DATA_VMA, 1), Err(MemError::Overlap));
    }

    #[test]
    fn heap_growth_past_its_own_half_hits_the_data_area() {
        let cfg = MemoryConfig { vmem_size: 4096, ..Default::default() };
        let mut mm = manager(cfg);
        mm.grow_vma(DATA_VMA, 2048).unwrap();
        mm.grow_vma(HEAP_VMA, 2048).unwrap();
        // Heap is at the top of the address space now.
        assert_eq!(mm.grow_vma(HEAP_VMA, 1), Err(MemError::OutOfMemory));
    }

    #[test]
    fn downward_heap_allocates_descending_addresses() {
        let cfg = MemoryConfig {
            heap_growth: HeapGrowth::Downward,
            vmem_size: 4096,
            ..Default::default()
        };
        let mut mm = manager(cfg);
        let a = mm.alloc_heap(256, 0).unwrap();
        let b = mm.alloc_heap(256, 1).unwrap();
        assert_eq!(a, 4096 - 256);
        assert_eq!(b, 4096 - 512);

        mm.write(1, 255, 9).unwrap();
        assert_eq!(mm.read(1, 255).unwrap(), 9);
    }

    #[test]
    fn region_table_slots_stay_inside_their_area() {
        let mut mm = manager(MemoryConfig::default());
        mm.alloc_data(100, 0).unwrap();
        mm.alloc_heap(500, 1).unwrap();
        for var_id in [0, 1] {
            let (start, end, vma_id) = mm.region_bounds(var_id).unwrap();
            let (lower, upper) = mm.vma_bounds(vma_id);
            assert!(lower <= start && end <= upper, "region [{start}, {end}) outside area");
        }
    }

    #[test]
    fn bounds_check_rejects_overrun_when_enabled() {
        let cfg = MemoryConfig { bounds_check: true, ..Default::default() };
        let mut mm = manager(cfg);
        mm.alloc_data(10, 0).unwrap();
        assert_eq!(mm.read(0, 10), Err(MemError::OutOfRange));
        assert_eq!(mm.write(0, 10, 1), Err(MemError::OutOfRange));
        assert!(mm.write(0, 9, 1).is_ok());
    }

    #[test]
    fn rejects_mismatched_pool_page_size() {
        let cfg = MemoryConfig::default();
        let ram = PhysMem::new(cfg.ram_frames, 512).into_shared();
        let swap = PhysMem::new(cfg.swap_frames, cfg.page_size).into_shared();
        assert!(matches!(
            MemoryManager::new(ProcessId::new(1), cfg, ram, swap),
            Err(MemError::InvalidConfig(_)),
        ));
    }
}
