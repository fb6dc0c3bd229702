//! Physical frame pools.
//!
//! A [`PhysMem`] is one physical storage device of the simulator: a
//! fixed array of frames with byte-level read/write, a free-frame list
//! and a used-frame list tagged with the owning process. Two
//! independent instances exist, one for RAM and one for the swap
//! device; they never share frame numbers.
//!
//! Frame numbers are a cross-process resource, so a pool shared between
//! scheduling threads lives behind a [`Mutex`] ([`SharedPhysMem`]).
//! Exhaustion is reported, never retried here: the caller decides the
//! fallback (RAM exhausted usually means "try eviction").

use std::sync::{Arc, Mutex, MutexGuard};

use crate::memory::ProcessId;

/// A frame pool behind its mutual-exclusion boundary.
pub type SharedPhysMem = Arc<Mutex<PhysMem>>;

/// A frame currently handed out to a memory manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedFrame {
    /// Frame number within this pool.
    pub fpn: u32,
    /// Process whose page table currently targets the frame.
    pub owner: ProcessId,
}

/// Fixed-capacity physical storage device with its frame free list.
#[derive(Debug)]
pub struct PhysMem {
    page_size: usize,
    frame_count: usize,
    bytes: Vec<u8>,
    free_frames: Vec<u32>,
    used_frames: Vec<UsedFrame>,
}

impl PhysMem {
    /// Create a pool of `frame_count` zeroed frames of `page_size` bytes.
    pub fn new(frame_count: usize, page_size: usize) -> Self {
        debug_assert!(page_size.is_power_of_two());
        Self {
            page_size,
            frame_count,
            bytes: vec![0; frame_count * page_size],
            // Filled in reverse so frames are handed out in ascending order.
            free_frames: (0..frame_count as u32).rev().collect(),
            used_frames: Vec::with_capacity(frame_count),
        }
    }

    /// Wrap a pool in its sharing boundary.
    pub fn into_shared(self) -> SharedPhysMem {
        Arc::new(Mutex::new(self))
    }

    /// Frame size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total number of frames in the pool.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of frames currently free.
    pub fn free_frames(&self) -> usize {
        self.free_frames.len()
    }

    /// Take a free frame, tagging it with its new owner.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn acquire_frame(&mut self, owner: ProcessId) -> Option<u32> {
        let fpn = self.free_frames.pop()?;
        self.used_frames.push(UsedFrame { fpn, owner });
        Some(fpn)
    }

    /// Return a frame to the free list.
    pub fn release_frame(&mut self, fpn: u32) {
        debug_assert!(!self.free_frames.contains(&fpn), "double release of frame {fpn}");
        if let Some(pos) = self.used_frames.iter().position(|f| f.fpn == fpn) {
            self.used_frames.swap_remove(pos);
        }
        self.free_frames.push(fpn);
    }

    /// Release every frame tagged with `owner`, returning the count.
    ///
    /// Bulk reclamation path for process teardown.
    pub fn release_owned(&mut self, owner: ProcessId) -> usize {
        let mut freed = 0;
        while let Some(pos) = self.used_frames.iter().position(|f| f.owner == owner) {
            let frame = self.used_frames.swap_remove(pos);
            self.free_frames.push(frame.fpn);
            freed += 1;
        }
        freed
    }

    /// Read one byte at a linear physical offset.
    pub fn read_byte(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    /// Write one byte at a linear physical offset.
    pub fn write_byte(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    /// Linear offset of byte `offset` inside frame `fpn`.
    pub fn frame_offset(&self, fpn: u32, offset: usize) -> usize {
        debug_assert!(offset < self.page_size);
        fpn as usize * self.page_size + offset
    }

    /// Copy frame `src_fpn` of `src` byte-for-byte into frame `dst_fpn`
    /// of this pool. The pools must share a frame size.
    pub fn copy_frame_from(&mut self, src: &PhysMem, src_fpn: u32, dst_fpn: u32) {
        debug_assert_eq!(self.page_size, src.page_size);
        let src_base = src.frame_offset(src_fpn, 0);
        let dst_base = self.frame_offset(dst_fpn, 0);
        let from = &src.bytes[src_base..src_base + src.page_size];
        self.bytes[dst_base..dst_base + self.page_size].copy_from_slice(from);
    }
}

/// Lock a shared pool, recovering the guard if a test thread panicked
/// while holding it.
pub(crate) fn lock(pool: &SharedPhysMem) -> MutexGuard<'_, PhysMem> {
    pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: ProcessId = ProcessId::new(7);

    #[test]
    fn acquires_frames_in_ascending_order() {
        let mut pool = PhysMem::new(3, 256);
        assert_eq!(pool.acquire_frame(OWNER), Some(0));
        assert_eq!(pool.acquire_frame(OWNER), Some(1));
        assert_eq!(pool.acquire_frame(OWNER), Some(2));
        assert_eq!(pool.acquire_frame(OWNER), None);
    }

    #[test]
    fn release_makes_frame_reusable() {
        let mut pool = PhysMem::new(1, 256);
        let fpn = pool.acquire_frame(OWNER).unwrap();
        assert_eq!(pool.acquire_frame(OWNER), None);
        pool.release_frame(fpn);
        assert_eq!(pool.acquire_frame(OWNER), Some(fpn));
    }

    #[test]
    fn release_owned_frees_only_that_owner() {
        let other = ProcessId::new(9);
        let mut pool = PhysMem::new(4, 256);
        pool.acquire_frame(OWNER).unwrap();
        pool.acquire_frame(other).unwrap();
        pool.acquire_frame(OWNER).unwrap();

        assert_eq!(pool.release_owned(OWNER), 2);
        assert_eq!(pool.free_frames(), 3);
        assert_eq!(pool.release_owned(OWNER), 0);
    }

    #[test]
    fn bytes_round_trip_through_frame_offsets() {
        let mut pool = PhysMem::new(2, 256);
        let off = pool.frame_offset(1, 10);
        pool.write_byte(off, 0xAB);
        assert_eq!(pool.read_byte(off), 0xAB);
    }

    #[test]
    fn copy_frame_moves_whole_page_between_pools() {
        let mut ram = PhysMem::new(2, 16);
        let mut swap = PhysMem::new(2, 16);
        for i in 0..16 {
            ram.write_byte(ram.frame_offset(1, i), i as u8);
        }
        swap.copy_frame_from(&ram, 1, 0);
        for i in 0..16 {
            assert_eq!(swap.read_byte(swap.frame_offset(0, i)), i as u8);
        }
    }
}
