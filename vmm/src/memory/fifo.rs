//! FIFO victim selection.
//!
//! A queue of resident virtual page numbers in admission order. This is
//! FIFO replacement, not LRU: the page evicted is the one resident the
//! longest, regardless of how recently it was touched. Deterministic
//! and simple, as the simulator wants.

use heapless::Deque;

use crate::memory::{MemError, MemResult, MAX_RAM_FRAMES};

/// Queue of resident pages in admission order.
///
/// A page number appears at most once while resident: it is pushed when
/// its page becomes resident and popped when the page is chosen as
/// victim. Capacity matches the RAM pool ceiling, since there can never
/// be more resident pages than RAM frames.
#[derive(Debug, Default)]
pub struct FifoQueue {
    pages: Deque<u32, MAX_RAM_FRAMES>,
}

impl FifoQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { pages: Deque::new() }
    }

    /// Record `pgn` as newly resident, at the queue tail.
    pub fn record_resident(&mut self, pgn: u32) -> MemResult<()> {
        debug_assert!(!self.pages.iter().any(|&p| p == pgn), "page {pgn} already queued");
        // Overflow would mean more resident pages than the frame
        // ceiling allows, so the bookkeeping is already broken.
        self.pages.push_back(pgn).map_err(|_| MemError::FrameExhausted)
    }

    /// Remove and return the oldest resident page.
    ///
    /// `None` only when nothing is resident, which callers surface as
    /// [`MemError::NoVictim`].
    pub fn select_victim(&mut self) -> Option<u32> {
        self.pages.pop_front()
    }

    /// Put a just-selected victim back at the head.
    ///
    /// Used when eviction fails after selection (swap pool exhausted)
    /// so the failed operation leaves the queue untouched.
    pub fn unselect(&mut self, pgn: u32) {
        // Head insertion restores the exact pre-selection order; the
        // queue cannot be full here because the entry was just popped.
        let _ = self.pages.push_front(pgn);
    }

    /// Number of resident pages tracked.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Forget every tracked page; teardown path.
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
