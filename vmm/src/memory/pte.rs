//! Page table entry codec.
//!
//! Each virtual page is described by one packed 32-bit entry:
//!
//! ```text
//! 31       30       29      25..5        4..0
//! PRESENT  SWAPPED  DIRTY   swap offset  swap type
//!                           12..0 frame number (resident form)
//! ```
//!
//! The frame-number field shares bits with the swap fields; which one
//! is meaningful depends on the flag bits. Entries are therefore only
//! built through [`Pte::resident`] and [`Pte::swapped`], which encode
//! from zero and so can never leak a stale frame number or swap
//! location, and decoded through [`Pte::state`]. A swapped page keeps
//! `PRESENT` set: it is still mapped, just not in RAM.

use bitflags::bitflags;
use static_assertions::const_assert;

use crate::memory::{MAX_RAM_FRAMES, MAX_SWAP_FRAMES};

/// Width of the frame-number field.
pub const FPN_BITS: u32 = 13;
/// Width of the swap-type field.
pub const SWPTYP_BITS: u32 = 5;
/// Width of the swap-offset field.
pub const SWPOFF_BITS: u32 = 21;

const FPN_MASK: u32 = (1 << FPN_BITS) - 1;
const SWPTYP_MASK: u32 = (1 << SWPTYP_BITS) - 1;
const SWPOFF_SHIFT: u32 = SWPTYP_BITS;
const SWPOFF_MASK: u32 = ((1 << SWPOFF_BITS) - 1) << SWPOFF_SHIFT;

// The configurable pool ceilings must stay addressable by the fields.
const_assert!(MAX_RAM_FRAMES <= 1usize << FPN_BITS);
const_assert!(MAX_SWAP_FRAMES <= 1usize << SWPOFF_BITS);
// Fields may not spill into the flag bits.
const_assert!(SWPTYP_BITS + SWPOFF_BITS <= 29);
const_assert!(FPN_BITS <= 29);

bitflags! {
    /// Flag bits of a page table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        /// Page has a known backing location (RAM or swap).
        const PRESENT = 1 << 31;
        /// Page lives on the swap device, not in RAM.
        const SWAPPED = 1 << 30;
        /// Page has been written since it became resident.
        const DIRTY = 1 << 29;
    }
}

/// Decoded residency of a virtual page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PteState {
    /// No backing location at all.
    Unmapped,
    /// In RAM at the given frame number.
    Resident {
        /// RAM frame holding the page.
        fpn: u32,
    },
    /// On the swap device.
    Swapped {
        /// Swap device id (a single device in this simulator).
        swap_type: u32,
        /// Frame number within the swap pool.
        swap_off: u32,
    },
}

/// One packed page table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pte(u32);

impl Pte {
    /// Entry of a page with no backing location.
    pub const UNMAPPED: Pte = Pte(0);

    /// Encode a page resident in RAM frame `fpn`.
    ///
    /// Clears any swap state and the dirty bit.
    pub fn resident(fpn: u32) -> Self {
        debug_assert!(fpn <= FPN_MASK, "frame number {fpn} exceeds the field width");
        Pte(PteFlags::PRESENT.bits() | (fpn & FPN_MASK))
    }

    /// Encode a page living on the swap device.
    ///
    /// The entry stays `PRESENT` (the page is still mapped) and carries
    /// no frame number.
    pub fn swapped(swap_type: u32, swap_off: u32) -> Self {
        debug_assert!(swap_type <= SWPTYP_MASK);
        debug_assert!(swap_off < 1 << SWPOFF_BITS);
        Pte((PteFlags::PRESENT | PteFlags::SWAPPED).bits()
            | (swap_type & SWPTYP_MASK)
            | ((swap_off << SWPOFF_SHIFT) & SWPOFF_MASK))
    }

    fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Page has a known backing location, in RAM or on swap.
    pub fn is_mapped(self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    /// Page is in RAM right now.
    pub fn is_resident(self) -> bool {
        let flags = self.flags();
        flags.contains(PteFlags::PRESENT) && !flags.contains(PteFlags::SWAPPED)
    }

    /// Page is on the swap device.
    pub fn is_swapped(self) -> bool {
        self.flags().contains(PteFlags::PRESENT | PteFlags::SWAPPED)
    }

    /// Page has been written since it became resident.
    pub fn is_dirty(self) -> bool {
        self.flags().contains(PteFlags::DIRTY)
    }

    /// Record a write to a resident page.
    pub fn set_dirty(&mut self) {
        debug_assert!(self.is_resident(), "dirty bit only tracks resident pages");
        self.0 |= PteFlags::DIRTY.bits();
    }

    /// RAM frame number, if the page is resident.
    pub fn frame_number(self) -> Option<u32> {
        self.is_resident().then_some(self.0 & FPN_MASK)
    }

    /// Swap location `(type, offset)`, if the page is swapped.
    pub fn swap_location(self) -> Option<(u32, u32)> {
        self.is_swapped()
            .then_some((self.0 & SWPTYP_MASK, (self.0 & SWPOFF_MASK) >> SWPOFF_SHIFT))
    }

    /// Decode the residency state.
    pub fn state(self) -> PteState {
        if let Some(fpn) = self.frame_number() {
            PteState::Resident { fpn }
        } else if let Some((swap_type, swap_off)) = self.swap_location() {
            PteState::Swapped { swap_type, swap_off }
        } else {
            PteState::Unmapped
        }
    }

    /// Raw packed value, for dump tooling and tests.
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_entry_has_no_location() {
        let pte = Pte::UNMAPPED;
        assert!(!pte.is_mapped());
        assert_eq!(pte.frame_number(), None);
        assert_eq!(pte.swap_location(), None);
        assert_eq!(pte.state(), PteState::Unmapped);
    }

    #[test]
    fn resident_entry_round_trips_the_frame_number() {
        let pte = Pte::resident(42);
        assert!(pte.is_mapped());
        assert!(pte.is_resident());
        assert!(!pte.is_swapped());
        assert_eq!(pte.state(), PteState::Resident { fpn: 42 });
    }

    #[test]
    fn swapped_entry_stays_mapped_and_hides_the_frame() {
        let pte = Pte::swapped(0, 99);
        assert!(pte.is_mapped());
        assert!(pte.is_swapped());
        assert!(!pte.is_resident());
        assert_eq!(pte.frame_number(), None);
        assert_eq!(pte.state(), PteState::Swapped { swap_type: 0, swap_off: 99 });
    }

    #[test]
    fn swapping_then_residency_leaves_no_stale_swap_location() {
        // Same page: out to swap frame 7, back into RAM frame 3.
        let out = Pte::swapped(1, 7);
        assert_eq!(out.swap_location(), Some((1, 7)));

        let back = Pte::resident(3);
        assert_eq!(back.swap_location(), None);
        assert_eq!(back.frame_number(), Some(3));
    }

    #[test]
    fn residency_then_swap_exposes_no_stale_frame() {
        let resident = Pte::resident(FPN_MASK);
        assert_eq!(resident.frame_number(), Some(FPN_MASK));

        let out = Pte::swapped(0, 0);
        assert_eq!(out.frame_number(), None);
        assert_eq!(out.swap_location(), Some((0, 0)));
    }

    #[test]
    fn dirty_bit_tracks_writes_and_resets_on_reencode() {
        let mut pte = Pte::resident(5);
        assert!(!pte.is_dirty());
        pte.set_dirty();
        assert!(pte.is_dirty());
        assert_eq!(pte.frame_number(), Some(5));

        // Re-encoding (swap-out, swap-in) starts clean.
        assert!(!Pte::swapped(0, 1).is_dirty());
        assert!(!Pte::resident(5).is_dirty());
    }

    #[test]
    fn widest_swap_offset_fits() {
        let max = (1 << SWPOFF_BITS) - 1;
        let pte = Pte::swapped((1 << SWPTYP_BITS) - 1, max);
        assert_eq!(pte.swap_location(), Some(((1 << SWPTYP_BITS) - 1, max)));
    }
}
