//! The visited-object bitmap.
//!
//! One bit per word-aligned address slot over the source region's address
//! hull, allocated from scratch. Membership testing is O(1), which is what
//! lets cycle detection avoid a hash set. The hull of a scattered chunk
//! chain can be arbitrarily wide, so construction refuses spans over
//! [`MAX_BITMAP_SPAN`]; the engine then degrades to its shallow-copy
//! fallback.

use crate::region::scratch::{Scratch, ScratchPair};
use crate::util::constants::*;
use crate::util::conversions::bytes_to_words_up;
use crate::util::memory;
use crate::util::Address;

pub struct RegionBitmap {
    base: Address,
    bits: Address,
    slots: usize,
}

impl RegionBitmap {
    /// Build a zeroed bitmap covering `[lo, hi)` in the given scratch frame.
    /// `None` when the span is over the cap or scratch is out of memory.
    pub fn create(
        pair: &mut ScratchPair,
        frame: &Scratch,
        lo: Address,
        hi: Address,
    ) -> Option<RegionBitmap> {
        debug_assert!(hi >= lo);
        let base = lo.align_down(BYTES_IN_WORD);
        let span = hi - base;
        if span > MAX_BITMAP_SPAN {
            return None;
        }
        let slots = bytes_to_words_up(span);
        let words = (slots + BITS_IN_WORD - 1) / BITS_IN_WORD;
        let bytes = std::cmp::max(words, 1) * BYTES_IN_WORD;
        let bits = pair.alloc(frame, bytes);
        if bits.is_zero() {
            return None;
        }
        memory::zero(bits, bytes);
        Some(RegionBitmap { base, bits, slots })
    }

    /// Is `addr` inside the covered hull?
    pub fn covers(&self, addr: Address) -> bool {
        addr >= self.base && self.slot_of(addr) < self.slots
    }

    fn slot_of(&self, addr: Address) -> usize {
        (addr - self.base) >> LOG_BYTES_IN_WORD
    }

    /// Mark `addr` seen; returns whether it already was.
    pub fn test_and_set(&mut self, addr: Address) -> bool {
        debug_assert!(self.covers(addr));
        let slot = self.slot_of(addr);
        let word_addr = self.bits + (slot / BITS_IN_WORD) * BYTES_IN_WORD;
        let mask = 1usize << (slot % BITS_IN_WORD);
        let word = unsafe { word_addr.load::<usize>() };
        unsafe { word_addr.store::<usize>(word | mask) };
        word & mask != 0
    }

    /// Read-only probe.
    pub fn is_set(&self, addr: Address) -> bool {
        debug_assert!(self.covers(addr));
        let slot = self.slot_of(addr);
        let word_addr = self.bits + (slot / BITS_IN_WORD) * BYTES_IN_WORD;
        let mask = 1usize << (slot % BITS_IN_WORD);
        (unsafe { word_addr.load::<usize>() }) & mask != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::options::ArenaGrowth;

    #[test]
    fn marks_are_per_word_slot() {
        let mut pair = ScratchPair::new(ArenaGrowth::Geometric, DEFAULT_SCRATCH_TRIM_THRESHOLD);
        let frame = pair.begin(None);
        let lo = unsafe { Address::from_usize(0x10000) };
        let hi = lo + 4096usize;
        let mut bitmap = RegionBitmap::create(&mut pair, &frame, lo, hi).unwrap();
        let a = lo + 64usize;
        let b = lo + 64usize + BYTES_IN_WORD;
        assert!(!bitmap.test_and_set(a));
        assert!(bitmap.test_and_set(a));
        assert!(!bitmap.is_set(b));
        assert!(!bitmap.test_and_set(b));
        assert!(bitmap.is_set(b));
        pair.end(frame);
    }

    #[test]
    fn oversized_span_is_refused() {
        let mut pair = ScratchPair::new(ArenaGrowth::Geometric, DEFAULT_SCRATCH_TRIM_THRESHOLD);
        let frame = pair.begin(None);
        let lo = unsafe { Address::from_usize(0x10000) };
        let hi = lo + MAX_BITMAP_SPAN + BYTES_IN_PAGE;
        assert!(RegionBitmap::create(&mut pair, &frame, lo, hi).is_none());
        pair.end(frame);
    }
}
