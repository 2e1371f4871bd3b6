//! The per-thread tether cache.
//!
//! A tether is a scoped borrow of a region: while a thread holds one, the
//! region's storage cannot be reclaimed even after its scope exits. Repeated
//! borrows of the same region by one thread are common (every callee that
//! receives a borrowed value re-tethers it), so the cache keeps a small
//! association of region → local count and only touches the region's atomic
//! word on the first start and the last end. When the cache is full,
//! additional regions fall back to uncoalesced atomic counting; nesting
//! still balances.

use std::ptr;

use super::Region;
use crate::util::constants::TETHER_CACHE_SIZE;

#[derive(Copy, Clone)]
struct TetherEntry {
    region: *mut Region,
    count: usize,
}

pub struct TetherCache {
    entries: [TetherEntry; TETHER_CACHE_SIZE],
}

impl Default for TetherCache {
    fn default() -> Self {
        TetherCache {
            entries: [TetherEntry {
                region: ptr::null_mut(),
                count: 0,
            }; TETHER_CACHE_SIZE],
        }
    }
}

impl TetherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a tether on `region`. The first borrow of a region through this
    /// cache performs the atomic increment; coalesced re-borrows only bump
    /// the local count.
    pub fn start(&mut self, region: *mut Region) {
        debug_assert!(!region.is_null());
        let mut free_slot = None;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.region == region {
                entry.count += 1;
                return;
            }
            if entry.region.is_null() && free_slot.is_none() {
                free_slot = Some(i);
            }
        }
        match free_slot {
            Some(i) => {
                Region::tether_start_raw(region);
                self.entries[i] = TetherEntry { region, count: 1 };
            }
            None => {
                // Cache full: uncoalesced semantics for this region.
                Region::tether_start_raw(region);
            }
        }
    }

    /// End a tether on `region`. The last coalesced borrow performs the
    /// atomic decrement, which may destroy a draining region.
    pub fn end(&mut self, region: *mut Region) {
        debug_assert!(!region.is_null());
        for entry in self.entries.iter_mut() {
            if entry.region == region {
                debug_assert!(entry.count > 0);
                entry.count -= 1;
                if entry.count == 0 {
                    entry.region = ptr::null_mut();
                    Region::tether_end_raw(region);
                }
                return;
            }
        }
        // Started while the cache was full.
        Region::tether_end_raw(region);
    }

    /// Number of distinct regions currently cached.
    pub fn occupancy(&self) -> usize {
        self.entries.iter().filter(|e| !e.region.is_null()).count()
    }

    /// True when no tether is held through this cache.
    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }
}
