//! The `(old, new)` remap table: a growable scratch array, linearly
//! searched. The bitmap answers "seen?"; this answers "where did it go?".

use crate::region::scratch::{Scratch, ScratchPair};
use crate::util::Address;

#[repr(C)]
#[derive(Copy, Clone)]
struct RemapPair {
    old: Address,
    new: Address,
}

pub struct RemapTable {
    entries: Address,
    len: usize,
    cap: usize,
}

impl RemapTable {
    pub fn new() -> Self {
        RemapTable {
            entries: Address::ZERO,
            len: 0,
            cap: 0,
        }
    }

    /// Record `old → new`. Growth doubles into fresh scratch storage (bump
    /// arenas have no realloc; the abandoned generation is reclaimed with
    /// the frame). Returns false on scratch exhaustion.
    pub fn push(
        &mut self,
        pair: &mut ScratchPair,
        frame: &Scratch,
        old: Address,
        new: Address,
    ) -> bool {
        if self.len == self.cap {
            let new_cap = std::cmp::max(self.cap * 2, 32);
            let storage = pair.alloc(frame, new_cap * std::mem::size_of::<RemapPair>());
            if storage.is_zero() {
                return false;
            }
            if self.len > 0 {
                crate::util::memory::copy(
                    self.entries,
                    storage,
                    self.len * std::mem::size_of::<RemapPair>(),
                );
            }
            self.entries = storage;
            self.cap = new_cap;
        }
        unsafe {
            self.entries
                .shift::<RemapPair>(self.len as isize)
                .store(RemapPair { old, new })
        };
        self.len += 1;
        true
    }

    /// Linear lookup of a recorded destination.
    pub fn lookup(&self, old: Address) -> Option<Address> {
        for i in 0..self.len {
            let entry = unsafe { self.entries.shift::<RemapPair>(i as isize).load::<RemapPair>() };
            if entry.old == old {
                return Some(entry.new);
            }
        }
        None
    }

    /// The number of objects relocated so far. Callers use this to verify an
    /// all-or-nothing transmigration actually copied everything.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::DEFAULT_SCRATCH_TRIM_THRESHOLD;
    use crate::util::options::ArenaGrowth;

    #[test]
    fn push_lookup_growth() {
        let mut pair = ScratchPair::new(ArenaGrowth::Geometric, DEFAULT_SCRATCH_TRIM_THRESHOLD);
        let frame = pair.begin(None);
        let mut table = RemapTable::new();
        for i in 1..200usize {
            let old = unsafe { Address::from_usize(i * 64) };
            let new = unsafe { Address::from_usize(0x7000_0000 + i * 64) };
            assert!(table.push(&mut pair, &frame, old, new));
        }
        assert_eq!(table.len(), 199);
        let probe = unsafe { Address::from_usize(64 * 57) };
        assert_eq!(
            table.lookup(probe),
            Some(unsafe { Address::from_usize(0x7000_0000 + 64 * 57) })
        );
        assert!(table.lookup(unsafe { Address::from_usize(7) }).is_none());
        pair.end(frame);
    }
}
