//! The arena: a chained-chunk bump allocator with snapshot/rewind, trimming,
//! and O(1) chunk splicing.
//!
//! An arena owns an ordered chain of [`Chunk`]s. Chunks up to `tail` hold
//! allocated data in allocation order; chunks after `tail` are spares kept
//! for reuse after a rewind, with their cursors reset. `trim` is what
//! actually returns spare storage to the OS, so a rewind/refill cycle (the
//! scratch pattern) does not churn the allocator.

use std::cmp::max;
use std::ptr;

use super::chunk::{Chunk, ChunkIter};
use crate::util::constants::*;
use crate::util::conversions::word_align_up;
use crate::util::options::ArenaGrowth;
use crate::util::rust_util::likely;
use crate::util::Address;

/// A snapshot of an arena's bump position. See [`Arena::snapshot`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Mark {
    chunk: *mut Chunk,
    cursor: usize,
}

impl Mark {
    /// The snapshot of an empty arena.
    pub const EMPTY: Mark = Mark {
        chunk: ptr::null_mut(),
        cursor: 0,
    };
}

/// A contiguous sub-chain detached from an arena, ready to be attached to
/// another. The chunks retain their addresses, so embedded pointers stay
/// valid across the move.
pub struct ChunkChain {
    begin: *mut Chunk,
    end: *mut Chunk,
    count: usize,
    bytes: usize,
}

pub struct Arena {
    head: *mut Chunk,
    /// The chunk currently being bumped; chunks beyond it are spares.
    tail: *mut Chunk,
    chunk_count: usize,
    /// Sum of chunk capacities, spares included.
    footprint: usize,
    next_chunk_size: usize,
    growth: ArenaGrowth,
}

impl Arena {
    pub fn new(growth: ArenaGrowth) -> Self {
        Arena {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
            chunk_count: 0,
            footprint: 0,
            next_chunk_size: MIN_CHUNK_SIZE,
            growth,
        }
    }

    /// Bump-allocate `size` bytes at word alignment. Returns `Address::ZERO`
    /// on out-of-memory.
    pub fn alloc(&mut self, size: usize) -> Address {
        self.alloc_aligned(size, MIN_ALIGNMENT)
    }

    /// Bump-allocate `size` bytes at the given power-of-two alignment.
    /// Returns `Address::ZERO` on out-of-memory.
    pub fn alloc_aligned(&mut self, size: usize, align: usize) -> Address {
        debug_assert!(align.is_power_of_two());
        let align = max(align, MIN_ALIGNMENT);
        // Zero-size requests still get a distinct word.
        let size = word_align_up(max(size, 1));

        if self.tail.is_null() && !self.head.is_null() {
            // Every chunk is a spare (possible after detaching the whole
            // active prefix); restart bumping from the head.
            self.tail = self.head;
        }
        if likely(!self.tail.is_null()) {
            if let Some(result) = unsafe { (*self.tail).try_bump(size, align) } {
                return result;
            }
            // Advance into the next spare if the request fits there. Spares
            // further along cannot be skipped to without breaking the
            // active-prefix order, so a non-fitting spare sends us to the
            // slow path.
            let next = unsafe { (*self.tail).next() };
            if !next.is_null() {
                if let Some(result) = unsafe { (*next).try_bump(size, align) } {
                    self.tail = next;
                    return result;
                }
            }
        }
        self.alloc_slow(size, align)
    }

    #[cold]
    fn alloc_slow(&mut self, size: usize, align: usize) -> Address {
        // Worst case we burn `align` bytes of pad at the chunk start.
        let request_extent = size + align;
        let chunk_size = match self.growth {
            ArenaGrowth::Geometric => {
                if request_extent > MAX_CHUNK_SIZE {
                    // Oversize requests get a dedicated, exactly-sized chunk.
                    request_extent
                } else {
                    while self.next_chunk_size < request_extent {
                        self.next_chunk_size *= 2;
                    }
                    let selected = self.next_chunk_size;
                    self.next_chunk_size =
                        crate::util::rust_util::min_of_usize(selected * 2, MAX_CHUNK_SIZE);
                    selected
                }
            }
            ArenaGrowth::Fixed => max(FIXED_CHUNK_SIZE, request_extent),
        };

        let chunk = Chunk::create(chunk_size);
        if chunk.is_null() {
            return Address::ZERO;
        }
        unsafe {
            if self.tail.is_null() {
                debug_assert!(self.head.is_null());
                self.head = chunk;
            } else {
                // Insert between the tail and any non-fitting spares.
                (*chunk).set_next((*self.tail).next());
                (*self.tail).set_next(chunk);
            }
            self.tail = chunk;
            self.chunk_count += 1;
            self.footprint += (*chunk).capacity();
            // Guaranteed to fit in the fresh chunk.
            (*chunk).try_bump(size, align).unwrap_or(Address::ZERO)
        }
    }

    /// Give a fresh arena a single dedicated chunk sized for exactly `bytes`
    /// of word-aligned data. Returns false on out-of-memory.
    pub fn reserve_exact(&mut self, bytes: usize) -> bool {
        debug_assert!(bytes > 0);
        debug_assert!(self.head.is_null(), "reserve_exact applies to fresh arenas");
        let chunk = Chunk::create(word_align_up(bytes) + MIN_ALIGNMENT);
        if chunk.is_null() {
            return false;
        }
        self.head = chunk;
        self.tail = chunk;
        self.chunk_count = 1;
        self.footprint = unsafe { (*chunk).capacity() };
        true
    }

    /// Capture the current bump position. A snapshot of an empty arena is
    /// [`Mark::EMPTY`].
    pub fn snapshot(&self) -> Mark {
        if self.tail.is_null() {
            return Mark::EMPTY;
        }
        Mark {
            chunk: self.tail,
            cursor: unsafe { (*self.tail).used() },
        }
    }

    /// Release everything allocated after `mark`. Chunks past the mark are
    /// kept as spares with their cursors reset; [`Arena::trim`] returns them
    /// to the OS. A rewind on an empty arena is a no-op.
    ///
    /// The caller must guarantee no frame started before the mark is still
    /// live (the scratch layer enforces this with its LIFO discipline).
    pub fn rewind(&mut self, mark: Mark) {
        if self.head.is_null() {
            debug_assert!(mark == Mark::EMPTY);
            return;
        }
        #[cfg(feature = "extreme_assertions")]
        if !mark.chunk.is_null() {
            assert!(
                ChunkIter::from(self.head).any(|c| c == mark.chunk),
                "rewind mark does not belong to this arena"
            );
        }
        if mark.chunk.is_null() {
            for chunk in ChunkIter::from(self.head) {
                unsafe { (*chunk).reset_to(0) };
            }
            self.tail = self.head;
            return;
        }
        unsafe {
            for chunk in ChunkIter::from((*mark.chunk).next()) {
                (*chunk).reset_to(0);
            }
            (*mark.chunk).reset_to(mark.cursor);
        }
        self.tail = mark.chunk;
    }

    /// Return unused storage to the OS: the spare chain beyond the tail and,
    /// when the arena is completely empty, every chunk.
    pub fn trim(&mut self) {
        if self.head.is_null() {
            return;
        }
        let empty = self.tail == self.head && unsafe { (*self.head).used() } == 0;
        if empty {
            self.free();
            return;
        }
        let mut spare = unsafe { (*self.tail).next() };
        unsafe { (*self.tail).set_next(ptr::null_mut()) };
        while !spare.is_null() {
            unsafe {
                let next = (*spare).next();
                debug_assert_eq!((*spare).used(), 0);
                self.chunk_count -= 1;
                self.footprint -= (*spare).capacity();
                Chunk::destroy(spare);
                spare = next;
            }
        }
    }

    /// Release every chunk and reset the arena to its created state.
    pub fn free(&mut self) {
        let mut chunk = self.head;
        while !chunk.is_null() {
            unsafe {
                let next = (*chunk).next();
                Chunk::destroy(chunk);
                chunk = next;
            }
        }
        self.head = ptr::null_mut();
        self.tail = ptr::null_mut();
        self.chunk_count = 0;
        self.footprint = 0;
        self.next_chunk_size = MIN_CHUNK_SIZE;
    }

    /// Detach the inclusive chunk range `[begin, end]` from this arena.
    /// Detaching from the head is O(1); otherwise the predecessor is found by
    /// a chain walk. Returns `None` if `begin` is not in this arena.
    pub fn detach_chunks(&mut self, begin: *mut Chunk, end: *mut Chunk) -> Option<ChunkChain> {
        debug_assert!(!begin.is_null() && !end.is_null());
        let mut pred: *mut Chunk = ptr::null_mut();
        if begin != self.head {
            let mut cursor = self.head;
            while !cursor.is_null() && unsafe { (*cursor).next() } != begin {
                cursor = unsafe { (*cursor).next() };
            }
            if cursor.is_null() {
                return None;
            }
            pred = cursor;
        }

        let mut count = 0;
        let mut bytes = 0;
        let mut tail_in_range = false;
        let mut cursor = begin;
        loop {
            debug_assert!(!cursor.is_null(), "detach range is not contiguous");
            count += 1;
            bytes += unsafe { (*cursor).capacity() };
            if cursor == self.tail {
                tail_in_range = true;
            }
            if cursor == end {
                break;
            }
            cursor = unsafe { (*cursor).next() };
        }

        let after = unsafe { (*end).next() };
        if pred.is_null() {
            self.head = after;
        } else {
            unsafe { (*pred).set_next(after) };
        }
        if tail_in_range {
            // The spares after the range (if any) stay spares.
            self.tail = pred;
        }
        unsafe { (*end).set_next(ptr::null_mut()) };
        self.chunk_count -= count;
        self.footprint -= bytes;
        Some(ChunkChain {
            begin,
            end,
            count,
            bytes,
        })
    }

    /// Attach a detached chain after this arena's tail. The chain's chunks
    /// keep their addresses and their cursors; the chain's last chunk becomes
    /// the new bump target.
    pub fn attach_chunks(&mut self, chain: ChunkChain) {
        unsafe {
            if self.tail.is_null() {
                debug_assert!(self.head.is_null());
                self.head = chain.begin;
            } else {
                (*chain.end).set_next((*self.tail).next());
                (*self.tail).set_next(chain.begin);
            }
            self.tail = chain.end;
        }
        self.chunk_count += chain.count;
        self.footprint += chain.bytes;
    }

    /// Find the chunk whose data area contains `addr`.
    pub fn chunk_of(&self, addr: Address) -> *mut Chunk {
        for chunk in ChunkIter::from(self.head) {
            if unsafe { (*chunk).contains(addr) } {
                return chunk;
            }
        }
        ptr::null_mut()
    }

    /// The lowest data address and one past the highest, over all chunks.
    /// `None` when the arena is empty.
    pub fn address_hull(&self) -> Option<(Address, Address)> {
        let mut hull: Option<(Address, Address)> = None;
        for chunk in ChunkIter::from(self.head) {
            let (start, end) = unsafe { ((*chunk).data_start(), (*chunk).data_end()) };
            hull = Some(match hull {
                None => (start, end),
                Some((lo, hi)) => (if start < lo { start } else { lo }, if end > hi { end } else { hi }),
            });
        }
        hull
    }

    /// Is the active part of this arena a single chunk? This is the shape the
    /// transmigration splice fast path requires.
    pub fn is_single_chunk(&self) -> bool {
        !self.head.is_null() && self.head == self.tail
    }

    pub fn head(&self) -> *mut Chunk {
        self.head
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Total chunk capacity held by this arena, spares included.
    pub fn footprint(&self) -> usize {
        self.footprint
    }

    /// Bytes currently allocated out of this arena.
    pub fn used_bytes(&self) -> usize {
        ChunkIter::from(self.head)
            .map(|c| unsafe { (*c).used() })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.used_bytes() == 0
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> Arena {
        Arena::new(ArenaGrowth::Geometric)
    }

    #[test]
    fn alloc_is_word_aligned() {
        let mut a = arena();
        let p = a.alloc(3);
        let q = a.alloc(3);
        assert!(p.is_aligned_to(MIN_ALIGNMENT));
        assert!(q.is_aligned_to(MIN_ALIGNMENT));
        assert_eq!(q, p + BYTES_IN_WORD);
    }

    #[test]
    fn growth_chains_chunks() {
        let mut a = arena();
        for _ in 0..1024 {
            assert!(!a.alloc(64).is_zero());
        }
        assert!(a.chunk_count() > 1);
        assert!(a.used_bytes() >= 1024 * 64);
    }

    #[test]
    fn oversize_gets_dedicated_chunk() {
        let mut a = arena();
        let before = a.chunk_count();
        let p = a.alloc(2 * MAX_CHUNK_SIZE);
        assert!(!p.is_zero());
        assert_eq!(a.chunk_count(), before + 1);
    }

    #[test]
    fn snapshot_rewind_reuses_storage() {
        let mut a = arena();
        let mark = a.snapshot();
        assert_eq!(mark, Mark::EMPTY);
        let p = a.alloc(1 << 16);
        assert!(!p.is_zero());
        let footprint = a.footprint();
        a.rewind(mark);
        assert!(a.is_empty());
        // Chunks are kept as spares until trimmed.
        assert_eq!(a.footprint(), footprint);
        let q = a.alloc(1 << 16);
        assert!(!q.is_zero());
        assert_eq!(a.footprint(), footprint);
    }

    #[test]
    fn rewind_mid_chunk() {
        let mut a = arena();
        let p = a.alloc(32);
        let mark = a.snapshot();
        a.alloc(32);
        a.alloc(32);
        a.rewind(mark);
        assert_eq!(a.used_bytes(), 32);
        let q = a.alloc(32);
        // Bump position is back where the mark was taken.
        assert_eq!(q, p + 32usize);
    }

    #[test]
    fn rewind_empty_is_noop() {
        let mut a = arena();
        a.rewind(Mark::EMPTY);
        assert!(a.is_empty());
        assert_eq!(a.chunk_count(), 0);
    }

    #[test]
    fn trim_releases_spares() {
        let mut a = arena();
        let mark = a.snapshot();
        for _ in 0..64 {
            a.alloc(MIN_CHUNK_SIZE / 2);
        }
        a.rewind(mark);
        a.trim();
        assert_eq!(a.chunk_count(), 0);
        assert_eq!(a.footprint(), 0);
    }

    #[test]
    fn trim_keeps_live_data() {
        let mut a = arena();
        let p = a.alloc(64);
        unsafe { p.store::<u64>(0xdead_beef) };
        let mark = a.snapshot();
        for _ in 0..64 {
            a.alloc(MIN_CHUNK_SIZE / 2);
        }
        a.rewind(mark);
        a.trim();
        assert!(a.chunk_count() >= 1);
        assert_eq!(unsafe { p.load::<u64>() }, 0xdead_beef);
    }

    #[test]
    fn detach_attach_moves_chunks() {
        let mut src = arena();
        let p = src.alloc(128);
        unsafe { p.store::<u64>(42) };
        assert!(src.is_single_chunk());
        let head = src.head();

        let mut dst = arena();
        dst.alloc(16);
        let chain = src.detach_chunks(head, head).unwrap();
        dst.attach_chunks(chain);

        assert_eq!(src.chunk_count(), 0);
        assert!(src.head().is_null());
        assert_eq!(dst.chunk_count(), 2);
        // The moved chunk kept its address and contents.
        assert_eq!(unsafe { p.load::<u64>() }, 42);
        assert_eq!(dst.chunk_of(p), head);
        // The destination keeps allocating from the attached chunk.
        let q = dst.alloc(8);
        assert!(!q.is_zero());
        assert_eq!(dst.chunk_of(q), head);
    }

    #[test]
    fn disjoint_detaches_compose() {
        let mut src = arena();
        // Two dedicated oversize chunks.
        let p = src.alloc(2 * MAX_CHUNK_SIZE);
        let q = src.alloc(2 * MAX_CHUNK_SIZE);
        unsafe {
            p.store::<u64>(1);
            q.store::<u64>(2);
        }
        assert_eq!(src.chunk_count(), 2);
        let first = src.head();
        let mut dst = arena();

        let chain = src.detach_chunks(first, first).unwrap();
        dst.attach_chunks(chain);
        let second = src.head();
        let chain = src.detach_chunks(second, second).unwrap();
        dst.attach_chunks(chain);

        assert_eq!(src.chunk_count(), 0);
        assert_eq!(dst.chunk_count(), 2);
        assert_eq!(dst.chunk_of(p), first);
        assert_eq!(dst.chunk_of(q), second);
        assert_eq!(unsafe { p.load::<u64>() }, 1);
        assert_eq!(unsafe { q.load::<u64>() }, 2);
    }

    #[test]
    fn detach_foreign_chunk_fails() {
        let mut a = arena();
        a.alloc(8);
        let mut b = arena();
        b.alloc(8);
        let foreign = b.head();
        assert!(a.detach_chunks(foreign, foreign).is_none());
    }

    #[test]
    fn address_hull_covers_all_chunks() {
        let mut a = arena();
        let mut lo = Address::ZERO;
        let mut hi = Address::ZERO;
        for i in 0..256 {
            let p = a.alloc(1024);
            if i == 0 || p < lo {
                lo = p;
            }
            if p + 1024usize > hi {
                hi = p + 1024usize;
            }
        }
        let (hull_lo, hull_hi) = a.address_hull().unwrap();
        assert!(hull_lo <= lo);
        assert!(hull_hi >= hi);
    }
}
