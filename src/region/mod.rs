//! Regions: the logical owners of arena storage.
//!
//! A region couples one [`Arena`] with a small inline buffer and a packed
//! liveness word. The word carries the scope-alive flag, the external
//! reference count (from [`RegionRef`](region_ref::RegionRef)s) and the
//! tether count in a single atomic, so the transition to the dead state is a
//! single-word event observed by exactly one thread. That thread frees the
//! region; everything the region allocated goes with it.
//!
//! Lifecycle: **Alive** (scope flag set; allocation permitted) →
//! **Draining** (scope flag cleared, counters outstanding; allocation
//! forbidden) → **Dead** (word reads zero; storage released).

pub mod region_ref;
pub mod scratch;
pub mod tether;

use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::constants::*;
use crate::util::conversions::raw_align_up;
use crate::util::heap::{Arena, ChunkChain};
use crate::util::memory;
use crate::util::options::ArenaGrowth;
use crate::util::rust_util::likely;
use crate::util::Address;

/// Region allocations are aligned so that object references have three free
/// low bits for the immediate-value encoding.
pub const REGION_ALLOC_ALIGN: usize = 8;

/// The scope-alive flag in the packed liveness word.
const SCOPE_ALIVE: u64 = 1 << 63;
/// One external reference in the packed liveness word.
const RC_UNIT: u64 = 1 << 32;
/// Mask of the external reference count field.
const RC_MASK: u64 = 0x7fff_ffff << 32;
/// Mask of the tether count field.
const TETHER_MASK: u64 = 0xffff_ffff;

static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(1);

/// The inline small-object buffer. Aligned so inline objects satisfy
/// [`REGION_ALLOC_ALIGN`] from a word-aligned cursor.
#[repr(C, align(8))]
struct InlineBuffer {
    bytes: UnsafeCell<[u8; INLINE_BUFFER_SIZE]>,
}

/// A snapshot of a region's observable state, for diagnostics and tests.
/// This is the primitive other threads observe counters through.
#[derive(Debug, Clone, Copy)]
pub struct RegionStats {
    pub id: u64,
    pub scope_alive: bool,
    pub external_rc: u32,
    pub tether_count: u32,
    pub chunk_count: usize,
    pub footprint: usize,
    pub used_bytes: usize,
    pub inline_used: usize,
}

#[repr(C)]
pub struct Region {
    /// Packed `scope_alive | external_rc | tether_count`. Destroyable iff it
    /// reads zero.
    state: AtomicU64,
    id: u64,
    /// Inline bump cursor. Only the allocating thread touches it; see the
    /// Sync contract below.
    inline_cursor: Cell<usize>,
    /// Requests at or below this go to the inline buffer first.
    small_object_threshold: usize,
    arena: UnsafeCell<Arena>,
    inline: InlineBuffer,
}

// A region is shared across threads through RegionRefs and tethers, which
// only touch the atomic liveness word. Allocation and splicing are reserved
// to the thread that owns the region's scope; the substrate does not
// synchronize object mutation (callers do).
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Allocate and initialize a fresh region in the Alive state. Returns
    /// null on out-of-memory.
    pub fn create(growth: ArenaGrowth, small_object_threshold: usize) -> *mut Region {
        debug_assert!(small_object_threshold <= MAX_INLINE_OBJECT_SIZE);
        let block = memory::sys_alloc(std::mem::size_of::<Region>());
        if block.is_zero() {
            return std::ptr::null_mut();
        }
        let region = block.to_mut_ptr::<Region>();
        unsafe {
            region.write(Region {
                state: AtomicU64::new(SCOPE_ALIVE),
                id: NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed),
                inline_cursor: Cell::new(0),
                small_object_threshold,
                arena: UnsafeCell::new(Arena::new(growth)),
                inline: InlineBuffer {
                    bytes: UnsafeCell::new([0; INLINE_BUFFER_SIZE]),
                },
            });
            trace!("region {} created", (*region).id);
        }
        region
    }

    /// Create a region whose arena is pre-sized to hold exactly `bytes` of
    /// data in a single chunk. The inline buffer is disabled for such
    /// regions: they exist to be returned, and splicing can only move arena
    /// chunks, never the inline storage embedded in the region block.
    pub fn create_exact(growth: ArenaGrowth, bytes: usize) -> *mut Region {
        let region = Self::create(growth, 0);
        if !region.is_null() && bytes > 0 {
            unsafe { (*region).arena_mut() }.reserve_exact(bytes);
        }
        region
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope_alive(&self) -> bool {
        self.state.load(Ordering::Acquire) & SCOPE_ALIVE != 0
    }

    pub fn external_rc(&self) -> u32 {
        ((self.state.load(Ordering::Acquire) & RC_MASK) >> 32) as u32
    }

    pub fn tether_count(&self) -> u32 {
        (self.state.load(Ordering::Acquire) & TETHER_MASK) as u32
    }

    /// Is this region terminal: scope exited and no external references?
    /// (Tethers do not count; a terminal region's storage may still be
    /// borrowed, which is exactly the window the splice fast path uses.)
    pub fn is_terminal(&self) -> bool {
        self.state.load(Ordering::Acquire) & (SCOPE_ALIVE | RC_MASK) == 0
    }

    /// Allocate `size` bytes from this region. Requests at or below the
    /// small-object threshold are served from the inline buffer while it
    /// lasts; everything else comes from the arena. Returns `Address::ZERO`
    /// on out-of-memory. The region must be Alive.
    pub fn alloc(&self, size: usize) -> Address {
        debug_assert!(self.scope_alive(), "allocation from a draining region");
        if likely(size <= self.small_object_threshold) {
            // Zero-size requests still get a distinct slot; the inline
            // cursor advances in object-alignment steps so references keep
            // their tag bits free on every pointer width.
            let aligned = raw_align_up(std::cmp::max(size, 1), REGION_ALLOC_ALIGN);
            let cursor = self.inline_cursor.get();
            if cursor + aligned <= INLINE_BUFFER_SIZE {
                self.inline_cursor.set(cursor + aligned);
                return Address::from_ptr(self.inline.bytes.get()) + cursor;
            }
        }
        let result = unsafe { self.arena_mut() }.alloc_aligned(size, REGION_ALLOC_ALIGN);
        if result.is_zero() {
            warn!("region allocation failed: {} bytes, {:?}", size, self.stats());
        }
        result
    }

    /// Allocate with an explicit alignment. Always served by the arena.
    pub fn alloc_aligned(&self, size: usize, align: usize) -> Address {
        debug_assert!(self.scope_alive(), "allocation from a draining region");
        unsafe { self.arena_mut() }.alloc_aligned(size, align)
    }

    /// End the region's scope. The flag clears exactly once; if no external
    /// references or tethers remain, the region is destroyed here.
    ///
    /// Only the thread that owns the scope may call this.
    pub fn exit(this: *mut Region) {
        let prev = unsafe { (*this).state.fetch_and(!SCOPE_ALIVE, Ordering::SeqCst) };
        debug_assert!(prev & SCOPE_ALIVE != 0, "region exited twice");
        trace!("region {} exited (state {:#x})", unsafe { (*this).id }, prev);
        if prev == SCOPE_ALIVE {
            // The clearing thread saw both counters at zero; it owns
            // destruction.
            unsafe { Self::destroy(this) };
        }
    }

    /// Add one external reference.
    pub fn retain(this: *mut Region) {
        let prev = unsafe { (*this).state.fetch_add(RC_UNIT, Ordering::SeqCst) };
        debug_assert!(prev & RC_MASK != RC_MASK, "external_rc overflow");
    }

    /// Drop one external reference; destroys the region when the liveness
    /// word reaches zero.
    pub fn release(this: *mut Region) {
        let prev = unsafe { (*this).state.fetch_sub(RC_UNIT, Ordering::SeqCst) };
        debug_assert!(prev & RC_MASK != 0, "external_rc underflow");
        if prev == RC_UNIT {
            unsafe { Self::destroy(this) };
        }
    }

    /// Add one tether. Prefer going through the thread's
    /// [`TetherCache`](tether::TetherCache), which coalesces these.
    pub fn tether_start_raw(this: *mut Region) {
        let prev = unsafe { (*this).state.fetch_add(1, Ordering::SeqCst) };
        debug_assert!(prev & TETHER_MASK != TETHER_MASK, "tether_count overflow");
    }

    /// Drop one tether; destroys the region when the liveness word reaches
    /// zero.
    pub fn tether_end_raw(this: *mut Region) {
        let prev = unsafe { (*this).state.fetch_sub(1, Ordering::SeqCst) };
        debug_assert!(prev & TETHER_MASK != 0, "tether_count underflow");
        if prev == 1 {
            unsafe { Self::destroy(this) };
        }
    }

    /// Move the chunk range holding `[start, end]` from `src`'s arena to
    /// `dest`'s arena. The chunks keep their addresses, so object pointers
    /// into the range remain valid. Returns false if either endpoint is not
    /// arena storage of `src` (inline-buffer objects cannot be spliced).
    ///
    /// The caller must own both regions' scopes or otherwise serialize
    /// arena access.
    pub fn splice(dest: &Region, src: &Region, start: Address, end: Address) -> bool {
        let src_arena = unsafe { src.arena_mut() };
        let begin_chunk = src_arena.chunk_of(start);
        let end_chunk = src_arena.chunk_of(end);
        if begin_chunk.is_null() || end_chunk.is_null() {
            return false;
        }
        match src_arena.detach_chunks(begin_chunk, end_chunk) {
            Some(chain) => {
                unsafe { dest.arena_mut() }.attach_chunks(chain);
                trace!("spliced chunks from region {} into region {}", src.id, dest.id);
                true
            }
            None => false,
        }
    }

    /// Detach this region's single chunk, for the transmigration fast path.
    /// The caller has checked [`Self::splice_eligible`].
    pub(crate) fn detach_single_chunk(&self) -> Option<ChunkChain> {
        let arena = unsafe { self.arena_mut() };
        let head = arena.head();
        if head.is_null() {
            return None;
        }
        arena.detach_chunks(head, head)
    }

    pub(crate) fn attach_chunks(&self, chain: ChunkChain) {
        unsafe { self.arena_mut() }.attach_chunks(chain);
    }

    /// The splice fast path applies when the region is terminal, its arena
    /// data sits in one chunk, and nothing was placed in the inline buffer
    /// (inline storage lives in the region block and cannot move).
    pub(crate) fn splice_eligible(&self) -> bool {
        self.is_terminal()
            && self.inline_cursor.get() == 0
            && unsafe { &*self.arena.get() }.is_single_chunk()
    }

    /// Does this region's storage (arena or inline buffer) contain `addr`?
    pub fn contains(&self, addr: Address) -> bool {
        let inline_start = Address::from_ptr(self.inline.bytes.get());
        if addr >= inline_start && addr < inline_start + self.inline_cursor.get() {
            return true;
        }
        !unsafe { &*self.arena.get() }.chunk_of(addr).is_null()
    }

    /// The address hull of everything this region may hold a live object in.
    pub(crate) fn address_hull(&self) -> Option<(Address, Address)> {
        let arena_hull = unsafe { &*self.arena.get() }.address_hull();
        let inline_used = self.inline_cursor.get();
        let inline_hull = if inline_used > 0 {
            let start = Address::from_ptr(self.inline.bytes.get());
            Some((start, start + inline_used))
        } else {
            None
        };
        match (arena_hull, inline_hull) {
            (None, h) | (h, None) => h,
            (Some((alo, ahi)), Some((ilo, ihi))) => Some((
                if alo < ilo { alo } else { ilo },
                if ahi > ihi { ahi } else { ihi },
            )),
        }
    }

    /// One-shot observable snapshot.
    pub fn stats(&self) -> RegionStats {
        let state = self.state.load(Ordering::SeqCst);
        let arena = unsafe { &*self.arena.get() };
        RegionStats {
            id: self.id,
            scope_alive: state & SCOPE_ALIVE != 0,
            external_rc: ((state & RC_MASK) >> 32) as u32,
            tether_count: (state & TETHER_MASK) as u32,
            chunk_count: arena.chunk_count(),
            footprint: arena.footprint(),
            used_bytes: arena.used_bytes(),
            inline_used: self.inline_cursor.get(),
        }
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn arena_mut(&self) -> &mut Arena {
        &mut *self.arena.get()
    }

    /// Free the region block and its arena. Reached only from the unique
    /// thread whose transition took the liveness word to zero.
    unsafe fn destroy(this: *mut Region) {
        debug_assert_eq!((*this).state.load(Ordering::Acquire), 0);
        trace!("region {} destroyed", (*this).id);
        std::ptr::drop_in_place(this);
        memory::sys_free(Address::from_mut_ptr(this));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::options::Options;

    fn create() -> *mut Region {
        let options = Options::new();
        Region::create(*options.arena_growth, *options.small_object_threshold)
    }

    #[test]
    fn inline_then_arena() {
        let r = create();
        let region = unsafe { &*r };
        // Small requests fill the inline buffer first.
        let first = region.alloc(16);
        assert!(!first.is_zero());
        assert_eq!(region.stats().chunk_count, 0);
        // Large requests bypass it.
        let big = region.alloc(4096);
        assert!(!big.is_zero());
        assert!(region.stats().chunk_count >= 1);
        // Exhausting the buffer falls back to the arena.
        for _ in 0..(INLINE_BUFFER_SIZE / 16) {
            assert!(!region.alloc(16).is_zero());
        }
        assert!(region.stats().inline_used <= INLINE_BUFFER_SIZE);
        Region::exit(r);
    }

    #[test]
    fn alloc_alignment_leaves_tag_bits() {
        let r = create();
        let region = unsafe { &*r };
        for size in [1usize, 8, 24, 63, 65, 200] {
            let p = region.alloc(size);
            assert!(p.is_aligned_to(REGION_ALLOC_ALIGN), "size {}", size);
        }
        Region::exit(r);
    }

    #[test]
    fn exit_with_no_references_destroys() {
        let r = create();
        let region = unsafe { &*r };
        region.alloc(128);
        assert!(region.scope_alive());
        Region::exit(r);
        // r is gone; the storage went with it.
    }

    #[test]
    fn draining_region_survives_until_release() {
        let r = create();
        Region::retain(r);
        Region::exit(r);
        let region = unsafe { &*r };
        assert!(!region.scope_alive());
        assert_eq!(region.external_rc(), 1);
        assert!(!region.is_terminal());
        Region::release(r);
    }

    #[test]
    fn tether_holds_terminal_region() {
        let r = create();
        Region::tether_start_raw(r);
        Region::exit(r);
        let region = unsafe { &*r };
        assert!(region.is_terminal());
        assert_eq!(region.tether_count(), 1);
        Region::tether_end_raw(r);
    }

    #[test]
    fn splice_moves_storage() {
        let dst = create();
        let src = create();
        let p = unsafe { &*src }.alloc(4096);
        unsafe { p.store::<u64>(7) };
        let moved = Region::splice(unsafe { &*dst }, unsafe { &*src }, p, p);
        assert!(moved);
        assert!(unsafe { &*dst }.contains(p));
        assert!(!unsafe { &*src }.contains(p));
        assert_eq!(unsafe { p.load::<u64>() }, 7);
        Region::exit(src);
        // The spliced data must survive the source region.
        assert_eq!(unsafe { p.load::<u64>() }, 7);
        Region::exit(dst);
    }

    #[test]
    fn inline_objects_cannot_splice() {
        let dst = create();
        let src = create();
        let p = unsafe { &*src }.alloc(16); // inline
        assert!(!Region::splice(unsafe { &*dst }, unsafe { &*src }, p, p));
        Region::exit(src);
        Region::exit(dst);
    }

    #[test]
    fn create_exact_presizes_one_chunk() {
        let options = Options::new();
        let r = Region::create_exact(*options.arena_growth, 100_000);
        let region = unsafe { &*r };
        assert_eq!(region.stats().chunk_count, 1);
        assert!(region.stats().footprint >= 100_000);
        // Filling the reservation does not grow the arena.
        let p = region.alloc(100_000);
        assert!(!p.is_zero());
        assert_eq!(region.stats().chunk_count, 1);
        Region::exit(r);
    }
}
