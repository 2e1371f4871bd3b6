//! Double-buffered thread-local scratch frames.
//!
//! Each thread context carries two scratch arenas. A frame
//! ([`Scratch`]) snapshots one of them, serves transient allocations, and
//! rewinds on end. Two arenas exist so that a callee needing scratch while
//! its caller's scratch results are still being read can ask for "the other
//! one" via the conflict parameter. Frames on the same arena must end in
//! LIFO order; debug builds verify this.

use crate::util::heap::{Arena, Mark};
use crate::util::options::ArenaGrowth;
use crate::util::Address;

/// A live scratch frame. Must be passed back to
/// [`ScratchPair::end`] (not dropped on the floor); the frame carries the
/// snapshot that reclaims its allocations.
#[derive(Debug)]
pub struct Scratch {
    which: usize,
    mark: Mark,
    depth: usize,
}

impl Scratch {
    /// Which of the two thread arenas this frame occupies.
    pub fn arena_index(&self) -> usize {
        self.which
    }
}

pub struct ScratchPair {
    arenas: [Arena; 2],
    depth: [usize; 2],
    trim_threshold: usize,
}

impl ScratchPair {
    pub fn new(growth: ArenaGrowth, trim_threshold: usize) -> Self {
        ScratchPair {
            arenas: [Arena::new(growth), Arena::new(growth)],
            depth: [0, 0],
            trim_threshold,
        }
    }

    /// Open a scratch frame. `conflict` names a frame whose allocations the
    /// caller is still reading; the new frame takes the other arena. With no
    /// conflict, the shallower arena is chosen.
    pub fn begin(&mut self, conflict: Option<&Scratch>) -> Scratch {
        let which = match conflict {
            Some(c) => 1 - c.which,
            None => {
                if self.depth[0] <= self.depth[1] {
                    0
                } else {
                    1
                }
            }
        };
        let mark = self.arenas[which].snapshot();
        self.depth[which] += 1;
        Scratch {
            which,
            mark,
            depth: self.depth[which],
        }
    }

    /// Allocate transient storage from the frame's arena. Returns
    /// `Address::ZERO` on out-of-memory.
    pub fn alloc(&mut self, scratch: &Scratch, size: usize) -> Address {
        debug_assert_eq!(
            self.depth[scratch.which], scratch.depth,
            "scratch allocation from a frame that is not innermost on its arena"
        );
        self.arenas[scratch.which].alloc(size)
    }

    /// Allocate with explicit alignment.
    pub fn alloc_aligned(&mut self, scratch: &Scratch, size: usize, align: usize) -> Address {
        debug_assert_eq!(self.depth[scratch.which], scratch.depth);
        self.arenas[scratch.which].alloc_aligned(size, align)
    }

    /// Close a frame: rewind its arena to the frame's snapshot. When the
    /// outermost frame on an arena ends and the arena's footprint exceeds
    /// the trim threshold, spare storage is returned to the OS.
    pub fn end(&mut self, scratch: Scratch) {
        let which = scratch.which;
        debug_assert_eq!(
            self.depth[which], scratch.depth,
            "scratch frames ended out of LIFO order"
        );
        self.arenas[which].rewind(scratch.mark);
        self.depth[which] -= 1;
        if self.depth[which] == 0 && self.arenas[which].footprint() > self.trim_threshold {
            trace!(
                "trimming scratch arena {} ({} bytes held)",
                which,
                self.arenas[which].footprint()
            );
            self.arenas[which].trim();
        }
    }

    /// Release both arenas entirely. Thread teardown; no frame may be live.
    pub fn release_all(&mut self) {
        debug_assert_eq!(self.depth, [0, 0], "scratch frames still open");
        self.arenas[0].free();
        self.arenas[1].free();
    }

    /// Combined footprint of both arenas.
    pub fn footprint(&self) -> usize {
        self.arenas[0].footprint() + self.arenas[1].footprint()
    }

    pub fn depth(&self, which: usize) -> usize {
        self.depth[which]
    }
}
