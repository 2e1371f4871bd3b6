//! The per-thread component header pool and dismantle queue.
//!
//! Headers come from slabs carved into an intrusive free list. Releasing the
//! last reference to an island does not free it; the root is pushed onto the
//! thread's dismantle queue, and `process_dismantle` reclaims queued islands
//! in batches at safe points (scope exit, allocation retry, thread
//! teardown). This bounds the tail latency of dropping a reference into a
//! large cyclic structure.

use std::ptr;

use super::header::{self, SymComponent};
use super::symobj::SymObj;
use crate::util::memory;
use crate::util::Address;

/// Reclamation counters, cumulative over the pool's lifetime. Tests and
/// diagnostics read these; dismantling itself is not otherwise observable.
#[derive(Default, Debug, Clone, Copy)]
pub struct DismantleStats {
    pub components_dismantled: usize,
    pub members_freed: usize,
    pub payload_bytes_freed: usize,
    pub overflow_arrays_freed: usize,
}

pub struct ComponentPool {
    slabs: Vec<Address>,
    slab_capacity: usize,
    free_head: *mut SymComponent,
    queue_head: *mut SymComponent,
    /// Headers handed out and not yet returned (forwarding records count
    /// until their root is dismantled).
    live: usize,
    stats: DismantleStats,
}

impl ComponentPool {
    pub fn new(slab_capacity: usize) -> Self {
        debug_assert!(slab_capacity > 0);
        ComponentPool {
            slabs: Vec::new(),
            slab_capacity,
            free_head: ptr::null_mut(),
            queue_head: ptr::null_mut(),
            live: 0,
            stats: DismantleStats::default(),
        }
    }

    /// A fresh root header. Returns null on out-of-memory.
    pub fn acquire(&mut self) -> *mut SymComponent {
        if self.free_head.is_null() && !self.grow_slab() {
            return ptr::null_mut();
        }
        let slot = self.free_head;
        unsafe {
            self.free_head = ptr::addr_of!((*slot).next).read();
            SymComponent::init(slot);
        }
        self.live += 1;
        slot
    }

    fn grow_slab(&mut self) -> bool {
        let header_bytes = std::mem::size_of::<SymComponent>();
        let block = memory::sys_alloc(self.slab_capacity * header_bytes);
        if block.is_zero() {
            return false;
        }
        self.slabs.push(block);
        // Thread every slot onto the free list. Only the link field of an
        // uninitialized slot is ever touched.
        for i in 0..self.slab_capacity {
            let slot = (block + i * header_bytes).to_mut_ptr::<SymComponent>();
            unsafe {
                ptr::addr_of_mut!((*slot).next).write(self.free_head);
            }
            self.free_head = slot;
        }
        true
    }

    fn release_header(&mut self, header: *mut SymComponent) {
        unsafe {
            ptr::drop_in_place(header);
            ptr::addr_of_mut!((*header).next).write(self.free_head);
        }
        self.free_head = header;
        debug_assert!(self.live > 0);
        self.live -= 1;
    }

    /// Queue a root whose packed state reached zero. Idempotent through the
    /// scheduled flag.
    pub fn schedule_dismantle(&mut self, root: *mut SymComponent) {
        unsafe {
            debug_assert!((*root).is_root());
            if (*root).set_scheduled(true) {
                return; // already queued
            }
            (*root).next = self.queue_head;
        }
        self.queue_head = root;
        trace!("component {} scheduled for dismantle", unsafe { (*root).id() });
    }

    /// Pop up to `batch` islands from the queue and dismantle each; zero
    /// drains the queue. Returns the number dismantled. Islands that gained
    /// a reference since scheduling are skipped.
    pub fn process_dismantle(&mut self, batch: usize) -> usize {
        let limit = if batch == 0 { usize::MAX } else { batch };
        let mut dismantled = 0;
        while dismantled < limit && !self.queue_head.is_null() {
            let root = self.queue_head;
            unsafe {
                self.queue_head = (*root).next;
                (*root).next = ptr::null_mut();
                (*root).set_scheduled(false);
                if !(*root).state_is_zero() {
                    continue;
                }
                self.dismantle(root);
            }
            dismantled += 1;
        }
        dismantled
    }

    /// Symmetric island teardown: cancel every internal edge, free member
    /// payloads and overflow arrays, free the member records, then return
    /// the root and its forwarding records to the pool.
    unsafe fn dismantle(&mut self, root: *mut SymComponent) {
        debug_assert!((*root).is_root());
        let members = std::mem::take(&mut (*root).members);

        // Edge cancellation first, while every member is still intact.
        // Targets resolve through find(): an edge whose target was forwarded
        // to a different island is that island's business, not ours.
        for &member in &members {
            let edges = (*member).edges().to_vec();
            for target in edges {
                if header::find((*target).component()) == root {
                    (*target).dec_internal();
                }
            }
        }

        for member in members {
            #[cfg(feature = "extreme_assertions")]
            assert_eq!(
                (*member).internal_rc(),
                0,
                "internal edges did not cancel symmetrically"
            );
            self.stats.payload_bytes_freed += (*member).payload_bytes();
            if (*member).has_overflow() {
                self.stats.overflow_arrays_freed += 1;
            }
            (*member).dismantle();
            SymObj::destroy(member);
            self.stats.members_freed += 1;
        }

        let absorbed = std::mem::take(&mut (*root).absorbed);
        for forwarding in absorbed {
            self.release_header(forwarding);
        }
        self.release_header(root);
        self.stats.components_dismantled += 1;
    }

    pub fn stats(&self) -> DismantleStats {
        self.stats
    }

    pub fn live_headers(&self) -> usize {
        self.live
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue_head.is_null()
    }

    /// Thread teardown: drain the queue, then release the slabs. If live
    /// islands remain (outstanding handles at teardown), the slabs are
    /// retained and the situation is logged; freeing them would invalidate
    /// the outstanding references.
    pub fn cleanup(&mut self) {
        self.process_dismantle(0);
        if self.live > 0 {
            warn!(
                "component pool torn down with {} live headers; slab storage retained",
                self.live
            );
            return;
        }
        for slab in self.slabs.drain(..) {
            unsafe { memory::sys_free(slab) };
        }
        self.free_head = ptr::null_mut();
        self.queue_head = ptr::null_mut();
    }
}

impl Drop for ComponentPool {
    fn drop(&mut self) {
        self.cleanup();
    }
}
