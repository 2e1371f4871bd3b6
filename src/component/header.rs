//! Island headers and the union-find forest over them.
//!
//! A root header owns its member list and the island's externally visible
//! counters. `handle_count` (strong references from outside the island) and
//! `tether_count` (scoped borrows) are packed into one 64-bit atomic so that
//! the dismantle condition — no external reference of either kind — is a
//! single zero compare.
//!
//! A non-root header is an opaque forwarding record: outstanding pointers
//! may still address it, so it stays allocated until its root is dismantled.
//! Path compression uses CAS on the parent pointer, so concurrent `find`
//! walks are safe; `union` itself must be serialized by the caller, who is
//! required to hold strong references to both roots.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use super::symobj::SymObj;

/// One handle in the packed state word (high half).
pub(super) const HANDLE_UNIT: u64 = 1 << 32;
const HANDLE_MASK: u64 = 0xffff_ffff << 32;
const TETHER_MASK: u64 = 0xffff_ffff;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

#[repr(C)]
pub struct SymComponent {
    id: u64,
    /// Packed `handle_count:u32 | tether_count:u32`. Meaningful on roots
    /// only; a union transfers the child's word to the winner.
    state: AtomicU64,
    /// Union-find parent; null marks a root.
    parent: AtomicPtr<SymComponent>,
    dismantle_scheduled: AtomicBool,
    /// Intrusive link: the pool's free list or the dismantle queue
    /// (a header is never on both).
    pub(super) next: *mut SymComponent,
    pub(super) members: Vec<*mut SymObj>,
    /// Forwarding records merged into this root, reclaimed with it.
    pub(super) absorbed: Vec<*mut SymComponent>,
}

/// A live scoped borrow of an island. Must be passed back to `tether_end`.
#[derive(Debug)]
#[must_use]
pub struct ComponentTether {
    root: *mut SymComponent,
}

impl ComponentTether {
    pub fn root(&self) -> *mut SymComponent {
        self.root
    }
}

impl SymComponent {
    pub(super) fn init(slot: *mut SymComponent) {
        unsafe {
            slot.write(SymComponent {
                id: NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed),
                state: AtomicU64::new(0),
                parent: AtomicPtr::new(ptr::null_mut()),
                dismantle_scheduled: AtomicBool::new(false),
                next: ptr::null_mut(),
                members: Vec::new(),
                absorbed: Vec::new(),
            });
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_root(&self) -> bool {
        self.parent.load(Ordering::Acquire).is_null()
    }

    pub fn handle_count(&self) -> u32 {
        ((self.state.load(Ordering::SeqCst) & HANDLE_MASK) >> 32) as u32
    }

    pub fn tether_count(&self) -> u32 {
        (self.state.load(Ordering::SeqCst) & TETHER_MASK) as u32
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &[*mut SymObj] {
        &self.members
    }

    pub(super) fn set_scheduled(&self, scheduled: bool) -> bool {
        self.dismantle_scheduled.swap(scheduled, Ordering::AcqRel)
    }

    pub(super) fn state_is_zero(&self) -> bool {
        self.state.load(Ordering::SeqCst) == 0
    }
}

/// Union-find find with CAS path compression. Safe to call from any thread
/// holding a reference that keeps the island alive.
pub fn find(component: *mut SymComponent) -> *mut SymComponent {
    debug_assert!(!component.is_null());
    unsafe {
        let mut root = component;
        loop {
            let parent = (*root).parent.load(Ordering::Acquire);
            if parent.is_null() {
                break;
            }
            root = parent;
        }
        // Point everything on the walked chain at the root. A lost race just
        // means someone else compressed further; retry is unnecessary.
        let mut cursor = component;
        while cursor != root {
            let parent = (*cursor).parent.load(Ordering::Acquire);
            if parent != root {
                let _ = (*cursor).parent.compare_exchange(
                    parent,
                    root,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            cursor = parent;
        }
        root
    }
}

/// Add `obj` to the island of `component`.
pub fn add_member(component: *mut SymComponent, obj: *mut SymObj) {
    let root = find(component);
    unsafe {
        (*root).members.push(obj);
        (*obj).set_component(root);
    }
}

/// Merge the islands of `a` and `b`, returning the surviving root. The
/// smaller island's members move to the larger; its counters transfer; its
/// header becomes a forwarding record owned by the winner.
///
/// The caller must hold strong references to both islands and must serialize
/// unions (see the module doc).
pub fn union(a: *mut SymComponent, b: *mut SymComponent) -> *mut SymComponent {
    let ra = find(a);
    let rb = find(b);
    if ra == rb {
        return ra;
    }
    let (winner, loser) = unsafe {
        if (*ra).members.len() >= (*rb).members.len() {
            (ra, rb)
        } else {
            (rb, ra)
        }
    };
    unsafe {
        for &member in (*loser).members.iter() {
            (*member).set_component(winner);
        }
        let moved = std::mem::take(&mut (*loser).members);
        (*winner).members.extend(moved);

        let absorbed = std::mem::take(&mut (*loser).absorbed);
        (*winner).absorbed.extend(absorbed);
        (*winner).absorbed.push(loser);

        // Transfer both packed counters in one shot, then forward.
        let transferred = (*loser).state.swap(0, Ordering::SeqCst);
        (*winner).state.fetch_add(transferred, Ordering::SeqCst);
        (*loser).parent.store(winner, Ordering::Release);
        trace!(
            "component {} merged into component {}",
            (*loser).id,
            (*winner).id
        );
    }
    winner
}

/// Add one strong external reference to the island of `component`.
pub fn acquire_handle(component: *mut SymComponent) {
    let root = find(component);
    let prev = unsafe { (*root).state.fetch_add(HANDLE_UNIT, Ordering::SeqCst) };
    debug_assert!(prev & HANDLE_MASK != HANDLE_MASK, "handle_count overflow");
}

/// Drop one strong external reference. When the packed state reaches zero,
/// the root is returned so the caller can schedule dismantling.
pub fn release_handle(component: *mut SymComponent) -> Option<*mut SymComponent> {
    let root = find(component);
    let prev = unsafe { (*root).state.fetch_sub(HANDLE_UNIT, Ordering::SeqCst) };
    debug_assert!(prev & HANDLE_MASK != 0, "handle_count underflow");
    if prev == HANDLE_UNIT {
        Some(root)
    } else {
        None
    }
}

/// Begin a scoped borrow of the island.
pub fn tether_begin(component: *mut SymComponent) -> ComponentTether {
    let root = find(component);
    let prev = unsafe { (*root).state.fetch_add(1, Ordering::SeqCst) };
    debug_assert!(prev & TETHER_MASK != TETHER_MASK, "tether_count overflow");
    ComponentTether { root }
}

/// End a scoped borrow. When the packed state reaches zero, the root is
/// returned so the caller can schedule dismantling.
pub fn tether_end(token: ComponentTether) -> Option<*mut SymComponent> {
    // The token pinned the root: no union can have demoted it (unions
    // require the island to be externally referenced, and redirect new
    // counts to the winner while transferring ours).
    let root = find(token.root);
    let prev = unsafe { (*root).state.fetch_sub(1, Ordering::SeqCst) };
    debug_assert!(prev & TETHER_MASK != 0, "tether_count underflow");
    if prev == 1 {
        Some(root)
    } else {
        None
    }
}
