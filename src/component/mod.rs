//! Component-Level Scope Tethering: strongly connected islands of objects
//! reclaimed as single units.
//!
//! Reference counting deadlocks on cycles and tracing needs global scans;
//! the middle road taken here is to give every cyclic island one header with
//! one packed reference state. Edges between members are "internal" and
//! never keep the island alive; only external handles and tethers do. When
//! both counts reach zero the island is queued, and a later safe point
//! dismantles every member symmetrically.

pub mod header;
pub mod pool;
pub mod symobj;

pub use header::{
    acquire_handle, add_member, find, release_handle, tether_begin, tether_end, union,
    ComponentTether, SymComponent,
};
pub use pool::{ComponentPool, DismantleStats};
pub use symobj::SymObj;

/// Record the edge `from → to`, merging the two islands first if they are
/// distinct (a cycle formed dynamically spans both). Increments the target's
/// internal count. Returns false on out-of-memory (no edge recorded, no
/// merge undone — a merge is semantically idempotent).
///
/// Both objects must already be members of components, and the caller must
/// serialize island mutation as for [`union`].
pub fn link(from: *mut SymObj, to: *mut SymObj) -> bool {
    unsafe {
        let from_comp = (*from).component();
        let to_comp = (*to).component();
        debug_assert!(!from_comp.is_null() && !to_comp.is_null());
        if header::find(from_comp) != header::find(to_comp) {
            header::union(from_comp, to_comp);
        }
        if !(*from).push_edge(to) {
            return false;
        }
        (*to).inc_internal();
        true
    }
}

/// Remove one `from → to` edge and decrement the target's internal count.
/// Returns false if no such edge exists.
pub fn unlink(from: *mut SymObj, to: *mut SymObj) -> bool {
    unsafe {
        if !(*from).remove_edge(to) {
            return false;
        }
        (*to).dec_internal();
        true
    }
}
