//! Per-object records participating in a cyclic island.
//!
//! A `SymObj` stores its outgoing edges inline until the fourth edge, then
//! migrates them to a heap array of doubling capacity. `internal_rc` counts
//! incoming edges from the same island; it never keeps an object alive on
//! its own (the island does), but it makes dismantling symmetric and
//! checkable.

use std::ptr;

use super::header::SymComponent;
use crate::util::constants::INLINE_EDGE_COUNT;
use crate::util::memory;
use crate::util::Address;

#[repr(C)]
pub struct SymObj {
    component: *mut SymComponent,
    /// Owned payload storage, freed by dismantling. Zero when empty.
    payload: Address,
    payload_bytes: usize,
    inline_edges: [*mut SymObj; INLINE_EDGE_COUNT],
    /// Overflow edge array; non-null is the storage-mode indicator.
    overflow: *mut *mut SymObj,
    overflow_cap: usize,
    edge_count: usize,
    internal_rc: u32,
    freed: bool,
}

impl SymObj {
    /// Allocate a fresh record with `payload_bytes` of owned payload.
    /// Returns null on out-of-memory.
    pub fn create(payload_bytes: usize) -> *mut SymObj {
        let block = memory::sys_zalloc(std::mem::size_of::<SymObj>());
        if block.is_zero() {
            return ptr::null_mut();
        }
        let payload = if payload_bytes > 0 {
            let p = memory::sys_alloc(payload_bytes);
            if p.is_zero() {
                unsafe { memory::sys_free(block) };
                return ptr::null_mut();
            }
            p
        } else {
            Address::ZERO
        };
        let obj = block.to_mut_ptr::<SymObj>();
        unsafe {
            (*obj).payload = payload;
            (*obj).payload_bytes = payload_bytes;
        }
        obj
    }

    pub fn component(&self) -> *mut SymComponent {
        self.component
    }

    pub(super) fn set_component(&mut self, component: *mut SymComponent) {
        self.component = component;
    }

    pub fn payload(&self) -> Address {
        self.payload
    }

    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    pub fn internal_rc(&self) -> u32 {
        self.internal_rc
    }

    pub fn freed(&self) -> bool {
        self.freed
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Has edge storage migrated to the overflow array?
    pub fn has_overflow(&self) -> bool {
        !self.overflow.is_null()
    }

    /// The outgoing edges, wherever they are stored.
    pub fn edges(&self) -> &[*mut SymObj] {
        if self.overflow.is_null() {
            &self.inline_edges[..self.edge_count]
        } else {
            unsafe { std::slice::from_raw_parts(self.overflow, self.edge_count) }
        }
    }

    /// Record an outgoing edge. The fourth edge migrates storage to a heap
    /// array; later growth doubles it. Returns false on out-of-memory (the
    /// edge is not recorded).
    pub fn push_edge(&mut self, to: *mut SymObj) -> bool {
        debug_assert!(!self.freed);
        if self.overflow.is_null() {
            if self.edge_count < INLINE_EDGE_COUNT {
                self.inline_edges[self.edge_count] = to;
                self.edge_count += 1;
                return true;
            }
            // Migrate inline entries and switch storage modes.
            let cap = INLINE_EDGE_COUNT * 2 + 2;
            let storage = memory::sys_alloc(cap * std::mem::size_of::<*mut SymObj>());
            if storage.is_zero() {
                return false;
            }
            let array = storage.to_mut_ptr::<*mut SymObj>();
            for (i, &edge) in self.inline_edges.iter().enumerate() {
                unsafe { array.add(i).write(edge) };
            }
            self.overflow = array;
            self.overflow_cap = cap;
        } else if self.edge_count == self.overflow_cap {
            let cap = self.overflow_cap * 2;
            let storage = memory::sys_alloc(cap * std::mem::size_of::<*mut SymObj>());
            if storage.is_zero() {
                return false;
            }
            let array = storage.to_mut_ptr::<*mut SymObj>();
            unsafe {
                ptr::copy_nonoverlapping(self.overflow, array, self.edge_count);
                memory::sys_free(Address::from_mut_ptr(self.overflow));
            }
            self.overflow = array;
            self.overflow_cap = cap;
        }
        unsafe { self.overflow.add(self.edge_count).write(to) };
        self.edge_count += 1;
        true
    }

    /// Remove one occurrence of an edge to `to`. Returns false if absent.
    pub fn remove_edge(&mut self, to: *mut SymObj) -> bool {
        debug_assert!(!self.freed);
        let count = self.edge_count;
        let edges = if self.overflow.is_null() {
            &mut self.inline_edges[..count]
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.overflow, count) }
        };
        match edges.iter().position(|&e| e == to) {
            Some(i) => {
                edges[i] = edges[count - 1];
                self.edge_count = count - 1;
                true
            }
            None => false,
        }
    }

    pub(super) fn inc_internal(&mut self) {
        self.internal_rc += 1;
    }

    pub(super) fn dec_internal(&mut self) {
        debug_assert!(self.internal_rc > 0, "internal_rc underflow");
        self.internal_rc -= 1;
    }

    /// Dismantle this member: free the payload and the overflow array, and
    /// set the freed flag (exactly once).
    pub(super) fn dismantle(&mut self) {
        debug_assert!(!self.freed, "member dismantled twice");
        if !self.payload.is_zero() {
            unsafe { memory::sys_free(self.payload) };
            self.payload = Address::ZERO;
        }
        if !self.overflow.is_null() {
            unsafe { memory::sys_free(Address::from_mut_ptr(self.overflow)) };
            self.overflow = ptr::null_mut();
        }
        self.edge_count = 0;
        self.freed = true;
    }

    /// Free the record itself. Only after [`Self::dismantle`].
    pub(super) unsafe fn destroy(obj: *mut SymObj) {
        debug_assert!((*obj).freed);
        memory::sys_free(Address::from_mut_ptr(obj));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_edges_then_overflow() {
        let a = SymObj::create(0);
        let targets: Vec<*mut SymObj> = (0..10).map(|_| SymObj::create(0)).collect();
        let obj = unsafe { &mut *a };
        for (i, &t) in targets.iter().enumerate() {
            assert!(obj.push_edge(t));
            assert_eq!(obj.edge_count(), i + 1);
        }
        assert_eq!(obj.edges(), targets.as_slice());
        // Cleanup without going through a component.
        obj.dismantle();
        unsafe { SymObj::destroy(a) };
        for t in targets {
            unsafe {
                (*t).dismantle();
                SymObj::destroy(t);
            }
        }
    }

    #[test]
    fn remove_edge_swaps_from_tail() {
        let a = SymObj::create(0);
        let b = SymObj::create(0);
        let c = SymObj::create(0);
        let obj = unsafe { &mut *a };
        obj.push_edge(b);
        obj.push_edge(c);
        assert!(obj.remove_edge(b));
        assert_eq!(obj.edges(), &[c]);
        assert!(!obj.remove_edge(b));
        for o in [a, b, c] {
            unsafe {
                (*o).dismantle();
                SymObj::destroy(o);
            }
        }
    }

    #[test]
    fn payload_is_owned() {
        let a = SymObj::create(64);
        let obj = unsafe { &mut *a };
        assert_eq!(obj.payload_bytes(), 64);
        memory::set(obj.payload(), 0x5a, 64);
        assert_eq!(unsafe { obj.payload().load::<u8>() }, 0x5a);
        obj.dismantle();
        assert!(obj.freed());
        unsafe { SymObj::destroy(a) };
    }
}
