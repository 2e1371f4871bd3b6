//! The scratch-backed worklist of pending copy items.
//!
//! Each item pairs a source value with the destination slot that wants its
//! relocated form. Nodes are bump-allocated in the transmigration's scratch
//! frame and abandoned on pop; the frame reclaims them all at once.

use crate::object::Value;
use crate::region::scratch::{Scratch, ScratchPair};
use crate::util::Address;

#[repr(C)]
struct WorkNode {
    next: *mut WorkNode,
    src: Value,
    slot: Address,
}

pub struct Worklist {
    head: *mut WorkNode,
    pending: usize,
    processed: usize,
}

impl Worklist {
    pub fn new() -> Self {
        Worklist {
            head: std::ptr::null_mut(),
            pending: 0,
            processed: 0,
        }
    }

    /// Queue `(src, slot)`. Returns false on scratch exhaustion; the slot
    /// then keeps whatever it holds (a source pointer — the partial-failure
    /// contract).
    pub fn push(&mut self, pair: &mut ScratchPair, frame: &Scratch, src: Value, slot: Address) -> bool {
        let node = pair.alloc(frame, std::mem::size_of::<WorkNode>());
        if node.is_zero() {
            return false;
        }
        let node = node.to_mut_ptr::<WorkNode>();
        unsafe {
            node.write(WorkNode {
                next: self.head,
                src,
                slot,
            });
        }
        self.head = node;
        self.pending += 1;
        true
    }

    /// Dequeue one item.
    pub fn pop(&mut self) -> Option<(Value, Address)> {
        if self.head.is_null() {
            return None;
        }
        let node = self.head;
        let (src, slot) = unsafe { ((*node).src, (*node).slot) };
        self.head = unsafe { (*node).next };
        self.pending -= 1;
        self.processed += 1;
        Some((src, slot))
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn processed(&self) -> usize {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::DEFAULT_SCRATCH_TRIM_THRESHOLD;
    use crate::util::options::ArenaGrowth;

    #[test]
    fn push_pop_counts() {
        let mut pair = ScratchPair::new(ArenaGrowth::Geometric, DEFAULT_SCRATCH_TRIM_THRESHOLD);
        let frame = pair.begin(None);
        let mut list = Worklist::new();
        let slot = unsafe { Address::from_usize(0x1000) };
        assert!(list.push(&mut pair, &frame, Value::fixnum(1), slot));
        assert!(list.push(&mut pair, &frame, Value::fixnum(2), slot));
        assert_eq!(list.pending(), 2);
        let (v, s) = list.pop().unwrap();
        assert_eq!(v.fixnum_value(), 2);
        assert_eq!(s, slot);
        assert_eq!(list.pop().unwrap().0.fixnum_value(), 1);
        assert!(list.pop().is_none());
        assert_eq!(list.processed(), 2);
        pair.end(frame);
    }
}
