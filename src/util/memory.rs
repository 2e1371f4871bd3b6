//! Raw storage for chunks and slabs.
//!
//! All backing memory for arenas, component slabs and overflow edge arrays
//! comes through this module so that a malloc library can be swapped in with
//! a cargo feature. Out-of-memory is reported by a zero address; nothing in
//! here aborts.

use crate::util::Address;

#[cfg(feature = "malloc_jemalloc")]
use jemalloc_sys::{calloc, free, malloc};

#[cfg(feature = "malloc_mimalloc")]
use mimalloc_sys::{mi_calloc as calloc, mi_free as free, mi_malloc as malloc};

#[cfg(not(any(feature = "malloc_jemalloc", feature = "malloc_mimalloc")))]
use libc::{calloc, free, malloc};

/// Allocate `size` bytes of uninitialized storage. Returns `Address::ZERO` on
/// out-of-memory. The result is aligned to at least the malloc guarantee
/// (16 bytes on every platform we target), which satisfies the substrate's
/// word-alignment contract.
pub fn sys_alloc(size: usize) -> Address {
    debug_assert!(size > 0);
    let raw = unsafe { malloc(size) };
    Address::from_mut_ptr(raw)
}

/// Allocate `size` bytes of zeroed storage. Returns `Address::ZERO` on
/// out-of-memory.
pub fn sys_zalloc(size: usize) -> Address {
    debug_assert!(size > 0);
    let raw = unsafe { calloc(1, size) };
    Address::from_mut_ptr(raw)
}

/// Release storage obtained from [`sys_alloc`] or [`sys_zalloc`].
///
/// # Safety
/// `addr` must have come from this module and must not be freed twice.
pub unsafe fn sys_free(addr: Address) {
    debug_assert!(!addr.is_zero());
    free(addr.to_mut_ptr());
}

/// Set a range of memory to 0.
pub fn zero(start: Address, len: usize) {
    set(start, 0, len);
}

/// Set a range of memory to the given value. Similar to memset.
pub fn set(start: Address, val: u8, len: usize) {
    unsafe {
        std::ptr::write_bytes(start.to_mut_ptr::<u8>(), val, len);
    }
}

/// Copy `len` bytes between non-overlapping ranges.
pub fn copy(src: Address, dst: Address, len: usize) {
    unsafe {
        std::ptr::copy_nonoverlapping(src.to_ptr::<u8>(), dst.to_mut_ptr::<u8>(), len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free() {
        let addr = sys_alloc(64);
        assert!(!addr.is_zero());
        zero(addr, 64);
        assert_eq!(unsafe { addr.load::<u64>() }, 0);
        set(addr, 0xab, 64);
        assert_eq!(unsafe { addr.load::<u8>() }, 0xab);
        unsafe { sys_free(addr) };
    }

    #[test]
    fn zalloc_is_zeroed() {
        let addr = sys_zalloc(128);
        assert!(!addr.is_zero());
        for i in 0..128usize {
            assert_eq!(unsafe { (addr + i).load::<u8>() }, 0);
        }
        unsafe { sys_free(addr) };
    }
}
