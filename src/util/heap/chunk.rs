//! Chunks are the unit of storage behind every arena: a header-prefixed,
//! contiguous byte buffer with a monotonically advancing bump cursor, chained
//! into a singly linked list. Chunks never move once allocated, which is what
//! makes region splicing address-stable.

use crate::util::constants::*;
use crate::util::conversions::word_align_up;
use crate::util::memory;
use crate::util::Address;

/// The chunk header. The data area follows the header in the same system
/// allocation.
#[repr(C)]
pub struct Chunk {
    /// The next chunk in the owning arena's chain, or null.
    next: *mut Chunk,
    /// Usable bytes in the data area.
    capacity: usize,
    /// Bytes bumped so far, relative to the data area start. Never decreases
    /// except through an arena rewind.
    cursor: usize,
}

/// Bytes between the chunk block start and its data area.
pub const CHUNK_HEADER_BYTES: usize = word_align_up(std::mem::size_of::<Chunk>());

impl Chunk {
    /// Allocate a chunk with the given data capacity. Returns null on
    /// out-of-memory.
    pub fn create(capacity: usize) -> *mut Chunk {
        debug_assert!(capacity > 0);
        let block = memory::sys_alloc(CHUNK_HEADER_BYTES + capacity);
        if block.is_zero() {
            return std::ptr::null_mut();
        }
        let chunk = block.to_mut_ptr::<Chunk>();
        unsafe {
            chunk.write(Chunk {
                next: std::ptr::null_mut(),
                capacity,
                cursor: 0,
            });
        }
        chunk
    }

    /// Release a chunk's storage.
    ///
    /// # Safety
    /// The chunk must be unlinked from any arena and must not be used again.
    pub unsafe fn destroy(chunk: *mut Chunk) {
        debug_assert!(!chunk.is_null());
        memory::sys_free(Address::from_mut_ptr(chunk));
    }

    /// The first byte of the data area.
    pub fn data_start(&self) -> Address {
        Address::from_ref(self) + CHUNK_HEADER_BYTES
    }

    /// One past the last byte of the data area.
    pub fn data_end(&self) -> Address {
        self.data_start() + self.capacity
    }

    /// The current bump position.
    pub fn bump_position(&self) -> Address {
        self.data_start() + self.cursor
    }

    /// Usable bytes in the data area.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes bumped so far.
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Does the data area contain `addr`?
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.data_start() && addr < self.data_end()
    }

    /// The next chunk in the chain, or null.
    pub fn next(&self) -> *mut Chunk {
        self.next
    }

    pub(super) fn set_next(&mut self, next: *mut Chunk) {
        self.next = next;
    }

    /// Reset the cursor. Only the owning arena may do this, and only through
    /// a rewind that honors the snapshot discipline.
    pub(super) fn reset_to(&mut self, cursor: usize) {
        debug_assert!(cursor <= self.cursor);
        self.cursor = cursor;
    }

    /// Try to bump-allocate `size` bytes at `align`. Returns `None` if the
    /// chunk lacks space. `size` must already be word aligned.
    pub fn try_bump(&mut self, size: usize, align: usize) -> Option<Address> {
        debug_assert!(size == word_align_up(size));
        debug_assert!(align.is_power_of_two() && align >= MIN_ALIGNMENT);
        let result = self.bump_position().align_up(align);
        let new_cursor = (result + size) - self.data_start();
        if new_cursor > self.capacity {
            return None;
        }
        self.cursor = new_cursor;
        Some(result)
    }
}

/// Iterates the chunks of a chain starting at `head`, yielding raw chunk
/// pointers.
pub struct ChunkIter {
    cursor: *mut Chunk,
}

impl ChunkIter {
    pub fn from(head: *mut Chunk) -> Self {
        ChunkIter { cursor: head }
    }
}

impl Iterator for ChunkIter {
    type Item = *mut Chunk;

    fn next(&mut self) -> Option<*mut Chunk> {
        if self.cursor.is_null() {
            return None;
        }
        let current = self.cursor;
        self.cursor = unsafe { (*current).next };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_bump() {
        let chunk = Chunk::create(256);
        assert!(!chunk.is_null());
        let chunk_ref = unsafe { &mut *chunk };
        let a = chunk_ref.try_bump(16, MIN_ALIGNMENT).unwrap();
        let b = chunk_ref.try_bump(16, MIN_ALIGNMENT).unwrap();
        assert_eq!(b, a + 16usize);
        assert!(a.is_aligned_to(MIN_ALIGNMENT));
        assert_eq!(chunk_ref.used(), 32);
        unsafe { Chunk::destroy(chunk) };
    }

    #[test]
    fn bump_respects_capacity() {
        let chunk = Chunk::create(64);
        let chunk_ref = unsafe { &mut *chunk };
        assert!(chunk_ref.try_bump(64, MIN_ALIGNMENT).is_some());
        assert!(chunk_ref.try_bump(8, MIN_ALIGNMENT).is_none());
        unsafe { Chunk::destroy(chunk) };
    }

    #[test]
    fn aligned_bump() {
        let chunk = Chunk::create(1024);
        let chunk_ref = unsafe { &mut *chunk };
        chunk_ref.try_bump(8, MIN_ALIGNMENT).unwrap();
        let a = chunk_ref.try_bump(8, 64).unwrap();
        assert!(a.is_aligned_to(64));
        unsafe { Chunk::destroy(chunk) };
    }
}
