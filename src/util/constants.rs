//! Word-size constants and the compile-time knobs of the memory substrate.

/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;
/// log2 of the number of bits in a word
pub const LOG_BITS_IN_WORD: usize = LOG_BITS_IN_BYTE as usize + LOG_BYTES_IN_WORD as usize;
/// The number of bits in a word
pub const BITS_IN_WORD: usize = 1 << LOG_BITS_IN_WORD;

/// log2 of the number of bytes in a page
pub const LOG_BYTES_IN_PAGE: u8 = 12;
/// The number of bytes in a page
pub const BYTES_IN_PAGE: usize = 1 << LOG_BYTES_IN_PAGE;

/// Every allocation the substrate hands out is aligned to at least this.
pub const MIN_ALIGNMENT: usize = BYTES_IN_WORD;

/// The size of a region's inline small-object buffer. The buffer lives inside
/// the region block itself and is reclaimed en bloc with the region.
pub const INLINE_BUFFER_SIZE: usize = 512;

/// Requests up to this many bytes are eligible for the inline buffer. This is
/// the compile-time ceiling; the runtime knob `small_object_threshold` may
/// lower it but never raise it.
pub const MAX_INLINE_OBJECT_SIZE: usize = 64;

/// The number of entries in the per-thread region tether cache.
pub const TETHER_CACHE_SIZE: usize = 16;

/// Outgoing edges stored inline in a `SymObj` before overflowing to a heap
/// array.
pub const INLINE_EDGE_COUNT: usize = 3;

/// The smallest chunk an arena will request from the OS.
pub const MIN_CHUNK_SIZE: usize = 4 * BYTES_IN_KBYTE;

/// Geometric chunk growth stops doubling at this size; oversize requests get
/// a dedicated chunk of exactly the requested extent.
pub const MAX_CHUNK_SIZE: usize = BYTES_IN_MBYTE;

/// Chunk size used when the arena growth policy is `Fixed`.
pub const FIXED_CHUNK_SIZE: usize = 64 * BYTES_IN_KBYTE;

/// Default footprint above which an outermost scratch end trims its arena.
pub const DEFAULT_SCRATCH_TRIM_THRESHOLD: usize = BYTES_IN_MBYTE;

/// Default number of component headers per pool slab.
pub const DEFAULT_COMPONENT_SLAB_SIZE: usize = 128;

/// The widest address hull the transmigration bitmap will cover before
/// degrading to the shallow-copy fallback.
pub const MAX_BITMAP_SPAN: usize = 256 * BYTES_IN_MBYTE;
