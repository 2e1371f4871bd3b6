//! The memory resources backing regions and scratch frames.

pub mod arena;
pub mod chunk;

pub use arena::{Arena, ChunkChain, Mark};
pub use chunk::{Chunk, ChunkIter};
