//! Memory layout and allocation primitives
//!
//! Design: Four layers, leaves first:
//! 1. Arena (one fixed-size region, virtual <-> physical translation)
//! 2. Block headers (tag + payload size in one word)
//! 3. Bitmap (allocation/mark bit per heap word)
//! 4. Free lists (first-fit search, split, unlink)

mod arena;
mod bitmap;
mod free_list;
mod header;


pub use arena::{Arena, VAddr, Word, NULL_VADDR, WORD_BITS, WORD_BYTES};
pub use bitmap::Bitmap;
pub use free_list::{real_size, size_class, CATCH_ALL_CLASS, FREE_LIST_COUNT};
pub use header::{
    pack, unpack_size, unpack_tag, Tag, HEADER_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, TAG_NONE,
};

pub(crate) use free_list::FreeLists;
