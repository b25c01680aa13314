//! Block headers - tag and payload size packed into one word
//!
//! Layout: `size` in every bit above the lowest 8, `tag` in the lowest 8.
//! The header word sits immediately before a block's payload.

use super::arena::Word;

/// Caller-chosen block classification
pub type Tag = u8;

/// Reserved tag of free blocks
pub const TAG_NONE: Tag = 255;

/// Header words per block
pub const HEADER_SIZE: usize = 1;

/// Smallest payload a block can have (room for the free-list link)
pub const MIN_BLOCK_SIZE: usize = 1;

const TAG_BITS: u32 = 8;

/// Largest payload size the header can record
pub const MAX_BLOCK_SIZE: usize = (Word::MAX >> TAG_BITS) as usize;

/// Pack tag and payload size; `size` must fit in `MAX_BLOCK_SIZE`
#[inline(always)]
pub const fn pack(tag: Tag, size: Word) -> Word {
    (size << TAG_BITS) | tag as Word
}

#[inline(always)]
pub const fn unpack_tag(header: Word) -> Tag {
    (header & 0xFF) as Tag
}

#[inline(always)]
pub const fn unpack_size(header: Word) -> Word {
    header >> TAG_BITS
}
