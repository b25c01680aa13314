//! Free lists - first-fit allocation over address-ordered free blocks
//!
//! Each free block's first payload word holds the virtual address of the next
//! free block on its list (`NULL_VADDR` ends the list). There are 32 list
//! heads indexed by size class, the last one catching every size >= 31.
//! Allocation and sweeping only ever use that catch-all list: the heap is a
//! single first-fit list and the smaller classes stay empty.

use core::ptr::NonNull;

use super::arena::{Arena, VAddr, Word, NULL_VADDR};
use super::header::{pack, Tag, HEADER_SIZE, MIN_BLOCK_SIZE, TAG_NONE};
use crate::heap::Heap;
use crate::logging::log_allocation;

/// Number of free-list heads
pub const FREE_LIST_COUNT: usize = 32;

/// The list every free block lives on
pub const CATCH_ALL_CLASS: usize = FREE_LIST_COUNT - 1;

/// Size class of a payload size
#[inline]
pub const fn size_class(size: usize) -> usize {
    if size >= FREE_LIST_COUNT {
        CATCH_ALL_CLASS
    } else {
        size
    }
}

/// Request size after clamping to the minimum block size
#[inline]
pub const fn real_size(size: usize) -> usize {
    if size < MIN_BLOCK_SIZE {
        MIN_BLOCK_SIZE
    } else {
        size
    }
}

/// Free-list heads, as virtual addresses of each list's first block
#[derive(Debug, Clone)]
pub(crate) struct FreeLists {
    heads: [VAddr; FREE_LIST_COUNT],
}

impl FreeLists {
    /// Lists with a single block on the catch-all list
    pub(crate) fn with_block(first: VAddr) -> Self {
        let mut heads = [NULL_VADDR; FREE_LIST_COUNT];
        heads[CATCH_ALL_CLASS] = first;
        Self { heads }
    }

    #[inline]
    pub(crate) fn head(&self, class: usize) -> VAddr {
        self.heads[class]
    }

    #[inline]
    pub(crate) fn set_head(&mut self, class: usize, vaddr: VAddr) {
        self.heads[class] = vaddr;
    }
}

impl Heap {
    /// First-fit allocation without collecting
    ///
    /// Returns `None` when no free block is large enough; that is the signal
    /// the collector reacts to, not an error.
    pub fn try_allocate(&mut self, tag: Tag, size: usize) -> Option<NonNull<Word>> {
        let block = self.allocate_block(tag, size)?;
        Some(self.block_ptr(block))
    }

    pub(crate) fn allocate_block(&mut self, tag: Tag, size: usize) -> Option<usize> {
        let asize = real_size(size);

        let mut prev: Option<usize> = None;
        let mut curr = self.free_lists.head(CATCH_ALL_CLASS);
        let found = loop {
            if curr == NULL_VADDR {
                return None;
            }
            let block = Arena::index_of_vaddr(curr);
            if self.size_at(block) >= asize {
                break block;
            }
            prev = Some(block);
            curr = self.link(block);
        };

        let next = self.link(found);
        let found_size = self.size_at(found);

        if found_size < asize + HEADER_SIZE + MIN_BLOCK_SIZE {
            // Remainder too small for a block: hand out the whole thing
            self.relink(prev, next);
            self.write_header(found, pack(tag, found_size as Word));
        } else {
            let rest = found + asize + HEADER_SIZE;
            let rest_size = found_size - asize - HEADER_SIZE;
            self.write_header(found, pack(tag, asize as Word));
            self.write_header(rest, pack(TAG_NONE, rest_size as Word));
            self.set_link(rest, next);
            self.relink(prev, Arena::vaddr_of_index(rest));
        }

        self.bitmap.set(self.arena.words_mut(), found);
        self.stats.allocations += 1;
        log_allocation(tag, self.size_at(found), Arena::vaddr_of_index(found));

        Some(found)
    }

    /// Point `prev`'s link (or the list head) at `next`
    #[inline]
    fn relink(&mut self, prev: Option<usize>, next: VAddr) {
        match prev {
            Some(block) => self.set_link(block, next),
            None => self.free_lists.set_head(CATCH_ALL_CLASS, next),
        }
    }
}
