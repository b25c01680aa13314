//! Sweep phase - linear reclaiming scan with coalescing
//!
//! Walks every block left to right. A block whose bit is clear and whose tag
//! is not `TAG_NONE` was visited by the mark phase: its bit is set again so it
//! reads as "allocated, unmarked" for the next cycle. Every other block
//! (unvisited garbage or already free) is reclaimed and either merged into the
//! previous reclaimed block, when the two touch, or linked after it. The free
//! list comes out address ordered and fully coalesced.

use crate::allocator::{pack, Arena, CATCH_ALL_CLASS, HEADER_SIZE, NULL_VADDR, TAG_NONE, Word};
use crate::heap::Heap;

/// What one sweep found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Blocks that survived
    pub live_blocks: usize,
    /// Allocated blocks turned into free space
    pub reclaimed_blocks: usize,
    /// Free blocks on the list afterwards
    pub free_blocks: usize,
    /// Payload words on the list afterwards
    pub free_words: usize,
}

impl Heap {
    pub(crate) fn sweep(&mut self) -> SweepStats {
        let mut stats = SweepStats::default();
        let heap_end = self.heap_end_index();

        let mut prev: Option<usize> = None;
        let mut curr = self.first_block;

        while curr < heap_end {
            let size = self.size_at(curr);
            let bit_set = self.bitmap.is_set(self.arena.words(), curr);
            let tag = self.tag_at(curr);

            if !bit_set && tag != TAG_NONE {
                self.bitmap.set(self.arena.words_mut(), curr);
                stats.live_blocks += 1;
            } else {
                if tag != TAG_NONE {
                    stats.reclaimed_blocks += 1;
                }
                self.bitmap.clear(self.arena.words_mut(), curr);
                self.write_header(curr, pack(TAG_NONE, size as Word));

                match prev {
                    Some(p) if p + self.size_at(p) + HEADER_SIZE == curr => {
                        let merged = self.size_at(p) + size + HEADER_SIZE;
                        self.write_header(p, pack(TAG_NONE, merged as Word));
                        stats.free_words += size + HEADER_SIZE;
                    }
                    Some(p) => {
                        self.set_link(p, Arena::vaddr_of_index(curr));
                        prev = Some(curr);
                        stats.free_blocks += 1;
                        stats.free_words += size;
                    }
                    None => {
                        self.free_lists.set_head(CATCH_ALL_CLASS, Arena::vaddr_of_index(curr));
                        prev = Some(curr);
                        stats.free_blocks += 1;
                        stats.free_words += size;
                    }
                }
            }

            curr += size + HEADER_SIZE;
        }

        match prev {
            Some(last) => self.set_link(last, NULL_VADDR),
            None => self.free_lists.set_head(CATCH_ALL_CLASS, NULL_VADDR),
        }

        stats
    }
}
