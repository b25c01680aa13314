//! Garbage collector - allocate, collect on exhaustion, retry once
//!
//! Design: Stop-the-world mark & sweep driven entirely by allocation:
//! 1. First-fit allocation (fast path)
//! 2. On failure, mark from the three roots and sweep the whole heap
//! 3. Retry once; a second failure is fatal (no growth, no compaction)
//!
//! Collection runs inside the triggering call and always completes.

mod mark;
mod roots;
mod sweep;

#[cfg(test)]
mod tests;

pub use roots::{RootProvider, RootSlot, Roots};
pub use sweep::SweepStats;

use core::ptr::NonNull;
use std::time::Instant;

use crate::allocator::{Tag, Word, TAG_NONE};
use crate::error::{fatal, HeapError};
use crate::heap::Heap;
use crate::logging::{debug, log_gc_complete, log_gc_mark, log_gc_start, log_gc_sweep, warn};

/// Cumulative heap counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub allocations: usize,
    pub collections_run: usize,
    pub blocks_marked: usize,
    pub blocks_reclaimed: usize,
    pub failed_allocations: usize,
}

/// Result of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub marked_blocks: usize,
    pub sweep: SweepStats,
}

impl Heap {
    /// Allocate `size` payload words tagged `tag`, collecting if needed
    pub fn allocate<R>(&mut self, tag: Tag, size: usize, roots: &R) -> Result<NonNull<Word>, HeapError>
    where
        R: RootProvider + ?Sized,
    {
        if tag == TAG_NONE {
            return Err(HeapError::ReservedTag { tag });
        }

        if let Some(block) = self.try_allocate(tag, size) {
            return Ok(block);
        }

        debug!(tag, size, "Free list exhausted, collecting");
        log_gc_start(size);
        self.collect(roots);

        if let Some(block) = self.try_allocate(tag, size) {
            return Ok(block);
        }

        self.stats.failed_allocations += 1;
        Err(HeapError::OutOfMemory {
            requested: size,
            free_words: self.usage().free_words,
        })
    }

    /// Like [`Heap::allocate`], terminating the process when memory runs out
    pub fn allocate_or_abort<R>(&mut self, tag: Tag, size: usize, roots: &R) -> NonNull<Word>
    where
        R: RootProvider + ?Sized,
    {
        match self.allocate(tag, size, roots) {
            Ok(block) => block,
            Err(err) => fatal(&err),
        }
    }

    /// Run a full mark & sweep collection
    pub fn collect<R>(&mut self, roots: &R) -> CollectionStats
    where
        R: RootProvider + ?Sized,
    {
        let start = Instant::now();
        let unset = self.start() as *const Word;

        let mut marked = 0;
        for root in roots.roots() {
            if root != unset {
                marked += self.mark_root(root);
            }
        }
        log_gc_mark(marked);

        let sweep = self.sweep();
        log_gc_sweep(sweep.reclaimed_blocks, sweep.free_words);

        self.stats.collections_run += 1;
        self.stats.blocks_marked += marked;
        self.stats.blocks_reclaimed += sweep.reclaimed_blocks;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 10 {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                "GC collection took significant time"
            );
        }
        log_gc_complete(elapsed.as_micros() as u64, sweep.reclaimed_blocks, sweep.live_blocks);

        CollectionStats { marked_blocks: marked, sweep }
    }
}
