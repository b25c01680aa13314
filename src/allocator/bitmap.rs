//! Allocation/mark bitmap - one bit per heap word slot
//!
//! The bitmap lives inside the arena, directly in front of the heap. Only the
//! bit at a block's first payload word is meaningful: set means "allocated,
//! not yet visited by the current mark pass", clear means "free" or
//! "allocated and already visited".

use bitvec::prelude::*;

use super::arena::{Word, WORD_BITS};

/// Bitmap geometry, as word indices into the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitmap {
    start: usize,
    len: usize,
    heap_start: usize,
    heap_end: usize,
}

impl Bitmap {
    /// Bitmap of `len` words at `start`, covering `[heap_start, heap_end)`
    pub(crate) fn new(start: usize, len: usize, heap_start: usize, heap_end: usize) -> Self {
        debug_assert!(len * WORD_BITS >= heap_end - heap_start, "bitmap too small for heap");
        Self { start, len, heap_start, heap_end }
    }

    /// Bitmap size in words
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Zero every bitmap word
    pub(crate) fn reset(&self, arena: &mut [Word]) {
        arena[self.start..self.start + self.len].fill(0);
    }

    #[inline]
    pub fn is_set(&self, arena: &[Word], block: usize) -> bool {
        let bit = self.bit_index(block);
        self.bits(arena)[bit]
    }

    #[inline]
    pub fn set(&self, arena: &mut [Word], block: usize) {
        let bit = self.bit_index(block);
        self.bits_mut(arena).set(bit, true);
    }

    #[inline]
    pub fn clear(&self, arena: &mut [Word], block: usize) {
        let bit = self.bit_index(block);
        self.bits_mut(arena).set(bit, false);
    }

    /// Bit position of a heap word; out-of-heap indices are internal defects
    #[inline]
    fn bit_index(&self, block: usize) -> usize {
        assert!(
            self.heap_start <= block && block < self.heap_end,
            "bitmap access outside heap: word {} not in [{}, {})",
            block,
            self.heap_start,
            self.heap_end
        );
        block - self.heap_start
    }

    #[inline]
    fn bits<'a>(&self, arena: &'a [Word]) -> &'a BitSlice<Word, Lsb0> {
        arena[self.start..self.start + self.len].view_bits::<Lsb0>()
    }

    #[inline]
    fn bits_mut<'a>(&self, arena: &'a mut [Word]) -> &'a mut BitSlice<Word, Lsb0> {
        arena[self.start..self.start + self.len].view_bits_mut::<Lsb0>()
    }
}
