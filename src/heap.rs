//! Heap - the owned heap-manager context
//!
//! Layout of the arena once the heap start is set:
//!
//! ```text
//! [ reserved (embedder) | bitmap (B words) | heap (H words) ]
//! ^ arena base = vaddr 0                    ^ heap_start_v     ^ heap_end_v
//! ```
//!
//! The heap is a gapless sequence of blocks, each a header word followed by
//! its payload. Block pointers handed to the embedder point at the payload.

use core::ptr::NonNull;

use crate::allocator::{
    pack, unpack_size, unpack_tag, Arena, Bitmap, FreeLists, Tag, VAddr, Word, HEADER_SIZE,
    MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, NULL_VADDR, TAG_NONE, WORD_BITS, WORD_BYTES,
    FREE_LIST_COUNT,
};
use crate::config::HeapConfig;
use crate::error::HeapError;
use crate::gc::GcStats;
use crate::logging::info;

/// Mark & sweep heap over one fixed-size arena
pub struct Heap {
    pub(crate) arena: Arena,
    pub(crate) bitmap: Bitmap,
    reserved_words: usize,
    heap_start: usize,
    heap_end: usize,
    pub(crate) heap_start_v: VAddr,
    pub(crate) heap_end_v: VAddr,
    pub(crate) first_block: usize,
    pub(crate) free_lists: FreeLists,
    pub(crate) mark_stack: Vec<VAddr>,
    pub(crate) stats: GcStats,
}

impl Arena {
    /// Establish the heap at `ptr`, consuming the arena
    ///
    /// Everything before `ptr` stays reserved for the embedder.
    pub fn into_heap(self, ptr: *const Word) -> Result<Heap, HeapError> {
        Heap::new(self, ptr)
    }
}

impl Heap {
    /// Carve bitmap and heap out of the arena from `ptr` to its end
    pub fn new(mut arena: Arena, ptr: *const Word) -> Result<Self, HeapError> {
        let (start, bitmap_words, heap_words) = Self::geometry(&arena, ptr)?;
        let initial_size = heap_words - HEADER_SIZE;

        let heap_start = start + bitmap_words;
        let heap_end = arena.len_words();
        debug_assert_eq!(heap_end - heap_start, heap_words);

        let bitmap = Bitmap::new(start, bitmap_words, heap_start, heap_end);
        bitmap.reset(arena.words_mut());

        let first_block = heap_start + HEADER_SIZE;
        {
            let words = arena.words_mut();
            words[heap_start] = pack(TAG_NONE, initial_size as Word);
            words[first_block] = NULL_VADDR;
        }

        info!(
            reserved_words = start,
            bitmap_words,
            heap_words,
            "Heap initialized"
        );

        Ok(Self {
            arena,
            bitmap,
            reserved_words: start,
            heap_start,
            heap_end,
            heap_start_v: Arena::vaddr_of_index(heap_start),
            heap_end_v: Arena::vaddr_of_index(heap_end),
            first_block,
            free_lists: FreeLists::with_block(Arena::vaddr_of_index(first_block)),
            mark_stack: Vec::new(),
            stats: GcStats::default(),
        })
    }

    /// Reserved words, bitmap words and heap words for a heap starting at `ptr`
    pub(crate) fn geometry(arena: &Arena, ptr: *const Word) -> Result<(usize, usize, usize), HeapError> {
        let start = arena
            .index_of(ptr)
            .ok_or(HeapError::InvalidHeapStart { offset: arena.offset_of(ptr) })?;

        let bh_size = arena.len_words() - start;
        let bitmap_words = (bh_size - 1) / (WORD_BITS + 1) + 1;
        let heap_words = bh_size - bitmap_words;

        if heap_words < HEADER_SIZE + MIN_BLOCK_SIZE {
            return Err(HeapError::HeapTooSmall { words: heap_words });
        }
        if heap_words - HEADER_SIZE > MAX_BLOCK_SIZE {
            return Err(HeapError::HeapTooLarge { words: heap_words });
        }

        Ok((start, bitmap_words, heap_words))
    }

    /// Allocate the arena and set the heap start as configured
    pub fn from_config(config: &HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;
        let arena = Arena::new(config.arena_bytes)?;
        let start = arena.start().wrapping_add(config.reserved_bytes / WORD_BYTES);
        arena.into_heap(start)
    }

    // ===== Arena geometry =====

    /// Arena base; also the "unset" root value
    #[inline]
    pub fn start(&self) -> *mut Word {
        self.arena.start()
    }

    /// One past the end of the arena
    #[inline]
    pub fn end(&self) -> *mut Word {
        self.arena.end()
    }

    /// Virtual address range `[start, end)` of the heap region
    #[inline]
    pub fn heap_bounds(&self) -> (VAddr, VAddr) {
        (self.heap_start_v, self.heap_end_v)
    }

    /// Embedder region in front of the bitmap
    pub fn reserved(&self) -> &[Word] {
        &self.arena.words()[..self.reserved_words]
    }

    pub fn reserved_mut(&mut self) -> &mut [Word] {
        let reserved = self.reserved_words;
        &mut self.arena.words_mut()[..reserved]
    }

    // ===== Block introspection =====

    /// Payload size in words of a live block
    #[inline]
    pub fn block_size(&self, block: NonNull<Word>) -> usize {
        self.size_at(self.block_index(block))
    }

    /// Tag of a live block
    #[inline]
    pub fn block_tag(&self, block: NonNull<Word>) -> Tag {
        self.tag_at(self.block_index(block))
    }

    pub fn payload(&self, block: NonNull<Word>) -> &[Word] {
        let index = self.block_index(block);
        let size = self.size_at(index);
        &self.arena.words()[index..index + size]
    }

    pub fn payload_mut(&mut self, block: NonNull<Word>) -> &mut [Word] {
        let index = self.block_index(block);
        let size = self.size_at(index);
        &mut self.arena.words_mut()[index..index + size]
    }

    /// Virtual address of a block, the value the VM stores to reference it
    #[inline]
    pub fn vaddr_of(&self, block: NonNull<Word>) -> VAddr {
        self.arena.to_virtual(block.as_ptr())
    }

    /// Block pointer for a virtual address inside the heap
    pub fn block_at(&self, vaddr: VAddr) -> Option<NonNull<Word>> {
        if vaddr < self.heap_start_v || vaddr >= self.heap_end_v || vaddr as usize % WORD_BYTES != 0 {
            return None;
        }
        Some(self.block_ptr(Arena::index_of_vaddr(vaddr)))
    }

    /// Every block in address order
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks { heap: self, next: self.first_block }
    }

    /// Virtual addresses on one free list, in list order
    pub fn free_list(&self, class: usize) -> Vec<VAddr> {
        assert!(class < FREE_LIST_COUNT, "no free list for class {}", class);
        let mut out = Vec::new();
        let mut curr = self.free_lists.head(class);
        while curr != NULL_VADDR {
            out.push(curr);
            curr = self.link(Arena::index_of_vaddr(curr));
        }
        out
    }

    /// Word accounting over the whole arena
    pub fn usage(&self) -> HeapUsage {
        let mut usage = HeapUsage {
            reserved_words: self.reserved_words,
            bitmap_words: self.bitmap.len(),
            heap_words: self.heap_end - self.heap_start,
            ..HeapUsage::default()
        };

        for block in self.blocks() {
            if block.tag == TAG_NONE {
                usage.free_blocks += 1;
                usage.free_words += block.size;
            } else {
                usage.used_blocks += 1;
                usage.used_words += block.size;
            }
        }
        usage
    }

    /// Cumulative allocation and collection counters
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    // ===== Word-level helpers =====

    #[inline]
    pub(crate) fn size_at(&self, block: usize) -> usize {
        unpack_size(self.arena.words()[block - HEADER_SIZE]) as usize
    }

    #[inline]
    pub(crate) fn tag_at(&self, block: usize) -> Tag {
        unpack_tag(self.arena.words()[block - HEADER_SIZE])
    }

    #[inline]
    pub(crate) fn write_header(&mut self, block: usize, header: Word) {
        self.arena.words_mut()[block - HEADER_SIZE] = header;
    }

    #[inline]
    pub(crate) fn link(&self, block: usize) -> VAddr {
        self.arena.words()[block]
    }

    #[inline]
    pub(crate) fn set_link(&mut self, block: usize, next: VAddr) {
        self.arena.words_mut()[block] = next;
    }

    #[inline]
    pub(crate) fn heap_end_index(&self) -> usize {
        self.heap_end
    }

    #[inline]
    pub(crate) fn is_bit_set(&self, block: usize) -> bool {
        self.bitmap.is_set(self.arena.words(), block)
    }

    #[inline]
    pub(crate) fn block_ptr(&self, index: usize) -> NonNull<Word> {
        // Safety: arena base is non-null and `index` lies inside the arena
        unsafe { NonNull::new_unchecked(self.arena.start().wrapping_add(index)) }
    }

    /// Word index of a block pointer; pointers outside the heap are defects
    fn block_index(&self, block: NonNull<Word>) -> usize {
        match self.arena.index_of(block.as_ptr()) {
            Some(index) if index > self.heap_start && index < self.heap_end => index,
            _ => panic!(
                "pointer {:?} is not a block in this heap",
                block
            ),
        }
    }
}

/// One block as seen by a heap walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Virtual address of the payload
    pub vaddr: VAddr,
    pub tag: Tag,
    /// Payload words
    pub size: usize,
    /// Bitmap bit at the payload's first word
    pub bit_set: bool,
}

/// Address-ordered heap walk
pub struct Blocks<'a> {
    heap: &'a Heap,
    next: usize,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.next >= self.heap.heap_end {
            return None;
        }

        let block = self.next;
        let size = self.heap.size_at(block);
        self.next = block + size + HEADER_SIZE;

        Some(BlockInfo {
            vaddr: Arena::vaddr_of_index(block),
            tag: self.heap.tag_at(block),
            size,
            bit_set: self.heap.is_bit_set(block),
        })
    }
}

/// Word accounting snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapUsage {
    pub reserved_words: usize,
    pub bitmap_words: usize,
    pub heap_words: usize,
    pub free_blocks: usize,
    pub free_words: usize,
    pub used_blocks: usize,
    pub used_words: usize,
}

impl HeapUsage {
    /// Payload plus header words of every block
    pub fn block_words(&self) -> usize {
        self.free_words + self.used_words + (self.free_blocks + self.used_blocks) * HEADER_SIZE
    }
}
