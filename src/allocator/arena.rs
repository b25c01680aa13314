//! Arena - the single fixed-size memory region and address translation
//!
//! Design: One zeroed allocation from the system allocator, sized once at
//! setup and never grown. Locations inside it are named either by physical
//! pointer or by "virtual address", the byte offset from the arena base.
//! Virtual address 0 is the null sentinel; it is never a heap location
//! because the bitmap always sits in front of the heap.

use core::ptr::NonNull;
use std::alloc::{alloc_zeroed, dealloc, Layout};

use crate::error::HeapError;
use crate::logging::debug;

/// Heap machine word. Virtual addresses and tagged VM values both fit in one.
pub type Word = u32;

/// Byte offset from the arena base
pub type VAddr = Word;

/// Bytes per word
pub const WORD_BYTES: usize = core::mem::size_of::<Word>();

/// Bits per word (bitmap coverage per bitmap word)
pub const WORD_BITS: usize = Word::BITS as usize;

/// "No block / no link" sentinel
pub const NULL_VADDR: VAddr = 0;

/// Raw arena memory owned by the heap manager
pub struct Arena {
    start: NonNull<Word>,
    layout: Layout,
}

// Safety: the arena exclusively owns its allocation; all access goes through
// `&self` / `&mut self`.
unsafe impl Send for Arena {}

impl Arena {
    /// Allocate a zeroed arena of `total_bytes`
    ///
    /// The size must be a non-zero multiple of the word size, and every byte
    /// offset inside the arena must be representable as a `VAddr`.
    pub fn new(total_bytes: usize) -> Result<Self, HeapError> {
        if total_bytes == 0
            || total_bytes % WORD_BYTES != 0
            || total_bytes > VAddr::MAX as usize
        {
            return Err(HeapError::InvalidArenaSize { bytes: total_bytes });
        }

        let layout = Layout::from_size_align(total_bytes, core::mem::align_of::<Word>())
            .map_err(|_| HeapError::InvalidArenaSize { bytes: total_bytes })?;

        let raw = unsafe { alloc_zeroed(layout) } as *mut Word;
        let start = NonNull::new(raw).ok_or(HeapError::ArenaAllocation { bytes: total_bytes })?;

        debug!(bytes = total_bytes, base = ?start, "Arena allocated");
        Ok(Self { start, layout })
    }

    /// First word of the arena
    #[inline]
    pub fn start(&self) -> *mut Word {
        self.start.as_ptr()
    }

    /// One past the last word of the arena
    #[inline]
    pub fn end(&self) -> *mut Word {
        self.start.as_ptr().wrapping_add(self.len_words())
    }

    /// Arena size in bytes
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.layout.size()
    }

    /// Arena size in words
    #[inline]
    pub fn len_words(&self) -> usize {
        self.layout.size() / WORD_BYTES
    }

    #[inline]
    pub fn words(&self) -> &[Word] {
        unsafe { core::slice::from_raw_parts(self.start.as_ptr(), self.len_words()) }
    }

    #[inline]
    pub fn words_mut(&mut self) -> &mut [Word] {
        unsafe { core::slice::from_raw_parts_mut(self.start.as_ptr(), self.len_words()) }
    }

    /// Physical pointer -> virtual address (pure offset, unchecked)
    #[inline]
    pub fn to_virtual(&self, ptr: *const Word) -> VAddr {
        (ptr as usize).wrapping_sub(self.start.as_ptr() as usize) as VAddr
    }

    /// Virtual address -> physical pointer (pure offset, unchecked)
    #[inline]
    pub fn to_physical(&self, vaddr: VAddr) -> *mut Word {
        self.start.as_ptr().cast::<u8>().wrapping_add(vaddr as usize).cast::<Word>()
    }

    /// Word index of a virtual address
    #[inline]
    pub(crate) fn index_of_vaddr(vaddr: VAddr) -> usize {
        vaddr as usize / WORD_BYTES
    }

    /// Virtual address of a word index
    #[inline]
    pub(crate) fn vaddr_of_index(index: usize) -> VAddr {
        (index * WORD_BYTES) as VAddr
    }

    /// Word index of a pointer, if it is word-aligned and inside the arena
    pub(crate) fn index_of(&self, ptr: *const Word) -> Option<usize> {
        let offset = (ptr as usize).checked_sub(self.start.as_ptr() as usize)?;
        if offset % WORD_BYTES != 0 || offset >= self.size_bytes() {
            return None;
        }
        Some(offset / WORD_BYTES)
    }

    /// Signed byte distance from the arena base, for diagnostics
    pub(crate) fn offset_of(&self, ptr: *const Word) -> isize {
        (ptr as isize).wrapping_sub(self.start.as_ptr() as isize)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        debug!(bytes = self.layout.size(), "Arena released");
        unsafe {
            dealloc(self.start.as_ptr() as *mut u8, self.layout);
        }
    }
}
