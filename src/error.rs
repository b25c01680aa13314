//! Heap errors and the fatal abort path
//!
//! Free-list exhaustion is not an error: `Heap::try_allocate` reports it as
//! `None` and the collector reacts to it. Everything here is either a setup
//! problem reported to the embedder or the one unrecoverable condition of
//! normal operation, running out of memory after a full collection.

use crate::allocator::Tag;
use crate::logging::log_out_of_memory;

/// Heap manager errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// Arena size is zero, not word-aligned, or not addressable by a word
    InvalidArenaSize { bytes: usize },
    /// The system allocator could not provide the arena
    ArenaAllocation { bytes: usize },
    /// Heap start pointer is misaligned or outside the arena
    InvalidHeapStart { offset: isize },
    /// Not enough room after the heap start for bitmap plus one block
    HeapTooSmall { words: usize },
    /// Initial free block does not fit the header's size field
    HeapTooLarge { words: usize },
    /// `TAG_NONE` is reserved for free blocks
    ReservedTag { tag: Tag },
    /// Allocation failed even after a full collection
    OutOfMemory { requested: usize, free_words: usize },
    /// Process-wide heap used before `setup` / `set_heap_start`
    NotInitialized,
    /// Process-wide heap set up twice without `cleanup`
    AlreadyInitialized,
    /// Configuration could not be read or parsed
    Config(String),
}

impl HeapError {
    /// Whether the error must terminate the embedding process
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::ArenaAllocation { .. })
    }
}

impl core::fmt::Display for HeapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArenaSize { bytes } => {
                write!(f, "invalid arena size: {} bytes", bytes)
            }
            Self::ArenaAllocation { bytes } => {
                write!(f, "cannot allocate {} bytes of memory", bytes)
            }
            Self::InvalidHeapStart { offset } => {
                write!(f, "invalid heap start at arena offset {}", offset)
            }
            Self::HeapTooSmall { words } => {
                write!(f, "heap of {} words cannot hold a single block", words)
            }
            Self::HeapTooLarge { words } => {
                write!(f, "heap of {} words exceeds the block header size field", words)
            }
            Self::ReservedTag { tag } => {
                write!(f, "tag {} is reserved for free blocks", tag)
            }
            Self::OutOfMemory { requested, free_words } => {
                write!(
                    f,
                    "cannot allocate {} words of memory, even after GC ({} words free)",
                    requested, free_words
                )
            }
            Self::NotInitialized => write!(f, "heap is not initialized"),
            Self::AlreadyInitialized => write!(f, "heap is already initialized"),
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for HeapError {}

/// Report an unrecoverable heap error and terminate the process
///
/// No further collector work happens after this call.
pub fn fatal(err: &HeapError) -> ! {
    if let HeapError::OutOfMemory { requested, free_words } = err {
        log_out_of_memory(*requested, *free_words);
    } else {
        crate::logging::error!(event = "fatal", error = %err, "Fatal heap error");
    }

    eprintln!("\n{}", err);
    std::process::exit(1)
}
