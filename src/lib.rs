//! Marksweep - mark & sweep memory manager for a VM object heap
//!
//! One preallocated arena, split into an embedder-reserved prefix, an
//! allocation/mark bitmap and the heap proper. Blocks are handed out first-fit
//! from an address-ordered free list; when that fails the heap is marked from
//! the VM's three roots, swept with coalescing, and the request retried once.
//!
//! ```no_run
//! use marksweep::{Arena, Roots, RootSlot};
//!
//! let arena = Arena::new(64 * 1024).unwrap();
//! let start = arena.start();
//! let mut heap = arena.into_heap(start).unwrap();
//! let mut roots = Roots::new(&heap);
//!
//! let block = heap.allocate(7, 3, &roots).unwrap();
//! roots.set(RootSlot::Local, block);
//! assert_eq!(heap.block_size(block), 3);
//! assert_eq!(heap.block_tag(block), 7);
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod gc;
pub mod global;
pub mod heap;
pub mod logging;

pub use allocator::{Arena, Tag, VAddr, Word, HEADER_SIZE, MIN_BLOCK_SIZE, NULL_VADDR, TAG_NONE};
pub use config::HeapConfig;
pub use error::{fatal, HeapError};
pub use gc::{CollectionStats, GcStats, RootProvider, RootSlot, Roots, SweepStats};
pub use heap::{BlockInfo, Blocks, Heap, HeapUsage};

/// Strategy name for diagnostics
pub fn identity() -> &'static str {
    "mark & sweep garbage collector"
}
