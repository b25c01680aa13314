//! Process-wide heap - module-level lifecycle for VM embedders
//!
//! Mirrors the classic memory-manager interface: `setup` allocates the arena,
//! `set_heap_start` carves the heap out of it, `allocate` hands out blocks and
//! aborts the process when memory runs out, `cleanup` releases everything so
//! `setup` can run again. A single mutex serializes every call.

use core::ptr::NonNull;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::allocator::{Arena, Tag, Word};
use crate::error::{fatal, HeapError};
use crate::gc::RootProvider;
use crate::heap::Heap;
use crate::logging::{debug, info};

/// Global heap state (one mutex; every operation is short or stop-the-world)
static GLOBAL: Lazy<Mutex<GlobalHeap>> = Lazy::new(|| Mutex::new(GlobalHeap::default()));

#[derive(Default)]
struct GlobalHeap {
    state: State,
    roots: Option<Box<dyn RootProvider + Send>>,
}

#[derive(Default)]
enum State {
    #[default]
    Uninitialized,
    ArenaOnly(Arena),
    Ready(Heap),
}

/// No roots registered: nothing is live during a collection
struct NoRoots(*const Word);

impl RootProvider for NoRoots {
    fn local_base(&self) -> *const Word {
        self.0
    }

    fn input_base(&self) -> *const Word {
        self.0
    }

    fn output_base(&self) -> *const Word {
        self.0
    }
}

/// Allocate the arena; an allocation failure terminates the process
pub fn setup(total_bytes: usize) -> Result<(), HeapError> {
    let mut global = GLOBAL.lock();
    if !matches!(global.state, State::Uninitialized) {
        return Err(HeapError::AlreadyInitialized);
    }

    let arena = match Arena::new(total_bytes) {
        Ok(arena) => arena,
        Err(err) if err.is_fatal() => fatal(&err),
        Err(err) => return Err(err),
    };

    info!(bytes = total_bytes, "Global heap arena set up");
    global.state = State::ArenaOnly(arena);
    Ok(())
}

/// Release the arena and forget roots; `setup` may be called again
pub fn cleanup() {
    let mut global = GLOBAL.lock();
    global.state = State::Uninitialized;
    global.roots = None;
    debug!("Global heap cleaned up");
}

/// Arena base, once set up
pub fn start() -> Result<*mut Word, HeapError> {
    match &GLOBAL.lock().state {
        State::Uninitialized => Err(HeapError::NotInitialized),
        State::ArenaOnly(arena) => Ok(arena.start()),
        State::Ready(heap) => Ok(heap.start()),
    }
}

/// One past the arena end, once set up
pub fn end() -> Result<*mut Word, HeapError> {
    match &GLOBAL.lock().state {
        State::Uninitialized => Err(HeapError::NotInitialized),
        State::ArenaOnly(arena) => Ok(arena.end()),
        State::Ready(heap) => Ok(heap.end()),
    }
}

/// Establish the heap at `ptr` inside the arena (once per setup)
pub fn set_heap_start(ptr: *const Word) -> Result<(), HeapError> {
    let mut global = GLOBAL.lock();
    let state = core::mem::take(&mut global.state);

    match state {
        State::ArenaOnly(arena) => {
            // Validate first so a rejected start keeps the arena
            if let Err(err) = Heap::geometry(&arena, ptr) {
                global.state = State::ArenaOnly(arena);
                return Err(err);
            }
            global.state = State::Ready(arena.into_heap(ptr)?);
            Ok(())
        }
        State::Ready(heap) => {
            global.state = State::Ready(heap);
            Err(HeapError::AlreadyInitialized)
        }
        State::Uninitialized => Err(HeapError::NotInitialized),
    }
}

/// Install the provider consulted for roots on every collection
pub fn set_root_provider(provider: Box<dyn RootProvider + Send>) {
    GLOBAL.lock().roots = Some(provider);
}

/// Allocate a block; running out of memory after a collection is fatal
pub fn allocate(tag: Tag, size: usize) -> Result<NonNull<Word>, HeapError> {
    let mut global = GLOBAL.lock();
    let GlobalHeap { state, roots } = &mut *global;

    let State::Ready(heap) = state else {
        return Err(HeapError::NotInitialized);
    };

    let result = match roots {
        Some(provider) => heap.allocate(tag, size, &**provider),
        None => {
            let unset = NoRoots(heap.start());
            heap.allocate(tag, size, &unset)
        }
    };

    match result {
        Err(err) if err.is_fatal() => fatal(&err),
        other => other,
    }
}

/// Run `f` against the ready heap
pub fn with_heap<T>(f: impl FnOnce(&mut Heap) -> T) -> Result<T, HeapError> {
    match &mut GLOBAL.lock().state {
        State::Ready(heap) => Ok(f(heap)),
        _ => Err(HeapError::NotInitialized),
    }
}

pub fn block_size(block: NonNull<Word>) -> Result<usize, HeapError> {
    with_heap(|heap| heap.block_size(block))
}

pub fn block_tag(block: NonNull<Word>) -> Result<Tag, HeapError> {
    with_heap(|heap| heap.block_tag(block))
}
