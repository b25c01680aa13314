//! Mark phase - reachability trace over tagged words
//!
//! A candidate is any word value. It names a block only when its virtual
//! address is a multiple of 4 (otherwise it is an immediate scalar) and, for
//! payload words, lies inside `[heap_start_v, heap_end_v)`. Marking clears the
//! block's bitmap bit, so a clear bit doubles as the "already visited" test
//! that terminates cycles and shared references.
//!
//! The trace uses an explicit work-list instead of recursion; live chains of
//! any length cannot exhaust the native stack.

use crate::allocator::{Arena, VAddr, Word};
use crate::heap::Heap;
use crate::logging::trace;

impl Heap {
    /// Mark everything reachable from one root pointer
    ///
    /// Returns the number of blocks newly visited.
    pub(crate) fn mark_root(&mut self, root: *const Word) -> usize {
        let vaddr = self.arena.to_virtual(root);
        self.mark(vaddr)
    }

    /// Mark everything reachable from `candidate`
    pub(crate) fn mark(&mut self, candidate: VAddr) -> usize {
        let mut pending = core::mem::take(&mut self.mark_stack);
        pending.clear();
        pending.push(candidate);

        let (low, high) = (self.heap_start_v, self.heap_end_v);
        let mut marked = 0;

        while let Some(vaddr) = pending.pop() {
            if vaddr & 3 != 0 {
                continue;
            }

            let block = Arena::index_of_vaddr(vaddr);
            if !self.bitmap.is_set(self.arena.words(), block) {
                continue;
            }
            self.bitmap.clear(self.arena.words_mut(), block);
            marked += 1;

            let size = self.size_at(block);
            pending.extend(
                self.arena.words()[block..block + size]
                    .iter()
                    .copied()
                    .filter(|&w| w >= low && w < high),
            );
        }

        trace!(root = candidate, marked, "Root traced");

        // Keep the grown buffer for the next collection
        self.mark_stack = pending;
        marked
    }
}
