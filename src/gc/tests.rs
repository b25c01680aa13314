//! Collector tests - marking, sweeping and the allocate/collect/retry protocol
//!
//! Heaps are 1024-byte arenas: 8 bitmap words, then 248 heap words whose first
//! payload is word 9 (vaddr 36).

use super::*;
use crate::allocator::{Arena, VAddr, CATCH_ALL_CLASS, HEADER_SIZE, WORD_BYTES};
use crate::heap::BlockInfo;
use std::cell::RefCell;

fn heap_of(bytes: usize) -> Heap {
    let arena = Arena::new(bytes).expect("arena");
    let start = arena.start();
    arena.into_heap(start).expect("heap")
}

fn vaddr(index: usize) -> VAddr {
    (index * WORD_BYTES) as VAddr
}

/// Allocate without collecting and fill the payload with odd scalars
fn alloc_scalars(heap: &mut Heap, tag: Tag, size: usize) -> NonNull<Word> {
    let block = heap.try_allocate(tag, size).expect("alloc");
    heap.payload_mut(block).fill(1);
    block
}

fn assert_conserved(heap: &Heap) {
    let usage = heap.usage();
    assert_eq!(usage.block_words(), usage.heap_words, "heap words lost or double-counted");
}

#[cfg(test)]
mod mark_tests {
    use super::*;

    #[test]
    fn test_unrooted_blocks_are_reclaimed() {
        let mut heap = heap_of(1024);
        let roots = Roots::new(&heap);
        for _ in 0..3 {
            alloc_scalars(&mut heap, 7, 3);
        }

        let report = heap.collect(&roots);
        assert_eq!(report.marked_blocks, 0);
        assert_eq!(report.sweep.reclaimed_blocks, 3);

        let blocks: Vec<_> = heap.blocks().collect();
        assert_eq!(
            blocks,
            vec![BlockInfo { vaddr: vaddr(9), tag: TAG_NONE, size: 247, bit_set: false }]
        );
        assert_eq!(heap.free_list(CATCH_ALL_CLASS), vec![vaddr(9)]);
    }

    #[test]
    fn test_rooted_block_survives_unchanged() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let garbage = alloc_scalars(&mut heap, 3, 2);
        let live = heap.try_allocate(9, 3).expect("alloc");
        heap.payload_mut(live).copy_from_slice(&[5, 0, 8]);
        roots.set(RootSlot::Input, live);

        let report = heap.collect(&roots);
        assert_eq!(report.marked_blocks, 1);
        assert_eq!(report.sweep.live_blocks, 1);
        assert_eq!(report.sweep.reclaimed_blocks, 1);

        assert_eq!(heap.block_tag(live), 9);
        assert_eq!(heap.block_size(live), 3);
        assert_eq!(heap.payload(live), &[5, 0, 8]);

        // Re-armed for the next cycle
        let info = heap.blocks().find(|b| b.vaddr == heap.vaddr_of(live)).expect("live block");
        assert!(info.bit_set);

        let freed = heap.blocks().find(|b| b.vaddr == heap.vaddr_of(garbage)).expect("freed block");
        assert_eq!(freed.tag, TAG_NONE);
        assert!(!freed.bit_set);
    }

    #[test]
    fn test_reachability_follows_payload_vaddrs_and_cycles() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let a = alloc_scalars(&mut heap, 1, 3);
        let b = alloc_scalars(&mut heap, 2, 3);
        let c = alloc_scalars(&mut heap, 3, 3);
        let d = alloc_scalars(&mut heap, 4, 2);

        let (va, vb, vc) = (heap.vaddr_of(a), heap.vaddr_of(b), heap.vaddr_of(c));
        heap.payload_mut(a)[1] = vb;
        heap.payload_mut(b)[0] = va; // cycle back to a
        heap.payload_mut(b)[2] = vc;
        roots.set(RootSlot::Local, a);

        let report = heap.collect(&roots);
        assert_eq!(report.marked_blocks, 3);

        for (block, tag) in [(a, 1), (b, 2), (c, 3)] {
            assert_eq!(heap.block_tag(block), tag);
        }
        assert_eq!(heap.payload(b), &[va, 1, vc]);

        let freed = heap.blocks().find(|info| info.vaddr == heap.vaddr_of(d)).expect("d");
        assert_eq!(freed.tag, TAG_NONE);
        assert_conserved(&heap);
    }

    #[test]
    fn test_misaligned_and_out_of_range_words_are_scalars() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let holder = alloc_scalars(&mut heap, 1, 3);
        let x = alloc_scalars(&mut heap, 2, 1);
        let y = alloc_scalars(&mut heap, 3, 1);

        let vx = heap.vaddr_of(x);
        let (low, _) = heap.heap_bounds();
        let vy = heap.vaddr_of(y);
        heap.payload_mut(holder).copy_from_slice(&[vx + 2, low - 4, vy + 4]);
        roots.set(RootSlot::Output, holder);

        let report = heap.collect(&roots);
        assert_eq!(report.marked_blocks, 1);

        // vx + 2 is not a multiple of 4; low - 4 lies in the bitmap;
        // vy + 4 is aligned and in range but names no block start
        let tags: Vec<_> = heap.blocks().map(|b| b.tag).collect();
        assert_eq!(tags[0], 1);
        assert!(tags[1..].iter().all(|&t| t == TAG_NONE));
    }

    #[test]
    fn test_shared_child_marked_once() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let shared = alloc_scalars(&mut heap, 5, 1);
        let left = alloc_scalars(&mut heap, 6, 1);
        let right = alloc_scalars(&mut heap, 6, 1);
        let vs = heap.vaddr_of(shared);
        heap.payload_mut(left)[0] = vs;
        heap.payload_mut(right)[0] = vs;

        roots.set(RootSlot::Local, left);
        roots.set(RootSlot::Input, right);

        let report = heap.collect(&roots);
        assert_eq!(report.marked_blocks, 3);
        assert_eq!(report.sweep.live_blocks, 3);
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let mut heap = heap_of(2 * 1024 * 1024);
        let mut roots = Roots::new(&heap);

        let mut prev: Option<VAddr> = None;
        let mut last = None;
        for _ in 0..200_000 {
            let block = heap.try_allocate(1, 1).expect("alloc");
            heap.payload_mut(block)[0] = prev.unwrap_or(1);
            prev = Some(heap.vaddr_of(block));
            last = Some(block);
        }
        roots.set(RootSlot::Local, last.expect("chain"));

        let report = heap.collect(&roots);
        assert_eq!(report.marked_blocks, 200_000);
        assert_eq!(report.sweep.reclaimed_blocks, 0);
    }
}

#[cfg(test)]
mod sweep_tests {
    use super::*;

    #[test]
    fn test_adjacent_garbage_coalesces() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let a = alloc_scalars(&mut heap, 1, 3);
        alloc_scalars(&mut heap, 1, 3);
        alloc_scalars(&mut heap, 1, 3);
        let d = alloc_scalars(&mut heap, 2, 3);
        roots.set(RootSlot::Local, d);

        heap.collect(&roots);

        let blocks: Vec<_> = heap.blocks().collect();
        assert_eq!(blocks.len(), 3);
        // 3 + 3 + 3 payload words plus two absorbed headers
        assert_eq!(blocks[0], BlockInfo { vaddr: vaddr(9), tag: TAG_NONE, size: 11, bit_set: false });
        assert_eq!(blocks[1].vaddr, heap.vaddr_of(d));
        assert_eq!(blocks[2], BlockInfo { vaddr: vaddr(25), tag: TAG_NONE, size: 231, bit_set: false });
        assert_eq!(heap.free_list(CATCH_ALL_CLASS), vec![vaddr(9), vaddr(25)]);

        // Fits only the merged block among the leading ones; first fit takes it
        let merged = heap.try_allocate(8, 11).expect("merged block");
        assert_eq!(heap.vaddr_of(merged), heap.vaddr_of(a));
        assert_eq!(heap.block_size(merged), 11);
    }

    #[test]
    fn test_garbage_merges_with_free_tail() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let a = alloc_scalars(&mut heap, 1, 3);
        alloc_scalars(&mut heap, 1, 3);
        roots.set(RootSlot::Local, a);

        heap.collect(&roots);

        // 3 freed words + header + 239-word tail
        let blocks: Vec<_> = heap.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], BlockInfo { vaddr: vaddr(13), tag: TAG_NONE, size: 243, bit_set: false });
        assert_eq!(heap.free_list(CATCH_ALL_CLASS), vec![vaddr(13)]);
    }

    #[test]
    fn test_first_fit_follows_address_order() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let a = alloc_scalars(&mut heap, 1, 5);
        let x = alloc_scalars(&mut heap, 2, 1);
        let b = alloc_scalars(&mut heap, 1, 50);
        let y = alloc_scalars(&mut heap, 2, 1);
        roots.set(RootSlot::Local, x);
        roots.set(RootSlot::Input, y);

        heap.collect(&roots);
        let (va, vb) = (heap.vaddr_of(a), heap.vaddr_of(b));
        assert!(va < vb);
        assert_eq!(heap.free_list(CATCH_ALL_CLASS), vec![va, vb, vaddr(70)]);

        let block = heap.try_allocate(4, 10).expect("alloc");
        assert_eq!(heap.vaddr_of(block), vb);
        assert_eq!(heap.block_size(block), 10);

        // Remainder of b replaces b in the list
        let rest = vb + ((10 + HEADER_SIZE) * WORD_BYTES) as VAddr;
        assert_eq!(heap.free_list(CATCH_ALL_CLASS), vec![va, rest, vaddr(70)]);
    }

    #[test]
    fn test_full_heap_of_live_blocks_empties_list() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let block = heap.try_allocate(1, 247).expect("whole heap");
        heap.payload_mut(block).fill(1);
        roots.set(RootSlot::Local, block);

        let report = heap.collect(&roots);
        assert_eq!(report.sweep.free_blocks, 0);
        assert!(heap.free_list(CATCH_ALL_CLASS).is_empty());
        assert!(heap.try_allocate(1, 1).is_none());
    }

    #[test]
    fn test_repeated_collection_changes_nothing() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let a = alloc_scalars(&mut heap, 1, 4);
        alloc_scalars(&mut heap, 1, 2);
        let c = alloc_scalars(&mut heap, 1, 6);
        alloc_scalars(&mut heap, 1, 1);
        let vc = heap.vaddr_of(c);
        heap.payload_mut(a)[0] = vc;
        roots.set(RootSlot::Local, a);

        heap.collect(&roots);
        let first: Vec<_> = heap.blocks().collect();
        let first_list = heap.free_list(CATCH_ALL_CLASS);

        for info in &first {
            if info.tag == TAG_NONE {
                assert!(!info.bit_set);
            } else {
                assert!(info.bit_set);
            }
        }

        let report = heap.collect(&roots);
        assert_eq!(report.sweep.reclaimed_blocks, 0);
        assert_eq!(heap.blocks().collect::<Vec<_>>(), first);
        assert_eq!(heap.free_list(CATCH_ALL_CLASS), first_list);
    }

    #[test]
    fn test_sweep_of_free_heap_is_stable() {
        let mut heap = heap_of(1024);
        let roots = Roots::new(&heap);
        alloc_scalars(&mut heap, 1, 10);

        heap.collect(&roots);
        let first: Vec<_> = heap.blocks().collect();
        heap.sweep();
        assert_eq!(heap.blocks().collect::<Vec<_>>(), first);
        assert_eq!(heap.free_list(CATCH_ALL_CLASS), vec![vaddr(9)]);
    }
}

#[cfg(test)]
mod orchestrator_tests {
    use super::*;

    /// Records the order the collector asks for roots
    struct RecordingRoots<'a> {
        inner: Roots,
        calls: &'a RefCell<Vec<&'static str>>,
    }

    impl RootProvider for RecordingRoots<'_> {
        fn local_base(&self) -> *const Word {
            self.calls.borrow_mut().push("local");
            self.inner.local_base()
        }

        fn input_base(&self) -> *const Word {
            self.calls.borrow_mut().push("input");
            self.inner.input_base()
        }

        fn output_base(&self) -> *const Word {
            self.calls.borrow_mut().push("output");
            self.inner.output_base()
        }
    }

    #[test]
    fn test_allocate_without_pressure_does_not_collect() {
        let mut heap = heap_of(1024);
        let calls = RefCell::new(Vec::new());
        let roots = RecordingRoots { inner: Roots::new(&heap), calls: &calls };

        let block = heap.allocate(7, 3, &roots).expect("alloc");
        assert_eq!(heap.block_size(block), 3);
        assert_eq!(heap.block_tag(block), 7);
        assert_eq!(heap.stats().collections_run, 0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_roots_fetched_once_in_order() {
        let mut heap = heap_of(1024);
        let calls = RefCell::new(Vec::new());
        let roots = RecordingRoots { inner: Roots::new(&heap), calls: &calls };

        while heap.try_allocate(1, 3).is_some() {}
        heap.allocate(1, 3, &roots).expect("retry after collection");

        assert_eq!(*calls.borrow(), vec!["local", "input", "output"]);
    }

    #[test]
    fn test_exhaustion_triggers_collection_and_retry() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let mut count = 0;
        while let Some(block) = heap.try_allocate(7, 3) {
            heap.payload_mut(block).fill(1);
            count += 1;
        }
        assert_eq!(count, 62);

        let block = heap.allocate(7, 3, &roots).expect("collected");
        roots.set(RootSlot::Local, block);

        assert_eq!(heap.stats().collections_run, 1);
        assert_eq!(heap.stats().blocks_reclaimed, 62);
        assert_eq!(heap.vaddr_of(block), vaddr(9));
        assert_eq!(heap.block_size(block), 3);
        assert_eq!(heap.block_tag(block), 7);
        assert_conserved(&heap);
    }

    #[test]
    fn test_everything_live_is_out_of_memory() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);

        let mut prev: Word = 1;
        let mut last = None;
        while let Some(block) = heap.try_allocate(7, 3) {
            heap.payload_mut(block).copy_from_slice(&[prev, 1, 1]);
            prev = heap.vaddr_of(block);
            last = Some(block);
        }
        roots.set(RootSlot::Local, last.expect("chain"));

        let err = heap.allocate(7, 3, &roots).unwrap_err();
        assert_eq!(err, HeapError::OutOfMemory { requested: 3, free_words: 0 });
        assert!(err.is_fatal());

        let stats = heap.stats();
        assert_eq!(stats.collections_run, 1);
        assert_eq!(stats.blocks_marked, 62);
        assert_eq!(stats.blocks_reclaimed, 0);
        assert_eq!(stats.failed_allocations, 1);
        assert!(heap.blocks().all(|b| b.tag == 7 && b.bit_set));
    }

    #[test]
    fn test_reserved_tag_rejected() {
        let mut heap = heap_of(1024);
        let roots = Roots::new(&heap);
        assert_eq!(
            heap.allocate(TAG_NONE, 2, &roots).unwrap_err(),
            HeapError::ReservedTag { tag: TAG_NONE }
        );
        assert_eq!(heap.stats().allocations, 0);
    }

    #[test]
    fn test_roots_value_type() {
        let mut heap = heap_of(1024);
        let mut roots = Roots::new(&heap);
        assert_eq!(roots.get(RootSlot::Local), None);
        assert_eq!(roots.local_base(), heap.start() as *const Word);

        let block = heap.try_allocate(1, 1).expect("alloc");
        roots.set(RootSlot::Output, block);
        assert_eq!(roots.get(RootSlot::Output), Some(block.as_ptr() as *const Word));

        roots.clear(RootSlot::Output);
        assert_eq!(roots.get(RootSlot::Output), None);
    }

    #[test]
    fn test_boxed_provider_is_accepted() {
        let mut heap = heap_of(1024);
        let provider: Box<dyn RootProvider> = Box::new(Roots::new(&heap));
        heap.allocate(1, 4, &provider).expect("alloc");
        heap.allocate(1, 4, &*provider).expect("alloc");
    }
}
