//! GC roots - the VM state that anchors reachability
//!
//! Exactly three roots, read once per collection in a fixed order:
//! - Local frame base
//! - Input frame base
//! - Output frame base
//!
//! A root equal to the arena base holds no live value and is skipped. The
//! collector never writes through or frees a root.

use core::ptr::NonNull;

use crate::allocator::Word;
use crate::heap::Heap;

/// Supplier of the current root pointers
pub trait RootProvider {
    fn local_base(&self) -> *const Word;
    fn input_base(&self) -> *const Word;
    fn output_base(&self) -> *const Word;

    /// All three roots in collection order
    #[inline]
    fn roots(&self) -> [*const Word; 3] {
        [self.local_base(), self.input_base(), self.output_base()]
    }
}

impl<R: RootProvider + ?Sized> RootProvider for &R {
    fn local_base(&self) -> *const Word {
        (**self).local_base()
    }

    fn input_base(&self) -> *const Word {
        (**self).input_base()
    }

    fn output_base(&self) -> *const Word {
        (**self).output_base()
    }
}

impl<R: RootProvider + ?Sized> RootProvider for Box<R> {
    fn local_base(&self) -> *const Word {
        (**self).local_base()
    }

    fn input_base(&self) -> *const Word {
        (**self).input_base()
    }

    fn output_base(&self) -> *const Word {
        (**self).output_base()
    }
}

/// Root slot selector for [`Roots`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSlot {
    Local,
    Input,
    Output,
}

/// Plain root values, for embedders that keep their registers elsewhere
#[derive(Debug, Clone, Copy)]
pub struct Roots {
    slots: [*const Word; 3],
    unset: *const Word,
}

// Safety: roots are only compared and translated to virtual addresses; the
// collector reads the blocks they name through the heap it owns.
unsafe impl Send for Roots {}

impl Roots {
    /// All roots unset for `heap`
    pub fn new(heap: &Heap) -> Self {
        let unset = heap.start() as *const Word;
        Self { slots: [unset; 3], unset }
    }

    /// Root a block in `slot`
    pub fn set(&mut self, slot: RootSlot, block: NonNull<Word>) {
        self.slots[slot as usize] = block.as_ptr();
    }

    /// Reset `slot` to the unset value
    pub fn clear(&mut self, slot: RootSlot) {
        self.slots[slot as usize] = self.unset;
    }

    pub fn get(&self, slot: RootSlot) -> Option<*const Word> {
        let ptr = self.slots[slot as usize];
        (ptr != self.unset).then_some(ptr)
    }
}

impl RootProvider for Roots {
    #[inline]
    fn local_base(&self) -> *const Word {
        self.slots[RootSlot::Local as usize]
    }

    #[inline]
    fn input_base(&self) -> *const Word {
        self.slots[RootSlot::Input as usize]
    }

    #[inline]
    fn output_base(&self) -> *const Word {
        self.slots[RootSlot::Output as usize]
    }
}
