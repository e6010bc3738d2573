//! Fixed-capacity element blocks and the block chain that owns them.
//!
//! A [`Block`] is one contiguous allocation: a small header padded to
//! [`block_align`](crate::align::block_align) followed by `capacity`
//! equally sized element slots. A [`BlockAllocator`] keeps an ordered list
//! of blocks for one element layout, growing by appending blocks and
//! shrinking by releasing them from the tail.
//!
//! Blocks construct every slot when they are created and drop every slot
//! when they are released, so a slot always holds a valid value of the
//! element type: its default on first use, stale content afterwards.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::mem::{align_of, needs_drop, size_of};
use std::ptr::NonNull;

use crate::align::{block_align, header_span};
use crate::error::{PoolError, Result};
use crate::raw::RawRegion;

/// How to size, construct and destroy one element in place.
///
/// This is what lets the block layer stay untyped: every element type gets
/// the same block code, parameterised by a pair of function pointers.
#[derive(Clone, Copy, Debug)]
pub struct ElementLayout {
    size: usize,
    align: usize,
    construct: unsafe fn(*mut u8),
    destroy: Option<unsafe fn(*mut u8)>,
}

unsafe fn construct_default<T: Default>(slot: *mut u8) {
    // SAFETY: caller passes a slot sized and aligned for `T`.
    unsafe { slot.cast::<T>().write(T::default()) };
}

unsafe fn destroy_in_place<T>(slot: *mut u8) {
    // SAFETY: caller passes a slot holding a constructed `T`.
    unsafe { std::ptr::drop_in_place(slot.cast::<T>()) };
}

impl ElementLayout {
    /// Layout for elements of type `T`, constructed with `T::default()`.
    ///
    /// `T: Send` is required because blocks may move between threads
    /// together with the pool that owns them.
    pub fn of<T: Default + Send>() -> Self {
        Self {
            size: size_of::<T>(),
            align: align_of::<T>(),
            construct: construct_default::<T>,
            destroy: if needs_drop::<T>() {
                Some(destroy_in_place::<T>)
            } else {
                None
            },
        }
    }

    /// Size of one element slot in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Required alignment of one element slot.
    pub fn align(&self) -> usize {
        self.align
    }
}

/// Header written at the start of every block region.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BlockHeader {
    /// Number of element slots in the block.
    capacity: usize,
    /// Size of one slot in bytes.
    element_size: usize,
    /// Position of the block in its chain.
    index: usize,
}

/// A single contiguous run of element slots.
///
/// Capacity and base address are fixed for the lifetime of the block.
/// Blocks are created and released as whole units only.
pub struct Block {
    region: RawRegion,
    /// First element slot, `header_span` bytes into the region.
    elements: NonNull<u8>,
    capacity: usize,
    element: ElementLayout,
    /// Slots constructed so far. Equals `capacity` once creation finishes;
    /// smaller only while unwinding out of a panicking constructor.
    constructed: usize,
}

impl Block {
    /// Region layout and element offset for a block of `capacity` slots.
    fn layout_for(capacity: usize, element: &ElementLayout) -> Result<(Layout, usize)> {
        let overflow = || PoolError::LayoutOverflow {
            elements: capacity,
            element_size: element.size,
        };
        let offset = header_span(size_of::<BlockHeader>(), element.align);
        let run = element.size.checked_mul(capacity).ok_or_else(overflow)?;
        let total = offset.checked_add(run).ok_or_else(overflow)?;
        let layout =
            Layout::from_size_align(total, block_align(element.align)).map_err(|_| overflow())?;
        Ok((layout, offset))
    }

    /// Allocate a block of `capacity` slots and construct each one.
    pub fn new(index: usize, capacity: usize, element: ElementLayout) -> Result<Self> {
        let (layout, offset) = Self::layout_for(capacity, &element)?;
        let region = RawRegion::allocate(layout)?;
        // SAFETY: the region is at least `offset` bytes long and aligned to
        // `block_align`, which is at least the header's alignment.
        unsafe {
            region.as_ptr().cast::<BlockHeader>().write(BlockHeader {
                capacity,
                element_size: element.size,
                index,
            });
        }
        // SAFETY: `offset <= layout.size()` and the base pointer is non-null.
        let elements = unsafe { NonNull::new_unchecked(region.as_ptr().add(offset)) };

        let mut block = Self {
            region,
            elements,
            capacity,
            element,
            constructed: 0,
        };
        while block.constructed < capacity {
            let slot = block.slot(block.constructed);
            // SAFETY: `slot` is in bounds, aligned for the element type and
            // not yet constructed. If the constructor panics, `block` drops
            // only the slots counted in `constructed`.
            unsafe { (block.element.construct)(slot.as_ptr()) };
            block.constructed += 1;
        }
        Ok(block)
    }

    fn header(&self) -> BlockHeader {
        // SAFETY: the header was written in `new` and is never modified.
        unsafe { self.region.as_ptr().cast::<BlockHeader>().read() }
    }

    /// Number of element slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Position of this block in its chain, as recorded in the header.
    pub fn index(&self) -> usize {
        self.header().index
    }

    /// Address of the first element slot.
    pub fn element_run(&self) -> *const u8 {
        self.elements.as_ptr()
    }

    /// Pointer to slot `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= capacity`.
    pub fn slot(&self, offset: usize) -> NonNull<u8> {
        assert!(
            offset < self.capacity,
            "slot {offset} out of range for block of {}",
            self.capacity
        );
        // SAFETY: `offset < capacity`, so the address lies inside the
        // element run of this block's region.
        unsafe { NonNull::new_unchecked(self.elements.as_ptr().add(offset * self.element.size)) }
    }

    /// Bytes held by this block, header included.
    pub fn memory_bytes(&self) -> usize {
        self.region.layout().size()
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if let Some(destroy) = self.element.destroy {
            for offset in 0..self.constructed {
                let slot = self.slot(offset);
                // SAFETY: slots `0..constructed` hold live values and are
                // dropped exactly once, here.
                unsafe { destroy(slot.as_ptr()) };
            }
        }
    }
}

// SAFETY: a block exclusively owns its region and the values in it. The
// typed pool that holds a block carries the element type's own `Send`
// bound, and `ElementLayout::of` requires `T: Send`.
unsafe impl Send for Block {}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header = self.header();
        f.debug_struct("Block")
            .field("index", &header.index)
            .field("capacity", &header.capacity)
            .field("element_size", &header.element_size)
            .finish()
    }
}

/// Ordered chain of [`Block`]s for one element layout.
///
/// Grows by appending whole blocks, each holding a multiple of
/// `block_unit` elements. Shrinks only from the tail. Whether a trailing
/// block still holds vended elements is the caller's concern: the typed
/// pool never asks to shrink below its allocated count.
pub struct BlockAllocator {
    element: ElementLayout,
    block_unit: usize,
    blocks: Vec<Block>,
    capacity: usize,
}

impl BlockAllocator {
    /// Create an empty chain. `block_unit` is clamped to at least one.
    pub fn new(element: ElementLayout, block_unit: usize) -> Self {
        Self {
            element,
            block_unit: block_unit.max(1),
            blocks: Vec::new(),
            capacity: 0,
        }
    }

    /// Append one block holding at least `min_elements` slots.
    ///
    /// The block size is `min_elements` rounded up to a multiple of the
    /// block unit. Returns the number of slots added (zero for a zero
    /// request). On failure nothing is appended.
    pub fn grow(&mut self, min_elements: usize) -> Result<usize> {
        if min_elements == 0 {
            return Ok(0);
        }
        let count = min_elements
            .div_ceil(self.block_unit)
            .checked_mul(self.block_unit)
            .ok_or(PoolError::LayoutOverflow {
                elements: min_elements,
                element_size: self.element.size,
            })?;
        let block = Block::new(self.blocks.len(), count, self.element)?;
        self.blocks.push(block);
        self.capacity += count;
        Ok(count)
    }

    /// Release trailing blocks while the remaining capacity stays at or
    /// above `target`. Returns the number of slots released.
    pub fn shrink_to(&mut self, target: usize) -> usize {
        let mut released = 0;
        while let Some(last) = self.blocks.last() {
            let last_capacity = last.capacity();
            if self.capacity - last_capacity < target {
                break;
            }
            self.blocks.pop();
            self.capacity -= last_capacity;
            released += last_capacity;
        }
        released
    }

    /// Release every block.
    pub fn release_all(&mut self) {
        self.blocks.clear();
        self.capacity = 0;
    }

    /// Total slots across all blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Element layout served by this chain.
    pub fn element(&self) -> &ElementLayout {
        &self.element
    }

    /// The blocks in chain order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total memory held by the chain in bytes, headers included.
    pub fn memory_bytes(&self) -> usize {
        self.blocks.iter().map(Block::memory_bytes).sum()
    }

    /// Resolve a chain-wide slot index to its address.
    pub fn slot(&self, mut index: usize) -> Option<NonNull<u8>> {
        for block in &self.blocks {
            if index < block.capacity() {
                return Some(block.slot(index));
            }
            index -= block.capacity();
        }
        None
    }
}

impl std::fmt::Debug for BlockAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("block_unit", &self.block_unit)
            .field("capacity", &self.capacity)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::ALIGNMENT_FLOOR;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn block_constructs_every_slot_with_default() {
        let block = Block::new(0, 8, ElementLayout::of::<u64>()).unwrap();
        for i in 0..8 {
            // SAFETY: slot holds a constructed u64.
            let value = unsafe { block.slot(i).cast::<u64>().read() };
            assert_eq!(value, 0);
        }
    }

    #[test]
    fn block_header_records_index() {
        let block = Block::new(3, 4, ElementLayout::of::<u32>()).unwrap();
        assert_eq!(block.index(), 3);
        assert_eq!(block.capacity(), 4);
    }

    #[test]
    fn element_run_is_aligned_to_floor() {
        let block = Block::new(0, 16, ElementLayout::of::<u8>()).unwrap();
        assert_eq!(block.element_run() as usize % ALIGNMENT_FLOOR, 0);
    }

    #[test]
    fn over_aligned_elements_are_aligned() {
        #[derive(Default)]
        #[repr(align(128))]
        struct Wide(#[allow(dead_code)] u8);

        let block = Block::new(0, 5, ElementLayout::of::<Wide>()).unwrap();
        for i in 0..5 {
            assert_eq!(block.slot(i).as_ptr() as usize % 128, 0);
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn slot_past_capacity_panics() {
        let block = Block::new(0, 2, ElementLayout::of::<u32>()).unwrap();
        let _ = block.slot(2);
    }

    #[test]
    fn dropping_block_drops_every_slot() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        #[derive(Default)]
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let block = Block::new(0, 10, ElementLayout::of::<Counted>()).unwrap();
        drop(block);
        assert_eq!(DROPS.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn grow_rounds_to_block_unit() {
        let mut chain = BlockAllocator::new(ElementLayout::of::<u64>(), 512);
        assert_eq!(chain.grow(100).unwrap(), 512);
        assert_eq!(chain.grow(513).unwrap(), 1024);
        assert_eq!(chain.capacity(), 1536);
        assert_eq!(chain.block_count(), 2);
    }

    #[test]
    fn grow_zero_is_noop() {
        let mut chain = BlockAllocator::new(ElementLayout::of::<u64>(), 16);
        assert_eq!(chain.grow(0).unwrap(), 0);
        assert_eq!(chain.block_count(), 0);
    }

    #[test]
    fn grow_overflow_leaves_chain_intact() {
        let mut chain = BlockAllocator::new(ElementLayout::of::<u64>(), 16);
        chain.grow(16).unwrap();
        let result = chain.grow(usize::MAX / 4);
        assert!(matches!(result, Err(PoolError::LayoutOverflow { .. })));
        assert_eq!(chain.capacity(), 16);
        assert_eq!(chain.block_count(), 1);
    }

    #[test]
    fn shrink_releases_only_trailing_blocks() {
        let mut chain = BlockAllocator::new(ElementLayout::of::<u32>(), 1);
        chain.grow(100).unwrap();
        chain.grow(50).unwrap();
        chain.grow(25).unwrap();

        // 175 - 25 = 150 >= 120 releases the last block; 150 - 50 = 100 < 120 stops.
        assert_eq!(chain.shrink_to(120), 25);
        assert_eq!(chain.capacity(), 150);
        assert_eq!(chain.block_count(), 2);
    }

    #[test]
    fn shrink_to_zero_releases_everything() {
        let mut chain = BlockAllocator::new(ElementLayout::of::<u32>(), 8);
        chain.grow(8).unwrap();
        chain.grow(8).unwrap();
        assert_eq!(chain.shrink_to(0), 16);
        assert_eq!(chain.capacity(), 0);
    }

    #[test]
    fn release_all_empties_chain() {
        let mut chain = BlockAllocator::new(ElementLayout::of::<u32>(), 8);
        chain.grow(8).unwrap();
        chain.release_all();
        assert_eq!(chain.capacity(), 0);
        assert_eq!(chain.memory_bytes(), 0);
    }

    #[test]
    fn slot_resolves_across_blocks() {
        let mut chain = BlockAllocator::new(ElementLayout::of::<u32>(), 4);
        chain.grow(4).unwrap();
        chain.grow(4).unwrap();
        let first = chain.blocks()[1].slot(0);
        assert_eq!(chain.slot(4), Some(first));
        assert!(chain.slot(8).is_none());
    }

    #[test]
    fn zero_sized_elements_get_page_of_slots() {
        let mut chain = BlockAllocator::new(ElementLayout::of::<()>(), 4096);
        assert_eq!(chain.grow(1).unwrap(), 4096);
        assert!(chain.memory_bytes() > 0);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn capacity_is_sum_of_block_capacities(
                unit in 1usize..64,
                requests in proptest::collection::vec(1usize..300, 1..10),
            ) {
                let mut chain = BlockAllocator::new(ElementLayout::of::<u16>(), unit);
                for &r in &requests {
                    let added = chain.grow(r).unwrap();
                    prop_assert!(added >= r);
                    prop_assert_eq!(added % unit, 0);
                }
                let sum: usize = chain.blocks().iter().map(Block::capacity).sum();
                prop_assert_eq!(chain.capacity(), sum);
            }

            #[test]
            fn shrink_never_goes_below_target(
                requests in proptest::collection::vec(1usize..200, 1..8),
                target in 0usize..1000,
            ) {
                let mut chain = BlockAllocator::new(ElementLayout::of::<u32>(), 1);
                for &r in &requests {
                    chain.grow(r).unwrap();
                }
                let before = chain.capacity();
                chain.shrink_to(target);
                prop_assert!(chain.capacity() >= target.min(before));
            }
        }
    }
}
