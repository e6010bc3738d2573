//! Per-type pool allocator.
//!
//! [`TypedPoolAllocator`] vends element slots of one type from a
//! [`BlockAllocator`], tracking how many have been handed out since the last
//! reset. Vending takes `&self`, so many vended elements can be alive at
//! once, and so does `reserve`, which never releases a vended slot.
//! Everything that could invalidate or alias a vended element (`reset`,
//! `erase`, iteration, indexed access) takes `&mut self`, which the borrow
//! checker only grants once every vended reference is gone. Crate-internal
//! `*_unchecked` forms of those take `&self` for
//! [`SharedPool`](crate::SharedPool), which checks the same condition at
//! run time.

#![allow(unsafe_code)]

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::NonNull;

use tracing::{debug, trace};

use crate::block::{Block, BlockAllocator, ElementLayout};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::stats::{Counts, PoolStats};

/// Element types a pool can hold.
///
/// Pools construct every slot with `Default` when a block is created and
/// hand the same storage out again after a reset, so records should be
/// plain data whose fields the caller overwrites after vending.
pub trait PoolElement: Default + Send + 'static {}

impl<T: Default + Send + 'static> PoolElement for T {}

/// Sanitiser run on every vended element when its pool is reset.
pub type ClearFn<T> = fn(&mut T);

/// Position of the next free slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Cursor {
    /// Block holding the next slot.
    block: usize,
    /// Slots already vended from that block.
    offset: usize,
}

/// Pool allocator for elements of type `T`.
///
/// Invariants:
/// - `allocated() <= capacity()`
/// - an element returned by [`next_element`](Self::next_element) keeps its
///   address until the next `reset` or `erase`
/// - `reset` keeps every block; `erase` releases every block
pub struct TypedPoolAllocator<T> {
    blocks: RefCell<BlockAllocator>,
    cursor: Cell<Cursor>,
    allocated: Cell<usize>,
    clear: Option<ClearFn<T>>,
    config: PoolConfig,
    _marker: PhantomData<T>,
}

impl<T: PoolElement> TypedPoolAllocator<T> {
    /// Create an empty pool. No blocks are allocated until first use.
    pub fn new(config: PoolConfig, clear: Option<ClearFn<T>>) -> Result<Self> {
        config.validate()?;
        let block_unit = config.block_unit(size_of::<T>());
        Ok(Self {
            blocks: RefCell::new(BlockAllocator::new(ElementLayout::of::<T>(), block_unit)),
            cursor: Cell::new(Cursor::default()),
            allocated: Cell::new(0),
            clear,
            config,
            _marker: PhantomData,
        })
    }

    /// Create a pool and reserve its initial capacity.
    ///
    /// The reservation is `requested` raised to the configured floor.
    pub fn with_capacity(
        requested: usize,
        config: PoolConfig,
        clear: Option<ClearFn<T>>,
    ) -> Result<Self> {
        let initial = config.initial_capacity(requested);
        let pool = Self::new(config, clear)?;
        pool.reserve(initial)?;
        Ok(pool)
    }

    /// Vend the next element.
    ///
    /// Grows the pool by the configured ratio if it is full. The element
    /// holds its default value on first use and whatever the previous pass
    /// (or the clear callback) left in it afterwards; overwrite every field
    /// you rely on.
    #[allow(clippy::mut_from_ref)]
    pub fn next_element(&self) -> Result<&mut T> {
        let allocated = self.allocated.get();
        if allocated == self.capacity() {
            self.grow(self.config.exhaustion_growth(allocated))?;
        }

        let blocks = self.blocks.borrow();
        let chain = blocks.blocks();
        let mut cursor = self.cursor.get();
        while cursor.offset == chain[cursor.block].capacity() {
            cursor = Cursor {
                block: cursor.block + 1,
                offset: 0,
            };
        }
        let slot = chain[cursor.block].slot(cursor.offset);
        cursor.offset += 1;
        self.cursor.set(cursor);
        self.allocated.set(allocated + 1);

        // SAFETY: the slot holds a constructed `T` and is vended at most once
        // between resets. Its block sits before the allocated count, so
        // `reserve` never releases it; `reset` and `erase` require that no
        // vended reference is alive.
        Ok(unsafe { &mut *slot.as_ptr().cast::<T>() })
    }

    /// Make room for `n` more elements without growing when slack suffices.
    ///
    /// Callable while vended elements are alive: it only ever grows.
    pub fn prepare_to_add(&self, n: usize) -> Result<()> {
        let capacity = self.capacity();
        let allocated = self.allocated.get();
        if capacity - allocated < n {
            let target = allocated.saturating_add(n);
            self.grow(target - capacity)?;
        }
        Ok(())
    }

    /// Set the capacity to at least `n`, growing or shrinking as needed.
    ///
    /// Shrinking releases trailing blocks but never goes below the
    /// allocated count; a request below it is clamped silently. Vended
    /// slots always sit before the allocated count, so this is callable
    /// while vended elements are alive.
    pub fn reserve(&self, n: usize) -> Result<()> {
        let capacity = self.capacity();
        if n > capacity {
            self.grow(n - capacity)?;
        } else if n < capacity {
            let target = n.max(self.allocated.get());
            let released = self.blocks.borrow_mut().shrink_to(target);
            if released > 0 {
                debug!(
                    type_name = self.type_name(),
                    released,
                    capacity = self.capacity(),
                    "pool shrank"
                );
            }
        }
        Ok(())
    }

    /// Logically free every vended element. Blocks are kept.
    ///
    /// Runs the clear callback, if any, on each vended element first.
    pub fn reset(&mut self) {
        // SAFETY: `&mut self` outlives every vended reference.
        unsafe { self.reset_unchecked() }
    }

    /// [`reset`](Self::reset) through a shared borrow.
    ///
    /// # Safety
    ///
    /// No reference to a vended element may be alive.
    pub(crate) unsafe fn reset_unchecked(&self) {
        let allocated = self.allocated.get();
        if let Some(clear) = self.clear {
            // SAFETY: forwarded from the caller.
            for element in unsafe { self.iter_mut_unchecked() } {
                clear(element);
            }
        }
        self.allocated.set(0);
        self.cursor.set(Cursor::default());
        trace!(type_name = self.type_name(), allocated, "pool reset");
    }

    /// Release every block. Capacity and allocated count drop to zero.
    pub fn erase(&mut self) {
        // SAFETY: `&mut self` outlives every vended reference.
        unsafe { self.erase_unchecked() }
    }

    /// [`erase`](Self::erase) through a shared borrow.
    ///
    /// # Safety
    ///
    /// No reference to a vended element may be alive.
    pub(crate) unsafe fn erase_unchecked(&self) {
        let released = self.capacity();
        self.blocks.borrow_mut().release_all();
        self.allocated.set(0);
        self.cursor.set(Cursor::default());
        debug!(type_name = self.type_name(), released, "pool erased");
    }

    /// Iterate the vended elements, most recently vended first.
    pub fn iter(&mut self) -> Iter<'_, T> {
        // SAFETY: `&mut self` rules out vended `&mut T` for the iterator's life.
        unsafe { self.iter_unchecked() }
    }

    /// [`iter`](Self::iter) through a shared borrow.
    ///
    /// # Safety
    ///
    /// No mutable reference to a vended element may be alive while the
    /// iterator or its items are.
    pub(crate) unsafe fn iter_unchecked(&self) -> Iter<'_, T> {
        Iter {
            raw: self.raw_iter(),
            _marker: PhantomData,
        }
    }

    /// Mutably iterate the vended elements, most recently vended first.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        // SAFETY: as for `iter`.
        unsafe { self.iter_mut_unchecked() }
    }

    /// [`iter_mut`](Self::iter_mut) through a shared borrow.
    ///
    /// # Safety
    ///
    /// No reference to a vended element may be alive while the iterator or
    /// its items are.
    pub(crate) unsafe fn iter_mut_unchecked(&self) -> IterMut<'_, T> {
        IterMut {
            raw: self.raw_iter(),
            _marker: PhantomData,
        }
    }

    fn raw_iter(&self) -> RawIter<'_> {
        RawIter::new(&self.blocks, self.cursor.get(), self.allocated.get())
    }

    /// The `index`-th vended element, in vending order.
    ///
    /// Takes `&mut self` because vended elements are handed out as `&mut T`.
    pub fn get(&mut self, index: usize) -> Option<&T> {
        self.get_mut(index).map(|element| &*element)
    }

    /// Mutable form of [`get`](Self::get).
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        // SAFETY: `&mut self` rules out any other live reference into the pool.
        unsafe { self.get_unchecked(index) }
    }

    /// [`get_mut`](Self::get_mut) through a shared borrow.
    ///
    /// # Safety
    ///
    /// No reference to a vended element may be alive while the result is.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get_unchecked(&self, index: usize) -> Option<&mut T> {
        if index >= self.allocated.get() {
            return None;
        }
        let slot = self.blocks.borrow().slot(index)?;
        // SAFETY: `index < allocated`, so the slot holds a constructed `T`;
        // the caller guarantees exclusivity.
        Some(unsafe { &mut *slot.as_ptr().cast::<T>() })
    }

    /// Total slots, vended or not.
    pub fn capacity(&self) -> usize {
        self.blocks.borrow().capacity()
    }

    /// Slots vended since the last reset.
    pub fn allocated(&self) -> usize {
        self.allocated.get()
    }

    /// The clear callback registered at creation.
    pub fn clear_callback(&self) -> Option<ClearFn<T>> {
        self.clear
    }

    /// Configuration the pool was created with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Name of the element type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    /// Element, byte and block usage.
    pub fn stats(&self) -> PoolStats {
        let blocks = self.blocks.borrow();
        let allocated = self.allocated.get();
        let capacity = blocks.capacity();
        let bytes_total = blocks.memory_bytes();
        let bytes_in_use = allocated * size_of::<T>();
        let blocks_total = blocks.block_count();
        let blocks_in_use = if allocated == 0 {
            0
        } else {
            self.cursor.get().block + 1
        };
        PoolStats {
            elements: Counts::new(allocated, capacity),
            bytes: Counts::new(bytes_in_use, bytes_total),
            blocks: Counts::new(blocks_in_use, blocks_total),
        }
    }

    fn grow(&self, min_elements: usize) -> Result<()> {
        let (added, capacity) = {
            let mut blocks = self.blocks.borrow_mut();
            let added = blocks.grow(min_elements)?;
            (added, blocks.capacity())
        };
        debug!(type_name = self.type_name(), added, capacity, "pool grew");
        Ok(())
    }
}

impl<T> fmt::Debug for TypedPoolAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedPoolAllocator")
            .field("type_name", &type_name::<T>())
            .field("allocated", &self.allocated.get())
            .field("blocks", &self.blocks)
            .finish()
    }
}

/// Walks vended slots newest-first across the block chain.
///
/// Borrows the chain one step at a time, so other holders of the pool may
/// vend (and grow it) between steps. Blocks at or before the cursor block
/// are never released while elements are vended, so the walk stays valid.
struct RawIter<'a> {
    blocks: &'a RefCell<BlockAllocator>,
    block: usize,
    offset: usize,
    remaining: usize,
}

impl<'a> RawIter<'a> {
    fn new(blocks: &'a RefCell<BlockAllocator>, cursor: Cursor, remaining: usize) -> Self {
        Self {
            blocks,
            block: cursor.block,
            offset: cursor.offset,
            remaining,
        }
    }

    fn next_slot(&mut self) -> Option<NonNull<u8>> {
        if self.remaining == 0 {
            return None;
        }
        let blocks = self.blocks.borrow();
        let chain: &[Block] = blocks.blocks();
        // Blocks before the cursor block are fully vended.
        while self.offset == 0 {
            self.block -= 1;
            self.offset = chain[self.block].capacity();
        }
        self.offset -= 1;
        self.remaining -= 1;
        Some(chain[self.block].slot(self.offset))
    }
}

/// Shared iterator over vended elements. See [`TypedPoolAllocator::iter`].
pub struct Iter<'a, T> {
    raw: RawIter<'a>,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.raw.next_slot()?;
        // SAFETY: vended slots hold constructed values; whoever built the
        // iterator guarantees no `&mut T` to them is alive for `'a`.
        Some(unsafe { &*slot.as_ptr().cast::<T>() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining, Some(self.raw.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// Mutable iterator over vended elements. See [`TypedPoolAllocator::iter_mut`].
pub struct IterMut<'a, T> {
    raw: RawIter<'a>,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.raw.next_slot()?;
        // SAFETY: each slot is yielded once and holds a constructed value;
        // whoever built the iterator guarantees exclusivity for `'a`.
        Some(unsafe { &mut *slot.as_ptr().cast::<T>() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining, Some(self.raw.remaining))
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}
