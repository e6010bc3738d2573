//! Call-site access to a typed pool.
//!
//! A [`PoolHandle`] resolves the pool for its element type in one arena
//! and forwards every pool operation to it. Resolution happens once, at
//! construction:
//!
//! ```text
//!   PoolHandle::for_slot(slot)
//!       |
//!       v
//!   ArenaRegistry::resolve(slot) ---> Arena
//!                                       |
//!                     get_or_create::<T>()   (creation lock on first use)
//!                                       |
//!                                       v
//!                   PoolCell<T>::lock_arc()  (re-entrant)
//!                                       |
//!                                       v
//!                    PoolHandle<T>  (lock-free forwarding)
//! ```
//!
//! # Sharing
//!
//! Every handle for one (arena, type) works on the same pool, so they all
//! observe the same capacity, allocated count and elements, whether they
//! are alive one after another or at the same time. The pool lock is
//! re-entrant: any number of handles on one thread hold it together, and
//! no operation on them blocks. Handles on another thread wait until this
//! thread's handles are gone; the `try_*` builder methods return
//! [`PoolError::PoolBusy`] instead of waiting.
//!
//! Vending and growth work from any handle at any time. `reset`, `erase`,
//! iteration and indexed access return [`PoolError::ElementsOnLoan`] while
//! another live handle may still hold references into the pool; see
//! [`shared`](crate::shared).
//!
//! # Lock ordering
//!
//! Because construction may wait on another thread, two threads that each
//! hold a handle for one type and then ask for a handle for the other type
//! in the opposite order deadlock. Resolve every handle a call site needs
//! in one fixed order, or use [`PoolSet`](crate::PoolSet), which sorts
//! them. Handles are meant to live for one processing pass; never keep one
//! in a static.

use std::fmt;
use std::sync::Arc;

use parking_lot::lock_api::ArcReentrantMutexGuard;
use parking_lot::{RawMutex, RawThreadId};
use tracing::warn;

use crate::arena::Arena;
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::id::SlotIndex;
use crate::registry::ArenaRegistry;
use crate::shared::{Loan, PoolCell, SharedPool};
use crate::stats::PoolStats;
use crate::typed::{ClearFn, Iter, IterMut, PoolElement};

/// A pool held by the current thread for the guard's lifetime.
pub type PoolGuard<T> = ArcReentrantMutexGuard<RawMutex, RawThreadId, SharedPool<T>>;

/// Construction-time parameters for a [`PoolHandle`].
///
/// `capacity` is a request, raised to the configured floor and honoured
/// only if the pool is currently smaller. `clear` and `config` take effect
/// only for the handle that creates the pool.
pub struct PoolBuilder<T> {
    capacity: usize,
    clear: Option<ClearFn<T>>,
    config: PoolConfig,
}

impl<T: PoolElement> PoolBuilder<T> {
    /// Builder with no capacity request, no clear callback and the
    /// default configuration.
    pub fn new() -> Self {
        Self {
            capacity: 0,
            clear: None,
            config: PoolConfig::default(),
        }
    }

    /// Request room for `n` elements.
    pub fn capacity(mut self, n: usize) -> Self {
        self.capacity = n;
        self
    }

    /// Run `clear` on every vended element when the pool is reset.
    pub fn clear(mut self, clear: ClearFn<T>) -> Self {
        self.clear = Some(clear);
        self
    }

    /// Growth and sizing parameters for a newly created pool.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve the pool in the global registry's default arena.
    pub fn build(self) -> Result<PoolHandle<T>> {
        let arena = ArenaRegistry::global().default_arena();
        self.build_in(&arena)
    }

    /// Resolve the pool in the arena `registry` holds for `slot`.
    pub fn build_for_slot(
        self,
        registry: &ArenaRegistry,
        slot: SlotIndex,
    ) -> Result<PoolHandle<T>> {
        let arena = registry.resolve(Some(slot));
        self.build_in(&arena)
    }

    /// Resolve the pool in the calling thread's current arena, or the
    /// global default arena if none is current.
    pub fn build_current(self) -> Result<PoolHandle<T>> {
        let arena = current_or_default();
        self.build_in(&arena)
    }

    /// Resolve the pool in `arena`, waiting while handles on another thread
    /// hold it.
    pub fn build_in(self, arena: &Arc<Arena>) -> Result<PoolHandle<T>> {
        let pool = arena.get_or_create(&self.config, self.clear)?;
        let guard = pool.lock_arc();
        self.finish(arena, guard)
    }

    /// Non-blocking [`build`](Self::build).
    pub fn try_build(self) -> Result<PoolHandle<T>> {
        let arena = ArenaRegistry::global().default_arena();
        self.try_build_in(&arena)
    }

    /// Non-blocking [`build_for_slot`](Self::build_for_slot).
    pub fn try_build_for_slot(
        self,
        registry: &ArenaRegistry,
        slot: SlotIndex,
    ) -> Result<PoolHandle<T>> {
        let arena = registry.resolve(Some(slot));
        self.try_build_in(&arena)
    }

    /// Non-blocking [`build_in`](Self::build_in).
    ///
    /// Fails with [`PoolError::PoolBusy`] if handles on another thread hold
    /// the pool. Pool creation itself may still wait on the creation lock.
    pub fn try_build_in(self, arena: &Arc<Arena>) -> Result<PoolHandle<T>> {
        let pool: Arc<PoolCell<T>> = arena.get_or_create(&self.config, self.clear)?;
        let guard = pool.try_lock_arc().ok_or_else(|| PoolError::PoolBusy {
            type_name: std::any::type_name::<T>(),
            arena: arena.name().to_owned(),
        })?;
        self.finish(arena, guard)
    }

    fn finish(self, arena: &Arc<Arena>, pool: PoolGuard<T>) -> Result<PoolHandle<T>> {
        if let Some(requested) = self.clear {
            let bound = pool.clear_callback();
            if !bound.is_some_and(|bound| std::ptr::fn_addr_eq(bound, requested)) {
                warn!(
                    arena = arena.name(),
                    type_name = pool.type_name(),
                    bound = bound.is_some(),
                    "clear callback ignored, pool already created"
                );
            }
        }

        let wanted = pool.config().initial_capacity(self.capacity);
        if pool.capacity() < wanted {
            pool.reserve(wanted)?;
        }

        Ok(PoolHandle {
            arena: Arc::clone(arena),
            pool,
            loan: Loan::default(),
        })
    }
}

impl<T: PoolElement> Default for PoolBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("capacity", &self.capacity)
            .field("clear", &self.clear.is_some())
            .field("config", &self.config)
            .finish()
    }
}

fn current_or_default() -> Arc<Arena> {
    Arena::current().unwrap_or_else(|| ArenaRegistry::global().default_arena())
}

/// Lock-free access to the shared pool for `T` in one arena.
///
/// The handle is tied to the thread that built it.
pub struct PoolHandle<T: PoolElement> {
    arena: Arc<Arena>,
    pool: PoolGuard<T>,
    loan: Loan,
}

impl<T: PoolElement> PoolHandle<T> {
    /// Handle on the global default arena.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Handle on the global default arena with room for `n` elements.
    pub fn with_capacity(n: usize) -> Result<Self> {
        Self::builder().capacity(n).build()
    }

    /// Handle on the arena the global registry holds for `slot`.
    pub fn for_slot(slot: SlotIndex) -> Result<Self> {
        Self::builder().build_for_slot(ArenaRegistry::global(), slot)
    }

    /// Handle on an explicit arena.
    pub fn in_arena(arena: &Arc<Arena>) -> Result<Self> {
        Self::builder().build_in(arena)
    }

    /// Handle on the calling thread's current arena.
    pub fn current() -> Result<Self> {
        Self::builder().build_current()
    }

    /// Start configuring a handle.
    pub fn builder() -> PoolBuilder<T> {
        PoolBuilder::new()
    }

    /// See [`TypedPoolAllocator::next_element`](crate::TypedPoolAllocator::next_element).
    #[allow(clippy::mut_from_ref)]
    pub fn next_element(&self) -> Result<&mut T> {
        self.pool.next_element(&self.loan)
    }

    /// See [`TypedPoolAllocator::reserve`](crate::TypedPoolAllocator::reserve).
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        self.pool.reserve(n)
    }

    /// See [`TypedPoolAllocator::prepare_to_add`](crate::TypedPoolAllocator::prepare_to_add).
    pub fn prepare_to_add(&self, n: usize) -> Result<()> {
        self.pool.prepare_to_add(n)
    }

    /// Logically free every vended element, running the clear callback.
    ///
    /// Fails with [`PoolError::ElementsOnLoan`], leaving the pool as it
    /// was, while another live handle may hold elements.
    pub fn reset(&mut self) -> Result<()> {
        self.pool.reset(&mut self.loan)
    }

    /// Release every block. Same refusal rule as [`reset`](Self::reset).
    pub fn erase(&mut self) -> Result<()> {
        self.pool.erase(&mut self.loan)
    }

    /// Total slots, vended or not.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Slots vended since the last reset.
    pub fn allocated(&self) -> usize {
        self.pool.allocated()
    }

    /// Vended elements, most recently vended first.
    ///
    /// Same refusal rule as [`reset`](Self::reset).
    pub fn iter(&mut self) -> Result<Iter<'_, T>> {
        self.pool.iter(&mut self.loan)
    }

    /// Vended elements, most recently vended first.
    pub fn iter_mut(&mut self) -> Result<IterMut<'_, T>> {
        self.pool.iter_mut(&mut self.loan)
    }

    /// The `index`-th vended element, in vending order.
    pub fn get(&mut self, index: usize) -> Result<Option<&T>> {
        Ok(self.get_mut(index)?.map(|element| &*element))
    }

    /// Mutable form of [`get`](Self::get).
    pub fn get_mut(&mut self, index: usize) -> Result<Option<&mut T>> {
        self.pool.get_mut(&mut self.loan, index)
    }

    /// Element, byte and block usage.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Name of the element type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.pool.type_name()
    }

    /// The arena this handle resolved to.
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }
}

impl<T: PoolElement> Drop for PoolHandle<T> {
    fn drop(&mut self) {
        self.pool.settle(&mut self.loan);
    }
}

impl<T: PoolElement> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("arena", &self.arena.name())
            .field("pool", &*self.pool)
            .finish()
    }
}
