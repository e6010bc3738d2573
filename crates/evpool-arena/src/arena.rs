//! Named collections of per-type pools.
//!
//! An [`Arena`] owns at most one [`TypedPoolAllocator`] per element type,
//! created lazily on first request. It is the unit of lifetime and of
//! bulk reset/erase: a host framework typically keeps one arena per
//! processing lane and resets it at the end of every pass.
//!
//! # Locking
//!
//! Looking up an existing pool takes the type table's read lock. Creating
//! a pool takes a process-wide lock specific to the element type, then the
//! table's write lock. Each pool sits behind its own re-entrant mutex,
//! which every [`PoolHandle`](crate::PoolHandle) into it holds for its
//! lifetime. Handles and arena-wide operations on one thread therefore
//! share the pool freely; another thread's handles wait for them.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use tracing::debug;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::id::ArenaId;
use crate::shared::{PoolCell, SharedPool};
use crate::stats::PoolStats;
use crate::typed::{ClearFn, PoolElement, TypedPoolAllocator};

/// A pool whose element type is erased.
trait ErasedPool: Send + Sync {
    /// Lock the pool for arena-wide work.
    fn hold(&self) -> Box<dyn HeldPool + '_>;
}

/// Arena-wide operations on a locked, type-erased pool.
trait HeldPool {
    fn type_name(&self) -> &'static str;
    fn loans(&self) -> usize;
    fn stats(&self) -> PoolStats;
    fn reset(&self) -> Result<()>;
    fn erase(&self) -> Result<()>;
}

impl<T: PoolElement> ErasedPool for PoolCell<T> {
    fn hold(&self) -> Box<dyn HeldPool + '_> {
        Box::new(self.lock())
    }
}

impl<T: PoolElement> HeldPool for ReentrantMutexGuard<'_, SharedPool<T>> {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn loans(&self) -> usize {
        (**self).loans()
    }

    fn stats(&self) -> PoolStats {
        (**self).stats()
    }

    fn reset(&self) -> Result<()> {
        self.reset_unlent()
    }

    fn erase(&self) -> Result<()> {
        self.erase_unlent()
    }
}

/// One pool in an arena's type table, held both typed and erased.
#[derive(Clone)]
struct PoolEntry {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedPool>,
}

/// Per-type creation locks, shared by every arena in the process.
static CREATION_LOCKS: LazyLock<Mutex<HashMap<TypeId, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn creation_lock(type_id: TypeId) -> Arc<Mutex<()>> {
    Arc::clone(CREATION_LOCKS.lock().entry(type_id).or_default())
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<Arena>>> = const { RefCell::new(None) };
}

/// Isolation domain holding one pool per element type.
pub struct Arena {
    id: ArenaId,
    name: String,
    pools: RwLock<IndexMap<TypeId, PoolEntry>>,
}

impl Arena {
    /// Create an empty arena.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let arena = Arc::new(Self {
            id: ArenaId::next(),
            name: name.into(),
            pools: RwLock::new(IndexMap::new()),
        });
        debug!(arena = %arena.name, id = %arena.id, "arena created");
        arena
    }

    /// Arena name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique arena ID.
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Number of element types with a pool in this arena.
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Whether a pool for `T` exists.
    pub fn contains<T: PoolElement>(&self) -> bool {
        self.pools.read().contains_key(&TypeId::of::<T>())
    }

    /// The pool for `T`, created on first request.
    ///
    /// `config` and `clear` apply only when this call creates the pool;
    /// afterwards the first registrant's values are kept. The pool starts
    /// with no blocks. Creation holds the type-specific creation lock, so
    /// two callers racing on the same type get the same pool.
    pub fn get_or_create<T: PoolElement>(
        &self,
        config: &PoolConfig,
        clear: Option<ClearFn<T>>,
    ) -> Result<Arc<PoolCell<T>>> {
        if let Some(pool) = self.lookup::<T>() {
            return Ok(pool);
        }

        let type_id = TypeId::of::<T>();
        let lock = creation_lock(type_id);
        let _creating = lock.lock();
        if let Some(pool) = self.lookup::<T>() {
            return Ok(pool);
        }

        let pool: Arc<PoolCell<T>> = Arc::new(ReentrantMutex::new(SharedPool::new(
            TypedPoolAllocator::new(config.clone(), clear)?,
        )));
        let entry = PoolEntry {
            typed: pool.clone(),
            erased: pool.clone(),
        };
        self.pools.write().insert(type_id, entry);
        debug!(
            arena = %self.name,
            type_name = type_name::<T>(),
            clear = clear.is_some(),
            "pool created"
        );
        Ok(pool)
    }

    fn lookup<T: PoolElement>(&self) -> Option<Arc<PoolCell<T>>> {
        let typed = self.pools.read().get(&TypeId::of::<T>())?.typed.clone();
        // The table is keyed by `TypeId`, so the entry is always a `PoolCell<T>`.
        typed.downcast::<PoolCell<T>>().ok()
    }

    /// Snapshot of the pool table, so pool mutexes are never taken while
    /// the table lock is held.
    fn entries(&self) -> Vec<PoolEntry> {
        self.pools.read().values().cloned().collect()
    }

    /// Reset every pool in the arena, keeping their blocks.
    ///
    /// All pools are locked first, so handles on other threads are waited
    /// for. If any live handle may still hold elements, nothing is reset
    /// and [`PoolError::ElementsOnLoan`] names the first such pool.
    pub fn reset(&self) -> Result<()> {
        self.for_each_unlent(|pool| pool.reset())
    }

    /// Release every block of every pool in the arena.
    ///
    /// The pools themselves (and their clear callbacks) stay registered.
    /// Same locking and refusal rules as [`reset`](Self::reset).
    pub fn erase(&self) -> Result<()> {
        self.for_each_unlent(|pool| pool.erase())?;
        debug!(arena = %self.name, pools = self.pool_count(), "arena erased");
        Ok(())
    }

    fn for_each_unlent(&self, mut op: impl FnMut(&dyn HeldPool) -> Result<()>) -> Result<()> {
        let entries = self.entries();
        let held: Vec<Box<dyn HeldPool + '_>> =
            entries.iter().map(|entry| entry.erased.hold()).collect();
        if let Some(busy) = held.iter().find(|pool| pool.loans() > 0) {
            return Err(PoolError::ElementsOnLoan {
                type_name: busy.type_name(),
                handles: busy.loans(),
            });
        }
        held.iter().try_for_each(|pool| op(pool.as_ref()))
    }

    /// Per-type statistics in pool creation order.
    ///
    /// Readable while handles on this thread are alive; waits for handles
    /// on other threads.
    pub fn stats(&self) -> Vec<(&'static str, PoolStats)> {
        self.entries()
            .iter()
            .map(|entry| {
                let pool = entry.erased.hold();
                (pool.type_name(), pool.stats())
            })
            .collect()
    }

    /// Sum of every pool's statistics.
    pub fn total_stats(&self) -> PoolStats {
        self.stats().into_iter().map(|(_, stats)| stats).fold(
            PoolStats::default(),
            |acc, stats| acc + stats,
        )
    }

    /// Human-readable usage table, one line per pool plus a total.
    pub fn report(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_report(&mut out);
        out
    }

    fn write_report(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "=== Arena '{}' (id {}) ===", self.name, self.id)?;
        writeln!(out, "{}  Type", PoolStats::HEADER)?;
        let mut total = PoolStats::default();
        for (type_name, stats) in self.stats() {
            writeln!(out, "{stats}  {type_name}")?;
            total += stats;
        }
        writeln!(out, "{total}  Total")
    }

    /// Make this arena the current arena of the calling thread.
    ///
    /// Returns the previously current arena, if any.
    pub fn make_current(self: &Arc<Self>) -> Option<Arc<Arena>> {
        CURRENT.with(|current| current.borrow_mut().replace(Arc::clone(self)))
    }

    /// The calling thread's current arena, if one was set.
    pub fn current() -> Option<Arc<Arena>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Forget the calling thread's current arena.
    pub fn clear_current() -> Option<Arc<Arena>> {
        CURRENT.with(|current| current.borrow_mut().take())
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pools", &self.pool_count())
            .finish()
    }
}
