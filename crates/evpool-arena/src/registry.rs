//! Slot-indexed arena lookup.
//!
//! [`ArenaRegistry`] maps each processing lane ([`SlotIndex`]) to the arena
//! that lane allocates from, and falls back to a default arena for lanes
//! with no registration and for code running outside any lane. The host
//! framework registers slots before concurrent processing starts; after
//! that, [`resolve`](ArenaRegistry::resolve) is a pure lookup.
//!
//! The registry also keeps weak references to every arena announced with
//! [`add_arena`](ArenaRegistry::add_arena) so they can be reported
//! together.

use std::sync::{Arc, LazyLock, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::arena::Arena;
use crate::id::{ArenaId, SlotIndex};

/// Name given to the default arena of every registry.
pub const DEFAULT_ARENA_NAME: &str = "default";

static GLOBAL: LazyLock<ArenaRegistry> = LazyLock::new(ArenaRegistry::new);

/// Table of per-slot arenas plus a default arena.
pub struct ArenaRegistry {
    default_arena: Arc<Arena>,
    slots: RwLock<Vec<Option<Arc<Arena>>>>,
    known: Mutex<Vec<Weak<Arena>>>,
}

impl ArenaRegistry {
    /// Create a registry with a fresh default arena and no slot entries.
    pub fn new() -> Self {
        Self {
            default_arena: Arena::new(DEFAULT_ARENA_NAME),
            slots: RwLock::new(Vec::new()),
            known: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static ArenaRegistry {
        &GLOBAL
    }

    /// The arena used when no slot-specific arena applies.
    pub fn default_arena(&self) -> Arc<Arena> {
        Arc::clone(&self.default_arena)
    }

    /// The arena registered for `slot`, or the default arena.
    pub fn resolve(&self, slot: Option<SlotIndex>) -> Arc<Arena> {
        slot.and_then(|slot| self.slot_arena(slot))
            .unwrap_or_else(|| self.default_arena())
    }

    /// The arena registered for `slot`, without falling back.
    pub fn slot_arena(&self, slot: SlotIndex) -> Option<Arc<Arena>> {
        self.slots.read().get(slot.index()).cloned().flatten()
    }

    /// Register `arena` for `slot`, or clear the registration with `None`.
    ///
    /// Administrative: call before the lane starts processing. Returns the
    /// previously registered arena.
    pub fn set_arena_for_slot(
        &self,
        slot: SlotIndex,
        arena: Option<Arc<Arena>>,
    ) -> Option<Arc<Arena>> {
        let mut slots = self.slots.write();
        if slots.len() <= slot.index() {
            if arena.is_none() {
                return None;
            }
            slots.resize(slot.index() + 1, None);
        }
        debug!(
            slot = %slot,
            arena = arena.as_ref().map(|a| a.name()).unwrap_or("<none>"),
            "slot arena set"
        );
        std::mem::replace(&mut slots[slot.index()], arena)
    }

    /// Number of slot positions in the table, registered or not.
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Announce an arena for reporting. Adding the same arena twice is a no-op.
    pub fn add_arena(&self, arena: &Arc<Arena>) {
        let mut known = self.known.lock();
        known.retain(|weak| weak.strong_count() > 0);
        if !known
            .iter()
            .any(|weak| weak.upgrade().is_some_and(|a| a.id() == arena.id()))
        {
            known.push(Arc::downgrade(arena));
        }
    }

    /// Withdraw an announced arena. Returns whether it was known.
    pub fn remove_arena(&self, id: ArenaId) -> bool {
        let mut known = self.known.lock();
        known.retain(|weak| weak.strong_count() > 0);
        let position = known
            .iter()
            .position(|weak| weak.upgrade().is_some_and(|a| a.id() == id));
        match position {
            Some(position) => {
                known.remove(position);
                true
            }
            None => false,
        }
    }

    /// The default arena followed by every announced arena still alive.
    pub fn arenas(&self) -> Vec<Arc<Arena>> {
        let mut arenas = vec![self.default_arena()];
        arenas.extend(self.known.lock().iter().filter_map(Weak::upgrade));
        arenas
    }

    /// Usage report for [`arenas`](Self::arenas).
    pub fn report(&self) -> String {
        self.arenas()
            .iter()
            .map(|arena| arena.report())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ArenaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
