//! Slot-aware typed object pools for event-processing workloads.
//!
//! Records produced in bulk during one processing pass (hits, cells,
//! clusters) are vended from per-type pools instead of the general heap.
//! At the end of the pass the pools are reset in O(blocks), keeping their
//! memory for the next pass, or erased to give the memory back.
//!
//! # Architecture
//!
//! ```text
//! ArenaRegistry (process-wide, or local for tests)
//! ├── default Arena
//! └── slot table: SlotIndex → Arena (one per processing lane)
//!
//! Arena
//! └── TypeId → PoolCell<T> = ReentrantMutex<SharedPool<T>>
//!     └── TypedPoolAllocator<T>
//!         └── BlockAllocator (type-erased)
//!             └── Block[] (header + aligned run of constructed elements)
//!
//! PoolHandle<T>   shares one PoolCell<T> with every other handle for T
//! PoolSet         resolves several handles in canonical order
//! ```
//!
//! # Element lifecycle
//!
//! Every slot of a block is constructed with `T::default()` when the block
//! is allocated and dropped when the block is released. A vended element
//! therefore always holds a valid `T`: its default value the first time,
//! and afterwards whatever the previous pass left (optionally sanitised by
//! the pool's clear callback). Callers overwrite the fields they use.
//!
//! # Unsafe code
//!
//! `unsafe` is denied crate-wide and allowed only in `raw` (region
//! allocation), `block` (slot construction and destruction), `typed`
//! (vending `&mut T` into block storage) and `shared` (run-time checks
//! that let several handles share one pool).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod align;
pub mod arena;
pub mod block;
pub mod config;
pub mod error;
pub mod handle;
pub mod id;
mod raw;
pub mod registry;
pub mod set;
pub mod shared;
pub mod stats;
pub mod typed;

// Public re-exports for the primary API surface.
pub use align::alignment_floor;
pub use arena::Arena;
pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use handle::{PoolBuilder, PoolHandle};
pub use id::{ArenaId, SlotIndex};
pub use registry::ArenaRegistry;
pub use set::{PoolSet, PoolSetBuilder};
pub use shared::{PoolCell, SharedPool};
pub use stats::{Counts, PoolStats};
pub use typed::{ClearFn, PoolElement, TypedPoolAllocator};
