//! evpool: slot-aware typed object pools for event-processing workloads.
//!
//! This is the top-level facade crate that re-exports the public API of the
//! evpool sub-crates. For most users, adding `evpool` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use evpool::prelude::*;
//!
//! #[derive(Default)]
//! struct Hit {
//!     x: f32,
//!     y: f32,
//!     channel: u32,
//! }
//!
//! fn sanitise(hit: &mut Hit) {
//!     hit.channel = u32::MAX;
//! }
//!
//! // One arena per processing lane, registered before processing starts.
//! let registry = ArenaRegistry::new();
//! registry.set_arena_for_slot(SlotIndex(0), Some(Arena::new("lane-0")));
//!
//! let mut hits = PoolHandle::<Hit>::builder()
//!     .clear(sanitise)
//!     .build_for_slot(&registry, SlotIndex(0))
//!     .unwrap();
//! assert!(hits.capacity() >= 1024);
//!
//! for channel in 0..1500 {
//!     let hit = hits.next_element().unwrap();
//!     hit.x = 0.5;
//!     hit.y = -0.5;
//!     hit.channel = channel;
//! }
//! assert_eq!(hits.allocated(), 1500);
//! assert!(hits.capacity() >= 2048);
//!
//! // End of pass: logically free everything, keep the memory.
//! hits.reset().unwrap();
//! assert_eq!(hits.allocated(), 0);
//! assert_eq!(hits.next_element().unwrap().channel, u32::MAX);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `evpool-arena` | Blocks, typed pools, arenas, registry, handles, pool sets |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Pools, arenas and the slot registry (`evpool-arena`).
///
/// Most users only need [`arena::PoolHandle`] and [`arena::ArenaRegistry`]
/// from this module; both are also available in the [`prelude`].
pub use evpool_arena as arena;

/// Common imports for typical evpool usage.
///
/// ```rust
/// use evpool::prelude::*;
/// ```
///
/// This imports handles, arenas, the registry, configuration and errors.
pub mod prelude {
    // Handles
    pub use evpool_arena::{PoolBuilder, PoolHandle, PoolSet};

    // Arenas and slots
    pub use evpool_arena::{Arena, ArenaRegistry, SlotIndex};

    // Configuration and diagnostics
    pub use evpool_arena::{PoolConfig, PoolStats};

    // Errors
    pub use evpool_arena::{PoolError, Result};
}
