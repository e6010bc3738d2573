//! Workload profiles and drivers for benchmarking evpool.
//!
//! Provides pre-built [`EventProfile`]s for benchmarks and examples:
//!
//! - [`reference_profile`]: 1,000 events of about 1,500 hits
//! - [`stress_profile`]: 200 events of about 25,000 hits with a wide spread
//! - [`event_sizes`]: deterministic per-event hit counts via seed
//! - [`process_event`]: vend, fill and reset one event's worth of hits

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use evpool_arena::{PoolHandle, Result};
use evpool_test_utils::{Hit, Lcg};

/// Shape of a stream of events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventProfile {
    /// Profile name, used as the benchmark ID.
    pub name: &'static str,
    /// Number of events in the stream.
    pub events: usize,
    /// Mean hits per event.
    pub mean_hits: usize,
    /// Maximum deviation from the mean, in hits.
    pub spread: usize,
}

/// Build a reference profile: 1,000 events of 1,500 ± 500 hits.
///
/// The mean deliberately exceeds the default capacity floor so the first
/// event exercises exhaustion growth.
pub fn reference_profile() -> EventProfile {
    EventProfile {
        name: "reference",
        events: 1_000,
        mean_hits: 1_500,
        spread: 500,
    }
}

/// Build a stress profile: 200 events of 25,000 ± 20,000 hits.
///
/// Wide spread keeps the pool oscillating between small and large events.
pub fn stress_profile() -> EventProfile {
    EventProfile {
        name: "stress",
        events: 200,
        mean_hits: 25_000,
        spread: 20_000,
    }
}

/// Generate deterministic per-event hit counts for `profile`.
///
/// Every count lies in `[mean - spread, mean + spread]`.
pub fn event_sizes(profile: &EventProfile, seed: u64) -> Vec<usize> {
    let mut lcg = Lcg::new(seed);
    let low = profile.mean_hits.saturating_sub(profile.spread);
    let width = profile.mean_hits + profile.spread - low + 1;
    (0..profile.events)
        .map(|_| low + (lcg.next_u64() >> 16) as usize % width)
        .collect()
}

/// Vend `hits` elements, fill them, then reset the pool.
///
/// Returns the summed channel numbers so the work cannot be optimised out.
pub fn process_event(pool: &mut PoolHandle<Hit>, hits: usize, seed: u64) -> Result<u64> {
    let mut lcg = Lcg::new(seed);
    let mut checksum = 0u64;
    for channel in 0..hits as u32 {
        let hit = pool.next_element()?;
        *hit = Hit::new(lcg.next_f32(), lcg.next_f32(), lcg.next_f32(), channel);
        checksum += u64::from(hit.channel);
    }
    pool.reset()?;
    Ok(checksum)
}
