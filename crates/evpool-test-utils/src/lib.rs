//! Test utilities for evpool development.
//!
//! Provides plain-data record types shaped like the detector records the
//! pools are built for ([`Hit`], [`CaloCell`], [`Cluster`]), an
//! over-aligned [`WideRecord`], a construction/drop tracking record
//! ([`Tracked`]), and matching clear callbacks.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    clear_cell, clear_hit, CaloCell, Cluster, Hit, Tracked, WideRecord, CELL_SENTINEL_ENERGY,
    CLUSTER_MAX_CELLS, HIT_SENTINEL_CHANNEL,
};

/// Deterministic pseudo-random stream for filling records.
///
/// A 64-bit LCG; the same seed always yields the same sequence.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}
