//! Usage statistics for pools and arenas.

use std::fmt;
use std::ops::{Add, AddAssign};

/// An in-use / free / total triple.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    /// Units currently handed out.
    pub in_use: usize,
    /// Units available without growing.
    pub free: usize,
    /// `in_use + free`.
    pub total: usize,
}

impl Counts {
    /// Build from an in-use count and a total. `in_use` is clamped to `total`.
    pub fn new(in_use: usize, total: usize) -> Self {
        let in_use = in_use.min(total);
        Self {
            in_use,
            free: total - in_use,
            total,
        }
    }
}

impl Add for Counts {
    type Output = Counts;

    fn add(self, rhs: Counts) -> Counts {
        Counts {
            in_use: self.in_use + rhs.in_use,
            free: self.free + rhs.free,
            total: self.total + rhs.total,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Counts) {
        *self = *self + rhs;
    }
}

/// Element, byte and block usage of one pool (or a sum of pools).
///
/// Byte totals include block headers; bytes in use count element storage
/// only. A block is in use when it holds at least one vended element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Element slots.
    pub elements: Counts,
    /// Memory in bytes.
    pub bytes: Counts,
    /// Blocks in the chain.
    pub blocks: Counts,
}

impl Add for PoolStats {
    type Output = PoolStats;

    fn add(self, rhs: PoolStats) -> PoolStats {
        PoolStats {
            elements: self.elements + rhs.elements,
            bytes: self.bytes + rhs.bytes,
            blocks: self.blocks + rhs.blocks,
        }
    }
}

impl AddAssign for PoolStats {
    fn add_assign(&mut self, rhs: PoolStats) {
        *self = *self + rhs;
    }
}

impl PoolStats {
    /// Column header matching the [`Display`](fmt::Display) layout.
    pub const HEADER: &'static str =
        "Elts InUse/Free/Total   Bytes InUse/Free/Total  Blocks InUse/Free/Total";
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>7}/{:>7}/{:>7}  {:>7}/{:>7}/{:>7}  {:>7}/{:>7}/{:>7}",
            self.elements.in_use,
            self.elements.free,
            self.elements.total,
            self.bytes.in_use,
            self.bytes.free,
            self.bytes.total,
            self.blocks.in_use,
            self.blocks.free,
            self.blocks.total,
        )
    }
}
