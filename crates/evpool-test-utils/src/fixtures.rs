//! Record fixtures.
//!
//! - [`Hit`]: 16-byte tracker hit, the reference record for capacity maths.
//! - [`CaloCell`] and [`Cluster`]: calorimeter records of other sizes.
//! - [`WideRecord`]: aligned to 64 bytes, above the block alignment floor.
//! - [`Tracked`]: counts live instances on the current thread.

use std::cell::Cell;

/// Channel a hit is reset to by [`clear_hit`].
pub const HIT_SENTINEL_CHANNEL: u32 = 0xDEAD_BEEF;

/// Energy a cell is reset to by [`clear_cell`].
pub const CELL_SENTINEL_ENERGY: f32 = -1.0;

/// Tracker hit. Exactly 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Hit {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub channel: u32,
}

impl Hit {
    pub fn new(x: f32, y: f32, z: f32, channel: u32) -> Self {
        Self { x, y, z, channel }
    }
}

/// Calorimeter cell.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CaloCell {
    pub id: u64,
    pub energy: f32,
    pub time: f32,
    pub quality: u16,
    pub provenance: u16,
}

/// Most cells a [`Cluster`] records.
pub const CLUSTER_MAX_CELLS: usize = 8;

/// Calorimeter cluster built from cells. Cell IDs are stored inline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cluster {
    pub eta: f64,
    pub phi: f64,
    pub energy: f64,
    pub cells: [u64; CLUSTER_MAX_CELLS],
    pub cell_count: u8,
}

impl Cluster {
    /// Record `cell` and add its energy. Returns false once the cluster is full.
    pub fn add_cell(&mut self, cell: &CaloCell) -> bool {
        let n = usize::from(self.cell_count);
        if n == CLUSTER_MAX_CELLS {
            return false;
        }
        self.cells[n] = cell.id;
        self.cell_count += 1;
        self.energy += f64::from(cell.energy);
        true
    }

    /// IDs of the recorded cells.
    pub fn cell_ids(&self) -> &[u64] {
        &self.cells[..usize::from(self.cell_count)]
    }
}

/// Record with a 64-byte alignment requirement.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WideRecord {
    pub words: [u64; 6],
}

pub fn clear_hit(hit: &mut Hit) {
    hit.channel = HIT_SENTINEL_CHANNEL;
}

pub fn clear_cell(cell: &mut CaloCell) {
    cell.energy = CELL_SENTINEL_ENERGY;
    cell.quality = 0;
}

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
}

/// Record whose default construction and drop adjust a thread-local count.
///
/// Use from a single test thread: pools construct and drop slots on the
/// thread that grows or releases them.
#[derive(Debug)]
pub struct Tracked {
    pub value: u64,
}

impl Tracked {
    /// Instances constructed and not yet dropped on this thread.
    pub fn live() -> isize {
        LIVE.with(Cell::get)
    }
}

impl Default for Tracked {
    fn default() -> Self {
        LIVE.with(|live| live.set(live.get() + 1));
        Self { value: 0 }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        LIVE.with(|live| live.set(live.get() - 1));
    }
}
