//! Concurrent processing lanes, each with its own arena.
//!
//! Demonstrates: register one arena per slot → run lanes on threads →
//! vend hits and cells per event → reset at end of event → report usage →
//! erase to give the memory back.

use std::sync::Arc;

use evpool_arena::{Arena, ArenaRegistry, PoolHandle, PoolSet, SlotIndex};
use evpool_bench::{event_sizes, reference_profile};
use evpool_test_utils::{clear_cell, CaloCell, Hit, Lcg};

const LANES: u32 = 4;
const EVENTS_PER_LANE: usize = 50;

fn run_lane(arena: &Arc<Arena>, lane: u32, sizes: &[usize]) -> evpool_arena::Result<u64> {
    arena.make_current();

    // Resolve both pools together so lanes never wait on each other in a cycle.
    let mut set = PoolSet::builder(arena)
        .with::<Hit>(2_000)
        .with_builder(PoolHandle::<CaloCell>::builder().clear(clear_cell))
        .acquire()?;
    let mut hits = set.take::<Hit>().expect("requested above");
    let mut cells = set.take::<CaloCell>().expect("requested above");

    let mut lcg = Lcg::new(u64::from(lane));
    let mut total_energy = 0u64;
    for &n in sizes {
        for channel in 0..n as u32 {
            *hits.next_element()? = Hit::new(lcg.next_f32(), lcg.next_f32(), 0.0, channel);
        }
        for id in 0..(n / 10) as u64 {
            let cell = cells.next_element()?;
            cell.id = id;
            cell.energy = lcg.next_f32() * 100.0;
            total_energy += cell.energy as u64;
        }
        hits.reset()?;
        cells.reset()?;
    }

    Arena::clear_current();
    Ok(total_energy)
}

fn main() {
    println!("=== evpool slot lanes example ===\n");

    let registry = ArenaRegistry::global();
    let mut arenas = Vec::new();
    for lane in 0..LANES {
        let arena = Arena::new(format!("lane-{lane}"));
        registry.add_arena(&arena);
        registry.set_arena_for_slot(SlotIndex(lane), Some(Arc::clone(&arena)));
        arenas.push(arena);
    }

    let profile = reference_profile();
    let sizes = event_sizes(&profile, 42);

    std::thread::scope(|s| {
        for lane in 0..LANES {
            let sizes = &sizes[lane as usize * EVENTS_PER_LANE..][..EVENTS_PER_LANE];
            s.spawn(move || {
                let arena = ArenaRegistry::global().resolve(Some(SlotIndex(lane)));
                match run_lane(&arena, lane, sizes) {
                    Ok(energy) => println!("lane {lane}: {EVENTS_PER_LANE} events, energy {energy}"),
                    Err(e) => eprintln!("lane {lane} failed: {e}"),
                }
            });
        }
    });

    println!("\n{}", registry.report());

    for arena in &arenas {
        if let Err(e) = arena.erase() {
            eprintln!("erasing {} failed: {e}", arena.name());
        }
    }
    let held: usize = arenas.iter().map(|a| a.total_stats().bytes.total).sum();
    println!("after erase: {held} bytes held across {} lanes", arenas.len());
}
