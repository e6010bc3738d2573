//! Per-slot arena isolation across concurrently running lanes.

use std::sync::Arc;

use evpool_arena::{Arena, ArenaRegistry, PoolHandle, SlotIndex};
use evpool_test_utils::{CaloCell, Hit};

const LANES: u32 = 4;

fn registry_with_lanes() -> ArenaRegistry {
    let registry = ArenaRegistry::new();
    for lane in 0..LANES {
        let arena = Arena::new(format!("lane-{lane}"));
        registry.add_arena(&arena);
        registry.set_arena_for_slot(SlotIndex(lane), Some(arena));
    }
    registry
}

#[test]
fn lanes_vend_from_independent_pools() {
    let registry = registry_with_lanes();

    std::thread::scope(|s| {
        for lane in 0..LANES {
            let registry = &registry;
            s.spawn(move || {
                let slot = SlotIndex(lane);
                let mut hits = PoolHandle::<Hit>::builder()
                    .build_for_slot(registry, slot)
                    .unwrap();
                let count = (lane as usize + 1) * 700;
                for i in 0..count {
                    *hits.next_element().unwrap() = Hit::new(i as f32, 0.0, 0.0, lane);
                }
                assert_eq!(hits.allocated(), count);
                assert!(hits.iter().unwrap().all(|hit| hit.channel == lane));
            });
        }
    });

    for lane in 0..LANES {
        let arena = registry.resolve(Some(SlotIndex(lane)));
        let stats = arena.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].1.elements.in_use, (lane as usize + 1) * 700);
    }
    assert_eq!(registry.default_arena().pool_count(), 0);
}

#[test]
fn same_type_in_two_slots_is_two_pools() {
    let registry = registry_with_lanes();
    let first = PoolHandle::<CaloCell>::builder()
        .build_for_slot(&registry, SlotIndex(0))
        .unwrap();
    // A second handle for the same type in another lane is not blocked.
    let second = PoolHandle::<CaloCell>::builder()
        .try_build_for_slot(&registry, SlotIndex(1))
        .unwrap();

    first.next_element().unwrap().id = 1;
    assert_eq!(first.allocated(), 1);
    assert_eq!(second.allocated(), 0);
    assert!(!Arc::ptr_eq(first.arena(), second.arena()));
}

#[test]
fn unregistered_slot_shares_the_default_arena() {
    let registry = ArenaRegistry::new();
    let hits = PoolHandle::<Hit>::builder()
        .build_for_slot(&registry, SlotIndex(17))
        .unwrap();
    assert!(Arc::ptr_eq(hits.arena(), &registry.default_arena()));
    drop(hits);

    let again = PoolHandle::<Hit>::builder()
        .try_build_in(&registry.default_arena())
        .unwrap();
    assert_eq!(again.capacity(), 1024);
}

#[test]
fn registry_report_covers_announced_lanes() {
    let registry = registry_with_lanes();
    let hits = PoolHandle::<Hit>::builder()
        .build_for_slot(&registry, SlotIndex(2))
        .unwrap();
    hits.next_element().unwrap();
    // Reporting works while a lane handle is alive on this thread.
    let report = registry.report();
    assert!(report.contains("Hit"));
    assert!(report.contains("default"));
    for lane in 0..LANES {
        assert!(report.contains(&format!("lane-{lane}")));
    }
}

#[test]
fn handles_wait_for_each_other_across_threads() {
    let arena = Arena::new("serialised");
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..250 {
                    let hits = PoolHandle::<Hit>::in_arena(&arena).unwrap();
                    hits.next_element().unwrap();
                }
            });
        }
    });
    let hits = PoolHandle::<Hit>::in_arena(&arena).unwrap();
    assert_eq!(hits.allocated(), 1000);
}
