//! Clear callbacks: bound once per (arena, type), applied on every reset.

use evpool_arena::{Arena, PoolHandle};
use evpool_test_utils::{
    clear_cell, clear_hit, CaloCell, Hit, CELL_SENTINEL_ENERGY, HIT_SENTINEL_CHANNEL,
};

fn zero_channel(hit: &mut Hit) {
    hit.channel = 0;
}

#[test]
fn reused_elements_carry_the_sentinel() {
    let arena = Arena::new("sentinel");
    let mut hits = PoolHandle::<Hit>::builder()
        .clear(clear_hit)
        .build_in(&arena)
        .unwrap();

    for pass in 0..3u32 {
        for i in 0..2000u32 {
            let hit = hits.next_element().unwrap();
            if pass > 0 {
                assert_eq!(hit.channel, HIT_SENTINEL_CHANNEL);
            }
            *hit = Hit::new(i as f32, 1.0, 2.0, i);
        }
        hits.reset().unwrap();
        assert_eq!(hits.allocated(), 0);
    }
}

#[test]
fn unvended_slots_are_untouched_by_reset() {
    let arena = Arena::new("partial");
    let mut hits = PoolHandle::<Hit>::builder()
        .clear(clear_hit)
        .build_in(&arena)
        .unwrap();
    for _ in 0..10 {
        hits.next_element().unwrap().channel = 3;
    }
    hits.reset().unwrap();
    for _ in 0..10 {
        assert_eq!(hits.next_element().unwrap().channel, HIT_SENTINEL_CHANNEL);
    }
    // Slots never vended still hold their default value.
    assert_eq!(hits.next_element().unwrap().channel, 0);
}

#[test]
fn later_callback_is_ignored() {
    let arena = Arena::new("first-wins");
    drop(
        PoolHandle::<Hit>::builder()
            .clear(clear_hit)
            .build_in(&arena)
            .unwrap(),
    );

    let mut hits = PoolHandle::<Hit>::builder()
        .clear(zero_channel)
        .build_in(&arena)
        .unwrap();
    hits.next_element().unwrap().channel = 99;
    hits.reset().unwrap();
    assert_eq!(hits.next_element().unwrap().channel, HIT_SENTINEL_CHANNEL);
}

#[test]
fn pool_without_callback_keeps_stale_content() {
    let arena = Arena::new("stale");
    let mut hits = PoolHandle::<Hit>::in_arena(&arena).unwrap();
    hits.next_element().unwrap().channel = 41;
    hits.reset().unwrap();
    assert_eq!(hits.next_element().unwrap().channel, 41);
}

#[test]
fn arena_reset_runs_each_pools_callback() {
    let arena = Arena::new("bulk");
    {
        let hits = PoolHandle::<Hit>::builder()
            .clear(clear_hit)
            .build_in(&arena)
            .unwrap();
        let cells = PoolHandle::<CaloCell>::builder()
            .clear(clear_cell)
            .build_in(&arena)
            .unwrap();
        hits.next_element().unwrap().channel = 5;
        cells.next_element().unwrap().energy = 12.5;
    }

    arena.reset().unwrap();

    let hits = PoolHandle::<Hit>::in_arena(&arena).unwrap();
    let cells = PoolHandle::<CaloCell>::in_arena(&arena).unwrap();
    assert_eq!(hits.allocated(), 0);
    assert_eq!(hits.next_element().unwrap().channel, HIT_SENTINEL_CHANNEL);
    assert_eq!(cells.next_element().unwrap().energy, CELL_SENTINEL_ENERGY);
}
