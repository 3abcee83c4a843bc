//! Spatial index integration tests

use std::collections::BTreeSet;

use citadel_core::core::config::{SimulationConfig, SpatialConfig};
use citadel_core::core::types::{Aabb, EntityHandle, Vec2};
use citadel_core::ecs::components::Transform;
use citadel_core::simulation::{SpawnKind, SpawnRequest, System, World};
use citadel_core::spatial::SpatialIndex;
use citadel_core::systems::SpatialSync;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn leaf8() -> SpatialConfig {
    SpatialConfig {
        leaf_capacity: 8,
        ..SpatialConfig::default()
    }
}

#[test]
fn test_window_query_matches_brute_force() {
    let bounds = Aabb::from_origin_size(0.0, 0.0, 2048.0, 2048.0);
    let mut index = SpatialIndex::new(bounds, &leaf8());
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let mut entries = Vec::new();
    for i in 0..1000u32 {
        let pos = Vec2::new(rng.gen_range(0.0..2048.0), rng.gen_range(0.0..2048.0));
        let handle = EntityHandle::new(i, 0);
        index.insert(handle, pos).unwrap();
        entries.push((handle, pos));
    }
    index.validate().unwrap();

    for _ in 0..50 {
        let x = rng.gen_range(0.0..1948.0);
        let y = rng.gen_range(0.0..1948.0);
        let window = Aabb::from_origin_size(x, y, 100.0, 100.0);

        let found: BTreeSet<EntityHandle> = index.query_range(window).collect();
        let expected: BTreeSet<EntityHandle> = entries
            .iter()
            .filter(|(_, pos)| window.contains(*pos))
            .map(|(handle, _)| *handle)
            .collect();
        assert_eq!(found, expected);
    }
}

#[test]
fn test_radius_query_matches_brute_force() {
    let bounds = Aabb::from_origin_size(0.0, 0.0, 2048.0, 2048.0);
    let mut index = SpatialIndex::new(bounds, &leaf8());
    let mut rng = ChaCha8Rng::seed_from_u64(11);

    let mut entries = Vec::new();
    for i in 0..1000u32 {
        let pos = Vec2::new(rng.gen_range(0.0..2048.0), rng.gen_range(0.0..2048.0));
        let handle = EntityHandle::new(i, 0);
        index.insert(handle, pos).unwrap();
        entries.push((handle, pos));
    }

    for _ in 0..50 {
        let center = Vec2::new(rng.gen_range(0.0..2048.0), rng.gen_range(0.0..2048.0));
        let radius = rng.gen_range(10.0..300.0);

        let found: BTreeSet<EntityHandle> = index.query_radius(center, radius).collect();
        let expected: BTreeSet<EntityHandle> = entries
            .iter()
            .filter(|(_, pos)| pos.distance_sq(&center) <= radius * radius)
            .map(|(handle, _)| *handle)
            .collect();
        assert_eq!(found, expected);
    }

    // A circle partly outside the world still finds what is inside it
    let origin = Vec2::new(0.0, 0.0);
    let corner: BTreeSet<EntityHandle> = index.query_radius(origin, 200.0).collect();
    let expected: BTreeSet<EntityHandle> = entries
        .iter()
        .filter(|(_, pos)| pos.distance_sq(&origin) <= 200.0 * 200.0)
        .map(|(handle, _)| *handle)
        .collect();
    assert_eq!(corner, expected);
}

#[test]
fn test_nearest_matches_brute_force() {
    let bounds = Aabb::from_origin_size(0.0, 0.0, 2048.0, 2048.0);
    let mut index = SpatialIndex::new(bounds, &leaf8());
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let mut entries = Vec::new();
    for i in 0..500u32 {
        let pos = Vec2::new(rng.gen_range(0.0..2048.0), rng.gen_range(0.0..2048.0));
        index.insert(EntityHandle::new(i, 0), pos).unwrap();
        entries.push((EntityHandle::new(i, 0), pos));
    }

    let origin = Vec2::new(1000.0, 1000.0);
    let nearest: Vec<EntityHandle> = index.query_nearest(origin, 5).into_iter().map(|(h, _)| h).collect();

    entries.sort_by(|a, b| a.1.distance(&origin).total_cmp(&b.1.distance(&origin)).then(a.0.cmp(&b.0)));
    let expected: Vec<EntityHandle> = entries.iter().take(5).map(|(h, _)| *h).collect();
    assert_eq!(nearest, expected);
}

#[test]
fn test_moves_and_removals_keep_tree_consistent() {
    let bounds = Aabb::from_origin_size(0.0, 0.0, 2048.0, 2048.0);
    let mut index = SpatialIndex::new(bounds, &leaf8());
    let mut rng = ChaCha8Rng::seed_from_u64(99);

    for i in 0..400u32 {
        let pos = Vec2::new(rng.gen_range(0.0..2048.0), rng.gen_range(0.0..2048.0));
        index.insert(EntityHandle::new(i, 0), pos).unwrap();
    }
    for i in 0..400u32 {
        let handle = EntityHandle::new(i, 0);
        if i % 3 == 0 {
            index.remove(handle);
        } else {
            let pos = Vec2::new(rng.gen_range(0.0..2048.0), rng.gen_range(0.0..2048.0));
            index.update(handle, pos).unwrap();
        }
        index.validate().unwrap();
    }
    assert_eq!(index.len(), 400 - 134);
}

#[test]
fn test_committed_position_visible_same_tick() {
    let mut world = World::new(SimulationConfig::default()).unwrap();
    let node = world
        .spawn(SpawnRequest {
            kind: SpawnKind::ResourceNode { amount: 10 },
            position: Vec2::new(100.0, 100.0),
        })
        .unwrap();
    let mut sync = SpatialSync::new();
    sync.update(&mut world, 0.05).unwrap();

    // Commit a new position, then sync as the next tick's first System does
    world.store.get_mut::<Transform>(node).unwrap().position = Vec2::new(1500.0, 1200.0);
    sync.update(&mut world, 0.05).unwrap();

    let window = Aabb::from_origin_size(1450.0, 1150.0, 100.0, 100.0);
    let hits: Vec<EntityHandle> = world.spatial.query_range(window).collect();
    assert_eq!(hits, vec![node]);
    assert_eq!(world.spatial.query_range(Aabb::from_origin_size(50.0, 50.0, 100.0, 100.0)).count(), 0);
    world.spatial.validate_against(&world.store).unwrap();
}

#[test]
fn test_out_of_bounds_insert_rejected() {
    let mut index = SpatialIndex::new(Aabb::from_origin_size(0.0, 0.0, 100.0, 100.0), &leaf8());
    assert!(index.insert(EntityHandle::new(0, 0), Vec2::new(150.0, 10.0)).is_err());
    assert!(index.is_empty());
}
