//! Filtering, separation, ray casts and broadphase parity

use flash_physics::prelude::*;

const DT: f32 = 1.0 / 60.0;

fn zero_gravity() -> PhysicsConfig {
    PhysicsConfig {
        gravity: Vec2::ZERO,
        ..PhysicsConfig::default()
    }
}

#[test]
fn test_collision_filter_matrix() {
    // (category a, mask a, category b, mask b, should touch)
    let cases = [
        (0x1, u32::MAX, 0x1, u32::MAX, true),
        (0x1, 0x2, 0x2, 0x1, true),
        (0x1, 0x2, 0x4, u32::MAX, false),
        (0x1, u32::MAX, 0x2, 0x4, false),
        (0x2, 0x0, 0x2, u32::MAX, false),
        (0x6, 0x1, 0x1, 0x4, true),
    ];
    for (i, &(cat_a, mask_a, cat_b, mask_b, touch)) in cases.iter().enumerate() {
        let mut world = PhysicsWorld::with_config(2, zero_gravity()).unwrap();
        let a = world
            .create_body(BodyDef::dynamic(Shape::Circle { radius: 10.0 }).with_filter(Filter::new(cat_a, mask_a)))
            .unwrap();
        let b = world
            .create_body(
                BodyDef::dynamic(Shape::Circle { radius: 10.0 })
                    .with_position(Vec2::new(15.0, 0.0))
                    .with_filter(Filter::new(cat_b, mask_b)),
            )
            .unwrap();
        let stats = world.step(DT);
        let expected = touch as u32;
        assert_eq!(world.collision_count(a).unwrap(), expected, "case {i}");
        assert_eq!(world.collision_count(b).unwrap(), expected, "case {i}");
        assert_eq!(stats.contacts, touch as usize, "case {i}");
    }
}

#[test]
fn test_overlapping_circles_separate_without_momentum_gain() {
    let mut world = PhysicsWorld::with_config(2, zero_gravity()).unwrap();
    let material = Material {
        restitution: 0.0,
        friction: 0.4,
    };
    let a = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 10.0 }).with_material(material))
        .unwrap();
    let b = world
        .create_body(
            BodyDef::dynamic(Shape::Circle { radius: 10.0 })
                .with_position(Vec2::new(15.0, 0.0))
                .with_material(material),
        )
        .unwrap();

    let push = world.config().contact_push_velocity;
    for _ in 0..120 {
        world.step(DT);
        let (va, wa) = world.velocity(a).unwrap();
        let (vb, wb) = world.velocity(b).unwrap();
        // Equal masses: total momentum stays zero
        assert!((va + vb).length() < 1e-2, "momentum {:?}", va + vb);
        assert!(va.length() <= push && vb.length() <= push);
        assert!(wa.abs() < 1e-3 && wb.abs() < 1e-3);
    }

    let pa = world.get_position(a).unwrap();
    let pb = world.get_position(b).unwrap();
    let slop = world.config().linear_slop;
    assert!(pa.distance(pb) >= 20.0 - 2.0 * slop, "still overlapping: {}", pa.distance(pb));
    assert!(pa.y.abs() < 1e-3 && pb.y.abs() < 1e-3, "separation left the x axis");
    assert!(pa.x < 0.0 && pb.x > 15.0, "{pa:?} {pb:?}");
}

#[test]
fn test_ray_cast_hits_box_face() {
    let mut world = PhysicsWorld::new(4).unwrap();
    let target = world
        .create_body(BodyDef::fixed(Shape::rect(20.0, 20.0)).with_position(Vec2::new(50.0, 0.0)))
        .unwrap();
    world
        .create_body(BodyDef::fixed(Shape::Circle { radius: 5.0 }).with_position(Vec2::new(90.0, 0.0)))
        .unwrap();

    let hit = world.ray_cast(Vec2::ZERO, Vec2::new(100.0, 0.0)).unwrap();
    assert_eq!(hit.body, target);
    assert!((hit.fraction - 0.4).abs() < 1e-4, "fraction {}", hit.fraction);
    assert!((hit.point - Vec2::new(40.0, 0.0)).length() < 1e-3);
    assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < 1e-4);

    // Above everything
    assert!(world.ray_cast(Vec2::new(0.0, 50.0), Vec2::new(100.0, 50.0)).is_none());
    // Zero length
    assert!(world.ray_cast(Vec2::new(50.0, 0.0), Vec2::new(50.0, 0.0)).is_none());
}

#[test]
fn test_ray_cast_filtered_skips_categories() {
    let mut world = PhysicsWorld::new(4).unwrap();
    world
        .create_body(
            BodyDef::fixed(Shape::Circle { radius: 5.0 })
                .with_position(Vec2::new(20.0, 0.0))
                .with_filter(Filter::new(0x2, u32::MAX)),
        )
        .unwrap();
    let far = world
        .create_body(BodyDef::fixed(Shape::Circle { radius: 5.0 }).with_position(Vec2::new(60.0, 0.0)))
        .unwrap();

    let hit = world.ray_cast_filtered(Vec2::ZERO, Vec2::new(100.0, 0.0), 0x1).unwrap();
    assert_eq!(hit.body, far);
    assert!((hit.fraction - 0.55).abs() < 1e-4);
    assert!(world.ray_cast_filtered(Vec2::ZERO, Vec2::new(100.0, 0.0), 0x8).is_none());
}

/// Deterministic scatter of circles and boxes
fn scatter(world: &mut PhysicsWorld, count: u32) -> Vec<BodyId> {
    let mut seed: u32 = 12345;
    let mut next = move || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
        (seed >> 8) as f32 / (1u32 << 24) as f32
    };
    (0..count)
        .map(|i| {
            let position = Vec2::new(next() * 600.0 - 300.0, next() * 600.0 - 300.0);
            let shape = if i % 3 == 0 {
                Shape::rect(10.0 + next() * 20.0, 10.0 + next() * 20.0)
            } else {
                Shape::Circle {
                    radius: 5.0 + next() * 10.0,
                }
            };
            let def = if i % 7 == 0 {
                BodyDef::fixed(shape)
            } else {
                BodyDef::dynamic(shape)
            };
            world
                .create_body(def.with_position(position).with_rotation(next()))
                .unwrap()
        })
        .collect()
}

#[test]
fn test_tree_and_grid_find_the_same_contacts() {
    let grid = PhysicsConfig {
        broad_phase: BroadPhaseKind::SpatialGrid {
            cell_size: 40.0,
            min: Vec2::splat(-400.0),
            max: Vec2::splat(400.0),
        },
        ..zero_gravity()
    };
    let mut tree_world = PhysicsWorld::with_config(128, zero_gravity()).unwrap();
    let mut grid_world = PhysicsWorld::with_config(128, grid).unwrap();
    let tree_ids = scatter(&mut tree_world, 120);
    let grid_ids = scatter(&mut grid_world, 120);

    let tree_stats = tree_world.step(DT);
    let grid_stats = grid_world.step(DT);
    println!("tree {tree_stats:?}\ngrid {grid_stats:?}");
    assert!(tree_stats.contacts > 0, "scatter should produce some contacts");
    assert_eq!(tree_stats.dropped_pairs, 0);
    assert_eq!(grid_stats.dropped_pairs, 0);
    assert_eq!(tree_stats.contacts, grid_stats.contacts);
    for (t, g) in tree_ids.iter().zip(&grid_ids) {
        assert_eq!(
            tree_world.collision_count(*t).unwrap(),
            grid_world.collision_count(*g).unwrap(),
            "body {t}"
        );
    }
}

#[test]
fn test_teleported_body_collides_at_new_position() {
    let mut world = PhysicsWorld::with_config(4, zero_gravity()).unwrap();
    let wall = world
        .create_body(BodyDef::fixed(Shape::rect(20.0, 20.0)).with_position(Vec2::new(500.0, 0.0)))
        .unwrap();
    let ball = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 5.0 }))
        .unwrap();
    world.step(DT);
    assert_eq!(world.collision_count(ball).unwrap(), 0);

    world.set_transform(wall, Vec2::new(12.0, 0.0), 0.0).unwrap();
    world.step(DT);
    assert_eq!(world.collision_count(ball).unwrap(), 1);
    assert!(world.set_transform(ball, Vec2::new(f32::NAN, 0.0), 0.0).is_err());
}
