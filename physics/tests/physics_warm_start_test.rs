//! Warm starting should help a stack settle, never hurt it

use flash_physics::prelude::*;
use flash_physics::solver::ContactKey;

const DT: f32 = 1.0 / 60.0;

/// Build a column of boxes and return the worst overlap between
/// neighbours (and with the ground) after `steps` steps
fn stack_overlap(enable_warm_starting: bool, steps: usize) -> (f32, PhysicsWorld) {
    let config = PhysicsConfig {
        enable_warm_starting,
        enable_sleep: false,
        velocity_iterations: 4,
        ..PhysicsConfig::default()
    };
    let mut world = PhysicsWorld::with_config(16, config).unwrap();
    world
        .create_body(BodyDef::fixed(Shape::rect(400.0, 20.0)))
        .unwrap();
    let material = Material {
        restitution: 0.0,
        friction: 0.6,
    };
    let boxes: Vec<BodyId> = (0..6)
        .map(|i| {
            world
                .create_body(
                    BodyDef::dynamic(Shape::rect(20.0, 20.0))
                        .with_position(Vec2::new(0.0, 20.5 + 20.5 * i as f32))
                        .with_material(material),
                )
                .unwrap()
        })
        .collect();

    for _ in 0..steps {
        world.step(DT);
    }

    let mut worst: f32 = 0.0;
    let mut floor = 10.0;
    for id in &boxes {
        let y = world.get_position(*id).unwrap().y;
        worst = worst.max(floor - (y - 10.0));
        floor = y + 10.0;
    }
    (worst, world)
}

#[test]
fn test_warm_start_not_worse_than_cold() {
    let (warm, warm_world) = stack_overlap(true, 240);
    let (cold, cold_world) = stack_overlap(false, 240);
    println!("worst overlap warm={warm} cold={cold}");

    assert!(warm <= cold + 0.5, "warm start made the stack worse: {warm} > {cold}");
    assert!(warm < 3.0, "stack collapsed: {warm}");

    // One cache entry per touching point, kept only when enabled
    assert!(!warm_world.warm_start_cache().is_empty());
    assert_eq!(cold_world.warm_start_cache().len(), 0);
}

#[test]
fn test_cache_entries_age_out() {
    let config = PhysicsConfig {
        gravity: Vec2::ZERO,
        ..PhysicsConfig::default()
    };
    let max_age = config.warm_start_max_age;
    let mut world = PhysicsWorld::with_config(4, config).unwrap();
    let a = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 10.0 }))
        .unwrap();
    world
        .create_body(BodyDef::fixed(Shape::Circle { radius: 10.0 }).with_position(Vec2::new(19.0, 0.0)))
        .unwrap();

    world.step(DT);
    assert!(!world.warm_start_cache().is_empty());

    // Move the body far away; its entries survive `max_age` steps then go
    world.set_transform(a, Vec2::new(-500.0, 0.0), 0.0).unwrap();
    world.set_velocity(a, Vec2::ZERO).unwrap();
    let mut evicted = 0;
    for _ in 0..=max_age + 1 {
        evicted += world.step(DT).evicted_impulses;
    }
    assert_eq!(world.warm_start_cache().len(), 0);
    assert!(evicted > 0);
}

#[test]
fn test_cache_carries_full_support_impulse() {
    let config = PhysicsConfig {
        enable_sleep: false,
        ..PhysicsConfig::default()
    };
    let mut world = PhysicsWorld::with_config(4, config).unwrap();
    let ground = world
        .create_body(BodyDef::fixed(Shape::rect(400.0, 20.0)))
        .unwrap();
    let crate_box = world
        .create_body(
            BodyDef::dynamic(Shape::rect(20.0, 20.0))
                .with_position(Vec2::new(0.0, 20.0))
                .with_material(Material {
                    restitution: 0.0,
                    friction: 0.6,
                }),
        )
        .unwrap();
    for _ in 0..180 {
        world.step(DT);
    }

    // Cached impulses are stored unscaled, so at rest they add up to the
    // weight carried over one step
    let support: f32 = (0..2)
        .filter_map(|point| {
            world
                .warm_start_cache()
                .lookup(&ContactKey::new(ground.0, crate_box.0, point))
        })
        .map(|(normal, _)| normal)
        .sum();
    let weight = world.body(crate_box).unwrap().mass() * 981.0 * DT;
    println!("support={support} weight={weight}");
    assert!((support - weight).abs() < 0.15 * weight);
}
