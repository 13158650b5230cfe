//! Tests for PhysicsConfig and Scene files

use flash_physics::prelude::*;
use std::fs;

#[test]
fn test_custom_gravity_config() {
    let config = PhysicsConfig {
        gravity: Vec2::new(0.0, -162.0), // Moon-like gravity
        ..Default::default()
    };
    let mut world = PhysicsWorld::with_config(4, config).unwrap();
    let object = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 5.0 }).with_position(Vec2::new(0.0, 1000.0)))
        .unwrap();

    // Simulate for 1 second
    for _ in 0..60 {
        world.step(1.0 / 60.0);
    }

    // Roughly half of g * t^2, with semi-implicit Euler and damping
    let fallen = 1000.0 - world.get_position(object).unwrap().y;
    assert!(fallen > 70.0 && fallen < 90.0, "fell {fallen}");
}

#[test]
fn test_config_loads_from_file_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("physics.json");
    fs::write(
        &path,
        r#"{ "gravity": [0.0, -500.0], "velocity_iterations": 12, "enable_sleep": false }"#,
    )
    .unwrap();

    let config = PhysicsConfig::load(&path).unwrap();
    assert_eq!(config.gravity, Vec2::new(0.0, -500.0));
    assert_eq!(config.velocity_iterations, 12);
    assert!(!config.enable_sleep);
    // Missing fields fall back to defaults
    assert_eq!(config.position_iterations, PhysicsConfig::default().position_iterations);
    assert_eq!(config.broad_phase, BroadPhaseKind::DynamicTree);
}

#[test]
fn test_config_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.json");
    let config = PhysicsConfig {
        broad_phase: BroadPhaseKind::SpatialGrid {
            cell_size: 32.0,
            min: Vec2::splat(-512.0),
            max: Vec2::splat(512.0),
        },
        soft_body: SoftBodyConfig {
            iterations: 6,
            ..SoftBodyConfig::default()
        },
        ..PhysicsConfig::default()
    };
    fs::write(&path, config.to_json_string().unwrap()).unwrap();
    assert_eq!(PhysicsConfig::load(&path).unwrap(), config);
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{ "velocity_iterations": 0 }"#).unwrap();
    assert!(matches!(PhysicsConfig::load(&path), Err(PhysicsError::InvalidConfig(_))));

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(PhysicsConfig::load(&path), Err(PhysicsError::Json(_))));

    assert!(matches!(
        PhysicsConfig::load(dir.path().join("missing.json")),
        Err(PhysicsError::Io(_))
    ));

    let config = PhysicsConfig {
        velocity_damping: 1.5,
        ..PhysicsConfig::default()
    };
    assert!(PhysicsWorld::with_config(4, config).is_err());
}

#[test]
fn test_scene_save_load_and_build() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.json");

    let mut scene = Scene::new(16);
    scene.config = Some(PhysicsConfig {
        gravity: Vec2::new(0.0, -100.0),
        ..PhysicsConfig::default()
    });
    scene.bodies.push(BodyDef::fixed(Shape::rect(400.0, 20.0)));
    scene
        .bodies
        .push(BodyDef::dynamic(Shape::Circle { radius: 10.0 }).with_position(Vec2::new(0.0, 80.0)));
    scene.joints.push(JointDef::Distance(DistanceJointDef::new(
        BodyId(0),
        BodyId(1),
        Vec2::new(0.0, 80.0),
        Vec2::ZERO,
        0.0,
    )));
    scene
        .soft_bodies
        .push(SoftBodyDef::ring(Vec2::new(100.0, 60.0), 15.0, 8, 10.0, 0.9));
    scene.save(&path).unwrap();

    let loaded = Scene::load(&path).unwrap();
    assert_eq!(loaded, scene);

    let (mut world, handles) = loaded.build().unwrap();
    assert_eq!(world.config().gravity, Vec2::new(0.0, -100.0));
    assert_eq!(world.max_bodies(), 16);
    assert_eq!(handles.bodies, vec![BodyId(0), BodyId(1)]);
    assert_eq!(handles.joints.len(), 1);
    assert_eq!(handles.soft_bodies.len(), 1);

    for _ in 0..60 {
        world.step(1.0 / 60.0);
    }
    // The zero-length rod pins the ball in place
    assert!(world.get_position(handles.bodies[1]).unwrap().distance(Vec2::new(0.0, 80.0)) < 1.0);
}
