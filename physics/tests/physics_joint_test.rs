//! Joint behaviour inside a full world

use flash_physics::prelude::*;

const DT: f32 = 1.0 / 60.0;

fn anchor(world: &mut PhysicsWorld) -> BodyId {
    world
        .create_body(BodyDef::fixed(Shape::rect(4.0, 4.0)).with_position(Vec2::new(0.0, 100.0)))
        .unwrap()
}

#[test]
fn test_distance_joint_converges_to_rest_length() {
    let mut world = PhysicsWorld::new(4).unwrap();
    let a = anchor(&mut world);
    let b = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 5.0 }).with_position(Vec2::new(80.0, 100.0)))
        .unwrap();
    let joint = world
        .create_joint(JointDef::Distance(DistanceJointDef::new(a, b, Vec2::ZERO, Vec2::ZERO, 50.0)))
        .unwrap();

    for _ in 0..180 {
        world.step(DT);
    }

    let length = world.joint_length(joint).unwrap();
    println!("distance joint length after 3 s: {length}");
    assert!((length - 50.0).abs() < 1.0, "length {length}");
    assert!(world.get_position(b).unwrap().y < 100.0, "bob should hang below the anchor");
}

#[test]
fn test_soft_distance_joint_stretches_then_settles() {
    let mut world = PhysicsWorld::new(4).unwrap();
    let a = anchor(&mut world);
    let b = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 5.0 }).with_position(Vec2::new(0.0, 50.0)))
        .unwrap();
    let joint = world
        .create_joint(JointDef::Distance(
            DistanceJointDef::new(a, b, Vec2::ZERO, Vec2::ZERO, 50.0).with_spring(2.0, 0.7),
        ))
        .unwrap();

    let mut longest: f32 = 0.0;
    for _ in 0..600 {
        world.step(DT);
        longest = longest.max(world.joint_length(joint).unwrap());
    }
    // Gravity stretches a spring beyond its rest length
    assert!(longest > 51.0, "longest {longest}");
    let (v, _) = world.velocity(b).unwrap();
    assert!(v.length() < 5.0, "still moving at {v:?}");
}

#[test]
fn test_revolute_joint_keeps_anchors_together() {
    let mut world = PhysicsWorld::new(4).unwrap();
    let a = anchor(&mut world);
    let b = world
        .create_body(BodyDef::dynamic(Shape::rect(40.0, 6.0)).with_position(Vec2::new(20.0, 100.0)))
        .unwrap();
    world
        .create_joint(JointDef::Revolute(RevoluteJointDef::new(
            a,
            b,
            Vec2::ZERO,
            Vec2::new(-20.0, 0.0),
        )))
        .unwrap();

    let mut swung = false;
    for _ in 0..240 {
        world.step(DT);
        let body = world.body(b).unwrap();
        let pivot = body.pose().transform_point(Vec2::new(-20.0, 0.0));
        assert!(pivot.distance(Vec2::new(0.0, 100.0)) < 1.0, "pivot drifted to {pivot:?}");
        swung |= body.rotation().abs() > 0.5;
    }
    assert!(swung, "the bar should swing under gravity");
}

#[test]
fn test_revolute_motor_spins_wheel() {
    let config = PhysicsConfig {
        gravity: Vec2::ZERO,
        ..PhysicsConfig::default()
    };
    let mut world = PhysicsWorld::with_config(4, config).unwrap();
    let a = anchor(&mut world);
    let wheel = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 10.0 }).with_position(Vec2::new(0.0, 100.0)))
        .unwrap();
    let joint = world
        .create_joint(JointDef::Revolute(
            RevoluteJointDef::new(a, wheel, Vec2::ZERO, Vec2::ZERO).with_motor(2.0, 1.0e6),
        ))
        .unwrap();
    for _ in 0..30 {
        world.step(DT);
    }
    let (_, w) = world.velocity(wheel).unwrap();
    assert!((w - 2.0).abs() < 0.1, "angular velocity {w}");

    world.set_joint_motor_speed(joint, -1.0).unwrap();
    for _ in 0..30 {
        world.step(DT);
    }
    let (_, w) = world.velocity(wheel).unwrap();
    assert!((w + 1.0).abs() < 0.1, "angular velocity {w}");
    assert!(world.joint_angle(joint).unwrap().abs() > 0.1);
}

#[test]
fn test_prismatic_joint_stays_on_axis() {
    let mut world = PhysicsWorld::new(4).unwrap();
    let a = anchor(&mut world);
    let slider = world
        .create_body(BodyDef::dynamic(Shape::rect(10.0, 10.0)).with_position(Vec2::new(0.0, 100.0)))
        .unwrap();
    world
        .create_joint(JointDef::Prismatic(PrismaticJointDef::new(
            a,
            slider,
            Vec2::ZERO,
            Vec2::ZERO,
            Vec2::X,
        )))
        .unwrap();

    for _ in 0..60 {
        world.apply_force(slider, Vec2::new(500.0, 0.0)).unwrap();
        world.step(DT);
    }
    let pose = world.get_pose(slider).unwrap();
    assert!(pose.position.x > 5.0, "slider did not move: {pose:?}");
    assert!((pose.position.y - 100.0).abs() < 1.0, "slider left the axis: {pose:?}");
    assert!(pose.rotation.abs() < 0.02);
}

#[test]
fn test_jointed_bodies_do_not_collide() {
    let config = PhysicsConfig {
        gravity: Vec2::ZERO,
        ..PhysicsConfig::default()
    };
    let mut world = PhysicsWorld::with_config(4, config).unwrap();
    let a = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 10.0 }))
        .unwrap();
    let b = world
        .create_body(BodyDef::dynamic(Shape::Circle { radius: 10.0 }).with_position(Vec2::new(5.0, 0.0)))
        .unwrap();
    world
        .create_joint(JointDef::Weld(WeldJointDef::new(a, b, Vec2::new(2.5, 0.0), Vec2::new(-2.5, 0.0))))
        .unwrap();
    let stats = world.step(DT);
    assert_eq!(stats.contacts, 0);
    assert_eq!(world.collision_count(a).unwrap(), 0);
    assert!(world.get_position(b).unwrap().distance(Vec2::new(5.0, 0.0)) < 1e-3);
}

#[test]
fn test_pulley_lifts_lighter_side() {
    let config = PhysicsConfig {
        enable_sleep: false,
        ..PhysicsConfig::default()
    };
    let mut world = PhysicsWorld::with_config(4, config).unwrap();
    let heavy = world
        .create_body(
            BodyDef::dynamic(Shape::rect(10.0, 10.0))
                .with_position(Vec2::new(-50.0, 100.0))
                .with_mass(3.0),
        )
        .unwrap();
    let light = world
        .create_body(BodyDef::dynamic(Shape::rect(10.0, 10.0)).with_position(Vec2::new(50.0, 100.0)))
        .unwrap();
    let pulley = world
        .create_joint(JointDef::Pulley(PulleyJointDef::new(
            heavy,
            light,
            Vec2::new(-50.0, 200.0),
            Vec2::new(50.0, 200.0),
            Vec2::ZERO,
            Vec2::ZERO,
            1.0,
        )))
        .unwrap();

    for _ in 0..30 {
        world.step(DT);
    }
    let heavy_y = world.get_position(heavy).unwrap().y;
    let light_y = world.get_position(light).unwrap().y;
    assert!(heavy_y < 100.0, "heavy side should fall, y={heavy_y}");
    assert!(light_y > 100.0, "light side should rise, y={light_y}");
    // Rope length is conserved
    assert!(((100.0 - heavy_y) - (light_y - 100.0)).abs() < 1.0);
    assert!(world.joint_reaction(pulley).unwrap().0.length() > 0.0);
}

#[test]
fn test_pulley_with_shorter_ropes_hoists_both_sides() {
    let mut world = PhysicsWorld::new(4).unwrap();
    let left = world
        .create_body(BodyDef::dynamic(Shape::rect(10.0, 10.0)).with_position(Vec2::new(-50.0, 100.0)))
        .unwrap();
    let right = world
        .create_body(BodyDef::dynamic(Shape::rect(10.0, 10.0)).with_position(Vec2::new(50.0, 100.0)))
        .unwrap();
    world
        .create_joint(JointDef::Pulley(
            PulleyJointDef::new(
                left,
                right,
                Vec2::new(-50.0, 200.0),
                Vec2::new(50.0, 200.0),
                Vec2::ZERO,
                Vec2::ZERO,
                1.0,
            )
            .with_lengths(80.0, 80.0),
        ))
        .unwrap();

    for _ in 0..60 {
        world.step(DT);
    }
    // Equal weights balance, so the total rope settles on 160
    let left_rope = 200.0 - world.get_position(left).unwrap().y;
    let right_rope = 200.0 - world.get_position(right).unwrap().y;
    assert!((left_rope + right_rope - 160.0).abs() < 3.0, "ropes {left_rope} + {right_rope}");
    assert!((left_rope - right_rope).abs() < 3.0);
}
