//! Headless demo driving a physics world with variable frame times
//!
//! Usage: `sandbox [scene.json] [seconds]`. Without a scene file a demo
//! scene with a pile of bodies, a pendulum and a soft ball is built.

use flash_physics::prelude::*;
use glam::Vec2;
use std::time::Instant;
use tracing::info;

fn main() -> PhysicsResult<()> {
    // Initialize logging
    flash_physics::init_logging();
    info!("Starting physics sandbox");

    let mut args = std::env::args().skip(1);
    let scene = match args.next() {
        Some(path) => Scene::load(path)?,
        None => create_demo_scene(),
    };
    let seconds: f32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(10.0);

    let (mut world, handles) = scene.build()?;
    info!(
        bodies = world.body_count(),
        joints = world.joint_count(),
        soft_bodies = world.soft_body_count(),
        seconds,
        "Scene ready"
    );

    let mut accumulator = PhysicsAccumulator::default();
    let mut commands = CommandQueue::new();
    let mut poses = vec![Pose::default(); world.body_count()];
    let started = Instant::now();
    let mut simulated = 0.0;
    let mut next_report = 1.0;
    let mut frame = 0u32;

    while simulated < seconds {
        let delta_time = frame_time(frame);
        frame += 1;
        simulated += delta_time;

        update_demo_scene(&handles, frame, &mut commands);
        world.apply_commands(&mut commands);

        for _ in 0..accumulator.accumulate(delta_time) {
            world.step(accumulator.fixed_timestep);
        }

        if simulated >= next_report {
            next_report += 1.0;
            let stats = world.last_step_stats();
            info!(
                time = simulated,
                step = stats.step,
                contacts = stats.contacts,
                awake = stats.awake_bodies,
                cached = stats.cached_impulses,
                alpha = accumulator.interpolation_alpha(),
                "Simulation progress"
            );
        }
    }

    let copied = world.copy_body_poses(&mut poses);
    for (i, pose) in poses.iter().take(copied).enumerate().step_by(8) {
        info!(body = i, x = pose.position.x, y = pose.position.y, rotation = pose.rotation, "Final pose");
    }
    for &id in &handles.soft_bodies {
        info!(soft_body = %id, area = world.soft_body_area(id)?, "Final soft body area");
    }
    info!(
        steps = world.step_count(),
        wall_ms = started.elapsed().as_millis() as u64,
        "Sandbox finished"
    );
    world.destroy();
    Ok(())
}

/// Frame times that wobble around 60 fps with an occasional hitch
fn frame_time(frame: u32) -> f32 {
    match frame % 120 {
        0 => 0.1,
        n if n % 3 == 0 => 1.0 / 45.0,
        _ => 1.0 / 70.0,
    }
}

/// Create a demo scene: ground, a pile of shapes, a pendulum and a soft ball
fn create_demo_scene() -> Scene {
    info!("Creating demo scene");
    let mut scene = Scene::new(256);

    scene
        .bodies
        .push(BodyDef::fixed(Shape::rect(1200.0, 20.0)).with_position(Vec2::new(0.0, -10.0)));
    scene.bodies.push(
        BodyDef::fixed(Shape::rect(20.0, 400.0)).with_position(Vec2::new(-600.0, 200.0)),
    );
    scene
        .bodies
        .push(BodyDef::fixed(Shape::rect(20.0, 400.0)).with_position(Vec2::new(600.0, 200.0)));

    // Pile of mixed shapes
    for i in 0..60 {
        let x = -300.0 + (i % 12) as f32 * 50.0;
        let y = 50.0 + (i / 12) as f32 * 40.0;
        let shape = if i % 2 == 0 {
            Shape::Circle { radius: 12.0 }
        } else {
            Shape::rect(22.0, 18.0)
        };
        scene.bodies.push(BodyDef::dynamic(shape).with_position(Vec2::new(x, y)));
    }

    // Pendulum hanging from the ground body
    let bob = scene.bodies.len() as u32;
    scene
        .bodies
        .push(BodyDef::dynamic(Shape::Circle { radius: 15.0 }).with_position(Vec2::new(450.0, 350.0)));
    scene.joints.push(JointDef::Revolute(RevoluteJointDef::new(
        BodyId(0),
        BodyId(bob),
        Vec2::new(350.0, 360.0),
        Vec2::new(-100.0, 0.0),
    )));

    scene
        .soft_bodies
        .push(SoftBodyDef::ring(Vec2::new(-450.0, 150.0), 40.0, 16, 10.0, 0.9));
    scene
}

/// Nudge the pile every few seconds
fn update_demo_scene(handles: &SceneHandles, frame: u32, commands: &mut CommandQueue) {
    if frame % 300 != 0 {
        return;
    }
    for &body in handles.bodies.iter().skip(3).step_by(5) {
        commands.push(PhysicsCommand::ApplyImpulse {
            body,
            impulse: Vec2::new(0.0, 400.0),
        });
    }
}
