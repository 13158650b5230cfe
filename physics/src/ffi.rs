//! C ABI
//!
//! Worlds cross the boundary as opaque pointers. Every entry point accepts
//! null; failures return `-1` (or write nothing) instead of unwinding into
//! the caller.
//!
//! # Safety
//!
//! Non-null world pointers must come from `flash_create_world` and must not
//! be used after `flash_destroy_world`. Output pointers must be valid for
//! writes of the stated length.

use crate::body::{BodyId, Pose};
use crate::joints::{DistanceJointDef, JointDef, RevoluteJointDef};
use crate::soft_body::SoftBodyId;
use crate::world::PhysicsWorld;
use glam::Vec2;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Ray cast result, `hit == 0` means nothing was hit
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FfiRayCastHit {
    pub body_id: i32,
    pub x: f32,
    pub y: f32,
    pub normal_x: f32,
    pub normal_y: f32,
    pub fraction: f32,
    pub hit: i32,
}

impl FfiRayCastHit {
    const MISS: FfiRayCastHit = FfiRayCastHit {
        body_id: -1,
        x: 0.0,
        y: 0.0,
        normal_x: 0.0,
        normal_y: 0.0,
        fraction: 0.0,
        hit: 0,
    };
}

fn body_id(raw: i32) -> Option<BodyId> {
    u32::try_from(raw).ok().map(BodyId)
}

fn soft_body_id(raw: i32) -> Option<SoftBodyId> {
    u32::try_from(raw).ok().map(SoftBodyId)
}

fn to_raw(index: u32) -> i32 {
    i32::try_from(index).unwrap_or(-1)
}

// World lifecycle

/// Install the crate's log subscriber. Returns 0 when the host already has one.
#[no_mangle]
pub extern "C" fn flash_init_logging() -> i32 {
    crate::init_logging() as i32
}

/// Create a world with room for `max_bodies` rigid bodies. Returns null when
/// the capacity is not positive.
#[no_mangle]
pub extern "C" fn flash_create_world(max_bodies: i32) -> *mut PhysicsWorld {
    let Ok(max_bodies) = usize::try_from(max_bodies) else {
        return std::ptr::null_mut();
    };
    match PhysicsWorld::new(max_bodies) {
        Ok(world) => Box::into_raw(Box::new(world)),
        Err(error) => {
            warn!(%error, "flash_create_world failed");
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_destroy_world(world: *mut PhysicsWorld) {
    if !world.is_null() {
        let world = *Box::from_raw(world);
        world.destroy();
    }
}

/// Advance the world by `dt` seconds. Returns 1 on success, 0 on failure.
///
/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_step(world: *mut PhysicsWorld, dt: f32) -> i32 {
    let Some(world) = world.as_mut() else {
        return 0;
    };
    let result = catch_unwind(AssertUnwindSafe(|| {
        world.step(dt);
    }));
    result.is_ok() as i32
}

// Bodies

/// Create a body; see `PhysicsWorld::create_body_raw` for the encoding.
/// Returns the body id or `-1`.
///
/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn flash_create_body(
    world: *mut PhysicsWorld,
    body_type: i32,
    shape: i32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    rotation: f32,
    category_bits: u32,
    mask_bits: u32,
) -> i32 {
    let Some(world) = world.as_mut() else {
        return -1;
    };
    match world.create_body_raw(body_type, shape, x, y, width, height, rotation, category_bits, mask_bits) {
        Ok(id) => to_raw(id.0),
        Err(error) => {
            warn!(%error, "flash_create_body failed");
            -1
        }
    }
}

/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_apply_force(world: *mut PhysicsWorld, body: i32, fx: f32, fy: f32) {
    if let (Some(world), Some(id)) = (world.as_mut(), body_id(body)) {
        let _ = world.apply_force(id, Vec2::new(fx, fy));
    }
}

/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_apply_torque(world: *mut PhysicsWorld, body: i32, torque: f32) {
    if let (Some(world), Some(id)) = (world.as_mut(), body_id(body)) {
        let _ = world.apply_torque(id, torque);
    }
}

/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_set_velocity(world: *mut PhysicsWorld, body: i32, vx: f32, vy: f32) {
    if let (Some(world), Some(id)) = (world.as_mut(), body_id(body)) {
        let _ = world.set_velocity(id, Vec2::new(vx, vy));
    }
}

/// Write a body's position. Leaves the outputs untouched on failure.
///
/// # Safety
/// `world` must come from `flash_create_world` or be null; `x` and `y` must
/// be valid for writes or null.
#[no_mangle]
pub unsafe extern "C" fn flash_get_position(world: *const PhysicsWorld, body: i32, x: *mut f32, y: *mut f32) {
    let (Some(world), Some(id)) = (world.as_ref(), body_id(body)) else {
        return;
    };
    if x.is_null() || y.is_null() {
        return;
    }
    if let Ok(position) = world.get_position(id) {
        *x = position.x;
        *y = position.y;
    }
}

/// Body rotation in radians, 0 for invalid handles
///
/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_get_rotation(world: *const PhysicsWorld, body: i32) -> f32 {
    match (world.as_ref(), body_id(body)) {
        (Some(world), Some(id)) => world.get_rotation(id).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Copy poses as `[x, y, rotation]` triples into `out`, which holds `len`
/// floats. Returns the number of poses written or `-1`.
///
/// # Safety
/// `world` must come from `flash_create_world` or be null; `out` must be
/// valid for `len` float writes or null.
#[no_mangle]
pub unsafe extern "C" fn flash_copy_body_poses(world: *const PhysicsWorld, out: *mut f32, len: i32) -> i32 {
    let Some(world) = world.as_ref() else {
        return -1;
    };
    let Ok(len) = usize::try_from(len) else {
        return -1;
    };
    if out.is_null() {
        return -1;
    }
    let floats = std::slice::from_raw_parts_mut(out, len);
    let whole = floats.len() - floats.len() % 3;
    match bytemuck::try_cast_slice_mut::<f32, Pose>(&mut floats[..whole]) {
        Ok(poses) => i32::try_from(world.copy_body_poses(poses)).unwrap_or(-1),
        Err(error) => {
            warn!(?error, "flash_copy_body_poses could not view buffer as poses");
            -1
        }
    }
}

// Joints

/// Distance joint between local anchors. `hertz == 0` makes it rigid.
/// Returns the joint id or `-1`.
///
/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn flash_create_distance_joint(
    world: *mut PhysicsWorld,
    body_a: i32,
    body_b: i32,
    anchor_ax: f32,
    anchor_ay: f32,
    anchor_bx: f32,
    anchor_by: f32,
    length: f32,
    hertz: f32,
    damping_ratio: f32,
) -> i32 {
    let (Some(world), Some(a), Some(b)) = (world.as_mut(), body_id(body_a), body_id(body_b)) else {
        return -1;
    };
    let def = DistanceJointDef::new(a, b, Vec2::new(anchor_ax, anchor_ay), Vec2::new(anchor_bx, anchor_by), length)
        .with_spring(hertz, damping_ratio);
    match world.create_joint(JointDef::Distance(def)) {
        Ok(id) => to_raw(id.0),
        Err(error) => {
            warn!(%error, "flash_create_distance_joint failed");
            -1
        }
    }
}

/// Revolute joint pinning two local anchors together. Returns the joint id
/// or `-1`.
///
/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_create_revolute_joint(
    world: *mut PhysicsWorld,
    body_a: i32,
    body_b: i32,
    anchor_ax: f32,
    anchor_ay: f32,
    anchor_bx: f32,
    anchor_by: f32,
) -> i32 {
    let (Some(world), Some(a), Some(b)) = (world.as_mut(), body_id(body_a), body_id(body_b)) else {
        return -1;
    };
    let def = RevoluteJointDef::new(a, b, Vec2::new(anchor_ax, anchor_ay), Vec2::new(anchor_bx, anchor_by));
    match world.create_joint(JointDef::Revolute(def)) {
        Ok(id) => to_raw(id.0),
        Err(error) => {
            warn!(%error, "flash_create_revolute_joint failed");
            -1
        }
    }
}

// Soft bodies

/// Create a soft body from `count` points. Returns its id or `-1`.
///
/// # Safety
/// `world` must come from `flash_create_world` or be null; `xs` and `ys`
/// must each hold `count` floats or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_create_soft_body(
    world: *mut PhysicsWorld,
    count: i32,
    xs: *const f32,
    ys: *const f32,
    pressure: f32,
    stiffness: f32,
) -> i32 {
    let Some(world) = world.as_mut() else {
        return -1;
    };
    let Ok(count) = usize::try_from(count) else {
        return -1;
    };
    if xs.is_null() || ys.is_null() {
        return -1;
    }
    let xs = std::slice::from_raw_parts(xs, count);
    let ys = std::slice::from_raw_parts(ys, count);
    match world.create_soft_body(xs, ys, pressure, stiffness) {
        Ok(id) => to_raw(id.0),
        Err(error) => {
            warn!(%error, "flash_create_soft_body failed");
            -1
        }
    }
}

/// # Safety
/// `world` must come from `flash_create_world` or be null; `x` and `y` must
/// be valid for writes or null.
#[no_mangle]
pub unsafe extern "C" fn flash_get_soft_body_point(
    world: *const PhysicsWorld,
    soft_body: i32,
    index: i32,
    x: *mut f32,
    y: *mut f32,
) {
    let (Some(world), Some(id), Ok(index)) = (world.as_ref(), soft_body_id(soft_body), usize::try_from(index)) else {
        return;
    };
    if x.is_null() || y.is_null() {
        return;
    }
    if let Ok(point) = world.get_soft_body_point(id, index) {
        *x = point.x;
        *y = point.y;
    }
}

/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_set_soft_body_point(world: *mut PhysicsWorld, soft_body: i32, index: i32, x: f32, y: f32) {
    if let (Some(world), Some(id), Ok(index)) = (world.as_mut(), soft_body_id(soft_body), usize::try_from(index)) {
        let _ = world.set_soft_body_point(id, index, Vec2::new(x, y));
    }
}

// Queries

/// Closest hit along the segment from start to end
///
/// # Safety
/// `world` must come from `flash_create_world` or be null.
#[no_mangle]
pub unsafe extern "C" fn flash_ray_cast(
    world: *const PhysicsWorld,
    start_x: f32,
    start_y: f32,
    end_x: f32,
    end_y: f32,
) -> FfiRayCastHit {
    let Some(world) = world.as_ref() else {
        return FfiRayCastHit::MISS;
    };
    match world.ray_cast(Vec2::new(start_x, start_y), Vec2::new(end_x, end_y)) {
        Some(hit) => FfiRayCastHit {
            body_id: to_raw(hit.body.0),
            x: hit.point.x,
            y: hit.point.y,
            normal_x: hit.normal.x,
            normal_y: hit.normal.y,
            fraction: hit.fraction,
            hit: 1,
        },
        None => FfiRayCastHit::MISS,
    }
}
