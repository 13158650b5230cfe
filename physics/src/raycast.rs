//! Segment queries against rigid body shapes

use crate::body::{Body, BodyId, Shape};
use crate::math::{inv_rotate, normalize_or, rotate};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Closest intersection along a ray segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayCastHit {
    pub body: BodyId,
    pub point: Vec2,
    pub normal: Vec2,
    /// Position along the segment in `[0, 1]`
    pub fraction: f32,
}

/// Closest body hit by the segment `from -> to` whose category passes `mask_bits`
pub(crate) fn cast(bodies: &[Body], from: Vec2, to: Vec2, mask_bits: u32) -> Option<RayCastHit> {
    let delta = to - from;
    if delta.length_squared() <= f32::EPSILON || !delta.is_finite() || !from.is_finite() {
        return None;
    }

    let mut closest: Option<RayCastHit> = None;
    for body in bodies {
        if body.filter.category_bits & mask_bits == 0 {
            continue;
        }
        if !body.shape.compute_aabb(&body.pose).intersects_segment(from, to) {
            continue;
        }
        let Some((fraction, normal)) = intersect_shape(&body.shape, body.pose.position, body.pose.rotation, from, delta)
        else {
            continue;
        };
        if closest.map_or(true, |c| fraction < c.fraction) {
            closest = Some(RayCastHit {
                body: body.id,
                point: from + delta * fraction,
                normal,
                fraction,
            });
        }
    }

    if let Some(hit) = &closest {
        trace!(body = %hit.body, fraction = hit.fraction, "ray hit");
    }
    closest
}

fn intersect_shape(shape: &Shape, center: Vec2, rotation: f32, from: Vec2, delta: Vec2) -> Option<(f32, Vec2)> {
    match *shape {
        Shape::Circle { radius } => ray_circle(from, delta, center, radius),
        Shape::Box {
            half_width,
            half_height,
        } => {
            let local_from = inv_rotate(from - center, rotation);
            let local_delta = inv_rotate(delta, rotation);
            let (fraction, local_normal) = ray_box(local_from, local_delta, Vec2::new(half_width, half_height))?;
            Some((fraction, rotate(local_normal, rotation)))
        }
    }
}

/// Ray against a circle. A ray starting inside reports where it leaves.
fn ray_circle(from: Vec2, delta: Vec2, center: Vec2, radius: f32) -> Option<(f32, Vec2)> {
    let f = from - center;
    let a = delta.dot(delta);
    let b = 2.0 * f.dot(delta);
    let c = f.dot(f) - radius * radius;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let t = if c < 0.0 {
        (-b + root) / (2.0 * a)
    } else {
        (-b - root) / (2.0 * a)
    };
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let point = from + delta * t;
    Some((t, normalize_or(point - center, Vec2::Y)))
}

/// Slab test against an origin-centred box. A ray starting inside hits at
/// fraction 0 with the normal facing back along the ray.
fn ray_box(from: Vec2, delta: Vec2, half_extents: Vec2) -> Option<(f32, Vec2)> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    let mut normal = Vec2::ZERO;

    for axis in 0..2 {
        let (p, d, h) = (from[axis], delta[axis], half_extents[axis]);
        if d.abs() < f32::EPSILON {
            if p < -h || p > h {
                return None;
            }
            continue;
        }
        let inv_d = 1.0 / d;
        let mut t1 = (-h - p) * inv_d;
        let mut t2 = (h - p) * inv_d;
        let mut sign = -1.0;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
            sign = 1.0;
        }
        if t1 > t_min {
            t_min = t1;
            normal = Vec2::ZERO;
            normal[axis] = sign;
        }
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }

    if t_max < 0.0 || t_min > 1.0 {
        return None;
    }
    if t_min < 0.0 {
        return Some((0.0, -normalize_or(delta, Vec2::X)));
    }
    Some((t_min, normal))
}
