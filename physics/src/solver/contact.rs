//! Soft contact constraints solved with sequential impulses

use super::warm_start::{ContactKey, WarmStartCache};
use super::Softness;
use crate::body::{pair_mut, Body, Material};
use crate::collision::narrow_phase;
use crate::collision::{Manifold, MAX_MANIFOLD_POINTS};
use crate::math::cross;
use glam::Vec2;
use tracing::trace;

/// Solver state for one manifold point
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactConstraintPoint {
    /// Contact point relative to the centre of body A
    pub anchor_a: Vec2,
    /// Contact point relative to the centre of body B
    pub anchor_b: Vec2,
    /// Signed separation when the constraint was built, negative when overlapping
    pub base_separation: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub normal_mass: f32,
    pub tangent_mass: f32,
    /// Target normal velocity from restitution, zero when the pair is not bouncing
    pub restitution_bias: f32,
}

/// Contact between two bodies, rebuilt every step from a manifold
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    pub body_a: usize,
    pub body_b: usize,
    /// Unit normal from A to B
    pub normal: Vec2,
    pub friction: f32,
    pub restitution: f32,
    pub softness: Softness,
    points: [ContactConstraintPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
}

#[inline]
fn tangent_of(normal: Vec2) -> Vec2 {
    Vec2::new(normal.y, -normal.x)
}

impl ContactConstraint {
    /// Build from a manifold using the bodies' pre-solve velocities
    pub fn new(
        body_a: usize,
        body_b: usize,
        a: &Body,
        b: &Body,
        manifold: &Manifold,
        softness: Softness,
        restitution_threshold: f32,
    ) -> Self {
        let mixed = Material::mix(&a.material, &b.material);
        let normal = manifold.normal;
        let tangent = tangent_of(normal);

        let mut points = [ContactConstraintPoint::default(); MAX_MANIFOLD_POINTS];
        let mut point_count = 0;
        for mp in manifold.points() {
            let anchor_a = mp.point - a.pose.position;
            let anchor_b = mp.point - b.pose.position;

            let rn_a = cross(anchor_a, normal);
            let rn_b = cross(anchor_b, normal);
            let k_normal = a.inv_mass + b.inv_mass + a.inv_inertia * rn_a * rn_a + b.inv_inertia * rn_b * rn_b;

            let rt_a = cross(anchor_a, tangent);
            let rt_b = cross(anchor_b, tangent);
            let k_tangent = a.inv_mass + b.inv_mass + a.inv_inertia * rt_a * rt_a + b.inv_inertia * rt_b * rt_b;

            // Bounce only when closing faster than the threshold
            let vn = (b.velocity_at(mp.point) - a.velocity_at(mp.point)).dot(normal);
            let restitution_bias = if mixed.restitution > 0.0 && vn < -restitution_threshold {
                mixed.restitution * vn
            } else {
                0.0
            };

            points[point_count] = ContactConstraintPoint {
                anchor_a,
                anchor_b,
                base_separation: -mp.penetration,
                normal_impulse: 0.0,
                tangent_impulse: 0.0,
                normal_mass: if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 },
                tangent_mass: if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 },
                restitution_bias,
            };
            point_count += 1;
        }

        Self {
            body_a,
            body_b,
            normal,
            friction: mixed.friction,
            restitution: mixed.restitution,
            softness,
            points,
            point_count,
        }
    }

    pub fn points(&self) -> &[ContactConstraintPoint] {
        &self.points[..self.point_count]
    }

    fn key(&self, bodies: &[Body], point: usize) -> ContactKey {
        ContactKey::new(bodies[self.body_a].id.0, bodies[self.body_b].id.0, point)
    }

    /// Seed accumulated impulses from the previous step
    pub fn seed_from_cache(&mut self, cache: &WarmStartCache, bodies: &[Body]) {
        for i in 0..self.point_count {
            if let Some((normal, tangent)) = cache.lookup(&self.key(bodies, i)) {
                self.points[i].normal_impulse = normal;
                self.points[i].tangent_impulse = tangent;
            }
        }
    }

    /// Write accumulated impulses back to the cache
    pub fn store_to_cache(&self, cache: &mut WarmStartCache, bodies: &[Body], stamp: u64) {
        for (i, point) in self.points().iter().enumerate() {
            cache.store(self.key(bodies, i), point.normal_impulse, point.tangent_impulse, stamp);
        }
    }

    /// Re-apply the seeded impulses to the body velocities in full. The
    /// soft `impulse_scale` only enters through the per-iteration feedback
    /// term in [`Self::solve_velocity`].
    pub fn warm_start(&self, bodies: &mut [Body]) {
        let (a, b) = pair_mut(bodies, self.body_a, self.body_b);
        let tangent = tangent_of(self.normal);
        for point in self.points() {
            let impulse = self.normal * point.normal_impulse + tangent * point.tangent_impulse;
            apply_impulse(a, b, point.anchor_a, point.anchor_b, impulse);
        }
    }

    /// One velocity iteration: non-penetration then Coulomb friction
    pub fn solve_velocity(&mut self, bodies: &mut [Body], push_velocity: f32) {
        let (a, b) = pair_mut(bodies, self.body_a, self.body_b);
        let normal = self.normal;
        let tangent = tangent_of(normal);
        let softness = self.softness;

        for point in self.points[..self.point_count].iter_mut() {
            let dv = relative_velocity(a, b, point.anchor_a, point.anchor_b);
            let vn = dv.dot(normal);

            let (bias, mass_scale, impulse_scale) = if point.restitution_bias < 0.0 {
                (point.restitution_bias, 1.0, 0.0)
            } else {
                let s = point.base_separation;
                (
                    (softness.bias_rate * s).max(-push_velocity),
                    softness.mass_scale,
                    softness.impulse_scale,
                )
            };

            let impulse =
                -point.normal_mass * mass_scale * (vn + bias) - impulse_scale * point.normal_impulse;
            let new_impulse = (point.normal_impulse + impulse).max(0.0);
            let applied = new_impulse - point.normal_impulse;
            point.normal_impulse = new_impulse;
            apply_impulse(a, b, point.anchor_a, point.anchor_b, normal * applied);

            trace!(vn, bias, normal_impulse = new_impulse, "contact point solved");
        }

        for point in self.points[..self.point_count].iter_mut() {
            let dv = relative_velocity(a, b, point.anchor_a, point.anchor_b);
            let vt = dv.dot(tangent);

            let max_friction = self.friction * point.normal_impulse;
            let impulse = -point.tangent_mass * vt;
            let new_impulse = (point.tangent_impulse + impulse).clamp(-max_friction, max_friction);
            let applied = new_impulse - point.tangent_impulse;
            point.tangent_impulse = new_impulse;
            apply_impulse(a, b, point.anchor_a, point.anchor_b, tangent * applied);
        }
    }
}

#[inline]
fn relative_velocity(a: &Body, b: &Body, anchor_a: Vec2, anchor_b: Vec2) -> Vec2 {
    let va = a.linear_velocity + anchor_a.perp() * a.angular_velocity;
    let vb = b.linear_velocity + anchor_b.perp() * b.angular_velocity;
    vb - va
}

/// Apply an equal and opposite impulse: `-impulse` on A, `+impulse` on B
#[inline]
fn apply_impulse(a: &mut Body, b: &mut Body, anchor_a: Vec2, anchor_b: Vec2, impulse: Vec2) {
    a.linear_velocity -= impulse * a.inv_mass;
    a.angular_velocity -= a.inv_inertia * cross(anchor_a, impulse);
    b.linear_velocity += impulse * b.inv_mass;
    b.angular_velocity += b.inv_inertia * cross(anchor_b, impulse);
}

/// Tuning for the position correction pass
#[derive(Debug, Clone, Copy)]
pub struct PositionCorrection {
    pub linear_slop: f32,
    pub baumgarte: f32,
    pub max_correction: f32,
}

/// Push two bodies apart along the freshly evaluated contact normal.
/// Returns the deepest penetration found before correction.
pub fn solve_position(bodies: &mut [Body], body_a: usize, body_b: usize, tuning: &PositionCorrection) -> f32 {
    let (a, b) = pair_mut(bodies, body_a, body_b);
    let Some(manifold) = narrow_phase::collide(&a.shape, &a.pose, &b.shape, &b.pose) else {
        return 0.0;
    };
    let normal = manifold.normal;

    for mp in manifold.points() {
        let correction = ((mp.penetration - tuning.linear_slop).max(0.0) * tuning.baumgarte)
            .min(tuning.max_correction);
        if correction <= 0.0 {
            continue;
        }

        let r_a = mp.point - a.pose.position;
        let r_b = mp.point - b.pose.position;
        let rn_a = cross(r_a, normal);
        let rn_b = cross(r_b, normal);
        let k = a.inv_mass + b.inv_mass + a.inv_inertia * rn_a * rn_a + b.inv_inertia * rn_b * rn_b;
        if k <= 0.0 {
            continue;
        }

        let impulse = normal * (correction / k);
        a.pose.position -= impulse * a.inv_mass;
        a.pose.rotation -= a.inv_inertia * cross(r_a, impulse);
        b.pose.position += impulse * b.inv_mass;
        b.pose.rotation += b.inv_inertia * cross(r_b, impulse);
    }

    manifold.penetration
}
