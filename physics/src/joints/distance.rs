//! Distance joint: keeps two anchor points at a rest length, either rigidly
//! or through a spring with optional length limits

use super::{apply_point_correction, apply_point_impulse, linear_stiffness, relative_point_velocity};
use super::{JointConstraint, JointStepContext};
use crate::body::{Body, BodyId};
use crate::math::{cross, rotate};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Upper bound used when a spring has no max length
const HUGE_LENGTH: f32 = 1.0e9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Anchor relative to body A's centre, in A's frame
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length: f32,
    /// Spring frequency, 0 for a rigid rod
    #[serde(default)]
    pub hertz: f32,
    #[serde(default)]
    pub damping_ratio: f32,
    /// Only used with a spring
    #[serde(default)]
    pub min_length: Option<f32>,
    #[serde(default)]
    pub max_length: Option<f32>,
    #[serde(default)]
    pub collide_connected: bool,
}

impl DistanceJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, local_anchor_a: Vec2, local_anchor_b: Vec2, length: f32) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            length,
            hertz: 0.0,
            damping_ratio: 0.0,
            min_length: None,
            max_length: None,
            collide_connected: false,
        }
    }

    pub fn with_spring(mut self, hertz: f32, damping_ratio: f32) -> Self {
        self.hertz = hertz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_limits(mut self, min_length: f32, max_length: f32) -> Self {
        self.min_length = Some(min_length);
        self.max_length = Some(max_length);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(format!("distance joint length must be >= 0, got {}", self.length));
        }
        if !self.hertz.is_finite() || self.hertz < 0.0 || !self.damping_ratio.is_finite() || self.damping_ratio < 0.0 {
            return Err("distance joint spring parameters must be finite and >= 0".into());
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(format!("distance joint min length {min} exceeds max length {max}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    length: f32,
    min_length: f32,
    max_length: f32,
    hertz: f32,
    damping_ratio: f32,

    impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,

    // Per-step data
    r_a: Vec2,
    r_b: Vec2,
    u: Vec2,
    current_length: f32,
    mass: f32,
    soft_mass: f32,
    gamma: f32,
    bias: f32,
}

impl DistanceJoint {
    pub fn new(def: &DistanceJointDef) -> Self {
        let (min_length, max_length) = if def.hertz > 0.0 {
            (
                def.min_length.unwrap_or(0.0).max(0.0),
                def.max_length.unwrap_or(HUGE_LENGTH),
            )
        } else {
            (def.length, def.length)
        };
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            min_length,
            max_length,
            hertz: def.hertz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            u: Vec2::ZERO,
            current_length: 0.0,
            mass: 0.0,
            soft_mass: 0.0,
            gamma: 0.0,
            bias: 0.0,
        }
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    fn is_spring(&self) -> bool {
        self.hertz > 0.0 && self.min_length < self.max_length
    }

    fn effective_mass(a: &Body, b: &Body, r_a: Vec2, r_b: Vec2, u: Vec2) -> f32 {
        let cr_a = cross(r_a, u);
        let cr_b = cross(r_b, u);
        a.inv_mass + a.inv_inertia * cr_a * cr_a + b.inv_mass + b.inv_inertia * cr_b * cr_b
    }
}

impl JointConstraint for DistanceJoint {
    fn prepare(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        self.r_a = rotate(self.local_anchor_a, a.pose.rotation);
        self.r_b = rotate(self.local_anchor_b, b.pose.rotation);
        let d = b.pose.position + self.r_b - a.pose.position - self.r_a;

        self.current_length = d.length();
        self.u = if self.current_length > ctx.linear_slop {
            d / self.current_length
        } else {
            Vec2::ZERO
        };

        let inv_mass = Self::effective_mass(a, b, self.r_a, self.r_b, self.u);
        self.mass = if inv_mass > 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.is_spring() {
            let (stiffness, damping) = linear_stiffness(self.hertz, self.damping_ratio, a, b);
            let c = self.current_length - self.length;
            let h = ctx.dt;
            let gamma = h * (damping + h * stiffness);
            self.gamma = if gamma > 0.0 { 1.0 / gamma } else { 0.0 };
            self.bias = c * h * stiffness * self.gamma;
            let soft = inv_mass + self.gamma;
            self.soft_mass = if soft > 0.0 { 1.0 / soft } else { 0.0 };
        } else {
            // Rigid rod: soft bias towards the rest length during the velocity pass
            self.gamma = 0.0;
            self.bias = ctx.softness.bias_rate * (self.current_length - self.length);
            self.soft_mass = self.mass;
        }

        if ctx.warm_starting {
            let p = self.u * (self.impulse + self.lower_impulse - self.upper_impulse);
            apply_point_impulse(a, b, self.r_a, self.r_b, p);
        } else {
            self.impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        if !self.is_spring() {
            let cdot = relative_point_velocity(a, b, self.r_a, self.r_b).dot(self.u);
            let softness = ctx.softness;
            let impulse = -self.mass * softness.mass_scale * (cdot + self.bias) - softness.impulse_scale * self.impulse;
            self.impulse += impulse;
            apply_point_impulse(a, b, self.r_a, self.r_b, self.u * impulse);
            return;
        }

        // Spring
        let cdot = relative_point_velocity(a, b, self.r_a, self.r_b).dot(self.u);
        let impulse = -self.soft_mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;
        apply_point_impulse(a, b, self.r_a, self.r_b, self.u * impulse);

        // Lower limit
        {
            let c = self.current_length - self.min_length;
            let bias = c.max(0.0) * ctx.inv_dt;
            let cdot = relative_point_velocity(a, b, self.r_a, self.r_b).dot(self.u);
            let impulse = -self.mass * (cdot + bias);
            let new_impulse = (self.lower_impulse + impulse).max(0.0);
            let applied = new_impulse - self.lower_impulse;
            self.lower_impulse = new_impulse;
            apply_point_impulse(a, b, self.r_a, self.r_b, self.u * applied);
        }

        // Upper limit
        {
            let c = self.max_length - self.current_length;
            let bias = c.max(0.0) * ctx.inv_dt;
            let cdot = -relative_point_velocity(a, b, self.r_a, self.r_b).dot(self.u);
            let impulse = -self.mass * (cdot + bias);
            let new_impulse = (self.upper_impulse + impulse).max(0.0);
            let applied = new_impulse - self.upper_impulse;
            self.upper_impulse = new_impulse;
            apply_point_impulse(a, b, self.r_a, self.r_b, -self.u * applied);
        }
    }

    fn solve_position(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) -> bool {
        let r_a = rotate(self.local_anchor_a, a.pose.rotation);
        let r_b = rotate(self.local_anchor_b, b.pose.rotation);
        let d = b.pose.position + r_b - a.pose.position - r_a;
        let length = d.length();
        if length <= f32::EPSILON {
            return true;
        }
        let u = d / length;

        let c = if self.min_length == self.max_length || length < self.min_length {
            length - self.min_length
        } else if length > self.max_length {
            length - self.max_length
        } else {
            return true;
        };
        let c = c.clamp(-ctx.max_linear_correction, ctx.max_linear_correction);

        let inv_mass = Self::effective_mass(a, b, r_a, r_b, u);
        if inv_mass <= 0.0 {
            return true;
        }
        let impulse = -c / inv_mass;
        apply_point_correction(a, b, r_a, r_b, u * impulse);

        c.abs() < ctx.linear_slop
    }

    fn reaction(&self) -> (Vec2, f32) {
        (self.u * (self.impulse + self.lower_impulse - self.upper_impulse), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyDef, Shape};
    use crate::solver::Softness;

    fn ctx() -> JointStepContext {
        JointStepContext {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            softness: Softness::RIGID,
            warm_starting: true,
            linear_slop: 0.5,
            angular_slop: 2.0_f32.to_radians(),
            max_linear_correction: 10.0,
        }
    }

    fn pair(distance: f32) -> (Body, Body) {
        let a = Body::from_def(BodyId(0), &BodyDef::dynamic(Shape::Circle { radius: 5.0 }));
        let b = Body::from_def(
            BodyId(1),
            &BodyDef::dynamic(Shape::Circle { radius: 5.0 }).with_position(Vec2::new(distance, 0.0)),
        );
        (a, b)
    }

    #[test]
    fn test_rigid_rod_removes_separating_velocity() {
        let (mut a, mut b) = pair(50.0);
        b.linear_velocity = Vec2::new(30.0, 0.0);
        let mut joint = DistanceJoint::new(&DistanceJointDef::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 50.0));
        let ctx = ctx();
        joint.prepare(&mut a, &mut b, &ctx);
        for _ in 0..4 {
            joint.solve_velocity(&mut a, &mut b, &ctx);
        }
        let rel = (b.linear_velocity - a.linear_velocity).x;
        assert!(rel.abs() < 1e-3, "relative velocity {rel}");
        // Momentum is conserved
        assert!(((a.linear_velocity + b.linear_velocity).x - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_position_pass_restores_length() {
        let (mut a, mut b) = pair(56.0);
        let mut joint = DistanceJoint::new(&DistanceJointDef::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 50.0));
        let ctx = ctx();
        for _ in 0..4 {
            joint.solve_position(&mut a, &mut b, &ctx);
        }
        let length = (b.pose.position - a.pose.position).length();
        assert!((length - 50.0).abs() < 0.01, "length {length}");
    }

    #[test]
    fn test_spring_pulls_towards_rest_length() {
        let (mut a, mut b) = pair(80.0);
        let def = DistanceJointDef::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 50.0).with_spring(2.0, 0.5);
        let mut joint = DistanceJoint::new(&def);
        let ctx = ctx();
        joint.prepare(&mut a, &mut b, &ctx);
        joint.solve_velocity(&mut a, &mut b, &ctx);
        assert!(a.linear_velocity.x > 0.0);
        assert!(b.linear_velocity.x < 0.0);
        // Inside the unbounded limits the position pass does nothing
        assert!(joint.solve_position(&mut a, &mut b, &ctx));
    }

    #[test]
    fn test_spring_max_length_limit() {
        let (mut a, mut b) = pair(70.0);
        b.linear_velocity = Vec2::new(100.0, 0.0);
        let def = DistanceJointDef::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 50.0)
            .with_spring(1.0, 0.0)
            .with_limits(40.0, 70.0);
        let mut joint = DistanceJoint::new(&def);
        let ctx = ctx();
        joint.prepare(&mut a, &mut b, &ctx);
        for _ in 0..8 {
            joint.solve_velocity(&mut a, &mut b, &ctx);
        }
        // At the max length the pair cannot keep separating
        assert!((b.linear_velocity - a.linear_velocity).x <= 1e-3);
    }
}
