//! Weld joint: locks relative position and angle, optionally springy

use super::{
    apply_angular_impulse, apply_point_correction, apply_point_impulse, point_mass_matrix, relative_point_velocity,
    JointConstraint, JointStepContext, MAX_ANGULAR_CORRECTION,
};
use crate::body::{Body, BodyId};
use crate::math::{rotate, solve2};
use crate::solver::Softness;
use glam::{Mat2, Vec2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeldJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    #[serde(default)]
    pub reference_angle: f32,
    /// Zero keeps the point lock rigid
    #[serde(default)]
    pub linear_hertz: f32,
    #[serde(default)]
    pub linear_damping_ratio: f32,
    /// Zero keeps the angle lock rigid
    #[serde(default)]
    pub angular_hertz: f32,
    #[serde(default)]
    pub angular_damping_ratio: f32,
    #[serde(default)]
    pub collide_connected: bool,
}

impl WeldJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            linear_hertz: 0.0,
            linear_damping_ratio: 0.0,
            angular_hertz: 0.0,
            angular_damping_ratio: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_reference_angle(mut self, angle: f32) -> Self {
        self.reference_angle = angle;
        self
    }

    pub fn with_linear_spring(mut self, hertz: f32, damping_ratio: f32) -> Self {
        self.linear_hertz = hertz;
        self.linear_damping_ratio = damping_ratio;
        self
    }

    pub fn with_angular_spring(mut self, hertz: f32, damping_ratio: f32) -> Self {
        self.angular_hertz = hertz;
        self.angular_damping_ratio = damping_ratio;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let values = [
            self.linear_hertz,
            self.linear_damping_ratio,
            self.angular_hertz,
            self.angular_damping_ratio,
        ];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err("weld joint spring parameters must be finite and >= 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WeldJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f32,
    linear_hertz: f32,
    linear_damping_ratio: f32,
    angular_hertz: f32,
    angular_damping_ratio: f32,

    linear_impulse: Vec2,
    angular_impulse: f32,

    r_a: Vec2,
    r_b: Vec2,
    linear_mass: Mat2,
    axial_mass: f32,
    linear_softness: Softness,
    angular_softness: Softness,
    linear_error: Vec2,
    angular_error: f32,
}

impl WeldJoint {
    pub fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            linear_hertz: def.linear_hertz,
            linear_damping_ratio: def.linear_damping_ratio,
            angular_hertz: def.angular_hertz,
            angular_damping_ratio: def.angular_damping_ratio,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_mass: Mat2::ZERO,
            axial_mass: 0.0,
            linear_softness: Softness::RIGID,
            angular_softness: Softness::RIGID,
            linear_error: Vec2::ZERO,
            angular_error: 0.0,
        }
    }

    fn is_rigid(&self) -> (bool, bool) {
        (self.linear_hertz <= 0.0, self.angular_hertz <= 0.0)
    }
}

impl JointConstraint for WeldJoint {
    fn prepare(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        self.r_a = rotate(self.local_anchor_a, a.pose.rotation);
        self.r_b = rotate(self.local_anchor_b, b.pose.rotation);
        self.linear_mass = point_mass_matrix(a, b, self.r_a, self.r_b);
        let k = a.inv_inertia + b.inv_inertia;
        self.axial_mass = if k > 0.0 { 1.0 / k } else { 0.0 };

        let (linear_rigid, angular_rigid) = self.is_rigid();
        self.linear_softness = if linear_rigid {
            ctx.softness
        } else {
            Softness::new(self.linear_hertz, self.linear_damping_ratio, ctx.dt)
        };
        self.angular_softness = if angular_rigid {
            ctx.softness
        } else {
            Softness::new(self.angular_hertz, self.angular_damping_ratio, ctx.dt)
        };

        self.linear_error = (b.pose.position + self.r_b) - (a.pose.position + self.r_a);
        self.angular_error = b.pose.rotation - a.pose.rotation - self.reference_angle;

        if ctx.warm_starting {
            apply_point_impulse(a, b, self.r_a, self.r_b, self.linear_impulse);
            apply_angular_impulse(a, b, self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, a: &mut Body, b: &mut Body, _ctx: &JointStepContext) {
        // Angular row
        {
            let s = self.angular_softness;
            let cdot = b.angular_velocity - a.angular_velocity;
            let bias = s.bias_rate * self.angular_error;
            let impulse = -self.axial_mass * s.mass_scale * (cdot + bias) - s.impulse_scale * self.angular_impulse;
            self.angular_impulse += impulse;
            apply_angular_impulse(a, b, impulse);
        }

        // Point row
        {
            let s = self.linear_softness;
            let cdot = relative_point_velocity(a, b, self.r_a, self.r_b);
            let bias = self.linear_error * s.bias_rate;
            let impulse =
                -solve2(self.linear_mass, cdot + bias) * s.mass_scale - self.linear_impulse * s.impulse_scale;
            self.linear_impulse += impulse;
            apply_point_impulse(a, b, self.r_a, self.r_b, impulse);
        }
    }

    fn solve_position(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) -> bool {
        let (linear_rigid, angular_rigid) = self.is_rigid();

        let mut angular_error = 0.0;
        if angular_rigid {
            let c = b.pose.rotation - a.pose.rotation - self.reference_angle;
            angular_error = c.abs();
            let k = a.inv_inertia + b.inv_inertia;
            if k > 0.0 {
                let impulse = -c.clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION) / k;
                a.pose.rotation -= a.inv_inertia * impulse;
                b.pose.rotation += b.inv_inertia * impulse;
            }
        }

        let mut linear_error = 0.0;
        if linear_rigid {
            let r_a = rotate(self.local_anchor_a, a.pose.rotation);
            let r_b = rotate(self.local_anchor_b, b.pose.rotation);
            let c = (b.pose.position + r_b) - (a.pose.position + r_a);
            linear_error = c.length();
            let impulse = -solve2(point_mass_matrix(a, b, r_a, r_b), c);
            apply_point_correction(a, b, r_a, r_b, impulse);
        }

        linear_error <= ctx.linear_slop && angular_error <= ctx.angular_slop
    }

    fn reaction(&self) -> (Vec2, f32) {
        (self.linear_impulse, self.angular_impulse)
    }
}
