//! Revolute joint: a shared pin with optional angle limits and motor

use super::{apply_angular_impulse, apply_point_correction, apply_point_impulse, point_mass_matrix};
use super::{relative_point_velocity, JointConstraint, JointStepContext, MAX_ANGULAR_CORRECTION};
use crate::body::{Body, BodyId};
use crate::math::{rotate, solve2};
use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevoluteJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// `angle_b - angle_a` at rest
    #[serde(default)]
    pub reference_angle: f32,
    #[serde(default)]
    pub enable_limit: bool,
    #[serde(default)]
    pub lower_angle: f32,
    #[serde(default)]
    pub upper_angle: f32,
    #[serde(default)]
    pub enable_motor: bool,
    #[serde(default)]
    pub motor_speed: f32,
    #[serde(default)]
    pub max_motor_torque: f32,
    #[serde(default)]
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_limits(mut self, lower_angle: f32, upper_angle: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower_angle;
        self.upper_angle = upper_angle;
        self
    }

    pub fn with_motor(mut self, motor_speed: f32, max_motor_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = motor_speed;
        self.max_motor_torque = max_motor_torque;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.enable_limit && self.lower_angle > self.upper_angle {
            return Err("revolute joint lower angle exceeds upper angle".into());
        }
        if self.max_motor_torque < 0.0 {
            return Err("revolute joint max motor torque must be >= 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f32,
    enable_limit: bool,
    lower_angle: f32,
    upper_angle: f32,
    enable_motor: bool,
    motor_speed: f32,
    max_motor_torque: f32,

    linear_impulse: Vec2,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,

    r_a: Vec2,
    r_b: Vec2,
    separation: Vec2,
    axial_mass: f32,
    angle: f32,
}

impl RevoluteJoint {
    pub fn new(def: &RevoluteJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            linear_impulse: Vec2::ZERO,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            separation: Vec2::ZERO,
            axial_mass: 0.0,
            angle: 0.0,
        }
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    /// Joint angle relative to the reference angle
    pub fn joint_angle(&self, a: &Body, b: &Body) -> f32 {
        b.pose.rotation - a.pose.rotation - self.reference_angle
    }

    pub fn motor_impulse(&self) -> f32 {
        self.motor_impulse
    }
}

impl JointConstraint for RevoluteJoint {
    fn prepare(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        self.r_a = rotate(self.local_anchor_a, a.pose.rotation);
        self.r_b = rotate(self.local_anchor_b, b.pose.rotation);
        self.separation = b.pose.position + self.r_b - a.pose.position - self.r_a;

        let axial = a.inv_inertia + b.inv_inertia;
        let fixed_rotation = axial == 0.0;
        self.axial_mass = if axial > 0.0 { 1.0 / axial } else { 0.0 };
        self.angle = self.joint_angle(a, b);

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }
        if !self.enable_limit || fixed_rotation {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        if ctx.warm_starting {
            let axial_impulse = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            apply_point_impulse(a, b, self.r_a, self.r_b, self.linear_impulse);
            apply_angular_impulse(a, b, axial_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.motor_impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        let fixed_rotation = a.inv_inertia + b.inv_inertia == 0.0;

        if self.enable_motor && !fixed_rotation {
            let cdot = b.angular_velocity - a.angular_velocity - self.motor_speed;
            let impulse = -self.axial_mass * cdot;
            let old = self.motor_impulse;
            let max_impulse = ctx.dt * self.max_motor_torque;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            apply_angular_impulse(a, b, self.motor_impulse - old);
        }

        if self.enable_limit && !fixed_rotation {
            // Lower limit
            {
                let c = self.angle - self.lower_angle;
                let cdot = b.angular_velocity - a.angular_velocity;
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * ctx.inv_dt);
                let new_impulse = (self.lower_impulse + impulse).max(0.0);
                let applied = new_impulse - self.lower_impulse;
                self.lower_impulse = new_impulse;
                apply_angular_impulse(a, b, applied);
            }
            // Upper limit
            {
                let c = self.upper_angle - self.angle;
                let cdot = a.angular_velocity - b.angular_velocity;
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * ctx.inv_dt);
                let new_impulse = (self.upper_impulse + impulse).max(0.0);
                let applied = new_impulse - self.upper_impulse;
                self.upper_impulse = new_impulse;
                apply_angular_impulse(a, b, -applied);
            }
        }

        // Point constraint
        let softness = ctx.softness;
        let cdot = relative_point_velocity(a, b, self.r_a, self.r_b);
        let bias = self.separation * softness.bias_rate;
        let k = point_mass_matrix(a, b, self.r_a, self.r_b);
        let b_vec = solve2(k, cdot + bias);
        let impulse = -b_vec * softness.mass_scale - self.linear_impulse * softness.impulse_scale;
        self.linear_impulse += impulse;
        apply_point_impulse(a, b, self.r_a, self.r_b, impulse);
    }

    fn solve_position(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) -> bool {
        let axial = a.inv_inertia + b.inv_inertia;
        let fixed_rotation = axial == 0.0;
        let mut angular_error = 0.0;

        if self.enable_limit && !fixed_rotation {
            let angle = self.joint_angle(a, b);
            let c = if (self.upper_angle - self.lower_angle).abs() < 2.0 * ctx.angular_slop {
                (angle - self.lower_angle).clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION)
            } else if angle <= self.lower_angle {
                (angle - self.lower_angle + ctx.angular_slop).clamp(-MAX_ANGULAR_CORRECTION, 0.0)
            } else if angle >= self.upper_angle {
                (angle - self.upper_angle - ctx.angular_slop).clamp(0.0, MAX_ANGULAR_CORRECTION)
            } else {
                0.0
            };
            let limit_impulse = -c / axial;
            a.pose.rotation -= a.inv_inertia * limit_impulse;
            b.pose.rotation += b.inv_inertia * limit_impulse;
            angular_error = c.abs();
        }

        let r_a = rotate(self.local_anchor_a, a.pose.rotation);
        let r_b = rotate(self.local_anchor_b, b.pose.rotation);
        let c = b.pose.position + r_b - a.pose.position - r_a;
        let position_error = c.length();

        let k = point_mass_matrix(a, b, r_a, r_b);
        let impulse = -solve2(k, c);
        apply_point_correction(a, b, r_a, r_b, impulse);

        position_error <= ctx.linear_slop && angular_error <= ctx.angular_slop
    }

    fn reaction(&self) -> (Vec2, f32) {
        (
            self.linear_impulse,
            self.motor_impulse + self.lower_impulse - self.upper_impulse,
        )
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

    fn pinned_to_ground() -> (Body, Body) {
        let ground = Body::from_def(BodyId(0), &BodyDef::fixed(Shape::rect(10.0, 10.0)));
        let arm = Body::from_def(
            BodyId(1),
            &BodyDef::dynamic(Shape::rect(40.0, 4.0)).with_position(Vec2::new(20.0, 0.0)),
        );
        (ground, arm)
    }

    #[test]
    fn test_pin_holds_point_together() {
        let (mut ground, mut arm) = pinned_to_ground();
        arm.linear_velocity = Vec2::new(0.0, -100.0);
        let def = RevoluteJointDef::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::new(-20.0, 0.0));
        let mut joint = RevoluteJoint::new(&def);
        let ctx = ctx();
        joint.prepare(&mut ground, &mut arm, &ctx);
        for _ in 0..8 {
            joint.solve_velocity(&mut ground, &mut arm, &ctx);
        }
        // The anchor point has no velocity, the arm swings about it
        let anchor_velocity = arm.velocity_at(Vec2::ZERO);
        assert!(anchor_velocity.length() < 1e-2, "anchor velocity {anchor_velocity:?}");
        assert!(arm.angular_velocity < 0.0);
        assert_eq!(ground.linear_velocity, Vec2::ZERO);
    }

    #[test]
    fn test_motor_drives_relative_speed() {
        let (mut ground, mut arm) = pinned_to_ground();
        let def = RevoluteJointDef::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::new(-20.0, 0.0)).with_motor(2.0, 1.0e6);
        let mut joint = RevoluteJoint::new(&def);
        let ctx = ctx();
        joint.prepare(&mut ground, &mut arm, &ctx);
        for _ in 0..32 {
            joint.solve_velocity(&mut ground, &mut arm, &ctx);
        }
        assert!((arm.angular_velocity - 2.0).abs() < 0.05, "w {}", arm.angular_velocity);
    }

    #[test]
    fn test_upper_limit_position_correction() {
        let (mut ground, mut arm) = pinned_to_ground();
        arm.pose.rotation = 0.5;
        arm.pose.position = Vec2::from_angle(0.5).rotate(Vec2::new(20.0, 0.0));
        let def = RevoluteJointDef::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::new(-20.0, 0.0)).with_limits(-0.25, 0.25);
        let mut joint = RevoluteJoint::new(&def);
        let ctx = ctx();
        for _ in 0..20 {
            joint.solve_position(&mut ground, &mut arm, &ctx);
        }
        assert!(arm.pose.rotation < 0.25 + 2.0 * ctx.angular_slop, "angle {}", arm.pose.rotation);
    }
}
