//! Prismatic joint: body B slides along an axis fixed in body A

use super::{JointConstraint, JointStepContext};
use crate::body::{Body, BodyId};
use crate::math::{cross, normalize_or, rotate, solve2, solve3};
use glam::{Mat2, Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrismaticJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Slide axis in body A's frame
    pub local_axis_a: Vec2,
    #[serde(default)]
    pub reference_angle: f32,
    #[serde(default)]
    pub enable_limit: bool,
    #[serde(default)]
    pub lower_translation: f32,
    #[serde(default)]
    pub upper_translation: f32,
    #[serde(default)]
    pub enable_motor: bool,
    #[serde(default)]
    pub motor_speed: f32,
    #[serde(default)]
    pub max_motor_force: f32,
    #[serde(default)]
    pub collide_connected: bool,
}

impl PrismaticJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, local_anchor_a: Vec2, local_anchor_b: Vec2, local_axis_a: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            local_axis_a,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    pub fn with_motor(mut self, motor_speed: f32, max_motor_force: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = motor_speed;
        self.max_motor_force = max_motor_force;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.local_axis_a.is_finite() || self.local_axis_a.length_squared() < 1e-12 {
            return Err("prismatic joint axis must be non-zero".into());
        }
        if self.enable_limit && self.lower_translation > self.upper_translation {
            return Err("prismatic joint lower translation exceeds upper translation".into());
        }
        if self.max_motor_force < 0.0 {
            return Err("prismatic joint max motor force must be >= 0".into());
        }
        Ok(())
    }
}

/// Lever arms and axes evaluated at a pose
#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    r_a: Vec2,
    r_b: Vec2,
    d: Vec2,
    axis: Vec2,
    perp: Vec2,
    a1: f32,
    a2: f32,
    s1: f32,
    s2: f32,
}

#[derive(Debug, Clone)]
pub struct PrismaticJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    local_x_axis: Vec2,
    local_y_axis: Vec2,
    reference_angle: f32,
    enable_limit: bool,
    lower_translation: f32,
    upper_translation: f32,
    enable_motor: bool,
    motor_speed: f32,
    max_motor_force: f32,

    /// Perpendicular and angular impulse
    impulse: Vec2,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,

    frame: Frame,
    axial_mass: f32,
    k: Mat2,
    translation: f32,
    /// Position error of the locked rows when the step started
    lock_error: Vec2,
}

impl PrismaticJoint {
    pub fn new(def: &PrismaticJointDef) -> Self {
        let axis = normalize_or(def.local_axis_a, Vec2::X);
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis: axis,
            local_y_axis: axis.perp(),
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_force: def.max_motor_force,
            impulse: Vec2::ZERO,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            frame: Frame::default(),
            axial_mass: 0.0,
            k: Mat2::IDENTITY,
            translation: 0.0,
            lock_error: Vec2::ZERO,
        }
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    /// Current translation of B's anchor along the axis
    pub fn joint_translation(&self, a: &Body, b: &Body) -> f32 {
        let frame = self.frame_at(a, b);
        frame.axis.dot(frame.d)
    }

    fn frame_at(&self, a: &Body, b: &Body) -> Frame {
        let r_a = rotate(self.local_anchor_a, a.pose.rotation);
        let r_b = rotate(self.local_anchor_b, b.pose.rotation);
        let d = b.pose.position + r_b - a.pose.position - r_a;
        let axis = rotate(self.local_x_axis, a.pose.rotation);
        let perp = rotate(self.local_y_axis, a.pose.rotation);
        Frame {
            r_a,
            r_b,
            d,
            axis,
            perp,
            a1: cross(d + r_a, axis),
            a2: cross(r_b, axis),
            s1: cross(d + r_a, perp),
            s2: cross(r_b, perp),
        }
    }

    /// Apply an impulse split into perpendicular, angular and axial parts
    fn apply(a: &mut Body, b: &mut Body, f: &Frame, perp: f32, angular: f32, axial: f32) {
        let p = f.perp * perp + f.axis * axial;
        let l_a = perp * f.s1 + angular + axial * f.a1;
        let l_b = perp * f.s2 + angular + axial * f.a2;
        a.linear_velocity -= p * a.inv_mass;
        a.angular_velocity -= a.inv_inertia * l_a;
        b.linear_velocity += p * b.inv_mass;
        b.angular_velocity += b.inv_inertia * l_b;
    }

    fn axial_velocity(a: &Body, b: &Body, f: &Frame) -> f32 {
        f.axis.dot(b.linear_velocity - a.linear_velocity) + f.a2 * b.angular_velocity - f.a1 * a.angular_velocity
    }
}

impl JointConstraint for PrismaticJoint {
    fn prepare(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        let f = self.frame_at(a, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);

        let axial = m_a + m_b + i_a * f.a1 * f.a1 + i_b * f.a2 * f.a2;
        self.axial_mass = if axial > 0.0 { 1.0 / axial } else { 0.0 };

        let k11 = m_a + m_b + i_a * f.s1 * f.s1 + i_b * f.s2 * f.s2;
        let k12 = i_a * f.s1 + i_b * f.s2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            // Bodies with fixed rotation
            k22 = 1.0;
        }
        self.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
        self.translation = f.axis.dot(f.d);
        self.lock_error = Vec2::new(
            f.perp.dot(f.d),
            b.pose.rotation - a.pose.rotation - self.reference_angle,
        );
        self.frame = f;

        if !self.enable_limit {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if ctx.warm_starting {
            let axial_impulse = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            Self::apply(a, b, &f, self.impulse.x, self.impulse.y, axial_impulse);
        } else {
            self.impulse = Vec2::ZERO;
            self.motor_impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        let f = self.frame;

        if self.enable_motor {
            let cdot = Self::axial_velocity(a, b, &f);
            let impulse = self.axial_mass * (self.motor_speed - cdot);
            let old = self.motor_impulse;
            let max_impulse = ctx.dt * self.max_motor_force;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            Self::apply(a, b, &f, 0.0, 0.0, self.motor_impulse - old);
        }

        if self.enable_limit {
            // Lower limit
            {
                let c = self.translation - self.lower_translation;
                let cdot = Self::axial_velocity(a, b, &f);
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * ctx.inv_dt);
                let new_impulse = (self.lower_impulse + impulse).max(0.0);
                let applied = new_impulse - self.lower_impulse;
                self.lower_impulse = new_impulse;
                Self::apply(a, b, &f, 0.0, 0.0, applied);
            }
            // Upper limit
            {
                let c = self.upper_translation - self.translation;
                let cdot = -Self::axial_velocity(a, b, &f);
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * ctx.inv_dt);
                let new_impulse = (self.upper_impulse + impulse).max(0.0);
                let applied = new_impulse - self.upper_impulse;
                self.upper_impulse = new_impulse;
                Self::apply(a, b, &f, 0.0, 0.0, -applied);
            }
        }

        // Perpendicular and angular locks
        let softness = ctx.softness;
        let cdot = Vec2::new(
            f.perp.dot(b.linear_velocity - a.linear_velocity) + f.s2 * b.angular_velocity - f.s1 * a.angular_velocity,
            b.angular_velocity - a.angular_velocity,
        );
        let bias = self.lock_error * softness.bias_rate;
        let df = -solve2(self.k, cdot + bias) * softness.mass_scale - self.impulse * softness.impulse_scale;
        self.impulse += df;
        Self::apply(a, b, &f, df.x, df.y, 0.0);
    }

    fn solve_position(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) -> bool {
        let f = self.frame_at(a, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);

        let c1 = Vec2::new(
            f.perp.dot(f.d),
            b.pose.rotation - a.pose.rotation - self.reference_angle,
        );
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = f.axis.dot(f.d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * ctx.linear_slop {
                c2 = translation - self.lower_translation;
                linear_error = linear_error.max(c2.abs());
                active = true;
            } else if translation <= self.lower_translation {
                c2 = (translation - self.lower_translation).min(0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation).max(0.0);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let k11 = m_a + m_b + i_a * f.s1 * f.s1 + i_b * f.s2 * f.s2;
        let k12 = i_a * f.s1 + i_b * f.s2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            k22 = 1.0;
        }

        let impulse = if active {
            let k13 = i_a * f.s1 * f.a1 + i_b * f.s2 * f.a2;
            let k23 = i_a * f.a1 + i_b * f.a2;
            let k33 = m_a + m_b + i_a * f.a1 * f.a1 + i_b * f.a2 * f.a2;
            let k = Mat3::from_cols(
                Vec3::new(k11, k12, k13),
                Vec3::new(k12, k22, k23),
                Vec3::new(k13, k23, k33),
            );
            -solve3(k, Vec3::new(c1.x, c1.y, c2))
        } else {
            let k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
            let i = -solve2(k, c1);
            Vec3::new(i.x, i.y, 0.0)
        };

        let p = f.perp * impulse.x + f.axis * impulse.z;
        let l_a = impulse.x * f.s1 + impulse.y + impulse.z * f.a1;
        let l_b = impulse.x * f.s2 + impulse.y + impulse.z * f.a2;
        a.pose.position -= p * m_a;
        a.pose.rotation -= i_a * l_a;
        b.pose.position += p * m_b;
        b.pose.rotation += i_b * l_b;

        linear_error <= ctx.linear_slop && angular_error <= ctx.angular_slop
    }

    fn reaction(&self) -> (Vec2, f32) {
        let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
        (self.frame.perp * self.impulse.x + self.frame.axis * axial, self.impulse.y)
    }
}
