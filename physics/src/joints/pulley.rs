//! Pulley joint: two bodies hang from fixed ground anchors and share
//! one rope, so `length_a + ratio * length_b` stays constant.

use super::{JointConstraint, JointStepContext};
use crate::body::{Body, BodyId};
use crate::math::{cross, rotate};
use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulleyJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// World-space point the rope of A hangs from
    pub ground_anchor_a: Vec2,
    pub ground_anchor_b: Vec2,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest lengths of each side. Taken from the poses on the first step when absent.
    #[serde(default)]
    pub length_a: Option<f32>,
    #[serde(default)]
    pub length_b: Option<f32>,
    #[serde(default = "default_ratio")]
    pub ratio: f32,
    #[serde(default)]
    pub collide_connected: bool,
}

fn default_ratio() -> f32 {
    1.0
}

impl PulleyJointDef {
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        ground_anchor_a: Vec2,
        ground_anchor_b: Vec2,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        ratio: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a,
            local_anchor_b,
            length_a: None,
            length_b: None,
            ratio,
            collide_connected: false,
        }
    }

    pub fn with_lengths(mut self, length_a: f32, length_b: f32) -> Self {
        self.length_a = Some(length_a);
        self.length_b = Some(length_b);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.ratio.is_finite() || self.ratio <= f32::EPSILON {
            return Err(format!("pulley ratio must be positive, got {}", self.ratio));
        }
        for length in [self.length_a, self.length_b].into_iter().flatten() {
            if !length.is_finite() || length < 0.0 {
                return Err(format!("pulley length must be >= 0, got {length}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PulleyJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    ground_anchor_a: Vec2,
    ground_anchor_b: Vec2,
    ratio: f32,
    constant: Option<f32>,

    impulse: f32,

    r_a: Vec2,
    r_b: Vec2,
    u_a: Vec2,
    u_b: Vec2,
    mass: f32,
}

impl PulleyJoint {
    pub fn new(def: &PulleyJointDef) -> Self {
        let constant = match (def.length_a, def.length_b) {
            (Some(a), Some(b)) => Some(a + def.ratio * b),
            _ => None,
        };
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            ratio: def.ratio,
            constant,
            impulse: 0.0,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            u_a: Vec2::ZERO,
            u_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    /// Current rope lengths on each side
    pub fn lengths(&self, a: &Body, b: &Body) -> (f32, f32) {
        let p_a = a.pose.transform_point(self.local_anchor_a);
        let p_b = b.pose.transform_point(self.local_anchor_b);
        ((p_a - self.ground_anchor_a).length(), (p_b - self.ground_anchor_b).length())
    }

    /// `length_a + ratio * length_b` the joint maintains, once known
    pub fn constant(&self) -> Option<f32> {
        self.constant
    }

    /// Rope directions from each ground anchor, zeroed for slack-free anchors
    fn directions(&self, r_a: Vec2, r_b: Vec2, a: &Body, b: &Body, slop: f32) -> (Vec2, Vec2, f32, f32) {
        let u_a = a.pose.position + r_a - self.ground_anchor_a;
        let u_b = b.pose.position + r_b - self.ground_anchor_b;
        let length_a = u_a.length();
        let length_b = u_b.length();
        let u_a = if length_a > 10.0 * slop { u_a / length_a } else { Vec2::ZERO };
        let u_b = if length_b > 10.0 * slop { u_b / length_b } else { Vec2::ZERO };
        (u_a, u_b, length_a, length_b)
    }

    fn effective_mass(&self, a: &Body, b: &Body, r_a: Vec2, r_b: Vec2, u_a: Vec2, u_b: Vec2) -> f32 {
        let ru_a = cross(r_a, u_a);
        let ru_b = cross(r_b, u_b);
        let m_a = a.inv_mass + a.inv_inertia * ru_a * ru_a;
        let m_b = b.inv_mass + b.inv_inertia * ru_b * ru_b;
        let mass = m_a + self.ratio * self.ratio * m_b;
        if mass > 0.0 {
            1.0 / mass
        } else {
            0.0
        }
    }

    fn apply(a: &mut Body, b: &mut Body, r_a: Vec2, r_b: Vec2, p_a: Vec2, p_b: Vec2) {
        a.linear_velocity += p_a * a.inv_mass;
        a.angular_velocity += a.inv_inertia * cross(r_a, p_a);
        b.linear_velocity += p_b * b.inv_mass;
        b.angular_velocity += b.inv_inertia * cross(r_b, p_b);
    }
}

impl JointConstraint for PulleyJoint {
    fn prepare(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        self.r_a = rotate(self.local_anchor_a, a.pose.rotation);
        self.r_b = rotate(self.local_anchor_b, b.pose.rotation);
        let (u_a, u_b, length_a, length_b) = self.directions(self.r_a, self.r_b, a, b, ctx.linear_slop);
        if self.constant.is_none() {
            self.constant = Some(length_a + self.ratio * length_b);
        }
        self.u_a = u_a;
        self.u_b = u_b;
        self.mass = self.effective_mass(a, b, self.r_a, self.r_b, u_a, u_b);

        if ctx.warm_starting {
            let p_a = -self.impulse * u_a;
            let p_b = -self.ratio * self.impulse * u_b;
            Self::apply(a, b, self.r_a, self.r_b, p_a, p_b);
        } else {
            self.impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) {
        let v_a = a.linear_velocity + self.r_a.perp() * a.angular_velocity;
        let v_b = b.linear_velocity + self.r_b.perp() * b.angular_velocity;
        let cdot = -self.u_a.dot(v_a) - self.ratio * self.u_b.dot(v_b);

        let constant = self.constant.unwrap_or(0.0);
        let (_, _, length_a, length_b) = self.directions(self.r_a, self.r_b, a, b, ctx.linear_slop);
        let c = constant - length_a - self.ratio * length_b;
        let softness = ctx.softness;

        let impulse = -self.mass * softness.mass_scale * (cdot + softness.bias_rate * c)
            - softness.impulse_scale * self.impulse;
        self.impulse += impulse;

        let p_a = -impulse * self.u_a;
        let p_b = -self.ratio * impulse * self.u_b;
        Self::apply(a, b, self.r_a, self.r_b, p_a, p_b);
    }

    fn solve_position(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) -> bool {
        let Some(constant) = self.constant else {
            return true;
        };
        let r_a = rotate(self.local_anchor_a, a.pose.rotation);
        let r_b = rotate(self.local_anchor_b, b.pose.rotation);
        let (u_a, u_b, length_a, length_b) = self.directions(r_a, r_b, a, b, ctx.linear_slop);
        let mass = self.effective_mass(a, b, r_a, r_b, u_a, u_b);

        let c = constant - length_a - self.ratio * length_b;
        let impulse = -mass * c;

        let p_a = -impulse * u_a;
        let p_b = -self.ratio * impulse * u_b;
        a.pose.position += p_a * a.inv_mass;
        a.pose.rotation += a.inv_inertia * cross(r_a, p_a);
        b.pose.position += p_b * b.inv_mass;
        b.pose.rotation += b.inv_inertia * cross(r_b, p_b);

        c.abs() < ctx.linear_slop
    }

    fn reaction(&self) -> (Vec2, f32) {
        (-self.impulse * self.u_b, 0.0)
    }
}
