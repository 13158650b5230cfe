//! Joint constraints between pairs of bodies
//!
//! Every joint follows the same contract: `prepare` caches lever arms and
//! effective masses and applies the previous step's impulses, then the
//! velocity pass runs once per velocity iteration and the position pass
//! once per position iteration.

pub mod distance;
pub mod prismatic;
pub mod pulley;
pub mod revolute;
pub mod weld;

pub use distance::{DistanceJoint, DistanceJointDef};
pub use prismatic::{PrismaticJoint, PrismaticJointDef};
pub use pulley::{PulleyJoint, PulleyJointDef};
pub use revolute::{RevoluteJoint, RevoluteJointDef};
pub use weld::{WeldJoint, WeldJointDef};

use crate::body::{Body, BodyId};
use crate::math::cross;
use crate::solver::Softness;
use glam::{Mat2, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest angular correction applied in a single position iteration
pub(crate) const MAX_ANGULAR_CORRECTION: f32 = 8.0 * std::f32::consts::PI / 180.0;

/// Stable handle to a joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JointId(pub u32);

impl JointId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-step values shared by all joints
#[derive(Debug, Clone, Copy)]
pub struct JointStepContext {
    pub dt: f32,
    pub inv_dt: f32,
    /// Bias used by rigid joint rows during the velocity pass
    pub softness: Softness,
    pub warm_starting: bool,
    pub linear_slop: f32,
    pub angular_slop: f32,
    pub max_linear_correction: f32,
}

/// Two-phase constraint solved against a pair of bodies
pub trait JointConstraint: fmt::Debug + Send + Sync {
    /// Cache per-step data and apply warm-start impulses
    fn prepare(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext);

    /// One velocity iteration
    fn solve_velocity(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext);

    /// One position iteration. Returns true when the error is within slop.
    fn solve_position(&mut self, a: &mut Body, b: &mut Body, ctx: &JointStepContext) -> bool;

    /// Accumulated linear and angular impulse from the last step
    fn reaction(&self) -> (Vec2, f32);
}

/// Creation parameters for any joint kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Weld(WeldJointDef),
    Pulley(PulleyJointDef),
}

impl JointDef {
    pub fn bodies(&self) -> (BodyId, BodyId) {
        match self {
            JointDef::Distance(d) => (d.body_a, d.body_b),
            JointDef::Revolute(d) => (d.body_a, d.body_b),
            JointDef::Prismatic(d) => (d.body_a, d.body_b),
            JointDef::Weld(d) => (d.body_a, d.body_b),
            JointDef::Pulley(d) => (d.body_a, d.body_b),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            JointDef::Distance(_) => "distance",
            JointDef::Revolute(_) => "revolute",
            JointDef::Prismatic(_) => "prismatic",
            JointDef::Weld(_) => "weld",
            JointDef::Pulley(_) => "pulley",
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(d) => d.collide_connected,
            JointDef::Revolute(d) => d.collide_connected,
            JointDef::Prismatic(d) => d.collide_connected,
            JointDef::Weld(d) => d.collide_connected,
            JointDef::Pulley(d) => d.collide_connected,
        }
    }

    /// Swap in new body ids, used when scenes remap indices
    pub fn with_bodies(mut self, body_a: BodyId, body_b: BodyId) -> Self {
        match &mut self {
            JointDef::Distance(d) => (d.body_a, d.body_b) = (body_a, body_b),
            JointDef::Revolute(d) => (d.body_a, d.body_b) = (body_a, body_b),
            JointDef::Prismatic(d) => (d.body_a, d.body_b) = (body_a, body_b),
            JointDef::Weld(d) => (d.body_a, d.body_b) = (body_a, body_b),
            JointDef::Pulley(d) => (d.body_a, d.body_b) = (body_a, body_b),
        }
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let (a, b) = self.bodies();
        if a == b {
            return Err(format!("joint connects body {a} to itself"));
        }
        match self {
            JointDef::Distance(d) => d.validate(),
            JointDef::Revolute(d) => d.validate(),
            JointDef::Prismatic(d) => d.validate(),
            JointDef::Weld(d) => d.validate(),
            JointDef::Pulley(d) => d.validate(),
        }
    }
}

/// Solver state for each joint kind
#[derive(Debug, Clone)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Weld(WeldJoint),
    Pulley(PulleyJoint),
}

/// A joint stored in the world
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) id: JointId,
    pub(crate) body_a: usize,
    pub(crate) body_b: usize,
    pub(crate) collide_connected: bool,
    pub(crate) kind: JointKind,
}

impl Joint {
    pub(crate) fn from_def(id: JointId, def: &JointDef) -> Self {
        let (a, b) = def.bodies();
        let kind = match def {
            JointDef::Distance(d) => JointKind::Distance(DistanceJoint::new(d)),
            JointDef::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(d)),
            JointDef::Prismatic(d) => JointKind::Prismatic(PrismaticJoint::new(d)),
            JointDef::Weld(d) => JointKind::Weld(WeldJoint::new(d)),
            JointDef::Pulley(d) => JointKind::Pulley(PulleyJoint::new(d)),
        };
        Self {
            id,
            body_a: a.index(),
            body_b: b.index(),
            collide_connected: def.collide_connected(),
            kind,
        }
    }

    pub fn id(&self) -> JointId {
        self.id
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        (BodyId(self.body_a as u32), BodyId(self.body_b as u32))
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub(crate) fn constraint(&self) -> &dyn JointConstraint {
        match &self.kind {
            JointKind::Distance(j) => j,
            JointKind::Revolute(j) => j,
            JointKind::Prismatic(j) => j,
            JointKind::Weld(j) => j,
            JointKind::Pulley(j) => j,
        }
    }

    pub(crate) fn constraint_mut(&mut self) -> &mut dyn JointConstraint {
        match &mut self.kind {
            JointKind::Distance(j) => j,
            JointKind::Revolute(j) => j,
            JointKind::Prismatic(j) => j,
            JointKind::Weld(j) => j,
            JointKind::Pulley(j) => j,
        }
    }

    /// World-space anchors on body A and body B
    pub fn world_anchors(&self, a: &Body, b: &Body) -> (Vec2, Vec2) {
        let (la, lb) = match &self.kind {
            JointKind::Distance(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Revolute(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Prismatic(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Weld(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Pulley(j) => (j.local_anchor_a, j.local_anchor_b),
        };
        (a.pose.transform_point(la), b.pose.transform_point(lb))
    }
}

#[inline]
pub(crate) fn relative_point_velocity(a: &Body, b: &Body, r_a: Vec2, r_b: Vec2) -> Vec2 {
    b.linear_velocity + r_b.perp() * b.angular_velocity - a.linear_velocity - r_a.perp() * a.angular_velocity
}

/// Apply `-impulse` at `r_a` on A and `+impulse` at `r_b` on B
#[inline]
pub(crate) fn apply_point_impulse(a: &mut Body, b: &mut Body, r_a: Vec2, r_b: Vec2, impulse: Vec2) {
    a.linear_velocity -= impulse * a.inv_mass;
    a.angular_velocity -= a.inv_inertia * cross(r_a, impulse);
    b.linear_velocity += impulse * b.inv_mass;
    b.angular_velocity += b.inv_inertia * cross(r_b, impulse);
}

#[inline]
pub(crate) fn apply_angular_impulse(a: &mut Body, b: &mut Body, impulse: f32) {
    a.angular_velocity -= a.inv_inertia * impulse;
    b.angular_velocity += b.inv_inertia * impulse;
}

/// Positional counterpart of `apply_point_impulse`
#[inline]
pub(crate) fn apply_point_correction(a: &mut Body, b: &mut Body, r_a: Vec2, r_b: Vec2, impulse: Vec2) {
    a.pose.position -= impulse * a.inv_mass;
    a.pose.rotation -= a.inv_inertia * cross(r_a, impulse);
    b.pose.position += impulse * b.inv_mass;
    b.pose.rotation += b.inv_inertia * cross(r_b, impulse);
}

/// Effective mass matrix for a point-to-point constraint
pub(crate) fn point_mass_matrix(a: &Body, b: &Body, r_a: Vec2, r_b: Vec2) -> Mat2 {
    let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);
    let k11 = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
    let k12 = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
    let k22 = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
    Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22))
}

/// Spring stiffness and damping for a target frequency, using the
/// reduced mass of the pair
pub(crate) fn linear_stiffness(hertz: f32, damping_ratio: f32, a: &Body, b: &Body) -> (f32, f32) {
    let mass = match (a.mass > 0.0, b.mass > 0.0) {
        (true, true) => a.mass * b.mass / (a.mass + b.mass),
        (true, false) => a.mass,
        (false, true) => b.mass,
        (false, false) => 0.0,
    };
    let omega = std::f32::consts::TAU * hertz;
    (mass * omega * omega, 2.0 * mass * damping_ratio * omega)
}
