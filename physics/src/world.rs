//! The physics world: fixed-capacity stores for bodies, joints and soft
//! bodies plus the per-world broadphase and warm-start cache.

use crate::body::{Body, BodyDef, BodyId, BodyType, Filter, Material, Pose, Shape};
use crate::collision::broad_phase::BroadPhase;
use crate::config::PhysicsConfig;
use crate::error::{EntityKind, PhysicsError, PhysicsResult};
use crate::joints::{Joint, JointDef, JointId, JointKind};
use crate::raycast::{self, RayCastHit};
use crate::soft_body::{SoftBody, SoftBodyDef, SoftBodyId};
use crate::solver::{ContactConstraint, WarmStartCache};
use crate::step::StepStats;
use glam::Vec2;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Bodies above this count are refused by `PhysicsWorld::new`
pub const MAX_WORLD_BODIES: usize = 1 << 20;

/// A deterministic 2D physics world
#[derive(Debug)]
pub struct PhysicsWorld {
    pub(crate) config: PhysicsConfig,
    pub(crate) max_bodies: usize,
    pub(crate) bodies: Vec<Body>,
    pub(crate) joints: Vec<Joint>,
    pub(crate) soft_bodies: Vec<SoftBody>,
    pub(crate) broad_phase: BroadPhase,
    pub(crate) warm_start: WarmStartCache,
    /// `(min, max)` body indices joined by a joint that suppresses contacts
    pub(crate) jointed_pairs: BTreeSet<(usize, usize)>,
    pub(crate) step_count: u64,
    pub(crate) last_stats: StepStats,

    // Per-step scratch, allocated once
    pub(crate) pairs: Vec<(usize, usize)>,
    pub(crate) contacts: Vec<ContactConstraint>,
    pub(crate) active_contacts: Vec<usize>,
    pub(crate) active_joints: Vec<usize>,
}

impl PhysicsWorld {
    /// Create a world with the default configuration
    pub fn new(max_bodies: usize) -> PhysicsResult<Self> {
        Self::with_config(max_bodies, PhysicsConfig::default())
    }

    pub fn with_config(max_bodies: usize, config: PhysicsConfig) -> PhysicsResult<Self> {
        config.validate()?;
        if max_bodies == 0 || max_bodies > MAX_WORLD_BODIES {
            return Err(PhysicsError::InvalidConfig(format!(
                "max_bodies must be within 1..={MAX_WORLD_BODIES}, got {max_bodies}"
            )));
        }

        let max_pairs = max_bodies * config.pairs_per_body;
        let max_contacts = max_bodies * config.contacts_per_body;
        info!(
            max_bodies,
            max_joints = config.max_joints,
            max_soft_bodies = config.max_soft_bodies,
            broad_phase = ?config.broad_phase,
            "Creating physics world"
        );

        Ok(Self {
            broad_phase: BroadPhase::new(&config.broad_phase, max_bodies),
            bodies: Vec::with_capacity(max_bodies),
            joints: Vec::with_capacity(config.max_joints),
            soft_bodies: Vec::with_capacity(config.max_soft_bodies),
            warm_start: WarmStartCache::new(),
            jointed_pairs: BTreeSet::new(),
            step_count: 0,
            last_stats: StepStats::default(),
            pairs: Vec::with_capacity(max_pairs),
            contacts: Vec::with_capacity(max_contacts),
            active_contacts: Vec::with_capacity(max_contacts),
            active_joints: Vec::with_capacity(config.max_joints),
            max_bodies,
            config,
        })
    }

    /// Tear the world down. Dropping it has the same effect.
    pub fn destroy(self) {
        info!(
            bodies = self.bodies.len(),
            joints = self.joints.len(),
            soft_bodies = self.soft_bodies.len(),
            steps = self.step_count,
            "Destroying physics world"
        );
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn max_bodies(&self) -> usize {
        self.max_bodies
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn soft_body_count(&self) -> usize {
        self.soft_bodies.len()
    }

    /// Number of completed steps
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn last_step_stats(&self) -> &StepStats {
        &self.last_stats
    }

    pub fn warm_start_cache(&self) -> &WarmStartCache {
        &self.warm_start
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter()
    }

    // Bodies

    pub fn create_body(&mut self, def: BodyDef) -> PhysicsResult<BodyId> {
        if self.bodies.len() >= self.max_bodies {
            warn!(capacity = self.max_bodies, "Body store full, rejecting new body");
            return Err(PhysicsError::CapacityExceeded {
                kind: EntityKind::Body,
                capacity: self.max_bodies,
            });
        }
        def.validate()?;

        let index = self.bodies.len();
        let id = BodyId(index as u32);
        let mut body = Body::from_def(id, &def);
        let (fat, proxy) =
            self.broad_phase
                .insert(index, body.broadphase_aabb(0.0), self.config.aabb_margin, body.is_static());
        body.aabb = fat;
        body.proxy = proxy;

        debug!(id = %id, body_type = ?body.body_type, shape = ?body.shape, "Created body");
        self.bodies.push(body);
        Ok(id)
    }

    /// Positional form of `create_body`: body type 0/1/2 is
    /// static/kinematic/dynamic, shape 0/1 is circle/box. Circles take
    /// `min(width, height) / 2` as their radius.
    #[allow(clippy::too_many_arguments)]
    pub fn create_body_raw(
        &mut self,
        body_type: i32,
        shape: i32,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        rotation: f32,
        category_bits: u32,
        mask_bits: u32,
    ) -> PhysicsResult<BodyId> {
        let body_type = BodyType::from_raw(body_type)
            .ok_or_else(|| PhysicsError::InvalidDefinition(format!("unknown body type {body_type}")))?;
        let shape = Shape::from_raw(shape, width, height)
            .ok_or_else(|| PhysicsError::InvalidDefinition(format!("unknown shape type {shape}")))?;
        let def = BodyDef::new(body_type, shape)
            .with_position(Vec2::new(x, y))
            .with_rotation(rotation)
            .with_filter(Filter::new(category_bits, mask_bits));
        self.create_body(def)
    }

    pub fn body(&self, id: BodyId) -> PhysicsResult<&Body> {
        self.bodies.get(id.index()).ok_or(PhysicsError::InvalidBody(id))
    }

    pub(crate) fn body_mut(&mut self, id: BodyId) -> PhysicsResult<&mut Body> {
        self.bodies.get_mut(id.index()).ok_or(PhysicsError::InvalidBody(id))
    }

    /// Accumulate a force for the next step
    pub fn apply_force(&mut self, id: BodyId, force: Vec2) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        body.force += force;
        body.wake();
        Ok(())
    }

    pub fn apply_torque(&mut self, id: BodyId, torque: f32) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        body.torque += torque;
        body.wake();
        Ok(())
    }

    /// Immediate change of momentum at the centre of mass
    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec2) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        body.linear_velocity += impulse * body.inv_mass;
        body.wake();
        Ok(())
    }

    /// Set the linear velocity. Static bodies ignore it.
    pub fn set_velocity(&mut self, id: BodyId, velocity: Vec2) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        if !body.is_static() {
            body.linear_velocity = velocity;
        }
        body.wake();
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, id: BodyId, angular_velocity: f32) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        if !body.is_static() {
            body.angular_velocity = angular_velocity;
        }
        body.wake();
        Ok(())
    }

    pub fn set_material(&mut self, id: BodyId, material: Material) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        body.material = material;
        body.wake();
        Ok(())
    }

    /// Override the mass of a dynamic body, recomputing its inertia
    pub fn set_mass(&mut self, id: BodyId, mass: f32) -> PhysicsResult<()> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!("mass must be positive, got {mass}")));
        }
        let body = self.body_mut(id)?;
        body.set_mass(mass);
        body.wake();
        Ok(())
    }

    /// Teleport a body. Velocities are kept.
    pub fn set_transform(&mut self, id: BodyId, position: Vec2, rotation: f32) -> PhysicsResult<()> {
        let pose = Pose::new(position, rotation);
        if !pose.is_finite() {
            return Err(PhysicsError::InvalidDefinition(format!(
                "transform for body {id} must be finite"
            )));
        }
        let margin = self.config.aabb_margin;
        let index = id.index();
        let body = self.bodies.get_mut(index).ok_or(PhysicsError::InvalidBody(id))?;
        body.pose = pose;
        body.last_finite_pose = pose;
        body.diverged = false;
        body.wake();
        self.broad_phase.teleport(index, body, margin);
        Ok(())
    }

    pub fn wake_body(&mut self, id: BodyId) -> PhysicsResult<()> {
        self.body_mut(id)?.wake();
        Ok(())
    }

    fn finite_body(&self, id: BodyId) -> PhysicsResult<&Body> {
        let body = self.body(id)?;
        if !body.pose.is_finite() {
            return Err(PhysicsError::NonFiniteState(id));
        }
        Ok(body)
    }

    pub fn get_pose(&self, id: BodyId) -> PhysicsResult<Pose> {
        Ok(self.finite_body(id)?.pose)
    }

    pub fn get_position(&self, id: BodyId) -> PhysicsResult<Vec2> {
        Ok(self.finite_body(id)?.pose.position)
    }

    pub fn get_rotation(&self, id: BodyId) -> PhysicsResult<f32> {
        Ok(self.finite_body(id)?.pose.rotation)
    }

    /// Linear and angular velocity
    pub fn velocity(&self, id: BodyId) -> PhysicsResult<(Vec2, f32)> {
        let body = self.body(id)?;
        Ok((body.linear_velocity, body.angular_velocity))
    }

    pub fn collision_count(&self, id: BodyId) -> PhysicsResult<u32> {
        Ok(self.body(id)?.collision_count)
    }

    pub fn is_awake(&self, id: BodyId) -> PhysicsResult<bool> {
        let body = self.body(id)?;
        Ok(!body.is_static() && body.awake)
    }

    /// Copy every body pose into `out` in id order, returning how many were written
    pub fn copy_body_poses(&self, out: &mut [Pose]) -> usize {
        let count = out.len().min(self.bodies.len());
        for (slot, body) in out.iter_mut().zip(&self.bodies) {
            *slot = body.pose;
        }
        count
    }

    // Joints

    pub fn create_joint(&mut self, def: JointDef) -> PhysicsResult<JointId> {
        let capacity = self.config.max_joints;
        if self.joints.len() >= capacity {
            warn!(capacity, "Joint store full, rejecting new joint");
            return Err(PhysicsError::CapacityExceeded {
                kind: EntityKind::Joint,
                capacity,
            });
        }
        def.validate().map_err(PhysicsError::InvalidDefinition)?;
        let (a, b) = def.bodies();
        self.body(a)?;
        self.body(b)?;

        let id = JointId(self.joints.len() as u32);
        let joint = Joint::from_def(id, &def);
        if !joint.collide_connected {
            let (ia, ib) = (a.index(), b.index());
            self.jointed_pairs.insert((ia.min(ib), ia.max(ib)));
        }
        self.bodies[a.index()].wake();
        self.bodies[b.index()].wake();

        debug!(id = %id, body_a = %a, body_b = %b, kind = def.kind_name(), "Created joint");
        self.joints.push(joint);
        Ok(id)
    }

    pub fn joint(&self, id: JointId) -> PhysicsResult<&Joint> {
        self.joints.get(id.index()).ok_or(PhysicsError::InvalidJoint(id))
    }

    fn joint_bodies(&self, id: JointId) -> PhysicsResult<(&Joint, &Body, &Body)> {
        let joint = self.joint(id)?;
        Ok((joint, &self.bodies[joint.body_a], &self.bodies[joint.body_b]))
    }

    /// Accumulated linear and angular impulse of the last step
    pub fn joint_reaction(&self, id: JointId) -> PhysicsResult<(Vec2, f32)> {
        Ok(self.joint(id)?.constraint().reaction())
    }

    /// Distance between the two world anchors
    pub fn joint_length(&self, id: JointId) -> PhysicsResult<f32> {
        let (joint, a, b) = self.joint_bodies(id)?;
        let (pa, pb) = joint.world_anchors(a, b);
        Ok(pa.distance(pb))
    }

    /// Relative rotation of body B with respect to body A. Revolute joints
    /// report it relative to their reference angle.
    pub fn joint_angle(&self, id: JointId) -> PhysicsResult<f32> {
        let (joint, a, b) = self.joint_bodies(id)?;
        Ok(match &joint.kind {
            JointKind::Revolute(revolute) => revolute.joint_angle(a, b),
            _ => b.pose.rotation - a.pose.rotation,
        })
    }

    /// Change the motor speed of a revolute or prismatic joint
    pub fn set_joint_motor_speed(&mut self, id: JointId, speed: f32) -> PhysicsResult<()> {
        let joint = self.joints.get_mut(id.index()).ok_or(PhysicsError::InvalidJoint(id))?;
        match &mut joint.kind {
            JointKind::Revolute(j) => j.set_motor_speed(speed),
            JointKind::Prismatic(j) => j.set_motor_speed(speed),
            _ => {
                return Err(PhysicsError::InvalidDefinition(format!("joint {id} has no motor")));
            }
        }
        let (a, b) = (joint.body_a, joint.body_b);
        self.bodies[a].wake();
        self.bodies[b].wake();
        Ok(())
    }

    // Soft bodies

    /// Create a soft body from split coordinate arrays
    pub fn create_soft_body(&mut self, xs: &[f32], ys: &[f32], pressure: f32, stiffness: f32) -> PhysicsResult<SoftBodyId> {
        let def = SoftBodyDef::from_coords(xs, ys, pressure, stiffness)?;
        self.create_soft_body_from_def(&def)
    }

    pub fn create_soft_body_from_def(&mut self, def: &SoftBodyDef) -> PhysicsResult<SoftBodyId> {
        let capacity = self.config.max_soft_bodies;
        if self.soft_bodies.len() >= capacity {
            warn!(capacity, "Soft body store full, rejecting new soft body");
            return Err(PhysicsError::CapacityExceeded {
                kind: EntityKind::SoftBody,
                capacity,
            });
        }
        let id = SoftBodyId(self.soft_bodies.len() as u32);
        let soft_body = SoftBody::new(id, def)?;
        debug!(id = %id, points = soft_body.point_count(), area = soft_body.target_area(), "Created soft body");
        self.soft_bodies.push(soft_body);
        Ok(id)
    }

    pub fn soft_body(&self, id: SoftBodyId) -> PhysicsResult<&SoftBody> {
        self.soft_bodies.get(id.index()).ok_or(PhysicsError::InvalidSoftBody(id))
    }

    fn soft_body_mut(&mut self, id: SoftBodyId) -> PhysicsResult<&mut SoftBody> {
        self.soft_bodies.get_mut(id.index()).ok_or(PhysicsError::InvalidSoftBody(id))
    }

    pub fn get_soft_body_point(&self, id: SoftBodyId, index: usize) -> PhysicsResult<Vec2> {
        self.soft_body(id)?
            .point(index)
            .ok_or(PhysicsError::InvalidSoftBodyPoint { soft_body: id, index })
    }

    /// Move a point and clear its velocity
    pub fn set_soft_body_point(&mut self, id: SoftBodyId, index: usize, position: Vec2) -> PhysicsResult<()> {
        if !position.is_finite() {
            return Err(PhysicsError::InvalidDefinition(format!(
                "point {index} of soft body {id} must be finite"
            )));
        }
        if self.soft_body_mut(id)?.set_point(index, position) {
            Ok(())
        } else {
            Err(PhysicsError::InvalidSoftBodyPoint { soft_body: id, index })
        }
    }

    /// Pin a point in place (or release it)
    pub fn pin_soft_body_point(&mut self, id: SoftBodyId, index: usize, pinned: bool) -> PhysicsResult<()> {
        if self.soft_body_mut(id)?.set_pinned(index, pinned) {
            Ok(())
        } else {
            Err(PhysicsError::InvalidSoftBodyPoint { soft_body: id, index })
        }
    }

    pub fn soft_body_area(&self, id: SoftBodyId) -> PhysicsResult<f32> {
        Ok(self.soft_body(id)?.area())
    }

    pub fn soft_body_points(&self, id: SoftBodyId) -> PhysicsResult<Vec<Vec2>> {
        Ok(self.soft_body(id)?.positions())
    }

    // Queries

    /// Closest body hit by the segment `from -> to`
    pub fn ray_cast(&self, from: Vec2, to: Vec2) -> Option<RayCastHit> {
        raycast::cast(&self.bodies, from, to, u32::MAX)
    }

    /// Like `ray_cast`, ignoring bodies whose category misses `mask_bits`
    pub fn ray_cast_filtered(&self, from: Vec2, to: Vec2, mask_bits: u32) -> Option<RayCastHit> {
        raycast::cast(&self.bodies, from, to, mask_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joints::{DistanceJointDef, RevoluteJointDef};

    fn small_config() -> PhysicsConfig {
        PhysicsConfig {
            max_joints: 1,
            max_soft_bodies: 1,
            ..PhysicsConfig::default()
        }
    }

    #[test]
    fn test_body_capacity() {
        let mut world = PhysicsWorld::new(2).unwrap();
        world.create_body(BodyDef::dynamic(Shape::Circle { radius: 1.0 })).unwrap();
        world.create_body(BodyDef::dynamic(Shape::Circle { radius: 1.0 })).unwrap();
        let err = world.create_body(BodyDef::dynamic(Shape::Circle { radius: 1.0 })).unwrap_err();
        assert!(matches!(err, PhysicsError::CapacityExceeded { kind: EntityKind::Body, capacity: 2 }));
    }

    #[test]
    fn test_raw_body_creation() {
        let mut world = PhysicsWorld::new(4).unwrap();
        let id = world.create_body_raw(2, 0, 1.0, 2.0, 20.0, 10.0, 0.0, 1, u32::MAX).unwrap();
        let body = world.body(id).unwrap();
        assert_eq!(body.body_type(), BodyType::Dynamic);
        assert_eq!(*body.shape(), Shape::Circle { radius: 5.0 });
        assert!(world.create_body_raw(7, 0, 0.0, 0.0, 1.0, 1.0, 0.0, 1, 1).is_err());
        assert!(world.create_body_raw(0, 9, 0.0, 0.0, 1.0, 1.0, 0.0, 1, 1).is_err());
    }

    #[test]
    fn test_invalid_handles() {
        let mut world = PhysicsWorld::new(4).unwrap();
        assert!(matches!(world.get_pose(BodyId(0)), Err(PhysicsError::InvalidBody(BodyId(0)))));
        assert!(world.apply_force(BodyId(3), Vec2::ONE).is_err());
        assert!(matches!(world.joint_reaction(JointId(0)), Err(PhysicsError::InvalidJoint(_))));
        assert!(matches!(world.soft_body_area(SoftBodyId(0)), Err(PhysicsError::InvalidSoftBody(_))));
    }

    #[test]
    fn test_joint_validation_and_capacity() {
        let mut world = PhysicsWorld::with_config(4, small_config()).unwrap();
        let a = world.create_body(BodyDef::fixed(Shape::rect(10.0, 10.0))).unwrap();
        let b = world
            .create_body(BodyDef::dynamic(Shape::rect(10.0, 10.0)).with_position(Vec2::new(0.0, -50.0)))
            .unwrap();

        let self_joint = JointDef::Revolute(RevoluteJointDef::new(a, a, Vec2::ZERO, Vec2::ZERO));
        assert!(matches!(world.create_joint(self_joint), Err(PhysicsError::InvalidDefinition(_))));
        let dangling = JointDef::Distance(DistanceJointDef::new(a, BodyId(9), Vec2::ZERO, Vec2::ZERO, 5.0));
        assert!(matches!(world.create_joint(dangling), Err(PhysicsError::InvalidBody(BodyId(9)))));

        let rod = JointDef::Distance(DistanceJointDef::new(a, b, Vec2::ZERO, Vec2::ZERO, 50.0));
        let id = world.create_joint(rod.clone()).unwrap();
        assert!((world.joint_length(id).unwrap() - 50.0).abs() < 1e-4);
        assert!(world.jointed_pairs.contains(&(0, 1)));
        assert!(matches!(
            world.create_joint(rod),
            Err(PhysicsError::CapacityExceeded { kind: EntityKind::Joint, .. })
        ));
    }

    #[test]
    fn test_soft_body_points() {
        let mut world = PhysicsWorld::with_config(4, small_config()).unwrap();
        let id = world
            .create_soft_body(&[0.0, 10.0, 10.0, 0.0], &[0.0, 0.0, 10.0, 10.0], 1.0, 1.0)
            .unwrap();
        assert!((world.soft_body_area(id).unwrap() - 100.0).abs() < 1e-4);
        world.set_soft_body_point(id, 2, Vec2::new(12.0, 12.0)).unwrap();
        assert_eq!(world.get_soft_body_point(id, 2).unwrap(), Vec2::new(12.0, 12.0));
        assert!(matches!(
            world.get_soft_body_point(id, 4),
            Err(PhysicsError::InvalidSoftBodyPoint { index: 4, .. })
        ));
        assert!(world.create_soft_body(&[0.0, 1.0, 0.0], &[0.0, 0.0, 1.0], 1.0, 1.0).is_err());
    }

    #[test]
    fn test_set_transform_rejects_nan_and_wakes() {
        let mut world = PhysicsWorld::new(4).unwrap();
        let id = world.create_body(BodyDef::dynamic(Shape::rect(10.0, 10.0))).unwrap();
        assert!(world.set_transform(id, Vec2::new(f32::NAN, 0.0), 0.0).is_err());
        world.bodies[0].awake = false;
        world.set_transform(id, Vec2::new(5.0, 6.0), 0.5).unwrap();
        assert!(world.is_awake(id).unwrap());
        assert_eq!(world.get_position(id).unwrap(), Vec2::new(5.0, 6.0));
        assert_eq!(world.get_rotation(id).unwrap(), 0.5);
    }

    #[test]
    fn test_velocity_on_static_body_is_ignored() {
        let mut world = PhysicsWorld::new(4).unwrap();
        let ground = world.create_body(BodyDef::fixed(Shape::rect(10.0, 10.0))).unwrap();
        world.set_velocity(ground, Vec2::new(10.0, 0.0)).unwrap();
        assert_eq!(world.velocity(ground).unwrap(), (Vec2::ZERO, 0.0));
        assert!(!world.is_awake(ground).unwrap());
    }
}
