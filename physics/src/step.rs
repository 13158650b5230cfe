//! The fixed per-step pipeline
//!
//! Order matters for determinism and is always the same: soft bodies,
//! broadphase, contacts, sleep and velocity integration, constraint
//! preparation, velocity iterations, impulse caching, position
//! integration, position iterations, divergence recovery.

use crate::body::{pair_mut, Body, BodyType};
use crate::collision::narrow_phase;
use crate::collision::Aabb;
use crate::joints::JointStepContext;
use crate::solver::contact::{self, PositionCorrection};
use crate::solver::{ContactConstraint, Softness};
use crate::world::PhysicsWorld;
use glam::Vec2;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, trace, warn};

/// Counters describing one completed step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    pub step: u64,
    pub candidate_pairs: usize,
    pub dropped_pairs: usize,
    pub contacts: usize,
    pub dropped_contacts: usize,
    pub sensor_overlaps: usize,
    pub awake_bodies: usize,
    pub active_joints: usize,
    pub cached_impulses: usize,
    pub evicted_impulses: usize,
    pub diverged_bodies: usize,
}

/// A non-static body that is currently simulated
#[inline]
fn is_active(body: &Body) -> bool {
    body.body_type != BodyType::Static && body.awake
}

/// Union-find over body indices, rebuilt every step
struct Islands {
    parent: Vec<usize>,
}

impl Islands {
    fn new(count: usize) -> Self {
        Self {
            parent: (0..count).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    /// Lower index wins so roots do not depend on link order
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

impl PhysicsWorld {
    /// Advance the world by `dt` seconds. Non-positive or non-finite `dt`
    /// leaves the world untouched.
    pub fn step(&mut self, dt: f32) -> StepStats {
        if !(dt > 0.0) || !dt.is_finite() {
            trace!(dt, "Ignoring step with invalid dt");
            return StepStats::default();
        }

        self.step_count += 1;
        let mut stats = StepStats {
            step: self.step_count,
            ..StepStats::default()
        };

        self.step_soft_bodies(dt);
        self.update_broad_phase(dt);
        self.build_contacts(dt, &mut stats);
        self.update_sleep(dt);
        self.integrate_velocities(dt);

        let ctx = JointStepContext {
            dt,
            inv_dt: 1.0 / dt,
            softness: Softness::new(self.config.joint_hertz, self.config.joint_damping_ratio, dt),
            warm_starting: self.config.enable_warm_starting,
            linear_slop: self.config.linear_slop,
            angular_slop: self.config.angular_slop,
            max_linear_correction: self.config.max_linear_correction,
        };
        self.prepare_constraints(&ctx);
        stats.active_joints = self.active_joints.len();

        self.solve_velocities(&ctx);
        self.cache_impulses(&mut stats);
        self.integrate_positions(dt);
        self.solve_positions(&ctx);
        stats.diverged_bodies = self.recover_diverged();

        stats.awake_bodies = self.bodies.iter().filter(|b| is_active(b)).count();
        stats.cached_impulses = self.warm_start.len();
        debug!(
            step = stats.step,
            pairs = stats.candidate_pairs,
            contacts = stats.contacts,
            awake = stats.awake_bodies,
            cached = stats.cached_impulses,
            "Physics step"
        );
        self.last_stats = stats;
        stats
    }

    fn step_soft_bodies(&mut self, dt: f32) {
        if self.soft_bodies.is_empty() {
            return;
        }
        let bodies = &self.bodies;
        let gravity = self.config.gravity;
        let config = &self.config.soft_body;
        self.soft_bodies
            .par_iter_mut()
            .for_each(|soft_body| soft_body.step(dt, gravity, bodies, config));
    }

    fn update_broad_phase(&mut self, dt: f32) {
        for body in &mut self.bodies {
            body.collision_count = 0;
        }
        let tight: Vec<Option<Aabb>> = self
            .bodies
            .par_iter()
            .map(|body| is_active(body).then(|| body.broadphase_aabb(dt)))
            .collect();
        self.broad_phase.update(&mut self.bodies, &tight, self.config.aabb_margin);
    }

    fn build_contacts(&mut self, dt: f32, stats: &mut StepStats) {
        let max_pairs = self.max_bodies * self.config.pairs_per_body;
        let max_contacts = self.max_bodies * self.config.contacts_per_body;
        stats.dropped_pairs = self.broad_phase.collect_pairs(&self.bodies, max_pairs, &mut self.pairs);
        stats.candidate_pairs = self.pairs.len();

        // Stiffness is capped at a quarter of the step rate
        let hertz = self.config.contact_hertz.min(0.25 / dt);
        let softness = Softness::new(hertz, self.config.contact_damping_ratio, dt);
        let threshold = self.config.restitution_threshold;
        let warm_starting = self.config.enable_warm_starting;

        self.contacts.clear();
        for &(ia, ib) in &self.pairs {
            let (a, b) = (&self.bodies[ia], &self.bodies[ib]);
            if a.is_static() && b.is_static() {
                continue;
            }
            if self.jointed_pairs.contains(&(ia, ib)) {
                continue;
            }
            let Some(manifold) = narrow_phase::collide_bodies(a, b) else {
                continue;
            };

            if a.is_sensor || b.is_sensor {
                stats.sensor_overlaps += 1;
                self.bodies[ia].collision_count += 1;
                self.bodies[ib].collision_count += 1;
                continue;
            }
            if self.contacts.len() >= max_contacts {
                stats.dropped_contacts += 1;
                continue;
            }

            let mut constraint = ContactConstraint::new(ia, ib, a, b, &manifold, softness, threshold);
            if warm_starting {
                constraint.seed_from_cache(&self.warm_start, &self.bodies);
            }
            trace!(a = ia, b = ib, points = constraint.points().len(), depth = manifold.penetration, "contact");
            self.contacts.push(constraint);
            self.bodies[ia].collision_count += 1;
            self.bodies[ib].collision_count += 1;
        }

        if stats.dropped_contacts > 0 {
            warn!(
                dropped = stats.dropped_contacts,
                capacity = max_contacts,
                "Contact capacity exceeded, dropping contacts"
            );
        }
        stats.contacts = self.contacts.len();
    }

    /// Grow sleep timers of quiet bodies, share the smallest timer across
    /// every touching or jointed island, then put whole islands to sleep or
    /// wake them together. Moving kinematic bodies never sleep and hold
    /// their partners awake without joining their islands.
    fn update_sleep(&mut self, dt: f32) {
        let config = &self.config;
        if !config.enable_sleep {
            for body in self.bodies.iter_mut().filter(|b| !b.is_static()) {
                body.sleep_time = 0.0;
                body.awake = true;
            }
            return;
        }

        let linear_sq = config.sleep_linear_threshold * config.sleep_linear_threshold;
        for body in self.bodies.iter_mut().filter(|b| !b.is_static()) {
            let restless = match body.body_type {
                BodyType::Kinematic => body.linear_velocity != Vec2::ZERO || body.angular_velocity != 0.0,
                _ => {
                    body.linear_velocity.length_squared() > linear_sq
                        || body.angular_velocity.abs() > config.sleep_angular_threshold
                }
            };
            if restless {
                body.sleep_time = 0.0;
            } else {
                body.sleep_time += dt;
            }
        }

        let links = self
            .contacts
            .iter()
            .map(|c| (c.body_a, c.body_b))
            .chain(self.joints.iter().map(|j| (j.body_a, j.body_b)));
        let mut islands = Islands::new(self.bodies.len());
        for (a, b) in links {
            let (type_a, type_b) = (self.bodies[a].body_type, self.bodies[b].body_type);
            match (type_a, type_b) {
                (BodyType::Dynamic, BodyType::Dynamic) => islands.union(a, b),
                (BodyType::Kinematic, BodyType::Dynamic) if self.bodies[a].sleep_time == 0.0 => {
                    self.bodies[b].sleep_time = 0.0;
                }
                (BodyType::Dynamic, BodyType::Kinematic) if self.bodies[b].sleep_time == 0.0 => {
                    self.bodies[a].sleep_time = 0.0;
                }
                _ => {}
            }
        }

        let mut island_time = vec![f32::INFINITY; self.bodies.len()];
        for (index, body) in self.bodies.iter().enumerate() {
            let root = islands.find(index);
            island_time[root] = island_time[root].min(body.sleep_time);
        }

        let time_to_sleep = config.time_to_sleep;
        for (index, body) in self.bodies.iter_mut().enumerate() {
            if body.is_static() {
                continue;
            }
            body.sleep_time = island_time[islands.find(index)];
            if body.sleep_time >= time_to_sleep {
                if body.awake {
                    trace!(body = %body.id, "body fell asleep");
                    body.awake = false;
                    body.linear_velocity = Vec2::ZERO;
                    body.angular_velocity = 0.0;
                }
            } else {
                body.awake = true;
            }
        }
    }

    fn integrate_velocities(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        let damping = self.config.velocity_damping;
        let max_speed = self.config.max_linear_velocity;
        for body in &mut self.bodies {
            if body.body_type == BodyType::Dynamic && body.awake {
                let acceleration = gravity * body.gravity_scale + body.force * body.inv_mass;
                body.linear_velocity += acceleration * dt;
                body.angular_velocity += body.torque * body.inv_inertia * dt;
                body.linear_velocity *= damping;
                body.angular_velocity *= damping;
                body.linear_velocity = body.linear_velocity.clamp_length_max(max_speed);
            }
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    /// Select constraints touching an awake body, prepare joints and apply
    /// warm-start impulses
    fn prepare_constraints(&mut self, ctx: &JointStepContext) {
        let bodies = &self.bodies;
        self.active_contacts.clear();
        self.active_contacts.extend(
            self.contacts
                .iter()
                .enumerate()
                .filter(|(_, c)| is_active(&bodies[c.body_a]) || is_active(&bodies[c.body_b]))
                .map(|(i, _)| i),
        );
        self.active_joints.clear();
        self.active_joints.extend(
            self.joints
                .iter()
                .enumerate()
                .filter(|(_, j)| is_active(&bodies[j.body_a]) || is_active(&bodies[j.body_b]))
                .map(|(i, _)| i),
        );

        for &index in &self.active_joints {
            let joint = &mut self.joints[index];
            let (a, b) = pair_mut(&mut self.bodies, joint.body_a, joint.body_b);
            joint.constraint_mut().prepare(a, b, ctx);
        }
        if ctx.warm_starting {
            for &index in &self.active_contacts {
                self.contacts[index].warm_start(&mut self.bodies);
            }
        }
    }

    fn solve_velocities(&mut self, ctx: &JointStepContext) {
        let push_velocity = self.config.contact_push_velocity;
        for _ in 0..self.config.velocity_iterations {
            for &index in &self.active_contacts {
                self.contacts[index].solve_velocity(&mut self.bodies, push_velocity);
            }
            for &index in &self.active_joints {
                let joint = &mut self.joints[index];
                let (a, b) = pair_mut(&mut self.bodies, joint.body_a, joint.body_b);
                joint.constraint_mut().solve_velocity(a, b, ctx);
            }
        }
    }

    /// Persist this step's impulses and age out contacts that are gone
    fn cache_impulses(&mut self, stats: &mut StepStats) {
        if !self.config.enable_warm_starting {
            self.warm_start.clear();
            return;
        }
        for constraint in &self.contacts {
            constraint.store_to_cache(&mut self.warm_start, &self.bodies, self.step_count);
        }
        stats.evicted_impulses = self.warm_start.evict(self.step_count, self.config.warm_start_max_age);
    }

    fn integrate_positions(&mut self, dt: f32) {
        for body in self.bodies.iter_mut().filter(|b| is_active(b)) {
            body.pose.position += body.linear_velocity * dt;
            body.pose.rotation += body.angular_velocity * dt;
        }
    }

    fn solve_positions(&mut self, ctx: &JointStepContext) {
        let tuning = PositionCorrection {
            linear_slop: self.config.linear_slop,
            baumgarte: self.config.baumgarte,
            max_correction: self.config.max_linear_correction,
        };
        for _ in 0..self.config.position_iterations {
            let mut max_penetration: f32 = 0.0;
            for &index in &self.active_contacts {
                let c = &self.contacts[index];
                let depth = contact::solve_position(&mut self.bodies, c.body_a, c.body_b, &tuning);
                max_penetration = max_penetration.max(depth);
            }
            let mut joints_ok = true;
            for &index in &self.active_joints {
                let joint = &mut self.joints[index];
                let (a, b) = pair_mut(&mut self.bodies, joint.body_a, joint.body_b);
                joints_ok &= joint.constraint_mut().solve_position(a, b, ctx);
            }
            if joints_ok && max_penetration <= 3.0 * tuning.linear_slop {
                break;
            }
        }
    }

    /// Reset bodies whose state went non-finite to their last good pose
    fn recover_diverged(&mut self) -> usize {
        let mut diverged = 0;
        for body in self.bodies.iter_mut().filter(|b| !b.is_static()) {
            let finite = body.pose.is_finite() && body.linear_velocity.is_finite() && body.angular_velocity.is_finite();
            if finite {
                body.last_finite_pose = body.pose;
                body.diverged = false;
            } else {
                warn!(body = %body.id, "Body state became non-finite, restoring last finite pose");
                body.pose = body.last_finite_pose;
                body.linear_velocity = Vec2::ZERO;
                body.angular_velocity = 0.0;
                body.diverged = true;
                diverged += 1;
            }
        }
        diverged
    }
}
