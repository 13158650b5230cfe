//! Tuning parameters for the physics world

use crate::error::{PhysicsError, PhysicsResult};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Which broadphase structure the world uses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BroadPhaseKind {
    /// Incrementally updated AABB tree with fattened leaves
    DynamicTree,
    /// Uniform grid over fixed bounds
    SpatialGrid { cell_size: f32, min: Vec2, max: Vec2 },
}

impl Default for BroadPhaseKind {
    fn default() -> Self {
        BroadPhaseKind::DynamicTree
    }
}

/// Soft-body solver tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftBodyConfig {
    /// Verlet velocity retention per step
    pub damping: f32,
    /// Spring relaxation passes per step
    pub iterations: u32,
    /// Multiplier on `(target - area) * pressure`
    pub pressure_scale: f32,
    /// Collision radius of each point
    pub point_radius: f32,
    /// Fraction of the Verlet velocity kept after touching a rigid body
    pub collision_damping: f32,
    /// Points are clamped to `[-bounds, bounds]` on both axes
    pub bounds: f32,
}

impl Default for SoftBodyConfig {
    fn default() -> Self {
        Self {
            damping: 0.99,
            iterations: 10,
            pressure_scale: 1e-4,
            point_radius: 2.0,
            collision_damping: 0.5,
            bounds: 100_000.0,
        }
    }
}

/// Physics world configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity acceleration (pixels per second squared, Y up)
    pub gravity: Vec2,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub enable_warm_starting: bool,
    /// Contact stiffness in Hz, 0 for rigid contacts
    pub contact_hertz: f32,
    pub contact_damping_ratio: f32,
    pub joint_hertz: f32,
    pub joint_damping_ratio: f32,
    /// Maximum velocity used to push overlapping bodies apart
    pub contact_push_velocity: f32,
    /// Closing speed below which restitution is ignored
    pub restitution_threshold: f32,
    pub max_linear_velocity: f32,
    /// Multiplicative velocity damping applied each step
    pub velocity_damping: f32,
    /// Penetration allowed before position correction kicks in
    pub linear_slop: f32,
    pub angular_slop: f32,
    pub baumgarte: f32,
    /// Clamp on a single joint position correction
    pub max_linear_correction: f32,
    /// Broadphase AABB fattening
    pub aabb_margin: f32,
    pub enable_sleep: bool,
    pub sleep_linear_threshold: f32,
    pub sleep_angular_threshold: f32,
    /// Seconds a body must be quiet before it falls asleep
    pub time_to_sleep: f32,
    /// Steps a warm-start entry survives without being refreshed
    pub warm_start_max_age: u64,
    pub broad_phase: BroadPhaseKind,
    pub max_joints: usize,
    pub max_soft_bodies: usize,
    pub contacts_per_body: usize,
    pub pairs_per_body: usize,
    pub soft_body: SoftBodyConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -981.0),
            velocity_iterations: 8,
            position_iterations: 4,
            enable_warm_starting: true,
            contact_hertz: 30.0,
            contact_damping_ratio: 10.0,
            joint_hertz: 60.0,
            joint_damping_ratio: 2.0,
            contact_push_velocity: 300.0,
            restitution_threshold: 100.0,
            max_linear_velocity: 200_000.0,
            velocity_damping: 0.999,
            linear_slop: 0.5,
            angular_slop: 2.0_f32.to_radians(),
            baumgarte: 0.2,
            max_linear_correction: 10.0,
            aabb_margin: 2.0,
            enable_sleep: true,
            sleep_linear_threshold: 5.0,
            sleep_angular_threshold: 0.2,
            time_to_sleep: 1.0,
            warm_start_max_age: 4,
            broad_phase: BroadPhaseKind::DynamicTree,
            max_joints: 100,
            max_soft_bodies: 32,
            contacts_per_body: 4,
            pairs_per_body: 8,
            soft_body: SoftBodyConfig::default(),
        }
    }
}

impl PhysicsConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> PhysicsResult<Self> {
        let config: PhysicsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> PhysicsResult<Self> {
        let path = path.as_ref();
        debug!(path = ?path, "Loading physics config");
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> PhysicsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the solver cannot work with
    pub fn validate(&self) -> PhysicsResult<()> {
        if !self.gravity.is_finite() {
            return Err(invalid("gravity must be finite"));
        }
        if self.velocity_iterations == 0 {
            return Err(invalid("velocity_iterations must be at least 1"));
        }
        let non_negative = [
            ("contact_hertz", self.contact_hertz),
            ("contact_damping_ratio", self.contact_damping_ratio),
            ("joint_hertz", self.joint_hertz),
            ("joint_damping_ratio", self.joint_damping_ratio),
            ("contact_push_velocity", self.contact_push_velocity),
            ("restitution_threshold", self.restitution_threshold),
            ("linear_slop", self.linear_slop),
            ("angular_slop", self.angular_slop),
            ("aabb_margin", self.aabb_margin),
            ("sleep_linear_threshold", self.sleep_linear_threshold),
            ("sleep_angular_threshold", self.sleep_angular_threshold),
            ("time_to_sleep", self.time_to_sleep),
            ("max_linear_correction", self.max_linear_correction),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(&format!("{name} must be finite and >= 0, got {value}")));
            }
        }
        if !(self.max_linear_velocity > 0.0) {
            return Err(invalid("max_linear_velocity must be positive"));
        }
        if !(0.0..=1.0).contains(&self.velocity_damping) {
            return Err(invalid("velocity_damping must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.baumgarte) {
            return Err(invalid("baumgarte must be within [0, 1]"));
        }
        if self.contacts_per_body == 0 || self.pairs_per_body == 0 {
            return Err(invalid("contacts_per_body and pairs_per_body must be at least 1"));
        }
        if let BroadPhaseKind::SpatialGrid { cell_size, min, max } = self.broad_phase {
            if !(cell_size > 0.0) || !cell_size.is_finite() {
                return Err(invalid("spatial grid cell_size must be positive"));
            }
            if !min.is_finite() || !max.is_finite() || min.x >= max.x || min.y >= max.y {
                return Err(invalid("spatial grid bounds must satisfy min < max"));
            }
        }
        let soft = &self.soft_body;
        if !(0.0..=1.0).contains(&soft.damping) || !(0.0..=1.0).contains(&soft.collision_damping) {
            return Err(invalid("soft body damping values must be within [0, 1]"));
        }
        if !(soft.bounds > 0.0) || !(soft.point_radius >= 0.0) || !soft.pressure_scale.is_finite() {
            return Err(invalid("soft body bounds, point_radius and pressure_scale are out of range"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> PhysicsError {
    PhysicsError::InvalidConfig(message.to_string())
}
