//! Deterministic 2D physics for games
//!
//! This crate simulates rigid bodies (circles and boxes), joints and
//! pressure soft bodies in a single `PhysicsWorld`. Stepping is synchronous
//! and produces the same results for the same inputs. A C ABI in [`ffi`]
//! exposes the world to non-Rust hosts.

pub mod accumulator;
pub mod body;
pub mod collision;
pub mod commands;
pub mod config;
pub mod error;
pub mod ffi;
pub mod joints;
pub mod math;
pub mod raycast;
pub mod scene;
pub mod soft_body;
pub mod solver;
pub mod step;
pub mod world;

pub use error::{EntityKind, PhysicsError, PhysicsResult};

// Re-export commonly used types
pub mod prelude {
    // World
    pub use crate::step::StepStats;
    pub use crate::world::PhysicsWorld;

    // Bodies
    pub use crate::body::{Body, BodyDef, BodyId, BodyType, Filter, Material, Pose, Shape};

    // Joints
    pub use crate::joints::{
        DistanceJointDef, JointDef, JointId, PrismaticJointDef, PulleyJointDef, RevoluteJointDef,
        WeldJointDef,
    };

    // Soft bodies
    pub use crate::soft_body::{SoftBody, SoftBodyDef, SoftBodyId};

    // Queries
    pub use crate::raycast::RayCastHit;

    // Config and IO
    pub use crate::config::{BroadPhaseKind, PhysicsConfig, SoftBodyConfig};
    pub use crate::scene::{Scene, SceneHandles};

    // Frame helpers
    pub use crate::accumulator::PhysicsAccumulator;
    pub use crate::commands::{CommandQueue, CommandReport, PhysicsCommand};

    pub use crate::error::{PhysicsError, PhysicsResult};

    // Math types
    pub use glam::Vec2;
}

/// Initialize logging for hosts that have no subscriber of their own.
/// Returns false when a global subscriber was already installed.
pub fn init_logging() -> bool {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
