//! Error types for the physics core

use crate::body::BodyId;
use crate::joints::JointId;
use crate::soft_body::SoftBodyId;
use std::fmt;

/// Which fixed-capacity store a creation call targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Body,
    Joint,
    SoftBody,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Body => write!(f, "body"),
            EntityKind::Joint => write!(f, "joint"),
            EntityKind::SoftBody => write!(f, "soft body"),
        }
    }
}

/// Errors surfaced by the physics world
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    /// A creation call found its store full
    #[error("{kind} store is full (capacity {capacity})")]
    CapacityExceeded { kind: EntityKind, capacity: usize },

    #[error("invalid body id {0}")]
    InvalidBody(BodyId),

    #[error("invalid joint id {0}")]
    InvalidJoint(JointId),

    #[error("invalid soft body id {0}")]
    InvalidSoftBody(SoftBodyId),

    #[error("soft body {soft_body} has no point {index}")]
    InvalidSoftBodyPoint { soft_body: SoftBodyId, index: usize },

    /// A body, joint or soft body definition was rejected before creation
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// A query found a pose that is not finite
    #[error("body {0} has a non-finite pose")]
    NonFiniteState(BodyId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate
pub type PhysicsResult<T> = Result<T, PhysicsError>;
