//! Deferred mutations
//!
//! An application layer records commands while it handles a frame and
//! applies them to the world between steps.

use crate::body::BodyId;
use crate::soft_body::SoftBodyId;
use crate::world::PhysicsWorld;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Physics command to be executed before the next step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhysicsCommand {
    /// Accumulate a force on a body
    ApplyForce { body: BodyId, force: Vec2 },

    /// Change a body's momentum immediately
    ApplyImpulse { body: BodyId, impulse: Vec2 },

    ApplyTorque { body: BodyId, torque: f32 },

    SetVelocity {
        body: BodyId,
        linear: Vec2,
        angular: f32,
    },

    /// Drag a soft body point, clearing its velocity
    SetSoftBodyPoint {
        soft_body: SoftBodyId,
        index: usize,
        position: Vec2,
    },
}

/// Outcome of `PhysicsWorld::apply_commands`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub applied: usize,
    pub rejected: usize,
}

/// Ordered list of pending commands
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    commands: Vec<PhysicsCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: PhysicsCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Take all pending commands in recording order
    pub fn drain(&mut self) -> std::vec::Drain<'_, PhysicsCommand> {
        self.commands.drain(..)
    }
}

impl Extend<PhysicsCommand> for CommandQueue {
    fn extend<T: IntoIterator<Item = PhysicsCommand>>(&mut self, iter: T) {
        self.commands.extend(iter);
    }
}

impl PhysicsWorld {
    /// Apply one command
    pub fn apply_command(&mut self, command: &PhysicsCommand) -> crate::PhysicsResult<()> {
        match *command {
            PhysicsCommand::ApplyForce { body, force } => self.apply_force(body, force),
            PhysicsCommand::ApplyImpulse { body, impulse } => self.apply_impulse(body, impulse),
            PhysicsCommand::ApplyTorque { body, torque } => self.apply_torque(body, torque),
            PhysicsCommand::SetVelocity { body, linear, angular } => {
                self.set_velocity(body, linear)?;
                self.set_angular_velocity(body, angular)
            }
            PhysicsCommand::SetSoftBodyPoint {
                soft_body,
                index,
                position,
            } => self.set_soft_body_point(soft_body, index, position),
        }
    }

    /// Drain the queue into the world. Commands naming invalid handles are
    /// skipped and counted as rejected.
    pub fn apply_commands(&mut self, queue: &mut CommandQueue) -> CommandReport {
        let mut report = CommandReport::default();
        for command in queue.drain() {
            match self.apply_command(&command) {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    warn!(?command, %error, "Rejected physics command");
                    report.rejected += 1;
                }
            }
        }
        report
    }
}
