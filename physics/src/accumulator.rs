//! Fixed timestep accumulator
//!
//! Turns variable frame times into a whole number of fixed physics steps and
//! keeps the remainder for interpolation between the last two steps.

use tracing::warn;

/// Accumulator for fixed timestep updates, owned by the caller
#[derive(Debug, Clone)]
pub struct PhysicsAccumulator {
    /// Time carried over from previous frames
    accumulator: f32,
    /// Fixed timestep for physics updates
    pub fixed_timestep: f32,
    /// Most steps a single frame may request
    pub max_steps: u32,
}

impl PhysicsAccumulator {
    /// Create a new physics accumulator with the given fixed timestep
    pub fn new(fixed_timestep: f32) -> Self {
        Self::with_max_steps(fixed_timestep, 8)
    }

    pub fn with_max_steps(fixed_timestep: f32, max_steps: u32) -> Self {
        Self {
            accumulator: 0.0,
            fixed_timestep,
            max_steps: max_steps.max(1),
        }
    }

    /// Add a frame's delta time and return the number of steps to run
    pub fn accumulate(&mut self, delta_time: f32) -> u32 {
        if !(delta_time > 0.0) || !delta_time.is_finite() || !(self.fixed_timestep > 0.0) {
            return 0;
        }
        self.accumulator += delta_time;

        // Prevent the spiral of death
        let max_backlog = self.fixed_timestep * self.max_steps as f32;
        if self.accumulator > max_backlog {
            warn!(
                accumulated = self.accumulator,
                max_steps = self.max_steps,
                "Physics accumulator too large, clamping to prevent spiral of death"
            );
            self.accumulator = 0.0;
            return self.max_steps;
        }

        let steps = ((self.accumulator / self.fixed_timestep) as u32).min(self.max_steps);
        self.accumulator = (self.accumulator - steps as f32 * self.fixed_timestep).max(0.0);
        steps
    }

    /// How far between the last two steps we are, in `[0, 1)`
    pub fn interpolation_alpha(&self) -> f32 {
        if self.fixed_timestep > 0.0 {
            self.accumulator / self.fixed_timestep
        } else {
            0.0
        }
    }

    /// Reset the accumulator to zero
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    pub fn accumulated_time(&self) -> f32 {
        self.accumulator
    }
}

impl Default for PhysicsAccumulator {
    fn default() -> Self {
        Self::new(1.0 / 60.0)
    }
}
