//! Constraint solver building blocks

pub mod contact;
pub mod warm_start;

use std::f32::consts::TAU;

pub use contact::{ContactConstraint, ContactConstraintPoint};
pub use warm_start::{ContactKey, WarmStartCache};

/// Spring-damper coefficients for a soft constraint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Softness {
    /// Fraction of the position error turned into bias velocity per second
    pub bias_rate: f32,
    /// Scale on the effective mass
    pub mass_scale: f32,
    /// Scale on the accumulated impulse fed back each iteration
    pub impulse_scale: f32,
}

impl Softness {
    /// Hard constraint: full mass, no bias, no impulse feedback
    pub const RIGID: Softness = Softness {
        bias_rate: 0.0,
        mass_scale: 1.0,
        impulse_scale: 0.0,
    };

    /// Coefficients for stiffness `hertz`, damping ratio `zeta` and step `h`
    pub fn new(hertz: f32, zeta: f32, h: f32) -> Self {
        if hertz <= 0.0 || h <= 0.0 {
            return Self::RIGID;
        }
        let omega = TAU * hertz;
        let a1 = 2.0 * zeta + h * omega;
        let a2 = h * omega * a1;
        let a3 = 1.0 / (1.0 + a2);
        Softness {
            bias_rate: omega / a1,
            mass_scale: a2 * a3,
            impulse_scale: a3,
        }
    }
}
