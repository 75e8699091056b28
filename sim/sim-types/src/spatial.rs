//! Spatial vectors: velocities and loads of a rigid body.

use std::ops::{Add, Neg};

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Linear and angular velocity of a body frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Velocity of the frame origin (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity (rad/s).
    pub angular: Vector3<f64>,
}

impl Twist {
    /// Twist from its two halves.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }
}

/// A force and a torque acting together.
///
/// A wrench only means something together with the frame it is written in,
/// which fixes both the basis of the vectors and the point the torque is
/// taken about. [`Pose`](crate::Pose) moves wrenches between frames.
///
/// # Example
///
/// ```
/// use sim_types::Wrench;
/// use nalgebra::Vector3;
///
/// // A +Y force read about a point one metre behind it along X
/// let w = Wrench::force(Vector3::y()).shift(&Vector3::new(-1.0, 0.0, 0.0));
/// assert_eq!(w.torque, Vector3::z());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Wrench {
    /// Force (N).
    pub force: Vector3<f64>,
    /// Torque about the reference point (N·m).
    pub torque: Vector3<f64>,
}

impl Wrench {
    /// Wrench from force and torque.
    #[must_use]
    pub const fn new(force: Vector3<f64>, torque: Vector3<f64>) -> Self {
        Self { force, torque }
    }

    /// No load.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// A force through the reference point.
    #[must_use]
    pub fn force(force: Vector3<f64>) -> Self {
        Self::new(force, Vector3::zeros())
    }

    /// The same load read about the point `reference + offset`, in the same
    /// basis.
    #[must_use]
    pub fn shift(&self, offset: &Vector3<f64>) -> Self {
        Self::new(self.force, self.torque - offset.cross(&self.force))
    }
}

impl Neg for Wrench {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.force, -self.torque)
    }
}

impl Add for Wrench {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.force + other.force, self.torque + other.torque)
    }
}
