//! Coordinate frames.
//!
//! A [`Pose`] maps coordinates expressed in a child frame into its parent
//! frame. Attachment frames of a joint are poses relative to a body; a
//! body's pose is relative to the world, so
//! `body.compose(&attachment)` is the attachment frame in world coordinates.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::Wrench;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Origin and orientation of a frame relative to its parent.
///
/// # Example
///
/// ```
/// use sim_types::Pose;
/// use nalgebra::{Point3, UnitQuaternion, Vector3};
///
/// let frame = Pose::from_position_rotation(
///     Point3::new(1.0, 0.0, 0.0),
///     UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
/// );
///
/// // The child's x axis points along the parent's y axis
/// let tip = frame.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert!((tip - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Origin of the child frame, in parent coordinates.
    pub position: Point3<f64>,
    /// Rotation taking child axes to parent axes.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// The frame coinciding with its parent.
    #[must_use]
    pub fn identity() -> Self {
        Self::from_position_rotation(Point3::origin(), UnitQuaternion::identity())
    }

    /// A translated frame with the parent's orientation.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self::from_position_rotation(position, UnitQuaternion::identity())
    }

    /// A frame from its origin and orientation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Child point to parent coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Child direction to parent coordinates.
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Parent point to child coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, parent: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse_transform_vector(&(parent - self.position)))
    }

    /// Parent direction to child coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, parent: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(parent)
    }

    /// Re-express a wrench given in the child frame (torque about the child
    /// origin) in the parent frame (torque about the parent origin).
    #[must_use]
    pub fn transform_wrench_local_to_parent(&self, wrench: &Wrench) -> Wrench {
        Wrench::new(
            self.transform_vector(&wrench.force),
            self.transform_vector(&wrench.torque),
        )
        .shift(&-self.position.coords)
    }

    /// Re-express a wrench given in the parent frame (torque about the parent
    /// origin) in the child frame (torque about the child origin).
    #[must_use]
    pub fn transform_wrench_parent_to_local(&self, wrench: &Wrench) -> Wrench {
        let about_origin = wrench.shift(&self.position.coords);
        Wrench::new(
            self.inverse_transform_vector(&about_origin.force),
            self.inverse_transform_vector(&about_origin.torque),
        )
    }

    /// The parent frame as seen from the child.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self::from_position_rotation(Point3::from(-(rotation * self.position.coords)), rotation)
    }

    /// `self * child`: a frame given relative to `self`, expressed relative to
    /// `self`'s parent.
    #[must_use]
    pub fn compose(&self, child: &Self) -> Self {
        Self::from_position_rotation(
            self.transform_point(&child.position),
            self.rotation * child.rotation,
        )
    }
}
