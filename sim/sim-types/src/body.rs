//! Body identity and inertia.

use nalgebra::{Matrix3, Vector3};

use crate::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle of a dynamic entity, as known to whoever owns the bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Mass and rotational inertia of a rigid body.
///
/// The body frame origin is the centre of mass, and `inertia` is expressed
/// in the body frame. Zero or infinite mass marks an immovable body.
///
/// # Example
///
/// ```
/// use sim_types::MassProperties;
///
/// let ball = MassProperties::sphere(2.0, 0.5);
/// assert_eq!(ball.inverse_mass(), 0.5);
/// assert!(ball.validate().is_ok());
///
/// assert!(MassProperties::fixed().is_static());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Mass (kg).
    pub mass: f64,
    /// Inertia tensor about the centre of mass (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Mass properties from raw values. Nothing is checked until
    /// [`validate`](Self::validate).
    #[must_use]
    pub const fn new(mass: f64, inertia: Matrix3<f64>) -> Self {
        Self { mass, inertia }
    }

    /// An immovable body.
    #[must_use]
    pub fn fixed() -> Self {
        Self::new(f64::INFINITY, Matrix3::identity())
    }

    /// Solid sphere of uniform density: `I = 2/5 m r²` on every axis.
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self::new(mass, Matrix3::from_diagonal_element(i))
    }

    /// Solid box of uniform density given its half extents.
    #[must_use]
    pub fn box_shape(mass: f64, half_extents: Vector3<f64>) -> Self {
        // With half extents h: I_xx = m/3 (h_y² + h_z²)
        let h2 = half_extents.component_mul(&half_extents);
        let diag = Vector3::new(h2.y + h2.z, h2.x + h2.z, h2.x + h2.y) * (mass / 3.0);
        Self::new(mass, Matrix3::from_diagonal(&diag))
    }

    /// Whether the body cannot be moved by constraint impulses.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.mass == 0.0 || self.mass == f64::INFINITY
    }

    /// `1 / mass`, or zero for a static body.
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.is_static() { 0.0 } else { self.mass.recip() }
    }

    /// Inverse inertia tensor, or `None` when the tensor is singular.
    #[must_use]
    pub fn inverse_inertia(&self) -> Option<Matrix3<f64>> {
        self.inertia.try_inverse()
    }

    /// Check that the values describe a physical body.
    pub fn validate(&self) -> Result<()> {
        if self.mass.is_nan() || self.mass < 0.0 {
            return Err(SimError::invalid_mass(format!(
                "mass must be non-negative, got {}",
                self.mass
            )));
        }
        if !self.inertia.iter().all(|x| x.is_finite()) {
            return Err(SimError::invalid_mass("inertia must be finite"));
        }
        if (self.inertia - self.inertia.transpose()).abs().max() > 1e-9 {
            return Err(SimError::invalid_mass("inertia must be symmetric"));
        }
        if self
            .inertia
            .symmetric_eigenvalues()
            .iter()
            .any(|&e| e < -1e-10)
        {
            return Err(SimError::invalid_mass(
                "inertia must be positive semi-definite",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_body_id_display() {
        assert_eq!(BodyId::new(42).to_string(), "Body(42)");
        assert_eq!(BodyId::from(7), BodyId(7));
    }

    #[test]
    fn test_sphere_inertia() {
        let props = MassProperties::sphere(5.0, 2.0);
        // 0.4 * 5 * 4
        assert_relative_eq!(props.inertia, Matrix3::from_diagonal_element(8.0), epsilon = 1e-12);
    }

    #[test]
    fn test_cube_inertia() {
        // Unit cube of mass 12: I = m/6 = 2
        let props = MassProperties::box_shape(12.0, Vector3::new(0.5, 0.5, 0.5));
        assert_relative_eq!(props.inertia, Matrix3::from_diagonal_element(2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_static_bodies() {
        assert!(MassProperties::fixed().is_static());
        assert!(MassProperties::new(0.0, Matrix3::identity()).is_static());
        assert_eq!(MassProperties::fixed().inverse_mass(), 0.0);
        assert!(MassProperties::fixed().validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(MassProperties::sphere(1.0, 1.0).validate().is_ok());

        let negative = MassProperties::new(-1.0, Matrix3::identity());
        assert!(negative.validate().unwrap_err().is_mass_error());

        let nan = MassProperties::new(f64::NAN, Matrix3::identity());
        assert!(nan.validate().is_err());

        let mut skew = Matrix3::identity();
        skew[(0, 1)] = 0.5;
        assert!(MassProperties::new(1.0, skew).validate().is_err());

        let indefinite = MassProperties::new(1.0, Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, 1.0)));
        assert!(indefinite.validate().is_err());
    }

    #[test]
    fn test_singular_inertia_has_no_inverse() {
        let props = MassProperties::new(1.0, Matrix3::zeros());
        assert!(props.validate().is_ok());
        assert!(props.inverse_inertia().is_none());
    }
}
