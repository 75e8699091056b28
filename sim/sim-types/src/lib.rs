//! Core types for constrained multibody simulation.
//!
//! This crate provides the foundational data shared by the constraint core
//! and its collaborators:
//!
//! - [`BodyId`] - Identifier of a dynamic entity
//! - [`Pose`] - A coordinate frame (origin + orientation relative to a parent)
//! - [`Twist`] - Linear and angular velocity
//! - [`Wrench`] - Force and torque about a reference point
//! - [`MassProperties`] - Mass and inertia tensor
//!
//! # Design Philosophy
//!
//! These types are **pure data** with frame algebra attached. They know
//! nothing about constraints or solvers.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**.
//!
//! # Coordinate System
//!
//! Right-handed, Z up. Rotations are unit quaternions.
//!
//! # Example
//!
//! ```
//! use sim_types::{Pose, Wrench};
//! use nalgebra::{Point3, Vector3};
//!
//! // A frame one meter along X from its parent
//! let frame = Pose::from_position(Point3::new(1.0, 0.0, 0.0));
//!
//! // A pure +Y force at the frame origin becomes a force plus a +Z torque
//! // about the parent origin.
//! let parent = frame.transform_wrench_local_to_parent(&Wrench::force(Vector3::y()));
//! assert!((parent.torque.z - 1.0).abs() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod error;
mod frame;
mod spatial;

pub use body::{BodyId, MassProperties};
pub use error::SimError;
pub use frame::Pose;
pub use spatial::{Twist, Wrench};

// Re-export math types for convenience
pub use nalgebra::{Point3, UnitQuaternion, Vector3};

/// Result type for body data operations.
pub type Result<T> = std::result::Result<T, SimError>;
