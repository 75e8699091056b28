//! Constraint and variable core for multibody dynamics.
//!
//! This crate holds the data an LCP/VI solver works on: the generalized
//! velocities of each dynamic entity, the scalar constraints coupling pairs
//! of them, and the bookkeeping that maps solved multipliers back to
//! reaction wrenches.
//!
//! # Building Blocks
//!
//! - [`Variables`]: one entity's velocity slice plus its inverse-mass operator,
//!   stored in a [`VariablesArena`] and addressed by [`VariablesId`]
//! - [`TwoBodyConstraint`]: one Jacobian row split across two blocks, driven
//!   through the [`Constraint`] trait
//! - [`SolveSession`]: block offsets in the global vector for one solve
//! - [`SparseAssembler`]: explicit `Cq` for direct solvers
//! - [`Link`]: attachment frames and reaction wrenches of a joint
//! - [`SystemDescriptor`]: everything above, in solver order
//!
//! # Constraint Formulation
//!
//! Each scalar constraint is posed at the velocity level:
//!
//! ```text
//! Cq * v + b + cfm * l  ⟂  l         (Unilateral: l >= 0)
//! Cq * v + b + cfm * l  =  0         (Lock)
//! ```
//!
//! Matrix-free iterative solvers use the mass-weighted path
//! (`update_auxiliary`, `compute_jacobian_dot_velocity`, `increment_velocity`).
//! Direct solvers assemble `Cq` through a session's offsets.
//!
//! Blocks marked inactive (fixed bodies) contribute nothing to any operation.
//!
//! # Example
//!
//! ```
//! use sim_lcp::{Constraint, SystemDescriptor, TwoBodyConstraint, Variables};
//! use sim_types::MassProperties;
//!
//! let mut system: SystemDescriptor = SystemDescriptor::new();
//! let ground = system.add_variables(Variables::for_body(&MassProperties::fixed()).unwrap());
//! let body = system.add_variables(Variables::for_body(&MassProperties::sphere(2.0, 0.5)).unwrap());
//!
//! let mut c = TwoBodyConstraint::new(system.variables(), ground, body).unwrap();
//! c.set_jacobian_b(&[0.0, 0.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
//! system.add_constraint(c);
//! system.update_auxiliary();
//!
//! // Only the free body gets an offset
//! let session = system.begin_session();
//! assert_eq!(session.total_dim(), 6);
//!
//! let cq = system.build_cq().unwrap();
//! assert_eq!(cq.nnz(), 1);
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It can be used in:
//!
//! - Headless simulation loops
//! - Custom solver implementations
//! - Analysis tools

#![doc(html_root_url = "https://docs.rs/sim-lcp/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod coloring;
mod config;
mod constraint;
mod error;
mod islands;
mod link;
pub mod parallel;
mod session;
mod sparse;
mod system;
mod two_body;
mod types;
mod variables;

pub use coloring::ConstraintBatches;
pub use config::{LcpConfig, ParallelConfig};
pub use constraint::Constraint;
pub use error::{LcpError, Side};
pub use islands::{ConstraintIslands, Island};
pub use link::{
    ActivationSchedule, BodyFrames, Link, LinkAssets, LinkDof, LinkSide, ReactionConvention,
    ReactionSlot,
};
pub use session::SolveSession;
pub use sparse::SparseAssembler;
pub use system::SystemDescriptor;
pub use two_body::TwoBodyConstraint;
pub use types::{ConstraintMode, ConstraintState};
pub use variables::{InverseMass, Variables, VariablesArena, VariablesId, VariablesMut};

// Re-export types needed by collaborators
pub use sim_types::{BodyId, MassProperties, Pose, Wrench};

/// Result type for constraint core operations.
pub type Result<T> = std::result::Result<T, LcpError>;
