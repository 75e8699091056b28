//! Error types for the constraint core.

use sim_types::{BodyId, SimError};

use crate::VariablesId;

/// Which of the two blocks of a two-body constraint an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The first block (entity A).
    A,
    /// The second block (entity B).
    B,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Errors reported by the constraint core.
///
/// Inactive variable blocks never produce an error: operations on an
/// inactive side are defined as no-ops.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum LcpError {
    /// A block's dimension disagrees with the Jacobian width already set for that side.
    #[error("dimension mismatch on side {side}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Side of the constraint.
        side: Side,
        /// Width of the existing Jacobian.
        expected: usize,
        /// Dimension of the offending block or slice.
        actual: usize,
    },

    /// Both sides of a two-body constraint refer to the same block.
    #[error("constraint cannot couple {0} to itself")]
    SelfCoupling(VariablesId),

    /// A handle does not refer to a block in the arena.
    #[error("unknown variables block {0}")]
    UnknownVariables(VariablesId),

    /// A block has no offset in the session being used.
    #[error("no offset assigned to {0} in the current solve session")]
    OffsetUnassigned(VariablesId),

    /// The session was superseded by a newer offset assignment.
    #[error("solve session {session} is stale (arena is at generation {current})")]
    StaleSession {
        /// Generation recorded by the session.
        session: u64,
        /// Current generation of the arena.
        current: u64,
    },

    /// A system-level operation needs offsets but no session was opened.
    #[error("no solve session has been opened")]
    NoSession,

    /// Auxiliary blocks were read before `update_auxiliary` refreshed them.
    #[error("auxiliary data is stale: {reason}")]
    StaleAuxiliary {
        /// What changed since the last update.
        reason: String,
    },

    /// A write falls outside the sparse matrix being assembled.
    #[error("entry ({row}, {col}) is outside a {rows}x{cols} matrix")]
    AssemblyOutOfBounds {
        /// Row of the entry.
        row: usize,
        /// Column of the entry.
        col: usize,
        /// Matrix rows.
        rows: usize,
        /// Matrix columns.
        cols: usize,
    },

    /// A global vector is shorter than the offsets require.
    #[error("global vector has length {actual}, needs at least {required}")]
    VectorTooShort {
        /// Minimum length required by the offsets.
        required: usize,
        /// Length provided.
        actual: usize,
    },

    /// An inverse-mass operator does not match the block dimension.
    #[error("invalid inverse mass: {reason}")]
    InvalidInverseMass {
        /// Description of the problem.
        reason: String,
    },

    /// A block's velocity or force does not match its operator.
    #[error("invalid variables block: {reason}")]
    InvalidVariables {
        /// Description of the problem.
        reason: String,
    },

    /// A body referenced by a link has no frame.
    #[error("{0} has no frame")]
    BodyNotFound(BodyId),

    /// A link slot refers to a constraint index outside the slice given.
    #[error("no constraint at index {index} (only {len} given)")]
    UnknownConstraint {
        /// Index stored in the slot.
        index: usize,
        /// Number of constraints provided.
        len: usize,
    },

    /// A time step was zero, negative, or not finite.
    #[error("invalid time step {step}")]
    InvalidStep {
        /// The rejected step.
        step: f64,
    },

    /// Body data rejected while building a block.
    #[error(transparent)]
    Body(#[from] SimError),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl LcpError {
    /// Create a stale auxiliary error.
    #[must_use]
    pub fn stale_auxiliary(reason: impl Into<String>) -> Self {
        Self::StaleAuxiliary {
            reason: reason.into(),
        }
    }

    /// Create an invalid inverse mass error.
    #[must_use]
    pub fn invalid_inverse_mass(reason: impl Into<String>) -> Self {
        Self::InvalidInverseMass {
            reason: reason.into(),
        }
    }

    /// Create an invalid variables error.
    #[must_use]
    pub fn invalid_variables(reason: impl Into<String>) -> Self {
        Self::InvalidVariables {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if this error comes from offset bookkeeping (driver ordering bug).
    #[must_use]
    pub fn is_offset_error(&self) -> bool {
        matches!(
            self,
            Self::OffsetUnassigned(_) | Self::StaleSession { .. } | Self::NoSession
        )
    }

    /// Check if this error was raised while binding a constraint.
    #[must_use]
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::SelfCoupling(_) | Self::UnknownVariables(_)
        )
    }
}
