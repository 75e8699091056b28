//! Error types for body data.

use thiserror::Error;

/// Errors raised while validating body data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },
}

impl SimError {
    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Check if this is a mass properties error.
    #[must_use]
    pub fn is_mass_error(&self) -> bool {
        matches!(self, Self::InvalidMassProperties { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::invalid_mass("negative mass");
        assert!(err.to_string().contains("negative"));
        assert!(err.is_mass_error());
    }
}
