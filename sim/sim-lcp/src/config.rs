//! Configuration for the constraint core.

use crate::{LcpError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings shared by assembly, system products, and batch evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LcpConfig {
    /// Entries with magnitude at or below this value are not stored when
    /// assembling sparse matrices. Exact zeros are always dropped.
    pub drop_tolerance: f64,

    /// Check auxiliary freshness before every system-level product and
    /// return [`LcpError::StaleAuxiliary`] instead of computing with stale data.
    pub verify_auxiliary: bool,

    /// Parallel batch evaluation.
    pub parallel: ParallelConfig,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            drop_tolerance: 0.0,
            verify_auxiliary: false,
            parallel: ParallelConfig::default(),
        }
    }
}

impl LcpConfig {
    /// Configuration for debugging driver ordering: every product is checked.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            verify_auxiliary: true,
            ..Default::default()
        }
    }

    /// Configuration for large real-time scenes.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            drop_tolerance: 1e-15,
            verify_auxiliary: false,
            parallel: ParallelConfig {
                enabled: true,
                min_batch_size: 64,
            },
        }
    }

    /// Set the drop tolerance.
    #[must_use]
    pub const fn with_drop_tolerance(mut self, tolerance: f64) -> Self {
        self.drop_tolerance = tolerance;
        self
    }

    /// Enable or disable auxiliary verification.
    #[must_use]
    pub const fn with_verify_auxiliary(mut self, enabled: bool) -> Self {
        self.verify_auxiliary = enabled;
        self
    }

    /// Set the parallel configuration.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.drop_tolerance.is_finite() || self.drop_tolerance < 0.0 {
            return Err(LcpError::invalid_config(
                "drop_tolerance must be finite and non-negative",
            ));
        }
        self.parallel.validate()
    }
}

/// Parallel batch evaluation settings.
///
/// Disabled by default: parallel evaluation only pays off once batches
/// hold many constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParallelConfig {
    /// Evaluate batches with rayon.
    pub enabled: bool,
    /// Batches smaller than this are evaluated sequentially.
    pub min_batch_size: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_batch_size: 32,
        }
    }
}

impl ParallelConfig {
    /// Whether a batch of `len` constraints should be evaluated in parallel.
    #[must_use]
    pub const fn use_parallel(&self, len: usize) -> bool {
        self.enabled && len >= self.min_batch_size
    }

    /// Validate the parallel settings.
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_size == 0 {
            return Err(LcpError::invalid_config(
                "min_batch_size must be at least 1",
            ));
        }
        Ok(())
    }
}
