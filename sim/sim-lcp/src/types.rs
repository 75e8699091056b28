//! Solver bookkeeping carried by every constraint.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a solver treats a constraint's multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintMode {
    /// Not enforced. The multiplier is held at zero.
    Free,
    /// Bilateral: the multiplier may take any sign.
    #[default]
    Lock,
    /// Unilateral: the multiplier is clamped to be non-negative.
    Unilateral,
}

impl ConstraintMode {
    /// Whether a solver should process constraints in this mode.
    #[must_use]
    pub const fn is_enforced(self) -> bool {
        !matches!(self, Self::Free)
    }
}

/// Multiplier, right-hand side, and Schur diagonal of one scalar constraint.
///
/// ```text
/// residual = Cq * v + b + cfm * l
/// g        = Cq_A * Eq_A + Cq_B * Eq_B + cfm
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintState {
    /// Lagrange multiplier (impulse).
    pub multiplier: f64,
    /// Known term of the velocity-level constraint equation.
    pub rhs: f64,
    /// Constraint force mixing (regularization).
    pub cfm: f64,
    /// Schur complement diagonal, refreshed by `update_auxiliary`.
    pub schur_diagonal: f64,
    /// Treatment of the multiplier.
    pub mode: ConstraintMode,
    /// Disabled constraints are skipped by solvers.
    pub enabled: bool,
}

impl Default for ConstraintState {
    fn default() -> Self {
        Self {
            multiplier: 0.0,
            rhs: 0.0,
            cfm: 0.0,
            schur_diagonal: 0.0,
            mode: ConstraintMode::Lock,
            enabled: true,
        }
    }
}

impl ConstraintState {
    /// Whether a solver should include this constraint.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.enabled && self.mode.is_enforced()
    }

    /// Clamp the multiplier to the feasible set of the current mode.
    pub fn project(&mut self) {
        match self.mode {
            ConstraintMode::Free => self.multiplier = 0.0,
            ConstraintMode::Lock => {}
            ConstraintMode::Unilateral => self.multiplier = self.multiplier.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = ConstraintState::default();
        assert!(state.is_active());
        assert_eq!(state.mode, ConstraintMode::Lock);
    }

    #[test]
    fn test_projection() {
        let mut state = ConstraintState {
            multiplier: -2.0,
            ..Default::default()
        };
        state.project();
        assert_eq!(state.multiplier, -2.0);

        state.mode = ConstraintMode::Unilateral;
        state.project();
        assert_eq!(state.multiplier, 0.0);

        state.multiplier = 3.0;
        state.project();
        assert_eq!(state.multiplier, 3.0);

        state.mode = ConstraintMode::Free;
        state.project();
        assert_eq!(state.multiplier, 0.0);
        assert!(!state.is_active());
    }
}
