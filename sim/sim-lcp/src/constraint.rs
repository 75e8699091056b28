//! The capability every constraint exposes to solvers.
//!
//! Solvers drive constraints exclusively through [`Constraint`]. A matrix-free
//! iterative solver uses the mass-weighted path:
//!
//! ```text
//! update_auxiliary                      once per step
//! loop {
//!     r  = compute_residual             Cq * v + b + cfm * l
//!     dl = -r / g
//!     increment_velocity(dl)            v += Eq * dl
//! }
//! ```
//!
//! Direct and matrix-based solvers use the raw Jacobian path instead
//! (`multiply_*`, `assemble_*`), which addresses global vectors through the
//! offsets of a [`SolveSession`].

use nalgebra::DVector;

use crate::{ConstraintState, Result, SolveSession, SparseAssembler, VariablesArena, VariablesId};

/// Operations a solver may invoke on a scalar constraint.
///
/// Every operation treats a side whose block is inactive as contributing
/// nothing: reads see a zero Jacobian, writes leave the block untouched.
pub trait Constraint {
    /// Blocks this constraint couples.
    fn variables(&self) -> &[VariablesId];

    /// Solver bookkeeping.
    fn state(&self) -> &ConstraintState;

    /// Mutable solver bookkeeping.
    fn state_mut(&mut self) -> &mut ConstraintState;

    /// Recompute the mass-weighted blocks `Eq = invM * Cq^T` and the Schur
    /// diagonal. Must run after every Jacobian or inverse-mass change and
    /// before the velocity primitives.
    fn update_auxiliary(&mut self, arena: &VariablesArena);

    /// Fail with [`LcpError::StaleAuxiliary`](crate::LcpError::StaleAuxiliary)
    /// if the auxiliary blocks no longer match the Jacobians or the blocks.
    fn check_auxiliary(&self, arena: &VariablesArena) -> Result<()>;

    /// `Cq_A * v_A + Cq_B * v_B` over the active sides.
    fn compute_jacobian_dot_velocity(&self, arena: &VariablesArena) -> f64;

    /// `v += Eq * delta` on each active side.
    fn increment_velocity(&self, arena: &mut VariablesArena, delta: f64);

    /// `result += Cq * vect[offsets]`.
    fn multiply_and_accumulate(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        vect: &DVector<f64>,
        result: &mut f64,
    ) -> Result<()>;

    /// `result[offsets] += Cq^T * l`.
    fn multiply_transposed_and_accumulate(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        result: &mut DVector<f64>,
        l: f64,
    ) -> Result<()>;

    /// Write the raw Jacobian into `matrix` at `row`, columns at the block offsets.
    fn assemble_into(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        matrix: &mut SparseAssembler,
        row: usize,
    ) -> Result<()>;

    /// Write the transposed Jacobian into `matrix` at `col`, rows at the block offsets.
    fn assemble_transposed_into(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        matrix: &mut SparseAssembler,
        col: usize,
    ) -> Result<()>;

    /// Velocity-level residual `Cq * v + b + cfm * l`.
    fn compute_residual(&self, arena: &VariablesArena) -> f64 {
        let state = self.state();
        self.compute_jacobian_dot_velocity(arena) + state.rhs + state.cfm * state.multiplier
    }

    /// Clamp the multiplier to its feasible set.
    fn project(&mut self) {
        self.state_mut().project();
    }

    /// Whether a solver should include this constraint.
    fn is_active(&self) -> bool {
        self.state().is_active()
    }
}
