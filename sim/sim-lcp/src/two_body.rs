//! Scalar constraint between two variable blocks.
//!
//! A [`TwoBodyConstraint`] holds one Jacobian row split into the part acting
//! on block A and the part acting on block B:
//!
//! ```text
//! Cq = [ Cq_A | Cq_B ]          Cq_A: 1 x n_A, Cq_B: 1 x n_B
//! Eq_A = invM_A * Cq_A^T        (auxiliary, n_A x 1)
//! Eq_B = invM_B * Cq_B^T        (auxiliary, n_B x 1)
//! ```
//!
//! The auxiliary blocks are a cache. Editing a Jacobian or the constraint
//! force mixing, or replacing a block's inverse mass, makes them stale until
//! the next
//! [`update_auxiliary`](Constraint::update_auxiliary). Debug builds assert
//! freshness before the velocity primitives; [`Constraint::check_auxiliary`]
//! reports it as an error.
//!
//! # Example
//!
//! ```
//! use sim_lcp::{Constraint, TwoBodyConstraint, Variables, VariablesArena};
//! use sim_types::MassProperties;
//!
//! let mut arena = VariablesArena::new();
//! let a = arena.add(Variables::for_body(&MassProperties::sphere(1.0, 1.0)).unwrap());
//! let b = arena.add(Variables::for_body(&MassProperties::sphere(1.0, 1.0)).unwrap());
//!
//! let mut c = TwoBodyConstraint::new(&arena, a, b).unwrap();
//! c.set_jacobian_a(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
//! c.set_jacobian_b(&[-1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
//! c.update_auxiliary(&arena);
//!
//! c.increment_velocity(&mut arena, 1.0);
//! assert_eq!(arena.get(a).unwrap().velocity()[0], 1.0);
//! assert_eq!(arena.get(b).unwrap().velocity()[0], -1.0);
//! ```

use nalgebra::DVector;

use crate::{
    Constraint, ConstraintState, LcpError, Result, Side, SolveSession, SparseAssembler,
    VariablesArena, VariablesId,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What `update_auxiliary` saw the last time it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AuxiliaryStamp {
    mass_revision: [u64; 2],
    active: [bool; 2],
    cfm: u64,
}

/// A scalar constraint coupling two distinct variable blocks.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TwoBodyConstraint {
    variables: [VariablesId; 2],
    jacobian_a: DVector<f64>,
    jacobian_b: DVector<f64>,
    #[cfg_attr(feature = "serde", serde(skip, default = "empty_block"))]
    auxiliary_a: DVector<f64>,
    #[cfg_attr(feature = "serde", serde(skip, default = "empty_block"))]
    auxiliary_b: DVector<f64>,
    state: ConstraintState,
    #[cfg_attr(feature = "serde", serde(skip))]
    stamp: Option<AuxiliaryStamp>,
}

#[cfg(feature = "serde")]
fn empty_block() -> DVector<f64> {
    DVector::zeros(0)
}

impl TwoBodyConstraint {
    /// Bind a new constraint to blocks `a` and `b`, with zero Jacobians sized
    /// to the blocks.
    pub fn new(arena: &VariablesArena, a: VariablesId, b: VariablesId) -> Result<Self> {
        let (n_a, n_b) = Self::bindable(arena, a, b)?;
        Ok(Self {
            variables: [a, b],
            jacobian_a: DVector::zeros(n_a),
            jacobian_b: DVector::zeros(n_b),
            auxiliary_a: DVector::zeros(n_a),
            auxiliary_b: DVector::zeros(n_b),
            state: ConstraintState::default(),
            stamp: None,
        })
    }

    /// Rebind to blocks `a` and `b`, keeping the Jacobians.
    ///
    /// The new blocks must match the current Jacobian widths.
    pub fn set_variables(
        &mut self,
        arena: &VariablesArena,
        a: VariablesId,
        b: VariablesId,
    ) -> Result<()> {
        let (n_a, n_b) = Self::bindable(arena, a, b)?;
        let mismatch = if n_a != self.jacobian_a.len() {
            Some(LcpError::DimensionMismatch {
                side: Side::A,
                expected: self.jacobian_a.len(),
                actual: n_a,
            })
        } else if n_b != self.jacobian_b.len() {
            Some(LcpError::DimensionMismatch {
                side: Side::B,
                expected: self.jacobian_b.len(),
                actual: n_b,
            })
        } else {
            None
        };
        if let Some(err) = mismatch {
            tracing::warn!(%err, "rejected constraint binding");
            return Err(err);
        }

        self.variables = [a, b];
        self.stamp = None;
        Ok(())
    }

    /// Check the binding against `arena` again, as [`set_variables`](Self::set_variables)
    /// does for a new pair. Needed after restoring a constraint or attaching
    /// it to a different arena.
    pub fn rebind(&mut self, arena: &VariablesArena) -> Result<()> {
        let [a, b] = self.variables;
        self.set_variables(arena, a, b)
    }

    /// Fail if a known block's dimension differs from its Jacobian width.
    fn check_widths(&self, arena: &VariablesArena) -> Result<()> {
        for (side, id, width) in [
            (Side::A, self.variables[0], self.jacobian_a.len()),
            (Side::B, self.variables[1], self.jacobian_b.len()),
        ] {
            if let Some(block) = arena.get(id).filter(|v| v.dim() != width) {
                return Err(LcpError::DimensionMismatch {
                    side,
                    expected: width,
                    actual: block.dim(),
                });
            }
        }
        Ok(())
    }

    fn bindable(arena: &VariablesArena, a: VariablesId, b: VariablesId) -> Result<(usize, usize)> {
        let dims = if a == b {
            Err(LcpError::SelfCoupling(a))
        } else {
            arena
                .try_get(a)
                .and_then(|va| arena.try_get(b).map(|vb| (va.dim(), vb.dim())))
        };
        dims.inspect_err(|err| tracing::warn!(%err, "rejected constraint binding"))
    }

    /// Block A.
    #[must_use]
    pub fn variables_a(&self) -> VariablesId {
        self.variables[0]
    }

    /// Block B.
    #[must_use]
    pub fn variables_b(&self) -> VariablesId {
        self.variables[1]
    }

    /// Jacobian row block acting on A.
    #[must_use]
    pub fn jacobian_a(&self) -> &DVector<f64> {
        &self.jacobian_a
    }

    /// Jacobian row block acting on B.
    #[must_use]
    pub fn jacobian_b(&self) -> &DVector<f64> {
        &self.jacobian_b
    }

    /// Overwrite the Jacobian on A. The slice length must match block A.
    pub fn set_jacobian_a(&mut self, values: &[f64]) -> Result<()> {
        Self::write_jacobian(&mut self.jacobian_a, Side::A, values)?;
        self.stamp = None;
        Ok(())
    }

    /// Overwrite the Jacobian on B. The slice length must match block B.
    pub fn set_jacobian_b(&mut self, values: &[f64]) -> Result<()> {
        Self::write_jacobian(&mut self.jacobian_b, Side::B, values)?;
        self.stamp = None;
        Ok(())
    }

    fn write_jacobian(target: &mut DVector<f64>, side: Side, values: &[f64]) -> Result<()> {
        if values.len() != target.len() {
            return Err(LcpError::DimensionMismatch {
                side,
                expected: target.len(),
                actual: values.len(),
            });
        }
        target.copy_from_slice(values);
        Ok(())
    }

    /// Edit the Jacobian on A in place. Marks the auxiliary blocks stale.
    pub fn jacobian_a_mut(&mut self) -> &mut [f64] {
        self.stamp = None;
        self.jacobian_a.as_mut_slice()
    }

    /// Edit the Jacobian on B in place. Marks the auxiliary blocks stale.
    pub fn jacobian_b_mut(&mut self) -> &mut [f64] {
        self.stamp = None;
        self.jacobian_b.as_mut_slice()
    }

    /// Auxiliary block `invM_A * Cq_A^T` from the last update.
    #[must_use]
    pub fn auxiliary_a(&self) -> &DVector<f64> {
        &self.auxiliary_a
    }

    /// Auxiliary block `invM_B * Cq_B^T` from the last update.
    #[must_use]
    pub fn auxiliary_b(&self) -> &DVector<f64> {
        &self.auxiliary_b
    }

    /// Current multiplier.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.state.multiplier
    }

    /// Set the multiplier.
    pub fn set_multiplier(&mut self, l: f64) {
        self.state.multiplier = l;
    }

    /// Set the known term `b`.
    pub fn set_rhs(&mut self, b: f64) {
        self.state.rhs = b;
    }

    /// Set the constraint force mixing. Marks the auxiliary blocks stale,
    /// since the Schur diagonal includes it.
    pub fn set_cfm(&mut self, cfm: f64) {
        self.state.cfm = cfm;
        self.stamp = None;
    }

    /// Whether the auxiliary blocks match the current Jacobians and blocks.
    #[must_use]
    pub fn is_auxiliary_fresh(&self, arena: &VariablesArena) -> bool {
        self.stamp.is_some_and(|stamp| stamp == self.observe(arena))
    }

    fn observe(&self, arena: &VariablesArena) -> AuxiliaryStamp {
        let look = |id: VariablesId| {
            arena
                .get(id)
                .map_or((0, false), |v| (v.mass_revision(), v.is_active()))
        };
        let (rev_a, act_a) = look(self.variables[0]);
        let (rev_b, act_b) = look(self.variables[1]);
        AuxiliaryStamp {
            mass_revision: [rev_a, rev_b],
            active: [act_a, act_b],
            cfm: self.state.cfm.to_bits(),
        }
    }

    /// Offsets of the active sides, or an error if the session cannot
    /// address them inside a vector of length `len`.
    fn active_offsets(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        len: usize,
    ) -> Result<[Option<usize>; 2]> {
        session.ensure_current(arena)?;
        self.check_widths(arena)?;
        let mut offsets = [None; 2];
        for (slot, (&id, n)) in offsets.iter_mut().zip(
            self.variables
                .iter()
                .zip([self.jacobian_a.len(), self.jacobian_b.len()]),
        ) {
            if !arena.is_active(id) {
                continue;
            }
            let offset = session.offset_unchecked(id)?;
            if offset + n > len {
                return Err(LcpError::VectorTooShort {
                    required: offset + n,
                    actual: len,
                });
            }
            *slot = Some(offset);
        }
        Ok(offsets)
    }
}

impl Constraint for TwoBodyConstraint {
    fn variables(&self) -> &[VariablesId] {
        &self.variables
    }

    fn state(&self) -> &ConstraintState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ConstraintState {
        &mut self.state
    }

    fn update_auxiliary(&mut self, arena: &VariablesArena) {
        if let Err(err) = self.check_widths(arena) {
            tracing::warn!(%err, "auxiliary update skipped");
            self.auxiliary_a = DVector::zeros(self.jacobian_a.len());
            self.auxiliary_b = DVector::zeros(self.jacobian_b.len());
            self.state.schur_diagonal = self.state.cfm;
            self.stamp = None;
            return;
        }

        let mut g = 0.0;

        for (id, jacobian, auxiliary) in [
            (self.variables[0], &self.jacobian_a, &mut self.auxiliary_a),
            (self.variables[1], &self.jacobian_b, &mut self.auxiliary_b),
        ] {
            if auxiliary.len() != jacobian.len() {
                *auxiliary = DVector::zeros(jacobian.len());
            }
            match arena.get(id).filter(|v| v.is_active()) {
                Some(block) => {
                    block.apply_inverse_mass_into(jacobian, auxiliary);
                    g += jacobian.dot(auxiliary);
                }
                None => auxiliary.fill(0.0),
            }
        }

        self.state.schur_diagonal = g + self.state.cfm;
        self.stamp = Some(self.observe(arena));
    }

    fn check_auxiliary(&self, arena: &VariablesArena) -> Result<()> {
        self.check_widths(arena)?;
        let Some(stamp) = self.stamp else {
            return Err(LcpError::stale_auxiliary(
                "jacobian edited or never updated",
            ));
        };
        let now = self.observe(arena);
        if stamp.active != now.active {
            return Err(LcpError::stale_auxiliary("block activity changed"));
        }
        if stamp.mass_revision != now.mass_revision {
            return Err(LcpError::stale_auxiliary("inverse mass replaced"));
        }
        if stamp.cfm != now.cfm {
            return Err(LcpError::stale_auxiliary("constraint force mixing changed"));
        }
        Ok(())
    }

    fn compute_jacobian_dot_velocity(&self, arena: &VariablesArena) -> f64 {
        debug_assert!(
            self.is_auxiliary_fresh(arena),
            "update_auxiliary must run before compute_jacobian_dot_velocity"
        );
        let mut sum = 0.0;
        for (id, jacobian) in [
            (self.variables[0], &self.jacobian_a),
            (self.variables[1], &self.jacobian_b),
        ] {
            let block = arena
                .get(id)
                .filter(|v| v.is_active() && v.dim() == jacobian.len());
            if let Some(block) = block {
                sum += jacobian.dot(block.velocity());
            }
        }
        sum
    }

    fn increment_velocity(&self, arena: &mut VariablesArena, delta: f64) {
        debug_assert!(
            self.is_auxiliary_fresh(arena),
            "update_auxiliary must run before increment_velocity"
        );
        for (id, auxiliary) in [
            (self.variables[0], &self.auxiliary_a),
            (self.variables[1], &self.auxiliary_b),
        ] {
            let block = arena
                .get_mut(id)
                .filter(|v| v.is_active() && v.dim() == auxiliary.len());
            if let Some(mut block) = block {
                block.velocity_mut().axpy(delta, auxiliary, 1.0);
            }
        }
    }

    fn multiply_and_accumulate(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        vect: &DVector<f64>,
        result: &mut f64,
    ) -> Result<()> {
        let offsets = self.active_offsets(arena, session, vect.len())?;
        let mut sum = 0.0;
        for (offset, jacobian) in offsets.into_iter().zip([&self.jacobian_a, &self.jacobian_b]) {
            if let Some(offset) = offset {
                sum += jacobian.dot(&vect.rows(offset, jacobian.len()));
            }
        }
        *result += sum;
        Ok(())
    }

    fn multiply_transposed_and_accumulate(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        result: &mut DVector<f64>,
        l: f64,
    ) -> Result<()> {
        let offsets = self.active_offsets(arena, session, result.len())?;
        for (offset, jacobian) in offsets.into_iter().zip([&self.jacobian_a, &self.jacobian_b]) {
            if let Some(offset) = offset {
                result
                    .rows_mut(offset, jacobian.len())
                    .axpy(l, jacobian, 1.0);
            }
        }
        Ok(())
    }

    fn assemble_into(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        matrix: &mut SparseAssembler,
        row: usize,
    ) -> Result<()> {
        let offsets = self.active_offsets(arena, session, matrix.ncols())?;
        let pairs = offsets.into_iter().zip([&self.jacobian_a, &self.jacobian_b]);
        for (offset, jacobian) in pairs.clone() {
            if let Some(col) = offset {
                matrix.check_span(row, col, 1, jacobian.len())?;
            }
        }
        for (offset, jacobian) in pairs {
            if let Some(col) = offset {
                matrix.paste_row(row, col, jacobian.as_slice())?;
            }
        }
        Ok(())
    }

    fn assemble_transposed_into(
        &self,
        arena: &VariablesArena,
        session: &SolveSession,
        matrix: &mut SparseAssembler,
        col: usize,
    ) -> Result<()> {
        let offsets = self.active_offsets(arena, session, matrix.nrows())?;
        let pairs = offsets.into_iter().zip([&self.jacobian_a, &self.jacobian_b]);
        for (offset, jacobian) in pairs.clone() {
            if let Some(row) = offset {
                matrix.check_span(row, col, jacobian.len(), 1)?;
            }
        }
        for (offset, jacobian) in pairs {
            if let Some(row) = offset {
                matrix.paste_transposed(row, col, jacobian.as_slice())?;
            }
        }
        Ok(())
    }
}
