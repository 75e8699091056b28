//! The system descriptor: every block and constraint of one solve.
//!
//! [`SystemDescriptor`] owns the variable arena and the ordered constraint
//! list that solvers iterate. Constraint order is stable: rows of the
//! assembled `Cq` and entries of multiplier vectors follow the order in
//! which active constraints were added.
//!
//! # Step Protocol
//!
//! ```text
//! set Jacobians (kinematic update)
//! update_auxiliary()
//! begin_session()              only for matrix-based solvers
//! solver iterations            Constraint primitives / system products
//! read multipliers             Link::set_reaction_from_multipliers
//! ```

use nalgebra::DVector;

use crate::{
    parallel, Constraint, ConstraintBatches, ConstraintIslands, LcpConfig, LcpError, Result,
    SolveSession, SparseAssembler, TwoBodyConstraint, Variables, VariablesArena, VariablesId,
};

/// Blocks, constraints, and the current offset assignment.
#[derive(Debug, Clone)]
pub struct SystemDescriptor<C = TwoBodyConstraint> {
    arena: VariablesArena,
    constraints: Vec<C>,
    session: Option<SolveSession>,
    config: LcpConfig,
}

impl<C: Constraint> Default for SystemDescriptor<C> {
    fn default() -> Self {
        Self {
            arena: VariablesArena::new(),
            constraints: Vec::new(),
            session: None,
            config: LcpConfig::default(),
        }
    }
}

impl<C: Constraint> SystemDescriptor<C> {
    /// Create an empty system with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty system with a validated configuration.
    pub fn with_config(config: LcpConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &LcpConfig {
        &self.config
    }

    /// Add a block.
    pub fn add_variables(&mut self, variables: Variables) -> VariablesId {
        self.arena.add(variables)
    }

    /// The variable arena.
    #[must_use]
    pub fn variables(&self) -> &VariablesArena {
        &self.arena
    }

    /// The variable arena, mutably.
    pub fn variables_mut(&mut self) -> &mut VariablesArena {
        &mut self.arena
    }

    /// Append a constraint and return its index.
    pub fn add_constraint(&mut self, constraint: C) -> usize {
        self.constraints.push(constraint);
        self.constraints.len() - 1
    }

    /// Constraints in insertion order.
    #[must_use]
    pub fn constraints(&self) -> &[C] {
        &self.constraints
    }

    /// Constraints in insertion order, mutably.
    pub fn constraints_mut(&mut self) -> &mut [C] {
        &mut self.constraints
    }

    /// Borrow the arena and the constraints at the same time.
    pub fn split_mut(&mut self) -> (&mut VariablesArena, &mut [C]) {
        (&mut self.arena, &mut self.constraints)
    }

    /// Number of active blocks.
    #[must_use]
    pub fn count_active_variables(&self) -> usize {
        self.arena.iter().filter(|(_, v)| v.is_active()).count()
    }

    /// Number of constraints a solver should process.
    #[must_use]
    pub fn count_active_constraints(&self) -> usize {
        self.constraints.iter().filter(|c| c.is_active()).count()
    }

    /// Indices of the active constraints, in order. Position in this list is
    /// the constraint's row in `Cq`.
    #[must_use]
    pub fn active_constraint_indices(&self) -> Vec<usize> {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_active())
            .map(|(i, _)| i)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Sessions and auxiliary data
    // ------------------------------------------------------------------------

    /// Assign offsets to every active block in insertion order.
    pub fn begin_session(&mut self) -> &SolveSession {
        self.session.insert(self.arena.begin_session())
    }

    /// Assign offsets in a caller-chosen order.
    pub fn begin_session_ordered(&mut self, order: &[VariablesId]) -> Result<&SolveSession> {
        let session = self.arena.begin_session_ordered(order)?;
        Ok(self.session.insert(session))
    }

    /// The last session opened, if any.
    #[must_use]
    pub fn session(&self) -> Option<&SolveSession> {
        self.session.as_ref()
    }

    fn current_session(&self) -> Result<&SolveSession> {
        let session = self.session.as_ref().ok_or(LcpError::NoSession)?;
        session.ensure_current(&self.arena)?;
        Ok(session)
    }

    /// Refresh the auxiliary data of every constraint.
    pub fn update_auxiliary(&mut self) {
        for c in &mut self.constraints {
            c.update_auxiliary(&self.arena);
        }
    }

    /// Check every constraint's auxiliary data.
    pub fn check_auxiliary(&self) -> Result<()> {
        self.constraints
            .iter()
            .try_for_each(|c| c.check_auxiliary(&self.arena))
    }

    fn verify(&self) -> Result<()> {
        if self.config.verify_auxiliary {
            self.check_auxiliary()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Assembly and products
    // ------------------------------------------------------------------------

    /// Assemble `Cq` (active constraints x session dimension).
    pub fn build_cq(&self) -> Result<SparseAssembler> {
        self.verify()?;
        let session = self.current_session()?;
        let active = self.active_constraint_indices();

        let mut matrix = SparseAssembler::new(active.len(), session.total_dim())
            .with_drop_tolerance(self.config.drop_tolerance);
        for (row, &i) in active.iter().enumerate() {
            self.constraints[i].assemble_into(&self.arena, session, &mut matrix, row)?;
        }
        Ok(matrix)
    }

    /// Assemble `Cq^T` (session dimension x active constraints).
    pub fn build_cq_transposed(&self) -> Result<SparseAssembler> {
        self.verify()?;
        let session = self.current_session()?;
        let active = self.active_constraint_indices();

        let mut matrix = SparseAssembler::new(session.total_dim(), active.len())
            .with_drop_tolerance(self.config.drop_tolerance);
        for (col, &i) in active.iter().enumerate() {
            self.constraints[i].assemble_transposed_into(&self.arena, session, &mut matrix, col)?;
        }
        Ok(matrix)
    }

    /// Compute `Cq * v` without assembling the matrix.
    pub fn jacobian_product(&self, v: &DVector<f64>) -> Result<DVector<f64>> {
        self.verify()?;
        let session = self.current_session()?;
        session.check_vector_len(v.len())?;
        let active = self.active_constraint_indices();

        let mut result = DVector::zeros(active.len());
        for (row, &i) in active.iter().enumerate() {
            self.constraints[i].multiply_and_accumulate(&self.arena, session, v, &mut result[row])?;
        }
        Ok(result)
    }

    /// Compute `Cq^T * l` without assembling the matrix.
    pub fn jacobian_transpose_product(&self, l: &DVector<f64>) -> Result<DVector<f64>> {
        self.verify()?;
        let session = self.current_session()?;
        let active = self.active_constraint_indices();
        if l.len() < active.len() {
            return Err(LcpError::VectorTooShort {
                required: active.len(),
                actual: l.len(),
            });
        }

        let mut result = DVector::zeros(session.total_dim());
        for (row, &i) in active.iter().enumerate() {
            self.constraints[i].multiply_transposed_and_accumulate(
                &self.arena,
                session,
                &mut result,
                l[row],
            )?;
        }
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Gather / scatter
    // ------------------------------------------------------------------------

    /// Gather the velocities of the active blocks into one vector.
    pub fn velocities_to_vector(&self) -> Result<DVector<f64>> {
        let session = self.current_session()?;
        let mut out = DVector::zeros(session.total_dim());
        for (id, offset) in session.assigned() {
            let block = self.arena.try_get(id)?;
            out.rows_mut(offset, block.dim()).copy_from(block.velocity());
        }
        Ok(out)
    }

    /// Gather the forces of the active blocks into one vector.
    pub fn forces_to_vector(&self) -> Result<DVector<f64>> {
        let session = self.current_session()?;
        let mut out = DVector::zeros(session.total_dim());
        for (id, offset) in session.assigned() {
            let block = self.arena.try_get(id)?;
            out.rows_mut(offset, block.dim()).copy_from(block.force());
        }
        Ok(out)
    }

    /// Scatter a global vector back into the velocities of the active blocks.
    pub fn velocities_from_vector(&mut self, v: &DVector<f64>) -> Result<()> {
        let session = self.current_session()?;
        session.check_vector_len(v.len())?;
        let assigned: Vec<_> = session.assigned().collect();

        for (id, offset) in assigned {
            let mut block = self
                .arena
                .get_mut(id)
                .ok_or(LcpError::UnknownVariables(id))?;
            let n = block.dim();
            block.velocity_mut().copy_from(&v.rows(offset, n));
        }
        Ok(())
    }

    /// Group the constraints into islands.
    #[must_use]
    pub fn islands(&self) -> ConstraintIslands {
        ConstraintIslands::build_with_arena(&self.constraints, &self.arena)
    }

    /// Group the constraints into conflict-free batches.
    #[must_use]
    pub fn batches(&self) -> ConstraintBatches {
        ConstraintBatches::build(&self.constraints, &self.arena)
    }
}

impl<C: Constraint + Send + Sync> SystemDescriptor<C> {
    /// Refresh auxiliary data, in parallel when configured.
    pub fn update_auxiliary_parallel(&mut self) {
        parallel::update_auxiliary(&self.arena, &mut self.constraints, &self.config.parallel);
    }

    /// Run one sweep over `batches` with the caller's update rule.
    ///
    /// See [`parallel::sweep_batches`].
    pub fn sweep<F>(&mut self, batches: &ConstraintBatches, update: F) -> Result<()>
    where
        F: Fn(&C, f64) -> f64 + Sync,
    {
        self.verify()?;
        parallel::sweep_batches(
            &mut self.arena,
            &mut self.constraints,
            batches,
            &self.config.parallel,
            update,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_blocks() -> (SystemDescriptor, VariablesId, VariablesId) {
        let mut sys = SystemDescriptor::new();
        let a = sys.add_variables(Variables::diagonal(DVector::from_element(2, 1.0)).unwrap());
        let b = sys.add_variables(Variables::diagonal(DVector::from_element(3, 2.0)).unwrap());
        (sys, a, b)
    }

    fn constraint(sys: &SystemDescriptor, a: VariablesId, b: VariablesId, ja: &[f64], jb: &[f64]) -> TwoBodyConstraint {
        let mut c = TwoBodyConstraint::new(sys.variables(), a, b).unwrap();
        c.set_jacobian_a(ja).unwrap();
        c.set_jacobian_b(jb).unwrap();
        c
    }

    #[test]
    fn test_products_need_session() {
        let (sys, _, _) = two_blocks();
        assert_eq!(sys.build_cq().unwrap_err(), LcpError::NoSession);
    }

    #[test]
    fn test_build_cq_and_products_agree() {
        let (mut sys, a, b) = two_blocks();
        let c0 = constraint(&sys, a, b, &[1.0, 2.0], &[0.0, -1.0, 3.0]);
        let c1 = constraint(&sys, b, a, &[4.0, 0.0, 0.5], &[-2.0, 1.0]);
        sys.add_constraint(c0);
        sys.add_constraint(c1);
        sys.update_auxiliary();
        sys.begin_session();

        let cq = sys.build_cq().unwrap().to_dense();
        assert_eq!((cq.nrows(), cq.ncols()), (2, 5));
        assert_relative_eq!(cq[(0, 1)], 2.0);
        assert_relative_eq!(cq[(0, 4)], 3.0);
        assert_relative_eq!(cq[(1, 0)], -2.0);
        assert_relative_eq!(cq[(1, 2)], 4.0);

        let cq_t = sys.build_cq_transposed().unwrap().to_dense();
        assert_eq!(cq_t, cq.transpose());

        let v = DVector::from_vec(vec![1.0, -1.0, 0.5, 2.0, 0.25]);
        assert_relative_eq!(sys.jacobian_product(&v).unwrap(), &cq * &v, epsilon = 1e-12);

        let l = DVector::from_vec(vec![0.3, -0.7]);
        assert_relative_eq!(
            sys.jacobian_transpose_product(&l).unwrap(),
            cq.transpose() * &l,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_disabled_constraints_are_skipped() {
        let (mut sys, a, b) = two_blocks();
        sys.add_constraint(constraint(&sys, a, b, &[1.0, 0.0], &[0.0, 0.0, 1.0]));
        let mut off = constraint(&sys, a, b, &[0.0, 1.0], &[1.0, 0.0, 0.0]);
        off.state_mut().enabled = false;
        sys.add_constraint(off);
        sys.add_constraint(constraint(&sys, a, b, &[2.0, 0.0], &[0.0, 0.0, 0.0]));

        assert_eq!(sys.count_active_constraints(), 2);
        assert_eq!(sys.active_constraint_indices(), vec![0, 2]);

        sys.update_auxiliary();
        sys.begin_session();
        assert_eq!(sys.build_cq().unwrap().nrows(), 2);
    }

    #[test]
    fn test_gather_scatter() {
        let (mut sys, a, b) = two_blocks();
        sys.variables_mut()
            .get_mut(b)
            .unwrap()
            .velocity_mut()
            .copy_from_slice(&[7.0, 8.0, 9.0]);
        sys.begin_session_ordered(&[b, a]).unwrap();

        let v = sys.velocities_to_vector().unwrap();
        assert_eq!(v.as_slice(), &[7.0, 8.0, 9.0, 0.0, 0.0]);

        let new_v = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        sys.velocities_from_vector(&new_v).unwrap();
        assert_eq!(sys.variables().get(a).unwrap().velocity().as_slice(), &[4.0, 5.0]);
        assert_eq!(sys.variables().get(b).unwrap().velocity().as_slice(), &[1.0, 2.0, 3.0]);

        assert!(sys.velocities_from_vector(&DVector::zeros(4)).is_err());
    }

    #[test]
    fn test_verify_auxiliary_config() {
        let mut sys: SystemDescriptor = SystemDescriptor::with_config(LcpConfig::debug()).unwrap();
        let a = sys.add_variables(Variables::diagonal(DVector::from_element(1, 1.0)).unwrap());
        let b = sys.add_variables(Variables::diagonal(DVector::from_element(1, 1.0)).unwrap());
        sys.add_constraint(constraint(&sys, a, b, &[1.0], &[-1.0]));
        sys.begin_session();

        assert!(matches!(
            sys.jacobian_product(&DVector::zeros(2)),
            Err(LcpError::StaleAuxiliary { .. })
        ));

        sys.update_auxiliary();
        assert!(sys.jacobian_product(&DVector::zeros(2)).is_ok());
    }

    #[test]
    fn test_activity_change_requires_new_session() {
        let (mut sys, a, _) = two_blocks();
        sys.begin_session();
        sys.variables_mut().set_active(a, false).unwrap();

        assert!(sys.velocities_to_vector().unwrap_err().is_offset_error());
        sys.begin_session();
        assert_eq!(sys.velocities_to_vector().unwrap().len(), 3);
    }

    #[test]
    fn test_sweep_converges_on_pair() {
        let mut sys: SystemDescriptor = SystemDescriptor::new();
        let a = sys.add_variables(
            Variables::diagonal(DVector::from_element(1, 1.0))
                .unwrap()
                .with_velocity(DVector::from_element(1, 3.0))
                .unwrap(),
        );
        let b = sys.add_variables(Variables::diagonal(DVector::from_element(1, 1.0)).unwrap());
        sys.add_constraint(constraint(&sys, a, b, &[1.0], &[-1.0]));
        sys.update_auxiliary_parallel();

        let batches = sys.batches();
        sys.sweep(&batches, |c, cq_v| -cq_v / c.state().schur_diagonal)
            .unwrap();

        let va = sys.variables().get(a).unwrap().velocity()[0];
        let vb = sys.variables().get(b).unwrap().velocity()[0];
        assert_relative_eq!(va, 1.5);
        assert_relative_eq!(vb, 1.5);
        assert_relative_eq!(sys.constraints()[0].multiplier(), -1.5);
    }

    #[test]
    fn test_sweep_skips_disabled_constraint() {
        let mut sys: SystemDescriptor = SystemDescriptor::new();
        let a = sys.add_variables(
            Variables::diagonal(DVector::from_element(1, 1.0))
                .unwrap()
                .with_velocity(DVector::from_element(1, 3.0))
                .unwrap(),
        );
        let b = sys.add_variables(Variables::diagonal(DVector::from_element(1, 1.0)).unwrap());
        let mut c = constraint(&sys, a, b, &[1.0], &[-1.0]);
        c.state_mut().enabled = false;
        sys.add_constraint(c);
        sys.update_auxiliary_parallel();
        assert_eq!(sys.count_active_constraints(), 0);

        let batches = sys.batches();
        assert!(batches.is_empty());
        sys.sweep(&batches, |c, cq_v| -cq_v / c.state().schur_diagonal)
            .unwrap();

        assert_eq!(sys.variables().get(a).unwrap().velocity()[0], 3.0);
        assert_eq!(sys.variables().get(b).unwrap().velocity()[0], 0.0);
        assert_eq!(sys.constraints()[0].multiplier(), 0.0);
    }

    #[test]
    fn test_only_activity_changes_invalidate_session() {
        let (mut sys, a, b) = two_blocks();
        sys.begin_session();

        {
            let arena = sys.variables_mut();
            let mut block = arena.get_mut(a).unwrap();
            block.velocity_mut()[0] = 4.0;
            block.force_mut()[1] = -1.0;
            block
                .set_inverse_mass(crate::InverseMass::Diagonal(DVector::from_element(2, 0.5)))
                .unwrap();
        }
        assert_eq!(sys.velocities_to_vector().unwrap()[0], 4.0);

        sys.variables_mut().set_active(b, false).unwrap();
        assert!(matches!(
            sys.velocities_to_vector(),
            Err(LcpError::StaleSession { .. })
        ));
        assert!(matches!(
            sys.velocities_from_vector(&DVector::zeros(5)),
            Err(LcpError::StaleSession { .. })
        ));
    }
}
