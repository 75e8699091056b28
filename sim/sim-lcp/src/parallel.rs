//! Parallel evaluation of constraint batches using rayon.
//!
//! `increment_velocity` performs a read-modify-write on shared velocity
//! slices, so it never runs concurrently. Parallel work is restricted to the
//! read-only half of a solver sweep:
//!
//! 1. **Evaluate** (parallel): for each constraint of a batch, compute
//!    `Cq * v` and hand it to the caller's update rule, which returns the
//!    multiplier change.
//! 2. **Apply** (sequential): add each change to its multiplier and apply
//!    `v += Eq * delta`, in batch order. Constraints that are not
//!    [active](Constraint::is_active) are left alone.
//!
//! Members of a [`ConstraintBatches`] batch write disjoint active blocks, so
//! evaluating them all against the pre-batch velocities gives exactly the
//! result of a sequential Gauss-Seidel pass over the batch.
//!
//! # Minimum Thresholds
//!
//! Parallel evaluation only activates when a batch holds at least
//! [`ParallelConfig::min_batch_size`] constraints. Smaller batches run
//! sequentially to avoid rayon overhead.
//!
//! # Example
//!
//! ```
//! use sim_lcp::{
//!     parallel, Constraint, ConstraintBatches, ParallelConfig, TwoBodyConstraint, Variables,
//!     VariablesArena,
//! };
//! use nalgebra::DVector;
//!
//! let mut arena = VariablesArena::new();
//! let a = arena.add(Variables::diagonal(DVector::from_element(1, 1.0)).unwrap());
//! let b = arena.add(Variables::diagonal(DVector::from_element(1, 1.0)).unwrap());
//! arena.get_mut(a).unwrap().velocity_mut()[0] = 2.0;
//!
//! let mut c = TwoBodyConstraint::new(&arena, a, b).unwrap();
//! c.set_jacobian_a(&[1.0]).unwrap();
//! c.set_jacobian_b(&[-1.0]).unwrap();
//! let mut constraints = vec![c];
//! parallel::update_auxiliary(&arena, &mut constraints, &ParallelConfig::default());
//!
//! // One projected Gauss-Seidel step drives the relative velocity to zero
//! let batches = ConstraintBatches::build(&constraints, &arena);
//! parallel::sweep_batches(
//!     &mut arena,
//!     &mut constraints,
//!     &batches,
//!     &ParallelConfig::default(),
//!     |c, cq_v| -(cq_v + c.state().rhs) / c.state().schur_diagonal,
//! )
//! .unwrap();
//!
//! assert!(constraints[0].compute_jacobian_dot_velocity(&arena).abs() < 1e-12);
//! ```

use rayon::prelude::*;

use crate::{Constraint, ConstraintBatches, LcpError, ParallelConfig, Result, VariablesArena};

/// Recompute auxiliary data of every constraint, in parallel when the list
/// is large enough.
pub fn update_auxiliary<C>(arena: &VariablesArena, constraints: &mut [C], config: &ParallelConfig)
where
    C: Constraint + Send,
{
    if config.use_parallel(constraints.len()) {
        constraints
            .par_iter_mut()
            .for_each(|c| c.update_auxiliary(arena));
    } else {
        for c in constraints {
            c.update_auxiliary(arena);
        }
    }
}

/// Compute `Cq * v` for the constraints at `indices`.
pub fn jacobian_dot_velocities<C>(
    arena: &VariablesArena,
    constraints: &[C],
    indices: &[usize],
    config: &ParallelConfig,
) -> Result<Vec<f64>>
where
    C: Constraint + Sync,
{
    check_indices(constraints.len(), indices)?;
    let eval = |&i: &usize| constraints[i].compute_jacobian_dot_velocity(arena);

    Ok(if config.use_parallel(indices.len()) {
        indices.par_iter().map(eval).collect()
    } else {
        indices.iter().map(eval).collect()
    })
}

/// Run one sweep over a batch.
///
/// `update` receives a constraint and its current `Cq * v` and returns the
/// multiplier change. The batch must not contain two constraints writing the
/// same active block. Inactive constraints are skipped, even if they were
/// active when the batches were built.
pub fn sweep_batch<C, F>(
    arena: &mut VariablesArena,
    constraints: &mut [C],
    batch: &[usize],
    config: &ParallelConfig,
    update: F,
) -> Result<()>
where
    C: Constraint + Sync,
    F: Fn(&C, f64) -> f64 + Sync,
{
    check_indices(constraints.len(), batch)?;

    // Phase 1: evaluate against the pre-batch velocities
    let deltas: Vec<f64> = {
        let arena = &*arena;
        let constraints = &*constraints;
        let eval = |&i: &usize| {
            let c = &constraints[i];
            update(c, c.compute_jacobian_dot_velocity(arena))
        };
        if config.use_parallel(batch.len()) {
            batch.par_iter().map(eval).collect()
        } else {
            batch.iter().map(eval).collect()
        }
    };

    // Phase 2: apply in batch order
    for (&i, delta) in batch.iter().zip(deltas) {
        let c = &mut constraints[i];
        if !c.is_active() {
            continue;
        }
        c.state_mut().multiplier += delta;
        c.increment_velocity(arena, delta);
    }

    Ok(())
}

/// Run [`sweep_batch`] over every batch, in order.
pub fn sweep_batches<C, F>(
    arena: &mut VariablesArena,
    constraints: &mut [C],
    batches: &ConstraintBatches,
    config: &ParallelConfig,
    update: F,
) -> Result<()>
where
    C: Constraint + Sync,
    F: Fn(&C, f64) -> f64 + Sync,
{
    for batch in batches.iter() {
        sweep_batch(arena, constraints, batch, config, &update)?;
    }
    Ok(())
}

fn check_indices(len: usize, indices: &[usize]) -> Result<()> {
    match indices.iter().find(|&&i| i >= len) {
        Some(&index) => Err(LcpError::UnknownConstraint { index, len }),
        None => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{TwoBodyConstraint, Variables, VariablesId};
    use nalgebra::DVector;

    fn always_parallel() -> ParallelConfig {
        ParallelConfig {
            enabled: true,
            min_batch_size: 1,
        }
    }

    /// Ring of `n` unit blocks with one constraint per edge and distinct
    /// starting velocities.
    fn ring(n: usize) -> (VariablesArena, Vec<TwoBodyConstraint>) {
        let mut arena = VariablesArena::new();
        let ids: Vec<VariablesId> = (0..n)
            .map(|i| {
                arena.add(
                    Variables::diagonal(DVector::from_element(2, 1.0 + i as f64 * 0.1))
                        .unwrap()
                        .with_velocity(DVector::from_vec(vec![i as f64, -(i as f64) * 0.5]))
                        .unwrap(),
                )
            })
            .collect();

        let mut constraints: Vec<_> = (0..n)
            .map(|i| {
                let mut c = TwoBodyConstraint::new(&arena, ids[i], ids[(i + 1) % n]).unwrap();
                c.set_jacobian_a(&[1.0, 0.5]).unwrap();
                c.set_jacobian_b(&[-1.0, 0.25]).unwrap();
                c.set_rhs(0.1 * i as f64);
                c
            })
            .collect();
        update_auxiliary(&arena, &mut constraints, &ParallelConfig::default());
        (arena, constraints)
    }

    fn pgs(c: &TwoBodyConstraint, cq_v: f64) -> f64 {
        let state = c.state();
        -(cq_v + state.rhs + state.cfm * state.multiplier) / state.schur_diagonal
    }

    #[test]
    fn test_parallel_sweep_matches_sequential() {
        let (mut arena_par, mut par) = ring(9);
        let (mut arena_seq, mut seq) = ring(9);
        let batches = ConstraintBatches::build(&par, &arena_par);

        for _ in 0..3 {
            sweep_batches(&mut arena_par, &mut par, &batches, &always_parallel(), pgs).unwrap();

            // Plain Gauss-Seidel in batch order
            for batch in batches.iter() {
                for &i in batch {
                    let delta = pgs(&seq[i], seq[i].compute_jacobian_dot_velocity(&arena_seq));
                    seq[i].state_mut().multiplier += delta;
                    seq[i].increment_velocity(&mut arena_seq, delta);
                }
            }
        }

        for ((_, a), (_, b)) in arena_par.iter().zip(arena_seq.iter()) {
            assert_eq!(a.velocity(), b.velocity());
        }
        for (a, b) in par.iter().zip(&seq) {
            assert_eq!(a.multiplier().to_bits(), b.multiplier().to_bits());
        }
    }

    #[test]
    fn test_sweep_leaves_disabled_constraints_alone() {
        let (mut arena, mut constraints) = ring(4);
        let batches = ConstraintBatches::build(&constraints, &arena);

        // Switched off after batching
        for c in &mut constraints {
            c.state_mut().enabled = false;
        }
        let before: Vec<_> = arena.iter().map(|(_, v)| v.velocity().clone()).collect();

        sweep_batches(&mut arena, &mut constraints, &batches, &always_parallel(), pgs).unwrap();

        let after: Vec<_> = arena.iter().map(|(_, v)| v.velocity().clone()).collect();
        assert_eq!(before, after);
        assert!(constraints.iter().all(|c| c.multiplier() == 0.0));
    }

    #[test]
    fn test_jacobian_dot_velocities() {
        let (arena, constraints) = ring(5);
        let indices: Vec<usize> = (0..5).collect();

        let par = jacobian_dot_velocities(&arena, &constraints, &indices, &always_parallel())
            .unwrap();
        let seq = jacobian_dot_velocities(&arena, &constraints, &indices, &ParallelConfig::default())
            .unwrap();
        assert_eq!(par, seq);
    }

    #[test]
    fn test_bad_index_is_rejected() {
        let (mut arena, mut constraints) = ring(3);
        let before: Vec<_> = arena.iter().map(|(_, v)| v.velocity().clone()).collect();

        let err = sweep_batch(&mut arena, &mut constraints, &[0, 5], &always_parallel(), pgs)
            .unwrap_err();
        assert_eq!(err, LcpError::UnknownConstraint { index: 5, len: 3 });

        let after: Vec<_> = arena.iter().map(|(_, v)| v.velocity().clone()).collect();
        assert_eq!(before, after);
    }
}
