//! Constraint batches by greedy graph colouring.
//!
//! Two constraints conflict when they write the same active variable block.
//! A batch holds constraints with no pairwise conflicts, so the velocity
//! increments of one batch can be evaluated in any order, or concurrently,
//! and produce the same result as a Gauss-Seidel pass over the batch.
//!
//! Inactive blocks are never written, so they do not cause conflicts: every
//! constraint attached to a fixed ground body can share one batch. Disabled
//! and free constraints are left out of the batches entirely.

use hashbrown::HashSet;

use crate::{Constraint, VariablesArena, VariablesId};

/// Constraint indices grouped into conflict-free batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintBatches {
    batches: Vec<Vec<usize>>,
}

impl ConstraintBatches {
    /// Greedily assign each active constraint, in order, to the first batch it
    /// does not conflict with.
    #[must_use]
    pub fn build<C: Constraint>(constraints: &[C], arena: &VariablesArena) -> Self {
        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut used: Vec<HashSet<VariablesId>> = Vec::new();

        for (i, c) in constraints.iter().enumerate().filter(|(_, c)| c.is_active()) {
            let written: Vec<VariablesId> = c
                .variables()
                .iter()
                .copied()
                .filter(|&id| arena.is_active(id))
                .collect();

            let slot = used
                .iter()
                .position(|set| written.iter().all(|id| !set.contains(id)));
            let slot = slot.unwrap_or_else(|| {
                batches.push(Vec::new());
                used.push(HashSet::new());
                batches.len() - 1
            });

            batches[slot].push(i);
            used[slot].extend(written);
        }

        tracing::debug!(
            constraints = constraints.len(),
            batches = batches.len(),
            "coloured constraints"
        );

        Self { batches }
    }

    /// Number of batches.
    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Check if there are no batches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Get the batches.
    #[must_use]
    pub fn batches(&self) -> &[Vec<usize>] {
        &self.batches
    }

    /// Iterate over the batches in order.
    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.batches.iter().map(Vec::as_slice)
    }
}
