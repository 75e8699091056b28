//! Constraint islands.
//!
//! Constraint islands are groups of variable blocks connected by constraints
//! that can be solved independently. Island detection uses a union-find
//! (disjoint-set) structure:
//!
//! 1. Each block starts in its own island
//! 2. For each constraint, union the islands of the blocks it couples
//! 3. Extract final island membership with path compression
//!
//! Time complexity: O(n × α(n)) ≈ O(n) where α is the inverse Ackermann function.
//!
//! # Example
//!
//! ```
//! use sim_lcp::{ConstraintIslands, TwoBodyConstraint, Variables, VariablesArena};
//! use nalgebra::DVector;
//!
//! let mut arena = VariablesArena::new();
//! let ids: Vec<_> = (0..5)
//!     .map(|_| arena.add(Variables::diagonal(DVector::from_element(6, 1.0)).unwrap()))
//!     .collect();
//!
//! // Chain 0-1-2, and a separate pair 3-4
//! let constraints = vec![
//!     TwoBodyConstraint::new(&arena, ids[0], ids[1]).unwrap(),
//!     TwoBodyConstraint::new(&arena, ids[1], ids[2]).unwrap(),
//!     TwoBodyConstraint::new(&arena, ids[3], ids[4]).unwrap(),
//! ];
//!
//! let islands = ConstraintIslands::build(&constraints);
//! assert_eq!(islands.num_islands(), 2);
//! ```

use hashbrown::HashMap;

use crate::{Constraint, VariablesArena, VariablesId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single island: connected blocks and the constraints between them.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Island {
    /// Blocks in this island, sorted for determinism.
    pub variables: Vec<VariablesId>,

    /// Indices into the constraint slice the islands were built from,
    /// in ascending order.
    pub constraint_indices: Vec<usize>,

    /// Every block in the island is inactive.
    pub is_static: bool,
}

impl Island {
    /// Number of blocks in this island.
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of constraints in this island.
    #[must_use]
    pub fn num_constraints(&self) -> usize {
        self.constraint_indices.len()
    }

    /// Check if this island contains a block.
    #[must_use]
    pub fn contains(&self, id: VariablesId) -> bool {
        self.variables.binary_search(&id).is_ok()
    }
}

/// Result of constraint island detection.
#[derive(Debug, Clone, Default)]
pub struct ConstraintIslands {
    islands: Vec<Island>,
    variables_to_island: HashMap<VariablesId, usize>,
    total_variables: usize,
    total_constraints: usize,
}

impl ConstraintIslands {
    /// Build islands from a constraint list.
    #[must_use]
    pub fn build<C: Constraint>(constraints: &[C]) -> Self {
        if constraints.is_empty() {
            return Self::default();
        }

        // Collect unique blocks in first-seen order
        let mut index_of: HashMap<VariablesId, usize> = HashMap::new();
        let mut ids: Vec<VariablesId> = Vec::new();
        for c in constraints {
            for &id in c.variables() {
                index_of.entry(id).or_insert_with(|| {
                    ids.push(id);
                    ids.len() - 1
                });
            }
        }

        let mut uf = UnionFind::new(ids.len());
        for c in constraints {
            let mut members = c.variables().iter().map(|id| index_of[id]);
            if let Some(first) = members.next() {
                for other in members {
                    uf.union(first, other);
                }
            }
        }

        // Group blocks by root
        let mut root_to_island: HashMap<usize, usize> = HashMap::new();
        let mut islands: Vec<Island> = Vec::new();
        let mut variables_to_island: HashMap<VariablesId, usize> = HashMap::new();

        for (idx, &id) in ids.iter().enumerate() {
            let root = uf.find(idx);
            let island_idx = *root_to_island.entry(root).or_insert_with(|| {
                islands.push(Island::default());
                islands.len() - 1
            });
            islands[island_idx].variables.push(id);
            variables_to_island.insert(id, island_idx);
        }

        for (i, c) in constraints.iter().enumerate() {
            if let Some(&island_idx) = c
                .variables()
                .first()
                .and_then(|id| variables_to_island.get(id))
            {
                islands[island_idx].constraint_indices.push(i);
            }
        }

        for island in &mut islands {
            island.variables.sort_unstable();
        }

        Self {
            islands,
            variables_to_island,
            total_variables: ids.len(),
            total_constraints: constraints.len(),
        }
    }

    /// Build islands and flag those whose blocks are all inactive.
    #[must_use]
    pub fn build_with_arena<C: Constraint>(constraints: &[C], arena: &VariablesArena) -> Self {
        let mut islands = Self::build(constraints);
        for island in &mut islands.islands {
            island.is_static = island.variables.iter().all(|&id| !arena.is_active(id));
        }
        islands
    }

    /// Get the number of islands.
    #[must_use]
    pub fn num_islands(&self) -> usize {
        self.islands.len()
    }

    /// Get the number of distinct blocks referenced.
    #[must_use]
    pub fn total_variables(&self) -> usize {
        self.total_variables
    }

    /// Get the total number of constraints.
    #[must_use]
    pub fn total_constraints(&self) -> usize {
        self.total_constraints
    }

    /// Get all islands.
    #[must_use]
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Get a specific island by index.
    #[must_use]
    pub fn get_island(&self, index: usize) -> Option<&Island> {
        self.islands.get(index)
    }

    /// Get the island index for a block.
    #[must_use]
    pub fn island_for(&self, id: VariablesId) -> Option<usize> {
        self.variables_to_island.get(&id).copied()
    }

    /// Check if two blocks are in the same island.
    #[must_use]
    pub fn same_island(&self, a: VariablesId, b: VariablesId) -> bool {
        match (self.island_for(a), self.island_for(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Get the number of non-static islands.
    #[must_use]
    pub fn num_active_islands(&self) -> usize {
        self.islands.iter().filter(|i| !i.is_static).count()
    }

    /// Iterate over non-static islands only.
    pub fn active_islands(&self) -> impl Iterator<Item = (usize, &Island)> {
        self.islands
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.is_static)
    }
}

/// Union-Find (Disjoint-Set Union) with path compression and union by rank.
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub(crate) fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return;
        }

        match self.rank[root_x].cmp(&self.rank[root_y]) {
            std::cmp::Ordering::Less => {
                self.parent[root_x] = root_y;
            }
            std::cmp::Ordering::Greater => {
                self.parent[root_y] = root_x;
            }
            std::cmp::Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
    }
}
