//! Offset assignment for one solve.
//!
//! A [`SolveSession`] records where each active block's slice starts in the
//! global velocity vector. Offsets are only valid for the arena generation
//! they were computed for; reading them through a superseded session fails
//! with [`LcpError::StaleSession`] instead of silently indexing the wrong
//! slice.

use crate::{LcpError, Result, VariablesArena, VariablesId};

/// Offsets of the active blocks for one solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveSession {
    generation: u64,
    offsets: Vec<Option<usize>>,
    total_dim: usize,
}

impl SolveSession {
    pub(crate) fn new(generation: u64, offsets: Vec<Option<usize>>, total_dim: usize) -> Self {
        Self {
            generation,
            offsets,
            total_dim,
        }
    }

    /// Arena generation this session was opened at.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Length of the global velocity vector.
    #[must_use]
    pub fn total_dim(&self) -> usize {
        self.total_dim
    }

    /// Whether the arena has not moved on since this session was opened.
    #[must_use]
    pub fn is_current(&self, arena: &VariablesArena) -> bool {
        self.generation == arena.generation()
    }

    /// Fail with [`LcpError::StaleSession`] if the arena moved on.
    pub fn ensure_current(&self, arena: &VariablesArena) -> Result<()> {
        if self.is_current(arena) {
            Ok(())
        } else {
            Err(LcpError::StaleSession {
                session: self.generation,
                current: arena.generation(),
            })
        }
    }

    /// Offset of a block's slice in the global vector.
    pub fn offset(&self, arena: &VariablesArena, id: VariablesId) -> Result<usize> {
        self.ensure_current(arena)?;
        self.offset_unchecked(id)
    }

    /// Offset lookup without the generation check. Callers have already run
    /// [`ensure_current`](Self::ensure_current).
    pub(crate) fn offset_unchecked(&self, id: VariablesId) -> Result<usize> {
        self.offsets
            .get(id.index())
            .copied()
            .flatten()
            .ok_or(LcpError::OffsetUnassigned(id))
    }

    /// Blocks with an offset, in handle order.
    pub fn assigned(&self) -> impl Iterator<Item = (VariablesId, usize)> + '_ {
        self.offsets
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.map(|offset| (VariablesId::new(i), offset)))
    }

    /// Fail with [`LcpError::VectorTooShort`] if `len` cannot hold every slice.
    pub fn check_vector_len(&self, len: usize) -> Result<()> {
        if len < self.total_dim {
            return Err(LcpError::VectorTooShort {
                required: self.total_dim,
                actual: len,
            });
        }
        Ok(())
    }
}
