//! Variable blocks: the generalized velocities of one dynamic entity.
//!
//! A [`Variables`] block owns a slice of the system's generalized velocity
//! vector together with the inverse-mass operator that maps generalized
//! impulses on that slice to velocity changes. Blocks live in a
//! [`VariablesArena`] and are referenced by [`VariablesId`] handles, so
//! constraints never own the entities they couple.
//!
//! # Inverse-mass operators
//!
//! ```text
//! Body:      [1/m * I_3      0     ]     (6 DOF, linear first)
//!            [    0      I^-1      ]
//! Diagonal:  diag(d_0, ..., d_{n-1})
//! Generic:   arbitrary n x n matrix
//! ```

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use sim_types::{MassProperties, Twist};

use crate::{LcpError, Result, SolveSession};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle to a block in a [`VariablesArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VariablesId(usize);

impl VariablesId {
    /// Create a handle from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for VariablesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Variables({})", self.0)
    }
}

/// Inverse mass/inertia operator of a block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InverseMass {
    /// Rigid body: scalar inverse mass on the 3 linear DOF, 3x3 inverse
    /// inertia on the 3 angular DOF.
    Body {
        /// Inverse mass (0 for infinite mass).
        inv_mass: f64,
        /// Inverse inertia tensor, in the same basis as the angular velocity.
        inv_inertia: Matrix3<f64>,
    },
    /// Diagonal operator of arbitrary dimension.
    Diagonal(DVector<f64>),
    /// Dense square operator of arbitrary dimension.
    Generic(DMatrix<f64>),
}

impl InverseMass {
    /// Number of generalized coordinates the operator acts on.
    #[must_use]
    pub fn dim(&self) -> usize {
        match self {
            Self::Body { .. } => 6,
            Self::Diagonal(d) => d.len(),
            Self::Generic(m) => m.nrows(),
        }
    }

    /// Element `(row, col)` of the operator as a dense matrix.
    #[must_use]
    pub fn element(&self, row: usize, col: usize) -> f64 {
        match self {
            Self::Body {
                inv_mass,
                inv_inertia,
            } => match (row, col) {
                (r, c) if r < 3 && c < 3 => {
                    if r == c {
                        *inv_mass
                    } else {
                        0.0
                    }
                }
                (r, c) if (3..6).contains(&r) && (3..6).contains(&c) => {
                    inv_inertia[(r - 3, c - 3)]
                }
                _ => 0.0,
            },
            Self::Diagonal(d) => {
                if row == col {
                    d.get(row).copied().unwrap_or(0.0)
                } else {
                    0.0
                }
            }
            Self::Generic(m) => m.get((row, col)).copied().unwrap_or(0.0),
        }
    }

    /// The operator as a dense matrix.
    #[must_use]
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.dim();
        DMatrix::from_fn(n, n, |r, c| self.element(r, c))
    }

    /// Compute `out = invM * input` without allocating.
    ///
    /// Both vectors must have length [`dim`](Self::dim).
    pub fn apply_into(&self, input: &DVector<f64>, out: &mut DVector<f64>) {
        debug_assert_eq!(input.len(), self.dim());
        debug_assert_eq!(out.len(), self.dim());
        match self {
            Self::Body {
                inv_mass,
                inv_inertia,
            } => {
                for i in 0..3 {
                    out[i] = inv_mass * input[i];
                }
                let angular = inv_inertia * Vector3::new(input[3], input[4], input[5]);
                out[3] = angular.x;
                out[4] = angular.y;
                out[5] = angular.z;
            }
            Self::Diagonal(d) => {
                for ((o, di), x) in out.iter_mut().zip(d.iter()).zip(input.iter()) {
                    *o = di * x;
                }
            }
            Self::Generic(m) => m.mul_to(input, out),
        }
    }

    /// Compute `invM * input`.
    #[must_use]
    pub fn apply(&self, input: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(self.dim());
        self.apply_into(input, &mut out);
        out
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Body {
                inv_mass,
                inv_inertia,
            } => {
                if !inv_mass.is_finite() || *inv_mass < 0.0 {
                    return Err(LcpError::invalid_inverse_mass(format!(
                        "inverse mass must be finite and non-negative, got {inv_mass}"
                    )));
                }
                if !inv_inertia.iter().all(|x| x.is_finite()) {
                    return Err(LcpError::invalid_inverse_mass(
                        "inverse inertia must be finite",
                    ));
                }
            }
            Self::Diagonal(d) => {
                if !d.iter().all(|x| x.is_finite()) {
                    return Err(LcpError::invalid_inverse_mass(
                        "diagonal entries must be finite",
                    ));
                }
            }
            Self::Generic(m) => {
                if !m.is_square() {
                    return Err(LcpError::invalid_inverse_mass(format!(
                        "generic operator must be square, got {}x{}",
                        m.nrows(),
                        m.ncols()
                    )));
                }
                if !m.iter().all(|x| x.is_finite()) {
                    return Err(LcpError::invalid_inverse_mass(
                        "generic operator must be finite",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Generalized velocities of one entity plus its inverse-mass operator.
///
/// # Example
///
/// ```
/// use sim_lcp::Variables;
/// use sim_types::MassProperties;
///
/// let block = Variables::for_body(&MassProperties::sphere(2.0, 0.5)).unwrap();
/// assert_eq!(block.dim(), 6);
/// assert!(block.is_active());
///
/// let fixed = Variables::for_body(&MassProperties::fixed()).unwrap();
/// assert!(!fixed.is_active());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "VariablesData"))]
pub struct Variables {
    inverse_mass: InverseMass,
    velocity: DVector<f64>,
    force: DVector<f64>,
    active: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    mass_revision: u64,
}

impl Variables {
    /// Create an active block at rest with the given operator.
    pub fn new(inverse_mass: InverseMass) -> Result<Self> {
        inverse_mass.validate()?;
        let n = inverse_mass.dim();
        Ok(Self {
            inverse_mass,
            velocity: DVector::zeros(n),
            force: DVector::zeros(n),
            active: true,
            mass_revision: 0,
        })
    }

    /// Create a 6-DOF block for a rigid body.
    ///
    /// Static bodies (zero or infinite mass) produce an inactive block with
    /// a zero operator.
    pub fn for_body(props: &MassProperties) -> Result<Self> {
        props.validate()?;

        if props.is_static() {
            return Ok(Self::new(InverseMass::Body {
                inv_mass: 0.0,
                inv_inertia: Matrix3::zeros(),
            })?
            .with_active(false));
        }

        let inv_inertia = props
            .inverse_inertia()
            .ok_or_else(|| LcpError::invalid_inverse_mass("inertia tensor is singular"))?;

        Self::new(InverseMass::Body {
            inv_mass: props.inverse_mass(),
            inv_inertia,
        })
    }

    /// Create a block with a diagonal operator.
    pub fn diagonal(inv_diagonal: DVector<f64>) -> Result<Self> {
        Self::new(InverseMass::Diagonal(inv_diagonal))
    }

    /// Create a block with a dense operator.
    pub fn generic(inv_mass: DMatrix<f64>) -> Result<Self> {
        Self::new(InverseMass::Generic(inv_mass))
    }

    /// Set the initial activity flag.
    ///
    /// Once the block is in an arena, activity changes go through
    /// [`VariablesArena::set_active`] so open sessions are invalidated.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Set the initial velocity. Its length must match the block dimension.
    pub fn with_velocity(mut self, velocity: DVector<f64>) -> Result<Self> {
        check_len("velocity", velocity.len(), self.dim())?;
        self.velocity = velocity;
        Ok(self)
    }

    /// Number of generalized coordinates.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.inverse_mass.dim()
    }

    /// Whether this block takes part in the solve.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The inverse-mass operator.
    #[must_use]
    pub fn inverse_mass(&self) -> &InverseMass {
        &self.inverse_mass
    }

    /// Replace the inverse-mass operator.
    ///
    /// Constraints referencing this block must run `update_auxiliary` again.
    pub fn set_inverse_mass(&mut self, inverse_mass: InverseMass) -> Result<()> {
        inverse_mass.validate()?;
        if inverse_mass.dim() != self.dim() {
            return Err(LcpError::invalid_inverse_mass(format!(
                "operator dimension {} does not match block dimension {}",
                inverse_mass.dim(),
                self.dim()
            )));
        }
        self.inverse_mass = inverse_mass;
        self.mass_revision = self.mass_revision.wrapping_add(1);
        Ok(())
    }

    /// Counter bumped on every [`set_inverse_mass`](Self::set_inverse_mass).
    #[must_use]
    pub fn mass_revision(&self) -> u64 {
        self.mass_revision
    }

    /// Generalized velocity.
    #[must_use]
    pub fn velocity(&self) -> &DVector<f64> {
        &self.velocity
    }

    /// Mutable generalized velocity.
    pub fn velocity_mut(&mut self) -> &mut DVector<f64> {
        &mut self.velocity
    }

    /// Known generalized force acting on the block.
    #[must_use]
    pub fn force(&self) -> &DVector<f64> {
        &self.force
    }

    /// Mutable generalized force.
    pub fn force_mut(&mut self) -> &mut DVector<f64> {
        &mut self.force
    }

    /// Compute `invM * v`.
    #[must_use]
    pub fn apply_inverse_mass(&self, v: &DVector<f64>) -> DVector<f64> {
        self.inverse_mass.apply(v)
    }

    /// Compute `out = invM * v` without allocating.
    pub fn apply_inverse_mass_into(&self, v: &DVector<f64>, out: &mut DVector<f64>) {
        self.inverse_mass.apply_into(v, out);
    }

    /// Compute `invM * f` for the stored force.
    #[must_use]
    pub fn compute_mass_inverse_times_force(&self) -> DVector<f64> {
        self.inverse_mass.apply(&self.force)
    }

    /// Velocity of a 6-DOF body block as a twist (linear first).
    #[must_use]
    pub fn twist(&self) -> Option<Twist> {
        if self.dim() != 6 {
            return None;
        }
        let v = &self.velocity;
        Some(Twist::new(
            Vector3::new(v[0], v[1], v[2]),
            Vector3::new(v[3], v[4], v[5]),
        ))
    }

    /// Overwrite the velocity of a 6-DOF block from a twist.
    /// Returns `false` for blocks of any other dimension.
    pub fn set_twist(&mut self, twist: &Twist) -> bool {
        if self.dim() != 6 {
            return false;
        }
        self.velocity
            .fixed_rows_mut::<3>(0)
            .copy_from(&twist.linear);
        self.velocity
            .fixed_rows_mut::<3>(3)
            .copy_from(&twist.angular);
        true
    }
}

fn check_len(what: &str, len: usize, dim: usize) -> Result<()> {
    if len == dim {
        return Ok(());
    }
    let err = LcpError::invalid_variables(format!(
        "{what} has length {len}, block dimension is {dim}"
    ));
    tracing::warn!(%err, "rejected variables block");
    Err(err)
}

/// Serialized form of [`Variables`], checked on the way in.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct VariablesData {
    inverse_mass: InverseMass,
    velocity: DVector<f64>,
    force: DVector<f64>,
    active: bool,
}

#[cfg(feature = "serde")]
impl TryFrom<VariablesData> for Variables {
    type Error = LcpError;

    fn try_from(data: VariablesData) -> Result<Self> {
        data.inverse_mass.validate()?;
        let n = data.inverse_mass.dim();
        check_len("velocity", data.velocity.len(), n)?;
        check_len("force", data.force.len(), n)?;
        Ok(Self {
            inverse_mass: data.inverse_mass,
            velocity: data.velocity,
            force: data.force,
            active: data.active,
            mass_revision: 0,
        })
    }
}

/// Mutable access to a block stored in a [`VariablesArena`].
///
/// Velocity, force and the inverse-mass operator may change through the
/// guard. Activity may not, since that would move offsets under an open
/// [`SolveSession`]; use [`VariablesArena::set_active`].
///
/// ```compile_fail
/// use sim_lcp::{Variables, VariablesArena};
/// use nalgebra::DVector;
///
/// let mut arena = VariablesArena::new();
/// let a = arena.add(Variables::diagonal(DVector::from_element(2, 1.0)).unwrap());
/// *arena.get_mut(a).unwrap() = Variables::diagonal(DVector::from_element(2, 1.0))
///     .unwrap()
///     .with_active(false);
/// ```
#[derive(Debug)]
pub struct VariablesMut<'a> {
    block: &'a mut Variables,
}

impl VariablesMut<'_> {
    /// Mutable generalized velocity.
    pub fn velocity_mut(&mut self) -> &mut DVector<f64> {
        self.block.velocity_mut()
    }

    /// Mutable generalized force.
    pub fn force_mut(&mut self) -> &mut DVector<f64> {
        self.block.force_mut()
    }

    /// See [`Variables::set_inverse_mass`].
    pub fn set_inverse_mass(&mut self, inverse_mass: InverseMass) -> Result<()> {
        self.block.set_inverse_mass(inverse_mass)
    }

    /// See [`Variables::set_twist`].
    pub fn set_twist(&mut self, twist: &Twist) -> bool {
        self.block.set_twist(twist)
    }
}

impl std::ops::Deref for VariablesMut<'_> {
    type Target = Variables;

    fn deref(&self) -> &Variables {
        self.block
    }
}

/// Owner of every variable block in a system.
///
/// The arena tracks a generation counter. Opening a solve session or
/// changing a block's activity advances it, which invalidates sessions
/// opened earlier.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VariablesArena {
    blocks: Vec<Variables>,
    #[cfg_attr(feature = "serde", serde(skip))]
    generation: u64,
}

impl VariablesArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block and return its handle.
    pub fn add(&mut self, variables: Variables) -> VariablesId {
        let id = VariablesId(self.blocks.len());
        self.blocks.push(variables);
        id
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Get a block.
    #[must_use]
    pub fn get(&self, id: VariablesId) -> Option<&Variables> {
        self.blocks.get(id.0)
    }

    /// Get a block mutably. Activity changes go through
    /// [`set_active`](Self::set_active).
    pub fn get_mut(&mut self, id: VariablesId) -> Option<VariablesMut<'_>> {
        self.blocks
            .get_mut(id.0)
            .map(|block| VariablesMut { block })
    }

    /// Get a block or fail with [`LcpError::UnknownVariables`].
    pub fn try_get(&self, id: VariablesId) -> Result<&Variables> {
        self.get(id).ok_or(LcpError::UnknownVariables(id))
    }

    /// Iterate over all blocks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (VariablesId, &Variables)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, v)| (VariablesId(i), v))
    }

    /// Whether a block exists and is active. Unknown blocks count as inactive.
    #[must_use]
    pub fn is_active(&self, id: VariablesId) -> bool {
        self.get(id).is_some_and(Variables::is_active)
    }

    /// Change a block's activity. Invalidates open sessions if the flag changes.
    pub fn set_active(&mut self, id: VariablesId, active: bool) -> Result<()> {
        let block = self
            .blocks
            .get_mut(id.0)
            .ok_or(LcpError::UnknownVariables(id))?;
        if block.active != active {
            block.active = active;
            self.generation = self.generation.wrapping_add(1);
        }
        Ok(())
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sum of the dimensions of all active blocks.
    #[must_use]
    pub fn active_dim(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.is_active())
            .map(Variables::dim)
            .sum()
    }

    /// Assign offsets to every active block in insertion order.
    pub fn begin_session(&mut self) -> SolveSession {
        let mut offsets = vec![None; self.blocks.len()];
        let mut next = 0;
        for (slot, block) in offsets.iter_mut().zip(&self.blocks) {
            if block.is_active() {
                *slot = Some(next);
                next += block.dim();
            }
        }
        self.open_session(offsets, next)
    }

    /// Assign offsets to the listed blocks in the given order.
    ///
    /// Inactive blocks and repeated handles are skipped; blocks not listed
    /// receive no offset.
    pub fn begin_session_ordered(&mut self, order: &[VariablesId]) -> Result<SolveSession> {
        let mut offsets = vec![None; self.blocks.len()];
        let mut next = 0;
        for &id in order {
            let block = self.try_get(id)?;
            if !block.is_active() || offsets[id.0].is_some() {
                continue;
            }
            offsets[id.0] = Some(next);
            next += block.dim();
        }
        Ok(self.open_session(offsets, next))
    }

    fn open_session(&mut self, offsets: Vec<Option<usize>>, total_dim: usize) -> SolveSession {
        self.generation = self.generation.wrapping_add(1);
        tracing::debug!(
            generation = self.generation,
            blocks = self.blocks.len(),
            total_dim,
            "opened solve session"
        );
        SolveSession::new(self.generation, offsets, total_dim)
    }
}
