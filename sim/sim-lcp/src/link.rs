//! Links: two bodies, two attachment frames, and the reaction between them.
//!
//! A [`Link`] sits above the scalar constraints that enforce a joint. It
//! remembers which bodies the joint connects and where it attaches to each
//! of them, and turns the solved multipliers into a reaction wrench that
//! callers can read in any of the frames involved.
//!
//! # Frames
//!
//! ```text
//! world ── body 1 pose ── frame1_rel ──> frame 1 (abs)
//! world ── body 2 pose ── frame2_rel ──> frame 2 (abs)
//! ```
//!
//! # Stored Reaction
//!
//! Only one wrench is stored: the reaction acting on body 2, applied at the
//! origin of frame 2. Its basis depends on the [`ReactionConvention`]. The
//! reaction on body 1 is always derived (equal and opposite, moved to
//! frame 1), never stored.
//!
//! # Example
//!
//! ```
//! use sim_lcp::Link;
//! use sim_types::{BodyId, Pose, Wrench};
//! use hashbrown::HashMap;
//! use nalgebra::{Point3, Vector3};
//!
//! let b1 = BodyId::new(1);
//! let b2 = BodyId::new(2);
//!
//! let mut bodies = HashMap::new();
//! bodies.insert(b1, Pose::identity());
//! bodies.insert(b2, Pose::from_position(Point3::new(2.0, 0.0, 0.0)));
//!
//! let mut link = Link::new(b1, b2)
//!     .with_frame1_rel(Pose::from_position(Point3::new(1.0, 0.0, 0.0)))
//!     .with_frame2_rel(Pose::from_position(Point3::new(-1.0, 0.0, 0.0)));
//! link.set_reaction(Wrench::force(Vector3::y()));
//!
//! // Frames coincide, so body 1 feels the opposite force and no torque
//! let on_1 = link.reaction_on_1(&bodies).unwrap();
//! assert!((on_1.force.y + 1.0).abs() < 1e-12);
//! assert!(on_1.torque.norm() < 1e-12);
//! ```

use hashbrown::HashMap;
use nalgebra::Vector3;
use sim_types::{BodyId, Pose, Wrench};

use crate::{Constraint, LcpError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Collaborator traits
// ============================================================================

/// Provides the absolute pose of each body.
pub trait BodyFrames {
    /// Absolute pose of `body`, or `None` if the body is unknown.
    fn frame(&self, body: BodyId) -> Option<Pose>;
}

impl<S: std::hash::BuildHasher> BodyFrames for HashMap<BodyId, Pose, S> {
    fn frame(&self, body: BodyId) -> Option<Pose> {
        self.get(&body).copied()
    }
}

impl<T: BodyFrames + ?Sized> BodyFrames for &T {
    fn frame(&self, body: BodyId) -> Option<Pose> {
        (**self).frame(body)
    }
}

/// Visual or auxiliary state attached to a link, refreshed on update.
pub trait LinkAssets {
    /// Bring the assets in line with the link at `time`.
    fn sync(&mut self, link: &Link, time: f64);
}

impl LinkAssets for () {
    fn sync(&mut self, _link: &Link, _time: f64) {}
}

// ============================================================================
// Configuration types
// ============================================================================

/// Basis the stored reaction is expressed in.
///
/// In every convention the wrench is the one acting on body 2, with the
/// torque taken about the origin of frame 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReactionConvention {
    /// Attachment frame 2.
    #[default]
    Frame2,
    /// Body 2's frame.
    Body2,
    /// The absolute frame.
    World,
}

/// One of the two entities a link connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LinkSide {
    /// Body 1.
    One,
    /// Body 2.
    Two,
}

/// Component of the stored reaction wrench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LinkDof {
    /// Force along X.
    ForceX,
    /// Force along Y.
    ForceY,
    /// Force along Z.
    ForceZ,
    /// Torque about X.
    TorqueX,
    /// Torque about Y.
    TorqueY,
    /// Torque about Z.
    TorqueZ,
}

impl LinkDof {
    /// Whether this component is part of the force.
    #[must_use]
    pub const fn is_force(self) -> bool {
        matches!(self, Self::ForceX | Self::ForceY | Self::ForceZ)
    }

    /// Axis index (0 = X, 1 = Y, 2 = Z).
    #[must_use]
    pub const fn axis(self) -> usize {
        match self {
            Self::ForceX | Self::TorqueX => 0,
            Self::ForceY | Self::TorqueY => 1,
            Self::ForceZ | Self::TorqueZ => 2,
        }
    }
}

/// Maps a scalar constraint's multiplier onto one reaction component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReactionSlot {
    /// Index of the constraint in the slice handed to the link.
    pub constraint: usize,
    /// Component of the stored wrench it contributes to.
    pub dof: LinkDof,
}

impl ReactionSlot {
    /// Create a slot.
    #[must_use]
    pub const fn new(constraint: usize, dof: LinkDof) -> Self {
        Self { constraint, dof }
    }
}

/// Time window during which a link is enforced.
///
/// Active for `start <= t < end`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivationSchedule {
    /// First active instant.
    pub start: f64,
    /// First inactive instant after `start`.
    pub end: f64,
}

impl ActivationSchedule {
    /// Active between `start` (inclusive) and `end` (exclusive).
    #[must_use]
    pub const fn between(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Active from `start` onward.
    #[must_use]
    pub const fn after(start: f64) -> Self {
        Self {
            start,
            end: f64::INFINITY,
        }
    }

    /// Active until `end`.
    #[must_use]
    pub const fn until(end: f64) -> Self {
        Self {
            start: f64::NEG_INFINITY,
            end,
        }
    }

    /// Whether the link is enforced at `time`.
    #[must_use]
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

// ============================================================================
// Link
// ============================================================================

/// A joint between two bodies, seen from its attachment frames.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Link {
    body1: BodyId,
    body2: BodyId,
    frame1_rel: Pose,
    frame2_rel: Pose,
    reaction: Wrench,
    convention: ReactionConvention,
    slots: Vec<ReactionSlot>,
    schedule: Option<ActivationSchedule>,
    active: bool,
    time: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    assets_time: Option<f64>,
}

impl Link {
    /// Create a link with identity attachment frames.
    #[must_use]
    pub fn new(body1: BodyId, body2: BodyId) -> Self {
        Self {
            body1,
            body2,
            frame1_rel: Pose::identity(),
            frame2_rel: Pose::identity(),
            reaction: Wrench::zero(),
            convention: ReactionConvention::default(),
            slots: Vec::new(),
            schedule: None,
            active: true,
            time: 0.0,
            assets_time: None,
        }
    }

    /// Set the attachment frame on body 1.
    #[must_use]
    pub fn with_frame1_rel(mut self, frame: Pose) -> Self {
        self.frame1_rel = frame;
        self
    }

    /// Set the attachment frame on body 2.
    #[must_use]
    pub fn with_frame2_rel(mut self, frame: Pose) -> Self {
        self.frame2_rel = frame;
        self
    }

    /// Set the storage convention of the reaction.
    #[must_use]
    pub fn with_convention(mut self, convention: ReactionConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Set the multiplier-to-wrench slots.
    #[must_use]
    pub fn with_slots(mut self, slots: Vec<ReactionSlot>) -> Self {
        self.slots = slots;
        self
    }

    /// Set the activation schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: ActivationSchedule) -> Self {
        self.active = schedule.is_active_at(self.time);
        self.schedule = Some(schedule);
        self
    }

    /// Body 1.
    #[must_use]
    pub fn body1(&self) -> BodyId {
        self.body1
    }

    /// Body 2.
    #[must_use]
    pub fn body2(&self) -> BodyId {
        self.body2
    }

    /// Attachment frame relative to body 1.
    #[must_use]
    pub fn frame1_rel(&self) -> &Pose {
        &self.frame1_rel
    }

    /// Attachment frame relative to body 2.
    #[must_use]
    pub fn frame2_rel(&self) -> &Pose {
        &self.frame2_rel
    }

    /// Move the attachment frame on body 1.
    pub fn set_frame1_rel(&mut self, frame: Pose) {
        self.frame1_rel = frame;
    }

    /// Move the attachment frame on body 2.
    pub fn set_frame2_rel(&mut self, frame: Pose) {
        self.frame2_rel = frame;
    }

    /// Storage convention.
    #[must_use]
    pub fn convention(&self) -> ReactionConvention {
        self.convention
    }

    /// Multiplier-to-wrench slots.
    #[must_use]
    pub fn slots(&self) -> &[ReactionSlot] {
        &self.slots
    }

    /// Append a slot.
    pub fn add_slot(&mut self, slot: ReactionSlot) {
        self.slots.push(slot);
    }

    /// Activation schedule, if any.
    #[must_use]
    pub fn schedule(&self) -> Option<&ActivationSchedule> {
        self.schedule.as_ref()
    }

    /// Whether the link is currently enforced.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable the link. A schedule overrides this at the next
    /// time update.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Time of the last update.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    // ------------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------------

    fn body_frame(&self, bodies: &impl BodyFrames, body: BodyId) -> Result<Pose> {
        bodies.frame(body).ok_or_else(|| {
            tracing::warn!(%body, "link body has no frame");
            LcpError::BodyNotFound(body)
        })
    }

    /// Absolute pose of attachment frame 1.
    pub fn frame1_abs(&self, bodies: &impl BodyFrames) -> Result<Pose> {
        Ok(self
            .body_frame(bodies, self.body1)?
            .compose(&self.frame1_rel))
    }

    /// Absolute pose of attachment frame 2.
    pub fn frame2_abs(&self, bodies: &impl BodyFrames) -> Result<Pose> {
        Ok(self
            .body_frame(bodies, self.body2)?
            .compose(&self.frame2_rel))
    }

    // ------------------------------------------------------------------------
    // Stored reaction
    // ------------------------------------------------------------------------

    /// The stored reaction, in the storage convention.
    #[must_use]
    pub fn stored_reaction(&self) -> &Wrench {
        &self.reaction
    }

    /// Overwrite the stored reaction. `wrench` is read in the storage
    /// convention.
    pub fn set_reaction(&mut self, wrench: Wrench) {
        self.reaction = wrench;
    }

    /// Rebuild the stored reaction from constraint multipliers.
    ///
    /// Each slot contributes `-l / step` to its component, with axes taken
    /// in the storage basis. Components without a slot are zero.
    pub fn set_reaction_from_multipliers<C: Constraint>(
        &mut self,
        constraints: &[C],
        step: f64,
    ) -> Result<()> {
        if !(step.is_finite() && step > 0.0) {
            return Err(LcpError::InvalidStep { step });
        }
        self.check_slots(constraints.len())?;

        let mut force = Vector3::zeros();
        let mut torque = Vector3::zeros();
        for slot in &self.slots {
            let l = constraints[slot.constraint].state().multiplier;
            let target = if slot.dof.is_force() {
                &mut force
            } else {
                &mut torque
            };
            target[slot.dof.axis()] = -l / step;
        }
        self.reaction = Wrench::new(force, torque);
        Ok(())
    }

    /// Enable or disable the link's constraints to match [`is_active`](Self::is_active).
    pub fn sync_constraint_activity<C: Constraint>(&self, constraints: &mut [C]) -> Result<()> {
        self.check_slots(constraints.len())?;
        for slot in &self.slots {
            constraints[slot.constraint].state_mut().enabled = self.active;
        }
        Ok(())
    }

    fn check_slots(&self, len: usize) -> Result<()> {
        match self.slots.iter().find(|s| s.constraint >= len) {
            Some(slot) => Err(LcpError::UnknownConstraint {
                index: slot.constraint,
                len,
            }),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Derived reactions
    // ------------------------------------------------------------------------

    /// Reaction on body 2, in frame 2, about the frame-2 origin.
    pub fn reaction_on_2(&self, bodies: &impl BodyFrames) -> Result<Wrench> {
        let w = &self.reaction;
        Ok(match self.convention {
            ReactionConvention::Frame2 => *w,
            ReactionConvention::Body2 => Wrench::new(
                self.frame2_rel.inverse_transform_vector(&w.force),
                self.frame2_rel.inverse_transform_vector(&w.torque),
            ),
            ReactionConvention::World => {
                let frame2 = self.frame2_abs(bodies)?;
                Wrench::new(
                    frame2.inverse_transform_vector(&w.force),
                    frame2.inverse_transform_vector(&w.torque),
                )
            }
        })
    }

    /// Reaction on body 1, in frame 1, about the frame-1 origin.
    pub fn reaction_on_1(&self, bodies: &impl BodyFrames) -> Result<Wrench> {
        let w2 = self.reaction_on_2(bodies)?;
        let w1_abs = self
            .frame2_abs(bodies)?
            .transform_wrench_local_to_parent(&-w2);
        Ok(self
            .frame1_abs(bodies)?
            .transform_wrench_parent_to_local(&w1_abs))
    }

    /// Reaction on body 2 as seen from frame 1: frame-1 basis, torque about
    /// the frame-1 origin.
    pub fn react_wrench_1(&self, bodies: &impl BodyFrames) -> Result<Wrench> {
        let w2_abs = self
            .frame2_abs(bodies)?
            .transform_wrench_local_to_parent(&self.reaction_on_2(bodies)?);
        Ok(self
            .frame1_abs(bodies)?
            .transform_wrench_parent_to_local(&w2_abs))
    }

    /// Reaction force on body 2, in frame 1.
    pub fn react_force_1(&self, bodies: &impl BodyFrames) -> Result<Vector3<f64>> {
        let frame1 = self.frame1_abs(bodies)?;
        let frame2 = self.frame2_abs(bodies)?;
        let f2 = self.reaction_on_2(bodies)?.force;
        Ok(frame1.inverse_transform_vector(&frame2.transform_vector(&f2)))
    }

    /// Reaction torque on body 2 about the frame-1 origin, in frame 1.
    pub fn react_torque_1(&self, bodies: &impl BodyFrames) -> Result<Vector3<f64>> {
        let frame1 = self.frame1_abs(bodies)?;
        let frame2 = self.frame2_abs(bodies)?;
        let w2 = self.reaction_on_2(bodies)?;

        let lever = frame1.inverse_transform_point(&frame2.position).coords;
        let force = frame1.inverse_transform_vector(&frame2.transform_vector(&w2.force));
        let torque = frame1.inverse_transform_vector(&frame2.transform_vector(&w2.torque));
        Ok(torque + lever.cross(&force))
    }

    /// Reaction force on body 2, in body 2's frame.
    pub fn react_force_body2(&self, bodies: &impl BodyFrames) -> Result<Vector3<f64>> {
        Ok(self
            .frame2_rel
            .transform_vector(&self.reaction_on_2(bodies)?.force))
    }

    /// Reaction torque on body 2 about body 2's origin, in body 2's frame.
    pub fn react_torque_body2(&self, bodies: &impl BodyFrames) -> Result<Vector3<f64>> {
        let w2 = self.reaction_on_2(bodies)?;
        let force = self.frame2_rel.transform_vector(&w2.force);
        let lever = self.frame2_rel.position.coords;
        Ok(self.frame2_rel.transform_vector(&w2.torque) + lever.cross(&force))
    }

    /// Reaction force on body 2, in body 1's frame.
    pub fn react_force_body1(&self, bodies: &impl BodyFrames) -> Result<Vector3<f64>> {
        let body1 = self.body_frame(bodies, self.body1)?;
        let body2 = self.body_frame(bodies, self.body2)?;
        let force_b2 = self.react_force_body2(bodies)?;
        Ok(body1.inverse_transform_vector(&body2.transform_vector(&force_b2)))
    }

    /// Reaction torque on body 2 about body 1's origin, in body 1's frame.
    pub fn react_torque_body1(&self, bodies: &impl BodyFrames) -> Result<Vector3<f64>> {
        let body1 = self.body_frame(bodies, self.body1)?;
        let body2 = self.body_frame(bodies, self.body2)?;
        let w2 = self.reaction_on_2(bodies)?;

        let attach = body2.transform_point(&self.frame2_rel.position);
        let lever = body1.inverse_transform_point(&attach).coords;
        let force = self.react_force_body1(bodies)?;
        let torque = body1.inverse_transform_vector(
            &body2.transform_vector(&self.frame2_rel.transform_vector(&w2.torque)),
        );
        Ok(torque + lever.cross(&force))
    }

    /// Reaction acting on one entity, in that entity's body frame, about its
    /// origin.
    pub fn reaction_in_entity_frame(
        &self,
        side: LinkSide,
        bodies: &impl BodyFrames,
    ) -> Result<Wrench> {
        Ok(match side {
            LinkSide::Two => Wrench::new(
                self.react_force_body2(bodies)?,
                self.react_torque_body2(bodies)?,
            ),
            LinkSide::One => -Wrench::new(
                self.react_force_body1(bodies)?,
                self.react_torque_body1(bodies)?,
            ),
        })
    }

    // ------------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------------

    /// Advance to `time`, applying the schedule if there is one.
    pub fn update_time(&mut self, time: f64) {
        self.time = time;
        if let Some(schedule) = &self.schedule {
            self.active = schedule.is_active_at(time);
        }
        tracing::trace!(
            body1 = %self.body1,
            body2 = %self.body2,
            time,
            active = self.active,
            "link time updated"
        );
    }

    /// Advance to `time` and, if requested, bring `assets` up to date.
    ///
    /// Repeating the same time does not synchronise the assets again.
    pub fn update(&mut self, time: f64, update_assets: bool, assets: &mut impl LinkAssets) {
        self.update_time(time);
        if update_assets && self.assets_time != Some(time) {
            assets.sync(self, time);
            self.assets_time = Some(time);
        }
    }

    /// [`update`](Self::update) at the current time.
    pub fn refresh(&mut self, update_assets: bool, assets: &mut impl LinkAssets) {
        self.update(self.time, update_assets, assets);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{TwoBodyConstraint, Variables, VariablesArena};
    use approx::assert_relative_eq;
    use nalgebra::{DVector, Point3, UnitQuaternion};

    fn bodies(p1: Pose, p2: Pose) -> HashMap<BodyId, Pose> {
        let mut map = HashMap::new();
        map.insert(BodyId::new(1), p1);
        map.insert(BodyId::new(2), p2);
        map
    }

    fn rotated(x: f64, y: f64, z: f64, axis: Vector3<f64>, angle: f64) -> Pose {
        Pose::from_position_rotation(
            Point3::new(x, y, z),
            UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(axis), angle),
        )
    }

    fn sample_link() -> (Link, HashMap<BodyId, Pose>) {
        let link = Link::new(BodyId::new(1), BodyId::new(2))
            .with_frame1_rel(rotated(0.3, -0.2, 0.5, Vector3::new(1.0, 1.0, 0.0), 0.4))
            .with_frame2_rel(rotated(-0.1, 0.4, 0.2, Vector3::new(0.0, 1.0, 1.0), -0.7));
        let map = bodies(
            rotated(1.0, 2.0, 0.0, Vector3::z(), 0.9),
            rotated(-1.0, 0.5, 1.5, Vector3::new(1.0, 0.0, 1.0), 1.3),
        );
        (link, map)
    }

    #[test]
    fn test_frame_abs() {
        let link = Link::new(BodyId::new(1), BodyId::new(2))
            .with_frame1_rel(Pose::from_position(Point3::new(1.0, 0.0, 0.0)));
        let map = bodies(
            Pose::from_position(Point3::new(0.0, 2.0, 0.0)),
            Pose::identity(),
        );
        let f1 = link.frame1_abs(&map).unwrap();
        assert_relative_eq!(f1.position, Point3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_missing_body() {
        let link = Link::new(BodyId::new(1), BodyId::new(7));
        let map = bodies(Pose::identity(), Pose::identity());
        assert_eq!(
            link.frame2_abs(&map).unwrap_err(),
            LcpError::BodyNotFound(BodyId::new(7))
        );
    }

    #[test]
    fn test_reaction_on_1_is_equal_and_opposite() {
        let (mut link, map) = sample_link();
        link.set_reaction(Wrench::new(
            Vector3::new(1.0, -2.0, 0.5),
            Vector3::new(0.3, 0.1, -0.4),
        ));

        let w1 = link.reaction_on_1(&map).unwrap();
        let back = link
            .frame1_abs(&map)
            .unwrap()
            .transform_wrench_local_to_parent(&w1);
        let w2_abs = link
            .frame2_abs(&map)
            .unwrap()
            .transform_wrench_local_to_parent(&link.reaction_on_2(&map).unwrap());

        assert_relative_eq!(back.force, -w2_abs.force, epsilon = 1e-12);
        assert_relative_eq!(back.torque, -w2_abs.torque, epsilon = 1e-12);
    }

    #[test]
    fn test_frame1_derivation_matches_reaction_on_1() {
        let (mut link, map) = sample_link();
        link.set_reaction(Wrench::new(
            Vector3::new(0.2, 0.7, -1.1),
            Vector3::new(-0.5, 0.0, 0.9),
        ));

        let w1 = link.reaction_on_1(&map).unwrap();
        assert_relative_eq!(
            link.react_force_1(&map).unwrap(),
            -w1.force,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            link.react_torque_1(&map).unwrap(),
            -w1.torque,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            link.react_wrench_1(&map).unwrap().torque,
            -w1.torque,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_body1_and_frame1_derivations_agree() {
        let (mut link, map) = sample_link();
        link.set_reaction(Wrench::new(
            Vector3::new(-0.4, 1.2, 0.3),
            Vector3::new(0.8, -0.6, 0.1),
        ));

        let in_body1 = Wrench::new(
            link.react_force_body1(&map).unwrap(),
            link.react_torque_body1(&map).unwrap(),
        );
        let in_frame1 = link.frame1_rel().transform_wrench_parent_to_local(&in_body1);

        assert_relative_eq!(in_frame1.force, link.react_force_1(&map).unwrap(), epsilon = 1e-12);
        assert_relative_eq!(in_frame1.torque, link.react_torque_1(&map).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_body2_derivation() {
        let mut link = Link::new(BodyId::new(1), BodyId::new(2))
            .with_frame2_rel(Pose::from_position(Point3::new(0.0, 0.0, 1.0)));
        link.set_reaction(Wrench::force(Vector3::x()));
        let map = bodies(Pose::identity(), Pose::identity());

        // +X force applied 1 m up the Z axis: torque +Y about the body origin
        assert_relative_eq!(link.react_force_body2(&map).unwrap(), Vector3::x());
        assert_relative_eq!(link.react_torque_body2(&map).unwrap(), Vector3::y());

        let on_two = link.reaction_in_entity_frame(LinkSide::Two, &map).unwrap();
        let on_one = link.reaction_in_entity_frame(LinkSide::One, &map).unwrap();
        assert_relative_eq!(on_one.force, -on_two.force);
        assert_relative_eq!(on_one.torque, -on_two.torque);
    }

    #[test]
    fn test_conventions_agree() {
        let (base, map) = sample_link();
        let w_frame2 = Wrench::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.5, 0.0));

        let frame2_rel = *base.frame2_rel();
        let frame2_abs = base.frame2_abs(&map).unwrap();

        let mut in_body2 = base.clone().with_convention(ReactionConvention::Body2);
        in_body2.set_reaction(Wrench::new(
            frame2_rel.transform_vector(&w_frame2.force),
            frame2_rel.transform_vector(&w_frame2.torque),
        ));
        let mut in_world = base.clone().with_convention(ReactionConvention::World);
        in_world.set_reaction(Wrench::new(
            frame2_abs.transform_vector(&w_frame2.force),
            frame2_abs.transform_vector(&w_frame2.torque),
        ));

        for link in [&in_body2, &in_world] {
            let w = link.reaction_on_2(&map).unwrap();
            assert_relative_eq!(w.force, w_frame2.force, epsilon = 1e-12);
            assert_relative_eq!(w.torque, w_frame2.torque, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_reaction_from_multipliers() {
        let mut arena = VariablesArena::new();
        let a = arena.add(Variables::diagonal(DVector::from_element(6, 1.0)).unwrap());
        let b = arena.add(Variables::diagonal(DVector::from_element(6, 1.0)).unwrap());
        let mut constraints = vec![
            TwoBodyConstraint::new(&arena, a, b).unwrap(),
            TwoBodyConstraint::new(&arena, a, b).unwrap(),
        ];
        constraints[0].set_multiplier(0.02);
        constraints[1].set_multiplier(-0.01);

        let mut link = Link::new(BodyId::new(1), BodyId::new(2)).with_slots(vec![
            ReactionSlot::new(0, LinkDof::ForceY),
            ReactionSlot::new(1, LinkDof::TorqueZ),
        ]);
        link.set_reaction_from_multipliers(&constraints, 0.01).unwrap();

        let w = link.stored_reaction();
        assert_relative_eq!(w.force, Vector3::new(0.0, -2.0, 0.0));
        assert_relative_eq!(w.torque, Vector3::new(0.0, 0.0, 1.0));

        assert!(matches!(
            link.set_reaction_from_multipliers(&constraints, 0.0),
            Err(LcpError::InvalidStep { .. })
        ));
        assert_eq!(
            link.set_reaction_from_multipliers(&constraints[..1], 0.01),
            Err(LcpError::UnknownConstraint { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_schedule_drives_constraints() {
        let mut arena = VariablesArena::new();
        let a = arena.add(Variables::diagonal(DVector::from_element(1, 1.0)).unwrap());
        let b = arena.add(Variables::diagonal(DVector::from_element(1, 1.0)).unwrap());
        let mut constraints = vec![TwoBodyConstraint::new(&arena, a, b).unwrap()];

        let mut link = Link::new(BodyId::new(1), BodyId::new(2))
            .with_slots(vec![ReactionSlot::new(0, LinkDof::ForceX)])
            .with_schedule(ActivationSchedule::between(1.0, 2.0));
        assert!(!link.is_active());

        link.update_time(1.5);
        assert!(link.is_active());
        link.sync_constraint_activity(&mut constraints).unwrap();
        assert!(constraints[0].state().enabled);

        link.update_time(2.0);
        assert!(!link.is_active());
        link.sync_constraint_activity(&mut constraints).unwrap();
        assert!(!constraints[0].is_active());
    }

    #[derive(Default)]
    struct CountingAssets {
        syncs: Vec<f64>,
    }

    impl LinkAssets for CountingAssets {
        fn sync(&mut self, _link: &Link, time: f64) {
            self.syncs.push(time);
        }
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut link = Link::new(BodyId::new(1), BodyId::new(2));
        let mut assets = CountingAssets::default();

        link.update(0.5, true, &mut assets);
        link.update(0.5, true, &mut assets);
        link.refresh(true, &mut assets);
        assert_eq!(assets.syncs, vec![0.5]);

        // Without asset updates only the time moves
        link.update(0.75, false, &mut assets);
        assert_relative_eq!(link.time(), 0.75);
        assert_eq!(assets.syncs.len(), 1);

        link.refresh(true, &mut assets);
        assert_eq!(assets.syncs, vec![0.5, 0.75]);

        link.update(1.0, true, &mut ());
    }
}
