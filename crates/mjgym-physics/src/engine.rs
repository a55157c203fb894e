//! The physics-engine capability consumed by the environment layer.
//!
//! Everything above this crate talks to the simulator through
//! [`PhysicsEngine`]: load a model, read body/joint metadata, query poses and
//! joint states, and issue motor commands. [`crate::PhysicsWorld`] is the
//! Rapier-backed implementation.

use std::path::Path;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::Result;

slotmap::new_key_type! {
    /// Handle of one loaded top-level body.
    ///
    /// Handles are versioned: once a body is removed (for example by
    /// [`PhysicsEngine::reset_simulation`]) its handle never resolves again.
    pub struct BodyId;
}

/// Selects the frame of a body a query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkIndex {
    /// The body's base frame.
    Base,
    /// An articulated link, numbered like the joint that drives it.
    Link(usize),
}

impl LinkIndex {
    /// Returns the link number, or `None` for the base frame.
    pub fn link(self) -> Option<usize> {
        match self {
            LinkIndex::Base => None,
            LinkIndex::Link(i) => Some(i),
        }
    }
}

/// Flags for [`PhysicsEngine::load_mjcf`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFlags {
    /// Enable collisions between links of the same body, except between a
    /// link and any of its ancestors.
    pub self_collision_exclude_all_parents: bool,
}

/// Position and orientation of a frame in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// World position in meters.
    pub position: Vector3<f64>,
    /// World orientation.
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    /// Pose at `position` with orientation `orientation`.
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// The pose as `[x, y, z, qx, qy, qz, qw]`.
    pub fn to_array(&self) -> [f64; 7] {
        let q = self.orientation.coords;
        [
            self.position.x,
            self.position.y,
            self.position.z,
            q.x,
            q.y,
            q.z,
            q.w,
        ]
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }
}

/// Engine metadata for a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyInfo {
    /// Name of the base link.
    pub base_name: String,
    /// Name of the model the body was loaded from.
    pub model_name: String,
}

/// Kind of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointType {
    /// Single-axis rotation.
    Revolute,
    /// Single-axis translation.
    Prismatic,
    /// Rigid weld, no degree of freedom.
    Fixed,
}

/// Engine metadata for a joint.
#[derive(Debug, Clone, PartialEq)]
pub struct JointInfo {
    /// Joint index within the body.
    pub index: usize,
    /// Joint name.
    pub name: String,
    /// Joint kind.
    pub joint_type: JointType,
    /// Lower position limit (equal to `upper_limit` when unlimited).
    pub lower_limit: f64,
    /// Upper position limit (equal to `lower_limit` when unlimited).
    pub upper_limit: f64,
    /// Maximum motor force or torque.
    pub max_force: f64,
    /// Joint axis in the child link frame.
    pub axis: Vector3<f64>,
    /// Name of the child link the joint drives.
    pub link_name: String,
    /// Parent link, `None` when attached to the base.
    pub parent_link: Option<usize>,
}

/// Generalized state of a single joint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointState {
    /// Joint position (radians for revolute, meters for prismatic).
    pub position: f64,
    /// Joint velocity.
    pub velocity: f64,
    /// Torque or force applied by torque control during the last step.
    pub applied_torque: f64,
}

/// World state of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkState {
    /// Link frame pose.
    pub pose: Pose,
    /// Linear velocity of the link origin (zero unless requested).
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity (zero unless requested).
    pub angular_velocity: Vector3<f64>,
}

/// Motor command for one joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MotorControl {
    /// Servo towards a target position.
    Position {
        /// Target joint position.
        target: f64,
    },
    /// Servo towards a target velocity with a force bound.
    Velocity {
        /// Target joint velocity.
        target: f64,
        /// Maximum force the motor may apply. Zero turns the motor off.
        max_force: f64,
    },
    /// Apply a raw torque (revolute) or force (prismatic) with no gain terms.
    Torque {
        /// Torque or force value.
        force: f64,
    },
}

/// A contact between a body and something else in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactPoint {
    /// Body the query was made for.
    pub body_a: BodyId,
    /// Frame of `body_a` in contact.
    pub link_a: LinkIndex,
    /// Other body.
    pub body_b: BodyId,
    /// Frame of `body_b` in contact.
    pub link_b: LinkIndex,
    /// Contact position on A in world coordinates.
    pub position_on_a: Vector3<f64>,
    /// Contact position on B in world coordinates.
    pub position_on_b: Vector3<f64>,
    /// Contact normal pointing from B to A.
    pub normal_on_b: Vector3<f64>,
    /// Signed separation (negative when penetrating).
    pub distance: f64,
    /// Normal impulse applied during the last step.
    pub normal_impulse: f64,
}

/// Simulation capability: model loading, state queries and motor commands.
///
/// The trait is object safe so environment code can hold `&mut dyn
/// PhysicsEngine`. Joint indices are per body and run from zero to
/// [`num_joints`](PhysicsEngine::num_joints); joint `j` drives link `j`.
pub trait PhysicsEngine {
    /// Load an MJCF file and return the handles of the bodies it created.
    fn load_mjcf(&mut self, path: &Path, flags: LoadFlags) -> Result<Vec<BodyId>>;

    /// Number of bodies currently in the world.
    fn num_bodies(&self) -> usize;

    /// Number of joints (and links) of a body.
    fn num_joints(&self, body: BodyId) -> Result<usize>;

    /// Base link and model names of a body.
    fn body_info(&self, body: BodyId) -> Result<BodyInfo>;

    /// Metadata of a joint.
    fn joint_info(&self, body: BodyId, joint: usize) -> Result<JointInfo>;

    /// World pose of a body's base frame.
    fn base_pose(&self, body: BodyId) -> Result<Pose>;

    /// Teleport a body's base frame, carrying its links along.
    fn reset_base_pose(&mut self, body: BodyId, pose: Pose) -> Result<()>;

    /// Linear and angular velocity of a body's base frame.
    fn base_velocity(&self, body: BodyId) -> Result<(Vector3<f64>, Vector3<f64>)>;

    /// World state of a link. Velocities are only filled in when
    /// `compute_velocity` is set.
    fn link_state(&self, body: BodyId, link: usize, compute_velocity: bool) -> Result<LinkState>;

    /// Position and velocity of a joint.
    fn joint_state(&self, body: BodyId, joint: usize) -> Result<JointState>;

    /// Overwrite a joint's position and velocity outside of simulation.
    fn reset_joint_state(
        &mut self,
        body: BodyId,
        joint: usize,
        position: f64,
        velocity: f64,
    ) -> Result<()>;

    /// Replace the motor command of a joint.
    fn set_joint_motor(&mut self, body: BodyId, joint: usize, control: MotorControl) -> Result<()>;

    /// Contacts involving a body, optionally restricted to one of its frames.
    fn contact_points(&self, body: BodyId, link: Option<LinkIndex>) -> Result<Vec<ContactPoint>>;

    /// Set the gravity vector.
    fn set_gravity(&mut self, gravity: Vector3<f64>);

    /// Set the simulation timestep in seconds.
    fn set_time_step(&mut self, dt: f64);

    /// Current simulation timestep in seconds.
    fn time_step(&self) -> f64;

    /// Advance the simulation by one timestep.
    fn step_simulation(&mut self);

    /// Remove every body. Existing handles become invalid.
    fn reset_simulation(&mut self);
}
