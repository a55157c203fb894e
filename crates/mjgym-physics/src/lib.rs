#![warn(missing_docs)]

//! MJCF articulated-body simulation for mjgym using Rapier3d.
//!
//! This crate loads MuJoCo-style XML robot models into a physics world and
//! exposes them through the [`PhysicsEngine`] trait: body and joint metadata,
//! poses, joint states, motor commands and contacts.
//!
//! # Features
//!
//! - MJCF subset parsing (bodies, hinge/slide/free joints, primitive geoms)
//! - Articulations built from impulse joints, one rigid body per link
//! - Position, velocity and raw torque joint control
//! - MuJoCo-style contact masks and optional self collision
//!
//! # Example
//!
//! ```ignore
//! use mjgym_physics::{LoadFlags, PhysicsEngine, PhysicsWorld};
//!
//! let mut world = PhysicsWorld::new();
//! let bodies = world.load_mjcf("assets/inverted_pendulum.xml".as_ref(), LoadFlags::default())?;
//!
//! for j in 0..world.num_joints(bodies[0])? {
//!     println!("{}", world.joint_info(bodies[0], j)?.name);
//! }
//! world.step_simulation();
//! ```

pub mod articulation;
mod colliders;
mod engine;
mod error;
mod joints;
pub mod mjcf;
mod world;

pub use articulation::{FIXED_JOINT_PREFIX, WORLD_BODY_NAME};
pub use engine::{
    BodyId, BodyInfo, ContactPoint, JointInfo, JointState, JointType, LinkIndex, LinkState,
    LoadFlags, MotorControl, PhysicsEngine, Pose,
};
pub use error::{MjcfError, PhysicsError, Result};
pub use joints::DEFAULT_MAX_FORCE;
pub use world::PhysicsWorld;
