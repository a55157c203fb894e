#![warn(missing_docs)]

//! Body/joint abstraction and RL environments for MJCF robot models.
//!
//! Loading a model yields raw engine body handles. The [`SceneGraph`] walks
//! them and registers every rigid frame as a named [`Part`] and every
//! actuated degree of freedom as a [`Joint`], then picks the robot's root
//! part. [`XmlEnv`] drives the episode lifecycle on top, delegating
//! robot-specific behavior to a [`RobotModel`].
//!
//! # Example
//!
//! ```ignore
//! use mjgym::robots::InvertedPendulum;
//! use mjgym::{EnvConfig, XmlEnv};
//! use mjgym_physics::PhysicsWorld;
//!
//! let mut env = XmlEnv::new(PhysicsWorld::new(), InvertedPendulum::new(), EnvConfig::default())?;
//! let mut obs = env.reset()?;
//! loop {
//!     let step = env.step(&[0.0])?;
//!     obs = step.observation;
//!     if step.done {
//!         break;
//!     }
//! }
//! ```

mod config;
mod env;
mod error;
mod joint;
mod loader;
mod part;
pub mod robots;
mod scene;
mod scene_graph;
mod space;
#[cfg(test)]
mod testing;

pub use config::{EnvConfig, DEFAULT_ASSETS_DIR};
pub use env::{RobotContext, RobotDescriptor, RobotModel, StepResult, XmlEnv};
pub use error::{EnvError, Result};
pub use joint::Joint;
pub use loader::ModelLoader;
pub use part::{Part, PoseView};
pub use scene::{Scene, SinglePlayerScene};
pub use scene_graph::{SceneGraph, DEFAULT_POWER_COEF, IGNORED_JOINT_PREFIX};
pub use space::BoxSpace;
