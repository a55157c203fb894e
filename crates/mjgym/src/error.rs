//! Error types for the environment layer.

use std::path::PathBuf;

use mjgym_physics::PhysicsError;
use thiserror::Error;

/// Errors that can occur while building or running an environment.
#[derive(Error, Debug)]
pub enum EnvError {
    /// Engine query or command failed.
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    /// Model file does not exist under the assets directory.
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    /// Joint limits are equal, so a relative position is undefined.
    #[error("joint '{joint}' has degenerate limits [{lower}, {upper}]")]
    DegenerateJointLimits {
        /// Joint name.
        joint: String,
        /// Lower limit.
        lower: f64,
        /// Upper limit.
        upper: f64,
    },

    /// No part registered under this name.
    #[error("unknown part: {0}")]
    UnknownPart(String),

    /// No joint registered under this name.
    #[error("unknown joint: {0}")]
    UnknownJoint(String),

    /// Base-pose operation called on a link part.
    #[error("part '{0}' is a link; only base frames can be reset")]
    NotBaseFrame(String),

    /// Action vector has the wrong length.
    #[error("action has {actual} elements, expected {expected}")]
    ActionDimension {
        /// Action dimension of the robot.
        expected: usize,
        /// Length of the supplied action.
        actual: usize,
    },

    /// `step` called before the first `reset`.
    #[error("environment must be reset before stepping")]
    NotReset,

    /// Robot descriptor is unusable.
    #[error("invalid robot descriptor: {0}")]
    InvalidDescriptor(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for environment operations.
pub type Result<T> = std::result::Result<T, EnvError>;
