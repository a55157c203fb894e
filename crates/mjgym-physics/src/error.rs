//! Error types for MJCF loading and physics simulation.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::BodyId;

/// Errors that can occur while parsing an MJCF document.
#[derive(Error, Debug)]
pub enum MjcfError {
    /// XML parsing error.
    #[error("XML parse error: {0}")]
    XmlParse(#[from] roxmltree::Error),

    /// The document root is not `<mujoco>`.
    #[error("root element must be <mujoco>, found <{0}>")]
    NotMujoco(String),

    /// Missing required attribute.
    #[error("missing required attribute: {attribute} on <{element}>")]
    MissingAttribute {
        /// The missing attribute name.
        attribute: &'static str,
        /// The element that should have the attribute.
        element: String,
    },

    /// Invalid attribute value.
    #[error("invalid value for {attribute} on <{element}>: {message}")]
    InvalidAttribute {
        /// The attribute with the invalid value.
        attribute: &'static str,
        /// The element containing the attribute.
        element: String,
        /// Description of why the value is invalid.
        message: String,
    },

    /// Unknown or unsupported joint type.
    #[error("unknown joint type: {0}")]
    UnknownJointType(String),

    /// Unknown geom type.
    #[error("unknown geom type: {0}")]
    UnknownGeomType(String),

    /// A joint type that is only valid on a top-level body.
    #[error("joint '{joint}' of type free is only allowed on a top-level body (found in '{body}')")]
    MisplacedFreeJoint {
        /// Offending joint.
        joint: String,
        /// Body that carries it.
        body: String,
    },
}

/// Errors that can occur during physics simulation.
#[derive(Error, Debug)]
pub enum PhysicsError {
    /// A model file could not be loaded.
    #[error("failed to load model {}: {reason}", path.display())]
    ModelLoad {
        /// Path that was requested.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },

    /// The model description was rejected.
    #[error(transparent)]
    Mjcf(#[from] MjcfError),

    /// Body handle does not exist in this world (removed by a reset or never loaded).
    #[error("body handle {0:?} does not exist in this world")]
    InvalidBody(BodyId),

    /// Joint index out of range for a body.
    #[error("body {body:?} has no joint {joint}")]
    InvalidJoint {
        /// Body handle.
        body: BodyId,
        /// Requested joint index.
        joint: usize,
    },

    /// Link index out of range for a body.
    #[error("body {body:?} has no link {link}")]
    InvalidLink {
        /// Body handle.
        body: BodyId,
        /// Requested link index.
        link: usize,
    },

    /// I/O error while reading a model file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
