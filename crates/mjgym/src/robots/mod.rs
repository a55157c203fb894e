//! Bundled robot models.

mod pendulum;

pub use pendulum::{InvertedDoublePendulum, InvertedPendulum};
