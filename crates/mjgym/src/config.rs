//! Environment configuration.

use std::path::{Path, PathBuf};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{EnvError, Result};

/// Directory holding the bundled MJCF models.
pub const DEFAULT_ASSETS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets");

/// Settings shared by every environment.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// timestep = 0.01
/// frame_skip = 4
/// seed = 7
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Directory model files are resolved against.
    pub assets_dir: PathBuf,
    /// Physics timestep in seconds. Must be finite and positive.
    pub timestep: f64,
    /// Physics steps per environment step.
    pub frame_skip: u32,
    /// Gravity vector in m/s².
    pub gravity: [f64; 3],
    /// Seed for the environment RNG. Drawn from the OS when unset.
    pub seed: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            timestep: 0.0165,
            frame_skip: 1,
            gravity: [0.0, 0.0, -9.8],
            seed: None,
        }
    }
}

impl EnvConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(EnvError::InvalidConfig(format!(
                "timestep must be finite and positive, got {}",
                self.timestep
            )));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(EnvError::InvalidConfig(format!(
                "gravity must be finite, got {:?}",
                self.gravity
            )));
        }
        Ok(())
    }

    /// Read a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Gravity as a vector.
    pub fn gravity_vector(&self) -> Vector3<f64> {
        Vector3::from(self.gravity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EnvConfig::from_toml_str("frame_skip = 4\nseed = 7\n").unwrap();
        assert_eq!(config.frame_skip, 4);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.timestep, EnvConfig::default().timestep);
        assert_eq!(config.assets_dir, PathBuf::from(DEFAULT_ASSETS_DIR));
    }

    #[test]
    fn test_gravity_and_assets_dir() {
        let config =
            EnvConfig::from_toml_str("assets_dir = \"/tmp/models\"\ngravity = [0.0, 0.0, -1.6]\n")
                .unwrap();
        assert_eq!(config.assets_dir, PathBuf::from("/tmp/models"));
        assert_eq!(config.gravity_vector(), Vector3::new(0.0, 0.0, -1.6));
    }

    #[test]
    fn test_invalid_toml() {
        let err = EnvConfig::from_toml_str("frame_skip = \"many\"").unwrap_err();
        assert!(matches!(err, EnvError::Config(_)));
    }

    #[test]
    fn test_rejects_unusable_timestep() {
        for text in ["timestep = 0.0", "timestep = -0.01", "timestep = nan"] {
            let err = EnvConfig::from_toml_str(text).unwrap_err();
            assert!(matches!(err, EnvError::InvalidConfig(_)), "{text}");
        }
    }

    #[test]
    fn test_rejects_infinite_gravity() {
        let err = EnvConfig::from_toml_str("gravity = [0.0, 0.0, -inf]").unwrap_err();
        assert!(matches!(err, EnvError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EnvConfig::from_file("/nonexistent/mjgym.toml").unwrap_err();
        assert!(matches!(err, EnvError::Io(_)));
    }
}
