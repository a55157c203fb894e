//! Resolution and loading of model files.

use std::path::{Path, PathBuf};

use mjgym_physics::{BodyId, LoadFlags, PhysicsEngine};

use crate::error::{EnvError, Result};

/// Loads MJCF files from an assets directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLoader {
    assets_dir: PathBuf,
}

impl ModelLoader {
    /// Loader resolving file names against `assets_dir`.
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    /// Directory model files are resolved against.
    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// Full path of a model file.
    pub fn model_path(&self, file: &str) -> PathBuf {
        self.assets_dir.join(file)
    }

    /// Load a model and return its top-level body handles in load order.
    pub fn load<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        file: &str,
        self_collision: bool,
    ) -> Result<Vec<BodyId>> {
        let path = self.model_path(file);
        if !path.is_file() {
            return Err(EnvError::ModelNotFound(path));
        }

        let flags = LoadFlags {
            self_collision_exclude_all_parents: self_collision,
        };
        let bodies = engine.load_mjcf(&path, flags)?;
        log::debug!("loaded {} with {} bodies", path.display(), bodies.len());
        Ok(bodies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ASSETS_DIR;
    use crate::testing::{FakeBody, FakeEngine};

    #[test]
    fn test_model_path() {
        let loader = ModelLoader::new("/opt/models");
        assert_eq!(
            loader.model_path("hopper.xml"),
            PathBuf::from("/opt/models/hopper.xml")
        );
    }

    #[test]
    fn test_missing_file_is_checked_before_engine() {
        let mut engine = FakeEngine::new().with_model("ghost.xml", vec![FakeBody::new("ghost", vec![])]);
        let loader = ModelLoader::new(DEFAULT_ASSETS_DIR);
        let err = loader.load(&mut engine, "ghost.xml", false).unwrap_err();
        assert!(matches!(err, EnvError::ModelNotFound(path) if path.ends_with("ghost.xml")));
        assert_eq!(engine.num_bodies(), 0);
    }

    #[test]
    fn test_self_collision_flag_is_forwarded() {
        let mut engine = FakeEngine::new().with_model(
            "inverted_pendulum.xml",
            vec![FakeBody::new("a", vec![]), FakeBody::new("b", vec![])],
        );
        let loader = ModelLoader::new(DEFAULT_ASSETS_DIR);
        let bodies = loader
            .load(&mut engine, "inverted_pendulum.xml", true)
            .unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(
            engine.last_flags,
            Some(LoadFlags {
                self_collision_exclude_all_parents: true
            })
        );
    }

    #[test]
    fn test_engine_rejection_propagates() {
        let mut engine = FakeEngine::new();
        let loader = ModelLoader::new(DEFAULT_ASSETS_DIR);
        let err = loader
            .load(&mut engine, "inverted_pendulum.xml", false)
            .unwrap_err();
        assert!(matches!(
            err,
            EnvError::Physics(mjgym_physics::PhysicsError::ModelLoad { .. })
        ));
    }
}
