//! Scenes own the simulation clock and episode restarts.

use mjgym_physics::PhysicsEngine;
use nalgebra::Vector3;

use crate::config::EnvConfig;

/// Simulation context shared by the robots of an environment.
pub trait Scene {
    /// Whether several environments share this scene. Multiplayer scenes are
    /// not restarted by individual environments.
    fn multiplayer(&self) -> bool {
        false
    }

    /// Clear the world and reapply the scene settings.
    fn episode_restart(&mut self, engine: &mut dyn PhysicsEngine);

    /// Advance the simulation by one environment step.
    fn global_step(&mut self, engine: &mut dyn PhysicsEngine);
}

/// Scene holding a single robot.
#[derive(Debug, Clone, PartialEq)]
pub struct SinglePlayerScene {
    /// Gravity vector in m/s².
    pub gravity: Vector3<f64>,
    /// Physics timestep in seconds.
    pub timestep: f64,
    /// Physics steps per environment step.
    pub frame_skip: u32,
}

impl SinglePlayerScene {
    /// Scene with the given physics settings.
    pub fn new(gravity: Vector3<f64>, timestep: f64, frame_skip: u32) -> Self {
        Self {
            gravity,
            timestep,
            frame_skip,
        }
    }

    /// Scene using the settings of a configuration.
    pub fn from_config(config: &EnvConfig) -> Self {
        Self::new(config.gravity_vector(), config.timestep, config.frame_skip)
    }

    /// Simulated seconds per environment step.
    pub fn dt(&self) -> f64 {
        self.timestep * self.frame_skip as f64
    }
}

impl Scene for SinglePlayerScene {
    fn episode_restart(&mut self, engine: &mut dyn PhysicsEngine) {
        engine.reset_simulation();
        engine.set_gravity(self.gravity);
        engine.set_time_step(self.timestep);
    }

    fn global_step(&mut self, engine: &mut dyn PhysicsEngine) {
        for _ in 0..self.frame_skip {
            engine.step_simulation();
        }
    }
}
