//! Gym-style environment over an MJCF robot.

use mjgym_physics::PhysicsEngine;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::EnvConfig;
use crate::error::{EnvError, Result};
use crate::loader::ModelLoader;
use crate::scene::{Scene, SinglePlayerScene};
use crate::scene_graph::SceneGraph;
use crate::space::BoxSpace;

/// Static description of a robot model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotDescriptor {
    /// Model file name, relative to the assets directory.
    pub model_xml: String,
    /// Name of the robot's root part.
    pub robot_name: String,
    /// Action vector length.
    pub action_dim: usize,
    /// Observation vector length.
    pub obs_dim: usize,
    /// Load with self collision between non-adjacent links.
    pub self_collision: bool,
}

impl RobotDescriptor {
    fn validate(&self) -> Result<()> {
        if self.model_xml.is_empty() {
            return Err(EnvError::InvalidDescriptor("model_xml is empty".to_string()));
        }
        if self.robot_name.is_empty() {
            return Err(EnvError::InvalidDescriptor("robot_name is empty".to_string()));
        }
        Ok(())
    }
}

/// What a robot sees of the environment while resetting and stepping.
pub struct RobotContext<'a> {
    /// The simulation.
    pub engine: &'a mut dyn PhysicsEngine,
    /// Parts and joints of the current episode.
    pub scene_graph: &'a mut SceneGraph,
    /// Environment RNG.
    pub rng: &'a mut StdRng,
}

/// Robot-specific behavior plugged into [`XmlEnv`].
pub trait RobotModel {
    /// Model file, root name and space sizes.
    fn descriptor(&self) -> RobotDescriptor;

    /// Place the robot in its initial state after the model is loaded.
    fn robot_specific_reset(&mut self, ctx: &mut RobotContext<'_>) -> Result<()>;

    /// Observation vector for the current state.
    fn calc_state(&mut self, ctx: &mut RobotContext<'_>) -> Result<Vec<f64>>;

    /// Potential of the current state. Rewards default to its change per step.
    fn calc_potential(&self) -> f64 {
        0.0
    }

    /// Apply an action. By default each element is clamped to `[-1, 1]`,
    /// scaled by the joint's power coefficient and applied as a torque to the
    /// joint at the same position in encounter order.
    fn apply_action(&mut self, ctx: &mut RobotContext<'_>, action: &[f64]) -> Result<()> {
        for (joint, &a) in ctx.scene_graph.ordered_joints_mut().iter_mut().zip(action) {
            let torque = joint.power_coef() * a.clamp(-1.0, 1.0);
            joint.set_torque(&mut *ctx.engine, torque)?;
        }
        Ok(())
    }

    /// Reward for a step.
    fn compute_reward(&self, _state: &[f64], potential_delta: f64) -> f64 {
        potential_delta
    }

    /// Whether the episode is over.
    fn is_done(&self, _state: &[f64]) -> bool {
        false
    }

    /// Scene created on the first reset.
    fn create_single_player_scene(&self, config: &EnvConfig) -> Box<dyn Scene> {
        Box::new(SinglePlayerScene::from_config(config))
    }
}

/// Outcome of one environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Observation after the step.
    pub observation: Vec<f64>,
    /// Reward for the step.
    pub reward: f64,
    /// Whether the episode ended.
    pub done: bool,
}

/// Environment for an MJCF robot.
///
/// Each [`reset`](Self::reset) restarts the scene, reloads the model and
/// rebuilds the scene graph, so parts and joints from a previous episode are
/// never reused.
pub struct XmlEnv<E: PhysicsEngine, R: RobotModel> {
    engine: E,
    robot: R,
    descriptor: RobotDescriptor,
    config: EnvConfig,
    loader: ModelLoader,
    scene: Option<Box<dyn Scene>>,
    scene_graph: SceneGraph,
    action_space: BoxSpace,
    observation_space: BoxSpace,
    rng: StdRng,
    seed: u64,
    frame: u64,
    reward: f64,
    done: bool,
    potential: f64,
    ready: bool,
}

impl<E: PhysicsEngine, R: RobotModel> XmlEnv<E, R> {
    /// Create an environment. Nothing is loaded until the first reset.
    pub fn new(engine: E, robot: R, config: EnvConfig) -> Result<Self> {
        config.validate()?;
        let descriptor = robot.descriptor();
        descriptor.validate()?;

        let mut env = Self {
            engine,
            loader: ModelLoader::new(config.assets_dir.clone()),
            action_space: BoxSpace::uniform(descriptor.action_dim, -1.0, 1.0),
            observation_space: BoxSpace::uniform(
                descriptor.obs_dim,
                f64::NEG_INFINITY,
                f64::INFINITY,
            ),
            robot,
            descriptor,
            scene: None,
            scene_graph: SceneGraph::new(),
            rng: StdRng::seed_from_u64(0),
            seed: 0,
            frame: 0,
            reward: 0.0,
            done: false,
            potential: 0.0,
            ready: false,
            config,
        };
        env.seed(env.config.seed);
        Ok(env)
    }

    /// Reseed the environment RNG and return the seed used.
    pub fn seed(&mut self, seed: Option<u64>) -> u64 {
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
        seed
    }

    /// Start a new episode and return the first observation.
    ///
    /// A failed reset leaves the environment unready: the registries are
    /// emptied and [`step`](Self::step) returns [`EnvError::NotReset`] until a
    /// later reset succeeds.
    pub fn reset(&mut self) -> Result<Vec<f64>> {
        self.ready = false;
        self.scene_graph = SceneGraph::new();

        let scene = self
            .scene
            .get_or_insert_with(|| self.robot.create_single_player_scene(&self.config));
        if !scene.multiplayer() {
            scene.episode_restart(&mut self.engine);
        }

        self.frame = 0;
        self.done = false;
        self.reward = 0.0;

        let bodies = self.loader.load(
            &mut self.engine,
            &self.descriptor.model_xml,
            self.descriptor.self_collision,
        )?;
        self.scene_graph =
            SceneGraph::build(&mut self.engine, &bodies, &self.descriptor.robot_name)?;
        log::info!(
            "reset {}: {} parts, {} joints",
            self.descriptor.model_xml,
            self.scene_graph.parts().len(),
            self.scene_graph.ordered_joints().len()
        );

        let mut ctx = RobotContext {
            engine: &mut self.engine,
            scene_graph: &mut self.scene_graph,
            rng: &mut self.rng,
        };
        self.robot.robot_specific_reset(&mut ctx)?;
        let state = self.robot.calc_state(&mut ctx)?;
        self.potential = self.robot.calc_potential();
        self.ready = true;
        Ok(state)
    }

    /// Apply an action, advance the scene and score the result.
    pub fn step(&mut self, action: &[f64]) -> Result<StepResult> {
        if !self.ready {
            return Err(EnvError::NotReset);
        }
        if action.len() != self.descriptor.action_dim {
            return Err(EnvError::ActionDimension {
                expected: self.descriptor.action_dim,
                actual: action.len(),
            });
        }

        let mut ctx = RobotContext {
            engine: &mut self.engine,
            scene_graph: &mut self.scene_graph,
            rng: &mut self.rng,
        };
        self.robot.apply_action(&mut ctx, action)?;

        if let Some(scene) = self.scene.as_mut() {
            scene.global_step(&mut self.engine);
        }

        let mut ctx = RobotContext {
            engine: &mut self.engine,
            scene_graph: &mut self.scene_graph,
            rng: &mut self.rng,
        };
        let state = self.robot.calc_state(&mut ctx)?;
        let potential = self.robot.calc_potential();
        let reward = self
            .robot
            .compute_reward(&state, potential - self.potential);
        self.potential = potential;
        self.reward = reward;
        self.done = self.robot.is_done(&state);
        self.frame += 1;

        Ok(StepResult {
            observation: state,
            reward,
            done: self.done,
        })
    }

    /// Rendering is not supported.
    pub fn render(&self) {}

    /// On-screen display is not supported.
    pub fn hud(&self, _state: &[f64], _action: &[f64], _done: bool) {}

    /// Camera control is not supported.
    pub fn camera_move_and_look_at(&mut self, _i: f64, _j: f64, _k: f64, _x: f64, _y: f64, _z: f64) {}

    /// Parts and joints of the current episode.
    pub fn scene_graph(&self) -> &SceneGraph {
        &self.scene_graph
    }

    /// The simulation.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The simulation, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The robot model.
    pub fn robot(&self) -> &R {
        &self.robot
    }

    /// The robot's descriptor.
    pub fn descriptor(&self) -> &RobotDescriptor {
        &self.descriptor
    }

    /// Environment configuration.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Valid actions: `[-1, 1]` per dimension.
    pub fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    /// Observations: unbounded per dimension.
    pub fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    /// Seed the RNG was last seeded with.
    pub fn current_seed(&self) -> u64 {
        self.seed
    }

    /// Steps since the last reset.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Potential after the last reset or step.
    pub fn potential(&self) -> f64 {
        self.potential
    }

    /// Reward of the last step.
    pub fn reward(&self) -> f64 {
        self.reward
    }

    /// Whether the last step ended the episode.
    pub fn done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBody, FakeEngine, FakeJoint};
    use mjgym_physics::{MotorControl, PhysicsError};
    use std::collections::BTreeSet;

    /// Arm with one actuated joint whose potential is the joint position.
    struct Reacher {
        model: String,
        potential: f64,
        resets: usize,
    }

    impl Reacher {
        fn new() -> Self {
            Self {
                model: "inverted_pendulum.xml".to_string(),
                potential: 0.0,
                resets: 0,
            }
        }
    }

    impl RobotModel for Reacher {
        fn descriptor(&self) -> RobotDescriptor {
            RobotDescriptor {
                model_xml: self.model.clone(),
                robot_name: "arm".to_string(),
                action_dim: 1,
                obs_dim: 2,
                self_collision: false,
            }
        }

        fn robot_specific_reset(&mut self, ctx: &mut RobotContext<'_>) -> Result<()> {
            let offset = ctx.rng.random_range(-0.1..0.1);
            ctx.scene_graph
                .joint_mut("shoulder")?
                .reset_position(&mut *ctx.engine, offset, 0.0)?;
            self.resets += 1;
            Ok(())
        }

        fn calc_state(&mut self, ctx: &mut RobotContext<'_>) -> Result<Vec<f64>> {
            let (position, velocity) = ctx.scene_graph.joint("shoulder")?.get_state(&*ctx.engine)?;
            self.potential = position;
            Ok(vec![position, velocity])
        }

        fn calc_potential(&self) -> f64 {
            self.potential
        }

        fn is_done(&self, state: &[f64]) -> bool {
            state[0] > 10.0
        }
    }

    fn arm_engine() -> FakeEngine {
        FakeEngine::default().with_model(
            "inverted_pendulum.xml",
            vec![
                FakeBody::new(
                    "anchor",
                    vec![
                        FakeJoint::revolute("shoulder", "arm", -3.0, 3.0),
                        FakeJoint::fixed("jointfix_0_1", "hand"),
                    ],
                ),
                FakeBody::new("floor", vec![]),
            ],
        )
    }

    fn config() -> EnvConfig {
        EnvConfig {
            seed: Some(42),
            frame_skip: 2,
            ..EnvConfig::default()
        }
    }

    #[test]
    fn test_spaces_from_descriptor() {
        let env = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        assert_eq!(env.action_space(), &BoxSpace::uniform(1, -1.0, 1.0));
        assert_eq!(env.observation_space().dim(), 2);
        assert!(env.observation_space().high[0].is_infinite());
        assert_eq!(env.current_seed(), 42);
    }

    #[test]
    fn test_invalid_descriptor() {
        let mut robot = Reacher::new();
        robot.model.clear();
        assert!(matches!(
            XmlEnv::new(arm_engine(), robot, config()),
            Err(EnvError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_zero_timestep_rejected() {
        let config = EnvConfig {
            timestep: 0.0,
            ..config()
        };
        assert!(matches!(
            XmlEnv::new(arm_engine(), Reacher::new(), config),
            Err(EnvError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_step_before_reset() {
        let mut env = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        assert!(matches!(env.step(&[0.0]), Err(EnvError::NotReset)));
    }

    #[test]
    fn test_reset_builds_scene_graph() {
        let mut env = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), 2);
        assert!(obs[0].abs() <= 0.1);

        let graph = env.scene_graph();
        assert_eq!(graph.root_body().unwrap().name(), "arm");
        assert_eq!(graph.ordered_joints().len(), 1);
        assert!(!graph.joint("shoulder").unwrap().motor_enabled());
        assert_eq!(env.frame(), 0);
        assert_eq!(env.potential(), obs[0]);
        assert_eq!(env.engine().resets, 1);
    }

    #[test]
    fn test_step_applies_scaled_torque_and_rewards_potential() {
        let mut env = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        let obs = env.reset().unwrap();
        let start = env.potential();

        let result = env.step(&[2.0]).unwrap();
        let body = env.scene_graph().joint("shoulder").unwrap().body();
        assert_eq!(
            env.engine().body(body).joints[0].motor,
            MotorControl::Torque { force: 100.0 }
        );
        assert_eq!(env.engine().steps, 2);
        assert_eq!(env.frame(), 1);
        assert!(result.observation[0] > obs[0]);
        assert!((result.reward - (result.observation[0] - start)).abs() < 1e-12);
        assert_eq!(env.reward(), result.reward);
        assert!(!result.done);
    }

    #[test]
    fn test_action_dimension_checked() {
        let mut env = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        env.reset().unwrap();
        assert!(matches!(
            env.step(&[0.0, 1.0]),
            Err(EnvError::ActionDimension {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_reset_twice_gives_same_registries() {
        let mut env = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        env.reset().unwrap();
        let names = |g: &SceneGraph| -> (BTreeSet<String>, Vec<String>) {
            (
                g.parts().keys().cloned().collect(),
                g.ordered_joints().iter().map(|j| j.name().to_string()).collect(),
            )
        };
        let first = names(env.scene_graph());
        env.reset().unwrap();
        assert_eq!(names(env.scene_graph()), first);
        assert_eq!(env.engine().num_bodies(), 2);
        assert_eq!(env.robot().resets, 2);
    }

    #[test]
    fn test_same_seed_same_reset() {
        let mut a = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        let mut b = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        assert_eq!(a.reset().unwrap(), b.reset().unwrap());

        assert_eq!(a.seed(Some(7)), 7);
        b.seed(Some(7));
        assert_eq!(a.reset().unwrap(), b.reset().unwrap());
    }

    #[test]
    fn test_failed_reset_requires_new_reset() {
        let mut env = XmlEnv::new(arm_engine(), Reacher::new(), config()).unwrap();
        env.reset().unwrap();
        env.step(&[0.5]).unwrap();

        env.engine_mut().remove_model("inverted_pendulum.xml");
        assert!(matches!(
            env.reset(),
            Err(EnvError::Physics(PhysicsError::ModelLoad { .. }))
        ));
        assert!(env.scene_graph().is_empty());
        assert!(matches!(env.step(&[0.0]), Err(EnvError::NotReset)));
    }
}
