//! Cart-pole balancing robots.

use rand::Rng;

use crate::env::{RobotContext, RobotDescriptor, RobotModel};
use crate::error::Result;

const ROBOT_NAME: &str = "cart";
const SLIDER: &str = "slider";
const HINGE: &str = "hinge";
const HINGE2: &str = "hinge2";

/// Largest initial joint offset on reset.
const RESET_NOISE: f64 = 0.1;

fn push_cart(ctx: &mut RobotContext<'_>, action: &[f64]) -> Result<()> {
    let slider = ctx.scene_graph.joint_mut(SLIDER)?;
    let force = slider.power_coef() * action[0].clamp(-1.0, 1.0);
    slider.set_torque(&mut *ctx.engine, force)
}

fn randomize(ctx: &mut RobotContext<'_>, joint: &str) -> Result<()> {
    let offset = ctx.rng.random_range(-RESET_NOISE..=RESET_NOISE);
    let joint = ctx.scene_graph.joint_mut(joint)?;
    joint.reset_position(&mut *ctx.engine, offset, 0.0)?;
    joint.set_torque(&mut *ctx.engine, 0.0)
}

/// A pole hinged on a cart that slides along a rail.
///
/// Observation: `[x, vx, cos θ, sin θ, θ̇]`. The episode ends once the pole
/// leans more than 0.2 rad.
#[derive(Debug, Clone, Default)]
pub struct InvertedPendulum {
    theta: f64,
}

impl InvertedPendulum {
    /// Model file in the assets directory.
    pub const MODEL_XML: &'static str = "inverted_pendulum.xml";

    /// Pendulum in its rest state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RobotModel for InvertedPendulum {
    fn descriptor(&self) -> RobotDescriptor {
        RobotDescriptor {
            model_xml: Self::MODEL_XML.to_string(),
            robot_name: ROBOT_NAME.to_string(),
            action_dim: 1,
            obs_dim: 5,
            self_collision: false,
        }
    }

    fn robot_specific_reset(&mut self, ctx: &mut RobotContext<'_>) -> Result<()> {
        randomize(ctx, HINGE)
    }

    fn calc_state(&mut self, ctx: &mut RobotContext<'_>) -> Result<Vec<f64>> {
        let (theta, theta_dot) = ctx.scene_graph.joint(HINGE)?.get_state(&*ctx.engine)?;
        let (x, vx) = ctx.scene_graph.joint(SLIDER)?.get_state(&*ctx.engine)?;
        self.theta = theta;
        Ok(vec![x, vx, theta.cos(), theta.sin(), theta_dot])
    }

    fn apply_action(&mut self, ctx: &mut RobotContext<'_>, action: &[f64]) -> Result<()> {
        push_cart(ctx, action)
    }

    fn compute_reward(&self, _state: &[f64], _potential_delta: f64) -> f64 {
        1.0
    }

    fn is_done(&self, _state: &[f64]) -> bool {
        self.theta.abs() > 0.2
    }
}

/// Two poles chained on a cart.
///
/// Observation: `[x, vx, tip_x, cos θ, sin θ, θ̇, cos γ, sin γ, γ̇]` where
/// `tip_x` is the horizontal position of the upper pole. The episode ends
/// once the upper pole's tip drops below 1 m.
#[derive(Debug, Clone, Default)]
pub struct InvertedDoublePendulum {
    tip: [f64; 2],
    speeds: [f64; 2],
}

impl InvertedDoublePendulum {
    /// Model file in the assets directory.
    pub const MODEL_XML: &'static str = "inverted_double_pendulum.xml";

    /// Length of the upper pole.
    const POLE_LENGTH: f64 = 0.6;
    /// Tip height with both poles upright.
    const UPRIGHT_HEIGHT: f64 = 1.2;
    const ALIVE_BONUS: f64 = 10.0;

    /// Pendulum in its rest state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RobotModel for InvertedDoublePendulum {
    fn descriptor(&self) -> RobotDescriptor {
        RobotDescriptor {
            model_xml: Self::MODEL_XML.to_string(),
            robot_name: ROBOT_NAME.to_string(),
            action_dim: 1,
            obs_dim: 9,
            self_collision: false,
        }
    }

    fn robot_specific_reset(&mut self, ctx: &mut RobotContext<'_>) -> Result<()> {
        randomize(ctx, HINGE)?;
        randomize(ctx, HINGE2)
    }

    fn calc_state(&mut self, ctx: &mut RobotContext<'_>) -> Result<Vec<f64>> {
        let engine = &*ctx.engine;
        let (theta, theta_dot) = ctx.scene_graph.joint(HINGE)?.get_state(engine)?;
        let (gamma, gamma_dot) = ctx.scene_graph.joint(HINGE2)?.get_state(engine)?;
        let (x, vx) = ctx.scene_graph.joint(SLIDER)?.get_state(engine)?;

        let pole2 = ctx.scene_graph.part("pole2")?.get_pose(engine)?;
        let tip = pole2.position + pole2.orientation * nalgebra::Vector3::z() * Self::POLE_LENGTH;
        self.tip = [tip.x, tip.z];
        self.speeds = [theta_dot, gamma_dot];

        Ok(vec![
            x,
            vx,
            tip.x,
            theta.cos(),
            theta.sin(),
            theta_dot,
            gamma.cos(),
            gamma.sin(),
            gamma_dot,
        ])
    }

    fn apply_action(&mut self, ctx: &mut RobotContext<'_>, action: &[f64]) -> Result<()> {
        push_cart(ctx, action)
    }

    fn compute_reward(&self, _state: &[f64], _potential_delta: f64) -> f64 {
        let [tip_x, tip_z] = self.tip;
        let dist_penalty = 0.01 * tip_x * tip_x + (tip_z - Self::UPRIGHT_HEIGHT).powi(2);
        let [v1, v2] = self.speeds;
        let vel_penalty = 1e-3 * v1 * v1 + 5e-3 * v2 * v2;
        Self::ALIVE_BONUS - dist_penalty - vel_penalty
    }

    fn is_done(&self, _state: &[f64]) -> bool {
        self.tip[1] <= 1.0
    }
}
