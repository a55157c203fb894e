//! Part and joint registries built from loaded bodies.
//!
//! The builder walks every body and joint in engine order. Names are taken
//! from the engine: a jointless body contributes its base name, every joint
//! contributes the name of the link it drives. Registries are keyed by name
//! and later entries replace earlier ones with the same name.

use std::collections::HashMap;

use mjgym_physics::{BodyId, LinkIndex, PhysicsEngine, FIXED_JOINT_PREFIX};

use crate::error::{EnvError, Result};
use crate::joint::Joint;
use crate::part::Part;

/// Joints whose name starts with this prefix are registered with their motor off.
pub const IGNORED_JOINT_PREFIX: &str = "ignore";

/// Power coefficient given to every joint that is not ignored.
pub const DEFAULT_POWER_COEF: f64 = 100.0;

/// Named parts and joints of the loaded bodies, plus the robot's root part.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    parts: HashMap<String, Part>,
    joints: HashMap<String, usize>,
    ordered_joints: Vec<Joint>,
    root_body: Option<Part>,
}

impl SceneGraph {
    /// Empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build fresh registries for `bodies`.
    pub fn build<E: PhysicsEngine + ?Sized>(
        engine: &mut E,
        bodies: &[BodyId],
        robot_name: &str,
    ) -> Result<Self> {
        let mut graph = Self::new();
        graph.add_to_scene(engine, bodies, robot_name)?;
        Ok(graph)
    }

    /// Register `bodies` on top of the existing entries.
    ///
    /// The root part is the part named `robot_name`. When the first joint of
    /// the first body is reached without one, the first body's base is
    /// registered under `robot_name` and used instead. A jointless first body
    /// becomes the root when nothing else has.
    pub fn add_to_scene<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        bodies: &[BodyId],
        robot_name: &str,
    ) -> Result<()> {
        for (i, &body) in bodies.iter().enumerate() {
            let num_joints = engine.num_joints(body)?;

            if num_joints == 0 {
                let info = engine.body_info(body)?;
                log::debug!("robot part '{}' (body {i}, base)", info.base_name);
                let part = Part::new(&*engine, info.base_name.clone(), i, body, LinkIndex::Base)?;
                if i == 0 && self.root_body.is_none() {
                    self.root_body = Some(part.clone());
                }
                self.parts.insert(info.base_name, part);
                continue;
            }

            for j in 0..num_joints {
                let info = engine.joint_info(body, j)?;
                log::debug!("robot part '{}'", info.link_name);
                log::debug!(
                    "robot joint '{}' limits = {:+.2}..{:+.2} effort = {:.3}",
                    info.name,
                    info.lower_limit,
                    info.upper_limit,
                    info.max_force
                );

                let part = Part::new(&*engine, info.link_name.clone(), i, body, LinkIndex::Link(j))?;
                if info.link_name == robot_name {
                    self.root_body = Some(part.clone());
                }
                self.parts.insert(info.link_name.clone(), part);

                if i == 0 && j == 0 && self.root_body.is_none() {
                    let root = Part::new(&*engine, robot_name, 0, bodies[0], LinkIndex::Base)?;
                    self.parts.insert(robot_name.to_string(), root.clone());
                    self.root_body = Some(root);
                }

                if info.name.starts_with(FIXED_JOINT_PREFIX) {
                    continue;
                }

                let mut joint = Joint::new(&*engine, info.name.clone(), i, body, j)?;
                if info.name.starts_with(IGNORED_JOINT_PREFIX) {
                    joint.disable_motor(engine)?;
                } else {
                    joint.set_power_coef(DEFAULT_POWER_COEF);
                }
                self.joints.insert(info.name, self.ordered_joints.len());
                self.ordered_joints.push(joint);
            }
        }
        Ok(())
    }

    /// All parts by name.
    pub fn parts(&self) -> &HashMap<String, Part> {
        &self.parts
    }

    /// Look up a part.
    pub fn part(&self, name: &str) -> Result<&Part> {
        self.parts
            .get(name)
            .ok_or_else(|| EnvError::UnknownPart(name.to_string()))
    }

    /// Look up a joint.
    pub fn joint(&self, name: &str) -> Result<&Joint> {
        self.joints
            .get(name)
            .map(|&i| &self.ordered_joints[i])
            .ok_or_else(|| EnvError::UnknownJoint(name.to_string()))
    }

    /// Look up a joint for commanding.
    pub fn joint_mut(&mut self, name: &str) -> Result<&mut Joint> {
        match self.joints.get(name) {
            Some(&i) => Ok(&mut self.ordered_joints[i]),
            None => Err(EnvError::UnknownJoint(name.to_string())),
        }
    }

    /// Joints by name, the latest registration for each name.
    pub fn joints(&self) -> impl Iterator<Item = (&str, &Joint)> {
        self.joints
            .iter()
            .map(|(name, &i)| (name.as_str(), &self.ordered_joints[i]))
    }

    /// Number of distinct joint names.
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Joints in encounter order. Index `k` is driven by action element `k`.
    pub fn ordered_joints(&self) -> &[Joint] {
        &self.ordered_joints
    }

    /// Joints in encounter order, for commanding.
    pub fn ordered_joints_mut(&mut self) -> &mut [Joint] {
        &mut self.ordered_joints
    }

    /// The robot's root part.
    pub fn root_body(&self) -> Option<&Part> {
        self.root_body.as_ref()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty() && self.ordered_joints.is_empty()
    }
}
