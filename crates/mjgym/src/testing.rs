//! In-memory engine used by unit tests.

use std::collections::HashMap;
use std::path::Path;

use mjgym_physics::{
    BodyId, BodyInfo, ContactPoint, JointInfo, JointState, JointType, LinkIndex, LinkState,
    LoadFlags, MotorControl, PhysicsEngine, PhysicsError, Pose, DEFAULT_MAX_FORCE,
};
use nalgebra::{UnitQuaternion, Vector3};
use slotmap::SlotMap;

/// Joint of a scripted body.
#[derive(Debug, Clone)]
pub struct FakeJoint {
    pub name: String,
    pub link_name: String,
    pub joint_type: JointType,
    pub lower: f64,
    pub upper: f64,
    pub position: f64,
    pub velocity: f64,
    pub motor: MotorControl,
}

impl FakeJoint {
    pub fn revolute(name: &str, link_name: &str, lower: f64, upper: f64) -> Self {
        Self {
            name: name.to_string(),
            link_name: link_name.to_string(),
            joint_type: JointType::Revolute,
            lower,
            upper,
            position: 0.0,
            velocity: 0.0,
            motor: MotorControl::Velocity {
                target: 0.0,
                max_force: DEFAULT_MAX_FORCE as f64,
            },
        }
    }

    pub fn fixed(name: &str, link_name: &str) -> Self {
        Self {
            joint_type: JointType::Fixed,
            ..Self::revolute(name, link_name, 0.0, 0.0)
        }
    }
}

/// Scripted body.
#[derive(Debug, Clone)]
pub struct FakeBody {
    pub base_name: String,
    pub base_pose: Pose,
    pub base_velocity: Vector3<f64>,
    pub joints: Vec<FakeJoint>,
}

impl FakeBody {
    pub fn new(base_name: &str, joints: Vec<FakeJoint>) -> Self {
        Self {
            base_name: base_name.to_string(),
            base_pose: Pose::default(),
            base_velocity: Vector3::zeros(),
            joints,
        }
    }
}

/// Engine that stores bodies as plain data and integrates joints trivially.
///
/// Position motors reach their target in one step, velocity motors move at
/// their target rate and torques accelerate a unit inertia.
#[derive(Debug)]
pub struct FakeEngine {
    bodies: SlotMap<BodyId, FakeBody>,
    models: HashMap<String, Vec<FakeBody>>,
    pub gravity: Vector3<f64>,
    pub dt: f64,
    pub steps: usize,
    pub resets: usize,
    pub last_flags: Option<LoadFlags>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            bodies: SlotMap::with_key(),
            models: HashMap::new(),
            gravity: Vector3::new(0.0, 0.0, -9.81),
            dt: 0.01,
            steps: 0,
            resets: 0,
            last_flags: None,
        }
    }

    /// Register the bodies `load_mjcf` returns for a file name.
    pub fn with_model(mut self, file: &str, bodies: Vec<FakeBody>) -> Self {
        self.models.insert(file.to_string(), bodies);
        self
    }

    /// Drop a registered model so later loads of it fail.
    pub fn remove_model(&mut self, file: &str) {
        self.models.remove(file);
    }

    pub fn add_body(&mut self, body: FakeBody) -> BodyId {
        self.bodies.insert(body)
    }

    pub fn body(&self, id: BodyId) -> &FakeBody {
        &self.bodies[id]
    }

    fn get(&self, id: BodyId) -> mjgym_physics::Result<&FakeBody> {
        self.bodies.get(id).ok_or(PhysicsError::InvalidBody(id))
    }

    fn joint(&self, id: BodyId, joint: usize) -> mjgym_physics::Result<&FakeJoint> {
        self.get(id)?
            .joints
            .get(joint)
            .ok_or(PhysicsError::InvalidJoint { body: id, joint })
    }

    fn joint_mut(&mut self, id: BodyId, joint: usize) -> mjgym_physics::Result<&mut FakeJoint> {
        self.bodies
            .get_mut(id)
            .ok_or(PhysicsError::InvalidBody(id))?
            .joints
            .get_mut(joint)
            .ok_or(PhysicsError::InvalidJoint { body: id, joint })
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine for FakeEngine {
    fn load_mjcf(&mut self, path: &Path, flags: LoadFlags) -> mjgym_physics::Result<Vec<BodyId>> {
        let file = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or_default()
            .to_string();
        let bodies = self.models.get(&file).cloned().ok_or_else(|| PhysicsError::ModelLoad {
            path: path.to_path_buf(),
            reason: "no such model".to_string(),
        })?;
        self.last_flags = Some(flags);
        Ok(bodies.into_iter().map(|b| self.add_body(b)).collect())
    }

    fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    fn num_joints(&self, body: BodyId) -> mjgym_physics::Result<usize> {
        Ok(self.get(body)?.joints.len())
    }

    fn body_info(&self, body: BodyId) -> mjgym_physics::Result<BodyInfo> {
        Ok(BodyInfo {
            base_name: self.get(body)?.base_name.clone(),
            model_name: "fake".to_string(),
        })
    }

    fn joint_info(&self, body: BodyId, joint: usize) -> mjgym_physics::Result<JointInfo> {
        let j = self.joint(body, joint)?;
        Ok(JointInfo {
            index: joint,
            name: j.name.clone(),
            joint_type: j.joint_type,
            lower_limit: j.lower,
            upper_limit: j.upper,
            max_force: DEFAULT_MAX_FORCE as f64,
            axis: Vector3::x(),
            link_name: j.link_name.clone(),
            parent_link: joint.checked_sub(1),
        })
    }

    fn base_pose(&self, body: BodyId) -> mjgym_physics::Result<Pose> {
        Ok(self.get(body)?.base_pose)
    }

    fn reset_base_pose(&mut self, body: BodyId, pose: Pose) -> mjgym_physics::Result<()> {
        self.bodies
            .get_mut(body)
            .ok_or(PhysicsError::InvalidBody(body))?
            .base_pose = pose;
        Ok(())
    }

    fn base_velocity(
        &self,
        body: BodyId,
    ) -> mjgym_physics::Result<(Vector3<f64>, Vector3<f64>)> {
        Ok((self.get(body)?.base_velocity, Vector3::zeros()))
    }

    fn link_state(
        &self,
        body: BodyId,
        link: usize,
        compute_velocity: bool,
    ) -> mjgym_physics::Result<LinkState> {
        let base = self.get(body)?.base_pose;
        let j = self
            .get(body)?
            .joints
            .get(link)
            .ok_or(PhysicsError::InvalidLink { body, link })?;
        let offset = Vector3::new(j.position, 0.0, (link + 1) as f64);
        Ok(LinkState {
            pose: Pose::new(
                base.position + offset,
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), j.position),
            ),
            linear_velocity: if compute_velocity {
                Vector3::new(j.velocity, 0.0, 0.0)
            } else {
                Vector3::zeros()
            },
            angular_velocity: Vector3::zeros(),
        })
    }

    fn joint_state(&self, body: BodyId, joint: usize) -> mjgym_physics::Result<JointState> {
        let j = self.joint(body, joint)?;
        Ok(JointState {
            position: j.position,
            velocity: j.velocity,
            applied_torque: match j.motor {
                MotorControl::Torque { force } => force,
                _ => 0.0,
            },
        })
    }

    fn reset_joint_state(
        &mut self,
        body: BodyId,
        joint: usize,
        position: f64,
        velocity: f64,
    ) -> mjgym_physics::Result<()> {
        let j = self.joint_mut(body, joint)?;
        j.position = position;
        j.velocity = velocity;
        Ok(())
    }

    fn set_joint_motor(
        &mut self,
        body: BodyId,
        joint: usize,
        control: MotorControl,
    ) -> mjgym_physics::Result<()> {
        self.joint_mut(body, joint)?.motor = control;
        Ok(())
    }

    fn contact_points(
        &self,
        body: BodyId,
        _link: Option<LinkIndex>,
    ) -> mjgym_physics::Result<Vec<ContactPoint>> {
        self.get(body)?;
        Ok(Vec::new())
    }

    fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.gravity = gravity;
    }

    fn set_time_step(&mut self, dt: f64) {
        self.dt = dt;
    }

    fn time_step(&self) -> f64 {
        self.dt
    }

    fn step_simulation(&mut self) {
        let dt = self.dt;
        for body in self.bodies.values_mut() {
            for j in body.joints.iter_mut().filter(|j| j.joint_type != JointType::Fixed) {
                match j.motor {
                    MotorControl::Position { target } => {
                        j.velocity = (target - j.position) / dt;
                        j.position = target;
                    }
                    MotorControl::Velocity { target, max_force } if max_force > 0.0 => {
                        j.velocity = target;
                        j.position += target * dt;
                    }
                    MotorControl::Velocity { .. } => j.position += j.velocity * dt,
                    MotorControl::Torque { force } => {
                        j.velocity += force * dt;
                        j.position += j.velocity * dt;
                    }
                }
            }
        }
        self.steps += 1;
    }

    fn reset_simulation(&mut self) {
        self.bodies.clear();
        self.resets += 1;
    }
}
