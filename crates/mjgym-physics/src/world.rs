//! Physics world management using Rapier3d.

use std::path::Path;

use nalgebra::{Isometry3, Point3, Vector3};
use rapier3d::dynamics::{
    CCDSolver, ImpulseJointHandle, ImpulseJointSet, IntegrationParameters, IslandManager,
    MultibodyJointSet, RigidBodyBuilder, RigidBodyHandle, RigidBodySet, RigidBodyType,
};
use rapier3d::geometry::{BroadPhaseMultiSap, ColliderSet, NarrowPhase};
use rapier3d::pipeline::{PhysicsPipeline, QueryPipeline};
use rapier3d::prelude::MassProperties;
use slotmap::SlotMap;

use crate::articulation::{articulate, BaseKind, BodySpec};
use crate::colliders::{geom_to_collider, CollisionFilter, LinkOwner};
use crate::engine::{
    BodyId, BodyInfo, ContactPoint, JointInfo, JointState, JointType, LinkIndex, LinkState,
    LoadFlags, MotorControl, PhysicsEngine, Pose,
};
use crate::error::{PhysicsError, Result};
use crate::joints::{
    apply_motor, child_pose, joint_position, joint_velocity, link_joint, world_axis,
    DEFAULT_MAX_FORCE,
};
use crate::mjcf::parse_mjcf;

/// Mass given to links that carry no geoms (intermediate links of multi-joint bodies).
const PLACEHOLDER_MASS: f32 = 0.001;
/// Principal inertia given to placeholder links.
const PLACEHOLDER_INERTIA: f32 = 1.0e-6;

/// A link of a loaded body and the joint that drives it.
#[derive(Debug, Clone)]
struct LinkRecord {
    name: String,
    joint_name: String,
    joint_type: JointType,
    parent: Option<usize>,
    handle: RigidBodyHandle,
    joint: ImpulseJointHandle,
    frame1: Isometry3<f32>,
    frame2: Isometry3<f32>,
    axis: Vector3<f64>,
    limits: Option<(f64, f64)>,
    /// Torque (or force) applied every step while under torque control.
    effort: f64,
}

/// A loaded top-level body.
#[derive(Debug, Clone)]
struct LoadedBody {
    base_name: String,
    model_name: String,
    base: RigidBodyHandle,
    links: Vec<LinkRecord>,
}

impl LoadedBody {
    fn link(&self, id: BodyId, link: usize) -> Result<&LinkRecord> {
        self.links
            .get(link)
            .ok_or(PhysicsError::InvalidLink { body: id, link })
    }

    fn joint(&self, id: BodyId, joint: usize) -> Result<&LinkRecord> {
        self.links
            .get(joint)
            .ok_or(PhysicsError::InvalidJoint { body: id, joint })
    }

    fn parent_handle(&self, link: &LinkRecord) -> RigidBodyHandle {
        link.parent.map_or(self.base, |p| self.links[p].handle)
    }
}

/// Physics simulation world.
pub struct PhysicsWorld {
    // Rapier components
    pipeline: PhysicsPipeline,
    gravity: Vector3<f32>,
    integration_params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    // Mapping from engine handles to Rapier
    loaded: SlotMap<BodyId, LoadedBody>,
    filter: CollisionFilter,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    /// Create an empty world with Z-up gravity and a 1/240 s timestep.
    pub fn new() -> Self {
        let mut integration_params = IntegrationParameters::default();
        integration_params.dt = 1.0 / 240.0;
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: Vector3::new(0.0, 0.0, -9.81),
            integration_params,
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            loaded: SlotMap::with_key(),
            filter: CollisionFilter::default(),
        }
    }

    /// Load an MJCF document from a string.
    pub fn load_mjcf_str(&mut self, xml: &str, flags: LoadFlags) -> Result<Vec<BodyId>> {
        let model = parse_mjcf(xml)?;
        let specs = articulate(&model);
        log::debug!(
            "loading model '{}' with {} bodies (self collision: {})",
            model.name,
            specs.len(),
            flags.self_collision_exclude_all_parents
        );
        Ok(specs
            .iter()
            .map(|spec| self.insert_body(spec, flags))
            .collect())
    }

    fn insert_body(&mut self, spec: &BodySpec, flags: LoadFlags) -> BodyId {
        let base_type = match spec.base.kind {
            BaseKind::Fixed => RigidBodyType::Fixed,
            BaseKind::Floating => RigidBodyType::Dynamic,
        };
        let base_pose: Isometry3<f32> = spec.base.pose.cast::<f32>();
        let base = self
            .bodies
            .insert(RigidBodyBuilder::new(base_type).position(base_pose).build());
        for geom in &spec.base.geoms {
            self.colliders
                .insert_with_parent(geom_to_collider(geom).build(), base, &mut self.bodies);
        }

        let mut poses: Vec<Isometry3<f32>> = Vec::with_capacity(spec.links.len());
        let mut links: Vec<LinkRecord> = Vec::with_capacity(spec.links.len());
        for link in &spec.links {
            let (parent_handle, parent_pose) = match link.parent {
                None => (base, base_pose),
                Some(p) => (links[p].handle, poses[p]),
            };
            let frame1: Isometry3<f32> = link.parent_frame.cast::<f32>();
            let frame2: Isometry3<f32> = link.child_frame.cast::<f32>();
            let pose = child_pose(&parent_pose, &frame1, &frame2, link.joint_type, 0.0);

            let mut builder = RigidBodyBuilder::dynamic().position(pose);
            if link.geoms.is_empty() {
                builder = builder.additional_mass_properties(MassProperties::new(
                    Point3::origin(),
                    PLACEHOLDER_MASS,
                    Vector3::repeat(PLACEHOLDER_INERTIA),
                ));
            }
            let handle = self.bodies.insert(builder.build());
            for geom in &link.geoms {
                self.colliders
                    .insert_with_parent(geom_to_collider(geom).build(), handle, &mut self.bodies);
            }

            let joint = self
                .impulse_joints
                .insert(parent_handle, handle, link_joint(link), true);

            poses.push(pose);
            links.push(LinkRecord {
                name: link.name.clone(),
                joint_name: link.joint_name.clone(),
                joint_type: link.joint_type,
                parent: link.parent,
                handle,
                joint,
                frame1,
                frame2,
                axis: link.axis,
                limits: link.limits,
                effort: 0.0,
            });
        }

        let owners: Vec<(RigidBodyHandle, LinkIndex, Vec<RigidBodyHandle>)> =
            std::iter::once((base, LinkIndex::Base, Vec::new()))
                .chain(links.iter().enumerate().map(|(i, link)| {
                    let mut ancestors = vec![base];
                    let mut cursor = link.parent;
                    while let Some(p) = cursor {
                        ancestors.push(links[p].handle);
                        cursor = links[p].parent;
                    }
                    (link.handle, LinkIndex::Link(i), ancestors)
                }))
                .collect();

        let id = self.loaded.insert(LoadedBody {
            base_name: spec.base.name.clone(),
            model_name: spec.model_name.clone(),
            base,
            links,
        });

        for (handle, link, ancestors) in owners {
            self.filter.owners.insert(
                handle,
                LinkOwner {
                    body: id,
                    link,
                    ancestors,
                    self_collision: flags.self_collision_exclude_all_parents,
                },
            );
        }

        id
    }

    fn body(&self, id: BodyId) -> Result<&LoadedBody> {
        self.loaded.get(id).ok_or(PhysicsError::InvalidBody(id))
    }

    fn body_mut(&mut self, id: BodyId) -> Result<&mut LoadedBody> {
        self.loaded.get_mut(id).ok_or(PhysicsError::InvalidBody(id))
    }

    /// Current `(position, velocity)` of every joint of a body.
    fn joint_coordinates(&self, id: BodyId) -> Result<Vec<(f64, f64)>> {
        let body = self.body(id)?;
        Ok(body
            .links
            .iter()
            .map(|link| {
                let parent = &self.bodies[body.parent_handle(link)];
                let child = &self.bodies[link.handle];
                (
                    joint_position(
                        link.joint_type,
                        parent.position(),
                        child.position(),
                        &link.frame1,
                        &link.frame2,
                    ),
                    joint_velocity(link.joint_type, parent, child, &link.frame1, &link.frame2),
                )
            })
            .collect())
    }

    /// Place the links selected by `moved` according to `coords`, parents first.
    fn place_links(&mut self, id: BodyId, coords: &[(f64, f64)], moved: &[bool]) -> Result<()> {
        let body = self.loaded.get(id).ok_or(PhysicsError::InvalidBody(id))?;
        for (i, link) in body.links.iter().enumerate() {
            if !moved[i] {
                continue;
            }
            let (q, qdot) = coords[i];
            let parent = &self.bodies[body.parent_handle(link)];
            let parent_pose = *parent.position();
            let parent_linvel = *parent.linvel();
            let parent_angvel = *parent.angvel();
            let parent_com = *parent.center_of_mass();

            let child = &self.bodies[link.handle];
            let local_com = child.position().inverse_transform_point(child.center_of_mass());

            let pose = child_pose(&parent_pose, &link.frame1, &link.frame2, link.joint_type, q);
            let com = pose * local_com;
            let axis = world_axis(&parent_pose, &link.frame1);
            let anchor = Point3::from((parent_pose * link.frame1).translation.vector);
            let qdot = qdot as f32;

            let carried = parent_linvel + parent_angvel.cross(&(com - parent_com));
            let (linvel, angvel) = match link.joint_type {
                JointType::Revolute => {
                    let spin = axis * qdot;
                    (carried + spin.cross(&(com - anchor)), parent_angvel + spin)
                }
                JointType::Prismatic => (carried + axis * qdot, parent_angvel),
                JointType::Fixed => (carried, parent_angvel),
            };

            let child = &mut self.bodies[link.handle];
            child.set_position(pose, true);
            child.set_linvel(linvel, true);
            child.set_angvel(angvel, true);
        }
        Ok(())
    }

    /// Apply stored torque-control efforts for the coming step.
    fn apply_efforts(&mut self) {
        for (_, rb) in self.bodies.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
        for body in self.loaded.values() {
            for link in body.links.iter().filter(|l| l.effort != 0.0) {
                let parent_handle = body.parent_handle(link);
                let parent_pose = *self.bodies[parent_handle].position();
                let axis = world_axis(&parent_pose, &link.frame1);
                let effort = axis * link.effort as f32;
                match link.joint_type {
                    JointType::Revolute => {
                        self.bodies[link.handle].add_torque(effort, true);
                        self.bodies[parent_handle].add_torque(-effort, true);
                    }
                    JointType::Prismatic => {
                        self.bodies[link.handle].add_force(effort, true);
                        self.bodies[parent_handle].add_force(-effort, true);
                    }
                    JointType::Fixed => {}
                }
            }
        }
    }

    fn owner_frame(&self, handle: Option<RigidBodyHandle>) -> Option<(BodyId, LinkIndex)> {
        let owner = self.filter.owners.get(&handle?)?;
        Some((owner.body, owner.link))
    }
}

fn pose_from(iso: &Isometry3<f32>) -> Pose {
    let iso: Isometry3<f64> = iso.cast::<f64>();
    Pose::new(iso.translation.vector, iso.rotation)
}

fn to_f64(v: &Vector3<f32>) -> Vector3<f64> {
    v.cast::<f64>()
}

impl PhysicsEngine for PhysicsWorld {
    fn load_mjcf(&mut self, path: &Path, flags: LoadFlags) -> Result<Vec<BodyId>> {
        let xml = std::fs::read_to_string(path).map_err(|e| PhysicsError::ModelLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.load_mjcf_str(&xml, flags).map_err(|e| PhysicsError::ModelLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn num_bodies(&self) -> usize {
        self.loaded.len()
    }

    fn num_joints(&self, body: BodyId) -> Result<usize> {
        Ok(self.body(body)?.links.len())
    }

    fn body_info(&self, body: BodyId) -> Result<BodyInfo> {
        let b = self.body(body)?;
        Ok(BodyInfo {
            base_name: b.base_name.clone(),
            model_name: b.model_name.clone(),
        })
    }

    fn joint_info(&self, body: BodyId, joint: usize) -> Result<JointInfo> {
        let link = self.body(body)?.joint(body, joint)?;
        let (lower_limit, upper_limit) = link.limits.unwrap_or((0.0, 0.0));
        Ok(JointInfo {
            index: joint,
            name: link.joint_name.clone(),
            joint_type: link.joint_type,
            lower_limit,
            upper_limit,
            max_force: match link.joint_type {
                JointType::Fixed => 0.0,
                _ => DEFAULT_MAX_FORCE as f64,
            },
            axis: link.axis,
            link_name: link.name.clone(),
            parent_link: link.parent,
        })
    }

    fn base_pose(&self, body: BodyId) -> Result<Pose> {
        let b = self.body(body)?;
        Ok(pose_from(self.bodies[b.base].position()))
    }

    fn reset_base_pose(&mut self, body: BodyId, pose: Pose) -> Result<()> {
        let coords = self.joint_coordinates(body)?;
        let base = self.body(body)?.base;
        let iso = Isometry3::from_parts(pose.position.into(), pose.orientation).cast::<f32>();
        self.bodies[base].set_position(iso, true);
        let moved = vec![true; coords.len()];
        self.place_links(body, &coords, &moved)
    }

    fn base_velocity(&self, body: BodyId) -> Result<(Vector3<f64>, Vector3<f64>)> {
        let b = self.body(body)?;
        let rb = &self.bodies[b.base];
        Ok((to_f64(rb.linvel()), to_f64(rb.angvel())))
    }

    fn link_state(&self, body: BodyId, link: usize, compute_velocity: bool) -> Result<LinkState> {
        let record = self.body(body)?.link(body, link)?;
        let rb = &self.bodies[record.handle];
        let (linear_velocity, angular_velocity) = if compute_velocity {
            let origin = Point3::from(rb.position().translation.vector);
            (to_f64(&rb.velocity_at_point(&origin)), to_f64(rb.angvel()))
        } else {
            (Vector3::zeros(), Vector3::zeros())
        };
        Ok(LinkState {
            pose: pose_from(rb.position()),
            linear_velocity,
            angular_velocity,
        })
    }

    fn joint_state(&self, body: BodyId, joint: usize) -> Result<JointState> {
        let b = self.body(body)?;
        let link = b.joint(body, joint)?;
        let parent = &self.bodies[b.parent_handle(link)];
        let child = &self.bodies[link.handle];
        Ok(JointState {
            position: joint_position(
                link.joint_type,
                parent.position(),
                child.position(),
                &link.frame1,
                &link.frame2,
            ),
            velocity: joint_velocity(link.joint_type, parent, child, &link.frame1, &link.frame2),
            applied_torque: link.effort,
        })
    }

    fn reset_joint_state(
        &mut self,
        body: BodyId,
        joint: usize,
        position: f64,
        velocity: f64,
    ) -> Result<()> {
        let b = self.body(body)?;
        b.joint(body, joint)?;
        if b.links[joint].joint_type == JointType::Fixed {
            return Ok(());
        }

        let mut moved = vec![false; b.links.len()];
        for (i, link) in b.links.iter().enumerate().skip(joint) {
            moved[i] = i == joint || link.parent.is_some_and(|p| moved[p]);
        }

        let mut coords = self.joint_coordinates(body)?;
        coords[joint] = (position, velocity);
        self.place_links(body, &coords, &moved)
    }

    fn set_joint_motor(&mut self, body: BodyId, joint: usize, control: MotorControl) -> Result<()> {
        let b = self.body_mut(body)?;
        let link = b
            .links
            .get_mut(joint)
            .ok_or(PhysicsError::InvalidJoint { body, joint })?;
        link.effort = match control {
            MotorControl::Torque { force } => force,
            _ => 0.0,
        };
        let (handle, joint_type) = (link.joint, link.joint_type);
        if let Some(j) = self.impulse_joints.get_mut(handle, true) {
            apply_motor(&mut j.data, joint_type, control);
        }
        Ok(())
    }

    fn contact_points(&self, body: BodyId, link: Option<LinkIndex>) -> Result<Vec<ContactPoint>> {
        self.body(body)?;
        let mut points = Vec::new();

        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let c1 = &self.colliders[pair.collider1];
            let c2 = &self.colliders[pair.collider2];
            let (Some(f1), Some(f2)) = (self.owner_frame(c1.parent()), self.owner_frame(c2.parent()))
            else {
                continue;
            };

            let matches = |(b, l): (BodyId, LinkIndex)| b == body && link.map_or(true, |w| w == l);
            let a_is_first = if matches(f1) {
                true
            } else if matches(f2) {
                false
            } else {
                continue;
            };

            for manifold in &pair.manifolds {
                let normal = to_f64(&manifold.data.normal);
                for pt in &manifold.points {
                    let p1 = to_f64(&(c1.position() * pt.local_p1).coords);
                    let p2 = to_f64(&(c2.position() * pt.local_p2).coords);
                    let (frame_a, frame_b, position_on_a, position_on_b, normal_on_b) = if a_is_first
                    {
                        (f1, f2, p1, p2, -normal)
                    } else {
                        (f2, f1, p2, p1, normal)
                    };
                    points.push(ContactPoint {
                        body_a: frame_a.0,
                        link_a: frame_a.1,
                        body_b: frame_b.0,
                        link_b: frame_b.1,
                        position_on_a,
                        position_on_b,
                        normal_on_b,
                        distance: pt.dist as f64,
                        normal_impulse: pt.data.impulse as f64,
                    });
                }
            }
        }

        Ok(points)
    }

    fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.gravity = gravity.cast::<f32>();
    }

    fn set_time_step(&mut self, dt: f64) {
        self.integration_params.dt = dt as f32;
    }

    fn time_step(&self) -> f64 {
        self.integration_params.dt as f64
    }

    fn step_simulation(&mut self) {
        self.apply_efforts();

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &self.filter,
            &(),
        );
    }

    fn reset_simulation(&mut self) {
        self.islands = IslandManager::new();
        self.broad_phase = BroadPhaseMultiSap::new();
        self.narrow_phase = NarrowPhase::new();
        self.bodies = RigidBodySet::new();
        self.colliders = ColliderSet::new();
        self.impulse_joints = ImpulseJointSet::new();
        self.multibody_joints = MultibodyJointSet::new();
        self.ccd_solver = CCDSolver::new();
        self.query_pipeline = QueryPipeline::new();
        self.loaded.clear();
        self.filter.owners.clear();
    }
}
