//! Named rigid parts of a loaded model.

use mjgym_physics::{BodyId, ContactPoint, LinkIndex, PhysicsEngine, Pose};
use nalgebra::{UnitQuaternion, Vector3};

use crate::error::{EnvError, Result};

/// One rigid frame of a loaded body: either its base or one of its links.
///
/// A part only stores identity and its pose at construction. Every other
/// accessor queries the engine passed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    name: String,
    body_index: usize,
    body: BodyId,
    link: LinkIndex,
    initial_position: Vector3<f64>,
    initial_orientation: UnitQuaternion<f64>,
}

impl Part {
    /// Wrap a frame of `body` and record its current pose.
    pub fn new<E: PhysicsEngine + ?Sized>(
        engine: &E,
        name: impl Into<String>,
        body_index: usize,
        body: BodyId,
        link: LinkIndex,
    ) -> Result<Self> {
        let pose = frame_pose(engine, body, link)?;
        Ok(Self {
            name: name.into(),
            body_index,
            body,
            link,
            initial_position: pose.position,
            initial_orientation: pose.orientation,
        })
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the body in the load result.
    pub fn body_index(&self) -> usize {
        self.body_index
    }

    /// Engine handle of the body.
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Frame within the body.
    pub fn link(&self) -> LinkIndex {
        self.link
    }

    /// Whether this part is the body's base frame.
    pub fn is_base(&self) -> bool {
        self.link == LinkIndex::Base
    }

    /// Position when the part was created.
    pub fn initial_position(&self) -> Vector3<f64> {
        self.initial_position
    }

    /// Orientation when the part was created.
    pub fn initial_orientation(&self) -> UnitQuaternion<f64> {
        self.initial_orientation
    }

    /// Current world pose. [`Pose::to_array`] gives the `[x, y, z, qx, qy, qz, qw]` form.
    pub fn get_pose<E: PhysicsEngine + ?Sized>(&self, engine: &E) -> Result<Pose> {
        frame_pose(engine, self.body, self.link)
    }

    /// Current world position.
    pub fn current_position<E: PhysicsEngine + ?Sized>(&self, engine: &E) -> Result<Vector3<f64>> {
        Ok(self.get_pose(engine)?.position)
    }

    /// Current world orientation.
    pub fn current_orientation<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &E,
    ) -> Result<UnitQuaternion<f64>> {
        Ok(self.get_pose(engine)?.orientation)
    }

    /// Linear velocity of the frame.
    pub fn speed<E: PhysicsEngine + ?Sized>(&self, engine: &E) -> Result<Vector3<f64>> {
        Ok(match self.link {
            LinkIndex::Base => engine.base_velocity(self.body)?.0,
            LinkIndex::Link(l) => engine.link_state(self.body, l, true)?.linear_velocity,
        })
    }

    /// Teleport the body's base frame.
    ///
    /// Fails with [`EnvError::NotBaseFrame`] on link parts; the engine moves
    /// whole bodies, not individual links.
    pub fn reset_pose<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        position: Vector3<f64>,
        orientation: UnitQuaternion<f64>,
    ) -> Result<()> {
        if !self.is_base() {
            return Err(EnvError::NotBaseFrame(self.name.clone()));
        }
        engine.reset_base_pose(self.body, Pose::new(position, orientation))?;
        Ok(())
    }

    /// Teleport the base frame, keeping its orientation.
    pub fn reset_position<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        position: Vector3<f64>,
    ) -> Result<()> {
        let orientation = self.current_orientation(&*engine)?;
        self.reset_pose(engine, position, orientation)
    }

    /// Rotate the base frame in place.
    pub fn reset_orientation<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        orientation: UnitQuaternion<f64>,
    ) -> Result<()> {
        let position = self.current_position(&*engine)?;
        self.reset_pose(engine, position, orientation)
    }

    /// Pose accessor bound to an engine.
    pub fn pose<'a, E: PhysicsEngine + ?Sized>(&'a self, engine: &'a E) -> PoseView<'a, E> {
        PoseView { part: self, engine }
    }

    /// Contacts touching this frame.
    pub fn contact_list<E: PhysicsEngine + ?Sized>(&self, engine: &E) -> Result<Vec<ContactPoint>> {
        Ok(engine.contact_points(self.body, Some(self.link))?)
    }
}

fn frame_pose<E: PhysicsEngine + ?Sized>(engine: &E, body: BodyId, link: LinkIndex) -> Result<Pose> {
    Ok(match link {
        LinkIndex::Base => engine.base_pose(body)?,
        LinkIndex::Link(l) => engine.link_state(body, l, false)?.pose,
    })
}

/// Read-only pose queries for one part.
pub struct PoseView<'a, E: PhysicsEngine + ?Sized> {
    part: &'a Part,
    engine: &'a E,
}

impl<E: PhysicsEngine + ?Sized> PoseView<'_, E> {
    /// World position.
    pub fn xyz(&self) -> Result<Vector3<f64>> {
        self.part.current_position(self.engine)
    }

    /// Roll, pitch and yaw in radians.
    pub fn rpy(&self) -> Result<Vector3<f64>> {
        let (roll, pitch, yaw) = self.part.current_orientation(self.engine)?.euler_angles();
        Ok(Vector3::new(roll, pitch, yaw))
    }

    /// World orientation.
    pub fn orientation(&self) -> Result<UnitQuaternion<f64>> {
        self.part.current_orientation(self.engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBody, FakeEngine, FakeJoint};
    use approx::assert_relative_eq;

    fn engine_with_arm() -> (FakeEngine, BodyId) {
        let mut engine = FakeEngine::new();
        let mut body = FakeBody::new("base", vec![FakeJoint::revolute("shoulder", "arm", -1.0, 1.0)]);
        body.base_pose = Pose::new(Vector3::new(1.0, 2.0, 3.0), UnitQuaternion::identity());
        body.base_velocity = Vector3::new(0.5, 0.0, 0.0);
        let id = engine.add_body(body);
        (engine, id)
    }

    #[test]
    fn test_base_queries() {
        let (engine, id) = engine_with_arm();
        let part = Part::new(&engine, "base", 0, id, LinkIndex::Base).unwrap();
        assert_eq!(part.initial_position(), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(part.speed(&engine).unwrap(), Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(
            part.get_pose(&engine).unwrap().to_array(),
            [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_link_queries_use_link_state() {
        let (mut engine, id) = engine_with_arm();
        engine.reset_joint_state(id, 0, 0.3, 0.7).unwrap();
        let part = Part::new(&engine, "arm", 0, id, LinkIndex::Link(0)).unwrap();
        assert_relative_eq!(part.current_position(&engine).unwrap(), Vector3::new(1.3, 2.0, 4.0));
        assert_relative_eq!(part.speed(&engine).unwrap(), Vector3::new(0.7, 0.0, 0.0));
        assert_relative_eq!(part.pose(&engine).rpy().unwrap().z, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_pose_on_base() {
        let (mut engine, id) = engine_with_arm();
        let part = Part::new(&engine, "base", 0, id, LinkIndex::Base).unwrap();
        let turned = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5);
        part.reset_orientation(&mut engine, turned).unwrap();
        part.reset_position(&mut engine, Vector3::new(0.0, 0.0, 1.0)).unwrap();

        let view = part.pose(&engine);
        assert_eq!(view.xyz().unwrap(), Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(view.orientation().unwrap(), turned, epsilon = 1e-12);
        // The creation pose is kept.
        assert_eq!(part.initial_position(), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_reset_pose_rejects_links() {
        let (mut engine, id) = engine_with_arm();
        let part = Part::new(&engine, "arm", 0, id, LinkIndex::Link(0)).unwrap();
        let err = part
            .reset_position(&mut engine, Vector3::zeros())
            .unwrap_err();
        assert!(matches!(err, EnvError::NotBaseFrame(name) if name == "arm"));
    }

    #[test]
    fn test_stale_body_propagates_engine_error() {
        let (mut engine, id) = engine_with_arm();
        let part = Part::new(&engine, "base", 0, id, LinkIndex::Base).unwrap();
        engine.reset_simulation();
        assert!(matches!(
            part.current_position(&engine),
            Err(EnvError::Physics(mjgym_physics::PhysicsError::InvalidBody(_)))
        ));
    }
}
