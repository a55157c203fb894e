//! Controllable joints of a loaded model.

use mjgym_physics::{BodyId, MotorControl, PhysicsEngine, DEFAULT_MAX_FORCE};

use crate::error::{EnvError, Result};

/// One degree of freedom of a loaded body.
///
/// Limits are read once at construction. Motor commands persist in the
/// engine until replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    name: String,
    body_index: usize,
    body: BodyId,
    joint_index: usize,
    lower_limit: f64,
    upper_limit: f64,
    power_coef: f64,
    motor_enabled: bool,
}

impl Joint {
    /// Wrap joint `joint_index` of `body` and read its limits.
    pub fn new<E: PhysicsEngine + ?Sized>(
        engine: &E,
        name: impl Into<String>,
        body_index: usize,
        body: BodyId,
        joint_index: usize,
    ) -> Result<Self> {
        let info = engine.joint_info(body, joint_index)?;
        Ok(Self {
            name: name.into(),
            body_index,
            body,
            joint_index,
            lower_limit: info.lower_limit,
            upper_limit: info.upper_limit,
            power_coef: 0.0,
            motor_enabled: true,
        })
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the owning body in the load result.
    pub fn body_index(&self) -> usize {
        self.body_index
    }

    /// Engine handle of the owning body.
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Joint index within the body.
    pub fn joint_index(&self) -> usize {
        self.joint_index
    }

    /// Lower position limit.
    pub fn lower_limit(&self) -> f64 {
        self.lower_limit
    }

    /// Upper position limit.
    pub fn upper_limit(&self) -> f64 {
        self.upper_limit
    }

    /// Scale applied to normalized actions.
    pub fn power_coef(&self) -> f64 {
        self.power_coef
    }

    /// Set the action scale.
    pub fn set_power_coef(&mut self, power_coef: f64) {
        self.power_coef = power_coef;
    }

    /// False after [`disable_motor`](Self::disable_motor) until the next motor command.
    pub fn motor_enabled(&self) -> bool {
        self.motor_enabled
    }

    /// `(position, velocity)`.
    pub fn get_state<E: PhysicsEngine + ?Sized>(&self, engine: &E) -> Result<(f64, f64)> {
        let state = engine.joint_state(self.body, self.joint_index)?;
        Ok((state.position, state.velocity))
    }

    /// Position mapped so the limits land on -1 and +1, and velocity scaled by 0.1.
    pub fn current_relative_position<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &E,
    ) -> Result<(f64, f64)> {
        let range = self.upper_limit - self.lower_limit;
        if range == 0.0 {
            return Err(EnvError::DegenerateJointLimits {
                joint: self.name.clone(),
                lower: self.lower_limit,
                upper: self.upper_limit,
            });
        }
        let (position, velocity) = self.get_state(engine)?;
        let mid = 0.5 * (self.lower_limit + self.upper_limit);
        Ok((2.0 * (position - mid) / range, 0.1 * velocity))
    }

    /// Overwrite position and velocity outside of simulation. The motor is untouched.
    pub fn set_state<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        position: f64,
        velocity: f64,
    ) -> Result<()> {
        engine.reset_joint_state(self.body, self.joint_index, position, velocity)?;
        Ok(())
    }

    /// Servo towards a position. Takes effect as the simulation steps.
    pub fn set_position<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        position: f64,
    ) -> Result<()> {
        self.command(engine, MotorControl::Position { target: position })
    }

    /// Servo towards a velocity.
    pub fn set_velocity<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        velocity: f64,
    ) -> Result<()> {
        self.command(
            engine,
            MotorControl::Velocity {
                target: velocity,
                max_force: DEFAULT_MAX_FORCE as f64,
            },
        )
    }

    /// Apply a raw torque (or force for prismatic joints).
    pub fn set_torque<E: PhysicsEngine + ?Sized>(&mut self, engine: &mut E, torque: f64) -> Result<()> {
        self.command(engine, MotorControl::Torque { force: torque })
    }

    /// Turn the motor off so the joint moves freely.
    pub fn disable_motor<E: PhysicsEngine + ?Sized>(&mut self, engine: &mut E) -> Result<()> {
        engine.set_joint_motor(
            self.body,
            self.joint_index,
            MotorControl::Velocity {
                target: 0.0,
                max_force: 0.0,
            },
        )?;
        self.motor_enabled = false;
        Ok(())
    }

    /// Overwrite position and velocity, then turn the motor off.
    pub fn reset_position<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        position: f64,
        velocity: f64,
    ) -> Result<()> {
        self.set_state(engine, position, velocity)?;
        self.disable_motor(engine)
    }

    fn command<E: PhysicsEngine + ?Sized>(&mut self, engine: &mut E, control: MotorControl) -> Result<()> {
        engine.set_joint_motor(self.body, self.joint_index, control)?;
        self.motor_enabled = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBody, FakeEngine, FakeJoint};
    use approx::assert_relative_eq;

    fn setup(lower: f64, upper: f64) -> (FakeEngine, Joint) {
        let mut engine = FakeEngine::new();
        let id = engine.add_body(FakeBody::new(
            "base",
            vec![FakeJoint::revolute("elbow", "forearm", lower, upper)],
        ));
        let joint = Joint::new(&engine, "elbow", 0, id, 0).unwrap();
        (engine, joint)
    }

    #[test]
    fn test_construction_defaults() {
        let (_, joint) = setup(-0.5, 1.5);
        assert_eq!(joint.power_coef(), 0.0);
        assert!(joint.motor_enabled());
        assert_eq!((joint.lower_limit(), joint.upper_limit()), (-0.5, 1.5));
    }

    #[test]
    fn test_relative_position_maps_limits() {
        let (mut engine, joint) = setup(-0.5, 1.5);
        joint.set_state(&mut engine, -0.5, 2.0).unwrap();
        let (rel, vel) = joint.current_relative_position(&engine).unwrap();
        assert_relative_eq!(rel, -1.0);
        assert_relative_eq!(vel, 0.2);

        joint.set_state(&mut engine, 1.5, 0.0).unwrap();
        assert_relative_eq!(joint.current_relative_position(&engine).unwrap().0, 1.0);

        joint.set_state(&mut engine, 0.5, 0.0).unwrap();
        assert_relative_eq!(joint.current_relative_position(&engine).unwrap().0, 0.0);
    }

    #[test]
    fn test_relative_position_degenerate_limits() {
        let (engine, joint) = setup(0.0, 0.0);
        assert!(matches!(
            joint.current_relative_position(&engine),
            Err(EnvError::DegenerateJointLimits { .. })
        ));
    }

    #[test]
    fn test_reset_position_round_trip_disables_motor() {
        let (mut engine, mut joint) = setup(-1.0, 1.0);
        joint.reset_position(&mut engine, 0.4, 0.0).unwrap();
        let (position, velocity) = joint.get_state(&engine).unwrap();
        assert_relative_eq!(position, 0.4, epsilon = 1e-9);
        assert_relative_eq!(velocity, 0.0);
        assert!(!joint.motor_enabled());
        assert_eq!(
            engine.body(joint.body()).joints[0].motor,
            MotorControl::Velocity {
                target: 0.0,
                max_force: 0.0
            }
        );
    }

    #[test]
    fn test_set_position_applies_after_step() {
        let (mut engine, mut joint) = setup(-1.0, 1.0);
        joint.disable_motor(&mut engine).unwrap();
        joint.set_position(&mut engine, 0.8).unwrap();
        assert!(joint.motor_enabled());
        assert_eq!(joint.get_state(&engine).unwrap().0, 0.0);
        engine.step_simulation();
        assert_relative_eq!(joint.get_state(&engine).unwrap().0, 0.8);
    }

    #[test]
    fn test_torque_has_no_gains() {
        let (mut engine, mut joint) = setup(-1.0, 1.0);
        joint.set_torque(&mut engine, 3.0).unwrap();
        assert_eq!(
            engine.body(joint.body()).joints[0].motor,
            MotorControl::Torque { force: 3.0 }
        );
        joint.set_velocity(&mut engine, -0.5).unwrap();
        assert_eq!(
            engine.body(joint.body()).joints[0].motor,
            MotorControl::Velocity {
                target: -0.5,
                max_force: DEFAULT_MAX_FORCE as f64
            }
        );
    }
}
