//! Joint construction, joint-space kinematics and motor commands on Rapier joints.

use std::f64::consts::PI;

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::dynamics::{
    GenericJoint, GenericJointBuilder, JointAxesMask, JointAxis, MotorModel, RigidBody,
};

use crate::articulation::LinkSpec;
use crate::engine::{JointType, MotorControl};

/// Force bound of the default velocity motor and of position servos.
pub const DEFAULT_MAX_FORCE: f32 = 1000.0;
/// Stiffness of position servos.
pub const POSITION_STIFFNESS: f32 = 1000.0;
/// Damping of position servos.
pub const POSITION_DAMPING: f32 = 100.0;
/// Damping factor of velocity servos.
pub const VELOCITY_FACTOR: f32 = 100.0;

/// Build a Rapier joint for a link.
///
/// The joint frames come from the [`LinkSpec`], so the free axis is X in both
/// frames. Every movable joint starts with a velocity motor holding zero
/// velocity.
pub fn link_joint(link: &LinkSpec) -> GenericJoint {
    let mask = match link.joint_type {
        JointType::Revolute => JointAxesMask::LOCKED_REVOLUTE_AXES,
        JointType::Prismatic => JointAxesMask::LOCKED_PRISMATIC_AXES,
        JointType::Fixed => JointAxesMask::LOCKED_FIXED_AXES,
    };

    let mut builder = GenericJointBuilder::new(mask)
        .local_frame1(link.parent_frame.cast::<f32>())
        .local_frame2(link.child_frame.cast::<f32>())
        .contacts_enabled(false);

    if let Some(axis) = motor_axis(link.joint_type) {
        if let Some((lower, upper)) = link.limits {
            builder = builder.limits(axis, [lower as f32, upper as f32]);
        }
        builder = builder
            .motor_model(axis, MotorModel::AccelerationBased)
            .motor_velocity(axis, 0.0, VELOCITY_FACTOR)
            .motor_max_force(axis, DEFAULT_MAX_FORCE);
    }

    builder.build()
}

/// The Rapier axis a joint moves along, `None` for welds.
pub fn motor_axis(joint_type: JointType) -> Option<JointAxis> {
    match joint_type {
        JointType::Revolute => Some(JointAxis::AngX),
        JointType::Prismatic => Some(JointAxis::LinX),
        JointType::Fixed => None,
    }
}

/// Replace the motor command of a joint.
///
/// Torque control turns the motor off; the torque itself is applied to the
/// bodies by the world on every step.
pub fn apply_motor(joint: &mut GenericJoint, joint_type: JointType, control: MotorControl) {
    let Some(axis) = motor_axis(joint_type) else {
        return;
    };

    match control {
        MotorControl::Position { target } => {
            joint
                .set_motor_position(axis, target as f32, POSITION_STIFFNESS, POSITION_DAMPING)
                .set_motor_max_force(axis, DEFAULT_MAX_FORCE);
        }
        MotorControl::Velocity { target, max_force } => {
            joint
                .set_motor_velocity(axis, target as f32, VELOCITY_FACTOR)
                .set_motor_max_force(axis, max_force.max(0.0) as f32);
        }
        MotorControl::Torque { .. } => {
            joint
                .set_motor_velocity(axis, 0.0, 0.0)
                .set_motor_max_force(axis, 0.0);
        }
    }
}

/// Relative transform produced by moving a joint to `position`.
pub fn joint_motion(joint_type: JointType, position: f64) -> Isometry3<f32> {
    match joint_type {
        JointType::Revolute => Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), position as f32),
        ),
        JointType::Prismatic => Isometry3::from_parts(
            Translation3::new(position as f32, 0.0, 0.0),
            UnitQuaternion::identity(),
        ),
        JointType::Fixed => Isometry3::identity(),
    }
}

/// World pose of a child link for a given parent pose and joint position.
pub fn child_pose(
    parent: &Isometry3<f32>,
    frame1: &Isometry3<f32>,
    frame2: &Isometry3<f32>,
    joint_type: JointType,
    position: f64,
) -> Isometry3<f32> {
    parent * frame1 * joint_motion(joint_type, position) * frame2.inverse()
}

/// Joint position measured from the current parent and child poses.
pub fn joint_position(
    joint_type: JointType,
    parent: &Isometry3<f32>,
    child: &Isometry3<f32>,
    frame1: &Isometry3<f32>,
    frame2: &Isometry3<f32>,
) -> f64 {
    let relative = (parent * frame1).inverse() * (child * frame2);
    match joint_type {
        JointType::Revolute => {
            let q = relative.rotation.quaternion();
            wrap_angle(2.0 * (q.i as f64).atan2(q.w as f64))
        }
        JointType::Prismatic => relative.translation.vector.x as f64,
        JointType::Fixed => 0.0,
    }
}

/// Joint velocity measured from the current parent and child motion.
pub fn joint_velocity(
    joint_type: JointType,
    parent: &RigidBody,
    child: &RigidBody,
    frame1: &Isometry3<f32>,
    frame2: &Isometry3<f32>,
) -> f64 {
    let axis = world_axis(parent.position(), frame1);
    match joint_type {
        JointType::Revolute => (child.angvel() - parent.angvel()).dot(&axis) as f64,
        JointType::Prismatic => {
            let anchor = Point3::from((child.position() * frame2).translation.vector);
            (child.velocity_at_point(&anchor) - parent.velocity_at_point(&anchor)).dot(&axis) as f64
        }
        JointType::Fixed => 0.0,
    }
}

/// Joint axis in world coordinates.
pub fn world_axis(parent: &Isometry3<f32>, frame1: &Isometry3<f32>) -> Vector3<f32> {
    (parent * frame1).rotation * Vector3::x()
}

fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}
