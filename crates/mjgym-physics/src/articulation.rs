//! Flattening of an MJCF body tree into articulated engine bodies.
//!
//! Each top-level `<body>` becomes one engine body made of a base and a list
//! of links. Links are numbered depth first, so a parent always precedes its
//! children, and link `j` is driven by joint `j`.

use std::f64::consts::PI;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::engine::JointType;
use crate::mjcf::{MjcfBody, MjcfGeom, MjcfJoint, MjcfJointKind, MjcfModel};

/// Prefix of the names given to rigid welds between jointless bodies.
pub const FIXED_JOINT_PREFIX: &str = "jointfix";

/// Name of the static body holding geoms attached directly to `<worldbody>`.
pub const WORLD_BODY_NAME: &str = "world";

/// How the base of a body is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    /// Welded to the world.
    Fixed,
    /// Free floating.
    Floating,
}

/// Base frame of an articulated body.
#[derive(Debug, Clone)]
pub struct BaseSpec {
    /// Base link name.
    pub name: String,
    /// Simulation kind.
    pub kind: BaseKind,
    /// World pose.
    pub pose: Isometry3<f64>,
    /// Collision geoms in the base frame.
    pub geoms: Vec<MjcfGeom>,
}

/// One link and the joint that attaches it to its parent.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    /// Link name (the MJCF body name).
    pub name: String,
    /// Joint name.
    pub joint_name: String,
    /// Joint kind.
    pub joint_type: JointType,
    /// Parent link, `None` for the base.
    pub parent: Option<usize>,
    /// Joint frame in the parent link frame. The joint moves along/around its X axis.
    pub parent_frame: Isometry3<f64>,
    /// Joint frame in this link's frame.
    pub child_frame: Isometry3<f64>,
    /// Joint axis in this link's frame.
    pub axis: Vector3<f64>,
    /// Position limits.
    pub limits: Option<(f64, f64)>,
    /// Collision geoms. Empty for the intermediate links of a multi-joint body.
    pub geoms: Vec<MjcfGeom>,
}

/// One engine body ready to be inserted into a world.
#[derive(Debug, Clone)]
pub struct BodySpec {
    /// Model the body came from.
    pub model_name: String,
    /// Base frame.
    pub base: BaseSpec,
    /// Links in joint order.
    pub links: Vec<LinkSpec>,
}

/// Convert a parsed model into engine bodies, in load order.
pub fn articulate(model: &MjcfModel) -> Vec<BodySpec> {
    let mut specs: Vec<BodySpec> = model
        .bodies
        .iter()
        .enumerate()
        .map(|(index, body)| articulate_body(&model.name, index, body))
        .collect();

    if !model.world_geoms.is_empty() {
        specs.push(BodySpec {
            model_name: model.name.clone(),
            base: BaseSpec {
                name: WORLD_BODY_NAME.to_string(),
                kind: BaseKind::Fixed,
                pose: Isometry3::identity(),
                geoms: model.world_geoms.clone(),
            },
            links: Vec::new(),
        });
    }

    specs
}

fn articulate_body(model_name: &str, body_index: usize, body: &MjcfBody) -> BodySpec {
    let mut links = Vec::new();

    let floating = body.joints.iter().any(|j| j.kind == MjcfJointKind::Free);
    let base = if floating || body.joints.is_empty() {
        let base = BaseSpec {
            name: body.name.clone(),
            kind: if floating {
                BaseKind::Floating
            } else {
                BaseKind::Fixed
            },
            pose: body.pose,
            geoms: body.geoms.clone(),
        };
        for child in &body.children {
            push_links(&mut links, body_index, child, None);
        }
        base
    } else {
        // The body moves relative to the world, so the base is a static anchor
        // and the body itself becomes the first link(s).
        let base = BaseSpec {
            name: model_name.to_string(),
            kind: BaseKind::Fixed,
            pose: Isometry3::identity(),
            geoms: Vec::new(),
        };
        push_links(&mut links, body_index, body, None);
        base
    };

    BodySpec {
        model_name: model_name.to_string(),
        base,
        links,
    }
}

fn push_links(links: &mut Vec<LinkSpec>, body_index: usize, body: &MjcfBody, parent: Option<usize>) {
    let mut parent = parent;

    if body.joints.is_empty() {
        let index = links.len();
        links.push(LinkSpec {
            name: body.name.clone(),
            joint_name: format!("{FIXED_JOINT_PREFIX}_{body_index}_{index}"),
            joint_type: JointType::Fixed,
            parent,
            parent_frame: body.pose,
            child_frame: Isometry3::identity(),
            axis: Vector3::x(),
            limits: None,
            geoms: body.geoms.clone(),
        });
        parent = Some(index);
    } else {
        let last = body.joints.len() - 1;
        for (k, joint) in body.joints.iter().enumerate() {
            let child_frame = joint_frame(joint);
            // Stacked links share the body frame at zero joint position.
            let parent_frame = if k == 0 {
                body.pose * child_frame
            } else {
                child_frame
            };
            let index = links.len();
            links.push(LinkSpec {
                name: body.name.clone(),
                joint_name: joint.name.clone(),
                joint_type: match joint.kind {
                    MjcfJointKind::Slide => JointType::Prismatic,
                    _ => JointType::Revolute,
                },
                parent,
                parent_frame,
                child_frame,
                axis: joint.axis,
                limits: joint.range,
                geoms: if k == last {
                    body.geoms.clone()
                } else {
                    Vec::new()
                },
            });
            parent = Some(index);
        }
    }

    for child in &body.children {
        push_links(links, body_index, child, parent);
    }
}

/// Frame at the joint anchor whose X axis is the joint axis.
fn joint_frame(joint: &MjcfJoint) -> Isometry3<f64> {
    let rotation = UnitQuaternion::rotation_between(&Vector3::x(), &joint.axis).unwrap_or_else(|| {
        if joint.axis.x < 0.0 {
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI)
        } else {
            UnitQuaternion::identity()
        }
    });
    Isometry3::from_parts(Translation3::from(joint.pos), rotation)
}
