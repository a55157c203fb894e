//! MJCF (MuJoCo XML Format) parsing.
//!
//! Only the subset needed to build articulated bodies is read: the model name,
//! `<compiler angle>`, `<option>`, the top-level `<default>` class, and the
//! `<worldbody>` tree of bodies, joints and primitive geoms. Visual-only
//! elements (`<asset>`, `<site>`, `<camera>`, `<light>`) and `<actuator>` are
//! skipped.

use std::f64::consts::PI;

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use roxmltree::{Document, Node};

use crate::error::MjcfError;

/// Unit used for angles in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngleUnit {
    /// Degrees (the MuJoCo default).
    #[default]
    Degree,
    /// Radians.
    Radian,
}

impl AngleUnit {
    fn to_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Degree => value * PI / 180.0,
            AngleUnit::Radian => value,
        }
    }
}

/// Parsed MJCF model.
#[derive(Debug, Clone)]
pub struct MjcfModel {
    /// Model name from `<mujoco model="...">`.
    pub name: String,
    /// Simulation timestep from `<option>`.
    ///
    /// Informational only. Loading a model never changes the engine's
    /// timestep; callers set it with `PhysicsEngine::set_time_step`.
    pub timestep: f64,
    /// Gravity from `<option>`.
    ///
    /// Informational only, like [`timestep`](Self::timestep).
    pub gravity: Vector3<f64>,
    /// Geoms attached directly to `<worldbody>`.
    pub world_geoms: Vec<MjcfGeom>,
    /// Top-level bodies in document order.
    pub bodies: Vec<MjcfBody>,
}

/// A `<body>` element.
#[derive(Debug, Clone)]
pub struct MjcfBody {
    /// Body name.
    pub name: String,
    /// Pose relative to the parent body.
    pub pose: Isometry3<f64>,
    /// Joints connecting the body to its parent, in document order.
    pub joints: Vec<MjcfJoint>,
    /// Collision geoms.
    pub geoms: Vec<MjcfGeom>,
    /// Child bodies in document order.
    pub children: Vec<MjcfBody>,
}

/// MJCF joint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MjcfJointKind {
    /// Rotation about `axis`.
    Hinge,
    /// Translation along `axis`.
    Slide,
    /// Six degrees of freedom, floating base.
    Free,
}

/// A `<joint>` element.
#[derive(Debug, Clone)]
pub struct MjcfJoint {
    /// Joint name.
    pub name: String,
    /// Joint type.
    pub kind: MjcfJointKind,
    /// Anchor in the body frame.
    pub pos: Vector3<f64>,
    /// Axis in the body frame (normalized).
    pub axis: Vector3<f64>,
    /// Position limits in radians or meters, `None` when unlimited.
    pub range: Option<(f64, f64)>,
}

/// Primitive collision shape. Capsules and cylinders run along local Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeomShape {
    /// Sphere.
    Sphere {
        /// Radius.
        radius: f64,
    },
    /// Capsule.
    Capsule {
        /// Radius.
        radius: f64,
        /// Half length of the cylindrical part.
        half_length: f64,
    },
    /// Cylinder.
    Cylinder {
        /// Radius.
        radius: f64,
        /// Half height.
        half_length: f64,
    },
    /// Box.
    Box {
        /// Half extents.
        half_extents: Vector3<f64>,
    },
    /// Infinite plane with normal +Z.
    Plane,
}

/// A `<geom>` element.
#[derive(Debug, Clone)]
pub struct MjcfGeom {
    /// Optional geom name.
    pub name: Option<String>,
    /// Shape.
    pub shape: GeomShape,
    /// Pose in the body frame.
    pub pose: Isometry3<f64>,
    /// Sliding friction.
    pub friction: f64,
    /// Density in kg/m^3.
    pub density: f64,
    /// Contact type bitmask.
    pub contype: u32,
    /// Contact affinity bitmask.
    pub conaffinity: u32,
}

#[derive(Debug, Clone)]
struct Defaults {
    limited: Option<bool>,
    friction: f64,
    density: f64,
    contype: u32,
    conaffinity: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            limited: None,
            friction: 1.0,
            density: 1000.0,
            contype: 1,
            conaffinity: 1,
        }
    }
}

struct Parser {
    angle: AngleUnit,
    defaults: Defaults,
    unnamed_bodies: usize,
    unnamed_joints: usize,
}

/// Parse an MJCF document.
pub fn parse_mjcf(xml: &str) -> Result<MjcfModel, MjcfError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if !root.has_tag_name("mujoco") {
        return Err(MjcfError::NotMujoco(root.tag_name().name().to_string()));
    }

    let name = root.attribute("model").unwrap_or("mujoco").to_string();

    let angle = match root
        .children()
        .find(|n| n.has_tag_name("compiler"))
        .and_then(|n| n.attribute("angle"))
    {
        None | Some("degree") => AngleUnit::Degree,
        Some("radian") => AngleUnit::Radian,
        Some(other) => {
            return Err(MjcfError::InvalidAttribute {
                attribute: "angle",
                element: "compiler".to_string(),
                message: format!("expected degree or radian, got '{other}'"),
            })
        }
    };

    let mut timestep = 0.002;
    let mut gravity = Vector3::new(0.0, 0.0, -9.81);
    if let Some(option) = root.children().find(|n| n.has_tag_name("option")) {
        if let Some(v) = option.attribute("timestep") {
            timestep = parse_scalar(v, "timestep", "option")?;
        }
        if option.attribute("gravity").is_some() {
            gravity = vec3_attr(option, "gravity")?.unwrap_or(gravity);
        }
    }

    let mut parser = Parser {
        angle,
        defaults: Defaults::default(),
        unnamed_bodies: 0,
        unnamed_joints: 0,
    };
    if let Some(default) = root.children().find(|n| n.has_tag_name("default")) {
        parser.read_defaults(default)?;
    }

    let mut world_geoms = Vec::new();
    let mut bodies = Vec::new();
    if let Some(worldbody) = root.children().find(|n| n.has_tag_name("worldbody")) {
        for child in worldbody.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "geom" => world_geoms.push(parser.parse_geom(child)?),
                "body" => bodies.push(parser.parse_body(child, true)?),
                "light" | "camera" | "site" => {}
                other => log::warn!("ignoring <{other}> in <worldbody>"),
            }
        }
    }

    Ok(MjcfModel {
        name,
        timestep,
        gravity,
        world_geoms,
        bodies,
    })
}

impl Parser {
    fn read_defaults(&mut self, node: Node) -> Result<(), MjcfError> {
        if let Some(joint) = node.children().find(|n| n.has_tag_name("joint")) {
            if let Some(v) = joint.attribute("limited") {
                self.defaults.limited = parse_limited(v, "joint")?;
            }
        }
        if let Some(geom) = node.children().find(|n| n.has_tag_name("geom")) {
            if let Some(f) = vec_attr(geom, "friction")? {
                if let Some(&first) = f.first() {
                    self.defaults.friction = first;
                }
            }
            if let Some(v) = geom.attribute("density") {
                self.defaults.density = parse_scalar(v, "density", "geom")?;
            }
            if let Some(v) = geom.attribute("contype") {
                self.defaults.contype = parse_mask(v, "contype")?;
            }
            if let Some(v) = geom.attribute("conaffinity") {
                self.defaults.conaffinity = parse_mask(v, "conaffinity")?;
            }
        }
        Ok(())
    }

    fn parse_body(&mut self, node: Node, top_level: bool) -> Result<MjcfBody, MjcfError> {
        let name = match node.attribute("name") {
            Some(n) => n.to_string(),
            None => {
                self.unnamed_bodies += 1;
                format!("body{}", self.unnamed_bodies)
            }
        };

        let pose = self.parse_frame(node)?;
        let mut body = MjcfBody {
            name,
            pose,
            joints: Vec::new(),
            geoms: Vec::new(),
            children: Vec::new(),
        };

        for child in node.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "joint" => body.joints.push(self.parse_joint(child)?),
                "freejoint" => body.joints.push(MjcfJoint {
                    name: child.attribute("name").unwrap_or("free").to_string(),
                    kind: MjcfJointKind::Free,
                    pos: Vector3::zeros(),
                    axis: Vector3::z(),
                    range: None,
                }),
                "geom" => body.geoms.push(self.parse_geom(child)?),
                "body" => body.children.push(self.parse_body(child, false)?),
                "inertial" | "site" | "camera" | "light" => {}
                other => log::warn!("ignoring <{other}> in body '{}'", body.name),
            }
        }

        if let Some(free) = body.joints.iter().find(|j| j.kind == MjcfJointKind::Free) {
            if !top_level || body.joints.len() > 1 {
                return Err(MjcfError::MisplacedFreeJoint {
                    joint: free.name.clone(),
                    body: body.name.clone(),
                });
            }
        }

        Ok(body)
    }

    fn parse_joint(&mut self, node: Node) -> Result<MjcfJoint, MjcfError> {
        let kind = match node.attribute("type").unwrap_or("hinge") {
            "hinge" => MjcfJointKind::Hinge,
            "slide" => MjcfJointKind::Slide,
            "free" => MjcfJointKind::Free,
            other => return Err(MjcfError::UnknownJointType(other.to_string())),
        };

        let name = match node.attribute("name") {
            Some(n) => n.to_string(),
            None => {
                self.unnamed_joints += 1;
                format!("joint{}", self.unnamed_joints)
            }
        };

        let pos = vec3_attr(node, "pos")?.unwrap_or_else(Vector3::zeros);
        let axis = vec3_attr(node, "axis")?.unwrap_or_else(Vector3::z);
        let norm = axis.norm();
        if norm < 1e-12 {
            return Err(MjcfError::InvalidAttribute {
                attribute: "axis",
                element: format!("joint '{name}'"),
                message: "axis has zero length".to_string(),
            });
        }

        let range = match vec_attr(node, "range")? {
            Some(r) if r.len() == 2 => Some((r[0], r[1])),
            Some(_) => {
                return Err(MjcfError::InvalidAttribute {
                    attribute: "range",
                    element: format!("joint '{name}'"),
                    message: "expected two values".to_string(),
                })
            }
            None => None,
        };
        let limited = match node.attribute("limited") {
            Some(v) => parse_limited(v, "joint")?,
            None => self.defaults.limited,
        }
        .unwrap_or(range.is_some());

        let range = match (limited, range) {
            (true, Some((lo, hi))) => Some(match kind {
                MjcfJointKind::Hinge => (self.angle.to_radians(lo), self.angle.to_radians(hi)),
                _ => (lo, hi),
            }),
            _ => None,
        };

        Ok(MjcfJoint {
            name,
            kind,
            pos,
            axis: axis / norm,
            range,
        })
    }

    fn parse_geom(&mut self, node: Node) -> Result<MjcfGeom, MjcfError> {
        let kind = node.attribute("type").unwrap_or("sphere");
        let size = vec_attr(node, "size")?.unwrap_or_default();
        let size_at = |i: usize| -> Result<f64, MjcfError> {
            size.get(i).copied().ok_or(MjcfError::MissingAttribute {
                attribute: "size",
                element: format!("geom type {kind}"),
            })
        };

        let fromto = match vec_attr(node, "fromto")? {
            Some(v) if v.len() == 6 => Some((
                Vector3::new(v[0], v[1], v[2]),
                Vector3::new(v[3], v[4], v[5]),
            )),
            Some(_) => {
                return Err(MjcfError::InvalidAttribute {
                    attribute: "fromto",
                    element: "geom".to_string(),
                    message: "expected six values".to_string(),
                })
            }
            None => None,
        };

        let (shape, pose) = match (kind, fromto) {
            ("capsule", Some((from, to))) | ("cylinder", Some((from, to))) => {
                let radius = size_at(0)?;
                let half_length = (to - from).norm() / 2.0;
                let shape = if kind == "capsule" {
                    GeomShape::Capsule {
                        radius,
                        half_length,
                    }
                } else {
                    GeomShape::Cylinder {
                        radius,
                        half_length,
                    }
                };
                (shape, segment_pose(from, to))
            }
            ("sphere", _) => (GeomShape::Sphere { radius: size_at(0)? }, self.parse_frame(node)?),
            ("capsule", None) => (
                GeomShape::Capsule {
                    radius: size_at(0)?,
                    half_length: size_at(1)?,
                },
                self.parse_frame(node)?,
            ),
            ("cylinder", None) => (
                GeomShape::Cylinder {
                    radius: size_at(0)?,
                    half_length: size_at(1)?,
                },
                self.parse_frame(node)?,
            ),
            ("box", _) => (
                GeomShape::Box {
                    half_extents: Vector3::new(size_at(0)?, size_at(1)?, size_at(2)?),
                },
                self.parse_frame(node)?,
            ),
            ("plane", _) => (GeomShape::Plane, self.parse_frame(node)?),
            (other, _) => return Err(MjcfError::UnknownGeomType(other.to_string())),
        };

        let friction = match vec_attr(node, "friction")? {
            Some(f) if !f.is_empty() => f[0],
            _ => self.defaults.friction,
        };
        let density = match node.attribute("density") {
            Some(v) => parse_scalar(v, "density", "geom")?,
            None => self.defaults.density,
        };
        let contype = match node.attribute("contype") {
            Some(v) => parse_mask(v, "contype")?,
            None => self.defaults.contype,
        };
        let conaffinity = match node.attribute("conaffinity") {
            Some(v) => parse_mask(v, "conaffinity")?,
            None => self.defaults.conaffinity,
        };

        Ok(MjcfGeom {
            name: node.attribute("name").map(str::to_string),
            shape,
            pose,
            friction,
            density,
            contype,
            conaffinity,
        })
    }

    /// Reads `pos` together with `quat` or `euler` into a frame.
    fn parse_frame(&self, node: Node) -> Result<Isometry3<f64>, MjcfError> {
        let pos = vec3_attr(node, "pos")?.unwrap_or_else(Vector3::zeros);
        let rotation = if let Some(q) = vec_attr(node, "quat")? {
            if q.len() != 4 {
                return Err(MjcfError::InvalidAttribute {
                    attribute: "quat",
                    element: node.tag_name().name().to_string(),
                    message: "expected four values".to_string(),
                });
            }
            UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]))
        } else if let Some(e) = vec3_attr(node, "euler")? {
            // Rotating axes, x then y then z.
            let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.angle.to_radians(e.x));
            let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.angle.to_radians(e.y));
            let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.angle.to_radians(e.z));
            rx * ry * rz
        } else {
            UnitQuaternion::identity()
        };
        Ok(Isometry3::from_parts(Translation3::from(pos), rotation))
    }
}

/// Frame centred between `from` and `to` with its Z axis along the segment.
fn segment_pose(from: Vector3<f64>, to: Vector3<f64>) -> Isometry3<f64> {
    let center = (from + to) / 2.0;
    let dir = to - from;
    let rotation = UnitQuaternion::rotation_between(&Vector3::z(), &dir).unwrap_or_else(|| {
        if dir.z < 0.0 {
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI)
        } else {
            UnitQuaternion::identity()
        }
    });
    Isometry3::from_parts(Translation3::from(center), rotation)
}

fn parse_limited(value: &str, element: &str) -> Result<Option<bool>, MjcfError> {
    match value {
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        "auto" => Ok(None),
        other => Err(MjcfError::InvalidAttribute {
            attribute: "limited",
            element: element.to_string(),
            message: format!("expected true, false or auto, got '{other}'"),
        }),
    }
}

fn parse_scalar(value: &str, attribute: &'static str, element: &str) -> Result<f64, MjcfError> {
    value.trim().parse().map_err(|_| MjcfError::InvalidAttribute {
        attribute,
        element: element.to_string(),
        message: format!("'{value}' is not a number"),
    })
}

fn parse_mask(value: &str, attribute: &'static str) -> Result<u32, MjcfError> {
    value.trim().parse().map_err(|_| MjcfError::InvalidAttribute {
        attribute,
        element: "geom".to_string(),
        message: format!("'{value}' is not an integer mask"),
    })
}

fn vec_attr(node: Node, attribute: &'static str) -> Result<Option<Vec<f64>>, MjcfError> {
    let Some(raw) = node.attribute(attribute) else {
        return Ok(None);
    };
    raw.split_whitespace()
        .map(|s| parse_scalar(s, attribute, node.tag_name().name()))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn vec3_attr(node: Node, attribute: &'static str) -> Result<Option<Vector3<f64>>, MjcfError> {
    match vec_attr(node, attribute)? {
        Some(v) if v.len() == 3 => Ok(Some(Vector3::new(v[0], v[1], v[2]))),
        Some(_) => Err(MjcfError::InvalidAttribute {
            attribute,
            element: node.tag_name().name().to_string(),
            message: "expected three values".to_string(),
        }),
        None => Ok(None),
    }
}
