//! Collision shapes for MJCF geoms, and the contact filter between links.

use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use rapier3d::prelude::{
    ActiveHooks, ColliderBuilder, PairFilterContext, PhysicsHooks, RigidBodyHandle, SolverFlags,
};

use crate::engine::{BodyId, LinkIndex};
use crate::mjcf::{GeomShape, MjcfGeom};

/// Build a collider for a geom, positioned in its body's frame.
///
/// MuJoCo's `contype`/`conaffinity` masks are packed into the collider's
/// user data for [`CollisionFilter`].
pub fn geom_to_collider(geom: &MjcfGeom) -> ColliderBuilder {
    let pose: Isometry3<f32> = geom.pose.cast::<f32>();

    let (builder, pose) = match geom.shape {
        GeomShape::Sphere { radius } => (ColliderBuilder::ball(radius as f32), pose),
        GeomShape::Capsule {
            radius,
            half_length,
        } => (
            ColliderBuilder::capsule_z(half_length as f32, radius as f32),
            pose,
        ),
        GeomShape::Cylinder {
            radius,
            half_length,
        } => (
            // Rapier cylinders run along Y.
            ColliderBuilder::cylinder(half_length as f32, radius as f32),
            pose * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2),
        ),
        GeomShape::Box { half_extents } => (
            ColliderBuilder::cuboid(
                half_extents.x as f32,
                half_extents.y as f32,
                half_extents.z as f32,
            ),
            pose,
        ),
        GeomShape::Plane => (ColliderBuilder::halfspace(Vector3::z_axis()), pose),
    };

    builder
        .position(pose)
        .density(geom.density as f32)
        .friction(geom.friction as f32)
        .user_data(pack_masks(geom.contype, geom.conaffinity))
        .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
}

fn pack_masks(contype: u32, conaffinity: u32) -> u128 {
    contype as u128 | ((conaffinity as u128) << 32)
}

fn unpack_masks(user_data: u128) -> (u32, u32) {
    (user_data as u32, (user_data >> 32) as u32)
}

/// MuJoCo contact rule: two geoms may touch when either one's type matches
/// the other's affinity.
fn masks_allow_contact(a: u128, b: u128) -> bool {
    let (type_a, affinity_a) = unpack_masks(a);
    let (type_b, affinity_b) = unpack_masks(b);
    type_a & affinity_b != 0 || type_b & affinity_a != 0
}

/// Which body and frame a Rapier rigid body belongs to.
#[derive(Debug, Clone)]
pub struct LinkOwner {
    /// Engine body.
    pub body: BodyId,
    /// Frame within the body.
    pub link: LinkIndex,
    /// Rigid bodies of every ancestor frame, base included.
    pub ancestors: Vec<RigidBodyHandle>,
    /// Whether links of this body collide with each other.
    pub self_collision: bool,
}

/// Contact filter applied on every step.
#[derive(Debug, Default)]
pub struct CollisionFilter {
    /// Owner of every rigid body created from a model.
    pub owners: HashMap<RigidBodyHandle, LinkOwner>,
}

impl CollisionFilter {
    fn allows(&self, rb1: RigidBodyHandle, rb2: RigidBodyHandle) -> bool {
        let (Some(o1), Some(o2)) = (self.owners.get(&rb1), self.owners.get(&rb2)) else {
            return true;
        };
        if o1.body != o2.body {
            return true;
        }
        o1.self_collision && !o1.ancestors.contains(&rb2) && !o2.ancestors.contains(&rb1)
    }
}

impl PhysicsHooks for CollisionFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let c1 = &context.colliders[context.collider1];
        let c2 = &context.colliders[context.collider2];
        if !masks_allow_contact(c1.user_data, c2.user_data) {
            return None;
        }
        if let (Some(rb1), Some(rb2)) = (context.rigid_body1, context.rigid_body2) {
            if !self.allows(rb1, rb2) {
                return None;
            }
        }
        Some(SolverFlags::COMPUTE_IMPULSES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_mask_rule() {
        let ground = pack_masks(1, 1);
        let ghost = pack_masks(0, 0);
        let only_affinity = pack_masks(0, 1);
        assert!(masks_allow_contact(ground, ground));
        assert!(!masks_allow_contact(ground, ghost));
        assert!(masks_allow_contact(ground, only_affinity));
        assert!(!masks_allow_contact(only_affinity, only_affinity));
    }

    #[test]
    fn test_ancestor_exclusion() {
        let mut ids: SlotMap<BodyId, ()> = SlotMap::with_key();
        let body = ids.insert(());
        let other = ids.insert(());

        let base = RigidBodyHandle::from_raw_parts(0, 0);
        let thigh = RigidBodyHandle::from_raw_parts(1, 0);
        let shin = RigidBodyHandle::from_raw_parts(2, 0);
        let arm = RigidBodyHandle::from_raw_parts(3, 0);
        let stranger = RigidBodyHandle::from_raw_parts(4, 0);

        let mut filter = CollisionFilter::default();
        let owner = |link, ancestors: Vec<RigidBodyHandle>| LinkOwner {
            body,
            link,
            ancestors,
            self_collision: true,
        };
        filter.owners.insert(base, owner(LinkIndex::Base, vec![]));
        filter.owners.insert(thigh, owner(LinkIndex::Link(0), vec![base]));
        filter.owners.insert(shin, owner(LinkIndex::Link(1), vec![base, thigh]));
        filter.owners.insert(arm, owner(LinkIndex::Link(2), vec![base]));
        filter.owners.insert(
            stranger,
            LinkOwner {
                body: other,
                link: LinkIndex::Base,
                ancestors: vec![],
                self_collision: false,
            },
        );

        assert!(!filter.allows(shin, base));
        assert!(!filter.allows(thigh, shin));
        assert!(filter.allows(shin, arm));
        assert!(filter.allows(shin, stranger));

        for o in filter.owners.values_mut() {
            o.self_collision = false;
        }
        assert!(!filter.allows(shin, arm));
        assert!(filter.allows(shin, stranger));
    }
}
