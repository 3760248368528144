//! Render List
//!
//! Collects the drawables of one frame and orders them per bucket.
//!
//! | Bucket | Membership | Sort |
//! |--------|------------|------|
//! | opaque | neither of the below | group, render order, material, depth asc, id |
//! | transmissive | `transmission > 0` | same as opaque |
//! | transparent | `transparent == true` | group, render order, depth desc, id |
//!
//! Opaque grouping by material keeps program and state churn low; front to
//! back depth is only a secondary key for early-Z. Transparent compositing
//! needs farthest-first regardless of material.
//!
//! A non-empty transmissive bucket must be drawn after a snapshot of the
//! opaque bucket has been resolved; [`RenderList::needs_transmission_pass`]
//! exposes that dependency to the frame driver.

use std::cmp::Ordering;

use glam::Vec3;

use crate::assets::{Assets, GeometryHandle, MaterialHandle};
use crate::scene::{Camera, NodeHandle, Scene};

/// One drawable: a geometry (or one of its groups) with a resolved material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderItem {
    pub node: NodeHandle,
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    /// Geometry group drawn, `None` for the whole draw range.
    pub group: Option<usize>,
    pub group_order: i32,
    pub render_order: i32,
    pub material_id: u32,
    /// View depth; larger is farther.
    pub z: f32,
    /// Stable id of the owning node.
    pub id: u32,
}

impl RenderItem {
    fn group_index(&self) -> usize {
        self.group.map_or(0, |g| g + 1)
    }
}

fn opaque_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.group_order
        .cmp(&b.group_order)
        .then(a.render_order.cmp(&b.render_order))
        .then(a.material_id.cmp(&b.material_id))
        .then(a.z.total_cmp(&b.z))
        .then(a.id.cmp(&b.id))
        .then(a.group_index().cmp(&b.group_index()))
}

fn transparent_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.group_order
        .cmp(&b.group_order)
        .then(a.render_order.cmp(&b.render_order))
        .then(b.z.total_cmp(&a.z))
        .then(a.id.cmp(&b.id))
        .then(a.group_index().cmp(&b.group_index()))
}

#[derive(Debug, Default)]
pub struct RenderList {
    pub opaque: Vec<RenderItem>,
    pub transmissive: Vec<RenderItem>,
    pub transparent: Vec<RenderItem>,
    culled: u32,
    stack: Vec<(NodeHandle, i32)>,
}

impl RenderList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks the visible subgraph and fills the buckets.
    ///
    /// World matrices must be current. Missing bounding spheres are computed
    /// on the way, which is why the geometry storage is borrowed mutably.
    pub fn collect(&mut self, scene: &Scene, assets: &mut Assets, camera: &Camera) {
        self.finish();
        let frustum = *camera.frustum();

        self.stack.extend(scene.roots().iter().rev().map(|&root| (root, 0)));

        while let Some((handle, group_order)) = self.stack.pop() {
            let Some(node) = scene.nodes.get(handle) else {
                continue;
            };
            if !node.visible {
                continue;
            }

            let child_group = if node.sort_group { node.render_order } else { group_order };
            for &child in node.children().iter().rev() {
                self.stack.push((child, child_group));
            }

            if !node.layers.test(camera.layers) {
                continue;
            }
            let Some(mesh) = scene.meshes.get(handle) else {
                continue;
            };
            let Some(geometry) = assets.geometries.get_mut(mesh.geometry) else {
                continue;
            };

            let world = node.world_matrix();
            let local_sphere = if let Some(s) = geometry.bounding_sphere().copied() {
                s
            } else {
                geometry.compute_bounding_sphere()
            };
            let sphere = local_sphere.transform(world);

            if mesh.frustum_culled && !frustum.intersects_sphere(&sphere) {
                self.culled += 1;
                continue;
            }

            let center = if sphere.radius > 0.0 {
                sphere.center
            } else {
                Vec3::from(world.translation)
            };
            let z = camera.view_depth(center);

            let mut push = |material: MaterialHandle, group: Option<usize>| {
                let Some(mat) = assets.materials.get(material) else {
                    return;
                };
                if !mat.settings().visible {
                    return;
                }
                let item = RenderItem {
                    node: handle,
                    geometry: mesh.geometry,
                    material,
                    group,
                    group_order,
                    render_order: node.render_order,
                    material_id: mat.id(),
                    z,
                    id: node.id(),
                };
                if mat.is_transmissive() {
                    self.transmissive.push(item);
                } else if mat.is_transparent() {
                    self.transparent.push(item);
                } else {
                    self.opaque.push(item);
                }
            };

            if mesh.is_multi_material() && !geometry.groups.is_empty() {
                for (i, group) in geometry.groups.iter().enumerate() {
                    if let Some(material) = mesh.material(group.material_index) {
                        push(material, Some(i));
                    }
                }
            } else if let Some(material) = mesh.material(0) {
                push(material, None);
            }
        }
    }

    /// Applies the bucket orderings. Deterministic for equal input.
    pub fn sort(&mut self) {
        self.opaque.sort_unstable_by(opaque_order);
        self.transmissive.sort_unstable_by(opaque_order);
        self.transparent.sort_unstable_by(transparent_order);
    }

    /// Clears the buckets, keeping their allocations.
    pub fn finish(&mut self) {
        self.opaque.clear();
        self.transmissive.clear();
        self.transparent.clear();
        self.stack.clear();
        self.culled = 0;
    }

    #[must_use]
    pub fn needs_transmission_pass(&self) -> bool {
        !self.transmissive.is_empty()
    }

    /// Drawables rejected by the frustum test in the last collection.
    #[must_use]
    pub fn culled(&self) -> u32 {
        self.culled
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transmissive.len() + self.transparent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn item(id: u32, material_id: u32, z: f32) -> RenderItem {
        RenderItem {
            node: NodeHandle::from(KeyData::from_ffi(u64::from(id))),
            geometry: GeometryHandle::default(),
            material: MaterialHandle::default(),
            group: None,
            group_order: 0,
            render_order: 0,
            material_id,
            z,
            id,
        }
    }

    #[test]
    fn opaque_groups_by_material_before_depth() {
        let mut list = RenderList::new();
        list.opaque = vec![item(1, 2, 1.0), item(2, 1, 9.0), item(3, 1, 3.0)];
        list.sort();
        let ids: Vec<u32> = list.opaque.iter().map(|i| i.id).collect();
        assert_eq!(ids, [3, 2, 1]);
    }

    #[test]
    fn transparent_is_back_to_front_regardless_of_material() {
        let mut list = RenderList::new();
        list.transparent = vec![item(1, 1, 1.0), item(2, 2, 5.0), item(3, 1, 3.0)];
        list.sort();
        let ids: Vec<u32> = list.transparent.iter().map(|i| i.id).collect();
        assert_eq!(ids, [2, 3, 1]);
    }

    #[test]
    fn render_order_dominates_depth() {
        let mut list = RenderList::new();
        let mut late = item(1, 1, 0.5);
        late.render_order = 1;
        list.transparent = vec![late, item(2, 1, 0.1)];
        list.sort();
        assert_eq!(list.transparent[0].id, 2);
    }
}
