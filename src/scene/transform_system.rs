//! Transform System
//!
//! World-matrix propagation, decoupled from [`Scene`](crate::scene::Scene) so it
//! only borrows the node arena and the camera map.
//!
//! Staleness is resolved lazily: writing a node's TRS marks nothing, and the
//! next pass detects the change through the transform's shadow state. A
//! changed local matrix forces the whole subtree below it to recompute, and so
//! does a world matrix rewritten by a single-node update in between passes.

use glam::Affine3A;
use slotmap::{SlotMap, SparseSecondaryMap};

use crate::scene::NodeHandle;
use crate::scene::camera::Camera;
use crate::scene::node::Node;

/// Recomputes world matrices for every tree under `roots`.
///
/// Iterative depth-first walk with an explicit stack, so deep hierarchies
/// cannot overflow the call stack. Nodes are visited parent first.
pub fn update_hierarchy_iterative(
    nodes: &mut SlotMap<NodeHandle, Node>,
    cameras: &mut SparseSecondaryMap<NodeHandle, Camera>,
    roots: &[NodeHandle],
    force: bool,
) {
    // (node, parent world matrix, parent changed)
    let mut stack: Vec<(NodeHandle, Affine3A, bool)> = Vec::with_capacity(64);
    for &root in roots.iter().rev() {
        stack.push((root, Affine3A::IDENTITY, force));
    }
    drain_stack(nodes, cameras, &mut stack);
}

/// Recomputes `root` and everything below it against its current parent.
pub fn update_subtree(
    nodes: &mut SlotMap<NodeHandle, Node>,
    cameras: &mut SparseSecondaryMap<NodeHandle, Camera>,
    root: NodeHandle,
    force: bool,
) {
    let Some(node) = nodes.get(root) else {
        return;
    };
    let parent_world = node
        .parent
        .and_then(|p| nodes.get(p))
        .map_or(Affine3A::IDENTITY, |p| p.transform.world_matrix);

    let mut stack = vec![(root, parent_world, force)];
    drain_stack(nodes, cameras, &mut stack);
}

/// Recomputes a single node from its parent's *current* world matrix.
/// Children are left untouched but the node is flagged, so the next
/// hierarchy pass recomputes them. Returns whether the world matrix was rewritten.
pub fn update_single(
    nodes: &mut SlotMap<NodeHandle, Node>,
    cameras: &mut SparseSecondaryMap<NodeHandle, Camera>,
    handle: NodeHandle,
    force: bool,
) -> bool {
    let parent_world = nodes
        .get(handle)
        .and_then(|n| n.parent)
        .and_then(|p| nodes.get(p))
        .map_or(Affine3A::IDENTITY, |p| p.transform.world_matrix);

    let Some(node) = nodes.get_mut(handle) else {
        return false;
    };
    let local_changed = node.transform.update_local_matrix();
    if !(local_changed || force) {
        return false;
    }
    let world = parent_world * node.transform.local_matrix;
    node.transform.set_world_matrix(world);
    node.transform.world_needs_update = true;
    if let Some(camera) = cameras.get_mut(handle) {
        camera.update_view_projection(&world);
    }
    true
}

fn drain_stack(
    nodes: &mut SlotMap<NodeHandle, Node>,
    cameras: &mut SparseSecondaryMap<NodeHandle, Camera>,
    stack: &mut Vec<(NodeHandle, Affine3A, bool)>,
) {
    while let Some((handle, parent_world, parent_changed)) = stack.pop() {
        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };

        let local_changed = node.transform.update_local_matrix();
        let rewritten = std::mem::take(&mut node.transform.world_needs_update);
        let world_changed = local_changed || parent_changed || rewritten;

        if world_changed {
            let world = parent_world * node.transform.local_matrix;
            node.transform.set_world_matrix(world);

            if let Some(camera) = cameras.get_mut(handle) {
                camera.update_view_projection(&world);
            }
        }

        let world = node.transform.world_matrix;
        for &child in node.children.iter().rev() {
            stack.push((child, world, world_changed));
        }
    }
}
