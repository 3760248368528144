use glam::{Affine3A, Vec3, Vec4};
use slotmap::{SlotMap, SparseSecondaryMap};

use crate::errors::{Result, StrataError};
use crate::resources::ShaderDefines;
use crate::scene::NodeHandle;
use crate::scene::camera::Camera;
use crate::scene::light::{Light, LightState};
use crate::scene::mesh::Mesh;
use crate::scene::node::Node;
use crate::scene::transform_system;

/// Distance fog applied by materials with `fog` enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fog {
    Linear { color: Vec3, near: f32, far: f32 },
    Exp2 { color: Vec3, density: f32 },
}

impl Fog {
    pub fn append_defines(&self, defines: &mut ShaderDefines) {
        defines.set("USE_FOG", "1");
        defines.toggle("FOG_EXP2", matches!(self, Fog::Exp2 { .. }));
    }
}

/// Scene graph container.
///
/// Nodes live in a slotmap arena; components are stored in sparse maps keyed
/// by node handle. Roots are the top-level nodes that get traversed and
/// rendered. A node detached with [`Scene::remove`] stays alive in the arena
/// but belongs to no tree until it is added again.
pub struct Scene {
    pub(crate) nodes: SlotMap<NodeHandle, Node>,
    pub(crate) root_nodes: Vec<NodeHandle>,

    pub meshes: SparseSecondaryMap<NodeHandle, Mesh>,
    pub cameras: SparseSecondaryMap<NodeHandle, Camera>,
    pub lights: SparseSecondaryMap<NodeHandle, Light>,

    pub fog: Option<Fog>,
    /// Clear color override; `None` keeps the renderer's clear color.
    pub background: Option<Vec4>,
    /// When false the renderer does not propagate matrices before drawing.
    pub matrix_world_auto_update: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root_nodes: Vec::new(),
            meshes: SparseSecondaryMap::new(),
            cameras: SparseSecondaryMap::new(),
            lights: SparseSecondaryMap::new(),
            fog: None,
            background: None,
            matrix_world_auto_update: true,
        }
    }

    // ========================================================================
    // Node creation
    // ========================================================================

    /// Inserts a node as a new root.
    pub fn add_node(&mut self, node: Node) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.root_nodes.push(handle);
        handle
    }

    pub fn create_node(&mut self, name: &str) -> NodeHandle {
        self.add_node(Node::new(name))
    }

    pub fn add_mesh(&mut self, name: &str, mesh: Mesh) -> NodeHandle {
        let handle = self.create_node(name);
        self.meshes.insert(handle, mesh);
        handle
    }

    pub fn add_camera(&mut self, name: &str, camera: Camera) -> NodeHandle {
        let handle = self.create_node(name);
        self.cameras.insert(handle, camera);
        handle
    }

    pub fn add_light(&mut self, name: &str, light: Light) -> NodeHandle {
        let handle = self.create_node(name);
        self.lights.insert(handle, light);
        handle
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[must_use]
    pub fn get_node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn get_node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.root_nodes
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    /// True if `handle` is reachable from one of the roots.
    #[must_use]
    pub fn is_attached(&self, handle: NodeHandle) -> bool {
        let Some(mut current) = self.nodes.get(handle).map(|_| handle) else {
            return false;
        };
        while let Some(parent) = self.nodes.get(current).and_then(|n| n.parent) {
            current = parent;
        }
        self.root_nodes.contains(&current)
    }

    #[must_use]
    pub fn world_matrix(&self, handle: NodeHandle) -> Option<&Affine3A> {
        self.nodes.get(handle).map(Node::world_matrix)
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Makes `child` the last child of `parent`.
    ///
    /// A child that already has a parent is detached from it first, so no node
    /// ever appears in two children lists. The child keeps its *local*
    /// transform. Self-parenting and cycles are rejected without mutation.
    pub fn add(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        self.check_reparent(parent, child)?;

        self.detach(child);
        self.nodes[parent].children.push(child);
        let node = &mut self.nodes[child];
        node.parent = Some(parent);
        node.transform.mark_dirty();
        Ok(())
    }

    /// Like [`add`](Self::add) but keeps the child's current *world* transform.
    pub fn attach(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        self.check_reparent(parent, child)?;

        self.update_world_matrix(parent, true, false);
        self.update_world_matrix(child, true, false);

        let parent_world = self.nodes[parent].transform.world_matrix;
        let child_world = self.nodes[child].transform.world_matrix;
        let local = parent_world.inverse() * child_world;
        self.nodes[child].transform.apply_local_matrix(local);

        self.add(parent, child)
    }

    /// Detaches `child` from `parent`. The child stays alive but is no longer
    /// part of any tree; GPU resources are untouched.
    pub fn remove(&mut self, parent: NodeHandle, child: NodeHandle) -> bool {
        let is_child = self
            .nodes
            .get(child)
            .is_some_and(|n| n.parent == Some(parent));
        if !is_child {
            return false;
        }
        self.detach(child);
        true
    }

    /// Detaches `handle` from whatever parent (or root list) holds it.
    pub fn remove_from_parent(&mut self, handle: NodeHandle) {
        if self.nodes.contains_key(handle) {
            self.detach(handle);
        }
    }

    /// Turns `handle` into a root, detaching it from its parent if needed.
    pub fn add_root(&mut self, handle: NodeHandle) -> Result<()> {
        if !self.nodes.contains_key(handle) {
            return Err(StrataError::InvalidHandle(format!("node {handle:?}")));
        }
        self.detach(handle);
        self.root_nodes.push(handle);
        self.nodes[handle].transform.mark_dirty();
        Ok(())
    }

    /// Removes `handle` and its whole subtree from the arena, components included.
    pub fn remove_node(&mut self, handle: NodeHandle) {
        if !self.nodes.contains_key(handle) {
            return;
        }
        self.detach(handle);

        let subtree: Vec<NodeHandle> = self.traverse(handle).collect();
        for h in subtree {
            self.meshes.remove(h);
            self.cameras.remove(h);
            self.lights.remove(h);
            self.nodes.remove(h);
        }
    }

    fn check_reparent(&self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        if parent == child {
            log::warn!("Scene::add: a node cannot be added as a child of itself");
            return Err(StrataError::SelfParenting);
        }
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            log::warn!("Scene::add: invalid node handle (parent {parent:?}, child {child:?})");
            return Err(StrataError::InvalidHandle(format!(
                "parent {parent:?} / child {child:?}"
            )));
        }
        if self.traverse_ancestors(parent).any(|a| a == child) {
            log::warn!("Scene::add: node {child:?} is an ancestor of {parent:?}");
            return Err(StrataError::InvalidHierarchy(format!(
                "{child:?} is an ancestor of {parent:?}"
            )));
        }
        Ok(())
    }

    fn detach(&mut self, child: NodeHandle) {
        let old_parent = self.nodes.get_mut(child).and_then(|n| n.parent.take());
        match old_parent {
            Some(p) => {
                if let Some(parent) = self.nodes.get_mut(p) {
                    parent.children.retain(|&c| c != child);
                }
            }
            None => self.root_nodes.retain(|&r| r != child),
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.transform.mark_dirty();
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Depth-first, parent-before-children walk starting at (and including) `start`.
    #[must_use]
    pub fn traverse(&self, start: NodeHandle) -> Traverse<'_> {
        Traverse::new(self, vec![start], false)
    }

    /// Like [`traverse`](Self::traverse) but an invisible node prunes its whole subtree.
    #[must_use]
    pub fn traverse_visible(&self, start: NodeHandle) -> Traverse<'_> {
        Traverse::new(self, vec![start], true)
    }

    /// Walks every tree in root order.
    #[must_use]
    pub fn traverse_all(&self) -> Traverse<'_> {
        Traverse::new(self, self.root_nodes.iter().rev().copied().collect(), false)
    }

    /// Parent, grandparent, ... up to the root. `start` itself is excluded.
    #[must_use]
    pub fn traverse_ancestors(&self, start: NodeHandle) -> Ancestors<'_> {
        Ancestors {
            scene: self,
            current: self.nodes.get(start).and_then(|n| n.parent),
        }
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.traverse_all().find(|&h| self.nodes[h].name == name)
    }

    // ========================================================================
    // Matrices
    // ========================================================================

    /// Propagates world matrices through every tree. Only changed subtrees are recomputed.
    pub fn update_matrix_world(&mut self) {
        transform_system::update_hierarchy_iterative(
            &mut self.nodes,
            &mut self.cameras,
            &self.root_nodes,
            false,
        );
    }

    /// Recomputes one node's world matrix.
    ///
    /// `update_parents` first refreshes the ancestor chain root-down;
    /// `update_children` then forces the whole subtree below `handle`.
    pub fn update_world_matrix(
        &mut self,
        handle: NodeHandle,
        update_parents: bool,
        update_children: bool,
    ) {
        if !self.nodes.contains_key(handle) {
            return;
        }

        let mut parents_changed = false;
        if update_parents {
            let mut chain: Vec<NodeHandle> = self.traverse_ancestors(handle).collect();
            chain.reverse();
            for ancestor in chain {
                parents_changed |= transform_system::update_single(
                    &mut self.nodes,
                    &mut self.cameras,
                    ancestor,
                    parents_changed,
                );
            }
        }

        if update_children {
            transform_system::update_subtree(&mut self.nodes, &mut self.cameras, handle, true);
        } else {
            transform_system::update_single(&mut self.nodes, &mut self.cameras, handle, true);
        }
    }

    /// Light summary for the attached, visible lights.
    pub fn collect_lights(&self, state: &mut LightState) {
        state.clear();
        for root in &self.root_nodes {
            for handle in self.traverse_visible(*root) {
                if let Some(light) = self.lights.get(handle) {
                    state.push(light, &self.nodes[handle].transform.world_matrix);
                }
            }
        }
        state.finish();
    }
}

/// Lazy depth-first iterator over node handles.
pub struct Traverse<'a> {
    scene: &'a Scene,
    stack: Vec<NodeHandle>,
    visible_only: bool,
}

impl<'a> Traverse<'a> {
    fn new(scene: &'a Scene, stack: Vec<NodeHandle>, visible_only: bool) -> Self {
        Self {
            scene,
            stack,
            visible_only,
        }
    }
}

impl Iterator for Traverse<'_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        while let Some(handle) = self.stack.pop() {
            let Some(node) = self.scene.nodes.get(handle) else {
                continue;
            };
            if self.visible_only && !node.visible {
                continue;
            }
            self.stack.extend(node.children.iter().rev().copied());
            return Some(handle);
        }
        None
    }
}

/// Iterator over a node's ancestors, nearest first.
pub struct Ancestors<'a> {
    scene: &'a Scene,
    current: Option<NodeHandle>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        let handle = self.current?;
        self.current = self.scene.nodes.get(handle).and_then(|n| n.parent);
        Some(handle)
    }
}
