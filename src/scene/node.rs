use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Affine3A, Vec3};
use rustc_hash::FxHashMap;

use crate::scene::NodeHandle;
use crate::scene::layers::Layers;
use crate::scene::transform::Transform;

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

/// A scene node: hierarchy links, transform and per-node render flags.
///
/// Renderable/camera/light data lives in the [`Scene`](crate::scene::Scene)
/// component maps keyed by the node handle, so nodes stay small.
#[derive(Debug, Clone)]
pub struct Node {
    id: u32,
    pub name: String,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,

    /// When false, neither this node nor any descendant is collected.
    pub visible: bool,
    pub layers: Layers,
    /// Sort tie-break; lower draws first.
    pub render_order: i32,
    /// Descendants sort as one group ordered by this node's `render_order`.
    pub sort_group: bool,

    pub user_data: FxHashMap<String, serde_json::Value>,
}

impl Node {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            visible: true,
            layers: Layers::default(),
            render_order: 0,
            sort_group: false,
            user_data: FxHashMap::default(),
        }
    }

    /// Stable, process-unique id. Final sort tie-break.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.transform.world_matrix
    }

    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.transform.world_matrix.translation.into()
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new("")
    }
}
