//! Scene Graph
//!
//! - [`Node`]: hierarchy links, [`Transform`] and render flags
//! - [`Scene`]: node arena plus mesh/camera/light component maps
//! - [`transform_system`]: world-matrix propagation
//! - [`Camera`], [`Light`], [`Mesh`]: components keyed by node handle

pub mod camera;
pub mod layers;
pub mod light;
pub mod mesh;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod transform;
pub mod transform_system;

pub use camera::{
    Camera, CameraProjection, Frustum, OrthographicProjection, PerspectiveProjection, Projection,
};
pub use layers::Layers;
pub use light::{Light, LightEntry, LightKind, LightState, ShadowConfig};
pub use mesh::{DrawMode, Mesh};
pub use node::Node;
pub use scene::{Fog, Scene};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeHandle;
}
