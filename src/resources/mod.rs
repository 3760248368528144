//! Core Resources
//!
//! CPU-side data the renderer consumes. Nothing here touches the backend;
//! every type only records versions that the renderer compares against what it
//! last uploaded or compiled.

pub mod bounds;
pub mod color;
pub mod geometry;
pub mod material;
pub mod primitives;
pub mod shader_defines;
pub mod texture;
pub mod uniforms;
pub mod version_tracker;

pub use bounds::{BoundingBox, BoundingSphere};
pub use color::{ColorSpace, ToneMapping};
pub use geometry::{Attribute, BufferUsage, Geometry, GeometryGroup};
pub use material::{
    BasicMaterial, Blending, LambertMaterial, LineMaterial, Material, MaterialGuard, MaterialKind,
    MaterialSettings, PhongMaterial, PhysicalMaterial, PointsMaterial, PolygonOffset,
    ShaderMaterial, Side, StandardMaterial, StencilSettings, TextureSlot,
};
pub use shader_defines::ShaderDefines;
pub use texture::{Texture, TextureSampler, TextureTransform};
pub use uniforms::UniformValue;
pub use version_tracker::{ChangeTracker, MutGuard};
