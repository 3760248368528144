use glam::Mat4;
use smallvec::{SmallVec, smallvec};

use crate::assets::{GeometryHandle, MaterialHandle};

/// How a mesh's geometry is rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    #[default]
    Triangles,
    Lines,
    LineStrip,
    Points,
}

impl DrawMode {
    #[must_use]
    pub fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            DrawMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
            DrawMode::Lines => wgpu::PrimitiveTopology::LineList,
            DrawMode::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            DrawMode::Points => wgpu::PrimitiveTopology::PointList,
        }
    }
}

/// Renderable component: geometry plus one material per geometry group.
///
/// With a single material every group (or the whole geometry) draws with it;
/// with several, group `i` uses `materials[group.material_index]`.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: GeometryHandle,
    pub materials: SmallVec<[MaterialHandle; 1]>,
    pub mode: DrawMode,

    /// Skip the frustum test for this mesh.
    pub frustum_culled: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,

    /// Per-target weights, supplied by animation.
    pub morph_target_influences: Vec<f32>,
    /// Bone matrices, supplied by animation. `Some` turns skinning on.
    pub skin: Option<Vec<Mat4>>,
}

impl Mesh {
    #[must_use]
    pub fn new(geometry: GeometryHandle, material: MaterialHandle) -> Self {
        Self {
            geometry,
            materials: smallvec![material],
            mode: DrawMode::Triangles,
            frustum_culled: true,
            cast_shadow: false,
            receive_shadow: false,
            morph_target_influences: Vec::new(),
            skin: None,
        }
    }

    #[must_use]
    pub fn with_materials(geometry: GeometryHandle, materials: &[MaterialHandle]) -> Self {
        let mut mesh = Self::new(geometry, MaterialHandle::default());
        mesh.materials = SmallVec::from_slice(materials);
        mesh
    }

    #[must_use]
    pub fn with_mode(mut self, mode: DrawMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn is_multi_material(&self) -> bool {
        self.materials.len() > 1
    }

    #[must_use]
    pub fn material(&self, index: usize) -> Option<MaterialHandle> {
        self.materials.get(index).copied()
    }
}
