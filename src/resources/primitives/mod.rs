//! Procedural geometry used by tests and demos.

pub mod box_shape;
pub mod plane;

pub use box_shape::{BoxOptions, create_box, create_box_with};
pub use plane::{PlaneOptions, create_plane};

use crate::resources::geometry::{Attribute, Geometry};
use wgpu::VertexFormat;

/// Accumulates vertex channels and emits a [`Geometry`] with the smallest
/// index width that fits.
#[derive(Default)]
pub(crate) struct GeometryBuilder {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub groups: Vec<(u32, u32, usize)>,
}

impl GeometryBuilder {
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn build(self) -> Geometry {
        let mut geo = Geometry::new();
        geo.set_attribute(
            "position",
            Attribute::new_planar(&self.positions, VertexFormat::Float32x3),
        );
        geo.set_attribute(
            "normal",
            Attribute::new_planar(&self.normals, VertexFormat::Float32x3),
        );
        geo.set_attribute("uv", Attribute::new_planar(&self.uvs, VertexFormat::Float32x2));

        if self.positions.len() <= usize::from(u16::MAX) {
            let narrow: Vec<u16> = self.indices.iter().map(|&i| i as u16).collect();
            geo.set_indices(&narrow);
        } else {
            geo.set_indices_u32(&self.indices);
        }

        for (start, count, material_index) in self.groups {
            geo.add_group(start, count, material_index);
        }

        geo.compute_bounding_box();
        geo.compute_bounding_sphere();
        geo
    }
}
