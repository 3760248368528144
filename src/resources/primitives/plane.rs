use super::GeometryBuilder;
use crate::resources::geometry::Geometry;

/// Plane in the XY plane facing +Z.
#[derive(Debug, Clone, Copy)]
pub struct PlaneOptions {
    pub width: f32,
    pub height: f32,
    pub width_segments: u32,
    pub height_segments: u32,
}

impl Default for PlaneOptions {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            width_segments: 1,
            height_segments: 1,
        }
    }
}

#[must_use]
pub fn create_plane(options: PlaneOptions) -> Geometry {
    let grid_x = options.width_segments.max(1);
    let grid_y = options.height_segments.max(1);
    let row = grid_x + 1;

    let segment_w = options.width / grid_x as f32;
    let segment_h = options.height / grid_y as f32;

    let mut builder = GeometryBuilder::default();

    for iy in 0..=grid_y {
        // rows run top to bottom so v = 1 sits at +Y
        let y = options.height / 2.0 - iy as f32 * segment_h;
        for ix in 0..=grid_x {
            let x = ix as f32 * segment_w - options.width / 2.0;
            builder.positions.push([x, y, 0.0]);
            builder.normals.push([0.0, 0.0, 1.0]);
            builder
                .uvs
                .push([ix as f32 / grid_x as f32, 1.0 - iy as f32 / grid_y as f32]);
        }
    }

    for iy in 0..grid_y {
        for ix in 0..grid_x {
            let a = ix + row * iy;
            let b = ix + row * (iy + 1);
            let c = (ix + 1) + row * (iy + 1);
            let d = (ix + 1) + row * iy;
            builder.indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    builder.build()
}
