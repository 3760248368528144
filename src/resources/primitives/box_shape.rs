use glam::Vec3;

use super::GeometryBuilder;
use crate::resources::geometry::Geometry;

/// Box dimensions and per-axis subdivision.
#[derive(Debug, Clone, Copy)]
pub struct BoxOptions {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub width_segments: u32,
    pub height_segments: u32,
    pub depth_segments: u32,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            depth: 1.0,
            width_segments: 1,
            height_segments: 1,
            depth_segments: 1,
        }
    }
}

#[must_use]
pub fn create_box(width: f32, height: f32, depth: f32) -> Geometry {
    create_box_with(BoxOptions {
        width,
        height,
        depth,
        ..Default::default()
    })
}

/// Axis-aligned box centred on the origin. Each face is its own group
/// (`+X, -X, +Y, -Y, +Z, -Z` map to material slots 0..6).
#[must_use]
pub fn create_box_with(options: BoxOptions) -> Geometry {
    let ws = options.width_segments.max(1);
    let hs = options.height_segments.max(1);
    let ds = options.depth_segments.max(1);
    let (w, h, d) = (options.width, options.height, options.depth);

    let mut builder = GeometryBuilder::default();

    // (u axis, v axis, w axis, u dir, v dir, size u, size v, size w, grid u, grid v)
    let faces = [
        (2, 1, 0, -1.0, -1.0, d, h, w, ds, hs),
        (2, 1, 0, 1.0, -1.0, d, h, -w, ds, hs),
        (0, 2, 1, 1.0, 1.0, w, d, h, ws, ds),
        (0, 2, 1, 1.0, -1.0, w, d, -h, ws, ds),
        (0, 1, 2, 1.0, -1.0, w, h, d, ws, hs),
        (0, 1, 2, -1.0, -1.0, w, h, -d, ws, hs),
    ];

    for (material_index, &(u, v, wa, udir, vdir, width, height, depth, grid_x, grid_y)) in
        faces.iter().enumerate()
    {
        let group_start = builder.indices.len() as u32;
        let base = builder.vertex_count();

        let segment_w = width / grid_x as f32;
        let segment_h = height / grid_y as f32;
        let depth_half = depth / 2.0;

        for iy in 0..=grid_y {
            let y = iy as f32 * segment_h - height / 2.0;
            for ix in 0..=grid_x {
                let x = ix as f32 * segment_w - width / 2.0;

                let mut p = Vec3::ZERO;
                p[u] = x * udir;
                p[v] = y * vdir;
                p[wa] = depth_half;
                builder.positions.push(p.to_array());

                let mut n = Vec3::ZERO;
                n[wa] = if depth > 0.0 { 1.0 } else { -1.0 };
                builder.normals.push(n.to_array());

                builder.uvs.push([
                    ix as f32 / grid_x as f32,
                    1.0 - iy as f32 / grid_y as f32,
                ]);
            }
        }

        let row = grid_x + 1;
        for iy in 0..grid_y {
            for ix in 0..grid_x {
                let a = base + ix + row * iy;
                let b = base + ix + row * (iy + 1);
                let c = base + (ix + 1) + row * (iy + 1);
                let e = base + (ix + 1) + row * iy;
                builder.indices.extend_from_slice(&[a, b, e, b, c, e]);
            }
        }

        let group_count = builder.indices.len() as u32 - group_start;
        builder.groups.push((group_start, group_count, material_index));
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_box_has_six_groups() {
        let geo = create_box(2.0, 2.0, 2.0);
        assert_eq!(geo.vertex_count(), 24);
        assert_eq!(geo.element_count(), 36);
        assert_eq!(geo.groups.len(), 6);
        let bbox = geo.bounding_box().copied().unwrap_or_default();
        assert_eq!(bbox.min, Vec3::splat(-1.0));
        assert_eq!(bbox.max, Vec3::splat(1.0));
        assert!(geo.validate().is_ok());
    }

    #[test]
    fn segments_add_vertices() {
        let geo = create_box_with(BoxOptions {
            width_segments: 2,
            ..Default::default()
        });
        // +X/-X faces unchanged (4 each), four faces use 3x2 grids.
        assert_eq!(geo.vertex_count(), 2 * 4 + 4 * 6);
    }
}
