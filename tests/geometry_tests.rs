//! Geometry Tests
//!
//! Tests for:
//! - Bounding box / sphere containment and recomputation
//! - Draw range and groups
//! - `to_non_indexed` expansion
//! - Manual validation of index ranges and vertex counts
//! - Layout vs data versioning

use glam::Vec3;
use wgpu::VertexFormat;

use strata::StrataError;
use strata::assets::Assets;
use strata::renderer::RecordingBackend;
use strata::renderer::backend::BackendCall;
use strata::renderer::buffers::BufferManager;
use strata::resources::{Attribute, Geometry};

const EPSILON: f32 = 1e-5;

fn point_cloud() -> Vec<[f32; 3]> {
    vec![
        [0.0, 0.0, 0.0],
        [3.0, -1.0, 2.0],
        [-2.0, 4.0, 0.5],
        [1.0, 1.0, -5.0],
        [0.25, -3.0, 1.5],
    ]
}

fn cloud_geometry() -> Geometry {
    let mut geometry = Geometry::new();
    geometry.set_attribute(
        "position",
        Attribute::new_planar(&point_cloud(), VertexFormat::Float32x3),
    );
    geometry
}

// ============================================================================
// Bounding volumes
// ============================================================================

#[test]
fn bounding_box_contains_every_point() {
    let mut geometry = cloud_geometry();
    let bbox = geometry.compute_bounding_box();
    for p in point_cloud() {
        assert!(bbox.contains_point(Vec3::from(p)));
    }
    assert!((bbox.min - Vec3::new(-2.0, -3.0, -5.0)).abs().max_element() < EPSILON);
    assert!((bbox.max - Vec3::new(3.0, 4.0, 2.0)).abs().max_element() < EPSILON);
}

#[test]
fn bounding_sphere_contains_every_point() {
    let mut geometry = cloud_geometry();
    let sphere = geometry.compute_bounding_sphere();
    for p in point_cloud() {
        assert!(sphere.contains_point(Vec3::from(p)), "{p:?} outside {sphere:?}");
    }
}

#[test]
fn recomputing_without_changes_reproduces_bounds() {
    let mut geometry = cloud_geometry();
    let first = geometry.compute_bounding_sphere();
    let second = geometry.compute_bounding_sphere();
    assert_eq!(first, second);
    assert_eq!(geometry.bounding_sphere(), Some(&second));
}

#[test]
fn morph_targets_extend_bounds() {
    let mut geometry = cloud_geometry();
    let far: Vec<[f32; 3]> = point_cloud()
        .iter()
        .map(|p| [p[0] + 10.0, p[1], p[2]])
        .collect();
    geometry.add_morph_attribute("position", Attribute::new_planar(&far, VertexFormat::Float32x3));

    let bbox = geometry.compute_bounding_box();
    assert!(bbox.contains_point(Vec3::new(13.0, -1.0, 2.0)));
    let sphere = geometry.compute_bounding_sphere();
    assert!(sphere.contains_point(Vec3::new(13.0, -1.0, 2.0)));
}

#[test]
fn replacing_positions_drops_cached_bounds() {
    let mut geometry = cloud_geometry();
    geometry.compute_bounding_sphere();
    geometry.set_attribute(
        "position",
        Attribute::new_planar(&[[0.0f32, 0.0, 0.0]], VertexFormat::Float32x3),
    );
    assert!(geometry.bounding_sphere().is_none());
}

// ============================================================================
// Draw range, groups, indices
// ============================================================================

#[test]
fn draw_range_defaults_to_whole_buffer() {
    let mut geometry = Geometry::new_plane(1.0, 1.0);
    assert_eq!(geometry.draw_range.start, 0);
    assert!(geometry.draw_range.end >= geometry.element_count());

    geometry.set_draw_range(3, 3);
    assert_eq!(geometry.draw_range, 3..6);
}

#[test]
fn box_has_one_group_per_face() {
    let geometry = Geometry::new_box(1.0, 1.0, 1.0);
    assert_eq!(geometry.groups.len(), 6);
    let covered: u32 = geometry.groups.iter().map(|g| g.count).sum();
    assert_eq!(covered, geometry.element_count());
}

#[test]
fn to_non_indexed_expands_every_channel() {
    let geometry = Geometry::new_box(1.0, 1.0, 1.0);
    let indices = geometry.indices().unwrap();
    let flat = geometry.to_non_indexed();

    assert!(flat.index_attribute().is_none());
    assert_eq!(flat.vertex_count(), indices.len() as u32);
    let normals = flat.get_attribute("normal").unwrap();
    assert_eq!(normals.count, indices.len() as u32);

    let source = geometry.get_attribute("position").unwrap();
    let expanded = flat.get_attribute("position").unwrap();
    for (i, &index) in indices.iter().enumerate() {
        assert_eq!(expanded.read_vec3(i as u32), source.read_vec3(index));
    }
}

#[test]
fn validate_reports_out_of_range_index() {
    let mut geometry = cloud_geometry();
    geometry.set_indices(&[0, 1, 2, 3, 4, 5]);
    assert!(matches!(geometry.validate(), Err(StrataError::InvalidGeometry(_))));

    geometry.set_indices(&[0, 1, 2, 2, 3, 4]);
    assert!(geometry.validate().is_ok());
}

#[test]
fn validate_reports_vertex_count_mismatch() {
    let mut geometry = cloud_geometry();
    geometry.set_attribute(
        "uv",
        Attribute::new_planar(&[[0.0f32, 0.0]; 3], VertexFormat::Float32x2),
    );
    assert!(geometry.validate().is_err());
}

#[test]
fn instanced_channels_are_exempt_from_vertex_count() {
    let mut geometry = cloud_geometry();
    geometry.set_attribute(
        "offset",
        Attribute::new_instanced(&[[0.0f32, 0.0, 0.0]; 2], VertexFormat::Float32x3),
    );
    assert!(geometry.validate().is_ok());
    assert_eq!(geometry.instance_count(), Some(2));
    assert!(geometry.shader_defines().contains("USE_INSTANCING"));
}

// ============================================================================
// Versioning
// ============================================================================

#[test]
fn data_updates_do_not_touch_layout_version() {
    let mut geometry = cloud_geometry();
    let layout = geometry.layout_version();
    let data = geometry.data_version();

    geometry.update_attribute_region("position", 0, &[[9.0f32, 9.0, 9.0]]);
    assert_eq!(geometry.layout_version(), layout);
    assert!(geometry.data_version() > data);

    geometry.set_attribute(
        "normal",
        Attribute::new_planar(&[[0.0f32, 1.0, 0.0]; 5], VertexFormat::Float32x3),
    );
    assert!(geometry.layout_version() > layout);
}

#[test]
fn replaced_data_is_uploaded_whole_despite_later_region_edits() {
    let mut assets = Assets::new();
    let handle = assets.add_geometry(cloud_geometry());
    let mut backend = RecordingBackend::new();
    let mut buffers = BufferManager::new();
    let geometry = assets.geometry_mut(handle).unwrap();
    buffers.prepare(&mut backend, handle, geometry);
    backend.clear_calls();

    geometry
        .get_attribute_mut("position")
        .unwrap()
        .update_data(&[[1.0f32, 1.0, 1.0]; 5]);
    geometry.update_attribute_region("position", 0, &[[1.0f32, 0.0, 0.0]]);
    buffers.prepare(&mut backend, handle, geometry);

    let uploaded: usize = backend
        .calls()
        .iter()
        .map(|call| match call {
            BackendCall::UpdateBuffer { size, .. } | BackendCall::CreateBuffer { size, .. } => *size,
            _ => 0,
        })
        .sum();
    assert_eq!(uploaded, 60);
}

#[test]
fn relative_morph_toggle_bumps_layout_version() {
    let mut geometry = cloud_geometry();
    geometry.add_morph_attribute(
        "position",
        Attribute::new_planar(&[[0.0f32, 1.0, 0.0]; 5], VertexFormat::Float32x3),
    );
    let layout = geometry.layout_version();
    let data = geometry.data_version();

    geometry.set_morph_targets_relative(true);
    assert!(geometry.morph_targets_relative());
    assert!(geometry.layout_version() > layout);
    assert_eq!(geometry.data_version(), data);
    assert!(geometry.shader_defines().contains("MORPH_TARGETS_RELATIVE"));
}

#[test]
fn compute_vertex_normals_adds_unit_normals() {
    let mut geometry = Geometry::new();
    geometry.set_attribute(
        "position",
        Attribute::new_planar(
            &[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            VertexFormat::Float32x3,
        ),
    );
    geometry.compute_vertex_normals();
    let normals = geometry.get_attribute("normal").unwrap();
    for i in 0..3 {
        let n = normals.read_vec3(i).unwrap();
        assert!((n - Vec3::Z).length() < EPSILON);
    }
}
