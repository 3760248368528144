//! Renderer Tests
//!
//! End-to-end frames against the recording backend:
//! - Program sharing and recompilation on structural change
//! - Failure recovery: skipped draws and once-per-subject diagnostics
//! - Transmission pre-pass
//! - Disposal and frame counters

use glam::Vec3;
use wgpu::VertexFormat;

use strata::assets::{Assets, MaterialHandle};
use strata::renderer::backend::BackendCall;
use strata::renderer::program::BindingState;
use strata::renderer::{RecordingBackend, Renderer, RendererSettings, Severity, Subject};
use strata::resources::material::PhysicalMaterial;
use strata::resources::{Attribute, Geometry, Material, MaterialKind, Texture, ToneMapping};
use strata::scene::{Camera, Mesh, NodeHandle, Scene};

struct Harness {
    renderer: Renderer<RecordingBackend>,
    scene: Scene,
    assets: Assets,
    camera: NodeHandle,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(RendererSettings::default())
    }

    fn with_settings(settings: RendererSettings) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut scene = Scene::new();
        let camera = scene.add_camera("camera", Camera::new_perspective(50.0, 1.0, 0.1, 100.0));
        Self {
            renderer: Renderer::new(RecordingBackend::new(), settings, 64, 64).unwrap(),
            scene,
            assets: Assets::new(),
            camera,
        }
    }

    fn add_cube(&mut self, material: Material, z: f32) -> (NodeHandle, MaterialHandle) {
        let geometry = self.assets.add_geometry(Geometry::new_box(1.0, 1.0, 1.0));
        let material = self.assets.add_material(material);
        let node = self.scene.add_mesh("cube", Mesh::new(geometry, material));
        self.scene.get_node_mut(node).unwrap().transform.position = Vec3::new(0.0, 0.0, z);
        (node, material)
    }

    fn add_mesh(&mut self, geometry: Geometry, material: Material) -> (NodeHandle, MaterialHandle) {
        let geometry = self.assets.add_geometry(geometry);
        let material = self.assets.add_material(material);
        let node = self.scene.add_mesh("mesh", Mesh::new(geometry, material));
        self.scene.get_node_mut(node).unwrap().transform.position = Vec3::new(0.0, 0.0, -4.0);
        (node, material)
    }

    fn compiled(&self) -> u64 {
        self.renderer.context().programs().compiled_count()
    }

    fn frame(&mut self) -> strata::RenderInfo {
        self.renderer
            .render(&mut self.scene, &mut self.assets, self.camera, None)
    }

    fn backend(&self) -> &RecordingBackend {
        self.renderer.context().backend()
    }
}

// ============================================================================
// Program sharing
// ============================================================================

#[test]
fn meshes_differing_only_in_color_share_one_program() {
    let mut h = Harness::new();
    h.add_cube(Material::basic(Vec3::X), -4.0);
    h.add_cube(Material::basic(Vec3::Z), -6.0);

    let info = h.frame();
    assert_eq!(info.draw_calls, 2);
    assert_eq!(info.triangles, 24);
    assert_eq!(info.programs, 1);
    assert_eq!(h.renderer.context().programs().compiled_count(), 1);
}

#[test]
fn color_change_does_not_recompile() {
    let mut h = Harness::new();
    let (_, material) = h.add_cube(Material::basic(Vec3::X), -4.0);
    h.frame();

    h.assets.material_mut(material).unwrap().set_color(Vec3::Y);
    h.frame();
    assert_eq!(h.backend().compile_attempts(), 1);
}

#[test]
fn attaching_a_map_compiles_a_new_program() {
    let mut h = Harness::new();
    let (_, material) = h.add_cube(Material::basic(Vec3::ONE), -4.0);
    h.frame();

    let texture = h.assets.add_texture(Texture::solid("white", [255; 4]));
    if let MaterialKind::Basic(basic) = &mut *h.assets.material_mut(material).unwrap().kind_mut() {
        basic.map = Some(texture);
    }
    let info = h.frame();

    assert_eq!(h.renderer.context().programs().compiled_count(), 2);
    // the map-less variant lost its only user
    assert_eq!(info.programs, 1);
    assert_eq!(h.backend().live_programs(), 1);
    assert_eq!(h.backend().live_textures(), 1);
    assert!(h.backend().calls().iter().any(|c| matches!(
        c,
        BackendCall::BindTexture { texture: Some(_), .. }
    )));
}

#[test]
fn enabling_vertex_colors_compiles_a_new_program() {
    let mut h = Harness::new();
    let mut geometry = Geometry::new_box(1.0, 1.0, 1.0);
    let vertices = geometry.vertex_count() as usize;
    geometry.set_attribute(
        "color",
        Attribute::new_planar(&vec![[1.0f32, 0.0, 0.0]; vertices], VertexFormat::Float32x3),
    );
    let (_, material) = h.add_mesh(geometry, Material::basic(Vec3::ONE));
    h.frame();
    assert_eq!(h.compiled(), 1);

    h.assets.material_mut(material).unwrap().settings_mut().vertex_colors = true;
    h.frame();
    assert_eq!(h.compiled(), 2);
}

#[test]
fn opting_out_of_tone_mapping_compiles_a_new_program() {
    let mut h = Harness::with_settings(RendererSettings {
        tone_mapping: ToneMapping::AcesFilmic,
        ..Default::default()
    });
    let (_, material) = h.add_cube(Material::basic(Vec3::ONE), -4.0);
    h.frame();

    h.assets.material_mut(material).unwrap().settings_mut().tone_mapped = false;
    h.frame();
    assert_eq!(h.compiled(), 2);
}

#[test]
fn relative_morph_toggle_compiles_a_new_program() {
    let mut h = Harness::new();
    let mut geometry = Geometry::new_box(1.0, 1.0, 1.0);
    let vertices = geometry.vertex_count() as usize;
    geometry.add_morph_attribute(
        "position",
        Attribute::new_planar(&vec![[0.0f32, 0.1, 0.0]; vertices], VertexFormat::Float32x3),
    );
    let geometry = h.assets.add_geometry(geometry);
    let material = h.assets.add_material(Material::basic(Vec3::ONE));
    let node = h.scene.add_mesh("morph", Mesh::new(geometry, material));
    h.scene.get_node_mut(node).unwrap().transform.position = Vec3::new(0.0, 0.0, -4.0);
    h.frame();

    h.assets
        .geometry_mut(geometry)
        .unwrap()
        .set_morph_targets_relative(true);
    h.frame();
    assert_eq!(h.compiled(), 2);
}

#[test]
fn disposed_geometries_do_not_accumulate_variants() {
    let mut h = Harness::new();
    let material = h.assets.add_material(Material::basic(Vec3::ONE));
    for _ in 0..10 {
        let geometry = h.assets.add_geometry(Geometry::new_box(1.0, 1.0, 1.0));
        let node = h.scene.add_mesh("transient", Mesh::new(geometry, material));
        h.scene.get_node_mut(node).unwrap().transform.position = Vec3::new(0.0, 0.0, -4.0);
        assert_eq!(h.frame().draw_calls, 1);

        h.scene.remove_node(node);
        h.renderer.dispose_geometry(geometry);
        h.assets.geometries.remove(geometry);
        let binding = h.renderer.context().bindings().get(material).unwrap();
        assert_eq!(binding.variant_count(), 0);
    }
    assert_eq!(h.backend().live_programs(), 0);
    assert_eq!(h.backend().live_buffers(), 0);
}

#[test]
fn feature_settings_change_marks_bindings_stale() {
    let mut h = Harness::new();
    let (_, material) = h.add_cube(Material::basic(Vec3::ONE), -4.0);
    h.frame();
    assert_eq!(h.renderer.context().bindings().state(material), BindingState::Bound);

    let toned = RendererSettings {
        tone_mapping: ToneMapping::AcesFilmic,
        ..Default::default()
    };
    h.renderer.context_mut().set_settings(toned).unwrap();
    assert_eq!(h.renderer.context().bindings().state(material), BindingState::Stale);

    h.frame();
    assert_eq!(h.renderer.context().bindings().state(material), BindingState::Bound);
    assert_eq!(h.compiled(), 2);
}

#[test]
fn second_frame_reuses_state() {
    let mut h = Harness::new();
    h.add_cube(Material::basic(Vec3::ONE), -4.0);
    h.frame();
    h.renderer.context_mut().backend_mut().clear_calls();

    h.frame();
    let backend = h.backend();
    assert_eq!(backend.count(|c| matches!(c, BackendCall::CompileProgram { .. })), 0);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::UseProgram(_))), 0);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::CreateBuffer { .. })), 0);
    assert_eq!(backend.draws().len(), 1);
}

// ============================================================================
// Failure recovery
// ============================================================================

#[test]
fn compile_failure_skips_draw_and_reports_once() {
    let mut h = Harness::new();
    h.renderer
        .context_mut()
        .backend_mut()
        .fail_on_define("DOUBLE_SIDED");

    let mut broken = Material::basic(Vec3::ONE);
    broken.settings_mut().side = strata::Side::Double;
    h.add_cube(broken, -4.0);
    h.add_cube(Material::basic(Vec3::ONE), -6.0);

    let first = h.frame();
    assert_eq!(first.draw_calls, 1);
    assert_eq!(first.skipped, 1);

    let second = h.frame();
    assert_eq!(second.draw_calls, 1);
    assert_eq!(second.skipped, 1);

    let diagnostics = h.renderer.context().diagnostics().records();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Error);
    assert!(matches!(diagnostics[0].subject, Subject::Program(_)));
    // the failed variant is not handed to the compiler again
    assert_eq!(h.backend().compile_attempts(), 2);
}

#[test]
fn missing_attribute_is_a_node_warning() {
    let mut h = Harness::new();
    let texture = h.assets.add_texture(Texture::solid("t", [0; 4]));
    let mut geometry = Geometry::new_box(1.0, 1.0, 1.0);
    geometry.delete_attribute("uv");
    let geometry = h.assets.add_geometry(geometry);

    let mut material = Material::basic(Vec3::ONE);
    if let MaterialKind::Basic(basic) = &mut *material.kind_mut() {
        basic.map = Some(texture);
    }
    let material = h.assets.add_material(material);
    let node = h.scene.add_mesh("no_uv", Mesh::new(geometry, material));
    h.scene.get_node_mut(node).unwrap().transform.position = Vec3::new(0.0, 0.0, -4.0);

    let info = h.frame();
    assert_eq!(info.skipped, 1);
    let records = h.renderer.context().diagnostics().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subject, Subject::Node(node));
    assert_eq!(records[0].severity, Severity::Warning);
}

#[test]
fn unknown_camera_draws_nothing() {
    let mut h = Harness::new();
    h.add_cube(Material::basic(Vec3::ONE), -4.0);
    let not_a_camera = h.scene.create_node("empty");

    let info = h
        .renderer
        .render(&mut h.scene, &mut h.assets, not_a_camera, None);
    assert_eq!(info.draw_calls, 0);
    assert_eq!(h.renderer.context().diagnostics().len(), 1);
}

// ============================================================================
// Transmission
// ============================================================================

#[test]
fn transmissive_material_triggers_offscreen_pass() {
    let mut h = Harness::new();
    h.add_cube(Material::basic(Vec3::ONE), -8.0);
    h.add_cube(
        Material::physical(PhysicalMaterial {
            transmission: 1.0,
            ..Default::default()
        }),
        -4.0,
    );

    let info = h.frame();
    // opaque cube twice (snapshot + main), transmissive once
    assert_eq!(info.draw_calls, 3);

    let backend = h.backend();
    assert_eq!(
        backend.count(|c| matches!(c, BackendCall::CreateRenderTarget { width: 64, height: 64, .. })),
        1
    );
    assert_eq!(backend.count(|c| matches!(c, BackendCall::ResolveRenderTarget(_))), 1);

    h.frame();
    assert_eq!(
        h.backend()
            .count(|c| matches!(c, BackendCall::CreateRenderTarget { .. })),
        1
    );
}

#[test]
fn opaque_only_frames_skip_the_offscreen_pass() {
    let mut h = Harness::new();
    h.add_cube(Material::basic(Vec3::ONE), -4.0);
    h.frame();
    assert_eq!(
        h.backend()
            .count(|c| matches!(c, BackendCall::CreateRenderTarget { .. })),
        0
    );
}

// ============================================================================
// Disposal & counters
// ============================================================================

#[test]
fn dispose_material_releases_its_program() {
    let mut h = Harness::new();
    let (_, material) = h.add_cube(Material::basic(Vec3::ONE), -4.0);
    h.frame();
    assert_eq!(h.backend().live_programs(), 1);

    h.renderer.dispose_material(material);
    assert_eq!(h.backend().live_programs(), 0);
    assert!(h.renderer.context().programs().is_empty());
}

#[test]
fn dispose_returns_backend_with_nothing_live() {
    let mut h = Harness::new();
    h.add_cube(Material::basic(Vec3::ONE), -4.0);
    h.frame();
    assert!(h.backend().live_buffers() > 0);

    let backend = h.renderer.dispose();
    assert_eq!(backend.live_programs(), 0);
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.live_textures(), 0);
}

#[test]
fn culled_objects_are_counted() {
    let mut h = Harness::new();
    h.add_cube(Material::basic(Vec3::ONE), -4.0);
    h.add_cube(Material::basic(Vec3::ONE), 10.0);

    let info = h.frame();
    assert_eq!(info.frame, 1);
    assert_eq!(info.draw_calls, 1);
    assert_eq!(info.culled, 1);
    assert_eq!(h.frame().frame, 2);
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn settings_from_json_feed_the_context() -> anyhow::Result<()> {
    let settings = RendererSettings::from_json(
        r#"{ "tone_mapping": "AcesFilmic", "max_texture_units": 4, "sort_objects": false }"#,
    )?;
    let renderer = Renderer::new(RecordingBackend::new(), settings.clone(), 8, 8)?;
    assert_eq!(renderer.context().settings(), &settings);
    assert_eq!(renderer.context().state().current().texture_units.len(), 4);

    let round_trip = RendererSettings::from_json(&settings.to_json()?)?;
    assert_eq!(round_trip, settings);
    Ok(())
}

#[test]
fn invalid_settings_are_rejected() {
    let err = RendererSettings::from_json(r#"{ "transmission_resolution_scale": 0.0 }"#);
    assert!(matches!(err, Err(strata::StrataError::Config(_))));

    let mut h = Harness::new();
    let bad = RendererSettings {
        max_texture_units: Some(0),
        ..Default::default()
    };
    assert!(h.renderer.context_mut().set_settings(bad).is_err());
}
