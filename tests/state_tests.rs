//! GPU State Tracker Tests
//!
//! Tests for:
//! - Redundant state elimination across consecutive draws
//! - Texture unit limits
//! - Resetting to the default pipeline state

use glam::Vec3;

use strata::StrataError;
use strata::assets::Assets;
use strata::renderer::backend::BackendCall;
use strata::renderer::state::PipelineState;
use strata::renderer::{RecordingBackend, Renderer, RendererSettings, Subject};
use strata::resources::{Geometry, Material, MaterialKind, Texture};
use strata::scene::{Camera, Mesh, NodeHandle, Scene};

fn setup(settings: RendererSettings) -> (Renderer<RecordingBackend>, Scene, Assets, NodeHandle) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut scene = Scene::new();
    let camera = scene.add_camera("camera", Camera::new_perspective(50.0, 1.0, 0.1, 100.0));
    let renderer = Renderer::new(RecordingBackend::new(), settings, 32, 32).unwrap();
    (renderer, scene, Assets::new(), camera)
}

#[test]
fn identical_consecutive_draws_change_no_state() {
    let (mut renderer, mut scene, mut assets, camera) = setup(RendererSettings::default());
    let geometry = assets.add_geometry(Geometry::new_box(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::lambert(Vec3::ONE));
    for x in [-1.0, 1.0] {
        let node = scene.add_mesh("cube", Mesh::new(geometry, material));
        scene.get_node_mut(node).unwrap().transform.position = Vec3::new(x, 0.0, -5.0);
    }

    renderer.render(&mut scene, &mut assets, camera, None);

    let calls = renderer.context().backend().calls();
    let draws: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, BackendCall::Draw(_)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(draws.len(), 2);

    let between = &calls[draws[0] + 1..draws[1]];
    assert!(between.iter().all(|c| !c.is_state_change()), "{between:?}");
    assert!(
        !between
            .iter()
            .any(|c| matches!(c, BackendCall::BindVertexAttribute { .. }))
    );
    // per-object matrices still change
    assert!(between.iter().any(|c| matches!(c, BackendCall::SetUniform { .. })));
}

#[test]
fn texture_unit_exhaustion_is_reported_once() {
    let settings = RendererSettings {
        max_texture_units: Some(1),
        ..Default::default()
    };
    let (mut renderer, mut scene, mut assets, camera) = setup(settings);

    let color = assets.add_texture(Texture::solid("color", [255; 4]));
    let alpha = assets.add_texture(Texture::solid("alpha", [128; 4]));
    let mut material = Material::basic(Vec3::ONE);
    if let MaterialKind::Basic(basic) = &mut *material.kind_mut() {
        basic.map = Some(color);
        basic.alpha_map = Some(alpha);
    }
    let material = assets.add_material(material);
    let geometry = assets.add_geometry(Geometry::new_box(1.0, 1.0, 1.0));
    let node = scene.add_mesh("cube", Mesh::new(geometry, material));
    scene.get_node_mut(node).unwrap().transform.position = Vec3::new(0.0, 0.0, -5.0);

    let first = renderer.render(&mut scene, &mut assets, camera, None);
    let second = renderer.render(&mut scene, &mut assets, camera, None);
    assert_eq!(first.draw_calls, 1);
    assert_eq!(second.draw_calls, 1);

    let records = renderer.context().diagnostics().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subject, Subject::Texture(alpha));
    assert!(matches!(
        records[0].error,
        StrataError::TextureUnitsExhausted { available: 1, .. }
    ));
}

#[test]
fn reset_state_restores_defaults_after_a_frame() {
    let (mut renderer, mut scene, mut assets, camera) = setup(RendererSettings::default());
    let geometry = assets.add_geometry(Geometry::new_box(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::basic(Vec3::ONE));
    let node = scene.add_mesh("cube", Mesh::new(geometry, material));
    scene.get_node_mut(node).unwrap().transform.position = Vec3::new(0.0, 0.0, -5.0);
    renderer.render(&mut scene, &mut assets, camera, None);

    let caps = *renderer.context().capabilities();
    assert_ne!(
        renderer.context().state().current(),
        &PipelineState::defaults(caps.max_texture_units, caps.max_vertex_attributes)
    );

    renderer.context_mut().reset_state();
    assert_eq!(
        renderer.context().state().current(),
        &PipelineState::defaults(caps.max_texture_units, caps.max_vertex_attributes)
    );

    // the next frame rebinds what reset dropped
    renderer.context_mut().backend_mut().clear_calls();
    renderer.render(&mut scene, &mut assets, camera, None);
    let backend = renderer.context().backend();
    assert_eq!(backend.count(|c| matches!(c, BackendCall::UseProgram(Some(_)))), 1);
    assert_eq!(backend.draws().len(), 1);
}
