//! Program Cache Tests
//!
//! Tests for:
//! - Feature key derivation: uniform values never change the key, structural
//!   options always do
//! - Material versioning through `kind_mut` / `settings_mut` guards
//! - Reference counted acquisition / release / prune
//! - Compile failure reporting and custom templates

use glam::{Vec3, Vec4};
use wgpu::VertexFormat;

use strata::assets::Assets;
use strata::renderer::RendererSettings;
use strata::renderer::backend::RecordingBackend;
use strata::renderer::program::{
    FeatureKey, ObjectFeatures, ObjectFlags, ProgramCache, ProgramInputs, ProgramParameters,
};
use strata::resources::{
    Attribute, Geometry, Material, MaterialKind, ShaderDefines, Side, Texture, ToneMapping,
};
use strata::resources::material::ShaderMaterial;
use strata::scene::{Light, LightState};
use strata::StrataError;

struct Fixture {
    assets: Assets,
    geometry: Geometry,
    lights: LightState,
    settings: RendererSettings,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            assets: Assets::new(),
            geometry: Geometry::new_box(1.0, 1.0, 1.0),
            lights: LightState::default(),
            settings: RendererSettings::default(),
        }
    }

    fn params(&self, material: &Material) -> strata::Result<ProgramParameters> {
        self.params_with(material, ObjectFeatures::default())
    }

    fn params_with(
        &self,
        material: &Material,
        object: ObjectFeatures,
    ) -> strata::Result<ProgramParameters> {
        ProgramParameters::derive(&ProgramInputs {
            material,
            geometry: &self.geometry,
            lights: &self.lights,
            settings: &self.settings,
            fog: None,
            textures: &self.assets.textures,
            object,
        })
    }

    fn key(&self, material: &Material) -> FeatureKey {
        self.params(material).unwrap().key()
    }
}

fn set_map(material: &mut Material, texture: Option<strata::TextureHandle>) {
    if let MaterialKind::Basic(basic) = &mut *material.kind_mut() {
        basic.map = texture;
    }
}

// ============================================================================
// Feature key
// ============================================================================

#[test]
fn materials_differing_only_in_color_share_a_key() {
    let fx = Fixture::new();
    let red = Material::basic(Vec3::X);
    let blue = Material::basic(Vec3::Z);
    assert_eq!(fx.key(&red), fx.key(&blue));
}

#[test]
fn attaching_a_map_changes_the_key() {
    let mut fx = Fixture::new();
    let texture = fx.assets.add_texture(Texture::solid("white", [255; 4]));
    let mut material = Material::basic(Vec3::ONE);
    let before = fx.key(&material);

    set_map(&mut material, Some(texture));
    let after = fx.key(&material);
    assert_ne!(before, after);

    let params = fx.params(&material).unwrap();
    assert!(params.defines.contains("USE_MAP"));
    assert!(params.textures.iter().any(|t| t == "map"));
}

#[test]
fn structural_settings_change_the_key() {
    let fx = Fixture::new();
    let base = Material::basic(Vec3::ONE);
    let base_key = fx.key(&base);

    let mut double = base.clone();
    double.settings_mut().side = Side::Double;
    assert_ne!(fx.key(&double), base_key);

    let mut clipped = base.clone();
    clipped.settings_mut().clipping_planes = vec![Vec4::new(0.0, 1.0, 0.0, 0.0)];
    assert_ne!(fx.key(&clipped), base_key);
}

#[test]
fn output_settings_and_lights_change_the_key() {
    let mut fx = Fixture::new();
    let material = Material::lambert(Vec3::ONE);
    let base_key = fx.key(&material);

    fx.settings.tone_mapping = ToneMapping::AcesFilmic;
    let toned = fx.key(&material);
    assert_ne!(toned, base_key);

    fx.settings.tone_mapping_exposure = 3.0;
    assert_eq!(fx.key(&material), toned);

    fx.lights
        .push(&Light::new_directional(Vec3::ONE, 1.0), &glam::Affine3A::IDENTITY);
    fx.lights.finish();
    assert_ne!(fx.key(&material), toned);
}

#[test]
fn unlit_materials_ignore_lights() {
    let mut fx = Fixture::new();
    let material = Material::basic(Vec3::ONE);
    let before = fx.key(&material);
    fx.lights
        .push(&Light::new_point(Vec3::ONE, 1.0, 10.0), &glam::Affine3A::IDENTITY);
    fx.lights.finish();
    assert_eq!(fx.key(&material), before);
}

#[test]
fn skinning_enters_the_key() {
    let fx = Fixture::new();
    let material = Material::basic(Vec3::ONE);
    let plain = fx.params(&material).unwrap().key();
    let skinned = fx
        .params_with(
            &material,
            ObjectFeatures {
                bones: 4,
                flags: ObjectFlags::SKINNED,
                ..ObjectFeatures::default()
            },
        )
        .unwrap();
    assert_ne!(skinned.key(), plain);
    assert!(skinned.defines.contains("USE_SKINNING"));
    assert!(skinned.uniforms.iter().any(|u| u.name == "bone_matrices[3]"));
}

#[test]
fn map_without_uv_channel_is_a_missing_attribute() {
    let mut fx = Fixture::new();
    let texture = fx.assets.add_texture(Texture::solid("white", [255; 4]));
    fx.geometry.delete_attribute("uv");
    let mut material = Material::basic(Vec3::ONE);
    set_map(&mut material, Some(texture));

    let err = fx.params(&material).unwrap_err();
    assert!(matches!(err, StrataError::MissingAttribute { ref name, .. } if name == "uv"));
}

// ============================================================================
// Material versioning
// ============================================================================

#[test]
fn uniform_only_changes_keep_the_version() {
    let mut material = Material::basic(Vec3::ONE);
    let version = material.version();
    material.set_color(Vec3::new(0.2, 0.4, 0.6));
    material.set_opacity(0.5);
    assert_eq!(material.version(), version);
    assert!(material.uniforms_version() > 0);
}

#[test]
fn structural_changes_bump_the_version() {
    let mut assets = Assets::new();
    let texture = assets.add_texture(Texture::solid("t", [0; 4]));
    let mut material = Material::basic(Vec3::ONE);

    let v0 = material.version();
    set_map(&mut material, Some(texture));
    let v1 = material.version();
    assert!(v1 > v0);

    // same texture again: same features
    set_map(&mut material, Some(texture));
    assert_eq!(material.version(), v1);

    material.settings_mut().transparent = true;
    assert!(material.version() > v1);
}

#[test]
fn renderer_dependent_toggles_bump_the_version_and_key() {
    let mut fx = Fixture::new();
    fx.settings.tone_mapping = ToneMapping::AcesFilmic;
    let vertices = fx.geometry.vertex_count() as usize;
    fx.geometry.set_attribute(
        "color",
        Attribute::new_planar(&vec![[1.0f32, 1.0, 1.0]; vertices], VertexFormat::Float32x3),
    );
    let mut material = Material::basic(Vec3::ONE);
    let (v0, k0) = (material.version(), fx.key(&material));

    material.settings_mut().vertex_colors = true;
    let (v1, k1) = (material.version(), fx.key(&material));
    assert!(v1 > v0);
    assert_ne!(k1, k0);

    material.settings_mut().tone_mapped = false;
    assert!(material.version() > v1);
    assert_ne!(fx.key(&material), k1);
}

// ============================================================================
// Reference counting
// ============================================================================

#[test]
fn acquire_twice_release_twice_evicts() {
    let fx = Fixture::new();
    let mut backend = RecordingBackend::new();
    let mut cache = ProgramCache::new().unwrap();
    let params = fx.params(&Material::basic(Vec3::ONE)).unwrap();
    let key = params.key();

    let first = cache.acquire(&mut backend, &params).unwrap();
    let second = cache.acquire(&mut backend, &params).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(cache.use_count(key), 2);
    assert_eq!(backend.compiled_programs(), 1);

    assert!(!cache.release(&mut backend, first));
    assert!(cache.contains(key));
    assert_eq!(cache.use_count(key), 1);

    assert!(cache.release(&mut backend, second));
    assert!(!cache.contains(key));
    assert_eq!(backend.live_programs(), 0);
}

#[test]
fn shared_key_compiles_once_for_distinct_materials() {
    let fx = Fixture::new();
    let mut backend = RecordingBackend::new();
    let mut cache = ProgramCache::new().unwrap();

    let a = cache
        .acquire(&mut backend, &fx.params(&Material::basic(Vec3::X)).unwrap())
        .unwrap();
    let b = cache
        .acquire(&mut backend, &fx.params(&Material::basic(Vec3::Y)).unwrap())
        .unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.compiled_count(), 1);
}

// ============================================================================
// Failures and templates
// ============================================================================

#[test]
fn compile_failure_carries_flags() {
    let fx = Fixture::new();
    let mut backend = RecordingBackend::new();
    backend.fail_on_define("USE_MAP");
    let mut cache = ProgramCache::new().unwrap();

    let mut assets = Assets::new();
    let texture = assets.add_texture(Texture::solid("t", [0; 4]));
    let mut material = Material::basic(Vec3::ONE);
    set_map(&mut material, Some(texture));
    let params = fx.params(&material).unwrap();

    let err = cache.acquire(&mut backend, &params).unwrap_err();
    match err {
        StrataError::ProgramCompile { key, flags, .. } => {
            assert_eq!(key, params.key().0);
            assert!(flags.contains("USE_MAP"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(cache.failure(params.key()).is_some());
    assert!(cache.is_empty());
}

#[test]
fn custom_template_compiles_after_registration() {
    let fx = Fixture::new();
    let mut backend = RecordingBackend::new();
    let mut cache = ProgramCache::new().unwrap();

    let mut shader = ShaderMaterial::new("wobble");
    shader.defines = ShaderDefines::from(&[("WOBBLE_AMOUNT", "3")][..]);
    shader
        .uniforms
        .insert("time".to_string(), 0.0_f32.into());
    let material = Material::shader(shader);
    let params = fx.params(&material).unwrap();

    let missing = cache.acquire(&mut backend, &params).unwrap_err();
    assert!(matches!(missing, StrataError::ShaderTemplate { .. }));

    cache
        .register_template(
            "wobble",
            "$$ include \"common\"\nconst WOBBLE: i32 = {{ WOBBLE_AMOUNT }};\n",
        )
        .unwrap();
    let program = cache.acquire(&mut backend, &params).unwrap();
    assert!(program.uniform_location("time").is_some());
    assert!(program.flags.contains("WOBBLE_AMOUNT"));
}
