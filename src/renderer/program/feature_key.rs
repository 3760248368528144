//! Feature key derivation.
//!
//! [`ProgramParameters::derive`] collects every input that selects shader code
//! paths: material defines, the geometry's attribute layout, light counts, the
//! output target and per-object switches (skinning, morphing, shadows). Plain
//! uniform values never enter it. Two draws whose parameters hash to the same
//! [`FeatureKey`] share one compiled program.

use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use rustc_hash::FxHasher;
use wgpu::VertexFormat;

use crate::assets::{AssetStorage, TextureHandle};
use crate::errors::{Result, StrataError};
use crate::renderer::backend::{AttributeDecl, UniformDecl};
use crate::renderer::settings::RendererSettings;
use crate::resources::{ColorSpace, Geometry, Material, ShaderDefines, Texture};
use crate::scene::{DrawMode, Fog, LightState};

/// Sampler of the resolved opaque snapshot read by transmissive materials.
pub const TRANSMISSION_SAMPLER: &str = "transmission_sampler_map";

/// Hash identifying one program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureKey(pub u64);

impl std::fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

bitflags! {
    /// Per-object switches that select code paths.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        const RECEIVE_SHADOW = 1 << 0;
        const CAST_SHADOW    = 1 << 1;
        const SKINNED        = 1 << 2;
    }
}

/// Per-object inputs that live outside material and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectFeatures {
    /// Bone count of a skinned mesh.
    pub bones: u32,
    pub flags: ObjectFlags,
    pub mode: DrawMode,
}

impl ObjectFeatures {
    #[must_use]
    pub fn skinned(&self) -> bool {
        self.flags.contains(ObjectFlags::SKINNED) && self.bones > 0
    }
}

/// Everything a program variant is derived from.
pub struct ProgramInputs<'a> {
    pub material: &'a Material,
    pub geometry: &'a Geometry,
    pub lights: &'a LightState,
    pub settings: &'a RendererSettings,
    pub fog: Option<&'a Fog>,
    pub textures: &'a AssetStorage<TextureHandle, Texture>,
    pub object: ObjectFeatures,
}

/// Structural description of a program, ready for source generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramParameters {
    pub template: String,
    pub label: String,
    pub defines: ShaderDefines,
    pub attributes: Vec<AttributeDecl>,
    pub uniforms: Vec<UniformDecl>,
    /// Sampler uniforms, in binding order.
    pub textures: Vec<String>,
}

/// Uniforms every program receives from the frame driver.
const OBJECT_UNIFORMS: &[(&str, &str)] = &[
    ("model_matrix", "mat4x4<f32>"),
    ("model_view_matrix", "mat4x4<f32>"),
    ("normal_matrix", "mat3x3<f32>"),
    ("view_matrix", "mat4x4<f32>"),
    ("projection_matrix", "mat4x4<f32>"),
    ("camera_position", "vec3<f32>"),
    ("tone_mapping_exposure", "f32"),
];

impl ProgramParameters {
    /// Derives the program description for one draw.
    ///
    /// Fails with [`StrataError::MissingAttribute`] when an enabled feature
    /// needs an attribute the geometry does not carry.
    pub fn derive(inputs: &ProgramInputs<'_>) -> Result<Self> {
        let material = inputs.material;
        let geometry = inputs.geometry;
        let settings = material.settings();

        if !geometry.has_attribute("position") {
            return Err(StrataError::MissingAttribute {
                name: "position".to_string(),
                feature: material.kind().type_name().to_string(),
            });
        }

        let mut defines = material.shader_defines();
        defines.merge(&geometry.shader_defines());

        let slots = material.texture_slots();
        if let Some(slot) = slots.iter().find(|s| s.define.is_some()) {
            if !geometry.has_attribute("uv") {
                return Err(StrataError::MissingAttribute {
                    name: "uv".to_string(),
                    feature: slot.define.unwrap_or_default().to_string(),
                });
            }
        }
        for slot in &slots {
            let color_space = inputs
                .textures
                .get(slot.handle)
                .map_or(ColorSpace::NoColorSpace, |t| t.color_space);
            defines.set(
                &format!("{}_COLOR_SPACE", slot.uniform.to_ascii_uppercase()),
                color_space.define_value(),
            );
        }

        defines.toggle(
            "USE_COLOR",
            settings.vertex_colors && geometry.has_attribute("color"),
        );

        if material.kind().is_lit() {
            inputs.lights.append_defines(&mut defines);
            defines.toggle(
                "USE_SHADOWMAP_RECEIVE",
                inputs.settings.shadow_map_enabled
                    && inputs.object.flags.contains(ObjectFlags::RECEIVE_SHADOW),
            );
        }

        inputs.settings.append_defines(&mut defines, settings.tone_mapped);

        if settings.fog {
            if let Some(fog) = inputs.fog {
                fog.append_defines(&mut defines);
            }
        }

        if inputs.object.skinned() {
            defines.set("USE_SKINNING", "1");
            defines.set_count("MAX_BONES", inputs.object.bones as usize);
        }
        defines.toggle("USE_POINTS", inputs.object.mode == DrawMode::Points);

        let mut attributes: Vec<AttributeDecl> = geometry
            .attributes()
            .iter()
            .map(|(name, attr)| AttributeDecl {
                name: name.clone(),
                format: attr.format,
                instanced: attr.is_instanced(),
            })
            .collect();
        attributes.sort_by(|a, b| a.name.cmp(&b.name));
        for (channel, targets) in [
            ("position", geometry.morph_attributes("position")),
            ("normal", geometry.morph_attributes("normal")),
        ] {
            for (i, attr) in targets.iter().enumerate() {
                attributes.push(AttributeDecl {
                    name: format!("morph_{channel}_{i}"),
                    format: attr.format,
                    instanced: false,
                });
            }
        }

        let uniforms = Self::collect_uniforms(inputs, &defines, &slots);
        let mut textures: Vec<String> = slots.iter().map(|s| s.uniform.to_string()).collect();
        if defines.contains("USE_TRANSMISSION") {
            textures.push(TRANSMISSION_SAMPLER.to_string());
        }

        Ok(Self {
            template: material.template_name().to_string(),
            label: format!("{} ({})", material.kind().type_name(), material.template_name()),
            defines,
            attributes,
            uniforms,
            textures,
        })
    }

    fn collect_uniforms(
        inputs: &ProgramInputs<'_>,
        defines: &ShaderDefines,
        slots: &[crate::resources::TextureSlot<'_>],
    ) -> Vec<UniformDecl> {
        let mut uniforms: Vec<UniformDecl> = OBJECT_UNIFORMS
            .iter()
            .map(|&(name, ty)| decl(name, ty))
            .collect();

        for (name, value) in inputs.material.uniform_values() {
            uniforms.push(decl(name, value.wgsl_type_name()));
        }
        for slot in slots {
            uniforms.push(decl(slot.uniform, "i32"));
            uniforms.push(decl(&format!("{}_transform", slot.uniform), "mat3x3<f32>"));
        }

        if defines.contains("USE_TRANSMISSION") {
            uniforms.push(decl(TRANSMISSION_SAMPLER, "i32"));
            uniforms.push(decl("transmission_sampler_size", "vec2<f32>"));
        }

        if inputs.material.kind().is_lit() {
            uniforms.push(decl("ambient_light_color", "vec3<f32>"));
            let lights = inputs.lights;
            for (prefix, count, fields) in [
                ("directional_lights", lights.num_directional, &["color", "direction"][..]),
                ("point_lights", lights.num_point, &["color", "position", "distance", "decay"][..]),
                (
                    "spot_lights",
                    lights.num_spot,
                    &["color", "position", "direction", "distance", "cone_cos", "penumbra_cos", "decay"][..],
                ),
                ("hemisphere_lights", lights.num_hemi, &["sky_color", "ground_color", "direction"][..]),
                ("rect_area_lights", lights.num_rect_area, &["color", "position", "half_width", "half_height"][..]),
            ] {
                for i in 0..count {
                    for field in fields {
                        let ty = match *field {
                            "distance" | "decay" | "cone_cos" | "penumbra_cos" => "f32",
                            _ => "vec3<f32>",
                        };
                        uniforms.push(decl(&format!("{prefix}[{i}].{field}"), ty));
                    }
                }
            }
        }

        if defines.contains("USE_FOG") {
            uniforms.push(decl("fog_color", "vec3<f32>"));
            if defines.contains("FOG_EXP2") {
                uniforms.push(decl("fog_density", "f32"));
            } else {
                uniforms.push(decl("fog_near", "f32"));
                uniforms.push(decl("fog_far", "f32"));
            }
        }

        let clip_count = inputs.settings.clipping_planes.len()
            + inputs.material.settings().clipping_planes.len();
        for i in 0..clip_count {
            uniforms.push(decl(&format!("clipping_planes[{i}]"), "vec4<f32>"));
        }

        for i in 0..inputs.geometry.morph_target_count() {
            uniforms.push(decl(&format!("morph_target_influences[{i}]"), "f32"));
        }
        let bones = if inputs.object.skinned() { inputs.object.bones } else { 0 };
        for i in 0..bones {
            uniforms.push(decl(&format!("bone_matrices[{i}]"), "mat4x4<f32>"));
        }

        uniforms
    }

    /// Feature key of this variant.
    #[must_use]
    pub fn key(&self) -> FeatureKey {
        let mut hasher = FxHasher::default();
        self.template.hash(&mut hasher);
        self.defines.hash(&mut hasher);
        for attr in &self.attributes {
            attr.name.hash(&mut hasher);
            attr.format.hash(&mut hasher);
            attr.instanced.hash(&mut hasher);
        }
        for uniform in &self.uniforms {
            uniform.name.hash(&mut hasher);
            uniform.wgsl_type.hash(&mut hasher);
        }
        self.textures.hash(&mut hasher);
        FeatureKey(hasher.finish())
    }

    /// Active defines as `NAME=value` pairs, for error reports.
    #[must_use]
    pub fn flags(&self) -> String {
        self.defines.describe()
    }
}

fn decl(name: &str, wgsl_type: &'static str) -> UniformDecl {
    UniformDecl {
        name: name.to_string(),
        wgsl_type,
    }
}

/// WGSL type of a vertex input.
#[must_use]
pub fn wgsl_vertex_type(format: VertexFormat) -> &'static str {
    match format {
        VertexFormat::Float32 => "f32",
        VertexFormat::Float32x2 | VertexFormat::Unorm16x2 | VertexFormat::Snorm16x2 => "vec2<f32>",
        VertexFormat::Float32x3 => "vec3<f32>",
        VertexFormat::Uint32 => "u32",
        VertexFormat::Uint32x2 => "vec2<u32>",
        VertexFormat::Uint32x3 => "vec3<u32>",
        VertexFormat::Uint16x4 | VertexFormat::Uint8x4 | VertexFormat::Uint32x4 => "vec4<u32>",
        VertexFormat::Sint32 => "i32",
        _ => "vec4<f32>",
    }
}

/// Hash of the color spaces of the textures `material` samples.
#[must_use]
pub fn texture_color_space_hash(
    material: &Material,
    textures: &AssetStorage<TextureHandle, Texture>,
) -> u64 {
    let mut hasher = FxHasher::default();
    for slot in material.texture_slots() {
        textures
            .get(slot.handle)
            .map(|t| t.color_space)
            .hash(&mut hasher);
    }
    hasher.finish()
}
