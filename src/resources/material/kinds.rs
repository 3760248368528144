//! Per-family material parameters.
//!
//! Every family is a plain struct with typed fields. Scalar and color fields
//! are uniform data; texture slots switch shader features on and off.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3};

use crate::assets::TextureHandle;
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::UniformValue;

/// A populated texture slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureSlot<'a> {
    /// Sampler uniform name.
    pub uniform: &'a str,
    /// Feature define switched on by this slot, if any.
    pub define: Option<&'static str>,
    pub handle: TextureHandle,
}

/// Pushes one [`TextureSlot`] per populated `Option<TextureHandle>` field.
macro_rules! collect_slots {
    ($self:ident, $out:ident; $($field:ident => $define:literal),* $(,)?) => {
        $(
            if let Some(handle) = $self.$field {
                $out.push(TextureSlot {
                    uniform: stringify!($field),
                    define: Some($define),
                    handle,
                });
            }
        )*
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    pub color: Vec3,
    pub opacity: f32,
    pub reflectivity: f32,
    pub ao_map_intensity: f32,
    pub map: Option<TextureHandle>,
    pub alpha_map: Option<TextureHandle>,
    pub ao_map: Option<TextureHandle>,
    pub specular_map: Option<TextureHandle>,
    pub env_map: Option<TextureHandle>,
}

impl Default for BasicMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            reflectivity: 1.0,
            ao_map_intensity: 1.0,
            map: None,
            alpha_map: None,
            ao_map: None,
            specular_map: None,
            env_map: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambertMaterial {
    pub color: Vec3,
    pub opacity: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    pub map: Option<TextureHandle>,
    pub alpha_map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    pub emissive_map: Option<TextureHandle>,
    pub ao_map: Option<TextureHandle>,
    pub env_map: Option<TextureHandle>,
}

impl Default for LambertMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            map: None,
            alpha_map: None,
            normal_map: None,
            emissive_map: None,
            ao_map: None,
            env_map: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhongMaterial {
    pub color: Vec3,
    pub opacity: f32,
    pub specular: Vec3,
    pub shininess: f32,
    pub emissive: Vec3,
    pub map: Option<TextureHandle>,
    pub alpha_map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    pub emissive_map: Option<TextureHandle>,
    pub specular_map: Option<TextureHandle>,
    pub ao_map: Option<TextureHandle>,
    pub env_map: Option<TextureHandle>,
}

impl Default for PhongMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            specular: Vec3::splat(0.066),
            shininess: 30.0,
            emissive: Vec3::ZERO,
            map: None,
            alpha_map: None,
            normal_map: None,
            emissive_map: None,
            specular_map: None,
            ao_map: None,
            env_map: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StandardMaterial {
    pub color: Vec3,
    pub opacity: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    pub normal_scale: Vec2,
    pub env_map_intensity: f32,
    pub map: Option<TextureHandle>,
    pub alpha_map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    pub roughness_map: Option<TextureHandle>,
    pub metalness_map: Option<TextureHandle>,
    pub emissive_map: Option<TextureHandle>,
    pub ao_map: Option<TextureHandle>,
    pub env_map: Option<TextureHandle>,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            roughness: 1.0,
            metalness: 0.0,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            normal_scale: Vec2::ONE,
            env_map_intensity: 1.0,
            map: None,
            alpha_map: None,
            normal_map: None,
            roughness_map: None,
            metalness_map: None,
            emissive_map: None,
            ao_map: None,
            env_map: None,
        }
    }
}

/// Standard material plus the physically based extensions.
///
/// `transmission`, `clearcoat`, `sheen` and `iridescence` act as feature
/// switches when they cross zero and as uniform values otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalMaterial {
    pub standard: StandardMaterial,
    pub ior: f32,
    pub transmission: f32,
    pub thickness: f32,
    pub attenuation_color: Vec3,
    pub attenuation_distance: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub sheen: f32,
    pub sheen_color: Vec3,
    pub iridescence: f32,
    pub transmission_map: Option<TextureHandle>,
    pub thickness_map: Option<TextureHandle>,
    pub clearcoat_map: Option<TextureHandle>,
}

impl Default for PhysicalMaterial {
    fn default() -> Self {
        Self {
            standard: StandardMaterial::default(),
            ior: 1.5,
            transmission: 0.0,
            thickness: 0.0,
            attenuation_color: Vec3::ONE,
            attenuation_distance: f32::INFINITY,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            sheen: 0.0,
            sheen_color: Vec3::ZERO,
            iridescence: 0.0,
            transmission_map: None,
            thickness_map: None,
            clearcoat_map: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointsMaterial {
    pub color: Vec3,
    pub opacity: f32,
    pub size: f32,
    pub size_attenuation: bool,
    pub map: Option<TextureHandle>,
    pub alpha_map: Option<TextureHandle>,
}

impl Default for PointsMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            size: 1.0,
            size_attenuation: true,
            map: None,
            alpha_map: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineMaterial {
    pub color: Vec3,
    pub opacity: f32,
    pub line_width: f32,
    pub dashed: bool,
    pub dash_size: f32,
    pub gap_size: f32,
    pub scale: f32,
}

impl Default for LineMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            line_width: 1.0,
            dashed: false,
            dash_size: 3.0,
            gap_size: 1.0,
            scale: 1.0,
        }
    }
}

/// User-authored program: a template name plus explicit defines and uniforms.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderMaterial {
    pub template: String,
    pub defines: ShaderDefines,
    pub uniforms: BTreeMap<String, UniformValue>,
    /// Whether the template consumes scene lights.
    pub lights: bool,
}

impl ShaderMaterial {
    #[must_use]
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            ..Default::default()
        }
    }
}

/// Tagged material family.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    Basic(BasicMaterial),
    Lambert(LambertMaterial),
    Phong(PhongMaterial),
    Standard(StandardMaterial),
    Physical(PhysicalMaterial),
    Points(PointsMaterial),
    Line(LineMaterial),
    Shader(ShaderMaterial),
}

impl MaterialKind {
    /// Shader template this family renders with.
    #[must_use]
    pub fn template_name(&self) -> &str {
        match self {
            MaterialKind::Basic(_) => "mesh_basic",
            MaterialKind::Lambert(_) => "mesh_lambert",
            MaterialKind::Phong(_) => "mesh_phong",
            MaterialKind::Standard(_) | MaterialKind::Physical(_) => "mesh_physical",
            MaterialKind::Points(_) => "points",
            MaterialKind::Line(_) => "line",
            MaterialKind::Shader(s) => &s.template,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            MaterialKind::Basic(_) => "MeshBasicMaterial",
            MaterialKind::Lambert(_) => "MeshLambertMaterial",
            MaterialKind::Phong(_) => "MeshPhongMaterial",
            MaterialKind::Standard(_) => "MeshStandardMaterial",
            MaterialKind::Physical(_) => "MeshPhysicalMaterial",
            MaterialKind::Points(_) => "PointsMaterial",
            MaterialKind::Line(_) => "LineMaterial",
            MaterialKind::Shader(_) => "ShaderMaterial",
        }
    }

    /// Whether scene lights feed this family's program.
    #[must_use]
    pub fn is_lit(&self) -> bool {
        match self {
            MaterialKind::Lambert(_)
            | MaterialKind::Phong(_)
            | MaterialKind::Standard(_)
            | MaterialKind::Physical(_) => true,
            MaterialKind::Shader(s) => s.lights,
            _ => false,
        }
    }

    #[must_use]
    pub fn opacity(&self) -> f32 {
        match self {
            MaterialKind::Basic(m) => m.opacity,
            MaterialKind::Lambert(m) => m.opacity,
            MaterialKind::Phong(m) => m.opacity,
            MaterialKind::Standard(m) => m.opacity,
            MaterialKind::Physical(m) => m.standard.opacity,
            MaterialKind::Points(m) => m.opacity,
            MaterialKind::Line(m) => m.opacity,
            MaterialKind::Shader(_) => 1.0,
        }
    }

    #[must_use]
    pub fn transmission(&self) -> f32 {
        match self {
            MaterialKind::Physical(m) => m.transmission,
            _ => 0.0,
        }
    }

    /// Base color, if the family has one.
    pub fn color_mut(&mut self) -> Option<&mut Vec3> {
        match self {
            MaterialKind::Basic(m) => Some(&mut m.color),
            MaterialKind::Lambert(m) => Some(&mut m.color),
            MaterialKind::Phong(m) => Some(&mut m.color),
            MaterialKind::Standard(m) => Some(&mut m.color),
            MaterialKind::Physical(m) => Some(&mut m.standard.color),
            MaterialKind::Points(m) => Some(&mut m.color),
            MaterialKind::Line(m) => Some(&mut m.color),
            MaterialKind::Shader(_) => None,
        }
    }

    pub fn opacity_mut(&mut self) -> Option<&mut f32> {
        match self {
            MaterialKind::Basic(m) => Some(&mut m.opacity),
            MaterialKind::Lambert(m) => Some(&mut m.opacity),
            MaterialKind::Phong(m) => Some(&mut m.opacity),
            MaterialKind::Standard(m) => Some(&mut m.opacity),
            MaterialKind::Physical(m) => Some(&mut m.standard.opacity),
            MaterialKind::Points(m) => Some(&mut m.opacity),
            MaterialKind::Line(m) => Some(&mut m.opacity),
            MaterialKind::Shader(_) => None,
        }
    }

    /// Populated texture slots in declaration order.
    #[must_use]
    pub fn texture_slots(&self) -> Vec<TextureSlot<'_>> {
        let mut out = Vec::new();
        match self {
            MaterialKind::Basic(m) => {
                collect_slots!(m, out;
                    map => "USE_MAP",
                    alpha_map => "USE_ALPHA_MAP",
                    ao_map => "USE_AO_MAP",
                    specular_map => "USE_SPECULAR_MAP",
                    env_map => "USE_ENV_MAP",
                );
            }
            MaterialKind::Lambert(m) => {
                collect_slots!(m, out;
                    map => "USE_MAP",
                    alpha_map => "USE_ALPHA_MAP",
                    normal_map => "USE_NORMAL_MAP",
                    emissive_map => "USE_EMISSIVE_MAP",
                    ao_map => "USE_AO_MAP",
                    env_map => "USE_ENV_MAP",
                );
            }
            MaterialKind::Phong(m) => {
                collect_slots!(m, out;
                    map => "USE_MAP",
                    alpha_map => "USE_ALPHA_MAP",
                    normal_map => "USE_NORMAL_MAP",
                    emissive_map => "USE_EMISSIVE_MAP",
                    specular_map => "USE_SPECULAR_MAP",
                    ao_map => "USE_AO_MAP",
                    env_map => "USE_ENV_MAP",
                );
            }
            MaterialKind::Standard(m) => Self::standard_slots(m, &mut out),
            MaterialKind::Physical(m) => {
                Self::standard_slots(&m.standard, &mut out);
                collect_slots!(m, out;
                    transmission_map => "USE_TRANSMISSION_MAP",
                    thickness_map => "USE_THICKNESS_MAP",
                    clearcoat_map => "USE_CLEARCOAT_MAP",
                );
            }
            MaterialKind::Points(m) => {
                collect_slots!(m, out;
                    map => "USE_MAP",
                    alpha_map => "USE_ALPHA_MAP",
                );
            }
            MaterialKind::Line(_) => {}
            MaterialKind::Shader(s) => {
                for (name, value) in &s.uniforms {
                    if let UniformValue::Texture(handle) = *value {
                        out.push(TextureSlot {
                            uniform: name,
                            define: None,
                            handle,
                        });
                    }
                }
            }
        }
        out
    }

    fn standard_slots<'a>(m: &StandardMaterial, out: &mut Vec<TextureSlot<'a>>) {
        collect_slots!(m, out;
            map => "USE_MAP",
            alpha_map => "USE_ALPHA_MAP",
            normal_map => "USE_NORMAL_MAP",
            roughness_map => "USE_ROUGHNESS_MAP",
            metalness_map => "USE_METALNESS_MAP",
            emissive_map => "USE_EMISSIVE_MAP",
            ao_map => "USE_AO_MAP",
            env_map => "USE_ENV_MAP",
        );
    }

    /// Feature switches contributed by the family and its populated slots.
    pub fn append_defines(&self, defines: &mut ShaderDefines) {
        for slot in self.texture_slots() {
            if let Some(define) = slot.define {
                defines.set(define, "1");
            }
        }

        match self {
            MaterialKind::Standard(_) => defines.set("STANDARD", "1"),
            MaterialKind::Physical(m) => {
                defines.set("STANDARD", "1");
                defines.set("PHYSICAL", "1");
                defines.toggle("USE_TRANSMISSION", m.transmission > 0.0);
                defines.toggle("USE_CLEARCOAT", m.clearcoat > 0.0);
                defines.toggle("USE_SHEEN", m.sheen > 0.0);
                defines.toggle("USE_IRIDESCENCE", m.iridescence > 0.0);
            }
            MaterialKind::Points(m) => {
                defines.toggle("USE_SIZE_ATTENUATION", m.size_attenuation);
            }
            MaterialKind::Line(m) => defines.toggle("USE_DASH", m.dashed),
            MaterialKind::Shader(s) => defines.merge(&s.defines),
            _ => {}
        }
    }

    /// Uniform values, excluding texture samplers.
    pub fn append_uniforms<'a>(&'a self, out: &mut Vec<(&'a str, UniformValue)>) {
        match self {
            MaterialKind::Basic(m) => {
                out.push(("diffuse", m.color.into()));
                out.push(("opacity", m.opacity.into()));
                out.push(("reflectivity", m.reflectivity.into()));
                out.push(("ao_map_intensity", m.ao_map_intensity.into()));
            }
            MaterialKind::Lambert(m) => {
                out.push(("diffuse", m.color.into()));
                out.push(("opacity", m.opacity.into()));
                out.push(("emissive", (m.emissive * m.emissive_intensity).into()));
            }
            MaterialKind::Phong(m) => {
                out.push(("diffuse", m.color.into()));
                out.push(("opacity", m.opacity.into()));
                out.push(("specular", m.specular.into()));
                out.push(("shininess", m.shininess.max(1e-4).into()));
                out.push(("emissive", m.emissive.into()));
            }
            MaterialKind::Standard(m) => Self::standard_uniforms(m, out),
            MaterialKind::Physical(m) => {
                Self::standard_uniforms(&m.standard, out);
                out.push(("ior", m.ior.into()));
                out.push(("transmission", m.transmission.into()));
                out.push(("thickness", m.thickness.into()));
                out.push(("attenuation_color", m.attenuation_color.into()));
                out.push(("attenuation_distance", m.attenuation_distance.into()));
                out.push(("clearcoat", m.clearcoat.into()));
                out.push(("clearcoat_roughness", m.clearcoat_roughness.into()));
                out.push(("sheen_color", (m.sheen_color * m.sheen).into()));
                out.push(("iridescence", m.iridescence.into()));
            }
            MaterialKind::Points(m) => {
                out.push(("diffuse", m.color.into()));
                out.push(("opacity", m.opacity.into()));
                out.push(("size", m.size.into()));
            }
            MaterialKind::Line(m) => {
                out.push(("diffuse", m.color.into()));
                out.push(("opacity", m.opacity.into()));
                out.push(("line_width", m.line_width.into()));
                if m.dashed {
                    out.push(("dash_size", m.dash_size.into()));
                    out.push(("total_size", (m.dash_size + m.gap_size).into()));
                    out.push(("scale", m.scale.into()));
                }
            }
            MaterialKind::Shader(s) => {
                out.extend(
                    s.uniforms
                        .iter()
                        .filter(|(_, v)| !v.is_texture())
                        .map(|(k, v)| (k.as_str(), *v)),
                );
            }
        }
    }

    fn standard_uniforms<'a>(m: &StandardMaterial, out: &mut Vec<(&'a str, UniformValue)>) {
        out.push(("diffuse", m.color.into()));
        out.push(("opacity", m.opacity.into()));
        out.push(("roughness", m.roughness.into()));
        out.push(("metalness", m.metalness.into()));
        out.push(("emissive", (m.emissive * m.emissive_intensity).into()));
        out.push(("normal_scale", m.normal_scale.into()));
        out.push(("env_map_intensity", m.env_map_intensity.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn handle(n: u64) -> TextureHandle {
        TextureHandle::from(KeyData::from_ffi(n))
    }

    #[test]
    fn populated_slots_emit_defines() {
        let kind = MaterialKind::Standard(StandardMaterial {
            map: Some(handle(1)),
            roughness_map: Some(handle(2)),
            ..Default::default()
        });
        let mut defines = ShaderDefines::new();
        kind.append_defines(&mut defines);
        assert!(defines.contains("USE_MAP"));
        assert!(defines.contains("USE_ROUGHNESS_MAP"));
        assert!(!defines.contains("USE_NORMAL_MAP"));
        assert!(defines.contains("STANDARD"));
    }

    #[test]
    fn transmission_crossing_zero_is_a_feature() {
        let mut physical = PhysicalMaterial::default();
        let mut before = ShaderDefines::new();
        MaterialKind::Physical(physical.clone()).append_defines(&mut before);
        physical.transmission = 0.5;
        let mut after = ShaderDefines::new();
        MaterialKind::Physical(physical).append_defines(&mut after);
        assert!(!before.contains("USE_TRANSMISSION"));
        assert!(after.contains("USE_TRANSMISSION"));
    }

    #[test]
    fn shader_material_texture_uniforms_become_slots() {
        let mut s = ShaderMaterial::new("custom");
        s.uniforms.insert("noise".into(), UniformValue::Texture(handle(4)));
        s.uniforms.insert("time".into(), UniformValue::Float(0.0));
        let kind = MaterialKind::Shader(s);
        let slots = kind.texture_slots();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].uniform, "noise");

        let mut uniforms = Vec::new();
        kind.append_uniforms(&mut uniforms);
        assert_eq!(uniforms, vec![("time", UniformValue::Float(0.0))]);
    }
}
