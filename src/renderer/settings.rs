//! Renderer Settings
//!
//! Runtime configuration of a [`RenderContext`](super::context::RenderContext).
//! Settings are plain serde data and can be loaded from JSON:
//!
//! ```rust,ignore
//! use strata::renderer::RendererSettings;
//!
//! let settings = RendererSettings::from_json(r#"{ "tone_mapping": "AcesFilmic" }"#)?;
//! ```
//!
//! The output color space, the tone mapping operator, the clipping plane count
//! and the light/shadow switches feed the program feature key. Changing any of
//! them moves [`RendererSettings::feature_hash`], which marks every bound
//! program stale on its next draw.

use glam::Vec4;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::errors::{Result, StrataError};
use crate::resources::{ColorSpace, ShaderDefines, ToneMapping};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Encoding of the final color target.
    pub output_color_space: ColorSpace,
    pub tone_mapping: ToneMapping,
    /// Uniform only; does not affect the program.
    pub tone_mapping_exposure: f32,

    /// When false, buckets keep collection order.
    pub sort_objects: bool,

    /// Global clipping planes (`xyz` normal, `w` constant) applied to every material.
    pub clipping_planes: Vec<Vec4>,

    /// Scale of the transmission snapshot target relative to the output target.
    pub transmission_resolution_scale: f32,

    /// Caps the texture unit count below what the backend reports.
    pub max_texture_units: Option<u32>,

    pub clear_color: Vec4,

    pub physically_correct_lights: bool,
    pub shadow_map_enabled: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            output_color_space: ColorSpace::Srgb,
            tone_mapping: ToneMapping::None,
            tone_mapping_exposure: 1.0,
            sort_objects: true,
            clipping_planes: Vec::new(),
            transmission_resolution_scale: 1.0,
            max_texture_units: None,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            physically_correct_lights: true,
            shadow_map_enabled: false,
        }
    }
}

impl RendererSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let scale = self.transmission_resolution_scale;
        if scale.is_nan() || scale <= 0.0 {
            return Err(StrataError::Config(format!(
                "transmission_resolution_scale must be positive, got {scale}"
            )));
        }
        if self.max_texture_units == Some(0) {
            return Err(StrataError::Config(
                "max_texture_units must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Defines contributed by the output target.
    pub fn append_defines(&self, defines: &mut ShaderDefines, tone_mapped: bool) {
        defines.set("OUTPUT_COLOR_SPACE", self.output_color_space.define_value());
        if tone_mapped {
            self.tone_mapping.apply_to_defines(defines);
        }
        if !self.clipping_planes.is_empty() {
            defines.set_count("NUM_CLIPPING_PLANES", self.clipping_planes.len());
        }
        defines.toggle("PHYSICALLY_CORRECT_LIGHTS", self.physically_correct_lights);
        defines.toggle("USE_SHADOWMAP", self.shadow_map_enabled);
    }

    /// Hash of the fields that feed the program feature key.
    #[must_use]
    pub fn feature_hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(self.output_color_space.define_value().as_bytes());
        hasher.update(&[self.tone_mapping as u8]);
        hasher.update(&(self.clipping_planes.len() as u32).to_le_bytes());
        hasher.update(&[
            u8::from(self.physically_correct_lights),
            u8::from(self.shadow_map_enabled),
        ]);
        hasher.digest()
    }
}
