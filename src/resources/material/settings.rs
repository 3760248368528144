use glam::Vec4;
use serde::{Deserialize, Serialize};
use wgpu::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, ColorWrites, CompareFunction,
    StencilOperation,
};

use crate::resources::shader_defines::ShaderDefines;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

impl Side {
    /// The opposite face; `Double` stays `Double`.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Side::Front => Side::Back,
            Side::Back => Side::Front,
            Side::Double => Side::Double,
        }
    }
}

/// Blend presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Blending {
    None,
    #[default]
    Normal,
    Additive,
    Subtractive,
    Multiply,
    /// Uses [`MaterialSettings::custom_blending`].
    Custom,
}

const fn component(src: BlendFactor, dst: BlendFactor) -> BlendComponent {
    BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation: BlendOperation::Add,
    }
}

impl Blending {
    /// Resolves a preset to concrete equations. `None` means blending disabled.
    #[must_use]
    pub fn resolve(self, premultiplied_alpha: bool, custom: BlendState) -> Option<BlendState> {
        use BlendFactor as F;

        let (color, alpha) = match (self, premultiplied_alpha) {
            (Blending::None, _) => return None,
            (Blending::Custom, _) => return Some(custom),

            (Blending::Normal, true) => (
                component(F::One, F::OneMinusSrcAlpha),
                component(F::One, F::OneMinusSrcAlpha),
            ),
            (Blending::Normal, false) => (
                component(F::SrcAlpha, F::OneMinusSrcAlpha),
                component(F::One, F::OneMinusSrcAlpha),
            ),
            (Blending::Additive, true) => (component(F::One, F::One), component(F::One, F::One)),
            (Blending::Additive, false) => {
                (component(F::SrcAlpha, F::One), component(F::One, F::One))
            }
            (Blending::Subtractive, _) => (
                component(F::Zero, F::OneMinusSrc),
                component(F::Zero, F::One),
            ),
            (Blending::Multiply, true) => {
                (component(F::Zero, F::Src), component(F::Zero, F::SrcAlpha))
            }
            (Blending::Multiply, false) => (component(F::Zero, F::Src), component(F::Zero, F::Src)),
        };

        Some(BlendState { color, alpha })
    }
}

/// Stencil test configuration. Only applied when `write` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilSettings {
    pub write: bool,
    pub func: CompareFunction,
    pub reference: u32,
    pub func_mask: u32,
    pub write_mask: u32,
    pub fail: StencilOperation,
    pub z_fail: StencilOperation,
    pub z_pass: StencilOperation,
}

impl Default for StencilSettings {
    fn default() -> Self {
        Self {
            write: false,
            func: CompareFunction::Always,
            reference: 0,
            func_mask: 0xff,
            write_mask: 0xff,
            fail: StencilOperation::Keep,
            z_fail: StencilOperation::Keep,
            z_pass: StencilOperation::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

/// Options shared by every material family.
///
/// Fields split in two groups: pipeline state (blend, depth, stencil, color
/// mask, polygon offset) which the state tracker diffs per draw, and shader
/// switches (side, alpha test, vertex colors ...) which feed the program key.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSettings {
    pub visible: bool,
    pub side: Side,
    /// Face culled when rendering shadow maps; `None` follows `side`.
    pub shadow_side: Option<Side>,

    pub transparent: bool,
    pub blending: Blending,
    pub custom_blending: BlendState,
    pub premultiplied_alpha: bool,

    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub stencil: StencilSettings,
    pub polygon_offset: Option<PolygonOffset>,
    pub color_write: ColorWrites,

    /// Fragments with alpha below this are discarded; 0 disables the test.
    pub alpha_test: f32,
    pub alpha_to_coverage: bool,
    pub vertex_colors: bool,
    pub flat_shading: bool,
    pub fog: bool,
    pub tone_mapped: bool,
    pub dithering: bool,

    /// Material-local clip planes (`xyz` normal, `w` constant).
    pub clipping_planes: Vec<Vec4>,
    pub clip_intersection: bool,
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            visible: true,
            side: Side::Front,
            shadow_side: None,
            transparent: false,
            blending: Blending::Normal,
            custom_blending: BlendState::ALPHA_BLENDING,
            premultiplied_alpha: false,
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            stencil: StencilSettings::default(),
            polygon_offset: None,
            color_write: ColorWrites::ALL,
            alpha_test: 0.0,
            alpha_to_coverage: false,
            vertex_colors: false,
            flat_shading: false,
            fog: true,
            tone_mapped: true,
            dithering: false,
            clipping_planes: Vec::new(),
            clip_intersection: false,
        }
    }
}

impl MaterialSettings {
    /// Blend state actually applied. Opaque materials with the `Normal` preset draw unblended.
    #[must_use]
    pub fn effective_blend(&self) -> Option<BlendState> {
        if self.blending == Blending::Normal && !self.transparent {
            return None;
        }
        self.blending
            .resolve(self.premultiplied_alpha, self.custom_blending)
    }

    /// Shader switches derived from these settings. Pipeline-only fields do not appear.
    pub fn append_defines(&self, defines: &mut ShaderDefines) {
        defines.toggle("DOUBLE_SIDED", self.side == Side::Double);
        defines.toggle("FLIP_SIDED", self.side == Side::Back);
        defines.toggle("USE_ALPHA_TEST", self.alpha_test > 0.0);
        defines.toggle("USE_ALPHA_TO_COVERAGE", self.alpha_to_coverage);
        defines.toggle("PREMULTIPLIED_ALPHA", self.premultiplied_alpha);
        defines.toggle("FLAT_SHADED", self.flat_shading);
        defines.toggle("DITHERING", self.dithering);
        defines.toggle(
            "OPAQUE",
            !self.transparent && self.blending == Blending::Normal && !self.alpha_to_coverage,
        );
        if !self.clipping_planes.is_empty() {
            defines.set_count("NUM_LOCAL_CLIPPING_PLANES", self.clipping_planes.len());
            defines.toggle("CLIP_INTERSECTION", self.clip_intersection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_normal_blending_is_disabled() {
        let settings = MaterialSettings::default();
        assert!(settings.effective_blend().is_none());

        let transparent = MaterialSettings {
            transparent: true,
            ..Default::default()
        };
        let blend = transparent.effective_blend();
        assert_eq!(
            blend.map(|b| b.color.src_factor),
            Some(BlendFactor::SrcAlpha)
        );
    }

    #[test]
    fn premultiplied_normal_uses_one() {
        let blend = Blending::Normal.resolve(true, BlendState::REPLACE);
        assert_eq!(blend.map(|b| b.color.src_factor), Some(BlendFactor::One));
    }

    #[test]
    fn additive_applies_even_when_opaque() {
        let settings = MaterialSettings {
            blending: Blending::Additive,
            ..Default::default()
        };
        assert!(settings.effective_blend().is_some());
    }

    #[test]
    fn depth_changes_do_not_touch_defines() {
        let mut a = ShaderDefines::new();
        let mut b = ShaderDefines::new();
        MaterialSettings::default().append_defines(&mut a);
        MaterialSettings {
            depth_write: false,
            depth_func: CompareFunction::Always,
            ..Default::default()
        }
        .append_defines(&mut b);
        assert_eq!(a, b);
    }
}
