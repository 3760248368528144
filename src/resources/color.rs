//! Color Management Inputs
//!
//! The rendering core does not implement transfer functions itself. It only
//! needs to know *which* output encoding and tone-mapping operator a program
//! has to be compiled for, so both are opaque enums that flow into the
//! feature key.

use serde::{Deserialize, Serialize};

use crate::resources::ShaderDefines;

/// Color space of a texture or render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Raw data (normal maps, roughness, ...): no conversion.
    NoColorSpace,
    /// sRGB transfer function.
    #[default]
    Srgb,
    /// Linear sRGB primaries.
    LinearSrgb,
}

impl ColorSpace {
    #[must_use]
    pub fn define_value(self) -> &'static str {
        match self {
            Self::NoColorSpace => "NONE",
            Self::Srgb => "SRGB",
            Self::LinearSrgb => "LINEAR_SRGB",
        }
    }
}

/// Tone mapping operator applied when writing the final color.
///
/// - [`None`](ToneMapping::None): No tone mapping
/// - [`Linear`](ToneMapping::Linear): Exposure scale only
/// - [`Reinhard`](ToneMapping::Reinhard): Classic operator, soft highlight rolloff
/// - [`Cineon`](ToneMapping::Cineon): Film emulation
/// - [`AcesFilmic`](ToneMapping::AcesFilmic): Industry standard filmic curve
/// - [`AgX`](ToneMapping::AgX): Modern filmic tonemapper
/// - [`Neutral`](ToneMapping::Neutral): Khronos PBR neutral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToneMapping {
    #[default]
    None,
    Linear,
    Reinhard,
    Cineon,
    AcesFilmic,
    AgX,
    Neutral,
}

impl ToneMapping {
    /// Writes `TONE_MAPPING` into `defines`, or nothing for [`ToneMapping::None`].
    pub fn apply_to_defines(self, defines: &mut ShaderDefines) {
        let mode = match self {
            Self::None => return,
            Self::Linear => "LINEAR",
            Self::Reinhard => "REINHARD",
            Self::Cineon => "CINEON",
            Self::AcesFilmic => "ACES_FILMIC",
            Self::AgX => "AGX",
            Self::Neutral => "NEUTRAL",
        };
        defines.set("TONE_MAPPING", mode);
    }
}
