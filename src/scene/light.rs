use std::hash::{BuildHasher, Hash, Hasher};

use glam::{Affine3A, Vec3};
use rustc_hash::FxBuildHasher;

use crate::resources::ShaderDefines;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowConfig {
    pub bias: f32,
    pub normal_bias: f32,
    pub map_size: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            bias: 0.0,
            normal_bias: 0.0,
            map_size: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub ground_color: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// 0 means unlimited range.
    pub distance: f32,
    pub decay: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub distance: f32,
    /// Half-angle of the cone, radians.
    pub angle: f32,
    pub penumbra: f32,
    pub decay: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectAreaLight {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Ambient,
    Hemisphere(HemisphereLight),
    /// Shines along the node's -Z axis.
    Directional,
    Point(PointLight),
    Spot(SpotLight),
    RectArea(RectAreaLight),
}

/// Light component.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
    /// Ignored for kinds that cannot cast shadows.
    pub cast_shadow: bool,
    pub shadow: ShadowConfig,
}

impl Light {
    fn with_kind(color: Vec3, intensity: f32, kind: LightKind) -> Self {
        Self {
            color,
            intensity,
            kind,
            cast_shadow: false,
            shadow: ShadowConfig::default(),
        }
    }

    #[must_use]
    pub fn new_ambient(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Ambient)
    }

    #[must_use]
    pub fn new_hemisphere(sky_color: Vec3, ground_color: Vec3, intensity: f32) -> Self {
        Self::with_kind(
            sky_color,
            intensity,
            LightKind::Hemisphere(HemisphereLight { ground_color }),
        )
    }

    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Directional)
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32, distance: f32) -> Self {
        Self::with_kind(
            color,
            intensity,
            LightKind::Point(PointLight {
                distance,
                decay: 2.0,
            }),
        )
    }

    #[must_use]
    pub fn new_spot(color: Vec3, intensity: f32, distance: f32, angle: f32, penumbra: f32) -> Self {
        Self::with_kind(
            color,
            intensity,
            LightKind::Spot(SpotLight {
                distance,
                angle,
                penumbra,
                decay: 2.0,
            }),
        )
    }

    #[must_use]
    pub fn new_rect_area(color: Vec3, intensity: f32, width: f32, height: f32) -> Self {
        Self::with_kind(
            color,
            intensity,
            LightKind::RectArea(RectAreaLight { width, height }),
        )
    }

    #[must_use]
    pub fn casts_shadow(&self) -> bool {
        self.cast_shadow
            && matches!(
                self.kind,
                LightKind::Directional | LightKind::Point(_) | LightKind::Spot(_)
            )
    }
}

/// Per-frame summary of the active lights.
///
/// Only the *counts* reach the program key. Colors, positions and intensities
/// are uniform data held in `entries`.
#[derive(Debug, Clone, Default)]
pub struct LightState {
    pub ambient: Vec3,
    pub num_directional: usize,
    pub num_point: usize,
    pub num_spot: usize,
    pub num_hemi: usize,
    pub num_rect_area: usize,
    pub num_directional_shadows: usize,
    pub num_point_shadows: usize,
    pub num_spot_shadows: usize,
    pub entries: Vec<LightEntry>,
    hash: u64,
}

/// A resolved light: component data plus world-space placement.
#[derive(Debug, Clone, PartialEq)]
pub struct LightEntry {
    pub light: Light,
    pub position: Vec3,
    pub direction: Vec3,
}

impl LightState {
    pub fn clear(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        *self = Self::default();
        self.entries = entries;
        self.entries.clear();
    }

    /// Accumulates one light placed at `world`.
    pub fn push(&mut self, light: &Light, world: &Affine3A) {
        let shadow = light.casts_shadow();
        match light.kind {
            LightKind::Ambient => {
                self.ambient += light.color * light.intensity;
                return;
            }
            LightKind::Hemisphere(_) => self.num_hemi += 1,
            LightKind::Directional => {
                self.num_directional += 1;
                self.num_directional_shadows += usize::from(shadow);
            }
            LightKind::Point(_) => {
                self.num_point += 1;
                self.num_point_shadows += usize::from(shadow);
            }
            LightKind::Spot(_) => {
                self.num_spot += 1;
                self.num_spot_shadows += usize::from(shadow);
            }
            LightKind::RectArea(_) => self.num_rect_area += 1,
        }

        self.entries.push(LightEntry {
            light: light.clone(),
            position: world.translation.into(),
            direction: world.transform_vector3(Vec3::NEG_Z).normalize_or_zero(),
        });
    }

    /// Seals the state; the hash covers the structural counts only.
    pub fn finish(&mut self) {
        let mut hasher = FxBuildHasher.build_hasher();
        (
            self.num_directional,
            self.num_point,
            self.num_spot,
            self.num_hemi,
            self.num_rect_area,
            self.num_directional_shadows,
            self.num_point_shadows,
            self.num_spot_shadows,
        )
            .hash(&mut hasher);
        self.hash = hasher.finish();
    }

    /// Changes only when light counts change; used as the light-state version.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn append_defines(&self, defines: &mut ShaderDefines) {
        defines.set_count("NUM_DIR_LIGHTS", self.num_directional);
        defines.set_count("NUM_POINT_LIGHTS", self.num_point);
        defines.set_count("NUM_SPOT_LIGHTS", self.num_spot);
        defines.set_count("NUM_HEMI_LIGHTS", self.num_hemi);
        defines.set_count("NUM_RECT_AREA_LIGHTS", self.num_rect_area);
        defines.set_count("NUM_DIR_LIGHT_SHADOWS", self.num_directional_shadows);
        defines.set_count("NUM_POINT_LIGHT_SHADOWS", self.num_point_shadows);
        defines.set_count("NUM_SPOT_LIGHT_SHADOWS", self.num_spot_shadows);
    }
}
