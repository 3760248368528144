//! Material Descriptors
//!
//! A [`Material`] is a tagged family ([`MaterialKind`]) plus shared
//! [`MaterialSettings`]. Two counters track change:
//!
//! - `version`: bumped only when the derived shader features change. The program
//!   cache compares it to decide whether a bound program went stale.
//! - `uniforms_version`: bumped on every mutable access. Value-only changes
//!   (a new color) move this counter and nothing else.
//!
//! Mutable access goes through [`MaterialGuard`], which snapshots the feature
//! hash on creation and compares it when dropped.

mod kinds;
mod settings;

pub use kinds::{
    BasicMaterial, LambertMaterial, LineMaterial, MaterialKind, PhongMaterial, PhysicalMaterial,
    PointsMaterial, ShaderMaterial, StandardMaterial, TextureSlot,
};
pub use settings::{Blending, MaterialSettings, PolygonOffset, Side, StencilSettings};

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;
use uuid::Uuid;

use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::UniformValue;

static NEXT_MATERIAL_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug)]
pub struct Material {
    pub uuid: Uuid,
    id: u32,
    pub name: Option<String>,

    kind: MaterialKind,
    settings: MaterialSettings,

    version: u64,
    uniforms_version: u64,
}

impl Clone for Material {
    /// Clones get a fresh identity so they sort and cache as distinct materials.
    fn clone(&self) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name.clone(),
            kind: self.kind.clone(),
            settings: self.settings.clone(),
            version: self.version,
            uniforms_version: self.uniforms_version,
        }
    }
}

impl From<MaterialKind> for Material {
    fn from(kind: MaterialKind) -> Self {
        Self::new(kind)
    }
}

impl Material {
    #[must_use]
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            name: None,
            kind,
            settings: MaterialSettings::default(),
            version: 0,
            uniforms_version: 0,
        }
    }

    #[must_use]
    pub fn basic(color: Vec3) -> Self {
        Self::new(MaterialKind::Basic(BasicMaterial {
            color,
            ..Default::default()
        }))
    }

    #[must_use]
    pub fn lambert(color: Vec3) -> Self {
        Self::new(MaterialKind::Lambert(LambertMaterial {
            color,
            ..Default::default()
        }))
    }

    #[must_use]
    pub fn phong(color: Vec3) -> Self {
        Self::new(MaterialKind::Phong(PhongMaterial {
            color,
            ..Default::default()
        }))
    }

    #[must_use]
    pub fn standard(color: Vec3, roughness: f32, metalness: f32) -> Self {
        Self::new(MaterialKind::Standard(StandardMaterial {
            color,
            roughness,
            metalness,
            ..Default::default()
        }))
    }

    #[must_use]
    pub fn physical(physical: PhysicalMaterial) -> Self {
        Self::new(MaterialKind::Physical(physical))
    }

    #[must_use]
    pub fn points(color: Vec3, size: f32) -> Self {
        Self::new(MaterialKind::Points(PointsMaterial {
            color,
            size,
            ..Default::default()
        }))
    }

    #[must_use]
    pub fn line(color: Vec3) -> Self {
        Self::new(MaterialKind::Line(LineMaterial {
            color,
            ..Default::default()
        }))
    }

    #[must_use]
    pub fn shader(shader: ShaderMaterial) -> Self {
        Self::new(MaterialKind::Shader(shader))
    }

    #[must_use]
    pub fn with_settings(mut self, settings: MaterialSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    // ------------------------------------------------------------------------
    // Identity & versions
    // ------------------------------------------------------------------------

    /// Process-unique id; used as the material sort key.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn uniforms_version(&self) -> u64 {
        self.uniforms_version
    }

    /// Forces recompilation on next use.
    pub fn needs_update(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    // ------------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &MaterialKind {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &MaterialSettings {
        &self.settings
    }

    pub fn kind_mut(&mut self) -> MaterialGuard<'_, MaterialKind> {
        MaterialGuard::new(self, kind_ref, kind_mut)
    }

    pub fn settings_mut(&mut self) -> MaterialGuard<'_, MaterialSettings> {
        MaterialGuard::new(self, settings_ref, settings_mut)
    }

    /// Sets the base color. Never changes the program.
    pub fn set_color(&mut self, color: Vec3) {
        if let Some(c) = self.kind.color_mut() {
            *c = color;
            self.uniforms_version = self.uniforms_version.wrapping_add(1);
        }
    }

    /// Sets opacity. Never changes the program.
    pub fn set_opacity(&mut self, opacity: f32) {
        if let Some(o) = self.kind.opacity_mut() {
            *o = opacity;
            self.uniforms_version = self.uniforms_version.wrapping_add(1);
        }
    }

    // ------------------------------------------------------------------------
    // Derived data
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn template_name(&self) -> &str {
        self.kind.template_name()
    }

    #[must_use]
    pub fn is_transparent(&self) -> bool {
        self.settings.transparent
    }

    #[must_use]
    pub fn transmission(&self) -> f32 {
        self.kind.transmission()
    }

    #[must_use]
    pub fn is_transmissive(&self) -> bool {
        self.transmission() > 0.0
    }

    /// Material-local shader switches: family, populated slots and settings.
    #[must_use]
    pub fn shader_defines(&self) -> ShaderDefines {
        let mut defines = ShaderDefines::with_capacity(16);
        self.kind.append_defines(&mut defines);
        self.settings.append_defines(&mut defines);
        defines
    }

    #[must_use]
    pub fn texture_slots(&self) -> Vec<TextureSlot<'_>> {
        self.kind.texture_slots()
    }

    /// Named uniform values (texture samplers excluded).
    #[must_use]
    pub fn uniform_values(&self) -> Vec<(&str, UniformValue)> {
        let mut out = Vec::with_capacity(16);
        self.kind.append_uniforms(&mut out);
        if self.settings.alpha_test > 0.0 {
            out.push(("alpha_test", self.settings.alpha_test.into()));
        }
        out
    }

    /// Hash of everything that can change the derived program.
    ///
    /// Settings that only take effect in combination with the geometry or the
    /// renderer (vertex colors, tone mapping, fog) enter as markers.
    fn feature_hash(&self) -> u64 {
        let mut defines = self.shader_defines();
        defines.set("__TEMPLATE", self.template_name());
        defines.toggle("__VERTEX_COLORS", self.settings.vertex_colors);
        defines.toggle("__TONE_MAPPED", self.settings.tone_mapped);
        defines.toggle("__FOG", self.settings.fog);
        defines.compute_hash()
    }
}

fn kind_ref(m: &Material) -> &MaterialKind {
    &m.kind
}

fn kind_mut(m: &mut Material) -> &mut MaterialKind {
    &mut m.kind
}

fn settings_ref(m: &Material) -> &MaterialSettings {
    &m.settings
}

fn settings_mut(m: &mut Material) -> &mut MaterialSettings {
    &mut m.settings
}

// ============================================================================
// Guard (automatic version management)
// ============================================================================

/// Mutable view of one part of a [`Material`].
///
/// On drop, `uniforms_version` always bumps; `version` bumps only if the
/// derived shader features differ from those at creation.
pub struct MaterialGuard<'a, T> {
    material: &'a mut Material,
    initial_features: u64,
    project: fn(&Material) -> &T,
    project_mut: fn(&mut Material) -> &mut T,
}

impl<'a, T> MaterialGuard<'a, T> {
    fn new(
        material: &'a mut Material,
        project: fn(&Material) -> &T,
        project_mut: fn(&mut Material) -> &mut T,
    ) -> Self {
        let initial_features = material.feature_hash();
        Self {
            material,
            initial_features,
            project,
            project_mut,
        }
    }
}

impl<T> Deref for MaterialGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        (self.project)(&*self.material)
    }
}

impl<T> DerefMut for MaterialGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        (self.project_mut)(&mut *self.material)
    }
}

impl<T> Drop for MaterialGuard<'_, T> {
    fn drop(&mut self) {
        let m = &mut *self.material;
        m.uniforms_version = m.uniforms_version.wrapping_add(1);
        if m.feature_hash() != self.initial_features {
            m.version = m.version.wrapping_add(1);
        }
    }
}
