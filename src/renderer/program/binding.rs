//! Material Program Bindings
//!
//! Tracks, per material, which program each draw context resolved to.
//!
//! A [`BindingStamp`] captures the versions of everything a feature key is
//! derived from. A stamp seen before maps straight to its program without
//! touching the feature key (the fast path, analogous to a versioned L1 key).
//! An unseen stamp walks `Resolving -> Bound | Failed`. A renderer settings
//! change that alters feature keys marks every bound material `Stale` until
//! its next draw resolves it again.
//!
//! Variants are kept per generation: when the material version, light layout
//! or renderer settings change, the programs of the previous generation are
//! released back to the cache after the new program has been acquired, so a
//! program shared across generations is never evicted and recompiled.
//! Variants of a disposed geometry are released with it.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::cache::{Program, ProgramCache};
use super::feature_key::ProgramParameters;
use crate::assets::{GeometryHandle, MaterialHandle};
use crate::errors::{Result, StrataError};
use crate::renderer::backend::{Backend, ProgramId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingState {
    #[default]
    Unresolved,
    Resolving,
    Bound,
    Stale,
    Failed,
}

/// Versions of every program input for one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BindingStamp {
    pub material_version: u64,
    pub geometry: GeometryHandle,
    pub layout_version: u64,
    pub lights: u64,
    pub settings: u64,
    /// Hash of per-object switches, texture color spaces and fog mode.
    pub object: u64,
}

impl BindingStamp {
    fn generation(&self) -> (u64, u64, u64) {
        (self.material_version, self.lights, self.settings)
    }
}

#[derive(Debug, Default)]
pub struct MaterialBinding {
    state: BindingState,
    generation: Option<(u64, u64, u64)>,
    variants: FxHashMap<BindingStamp, Arc<Program>>,
    last_error: Option<StrataError>,
}

impl MaterialBinding {
    #[must_use]
    pub fn state(&self) -> BindingState {
        self.state
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&StrataError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }
}

#[derive(Debug, Default)]
pub struct ProgramBindings {
    materials: FxHashMap<MaterialHandle, MaterialBinding>,
    evicted: Vec<ProgramId>,
}

impl ProgramBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Program for `material` drawn under `stamp`.
    ///
    /// `derive` runs only when the stamp has not been resolved before.
    pub fn resolve<F>(
        &mut self,
        cache: &mut ProgramCache,
        backend: &mut dyn Backend,
        material: MaterialHandle,
        stamp: BindingStamp,
        derive: F,
    ) -> Result<Arc<Program>>
    where
        F: FnOnce() -> Result<ProgramParameters>,
    {
        let binding = self.materials.entry(material).or_default();
        if let Some(program) = binding.variants.get(&stamp) {
            binding.state = BindingState::Bound;
            return Ok(Arc::clone(program));
        }

        if binding.state == BindingState::Stale {
            log::trace!("Material binding {material:?} re-resolving after settings change");
        }
        binding.state = BindingState::Resolving;

        let acquired = derive().and_then(|params| cache.acquire(backend, &params));
        let program = match acquired {
            Ok(program) => program,
            Err(error) => {
                binding.state = BindingState::Failed;
                binding.last_error = Some(error.clone());
                return Err(error);
            }
        };

        if binding.generation != Some(stamp.generation()) {
            for (_, old) in binding.variants.drain() {
                let id = old.id;
                if cache.release(backend, old) {
                    self.evicted.push(id);
                }
            }
            binding.generation = Some(stamp.generation());
        }

        binding.variants.insert(stamp, Arc::clone(&program));
        binding.state = BindingState::Bound;
        binding.last_error = None;
        Ok(program)
    }

    #[must_use]
    pub fn get(&self, material: MaterialHandle) -> Option<&MaterialBinding> {
        self.materials.get(&material)
    }

    #[must_use]
    pub fn state(&self, material: MaterialHandle) -> BindingState {
        self.materials
            .get(&material)
            .map_or(BindingState::Unresolved, |b| b.state)
    }

    /// Flags every bound material for re-resolution on its next draw.
    pub fn mark_stale(&mut self) {
        for binding in self.materials.values_mut() {
            if binding.state == BindingState::Bound {
                binding.state = BindingState::Stale;
            }
        }
    }

    /// Releases the variants resolved for `geometry`. Returns how many programs were evicted.
    pub fn forget_geometry(
        &mut self,
        cache: &mut ProgramCache,
        backend: &mut dyn Backend,
        geometry: GeometryHandle,
    ) -> usize {
        let mut evicted = 0;
        for binding in self.materials.values_mut() {
            let stamps: Vec<BindingStamp> = binding
                .variants
                .keys()
                .filter(|stamp| stamp.geometry == geometry)
                .copied()
                .collect();
            for stamp in stamps {
                let Some(program) = binding.variants.remove(&stamp) else {
                    continue;
                };
                let id = program.id;
                if cache.release(backend, program) {
                    self.evicted.push(id);
                    evicted += 1;
                }
            }
        }
        evicted
    }

    /// Releases every program `material` holds. Returns how many were evicted.
    pub fn dispose_material(
        &mut self,
        cache: &mut ProgramCache,
        backend: &mut dyn Backend,
        material: MaterialHandle,
    ) -> usize {
        let Some(binding) = self.materials.remove(&material) else {
            return 0;
        };
        let mut evicted = 0;
        for (_, program) in binding.variants {
            let id = program.id;
            if cache.release(backend, program) {
                self.evicted.push(id);
                evicted += 1;
            }
        }
        evicted
    }

    /// Drops every binding without touching the cache.
    pub fn clear(&mut self) {
        self.materials.clear();
        self.evicted.clear();
    }

    /// Programs deleted since the last call.
    pub fn take_evicted(&mut self) -> Vec<ProgramId> {
        std::mem::take(&mut self.evicted)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{AttributeDecl, RecordingBackend};
    use crate::resources::ShaderDefines;
    use slotmap::KeyData;
    use wgpu::VertexFormat;

    fn params(defines: &[(&str, &str)]) -> ProgramParameters {
        ProgramParameters {
            template: "mesh_basic".to_string(),
            label: "binding".to_string(),
            defines: ShaderDefines::from(defines),
            attributes: vec![AttributeDecl {
                name: "position".to_string(),
                format: VertexFormat::Float32x3,
                instanced: false,
            }],
            uniforms: Vec::new(),
            textures: Vec::new(),
        }
    }

    fn material(n: u64) -> MaterialHandle {
        MaterialHandle::from(KeyData::from_ffi(n))
    }

    fn geometry(n: u64) -> GeometryHandle {
        GeometryHandle::from(KeyData::from_ffi(n))
    }

    #[test]
    fn known_stamp_skips_derivation() {
        let mut backend = RecordingBackend::new();
        let mut cache = ProgramCache::new().unwrap();
        let mut bindings = ProgramBindings::new();
        let stamp = BindingStamp::default();

        assert_eq!(bindings.state(material(1)), BindingState::Unresolved);
        bindings
            .resolve(&mut cache, &mut backend, material(1), stamp, || Ok(params(&[])))
            .unwrap();
        assert_eq!(bindings.state(material(1)), BindingState::Bound);

        let again = bindings.resolve(&mut cache, &mut backend, material(1), stamp, || {
            panic!("derivation must not run for a known stamp")
        });
        assert!(again.is_ok());
    }

    #[test]
    fn new_generation_releases_old_program() {
        let mut backend = RecordingBackend::new();
        let mut cache = ProgramCache::new().unwrap();
        let mut bindings = ProgramBindings::new();
        let v1 = BindingStamp::default();
        let v2 = BindingStamp {
            material_version: 1,
            ..v1
        };

        let first = bindings
            .resolve(&mut cache, &mut backend, material(1), v1, || Ok(params(&[])))
            .unwrap();
        let first_key = first.key;
        drop(first);
        bindings
            .resolve(&mut cache, &mut backend, material(1), v2, || {
                Ok(params(&[("USE_MAP", "1")]))
            })
            .unwrap();

        assert!(!cache.contains(first_key));
        assert_eq!(bindings.take_evicted().len(), 1);
        assert_eq!(bindings.get(material(1)).unwrap().variant_count(), 1);
    }

    #[test]
    fn disposed_geometry_variants_are_released() {
        let mut backend = RecordingBackend::new();
        let mut cache = ProgramCache::new().unwrap();
        let mut bindings = ProgramBindings::new();

        for n in 1..=3 {
            let stamp = BindingStamp {
                geometry: geometry(n),
                ..BindingStamp::default()
            };
            bindings
                .resolve(&mut cache, &mut backend, material(1), stamp, || Ok(params(&[])))
                .unwrap();
        }
        assert_eq!(bindings.get(material(1)).unwrap().variant_count(), 3);
        assert_eq!(cache.use_count(params(&[]).key()), 3);

        assert_eq!(bindings.forget_geometry(&mut cache, &mut backend, geometry(1)), 0);
        assert_eq!(bindings.forget_geometry(&mut cache, &mut backend, geometry(2)), 0);
        assert_eq!(bindings.get(material(1)).unwrap().variant_count(), 1);
        assert_eq!(bindings.forget_geometry(&mut cache, &mut backend, geometry(3)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn mark_stale_flags_bound_materials_until_next_resolve() {
        let mut backend = RecordingBackend::new();
        let mut cache = ProgramCache::new().unwrap();
        let mut bindings = ProgramBindings::new();
        let stamp = BindingStamp::default();
        bindings
            .resolve(&mut cache, &mut backend, material(1), stamp, || Ok(params(&[])))
            .unwrap();

        bindings.mark_stale();
        assert_eq!(bindings.state(material(1)), BindingState::Stale);

        let next = BindingStamp {
            settings: 1,
            ..stamp
        };
        bindings
            .resolve(&mut cache, &mut backend, material(1), next, || Ok(params(&[])))
            .unwrap();
        assert_eq!(bindings.state(material(1)), BindingState::Bound);
    }

    #[test]
    fn failure_is_recorded() {
        let mut backend = RecordingBackend::new();
        backend.fail_on_define("BROKEN");
        let mut cache = ProgramCache::new().unwrap();
        let mut bindings = ProgramBindings::new();

        let result = bindings.resolve(
            &mut cache,
            &mut backend,
            material(1),
            BindingStamp::default(),
            || Ok(params(&[("BROKEN", "1")])),
        );
        assert!(result.is_err());
        assert_eq!(bindings.state(material(1)), BindingState::Failed);
        assert!(bindings.get(material(1)).unwrap().last_error().is_some());
    }
}
