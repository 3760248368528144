//! Program Cache
//!
//! Content-addressed store of compiled programs, keyed by [`FeatureKey`].
//!
//! Entries are shared through `Arc<Program>`: every holder of a clone counts as
//! one use. The cache's own copy is not a use, so an entry whose strong count
//! drops back to one is unreferenced and gets evicted (immediately through
//! [`ProgramCache::release`], or in bulk through [`ProgramCache::prune`]).
//!
//! Compile failures are remembered per key. A broken variant reports the same
//! error on every acquisition without reaching the backend compiler again.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::feature_key::{FeatureKey, ProgramParameters};
use super::shader_gen::ShaderLibrary;
use crate::errors::{Result, StrataError};
use crate::renderer::backend::{Backend, ProgramId, ProgramReflection};
use crate::resources::UniformValue;

/// A compiled program variant.
#[derive(Debug)]
pub struct Program {
    pub id: ProgramId,
    pub key: FeatureKey,
    pub label: String,
    /// Active defines, for diagnostics.
    pub flags: String,
    pub reflection: ProgramReflection,
    pub source_hash: u128,
}

impl Program {
    #[inline]
    #[must_use]
    pub fn uniform_location(&self, name: &str) -> Option<u32> {
        self.reflection.uniforms.get(name).copied()
    }

    #[inline]
    #[must_use]
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.reflection.attributes.get(name).copied()
    }
}

#[derive(Debug, Clone)]
struct Failure {
    template: String,
    error: StrataError,
}

pub struct ProgramCache {
    library: ShaderLibrary,
    programs: FxHashMap<FeatureKey, Arc<Program>>,
    failures: FxHashMap<FeatureKey, Failure>,
    /// Last value uploaded per program and location.
    uniform_values: FxHashMap<ProgramId, FxHashMap<u32, UniformValue>>,
    compiled: u64,
}

impl ProgramCache {
    pub fn new() -> Result<Self> {
        Ok(Self {
            library: ShaderLibrary::new()?,
            programs: FxHashMap::default(),
            failures: FxHashMap::default(),
            uniform_values: FxHashMap::default(),
            compiled: 0,
        })
    }

    #[must_use]
    pub fn library(&self) -> &ShaderLibrary {
        &self.library
    }

    /// Registers a template and forgets earlier failures of variants using it.
    pub fn register_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.library.register_template(name, source)?;
        self.failures.retain(|_, f| f.template != name);
        Ok(())
    }

    /// Returns the program for `params`, compiling it on a miss.
    ///
    /// Every returned `Arc` counts as one use until it is handed back through
    /// [`release`](Self::release) or dropped.
    pub fn acquire(
        &mut self,
        backend: &mut dyn Backend,
        params: &ProgramParameters,
    ) -> Result<Arc<Program>> {
        let key = params.key();
        if let Some(program) = self.programs.get(&key) {
            return Ok(Arc::clone(program));
        }
        if let Some(failure) = self.failures.get(&key) {
            return Err(failure.error.clone());
        }

        match self.compile(backend, key, params) {
            Ok(program) => {
                let program = Arc::new(program);
                self.programs.insert(key, Arc::clone(&program));
                Ok(program)
            }
            Err(error) => {
                log::error!("Program {} ({key}) failed: {error}", params.label);
                self.failures.insert(
                    key,
                    Failure {
                        template: params.template.clone(),
                        error: error.clone(),
                    },
                );
                Err(error)
            }
        }
    }

    fn compile(
        &mut self,
        backend: &mut dyn Backend,
        key: FeatureKey,
        params: &ProgramParameters,
    ) -> Result<Program> {
        let source = self.library.generate(params)?;
        let flags = params.flags();
        let (id, reflection) =
            backend
                .compile_program(&source)
                .map_err(|e| StrataError::ProgramCompile {
                    key: key.0,
                    flags: flags.clone(),
                    log: e.to_string(),
                })?;

        self.compiled += 1;
        log::debug!(
            "Compiled program {} ({key}): {} uniforms, {} attributes",
            params.label,
            reflection.uniforms.len(),
            reflection.attributes.len()
        );

        Ok(Program {
            id,
            key,
            label: params.label.clone(),
            flags,
            reflection,
            source_hash: source.source_hash,
        })
    }

    /// Gives back one use of `program`. Returns `true` if this was the last
    /// use and the program was deleted.
    pub fn release(&mut self, backend: &mut dyn Backend, program: Arc<Program>) -> bool {
        let key = program.key;
        drop(program);
        match self.programs.get(&key) {
            Some(entry) if Arc::strong_count(entry) == 1 => {
                self.evict(backend, key);
                true
            }
            _ => false,
        }
    }

    fn evict(&mut self, backend: &mut dyn Backend, key: FeatureKey) {
        if let Some(program) = self.programs.remove(&key) {
            log::debug!("Evicting program {} ({key})", program.label);
            backend.delete_program(program.id);
            self.uniform_values.remove(&program.id);
        }
    }

    /// Evicts every entry nobody holds. Returns the number evicted.
    pub fn prune(&mut self, backend: &mut dyn Backend) -> usize {
        let unused: Vec<FeatureKey> = self
            .programs
            .iter()
            .filter(|(_, p)| Arc::strong_count(p) == 1)
            .map(|(k, _)| *k)
            .collect();
        for key in &unused {
            self.evict(backend, *key);
        }
        unused.len()
    }

    /// Number of outstanding uses of the entry under `key`.
    #[must_use]
    pub fn use_count(&self, key: FeatureKey) -> usize {
        self.programs
            .get(&key)
            .map_or(0, |p| Arc::strong_count(p) - 1)
    }

    #[must_use]
    pub fn contains(&self, key: FeatureKey) -> bool {
        self.programs.contains_key(&key)
    }

    #[must_use]
    pub fn failure(&self, key: FeatureKey) -> Option<&StrataError> {
        self.failures.get(&key).map(|f| &f.error)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Programs compiled over the cache's lifetime.
    #[must_use]
    pub fn compiled_count(&self) -> u64 {
        self.compiled
    }

    /// Uploads `value` to `name` unless the program already holds it.
    ///
    /// Returns `true` if a backend call was issued. Names the program does not
    /// use are ignored.
    pub fn upload_uniform(
        &mut self,
        backend: &mut dyn Backend,
        program: &Program,
        name: &str,
        value: UniformValue,
    ) -> bool {
        let Some(location) = program.uniform_location(name) else {
            return false;
        };
        let cached = self.uniform_values.entry(program.id).or_default();
        if cached.get(&location) == Some(&value) {
            return false;
        }
        backend.set_uniform(location, &value);
        cached.insert(location, value);
        true
    }

    /// Deletes every program, regardless of outstanding uses.
    pub fn dispose_all(&mut self, backend: &mut dyn Backend) {
        for (_, program) in self.programs.drain() {
            backend.delete_program(program.id);
        }
        self.failures.clear();
        self.uniform_values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{AttributeDecl, BackendCall, RecordingBackend, UniformDecl};
    use crate::resources::ShaderDefines;
    use glam::Vec3;
    use wgpu::VertexFormat;

    fn params(defines: &[(&str, &str)]) -> ProgramParameters {
        ProgramParameters {
            template: "mesh_basic".to_string(),
            label: "test".to_string(),
            defines: ShaderDefines::from(defines),
            attributes: vec![AttributeDecl {
                name: "position".to_string(),
                format: VertexFormat::Float32x3,
                instanced: false,
            }],
            uniforms: vec![UniformDecl {
                name: "diffuse".to_string(),
                wgsl_type: "vec3<f32>",
            }],
            textures: Vec::new(),
        }
    }

    #[test]
    fn failures_are_not_recompiled() {
        let mut backend = RecordingBackend::new();
        backend.fail_on_define("BROKEN");
        let mut cache = ProgramCache::new().unwrap();
        let p = params(&[("BROKEN", "1")]);

        let first = cache.acquire(&mut backend, &p).unwrap_err();
        let second = cache.acquire(&mut backend, &p).unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, StrataError::ProgramCompile { ref flags, .. } if flags.contains("BROKEN")));
        assert_eq!(backend.compile_attempts(), 1);
        assert_eq!(backend.compiled_programs(), 0);
    }

    #[test]
    fn identical_uniform_values_are_uploaded_once() {
        let mut backend = RecordingBackend::new();
        let mut cache = ProgramCache::new().unwrap();
        let program = cache.acquire(&mut backend, &params(&[])).unwrap();

        assert!(cache.upload_uniform(&mut backend, &program, "diffuse", Vec3::ONE.into()));
        assert!(!cache.upload_uniform(&mut backend, &program, "diffuse", Vec3::ONE.into()));
        assert!(cache.upload_uniform(&mut backend, &program, "diffuse", Vec3::X.into()));
        assert!(!cache.upload_uniform(&mut backend, &program, "missing", 1.0.into()));
        assert_eq!(backend.count(|c| matches!(c, BackendCall::SetUniform { .. })), 2);
    }

    #[test]
    fn prune_evicts_dropped_programs() {
        let mut backend = RecordingBackend::new();
        let mut cache = ProgramCache::new().unwrap();
        let program = cache.acquire(&mut backend, &params(&[])).unwrap();
        assert_eq!(cache.prune(&mut backend), 0);
        drop(program);
        assert_eq!(cache.prune(&mut backend), 1);
        assert_eq!(backend.live_programs(), 0);
    }
}
