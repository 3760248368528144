//! Texture uploads and per-draw texture unit allocation.

use rustc_hash::FxHashMap;

use crate::assets::TextureHandle;
use crate::errors::{Result, StrataError};
use crate::renderer::backend::{Backend, TextureId};
use crate::resources::Texture;

/// Hands out texture units for one draw call.
///
/// Reset before each draw. Running past the backend limit refuses the
/// binding instead of wrapping around onto a unit already in use.
#[derive(Debug, Clone)]
pub struct TextureUnits {
    next: u32,
    max: u32,
}

impl TextureUnits {
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self { next: 0, max }
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Marks the first `count` units as taken, e.g. ones bound for the whole frame.
    pub fn reserve(&mut self, count: u32) {
        self.next = self.next.max(count.min(self.max));
    }

    pub fn allocate(&mut self) -> Result<u32> {
        if self.next >= self.max {
            return Err(StrataError::TextureUnitsExhausted {
                requested: self.next,
                available: self.max,
            });
        }
        let unit = self.next;
        self.next += 1;
        Ok(unit)
    }

    #[must_use]
    pub fn used(&self) -> u32 {
        self.next
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }
}

#[derive(Debug, Clone, Copy)]
struct GpuTexture {
    id: TextureId,
    version: u64,
}

/// Mirrors CPU [`Texture`]s as backend textures, re-uploading on version change.
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: FxHashMap<TextureHandle, GpuTexture>,
}

impl TextureCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads `texture` if it was never uploaded or changed since.
    pub fn prepare(
        &mut self,
        backend: &mut dyn Backend,
        handle: TextureHandle,
        texture: &Texture,
    ) -> TextureId {
        match self.textures.get_mut(&handle) {
            Some(gpu) if gpu.version == texture.version() => gpu.id,
            Some(gpu) => {
                gpu.id = backend.upload_texture(Some(gpu.id), texture);
                gpu.version = texture.version();
                gpu.id
            }
            None => {
                let id = backend.upload_texture(None, texture);
                self.textures.insert(
                    handle,
                    GpuTexture {
                        id,
                        version: texture.version(),
                    },
                );
                id
            }
        }
    }

    #[must_use]
    pub fn get(&self, handle: TextureHandle) -> Option<TextureId> {
        self.textures.get(&handle).map(|t| t.id)
    }

    pub fn dispose(&mut self, backend: &mut dyn Backend, handle: TextureHandle) -> Option<TextureId> {
        let gpu = self.textures.remove(&handle)?;
        backend.delete_texture(gpu.id);
        Some(gpu.id)
    }

    pub fn dispose_all(&mut self, backend: &mut dyn Backend) {
        for (_, gpu) in self.textures.drain() {
            backend.delete_texture(gpu.id);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{BackendCall, RecordingBackend};
    use slotmap::KeyData;

    #[test]
    fn allocation_stops_at_limit() {
        let mut units = TextureUnits::new(2);
        assert_eq!(units.allocate(), Ok(0));
        assert_eq!(units.allocate(), Ok(1));
        assert!(matches!(
            units.allocate(),
            Err(StrataError::TextureUnitsExhausted { available: 2, .. })
        ));
        units.reset();
        assert_eq!(units.allocate(), Ok(0));
    }

    #[test]
    fn reupload_only_on_version_change() {
        let mut backend = RecordingBackend::new();
        let mut cache = TextureCache::new();
        let handle = TextureHandle::from(KeyData::from_ffi(1));
        let mut tex = Texture::solid("white", [255; 4]);

        let id = cache.prepare(&mut backend, handle, &tex);
        assert_eq!(cache.prepare(&mut backend, handle, &tex), id);
        tex.needs_update();
        assert_eq!(cache.prepare(&mut backend, handle, &tex), id);

        let uploads = backend.count(|c| matches!(c, BackendCall::UploadTexture { .. }));
        assert_eq!(uploads, 2);
    }
}
