//! Asset Storage
//!
//! Geometries, materials and textures live in [`Assets`] and are referenced
//! from the scene by handle. Many meshes may share one handle; the asset lives
//! until it is explicitly removed.

pub mod handle;
pub mod storage;

pub use handle::{GeometryHandle, MaterialHandle, TextureHandle};
pub use storage::AssetStorage;

use crate::resources::{Geometry, Material, Texture};

#[derive(Default)]
pub struct Assets {
    pub geometries: AssetStorage<GeometryHandle, Geometry>,
    pub materials: AssetStorage<MaterialHandle, Material>,
    pub textures: AssetStorage<TextureHandle, Texture>,
}

impl Assets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryHandle {
        let uuid = geometry.uuid;
        self.geometries.add_with_uuid(uuid, geometry)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialHandle {
        let uuid = material.uuid;
        self.materials.add_with_uuid(uuid, material)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureHandle {
        let uuid = texture.uuid;
        self.textures.add_with_uuid(uuid, texture)
    }

    #[must_use]
    pub fn geometry(&self, handle: GeometryHandle) -> Option<&Geometry> {
        self.geometries.get(handle)
    }

    pub fn geometry_mut(&mut self, handle: GeometryHandle) -> Option<&mut Geometry> {
        self.geometries.get_mut(handle)
    }

    #[must_use]
    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    pub fn material_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle)
    }

    #[must_use]
    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut Texture> {
        self.textures.get_mut(handle)
    }
}
