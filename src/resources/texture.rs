use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat3, Vec2};
use uuid::Uuid;
use wgpu::{AddressMode, FilterMode, TextureFormat, TextureViewDimension};

use crate::resources::color::ColorSpace;
use crate::resources::version_tracker::MutGuard;

static NEXT_TEXTURE_ID: AtomicU32 = AtomicU32::new(1);

/// Sampling parameters. Part of the GPU texture object, not of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSampler {
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub anisotropy: u16,
}

impl Default for TextureSampler {
    fn default() -> Self {
        Self {
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            anisotropy: 1,
        }
    }
}

/// UV offset/repeat/rotation, uploaded as a 3x3 matrix uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub offset: Vec2,
    pub repeat: Vec2,
    pub rotation: f32,
    pub center: Vec2,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            repeat: Vec2::ONE,
            rotation: 0.0,
            center: Vec2::splat(0.5),
        }
    }
}

impl TextureTransform {
    /// `translate(offset) * translate(center) * rotate * scale(repeat) * translate(-center)`
    #[must_use]
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_translation(self.offset + self.center)
            * Mat3::from_angle(-self.rotation)
            * Mat3::from_scale(self.repeat)
            * Mat3::from_translation(-self.center)
    }
}

/// CPU-side texture description.
///
/// `version` bumps on every pixel mutation; the renderer re-uploads when it
/// sees a version it has not uploaded yet.
#[derive(Debug, Clone)]
pub struct Texture {
    pub uuid: Uuid,
    id: u32,
    pub name: String,

    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub view_dimension: TextureViewDimension,
    data: Option<Vec<u8>>,

    /// Encoding of the stored texels. Textures in sRGB are decoded in the shader.
    pub color_space: ColorSpace,
    pub sampler: TextureSampler,
    pub transform: TextureTransform,
    pub flip_y: bool,
    pub generate_mipmaps: bool,

    version: u64,
}

impl Texture {
    #[must_use]
    pub fn new_2d(name: &str, width: u32, height: u32, data: Option<Vec<u8>>, format: TextureFormat) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            width,
            height,
            format,
            view_dimension: TextureViewDimension::D2,
            data,
            color_space: ColorSpace::NoColorSpace,
            sampler: TextureSampler::default(),
            transform: TextureTransform::default(),
            flip_y: false,
            generate_mipmaps: true,
            version: 1,
        }
    }

    /// Cube map with six layers of `size` x `size`.
    #[must_use]
    pub fn new_cube(name: &str, size: u32, data: Option<Vec<u8>>, format: TextureFormat) -> Self {
        let mut tex = Self::new_2d(name, size, size, data, format);
        tex.view_dimension = TextureViewDimension::Cube;
        tex
    }

    /// 1x1 RGBA8 texture filled with `rgba`.
    #[must_use]
    pub fn solid(name: &str, rgba: [u8; 4]) -> Self {
        Self::new_2d(name, 1, 1, Some(rgba.to_vec()), TextureFormat::Rgba8Unorm)
    }

    #[must_use]
    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

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

    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Mutable pixel access; the version bumps when the guard drops.
    pub fn data_mut(&mut self) -> MutGuard<'_, Option<Vec<u8>>> {
        MutGuard::new(&mut self.data, &mut self.version)
    }

    /// Forces a re-upload without touching the data.
    pub fn needs_update(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    #[must_use]
    pub fn is_cube(&self) -> bool {
        self.view_dimension == TextureViewDimension::Cube
    }
}
