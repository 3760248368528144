use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::assets::TextureHandle;

/// A single named shader input value.
///
/// Texture slots carry the handle; the renderer swaps it for the allocated
/// texture unit before upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    Texture(TextureHandle),
}

impl UniformValue {
    /// WGSL declaration type. Samplers resolve to a unit index.
    #[must_use]
    pub fn wgsl_type_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "f32",
            UniformValue::Int(_) | UniformValue::Texture(_) => "i32",
            UniformValue::Bool(_) => "u32",
            UniformValue::Vec2(_) => "vec2<f32>",
            UniformValue::Vec3(_) => "vec3<f32>",
            UniformValue::Vec4(_) => "vec4<f32>",
            UniformValue::Mat3(_) => "mat3x3<f32>",
            UniformValue::Mat4(_) => "mat4x4<f32>",
        }
    }

    #[must_use]
    pub fn is_texture(&self) -> bool {
        matches!(self, UniformValue::Texture(_))
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat3> for UniformValue {
    fn from(v: Mat3) -> Self {
        UniformValue::Mat3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

impl From<TextureHandle> for UniformValue {
    fn from(v: TextureHandle) -> Self {
        UniformValue::Texture(v)
    }
}
