use glam::{Affine3A, Mat4, Vec3, Vec4};

use crate::resources::BoundingSphere;
use crate::scene::layers::Layers;

/// Anything that can produce a projection matrix.
pub trait CameraProjection {
    fn projection_matrix(&self) -> Mat4;
    fn near(&self) -> f32;
    fn far(&self) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveProjection {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
}

impl CameraProjection for PerspectiveProjection {
    fn projection_matrix(&self) -> Mat4 {
        let fov = 2.0 * ((self.fov_y * 0.5).tan() / self.zoom.max(1e-6)).atan();
        Mat4::perspective_rh(fov, self.aspect, self.near, self.far)
    }

    fn near(&self) -> f32 {
        self.near
    }

    fn far(&self) -> f32 {
        self.far
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthographicProjection {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
}

impl CameraProjection for OrthographicProjection {
    fn projection_matrix(&self) -> Mat4 {
        let zoom = self.zoom.max(1e-6);
        let cx = (self.left + self.right) * 0.5;
        let cy = (self.top + self.bottom) * 0.5;
        let dx = (self.right - self.left) / (2.0 * zoom);
        let dy = (self.top - self.bottom) / (2.0 * zoom);
        Mat4::orthographic_rh(cx - dx, cx + dx, cy - dy, cy + dy, self.near, self.far)
    }

    fn near(&self) -> f32 {
        self.near
    }

    fn far(&self) -> f32 {
        self.far
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective(PerspectiveProjection),
    Orthographic(OrthographicProjection),
}

impl CameraProjection for Projection {
    fn projection_matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective(p) => p.projection_matrix(),
            Projection::Orthographic(o) => o.projection_matrix(),
        }
    }

    fn near(&self) -> f32 {
        match self {
            Projection::Perspective(p) => p.near,
            Projection::Orthographic(o) => o.near,
        }
    }

    fn far(&self) -> f32 {
        match self {
            Projection::Perspective(p) => p.far,
            Projection::Orthographic(o) => o.far,
        }
    }
}

/// Camera component. View matrices are refreshed by the transform system
/// whenever the owning node's world matrix changes.
#[derive(Debug, Clone)]
pub struct Camera {
    pub projection: Projection,
    /// Only nodes sharing a layer with the camera are collected.
    pub layers: Layers,

    pub(crate) world_matrix: Affine3A,
    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,
    pub(crate) view_projection_matrix: Mat4,
    pub(crate) frustum: Frustum,
}

impl Camera {
    /// `fov_y` in degrees.
    #[must_use]
    pub fn new_perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective(PerspectiveProjection {
            fov_y: fov_y.to_radians(),
            aspect,
            near,
            far,
            zoom: 1.0,
        }))
    }

    #[must_use]
    pub fn new_orthographic(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Orthographic(OrthographicProjection {
            left,
            right,
            bottom,
            top,
            near,
            far,
            zoom: 1.0,
        }))
    }

    #[must_use]
    pub fn new(projection: Projection) -> Self {
        let mut cam = Self {
            projection,
            layers: Layers::default(),
            world_matrix: Affine3A::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection_matrix: Mat4::IDENTITY,
            frustum: Frustum::default(),
        };
        cam.update_projection_matrix();
        cam
    }

    /// Call after editing `projection`.
    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = self.projection.projection_matrix();
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(self.view_projection_matrix);
    }

    pub(crate) fn update_view_projection(&mut self, world_transform: &Affine3A) {
        self.world_matrix = *world_transform;
        self.view_matrix = Mat4::from(world_transform.inverse());
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(self.view_projection_matrix);
    }

    #[must_use]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    #[must_use]
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    #[must_use]
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection_matrix
    }

    #[must_use]
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    /// Distance in front of the camera along its view axis. Larger is farther.
    #[must_use]
    pub fn view_depth(&self, world_point: Vec3) -> f32 {
        -self.view_matrix.transform_point3(world_point).z
    }
}

/// Six clip planes (left, right, bottom, top, near, far), normals pointing inward.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Gribb-Hartmann extraction for a `[0, 1]` clip-space depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];
        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    #[must_use]
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(sphere.center) + plane.w >= -sphere.radius)
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }
}
