use glam::{Affine3A, Vec3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// Inverted box; expanding it by any point yields that point.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bbox = Self::EMPTY;
        for p in points {
            bbox.expand_by_point(p);
        }
        bbox
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    pub fn expand_by_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Box enclosing the eight transformed corners.
    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        if self.is_empty() {
            return *self;
        }
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        Self::from_points(corners.into_iter().map(|c| matrix.transform_point3(c)))
    }
}

/// Bounding sphere.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        // Tolerate the rounding of the sqrt used to derive the radius.
        point.distance_squared(self.center) <= self.radius * self.radius * (1.0 + 1e-5) + 1e-6
    }

    /// Sphere enclosing this one after `matrix`; non-uniform scale uses the largest axis.
    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let max_scale = matrix
            .matrix3
            .x_axis
            .length()
            .max(matrix.matrix3.y_axis.length())
            .max(matrix.matrix3.z_axis.length());
        Self {
            center: matrix.transform_point3(self.center),
            radius: self.radius * max_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_expands_to_point() {
        let mut bbox = BoundingBox::EMPTY;
        assert!(bbox.is_empty());
        bbox.expand_by_point(Vec3::new(1.0, 2.0, 3.0));
        assert!(!bbox.is_empty());
        assert_eq!(bbox.min, bbox.max);
    }

    #[test]
    fn sphere_transform_scales_radius() {
        let sphere = BoundingSphere {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let m = Affine3A::from_scale_rotation_translation(
            Vec3::new(1.0, 3.0, 2.0),
            glam::Quat::IDENTITY,
            Vec3::X,
        );
        let moved = sphere.transform(&m);
        assert_eq!(moved.center, Vec3::X);
        assert!((moved.radius - 3.0).abs() < 1e-6);
    }
}
