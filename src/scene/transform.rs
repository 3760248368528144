use glam::{Affine3A, EulerRot, Mat3, Mat4, Quat, Vec3};

/// Local TRS plus cached local/world matrices.
///
/// The public `position`/`rotation`/`scale` fields may be written freely.
/// Nothing is recomputed on write: [`Transform::update_local_matrix`] compares
/// them against a shadow copy on the next matrix pass and rebuilds only when
/// they differ (or when [`Transform::mark_dirty`] was called).
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    /// When false, the local matrix is never rebuilt from TRS; it keeps
    /// whatever [`Transform::set_local_matrix`] last stored.
    pub matrix_auto_update: bool,

    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,

    last_position: Vec3,
    last_rotation: Quat,
    last_scale: Vec3,
    force_update: bool,
    /// Set when the world matrix was rewritten outside a subtree pass; the
    /// next pass must still recompute the children.
    pub(crate) world_needs_update: bool,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            matrix_auto_update: true,

            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,

            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
            last_scale: Vec3::ONE,
            force_update: true,
            world_needs_update: false,
        }
    }

    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        let mut t = Self::new();
        t.position = position;
        t
    }

    /// Replaces all three TRS components and marks the local matrix stale.
    /// The rotation is stored normalized.
    pub fn set_local_transform(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.position = position;
        self.rotation = rotation.normalize();
        self.scale = scale;
        self.mark_dirty();
    }

    /// True if the next [`update_local_matrix`](Self::update_local_matrix) will rebuild.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.force_update
            || (self.matrix_auto_update
                && (self.position != self.last_position
                    || self.rotation != self.last_rotation
                    || self.scale != self.last_scale))
    }

    /// Rebuilds the local matrix if TRS changed since the last call.
    /// Returns whether the local matrix changed.
    pub fn update_local_matrix(&mut self) -> bool {
        if !self.matrix_auto_update {
            return std::mem::take(&mut self.force_update);
        }

        if !self.is_dirty() {
            return false;
        }

        if !self.rotation.is_normalized() {
            self.rotation = self.rotation.normalize();
        }

        self.local_matrix =
            Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position);

        self.last_position = self.position;
        self.last_rotation = self.rotation;
        self.last_scale = self.scale;
        self.force_update = false;
        true
    }

    // ========================================================================
    // Euler helpers
    // ========================================================================

    pub fn set_rotation_euler(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Quat::from_euler(EulerRot::XYZ, x, y, z);
    }

    pub fn set_rotation_euler_with_order(&mut self, x: f32, y: f32, z: f32, order: EulerRot) {
        self.rotation = Quat::from_euler(order, x, y, z);
    }

    #[must_use]
    pub fn rotation_euler(&self) -> Vec3 {
        let (x, y, z) = self.rotation.to_euler(EulerRot::XYZ);
        Vec3::new(x, y, z)
    }

    // ========================================================================
    // Matrices
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    #[inline]
    pub(crate) fn set_world_matrix(&mut self, mat: Affine3A) {
        self.world_matrix = mat;
    }

    /// Stores a local matrix verbatim, without decomposing it.
    ///
    /// Intended for `matrix_auto_update == false`; with auto update on, the next
    /// pass rebuilds the matrix from TRS and this value is lost.
    pub fn set_local_matrix(&mut self, mat: Affine3A) {
        self.local_matrix = mat;
        self.force_update = true;
    }

    /// Stores a local matrix and decomposes it back into TRS.
    /// Shear is lost in the decomposition.
    pub fn apply_local_matrix(&mut self, mat: Affine3A) {
        let (scale, rotation, translation) = mat.to_scale_rotation_translation();
        self.local_matrix = mat;
        self.scale = scale;
        self.rotation = rotation;
        self.position = translation;

        self.last_scale = scale;
        self.last_rotation = rotation;
        self.last_position = translation;
        self.force_update = true;
    }

    pub fn apply_local_matrix_from_mat4(&mut self, mat: Mat4) {
        self.apply_local_matrix(Affine3A::from_mat4(mat));
    }

    /// Orients -Z towards `target`. `target` and `up` are in parent space.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let to_target = target - self.position;
        if to_target.length_squared() < 1e-12 {
            return;
        }
        let forward = to_target.normalize();
        if forward.cross(up).length_squared() < 1e-8 {
            return;
        }

        let right = forward.cross(up).normalize();
        let new_up = right.cross(forward).normalize();
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, new_up, -forward));
    }

    /// Forces a rebuild on the next matrix pass.
    pub fn mark_dirty(&mut self) {
        self.force_update = true;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
