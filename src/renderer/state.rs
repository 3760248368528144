//! GPU State Tracker
//!
//! Mirrors the backend's fixed-function and binding state and forwards a
//! change only when the desired value differs from the mirror.
//!
//! The mirror is only correct while every state change goes through the
//! tracker. After touching the backend directly (or after a context loss),
//! call [`StateTracker::reset`] to push known defaults and resync.

use glam::Vec4;
use wgpu::{BlendState, ColorWrites, CompareFunction, Face, FrontFace};

use crate::renderer::backend::{
    Backend, BufferId, DepthBias, ProgramId, RenderTargetId, StencilParams, TextureId,
    VertexAttributeLayout, Viewport,
};
use crate::resources::{MaterialSettings, Side};

/// Snapshot of everything the tracker mirrors.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub program: Option<ProgramId>,
    pub blend: Option<BlendState>,
    pub depth_test: Option<CompareFunction>,
    pub depth_write: bool,
    pub stencil: Option<StencilParams>,
    pub cull_mode: Option<Face>,
    pub front_face: FrontFace,
    pub polygon_offset: Option<DepthBias>,
    pub color_mask: ColorWrites,
    pub line_width: f32,
    pub alpha_to_coverage: bool,

    pub framebuffer: Option<RenderTargetId>,
    pub viewport: Option<Viewport>,
    pub scissor: Option<Viewport>,

    pub texture_units: Vec<Option<TextureId>>,
    pub vertex_attributes: Vec<Option<(BufferId, VertexAttributeLayout)>>,
    pub index_buffer: Option<BufferId>,
}

impl PipelineState {
    /// Backend defaults after context creation.
    #[must_use]
    pub fn defaults(texture_units: u32, vertex_attributes: u32) -> Self {
        Self {
            program: None,
            blend: None,
            depth_test: Some(CompareFunction::LessEqual),
            depth_write: true,
            stencil: None,
            cull_mode: Some(Face::Back),
            front_face: FrontFace::Ccw,
            polygon_offset: None,
            color_mask: ColorWrites::ALL,
            line_width: 1.0,
            alpha_to_coverage: false,
            framebuffer: None,
            viewport: None,
            scissor: None,
            texture_units: vec![None; texture_units as usize],
            vertex_attributes: vec![None; vertex_attributes as usize],
            index_buffer: None,
        }
    }
}

/// Identifies the attribute setup of one (geometry, program) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeBindingKey {
    pub geometry_id: u32,
    pub layout_version: u64,
    pub program: ProgramId,
}

/// Diffing layer between the frame driver and the backend.
#[derive(Debug)]
pub struct StateTracker {
    current: PipelineState,
    attribute_binding: Option<AttributeBindingKey>,
    changes: u64,
}

macro_rules! diff_set {
    ($self:ident, $backend:ident, $field:ident, $value:expr, $call:ident) => {{
        let value = $value;
        if $self.current.$field != value {
            $backend.$call(value);
            $self.current.$field = value;
            $self.changes += 1;
        }
    }};
}

impl StateTracker {
    #[must_use]
    pub fn new(texture_units: u32, vertex_attributes: u32) -> Self {
        Self {
            current: PipelineState::defaults(texture_units, vertex_attributes),
            attribute_binding: None,
            changes: 0,
        }
    }

    #[must_use]
    pub fn current(&self) -> &PipelineState {
        &self.current
    }

    /// Number of backend state calls issued so far.
    #[must_use]
    pub fn change_count(&self) -> u64 {
        self.changes
    }

    /// Pushes defaults to the backend and resets the mirror to them.
    pub fn reset(&mut self, backend: &mut dyn Backend) {
        let units = self.current.texture_units.len() as u32;
        let attributes = self.current.vertex_attributes.len() as u32;
        let defaults = PipelineState::defaults(units, attributes);

        backend.use_program(None);
        backend.set_blend(defaults.blend);
        backend.set_depth_test(defaults.depth_test);
        backend.set_depth_write(defaults.depth_write);
        backend.set_stencil(defaults.stencil);
        backend.set_cull_mode(defaults.cull_mode);
        backend.set_front_face(defaults.front_face);
        backend.set_polygon_offset(defaults.polygon_offset);
        backend.set_color_mask(defaults.color_mask);
        backend.set_line_width(defaults.line_width);
        backend.set_alpha_to_coverage(defaults.alpha_to_coverage);
        backend.bind_framebuffer(None);
        backend.set_scissor(None);
        for unit in 0..units {
            backend.bind_texture(unit, None);
        }
        for location in 0..attributes {
            backend.disable_vertex_attribute(location);
        }
        backend.bind_index_buffer(None);

        self.current = defaults;
        self.attribute_binding = None;
        log::debug!("State tracker reset to defaults");
    }

    // ========================================================================
    // Material state
    // ========================================================================

    /// Applies the fixed-function state of `settings`.
    ///
    /// `front_face_flipped` is set for objects whose world matrix mirrors
    /// geometry (negative determinant); it swaps the winding order.
    pub fn set_material(
        &mut self,
        backend: &mut dyn Backend,
        settings: &MaterialSettings,
        front_face_flipped: bool,
    ) {
        let cull = match settings.side {
            Side::Front => Some(Face::Back),
            Side::Back => Some(Face::Front),
            Side::Double => None,
        };
        self.set_cull_mode(backend, cull);
        self.set_front_face(
            backend,
            if front_face_flipped {
                FrontFace::Cw
            } else {
                FrontFace::Ccw
            },
        );

        self.set_blend(backend, settings.effective_blend());
        self.set_depth_test(
            backend,
            settings.depth_test.then_some(settings.depth_func),
        );
        self.set_depth_write(backend, settings.depth_write);
        self.set_color_mask(backend, settings.color_write);

        let stencil = settings.stencil.write.then_some(StencilParams {
            func: settings.stencil.func,
            reference: settings.stencil.reference,
            func_mask: settings.stencil.func_mask,
            write_mask: settings.stencil.write_mask,
            fail: settings.stencil.fail,
            z_fail: settings.stencil.z_fail,
            z_pass: settings.stencil.z_pass,
        });
        self.set_stencil(backend, stencil);

        self.set_polygon_offset(
            backend,
            settings
                .polygon_offset
                .map(|o| DepthBias::new(o.factor, o.units)),
        );
        self.set_alpha_to_coverage(backend, settings.alpha_to_coverage);
    }

    // ========================================================================
    // Individual fields
    // ========================================================================

    pub fn use_program(&mut self, backend: &mut dyn Backend, program: ProgramId) -> bool {
        if self.current.program == Some(program) {
            return false;
        }
        backend.use_program(Some(program));
        self.current.program = Some(program);
        self.changes += 1;
        true
    }

    pub fn set_blend(&mut self, backend: &mut dyn Backend, blend: Option<BlendState>) {
        diff_set!(self, backend, blend, blend, set_blend);
    }

    pub fn set_depth_test(&mut self, backend: &mut dyn Backend, func: Option<CompareFunction>) {
        diff_set!(self, backend, depth_test, func, set_depth_test);
    }

    pub fn set_depth_write(&mut self, backend: &mut dyn Backend, enabled: bool) {
        diff_set!(self, backend, depth_write, enabled, set_depth_write);
    }

    pub fn set_stencil(&mut self, backend: &mut dyn Backend, stencil: Option<StencilParams>) {
        diff_set!(self, backend, stencil, stencil, set_stencil);
    }

    pub fn set_cull_mode(&mut self, backend: &mut dyn Backend, face: Option<Face>) {
        diff_set!(self, backend, cull_mode, face, set_cull_mode);
    }

    pub fn set_front_face(&mut self, backend: &mut dyn Backend, front_face: FrontFace) {
        diff_set!(self, backend, front_face, front_face, set_front_face);
    }

    pub fn set_polygon_offset(&mut self, backend: &mut dyn Backend, bias: Option<DepthBias>) {
        diff_set!(self, backend, polygon_offset, bias, set_polygon_offset);
    }

    pub fn set_color_mask(&mut self, backend: &mut dyn Backend, mask: ColorWrites) {
        diff_set!(self, backend, color_mask, mask, set_color_mask);
    }

    pub fn set_alpha_to_coverage(&mut self, backend: &mut dyn Backend, enabled: bool) {
        diff_set!(self, backend, alpha_to_coverage, enabled, set_alpha_to_coverage);
    }

    pub fn set_line_width(&mut self, backend: &mut dyn Backend, width: f32) {
        if self.current.line_width.to_bits() != width.to_bits() {
            backend.set_line_width(width);
            self.current.line_width = width;
            self.changes += 1;
        }
    }

    // ========================================================================
    // Targets
    // ========================================================================

    pub fn bind_framebuffer(&mut self, backend: &mut dyn Backend, target: Option<RenderTargetId>) {
        diff_set!(self, backend, framebuffer, target, bind_framebuffer);
    }

    pub fn set_viewport(&mut self, backend: &mut dyn Backend, viewport: Viewport) {
        if self.current.viewport != Some(viewport) {
            backend.set_viewport(viewport);
            self.current.viewport = Some(viewport);
            self.changes += 1;
        }
    }

    pub fn set_scissor(&mut self, backend: &mut dyn Backend, scissor: Option<Viewport>) {
        diff_set!(self, backend, scissor, scissor, set_scissor);
    }

    /// Clears the bound target. Color and depth writes are forced on first,
    /// because masked writes would also mask the clear.
    pub fn clear(&mut self, backend: &mut dyn Backend, color: Option<Vec4>, depth: bool, stencil: bool) {
        if color.is_some() {
            self.set_color_mask(backend, ColorWrites::ALL);
        }
        if depth {
            self.set_depth_write(backend, true);
        }
        backend.clear(color, depth, stencil);
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    /// Binds `texture` to `unit`. Returns false if `unit` is out of range.
    pub fn bind_texture(&mut self, backend: &mut dyn Backend, unit: u32, texture: Option<TextureId>) -> bool {
        let Some(slot) = self.current.texture_units.get_mut(unit as usize) else {
            return false;
        };
        if *slot != texture {
            backend.bind_texture(unit, texture);
            *slot = texture;
            self.changes += 1;
        }
        true
    }

    /// Unbinds every texture unit that still points at `texture`.
    pub fn forget_texture(&mut self, texture: TextureId) {
        for slot in &mut self.current.texture_units {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    /// True if the (geometry, program) attribute setup is already bound.
    #[must_use]
    pub fn attributes_bound(&self, key: AttributeBindingKey) -> bool {
        self.attribute_binding == Some(key)
    }

    pub fn begin_attribute_binding(&mut self, key: AttributeBindingKey) {
        self.attribute_binding = Some(key);
    }

    /// Invalidates the attribute binding cache, e.g. after a buffer was reallocated.
    pub fn invalidate_attribute_binding(&mut self) {
        self.attribute_binding = None;
    }

    pub fn bind_vertex_attribute(
        &mut self,
        backend: &mut dyn Backend,
        location: u32,
        buffer: BufferId,
        layout: VertexAttributeLayout,
    ) {
        let Some(slot) = self.current.vertex_attributes.get_mut(location as usize) else {
            return;
        };
        if *slot != Some((buffer, layout)) {
            backend.bind_vertex_attribute(location, buffer, layout);
            *slot = Some((buffer, layout));
        }
    }

    /// Disables every enabled location not in `used`.
    pub fn disable_unused_attributes(&mut self, backend: &mut dyn Backend, used: &[u32]) {
        for (location, slot) in self.current.vertex_attributes.iter_mut().enumerate() {
            let location = location as u32;
            if slot.is_some() && !used.contains(&location) {
                backend.disable_vertex_attribute(location);
                *slot = None;
            }
        }
    }

    pub fn bind_index_buffer(&mut self, backend: &mut dyn Backend, buffer: Option<BufferId>) {
        diff_set!(self, backend, index_buffer, buffer, bind_index_buffer);
    }

    /// Drops mirror entries that refer to a deleted buffer.
    pub fn forget_buffer(&mut self, buffer: BufferId) {
        for slot in &mut self.current.vertex_attributes {
            if slot.is_some_and(|(b, _)| b == buffer) {
                *slot = None;
            }
        }
        if self.current.index_buffer == Some(buffer) {
            self.current.index_buffer = None;
        }
        self.attribute_binding = None;
    }

    /// Drops the mirror entry of a deleted program.
    pub fn forget_program(&mut self, program: ProgramId) {
        if self.current.program == Some(program) {
            self.current.program = None;
        }
        if self.attribute_binding.is_some_and(|k| k.program == program) {
            self.attribute_binding = None;
        }
    }
}
