//! Backend Binding Layer
//!
//! The rendering core never talks to a graphics API directly. Everything it
//! needs from the GPU goes through the [`Backend`] trait: compile a program,
//! upload buffers and textures, flip fixed-function state, issue draws.
//!
//! State-setting methods are fire-and-forget. The [`StateTracker`] decides
//! *whether* to call them; the backend applies them unconditionally.
//!
//! [`RecordingBackend`] is a headless implementation that records every call.
//! It backs the test suite and is handy for inspecting what a frame submits.
//!
//! [`StateTracker`]: super::state::StateTracker

use glam::Vec4;
use rustc_hash::FxHashMap;
use wgpu::{
    BlendState, ColorWrites, CompareFunction, Face, FrontFace, IndexFormat, PrimitiveTopology,
    StencilOperation, TextureFormat, VertexFormat,
};

use crate::errors::{Result, StrataError};
use crate::resources::{BufferUsage, ShaderDefines, Texture, UniformValue};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! backend_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

backend_id! {
    /// Compiled program object.
    ProgramId,
    /// GPU buffer object.
    BufferId,
    /// GPU texture object.
    TextureId,
    /// Offscreen color+depth target.
    RenderTargetId,
}

// ============================================================================
// Descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub max_texture_units: u32,
    pub max_vertex_attributes: u32,
    pub max_uniform_components: u32,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            max_vertex_attributes: 16,
            max_uniform_components: 4096,
        }
    }
}

/// A uniform the generated source declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub wgsl_type: &'static str,
}

/// A vertex input the generated source declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: String,
    pub format: VertexFormat,
    pub instanced: bool,
}

/// Fully synthesized program, ready for the backend compiler.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub label: String,
    pub code: String,
    /// Feature defines the code was generated from. Used for diagnostics only.
    pub defines: ShaderDefines,
    pub uniforms: Vec<UniformDecl>,
    pub attributes: Vec<AttributeDecl>,
    /// xxh3-128 of `code`.
    pub source_hash: u128,
}

/// Active uniform and attribute locations reported by the backend compiler.
///
/// Declarations the compiler optimized away are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramReflection {
    pub uniforms: FxHashMap<String, u32>,
    pub attributes: FxHashMap<String, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// How a bound buffer feeds one attribute location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeLayout {
    pub format: VertexFormat,
    pub offset: u64,
    pub stride: u64,
    /// 0 for per-vertex data, 1 for per-instance data.
    pub divisor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilParams {
    pub func: CompareFunction,
    pub reference: u32,
    pub func_mask: u32,
    pub write_mask: u32,
    pub fail: StencilOperation,
    pub z_fail: StencilOperation,
    pub z_pass: StencilOperation,
}

/// Polygon offset stored bitwise so that it compares exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthBias {
    factor_bits: u32,
    units_bits: u32,
}

impl DepthBias {
    #[must_use]
    pub fn new(factor: f32, units: f32) -> Self {
        Self {
            factor_bits: factor.to_bits(),
            units_bits: units.to_bits(),
        }
    }

    #[must_use]
    pub fn factor(self) -> f32 {
        f32::from_bits(self.factor_bits)
    }

    #[must_use]
    pub fn units(self) -> f32 {
        f32::from_bits(self.units_bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// One draw submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub topology: PrimitiveTopology,
    /// `Some` when an index buffer is bound.
    pub index_format: Option<IndexFormat>,
    pub start: u32,
    pub count: u32,
    pub instances: u32,
}

// ============================================================================
// Backend trait
// ============================================================================

/// Abstract GPU surface consumed by the rendering core.
pub trait Backend {
    fn capabilities(&self) -> BackendCapabilities;

    // ---- Programs ----
    fn compile_program(&mut self, source: &ProgramSource) -> Result<(ProgramId, ProgramReflection)>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: Option<ProgramId>);
    /// `value` never carries a texture handle; samplers arrive as `Int(unit)`.
    fn set_uniform(&mut self, location: u32, value: &UniformValue);

    // ---- Buffers ----
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8], usage: BufferUsage) -> BufferId;
    fn update_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);
    fn delete_buffer(&mut self, buffer: BufferId);
    fn bind_vertex_attribute(&mut self, location: u32, buffer: BufferId, layout: VertexAttributeLayout);
    fn disable_vertex_attribute(&mut self, location: u32);
    fn bind_index_buffer(&mut self, buffer: Option<BufferId>);

    // ---- Textures ----
    /// Creates (`existing == None`) or re-uploads a texture.
    fn upload_texture(&mut self, existing: Option<TextureId>, texture: &Texture) -> TextureId;
    fn delete_texture(&mut self, texture: TextureId);
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    // ---- Targets ----
    fn create_render_target(&mut self, width: u32, height: u32, format: TextureFormat) -> RenderTargetId;
    fn delete_render_target(&mut self, target: RenderTargetId);
    /// Color attachment of `target` as a sampleable texture.
    fn render_target_texture(&self, target: RenderTargetId) -> Option<TextureId>;
    /// `None` binds the default (screen) framebuffer.
    fn bind_framebuffer(&mut self, target: Option<RenderTargetId>);
    /// Resolves multisampling and regenerates mipmaps of `target`.
    fn resolve_render_target(&mut self, target: RenderTargetId);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, scissor: Option<Viewport>);
    fn clear(&mut self, color: Option<Vec4>, depth: bool, stencil: bool);

    // ---- Fixed-function state ----
    fn set_blend(&mut self, blend: Option<BlendState>);
    fn set_depth_test(&mut self, func: Option<CompareFunction>);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_stencil(&mut self, stencil: Option<StencilParams>);
    fn set_cull_mode(&mut self, face: Option<Face>);
    fn set_front_face(&mut self, front_face: FrontFace);
    fn set_polygon_offset(&mut self, bias: Option<DepthBias>);
    fn set_color_mask(&mut self, mask: ColorWrites);
    fn set_line_width(&mut self, width: f32);
    fn set_alpha_to_coverage(&mut self, enabled: bool);

    // ---- Draw ----
    fn draw(&mut self, call: DrawCall);
}

// ============================================================================
// Recording backend
// ============================================================================

/// Every call a [`RecordingBackend`] received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CompileProgram { program: ProgramId, label: String },
    DeleteProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    SetUniform { location: u32, value: UniformValue },

    CreateBuffer { buffer: BufferId, kind: BufferKind, size: usize },
    UpdateBuffer { buffer: BufferId, offset: u64, size: usize },
    DeleteBuffer(BufferId),
    BindVertexAttribute { location: u32, buffer: BufferId, layout: VertexAttributeLayout },
    DisableVertexAttribute(u32),
    BindIndexBuffer(Option<BufferId>),

    UploadTexture { texture: TextureId, width: u32, height: u32 },
    DeleteTexture(TextureId),
    BindTexture { unit: u32, texture: Option<TextureId> },

    CreateRenderTarget { target: RenderTargetId, width: u32, height: u32 },
    DeleteRenderTarget(RenderTargetId),
    BindFramebuffer(Option<RenderTargetId>),
    ResolveRenderTarget(RenderTargetId),
    SetViewport(Viewport),
    SetScissor(Option<Viewport>),
    Clear { color: Option<Vec4>, depth: bool, stencil: bool },

    SetBlend(Option<BlendState>),
    SetDepthTest(Option<CompareFunction>),
    SetDepthWrite(bool),
    SetStencil(Option<StencilParams>),
    SetCullMode(Option<Face>),
    SetFrontFace(FrontFace),
    SetPolygonOffset(Option<DepthBias>),
    SetColorMask(ColorWrites),
    SetLineWidth(f32),
    SetAlphaToCoverage(bool),

    Draw(DrawCall),
}

impl BackendCall {
    /// Fixed-function and binding changes, the calls the state tracker exists to minimize.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            BackendCall::UseProgram(_)
                | BackendCall::BindTexture { .. }
                | BackendCall::BindFramebuffer(_)
                | BackendCall::SetViewport(_)
                | BackendCall::SetScissor(_)
                | BackendCall::SetBlend(_)
                | BackendCall::SetDepthTest(_)
                | BackendCall::SetDepthWrite(_)
                | BackendCall::SetStencil(_)
                | BackendCall::SetCullMode(_)
                | BackendCall::SetFrontFace(_)
                | BackendCall::SetPolygonOffset(_)
                | BackendCall::SetColorMask(_)
                | BackendCall::SetLineWidth(_)
                | BackendCall::SetAlphaToCoverage(_)
        )
    }
}

/// Headless [`Backend`] that records calls instead of executing them.
///
/// Reflection reports every declared uniform and attribute, with locations
/// assigned in declaration order. Compilation can be made to fail for
/// sources carrying a given define.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    capabilities: BackendCapabilities,
    calls: Vec<BackendCall>,
    failing_defines: Vec<String>,
    compile_attempts: usize,

    next_program: u32,
    next_buffer: u32,
    next_texture: u32,
    next_target: u32,

    live_programs: usize,
    live_buffers: usize,
    live_textures: usize,
    target_textures: FxHashMap<RenderTargetId, TextureId>,
}

impl RecordingBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Programs whose defines contain `define` fail to compile.
    pub fn fail_on_define(&mut self, define: &str) {
        self.failing_defines.push(define.to_string());
    }

    #[must_use]
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    #[must_use]
    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    #[must_use]
    pub fn state_changes(&self) -> usize {
        self.count(BackendCall::is_state_change)
    }

    #[must_use]
    pub fn draws(&self) -> Vec<DrawCall> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::Draw(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn compiled_programs(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::CompileProgram { .. }))
    }

    /// Compilations requested, failed ones included.
    #[must_use]
    pub fn compile_attempts(&self) -> usize {
        self.compile_attempts
    }

    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.live_programs
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live_buffers
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.live_textures
    }
}

impl Backend for RecordingBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<(ProgramId, ProgramReflection)> {
        self.compile_attempts += 1;
        if let Some(define) = self
            .failing_defines
            .iter()
            .find(|d| source.defines.contains(d))
        {
            return Err(StrataError::Backend(format!(
                "{}: unsupported feature {define}",
                source.label
            )));
        }

        self.next_program += 1;
        let program = ProgramId(self.next_program);
        self.live_programs += 1;
        self.calls.push(BackendCall::CompileProgram {
            program,
            label: source.label.clone(),
        });

        let reflection = ProgramReflection {
            uniforms: source
                .uniforms
                .iter()
                .enumerate()
                .map(|(i, u)| (u.name.clone(), i as u32))
                .collect(),
            attributes: source
                .attributes
                .iter()
                .enumerate()
                .map(|(i, a)| (a.name.clone(), i as u32))
                .collect(),
        };
        Ok((program, reflection))
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.live_programs = self.live_programs.saturating_sub(1);
        self.calls.push(BackendCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.calls.push(BackendCall::UseProgram(program));
    }

    fn set_uniform(&mut self, location: u32, value: &UniformValue) {
        self.calls.push(BackendCall::SetUniform {
            location,
            value: *value,
        });
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8], _usage: BufferUsage) -> BufferId {
        self.next_buffer += 1;
        let buffer = BufferId(self.next_buffer);
        self.live_buffers += 1;
        self.calls.push(BackendCall::CreateBuffer {
            buffer,
            kind,
            size: data.len(),
        });
        buffer
    }

    fn update_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        self.calls.push(BackendCall::UpdateBuffer {
            buffer,
            offset,
            size: data.len(),
        });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.live_buffers = self.live_buffers.saturating_sub(1);
        self.calls.push(BackendCall::DeleteBuffer(buffer));
    }

    fn bind_vertex_attribute(&mut self, location: u32, buffer: BufferId, layout: VertexAttributeLayout) {
        self.calls.push(BackendCall::BindVertexAttribute {
            location,
            buffer,
            layout,
        });
    }

    fn disable_vertex_attribute(&mut self, location: u32) {
        self.calls.push(BackendCall::DisableVertexAttribute(location));
    }

    fn bind_index_buffer(&mut self, buffer: Option<BufferId>) {
        self.calls.push(BackendCall::BindIndexBuffer(buffer));
    }

    fn upload_texture(&mut self, existing: Option<TextureId>, texture: &Texture) -> TextureId {
        let id = existing.unwrap_or_else(|| {
            self.next_texture += 1;
            self.live_textures += 1;
            TextureId(self.next_texture)
        });
        self.calls.push(BackendCall::UploadTexture {
            texture: id,
            width: texture.width,
            height: texture.height,
        });
        id
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.live_textures = self.live_textures.saturating_sub(1);
        self.calls.push(BackendCall::DeleteTexture(texture));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.calls.push(BackendCall::BindTexture { unit, texture });
    }

    fn create_render_target(&mut self, width: u32, height: u32, _format: TextureFormat) -> RenderTargetId {
        self.next_target += 1;
        let target = RenderTargetId(self.next_target);
        self.next_texture += 1;
        self.target_textures.insert(target, TextureId(self.next_texture));
        self.calls.push(BackendCall::CreateRenderTarget {
            target,
            width,
            height,
        });
        target
    }

    fn delete_render_target(&mut self, target: RenderTargetId) {
        self.target_textures.remove(&target);
        self.calls.push(BackendCall::DeleteRenderTarget(target));
    }

    fn render_target_texture(&self, target: RenderTargetId) -> Option<TextureId> {
        self.target_textures.get(&target).copied()
    }

    fn bind_framebuffer(&mut self, target: Option<RenderTargetId>) {
        self.calls.push(BackendCall::BindFramebuffer(target));
    }

    fn resolve_render_target(&mut self, target: RenderTargetId) {
        self.calls.push(BackendCall::ResolveRenderTarget(target));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.calls.push(BackendCall::SetViewport(viewport));
    }

    fn set_scissor(&mut self, scissor: Option<Viewport>) {
        self.calls.push(BackendCall::SetScissor(scissor));
    }

    fn clear(&mut self, color: Option<Vec4>, depth: bool, stencil: bool) {
        self.calls.push(BackendCall::Clear {
            color,
            depth,
            stencil,
        });
    }

    fn set_blend(&mut self, blend: Option<BlendState>) {
        self.calls.push(BackendCall::SetBlend(blend));
    }

    fn set_depth_test(&mut self, func: Option<CompareFunction>) {
        self.calls.push(BackendCall::SetDepthTest(func));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.calls.push(BackendCall::SetDepthWrite(enabled));
    }

    fn set_stencil(&mut self, stencil: Option<StencilParams>) {
        self.calls.push(BackendCall::SetStencil(stencil));
    }

    fn set_cull_mode(&mut self, face: Option<Face>) {
        self.calls.push(BackendCall::SetCullMode(face));
    }

    fn set_front_face(&mut self, front_face: FrontFace) {
        self.calls.push(BackendCall::SetFrontFace(front_face));
    }

    fn set_polygon_offset(&mut self, bias: Option<DepthBias>) {
        self.calls.push(BackendCall::SetPolygonOffset(bias));
    }

    fn set_color_mask(&mut self, mask: ColorWrites) {
        self.calls.push(BackendCall::SetColorMask(mask));
    }

    fn set_line_width(&mut self, width: f32) {
        self.calls.push(BackendCall::SetLineWidth(width));
    }

    fn set_alpha_to_coverage(&mut self, enabled: bool) {
        self.calls.push(BackendCall::SetAlphaToCoverage(enabled));
    }

    fn draw(&mut self, call: DrawCall) {
        self.calls.push(BackendCall::Draw(call));
    }
}
