//! Render Context
//!
//! Owns the backend together with every cache that mirrors backend objects:
//! compiled programs, material bindings, pipeline state, textures and vertex
//! buffers. All backend calls of a frame go through here, so the state tracker
//! never drifts from what the backend actually holds.
//!
//! Per-draw failures never abort a frame. They are reported through
//! [`Diagnostics`] (once per subject) and the drawable is skipped.

use std::hash::{Hash, Hasher};

use glam::{Vec2, Vec4};
use rustc_hash::FxHasher;
use wgpu::{PrimitiveTopology, TextureFormat};

use crate::assets::{AssetStorage, Assets, GeometryHandle, MaterialHandle, TextureHandle};
use crate::errors::{Result, StrataError};
use crate::renderer::backend::{
    Backend, BackendCapabilities, DrawCall, RenderTargetId, TextureId, VertexAttributeLayout,
    Viewport,
};
use crate::renderer::buffers::BufferManager;
use crate::renderer::diagnostics::{Diagnostics, Severity, Subject};
use crate::renderer::program::feature_key::texture_color_space_hash;
use crate::renderer::program::uniforms::{object_uniforms, plane_to_view};
use crate::renderer::program::{
    BindingStamp, FrameUniforms, ObjectFeatures, ObjectFlags, ProgramBindings, ProgramCache,
    ProgramInputs, ProgramParameters, TRANSMISSION_SAMPLER,
};
use crate::renderer::render_list::RenderItem;
use crate::renderer::settings::RendererSettings;
use crate::renderer::state::{AttributeBindingKey, StateTracker};
use crate::renderer::textures::{TextureCache, TextureUnits};
use crate::renderer::RenderInfo;
use crate::resources::{Geometry, GeometryGroup, Material, MaterialKind, Texture, UniformValue};
use crate::scene::{Fog, LightState, Scene};

/// Per-frame inputs shared by every draw.
pub(crate) struct FrameContext<'a> {
    pub uniforms: &'a FrameUniforms,
    pub lights: &'a LightState,
    pub fog: Option<&'a Fog>,
    /// Resolved opaque snapshot and its size in pixels.
    pub transmission: Option<(TextureId, Vec2)>,
}

#[derive(Debug, Clone, Copy)]
struct TransmissionTarget {
    id: RenderTargetId,
    width: u32,
    height: u32,
}

pub struct RenderContext<B: Backend> {
    backend: B,
    capabilities: BackendCapabilities,
    settings: RendererSettings,

    programs: ProgramCache,
    bindings: ProgramBindings,
    state: StateTracker,
    textures: TextureCache,
    units: TextureUnits,
    buffers: BufferManager,
    diagnostics: Diagnostics,

    transmission_target: Option<TransmissionTarget>,
}

impl<B: Backend> RenderContext<B> {
    /// Validates `settings` and brings the backend to the default state.
    pub fn create(mut backend: B, settings: RendererSettings) -> Result<Self> {
        settings.validate()?;

        let capabilities = backend.capabilities();
        let texture_units = settings
            .max_texture_units
            .map_or(capabilities.max_texture_units, |max| {
                max.min(capabilities.max_texture_units)
            });

        let mut state = StateTracker::new(texture_units, capabilities.max_vertex_attributes);
        state.reset(&mut backend);

        log::info!(
            "Render context: {} texture units, {} vertex attributes",
            texture_units,
            capabilities.max_vertex_attributes
        );

        Ok(Self {
            backend,
            capabilities,
            settings,
            programs: ProgramCache::new()?,
            bindings: ProgramBindings::new(),
            state,
            textures: TextureCache::new(),
            units: TextureUnits::new(texture_units),
            buffers: BufferManager::new(),
            diagnostics: Diagnostics::new(),
            transmission_target: None,
        })
    }

    /// Deletes every backend object this context created and hands the
    /// backend back.
    pub fn destroy(mut self) -> B {
        let backend: &mut dyn Backend = &mut self.backend;
        self.programs.dispose_all(backend);
        self.bindings.clear();
        self.textures.dispose_all(backend);
        self.buffers.dispose_all(backend);
        if let Some(target) = self.transmission_target.take() {
            backend.delete_render_target(target.id);
        }
        log::info!("Render context destroyed");
        self.backend
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access. Call [`reset_state`](Self::reset_state)
    /// afterwards if pipeline state was changed behind the tracker's back.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Pushes the default pipeline state and forgets all cached bindings.
    pub fn reset_state(&mut self) {
        self.state.reset(&mut self.backend);
    }

    #[must_use]
    pub fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Replaces the settings. Programs depending on feature-relevant fields
    /// are re-derived on their next draw.
    pub fn set_settings(&mut self, settings: RendererSettings) -> Result<()> {
        settings.validate()?;
        if settings.feature_hash() != self.settings.feature_hash() {
            self.bindings.mark_stale();
        }
        self.settings = settings;
        Ok(())
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    #[must_use]
    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    #[must_use]
    pub fn bindings(&self) -> &ProgramBindings {
        &self.bindings
    }

    #[must_use]
    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    #[must_use]
    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    #[must_use]
    pub fn buffers(&self) -> &BufferManager {
        &self.buffers
    }

    /// Adds (or replaces) a shader template usable as a custom material's
    /// template name.
    pub fn register_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.programs.register_template(name, source)
    }

    /// Deletes programs no material binding holds anymore.
    pub fn prune_programs(&mut self) -> usize {
        self.programs.prune(&mut self.backend)
    }

    // ========================================================================
    // Resource disposal
    // ========================================================================

    pub fn dispose_geometry(&mut self, handle: GeometryHandle) {
        for buffer in self.buffers.dispose(&mut self.backend, handle) {
            self.state.forget_buffer(buffer);
        }
        self.state.invalidate_attribute_binding();
        let evicted = self
            .bindings
            .forget_geometry(&mut self.programs, &mut self.backend, handle);
        if evicted > 0 {
            log::debug!("Disposed geometry {handle:?}: {evicted} programs evicted");
        }
        self.flush_evicted();
        self.diagnostics.forget(Subject::Geometry(handle));
    }

    pub fn dispose_material(&mut self, handle: MaterialHandle) {
        let evicted = self
            .bindings
            .dispose_material(&mut self.programs, &mut self.backend, handle);
        if evicted > 0 {
            log::debug!("Disposed material {handle:?}: {evicted} programs evicted");
        }
        self.flush_evicted();
        self.diagnostics.forget(Subject::Material(handle));
    }

    pub fn dispose_texture(&mut self, handle: TextureHandle) {
        if let Some(id) = self.textures.dispose(&mut self.backend, handle) {
            self.state.forget_texture(id);
        }
        self.diagnostics.forget(Subject::Texture(handle));
    }

    pub(crate) fn flush_evicted(&mut self) {
        for program in self.bindings.take_evicted() {
            self.state.forget_program(program);
        }
    }

    // ========================================================================
    // Passes
    // ========================================================================

    pub(crate) fn begin_pass(
        &mut self,
        target: Option<RenderTargetId>,
        viewport: Viewport,
        clear_color: Vec4,
    ) {
        let backend: &mut dyn Backend = &mut self.backend;
        self.state.bind_framebuffer(backend, target);
        self.state.set_viewport(backend, viewport);
        self.state.set_scissor(backend, None);
        // clearing honours the masks, so depth writes must be on
        self.state.set_depth_write(backend, true);
        self.state.set_color_mask(backend, wgpu::ColorWrites::ALL);
        self.state.clear(backend, Some(clear_color), true, true);
    }

    /// Binds the off-screen transmission target, (re)creating it when the
    /// scaled size changed. Returns its viewport.
    pub(crate) fn begin_transmission_pass(
        &mut self,
        width: u32,
        height: u32,
        clear_color: Vec4,
    ) -> Viewport {
        let scale = self.settings.transmission_resolution_scale;
        let width = ((width as f32 * scale) as u32).max(1);
        let height = ((height as f32 * scale) as u32).max(1);

        let target = match self.transmission_target {
            Some(t) if t.width == width && t.height == height => t,
            stale => {
                if let Some(old) = stale {
                    self.backend.delete_render_target(old.id);
                }
                let id = self
                    .backend
                    .create_render_target(width, height, TextureFormat::Rgba16Float);
                log::debug!("Transmission target {width}x{height}");
                let t = TransmissionTarget { id, width, height };
                self.transmission_target = Some(t);
                t
            }
        };

        let viewport = Viewport::new(target.width, target.height);
        self.begin_pass(Some(target.id), viewport, clear_color);
        viewport
    }

    /// Resolves the transmission target. Returns the texture holding the
    /// opaque snapshot with its size.
    pub(crate) fn end_transmission_pass(&mut self) -> Option<(TextureId, Vec2)> {
        let target = self.transmission_target?;
        self.backend.resolve_render_target(target.id);
        let texture = self.backend.render_target_texture(target.id)?;
        Some((texture, Vec2::new(target.width as f32, target.height as f32)))
    }

    // ========================================================================
    // Draw
    // ========================================================================

    /// Submits one drawable. Failures are reported and the item skipped.
    pub(crate) fn draw_item(
        &mut self,
        frame: &FrameContext<'_>,
        item: &RenderItem,
        scene: &Scene,
        assets: &mut Assets,
        info: &mut RenderInfo,
    ) {
        if let Err(error) = self.try_draw_item(frame, item, scene, assets, info) {
            info.skipped += 1;
            let (severity, subject) = match &error {
                StrataError::ProgramCompile { key, .. } => (Severity::Error, Subject::Program(*key)),
                StrataError::ShaderTemplate { .. } => {
                    (Severity::Error, Subject::Material(item.material))
                }
                StrataError::MissingAttribute { .. } => (Severity::Warning, Subject::Node(item.node)),
                StrataError::InvalidHandle(_) => (Severity::Warning, Subject::Node(item.node)),
                _ => (Severity::Warning, Subject::Material(item.material)),
            };
            self.diagnostics.once(severity, subject, error);
        }
    }

    fn try_draw_item(
        &mut self,
        frame: &FrameContext<'_>,
        item: &RenderItem,
        scene: &Scene,
        assets: &mut Assets,
        info: &mut RenderInfo,
    ) -> Result<()> {
        let Self {
            backend,
            settings,
            programs,
            bindings,
            state,
            textures,
            units,
            buffers,
            diagnostics,
            ..
        } = self;
        let backend: &mut dyn Backend = backend;
        let settings: &RendererSettings = settings;
        let Assets {
            geometries,
            materials,
            textures: texture_assets,
        } = assets;
        let (materials, texture_assets) = (&*materials, &*texture_assets);

        let (Some(node), Some(mesh)) = (scene.get_node(item.node), scene.meshes.get(item.node))
        else {
            return Err(StrataError::InvalidHandle(format!("node {:?}", item.node)));
        };
        let Some(material) = materials.get(item.material) else {
            return Err(StrataError::InvalidHandle(format!("material {:?}", item.material)));
        };
        let Some(geometry) = geometries.get_mut(item.geometry) else {
            return Err(StrataError::InvalidHandle(format!("geometry {:?}", item.geometry)));
        };

        if buffers.prepare(backend, item.geometry, geometry).buffers_changed() {
            state.invalidate_attribute_binding();
        }
        let geometry: &Geometry = geometry;

        let Some((start, count)) = draw_span(geometry, item.group.and_then(|g| geometry.groups.get(g)))
        else {
            return Ok(());
        };

        // Program
        let mut flags = ObjectFlags::empty();
        flags.set(ObjectFlags::RECEIVE_SHADOW, mesh.receive_shadow);
        flags.set(ObjectFlags::CAST_SHADOW, mesh.cast_shadow);
        flags.set(ObjectFlags::SKINNED, mesh.skin.is_some());
        let object = ObjectFeatures {
            bones: mesh.skin.as_ref().map_or(0, |s| s.len() as u32),
            flags,
            mode: mesh.mode,
        };
        let fog = frame.fog.filter(|_| material.settings().fog);
        let stamp = BindingStamp {
            material_version: material.version(),
            geometry: item.geometry,
            layout_version: geometry.layout_version(),
            lights: frame.lights.hash(),
            settings: settings.feature_hash(),
            object: object_hash(object, material, texture_assets, fog),
        };
        let program = bindings.resolve(programs, backend, item.material, stamp, || {
            ProgramParameters::derive(&ProgramInputs {
                material,
                geometry,
                lights: frame.lights,
                settings,
                fog,
                textures: texture_assets,
                object,
            })
        })?;

        // Pipeline state
        let world = node.world_matrix();
        state.use_program(backend, program.id);
        state.set_material(backend, material.settings(), world.matrix3.determinant() < 0.0);
        if let MaterialKind::Line(line) = material.kind() {
            state.set_line_width(backend, line.line_width);
        }

        // Textures
        units.reset();
        for slot in material.texture_slots() {
            let Some(texture) = texture_assets.get(slot.handle) else {
                diagnostics.once(
                    Severity::Warning,
                    Subject::Texture(slot.handle),
                    StrataError::InvalidHandle(format!("texture {:?}", slot.handle)),
                );
                continue;
            };
            let unit = match units.allocate() {
                Ok(unit) => unit,
                Err(error) => {
                    diagnostics.limit(Subject::Texture(slot.handle), error);
                    continue;
                }
            };
            let id = textures.prepare(backend, slot.handle, texture);
            state.bind_texture(backend, unit, Some(id));
            programs.upload_uniform(backend, &program, slot.uniform, UniformValue::Int(unit as i32));
            programs.upload_uniform(
                backend,
                &program,
                &format!("{}_transform", slot.uniform),
                texture.transform.matrix().into(),
            );
        }
        if material.is_transmissive() {
            if let Some((texture, size)) = frame.transmission {
                match units.allocate() {
                    Ok(unit) => {
                        state.bind_texture(backend, unit, Some(texture));
                        programs.upload_uniform(
                            backend,
                            &program,
                            TRANSMISSION_SAMPLER,
                            UniformValue::Int(unit as i32),
                        );
                        programs.upload_uniform(backend, &program, "transmission_sampler_size", size.into());
                    }
                    Err(error) => diagnostics.limit(Subject::Material(item.material), error),
                }
            }
        }

        // Vertex attributes
        let binding_key = AttributeBindingKey {
            geometry_id: geometry.id(),
            layout_version: geometry.layout_version(),
            program: program.id,
        };
        if !state.attributes_bound(binding_key) {
            let mut used = Vec::with_capacity(geometry.attributes().len());
            let morphs = ["position", "normal"].into_iter().flat_map(|channel| {
                geometry
                    .morph_attributes(channel)
                    .iter()
                    .enumerate()
                    .map(move |(i, attr)| (format!("morph_{channel}_{i}"), attr))
            });
            let named = geometry
                .attributes()
                .iter()
                .map(|(name, attr)| (name.clone(), attr))
                .chain(morphs);

            for (name, attr) in named {
                let Some(location) = program.attribute_location(&name) else {
                    continue;
                };
                let Some(buffer) = buffers.buffer_for(attr) else {
                    continue;
                };
                let layout = VertexAttributeLayout {
                    format: attr.format,
                    offset: attr.offset,
                    stride: attr.stride,
                    divisor: u32::from(attr.is_instanced()),
                };
                state.bind_vertex_attribute(backend, location, buffer, layout);
                used.push(location);
            }
            state.disable_unused_attributes(backend, &used);
            let index = geometry.index_attribute().and_then(|i| buffers.buffer_for(i));
            state.bind_index_buffer(backend, index);
            state.begin_attribute_binding(binding_key);
        }

        // Uniforms
        for (name, value) in &frame.uniforms.values {
            programs.upload_uniform(backend, &program, name, *value);
        }
        for (name, value) in object_uniforms(world, &frame.uniforms.view_matrix) {
            programs.upload_uniform(backend, &program, name, value);
        }
        for (name, value) in material.uniform_values() {
            programs.upload_uniform(backend, &program, name, value);
        }

        let local_planes = material
            .settings()
            .clipping_planes
            .iter()
            .map(|p| plane_to_view(*p, &frame.uniforms.view_matrix));
        for (i, plane) in frame.uniforms.clipping_planes.iter().copied().chain(local_planes).enumerate() {
            programs.upload_uniform(backend, &program, &format!("clipping_planes[{i}]"), plane.into());
        }

        for i in 0..geometry.morph_target_count() {
            let weight = mesh.morph_target_influences.get(i).copied().unwrap_or(0.0);
            programs.upload_uniform(backend, &program, &format!("morph_target_influences[{i}]"), weight.into());
        }
        if let Some(bones) = &mesh.skin {
            for (i, bone) in bones.iter().enumerate() {
                programs.upload_uniform(backend, &program, &format!("bone_matrices[{i}]"), (*bone).into());
            }
        }

        // Submit
        let topology = mesh.mode.topology();
        let instances = geometry.instance_count().unwrap_or(1);
        backend.draw(DrawCall {
            topology,
            index_format: geometry.index_format(),
            start,
            count,
            instances,
        });

        info.draw_calls += 1;
        let primitives = primitives_drawn(topology, count, instances);
        let counter = match topology {
            PrimitiveTopology::TriangleList | PrimitiveTopology::TriangleStrip => &mut info.triangles,
            PrimitiveTopology::LineList | PrimitiveTopology::LineStrip => &mut info.lines,
            PrimitiveTopology::PointList => &mut info.points,
        };
        *counter = counter.saturating_add(primitives);
        Ok(())
    }
}

/// Element range drawn for `group` (or the whole geometry), clamped to the
/// draw range and the element count. `None` when nothing is left.
fn draw_span(geometry: &Geometry, group: Option<&GeometryGroup>) -> Option<(u32, u32)> {
    let mut start = geometry.draw_range.start;
    let mut end = geometry.draw_range.end.min(geometry.element_count());
    if let Some(group) = group {
        start = start.max(group.start);
        end = end.min(group.start.saturating_add(group.count));
    }
    (end > start).then(|| (start, end - start))
}

/// Primitives submitted by one draw, clamped at `u32::MAX`.
fn primitives_drawn(topology: PrimitiveTopology, count: u32, instances: u32) -> u32 {
    primitive_count(topology, count).saturating_mul(instances)
}

fn primitive_count(topology: PrimitiveTopology, count: u32) -> u32 {
    match topology {
        PrimitiveTopology::TriangleList => count / 3,
        PrimitiveTopology::TriangleStrip => count.saturating_sub(2),
        PrimitiveTopology::LineList => count / 2,
        PrimitiveTopology::LineStrip => count.saturating_sub(1),
        PrimitiveTopology::PointList => count,
    }
}

/// Hash of the per-draw inputs that select code paths outside the material
/// version: object switches, sampled color spaces and the fog mode.
fn object_hash(
    object: ObjectFeatures,
    material: &Material,
    textures: &AssetStorage<TextureHandle, Texture>,
    fog: Option<&Fog>,
) -> u64 {
    let mut hasher = FxHasher::default();
    object.hash(&mut hasher);
    texture_color_space_hash(material, textures).hash(&mut hasher);
    fog.map(std::mem::discriminant).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_span_clamps_group_to_draw_range() {
        let mut geometry = Geometry::new_box(1.0, 1.0, 1.0);
        let total = geometry.element_count();
        assert_eq!(draw_span(&geometry, None), Some((0, total)));

        geometry.set_draw_range(6, 12);
        let group = GeometryGroup {
            start: 0,
            count: 12,
            material_index: 0,
        };
        assert_eq!(draw_span(&geometry, Some(&group)), Some((6, 6)));

        let outside = GeometryGroup {
            start: 30,
            count: 6,
            material_index: 0,
        };
        assert_eq!(draw_span(&geometry, Some(&outside)), None);
    }

    #[test]
    fn primitive_counts_follow_topology() {
        assert_eq!(primitive_count(PrimitiveTopology::TriangleList, 36), 12);
        assert_eq!(primitive_count(PrimitiveTopology::TriangleStrip, 4), 2);
        assert_eq!(primitive_count(PrimitiveTopology::LineStrip, 0), 0);
        assert_eq!(primitive_count(PrimitiveTopology::PointList, 7), 7);
    }

    #[test]
    fn large_instanced_draws_saturate() {
        assert_eq!(primitives_drawn(PrimitiveTopology::TriangleList, 36, 4), 48);
        assert_eq!(
            primitives_drawn(PrimitiveTopology::TriangleList, 3_000_000, 10_000),
            u32::MAX
        );
    }
}
