//! Renderer
//!
//! Frame driver on top of an abstract [`Backend`]:
//!
//! 1. propagate world matrices (unless the scene opted out)
//! 2. gather lights and per-frame uniforms
//! 3. collect, cull and sort the visible drawables
//! 4. if anything is transmissive, draw the opaque bucket into an off-screen
//!    target and resolve it
//! 5. draw opaque, transmissive and transparent buckets into the output
//!
//! GPU-side caches and the per-draw submission live in [`RenderContext`].

pub mod backend;
pub mod buffers;
pub mod context;
pub mod diagnostics;
pub mod program;
pub mod render_list;
pub mod settings;
pub mod state;
pub mod textures;

pub use backend::{Backend, BackendCapabilities, RecordingBackend, RenderTargetId, Viewport};
pub use context::RenderContext;
pub use diagnostics::{Diagnostic, Diagnostics, Severity, Subject};
pub use render_list::{RenderItem, RenderList};
pub use settings::RendererSettings;

use crate::assets::{Assets, GeometryHandle, MaterialHandle, TextureHandle};
use crate::errors::{Result, StrataError};
use crate::scene::{LightState, NodeHandle, Scene};

use self::context::FrameContext;
use self::program::FrameUniforms;

/// Counters of the last rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderInfo {
    pub frame: u64,
    pub draw_calls: u32,
    pub triangles: u32,
    pub lines: u32,
    pub points: u32,
    /// Drawables dropped by a per-draw failure.
    pub skipped: u32,
    pub culled: u32,
    /// Live compiled programs after the frame.
    pub programs: usize,
    /// Pipeline state changes issued during the frame.
    pub state_changes: u64,
}

pub struct Renderer<B: Backend> {
    context: RenderContext<B>,
    list: RenderList,
    lights: LightState,
    frame: FrameUniforms,
    width: u32,
    height: u32,
    info: RenderInfo,
}

impl<B: Backend> Renderer<B> {
    pub fn new(backend: B, settings: RendererSettings, width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            context: RenderContext::create(backend, settings)?,
            list: RenderList::new(),
            lights: LightState::default(),
            frame: FrameUniforms::default(),
            width: width.max(1),
            height: height.max(1),
            info: RenderInfo::default(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn context(&self) -> &RenderContext<B> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RenderContext<B> {
        &mut self.context
    }

    #[must_use]
    pub fn info(&self) -> &RenderInfo {
        &self.info
    }

    /// Draws `scene` as seen from the camera on `camera_node` into `target`
    /// (`None` is the default framebuffer).
    ///
    /// Failures of individual drawables are reported through the context's
    /// diagnostics; the rest of the frame is still drawn.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        assets: &mut Assets,
        camera_node: NodeHandle,
        target: Option<RenderTargetId>,
    ) -> RenderInfo {
        self.info = RenderInfo {
            frame: self.info.frame + 1,
            ..RenderInfo::default()
        };
        let changes_before = self.context.state().change_count();

        if scene.matrix_world_auto_update {
            scene.update_matrix_world();
        }
        let scene: &Scene = scene;

        let Some(camera) = scene.cameras.get(camera_node) else {
            self.context.diagnostics_mut().once(
                Severity::Warning,
                Subject::Node(camera_node),
                StrataError::InvalidHandle(format!("camera {camera_node:?}")),
            );
            return self.info;
        };

        scene.collect_lights(&mut self.lights);
        self.frame
            .build(camera, self.context.settings(), &self.lights, scene.fog.as_ref());

        self.list.collect(scene, assets, camera);
        if self.context.settings().sort_objects {
            self.list.sort();
        }
        self.info.culled = self.list.culled();

        let clear_color = scene
            .background
            .unwrap_or(self.context.settings().clear_color);
        let mut frame = FrameContext {
            uniforms: &self.frame,
            lights: &self.lights,
            fog: scene.fog.as_ref(),
            transmission: None,
        };

        if self.list.needs_transmission_pass() {
            self.context
                .begin_transmission_pass(self.width, self.height, clear_color);
            for item in &self.list.opaque {
                self.context
                    .draw_item(&frame, item, scene, assets, &mut self.info);
            }
            frame.transmission = self.context.end_transmission_pass();
        }

        self.context
            .begin_pass(target, Viewport::new(self.width, self.height), clear_color);
        for bucket in [&self.list.opaque, &self.list.transmissive, &self.list.transparent] {
            for item in bucket {
                self.context
                    .draw_item(&frame, item, scene, assets, &mut self.info);
            }
        }

        self.context.flush_evicted();
        self.list.finish();

        self.info.programs = self.context.programs().len();
        self.info.state_changes = self.context.state().change_count() - changes_before;
        log::trace!(
            "Frame {}: {} draws, {} culled, {} skipped",
            self.info.frame,
            self.info.draw_calls,
            self.info.culled,
            self.info.skipped
        );
        self.info
    }

    pub fn dispose_geometry(&mut self, handle: GeometryHandle) {
        self.context.dispose_geometry(handle);
    }

    pub fn dispose_material(&mut self, handle: MaterialHandle) {
        self.context.dispose_material(handle);
    }

    pub fn dispose_texture(&mut self, handle: TextureHandle) {
        self.context.dispose_texture(handle);
    }

    /// Releases every backend object and returns the backend.
    pub fn dispose(self) -> B {
        self.context.destroy()
    }
}
