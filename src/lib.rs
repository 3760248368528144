#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod assets;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;

pub use assets::{Assets, GeometryHandle, MaterialHandle, TextureHandle};
pub use errors::{Result, StrataError};
pub use renderer::{Backend, RecordingBackend, RenderContext, RenderInfo, Renderer, RendererSettings};
pub use resources::{
    ColorSpace, Geometry, Material, MaterialKind, ShaderDefines, Side, Texture, ToneMapping,
};
pub use scene::{Camera, Light, Mesh, Node, NodeHandle, Scene};
pub use utils::interner;
