//! Program Module
//!
//! Material to program resolution:
//!
//! - [`feature_key`]: derives [`ProgramParameters`] and their [`FeatureKey`]
//! - [`shader_gen`]: renders WGSL from embedded templates
//! - [`cache`]: reference-counted compiled programs + uniform value cache
//! - [`binding`]: per-material binding state machine
//! - [`uniforms`]: per-frame and per-object uniform values

pub mod binding;
pub mod cache;
pub mod feature_key;
pub mod shader_gen;
pub mod uniforms;

pub use binding::{BindingStamp, BindingState, MaterialBinding, ProgramBindings};
pub use cache::{Program, ProgramCache};
pub use feature_key::{
    FeatureKey, ObjectFeatures, ObjectFlags, ProgramInputs, ProgramParameters,
    TRANSMISSION_SAMPLER,
};
pub use shader_gen::ShaderLibrary;
pub use uniforms::FrameUniforms;
