//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`StrataError`] covers the failure modes of the rendering core:
//! - Shader program compilation failures (with the feature flags that produced them)
//! - Structural misuse of the scene graph or geometry
//! - Resource-limit exhaustion (texture units)
//! - Backend and configuration errors
//!
//! None of these abort a frame. The frame driver recovers them per drawable and
//! reports them through [`Diagnostics`](crate::renderer::diagnostics::Diagnostics).
//!
//! # Usage
//!
//! ```rust,ignore
//! use strata::errors::{StrataError, Result};
//!
//! fn acquire() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the Strata engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrataError {
    // ========================================================================
    // Program Errors
    // ========================================================================
    /// The backend rejected the synthesized shader source.
    #[error("Program compilation failed for key {key:016x} (flags: {flags}): {log}")]
    ProgramCompile {
        /// Feature key of the failed variant
        key: u64,
        /// Comma separated list of active feature defines
        flags: String,
        /// Backend compiler log
        log: String,
    },

    /// Shader template could not be rendered.
    #[error("Shader template '{template}' failed to render: {reason}")]
    ShaderTemplate {
        /// Template name
        template: String,
        /// Template engine message
        reason: String,
    },

    /// A feature required an attribute the geometry does not carry.
    #[error("Missing attribute '{name}' required by feature {feature}")]
    MissingAttribute {
        /// Attribute channel name
        name: String,
        /// Feature that requested it
        feature: String,
    },

    // ========================================================================
    // Resource Limits
    // ========================================================================
    /// More textures were requested than the backend exposes units for.
    #[error("Texture units exhausted: requested unit {requested}, backend supports {available}")]
    TextureUnitsExhausted {
        /// Unit index that was requested
        requested: u32,
        /// Number of units the backend exposes
        available: u32,
    },

    // ========================================================================
    // Structural Misuse
    // ========================================================================
    /// A handle did not resolve to a live resource.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A node was asked to become its own parent.
    #[error("A node cannot be added as a child of itself")]
    SelfParenting,

    /// A reparenting request would create a cycle or references a dead node.
    #[error("Invalid hierarchy operation: {0}")]
    InvalidHierarchy(String),

    /// Geometry data violates a structural invariant (index range, channel counts).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    // ========================================================================
    // Backend & Configuration
    // ========================================================================
    /// Generic backend failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Renderer settings could not be parsed or serialized.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Config(err.to_string())
    }
}

impl From<minijinja::Error> for StrataError {
    fn from(err: minijinja::Error) -> Self {
        StrataError::ShaderTemplate {
            template: err.name().unwrap_or("<unknown>").to_string(),
            reason: err.to_string(),
        }
    }
}

/// Alias for `Result<T, StrataError>`.
pub type Result<T> = std::result::Result<T, StrataError>;
