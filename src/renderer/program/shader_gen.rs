//! Shader Template Library
//!
//! Generates final WGSL for a [`ProgramParameters`] description using the
//! minijinja template engine. Built-in templates and chunks are embedded from
//! `src/renderer/program/shaders`; applications may register additional named
//! templates at runtime (for [`ShaderMaterial`](crate::resources::ShaderMaterial)).
//!
//! Template syntax:
//!
//! | Construct | Delimiter |
//! |-----------|-----------|
//! | Block | `{$ if USE_MAP is defined $}` |
//! | Expression | `{{ NUM_DIR_LIGHTS }}` |
//! | Line statement | `$$ include "lights"` |
//!
//! Includes resolve against `chunks/`.

use std::borrow::Cow;
use std::collections::BTreeMap;

use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use rustc_hash::FxHashSet;
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_128;

use super::feature_key::{ProgramParameters, wgsl_vertex_type};
use crate::errors::{Result, StrataError};
use crate::renderer::backend::ProgramSource;

#[derive(RustEmbed)]
#[folder = "src/renderer/program/shaders"]
struct ShaderAssets;

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    let Some(file) = ShaderAssets::get(&filename) else {
        return Ok(None);
    };
    match std::str::from_utf8(file.data.as_ref()) {
        Ok(source) => Ok(Some(source.to_string())),
        Err(e) => Err(Error::new(
            ErrorKind::TemplateNotFound,
            format!("{filename} is not valid UTF-8: {e}"),
        )),
    }
}

#[derive(Serialize)]
struct AttributeContext<'a> {
    name: &'a str,
    ty: &'static str,
    location: u32,
    instanced: bool,
}

#[derive(Serialize)]
struct UniformContext<'a> {
    name: &'a str,
    ty: &'static str,
}

#[derive(Serialize)]
struct ShaderContext<'a> {
    #[serde(flatten)]
    defines: BTreeMap<String, String>,
    label: &'a str,
    attributes: Vec<AttributeContext<'a>>,
    /// Scalar uniforms; array and struct members are declared by the chunks.
    uniforms: Vec<UniformContext<'a>>,
    textures: &'a [String],
    clip_count: usize,
}

/// Template environment plus the names registered on top of the embedded set.
pub struct ShaderLibrary {
    env: Environment<'static>,
    registered: FxHashSet<String>,
}

impl ShaderLibrary {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()?;

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);
        env.set_loader(shader_loader);
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        Ok(Self {
            env,
            registered: FxHashSet::default(),
        })
    }

    /// Registers (or replaces) a named template. The source is parsed now, so
    /// syntax errors surface here rather than at first use.
    pub fn register_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.env
            .add_template_owned(name.to_string(), source.to_string())?;
        self.registered.insert(name.to_string());
        Ok(())
    }

    #[must_use]
    pub fn has_template(&self, name: &str) -> bool {
        self.registered.contains(name) || self.env.get_template(name).is_ok()
    }

    /// Renders the WGSL for `params`.
    pub fn generate(&self, params: &ProgramParameters) -> Result<ProgramSource> {
        let template = self
            .env
            .get_template(&params.template)
            .map_err(|e| StrataError::ShaderTemplate {
                template: params.template.clone(),
                reason: e.to_string(),
            })?;

        let ctx = ShaderContext {
            defines: params.defines.to_map(),
            label: &params.label,
            attributes: params
                .attributes
                .iter()
                .enumerate()
                .map(|(i, a)| AttributeContext {
                    name: &a.name,
                    ty: wgsl_vertex_type(a.format),
                    location: i as u32,
                    instanced: a.instanced,
                })
                .collect(),
            uniforms: params
                .uniforms
                .iter()
                .filter(|u| !u.name.contains(['[', '.']))
                .map(|u| UniformContext {
                    name: &u.name,
                    ty: u.wgsl_type,
                })
                .collect(),
            textures: &params.textures,
            clip_count: params
                .uniforms
                .iter()
                .filter(|u| u.name.starts_with("clipping_planes["))
                .count(),
        };

        let body = template.render(&ctx)?;
        let code = format!("// {}\n{body}", params.label);
        let source_hash = xxh3_128(code.as_bytes());
        log::trace!("Generated {} ({} bytes, {source_hash:032x})", params.label, code.len());

        Ok(ProgramSource {
            label: params.label.clone(),
            code,
            defines: params.defines.clone(),
            uniforms: params.uniforms.clone(),
            attributes: params.attributes.clone(),
            source_hash,
        })
    }
}
