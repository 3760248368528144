//! Diagnostics channel.
//!
//! Every recovered failure is logged through `log` and also recorded here so
//! callers can see what a frame skipped. Records accumulate until drained.

use rustc_hash::FxHashSet;

use crate::assets::{GeometryHandle, MaterialHandle, TextureHandle};
use crate::errors::StrataError;
use crate::scene::NodeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Node(NodeHandle),
    Material(MaterialHandle),
    Geometry(GeometryHandle),
    Texture(TextureHandle),
    Program(u64),
    Context,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub subject: Subject,
    pub error: StrataError,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
    /// Subjects already reported through [`Diagnostics::once`].
    reported: FxHashSet<Subject>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, subject: Subject, error: StrataError) {
        log::warn!("{subject:?}: {error}");
        self.records.push(Diagnostic {
            severity: Severity::Warning,
            subject,
            error,
        });
    }

    pub fn error(&mut self, subject: Subject, error: StrataError) {
        log::error!("{subject:?}: {error}");
        self.records.push(Diagnostic {
            severity: Severity::Error,
            subject,
            error,
        });
    }

    /// Reports a resource-limit failure once per subject.
    pub fn limit(&mut self, subject: Subject, error: StrataError) {
        self.once(Severity::Warning, subject, error);
    }

    /// Records `error` unless `subject` already reported since its last
    /// [`forget`](Self::forget).
    pub fn once(&mut self, severity: Severity, subject: Subject, error: StrataError) {
        if !self.reported.insert(subject) {
            return;
        }
        match severity {
            Severity::Warning => self.warn(subject, error),
            Severity::Error => self.error(subject, error),
        }
    }

    /// Forgets the once-per-subject record so `subject` may report again.
    pub fn forget(&mut self, subject: Subject) {
        self.reported.remove(&subject);
    }

    #[must_use]
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.records)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
