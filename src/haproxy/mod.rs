//! Proxy configuration subsystem.
//!
//! # Data Flow
//! ```text
//! base template file
//!     → document.rs (parse into sections, fresh copy per reconciliation)
//!     → merge.rs (frontend/backend/server per port, pool, origin)
//!     → rendered text handed to the data plane
//! ```
//!
//! # Design Decisions
//! - The base template is never mutated; every merge starts from a new parse
//! - Merge is a pure function of (template, desired state)
//! - Structural failures name the offending section label

pub mod document;
pub mod merge;

use std::path::PathBuf;

use thiserror::Error;

pub use document::{ConfigDocument, Directive, Entry, Section, SectionKind};
pub use merge::merge_config;

/// Structural errors while parsing or editing a document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("section {kind} {label:?} already exists")]
    SectionExists { kind: SectionKind, label: String },

    #[error("section {kind} {label:?} does not exist")]
    SectionMissing { kind: SectionKind, label: String },

    #[error("invalid {kind} section label {label:?}")]
    InvalidLabel { kind: SectionKind, label: String },

    #[error("invalid server name {0:?}")]
    InvalidServerName(String),

    #[error("directive keyword is empty")]
    EmptyDirective,
}

/// The base template could not be loaded.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read haproxy base config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse haproxy base config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: DocumentError,
    },
}

/// Errors from merging desired state into a document.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to create frontend section with label {label:?}: {source}")]
    FrontendSection { label: String, source: DocumentError },

    #[error("failed to create frontend attr bind for {label:?}: {source}")]
    Bind { label: String, source: DocumentError },

    #[error("failed to create frontend attr use_backend for {label:?}: {source}")]
    UseBackend { label: String, source: DocumentError },

    #[error("failed to create section backend with label {label:?}: {source}")]
    BackendSection { label: String, source: DocumentError },

    #[error("failed to add backend attr server to {label:?}: {source}")]
    Server { label: String, source: DocumentError },
}
