//! Error types for background jobs

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use crate::types::{JobKind, JobStatus};
use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for job operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// An external tool exited unsuccessfully or printed unexpected output
    #[error("{tool} failed: {message}")]
    #[diagnostic(code(ogb::jobs::tool_failed))]
    ToolInvocationFailed {
        /// Tool name
        tool: String,
        /// Diagnostic text including exit status and captured output
        message: String,
    },

    /// A conditional status change found the record in another state
    #[error("Cannot move {kind} job {id} out of {actual}, expected {expected}")]
    #[diagnostic(code(ogb::jobs::stale_transition))]
    StaleTransition {
        /// Job kind
        kind: JobKind,
        /// Record identity
        id: String,
        /// Accepted source states
        expected: String,
        /// State found in the store
        actual: JobStatus,
    },

    /// No record with this identity exists
    #[error("No {kind} job with id {id}")]
    #[diagnostic(code(ogb::jobs::not_found))]
    NotFound {
        /// Job kind
        kind: JobKind,
        /// Record identity
        id: String,
    },

    /// Inserting a record whose identity is already taken
    #[error("A {kind} job with id {id} already exists")]
    #[diagnostic(
        code(ogb::jobs::conflict),
        help("Pass --ignore-conflicts to skip existing records")
    )]
    Conflict {
        /// Job kind
        kind: JobKind,
        /// Record identity
        id: String,
    },

    /// The subject does not fit the job kind
    #[error("Invalid subject for {kind} job: {message}")]
    #[diagnostic(code(ogb::jobs::invalid_subject))]
    InvalidSubject {
        /// Job kind
        kind: JobKind,
        /// What is wrong with the subject
        message: String,
    },

    /// A genome identifier could not be resolved to an assembly
    #[error("Unknown genome: {id}")]
    #[diagnostic(
        code(ogb::jobs::unknown_genome),
        help("Check the [genomes] section of the configuration")
    )]
    UnknownGenome {
        /// Genome identifier
        id: String,
    },

    /// Cache error from the memoizing tool adapters
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] ogb_cache::Error),

    /// I/O error with path context
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(ogb::jobs::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed
        operation: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(ogb::jobs::serialization))]
    Serialization {
        /// Error message
        message: String,
    },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(ogb::jobs::config))]
    Configuration {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a tool failure
    #[must_use]
    pub fn tool(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ToolInvocationFailed {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create a stale transition error
    #[must_use]
    pub fn stale(
        kind: JobKind,
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: JobStatus,
    ) -> Self {
        Self::StaleTransition {
            kind,
            id: id.into(),
            expected: expected.into(),
            actual,
        }
    }

    /// Create a not-found error
    #[must_use]
    pub fn not_found(kind: JobKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an invalid-subject error
    #[must_use]
    pub fn invalid_subject(kind: JobKind, msg: impl Into<String>) -> Self {
        Self::InvalidSubject {
            kind,
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// True if a guarded status change was refused
    #[must_use]
    pub const fn is_stale_transition(&self) -> bool {
        matches!(self, Self::StaleTransition { .. })
    }
}

/// Result type for job operations
pub type Result<T> = std::result::Result<T, Error>;
