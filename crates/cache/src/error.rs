//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Which argument collection of a cached call could not be canonicalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// The ordered positional arguments
    Positional,
    /// The keyword argument mapping
    Keyword,
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional => write!(f, "positional"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Arguments could not be serialized canonically
    #[error("Could not hash {part} arguments: {message}")]
    #[diagnostic(
        code(ogb::cache::unhashable),
        help("Cached functions only accept arguments that serialize to JSON with string map keys")
    )]
    Unhashable {
        /// Which collection failed
        part: ArgumentKind,
        /// Serializer message
        message: String,
    },

    /// A cache entry exists but its result artifact is missing or unreadable
    #[error("Corrupt cache entry {function}/{key}: {message}")]
    #[diagnostic(
        code(ogb::cache::corrupt_entry),
        help("Another process may still be writing this entry; otherwise remove it with `ogb cache clear`")
    )]
    CorruptEntry {
        /// Function identifier
        function: String,
        /// Content key
        key: String,
        /// What went wrong while reading
        message: String,
    },

    /// The entry directory was already claimed by someone else
    #[error("Cache entry {function}/{key} already exists")]
    #[diagnostic(code(ogb::cache::already_exists))]
    AlreadyExists {
        /// Function identifier
        function: String,
        /// Content key
        key: String,
    },

    /// The wrapped computation failed; the entry was rolled back
    #[error("Cached computation {function}/{key} failed")]
    #[diagnostic(code(ogb::cache::computation_failed))]
    ComputationFailed {
        /// Function identifier
        function: String,
        /// Content key
        key: String,
        /// The error returned by the computation
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(ogb::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create_dir")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(ogb::cache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(ogb::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl Error {
    /// Create an unhashable-arguments error
    #[must_use]
    pub fn unhashable(part: ArgumentKind, msg: impl Into<String>) -> Self {
        Self::Unhashable {
            part,
            message: msg.into(),
        }
    }

    /// Create a corrupt entry error
    #[must_use]
    pub fn corrupt_entry(
        function: impl Into<String>,
        key: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::CorruptEntry {
            function: function.into(),
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an already-exists error
    #[must_use]
    pub fn already_exists(function: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            function: function.into(),
            key: key.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
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

    /// True for the local race that the coordinator recovers from
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// True if the entry was present but could not be read
    #[must_use]
    pub const fn is_corrupt_entry(&self) -> bool {
        matches!(self, Self::CorruptEntry { .. })
    }

    /// The original error of a failed computation, if this is one
    #[must_use]
    pub fn computation_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::ComputationFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
