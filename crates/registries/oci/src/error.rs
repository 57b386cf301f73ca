//! Error types for the OCI module backend.
//!
//! Neither type leaves the crate through the module API: the backend turns
//! them into [`ModuleError`](armature_modules::ModuleError) values at the
//! registry boundary, keeping the rendered message as the detail.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Errors raised by a remote registry client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The factory has no client for this registry and repository.
    #[error("No registry client available for '{registry}/{repository}'")]
    Unregistered {
        /// Registry host.
        registry: String,
        /// Repository path.
        repository: String,
    },

    /// Manifest or blob is not present in the registry.
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// Failed to pull a blob from the registry.
    #[error("Failed to pull blob {digest}: {message}")]
    BlobPullFailed {
        /// The blob digest.
        digest: String,
        /// Error message.
        message: String,
    },

    /// Digest mismatch after download.
    #[error("Digest mismatch for blob: expected {expected}, got {actual}")]
    DigestMismatch {
        /// The expected digest.
        expected: String,
        /// The computed digest.
        actual: String,
    },

    /// Pushing an artifact failed.
    #[error("Failed to push '{reference}': {message}")]
    PushFailed {
        /// The push target.
        reference: String,
        /// Error message.
        message: String,
    },

    /// OCI distribution error.
    #[error("OCI error: {0}")]
    Oci(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Create an unregistered client error.
    #[must_use]
    pub fn unregistered(registry: impl Into<String>, repository: impl Into<String>) -> Self {
        Self::Unregistered {
            registry: registry.into(),
            repository: repository.into(),
        }
    }

    /// Create a blob pull failed error.
    #[must_use]
    pub fn blob_pull_failed(digest: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BlobPullFailed {
            digest: digest.into(),
            message: message.into(),
        }
    }

    /// Create a digest mismatch error.
    #[must_use]
    pub fn digest_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DigestMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a push failed error.
    #[must_use]
    pub fn push_failed(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PushFailed {
            reference: reference.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the module cache.
#[derive(Error, Debug, Diagnostic)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(armature::oci::cache::io),
        help("Check file permissions on the module cache directory")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "rename")
        operation: String,
    },

    /// A digest that cannot name a cache entry.
    #[error("Unsupported digest '{0}'")]
    #[diagnostic(code(armature::oci::cache::digest))]
    InvalidDigest(String),

    /// None of the artifact's layers produced an entry point.
    #[error("Artifact {digest} has no module layer")]
    #[diagnostic(
        code(armature::oci::cache::no_module_layer),
        help("Publish the module as a module layer or a tar+gzip layer containing main.json")
    )]
    MissingModuleLayer {
        /// Manifest digest of the artifact.
        digest: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(armature::oci::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl CacheError {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
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
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
