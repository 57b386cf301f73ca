//! Error types for configuration and setup.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while configuring the module resolver.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error while reading configuration.
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(armature::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<PathBuf>,
        /// Operation that failed
        operation: String,
    },

    /// TOML parsing error.
    #[error("TOML parsing error{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(armature::config::toml),
        help("Ensure the configuration has valid TOML syntax and camelCase keys")
    )]
    Toml {
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
        /// Optional path to the file being parsed.
        path: Option<PathBuf>,
    },

    /// Invalid configuration value.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(armature::config::invalid))]
    Configuration {
        /// What is wrong.
        message: String,
    },

    /// Tracing could not be initialized.
    #[error("Failed to initialize tracing: {message}")]
    #[diagnostic(code(armature::tracing))]
    Tracing {
        /// What went wrong.
        message: String,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().to_path_buf()),
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a tracing error
    #[must_use]
    pub fn tracing(msg: impl Into<String>) -> Self {
        Self::Tracing {
            message: msg.into(),
        }
    }
}

/// Result type for configuration and setup.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_error_names_file() {
        let source = toml::from_str::<toml::Value>("not valid = [").unwrap_err();
        let err = Error::Toml {
            source,
            path: Some(PathBuf::from("/etc/armature.toml")),
        };
        assert!(err.to_string().starts_with("TOML parsing error in /etc/armature.toml"));
    }

    #[test]
    fn test_configuration_error() {
        let err = Error::configuration("bad value");
        assert_eq!(err.to_string(), "Configuration error: bad value");
        assert_eq!(err.code().unwrap().to_string(), "armature::config::invalid");
    }
}
