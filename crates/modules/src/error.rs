//! Error types for module reference parsing, restore and publish.
//!
//! Every failure a backend can report is a [`ModuleError`] value. Nothing
//! here is rendered eagerly: the variants carry the raw input and the
//! offending piece, and the message is only produced when the error is
//! displayed (typically when the graph builder turns it into a diagnostic).

use miette::Diagnostic;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::reference::{ModuleReference, Scheme};

/// Result type for module operations.
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors surfaced by the module resolver.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum ModuleError {
    /// The address string is malformed for the identified scheme.
    #[error(
        "Invalid {scheme} module reference '{}'{}",
        scheme.qualify(raw),
        fault.as_ref().map_or(String::new(), |f| format!(": {f}"))
    )]
    #[diagnostic(code(armature::modules::invalid_reference))]
    InvalidReference {
        /// Scheme whose grammar rejected the address.
        scheme: Scheme,
        /// The address as written, without the scheme prefix.
        raw: String,
        /// The failed check, when the grammar distinguishes it.
        fault: Option<ReferenceFault>,
    },

    /// The prefix is not one of the supported schemes.
    #[error("The module reference scheme '{scheme}' in '{raw}' is not recognized")]
    #[diagnostic(
        code(armature::modules::unknown_scheme),
        help(
            "Specify a relative path to a local module file, or a reference using one of the schemes: oci, ts"
        )
    )]
    UnknownScheme {
        /// The unrecognized prefix.
        scheme: String,
        /// The full address as written.
        raw: String,
    },

    /// Fetching the module failed (network, authentication, not found).
    #[error("Unable to restore module '{reference}': {detail}")]
    #[diagnostic(
        code(armature::modules::restore_failed),
        help("Check that the registry is reachable and that the module exists")
    )]
    ModuleRestoreFailed {
        /// The reference that failed to restore.
        reference: String,
        /// What went wrong.
        detail: String,
    },

    /// The backend for this reference cannot restore modules.
    #[error("Restoring module '{reference}' is not supported")]
    #[diagnostic(code(armature::modules::restore_unsupported))]
    RestoreUnsupported {
        /// The reference that was requested.
        reference: String,
    },

    /// The backend for this scheme cannot publish modules.
    #[error("Publishing is not supported for {scheme} modules")]
    #[diagnostic(
        code(armature::modules::publish_unsupported),
        help("Publish to an OCI registry using an 'oci:' reference")
    )]
    PublishUnsupported {
        /// The scheme of the rejected target.
        scheme: Scheme,
    },

    /// Pushing to the remote registry failed.
    #[error("Unable to publish module '{reference}': {detail}")]
    #[diagnostic(code(armature::modules::publish_failed))]
    PublishFailed {
        /// The publish target.
        reference: String,
        /// What went wrong.
        detail: String,
    },

    /// The restored content has no compiled entry file.
    #[error("Module '{reference}' has no entry point at {}", path.display())]
    #[diagnostic(
        code(armature::modules::entry_point_not_found),
        help("Restore the module before resolving its entry point")
    )]
    EntryPointNotFound {
        /// The reference being resolved.
        reference: String,
        /// Where the entry point was expected.
        path: PathBuf,
    },
}

impl ModuleError {
    /// Create an invalid reference error with no fault detail.
    #[must_use]
    pub fn invalid_reference(scheme: Scheme, raw: impl Into<String>) -> Self {
        Self::InvalidReference {
            scheme,
            raw: raw.into(),
            fault: None,
        }
    }

    /// Create an invalid reference error naming the failed check.
    #[must_use]
    pub fn invalid_reference_with(
        scheme: Scheme,
        raw: impl Into<String>,
        fault: ReferenceFault,
    ) -> Self {
        Self::InvalidReference {
            scheme,
            raw: raw.into(),
            fault: Some(fault),
        }
    }

    /// Create an unknown scheme error.
    #[must_use]
    pub fn unknown_scheme(scheme: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::UnknownScheme {
            scheme: scheme.into(),
            raw: raw.into(),
        }
    }

    /// Create a restore failure for a reference.
    #[must_use]
    pub fn restore_failed(reference: &ModuleReference, detail: impl Into<String>) -> Self {
        Self::ModuleRestoreFailed {
            reference: reference.to_string(),
            detail: detail.into(),
        }
    }

    /// Create a restore unsupported error.
    #[must_use]
    pub fn restore_unsupported(reference: &ModuleReference) -> Self {
        Self::RestoreUnsupported {
            reference: reference.to_string(),
        }
    }

    /// Create a publish unsupported error.
    #[must_use]
    pub fn publish_unsupported(scheme: Scheme) -> Self {
        Self::PublishUnsupported { scheme }
    }

    /// Create a publish failure for a reference.
    #[must_use]
    pub fn publish_failed(reference: &ModuleReference, detail: impl Into<String>) -> Self {
        Self::PublishFailed {
            reference: reference.to_string(),
            detail: detail.into(),
        }
    }

    /// Create an entry point not found error.
    #[must_use]
    pub fn entry_point_not_found(reference: &ModuleReference, path: impl Into<PathBuf>) -> Self {
        Self::EntryPointNotFound {
            reference: reference.to_string(),
            path: path.into(),
        }
    }

    /// The coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ModuleErrorKind {
        match self {
            Self::InvalidReference { .. } => ModuleErrorKind::InvalidReference,
            Self::UnknownScheme { .. } => ModuleErrorKind::UnknownScheme,
            Self::ModuleRestoreFailed { .. } => ModuleErrorKind::ModuleRestoreFailed,
            Self::RestoreUnsupported { .. } => ModuleErrorKind::RestoreUnsupported,
            Self::PublishUnsupported { .. } => ModuleErrorKind::PublishUnsupported,
            Self::PublishFailed { .. } => ModuleErrorKind::PublishFailed,
            Self::EntryPointNotFound { .. } => ModuleErrorKind::EntryPointNotFound,
        }
    }
}

/// Discriminant of [`ModuleError`], convenient for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleErrorKind {
    /// See [`ModuleError::InvalidReference`].
    InvalidReference,
    /// See [`ModuleError::UnknownScheme`].
    UnknownScheme,
    /// See [`ModuleError::ModuleRestoreFailed`].
    ModuleRestoreFailed,
    /// See [`ModuleError::RestoreUnsupported`].
    RestoreUnsupported,
    /// See [`ModuleError::PublishUnsupported`].
    PublishUnsupported,
    /// See [`ModuleError::PublishFailed`].
    PublishFailed,
    /// See [`ModuleError::EntryPointNotFound`].
    EntryPointNotFound,
}

/// The specific check an address failed.
///
/// Template spec references never carry a fault; their grammar reports a
/// single generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceFault {
    /// No registry host before the first `/`.
    MissingRegistry,
    /// Registry host or port is malformed.
    InvalidRegistry,
    /// A repository segment breaks the naming rules.
    InvalidRepository,
    /// Neither `:tag` nor `@digest` follows the repository.
    MissingTagOrDigest,
    /// Tag breaks the naming rules.
    InvalidTag,
    /// Digest is not `algorithm:hex` with a supported algorithm.
    InvalidDigest,
    /// Digest references cannot be publish targets.
    PublishRequiresTag,
    /// Local path is empty.
    EmptyPath,
    /// Local path starts with `/`.
    AbsolutePath,
    /// Local path uses `\` as a separator.
    BackSlash,
    /// Local path contains a character that is not allowed.
    ForbiddenCharacter(char),
    /// Local path ends with `/`.
    TrailingSeparator,
    /// Local path ends with `.` or a space.
    TrailingDotOrSpace,
}

impl fmt::Display for ReferenceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRegistry => write!(f, "the registry host is missing"),
            Self::InvalidRegistry => write!(f, "the registry host is not a valid host[:port]"),
            Self::InvalidRepository => write!(
                f,
                "repository segments must be lowercase alphanumerics separated by '.', '_' or '-'"
            ),
            Self::MissingTagOrDigest => write!(f, "the reference is missing a tag or digest"),
            Self::InvalidTag => write!(f, "the tag is not valid"),
            Self::InvalidDigest => {
                write!(f, "the digest must be sha256 or sha512 followed by lowercase hex")
            }
            Self::PublishRequiresTag => write!(f, "publish targets must use a tag, not a digest"),
            Self::EmptyPath => write!(f, "the path is empty"),
            Self::AbsolutePath => write!(f, "the path must be relative"),
            Self::BackSlash => write!(f, "use '/' instead of '\\' as the path separator"),
            Self::ForbiddenCharacter(c) => write!(f, "the path contains forbidden character {c:?}"),
            Self::TrailingSeparator => write!(f, "the path must not end with '/'"),
            Self::TrailingDotOrSpace => write!(f, "the path must not end with '.' or a space"),
        }
    }
}
