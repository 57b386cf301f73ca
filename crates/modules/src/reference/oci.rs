//! OCI artifact references (`oci:` scheme).

use regex::Regex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use super::Scheme;
use crate::error::{ModuleError, ReferenceFault, Result};

const MAX_REGISTRY_LENGTH: usize = 255;
const MAX_REPOSITORY_LENGTH: usize = 255;

#[allow(clippy::expect_used)]
static HOST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?$").expect("host label pattern compiles")
});

#[allow(clippy::expect_used)]
static REPOSITORY_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+([._-][a-z0-9]+)*$").expect("repository segment pattern compiles")
});

#[allow(clippy::expect_used)]
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").expect("tag pattern compiles")
});

#[allow(clippy::expect_used)]
static DIGEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(sha256:[a-f0-9]{64}|sha512:[a-f0-9]{128})$").expect("digest pattern compiles")
});

/// What an OCI reference points at inside its repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OciArtifactTarget {
    /// A mutable tag such as `v1`.
    Tag(String),
    /// An immutable manifest digest such as `sha256:<hex>`.
    Digest(String),
}

impl fmt::Display for OciArtifactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, ":{tag}"),
            Self::Digest(digest) => write!(f, "@{digest}"),
        }
    }
}

/// A reference to an artifact in an OCI-compatible registry.
///
/// The registry host compares case-insensitively (DNS semantics); the
/// repository and target compare exactly.
#[derive(Debug, Clone)]
pub struct OciArtifactReference {
    registry: String,
    repository: String,
    target: OciArtifactTarget,
}

impl OciArtifactReference {
    /// Parse `<registry>/<repository>:<tag>` or `<registry>/<repository>@<digest>`.
    pub fn try_parse(raw: &str) -> Result<Self> {
        let fail = |fault| ModuleError::invalid_reference_with(Scheme::Oci, raw, fault);

        let (registry, rest) = match raw.split_once('/') {
            Some((registry, rest)) if !registry.is_empty() => (registry, rest),
            _ => return Err(fail(ReferenceFault::MissingRegistry)),
        };
        if !is_valid_registry(registry) {
            return Err(fail(ReferenceFault::InvalidRegistry));
        }

        let (repository, target) = if let Some((repository, digest)) = rest.split_once('@') {
            (repository, OciArtifactTarget::Digest(digest.to_string()))
        } else if let Some((repository, tag)) = rest.rsplit_once(':') {
            (repository, OciArtifactTarget::Tag(tag.to_string()))
        } else {
            if !is_valid_repository(rest) {
                return Err(fail(ReferenceFault::InvalidRepository));
            }
            return Err(fail(ReferenceFault::MissingTagOrDigest));
        };

        if !is_valid_repository(repository) {
            return Err(fail(ReferenceFault::InvalidRepository));
        }

        match &target {
            OciArtifactTarget::Tag(tag) if !TAG.is_match(tag) => {
                return Err(fail(ReferenceFault::InvalidTag));
            }
            OciArtifactTarget::Digest(digest) if !DIGEST.is_match(digest) => {
                return Err(fail(ReferenceFault::InvalidDigest));
            }
            _ => {}
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            target,
        })
    }

    /// Registry host and optional port, as written.
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Registry host lowercased, for use as a lookup key.
    #[must_use]
    pub fn normalized_registry(&self) -> String {
        self.registry.to_ascii_lowercase()
    }

    /// Repository path inside the registry.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag or digest.
    #[must_use]
    pub fn target(&self) -> &OciArtifactTarget {
        &self.target
    }

    /// The tag, for tag references.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.target {
            OciArtifactTarget::Tag(tag) => Some(tag),
            OciArtifactTarget::Digest(_) => None,
        }
    }

    /// The digest, for digest-pinned references.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        match &self.target {
            OciArtifactTarget::Digest(digest) => Some(digest),
            OciArtifactTarget::Tag(_) => None,
        }
    }

    /// The address without the `oci:` prefix.
    #[must_use]
    pub fn unqualified_reference(&self) -> String {
        format!("{}/{}{}", self.registry, self.repository, self.target)
    }
}

impl PartialEq for OciArtifactReference {
    fn eq(&self, other: &Self) -> bool {
        self.registry.eq_ignore_ascii_case(&other.registry)
            && self.repository == other.repository
            && self.target == other.target
    }
}

impl Eq for OciArtifactReference {}

impl Hash for OciArtifactReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized_registry().hash(state);
        self.repository.hash(state);
        self.target.hash(state);
    }
}

fn is_valid_registry(registry: &str) -> bool {
    if registry.len() > MAX_REGISTRY_LENGTH {
        return false;
    }

    let host = match registry.split_once(':') {
        Some((host, port)) => {
            let port_ok = port.chars().all(|c| c.is_ascii_digit())
                && matches!(port.parse::<u16>(), Ok(p) if p > 0);
            if !port_ok {
                return false;
            }
            host
        }
        None => registry,
    };

    !host.is_empty() && host.split('.').all(|label| HOST_LABEL.is_match(label))
}

fn is_valid_repository(repository: &str) -> bool {
    !repository.is_empty()
        && repository.len() <= MAX_REPOSITORY_LENGTH
        && repository
            .split('/')
            .all(|segment| REPOSITORY_SEGMENT.is_match(segment))
}
