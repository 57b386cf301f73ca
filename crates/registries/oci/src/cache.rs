//! Content-addressed cache for restored OCI modules.
//!
//! Modules are stored by manifest digest, ensuring:
//! - Deterministic builds (same digest = same module)
//! - Deduplication across tags and repositories
//! - Restore checks without network requests

use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use armature_modules::{OciArtifactReference, OciArtifactTarget};

use crate::client::{ArtifactManifest, LayerDescriptor};
use crate::error::{CacheError, Result};
use crate::extract::unpack_layer;
use crate::{MODULE_LAYER_MEDIA_TYPE, is_archive_layer};

/// File name of a module's compiled entry point.
pub const ENTRY_POINT_FILE: &str = "main.json";

/// File name of the manifest stored beside the module.
pub const MANIFEST_FILE: &str = "manifest.json";

const TAGS_DIR: &str = "@tags";

/// Content-addressed cache for OCI modules.
///
/// Default location: `~/.cache/armature/modules/`
///
/// Structure:
/// ```text
/// ~/.cache/armature/modules/
/// ├── modules/
/// │   └── sha256/
/// │       └── abc123.../      # One directory per manifest digest
/// │           ├── main.json
/// │           └── manifest.json
/// └── refs/
///     └── <registry>/<repository>/@tags/<tag>   # Contains the digest
/// ```
///
/// Entries are immutable once written. Only the tag index is rewritten,
/// when a tag resolves to a new digest.
#[derive(Debug, Clone)]
pub struct OciModuleCache {
    root: PathBuf,
}

impl Default for OciModuleCache {
    fn default() -> Self {
        Self::new(default_cache_dir())
    }
}

/// `<platform cache dir>/armature/modules`, or `.cache/armature/modules`
/// when the platform has none.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("armature")
        .join("modules")
}

impl OciModuleCache {
    /// Create a cache at the specified root directory.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the directory for a cached module.
    pub fn entry_dir(&self, digest: &str) -> Result<PathBuf> {
        let (algo, hash) = parse_digest(digest)?;
        Ok(self.root.join("modules").join(algo).join(hash))
    }

    /// Get the entry point of a cached module.
    pub fn entry_point(&self, digest: &str) -> Result<PathBuf> {
        Ok(self.entry_dir(digest)?.join(ENTRY_POINT_FILE))
    }

    /// Check if a module is cached.
    #[must_use]
    pub fn has_entry(&self, digest: &str) -> bool {
        self.entry_point(digest).is_ok_and(|path| path.is_file())
    }

    /// Get the tag index file for a tag.
    ///
    /// Tags live under an `@tags` leaf so a tag file never shares a path
    /// with a nested repository segment (`@` is not valid in repositories).
    #[must_use]
    pub fn tag_path(&self, registry: &str, repository: &str, tag: &str) -> PathBuf {
        let mut path = self
            .root
            .join("refs")
            .join(registry.to_ascii_lowercase().replace(':', "_"));
        for segment in repository.split('/') {
            path.push(segment);
        }
        path.join(TAGS_DIR).join(tag)
    }

    /// Look up the digest a tag last resolved to.
    #[must_use]
    pub fn resolve_tag(&self, registry: &str, repository: &str, tag: &str) -> Option<String> {
        let path = self.tag_path(registry, repository, tag);
        let digest = std::fs::read_to_string(&path).ok()?;
        let digest = digest.trim();
        if parse_digest(digest).is_ok() {
            trace!(tag, digest, "Tag index hit");
            Some(digest.to_string())
        } else {
            debug!(?path, "Ignoring malformed tag index entry");
            None
        }
    }

    /// The digest a reference is known to point at, without network access.
    #[must_use]
    pub fn resolve(&self, reference: &OciArtifactReference) -> Option<String> {
        match reference.target() {
            OciArtifactTarget::Digest(digest) => Some(digest.clone()),
            OciArtifactTarget::Tag(tag) => {
                self.resolve_tag(reference.registry(), reference.repository(), tag)
            }
        }
    }

    /// Record that a tag resolved to `digest`.
    pub fn record_tag(&self, registry: &str, repository: &str, tag: &str, digest: &str) -> Result<()> {
        let path = self.tag_path(registry, repository, tag);
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(e, parent, "create"))?;

        let mut staged = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| CacheError::io(e, parent, "create temp file"))?;
        staged
            .write_all(digest.as_bytes())
            .map_err(|e| CacheError::io(e, staged.path(), "write"))?;
        staged
            .persist(&path)
            .map_err(|e| CacheError::io(e.error, &path, "persist"))?;

        debug!(tag, digest, "Recorded tag");
        Ok(())
    }

    /// Drop a tag index entry so the next restore re-resolves the tag.
    pub fn forget_tag(&self, registry: &str, repository: &str, tag: &str) -> Result<()> {
        let path = self.tag_path(registry, repository, tag);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(tag, "Forgot tag");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(e, &path, "remove")),
        }
    }

    /// Materialize a module from its manifest and pulled layers.
    ///
    /// The entry is assembled in a staging directory under the cache root
    /// and renamed into place. If another writer stored the same digest
    /// first, its entry is kept and this one is discarded.
    pub fn store_entry(
        &self,
        digest: &str,
        manifest: &ArtifactManifest,
        layers: &[(LayerDescriptor, Bytes)],
    ) -> Result<PathBuf> {
        let dest = self.entry_dir(digest)?;
        if self.has_entry(digest) {
            trace!(digest, "Module already cached");
            return Ok(dest);
        }

        let parent = dest.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(e, parent, "create"))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)
            .map_err(|e| CacheError::io(e, &self.root, "create staging directory"))?;

        for (descriptor, data) in layers {
            if descriptor.media_type == MODULE_LAYER_MEDIA_TYPE {
                let path = staging.path().join(ENTRY_POINT_FILE);
                std::fs::write(&path, data).map_err(|e| CacheError::io(e, &path, "write"))?;
            } else if is_archive_layer(&descriptor.media_type) {
                unpack_layer(data, staging.path())?;
            } else {
                trace!(media_type = %descriptor.media_type, "Ignoring layer");
            }
        }

        if !staging.path().join(ENTRY_POINT_FILE).is_file() {
            return Err(CacheError::MissingModuleLayer {
                digest: digest.to_string(),
            });
        }

        let manifest_json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| CacheError::serialization(e.to_string()))?;
        let manifest_path = staging.path().join(MANIFEST_FILE);
        std::fs::write(&manifest_path, manifest_json)
            .map_err(|e| CacheError::io(e, &manifest_path, "write"))?;

        match std::fs::rename(staging.path(), &dest) {
            Ok(()) => debug!(digest, ?dest, "Stored module in cache"),
            Err(_) if self.has_entry(digest) => {
                debug!(digest, "Module stored concurrently, keeping existing entry");
            }
            Err(e) => return Err(CacheError::io(e, &dest, "rename")),
        }

        Ok(dest)
    }

    /// Read the manifest stored with a cached module.
    pub fn read_manifest(&self, digest: &str) -> Result<ArtifactManifest> {
        let path = self.entry_dir(digest)?.join(MANIFEST_FILE);
        let content = std::fs::read(&path).map_err(|e| CacheError::io(e, &path, "read"))?;
        serde_json::from_slice(&content).map_err(|e| CacheError::serialization(e.to_string()))
    }
}

/// Parse a digest string into (algorithm, hash).
///
/// Only digests that are safe to use as path components are accepted:
/// - "sha256:<64 lowercase hex>"
/// - "sha512:<128 lowercase hex>"
fn parse_digest(digest: &str) -> Result<(&str, &str)> {
    let invalid = || CacheError::InvalidDigest(digest.to_string());
    let (algo, hash) = digest.split_once(':').ok_or_else(invalid)?;

    let expected_len = match algo {
        "sha256" => 64,
        "sha512" => 128,
        _ => return Err(invalid()),
    };
    let is_lower_hex = hash
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if hash.len() != expected_len || !is_lower_hex {
        return Err(invalid());
    }

    Ok((algo, hash))
}
