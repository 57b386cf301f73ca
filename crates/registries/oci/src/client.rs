//! Remote registry client abstraction.
//!
//! The backend never talks to a registry directly. It asks a
//! [`RegistryClientFactory`] for a [`RegistryBlobClient`] scoped to one
//! registry and repository, which keeps credentials and transport out of
//! restore logic and lets tests inject in-memory registries.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::sync::Arc;

use armature_modules::OciArtifactTarget;

use crate::error::ClientError;

/// A content descriptor from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    /// Media type of the referenced blob.
    pub media_type: String,
    /// Digest of the blob, `algorithm:hex`.
    pub digest: String,
    /// Size of the blob in bytes.
    pub size: i64,
}

impl LayerDescriptor {
    /// Describe `data` stored under `media_type`.
    #[must_use]
    pub fn for_data(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            digest: sha256_digest(data),
            size: i64::try_from(data.len()).unwrap_or(i64::MAX),
        }
    }
}

/// An image manifest reduced to what module restore needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    /// Manifest schema version (always 2).
    pub schema_version: u8,
    /// Config blob descriptor.
    pub config: LayerDescriptor,
    /// Layer descriptors, in order.
    pub layers: Vec<LayerDescriptor>,
}

/// A manifest together with the digest the registry served it under.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    /// Content-addressable digest of the manifest.
    pub digest: String,
    /// The manifest.
    pub manifest: ArtifactManifest,
}

/// A layer to push.
#[derive(Debug, Clone)]
pub struct ArtifactLayer {
    /// Media type of the layer.
    pub media_type: String,
    /// Layer content.
    pub data: Bytes,
}

/// A client bound to one registry repository.
#[async_trait]
pub trait RegistryBlobClient: Send + Sync {
    /// Fetch the manifest a tag or digest points at.
    async fn pull_manifest(
        &self,
        target: &OciArtifactTarget,
    ) -> Result<ResolvedArtifact, ClientError>;

    /// Fetch a blob by descriptor.
    ///
    /// Returns the raw bytes; callers verify them with [`verify_blob`].
    async fn pull_blob(&self, descriptor: &LayerDescriptor) -> Result<Bytes, ClientError>;

    /// Push a config blob and layers as a new manifest tagged `tag`.
    async fn push_artifact(
        &self,
        tag: &str,
        config: ArtifactLayer,
        layers: Vec<ArtifactLayer>,
    ) -> Result<(), ClientError>;
}

/// Creates repository-scoped clients.
pub trait RegistryClientFactory: Send + Sync {
    /// A client for `repository` in `registry`.
    ///
    /// `registry` is lowercase; repository paths are already lowercase by grammar.
    fn create_blob_client(
        &self,
        registry: &str,
        repository: &str,
    ) -> Result<Arc<dyn RegistryBlobClient>, ClientError>;
}

/// Check downloaded bytes against their descriptor's digest.
pub fn verify_blob(descriptor: &LayerDescriptor, data: &[u8]) -> Result<(), ClientError> {
    let actual = match descriptor.digest.split_once(':') {
        Some(("sha512", _)) => sha512_digest(data),
        _ => sha256_digest(data),
    };
    if actual == descriptor.digest {
        Ok(())
    } else {
        Err(ClientError::digest_mismatch(&descriptor.digest, actual))
    }
}

/// Compute the SHA256 digest of `data` in OCI format: `sha256:<hex>`.
#[must_use]
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

fn sha512_digest(data: &[u8]) -> String {
    format!("sha512:{}", hex::encode(Sha512::digest(data)))
}
