//! In-memory registry doubles.
//!
//! [`MockClientFactory`] hands out pre-registered [`InMemoryBlobClient`]s
//! keyed by registry and repository. Asking for any other pair is an
//! error, so a test fails loudly when restore reaches a registry it did
//! not set up.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use armature_modules::OciArtifactTarget;

use crate::client::{
    ArtifactLayer, ArtifactManifest, LayerDescriptor, RegistryBlobClient, RegistryClientFactory,
    ResolvedArtifact, sha256_digest,
};
use crate::error::ClientError;
use crate::{MODULE_CONFIG_MEDIA_TYPE, MODULE_LAYER_MEDIA_TYPE};

#[derive(Debug, Default)]
struct Contents {
    blobs: HashMap<String, Bytes>,
    manifests: HashMap<String, ArtifactManifest>,
    tags: HashMap<String, String>,
    redirects: HashMap<String, String>,
}

/// A single repository held in memory.
#[derive(Debug, Default)]
pub struct InMemoryBlobClient {
    contents: Mutex<Contents>,
    manifest_pulls: AtomicUsize,
    blob_pulls: AtomicUsize,
}

impl InMemoryBlobClient {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` as a single-layer module tagged `tag`.
    ///
    /// Returns the manifest digest.
    pub fn push_module(&self, tag: &str, content: impl Into<Bytes>) -> String {
        self.store(
            tag,
            ArtifactLayer {
                media_type: MODULE_CONFIG_MEDIA_TYPE.to_string(),
                data: Bytes::from_static(b"{}"),
            },
            vec![ArtifactLayer {
                media_type: MODULE_LAYER_MEDIA_TYPE.to_string(),
                data: content.into(),
            }],
        )
    }

    /// Serve the manifest stored under `actual` when `requested` is pulled by digest.
    pub fn redirect_digest(&self, requested: impl Into<String>, actual: impl Into<String>) {
        self.lock().redirects.insert(requested.into(), actual.into());
    }

    /// Number of manifest pulls served.
    #[must_use]
    pub fn manifest_pulls(&self) -> usize {
        self.manifest_pulls.load(Ordering::SeqCst)
    }

    /// Number of blob pulls served.
    #[must_use]
    pub fn blob_pulls(&self) -> usize {
        self.blob_pulls.load(Ordering::SeqCst)
    }

    /// The digest `tag` currently points at.
    #[must_use]
    pub fn tag_digest(&self, tag: &str) -> Option<String> {
        self.lock().tags.get(tag).cloned()
    }

    fn store(&self, tag: &str, config: ArtifactLayer, layers: Vec<ArtifactLayer>) -> String {
        let mut contents = self.lock();

        let config_descriptor = LayerDescriptor::for_data(config.media_type, &config.data);
        contents
            .blobs
            .insert(config_descriptor.digest.clone(), config.data);

        let mut descriptors = Vec::with_capacity(layers.len());
        for layer in layers {
            let descriptor = LayerDescriptor::for_data(layer.media_type, &layer.data);
            contents.blobs.insert(descriptor.digest.clone(), layer.data);
            descriptors.push(descriptor);
        }

        let manifest = ArtifactManifest {
            schema_version: 2,
            config: config_descriptor,
            layers: descriptors,
        };
        let digest = sha256_digest(&serde_json::to_vec(&manifest).unwrap_or_default());
        contents.manifests.insert(digest.clone(), manifest);
        contents.tags.insert(tag.to_string(), digest.clone());

        trace!(tag, %digest, "Stored in-memory artifact");
        digest
    }

    fn lock(&self) -> MutexGuard<'_, Contents> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RegistryBlobClient for InMemoryBlobClient {
    async fn pull_manifest(
        &self,
        target: &OciArtifactTarget,
    ) -> Result<ResolvedArtifact, ClientError> {
        self.manifest_pulls.fetch_add(1, Ordering::SeqCst);
        let contents = self.lock();

        let digest = match target {
            OciArtifactTarget::Tag(tag) => contents.tags.get(tag).cloned(),
            OciArtifactTarget::Digest(digest) => Some(
                contents
                    .redirects
                    .get(digest)
                    .cloned()
                    .unwrap_or_else(|| digest.clone()),
            ),
        }
        .ok_or_else(|| ClientError::NotFound(target.to_string()))?;

        let manifest = contents
            .manifests
            .get(&digest)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(target.to_string()))?;

        Ok(ResolvedArtifact { digest, manifest })
    }

    async fn pull_blob(&self, descriptor: &LayerDescriptor) -> Result<Bytes, ClientError> {
        self.blob_pulls.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .blobs
            .get(&descriptor.digest)
            .cloned()
            .ok_or_else(|| ClientError::blob_pull_failed(&descriptor.digest, "blob unknown"))
    }

    async fn push_artifact(
        &self,
        tag: &str,
        config: ArtifactLayer,
        layers: Vec<ArtifactLayer>,
    ) -> Result<(), ClientError> {
        self.store(tag, config, layers);
        Ok(())
    }
}

/// Client factory with a fixed registration table.
#[derive(Debug, Default)]
pub struct MockClientFactory {
    clients: HashMap<(String, String), Arc<InMemoryBlobClient>>,
}

impl MockClientFactory {
    /// Create a factory with no registered repositories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` for `registry`/`repository`.
    #[must_use]
    pub fn with_client(
        mut self,
        registry: &str,
        repository: &str,
        client: Arc<InMemoryBlobClient>,
    ) -> Self {
        self.clients.insert(
            (registry.to_ascii_lowercase(), repository.to_string()),
            client,
        );
        self
    }
}

impl RegistryClientFactory for MockClientFactory {
    fn create_blob_client(
        &self,
        registry: &str,
        repository: &str,
    ) -> Result<Arc<dyn RegistryBlobClient>, ClientError> {
        self.clients
            .get(&(registry.to_string(), repository.to_string()))
            .map(|client| Arc::clone(client) as Arc<dyn RegistryBlobClient>)
            .ok_or_else(|| ClientError::unregistered(registry, repository))
    }
}
