//! OCI artifact module registry.
//!
//! Restore runs in two phases. First every reference that is not already
//! cached has its manifest resolved, which turns tags into digests. The
//! references are then grouped by digest and each distinct digest is
//! pulled once, concurrently with the others.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use armature_modules::{
    ModuleError, ModuleReference, ModuleRegistry, OciArtifactReference, OciArtifactTarget,
    ReferenceFault, RestoreOutcome, RestoreOutcomes, RestoredModule, Result, Scheme,
};

use crate::cache::OciModuleCache;
use crate::client::{
    ArtifactLayer, LayerDescriptor, RegistryBlobClient, RegistryClientFactory, ResolvedArtifact,
    verify_blob,
};
use crate::{MODULE_CONFIG_MEDIA_TYPE, MODULE_LAYER_MEDIA_TYPE, is_module_layer};

/// Registry for `oci:` module references.
pub struct OciModuleRegistry {
    cache: OciModuleCache,
    clients: Arc<dyn RegistryClientFactory>,
}

/// A reference whose manifest has been fetched.
struct Resolved {
    reference: ModuleReference,
    client: Arc<dyn RegistryBlobClient>,
    artifact: ResolvedArtifact,
}

impl OciModuleRegistry {
    /// Create a registry that restores into `cache` through `clients`.
    #[must_use]
    pub fn new(cache: OciModuleCache, clients: Arc<dyn RegistryClientFactory>) -> Self {
        Self { cache, clients }
    }

    /// The module cache.
    #[must_use]
    pub fn cache(&self) -> &OciModuleCache {
        &self.cache
    }

    fn client_for(
        &self,
        oci: &OciArtifactReference,
    ) -> std::result::Result<Arc<dyn RegistryBlobClient>, crate::ClientError> {
        self.clients
            .create_blob_client(&oci.normalized_registry(), oci.repository())
    }

    /// The cached module for a reference, if it is fully available.
    fn cached(&self, oci: &OciArtifactReference) -> Option<RestoredModule> {
        let digest = self.cache.resolve(oci)?;
        if !self.cache.has_entry(&digest) {
            return None;
        }
        let directory = self.cache.entry_dir(&digest).ok()?;
        Some(RestoredModule::Cached { digest, directory })
    }

    async fn resolve(
        &self,
        reference: ModuleReference,
    ) -> std::result::Result<Resolved, (ModuleReference, ModuleError)> {
        let oci = reference.expect_oci();

        let client = match self.client_for(oci) {
            Ok(client) => client,
            Err(e) => {
                let error = ModuleError::restore_failed(&reference, e.to_string());
                return Err((reference, error));
            }
        };

        let artifact = match client.pull_manifest(oci.target()).await {
            Ok(artifact) => artifact,
            Err(e) => {
                let error = ModuleError::restore_failed(&reference, e.to_string());
                return Err((reference, error));
            }
        };

        if let OciArtifactTarget::Digest(expected) = oci.target() {
            if *expected != artifact.digest {
                let error = ModuleError::restore_failed(
                    &reference,
                    format!(
                        "manifest digest mismatch: expected {expected}, got {}",
                        artifact.digest
                    ),
                );
                return Err((reference, error));
            }
        }

        Ok(Resolved {
            reference,
            client,
            artifact,
        })
    }

    /// Pull and store one artifact.
    ///
    /// Returns the cache directory, or a message describing the failure.
    async fn fetch(
        &self,
        client: &dyn RegistryBlobClient,
        artifact: &ResolvedArtifact,
    ) -> std::result::Result<PathBuf, String> {
        let digest = &artifact.digest;
        if self.cache.has_entry(digest) {
            trace!(%digest, "Module already cached");
            return self.cache.entry_dir(digest).map_err(|e| e.to_string());
        }

        let usable: Vec<&LayerDescriptor> = artifact
            .manifest
            .layers
            .iter()
            .filter(|layer| is_module_layer(&layer.media_type))
            .collect();
        if usable.is_empty() {
            return Err(format!("artifact {digest} has no module layer"));
        }

        let mut layers = Vec::with_capacity(usable.len());
        for descriptor in usable {
            let data = client
                .pull_blob(descriptor)
                .await
                .map_err(|e| e.to_string())?;
            verify_blob(descriptor, &data).map_err(|e| e.to_string())?;
            layers.push((descriptor.clone(), data));
        }

        let cache = self.cache.clone();
        let digest = digest.clone();
        let manifest = artifact.manifest.clone();
        tokio::task::spawn_blocking(move || cache.store_entry(&digest, &manifest, &layers))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())
    }

    fn finish(
        &self,
        resolved: &Resolved,
        fetched: &std::result::Result<PathBuf, String>,
    ) -> RestoreOutcome {
        let reference = &resolved.reference;
        let digest = &resolved.artifact.digest;

        let directory = match fetched {
            Ok(directory) => directory.clone(),
            Err(detail) => {
                warn!(%reference, %digest, %detail, "Module restore failed");
                return Err(ModuleError::restore_failed(reference, detail.clone()));
            }
        };

        let oci = reference.expect_oci();
        if let Some(tag) = oci.tag() {
            if let Err(error) = self
                .cache
                .record_tag(oci.registry(), oci.repository(), tag, digest)
            {
                warn!(%reference, %error, "Failed to record tag");
                return Err(ModuleError::restore_failed(reference, error.to_string()));
            }
        }

        debug!(%reference, %digest, "Restored OCI module");
        Ok(RestoredModule::Cached {
            digest: digest.clone(),
            directory,
        })
    }
}

#[async_trait]
impl ModuleRegistry for OciModuleRegistry {
    fn scheme(&self) -> Scheme {
        Scheme::Oci
    }

    fn parse_reference(&self, raw: &str) -> Result<ModuleReference> {
        OciArtifactReference::try_parse(raw).map(ModuleReference::Oci)
    }

    fn is_restore_required(&self, reference: &ModuleReference) -> bool {
        self.cached(reference.expect_oci()).is_none()
    }

    async fn restore_modules(&self, references: &[ModuleReference]) -> RestoreOutcomes {
        let mut outcomes = RestoreOutcomes::new();
        let mut pending = Vec::new();
        let mut seen = HashSet::new();

        for reference in references {
            if !seen.insert(reference) {
                continue;
            }
            match self.cached(reference.expect_oci()) {
                Some(restored) => {
                    trace!(%reference, "Module already available");
                    outcomes.insert(reference.clone(), Ok(restored));
                }
                None => pending.push(reference.clone()),
            }
        }

        if pending.is_empty() {
            return outcomes;
        }
        info!(count = pending.len(), "Restoring OCI modules");

        // Phase 1: resolve manifests.
        let mut by_digest: HashMap<String, Vec<Resolved>> = HashMap::new();
        for result in join_all(pending.into_iter().map(|r| self.resolve(r))).await {
            match result {
                Ok(resolved) => by_digest
                    .entry(resolved.artifact.digest.clone())
                    .or_default()
                    .push(resolved),
                Err((reference, error)) => {
                    warn!(%reference, %error, "Failed to resolve module manifest");
                    outcomes.insert(reference, Err(error));
                }
            }
        }

        // Phase 2: one fetch per distinct digest.
        debug!(digests = by_digest.len(), "Fetching module artifacts");
        let fetches = by_digest.into_values().map(|group| async move {
            let first = &group[0];
            let result = self.fetch(first.client.as_ref(), &first.artifact).await;
            (group, result)
        });

        for (group, result) in join_all(fetches).await {
            for resolved in group {
                let outcome = self.finish(&resolved, &result);
                outcomes.insert(resolved.reference, outcome);
            }
        }

        outcomes
    }

    fn try_resolve_entry_point(
        &self,
        _parent: &Path,
        reference: &ModuleReference,
    ) -> Result<PathBuf> {
        let oci = reference.expect_oci();
        let Some(digest) = self.cache.resolve(oci) else {
            let index = match oci.tag() {
                Some(tag) => self.cache.tag_path(oci.registry(), oci.repository(), tag),
                None => self.cache.root().to_path_buf(),
            };
            return Err(ModuleError::entry_point_not_found(reference, index));
        };

        let entry = self
            .cache
            .entry_point(&digest)
            .map_err(|_| ModuleError::entry_point_not_found(reference, self.cache.root()))?;
        if entry.is_file() {
            trace!(%reference, ?entry, "Resolved OCI module");
            Ok(entry)
        } else {
            Err(ModuleError::entry_point_not_found(reference, entry))
        }
    }

    async fn publish(&self, reference: &ModuleReference, content: Bytes) -> Result<()> {
        let oci = reference.expect_oci();
        let Some(tag) = oci.tag() else {
            return Err(ModuleError::invalid_reference_with(
                Scheme::Oci,
                oci.unqualified_reference(),
                ReferenceFault::PublishRequiresTag,
            ));
        };

        let client = self
            .client_for(oci)
            .map_err(|e| ModuleError::publish_failed(reference, e.to_string()))?;

        info!(%reference, bytes = content.len(), "Publishing OCI module");
        client
            .push_artifact(
                tag,
                ArtifactLayer {
                    media_type: MODULE_CONFIG_MEDIA_TYPE.to_string(),
                    data: Bytes::from_static(b"{}"),
                },
                vec![ArtifactLayer {
                    media_type: MODULE_LAYER_MEDIA_TYPE.to_string(),
                    data: content,
                }],
            )
            .await
            .map_err(|e| ModuleError::publish_failed(reference, e.to_string()))?;

        // The tag may now point elsewhere; re-resolve on next restore.
        if let Err(error) = self.cache.forget_tag(oci.registry(), oci.repository(), tag) {
            warn!(%reference, %error, "Failed to invalidate cached tag");
        }

        Ok(())
    }
}

impl std::fmt::Debug for OciModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciModuleRegistry")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
