//! Registry client backed by `oci-distribution`.

use async_trait::async_trait;
use bytes::Bytes;
use oci_distribution::client::{ClientConfig, ClientProtocol, Config, ImageLayer};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace};

use armature_modules::OciArtifactTarget;

use crate::client::{
    ArtifactLayer, ArtifactManifest, LayerDescriptor, RegistryBlobClient, RegistryClientFactory,
    ResolvedArtifact,
};
use crate::error::ClientError;

/// Username and password for one registry.
pub struct RegistryCredentials {
    /// Registry username.
    pub username: String,
    /// Registry password or token.
    pub password: SecretString,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

type ClientKey = (String, String);

/// Production client factory.
///
/// One `oci_distribution::Client` is shared by every repository client so
/// registry tokens are reused. Repository clients are created on first use.
pub struct OciDistributionClientFactory {
    client: Arc<Client>,
    credentials: HashMap<String, RegistryCredentials>,
    clients: Mutex<HashMap<ClientKey, Arc<dyn RegistryBlobClient>>>,
}

impl Default for OciDistributionClientFactory {
    fn default() -> Self {
        Self::new(&[], HashMap::new())
    }
}

impl OciDistributionClientFactory {
    /// Create a factory.
    ///
    /// Registries listed in `insecure_registries` are contacted over plain
    /// HTTP; all others use HTTPS. Credentials are keyed by registry host.
    #[must_use]
    pub fn new(
        insecure_registries: &[String],
        credentials: HashMap<String, RegistryCredentials>,
    ) -> Self {
        let protocol = if insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(insecure_registries.to_vec())
        };
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        let credentials = credentials
            .into_iter()
            .map(|(registry, creds)| (registry.to_ascii_lowercase(), creds))
            .collect();

        Self {
            client: Arc::new(Client::new(config)),
            credentials,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Get authentication for a registry.
    ///
    /// Configured credentials win. For `ghcr.io`, `GITHUB_TOKEN` or
    /// `GH_TOKEN` is used when set. Everything else is anonymous.
    fn get_auth(&self, registry: &str) -> RegistryAuth {
        if let Some(creds) = self.credentials.get(registry) {
            return RegistryAuth::Basic(
                creds.username.clone(),
                creds.password.expose_secret().to_string(),
            );
        }

        if registry == "ghcr.io" {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                return RegistryAuth::Basic(String::new(), token);
            }
            if let Ok(token) = std::env::var("GH_TOKEN") {
                return RegistryAuth::Basic(String::new(), token);
            }
        }

        RegistryAuth::Anonymous
    }
}

impl RegistryClientFactory for OciDistributionClientFactory {
    fn create_blob_client(
        &self,
        registry: &str,
        repository: &str,
    ) -> Result<Arc<dyn RegistryBlobClient>, ClientError> {
        let key = (registry.to_string(), repository.to_string());
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        let client = clients.entry(key).or_insert_with(|| {
            trace!(registry, repository, "Creating registry client");
            Arc::new(OciDistributionBlobClient {
                client: Arc::clone(&self.client),
                registry: registry.to_string(),
                repository: repository.to_string(),
                auth: self.get_auth(registry),
            })
        });

        Ok(Arc::clone(client))
    }
}

impl fmt::Debug for OciDistributionClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OciDistributionClientFactory")
            .field("registries_with_credentials", &self.credentials.keys())
            .finish_non_exhaustive()
    }
}

/// Repository client over a shared `oci_distribution::Client`.
struct OciDistributionBlobClient {
    client: Arc<Client>,
    registry: String,
    repository: String,
    auth: RegistryAuth,
}

impl OciDistributionBlobClient {
    fn reference(&self, target: &OciArtifactTarget) -> Reference {
        match target {
            OciArtifactTarget::Tag(tag) => {
                Reference::with_tag(self.registry.clone(), self.repository.clone(), tag.clone())
            }
            OciArtifactTarget::Digest(digest) => Reference::with_digest(
                self.registry.clone(),
                self.repository.clone(),
                digest.clone(),
            ),
        }
    }
}

#[async_trait]
impl RegistryBlobClient for OciDistributionBlobClient {
    async fn pull_manifest(
        &self,
        target: &OciArtifactTarget,
    ) -> Result<ResolvedArtifact, ClientError> {
        let reference = self.reference(target);
        info!(%reference, "Resolving module manifest");

        let (manifest, digest, _config) = self
            .client
            .pull_manifest_and_config(&reference, &self.auth)
            .await
            .map_err(|e| ClientError::Oci(e.to_string()))?;

        trace!(?manifest, "Got manifest");
        debug!(%reference, %digest, layer_count = manifest.layers.len(), "Resolved manifest");

        Ok(ResolvedArtifact {
            digest,
            manifest: ArtifactManifest {
                schema_version: 2,
                config: from_oci_descriptor(&manifest.config),
                layers: manifest.layers.iter().map(from_oci_descriptor).collect(),
            },
        })
    }

    async fn pull_blob(&self, descriptor: &LayerDescriptor) -> Result<Bytes, ClientError> {
        debug!(digest = %descriptor.digest, "Pulling blob");

        let reference = self.reference(&OciArtifactTarget::Digest(descriptor.digest.clone()));
        let oci_descriptor = OciDescriptor {
            media_type: descriptor.media_type.clone(),
            digest: descriptor.digest.clone(),
            size: descriptor.size,
            ..Default::default()
        };

        let mut data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&reference, &oci_descriptor, &mut data)
            .await
            .map_err(|e| ClientError::blob_pull_failed(&descriptor.digest, e.to_string()))?;

        Ok(Bytes::from(data))
    }

    async fn push_artifact(
        &self,
        tag: &str,
        config: ArtifactLayer,
        layers: Vec<ArtifactLayer>,
    ) -> Result<(), ClientError> {
        let reference = self.reference(&OciArtifactTarget::Tag(tag.to_string()));
        info!(%reference, layer_count = layers.len(), "Pushing module");

        let layers: Vec<ImageLayer> = layers
            .into_iter()
            .map(|layer| ImageLayer::new(layer.data.to_vec(), layer.media_type, None))
            .collect();
        let config = Config::new(config.data.to_vec(), config.media_type, None);

        let response = self
            .client
            .push(&reference, &layers, config, &self.auth, None)
            .await
            .map_err(|e| ClientError::push_failed(reference.to_string(), e.to_string()))?;

        debug!(manifest_url = %response.manifest_url, "Pushed module");
        Ok(())
    }
}

fn from_oci_descriptor(descriptor: &OciDescriptor) -> LayerDescriptor {
    LayerDescriptor {
        media_type: descriptor.media_type.clone(),
        digest: descriptor.digest.clone(),
        size: descriptor.size,
    }
}
