//! OCI artifact registry backend for armature modules.
//!
//! This crate provides functionality to:
//! - Resolve `oci:` module references to content-addressed digests
//! - Pull module layers and verify them against their descriptors
//! - Cache modules by digest so restore checks never touch the network
//! - Publish compiled modules as single-layer artifacts
//!
//! # Example
//!
//! ```ignore
//! use armature_registry_oci::{OciDistributionClientFactory, OciModuleCache, OciModuleRegistry};
//!
//! let registry = OciModuleRegistry::new(
//!     OciModuleCache::default(),
//!     Arc::new(OciDistributionClientFactory::default()),
//! );
//! let outcomes = registry.restore_modules(&references).await;
//! ```

#![warn(missing_docs)]

mod cache;
mod client;
mod distribution;
mod error;
mod extract;
mod registry;
pub mod testing;

pub use cache::{ENTRY_POINT_FILE, MANIFEST_FILE, OciModuleCache, default_cache_dir};
pub use client::{
    ArtifactLayer, ArtifactManifest, LayerDescriptor, RegistryBlobClient, RegistryClientFactory,
    ResolvedArtifact, sha256_digest, verify_blob,
};
pub use distribution::{OciDistributionClientFactory, RegistryCredentials};
pub use error::{CacheError, ClientError};
pub use registry::OciModuleRegistry;

/// Media type of a layer holding a compiled module (written as `main.json`).
pub const MODULE_LAYER_MEDIA_TYPE: &str = "application/vnd.armature.module.layer.v1+json";

/// Media type of the module artifact config blob.
pub const MODULE_CONFIG_MEDIA_TYPE: &str = "application/vnd.armature.module.config.v1+json";

/// Media type for OCI image layers (gzip compressed tar).
pub const ARCHIVE_LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Whether a layer is a gzip-compressed tarball.
#[must_use]
pub fn is_archive_layer(media_type: &str) -> bool {
    media_type.ends_with("tar+gzip") || media_type.ends_with(".tar.gzip")
}

/// Whether a layer contributes to a restored module.
#[must_use]
pub fn is_module_layer(media_type: &str) -> bool {
    media_type == MODULE_LAYER_MEDIA_TYPE || is_archive_layer(media_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_classification() {
        assert!(is_module_layer(MODULE_LAYER_MEDIA_TYPE));
        assert!(is_module_layer(ARCHIVE_LAYER_MEDIA_TYPE));
        assert!(is_module_layer(
            "application/vnd.docker.image.rootfs.diff.tar.gzip"
        ));
        assert!(!is_module_layer(MODULE_CONFIG_MEDIA_TYPE));
        assert!(!is_module_layer("application/json"));
    }
}
