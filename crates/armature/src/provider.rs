//! Default registry set derived from [`Config`].

use std::sync::Arc;
use tracing::debug;

use armature_modules::{
    LocalModuleRegistry, ModuleDispatcher, ModuleRegistry, RegistryProvider,
    TemplateSpecModuleRegistry,
};
use armature_registry_oci::{
    OciDistributionClientFactory, OciModuleCache, OciModuleRegistry, RegistryClientFactory,
};

use crate::config::Config;

/// Provides the registries a host normally wants.
///
/// Local files are always available. Template-spec and OCI registries are
/// included only while `registryEnabled` is set; without them `ts:` and
/// `oci:` addresses are reported as unknown schemes.
pub struct DefaultRegistryProvider {
    registries: Vec<Arc<dyn ModuleRegistry>>,
}

impl DefaultRegistryProvider {
    /// Build registries talking to real OCI registries.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let factory = OciDistributionClientFactory::new(
            &config.insecure_registries,
            config.registry_credentials(),
        );
        Self::with_client_factory(config, Arc::new(factory))
    }

    /// Build registries using the given OCI client factory.
    #[must_use]
    pub fn with_client_factory(config: &Config, clients: Arc<dyn RegistryClientFactory>) -> Self {
        let mut registries: Vec<Arc<dyn ModuleRegistry>> =
            vec![Arc::new(LocalModuleRegistry::new())];
        if config.registry_enabled {
            registries.push(Arc::new(TemplateSpecModuleRegistry::new()));
            registries.push(Arc::new(OciModuleRegistry::new(
                OciModuleCache::new(config.cache_dir.clone()),
                clients,
            )));
        }
        debug!(
            registry_enabled = config.registry_enabled,
            cache_dir = %config.cache_dir.display(),
            "Configured module registries"
        );
        Self { registries }
    }

    /// Build a dispatcher over these registries.
    #[must_use]
    pub fn dispatcher(&self) -> ModuleDispatcher {
        ModuleDispatcher::new(self)
    }
}

impl RegistryProvider for DefaultRegistryProvider {
    fn registries(&self) -> Vec<Arc<dyn ModuleRegistry>> {
        self.registries.clone()
    }
}

impl std::fmt::Debug for DefaultRegistryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultRegistryProvider")
            .field(
                "schemes",
                &self.registries.iter().map(|r| r.scheme()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
