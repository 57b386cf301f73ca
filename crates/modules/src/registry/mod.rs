//! Module registry backends.
//!
//! Each addressing scheme is served by one [`ModuleRegistry`]. The
//! dispatcher routes references to the registry that owns their scheme;
//! a registry receiving another scheme's reference is a routing bug and
//! panics rather than reporting a diagnostic.
//!
//! # Architecture
//!
//! - [`ModuleRegistry`] - trait implemented once per scheme
//! - [`RegistryProvider`] - supplies the registries a dispatcher is built from
//! - [`LocalModuleRegistry`] - relative file paths, always available
//! - [`TemplateSpecModuleRegistry`] - template specs, parse-only for now
//!
//! The OCI registry lives in `armature-registry-oci`.

mod local;
mod template_spec;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use local::LocalModuleRegistry;
pub use template_spec::TemplateSpecModuleRegistry;

use crate::error::{ModuleError, Result};
use crate::reference::{ModuleReference, Scheme};

/// Where a successfully restored module can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoredModule {
    /// The module is read where it already is (local files).
    InPlace,
    /// The module was materialized into the content-addressed cache.
    Cached {
        /// Manifest digest the content is stored under.
        digest: String,
        /// Cache directory holding the module content.
        directory: PathBuf,
    },
}

/// Result of restoring one reference.
pub type RestoreOutcome = std::result::Result<RestoredModule, ModuleError>;

/// Per-reference restore results returned by a registry.
pub type RestoreOutcomes = HashMap<ModuleReference, RestoreOutcome>;

/// A backend for one module addressing scheme.
///
/// Implementations must tolerate `restore_modules` being called with
/// references that are already available; those are reported as restored
/// without any remote calls.
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
    /// The scheme this registry owns.
    fn scheme(&self) -> Scheme;

    /// Parse an unqualified address with this registry's grammar.
    fn parse_reference(&self, raw: &str) -> Result<ModuleReference>;

    /// Whether the module content is missing locally.
    fn is_restore_required(&self, reference: &ModuleReference) -> bool;

    /// Fetch a batch of modules into local storage.
    ///
    /// References the registry cannot restore may be left out of the
    /// returned map.
    async fn restore_modules(&self, references: &[ModuleReference]) -> RestoreOutcomes;

    /// Locate the compiled entry file of a restored module.
    ///
    /// `parent` is the path of the file containing the import.
    fn try_resolve_entry_point(&self, parent: &Path, reference: &ModuleReference)
    -> Result<PathBuf>;

    /// Push compiled module content to the registry.
    async fn publish(&self, reference: &ModuleReference, content: Bytes) -> Result<()>;
}

/// Supplies the registries a dispatcher routes to.
///
/// The provider owns backend construction, including any authenticated
/// remote clients, so the dispatcher never sees credentials.
pub trait RegistryProvider {
    /// One registry per supported scheme.
    fn registries(&self) -> Vec<Arc<dyn ModuleRegistry>>;
}

impl RegistryProvider for Vec<Arc<dyn ModuleRegistry>> {
    fn registries(&self) -> Vec<Arc<dyn ModuleRegistry>> {
        self.clone()
    }
}
