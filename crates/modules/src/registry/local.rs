//! Registry for modules addressed by relative file path.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::{ModuleRegistry, RestoreOutcomes, RestoredModule};
use crate::error::{ModuleError, Result};
use crate::reference::{LocalModuleReference, ModuleReference, Scheme};

/// Local files need no restore and cannot be published to.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalModuleRegistry;

impl LocalModuleRegistry {
    /// Create the local registry.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModuleRegistry for LocalModuleRegistry {
    fn scheme(&self) -> Scheme {
        Scheme::Local
    }

    fn parse_reference(&self, raw: &str) -> Result<ModuleReference> {
        LocalModuleReference::try_parse(raw).map(ModuleReference::Local)
    }

    fn is_restore_required(&self, reference: &ModuleReference) -> bool {
        reference.assert_scheme(Scheme::Local);
        false
    }

    async fn restore_modules(&self, references: &[ModuleReference]) -> RestoreOutcomes {
        references
            .iter()
            .map(|reference| {
                reference.assert_scheme(Scheme::Local);
                (reference.clone(), Ok(RestoredModule::InPlace))
            })
            .collect()
    }

    fn try_resolve_entry_point(
        &self,
        parent: &Path,
        reference: &ModuleReference,
    ) -> Result<PathBuf> {
        let local = reference.expect_local();
        let directory = parent.parent().unwrap_or_else(|| Path::new(""));
        let entry = local
            .path()
            .split('/')
            .fold(directory.to_path_buf(), |path, segment| path.join(segment));
        trace!(path = local.path(), ?entry, "Resolved local module");
        Ok(entry)
    }

    async fn publish(&self, _reference: &ModuleReference, _content: Bytes) -> Result<()> {
        Err(ModuleError::publish_unsupported(Scheme::Local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleErrorKind;

    fn local(raw: &str) -> ModuleReference {
        LocalModuleRegistry.parse_reference(raw).unwrap()
    }

    #[test]
    fn test_never_requires_restore() {
        assert!(!LocalModuleRegistry.is_restore_required(&local("a.arm")));
    }

    #[tokio::test]
    async fn test_restore_reports_every_reference_in_place() {
        let refs = vec![local("a.arm"), local("b/c.arm")];
        let outcomes = LocalModuleRegistry.restore_modules(&refs).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.values().all(|o| matches!(o, Ok(RestoredModule::InPlace))));
    }

    #[test]
    fn test_entry_point_is_relative_to_parent_directory() {
        let entry = LocalModuleRegistry
            .try_resolve_entry_point(Path::new("/src/main.arm"), &local("modules/net.arm"))
            .unwrap();
        assert_eq!(entry, Path::new("/src/modules/net.arm"));

        let entry = LocalModuleRegistry
            .try_resolve_entry_point(Path::new("/src/app/main.arm"), &local("../shared.arm"))
            .unwrap();
        assert_eq!(entry, Path::new("/src/app/../shared.arm"));
    }

    #[tokio::test]
    async fn test_publish_is_unsupported() {
        let err = LocalModuleRegistry
            .publish(&local("a.arm"), Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::PublishUnsupported);
    }

    #[test]
    #[should_panic(expected = "local registry was handed")]
    fn test_foreign_reference_panics() {
        let reference = Scheme::Oci.parse("host.io/repo:v1").unwrap();
        let _ = LocalModuleRegistry.is_restore_required(&reference);
    }
}
