//! Registry for template spec references.
//!
//! Restoring template specs is not implemented yet: references parse and
//! compare, but are never fetched. Callers that need the content must make
//! it resolvable some other way.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{ModuleRegistry, RestoreOutcomes};
use crate::error::{ModuleError, Result};
use crate::reference::{ModuleReference, Scheme};

/// Template spec registry (parse-only).
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSpecModuleRegistry;

impl TemplateSpecModuleRegistry {
    /// Create the template spec registry.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModuleRegistry for TemplateSpecModuleRegistry {
    fn scheme(&self) -> Scheme {
        Scheme::TemplateSpec
    }

    // The dispatcher parses `ts:` addresses with the reference grammar directly.
    #[allow(clippy::unimplemented)]
    fn parse_reference(&self, _raw: &str) -> Result<ModuleReference> {
        unimplemented!("template spec registry does not parse references")
    }

    // TODO(template-spec-restore): report restore required once specs can be fetched.
    fn is_restore_required(&self, _reference: &ModuleReference) -> bool {
        false
    }

    async fn restore_modules(&self, _references: &[ModuleReference]) -> RestoreOutcomes {
        RestoreOutcomes::new()
    }

    #[allow(clippy::unimplemented)]
    fn try_resolve_entry_point(
        &self,
        _parent: &Path,
        _reference: &ModuleReference,
    ) -> Result<PathBuf> {
        unimplemented!("template spec registry cannot resolve entry points")
    }

    async fn publish(&self, _reference: &ModuleReference, _content: Bytes) -> Result<()> {
        Err(ModuleError::publish_unsupported(Scheme::TemplateSpec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleErrorKind;

    fn spec(raw: &str) -> ModuleReference {
        Scheme::TemplateSpec.parse(raw).unwrap()
    }

    #[test]
    fn test_never_requires_restore() {
        assert!(!TemplateSpecModuleRegistry.is_restore_required(&spec("rg/name:v1")));
    }

    #[tokio::test]
    async fn test_restore_returns_nothing() {
        let refs = vec![
            spec("rg/name:v1"),
            spec("11111111-2222-3333-4444-555555555555/rg/name:v2"),
        ];
        assert!(TemplateSpecModuleRegistry.restore_modules(&refs).await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_is_unsupported() {
        let err = TemplateSpecModuleRegistry
            .publish(&spec("rg/name:v1"), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::PublishUnsupported);
    }

    #[test]
    #[should_panic(expected = "cannot resolve entry points")]
    fn test_entry_point_is_a_contract_violation() {
        let _ = TemplateSpecModuleRegistry
            .try_resolve_entry_point(Path::new("/main.arm"), &spec("rg/name:v1"));
    }

    #[test]
    #[should_panic(expected = "does not parse references")]
    fn test_parse_is_a_contract_violation() {
        let _ = TemplateSpecModuleRegistry.parse_reference("rg/name:v1");
    }
}
