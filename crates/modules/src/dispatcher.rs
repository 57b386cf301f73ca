//! Routing layer between the dependency-graph builder and the registries.
//!
//! The dispatcher owns one registry per scheme, built once from a
//! [`RegistryProvider`]. The graph builder uses it to:
//!
//! 1. parse every import address ([`ModuleDispatcher::get_valid_module_references`]),
//! 2. restore the references that are not available locally
//!    ([`ModuleDispatcher::restore_modules`]),
//! 3. re-walk the graph while restore reports that something changed.
//!
//! Failures never cross this boundary as panics: parse failures become
//! [`ModuleDiagnostic`]s and restore failures are recorded per reference
//! and can be queried with [`ModuleDispatcher::restore_failure`].

use bytes::Bytes;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, trace, warn};

use crate::diagnostics::{DiagnosticSink, ImportCandidate, ModuleDiagnostic};
use crate::error::{ModuleError, Result};
use crate::reference::{ModuleReference, Scheme};
use crate::registry::{ModuleRegistry, RegistryProvider, RestoreOutcome, RestoredModule};

/// What the dispatcher knows about an earlier restore of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    /// No restore has been attempted through this dispatcher.
    Unknown,
    /// The last restore succeeded.
    Succeeded,
    /// The last restore failed; see [`ModuleDispatcher::restore_failure`].
    Failed,
}

/// Unified entry point over all module registries.
pub struct ModuleDispatcher {
    registries: BTreeMap<Scheme, Arc<dyn ModuleRegistry>>,
    restore_results: RwLock<HashMap<ModuleReference, RestoreOutcome>>,
}

impl ModuleDispatcher {
    /// Build the scheme table from a provider.
    ///
    /// If the provider returns two registries for one scheme, the later one wins.
    #[must_use]
    pub fn new(provider: &dyn RegistryProvider) -> Self {
        let registries = provider
            .registries()
            .into_iter()
            .map(|registry| (registry.scheme(), registry))
            .collect::<BTreeMap<_, _>>();
        debug!(schemes = ?registries.keys().collect::<Vec<_>>(), "Built module dispatcher");
        Self {
            registries,
            restore_results: RwLock::new(HashMap::new()),
        }
    }

    /// Schemes with a registered backend, in table order.
    #[must_use]
    pub fn schemes(&self) -> Vec<Scheme> {
        self.registries.keys().copied().collect()
    }

    /// The registry serving a scheme.
    #[must_use]
    pub fn registry(&self, scheme: Scheme) -> Option<&Arc<dyn ModuleRegistry>> {
        self.registries.get(&scheme)
    }

    /// Parse a raw import address.
    ///
    /// An address with a `<scheme>:` prefix is parsed by that scheme's
    /// grammar; an address without one is a local path. Prefixes with no
    /// registered registry are reported as unknown schemes.
    pub fn try_get_module_reference(&self, raw: &str) -> Result<ModuleReference> {
        let (scheme, unqualified) = match raw.split_once(':') {
            None => (Scheme::Local, raw),
            Some((prefix, rest)) => match Scheme::from_prefix(prefix) {
                Some(scheme) if self.registries.contains_key(&scheme) => (scheme, rest),
                _ => return Err(ModuleError::unknown_scheme(prefix, raw)),
            },
        };

        if !self.registries.contains_key(&scheme) {
            return Err(ModuleError::unknown_scheme(scheme.to_string(), raw));
        }

        scheme.parse(unqualified)
    }

    /// Parse every candidate, reporting failures to `sink`.
    ///
    /// Valid references are returned in input order. Each invalid candidate
    /// produces exactly one diagnostic, also in input order.
    pub fn get_valid_module_references<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a ImportCandidate>,
        sink: &mut dyn DiagnosticSink,
    ) -> Vec<ModuleReference> {
        candidates
            .into_iter()
            .filter_map(
                |candidate| match self.try_get_module_reference(&candidate.address) {
                    Ok(reference) => Some(reference),
                    Err(error) => {
                        trace!(address = %candidate.address, %error, "Invalid module reference");
                        sink.report(ModuleDiagnostic {
                            span: candidate.span,
                            error,
                        });
                        None
                    }
                },
            )
            .collect()
    }

    /// Whether the reference's content is missing locally.
    ///
    /// References whose scheme has no registry cannot be restored and
    /// report `false`.
    #[must_use]
    pub fn is_restore_required(&self, reference: &ModuleReference) -> bool {
        self.registries
            .get(&reference.scheme())
            .is_some_and(|registry| registry.is_restore_required(reference))
    }

    /// Outcome of the most recent restore of `reference`.
    #[must_use]
    pub fn restore_status(&self, reference: &ModuleReference) -> RestoreStatus {
        match self.read_results().get(reference) {
            None => RestoreStatus::Unknown,
            Some(Ok(_)) => RestoreStatus::Succeeded,
            Some(Err(_)) => RestoreStatus::Failed,
        }
    }

    /// The error recorded by the most recent failed restore of `reference`.
    #[must_use]
    pub fn restore_failure(&self, reference: &ModuleReference) -> Option<ModuleError> {
        match self.read_results().get(reference) {
            Some(Err(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Where the most recent successful restore put `reference`.
    #[must_use]
    pub fn restored_module(&self, reference: &ModuleReference) -> Option<RestoredModule> {
        match self.read_results().get(reference) {
            Some(Ok(restored)) => Some(restored.clone()),
            _ => None,
        }
    }

    /// Restore every reference that is not available locally.
    ///
    /// References are partitioned by scheme and each registry restores its
    /// share concurrently with the others. Returns `true` when at least one
    /// reference that needed restoring is now available, which is the
    /// graph builder's signal to re-derive the dependency graph.
    ///
    /// Failures are recorded, not retried; calling again with the same set
    /// re-attempts only what is still missing.
    pub async fn restore_modules(
        &self,
        references: impl IntoIterator<Item = ModuleReference>,
    ) -> bool {
        let mut seen = HashSet::new();
        let mut by_scheme: BTreeMap<Scheme, Vec<ModuleReference>> = BTreeMap::new();
        let mut failures = Vec::new();

        for reference in references {
            if !seen.insert(reference.clone()) {
                continue;
            }
            match self.registries.get(&reference.scheme()) {
                Some(registry) if registry.is_restore_required(&reference) => {
                    by_scheme
                        .entry(reference.scheme())
                        .or_default()
                        .push(reference);
                }
                Some(_) => trace!(%reference, "Module already available"),
                None => {
                    let error =
                        ModuleError::unknown_scheme(reference.scheme().to_string(), reference.to_string());
                    failures.push((reference, Err(error)));
                }
            }
        }

        if by_scheme.is_empty() && failures.is_empty() {
            return false;
        }

        info!(
            count = by_scheme.values().map(Vec::len).sum::<usize>(),
            "Restoring modules"
        );

        let batches = by_scheme.into_iter().filter_map(|(scheme, batch)| {
            self.registries.get(&scheme).map(|registry| {
                let registry = Arc::clone(registry);
                async move {
                    debug!(%scheme, count = batch.len(), "Restoring batch");
                    let mut outcomes = registry.restore_modules(&batch).await;
                    batch
                        .into_iter()
                        .map(|reference| {
                            let outcome = match outcomes.remove(&reference) {
                                Some(outcome) => outcome,
                                None if registry.is_restore_required(&reference) => {
                                    Err(ModuleError::restore_unsupported(&reference))
                                }
                                None => Ok(RestoredModule::InPlace),
                            };
                            (reference, outcome)
                        })
                        .collect::<Vec<_>>()
                }
            })
        });

        let results = join_all(batches).await;

        let mut changed = false;
        let mut recorded = self
            .restore_results
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (reference, outcome) in results.into_iter().flatten().chain(failures) {
            match &outcome {
                Ok(_) => {
                    debug!(%reference, "Module restored");
                    changed = true;
                }
                Err(error) => warn!(%reference, %error, "Module restore failed"),
            }
            recorded.insert(reference, outcome);
        }

        changed
    }

    /// Locate the compiled entry file of `reference`, imported from `parent`.
    pub fn try_get_local_entry_point(
        &self,
        parent: &Path,
        reference: &ModuleReference,
    ) -> Result<PathBuf> {
        self.registry_for(reference)?
            .try_resolve_entry_point(parent, reference)
    }

    /// Publish compiled module content to the registry owning `reference`.
    pub async fn publish_module(&self, reference: &ModuleReference, content: Bytes) -> Result<()> {
        info!(%reference, bytes = content.len(), "Publishing module");
        self.registry_for(reference)?
            .publish(reference, content)
            .await
    }

    fn registry_for(&self, reference: &ModuleReference) -> Result<&Arc<dyn ModuleRegistry>> {
        self.registries.get(&reference.scheme()).ok_or_else(|| {
            ModuleError::unknown_scheme(reference.scheme().to_string(), reference.to_string())
        })
    }

    fn read_results(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<ModuleReference, RestoreOutcome>> {
        self.restore_results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ModuleDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDispatcher")
            .field("schemes", &self.schemes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleErrorKind;
    use crate::registry::{LocalModuleRegistry, RestoreOutcomes, TemplateSpecModuleRegistry};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// OCI stand-in that "restores" by remembering references.
    #[derive(Default)]
    struct RecordingRegistry {
        available: Mutex<HashSet<ModuleReference>>,
        fail: Option<String>,
        calls: Mutex<Vec<Vec<ModuleReference>>>,
    }

    #[async_trait]
    impl ModuleRegistry for RecordingRegistry {
        fn scheme(&self) -> Scheme {
            Scheme::Oci
        }

        fn parse_reference(&self, raw: &str) -> Result<ModuleReference> {
            Scheme::Oci.parse(raw)
        }

        fn is_restore_required(&self, reference: &ModuleReference) -> bool {
            !self.available.lock().unwrap().contains(reference)
        }

        async fn restore_modules(&self, references: &[ModuleReference]) -> RestoreOutcomes {
            self.calls.lock().unwrap().push(references.to_vec());
            references
                .iter()
                .map(|reference| {
                    let outcome = match &self.fail {
                        Some(detail) => Err(ModuleError::restore_failed(reference, detail.clone())),
                        None => {
                            self.available.lock().unwrap().insert(reference.clone());
                            Ok(RestoredModule::Cached {
                                digest: "sha256:abc".to_string(),
                                directory: PathBuf::from("/cache/abc"),
                            })
                        }
                    };
                    (reference.clone(), outcome)
                })
                .collect()
        }

        fn try_resolve_entry_point(
            &self,
            _parent: &Path,
            _reference: &ModuleReference,
        ) -> Result<PathBuf> {
            Ok(PathBuf::from("/cache/abc/main.json"))
        }

        async fn publish(&self, _reference: &ModuleReference, _content: Bytes) -> Result<()> {
            Ok(())
        }
    }

    fn dispatcher_with(oci: Arc<RecordingRegistry>) -> ModuleDispatcher {
        let registries: Vec<Arc<dyn ModuleRegistry>> = vec![
            Arc::new(LocalModuleRegistry::new()) as Arc<dyn ModuleRegistry>,
            Arc::new(TemplateSpecModuleRegistry::new()),
            oci,
        ];
        ModuleDispatcher::new(&registries)
    }

    fn local_only() -> ModuleDispatcher {
        let registries: Vec<Arc<dyn ModuleRegistry>> =
            vec![Arc::new(LocalModuleRegistry::new()) as Arc<dyn ModuleRegistry>];
        ModuleDispatcher::new(&registries)
    }

    #[test]
    fn test_routes_by_prefix() {
        let dispatcher = dispatcher_with(Arc::default());

        let r = dispatcher.try_get_module_reference("oci:host.io/repo:v1").unwrap();
        assert_eq!(r.scheme(), Scheme::Oci);

        let r = dispatcher.try_get_module_reference("ts:rg/spec:v1").unwrap();
        assert_eq!(r.scheme(), Scheme::TemplateSpec);

        let r = dispatcher.try_get_module_reference("modules/a.arm").unwrap();
        assert_eq!(r.scheme(), Scheme::Local);
    }

    #[test]
    fn test_unknown_prefix() {
        let dispatcher = dispatcher_with(Arc::default());
        let err = dispatcher.try_get_module_reference("git:repo/x:v1").unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::UnknownScheme);
    }

    #[test]
    fn test_unregistered_scheme_is_unknown() {
        let dispatcher = local_only();
        for raw in ["oci:host.io/repo:v1", "ts:rg/spec:v1"] {
            let err = dispatcher.try_get_module_reference(raw).unwrap_err();
            assert_eq!(err.kind(), ModuleErrorKind::UnknownScheme, "{raw}");
        }
        assert!(dispatcher.try_get_module_reference("a.arm").is_ok());
    }

    #[test]
    fn test_invalid_reference_for_known_scheme() {
        let dispatcher = dispatcher_with(Arc::default());
        let err = dispatcher.try_get_module_reference("ts:rg/spec").unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::InvalidReference);
    }

    #[test]
    fn test_valid_references_keep_order_and_report_failures() {
        let dispatcher = dispatcher_with(Arc::default());
        let candidates = vec![
            ImportCandidate::new("a.arm", (0, 5)),
            ImportCandidate::new("ts:bad", (10, 6)),
            ImportCandidate::new("oci:host.io/repo:v1", (20, 19)),
            ImportCandidate::new("nope:x", (40, 6)),
            ImportCandidate::new("/abs.arm", (50, 8)),
        ];
        let mut diagnostics = Vec::new();

        let references = dispatcher.get_valid_module_references(&candidates, &mut diagnostics);

        let rendered: Vec<_> = references.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["a.arm", "oci:host.io/repo:v1"]);

        let offsets: Vec<_> = diagnostics.iter().map(|d| d.span.offset()).collect();
        assert_eq!(offsets, vec![10, 40, 50]);
        assert_eq!(diagnostics[0].error.kind(), ModuleErrorKind::InvalidReference);
        assert_eq!(diagnostics[1].error.kind(), ModuleErrorKind::UnknownScheme);
        assert_eq!(diagnostics[2].error.kind(), ModuleErrorKind::InvalidReference);
    }

    #[tokio::test]
    async fn test_restore_reports_change_once() {
        let oci = Arc::new(RecordingRegistry::default());
        let dispatcher = dispatcher_with(Arc::clone(&oci));
        let reference = dispatcher.try_get_module_reference("oci:host.io/repo:v1").unwrap();

        assert!(dispatcher.is_restore_required(&reference));
        assert_eq!(dispatcher.restore_status(&reference), RestoreStatus::Unknown);

        assert!(dispatcher.restore_modules([reference.clone()]).await);
        assert!(!dispatcher.is_restore_required(&reference));
        assert_eq!(dispatcher.restore_status(&reference), RestoreStatus::Succeeded);
        assert!(matches!(
            dispatcher.restored_module(&reference),
            Some(RestoredModule::Cached { .. })
        ));

        assert!(!dispatcher.restore_modules([reference.clone()]).await);
        assert_eq!(oci.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_dedupes_and_partitions() {
        let oci = Arc::new(RecordingRegistry::default());
        let dispatcher = dispatcher_with(Arc::clone(&oci));
        let references: Vec<_> = [
            "oci:host.io/repo:v1",
            "oci:HOST.io/repo:v1",
            "a.arm",
            "ts:rg/spec:v1",
        ]
        .into_iter()
        .map(|raw| dispatcher.try_get_module_reference(raw).unwrap())
        .collect();

        assert!(dispatcher.restore_modules(references).await);

        let calls = oci.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
    }

    #[tokio::test]
    async fn test_restore_records_failures() {
        let oci = Arc::new(RecordingRegistry {
            fail: Some("connection refused".to_string()),
            ..Default::default()
        });
        let dispatcher = dispatcher_with(oci);
        let reference = dispatcher.try_get_module_reference("oci:host.io/repo:v1").unwrap();

        assert!(!dispatcher.restore_modules([reference.clone()]).await);
        assert_eq!(dispatcher.restore_status(&reference), RestoreStatus::Failed);

        let failure = dispatcher.restore_failure(&reference).unwrap();
        assert_eq!(failure.kind(), ModuleErrorKind::ModuleRestoreFailed);
        assert!(failure.to_string().contains("connection refused"));
        assert!(dispatcher.is_restore_required(&reference));
    }

    #[tokio::test]
    async fn test_template_spec_restore_is_a_no_op() {
        let oci = Arc::new(RecordingRegistry::default());
        let dispatcher = dispatcher_with(Arc::clone(&oci));
        let reference = dispatcher
            .try_get_module_reference("ts:11111111-2222-3333-4444-555555555555/myRG/myTemplateSpec:v1")
            .unwrap();

        assert!(!dispatcher.is_restore_required(&reference));
        assert!(!dispatcher.restore_modules([reference.clone()]).await);
        assert!(dispatcher.restore_failure(&reference).is_none());
        assert!(oci.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_routes_to_owner() {
        let dispatcher = dispatcher_with(Arc::default());
        let oci = dispatcher.try_get_module_reference("oci:host.io/repo:v1").unwrap();
        assert!(dispatcher.publish_module(&oci, Bytes::new()).await.is_ok());

        let local = dispatcher.try_get_module_reference("a.arm").unwrap();
        let err = dispatcher.publish_module(&local, Bytes::new()).await.unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::PublishUnsupported);
    }

    #[tokio::test]
    async fn test_unregistered_scheme_operations_fail_softly() {
        let dispatcher = local_only();
        let reference = Scheme::Oci.parse("host.io/repo:v1").unwrap();

        assert!(!dispatcher.is_restore_required(&reference));
        assert!(!dispatcher.restore_modules([reference.clone()]).await);
        assert_eq!(
            dispatcher.restore_failure(&reference).unwrap().kind(),
            ModuleErrorKind::UnknownScheme
        );

        let err = dispatcher
            .try_get_local_entry_point(Path::new("/main.arm"), &reference)
            .unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::UnknownScheme);
    }

    #[test]
    fn test_entry_point_routes_to_local() {
        let dispatcher = local_only();
        let reference = dispatcher.try_get_module_reference("mods/a.arm").unwrap();
        let entry = dispatcher
            .try_get_local_entry_point(Path::new("/src/main.arm"), &reference)
            .unwrap();
        assert_eq!(entry, Path::new("/src/mods/a.arm"));
    }
}
