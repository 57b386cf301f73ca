//! End-to-end module resolution through the default registry set.

use armature::{
    Config, DefaultRegistryProvider, ImportCandidate, ModuleDiagnostic, ModuleErrorKind,
    RestoreStatus, RestoredModule, Scheme,
};
use armature_registry_oci::testing::{InMemoryBlobClient, MockClientFactory};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config(cache: &TempDir) -> Config {
    Config {
        cache_dir: cache.path().to_path_buf(),
        ..Config::default()
    }
}

fn provider(cache: &TempDir, factory: MockClientFactory) -> DefaultRegistryProvider {
    DefaultRegistryProvider::with_client_factory(&config(cache), Arc::new(factory))
}

#[tokio::test]
async fn template_spec_reference_parses_but_never_restores() {
    let cache = TempDir::new().unwrap();
    let dispatcher = provider(&cache, MockClientFactory::new()).dispatcher();

    let reference = dispatcher
        .try_get_module_reference("ts:00000000-0000-0000-0000-000000000000/myRG/mySpec:v1")
        .unwrap();
    assert_eq!(reference.scheme(), Scheme::TemplateSpec);
    assert!(!dispatcher.is_restore_required(&reference));

    assert!(!dispatcher.restore_modules([reference.clone()]).await);
    assert_eq!(dispatcher.restore_status(&reference), RestoreStatus::Unknown);
}

#[tokio::test]
async fn oci_reference_restores_into_cache() {
    let cache = TempDir::new().unwrap();
    let remote = Arc::new(InMemoryBlobClient::new());
    let digest = remote.push_module("v2", Bytes::from_static(b"{\"resources\":[]}"));
    let dispatcher = provider(
        &cache,
        MockClientFactory::new().with_client(
            "myregistry.example.com",
            "myrepo",
            Arc::clone(&remote),
        ),
    )
    .dispatcher();

    let reference = dispatcher
        .try_get_module_reference("oci:myregistry.example.com/myrepo:v2")
        .unwrap();
    assert!(dispatcher.is_restore_required(&reference));

    assert!(dispatcher.restore_modules([reference.clone()]).await);
    assert_eq!(dispatcher.restore_status(&reference), RestoreStatus::Succeeded);
    assert!(!dispatcher.is_restore_required(&reference));

    let Some(RestoredModule::Cached { digest: got, .. }) = dispatcher.restored_module(&reference)
    else {
        panic!("expected a cached module");
    };
    assert_eq!(got, digest);

    let entry = dispatcher
        .try_get_local_entry_point(Path::new("/src/main.arm"), &reference)
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(entry).unwrap(),
        "{\"resources\":[]}"
    );
}

#[tokio::test]
async fn second_restore_is_a_no_op() {
    let cache = TempDir::new().unwrap();
    let remote = Arc::new(InMemoryBlobClient::new());
    remote.push_module("v1", Bytes::from_static(b"{}"));
    let dispatcher = provider(
        &cache,
        MockClientFactory::new().with_client("cr.example.com", "net", Arc::clone(&remote)),
    )
    .dispatcher();
    let reference = dispatcher
        .try_get_module_reference("oci:cr.example.com/net:v1")
        .unwrap();

    assert!(dispatcher.restore_modules([reference.clone()]).await);
    assert!(!dispatcher.restore_modules([reference.clone()]).await);
    assert_eq!(remote.manifest_pulls(), 1);
    assert_eq!(remote.blob_pulls(), 1);
}

#[tokio::test]
async fn references_sharing_a_digest_fetch_once() {
    let cache = TempDir::new().unwrap();
    let remote = Arc::new(InMemoryBlobClient::new());
    let digest = remote.push_module("v1", Bytes::from_static(b"{}"));
    let dispatcher = provider(
        &cache,
        MockClientFactory::new().with_client("cr.example.com", "net", Arc::clone(&remote)),
    )
    .dispatcher();

    let mut diagnostics: Vec<ModuleDiagnostic> = Vec::new();
    let candidates = [
        ImportCandidate::new("oci:cr.example.com/net:v1", (0, 25)),
        ImportCandidate::new(format!("oci:cr.example.com/net@{digest}"), (40, 90)),
        ImportCandidate::new("oci:CR.EXAMPLE.COM/net:v1", (100, 25)),
    ];
    let references = dispatcher.get_valid_module_references(&candidates, &mut diagnostics);
    assert!(diagnostics.is_empty());
    // Registry host casing does not distinguish references.
    assert_eq!(references[0], references[2]);

    assert!(dispatcher.restore_modules(references.iter().cloned()).await);
    for reference in &references {
        assert_eq!(dispatcher.restore_status(reference), RestoreStatus::Succeeded);
    }
    assert_eq!(remote.blob_pulls(), 1);
}

#[tokio::test]
async fn invalid_addresses_become_diagnostics() {
    let cache = TempDir::new().unwrap();
    let dispatcher = provider(&cache, MockClientFactory::new()).dispatcher();

    let mut diagnostics: Vec<ModuleDiagnostic> = Vec::new();
    let candidates = [
        ImportCandidate::new("modules/net.arm", (0, 15)),
        ImportCandidate::new("git:github.com/org/repo", (20, 23)),
        ImportCandidate::new("/abs/path.arm", (50, 13)),
        ImportCandidate::new("ts:no-version", (70, 13)),
    ];
    let references = dispatcher.get_valid_module_references(&candidates, &mut diagnostics);

    assert_eq!(references.len(), 1);
    assert_eq!(references[0].scheme(), Scheme::Local);

    let kinds: Vec<_> = diagnostics.iter().map(|d| d.error.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ModuleErrorKind::UnknownScheme,
            ModuleErrorKind::InvalidReference,
            ModuleErrorKind::InvalidReference,
        ]
    );
    assert_eq!(diagnostics[0].span.offset(), 20);
}

#[tokio::test]
async fn restore_failure_is_recorded_per_reference() {
    let cache = TempDir::new().unwrap();
    let remote = Arc::new(InMemoryBlobClient::new());
    let actual = remote.push_module("v1", Bytes::from_static(b"{}"));
    let requested = format!("sha256:{}", "a".repeat(64));
    remote.redirect_digest(requested.clone(), actual);
    let dispatcher = provider(
        &cache,
        MockClientFactory::new().with_client("cr.example.com", "net", Arc::clone(&remote)),
    )
    .dispatcher();

    let tampered = dispatcher
        .try_get_module_reference(&format!("oci:cr.example.com/net@{requested}"))
        .unwrap();
    let missing = dispatcher
        .try_get_module_reference("oci:cr.example.com/other:v1")
        .unwrap();

    assert!(!dispatcher.restore_modules([tampered.clone(), missing.clone()]).await);

    let error = dispatcher.restore_failure(&tampered).unwrap();
    assert_eq!(error.kind(), ModuleErrorKind::ModuleRestoreFailed);
    assert!(error.to_string().contains("digest mismatch"));

    assert_eq!(dispatcher.restore_status(&missing), RestoreStatus::Failed);
    assert!(dispatcher.is_restore_required(&tampered));
}

#[tokio::test]
async fn publish_then_restore() {
    let cache = TempDir::new().unwrap();
    let remote = Arc::new(InMemoryBlobClient::new());
    let dispatcher = provider(
        &cache,
        MockClientFactory::new().with_client("cr.example.com", "storage", Arc::clone(&remote)),
    )
    .dispatcher();
    let reference = dispatcher
        .try_get_module_reference("oci:cr.example.com/storage:v1")
        .unwrap();

    dispatcher
        .publish_module(&reference, Bytes::from_static(b"{\"published\":true}"))
        .await
        .unwrap();
    assert!(remote.tag_digest("v1").is_some());

    assert!(dispatcher.restore_modules([reference.clone()]).await);
    let entry = dispatcher
        .try_get_local_entry_point(Path::new("main.arm"), &reference)
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(entry).unwrap(),
        "{\"published\":true}"
    );
}

#[tokio::test]
async fn publish_unsupported_for_local_and_template_specs() {
    let cache = TempDir::new().unwrap();
    let dispatcher = provider(&cache, MockClientFactory::new()).dispatcher();

    for raw in ["modules/net.arm", "ts:myRG/mySpec:v1"] {
        let reference = dispatcher.try_get_module_reference(raw).unwrap();
        let err = dispatcher
            .publish_module(&reference, Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::PublishUnsupported, "{raw}");
    }
}

#[test]
fn disabled_registries_reject_remote_schemes() {
    let cache = TempDir::new().unwrap();
    let config = Config {
        registry_enabled: false,
        ..config(&cache)
    };
    let dispatcher =
        DefaultRegistryProvider::with_client_factory(&config, Arc::new(MockClientFactory::new()))
            .dispatcher();

    for raw in ["oci:cr.example.com/net:v1", "ts:myRG/mySpec:v1"] {
        let err = dispatcher.try_get_module_reference(raw).unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::UnknownScheme, "{raw}");
    }
    assert!(dispatcher.try_get_module_reference("modules/net.arm").is_ok());
}

#[test]
fn environment_overrides_config_file() {
    let cache = TempDir::new().unwrap();
    let file = cache.path().join("armature.toml");
    std::fs::write(&file, "registryEnabled = true\ncacheDir = \"/from/file\"\n").unwrap();

    temp_env::with_vars(
        [
            ("ARMATURE_REGISTRY_ENABLED", Some("off")),
            ("ARMATURE_CACHE_DIR", Some("/from/env")),
        ],
        || {
            let config = Config::load(Some(file.as_path())).unwrap();
            assert!(!config.registry_enabled);
            assert_eq!(config.cache_dir, Path::new("/from/env"));
        },
    );

    temp_env::with_vars([("ARMATURE_REGISTRY_ENABLED", Some("sometimes"))], || {
        let err = Config::load(Some(file.as_path())).unwrap_err();
        assert!(matches!(err, armature::Error::Configuration { .. }));
    });

    temp_env::with_vars_unset(["ARMATURE_REGISTRY_ENABLED", "ARMATURE_CACHE_DIR"], || {
        let missing = Config::load(Some(cache.path().join("absent.toml").as_path())).unwrap_err();
        assert!(matches!(missing, armature::Error::Io { .. }));
    });
}
