//! Module dependency resolution for armature templates.
//!
//! This crate provides functionality to:
//! - Parse `import` addresses into typed [`ModuleReference`]s
//! - Route references to the [`ModuleRegistry`] owning their scheme
//! - Restore missing modules and record per-reference failures
//! - Publish compiled modules to registries that accept them
//!
//! # Example
//!
//! ```ignore
//! use armature_modules::{ImportCandidate, ModuleDispatcher};
//!
//! let dispatcher = ModuleDispatcher::new(&provider);
//! let mut diagnostics = Vec::new();
//! let references = dispatcher.get_valid_module_references(&candidates, &mut diagnostics);
//!
//! while dispatcher.restore_modules(references.iter().cloned()).await {
//!     // rebuild the graph; new imports may have appeared
//! }
//! ```

#![warn(missing_docs)]

mod diagnostics;
mod dispatcher;
mod error;
pub mod reference;
pub mod registry;

pub use diagnostics::{DiagnosticSink, ImportCandidate, ModuleDiagnostic};
pub use dispatcher::{ModuleDispatcher, RestoreStatus};
pub use error::{ModuleError, ModuleErrorKind, ReferenceFault, Result};
pub use reference::{
    LocalModuleReference, ModuleReference, OciArtifactReference, OciArtifactTarget, Scheme,
    TemplateSpecReference,
};
pub use registry::{
    LocalModuleRegistry, ModuleRegistry, RegistryProvider, RestoreOutcome, RestoreOutcomes,
    RestoredModule, TemplateSpecModuleRegistry,
};
