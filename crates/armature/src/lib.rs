//! Module resolution for armature infrastructure templates.
//!
//! This is the crate hosts depend on. It ties the scheme-agnostic
//! dispatcher from `armature-modules` to concrete registries, reads
//! resolver configuration, and sets up tracing.
//!
//! # Example
//!
//! ```ignore
//! use armature::{Config, DefaultRegistryProvider, ImportCandidate};
//!
//! let config = Config::load(None)?;
//! let dispatcher = DefaultRegistryProvider::new(&config).dispatcher();
//!
//! let mut diagnostics = Vec::new();
//! let references = dispatcher.get_valid_module_references(&candidates, &mut diagnostics);
//! dispatcher.restore_modules(references.iter().cloned()).await;
//!
//! for reference in &references {
//!     if let Some(error) = dispatcher.restore_failure(reference) {
//!         eprintln!("{reference}: {error}");
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
mod error;
mod provider;
pub mod tracing;

pub use config::{Config, Credentials};
pub use error::{Error, Result};
pub use provider::DefaultRegistryProvider;

pub use armature_modules::{
    DiagnosticSink, ImportCandidate, ModuleDiagnostic, ModuleDispatcher, ModuleError,
    ModuleErrorKind, ModuleReference, ModuleRegistry, RegistryProvider, RestoreStatus,
    RestoredModule, Scheme,
};
