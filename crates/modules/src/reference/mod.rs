//! Typed module references.
//!
//! A raw `import` address is parsed into a [`ModuleReference`], a closed
//! union with one variant per addressing scheme:
//!
//! - [`OciArtifactReference`] - `oci:<registry>/<repository>:<tag>` or `@<digest>`
//! - [`TemplateSpecReference`] - `ts:[<subscription>/]<group>/<name>:<version>`
//! - [`LocalModuleReference`] - a bare relative path
//!
//! References are immutable values. Each variant defines its own identity
//! rules, and hashing always agrees with equality so references can key
//! the dispatcher's maps.

mod local;
mod oci;
mod template_spec;

use std::fmt;
use std::hash::Hasher;

pub use local::LocalModuleReference;
pub use oci::{OciArtifactReference, OciArtifactTarget};
pub use template_spec::TemplateSpecReference;

use crate::error::Result;

/// Addressing family of a module reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    /// Unprefixed relative path.
    Local,
    /// OCI artifact registry (`oci:`).
    Oci,
    /// Versioned template spec resource (`ts:`).
    TemplateSpec,
}

impl Scheme {
    /// Schemes written with an explicit prefix.
    pub const PREFIXED: [Self; 2] = [Self::Oci, Self::TemplateSpec];

    /// The address prefix, or `None` for local paths.
    #[must_use]
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Local => None,
            Self::Oci => Some("oci"),
            Self::TemplateSpec => Some("ts"),
        }
    }

    /// Look up a scheme by its prefix. Prefixes are case-sensitive.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::PREFIXED
            .into_iter()
            .find(|scheme| scheme.prefix() == Some(prefix))
    }

    /// Render an unqualified address with this scheme's prefix.
    #[must_use]
    pub fn qualify(self, unqualified: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{prefix}:{unqualified}"),
            None => unqualified.to_string(),
        }
    }

    /// Parse an unqualified address with this scheme's grammar.
    pub fn parse(self, unqualified: &str) -> Result<ModuleReference> {
        match self {
            Self::Local => LocalModuleReference::try_parse(unqualified).map(ModuleReference::Local),
            Self::Oci => OciArtifactReference::try_parse(unqualified).map(ModuleReference::Oci),
            Self::TemplateSpec => {
                TemplateSpecReference::try_parse(unqualified).map(ModuleReference::TemplateSpec)
            }
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().unwrap_or("local"))
    }
}

/// A parsed module address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleReference {
    /// Artifact in an OCI registry.
    Oci(OciArtifactReference),
    /// Template spec resource.
    TemplateSpec(TemplateSpecReference),
    /// File relative to the referencing file.
    Local(LocalModuleReference),
}

impl ModuleReference {
    /// The scheme this reference belongs to.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Oci(_) => Scheme::Oci,
            Self::TemplateSpec(_) => Scheme::TemplateSpec,
            Self::Local(_) => Scheme::Local,
        }
    }

    /// The address without its scheme prefix.
    ///
    /// Re-parsing this string with the same scheme yields an equal reference.
    #[must_use]
    pub fn unqualified_reference(&self) -> String {
        match self {
            Self::Oci(r) => r.unqualified_reference(),
            Self::TemplateSpec(r) => r.unqualified_reference(),
            Self::Local(r) => r.path().to_string(),
        }
    }

    /// The OCI reference, if this is one.
    #[must_use]
    pub fn as_oci(&self) -> Option<&OciArtifactReference> {
        match self {
            Self::Oci(r) => Some(r),
            _ => None,
        }
    }

    /// The template spec reference, if this is one.
    #[must_use]
    pub fn as_template_spec(&self) -> Option<&TemplateSpecReference> {
        match self {
            Self::TemplateSpec(r) => Some(r),
            _ => None,
        }
    }

    /// The local reference, if this is one.
    #[must_use]
    pub fn as_local(&self) -> Option<&LocalModuleReference> {
        match self {
            Self::Local(r) => Some(r),
            _ => None,
        }
    }

    /// The OCI reference.
    ///
    /// # Panics
    ///
    /// When the reference belongs to another scheme. Backends call this on
    /// input the dispatcher routed to them, so a mismatch is a routing bug.
    #[must_use]
    pub fn expect_oci(&self) -> &OciArtifactReference {
        self.as_oci()
            .unwrap_or_else(|| misrouted(Scheme::Oci, self))
    }

    /// The local reference.
    ///
    /// # Panics
    ///
    /// When the reference belongs to another scheme.
    #[must_use]
    pub fn expect_local(&self) -> &LocalModuleReference {
        self.as_local()
            .unwrap_or_else(|| misrouted(Scheme::Local, self))
    }

    /// Check that the reference belongs to `scheme`.
    ///
    /// # Panics
    ///
    /// When the reference belongs to another scheme.
    pub fn assert_scheme(&self, scheme: Scheme) {
        if self.scheme() != scheme {
            misrouted(scheme, self);
        }
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scheme().qualify(&self.unqualified_reference()))
    }
}

impl From<OciArtifactReference> for ModuleReference {
    fn from(reference: OciArtifactReference) -> Self {
        Self::Oci(reference)
    }
}

impl From<TemplateSpecReference> for ModuleReference {
    fn from(reference: TemplateSpecReference) -> Self {
        Self::TemplateSpec(reference)
    }
}

impl From<LocalModuleReference> for ModuleReference {
    fn from(reference: LocalModuleReference) -> Self {
        Self::Local(reference)
    }
}

#[allow(clippy::panic)]
fn misrouted(expected: Scheme, reference: &ModuleReference) -> ! {
    panic!(
        "{expected} registry was handed '{reference}', which belongs to the {} scheme",
        reference.scheme()
    )
}

/// Case-insensitive string equality using simple lowercase folding.
pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Hash a string with the same folding as [`eq_ignore_case`].
pub(crate) fn hash_ignore_case<H: Hasher>(value: &str, state: &mut H) {
    for c in value.chars().flat_map(char::to_lowercase) {
        state.write_u32(u32::from(c));
    }
    // Terminator keeps ("ab", "c") and ("a", "bc") apart.
    state.write_u8(0xff);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_prefixes() {
        assert_eq!(Scheme::from_prefix("oci"), Some(Scheme::Oci));
        assert_eq!(Scheme::from_prefix("ts"), Some(Scheme::TemplateSpec));
        assert_eq!(Scheme::from_prefix("OCI"), None);
        assert_eq!(Scheme::from_prefix(""), None);
        assert_eq!(Scheme::Local.prefix(), None);
    }

    #[test]
    fn test_scheme_qualify() {
        assert_eq!(Scheme::Oci.qualify("a.io/b:c"), "oci:a.io/b:c");
        assert_eq!(Scheme::Local.qualify("mod.arm"), "mod.arm");
    }

    #[test]
    fn test_display_is_fully_qualified() {
        let reference = Scheme::TemplateSpec.parse("rg/spec:v1").unwrap();
        assert_eq!(reference.to_string(), "ts:rg/spec:v1");

        let reference = Scheme::Local.parse("modules/net.arm").unwrap();
        assert_eq!(reference.to_string(), "modules/net.arm");
    }

    #[test]
    fn test_eq_ignore_case_unicode() {
        assert!(eq_ignore_case("ÄBC", "äbc"));
        assert!(!eq_ignore_case("abc", "abd"));
        assert!(!eq_ignore_case("ab", "abc"));
    }

    #[test]
    fn test_variant_accessors() {
        let reference = Scheme::Oci.parse("example.com/repo:v1").unwrap();
        assert!(reference.as_oci().is_some());
        assert!(reference.as_local().is_none());
        assert!(reference.as_template_spec().is_none());
        assert_eq!(reference.expect_oci().repository(), "repo");
    }

    #[test]
    #[should_panic(expected = "belongs to the ts scheme")]
    fn test_expect_oci_panics_on_other_scheme() {
        let reference = Scheme::TemplateSpec.parse("rg/spec:v1").unwrap();
        let _ = reference.expect_oci();
    }

    #[test]
    #[should_panic(expected = "oci registry was handed 'modules/net.arm'")]
    fn test_assert_scheme_panics_on_other_scheme() {
        let reference = Scheme::Local.parse("modules/net.arm").unwrap();
        reference.assert_scheme(Scheme::Local);
        reference.assert_scheme(Scheme::Oci);
    }
}
