//! Local file references (no scheme prefix).

use super::Scheme;
use crate::error::{ModuleError, ReferenceFault, Result};

const FORBIDDEN_CHARACTERS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// A module file addressed relative to the file that imports it.
///
/// Paths use `/` separators regardless of platform and compare exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalModuleReference {
    path: String,
}

impl LocalModuleReference {
    /// Validate a relative module path.
    pub fn try_parse(raw: &str) -> Result<Self> {
        let fail = |fault| ModuleError::invalid_reference_with(Scheme::Local, raw, fault);

        if raw.is_empty() {
            return Err(fail(ReferenceFault::EmptyPath));
        }
        if raw.contains('\\') {
            return Err(fail(ReferenceFault::BackSlash));
        }
        if raw.starts_with('/') {
            return Err(fail(ReferenceFault::AbsolutePath));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| FORBIDDEN_CHARACTERS.contains(c) || c.is_control())
        {
            return Err(fail(ReferenceFault::ForbiddenCharacter(c)));
        }
        if raw.ends_with('/') {
            return Err(fail(ReferenceFault::TrailingSeparator));
        }
        if raw.ends_with('.') || raw.ends_with(' ') {
            return Err(fail(ReferenceFault::TrailingDotOrSpace));
        }

        Ok(Self {
            path: raw.to_string(),
        })
    }

    /// The relative path as written.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault_of(raw: &str) -> Option<ReferenceFault> {
        match LocalModuleReference::try_parse(raw) {
            Err(ModuleError::InvalidReference { fault, .. }) => fault,
            other => panic!("expected invalid reference for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_relative_paths() {
        for raw in ["main.arm", "modules/net.arm", "../shared/storage.arm", "./a b.arm"] {
            let r = LocalModuleReference::try_parse(raw).unwrap();
            assert_eq!(r.path(), raw);
        }
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert_eq!(fault_of(""), Some(ReferenceFault::EmptyPath));
        assert_eq!(fault_of("/etc/main.arm"), Some(ReferenceFault::AbsolutePath));
        assert_eq!(fault_of("modules\\net.arm"), Some(ReferenceFault::BackSlash));
        assert_eq!(fault_of("mod?.arm"), Some(ReferenceFault::ForbiddenCharacter('?')));
        assert_eq!(fault_of("mod\u{7}.arm"), Some(ReferenceFault::ForbiddenCharacter('\u{7}')));
        assert_eq!(fault_of("modules/"), Some(ReferenceFault::TrailingSeparator));
        assert_eq!(fault_of("main.arm."), Some(ReferenceFault::TrailingDotOrSpace));
        assert_eq!(fault_of("main.arm "), Some(ReferenceFault::TrailingDotOrSpace));
    }

    #[test]
    fn test_equality_is_case_sensitive() {
        let a = LocalModuleReference::try_parse("Main.arm").unwrap();
        let b = LocalModuleReference::try_parse("main.arm").unwrap();
        assert_ne!(a, b);
    }
}
