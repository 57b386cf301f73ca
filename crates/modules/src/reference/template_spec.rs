//! Template spec references (`ts:` scheme).

use regex::Regex;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;
use uuid::Uuid;

use super::{Scheme, eq_ignore_case, hash_ignore_case};
use crate::error::{ModuleError, Result};

// A resource group name cannot end with a period.
#[allow(clippy::expect_used)]
static RESOURCE_GROUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-\w._()]{1,89}[-\w_()]$").expect("resource group pattern compiles")
});

#[allow(clippy::expect_used)]
static TEMPLATE_SPEC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-\w._()]{1,90}$").expect("template spec pattern compiles"));

/// Whether `value` is a GUID in hyphenated, simple, braced or parenthesized form.
fn is_guid(value: &str) -> bool {
    match value.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => !inner.starts_with('{') && Uuid::try_parse(inner).is_ok(),
        None => Uuid::try_parse(value).is_ok(),
    }
}

/// A reference to a versioned template spec resource.
///
/// With a subscription the reference is fully qualified; without one it
/// resolves against the subscription of the deployment that consumes it.
/// All fields compare case-insensitively, but the original casing is kept
/// for display.
#[derive(Debug, Clone)]
pub struct TemplateSpecReference {
    subscription_id: Option<String>,
    resource_group_name: String,
    template_spec_name: String,
    version: String,
}

impl TemplateSpecReference {
    /// Parse `[<subscription>/]<resource group>/<name>:<version>`.
    ///
    /// Every failed check reports the same invalid reference error carrying
    /// the raw input.
    pub fn try_parse(raw: &str) -> Result<Self> {
        let invalid = || ModuleError::invalid_reference(Scheme::TemplateSpec, raw);

        let (address, version) = match raw.split(':').collect::<Vec<_>>().as_slice() {
            [address, version] => (*address, *version),
            _ => return Err(invalid()),
        };

        let (subscription_id, resource_group_name, template_spec_name) =
            match address.split('/').collect::<Vec<_>>().as_slice() {
                [subscription, group, name] => (Some(*subscription), *group, *name),
                [group, name] => (None, *group, *name),
                _ => return Err(invalid()),
            };

        if subscription_id.is_some_and(|id| !is_guid(id))
            || !RESOURCE_GROUP_NAME.is_match(resource_group_name)
            || !TEMPLATE_SPEC_NAME.is_match(template_spec_name)
            || !TEMPLATE_SPEC_NAME.is_match(version)
        {
            return Err(invalid());
        }

        Ok(Self {
            subscription_id: subscription_id.map(str::to_string),
            resource_group_name: resource_group_name.to_string(),
            template_spec_name: template_spec_name.to_string(),
            version: version.to_string(),
        })
    }

    /// Subscription GUID as written, if fully qualified.
    #[must_use]
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    /// Resource group name as written.
    #[must_use]
    pub fn resource_group_name(&self) -> &str {
        &self.resource_group_name
    }

    /// Template spec name as written.
    #[must_use]
    pub fn template_spec_name(&self) -> &str {
        &self.template_spec_name
    }

    /// Version as written.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether the reference names its subscription.
    #[must_use]
    pub fn is_fully_qualified(&self) -> bool {
        self.subscription_id.is_some()
    }

    /// The address without the `ts:` prefix, in original casing.
    #[must_use]
    pub fn unqualified_reference(&self) -> String {
        match &self.subscription_id {
            Some(subscription) => format!(
                "{subscription}/{}/{}:{}",
                self.resource_group_name, self.template_spec_name, self.version
            ),
            None => format!(
                "{}/{}:{}",
                self.resource_group_name, self.template_spec_name, self.version
            ),
        }
    }
}

impl PartialEq for TemplateSpecReference {
    fn eq(&self, other: &Self) -> bool {
        let subscriptions_match = match (&self.subscription_id, &other.subscription_id) {
            (Some(a), Some(b)) => eq_ignore_case(a, b),
            (None, None) => true,
            _ => false,
        };

        subscriptions_match
            && eq_ignore_case(&self.resource_group_name, &other.resource_group_name)
            && eq_ignore_case(&self.template_spec_name, &other.template_spec_name)
            && eq_ignore_case(&self.version, &other.version)
    }
}

impl Eq for TemplateSpecReference {}

impl Hash for TemplateSpecReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.subscription_id {
            Some(subscription) => {
                state.write_u8(1);
                hash_ignore_case(subscription, state);
            }
            None => state.write_u8(0),
        }
        hash_ignore_case(&self.resource_group_name, state);
        hash_ignore_case(&self.template_spec_name, state);
        hash_ignore_case(&self.version, state);
    }
}
