//! Service identity and tenancy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace used when an entry or request leaves it empty.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Partition used when an entry or request leaves it empty.
pub const DEFAULT_PARTITION: &str = "default";

/// Namespace and partition an entry or service lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnterpriseMeta {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub partition: String,
}

impl EnterpriseMeta {
    pub fn new(namespace: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            partition: partition.into(),
        }
    }

    pub fn namespace_or_default(&self) -> &str {
        or_default(&self.namespace, DEFAULT_NAMESPACE)
    }

    pub fn partition_or_default(&self) -> &str {
        or_default(&self.partition, DEFAULT_PARTITION)
    }

    /// Copy with empty fields replaced by their defaults.
    pub fn normalized(&self) -> Self {
        Self::new(self.namespace_or_default(), self.partition_or_default())
    }
}

impl Default for EnterpriseMeta {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE, DEFAULT_PARTITION)
    }
}

/// Supplies the tenancy the compiler evaluates the root service in.
///
/// Single-tenant deployments always resolve to the default namespace and
/// partition; see [`DefaultEnterpriseMeta`].
pub trait EnterpriseMetaProvider: fmt::Debug {
    fn enterprise_meta(&self) -> EnterpriseMeta;
}

/// Provider that always returns `default/default`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEnterpriseMeta;

impl EnterpriseMetaProvider for DefaultEnterpriseMeta {
    fn enterprise_meta(&self) -> EnterpriseMeta {
        EnterpriseMeta::default()
    }
}

/// Logical service identity: `(name, namespace, partition)`.
///
/// Namespace and partition are normalized on construction so that an
/// empty field and an explicit `"default"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceID {
    pub name: String,
    pub namespace: String,
    pub partition: String,
}

impl ServiceID {
    pub fn new(name: impl Into<String>, meta: &EnterpriseMeta) -> Self {
        Self {
            name: name.into(),
            namespace: meta.namespace_or_default().to_string(),
            partition: meta.partition_or_default().to_string(),
        }
    }

    /// Service in the default namespace and partition.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, &EnterpriseMeta::default())
    }

    pub fn enterprise_meta(&self) -> EnterpriseMeta {
        EnterpriseMeta::new(self.namespace.clone(), self.partition.clone())
    }

    /// Dotted `name.namespace.partition` form used for graph node names.
    pub fn dotted(&self) -> String {
        format!("{}.{}.{}", self.name, self.namespace, self.partition)
    }
}

impl fmt::Display for ServiceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace == DEFAULT_NAMESPACE && self.partition == DEFAULT_PARTITION {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}/{}", self.partition, self.namespace, self.name)
        }
    }
}

pub(crate) fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tenancy_normalizes_to_default() {
        let a = ServiceID::new("web", &EnterpriseMeta::new("", ""));
        let b = ServiceID::named("web");
        assert_eq!(a, b);
        assert_eq!(a.namespace, "default");
        assert_eq!(a.partition, "default");
    }

    #[test]
    fn display_hides_default_tenancy() {
        assert_eq!(ServiceID::named("web").to_string(), "web");
        let sid = ServiceID::new("web", &EnterpriseMeta::new("ns1", "ap1"));
        assert_eq!(sid.to_string(), "ap1/ns1/web");
    }

    #[test]
    fn dotted_form() {
        let sid = ServiceID::new("api", &EnterpriseMeta::new("ns1", ""));
        assert_eq!(sid.dotted(), "api.ns1.default");
    }

    #[test]
    fn default_provider_returns_default_pair() {
        let meta = DefaultEnterpriseMeta.enterprise_meta();
        assert_eq!(meta.namespace, DEFAULT_NAMESPACE);
        assert_eq!(meta.partition, DEFAULT_PARTITION);
    }
}
