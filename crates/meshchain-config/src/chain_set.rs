//! The set of config entries a single compilation reads from.

use std::collections::BTreeMap;

use crate::entry::{ConfigEntry, ProxyConfigEntry, ServiceConfigEntry};
use crate::error::ConfigResult;
use crate::resolver::ServiceResolverConfigEntry;
use crate::router::ServiceRouterConfigEntry;
use crate::service::ServiceID;
use crate::splitter::ServiceSplitterConfigEntry;

/// In-memory snapshot of relevant entries, keyed by service identity.
///
/// Proxy defaults are keyed by partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryChainSet {
    pub routers: BTreeMap<ServiceID, ServiceRouterConfigEntry>,
    pub splitters: BTreeMap<ServiceID, ServiceSplitterConfigEntry>,
    pub resolvers: BTreeMap<ServiceID, ServiceResolverConfigEntry>,
    pub services: BTreeMap<ServiceID, ServiceConfigEntry>,
    pub proxy_defaults: BTreeMap<String, ProxyConfigEntry>,
}

impl DiscoveryChainSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when there are no routers, splitters, or resolvers.
    pub fn is_chain_empty(&self) -> bool {
        self.routers.is_empty() && self.splitters.is_empty() && self.resolvers.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.is_chain_empty() && self.services.is_empty() && self.proxy_defaults.is_empty()
    }

    pub fn get_router(&self, sid: &ServiceID) -> Option<&ServiceRouterConfigEntry> {
        self.routers.get(sid)
    }

    pub fn get_splitter(&self, sid: &ServiceID) -> Option<&ServiceSplitterConfigEntry> {
        self.splitters.get(sid)
    }

    pub fn get_resolver(&self, sid: &ServiceID) -> Option<&ServiceResolverConfigEntry> {
        self.resolvers.get(sid)
    }

    pub fn get_service(&self, sid: &ServiceID) -> Option<&ServiceConfigEntry> {
        self.services.get(sid)
    }

    pub fn get_proxy_defaults(&self, partition: &str) -> Option<&ProxyConfigEntry> {
        self.proxy_defaults.get(partition)
    }

    pub fn add_routers(&mut self, entries: impl IntoIterator<Item = ServiceRouterConfigEntry>) {
        for entry in entries {
            self.routers.insert(entry.service_id(), entry);
        }
    }

    pub fn add_splitters(&mut self, entries: impl IntoIterator<Item = ServiceSplitterConfigEntry>) {
        for entry in entries {
            self.splitters.insert(entry.service_id(), entry);
        }
    }

    pub fn add_resolvers(&mut self, entries: impl IntoIterator<Item = ServiceResolverConfigEntry>) {
        for entry in entries {
            self.resolvers.insert(entry.service_id(), entry);
        }
    }

    pub fn add_services(&mut self, entries: impl IntoIterator<Item = ServiceConfigEntry>) {
        for entry in entries {
            self.services.insert(entry.service_id(), entry);
        }
    }

    pub fn add_proxy_defaults(&mut self, entries: impl IntoIterator<Item = ProxyConfigEntry>) {
        for entry in entries {
            self.proxy_defaults
                .insert(entry.partition_or_default().to_string(), entry);
        }
    }

    /// Add entries of any kind. Later entries replace earlier ones with the
    /// same kind and identity.
    pub fn add_entries(&mut self, entries: impl IntoIterator<Item = ConfigEntry>) {
        for entry in entries {
            match entry {
                ConfigEntry::ServiceDefaults(e) => self.add_services([e]),
                ConfigEntry::ProxyDefaults(e) => self.add_proxy_defaults([e]),
                ConfigEntry::ServiceRouter(e) => self.add_routers([e]),
                ConfigEntry::ServiceSplitter(e) => self.add_splitters([e]),
                ConfigEntry::ServiceResolver(e) => self.add_resolvers([e]),
            }
        }
    }

    /// Every service named by a router, splitter, resolver, or
    /// service-defaults entry, in sorted order.
    pub fn service_ids(&self) -> Vec<ServiceID> {
        let mut ids: Vec<ServiceID> = self
            .routers
            .keys()
            .chain(self.splitters.keys())
            .chain(self.resolvers.keys())
            .chain(self.services.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Validate every entry, stopping at the first failure.
    pub fn validate(&self) -> ConfigResult<()> {
        for e in self.services.values() {
            e.validate()?;
        }
        for e in self.proxy_defaults.values() {
            e.validate()?;
        }
        for e in self.routers.values() {
            e.validate()?;
        }
        for e in self.splitters.values() {
            e.validate()?;
        }
        for e in self.resolvers.values() {
            e.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::EnterpriseMeta;

    #[test]
    fn entries_are_keyed_by_normalized_identity() {
        let mut set = DiscoveryChainSet::new();
        set.add_resolvers([ServiceResolverConfigEntry {
            name: "web".to_string(),
            ..Default::default()
        }]);

        let sid = ServiceID::new("web", &EnterpriseMeta::new("default", "default"));
        assert!(set.get_resolver(&sid).is_some());
        assert!(!set.is_chain_empty());
    }

    #[test]
    fn proxy_defaults_keyed_by_partition() {
        let mut set = DiscoveryChainSet::new();
        set.add_proxy_defaults([ProxyConfigEntry::with_protocol("http")]);
        assert_eq!(set.get_proxy_defaults("default").unwrap().protocol(), Some("http"));
        assert!(set.is_chain_empty());
        assert!(!set.is_empty());
    }

    #[test]
    fn service_ids_are_sorted_and_unique() {
        let mut set = DiscoveryChainSet::new();
        set.add_services([ServiceConfigEntry::with_protocol("web", "http")]);
        set.add_resolvers([ServiceResolverConfigEntry {
            name: "api".to_string(),
            ..Default::default()
        }]);
        set.add_splitters([ServiceSplitterConfigEntry {
            name: "web".to_string(),
            ..Default::default()
        }]);

        let names: Vec<String> = set.service_ids().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["api", "web"]);
    }
}
