//! `service-resolver` entries: subsets, redirects, failover, load balancing.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::duration::{is_zero, serde_str};
use crate::entry::SERVICE_RESOLVER;
use crate::error::{ConfigError, ConfigResult};
use crate::service::{EnterpriseMeta, ServiceID};

/// Failover key that applies to any subset without its own policy.
pub const FAILOVER_WILDCARD: &str = "*";

pub const LB_POLICY_RANDOM: &str = "random";
pub const LB_POLICY_ROUND_ROBIN: &str = "round_robin";
pub const LB_POLICY_LEAST_REQUEST: &str = "least_request";
pub const LB_POLICY_RING_HASH: &str = "ring_hash";
pub const LB_POLICY_MAGLEV: &str = "maglev";

/// How a service (and its subsets) resolve to concrete instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceResolverConfigEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    /// Subset used when a request names none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_subset: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subsets: BTreeMap<String, ServiceResolverSubset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<ServiceResolverRedirect>,
    /// Failover policies keyed by subset name or [`FAILOVER_WILDCARD`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failover: BTreeMap<String, ServiceResolverFailover>,
    #[serde(default, with = "serde_str", skip_serializing_if = "is_zero")]
    pub connect_timeout: Duration,
    #[serde(default, with = "serde_str", skip_serializing_if = "is_zero")]
    pub request_timeout: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

/// Named filter over a service's instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceResolverSubset {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,
    #[serde(default)]
    pub only_passing: bool,
}

/// Send all traffic for this resolver somewhere else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResolverRedirect {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_subset: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenter: String,
}

impl ServiceResolverRedirect {
    fn is_empty(&self) -> bool {
        self.service.is_empty()
            && self.service_subset.is_empty()
            && self.namespace.is_empty()
            && self.partition.is_empty()
            && self.datacenter.is_empty()
    }
}

/// Where traffic goes when the primary target has no healthy instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResolverFailover {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_subset: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Datacenters tried in order, each with the rewritten target.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
    /// Explicit failover targets tried in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<ServiceResolverFailoverTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResolverFailoverTarget {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_subset: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenter: String,
}

// ── Load balancing ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ring_hash_config: Option<RingHashConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub least_request_config: Option<LeastRequestConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hash_policies: Vec<HashPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingHashConfig {
    #[serde(default)]
    pub minimum_ring_size: u64,
    #[serde(default)]
    pub maximum_ring_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeastRequestConfig {
    #[serde(default)]
    pub choice_count: u32,
}

/// Input to a hash-based load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPolicy {
    /// "header", "cookie", or "query_parameter".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_config: Option<CookieConfig>,
    #[serde(default)]
    pub source_ip: bool,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default)]
    pub session: bool,
    #[serde(default, with = "serde_str", skip_serializing_if = "is_zero")]
    pub ttl: Duration,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl LoadBalancer {
    /// Whether the policy routes by hashing request attributes.
    pub fn is_hash_based(&self) -> bool {
        matches!(self.policy.as_str(), LB_POLICY_RING_HASH | LB_POLICY_MAGLEV)
    }

    fn validate(&self) -> Result<(), String> {
        let known = [
            "",
            LB_POLICY_RANDOM,
            LB_POLICY_ROUND_ROBIN,
            LB_POLICY_LEAST_REQUEST,
            LB_POLICY_RING_HASH,
            LB_POLICY_MAGLEV,
        ];
        if !known.contains(&self.policy.as_str()) {
            return Err(format!("LoadBalancer policy {:?} is not supported", self.policy));
        }
        if self.ring_hash_config.is_some() && self.policy != LB_POLICY_RING_HASH {
            return Err(format!(
                "LoadBalancer policy {:?} is not compatible with RingHashConfig",
                self.policy
            ));
        }
        if self.least_request_config.is_some() && self.policy != LB_POLICY_LEAST_REQUEST {
            return Err(format!(
                "LoadBalancer policy {:?} is not compatible with LeastRequestConfig",
                self.policy
            ));
        }
        if !self.hash_policies.is_empty() && !self.is_hash_based() {
            return Err(format!(
                "LoadBalancer policy {:?} is not compatible with HashPolicies",
                self.policy
            ));
        }
        for (i, hp) in self.hash_policies.iter().enumerate() {
            if hp.field.is_empty() && !hp.source_ip {
                return Err(format!("HashPolicies[{i}] must specify a Field or SourceIP"));
            }
            if !hp.field.is_empty() && hp.source_ip {
                return Err(format!("HashPolicies[{i}] cannot specify both a Field and SourceIP"));
            }
            if !hp.field.is_empty() && hp.field_value.is_empty() {
                return Err(format!("HashPolicies[{i}] field {:?} requires a FieldValue", hp.field));
            }
            if hp.cookie_config.is_some() && hp.field != "cookie" {
                return Err(format!("HashPolicies[{i}] CookieConfig requires Field \"cookie\""));
            }
        }
        Ok(())
    }
}

// ── Entry ─────────────────────────────────────────────────────────

fn subset_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("valid subset regex"))
}

impl ServiceResolverConfigEntry {
    /// Resolver materialized for a service that has none configured.
    pub fn default_for(sid: &ServiceID) -> Self {
        Self {
            name: sid.name.clone(),
            namespace: sid.namespace.clone(),
            partition: sid.partition.clone(),
            ..Default::default()
        }
    }

    pub fn enterprise_meta(&self) -> EnterpriseMeta {
        EnterpriseMeta::new(self.namespace.clone(), self.partition.clone())
    }

    pub fn service_id(&self) -> ServiceID {
        ServiceID::new(self.name.clone(), &self.enterprise_meta())
    }

    pub fn subset_exists(&self, name: &str) -> bool {
        self.subsets.contains_key(name)
    }

    /// True when the entry configures nothing beyond its own identity.
    pub fn is_default(&self) -> bool {
        self.default_subset.is_empty()
            && self.subsets.is_empty()
            && self.redirect.is_none()
            && self.failover.is_empty()
            && self.connect_timeout.is_zero()
            && self.request_timeout.is_zero()
            && self.load_balancer.is_none()
    }

    /// Failover policy for `subset`, falling back to the wildcard policy.
    pub fn failover_for(&self, subset: &str) -> Option<&ServiceResolverFailover> {
        self.failover
            .get(subset)
            .or_else(|| self.failover.get(FAILOVER_WILDCARD))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::invalid(SERVICE_RESOLVER, &self.name, reason);

        if self.name.is_empty() {
            return Err(invalid("name is required".to_string()));
        }

        for name in self.subsets.keys() {
            if !subset_name_re().is_match(name) {
                return Err(invalid(format!(
                    "Subset {name:?} is invalid: names must be valid DNS subdomain elements"
                )));
            }
        }

        if !self.default_subset.is_empty() && !self.subset_exists(&self.default_subset) {
            return Err(invalid(format!(
                "DefaultSubset {:?} is not a valid subset",
                self.default_subset
            )));
        }

        if let Some(redirect) = &self.redirect {
            if !self.subsets.is_empty() {
                return Err(invalid("Redirect and Subsets cannot both be set".to_string()));
            }
            if !self.default_subset.is_empty() {
                return Err(invalid("Redirect and DefaultSubset cannot both be set".to_string()));
            }
            if !self.failover.is_empty() {
                return Err(invalid("Redirect and Failover cannot both be set".to_string()));
            }
            if redirect.is_empty() {
                return Err(invalid("Redirect is empty".to_string()));
            }
            if !redirect.service_subset.is_empty() && redirect.service.is_empty() {
                return Err(invalid(
                    "Redirect.ServiceSubset defined without Redirect.Service".to_string(),
                ));
            }
        }

        for (subset, failover) in &self.failover {
            if subset != FAILOVER_WILDCARD && !self.subset_exists(subset) {
                return Err(invalid(format!("Bad Failover[{subset:?}]: not a valid subset")));
            }

            let has_plain = !failover.service.is_empty()
                || !failover.service_subset.is_empty()
                || !failover.namespace.is_empty()
                || !failover.datacenters.is_empty();
            if !has_plain && failover.targets.is_empty() {
                return Err(invalid(format!(
                    "Bad Failover[{subset:?}]: one of Service, ServiceSubset, Namespace, Targets, or Datacenters is required"
                )));
            }
            if has_plain && !failover.targets.is_empty() {
                return Err(invalid(format!(
                    "Bad Failover[{subset:?}]: Targets cannot be set with Service, ServiceSubset, Namespace, or Datacenters"
                )));
            }

            if !failover.service_subset.is_empty()
                && (failover.service.is_empty() || failover.service == self.name)
                && !self.subset_exists(&failover.service_subset)
            {
                return Err(invalid(format!(
                    "Bad Failover[{subset:?}].ServiceSubset {:?} is not a valid subset of {:?}",
                    failover.service_subset, self.name
                )));
            }

            for (i, dc) in failover.datacenters.iter().enumerate() {
                if dc.is_empty() {
                    return Err(invalid(format!(
                        "Bad Failover[{subset:?}].Datacenters[{i}]: found empty datacenter"
                    )));
                }
            }

            for (i, target) in failover.targets.iter().enumerate() {
                if !target.service_subset.is_empty()
                    && (target.service.is_empty() || target.service == self.name)
                    && !self.subset_exists(&target.service_subset)
                {
                    return Err(invalid(format!(
                        "Bad Failover[{subset:?}].Targets[{i}].ServiceSubset {:?} is not a valid subset of {:?}",
                        target.service_subset, self.name
                    )));
                }
            }
        }

        if let Some(lb) = &self.load_balancer {
            lb.validate().map_err(invalid)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(name: &str) -> ServiceResolverConfigEntry {
        ServiceResolverConfigEntry {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn with_subsets(mut entry: ServiceResolverConfigEntry, names: &[&str]) -> ServiceResolverConfigEntry {
        for name in names {
            entry.subsets.insert(
                name.to_string(),
                ServiceResolverSubset {
                    filter: format!("Service.Meta.version == {name}"),
                    only_passing: false,
                },
            );
        }
        entry
    }

    #[test]
    fn default_resolver_is_default() {
        let entry = ServiceResolverConfigEntry::default_for(&ServiceID::named("web"));
        assert!(entry.is_default());
        assert_eq!(entry.namespace, "default");
    }

    #[test]
    fn any_setting_makes_it_non_default() {
        let mut entry = resolver("web");
        entry.connect_timeout = Duration::from_secs(3);
        assert!(!entry.is_default());
    }

    #[test]
    fn failover_falls_back_to_wildcard() {
        let mut entry = with_subsets(resolver("web"), &["v1"]);
        entry.failover.insert(
            "*".to_string(),
            ServiceResolverFailover {
                datacenters: vec!["dc2".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(entry.failover_for("v1").unwrap().datacenters, vec!["dc2"]);
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn default_subset_must_exist() {
        let mut entry = with_subsets(resolver("web"), &["v1"]);
        entry.default_subset = "v2".to_string();
        let err = entry.validate().unwrap_err().to_string();
        assert!(err.contains("DefaultSubset"), "{err}");
    }

    #[test]
    fn redirect_excludes_subsets() {
        let mut entry = with_subsets(resolver("web"), &["v1"]);
        entry.redirect = Some(ServiceResolverRedirect {
            service: "other".to_string(),
            ..Default::default()
        });
        let err = entry.validate().unwrap_err().to_string();
        assert!(err.contains("Redirect and Subsets"), "{err}");
    }

    #[test]
    fn subset_names_are_dns_labels() {
        let entry = with_subsets(resolver("web"), &["V1_bad"]);
        assert!(entry.validate().is_err());
    }

    #[test]
    fn failover_key_must_be_subset_or_wildcard() {
        let mut entry = resolver("web");
        entry.failover.insert(
            "v9".to_string(),
            ServiceResolverFailover {
                service: "backup".to_string(),
                ..Default::default()
            },
        );
        let err = entry.validate().unwrap_err().to_string();
        assert!(err.contains("not a valid subset"), "{err}");
    }

    #[test]
    fn hash_policies_need_hash_policy() {
        let mut entry = resolver("web");
        entry.load_balancer = Some(LoadBalancer {
            policy: LB_POLICY_ROUND_ROBIN.to_string(),
            hash_policies: vec![HashPolicy {
                source_ip: true,
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(entry.validate().is_err());

        entry.load_balancer.as_mut().unwrap().policy = LB_POLICY_MAGLEV.to_string();
        assert!(entry.validate().is_ok());
        assert!(entry.load_balancer.unwrap().is_hash_based());
    }
}
