//! Discovery targets: the concrete backends a chain resolves to.
//!
//! A target is identified by its chain ID,
//! `[subset.]service.namespace.partition.datacenter`. Every rewrite that
//! lands on the same ID shares one target record.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use meshchain_config::duration::serde_str;
use meshchain_config::{
    DEFAULT_NAMESPACE, DEFAULT_PARTITION, EnterpriseMeta, MeshGatewayConfig, ServiceID,
    ServiceResolverFailover, ServiceResolverFailoverTarget, ServiceResolverRedirect,
    ServiceResolverSubset,
};

/// A fully resolved backend: service, subset, and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryTarget {
    pub id: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_subset: String,
    pub namespace: String,
    pub partition: String,
    pub datacenter: String,
    pub mesh_gateway: MeshGatewayConfig,
    pub subset: ServiceResolverSubset,
    #[serde(with = "serde_str")]
    pub connect_timeout: Duration,
    pub external: bool,
    pub sni: String,
    pub name: String,
}

/// The identity fields of a target, used to build and rewrite targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryTargetOpts {
    pub service: String,
    pub service_subset: String,
    pub namespace: String,
    pub partition: String,
    pub datacenter: String,
}

impl DiscoveryTargetOpts {
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            service: name.into(),
            ..Default::default()
        }
    }
}

impl From<&ServiceResolverRedirect> for DiscoveryTargetOpts {
    fn from(r: &ServiceResolverRedirect) -> Self {
        Self {
            service: r.service.clone(),
            service_subset: r.service_subset.clone(),
            namespace: r.namespace.clone(),
            partition: r.partition.clone(),
            datacenter: r.datacenter.clone(),
        }
    }
}

impl From<&ServiceResolverFailover> for DiscoveryTargetOpts {
    fn from(f: &ServiceResolverFailover) -> Self {
        Self {
            service: f.service.clone(),
            service_subset: f.service_subset.clone(),
            namespace: f.namespace.clone(),
            ..Default::default()
        }
    }
}

impl From<&ServiceResolverFailoverTarget> for DiscoveryTargetOpts {
    fn from(t: &ServiceResolverFailoverTarget) -> Self {
        Self {
            service: t.service.clone(),
            service_subset: t.service_subset.clone(),
            namespace: t.namespace.clone(),
            partition: t.partition.clone(),
            datacenter: t.datacenter.clone(),
        }
    }
}

impl DiscoveryTarget {
    /// Build a target from fully populated opts. SNI and name are derived
    /// from `trust_domain`.
    pub fn new(opts: DiscoveryTargetOpts, trust_domain: &str) -> Self {
        let id = chain_id(&opts);
        let sni = service_sni(
            &opts.service,
            &opts.service_subset,
            &opts.namespace,
            &opts.partition,
            &opts.datacenter,
            trust_domain,
        );
        Self {
            id,
            service: opts.service,
            service_subset: opts.service_subset,
            namespace: opts.namespace,
            partition: opts.partition,
            datacenter: opts.datacenter,
            mesh_gateway: MeshGatewayConfig::default(),
            subset: ServiceResolverSubset::default(),
            connect_timeout: Duration::ZERO,
            external: false,
            name: sni.clone(),
            sni,
        }
    }

    pub fn service_id(&self) -> ServiceID {
        ServiceID::new(
            self.service.clone(),
            &EnterpriseMeta::new(self.namespace.clone(), self.partition.clone()),
        )
    }

    pub fn to_opts(&self) -> DiscoveryTargetOpts {
        DiscoveryTargetOpts {
            service: self.service.clone(),
            service_subset: self.service_subset.clone(),
            namespace: self.namespace.clone(),
            partition: self.partition.clone(),
            datacenter: self.datacenter.clone(),
        }
    }
}

/// Chain ID for a target, e.g. `v2.web.default.default.dc1`.
pub fn chain_id(opts: &DiscoveryTargetOpts) -> String {
    if opts.service_subset.is_empty() {
        format!(
            "{}.{}.{}.{}",
            opts.service, opts.namespace, opts.partition, opts.datacenter
        )
    } else {
        format!(
            "{}.{}.{}.{}.{}",
            opts.service_subset, opts.service, opts.namespace, opts.partition, opts.datacenter
        )
    }
}

/// SNI a mesh proxy presents when connecting to the target.
///
/// The default partition keeps the short `internal` form; any other
/// partition is included and marked `internal-v1`.
pub fn service_sni(
    service: &str,
    subset: &str,
    namespace: &str,
    partition: &str,
    datacenter: &str,
    trust_domain: &str,
) -> String {
    let namespace = if namespace.is_empty() { DEFAULT_NAMESPACE } else { namespace };
    let partition = if partition.is_empty() { DEFAULT_PARTITION } else { partition };

    let mut parts: Vec<&str> = Vec::with_capacity(7);
    if !subset.is_empty() {
        parts.push(subset);
    }
    parts.push(service);
    parts.push(namespace);
    if partition == DEFAULT_PARTITION {
        parts.extend([datacenter, "internal"]);
    } else {
        parts.extend([partition, datacenter, "internal-v1"]);
    }
    parts.push(trust_domain);
    parts.join(".")
}
