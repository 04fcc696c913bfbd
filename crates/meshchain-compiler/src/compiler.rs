//! Compiler state and the compilation driver.
//!
//! A [`Compiler`] is built for exactly one [`compile`] call and consumed by
//! it. It borrows the caller's entries read-only, except for a private copy
//! of the resolver map that default resolvers are materialized into.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use meshchain_config::{
    DefaultEnterpriseMeta, DiscoveryChainSet, EnterpriseMeta, EnterpriseMetaProvider,
    EnvoyExtension, MeshGatewayConfig, ServiceID, ServiceResolverConfigEntry,
};

use crate::error::{ChainError, ChainResult};
use crate::graph::{CompiledDiscoveryChain, DiscoveryGraphNode};
use crate::protocol::enable_advanced_routing_for_protocol;
use crate::target::DiscoveryTarget;

/// Connect timeout for resolvers that do not set one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Input to [`compile`].
///
/// The five coordinates and `entries` are required; the overrides are
/// optional and only count as customizations when they change the result.
#[derive(Debug, Clone, Default)]
pub struct CompileRequest<'a> {
    pub service_name: String,
    pub evaluate_in_namespace: String,
    pub evaluate_in_partition: String,
    pub evaluate_in_datacenter: String,
    pub evaluate_in_trust_domain: String,
    pub override_mesh_gateway: Option<MeshGatewayConfig>,
    pub override_protocol: Option<String>,
    pub override_connect_timeout: Option<Duration>,
    pub entries: Option<&'a DiscoveryChainSet>,
    /// Tenancy for the root service; [`DefaultEnterpriseMeta`] when unset.
    pub enterprise_meta: Option<&'a dyn EnterpriseMetaProvider>,
}

impl<'a> CompileRequest<'a> {
    /// Request with the default namespace and partition.
    pub fn new(
        service_name: impl Into<String>,
        datacenter: impl Into<String>,
        trust_domain: impl Into<String>,
        entries: &'a DiscoveryChainSet,
    ) -> Self {
        let meta = EnterpriseMeta::default();
        Self {
            service_name: service_name.into(),
            evaluate_in_namespace: meta.namespace,
            evaluate_in_partition: meta.partition,
            evaluate_in_datacenter: datacenter.into(),
            evaluate_in_trust_domain: trust_domain.into(),
            entries: Some(entries),
            ..Default::default()
        }
    }
}

/// Compile the discovery chain described by `req`.
pub fn compile(req: CompileRequest<'_>) -> ChainResult<CompiledDiscoveryChain> {
    Compiler::new(req)?.compile()
}

/// Which overrides actually changed the compiled result.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CustomizationMarkers {
    pub(crate) mesh_gateway: bool,
    pub(crate) protocol: bool,
    pub(crate) connect_timeout: bool,
}

impl CustomizationMarkers {
    fn is_zero(&self) -> bool {
        !self.mesh_gateway && !self.protocol && !self.connect_timeout
    }
}

/// Overrides folded into the customization hash.
#[derive(Serialize)]
struct Customization<'a> {
    override_mesh_gateway: MeshGatewayConfig,
    override_protocol: &'a str,
    override_connect_timeout: Duration,
}

pub(crate) struct Compiler<'a> {
    pub(crate) service_name: String,
    pub(crate) evaluate_in_namespace: String,
    pub(crate) evaluate_in_partition: String,
    pub(crate) evaluate_in_datacenter: String,
    pub(crate) evaluate_in_trust_domain: String,
    pub(crate) enterprise_meta: EnterpriseMeta,

    pub(crate) override_mesh_gateway: MeshGatewayConfig,
    pub(crate) override_protocol: Option<String>,
    pub(crate) override_connect_timeout: Option<Duration>,

    pub(crate) entries: &'a DiscoveryChainSet,
    /// Private copy; default resolvers are materialized here.
    pub(crate) resolvers: BTreeMap<ServiceID, ServiceResolverConfigEntry>,

    /// Splitter node keys by `name.namespace.partition`.
    pub(crate) splitter_nodes: HashMap<String, String>,
    /// Resolver node keys by target ID.
    pub(crate) resolve_nodes: HashMap<String, String>,

    /// A router or splitter made it into the chain.
    pub(crate) uses_advanced_routing_features: bool,
    /// The protocol override rules out routers and splitters.
    pub(crate) disable_advanced_routing_features: bool,
    pub(crate) customized_by: CustomizationMarkers,

    pub(crate) service_meta: BTreeMap<String, String>,
    pub(crate) envoy_extensions: Vec<EnvoyExtension>,
    /// Common protocol of every service touched; empty until the first.
    pub(crate) protocol: String,
    pub(crate) start_node: String,

    pub(crate) nodes: BTreeMap<String, DiscoveryGraphNode>,
    pub(crate) loaded_targets: BTreeMap<String, DiscoveryTarget>,
    pub(crate) retained_targets: HashSet<String>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(req: CompileRequest<'a>) -> ChainResult<Self> {
        let required = [
            ("serviceName", &req.service_name),
            ("evaluateInNamespace", &req.evaluate_in_namespace),
            ("evaluateInPartition", &req.evaluate_in_partition),
            ("evaluateInDatacenter", &req.evaluate_in_datacenter),
            ("evaluateInTrustDomain", &req.evaluate_in_trust_domain),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ChainError::MissingField(field));
            }
        }
        let entries = req.entries.ok_or(ChainError::MissingField("entries"))?;

        let override_protocol = req
            .override_protocol
            .map(|p| p.to_ascii_lowercase())
            .filter(|p| !p.is_empty());
        let disable_advanced_routing_features = override_protocol
            .as_deref()
            .is_some_and(|p| !enable_advanced_routing_for_protocol(p));

        // The evaluated tenancy names the root service; the provider only
        // fills what the coordinates leave empty.
        let mut enterprise_meta = match req.enterprise_meta {
            Some(provider) => provider.enterprise_meta(),
            None => DefaultEnterpriseMeta.enterprise_meta(),
        };
        if !req.evaluate_in_namespace.is_empty() {
            enterprise_meta.namespace = req.evaluate_in_namespace.clone();
        }
        if !req.evaluate_in_partition.is_empty() {
            enterprise_meta.partition = req.evaluate_in_partition.clone();
        }

        Ok(Self {
            service_name: req.service_name,
            evaluate_in_namespace: req.evaluate_in_namespace,
            evaluate_in_partition: req.evaluate_in_partition,
            evaluate_in_datacenter: req.evaluate_in_datacenter,
            evaluate_in_trust_domain: req.evaluate_in_trust_domain,
            enterprise_meta,
            override_mesh_gateway: req.override_mesh_gateway.unwrap_or_default(),
            override_protocol,
            override_connect_timeout: req.override_connect_timeout.filter(|d| !d.is_zero()),
            entries,
            resolvers: entries.resolvers.clone(),
            splitter_nodes: HashMap::new(),
            resolve_nodes: HashMap::new(),
            uses_advanced_routing_features: false,
            disable_advanced_routing_features,
            customized_by: CustomizationMarkers::default(),
            service_meta: BTreeMap::new(),
            envoy_extensions: Vec::new(),
            protocol: String::new(),
            start_node: String::new(),
            nodes: BTreeMap::new(),
            loaded_targets: BTreeMap::new(),
            retained_targets: HashSet::new(),
        })
    }

    pub(crate) fn compile(mut self) -> ChainResult<CompiledDiscoveryChain> {
        self.assemble_chain()?;

        // Only assembly uses these.
        self.splitter_nodes = HashMap::new();
        self.resolve_nodes = HashMap::new();

        if self.start_node.is_empty() {
            return Err(ChainError::Internal("no start node was assembled".to_string()));
        }

        self.detect_circular_references()?;
        self.flatten_adjacent_splitter_nodes()?;
        self.remove_unused_nodes()?;
        self.prune_targets();

        if !enable_advanced_routing_for_protocol(&self.protocol) && self.uses_advanced_routing_features {
            return Err(ChainError::graph(format!(
                "discovery chain {:?} uses a protocol {:?} that does not permit advanced routing or splitting behavior",
                self.service_name, self.protocol
            )));
        }

        if let Some(protocol) = &self.override_protocol {
            if *protocol != self.protocol {
                self.protocol = protocol.clone();
                self.customized_by.protocol = true;
            }
        }

        let customization_hash = self.customization_hash()?;

        let mut chain = CompiledDiscoveryChain {
            service_name: self.service_name,
            namespace: self.evaluate_in_namespace,
            partition: self.evaluate_in_partition,
            datacenter: self.evaluate_in_datacenter,
            customization_hash,
            default: false,
            protocol: self.protocol,
            service_meta: self.service_meta,
            envoy_extensions: self.envoy_extensions,
            start_node: self.start_node,
            nodes: self.nodes,
            targets: self.loaded_targets,
        };
        chain.default = chain.is_default();

        debug!(
            service = %chain.service_name,
            datacenter = %chain.datacenter,
            protocol = %chain.protocol,
            start_node = %chain.start_node,
            nodes = chain.nodes.len(),
            targets = chain.targets.len(),
            default = chain.default,
            "compiled discovery chain"
        );

        Ok(chain)
    }

    /// First 8 hex characters of a SHA-256 over the applied overrides, or
    /// empty when no override changed anything.
    fn customization_hash(&self) -> ChainResult<String> {
        if self.customized_by.is_zero() {
            return Ok(String::new());
        }

        let customization = Customization {
            override_mesh_gateway: if self.customized_by.mesh_gateway {
                self.override_mesh_gateway
            } else {
                MeshGatewayConfig::default()
            },
            override_protocol: match (&self.override_protocol, self.customized_by.protocol) {
                (Some(p), true) => p.as_str(),
                _ => "",
            },
            override_connect_timeout: match self.override_connect_timeout {
                Some(d) if self.customized_by.connect_timeout => d,
                _ => Duration::ZERO,
            },
        };

        let encoded = serde_json::to_vec(&customization)?;
        let digest = hex::encode(Sha256::digest(&encoded));
        Ok(digest[..8].to_string())
    }

    /// Store a node, plus its type-specific lookup entry.
    pub(crate) fn record_node(&mut self, node: DiscoveryGraphNode) {
        let key = node.map_key();
        match &node {
            DiscoveryGraphNode::Router(_) => {}
            DiscoveryGraphNode::Splitter(n) => {
                self.splitter_nodes.insert(n.name.clone(), key.clone());
            }
            DiscoveryGraphNode::Resolver(n) => {
                self.resolve_nodes.insert(n.resolver.target.clone(), key.clone());
            }
        }
        self.nodes.insert(key, node);
    }

    pub(crate) fn target(&self, id: &str) -> ChainResult<&DiscoveryTarget> {
        self.loaded_targets
            .get(id)
            .ok_or_else(|| ChainError::Internal(format!("unknown target {id:?}")))
    }

    pub(crate) fn target_mut(&mut self, id: &str) -> ChainResult<&mut DiscoveryTarget> {
        self.loaded_targets
            .get_mut(id)
            .ok_or_else(|| ChainError::Internal(format!("unknown target {id:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(entries: &DiscoveryChainSet) -> CompileRequest<'_> {
        CompileRequest::new("web", "dc1", "trust.consul", entries)
    }

    #[test]
    fn missing_fields_fail_fast() {
        let entries = DiscoveryChainSet::new();

        let mut req = request(&entries);
        req.evaluate_in_trust_domain.clear();
        let err = compile(req).unwrap_err();
        assert!(!err.is_graph_error());
        assert_eq!(err.to_string(), "evaluateInTrustDomain is required");

        let mut req = request(&entries);
        req.entries = None;
        assert!(matches!(compile(req), Err(ChainError::MissingField("entries"))));
    }

    #[test]
    fn non_http_override_disables_advanced_routing() {
        let entries = DiscoveryChainSet::new();
        let mut req = request(&entries);
        req.override_protocol = Some("TCP".to_string());
        let compiler = Compiler::new(req).unwrap();
        assert!(compiler.disable_advanced_routing_features);
        assert_eq!(compiler.override_protocol.as_deref(), Some("tcp"));

        let mut req = request(&entries);
        req.override_protocol = Some("grpc".to_string());
        assert!(!Compiler::new(req).unwrap().disable_advanced_routing_features);
    }

    #[test]
    fn zero_connect_timeout_override_is_ignored() {
        let entries = DiscoveryChainSet::new();
        let mut req = request(&entries);
        req.override_connect_timeout = Some(Duration::ZERO);
        assert!(Compiler::new(req).unwrap().override_connect_timeout.is_none());
    }

    #[test]
    fn customization_hash_is_short_hex() {
        let entries = DiscoveryChainSet::new();
        let mut req = request(&entries);
        req.override_protocol = Some("http".to_string());
        let mut compiler = Compiler::new(req).unwrap();
        assert_eq!(compiler.customization_hash().unwrap(), "");

        compiler.customized_by.protocol = true;
        let hash = compiler.customization_hash().unwrap();
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
