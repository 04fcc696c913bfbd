//! The compiled graph: router, splitter, and resolver nodes plus the
//! [`CompiledDiscoveryChain`] that owns them.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use meshchain_config::duration::{is_zero, serde_str};
use meshchain_config::{EnvoyExtension, LoadBalancer, ServiceRoute, ServiceSplit};

use crate::target::{DiscoveryTarget, DiscoveryTargetOpts, chain_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Router,
    Splitter,
    Resolver,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Router => "router",
            NodeType::Splitter => "splitter",
            NodeType::Resolver => "resolver",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map key for a node: `type:name`.
pub fn node_key(node_type: NodeType, name: &str) -> String {
    format!("{node_type}:{name}")
}

/// A node in the compiled graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoveryGraphNode {
    Router(RouterNode),
    Splitter(SplitterNode),
    Resolver(ResolverNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterNode {
    pub name: String,
    pub routes: Vec<DiscoveryRoute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitterNode {
    pub name: String,
    pub splits: Vec<DiscoverySplit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverNode {
    pub name: String,
    pub resolver: DiscoveryResolver,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRoute {
    pub definition: ServiceRoute,
    pub next_node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySplit {
    pub definition: ServiceSplit,
    pub weight: f32,
    pub next_node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResolver {
    /// The resolver config entry configures nothing of its own.
    pub default: bool,
    /// Target ID this resolver sends traffic to.
    pub target: String,
    #[serde(with = "serde_str")]
    pub connect_timeout: Duration,
    #[serde(default, with = "serde_str", skip_serializing_if = "is_zero")]
    pub request_timeout: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<DiscoveryFailover>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryFailover {
    /// Failover target IDs in the order they are tried.
    pub targets: Vec<String>,
}

impl DiscoveryGraphNode {
    pub fn node_type(&self) -> NodeType {
        match self {
            DiscoveryGraphNode::Router(_) => NodeType::Router,
            DiscoveryGraphNode::Splitter(_) => NodeType::Splitter,
            DiscoveryGraphNode::Resolver(_) => NodeType::Resolver,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DiscoveryGraphNode::Router(n) => &n.name,
            DiscoveryGraphNode::Splitter(n) => &n.name,
            DiscoveryGraphNode::Resolver(n) => &n.name,
        }
    }

    pub fn map_key(&self) -> String {
        node_key(self.node_type(), self.name())
    }

    /// Keys of the nodes this node hands traffic to, in declaration order.
    pub fn next_nodes(&self) -> Vec<&str> {
        match self {
            DiscoveryGraphNode::Router(n) => n.routes.iter().map(|r| r.next_node.as_str()).collect(),
            DiscoveryGraphNode::Splitter(n) => {
                n.splits.iter().map(|s| s.next_node.as_str()).collect()
            }
            DiscoveryGraphNode::Resolver(_) => Vec::new(),
        }
    }

    pub fn as_resolver(&self) -> Option<&ResolverNode> {
        match self {
            DiscoveryGraphNode::Resolver(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_splitter(&self) -> Option<&SplitterNode> {
        match self {
            DiscoveryGraphNode::Splitter(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_router(&self) -> Option<&RouterNode> {
        match self {
            DiscoveryGraphNode::Router(n) => Some(n),
            _ => None,
        }
    }
}

impl ResolverNode {
    pub fn map_key(&self) -> String {
        node_key(NodeType::Resolver, &self.name)
    }
}

/// Fully resolved routing graph for one service, evaluated in one
/// datacenter under one set of overrides. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledDiscoveryChain {
    pub service_name: String,
    pub namespace: String,
    pub partition: String,
    pub datacenter: String,
    /// Short hash of the overrides that changed the result; empty when
    /// none did.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customization_hash: String,
    /// Behaves exactly like plain service resolution without a chain.
    pub default: bool,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_meta: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envoy_extensions: Vec<EnvoyExtension>,
    pub start_node: String,
    pub nodes: BTreeMap<String, DiscoveryGraphNode>,
    pub targets: BTreeMap<String, DiscoveryTarget>,
}

impl CompiledDiscoveryChain {
    /// Chain ID of the chain's own service in its own coordinates.
    pub fn id(&self) -> String {
        chain_id(&DiscoveryTargetOpts {
            service: self.service_name.clone(),
            service_subset: String::new(),
            namespace: self.namespace.clone(),
            partition: self.partition.clone(),
            datacenter: self.datacenter.clone(),
        })
    }

    pub fn start(&self) -> Option<&DiscoveryGraphNode> {
        self.nodes.get(&self.start_node)
    }

    pub fn node(&self, key: &str) -> Option<&DiscoveryGraphNode> {
        self.nodes.get(key)
    }

    pub fn target(&self, id: &str) -> Option<&DiscoveryTarget> {
        self.targets.get(id)
    }

    /// Whether the chain is indistinguishable from resolving the service
    /// directly.
    ///
    /// That holds when there is no graph at all, or when the start node is
    /// an unconfigured resolver for this very service. Landing on another
    /// service's unconfigured resolver through a redirect does not count.
    pub fn is_default(&self) -> bool {
        if self.start_node.is_empty() || self.nodes.is_empty() {
            return true;
        }

        let Some(DiscoveryGraphNode::Resolver(node)) = self.nodes.get(&self.start_node) else {
            return false;
        };
        if !node.resolver.default {
            return false;
        }

        self.targets.get(&node.resolver.target).is_some_and(|target| {
            target.service == self.service_name
                && target.namespace == self.namespace
                && target.partition == self.partition
        })
    }
}
