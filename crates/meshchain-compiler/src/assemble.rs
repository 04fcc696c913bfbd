//! Graph assembly: walk router, splitter, and resolver entries starting at
//! the root service and record one node per distinct step.
//!
//! Nodes are owned by the compiler's node map and referenced by key; targets
//! are owned by the target map and referenced by chain ID.

use std::collections::HashSet;

use tracing::{debug, trace};

use meshchain_config::{
    MeshGatewayMode, ServiceID, ServiceResolverConfigEntry, ServiceRoute, ServiceRouteDestination,
};

use crate::compiler::{Compiler, DEFAULT_CONNECT_TIMEOUT};
use crate::error::{ChainError, ChainResult};
use crate::graph::{
    DiscoveryFailover, DiscoveryGraphNode, DiscoveryResolver, DiscoveryRoute, DiscoverySplit,
    NodeType, ResolverNode, RouterNode, SplitterNode, node_key,
};
use crate::target::{DiscoveryTarget, DiscoveryTargetOpts, chain_id};

fn or_else(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

impl Compiler<'_> {
    pub(crate) fn assemble_chain(&mut self) -> ChainResult<()> {
        if !self.start_node.is_empty() || !self.nodes.is_empty() {
            return Err(ChainError::Internal(
                "assemble_chain called more than once".to_string(),
            ));
        }

        let entries = self.entries;
        let sid = ServiceID::new(self.service_name.clone(), &self.enterprise_meta);

        if let Some(defaults) = entries.get_service(&sid) {
            self.service_meta = defaults.meta.clone();
            self.envoy_extensions = defaults.envoy_extensions.clone();
        }

        // With nothing configured at all, the root still gets a resolver.
        if self.resolvers.is_empty() && entries.is_chain_empty() {
            self.resolvers
                .insert(sid.clone(), ServiceResolverConfigEntry::default_for(&sid));
        }

        let mut router = entries.get_router(&sid);
        if router.is_some() && self.disable_advanced_routing_features {
            router = None;
            self.customized_by.protocol = true;
        }

        let Some(router) = router else {
            let target = self.new_target(DiscoveryTargetOpts::service(self.service_name.clone()));
            self.start_node = self.get_splitter_or_resolver_node(&target)?;
            return Ok(());
        };

        let router_id = router.service_id();
        self.uses_advanced_routing_features = true;
        self.record_service_protocol(&router_id)?;

        let mut routes = Vec::with_capacity(router.routes.len() + 1);
        for route in &router.routes {
            let dest = route.destination.clone().unwrap_or_else(|| ServiceRouteDestination {
                service: self.service_name.clone(),
                namespace: router_id.namespace.clone(),
                partition: router_id.partition.clone(),
                ..Default::default()
            });

            let opts = DiscoveryTargetOpts {
                service: or_else(&dest.service, &self.service_name),
                service_subset: dest.service_subset.clone(),
                namespace: or_else(&dest.namespace, &router_id.namespace),
                partition: or_else(&dest.partition, &router_id.partition),
                datacenter: String::new(),
            };

            let next_node = if opts.service_subset.is_empty() {
                let target = self.new_target(opts);
                self.get_splitter_or_resolver_node(&target)?
            } else {
                let target = self.new_target(opts);
                self.get_resolver_node(target, false)?.map_key()
            };

            routes.push(DiscoveryRoute {
                definition: route.clone(),
                next_node,
            });
        }

        let target = self.new_target(DiscoveryTargetOpts {
            service: router.name.clone(),
            namespace: router_id.namespace.clone(),
            partition: router_id.partition.clone(),
            ..Default::default()
        });
        let default_next = self.get_splitter_or_resolver_node(&target)?;
        routes.push(DiscoveryRoute {
            definition: ServiceRoute::catch_all(
                &router.name,
                &router_id.namespace,
                &router_id.partition,
            ),
            next_node: default_next,
        });

        let node = DiscoveryGraphNode::Router(RouterNode {
            name: router_id.dotted(),
            routes,
        });
        self.start_node = node.map_key();
        self.record_node(node);

        Ok(())
    }

    /// Find or create the target described by `opts`, filling unset
    /// coordinates from the evaluation context. Returns its chain ID.
    pub(crate) fn new_target(&mut self, mut opts: DiscoveryTargetOpts) -> String {
        if opts.datacenter.is_empty() {
            opts.datacenter = self.evaluate_in_datacenter.clone();
        }
        if opts.namespace.is_empty() {
            opts.namespace = self.evaluate_in_namespace.clone();
        }
        if opts.partition.is_empty() {
            opts.partition = self.evaluate_in_partition.clone();
        }

        let id = chain_id(&opts);
        if !self.loaded_targets.contains_key(&id) {
            trace!(target_id = %id, "loaded target");
            let target = DiscoveryTarget::new(opts, &self.evaluate_in_trust_domain);
            self.loaded_targets.insert(id.clone(), target);
        }
        id
    }

    /// Apply the non-empty fields of `opts` on top of an existing target.
    /// Switching service drops the subset.
    pub(crate) fn rewrite_target(
        &mut self,
        target_id: &str,
        opts: &DiscoveryTargetOpts,
    ) -> ChainResult<String> {
        let mut merged = self.target(target_id)?.to_opts();

        if !opts.service.is_empty() && opts.service != merged.service {
            merged.service = opts.service.clone();
            merged.service_subset.clear();
        }
        if !opts.service_subset.is_empty() {
            merged.service_subset = opts.service_subset.clone();
        }
        if !opts.partition.is_empty() {
            merged.partition = opts.partition.clone();
        }
        if !opts.namespace.is_empty() {
            merged.namespace = opts.namespace.clone();
        }
        if !opts.datacenter.is_empty() {
            merged.datacenter = opts.datacenter.clone();
        }

        Ok(self.new_target(merged))
    }

    /// Splitter node for the target's service if it has one, otherwise the
    /// resolver node for the target.
    pub(crate) fn get_splitter_or_resolver_node(&mut self, target_id: &str) -> ChainResult<String> {
        let sid = self.target(target_id)?.service_id();
        if let Some(key) = self.get_splitter_node(&sid)? {
            return Ok(key);
        }
        Ok(self.get_resolver_node(target_id.to_string(), false)?.map_key())
    }

    pub(crate) fn get_splitter_node(&mut self, sid: &ServiceID) -> ChainResult<Option<String>> {
        let name = sid.dotted();
        if let Some(key) = self.splitter_nodes.get(&name) {
            return Ok(Some(key.clone()));
        }

        let entries = self.entries;
        let mut splitter = entries.get_splitter(sid);
        if splitter.is_some() && self.disable_advanced_routing_features {
            splitter = None;
            self.customized_by.protocol = true;
        }
        let Some(splitter) = splitter else {
            return Ok(None);
        };

        // Record the node before its children so a split that loops back
        // finds it instead of recursing forever.
        let key = node_key(NodeType::Splitter, &name);
        self.record_node(DiscoveryGraphNode::Splitter(SplitterNode {
            name: name.clone(),
            splits: Vec::new(),
            load_balancer: None,
        }));

        let parent_meta = sid.enterprise_meta();
        let mut splits = Vec::with_capacity(splitter.splits.len());
        let mut load_balancer = None;

        for split in &splitter.splits {
            let service = or_else(&split.service, &sid.name);
            let split_id = ServiceID::new(service.clone(), &split.enterprise_meta(&parent_meta));

            if split_id != *sid && split.service_subset.is_empty() {
                if let Some(next_node) = self.get_splitter_node(&split_id)? {
                    splits.push(DiscoverySplit {
                        definition: split.clone(),
                        weight: split.weight,
                        next_node,
                    });
                    continue;
                }
            }

            let target = self.new_target(DiscoveryTargetOpts {
                service,
                service_subset: split.service_subset.clone(),
                namespace: split_id.namespace.clone(),
                partition: split_id.partition.clone(),
                datacenter: String::new(),
            });
            let node = self.get_resolver_node(target, false)?;

            // The first hash-based policy among the children decides.
            if load_balancer.is_none() {
                load_balancer = node.load_balancer.clone().filter(|lb| lb.is_hash_based());
            }

            splits.push(DiscoverySplit {
                definition: split.clone(),
                weight: split.weight,
                next_node: node.map_key(),
            });
        }

        self.nodes.insert(
            key.clone(),
            DiscoveryGraphNode::Splitter(SplitterNode {
                name,
                splits,
                load_balancer,
            }),
        );
        self.uses_advanced_routing_features = true;

        Ok(Some(key))
    }

    /// Resolver node for a target, following redirects and default subsets
    /// to the final target first.
    ///
    /// Failover targets are resolved with `recursed_for_failover` set: they
    /// skip the node cache, are not recorded as nodes, and do not have their
    /// own failover expanded.
    pub(crate) fn get_resolver_node(
        &mut self,
        mut target_id: String,
        recursed_for_failover: bool,
    ) -> ChainResult<ResolverNode> {
        let mut redirect_history: HashSet<String> = HashSet::new();
        let mut redirect_order: Vec<String> = Vec::new();

        let (target_sid, resolver) = loop {
            if !recursed_for_failover {
                if let Some(key) = self.resolve_nodes.get(&target_id) {
                    return match self.nodes.get(key) {
                        Some(DiscoveryGraphNode::Resolver(node)) => Ok(node.clone()),
                        _ => Err(ChainError::Internal(format!(
                            "resolver node {key:?} is missing"
                        ))),
                    };
                }
            }

            let target_sid = self.target(&target_id)?.service_id();
            self.record_service_protocol(&target_sid)?;

            let resolver = self
                .resolvers
                .entry(target_sid.clone())
                .or_insert_with(|| ServiceResolverConfigEntry::default_for(&target_sid))
                .clone();

            redirect_order.push(target_id.clone());
            if !redirect_history.insert(target_id.clone()) {
                return Err(ChainError::graph(format!(
                    "detected circular resolver redirect: [{}]",
                    redirect_order.join(" -> ")
                )));
            }

            if let Some(redirect) = &resolver.redirect {
                let redirected = self.rewrite_target(&target_id, &DiscoveryTargetOpts::from(redirect))?;
                if redirected != target_id {
                    debug!(from = %target_id, to = %redirected, "following resolver redirect");
                    target_id = redirected;
                    continue;
                }
            }

            if self.target(&target_id)?.service_subset.is_empty() && !resolver.default_subset.is_empty() {
                target_id = self.rewrite_target(
                    &target_id,
                    &DiscoveryTargetOpts {
                        service_subset: resolver.default_subset.clone(),
                        ..Default::default()
                    },
                )?;
                continue;
            }

            break (target_sid, resolver);
        };

        let target = self.target(&target_id)?;
        if !target.service_subset.is_empty() && !resolver.subset_exists(&target.service_subset) {
            return Err(ChainError::graph(format!(
                "service {:?} does not have a subset named {:?}",
                target.service, target.service_subset
            )));
        }
        let service_subset = target.service_subset.clone();

        let mut connect_timeout = if resolver.connect_timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            resolver.connect_timeout
        };
        if let Some(timeout) = self.override_connect_timeout {
            if timeout != connect_timeout {
                connect_timeout = timeout;
                self.customized_by.connect_timeout = true;
            }
        }

        let mut node = ResolverNode {
            name: target_id.clone(),
            resolver: DiscoveryResolver {
                default: resolver.is_default(),
                target: target_id.clone(),
                connect_timeout,
                request_timeout: resolver.request_timeout,
                failover: None,
            },
            load_balancer: resolver.load_balancer.clone(),
        };

        let entries = self.entries;
        let service_defaults = entries.get_service(&target_sid);
        let proxy_defaults = entries.get_proxy_defaults(&target_sid.partition);
        let override_mode = self.override_mesh_gateway.mode;
        let mut mesh_gateway_customized = false;

        let target = self.target_mut(&target_id)?;
        target.subset = resolver
            .subsets
            .get(&service_subset)
            .cloned()
            .unwrap_or_default();
        target.connect_timeout = connect_timeout;

        if let Some(defaults) = service_defaults.filter(|d| !d.external_sni.is_empty()) {
            target.sni = defaults.external_sni.clone();
            target.external = true;
        }

        if target.external {
            let service = target.service.clone();
            let reject = |what: &str| {
                ChainError::graph(format!(
                    "service {service:?} has an external SNI set; cannot define {what} for external services"
                ))
            };
            if resolver.redirect.is_some() {
                return Err(reject("redirects"));
            }
            if !resolver.subsets.is_empty() {
                return Err(reject("subsets"));
            }
            if !resolver.failover.is_empty() {
                return Err(reject("failover"));
            }

            target.mesh_gateway.mode = MeshGatewayMode::Default;
        } else {
            target.mesh_gateway = service_defaults
                .map(|d| d.mesh_gateway)
                .unwrap_or_default();
            if target.mesh_gateway.mode == MeshGatewayMode::Default {
                if let Some(proxy) = proxy_defaults {
                    target.mesh_gateway.mode = proxy.mesh_gateway.mode;
                }
            }
            if override_mode != MeshGatewayMode::Default && target.mesh_gateway.mode != override_mode {
                target.mesh_gateway.mode = override_mode;
                mesh_gateway_customized = true;
            }
        }

        if mesh_gateway_customized {
            self.customized_by.mesh_gateway = true;
        }
        self.retained_targets.insert(target_id.clone());

        if recursed_for_failover {
            return Ok(node);
        }

        // Recorded before failover so the node exists while its failover
        // targets are resolved.
        self.record_node(DiscoveryGraphNode::Resolver(node.clone()));

        let Some(failover) = resolver.failover_for(&service_subset) else {
            return Ok(node);
        };

        let mut failover_targets = Vec::new();
        if !failover.datacenters.is_empty() {
            let mut opts = DiscoveryTargetOpts::from(failover);
            for datacenter in &failover.datacenters {
                opts.datacenter = datacenter.clone();
                failover_targets.push(self.rewrite_target(&target_id, &opts)?);
            }
        } else if !failover.targets.is_empty() {
            for failover_target in &failover.targets {
                let opts = DiscoveryTargetOpts::from(failover_target);
                failover_targets.push(self.rewrite_target(&target_id, &opts)?);
            }
        } else {
            let opts = DiscoveryTargetOpts::from(failover);
            failover_targets.push(self.rewrite_target(&target_id, &opts)?);
        }
        failover_targets.retain(|id| *id != target_id);

        if failover_targets.is_empty() {
            return Ok(node);
        }

        let mut resolved = DiscoveryFailover::default();
        for failover_target in failover_targets {
            let failover_node = self.get_resolver_node(failover_target, true)?;
            resolved.targets.push(failover_node.resolver.target);
        }
        debug!(target_id = %target_id, failover = ?resolved.targets, "resolved failover targets");

        node.resolver.failover = Some(resolved);
        self.record_node(DiscoveryGraphNode::Resolver(node.clone()));

        Ok(node)
    }
}
