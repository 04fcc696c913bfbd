//! Gateway chain synthesis.
//!
//! An API gateway listener carries any number of HTTP and TCP routes. HTTP
//! routes are regrouped by hostname: every match from every route bound to
//! a hostname lands in one consolidated route for that hostname, ordered by
//! precedence. Each consolidated route then becomes a small discovery chain
//! (router, splitters, service defaults) that the compiler can consume.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use meshchain_compiler::{CompileRequest, CompiledDiscoveryChain, DiscoveryGraphNode, compile};
use meshchain_config::DiscoveryChainSet;

use crate::error::{GatewayError, GatewayResult};
use crate::http::{compare_http_matches, http_route_to_discovery_chain};
use crate::route::{
    ApiGateway, HttpFilters, HttpMatch, HttpPathMatch, HttpRouteConfigEntry, HttpRouteRule,
    HttpService, IngressService, TcpRouteConfigEntry, WILDCARD_HOSTNAME,
};

/// One match on one hostname, with the rule it came from.
#[derive(Debug, Clone)]
struct HostnameMatch {
    route_match: HttpMatch,
    filters: HttpFilters,
    services: Vec<HttpService>,
}

/// Collects routes bound to one gateway listener and turns them into
/// ingress services plus discovery chain entries.
#[derive(Debug, Clone)]
pub struct GatewayChainSynthesizer {
    datacenter: String,
    trust_domain: String,
    suffix: String,
    gateway: ApiGateway,
    hostname: String,
    matches_by_hostname: BTreeMap<String, Vec<HostnameMatch>>,
    tcp_routes: Vec<TcpRouteConfigEntry>,
}

impl GatewayChainSynthesizer {
    pub fn new(
        datacenter: impl Into<String>,
        trust_domain: impl Into<String>,
        suffix: impl Into<String>,
        gateway: ApiGateway,
    ) -> Self {
        Self {
            datacenter: datacenter.into(),
            trust_domain: trust_domain.into(),
            suffix: suffix.into(),
            gateway,
            hostname: WILDCARD_HOSTNAME.to_string(),
            matches_by_hostname: BTreeMap::new(),
            tcp_routes: Vec::new(),
        }
    }

    /// Listener hostname routes are filtered against. Applies to routes
    /// added afterwards.
    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.hostname = hostname.into();
    }

    pub fn add_http_route(&mut self, route: &HttpRouteConfigEntry) {
        for host in route.filtered_hostnames(&self.hostname) {
            let matches = self.matches_by_hostname.entry(host).or_default();
            for rule in &route.rules {
                let default_match = [HttpMatch {
                    path: HttpPathMatch::prefix("/"),
                    ..Default::default()
                }];
                let rule_matches: &[HttpMatch] = if rule.matches.is_empty() {
                    &default_match
                } else {
                    &rule.matches
                };

                for m in rule_matches {
                    matches.push(HostnameMatch {
                        route_match: m.clone(),
                        filters: rule.filters.clone(),
                        services: rule.services.clone(),
                    });
                }
            }
        }
    }

    pub fn add_tcp_route(&mut self, route: TcpRouteConfigEntry) {
        self.tcp_routes.push(route);
    }

    /// One route per hostname, rules in precedence order. Hostnames are
    /// visited in sorted order.
    fn consolidate_http_routes(&self) -> Vec<HttpRouteConfigEntry> {
        let meta = self.gateway.enterprise_meta();

        self.matches_by_hostname
            .iter()
            .map(|(hostname, matches)| {
                let mut matches = matches.clone();
                // Stable: equal precedence keeps insertion order.
                matches.sort_by(|a, b| compare_http_matches(&a.route_match, &b.route_match));

                let hostnames = vec![hostname.clone()];
                HttpRouteConfigEntry {
                    name: format!("{}-{}-{}", self.gateway.name, self.suffix, hosts_key(&hostnames)),
                    namespace: meta.namespace.clone(),
                    partition: meta.partition.clone(),
                    hostnames,
                    rules: matches
                        .into_iter()
                        .map(|m| HttpRouteRule {
                            matches: vec![m.route_match],
                            filters: m.filters,
                            services: m.services,
                        })
                        .collect(),
                    meta: self.gateway.meta.clone(),
                }
            })
            .collect()
    }

    /// Ingress services plus the entry set for each consolidated HTTP route,
    /// in the same order. TCP routes only contribute ingress services, after
    /// the HTTP ones.
    pub fn synthesize_entries(&self) -> (Vec<IngressService>, Vec<DiscoveryChainSet>) {
        let mut services = Vec::new();
        let mut entries = Vec::new();

        for route in self.consolidate_http_routes() {
            let synthesized = http_route_to_discovery_chain(&route);

            services.push(IngressService {
                name: synthesized.router.name.clone(),
                namespace: route.namespace_or_default().to_string(),
                partition: route.partition_or_default().to_string(),
                hosts: route.hostnames.clone(),
                meta: route.meta.clone(),
            });

            let mut set = DiscoveryChainSet::new();
            set.add_routers([synthesized.router]);
            set.add_splitters(synthesized.splitters);
            set.add_services(synthesized.defaults);
            entries.push(set);
        }

        let meta = self.gateway.enterprise_meta();
        for route in &self.tcp_routes {
            for service in &route.services {
                services.push(IngressService {
                    name: service.name.clone(),
                    namespace: if service.namespace.is_empty() {
                        meta.namespace.clone()
                    } else {
                        service.namespace.clone()
                    },
                    partition: if service.partition.is_empty() {
                        meta.partition.clone()
                    } else {
                        service.partition.clone()
                    },
                    ..Default::default()
                });
            }
        }

        debug!(
            gateway = %self.gateway.name,
            ingress_services = services.len(),
            chains = entries.len(),
            "synthesized gateway entries"
        );
        (services, entries)
    }

    /// Synthesize and compile. Only HTTP ingress services get a chain;
    /// chains are returned in ingress-service order.
    ///
    /// The router's catch-all route to its own virtual service, and the
    /// resolver that route leads to, are removed: a gateway route has no
    /// backend of its own to fall back to.
    pub fn synthesize(&self) -> GatewayResult<(Vec<IngressService>, Vec<CompiledDiscoveryChain>)> {
        let (services, entries) = self.synthesize_entries();

        let mut chains = Vec::with_capacity(entries.len());
        for (service, set) in services.iter().zip(&entries) {
            let mut chain = compile(CompileRequest {
                service_name: service.name.clone(),
                evaluate_in_namespace: service.namespace.clone(),
                evaluate_in_partition: service.partition.clone(),
                evaluate_in_datacenter: self.datacenter.clone(),
                evaluate_in_trust_domain: self.trust_domain.clone(),
                entries: Some(set),
                ..Default::default()
            })
            .map_err(|source| GatewayError::Compile {
                service: service.name.clone(),
                source,
            })?;

            strip_router_fallback(&mut chain);
            chains.push(chain);
        }

        info!(gateway = %self.gateway.name, chains = chains.len(), "compiled gateway chains");
        Ok((services, chains))
    }
}

fn strip_router_fallback(chain: &mut CompiledDiscoveryChain) {
    let Some(DiscoveryGraphNode::Router(router)) = chain.nodes.get_mut(&chain.start_node) else {
        return;
    };

    let target_prefix = format!("{}.", router.name);
    let resolver_prefix = format!("resolver:{target_prefix}");
    router
        .routes
        .retain(|route| !route.next_node.starts_with(&resolver_prefix));

    chain.nodes.retain(|key, _| !key.starts_with(&resolver_prefix));
    chain.targets.retain(|id, _| !id.starts_with(&target_prefix));
}

/// Short stable key for a set of hostnames: the first 8 hex characters of
/// a SHA-256 over the sorted names, each newline-terminated.
pub fn hosts_key(hostnames: &[String]) -> String {
    let mut sorted: Vec<&str> = hostnames.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for host in sorted {
        hasher.update(host.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_key_ignores_order() {
        let a = hosts_key(&["b.example.com".to_string(), "a.example.com".to_string()]);
        let b = hosts_key(&["a.example.com".to_string(), "b.example.com".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, hosts_key(&["a.example.com".to_string()]));
    }

    #[test]
    fn hosts_key_separates_names() {
        let split = hosts_key(&["ab.example".to_string(), "c.example".to_string()]);
        let joined = hosts_key(&["ab.examplec.example".to_string()]);
        assert_ne!(split, joined);
    }

    #[test]
    fn rules_without_matches_get_root_prefix() {
        let mut synth = GatewayChainSynthesizer::new("dc1", "trust", "http", ApiGateway::new("edge"));
        synth.add_http_route(&HttpRouteConfigEntry {
            name: "r".to_string(),
            rules: vec![HttpRouteRule {
                services: vec![HttpService::new("web")],
                ..Default::default()
            }],
            ..Default::default()
        });

        let routes = synth.consolidate_http_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].hostnames, ["*"]);
        assert_eq!(routes[0].rules[0].matches[0].path, HttpPathMatch::prefix("/"));
    }
}
