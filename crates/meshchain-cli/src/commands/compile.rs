use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use meshchain_compiler::{CompiledDiscoveryChain, DiscoveryGraphNode, compile as compile_chain};
use meshchain_config::duration::format_duration;
use meshchain_config::{EntriesFile, MeshGatewayConfig, MeshGatewayMode, ServiceRoute};

use super::{Coordinates, describe_chain_error};

#[derive(Debug, Default)]
pub struct Overrides {
    pub protocol: Option<String>,
    pub mesh_gateway: Option<MeshGatewayMode>,
    pub connect_timeout: Option<Duration>,
}

pub fn compile(
    entries: &Path,
    service: &str,
    coordinates: &Coordinates,
    overrides: Overrides,
    format: &str,
) -> anyhow::Result<()> {
    let file = EntriesFile::from_file(entries)?;
    file.validate()?;
    let set = file.into_chain_set();

    let mut req = coordinates.request(service, &set);
    req.override_protocol = overrides.protocol;
    req.override_mesh_gateway = overrides.mesh_gateway.map(MeshGatewayConfig::new);
    req.override_connect_timeout = overrides.connect_timeout;

    let chain = compile_chain(req).map_err(describe_chain_error)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&chain)?),
        _ => print!("{}", render_chain(&chain)),
    }
    Ok(())
}

/// Human-readable tree of a compiled chain, from the start node down.
pub fn render_chain(chain: &CompiledDiscoveryChain) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "chain {} ({}/{} in {}), protocol {}{}",
        chain.service_name,
        chain.partition,
        chain.namespace,
        chain.datacenter,
        chain.protocol,
        if chain.default { ", default" } else { "" },
    );
    if !chain.customization_hash.is_empty() {
        let _ = writeln!(out, "customized: {}", chain.customization_hash);
    }
    render_node(chain, &chain.start_node, 1, &mut out);
    out
}

fn render_node(chain: &CompiledDiscoveryChain, key: &str, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let Some(node) = chain.node(key) else {
        let _ = writeln!(out, "{indent}{key} (missing)");
        return;
    };

    match node {
        DiscoveryGraphNode::Router(router) => {
            let _ = writeln!(out, "{indent}{key}");
            for route in &router.routes {
                let _ = writeln!(out, "{indent}  match {}", describe_match(&route.definition));
                render_node(chain, &route.next_node, depth + 2, out);
            }
        }
        DiscoveryGraphNode::Splitter(splitter) => {
            let _ = writeln!(out, "{indent}{key}");
            for split in &splitter.splits {
                let _ = writeln!(out, "{indent}  {}%", split.weight);
                render_node(chain, &split.next_node, depth + 2, out);
            }
        }
        DiscoveryGraphNode::Resolver(resolver) => {
            let r = &resolver.resolver;
            let _ = writeln!(
                out,
                "{indent}{key} (connect timeout {})",
                format_duration(r.connect_timeout)
            );
            if let Some(target) = chain.target(&r.target) {
                let _ = writeln!(
                    out,
                    "{indent}  target {} sni {}{}",
                    target.id,
                    target.sni,
                    if target.external { " (external)" } else { "" }
                );
            }
            if let Some(failover) = &r.failover {
                let _ = writeln!(out, "{indent}  failover {}", failover.targets.join(", "));
            }
        }
    }
}

fn describe_match(route: &ServiceRoute) -> String {
    let Some(http) = route.route_match.as_ref().and_then(|m| m.http.as_ref()) else {
        return "*".to_string();
    };

    let mut parts = Vec::new();
    if !http.path_exact.is_empty() {
        parts.push(format!("path = {}", http.path_exact));
    }
    if !http.path_prefix.is_empty() {
        parts.push(format!("path prefix {}", http.path_prefix));
    }
    if !http.path_regex.is_empty() {
        parts.push(format!("path ~ {}", http.path_regex));
    }
    for header in &http.header {
        parts.push(format!("header {}", header.name));
    }
    for param in &http.query_param {
        parts.push(format!("query {}", param.name));
    }
    if !http.methods.is_empty() {
        parts.push(http.methods.join("|"));
    }

    if parts.is_empty() {
        "*".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshchain_compiler::CompileRequest;
    use meshchain_config::DiscoveryChainSet;

    #[test]
    fn render_default_chain() {
        let entries = DiscoveryChainSet::new();
        let chain = compile_chain(CompileRequest::new("web", "dc1", "consul", &entries)).unwrap();

        let text = render_chain(&chain);
        assert!(text.starts_with("chain web (default/default in dc1), protocol tcp, default\n"));
        assert!(text.contains("resolver:web.default.default.dc1 (connect timeout 5s)"));
        assert!(text.contains("sni web.default.dc1.internal.consul"));
    }

    #[test]
    fn describe_catch_all() {
        let route = ServiceRoute::catch_all("web", "default", "default");
        assert_eq!(describe_match(&route), "path prefix /");
        assert_eq!(describe_match(&ServiceRoute::default()), "*");
    }
}
