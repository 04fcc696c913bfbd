//! Gateway synthesis through compilation.

use meshchain_compiler::{DiscoveryGraphNode, NodeType};
use meshchain_gateway::*;

fn prefix(value: &str) -> HttpMatch {
    HttpMatch {
        path: HttpPathMatch::prefix(value),
        ..Default::default()
    }
}

fn api_route() -> HttpRouteConfigEntry {
    HttpRouteConfigEntry {
        name: "api".to_string(),
        hostnames: vec!["api.example.com".to_string()],
        rules: vec![
            HttpRouteRule {
                matches: vec![prefix("/")],
                services: vec![HttpService::new("api")],
                ..Default::default()
            },
            HttpRouteRule {
                matches: vec![HttpMatch {
                    headers: vec![HttpHeaderMatch {
                        name: "x-canary".to_string(),
                        match_type: HttpHeaderMatchType::Present,
                        value: String::new(),
                    }],
                    ..prefix("/v2")
                }],
                services: vec![HttpService::new("blue"), HttpService::new("green")],
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

fn synthesizer() -> GatewayChainSynthesizer {
    GatewayChainSynthesizer::new("dc1", "trust.consul", "http", ApiGateway::new("edge"))
}

#[test]
fn http_route_compiles_to_router_chain() {
    let mut synth = synthesizer();
    synth.add_http_route(&api_route());

    let (services, chains) = synth.synthesize().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(chains.len(), 1);

    let key = hosts_key(&["api.example.com".to_string()]);
    let name = format!("edge-http-{key}");
    assert_eq!(services[0].name, name);
    assert_eq!(services[0].hosts, ["api.example.com"]);

    let chain = &chains[0];
    assert_eq!(chain.protocol, "http");
    assert_eq!(chain.start_node, format!("router:{name}.default.default"));

    let Some(DiscoveryGraphNode::Router(router)) = chain.start() else {
        panic!("start node is not a router");
    };
    // The longer path sorts first; the router's own fallback is gone.
    let next: Vec<&str> = router.routes.iter().map(|r| r.next_node.as_str()).collect();
    assert_eq!(
        next,
        [
            format!("splitter:{name}-0.default.default").as_str(),
            "resolver:api.default.default.dc1",
        ]
    );

    let splitter = chain
        .node(&router.routes[0].next_node)
        .and_then(DiscoveryGraphNode::as_splitter)
        .unwrap();
    let weights: Vec<f32> = splitter.splits.iter().map(|s| s.weight).collect();
    assert_eq!(weights, [50.0, 50.0]);

    assert!(
        !chain
            .nodes
            .keys()
            .any(|k| k.starts_with(&format!("resolver:{name}")))
    );
    let targets: Vec<&str> = chain.targets.keys().map(String::as_str).collect();
    assert_eq!(
        targets,
        [
            "api.default.default.dc1",
            "blue.default.default.dc1",
            "green.default.default.dc1",
        ]
    );
    assert_eq!(
        chain
            .nodes
            .values()
            .filter(|n| n.node_type() == NodeType::Resolver)
            .count(),
        3
    );
}

#[test]
fn routes_are_grouped_by_hostname() {
    let mut synth = synthesizer();
    synth.add_http_route(&api_route());
    synth.add_http_route(&HttpRouteConfigEntry {
        name: "admin".to_string(),
        hostnames: vec!["api.example.com".to_string(), "admin.example.com".to_string()],
        rules: vec![HttpRouteRule {
            matches: vec![prefix("/admin")],
            services: vec![HttpService::new("admin")],
            ..Default::default()
        }],
        ..Default::default()
    });

    let (services, entries) = synth.synthesize_entries();
    let hosts: Vec<&str> = services.iter().map(|s| s.hosts[0].as_str()).collect();
    assert_eq!(hosts, ["admin.example.com", "api.example.com"]);
    assert_eq!(entries.len(), 2);

    // api.example.com: "/admin" outranks "/v2", which outranks "/".
    let api = &entries[1];
    let router = api.routers.values().next().unwrap();
    let prefixes: Vec<&str> = router
        .routes
        .iter()
        .map(|r| r.route_match.as_ref().unwrap().http.as_ref().unwrap().path_prefix.as_str())
        .collect();
    assert_eq!(prefixes, ["/admin", "/v2", "/"]);
    assert!(api.services.values().all(|d| d.protocol == "http"));
}

#[test]
fn listener_hostname_filters_routes() {
    let mut synth = synthesizer();
    synth.set_hostname("*.example.org");
    synth.add_http_route(&api_route());

    let (services, chains) = synth.synthesize().unwrap();
    assert!(services.is_empty());
    assert!(chains.is_empty());
}

#[test]
fn tcp_routes_become_ingress_services() {
    let mut synth = synthesizer();
    synth.add_http_route(&api_route());
    synth.add_tcp_route(TcpRouteConfigEntry {
        name: "db".to_string(),
        services: vec![TcpService {
            name: "postgres".to_string(),
            ..Default::default()
        }],
    });

    let (services, chains) = synth.synthesize().unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(chains.len(), 1);
    assert_eq!(services[1].name, "postgres");
    assert_eq!(services[1].namespace, "default");
    assert!(services[1].hosts.is_empty());
}
