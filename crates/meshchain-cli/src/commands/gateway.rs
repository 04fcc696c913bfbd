use std::path::Path;

use serde::Serialize;

use meshchain_compiler::CompiledDiscoveryChain;
use meshchain_gateway::{GatewayChainSynthesizer, IngressService, RoutesFile};

use super::Coordinates;
use super::compile::render_chain;

#[derive(Debug, Serialize)]
struct GatewayOutput {
    ingress_services: Vec<IngressService>,
    chains: Vec<CompiledDiscoveryChain>,
}

pub fn gateway(
    routes: &Path,
    coordinates: &Coordinates,
    suffix: &str,
    format: &str,
) -> anyhow::Result<()> {
    let file = RoutesFile::from_file(routes)?;
    file.validate()?;

    let mut synth = GatewayChainSynthesizer::new(
        coordinates.datacenter.clone(),
        coordinates.trust_domain.clone(),
        suffix,
        file.gateway.clone(),
    );
    if let Some(hostname) = &file.listener_hostname {
        synth.set_hostname(hostname.clone());
    }
    for route in &file.http_routes {
        synth.add_http_route(route);
    }
    for route in &file.tcp_routes {
        synth.add_tcp_route(route.clone());
    }

    let (ingress_services, chains) = synth.synthesize()?;

    match format {
        "json" => {
            let output = GatewayOutput {
                ingress_services,
                chains,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            for service in &ingress_services {
                let hosts = if service.hosts.is_empty() {
                    "(tcp)".to_string()
                } else {
                    service.hosts.join(", ")
                };
                println!("ingress {} -> {hosts}", service.name);
            }
            for chain in &chains {
                println!();
                print!("{}", render_chain(chain));
            }
        }
    }
    Ok(())
}
