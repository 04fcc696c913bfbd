pub mod compile;
pub mod gateway;
pub mod validate;

use clap::Args;

use meshchain_compiler::{ChainError, CompileRequest};
use meshchain_config::{DEFAULT_NAMESPACE, DEFAULT_PARTITION, DiscoveryChainSet};

/// Where chains are evaluated.
#[derive(Args, Debug, Clone)]
pub struct Coordinates {
    /// Namespace to evaluate in
    #[arg(long, default_value = DEFAULT_NAMESPACE, env = "MESHCHAIN_NAMESPACE")]
    pub namespace: String,
    /// Admin partition to evaluate in
    #[arg(long, default_value = DEFAULT_PARTITION, env = "MESHCHAIN_PARTITION")]
    pub partition: String,
    /// Datacenter to evaluate in
    #[arg(long, default_value = "dc1", env = "MESHCHAIN_DATACENTER")]
    pub datacenter: String,
    /// Trust domain used to build SNI names
    #[arg(long, default_value = "consul", env = "MESHCHAIN_TRUST_DOMAIN")]
    pub trust_domain: String,
}

impl Coordinates {
    pub fn request<'a>(&self, service: &str, entries: &'a DiscoveryChainSet) -> CompileRequest<'a> {
        CompileRequest {
            service_name: service.to_string(),
            evaluate_in_namespace: self.namespace.clone(),
            evaluate_in_partition: self.partition.clone(),
            evaluate_in_datacenter: self.datacenter.clone(),
            evaluate_in_trust_domain: self.trust_domain.clone(),
            entries: Some(entries),
            ..Default::default()
        }
    }
}

/// Graph errors are problems with the entries, not with the tool.
pub fn describe_chain_error(err: ChainError) -> anyhow::Error {
    if err.is_graph_error() {
        anyhow::anyhow!("invalid configuration: {err}")
    } else {
        anyhow::Error::new(err)
    }
}
