//! One protocol per chain.
//!
//! Every service the compiler touches contributes its protocol; the first
//! one sets the chain's protocol and any later disagreement is a graph
//! error naming the offending service.

use meshchain_config::ServiceID;

use crate::compiler::Compiler;
use crate::error::{ChainError, ChainResult};

/// Protocol assumed when nothing declares one.
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// Whether routers and splitters may be used with `protocol`.
pub fn enable_advanced_routing_for_protocol(protocol: &str) -> bool {
    matches!(protocol, "http" | "http2" | "grpc")
}

impl Compiler<'_> {
    /// Record the protocol `sid` declares through its service defaults,
    /// else its partition's proxy defaults, else [`DEFAULT_PROTOCOL`].
    pub(crate) fn record_service_protocol(&mut self, sid: &ServiceID) -> ChainResult<()> {
        let entries = self.entries;

        if let Some(defaults) = entries.get_service(sid) {
            if !defaults.protocol.is_empty() {
                return self.record_protocol(sid, &defaults.protocol);
            }
        }
        if let Some(protocol) = entries
            .get_proxy_defaults(&sid.partition)
            .and_then(|p| p.protocol())
        {
            return self.record_protocol(sid, protocol);
        }
        self.record_protocol(sid, "")
    }

    pub(crate) fn record_protocol(&mut self, from_service: &ServiceID, protocol: &str) -> ChainResult<()> {
        let protocol = if protocol.is_empty() {
            DEFAULT_PROTOCOL.to_string()
        } else {
            protocol.to_ascii_lowercase()
        };

        if self.protocol.is_empty() {
            self.protocol = protocol;
        } else if self.protocol != protocol {
            return Err(ChainError::graph(format!(
                "discovery chain {:?} uses inconsistent protocols; service {:?} has {:?} which is not {:?}",
                self.service_name,
                from_service.to_string(),
                protocol,
                self.protocol
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_family_routes() {
        assert!(enable_advanced_routing_for_protocol("http"));
        assert!(enable_advanced_routing_for_protocol("http2"));
        assert!(enable_advanced_routing_for_protocol("grpc"));
        assert!(!enable_advanced_routing_for_protocol("tcp"));
        assert!(!enable_advanced_routing_for_protocol(""));
    }
}
