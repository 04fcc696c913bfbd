//! The config entry enum plus the defaults entries the compiler consults.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::resolver::ServiceResolverConfigEntry;
use crate::router::ServiceRouterConfigEntry;
use crate::service::{DEFAULT_PARTITION, EnterpriseMeta, ServiceID, or_default};
use crate::splitter::ServiceSplitterConfigEntry;

pub const SERVICE_DEFAULTS: &str = "service-defaults";
pub const PROXY_DEFAULTS: &str = "proxy-defaults";
pub const SERVICE_ROUTER: &str = "service-router";
pub const SERVICE_SPLITTER: &str = "service-splitter";
pub const SERVICE_RESOLVER: &str = "service-resolver";

/// Name every proxy-defaults entry carries.
pub const PROXY_CONFIG_GLOBAL: &str = "global";

/// Any config entry, tagged by `kind` in entry files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConfigEntry {
    ServiceDefaults(ServiceConfigEntry),
    ProxyDefaults(ProxyConfigEntry),
    ServiceRouter(ServiceRouterConfigEntry),
    ServiceSplitter(ServiceSplitterConfigEntry),
    ServiceResolver(ServiceResolverConfigEntry),
}

impl ConfigEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigEntry::ServiceDefaults(_) => SERVICE_DEFAULTS,
            ConfigEntry::ProxyDefaults(_) => PROXY_DEFAULTS,
            ConfigEntry::ServiceRouter(_) => SERVICE_ROUTER,
            ConfigEntry::ServiceSplitter(_) => SERVICE_SPLITTER,
            ConfigEntry::ServiceResolver(_) => SERVICE_RESOLVER,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ConfigEntry::ServiceDefaults(e) => &e.name,
            ConfigEntry::ProxyDefaults(e) => &e.name,
            ConfigEntry::ServiceRouter(e) => &e.name,
            ConfigEntry::ServiceSplitter(e) => &e.name,
            ConfigEntry::ServiceResolver(e) => &e.name,
        }
    }

    /// The service this entry configures. Proxy defaults apply to a whole
    /// partition and have none.
    pub fn service_id(&self) -> Option<ServiceID> {
        match self {
            ConfigEntry::ServiceDefaults(e) => Some(e.service_id()),
            ConfigEntry::ProxyDefaults(_) => None,
            ConfigEntry::ServiceRouter(e) => Some(e.service_id()),
            ConfigEntry::ServiceSplitter(e) => Some(e.service_id()),
            ConfigEntry::ServiceResolver(e) => Some(e.service_id()),
        }
    }

    pub fn normalize(&mut self) {
        match self {
            ConfigEntry::ServiceDefaults(e) => e.normalize(),
            ConfigEntry::ProxyDefaults(e) => e.normalize(),
            ConfigEntry::ServiceRouter(_)
            | ConfigEntry::ServiceSplitter(_)
            | ConfigEntry::ServiceResolver(_) => {}
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            ConfigEntry::ServiceDefaults(e) => e.validate(),
            ConfigEntry::ProxyDefaults(e) => e.validate(),
            ConfigEntry::ServiceRouter(e) => e.validate(),
            ConfigEntry::ServiceSplitter(e) => e.validate(),
            ConfigEntry::ServiceResolver(e) => e.validate(),
        }
    }
}

// ── Mesh gateway ──────────────────────────────────────────────────

/// How traffic to a target traverses mesh gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshGatewayMode {
    /// Defer to the next, less specific, setting.
    #[default]
    #[serde(alias = "")]
    Default,
    /// Connect directly to the target.
    None,
    /// Egress through the local datacenter's gateway.
    Local,
    /// Ingress through the target datacenter's gateway.
    Remote,
}

impl MeshGatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshGatewayMode::Default => "default",
            MeshGatewayMode::None => "none",
            MeshGatewayMode::Local => "local",
            MeshGatewayMode::Remote => "remote",
        }
    }
}

impl fmt::Display for MeshGatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeshGatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(MeshGatewayMode::Default),
            "none" => Ok(MeshGatewayMode::None),
            "local" => Ok(MeshGatewayMode::Local),
            "remote" => Ok(MeshGatewayMode::Remote),
            other => Err(format!("invalid mesh gateway mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshGatewayConfig {
    #[serde(default)]
    pub mode: MeshGatewayMode,
}

impl MeshGatewayConfig {
    pub fn new(mode: MeshGatewayMode) -> Self {
        Self { mode }
    }
}

// ── Service defaults ──────────────────────────────────────────────

/// Proxy extension attached to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvoyExtension {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, serde_json::Value>,
}

/// `service-defaults`: per-service protocol and gateway hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfigEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    /// "tcp", "http", "http2", or "grpc". Empty defers to proxy defaults.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(default)]
    pub mesh_gateway: MeshGatewayConfig,
    /// SNI to present for a service that lives outside the mesh.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_sni: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envoy_extensions: Vec<EnvoyExtension>,
}

impl ServiceConfigEntry {
    /// Service defaults declaring only a protocol.
    pub fn with_protocol(name: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            ..Default::default()
        }
    }

    pub fn enterprise_meta(&self) -> EnterpriseMeta {
        EnterpriseMeta::new(self.namespace.clone(), self.partition.clone())
    }

    pub fn service_id(&self) -> ServiceID {
        ServiceID::new(self.name.clone(), &self.enterprise_meta())
    }

    pub fn normalize(&mut self) {
        self.protocol = self.protocol.to_ascii_lowercase();
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::invalid(SERVICE_DEFAULTS, &self.name, "name is required"));
        }
        Ok(())
    }
}

// ── Proxy defaults ────────────────────────────────────────────────

/// `proxy-defaults`: partition-wide proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfigEntry {
    #[serde(default = "proxy_config_global")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    /// Opaque proxy config; only `protocol` is read by the compiler.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub mesh_gateway: MeshGatewayConfig,
}

fn proxy_config_global() -> String {
    PROXY_CONFIG_GLOBAL.to_string()
}

impl Default for ProxyConfigEntry {
    fn default() -> Self {
        Self {
            name: proxy_config_global(),
            partition: String::new(),
            config: BTreeMap::new(),
            mesh_gateway: MeshGatewayConfig::default(),
        }
    }
}

impl ProxyConfigEntry {
    /// Proxy defaults declaring only a protocol.
    pub fn with_protocol(protocol: impl Into<String>) -> Self {
        let mut entry = Self::default();
        entry
            .config
            .insert("protocol".to_string(), serde_json::Value::String(protocol.into()));
        entry
    }

    pub fn partition_or_default(&self) -> &str {
        or_default(&self.partition, DEFAULT_PARTITION)
    }

    /// The `protocol` key of the opaque config, when it is a non-empty
    /// string. Anything else is ignored.
    pub fn protocol(&self) -> Option<&str> {
        self.config
            .get("protocol")
            .and_then(serde_json::Value::as_str)
            .filter(|p| !p.is_empty())
    }

    pub fn normalize(&mut self) {
        if self.name.is_empty() {
            self.name = proxy_config_global();
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name != PROXY_CONFIG_GLOBAL {
            return Err(ConfigError::invalid(
                PROXY_DEFAULTS,
                &self.name,
                format!("proxy-defaults must be named {PROXY_CONFIG_GLOBAL:?}"),
            ));
        }
        Ok(())
    }
}
