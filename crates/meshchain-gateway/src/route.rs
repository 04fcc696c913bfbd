//! API gateway and route definitions, plus the routes file they load from.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use meshchain_config::{DEFAULT_NAMESPACE, DEFAULT_PARTITION, EnterpriseMeta};

use crate::error::{GatewayError, GatewayResult};

pub const HTTP_ROUTE: &str = "http-route";
pub const TCP_ROUTE: &str = "tcp-route";

/// Hostname a listener answers for when none is configured.
pub const WILDCARD_HOSTNAME: &str = "*";

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

// ── Gateway ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiGateway {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl ApiGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn enterprise_meta(&self) -> EnterpriseMeta {
        EnterpriseMeta::new(self.namespace.clone(), self.partition.clone()).normalized()
    }
}

// ── HTTP matches ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpPathMatchType {
    Exact,
    #[default]
    Prefix,
    Regex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpPathMatch {
    #[serde(default, rename = "match")]
    pub match_type: HttpPathMatchType,
    #[serde(default)]
    pub value: String,
}

impl HttpPathMatch {
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            match_type: HttpPathMatchType::Prefix,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpHeaderMatchType {
    #[default]
    Exact,
    Prefix,
    Suffix,
    Present,
    Regex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaderMatch {
    #[serde(default, rename = "match")]
    pub match_type: HttpHeaderMatchType,
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpQueryMatchType {
    #[default]
    Exact,
    Present,
    Regex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpQueryMatch {
    #[serde(default, rename = "match")]
    pub match_type: HttpQueryMatchType,
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMatchMethod {
    #[default]
    All,
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl HttpMatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMatchMethod::All => "ALL",
            HttpMatchMethod::Connect => "CONNECT",
            HttpMatchMethod::Delete => "DELETE",
            HttpMatchMethod::Get => "GET",
            HttpMatchMethod::Head => "HEAD",
            HttpMatchMethod::Options => "OPTIONS",
            HttpMatchMethod::Patch => "PATCH",
            HttpMatchMethod::Post => "POST",
            HttpMatchMethod::Put => "PUT",
            HttpMatchMethod::Trace => "TRACE",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMatch {
    #[serde(default)]
    pub path: HttpPathMatch,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HttpHeaderMatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<HttpQueryMatch>,
    #[serde(default)]
    pub method: HttpMatchMethod,
}

// ── HTTP filters and services ─────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaderFilter {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRewrite {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HttpHeaderFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_rewrite: Option<UrlRewrite>,
}

fn default_weight() -> u32 {
    1
}

/// A backend of an HTTP route rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpService {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    /// Relative weight among the rule's services. Zero takes no traffic.
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub filters: HttpFilters,
}

impl HttpService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            partition: String::new(),
            weight: default_weight(),
            filters: HttpFilters::default(),
        }
    }

    pub fn namespace_or_default(&self) -> &str {
        or_default(&self.namespace, DEFAULT_NAMESPACE)
    }

    pub fn partition_or_default(&self) -> &str {
        or_default(&self.partition, DEFAULT_PARTITION)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRouteRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpMatch>,
    #[serde(default)]
    pub filters: HttpFilters,
    #[serde(default)]
    pub services: Vec<HttpService>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRouteConfigEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub rules: Vec<HttpRouteRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl HttpRouteConfigEntry {
    pub fn namespace_or_default(&self) -> &str {
        or_default(&self.namespace, DEFAULT_NAMESPACE)
    }

    pub fn partition_or_default(&self) -> &str {
        or_default(&self.partition, DEFAULT_PARTITION)
    }

    /// Hostnames of this route that a listener bound to
    /// `listener_hostname` serves. A route without hostnames takes the
    /// listener's.
    pub fn filtered_hostnames(&self, listener_hostname: &str) -> Vec<String> {
        if self.hostnames.is_empty() {
            return vec![listener_hostname.to_string()];
        }
        self.hostnames
            .iter()
            .filter(|h| hostname_matches(listener_hostname, h))
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> GatewayResult<()> {
        let invalid = |reason: String| GatewayError::invalid(HTTP_ROUTE, &self.name, reason);

        if self.name.is_empty() {
            return Err(invalid("name is required".to_string()));
        }
        for (idx, rule) in self.rules.iter().enumerate() {
            for service in &rule.services {
                if service.name.is_empty() {
                    return Err(invalid(format!("rule {idx}: service name is required")));
                }
            }
            for m in &rule.matches {
                if m.headers.iter().any(|h| h.name.is_empty()) {
                    return Err(invalid(format!("rule {idx}: header match without a name")));
                }
                if m.query.iter().any(|q| q.name.is_empty()) {
                    return Err(invalid(format!("rule {idx}: query match without a name")));
                }
            }
        }
        Ok(())
    }
}

/// Whether a route hostname is served by a listener hostname. `*` serves
/// everything; `*.example.com` serves any subdomain of `example.com`.
pub fn hostname_matches(listener_hostname: &str, hostname: &str) -> bool {
    if listener_hostname.is_empty() || listener_hostname == WILDCARD_HOSTNAME {
        return true;
    }
    if listener_hostname == hostname {
        return true;
    }
    match listener_hostname.strip_prefix("*.") {
        Some(domain) => hostname
            .strip_suffix(domain)
            .is_some_and(|sub| sub.len() > 1 && sub.ends_with('.')),
        None => false,
    }
}

// ── TCP ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpService {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpRouteConfigEntry {
    pub name: String,
    #[serde(default)]
    pub services: Vec<TcpService>,
}

impl TcpRouteConfigEntry {
    pub fn validate(&self) -> GatewayResult<()> {
        let invalid = |reason: &str| GatewayError::invalid(TCP_ROUTE, &self.name, reason);

        if self.name.is_empty() {
            return Err(invalid("name is required"));
        }
        if self.services.len() != 1 {
            return Err(invalid("exactly one service is required"));
        }
        if self.services[0].name.is_empty() {
            return Err(invalid("service name is required"));
        }
        Ok(())
    }
}

// ── Ingress output ────────────────────────────────────────────────

/// A service the gateway exposes: one per consolidated HTTP route or TCP
/// route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressService {
    pub name: String,
    pub namespace: String,
    pub partition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

// ── Routes file ───────────────────────────────────────────────────

/// A gateway plus the routes bound to it.
///
/// ```toml
/// datacenter = "dc1"
///
/// [gateway]
/// name = "edge"
///
/// [[http_routes]]
/// name = "api"
/// hostnames = ["api.example.com"]
///
/// [[http_routes.rules]]
/// services = [{ name = "api" }]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutesFile {
    pub gateway: ApiGateway,
    /// Listener hostname; `*` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_routes: Vec<HttpRouteConfigEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_routes: Vec<TcpRouteConfigEntry>,
}

impl RoutesFile {
    /// Load from `.toml` or `.json`, chosen by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading routes file {}", path.display()))?;
        let file: RoutesFile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => anyhow::bail!("unsupported routes file format: {:?}", other.unwrap_or("")),
        };
        debug!(
            path = %path.display(),
            http_routes = file.http_routes.len(),
            tcp_routes = file.tcp_routes.len(),
            "loaded gateway routes"
        );
        Ok(file)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.gateway.name.is_empty() {
            return Err(GatewayError::invalid("api-gateway", "", "name is required"));
        }
        for route in &self.http_routes {
            route.validate()?;
        }
        for route in &self.tcp_routes {
            route.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(hostnames: &[&str]) -> HttpRouteConfigEntry {
        HttpRouteConfigEntry {
            name: "r".to_string(),
            hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn wildcard_listener_serves_everything() {
        assert!(hostname_matches("*", "api.example.com"));
        assert!(hostname_matches("", "anything"));
    }

    #[test]
    fn subdomain_wildcard() {
        assert!(hostname_matches("*.example.com", "api.example.com"));
        assert!(hostname_matches("*.example.com", "a.b.example.com"));
        assert!(!hostname_matches("*.example.com", "example.com"));
        assert!(!hostname_matches("*.example.com", "api.example.org"));
        assert!(!hostname_matches("*.example.com", "apiexample.com"));
    }

    #[test]
    fn route_without_hostnames_takes_listener() {
        assert_eq!(route(&[]).filtered_hostnames("*.example.com"), ["*.example.com"]);
        assert_eq!(
            route(&["a.example.com", "b.example.org"]).filtered_hostnames("*.example.com"),
            ["a.example.com"]
        );
    }

    #[test]
    fn tcp_route_needs_one_service() {
        let mut tcp = TcpRouteConfigEntry {
            name: "db".to_string(),
            services: vec![],
        };
        assert!(tcp.validate().is_err());
        tcp.services.push(TcpService {
            name: "postgres".to_string(),
            ..Default::default()
        });
        assert!(tcp.validate().is_ok());
    }

    #[test]
    fn parse_routes_toml() {
        let toml_str = r#"
[gateway]
name = "edge"

[[http_routes]]
name = "api"
hostnames = ["api.example.com"]

[[http_routes.rules]]
matches = [{ path = { match = "exact", value = "/health" }, method = "GET" }]
services = [{ name = "api" }, { name = "api-canary", weight = 0 }]

[[tcp_routes]]
name = "db"
services = [{ name = "postgres" }]
"#;
        let file: RoutesFile = toml::from_str(toml_str).unwrap();
        file.validate().unwrap();

        let rule = &file.http_routes[0].rules[0];
        assert_eq!(rule.matches[0].path.match_type, HttpPathMatchType::Exact);
        assert_eq!(rule.matches[0].method, HttpMatchMethod::Get);
        assert_eq!(rule.services[0].weight, 1);
        assert_eq!(rule.services[1].weight, 0);
        assert_eq!(file.tcp_routes[0].services[0].name, "postgres");
    }

    #[test]
    fn load_json_routes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(
            &path,
            r#"{"gateway": {"name": "edge"}, "listener_hostname": "*.example.com"}"#,
        )
        .unwrap();

        let file = RoutesFile::from_file(&path).unwrap();
        assert_eq!(file.gateway.name, "edge");
        assert_eq!(file.listener_hostname.as_deref(), Some("*.example.com"));
        assert!(file.http_routes.is_empty());
    }
}
