//! `service-router` entries.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{is_zero, serde_str};
use crate::entry::SERVICE_ROUTER;
use crate::error::{ConfigError, ConfigResult};
use crate::headers::HttpHeaderModifiers;
use crate::service::{EnterpriseMeta, ServiceID};

/// Ordered L7 routing rules for one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRouterConfigEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default)]
    pub routes: Vec<ServiceRoute>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

/// One match predicate and where matching traffic goes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRoute {
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub route_match: Option<ServiceRouteMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<ServiceRouteDestination>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<ServiceRouteHttpMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRouteHttpMatch {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_exact: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_regex: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<ServiceRouteHttpMatchHeader>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_param: Vec<ServiceRouteHttpMatchQueryParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRouteHttpMatchHeader {
    pub name: String,
    #[serde(default)]
    pub present: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exact: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,
    #[serde(default)]
    pub invert: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRouteHttpMatchQueryParam {
    pub name: String,
    #[serde(default)]
    pub present: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exact: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,
}

/// Where a matched request is sent, plus per-route request handling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRouteDestination {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_subset: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix_rewrite: String,
    #[serde(default, with = "serde_str", skip_serializing_if = "is_zero")]
    pub request_timeout: Duration,
    #[serde(default, with = "serde_str", skip_serializing_if = "is_zero")]
    pub idle_timeout: Duration,
    #[serde(default)]
    pub num_retries: u32,
    #[serde(default)]
    pub retry_on_connect_failure: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on_status_codes: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HttpHeaderModifiers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HttpHeaderModifiers>,
}

impl ServiceRoute {
    /// Catch-all route appended after a router's explicit routes.
    pub fn catch_all(service: &str, namespace: &str, partition: &str) -> Self {
        Self {
            route_match: Some(ServiceRouteMatch {
                http: Some(ServiceRouteHttpMatch {
                    path_prefix: "/".to_string(),
                    ..Default::default()
                }),
            }),
            destination: Some(ServiceRouteDestination {
                service: service.to_string(),
                namespace: namespace.to_string(),
                partition: partition.to_string(),
                ..Default::default()
            }),
        }
    }
}

impl ServiceRouterConfigEntry {
    pub fn enterprise_meta(&self) -> EnterpriseMeta {
        EnterpriseMeta::new(self.namespace.clone(), self.partition.clone())
    }

    pub fn service_id(&self) -> ServiceID {
        ServiceID::new(self.name.clone(), &self.enterprise_meta())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::invalid(SERVICE_ROUTER, &self.name, reason);

        if self.name.is_empty() {
            return Err(invalid("name is required".to_string()));
        }

        for (i, route) in self.routes.iter().enumerate() {
            let http = route.route_match.as_ref().and_then(|m| m.http.as_ref());

            if let Some(http) = http {
                validate_http_match(http).map_err(|e| invalid(format!("Route[{i}] {e}")))?;
            }

            let Some(dest) = &route.destination else { continue };
            if !dest.prefix_rewrite.is_empty() {
                let has_path = http
                    .is_some_and(|h| !h.path_exact.is_empty() || !h.path_prefix.is_empty());
                if !has_path {
                    return Err(invalid(format!(
                        "Route[{i}] cannot make use of PrefixRewrite without configuring either PathExact or PathPrefix"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_http_match(http: &ServiceRouteHttpMatch) -> Result<(), String> {
    let path_parts = [&http.path_exact, &http.path_prefix, &http.path_regex]
        .iter()
        .filter(|p| !p.is_empty())
        .count();
    if path_parts > 1 {
        return Err("should only contain at most one of PathExact, PathPrefix, or PathRegex".into());
    }
    if !http.path_exact.is_empty() && !http.path_exact.starts_with('/') {
        return Err(format!("PathExact doesn't start with '/': {:?}", http.path_exact));
    }
    if !http.path_prefix.is_empty() && !http.path_prefix.starts_with('/') {
        return Err(format!("PathPrefix doesn't start with '/': {:?}", http.path_prefix));
    }
    if !http.path_regex.is_empty() {
        check_regex("PathRegex", &http.path_regex)?;
    }

    for (j, hdr) in http.header.iter().enumerate() {
        if hdr.name.is_empty() {
            return Err(format!("missing required Name field on Header[{j}]"));
        }
        let set = [
            hdr.present,
            !hdr.exact.is_empty(),
            !hdr.prefix.is_empty(),
            !hdr.suffix.is_empty(),
            !hdr.regex.is_empty(),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        if set != 1 {
            return Err(format!(
                "should only contain one of Present, Exact, Prefix, Suffix, or Regex on Header[{j}]"
            ));
        }
        if !hdr.regex.is_empty() {
            check_regex(&format!("Header[{j}].Regex"), &hdr.regex)?;
        }
    }

    for (j, qm) in http.query_param.iter().enumerate() {
        if qm.name.is_empty() {
            return Err(format!("missing required Name field on QueryParam[{j}]"));
        }
        let set = [qm.present, !qm.exact.is_empty(), !qm.regex.is_empty()]
            .iter()
            .filter(|b| **b)
            .count();
        if set != 1 {
            return Err(format!(
                "should only contain one of Present, Exact, or Regex on QueryParam[{j}]"
            ));
        }
        if !qm.regex.is_empty() {
            check_regex(&format!("QueryParam[{j}].Regex"), &qm.regex)?;
        }
    }

    let mut seen = Vec::with_capacity(http.methods.len());
    for method in &http.methods {
        if method != &method.to_ascii_uppercase() {
            return Err(format!("Methods contains {method:?} which is not uppercase"));
        }
        if seen.contains(&method) {
            return Err(format!("Methods contains {method:?} more than once"));
        }
        seen.push(method);
    }

    Ok(())
}

fn check_regex(field: &str, pattern: &str) -> Result<(), String> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| format!("{field} is not a valid regular expression: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_with(http: ServiceRouteHttpMatch, dest: ServiceRouteDestination) -> ServiceRouterConfigEntry {
        ServiceRouterConfigEntry {
            name: "web".to_string(),
            routes: vec![ServiceRoute {
                route_match: Some(ServiceRouteMatch { http: Some(http) }),
                destination: Some(dest),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn catch_all_matches_root_prefix() {
        let route = ServiceRoute::catch_all("web", "default", "default");
        let http = route.route_match.unwrap().http.unwrap();
        assert_eq!(http.path_prefix, "/");
        assert_eq!(route.destination.unwrap().service, "web");
    }

    #[test]
    fn rejects_two_path_matchers() {
        let router = router_with(
            ServiceRouteHttpMatch {
                path_exact: "/a".to_string(),
                path_prefix: "/b".to_string(),
                ..Default::default()
            },
            ServiceRouteDestination::default(),
        );
        let err = router.validate().unwrap_err().to_string();
        assert!(err.contains("at most one of PathExact"), "{err}");
    }

    #[test]
    fn rejects_bad_regex() {
        let router = router_with(
            ServiceRouteHttpMatch {
                path_regex: "/(unclosed".to_string(),
                ..Default::default()
            },
            ServiceRouteDestination::default(),
        );
        assert!(router.validate().is_err());
    }

    #[test]
    fn prefix_rewrite_needs_path_match() {
        let router = router_with(
            ServiceRouteHttpMatch {
                header: vec![ServiceRouteHttpMatchHeader {
                    name: "x-debug".to_string(),
                    present: true,
                    ..Default::default()
                }],
                ..Default::default()
            },
            ServiceRouteDestination {
                prefix_rewrite: "/v2".to_string(),
                ..Default::default()
            },
        );
        let err = router.validate().unwrap_err().to_string();
        assert!(err.contains("PrefixRewrite"), "{err}");
    }

    #[test]
    fn header_needs_exactly_one_matcher() {
        let router = router_with(
            ServiceRouteHttpMatch {
                header: vec![ServiceRouteHttpMatchHeader {
                    name: "x-debug".to_string(),
                    exact: "1".to_string(),
                    prefix: "1".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ServiceRouteDestination::default(),
        );
        assert!(router.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_route() {
        let router = router_with(
            ServiceRouteHttpMatch {
                path_prefix: "/api".to_string(),
                methods: vec!["GET".to_string(), "POST".to_string()],
                ..Default::default()
            },
            ServiceRouteDestination {
                service: "api".to_string(),
                prefix_rewrite: "/".to_string(),
                ..Default::default()
            },
        );
        assert!(router.validate().is_ok());
    }
}
