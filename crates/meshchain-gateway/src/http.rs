//! Translation of one consolidated HTTP route into router, splitter, and
//! service-defaults entries.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::warn;

use meshchain_config::{
    HttpHeaderModifiers, ServiceConfigEntry, ServiceRoute,
    ServiceRouteDestination, ServiceRouteHttpMatch, ServiceRouteHttpMatchHeader,
    ServiceRouteHttpMatchQueryParam, ServiceRouteMatch, ServiceRouterConfigEntry, ServiceSplit,
    ServiceSplitterConfigEntry,
};

use crate::route::{
    HttpHeaderFilter, HttpHeaderMatchType, HttpMatch, HttpMatchMethod, HttpPathMatchType,
    HttpQueryMatchType, HttpRouteConfigEntry, UrlRewrite,
};

/// Protocol every synthesized service is declared with.
pub const SYNTHESIZED_PROTOCOL: &str = "http";

/// Entries synthesized for one consolidated route.
#[derive(Debug, Clone, Default)]
pub struct SynthesizedEntries {
    pub router: ServiceRouterConfigEntry,
    pub splitters: Vec<ServiceSplitterConfigEntry>,
    pub defaults: Vec<ServiceConfigEntry>,
}

/// Precedence between two matches on the same hostname: longer paths
/// first, then more header matches, then more query matches.
pub fn compare_http_matches(a: &HttpMatch, b: &HttpMatch) -> Ordering {
    b.path
        .value
        .len()
        .cmp(&a.path.value.len())
        .then_with(|| b.headers.len().cmp(&a.headers.len()))
        .then_with(|| b.query.len().cmp(&a.query.len()))
}

/// Fold a list of header filters into one set of modifiers.
pub fn header_modifiers(filters: &[HttpHeaderFilter]) -> Option<HttpHeaderModifiers> {
    let mut modifiers = HttpHeaderModifiers::default();
    for filter in filters {
        modifiers
            .add
            .extend(filter.add.iter().map(|(k, v)| (k.clone(), v.clone())));
        modifiers
            .set
            .extend(filter.set.iter().map(|(k, v)| (k.clone(), v.clone())));
        for name in &filter.remove {
            if !modifiers.remove.contains(name) {
                modifiers.remove.push(name.clone());
            }
        }
    }
    (!modifiers.is_empty()).then_some(modifiers)
}

fn prefix_rewrite(rewrite: Option<&UrlRewrite>) -> String {
    rewrite.map(|r| r.path.clone()).unwrap_or_default()
}

pub fn route_match(m: &HttpMatch) -> ServiceRouteHttpMatch {
    let mut out = ServiceRouteHttpMatch::default();

    match m.path.match_type {
        HttpPathMatchType::Exact => out.path_exact = m.path.value.clone(),
        HttpPathMatchType::Prefix => out.path_prefix = m.path.value.clone(),
        HttpPathMatchType::Regex => out.path_regex = m.path.value.clone(),
    }

    for header in &m.headers {
        let mut h = ServiceRouteHttpMatchHeader {
            name: header.name.clone(),
            ..Default::default()
        };
        match header.match_type {
            HttpHeaderMatchType::Exact => h.exact = header.value.clone(),
            HttpHeaderMatchType::Prefix => h.prefix = header.value.clone(),
            HttpHeaderMatchType::Suffix => h.suffix = header.value.clone(),
            HttpHeaderMatchType::Present => h.present = true,
            HttpHeaderMatchType::Regex => h.regex = header.value.clone(),
        }
        out.header.push(h);
    }

    for query in &m.query {
        let mut q = ServiceRouteHttpMatchQueryParam {
            name: query.name.clone(),
            ..Default::default()
        };
        match query.match_type {
            HttpQueryMatchType::Exact => q.exact = query.value.clone(),
            HttpQueryMatchType::Present => q.present = true,
            HttpQueryMatchType::Regex => q.regex = query.value.clone(),
        }
        out.query_param.push(q);
    }

    if m.method != HttpMatchMethod::All {
        out.methods.push(m.method.as_str().to_string());
    }

    out
}

fn http_defaults(name: &str, namespace: &str, partition: &str) -> ServiceConfigEntry {
    ServiceConfigEntry {
        namespace: namespace.to_string(),
        partition: partition.to_string(),
        ..ServiceConfigEntry::with_protocol(name, SYNTHESIZED_PROTOCOL)
    }
}

/// Build the router, splitters, and service defaults for `route`.
///
/// Rules with one service route straight to it. Rules with several get a
/// virtual splitter service named `<route>-<rule index>`. Every service
/// involved, virtual or not, is declared `http`.
pub fn http_route_to_discovery_chain(route: &HttpRouteConfigEntry) -> SynthesizedEntries {
    let namespace = route.namespace_or_default().to_string();
    let partition = route.partition_or_default().to_string();

    let mut out = SynthesizedEntries {
        router: ServiceRouterConfigEntry {
            name: route.name.clone(),
            namespace: namespace.clone(),
            partition: partition.clone(),
            meta: route.meta.clone(),
            ..Default::default()
        },
        ..Default::default()
    };

    for (idx, rule) in route.rules.iter().enumerate() {
        let rule_modifiers = header_modifiers(&rule.filters.headers);
        let rule_rewrite = prefix_rewrite(rule.filters.url_rewrite.as_ref());

        let destination = match rule.services.as_slice() {
            [] => {
                warn!(route = %route.name, rule = idx, "skipping rule without services");
                continue;
            }
            [service] => {
                let rewrite = match &service.filters.url_rewrite {
                    Some(r) => r.path.clone(),
                    None => rule_rewrite,
                };
                out.defaults.push(http_defaults(
                    &service.name,
                    service.namespace_or_default(),
                    service.partition_or_default(),
                ));
                ServiceRouteDestination {
                    service: service.name.clone(),
                    namespace: service.namespace_or_default().to_string(),
                    partition: service.partition_or_default().to_string(),
                    prefix_rewrite: rewrite,
                    request_headers: HttpHeaderModifiers::merge(
                        rule_modifiers.as_ref(),
                        header_modifiers(&service.filters.headers).as_ref(),
                    ),
                    ..Default::default()
                }
            }
            services => {
                let virtual_service = format!("{}-{}", route.name, idx);
                let total: u32 = services.iter().map(|s| s.weight).sum();

                let mut splitter = ServiceSplitterConfigEntry {
                    name: virtual_service.clone(),
                    namespace: namespace.clone(),
                    partition: partition.clone(),
                    meta: route.meta.clone(),
                    ..Default::default()
                };
                for service in services.iter().filter(|s| s.weight > 0) {
                    splitter.splits.push(ServiceSplit {
                        weight: service.weight as f32 / total as f32 * 100.0,
                        service: service.name.clone(),
                        namespace: service.namespace_or_default().to_string(),
                        partition: service.partition_or_default().to_string(),
                        request_headers: header_modifiers(&service.filters.headers),
                        ..Default::default()
                    });
                    out.defaults.push(http_defaults(
                        &service.name,
                        service.namespace_or_default(),
                        service.partition_or_default(),
                    ));
                }
                if splitter.splits.is_empty() {
                    warn!(route = %route.name, rule = idx, "skipping rule whose services all have zero weight");
                    continue;
                }

                out.defaults
                    .push(http_defaults(&virtual_service, &namespace, &partition));
                out.splitters.push(splitter);

                ServiceRouteDestination {
                    service: virtual_service,
                    namespace: namespace.clone(),
                    partition: partition.clone(),
                    prefix_rewrite: rule_rewrite,
                    request_headers: rule_modifiers,
                    ..Default::default()
                }
            }
        };

        for m in &rule.matches {
            out.router.routes.push(ServiceRoute {
                route_match: Some(ServiceRouteMatch {
                    http: Some(route_match(m)),
                }),
                destination: Some(destination.clone()),
            });
        }
        if rule.matches.is_empty() {
            out.router.routes.push(ServiceRoute {
                route_match: None,
                destination: Some(destination),
            });
        }
    }

    out.defaults
        .push(http_defaults(&route.name, &namespace, &partition));
    dedup_defaults(&mut out.defaults);
    out
}

/// Keep the first service-defaults entry per service.
fn dedup_defaults(defaults: &mut Vec<ServiceConfigEntry>) {
    let mut seen = BTreeSet::new();
    defaults.retain(|d| seen.insert(d.service_id()));
}
