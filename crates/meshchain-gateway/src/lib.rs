//! meshchain-gateway: synthesizes discovery chains for API gateway routes.
//!
//! HTTP routes bound to a gateway listener are consolidated per hostname
//! and translated into router, splitter, and service-defaults entries; TCP
//! routes map straight to ingress services. [`GatewayChainSynthesizer`]
//! drives both and can compile the result.

pub mod error;
pub mod http;
pub mod route;
pub mod synthesizer;

pub use error::{GatewayError, GatewayResult};
pub use http::{SynthesizedEntries, compare_http_matches, http_route_to_discovery_chain};
pub use route::{
    ApiGateway, HttpFilters, HttpHeaderFilter, HttpHeaderMatch, HttpHeaderMatchType, HttpMatch,
    HttpMatchMethod, HttpPathMatch, HttpPathMatchType, HttpQueryMatch, HttpQueryMatchType,
    HttpRouteConfigEntry, HttpRouteRule, HttpService, IngressService, RoutesFile,
    TcpRouteConfigEntry, TcpService, UrlRewrite,
};
pub use synthesizer::{GatewayChainSynthesizer, hosts_key};
