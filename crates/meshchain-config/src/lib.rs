//! meshchain-config: the config entries a discovery chain is compiled from.
//!
//! Entries come in five kinds:
//!
//! - **`service-router`**: L7 match rules dispatching to destinations
//! - **`service-splitter`**: weighted traffic splits
//! - **`service-resolver`**: subsets, redirects, failover, timeouts
//! - **`service-defaults`**: per-service protocol, mesh gateway, external SNI
//! - **`proxy-defaults`**: partition-wide protocol and mesh gateway defaults
//!
//! A [`DiscoveryChainSet`] holds the entries relevant to one compilation,
//! keyed by [`ServiceID`]. Entry files (TOML or JSON) load through
//! [`EntriesFile`].

pub mod chain_set;
pub mod duration;
pub mod entry;
pub mod error;
pub mod file;
pub mod headers;
pub mod resolver;
pub mod router;
pub mod service;
pub mod splitter;

pub use chain_set::DiscoveryChainSet;
pub use entry::{
    ConfigEntry, EnvoyExtension, MeshGatewayConfig, MeshGatewayMode, ProxyConfigEntry,
    ServiceConfigEntry,
};
pub use error::{ConfigError, ConfigResult};
pub use file::EntriesFile;
pub use headers::HttpHeaderModifiers;
pub use resolver::{
    CookieConfig, HashPolicy, LeastRequestConfig, LoadBalancer, RingHashConfig,
    ServiceResolverConfigEntry, ServiceResolverFailover, ServiceResolverFailoverTarget,
    ServiceResolverRedirect, ServiceResolverSubset,
};
pub use router::{
    ServiceRoute, ServiceRouteDestination, ServiceRouteHttpMatch, ServiceRouteHttpMatchHeader,
    ServiceRouteHttpMatchQueryParam, ServiceRouteMatch, ServiceRouterConfigEntry,
};
pub use service::{
    DEFAULT_NAMESPACE, DEFAULT_PARTITION, DefaultEnterpriseMeta, EnterpriseMeta,
    EnterpriseMetaProvider, ServiceID,
};
pub use splitter::{ServiceSplit, ServiceSplitterConfigEntry, normalize_split_weight};
