//! meshchain-compiler: turns a service's routing config entries into one
//! compiled discovery chain.
//!
//! Compilation runs in fixed stages:
//!
//! 1. **Assemble**: starting at the root service, follow its router (if
//!    any), splitters, and resolvers, recording one graph node per step and
//!    one target per distinct backend.
//! 2. **Detect cycles**: a node reachable from itself is an error.
//! 3. **Flatten**: splitters pointing at splitters collapse into one level
//!    with multiplied weights.
//! 4. **Prune**: unreachable nodes and unused targets are dropped.
//! 5. **Finalize**: protocol checks, protocol override, customization hash.
//!
//! ```no_run
//! use meshchain_compiler::{CompileRequest, compile};
//! use meshchain_config::DiscoveryChainSet;
//!
//! let entries = DiscoveryChainSet::new();
//! let chain = compile(CompileRequest::new("web", "dc1", "trust.consul", &entries))?;
//! assert!(chain.default);
//! # Ok::<(), meshchain_compiler::ChainError>(())
//! ```

mod assemble;
pub mod compiler;
pub mod error;
pub mod graph;
mod passes;
pub mod protocol;
pub mod stack;
pub mod target;

pub use compiler::{CompileRequest, DEFAULT_CONNECT_TIMEOUT, compile};
pub use error::{ChainError, ChainResult, ConfigEntryGraphError};
pub use graph::{
    CompiledDiscoveryChain, DiscoveryFailover, DiscoveryGraphNode, DiscoveryResolver,
    DiscoveryRoute, DiscoverySplit, NodeType, ResolverNode, RouterNode, SplitterNode, node_key,
};
pub use protocol::{DEFAULT_PROTOCOL, enable_advanced_routing_for_protocol};
pub use stack::StringStack;
pub use target::{DiscoveryTarget, DiscoveryTargetOpts, chain_id, service_sni};
