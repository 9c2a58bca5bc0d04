//! Consistent-hash routing for ElastiCache memcached clusters.
//!
//! This crate provides:
//! - A consistent-hash ring with one point per cache node and
//!   deterministic key-to-node routing
//! - Background membership discovery through the ElastiCache
//!   configuration protocol (`config get cluster`)
//! - Lock-free lookups against an atomically swapped immutable snapshot
//! - A cooperative lifecycle: `shutdown` stops the poller, an attempt in
//!   flight completes naturally
//!
//! # Example
//!
//! ```rust,ignore
//! use elasticache_hashring::{DiscoveryConfig, NodeSelector};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DiscoveryConfig::new("myCluster.cfg.use1.cache.amazonaws.com:11211")
//!         .poll_interval(Duration::from_secs(600));
//!
//!     // Start the selector - spawns the discovery poller
//!     let selector = NodeSelector::start(config);
//!
//!     // Route a cache key to its node
//!     match selector.pick_server("user:1234") {
//!         Ok(node) => println!("user:1234 -> {}", node),
//!         Err(e) => println!("no membership yet: {}", e),
//!     }
//!
//!     // Graceful shutdown - stops the poller
//!     selector.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Membership updates
//!
//! The poller contacts the configuration endpoint once at start and then on
//! a fixed interval (default 1 hour, matching how rarely cluster topology
//! changes). A rebuild replaces the whole snapshot: callers holding the
//! previous one finish against it, and every lookup started after the swap
//! sees the new membership. By default a rebuild happens only when a new
//! address appears; see [`DiscoveryConfig::rebuild_on_departure`] for the
//! trade-off around nodes that have left the cluster.
//!
//! # Failure model
//!
//! A failed poll attempt (connect error, `ERROR` response, empty node list)
//! is logged and retried at the next tick; it never disturbs the active
//! snapshot. Lookups fail only while no discovery has ever succeeded
//! ([`Error::NoActiveMembership`]). Nothing here is fatal to the process.

mod discovery;
mod error;
mod node;
mod ring;
mod selector;

pub use discovery::DiscoveryConfig;
pub use error::Error;
pub use node::Node;
pub use ring::HashRing;
pub use selector::{MembershipEvent, NodeSelector};
