//! Hedra Network Membership
//!
//! Node health, node pools and the two networks a client talks to:
//!
//! - [`NodeAddress`]: a normalized `host:port` endpoint with the network's
//!   plaintext/TLS port pairs
//! - [`Node`]: one participant with a lazily opened channel and a
//!   [`HealthRecord`] driving exponential backoff
//! - [`NodePool`]: a keyed set of nodes that can be reconciled against a new
//!   membership, evicts exhausted nodes and picks the healthiest ones
//! - [`Network`] / [`MirrorNetwork`]: the consensus network keyed by node
//!   account and the mirror network keyed by endpoint
//! - [`NetworkUpdater`]: background task that keeps a pool in sync with an
//!   [`AddressBookSource`]

pub mod address;
pub mod health;
pub mod network;
pub mod node;
pub mod pool;
pub mod updater;

pub use address::NodeAddress;
pub use health::{HealthRecord, HealthSnapshot, NodeBackoffConfig};
pub use network::{nodes_per_request, MirrorNetwork, Network, NetworkName};
pub use node::{ChannelFactory, HttpChannelFactory, Node, ServiceClient};
pub use pool::{sort_by_health, NodePool, PoolConfig, ReconcileReport};
pub use updater::{AddressBookSource, NetworkUpdater};
