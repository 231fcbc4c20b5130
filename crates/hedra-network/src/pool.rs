//! Keyed node pool.
//!
//! A [`NodePool`] owns the nodes of one network. Membership changes go
//! through [`NodePool::reconcile`] and [`NodePool::evict_exhausted`], both of
//! which swap the pool contents under a write lock and close the dropped
//! nodes only after the lock is released. Selection holds the same write lock
//! while it evicts and orders a health snapshot of every node, so it never
//! interleaves with a membership change. Lookups share the read side.

use futures::future::join_all;
use hedra_common::{HedraError, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::address::NodeAddress;
use crate::health::NodeBackoffConfig;
use crate::node::{ChannelFactory, Node};

/// Pool-wide selection and eviction settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolConfig {
    /// Nodes with this many consecutive failures are evicted before selection.
    pub max_node_attempts: Option<u64>,
    /// Nodes handed to a request without an explicit node list.
    pub max_nodes_per_request: Option<usize>,
    pub backoff: NodeBackoffConfig,
}

/// What a [`NodePool::reconcile`] call changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport<K> {
    pub added: Vec<K>,
    pub removed: Vec<K>,
    /// Kept keys whose address changed; their health carries over.
    pub readdressed: Vec<K>,
}

impl<K> ReconcileReport<K> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.readdressed.is_empty()
    }
}

struct PoolInner<K> {
    by_key: HashMap<K, Arc<Node<K>>>,
    ordered: Vec<Arc<Node<K>>>,
}

impl<K: Clone + Eq + Hash> PoolInner<K> {
    fn from_nodes(ordered: Vec<Arc<Node<K>>>) -> Self {
        let by_key = ordered
            .iter()
            .map(|node| (node.key().clone(), node.clone()))
            .collect();
        Self { by_key, ordered }
    }

    /// Removes the nodes with at least `max_attempts` consecutive failures.
    fn take_exhausted(&mut self, max_attempts: u64) -> Vec<Arc<Node<K>>> {
        let (keep, evict): (Vec<_>, Vec<_>) = self
            .ordered
            .iter()
            .cloned()
            .partition(|node| node.failed_attempts() < max_attempts);
        if !evict.is_empty() {
            *self = Self::from_nodes(keep);
        }
        evict
    }
}

pub struct NodePool<K> {
    inner: RwLock<PoolInner<K>>,
    config: PoolConfig,
    factory: Arc<dyn ChannelFactory>,
}

impl<K> NodePool<K>
where
    K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
{
    /// Creates an empty pool whose nodes open channels through `factory`.
    pub fn new(config: PoolConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            inner: RwLock::new(PoolInner::from_nodes(Vec::new())),
            config,
            factory,
        }
    }

    /// Creates a pool populated with `members`.
    ///
    /// When a key appears more than once the first entry wins.
    pub fn with_members(
        config: PoolConfig,
        factory: Arc<dyn ChannelFactory>,
        members: impl IntoIterator<Item = (K, NodeAddress)>,
    ) -> Self {
        let pool = Self::new(config, factory);
        let nodes = dedup_members(members)
            .into_iter()
            .map(|(key, address)| pool.build_node(key, address))
            .collect();
        *pool.inner.write() = PoolInner::from_nodes(nodes);
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn build_node(&self, key: K, address: NodeAddress) -> Arc<Node<K>> {
        Arc::new(Node::new(
            key,
            address,
            self.config.backoff,
            self.factory.clone(),
        ))
    }

    /// Brings the pool to exactly the keys of `target`.
    ///
    /// New keys get a fresh node, missing keys are removed and their channels
    /// closed once the lock is released, kept keys keep their node (and
    /// health). A kept key whose address changed is rebuilt on the new
    /// address with its health carried over. Calling this twice with the same
    /// membership changes nothing the second time.
    pub async fn reconcile(
        &self,
        target: impl IntoIterator<Item = (K, NodeAddress)>,
    ) -> ReconcileReport<K> {
        let target = dedup_members(target);
        let target_keys: HashSet<&K> = target.iter().map(|(key, _)| key).collect();

        let mut report = ReconcileReport {
            added: Vec::new(),
            removed: Vec::new(),
            readdressed: Vec::new(),
        };
        let mut to_close = Vec::new();

        {
            let mut inner = self.inner.write();

            let mut ordered = Vec::with_capacity(target.len());
            for node in inner.ordered.iter() {
                if target_keys.contains(node.key()) {
                    ordered.push(node.clone());
                } else {
                    report.removed.push(node.key().clone());
                    to_close.push(node.clone());
                }
            }

            for (key, address) in &target {
                match inner.by_key.get(key) {
                    None => {
                        report.added.push(key.clone());
                        ordered.push(self.build_node(key.clone(), address.clone()));
                    }
                    Some(existing) if existing.address() != address => {
                        let replacement = Arc::new(Node::with_health(
                            key.clone(),
                            address.clone(),
                            existing.health(),
                            self.factory.clone(),
                        ));
                        if let Some(slot) = ordered.iter_mut().find(|n| n.key() == key) {
                            *slot = replacement;
                        }
                        report.readdressed.push(key.clone());
                        to_close.push(existing.clone());
                    }
                    Some(_) => {}
                }
            }

            *inner = PoolInner::from_nodes(ordered);
        }

        if !report.is_empty() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                readdressed = report.readdressed.len(),
                "pool membership changed"
            );
        }

        join_all(to_close.iter().map(|node| node.close())).await;
        report
    }

    /// Removes and closes every node with at least `max_attempts`
    /// consecutive failures.
    pub async fn evict_exhausted(&self, max_attempts: u64) {
        let evicted = self.inner.write().take_exhausted(max_attempts);
        Self::close_evicted(evicted).await;
    }

    async fn close_evicted(evicted: Vec<Arc<Node<K>>>) {
        for node in &evicted {
            warn!(
                node = %node.key(),
                address = %node.address(),
                failed_attempts = node.failed_attempts(),
                "evicting exhausted node"
            );
        }
        join_all(evicted.iter().map(|node| node.close())).await;
    }

    /// Up to `count` nodes in selection order: healthy nodes first, then
    /// least used, then least recently used.
    ///
    /// Exhausted nodes are evicted first when the pool has a
    /// `max_node_attempts` ceiling. Returns at least one node whenever the
    /// pool is non-empty and [`HedraError::PoolExhausted`] when it is empty.
    pub async fn pick_healthiest(&self, count: usize) -> Result<Vec<Arc<Node<K>>>> {
        let (mut nodes, evicted) = {
            let mut inner = self.inner.write();
            let evicted = match self.config.max_node_attempts {
                Some(max_attempts) => inner.take_exhausted(max_attempts),
                None => Vec::new(),
            };
            let mut nodes = inner.ordered.clone();
            sort_by_health(&mut nodes);
            (nodes, evicted)
        };
        Self::close_evicted(evicted).await;

        if nodes.is_empty() {
            return Err(HedraError::PoolExhausted {
                requested: count,
                available: 0,
            });
        }

        nodes.truncate(count.max(1));
        debug!(
            picked = nodes.len(),
            first = %nodes[0].key(),
            "picked healthiest nodes"
        );
        Ok(nodes)
    }

    pub fn get(&self, key: &K) -> Option<Arc<Node<K>>> {
        self.inner.read().by_key.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().by_key.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .read()
            .ordered
            .iter()
            .map(|node| node.key().clone())
            .collect()
    }

    /// Snapshot of the nodes in insertion order.
    pub fn nodes(&self) -> Vec<Arc<Node<K>>> {
        self.inner.read().ordered.clone()
    }

    pub fn members(&self) -> Vec<(K, NodeAddress)> {
        self.inner
            .read()
            .ordered
            .iter()
            .map(|node| (node.key().clone(), node.address().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the pool and closes every node.
    pub async fn close_all(&self) {
        let nodes = {
            let mut inner = self.inner.write();
            std::mem::replace(&mut *inner, PoolInner::from_nodes(Vec::new())).ordered
        };
        join_all(nodes.iter().map(|node| node.close())).await;
    }
}

/// Sorts `nodes` into selection order using one health snapshot per node.
///
/// The sort is stable, so nodes that compare equal keep their relative order.
pub fn sort_by_health<K>(nodes: &mut Vec<Arc<Node<K>>>) {
    let now = Instant::now();
    let mut keyed: Vec<_> = nodes
        .drain(..)
        .map(|node| (node.snapshot_at(now), node))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| a.selection_order(b));
    nodes.extend(keyed.into_iter().map(|(_, node)| node));
}

fn dedup_members<K: Clone + Eq + Hash>(
    members: impl IntoIterator<Item = (K, NodeAddress)>,
) -> Vec<(K, NodeAddress)> {
    let mut seen = HashSet::new();
    members
        .into_iter()
        .filter(|(key, _)| seen.insert(key.clone()))
        .collect()
}

impl<K> fmt::Debug for NodePool<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("len", &self.inner.read().ordered.len())
            .field("config", &self.config)
            .finish()
    }
}
