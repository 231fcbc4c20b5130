use async_trait::async_trait;
use bytes::Bytes;
use hedra_common::transport::{Channel, HttpChannel, ServiceKind, TransportFault};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

use crate::address::NodeAddress;
use crate::health::{HealthRecord, HealthSnapshot, NodeBackoffConfig};

/// Opens channels to node addresses.
///
/// Called at most once per node, on the first request sent to it.
pub trait ChannelFactory: Send + Sync {
    fn open(&self, address: &NodeAddress) -> Arc<dyn Channel>;
}

impl<F> ChannelFactory for F
where
    F: Fn(&NodeAddress) -> Arc<dyn Channel> + Send + Sync,
{
    fn open(&self, address: &NodeAddress) -> Arc<dyn Channel> {
        self(address)
    }
}

/// Stands in for the channel of a node closed before it was ever opened.
struct ClosedChannel;

#[async_trait]
impl Channel for ClosedChannel {
    async fn call(
        &self,
        _service: ServiceKind,
        _method: &str,
        _request: Bytes,
    ) -> Result<Bytes, TransportFault> {
        Err(TransportFault::Unavailable)
    }
}

/// Opens an [`HttpChannel`] per node.
#[derive(Debug, Clone)]
pub struct HttpChannelFactory {
    pub timeout: Duration,
}

impl Default for HttpChannelFactory {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl ChannelFactory for HttpChannelFactory {
    fn open(&self, address: &NodeAddress) -> Arc<dyn Channel> {
        Arc::new(HttpChannel::new(address.to_string(), self.timeout))
    }
}

/// Typed client for one service on one node, sharing the node's channel.
#[derive(Clone)]
pub struct ServiceClient {
    kind: ServiceKind,
    channel: Arc<dyn Channel>,
}

impl ServiceClient {
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub async fn call(&self, method: &str, request: Bytes) -> Result<Bytes, TransportFault> {
        self.channel.call(self.kind, method, request).await
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient").field("kind", &self.kind).finish()
    }
}

/// One network participant.
///
/// The key and address never change; the health record is mutated under its
/// own lock so nodes can be shared across concurrent executions.
pub struct Node<K> {
    key: K,
    address: NodeAddress,
    factory: Arc<dyn ChannelFactory>,
    channel: OnceLock<Arc<dyn Channel>>,
    services: Mutex<HashMap<ServiceKind, ServiceClient>>,
    health: Mutex<HealthRecord>,
    closed: AtomicBool,
}

impl<K> Node<K> {
    pub fn new(
        key: K,
        address: NodeAddress,
        backoff: NodeBackoffConfig,
        factory: Arc<dyn ChannelFactory>,
    ) -> Self {
        Self::with_health(key, address, HealthRecord::new(backoff), factory)
    }

    /// Creates a node that starts from an existing health record.
    pub fn with_health(
        key: K,
        address: NodeAddress,
        health: HealthRecord,
        factory: Arc<dyn ChannelFactory>,
    ) -> Self {
        Self {
            key,
            address,
            factory,
            channel: OnceLock::new(),
            services: Mutex::new(HashMap::new()),
            health: Mutex::new(health),
            closed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// The node's channel, opened on first use.
    ///
    /// A node closed before its first use never opens one; its calls fail
    /// with [`TransportFault::Unavailable`].
    pub fn channel(&self) -> Arc<dyn Channel> {
        self.channel
            .get_or_init(|| {
                tracing::debug!(address = %self.address, "opening channel");
                self.factory.open(&self.address)
            })
            .clone()
    }

    /// Client for `kind`; every service client of a node shares its channel.
    pub fn service(&self, kind: ServiceKind) -> ServiceClient {
        let mut services = self.services.lock();
        services
            .entry(kind)
            .or_insert_with(|| ServiceClient {
                kind,
                channel: self.channel(),
            })
            .clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.health.lock().is_healthy()
    }

    pub fn remaining_backoff(&self) -> Duration {
        self.health.lock().remaining_backoff()
    }

    pub fn record_failure(&self) {
        let mut health = self.health.lock();
        health.record_failure();
        tracing::debug!(
            address = %self.address,
            backoff_ms = health.current_backoff().as_millis() as u64,
            failed_attempts = health.failed_attempts(),
            "node marked unhealthy"
        );
    }

    pub fn record_success(&self) {
        self.health.lock().record_success();
    }

    pub fn failed_attempts(&self) -> u64 {
        self.health.lock().failed_attempts()
    }

    pub fn use_count(&self) -> u64 {
        self.health.lock().use_count()
    }

    pub fn health(&self) -> HealthRecord {
        self.health.lock().clone()
    }

    pub fn snapshot_at(&self, now: Instant) -> HealthSnapshot {
        self.health.lock().snapshot_at(now)
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shuts down the channel if one was opened. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.services.lock().clear();
        // waits out a concurrent open, which then gets closed here
        if self.channel.set(Arc::new(ClosedChannel)).is_err() {
            if let Some(channel) = self.channel.get() {
                channel.close().await;
            }
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for Node<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("address", &self.address)
            .field("health", &*self.health.lock())
            .field("closed", &self.is_closed())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingFactory;
    use super::*;

    fn node(factory: Arc<CountingFactory>) -> Node<u64> {
        Node::new(
            3,
            NodeAddress::parse("127.0.0.1:50211").unwrap(),
            NodeBackoffConfig::default(),
            factory,
        )
    }

    #[tokio::test]
    async fn test_channel_is_opened_lazily_once() {
        let factory = Arc::new(CountingFactory::default());
        let node = node(factory.clone());
        assert_eq!(factory.opened_count(), 0);

        let crypto = node.service(ServiceKind::Crypto);
        let file = node.service(ServiceKind::File);
        let echoed = crypto.call("cryptoTransfer", Bytes::from_static(b"abc")).await.unwrap();
        file.call("appendContent", Bytes::new()).await.unwrap();

        assert_eq!(echoed, Bytes::from_static(b"abc"));
        assert_eq!(factory.opened_count(), 1);
        assert_eq!(node.service(ServiceKind::Crypto).kind(), ServiceKind::Crypto);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let factory = Arc::new(CountingFactory::default());
        let node = node(factory.clone());
        node.channel();

        node.close().await;
        node.close().await;

        assert!(node.is_closed());
        assert_eq!(factory.closes_for(node.address()), 1);
    }

    #[tokio::test]
    async fn test_close_without_channel_opens_nothing() {
        let factory = Arc::new(CountingFactory::default());
        let node = node(factory.clone());
        node.close().await;
        assert_eq!(factory.opened_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_node_never_opens_a_channel() {
        let factory = Arc::new(CountingFactory::default());
        let node = node(factory.clone());
        node.close().await;

        let result = node
            .service(ServiceKind::Crypto)
            .call("cryptoGetBalance", Bytes::from_static(b"x"))
            .await;
        assert_eq!(result.unwrap_err(), TransportFault::Unavailable);
        assert_eq!(factory.opened_count(), 0);
    }

    #[test]
    fn test_health_is_tracked_on_node() {
        let node = node(Arc::new(CountingFactory::default()));
        node.record_failure();
        assert!(!node.is_healthy());
        assert_eq!(node.failed_attempts(), 1);

        node.record_success();
        assert!(node.is_healthy());
        assert_eq!(node.use_count(), 1);
    }
}
