use hedra_common::{AccountId, Codec, HedraError, Result};
use hedra_network::{
    AddressBookSource, ChannelFactory, HttpChannelFactory, MirrorNetwork, Network, NetworkName, NetworkUpdater,
    PoolConfig, ReconcileReport,
};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ClientConfig, ExecutionConfig, MirrorNetworkConfig, NetworkConfig};
use crate::query::AccountBalanceQuery;
use crate::signer::{Operator, PrivateKey, Signer};

/// Fee ceiling used when neither the transaction nor the client sets one.
pub const DEFAULT_MAX_TRANSACTION_FEE: u64 = 200_000_000;

/// Query payment ceiling used when neither the query nor the client sets one.
pub const DEFAULT_MAX_QUERY_PAYMENT: u64 = 100_000_000;

/// Entry point for talking to a network.
///
/// Cloning is cheap; clones share the node pools, operator and settings.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    network: Network,
    mirror_network: Option<MirrorNetwork>,
    operator: RwLock<Option<Operator>>,
    execution: RwLock<ExecutionConfig>,
    max_transaction_fee: RwLock<Option<u64>>,
    max_query_payment: RwLock<Option<u64>>,
    codec: Codec,
}

impl Client {
    /// Creates a client over an existing network.
    pub fn new(network: Network, mirror_network: Option<MirrorNetwork>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                network,
                mirror_network,
                operator: RwLock::new(None),
                execution: RwLock::new(ExecutionConfig::default()),
                max_transaction_fee: RwLock::new(None),
                max_query_payment: RwLock::new(None),
                codec: Codec::default(),
            }),
        }
    }

    fn http_factory() -> Arc<dyn ChannelFactory> {
        Arc::new(HttpChannelFactory {
            timeout: ExecutionConfig::default().request_timeout,
        })
    }

    /// Client for a custom `address -> node account` map, over HTTP channels.
    pub fn for_network<A: AsRef<str>>(addresses: impl IntoIterator<Item = (A, AccountId)>) -> Result<Self> {
        let network = Network::for_addresses(addresses, PoolConfig::default(), Self::http_factory())?;
        Ok(Self::new(network, None))
    }

    /// Client for one of the public networks, including its mirror network.
    pub fn for_name(name: NetworkName) -> Self {
        let factory = Self::http_factory();
        let network = Network::for_name(name, PoolConfig::default(), factory.clone());
        let mirror = MirrorNetwork::for_name(name, PoolConfig::default(), factory);
        Self::new(network, Some(mirror))
    }

    pub fn mainnet() -> Self {
        Self::for_name(NetworkName::Mainnet)
    }

    pub fn testnet() -> Self {
        Self::for_name(NetworkName::Testnet)
    }

    pub fn previewnet() -> Self {
        Self::for_name(NetworkName::Previewnet)
    }

    /// Builds a client from a parsed config document over HTTP channels.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        Self::from_config_with_factory(config, Self::http_factory())
    }

    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(ClientConfig::from_file(path)?)
    }

    /// Builds a client from a parsed config document; nodes open their
    /// channels through `factory`.
    pub fn from_config_with_factory(config: ClientConfig, factory: Arc<dyn ChannelFactory>) -> Result<Self> {
        let network = match &config.network {
            NetworkConfig::Name(name) => Network::for_name(name.parse()?, PoolConfig::default(), factory.clone()),
            NetworkConfig::Addresses(map) => Network::for_addresses(
                ClientConfig::network_addresses(map)?,
                PoolConfig::default(),
                factory.clone(),
            )?,
        };

        let mirror_network = match &config.mirror_network {
            None => None,
            Some(MirrorNetworkConfig::Name(name)) => {
                Some(MirrorNetwork::for_name(name.parse()?, PoolConfig::default(), factory))
            }
            Some(MirrorNetworkConfig::Addresses(addresses)) => Some(MirrorNetwork::for_addresses(
                addresses,
                PoolConfig::default(),
                factory,
            )?),
        };

        let client = Self::new(network, mirror_network);

        if let Some(operator) = &config.operator {
            let account_id = operator
                .account_id
                .parse::<AccountId>()
                .map_err(|e| HedraError::InvalidConfig(format!("operator account: {}", e)))?;
            let key = PrivateKey::from_hex(&operator.private_key)?;
            client.set_operator(account_id, Arc::new(key));
        }

        if let Some(max_attempts) = config.max_attempts {
            client.set_max_attempts(max_attempts);
        }

        Ok(client)
    }

    pub fn network(&self) -> &Network {
        &self.inner.network
    }

    pub fn mirror_network(&self) -> Option<&MirrorNetwork> {
        self.inner.mirror_network.as_ref()
    }

    /// Replaces the consensus network membership; nodes for accounts that
    /// stay keep their channel and health.
    pub async fn set_network<A: AsRef<str>>(
        &self,
        addresses: impl IntoIterator<Item = (A, AccountId)>,
    ) -> Result<ReconcileReport<AccountId>> {
        let report = self.inner.network.set_addresses(addresses).await?;
        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            "network updated"
        );
        Ok(report)
    }

    /// Keeps the consensus network in sync with `source`, fetching every
    /// `interval`. The updater stops when the returned handle is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_network_updater(
        &self,
        source: Arc<dyn AddressBookSource<AccountId>>,
        interval: Duration,
    ) -> NetworkUpdater {
        info!(interval_ms = interval.as_millis() as u64, "starting network updater");
        self.inner.network.spawn_updater(source, interval)
    }

    pub fn set_operator(&self, account_id: AccountId, signer: Arc<dyn Signer>) {
        *self.inner.operator.write() = Some(Operator::new(account_id, signer));
    }

    pub fn operator(&self) -> Option<Operator> {
        self.inner.operator.read().clone()
    }

    pub fn operator_account_id(&self) -> Option<AccountId> {
        self.inner.operator.read().as_ref().map(|op| op.account_id)
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        self.inner.execution.read().clone()
    }

    pub fn set_execution_config(&self, config: ExecutionConfig) {
        *self.inner.execution.write() = config;
    }

    pub fn set_max_attempts(&self, max_attempts: u32) {
        self.inner.execution.write().max_attempts = max_attempts;
    }

    pub fn set_min_backoff(&self, min_backoff: Duration) {
        self.inner.execution.write().min_backoff = min_backoff;
    }

    pub fn set_max_backoff(&self, max_backoff: Duration) {
        self.inner.execution.write().max_backoff = max_backoff;
    }

    pub fn default_max_transaction_fee(&self) -> Option<u64> {
        *self.inner.max_transaction_fee.read()
    }

    pub fn set_default_max_transaction_fee(&self, fee: u64) {
        *self.inner.max_transaction_fee.write() = Some(fee);
    }

    /// Highest payment a paid query may attach.
    pub fn max_query_payment(&self) -> u64 {
        self.inner
            .max_query_payment
            .read()
            .unwrap_or(DEFAULT_MAX_QUERY_PAYMENT)
    }

    pub fn set_max_query_payment(&self, max: u64) {
        *self.inner.max_query_payment.write() = Some(max);
    }

    pub fn codec(&self) -> Codec {
        self.inner.codec
    }

    /// Sends a free balance query for the node's own account, pinned to that
    /// node.
    pub async fn ping(&self, node_account_id: AccountId) -> Result<()> {
        AccountBalanceQuery::new(node_account_id)
            .set_node_account_ids(vec![node_account_id])
            .execute(self)
            .await
            .map(|_| ())
    }

    /// Pings every node, returning the accounts that failed with their error.
    pub async fn ping_all(&self) -> Vec<(AccountId, HedraError)> {
        let accounts = self.inner.network.node_account_ids();
        let results = futures::future::join_all(accounts.iter().map(|account| self.ping(*account))).await;

        accounts
            .into_iter()
            .zip(results)
            .filter_map(|(account, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!(node = %account, error = %e, "ping failed");
                    Some((account, e))
                }
            })
            .collect()
    }

    /// Closes every node channel of both networks.
    pub async fn close(&self) {
        self.inner.network.close().await;
        if let Some(mirror) = &self.inner.mirror_network {
            mirror.close().await;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("network", &self.inner.network)
            .field("operator", &*self.inner.operator.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_name_sets_up_both_networks() {
        let client = Client::testnet();
        assert_eq!(client.network().pool().len(), 5);
        assert_eq!(client.mirror_network().unwrap().addresses().len(), 1);
        assert!(client.operator().is_none());
    }

    #[test]
    fn test_from_config_sets_operator() {
        let config = ClientConfig::from_json(
            r#"{
                "operator": {
                    "accountId": "0.0.1001",
                    "privateKey": "db484b828e64b2d8f12ce3c0a0e93a0b8cce7af1bb8f39c97732394482538e10"
                },
                "network": { "127.0.0.1:50211": "0.0.3", "127.0.0.1:50212": "0.0.4" },
                "maxAttempts": 4
            }"#,
        )
        .unwrap();

        let client = Client::from_config(config).unwrap();
        assert_eq!(client.operator_account_id(), Some(AccountId::from(1001)));
        assert_eq!(client.network().pool().len(), 2);
        assert!(client.mirror_network().is_none());
        assert_eq!(client.execution_config().max_attempts, 4);
    }

    #[test]
    fn test_from_config_rejects_unknown_network_name() {
        let config = ClientConfig::from_json(r#"{ "network": "devnet" }"#).unwrap();
        assert!(Client::from_config(config).is_err());
    }

    #[test]
    fn test_defaults() {
        let client = Client::testnet();
        assert_eq!(client.default_max_transaction_fee(), None);
        assert_eq!(client.max_query_payment(), DEFAULT_MAX_QUERY_PAYMENT);

        client.set_max_query_payment(5);
        client.set_max_backoff(Duration::from_secs(1));
        assert_eq!(client.max_query_payment(), 5);
        assert_eq!(client.execution_config().max_backoff, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_set_network_reconciles() {
        let client = Client::for_network([("127.0.0.1:50211", AccountId::from(3))]).unwrap();
        let report = client
            .set_network([("127.0.0.1:50211", AccountId::from(3)), ("127.0.0.1:50311", AccountId::from(4))])
            .await
            .unwrap();
        assert_eq!(report.added, vec![AccountId::from(4)]);
        assert!(report.removed.is_empty());
    }
}
