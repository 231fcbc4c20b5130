use hedra_common::{AccountId, HedraError, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::address::NodeAddress;
use crate::node::{ChannelFactory, Node};
use crate::pool::{NodePool, PoolConfig, ReconcileReport};
use crate::updater::{AddressBookSource, NetworkUpdater};

/// Well-known public networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkName {
    Mainnet,
    Testnet,
    Previewnet,
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkName::Mainnet => "mainnet",
            NetworkName::Testnet => "testnet",
            NetworkName::Previewnet => "previewnet",
        })
    }
}

impl FromStr for NetworkName {
    type Err = HedraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkName::Mainnet),
            "testnet" => Ok(NetworkName::Testnet),
            "previewnet" => Ok(NetworkName::Previewnet),
            other => Err(HedraError::BasicParse(format!("unknown network `{}`", other))),
        }
    }
}

const MAINNET: &[(&str, u64)] = &[
    ("35.237.200.180", 3),
    ("35.186.191.247", 4),
    ("35.192.2.25", 5),
    ("35.199.161.108", 6),
    ("35.203.82.240", 7),
    ("35.236.5.219", 8),
    ("35.197.192.225", 9),
    ("35.242.233.154", 10),
    ("35.240.118.96", 11),
    ("35.204.86.32", 12),
    ("35.234.132.107", 13),
    ("35.236.2.27", 14),
    ("35.228.11.53", 15),
    ("34.91.181.183", 16),
    ("34.86.212.247", 17),
    ("172.105.247.67", 18),
    ("34.89.87.138", 19),
    ("34.82.78.255", 20),
];

const TESTNET: &[(&str, u64)] = &[
    ("0.testnet.hedera.com", 3),
    ("1.testnet.hedera.com", 4),
    ("2.testnet.hedera.com", 5),
    ("3.testnet.hedera.com", 6),
    ("4.testnet.hedera.com", 7),
];

const PREVIEWNET: &[(&str, u64)] = &[
    ("0.previewnet.hedera.com", 3),
    ("1.previewnet.hedera.com", 4),
    ("2.previewnet.hedera.com", 5),
    ("3.previewnet.hedera.com", 6),
    ("4.previewnet.hedera.com", 7),
];

const NODE_PORT: u16 = 50211;

impl NetworkName {
    fn consensus_members(&self) -> Vec<(AccountId, NodeAddress)> {
        let table = match self {
            NetworkName::Mainnet => MAINNET,
            NetworkName::Testnet => TESTNET,
            NetworkName::Previewnet => PREVIEWNET,
        };
        table
            .iter()
            .map(|(host, num)| (AccountId::from(*num), NodeAddress::from_static(host, NODE_PORT)))
            .collect()
    }

    fn mirror_members(&self) -> Vec<(String, NodeAddress)> {
        let host = match self {
            NetworkName::Mainnet => "mainnet-public.mirrornode.hedera.com",
            NetworkName::Testnet => "testnet.mirrornode.hedera.com",
            NetworkName::Previewnet => "previewnet.mirrornode.hedera.com",
        };
        let address = NodeAddress::from_static(host, 443);
        vec![(address.to_string(), address)]
    }
}

/// Parses an `address -> account` map into pool members.
///
/// Members are sorted by account so that a map with several addresses for
/// one account deterministically keeps the lowest address.
fn consensus_members<A: AsRef<str>>(
    addresses: impl IntoIterator<Item = (A, AccountId)>,
) -> Result<Vec<(AccountId, NodeAddress)>> {
    let mut members = addresses
        .into_iter()
        .map(|(address, account)| Ok((account, NodeAddress::parse(address.as_ref())?)))
        .collect::<Result<Vec<_>>>()?;
    members.sort();
    Ok(members)
}

fn mirror_members<A: AsRef<str>>(
    addresses: impl IntoIterator<Item = A>,
) -> Result<Vec<(String, NodeAddress)>> {
    addresses
        .into_iter()
        .map(|address| {
            let address = NodeAddress::parse(address.as_ref())?;
            Ok((address.to_string(), address))
        })
        .collect()
}

/// Number of nodes a request without an explicit node list is sent to.
pub fn nodes_per_request(pool_size: usize, max_nodes_per_request: Option<usize>) -> usize {
    match max_nodes_per_request {
        Some(max) => max.min(pool_size),
        None => pool_size.div_ceil(3),
    }
    .max(1)
}

/// The consensus network, keyed by node account.
#[derive(Debug)]
pub struct Network {
    pool: Arc<NodePool<AccountId>>,
    name: Option<NetworkName>,
}

impl Network {
    pub fn for_addresses<A: AsRef<str>>(
        addresses: impl IntoIterator<Item = (A, AccountId)>,
        config: PoolConfig,
        factory: Arc<dyn ChannelFactory>,
    ) -> Result<Self> {
        let members = consensus_members(addresses)?;
        Ok(Self {
            pool: Arc::new(NodePool::with_members(config, factory, members)),
            name: None,
        })
    }

    pub fn for_name(name: NetworkName, config: PoolConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            pool: Arc::new(NodePool::with_members(config, factory, name.consensus_members())),
            name: Some(name),
        }
    }

    pub fn mainnet(config: PoolConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        Self::for_name(NetworkName::Mainnet, config, factory)
    }

    pub fn testnet(config: PoolConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        Self::for_name(NetworkName::Testnet, config, factory)
    }

    pub fn previewnet(config: PoolConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        Self::for_name(NetworkName::Previewnet, config, factory)
    }

    pub fn name(&self) -> Option<NetworkName> {
        self.name
    }

    pub fn pool(&self) -> &NodePool<AccountId> {
        &self.pool
    }

    /// Keeps the membership in sync with `source`, fetching every `interval`.
    pub fn spawn_updater(
        &self,
        source: Arc<dyn AddressBookSource<AccountId>>,
        interval: Duration,
    ) -> NetworkUpdater {
        NetworkUpdater::spawn(self.pool.clone(), source, interval)
    }

    /// Replaces the membership, keeping nodes (and health) for accounts that
    /// stay.
    pub async fn set_addresses<A: AsRef<str>>(
        &self,
        addresses: impl IntoIterator<Item = (A, AccountId)>,
    ) -> Result<ReconcileReport<AccountId>> {
        let members = consensus_members(addresses)?;
        Ok(self.pool.reconcile(members).await)
    }

    /// Current membership as `address -> account`.
    pub fn addresses(&self) -> HashMap<String, AccountId> {
        self.pool
            .members()
            .into_iter()
            .map(|(account, address)| (address.to_string(), account))
            .collect()
    }

    pub fn node_account_ids(&self) -> Vec<AccountId> {
        self.pool.keys()
    }

    pub fn node(&self, account: &AccountId) -> Result<Arc<Node<AccountId>>> {
        self.pool
            .get(account)
            .ok_or(HedraError::NodeAccountUnknown(*account))
    }

    /// Resolves every account in `accounts`, failing on the first unknown one.
    pub fn nodes_for(&self, accounts: &[AccountId]) -> Result<Vec<Arc<Node<AccountId>>>> {
        accounts.iter().map(|account| self.node(account)).collect()
    }

    /// Accounts of the healthiest nodes, as many as one request is sent to.
    pub async fn node_account_ids_for_execute(&self) -> Result<Vec<AccountId>> {
        let count = nodes_per_request(self.pool.len(), self.pool.config().max_nodes_per_request);
        let nodes = self.pool.pick_healthiest(count).await?;
        Ok(nodes.iter().map(|node| *node.key()).collect())
    }

    pub async fn close(&self) {
        self.pool.close_all().await;
    }
}

/// The mirror network, keyed by endpoint.
#[derive(Debug)]
pub struct MirrorNetwork {
    pool: Arc<NodePool<String>>,
    name: Option<NetworkName>,
}

impl MirrorNetwork {
    pub fn for_addresses<A: AsRef<str>>(
        addresses: impl IntoIterator<Item = A>,
        config: PoolConfig,
        factory: Arc<dyn ChannelFactory>,
    ) -> Result<Self> {
        let members = mirror_members(addresses)?;
        Ok(Self {
            pool: Arc::new(NodePool::with_members(config, factory, members)),
            name: None,
        })
    }

    pub fn for_name(name: NetworkName, config: PoolConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            pool: Arc::new(NodePool::with_members(config, factory, name.mirror_members())),
            name: Some(name),
        }
    }

    pub fn name(&self) -> Option<NetworkName> {
        self.name
    }

    pub fn pool(&self) -> &NodePool<String> {
        &self.pool
    }

    pub fn spawn_updater(
        &self,
        source: Arc<dyn AddressBookSource<String>>,
        interval: Duration,
    ) -> NetworkUpdater {
        NetworkUpdater::spawn(self.pool.clone(), source, interval)
    }

    pub async fn set_addresses<A: AsRef<str>>(
        &self,
        addresses: impl IntoIterator<Item = A>,
    ) -> Result<ReconcileReport<String>> {
        let members = mirror_members(addresses)?;
        Ok(self.pool.reconcile(members).await)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.pool.keys()
    }

    /// The healthiest mirror node.
    pub async fn pick(&self) -> Result<Arc<Node<String>>> {
        let mut nodes = self.pool.pick_healthiest(1).await?;
        nodes.pop().ok_or(HedraError::PoolExhausted {
            requested: 1,
            available: 0,
        })
    }

    pub async fn close(&self) {
        self.pool.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::CountingFactory;

    fn factory() -> Arc<dyn ChannelFactory> {
        Arc::new(CountingFactory::default())
    }

    #[test]
    fn test_nodes_per_request() {
        assert_eq!(nodes_per_request(0, None), 1);
        assert_eq!(nodes_per_request(1, None), 1);
        assert_eq!(nodes_per_request(3, None), 1);
        assert_eq!(nodes_per_request(4, None), 2);
        assert_eq!(nodes_per_request(18, None), 6);
        assert_eq!(nodes_per_request(5, Some(2)), 2);
        assert_eq!(nodes_per_request(5, Some(50)), 5);
        assert_eq!(nodes_per_request(5, Some(0)), 1);
    }

    #[test]
    fn test_presets() {
        let mainnet = Network::mainnet(PoolConfig::default(), factory());
        assert_eq!(mainnet.pool().len(), 18);
        assert_eq!(mainnet.name(), Some(NetworkName::Mainnet));

        let testnet = Network::testnet(PoolConfig::default(), factory());
        let addresses = testnet.addresses();
        assert_eq!(addresses["0.testnet.hedera.com:50211"], AccountId::from(3));
        assert_eq!(addresses["4.testnet.hedera.com:50211"], AccountId::from(7));

        let mirror = MirrorNetwork::for_name(NetworkName::Previewnet, PoolConfig::default(), factory());
        assert_eq!(mirror.addresses(), vec!["previewnet.mirrornode.hedera.com:443".to_string()]);
    }

    #[test]
    fn test_network_name_parse() {
        assert_eq!("Testnet".parse::<NetworkName>().unwrap(), NetworkName::Testnet);
        assert_eq!(NetworkName::Mainnet.to_string(), "mainnet");
        assert!("devnet".parse::<NetworkName>().is_err());
    }

    #[test]
    fn test_for_addresses_rejects_bad_address() {
        let result = Network::for_addresses(
            vec![("127.0.0.1:not-a-port", AccountId::from(3))],
            PoolConfig::default(),
            factory(),
        );
        assert!(matches!(result, Err(HedraError::InvalidAddress(_))));
    }

    #[test]
    fn test_unknown_node_account() {
        let network = Network::testnet(PoolConfig::default(), factory());
        assert!(network.node(&AccountId::from(3)).is_ok());
        let err = network.nodes_for(&[AccountId::from(3), AccountId::from(99)]).unwrap_err();
        assert!(matches!(err, HedraError::NodeAccountUnknown(id) if id == AccountId::from(99)));
    }

    #[tokio::test]
    async fn test_node_account_ids_for_execute_uses_a_third() {
        let network = Network::mainnet(PoolConfig::default(), factory());
        let ids = network.node_account_ids_for_execute().await.unwrap();
        assert_eq!(ids.len(), 6);

        let configured = Network::mainnet(
            PoolConfig {
                max_nodes_per_request: Some(2),
                ..PoolConfig::default()
            },
            factory(),
        );
        assert_eq!(configured.node_account_ids_for_execute().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_addresses_reconciles() {
        let network = Network::testnet(PoolConfig::default(), factory());
        let report = network
            .set_addresses(vec![
                ("0.testnet.hedera.com:50211", AccountId::from(3)),
                ("127.0.0.1:50211", AccountId::from(1001)),
            ])
            .await
            .unwrap();

        assert_eq!(report.added, vec![AccountId::from(1001)]);
        assert_eq!(report.removed.len(), 4);
        assert_eq!(network.node_account_ids(), vec![AccountId::from(3), AccountId::from(1001)]);
    }

    #[tokio::test]
    async fn test_mirror_pick() {
        let mirror = MirrorNetwork::for_addresses(["mirror-a:5600", "mirror-b:5600"], PoolConfig::default(), factory())
            .unwrap();
        let node = mirror.pick().await.unwrap();
        assert_eq!(node.key(), "mirror-a:5600");
    }
}
