//! Scripted in-memory channels for engine, transaction and query tests.

use async_trait::async_trait;
use bytes::Bytes;
use hedra_common::{AccountId, Channel, ServiceKind, TransportFault};
use hedra_network::{Network, NodeAddress, PoolConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::client::Client;

pub enum ScriptedReply {
    Encoded(Vec<u8>),
    Fault(TransportFault),
}

/// Per-node reply queues plus a log of what every node received.
#[derive(Default)]
pub struct Script {
    replies: Mutex<HashMap<u64, VecDeque<ScriptedReply>>>,
    received: Mutex<Vec<(u64, ServiceKind, String, Bytes)>>,
}

impl Script {
    pub fn push(&self, node: u64, reply: ScriptedReply) {
        self.replies.lock().entry(node).or_default().push_back(reply);
    }

    pub fn calls(&self, node: u64) -> usize {
        self.received.lock().iter().filter(|(n, ..)| *n == node).count()
    }

    /// Request bytes received by `node`, in order.
    pub fn requests(&self, node: u64) -> Vec<Bytes> {
        self.received
            .lock()
            .iter()
            .filter(|(n, ..)| *n == node)
            .map(|(.., bytes)| bytes.clone())
            .collect()
    }

    pub fn methods(&self) -> Vec<String> {
        self.received.lock().iter().map(|(_, _, m, _)| m.clone()).collect()
    }
}

struct ScriptedChannel {
    node: u64,
    script: Arc<Script>,
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn call(&self, service: ServiceKind, method: &str, request: Bytes) -> Result<Bytes, TransportFault> {
        self.script
            .received
            .lock()
            .push((self.node, service, method.to_string(), request));
        let reply = self
            .script
            .replies
            .lock()
            .get_mut(&self.node)
            .and_then(|queue| queue.pop_front());
        match reply {
            Some(ScriptedReply::Encoded(bytes)) => Ok(Bytes::from(bytes)),
            Some(ScriptedReply::Fault(fault)) => Err(fault),
            None => Err(TransportFault::Other(format!("no scripted reply for node {}", self.node))),
        }
    }
}

/// A client whose network has one scripted node per entry of `nodes`
/// (node account `0.0.n`).
pub fn mock_client(nodes: &[u64]) -> (Client, Arc<Script>) {
    let script = Arc::new(Script::default());
    let factory_script = script.clone();
    let factory = move |address: &NodeAddress| -> Arc<dyn Channel> {
        Arc::new(ScriptedChannel {
            node: u64::from(address.port() - 40000),
            script: factory_script.clone(),
        })
    };

    let addresses: Vec<(String, AccountId)> = nodes
        .iter()
        .map(|n| (format!("127.0.0.1:{}", 40000 + n), AccountId::from(*n)))
        .collect();
    let network = Network::for_addresses(addresses, PoolConfig::default(), Arc::new(factory))
        .expect("scripted addresses are valid");
    (Client::new(network, None), script)
}
