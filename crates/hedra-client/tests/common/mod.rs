//! In-memory ledger used by the integration tests.
//!
//! Every node shares one [`FakeLedger`]. Nodes can be marked down (they then
//! fail with `UNAVAILABLE`) or told to answer `BUSY` a number of times before
//! accepting a submission.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use hedra_client::Client;
use hedra_common::{
    AccountBalance, AccountId, Channel, Codec, Query, QueryKind, QueryResponse, ResponseBody, ResponseHeader,
    ResponseType, ServiceKind, SignedTransaction, Status, TransactionBody, TransactionEnvelope, TransactionId,
    TransactionReceipt, TransactionSubmitResponse, TransportFault,
};
use hedra_network::{Network, NodeAddress, PoolConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const BASE_PORT: u16 = 41000;
pub const QUERY_COST: u64 = 10;

#[derive(Default)]
pub struct FakeLedger {
    down: Mutex<HashSet<u64>>,
    busy: Mutex<HashMap<u64, u32>>,
    accepted: Mutex<Vec<(u64, TransactionBody, SignedTransaction)>>,
    calls: Mutex<Vec<(u64, String)>>,
    payments: Mutex<Vec<(u64, TransactionBody)>>,
}

impl FakeLedger {
    pub fn set_down(&self, node: u64) {
        self.down.lock().insert(node);
    }

    pub fn set_busy(&self, node: u64, times: u32) {
        self.busy.lock().insert(node, times);
    }

    pub fn accepted(&self) -> Vec<(u64, TransactionBody, SignedTransaction)> {
        self.accepted.lock().clone()
    }

    pub fn calls(&self) -> Vec<(u64, String)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, node: u64) -> usize {
        self.calls.lock().iter().filter(|(n, _)| *n == node).count()
    }

    pub fn payments(&self) -> Vec<(u64, TransactionBody)> {
        self.payments.lock().clone()
    }

    fn submit(&self, node: u64, request: &[u8]) -> TransactionSubmitResponse {
        let precheck = {
            let mut busy = self.busy.lock();
            match busy.get_mut(&node) {
                Some(times) if *times > 0 => {
                    *times -= 1;
                    Status::Busy
                }
                _ => Status::Ok,
            }
        };
        if precheck == Status::Ok {
            let (body, signed) = decode_envelope(request);
            assert_eq!(body.node_account_id, AccountId::from(node), "body addressed to the wrong node");
            self.accepted.lock().push((node, body, signed));
        }
        TransactionSubmitResponse { precheck, cost: 0 }
    }

    fn answer(&self, node: u64, request: &[u8]) -> QueryResponse {
        let query: Query = Codec::default().decode(request).unwrap();
        if query.header.response_type == ResponseType::CostAnswer {
            return response(Status::Ok, ResponseType::CostAnswer, QUERY_COST, None);
        }
        if let Some(payment) = &query.header.payment {
            let signed: SignedTransaction = Codec::default().decode(&payment.signed_transaction_bytes).unwrap();
            let body: TransactionBody = Codec::default().decode(&signed.body_bytes).unwrap();
            self.payments.lock().push((node, body));
        }

        let body = match query.kind {
            QueryKind::AccountBalance { account_id } => ResponseBody::AccountBalance(AccountBalance {
                account_id,
                hbars: account_id.num * 100,
            }),
            QueryKind::TransactionReceipt { transaction_id } => {
                let status = if self.was_accepted(&transaction_id) {
                    Status::Success
                } else {
                    return response(Status::ReceiptNotFound, ResponseType::AnswerOnly, 0, None);
                };
                ResponseBody::TransactionReceipt(TransactionReceipt {
                    status,
                    account_id: None,
                    file_id: None,
                    topic_sequence_number: None,
                })
            }
            QueryKind::AccountInfo { account_id } => ResponseBody::AccountInfo(hedra_common::AccountInfo {
                account_id,
                balance: account_id.num * 100,
                memo: String::new(),
                key: Vec::new(),
                deleted: false,
            }),
            QueryKind::FileContents { .. } => {
                return response(Status::NotSupported, ResponseType::AnswerOnly, 0, None)
            }
        };
        response(Status::Ok, ResponseType::AnswerOnly, 0, Some(body))
    }

    fn was_accepted(&self, transaction_id: &TransactionId) -> bool {
        self.accepted
            .lock()
            .iter()
            .any(|(_, body, _)| body.transaction_id == *transaction_id)
    }
}

pub fn response(precheck: Status, response_type: ResponseType, cost: u64, body: Option<ResponseBody>) -> QueryResponse {
    QueryResponse {
        header: ResponseHeader {
            precheck,
            response_type,
            cost,
        },
        body,
    }
}

pub fn decode_envelope(bytes: &[u8]) -> (TransactionBody, SignedTransaction) {
    let codec = Codec::default();
    let envelope: TransactionEnvelope = codec.decode(bytes).unwrap();
    let signed: SignedTransaction = codec.decode(&envelope.signed_transaction_bytes).unwrap();
    let body: TransactionBody = codec.decode(&signed.body_bytes).unwrap();
    (body, signed)
}

struct FakeNodeChannel {
    node: u64,
    ledger: Arc<FakeLedger>,
}

#[async_trait]
impl Channel for FakeNodeChannel {
    async fn call(&self, service: ServiceKind, method: &str, request: Bytes) -> Result<Bytes, TransportFault> {
        self.ledger.calls.lock().push((self.node, method.to_string()));
        if self.ledger.down.lock().contains(&self.node) {
            return Err(TransportFault::Unavailable);
        }

        let codec = Codec::default();
        let reply = match (service, method) {
            (ServiceKind::Crypto, "cryptoTransfer") => codec.encode(&self.ledger.submit(self.node, &request)),
            _ => codec.encode(&self.ledger.answer(self.node, &request)),
        };
        reply
            .map(Bytes::from)
            .map_err(|e| TransportFault::Other(e.to_string()))
    }
}

/// A client over `nodes` (node account `0.0.n` at port `BASE_PORT + n`)
/// all backed by one fake ledger.
pub fn ledger_client(nodes: &[u64]) -> (Client, Arc<FakeLedger>) {
    let ledger = Arc::new(FakeLedger::default());
    let shared = ledger.clone();
    let factory = move |address: &NodeAddress| -> Arc<dyn Channel> {
        Arc::new(FakeNodeChannel {
            node: u64::from(address.port() - BASE_PORT),
            ledger: shared.clone(),
        })
    };

    let addresses: Vec<(String, AccountId)> = nodes
        .iter()
        .map(|n| (format!("127.0.0.1:{}", BASE_PORT as u64 + n), AccountId::from(*n)))
        .collect();
    let network = Network::for_addresses(addresses, PoolConfig::default(), Arc::new(factory)).unwrap();
    (Client::new(network, None), ledger)
}
