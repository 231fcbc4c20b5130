//! Execution Engine
//!
//! One attempt loop shared by every request type. A request describes itself
//! through [`Executable`]; [`execute`] picks nodes, sends the request,
//! classifies the outcome and retries with backoff.
//!
//! # Outcome classification
//!
//! | outcome                                                  | action                                   |
//! |----------------------------------------------------------|------------------------------------------|
//! | transient transport fault                                | node failure recorded, next node, attempt + 1 |
//! | other transport fault                                    | [`HedraError::Transport`]                |
//! | busy status (`BUSY`, `PLATFORM_NOT_ACTIVE`, `UNKNOWN`)   | backoff, next node, attempt + 1          |
//! | `OK`                                                     | response mapped and returned             |
//! | any other status                                         | [`Executable::map_status_error`]         |
//!
//! Any decoded node answer counts as a node success, busy statuses included.

use bytes::Bytes;
use hedra_common::{AccountId, Codec, HedraError, Result, ServiceKind, Status, TransactionId};
use hedra_network::{sort_by_health, Node};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::Client;
use crate::config::{ExecutionConfig, UnhealthyNodePolicy};

/// How the engine proceeds after a decoded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Retry,
    Finished,
    Error,
}

impl ExecutionState {
    /// Default classification of a response status.
    pub fn for_status(status: Status) -> Self {
        match status {
            Status::Busy | Status::PlatformNotActive | Status::Unknown => ExecutionState::Retry,
            Status::Ok => ExecutionState::Finished,
            _ => ExecutionState::Error,
        }
    }
}

/// A request the engine can drive.
pub trait Executable: Send + Sync {
    /// Decoded node answer.
    type Raw: Send;
    /// What a successful execution yields.
    type Response: Send;

    /// Nodes this request must go to; `None` lets the pool choose.
    fn node_account_ids(&self) -> Option<Vec<AccountId>>;

    /// ID reported alongside status errors.
    fn transaction_id(&self) -> Option<TransactionId>;

    fn service(&self) -> ServiceKind;

    fn method(&self) -> &'static str;

    /// Wire bytes for `node_account_id`.
    fn make_request(&self, codec: Codec, node_account_id: AccountId) -> Result<Bytes>;

    fn decode_response(&self, codec: Codec, bytes: &[u8]) -> Result<Self::Raw>;

    fn response_status(&self, raw: &Self::Raw) -> Status;

    fn should_retry(&self, raw: &Self::Raw) -> ExecutionState {
        ExecutionState::for_status(self.response_status(raw))
    }

    fn map_response(&self, raw: Self::Raw, node_account_id: AccountId) -> Result<Self::Response>;

    fn map_status_error(&self, raw: &Self::Raw) -> HedraError;
}

/// Runs `executable` against the client's network until it succeeds, fails
/// with a definitive status or runs out of attempts.
///
/// Dropping the returned future abandons the execution; nothing is left
/// running in the background.
pub async fn execute<E: Executable>(
    client: &Client,
    executable: &E,
    config: &ExecutionConfig,
) -> Result<E::Response> {
    let network = client.network();
    let candidates = match executable.node_account_ids() {
        Some(ids) if !ids.is_empty() => ids,
        _ => network.node_account_ids_for_execute().await?,
    };

    let mut nodes = network.nodes_for(&candidates)?;
    if nodes.is_empty() {
        return Err(HedraError::PoolExhausted {
            requested: candidates.len(),
            available: network.pool().len(),
        });
    }
    sort_by_health(&mut nodes);

    let codec = client.codec();
    let mut attempt: u32 = 1;
    let mut cursor: usize = 0;
    let mut last_error: Option<String> = None;

    loop {
        if attempt >= config.max_attempts {
            return Err(HedraError::MaxAttemptsExceeded {
                max_attempts: config.max_attempts,
                last_error,
            });
        }

        let index = match select(&nodes, cursor, config.unhealthy_node_policy) {
            Selection::Ready(index) => index,
            Selection::Wait(index, delay) => {
                debug!(
                    node = %nodes[index].key(),
                    delay_ms = delay.as_millis() as u64,
                    "waiting for node to leave backoff"
                );
                tokio::time::sleep(delay).await;
                cursor = index;
                continue;
            }
        };
        cursor = index;
        let node = &nodes[index];
        let node_account_id = *node.key();

        let request = executable.make_request(codec, node_account_id)?;
        debug!(node = %node_account_id, attempt, method = executable.method(), "sending request");

        let reply = node
            .service(executable.service())
            .call(executable.method(), request)
            .await;

        let bytes = match reply {
            Ok(bytes) => bytes,
            Err(fault) if fault.is_transient() => {
                node.record_failure();
                warn!(node = %node_account_id, attempt, %fault, "transient transport fault, retrying");
                last_error = Some(fault.to_string());
                attempt += 1;
                cursor = next(cursor, nodes.len());
                continue;
            }
            Err(fault) => {
                return Err(HedraError::Transport {
                    message: format!("{} failed on node {}", executable.method(), node_account_id),
                    fault,
                })
            }
        };

        node.record_success();
        let raw = executable.decode_response(codec, &bytes)?;

        match executable.should_retry(&raw) {
            ExecutionState::Finished => return executable.map_response(raw, node_account_id),
            ExecutionState::Error => return Err(executable.map_status_error(&raw)),
            ExecutionState::Retry => {
                let status = executable.response_status(&raw);
                let delay = config.backoff_for(attempt);
                warn!(
                    node = %node_account_id,
                    attempt,
                    %status,
                    delay_ms = delay.as_millis() as u64,
                    "node busy, backing off"
                );
                last_error = Some(status.to_string());
                tokio::time::sleep(delay).await;
                attempt += 1;
                cursor = next(cursor, nodes.len());
            }
        }
    }
}

enum Selection {
    Ready(usize),
    Wait(usize, Duration),
}

fn next(cursor: usize, len: usize) -> usize {
    (cursor + 1) % len
}

fn select<K>(nodes: &[Arc<Node<K>>], cursor: usize, policy: UnhealthyNodePolicy) -> Selection {
    let node = &nodes[cursor];
    if node.is_healthy() {
        return Selection::Ready(cursor);
    }

    match policy {
        UnhealthyNodePolicy::WaitForNode => Selection::Wait(cursor, node.remaining_backoff()),
        UnhealthyNodePolicy::SkipUnhealthy => {
            let order = (0..nodes.len()).map(|offset| (cursor + offset) % nodes.len());
            if let Some(healthy) = order.clone().find(|&i| nodes[i].is_healthy()) {
                return Selection::Ready(healthy);
            }
            let (closest, delay) = order
                .map(|i| (i, nodes[i].remaining_backoff()))
                .min_by_key(|(_, delay)| *delay)
                .unwrap_or((cursor, node.remaining_backoff()));
            Selection::Wait(closest, delay)
        }
    }
}
