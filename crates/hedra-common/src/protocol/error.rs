use thiserror::Error;

use crate::protocol::ids::{AccountId, TransactionId};
use crate::protocol::status::Status;
use crate::transport::TransportFault;

#[derive(Error, Debug)]
pub enum HedraError {
    #[error("max attempts ({max_attempts}) exceeded; last error: {}", last_error.as_deref().unwrap_or("none"))]
    MaxAttemptsExceeded {
        max_attempts: u32,
        last_error: Option<String>,
    },

    #[error("transaction `{}` failed pre-check with status `{status}`", display_id(transaction_id))]
    PrecheckStatus {
        status: Status,
        transaction_id: Option<TransactionId>,
    },

    #[error("query for transaction `{}` failed with status `{status}`", display_id(transaction_id))]
    QueryStatus {
        status: Status,
        transaction_id: Option<TransactionId>,
    },

    #[error("receipt for transaction `{transaction_id}` contained error status `{status}`")]
    ReceiptStatus {
        status: Status,
        transaction_id: TransactionId,
    },

    #[error("transaction is immutable; it has been frozen")]
    NotMutable,

    #[error("transaction must be frozen first")]
    NotFrozen,

    #[error("missing required input: {0}")]
    MissingRequiredInput(&'static str),

    #[error("node pool exhausted: requested {requested}, available {available}")]
    PoolExhausted { requested: usize, available: usize },

    #[error("node account `{0}` is unknown")]
    NodeAccountUnknown(AccountId),

    #[error("transport error ({fault:?}): {message}")]
    Transport {
        fault: TransportFault,
        message: String,
    },

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("failed to parse: {0}")]
    BasicParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("query cost of {cost} tinybar exceeds max query payment of {max} tinybar")]
    MaxQueryPaymentExceeded { cost: u64, max: u64 },

    #[error("transaction id `{0}` was already issued")]
    TransactionIdCollision(TransactionId),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_id(id: &Option<TransactionId>) -> String {
    id.as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<none>".to_string())
}

impl From<TransportFault> for HedraError {
    fn from(fault: TransportFault) -> Self {
        let message = fault.to_string();
        HedraError::Transport { fault, message }
    }
}

impl HedraError {
    /// The network status carried by a status-class error, if any.
    pub fn status(&self) -> Option<Status> {
        match self {
            HedraError::PrecheckStatus { status, .. }
            | HedraError::QueryStatus { status, .. }
            | HedraError::ReceiptStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HedraError>;
