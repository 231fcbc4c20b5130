//! Wire messages exchanged with network nodes.
//!
//! These are plain serde-described data carriers. The client turns them into
//! bytes with a [`Codec`](crate::transport::Codec); nodes answer with the
//! matching response message.

use serde::{Deserialize, Serialize};

use crate::protocol::ids::{AccountId, FileId, TopicId, TransactionId};
use crate::protocol::status::Status;
use crate::transport::ServiceKind;

/// One debit or credit inside a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAmount {
    pub account_id: AccountId,
    /// Tinybar; negative for the sending side.
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferList {
    pub transfers: Vec<AccountAmount>,
}

impl TransferList {
    /// Sum of all amounts; a well-formed transfer nets to zero.
    pub fn net(&self) -> i64 {
        self.transfers.iter().map(|t| t.amount).sum()
    }
}

/// The type-specific part of a transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionData {
    CryptoTransfer(TransferList),
    ConsensusSubmitMessage { topic_id: TopicId, message: Vec<u8> },
    FileAppend { file_id: FileId, contents: Vec<u8> },
}

impl TransactionData {
    pub fn service(&self) -> ServiceKind {
        match self {
            TransactionData::CryptoTransfer(_) => ServiceKind::Crypto,
            TransactionData::ConsensusSubmitMessage { .. } => ServiceKind::Consensus,
            TransactionData::FileAppend { .. } => ServiceKind::File,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            TransactionData::CryptoTransfer(_) => "cryptoTransfer",
            TransactionData::ConsensusSubmitMessage { .. } => "submitMessage",
            TransactionData::FileAppend { .. } => "appendContent",
        }
    }
}

/// Canonical body of a transaction as sent to one specific node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub transaction_id: TransactionId,
    /// The node this copy of the body is addressed to.
    pub node_account_id: AccountId,
    pub transaction_fee: u64,
    pub valid_duration_secs: u64,
    pub memo: String,
    pub data: TransactionData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePair {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignatureMap {
    pub pairs: Vec<SignaturePair>,
}

impl SignatureMap {
    pub fn contains(&self, public_key: &[u8]) -> bool {
        self.pairs.iter().any(|pair| pair.public_key == public_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub body_bytes: Vec<u8>,
    pub sig_map: SignatureMap,
}

/// Outer envelope submitted to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub signed_transaction_bytes: Vec<u8>,
}

/// Node answer to a transaction submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSubmitResponse {
    pub precheck: Status,
    pub cost: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseType {
    #[default]
    AnswerOnly,
    CostAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryHeader {
    pub payment: Option<TransactionEnvelope>,
    pub response_type: ResponseType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    AccountBalance { account_id: AccountId },
    AccountInfo { account_id: AccountId },
    TransactionReceipt { transaction_id: TransactionId },
    FileContents { file_id: FileId },
}

impl QueryKind {
    pub fn service(&self) -> ServiceKind {
        match self {
            QueryKind::AccountBalance { .. } | QueryKind::AccountInfo { .. } => ServiceKind::Crypto,
            QueryKind::TransactionReceipt { .. } => ServiceKind::Crypto,
            QueryKind::FileContents { .. } => ServiceKind::File,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            QueryKind::AccountBalance { .. } => "cryptoGetBalance",
            QueryKind::AccountInfo { .. } => "getAccountInfo",
            QueryKind::TransactionReceipt { .. } => "getTransactionReceipts",
            QueryKind::FileContents { .. } => "getFileContent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub header: QueryHeader,
    pub kind: QueryKind,
}

/// Status header present in every query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub precheck: Status,
    pub response_type: ResponseType,
    pub cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub hbars: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_id: AccountId,
    pub balance: u64,
    pub memo: String,
    pub key: Vec<u8>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub status: Status,
    pub account_id: Option<AccountId>,
    pub file_id: Option<FileId>,
    pub topic_sequence_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContents {
    pub file_id: FileId,
    pub contents: Vec<u8>,
}

/// Every answer kind a query can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    AccountBalance(AccountBalance),
    AccountInfo(AccountInfo),
    TransactionReceipt(TransactionReceipt),
    FileContents(FileContents),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub header: ResponseHeader,
    /// Absent for cost answers and failed pre-checks.
    pub body: Option<ResponseBody>,
}
