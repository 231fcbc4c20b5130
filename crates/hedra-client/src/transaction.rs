//! Transaction Pipeline
//!
//! `Building -> Frozen -> per node: Unsigned -> Signed -> Serialized`.
//!
//! A [`Transaction`] is edited through its setters until it is frozen.
//! Freezing fixes the transaction ID, the target nodes, the fee and the valid
//! duration, and encodes one canonical body per node (the bodies differ only
//! in their node account). From then on every setter fails with
//! [`HedraError::NotMutable`].
//!
//! Signers may still be added after freezing. A node's payload is signed and
//! serialized the first time it is built and reused unchanged afterwards, so
//! every attempt against the same node sends identical bytes.

use bytes::Bytes;
use hedra_common::{
    AccountAmount, AccountId, Codec, FileId, HedraError, Result, ServiceKind, SignatureMap, SignaturePair,
    SignedTransaction, Status, TopicId, TransactionBody, TransactionData, TransactionEnvelope, TransactionId,
    TransactionReceipt, TransactionSubmitResponse, TransferList,
};
use parking_lot::Mutex;
use sha3::{Digest, Sha3_384};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

use crate::client::{Client, DEFAULT_MAX_TRANSACTION_FEE};
use crate::config::RequestOverrides;
use crate::execute::{self, Executable};
use crate::query::TransactionReceiptQuery;
use crate::signer::{PublicKey, Signer};

/// Valid duration used when none is set.
pub const DEFAULT_TRANSACTION_VALID_DURATION: Duration = Duration::from_secs(120);

type SignFn = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Keys that sign a transaction, at most one entry per public key.
#[derive(Clone, Default)]
pub struct SignatureSet {
    signers: Vec<(PublicKey, SignFn)>,
}

impl SignatureSet {
    /// Adds a signer; returns `false` when the key was already present.
    pub fn insert(&mut self, public_key: PublicKey, sign: SignFn) -> bool {
        if self.contains(&public_key) {
            return false;
        }
        self.signers.push((public_key, sign));
        true
    }

    pub fn contains(&self, public_key: &PublicKey) -> bool {
        self.signers.iter().any(|(key, _)| key == public_key)
    }

    pub fn public_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.signers.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

/// Signed, encoded payload for one node.
#[derive(Debug, Clone)]
struct NodePayload {
    envelope: Bytes,
    signed_transaction_bytes: Vec<u8>,
    hash: Vec<u8>,
}

/// The copy of a frozen transaction addressed to one node.
struct NodeVariant {
    node_account_id: AccountId,
    body_bytes: Vec<u8>,
    signatures: Mutex<Vec<SignaturePair>>,
    payload: OnceLock<NodePayload>,
}

impl Clone for NodeVariant {
    fn clone(&self) -> Self {
        Self {
            node_account_id: self.node_account_id,
            body_bytes: self.body_bytes.clone(),
            signatures: Mutex::new(self.signatures.lock().clone()),
            payload: self.payload.clone(),
        }
    }
}

impl NodeVariant {
    fn build(&self, codec: Codec, signers: &SignatureSet) -> Result<NodePayload> {
        if let Some(payload) = self.payload.get() {
            return Ok(payload.clone());
        }

        let sig_map = {
            let mut signatures = self.signatures.lock();
            for (public_key, sign) in &signers.signers {
                if signatures.iter().any(|pair| pair.public_key == public_key.as_bytes()) {
                    continue;
                }
                signatures.push(SignaturePair {
                    public_key: public_key.as_bytes().to_vec(),
                    signature: sign(&self.body_bytes),
                });
            }
            SignatureMap {
                pairs: signatures.clone(),
            }
        };

        let signed_transaction_bytes = codec.encode(&SignedTransaction {
            body_bytes: self.body_bytes.clone(),
            sig_map,
        })?;
        let hash = Sha3_384::digest(&signed_transaction_bytes).to_vec();
        let envelope = Bytes::from(codec.encode(&TransactionEnvelope {
            signed_transaction_bytes: signed_transaction_bytes.clone(),
        })?);

        // a racing build may have stored its payload first; both are equivalent
        Ok(self
            .payload
            .get_or_init(|| NodePayload {
                envelope,
                signed_transaction_bytes,
                hash,
            })
            .clone())
    }
}

/// Sealed transaction content shared by every send attempt.
#[derive(Clone)]
struct FrozenTransaction {
    transaction_id: TransactionId,
    codec: Codec,
    variants: Vec<NodeVariant>,
}

impl FrozenTransaction {
    fn index_of(&self, node_account_id: AccountId) -> Result<usize> {
        self.variants
            .iter()
            .position(|v| v.node_account_id == node_account_id)
            .ok_or(HedraError::NodeAccountUnknown(node_account_id))
    }

    fn node_account_ids(&self) -> Vec<AccountId> {
        self.variants.iter().map(|v| v.node_account_id).collect()
    }
}

/// A ledger transaction.
///
/// Cloning a frozen transaction gives the copy its own per-node caches, so
/// signers added to one copy never go missing from the other's payloads.
pub struct Transaction {
    transaction_id: Option<TransactionId>,
    node_account_ids: Option<Vec<AccountId>>,
    max_transaction_fee: Option<u64>,
    valid_duration: Duration,
    memo: String,
    data: TransactionData,
    signers: SignatureSet,
    overrides: RequestOverrides,
    frozen: Option<Arc<FrozenTransaction>>,
}

impl Transaction {
    pub fn new(data: TransactionData) -> Self {
        Self {
            transaction_id: None,
            node_account_ids: None,
            max_transaction_fee: None,
            valid_duration: DEFAULT_TRANSACTION_VALID_DURATION,
            memo: String::new(),
            data,
            signers: SignatureSet::default(),
            overrides: RequestOverrides::default(),
            frozen: None,
        }
    }

    /// An hbar transfer; amounts are tinybar, negative for senders.
    pub fn transfer(transfers: impl IntoIterator<Item = (AccountId, i64)>) -> Self {
        Self::new(TransactionData::CryptoTransfer(TransferList {
            transfers: transfers
                .into_iter()
                .map(|(account_id, amount)| AccountAmount { account_id, amount })
                .collect(),
        }))
    }

    pub fn submit_message(topic_id: TopicId, message: impl Into<Vec<u8>>) -> Self {
        Self::new(TransactionData::ConsensusSubmitMessage {
            topic_id,
            message: message.into(),
        })
    }

    pub fn file_append(file_id: FileId, contents: impl Into<Vec<u8>>) -> Self {
        Self::new(TransactionData::FileAppend {
            file_id,
            contents: contents.into(),
        })
    }

    fn require_not_frozen(&self) -> Result<()> {
        if self.frozen.is_some() {
            return Err(HedraError::NotMutable);
        }
        Ok(())
    }

    fn require_frozen(&self) -> Result<&Arc<FrozenTransaction>> {
        self.frozen.as_ref().ok_or(HedraError::NotFrozen)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.frozen
            .as_ref()
            .map(|f| f.transaction_id)
            .or(self.transaction_id)
    }

    pub fn node_account_ids(&self) -> Option<Vec<AccountId>> {
        match &self.frozen {
            Some(frozen) => Some(frozen.node_account_ids()),
            None => self.node_account_ids.clone(),
        }
    }

    pub fn max_transaction_fee(&self) -> Option<u64> {
        self.max_transaction_fee
    }

    pub fn valid_duration(&self) -> Duration {
        self.valid_duration
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn data(&self) -> &TransactionData {
        &self.data
    }

    pub fn set_transaction_id(&mut self, transaction_id: TransactionId) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.transaction_id = Some(transaction_id);
        Ok(self)
    }

    pub fn set_node_account_ids(&mut self, node_account_ids: Vec<AccountId>) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.node_account_ids = Some(node_account_ids);
        Ok(self)
    }

    /// Highest fee, in tinybar, the payer is willing to be charged.
    pub fn set_max_transaction_fee(&mut self, fee: u64) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.max_transaction_fee = Some(fee);
        Ok(self)
    }

    pub fn set_transaction_valid_duration(&mut self, duration: Duration) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.valid_duration = duration;
        Ok(self)
    }

    pub fn set_memo(&mut self, memo: impl Into<String>) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.memo = memo.into();
        Ok(self)
    }

    pub fn set_data(&mut self, data: TransactionData) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.data = data;
        Ok(self)
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.overrides.max_attempts = Some(max_attempts);
        Ok(self)
    }

    pub fn set_min_backoff(&mut self, min_backoff: Duration) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.overrides.min_backoff = Some(min_backoff);
        Ok(self)
    }

    pub fn set_max_backoff(&mut self, max_backoff: Duration) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.overrides.max_backoff = Some(max_backoff);
        Ok(self)
    }

    /// Adds a signer. A key that already signs this transaction is ignored.
    pub fn sign_with<F>(&mut self, public_key: PublicKey, sign: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.signers.insert(public_key, Arc::new(sign));
        self
    }

    /// Adds `signer`; deduplicated by public key like [`sign_with`](Self::sign_with).
    pub fn sign(&mut self, signer: Arc<dyn Signer>) -> &mut Self {
        let public_key = signer.public_key();
        self.sign_with(public_key, move |message| signer.sign(message))
    }

    pub fn signers(&self) -> &SignatureSet {
        &self.signers
    }

    /// Freezes using only explicitly set values.
    ///
    /// Requires a transaction ID and node accounts; the fee falls back to
    /// [`DEFAULT_MAX_TRANSACTION_FEE`]. Freezing an already frozen
    /// transaction does nothing.
    pub fn freeze(&mut self) -> Result<&mut Self> {
        self.freeze_with_codec(Codec::default())
    }

    pub(crate) fn freeze_with_codec(&mut self, codec: Codec) -> Result<&mut Self> {
        if self.frozen.is_some() {
            return Ok(self);
        }
        let transaction_id = self
            .transaction_id
            .ok_or(HedraError::MissingRequiredInput("transaction id"))?;
        let node_account_ids = self
            .node_account_ids
            .clone()
            .ok_or(HedraError::MissingRequiredInput("node account ids"))?;
        let fee = self.max_transaction_fee.unwrap_or(DEFAULT_MAX_TRANSACTION_FEE);
        self.seal(transaction_id, node_account_ids, fee, codec)?;
        Ok(self)
    }

    /// Freezes, filling unset values from `client`: the transaction ID from
    /// the operator, the node accounts from the healthiest nodes of the
    /// network, and the fee from the client default.
    pub async fn freeze_with(&mut self, client: &Client) -> Result<&mut Self> {
        if self.frozen.is_some() {
            return Ok(self);
        }

        let transaction_id = match self.transaction_id {
            Some(id) => id,
            None => {
                let payer = client
                    .operator_account_id()
                    .ok_or(HedraError::MissingRequiredInput("transaction id or client operator"))?;
                TransactionId::generate(payer)
            }
        };

        let node_account_ids = match self.node_account_ids.clone() {
            Some(ids) => ids,
            None => client.network().node_account_ids_for_execute().await?,
        };

        let fee = self
            .max_transaction_fee
            .or_else(|| client.default_max_transaction_fee())
            .unwrap_or(DEFAULT_MAX_TRANSACTION_FEE);

        self.seal(transaction_id, node_account_ids, fee, client.codec())?;
        Ok(self)
    }

    fn seal(
        &mut self,
        transaction_id: TransactionId,
        node_account_ids: Vec<AccountId>,
        fee: u64,
        codec: Codec,
    ) -> Result<()> {
        if node_account_ids.is_empty() {
            return Err(HedraError::MissingRequiredInput("node account ids"));
        }

        let mut variants = Vec::with_capacity(node_account_ids.len());
        for node_account_id in node_account_ids {
            if variants.iter().any(|v: &NodeVariant| v.node_account_id == node_account_id) {
                continue;
            }
            let body = TransactionBody {
                transaction_id,
                node_account_id,
                transaction_fee: fee,
                valid_duration_secs: self.valid_duration.as_secs(),
                memo: self.memo.clone(),
                data: self.data.clone(),
            };
            variants.push(NodeVariant {
                node_account_id,
                body_bytes: codec.encode(&body)?,
                signatures: Mutex::new(Vec::new()),
                payload: OnceLock::new(),
            });
        }

        debug!(%transaction_id, nodes = variants.len(), "transaction frozen");
        self.frozen = Some(Arc::new(FrozenTransaction {
            transaction_id,
            codec,
            variants,
        }));
        Ok(())
    }

    /// Canonical body bytes of the variant for node `index`.
    pub fn body_bytes(&self, index: usize) -> Result<&[u8]> {
        let frozen = self.require_frozen()?;
        frozen
            .variants
            .get(index)
            .map(|v| v.body_bytes.as_slice())
            .ok_or(HedraError::PoolExhausted {
                requested: index + 1,
                available: frozen.variants.len(),
            })
    }

    /// Signed wire payload for node `index`, built once and then reused.
    pub fn build_for_node(&self, index: usize) -> Result<Bytes> {
        let frozen = self.require_frozen()?;
        let variant = frozen.variants.get(index).ok_or(HedraError::PoolExhausted {
            requested: index + 1,
            available: frozen.variants.len(),
        })?;
        Ok(variant.build(frozen.codec, &self.signers)?.envelope)
    }

    /// The envelope for node `index`, as embedded in a query payment.
    pub(crate) fn envelope_for_node(&self, index: usize) -> Result<TransactionEnvelope> {
        let frozen = self.require_frozen()?;
        let variant = frozen.variants.get(index).ok_or(HedraError::PoolExhausted {
            requested: index + 1,
            available: frozen.variants.len(),
        })?;
        Ok(TransactionEnvelope {
            signed_transaction_bytes: variant.build(frozen.codec, &self.signers)?.signed_transaction_bytes,
        })
    }

    /// SHA3-384 of every node's signed transaction.
    pub fn transaction_hash_per_node(&self) -> Result<HashMap<AccountId, Vec<u8>>> {
        let frozen = self.require_frozen()?;
        frozen
            .variants
            .iter()
            .map(|v| Ok((v.node_account_id, v.build(frozen.codec, &self.signers)?.hash)))
            .collect()
    }

    /// Freezes (if needed), signs with the operator when it pays, and submits.
    pub async fn execute(&mut self, client: &Client) -> Result<TransactionResponse> {
        self.freeze_with(client).await?;

        if let Some(operator) = client.operator() {
            let payer = self.require_frozen()?.transaction_id.payer;
            if payer == operator.account_id {
                self.sign(operator.signer.clone());
            }
        }

        let executable = TransactionExecutable {
            frozen: self.require_frozen()?.clone(),
            signers: self.signers.clone(),
            service: self.data.service(),
            method: self.data.method(),
        };
        let config = self.overrides.apply(client.execution_config());
        execute::execute(client, &executable, &config).await
    }
}

impl Clone for Transaction {
    fn clone(&self) -> Self {
        Self {
            transaction_id: self.transaction_id,
            node_account_ids: self.node_account_ids.clone(),
            max_transaction_fee: self.max_transaction_fee,
            valid_duration: self.valid_duration,
            memo: self.memo.clone(),
            data: self.data.clone(),
            signers: self.signers.clone(),
            overrides: self.overrides,
            frozen: self.frozen.as_ref().map(|f| Arc::new(FrozenTransaction::clone(f))),
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("transaction_id", &self.transaction_id())
            .field("node_account_ids", &self.node_account_ids())
            .field("data", &self.data)
            .field("signers", &self.signers.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

struct TransactionExecutable {
    frozen: Arc<FrozenTransaction>,
    signers: SignatureSet,
    service: ServiceKind,
    method: &'static str,
}

impl Executable for TransactionExecutable {
    type Raw = TransactionSubmitResponse;
    type Response = TransactionResponse;

    fn node_account_ids(&self) -> Option<Vec<AccountId>> {
        Some(self.frozen.node_account_ids())
    }

    fn transaction_id(&self) -> Option<TransactionId> {
        Some(self.frozen.transaction_id)
    }

    fn service(&self) -> ServiceKind {
        self.service
    }

    fn method(&self) -> &'static str {
        self.method
    }

    fn make_request(&self, _codec: Codec, node_account_id: AccountId) -> Result<Bytes> {
        let index = self.frozen.index_of(node_account_id)?;
        Ok(self.frozen.variants[index]
            .build(self.frozen.codec, &self.signers)?
            .envelope)
    }

    fn decode_response(&self, codec: Codec, bytes: &[u8]) -> Result<TransactionSubmitResponse> {
        codec.decode(bytes)
    }

    fn response_status(&self, raw: &TransactionSubmitResponse) -> Status {
        raw.precheck
    }

    fn map_response(
        &self,
        _raw: TransactionSubmitResponse,
        node_account_id: AccountId,
    ) -> Result<TransactionResponse> {
        let index = self.frozen.index_of(node_account_id)?;
        let payload = self.frozen.variants[index].build(self.frozen.codec, &self.signers)?;
        Ok(TransactionResponse {
            transaction_id: self.frozen.transaction_id,
            node_account_id,
            transaction_hash: payload.hash,
        })
    }

    fn map_status_error(&self, raw: &TransactionSubmitResponse) -> HedraError {
        HedraError::PrecheckStatus {
            status: raw.precheck,
            transaction_id: Some(self.frozen.transaction_id),
        }
    }
}

/// Result of a successfully submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub transaction_id: TransactionId,
    /// Node that accepted the transaction.
    pub node_account_id: AccountId,
    /// SHA3-384 of the signed transaction sent to that node.
    pub transaction_hash: Vec<u8>,
}

impl TransactionResponse {
    /// Fetches the receipt from the node that accepted the transaction.
    pub async fn get_receipt(&self, client: &Client) -> Result<TransactionReceipt> {
        TransactionReceiptQuery::new(self.transaction_id)
            .set_node_account_ids(vec![self.node_account_id])
            .execute(client)
            .await
    }

    /// Like [`get_receipt`](Self::get_receipt) but fails with
    /// [`HedraError::ReceiptStatus`] unless the receipt reports `SUCCESS`.
    pub async fn get_successful_receipt(&self, client: &Client) -> Result<TransactionReceipt> {
        TransactionReceiptQuery::new(self.transaction_id)
            .set_node_account_ids(vec![self.node_account_id])
            .validate_status(true)
            .execute(client)
            .await
    }
}
