//! Query layer.
//!
//! A [`Query`] asks a node for state. Free queries go out as they are; paid
//! queries first learn their cost with a cost-only query (unless a payment
//! amount is set) and then attach a transfer from the operator to the
//! receiving node, built per node through the transaction pipeline.
//!
//! Every query response carries a [`ResponseHeader`] whose status decides
//! between retry, success and error exactly as for transactions. Receipt
//! queries additionally keep retrying while the receipt itself is still
//! pending.

use bytes::Bytes;
use hedra_common::{
    AccountBalance, AccountId, AccountInfo, Codec, FileContents, FileId, HedraError, QueryHeader, QueryKind,
    QueryResponse, ResponseBody, ResponseType, Result, ServiceKind, Status, TransactionEnvelope,
    TransactionId, TransactionReceipt,
};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::debug;

use crate::client::Client;
use crate::config::RequestOverrides;
use crate::execute::{self, Executable, ExecutionState};
use crate::transaction::Transaction;

/// A typed answer extracted from a [`ResponseBody`].
pub trait QueryAnswer: Sized + Send {
    fn from_body(body: ResponseBody) -> Result<Self>;
}

macro_rules! query_answer {
    ($ty:ident) => {
        impl QueryAnswer for $ty {
            fn from_body(body: ResponseBody) -> Result<Self> {
                match body {
                    ResponseBody::$ty(answer) => Ok(answer),
                    other => Err(HedraError::InvalidResponse(format!(
                        concat!("expected ", stringify!($ty), ", got {:?}"),
                        other
                    ))),
                }
            }
        }
    };
}

query_answer!(AccountBalance);
query_answer!(AccountInfo);
query_answer!(TransactionReceipt);
query_answer!(FileContents);

impl QueryAnswer for ResponseBody {
    fn from_body(body: ResponseBody) -> Result<Self> {
        Ok(body)
    }
}

/// A query whose answer is `T`.
#[derive(Debug, Clone)]
pub struct Query<T> {
    kind: QueryKind,
    node_account_ids: Option<Vec<AccountId>>,
    payment_amount: Option<u64>,
    max_query_payment: Option<u64>,
    payment_transaction_id: Option<TransactionId>,
    validate_status: bool,
    overrides: RequestOverrides,
    _answer: PhantomData<fn() -> T>,
}

pub type AccountBalanceQuery = Query<AccountBalance>;
pub type AccountInfoQuery = Query<AccountInfo>;
pub type TransactionReceiptQuery = Query<TransactionReceipt>;
pub type FileContentsQuery = Query<FileContents>;
/// A query of any kind, answered with the raw [`ResponseBody`].
pub type AnyQuery = Query<ResponseBody>;

impl AccountBalanceQuery {
    pub fn new(account_id: AccountId) -> Self {
        Self::with_kind(QueryKind::AccountBalance { account_id })
    }
}

impl AccountInfoQuery {
    pub fn new(account_id: AccountId) -> Self {
        Self::with_kind(QueryKind::AccountInfo { account_id })
    }
}

impl TransactionReceiptQuery {
    pub fn new(transaction_id: TransactionId) -> Self {
        Self::with_kind(QueryKind::TransactionReceipt { transaction_id })
    }

    /// Fail with [`HedraError::ReceiptStatus`] unless the final receipt
    /// reports `SUCCESS`.
    pub fn validate_status(&mut self, validate: bool) -> &mut Self {
        self.validate_status = validate;
        self
    }
}

impl FileContentsQuery {
    pub fn new(file_id: FileId) -> Self {
        Self::with_kind(QueryKind::FileContents { file_id })
    }
}

impl<T: QueryAnswer> Query<T> {
    pub fn with_kind(kind: QueryKind) -> Self {
        Self {
            kind,
            node_account_ids: None,
            payment_amount: None,
            max_query_payment: None,
            payment_transaction_id: None,
            validate_status: false,
            overrides: RequestOverrides::default(),
            _answer: PhantomData,
        }
    }

    pub fn kind(&self) -> &QueryKind {
        &self.kind
    }

    /// Balance and receipt queries are free; everything else costs a fee.
    pub fn requires_payment(&self) -> bool {
        !matches!(
            self.kind,
            QueryKind::AccountBalance { .. } | QueryKind::TransactionReceipt { .. }
        )
    }

    pub fn set_node_account_ids(&mut self, node_account_ids: Vec<AccountId>) -> &mut Self {
        self.node_account_ids = Some(node_account_ids);
        self
    }

    /// Pays exactly `amount` tinybar without asking for the cost first.
    pub fn set_payment_amount(&mut self, amount: u64) -> &mut Self {
        self.payment_amount = Some(amount);
        self
    }

    /// Highest cost accepted when the cost is looked up.
    pub fn set_max_query_payment(&mut self, max: u64) -> &mut Self {
        self.max_query_payment = Some(max);
        self
    }

    pub fn set_payment_transaction_id(&mut self, transaction_id: TransactionId) -> &mut Self {
        self.payment_transaction_id = Some(transaction_id);
        self
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) -> &mut Self {
        self.overrides.max_attempts = Some(max_attempts);
        self
    }

    pub fn set_min_backoff(&mut self, min_backoff: Duration) -> &mut Self {
        self.overrides.min_backoff = Some(min_backoff);
        self
    }

    pub fn set_max_backoff(&mut self, max_backoff: Duration) -> &mut Self {
        self.overrides.max_backoff = Some(max_backoff);
        self
    }

    async fn resolve_nodes(&self, client: &Client) -> Result<Vec<AccountId>> {
        match &self.node_account_ids {
            Some(ids) if !ids.is_empty() => Ok(ids.clone()),
            _ => client.network().node_account_ids_for_execute().await,
        }
    }

    fn correlation_id(&self) -> Option<TransactionId> {
        match &self.kind {
            QueryKind::TransactionReceipt { transaction_id } => Some(*transaction_id),
            _ => self.payment_transaction_id,
        }
    }

    /// Asks the network what answering this query would cost, in tinybar.
    pub async fn get_cost(&self, client: &Client) -> Result<u64> {
        let nodes = self.resolve_nodes(client).await?;
        self.cost_on(client, nodes).await
    }

    async fn cost_on(&self, client: &Client, nodes: Vec<AccountId>) -> Result<u64> {
        let executable = QueryExecutable {
            kind: &self.kind,
            nodes,
            payments: HashMap::new(),
            response_type: ResponseType::CostAnswer,
            transaction_id: self.correlation_id(),
        };
        let config = self.overrides.apply(client.execution_config());
        let response = execute::execute(client, &executable, &config).await?;
        Ok(response.header.cost)
    }

    /// One frozen, operator-signed payment per node.
    fn build_payments(
        &self,
        client: &Client,
        nodes: &[AccountId],
        amount: u64,
    ) -> Result<(TransactionId, HashMap<AccountId, TransactionEnvelope>)> {
        let operator = client
            .operator()
            .ok_or(HedraError::MissingRequiredInput("client operator for query payment"))?;
        let transaction_id = self
            .payment_transaction_id
            .unwrap_or_else(|| TransactionId::generate(operator.account_id));
        let amount = i64::try_from(amount).map_err(|_| HedraError::MaxQueryPaymentExceeded {
            cost: amount,
            max: i64::MAX as u64,
        })?;

        let mut payments = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let mut payment = Transaction::transfer([(operator.account_id, -amount), (*node, amount)]);
            payment
                .set_transaction_id(transaction_id)?
                .set_node_account_ids(vec![*node])?
                .freeze_with_codec(client.codec())?
                .sign(operator.signer.clone());
            payments.insert(*node, payment.envelope_for_node(0)?);
        }
        Ok((transaction_id, payments))
    }

    /// Runs the query, paying for it first when the kind requires it.
    pub async fn execute(&self, client: &Client) -> Result<T> {
        let nodes = self.resolve_nodes(client).await?;

        let (transaction_id, payments) = if self.requires_payment() {
            let amount = match self.payment_amount {
                Some(amount) => amount,
                None => {
                    let cost = self.cost_on(client, nodes.clone()).await?;
                    let max = self.max_query_payment.unwrap_or_else(|| client.max_query_payment());
                    if cost > max {
                        return Err(HedraError::MaxQueryPaymentExceeded { cost, max });
                    }
                    cost
                }
            };
            debug!(amount, nodes = nodes.len(), "attaching query payment");
            let (id, payments) = self.build_payments(client, &nodes, amount)?;
            let id = match &self.kind {
                QueryKind::TransactionReceipt { transaction_id } => *transaction_id,
                _ => id,
            };
            (Some(id), payments)
        } else {
            (self.correlation_id(), HashMap::new())
        };

        let executable = QueryExecutable {
            kind: &self.kind,
            nodes,
            payments,
            response_type: ResponseType::AnswerOnly,
            transaction_id,
        };
        let config = self.overrides.apply(client.execution_config());
        let response = execute::execute(client, &executable, &config).await?;

        let body = response
            .body
            .ok_or_else(|| HedraError::InvalidResponse("answer without a body".to_string()))?;

        if self.validate_status {
            if let (QueryKind::TransactionReceipt { transaction_id }, ResponseBody::TransactionReceipt(receipt)) =
                (&self.kind, &body)
            {
                if receipt.status != Status::Success {
                    return Err(HedraError::ReceiptStatus {
                        status: receipt.status,
                        transaction_id: *transaction_id,
                    });
                }
            }
        }

        T::from_body(body)
    }
}

struct QueryExecutable<'a> {
    kind: &'a QueryKind,
    nodes: Vec<AccountId>,
    payments: HashMap<AccountId, TransactionEnvelope>,
    response_type: ResponseType,
    transaction_id: Option<TransactionId>,
}

impl Executable for QueryExecutable<'_> {
    type Raw = QueryResponse;
    type Response = QueryResponse;

    fn node_account_ids(&self) -> Option<Vec<AccountId>> {
        Some(self.nodes.clone())
    }

    fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    fn service(&self) -> ServiceKind {
        self.kind.service()
    }

    fn method(&self) -> &'static str {
        self.kind.method()
    }

    fn make_request(&self, codec: Codec, node_account_id: AccountId) -> Result<Bytes> {
        let query = hedra_common::Query {
            header: QueryHeader {
                payment: self.payments.get(&node_account_id).cloned(),
                response_type: self.response_type,
            },
            kind: self.kind.clone(),
        };
        Ok(Bytes::from(codec.encode(&query)?))
    }

    fn decode_response(&self, codec: Codec, bytes: &[u8]) -> Result<QueryResponse> {
        codec.decode(bytes)
    }

    fn response_status(&self, raw: &QueryResponse) -> Status {
        raw.header.precheck
    }

    fn should_retry(&self, raw: &QueryResponse) -> ExecutionState {
        let state = ExecutionState::for_status(raw.header.precheck);
        if state != ExecutionState::Finished || self.response_type == ResponseType::CostAnswer {
            return state;
        }
        match &raw.body {
            Some(ResponseBody::TransactionReceipt(receipt))
                if matches!(receipt.status, Status::Unknown | Status::Busy) =>
            {
                ExecutionState::Retry
            }
            _ => state,
        }
    }

    fn map_response(&self, raw: QueryResponse, _node_account_id: AccountId) -> Result<QueryResponse> {
        Ok(raw)
    }

    fn map_status_error(&self, raw: &QueryResponse) -> HedraError {
        HedraError::QueryStatus {
            status: raw.header.precheck,
            transaction_id: self.transaction_id,
        }
    }
}
