//! Hedra Client
//!
//! Builds, signs and submits transactions and queries against a
//! [`Network`](hedra_network::Network), retrying through busy nodes and
//! transport hiccups with exponential backoff.
//!
//! ```no_run
//! # async fn run() -> hedra_common::Result<()> {
//! use hedra_client::{Client, PrivateKey, Transaction};
//! use hedra_common::AccountId;
//! use std::sync::Arc;
//!
//! let client = Client::testnet();
//! let key = PrivateKey::from_seed([7; 32]);
//! client.set_operator(AccountId::from(1001), Arc::new(key));
//!
//! let response = Transaction::transfer([(AccountId::from(1001), -10), (AccountId::from(1002), 10)])
//!     .execute(&client)
//!     .await?;
//! let receipt = response.get_successful_receipt(&client).await?;
//! println!("{}", receipt.status);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod execute;
pub mod query;
pub mod signer;
pub mod transaction;

#[cfg(test)]
mod testing;

pub use client::{Client, DEFAULT_MAX_QUERY_PAYMENT, DEFAULT_MAX_TRANSACTION_FEE};
pub use config::{
    ClientConfig, ExecutionConfig, MirrorNetworkConfig, NetworkConfig, OperatorConfig, RequestOverrides,
    UnhealthyNodePolicy,
};
pub use execute::{execute, Executable, ExecutionState};
pub use query::{
    AccountBalanceQuery, AccountInfoQuery, AnyQuery, FileContentsQuery, Query, QueryAnswer, TransactionReceiptQuery,
};
pub use signer::{FnSigner, Operator, PrivateKey, PublicKey, Signer};
pub use transaction::{SignatureSet, Transaction, TransactionResponse, DEFAULT_TRANSACTION_VALID_DURATION};
