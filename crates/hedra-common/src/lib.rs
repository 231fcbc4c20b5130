//! Hedra Common Types and Transport
//!
//! This crate provides the protocol definitions, error taxonomy, codec and
//! transport channel contract shared by every hedra crate.
//!
//! # Overview
//!
//! Hedra is a client library for submitting transactions and queries to a
//! distributed ledger network. This crate contains the pieces that every other
//! crate speaks in terms of:
//!
//! - **Protocol Layer**: entity and transaction identifiers, network status
//!   codes, wire messages and the [`HedraError`] taxonomy
//! - **Transport Layer**: the [`Codec`] used to turn wire messages into bytes
//!   and the [`Channel`] contract a node uses to issue unary calls
//!
//! # Wire Format
//!
//! Every request and response is a serde-described message encoded with the
//! client's [`Codec`] (postcard by default). Postcard encoding is
//! deterministic, so the same message always yields the same bytes.
//!
//! # Example
//!
//! ```
//! use hedra_common::{AccountId, Codec, TransactionId};
//!
//! let payer = AccountId::new(0, 0, 1001);
//! let id = TransactionId::generate(payer);
//! let bytes = Codec::default().encode(&id).unwrap();
//! let decoded: TransactionId = Codec::default().decode(&bytes).unwrap();
//! assert_eq!(id, decoded);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
pub use transport::{Channel, Codec, ServiceKind, TransportFault};
