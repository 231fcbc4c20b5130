//! Hedra Transport Layer
//!
//! This module provides the codec used to turn wire messages into bytes and
//! the channel contract nodes use to issue unary calls.
//!
//! # Components
//!
//! - **[`Codec`]** / **[`PostcardCodec`]** / **[`JsonCodec`]**: encode/decode wire messages
//! - **[`Channel`]**: one unary call to a node, answered with bytes or a [`TransportFault`]
//! - **[`ServiceKind`]**: which node service a call is routed to
//! - **[`HttpChannel`]**: a [`Channel`] that POSTs request bytes over HTTP/1.1
//!
//! # Example
//!
//! ```no_run
//! use hedra_common::transport::{Channel, HttpChannel, ServiceKind};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let channel = HttpChannel::new("127.0.0.1:50211", Duration::from_secs(10));
//! let response = channel
//!     .call(ServiceKind::Crypto, "cryptoGetBalance", vec![1, 2, 3].into())
//!     .await;
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod http;

pub use channel::{Channel, ServiceKind, TransportFault};
pub use codec::{Codec, JsonCodec, PostcardCodec};
pub use http::HttpChannel;
