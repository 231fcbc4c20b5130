use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Node service a call is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    Crypto,
    File,
    Contract,
    Consensus,
    Freeze,
    Network,
    Token,
    Schedule,
    Util,
}

impl ServiceKind {
    /// Path segment used for this service on the wire.
    pub fn path(&self) -> &'static str {
        match self {
            ServiceKind::Crypto => "proto.CryptoService",
            ServiceKind::File => "proto.FileService",
            ServiceKind::Contract => "proto.SmartContractService",
            ServiceKind::Consensus => "proto.ConsensusService",
            ServiceKind::Freeze => "proto.FreezeService",
            ServiceKind::Network => "proto.NetworkService",
            ServiceKind::Token => "proto.TokenService",
            ServiceKind::Schedule => "proto.ScheduleService",
            ServiceKind::Util => "proto.UtilService",
        }
    }
}

/// Failure of a unary call below the level of the network status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFault {
    Unauthenticated,
    ResourceExhausted,
    Unavailable,
    DeadlineExceeded,
    Cancelled,
    Internal(String),
    Other(String),
}

impl TransportFault {
    /// Whether the fault is a node hiccup worth retrying elsewhere.
    ///
    /// Only the stream-reset class of internal errors is transient; any other
    /// internal error is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportFault::Unauthenticated
            | TransportFault::ResourceExhausted
            | TransportFault::Unavailable => true,
            TransportFault::Internal(message) => is_stream_reset(message),
            TransportFault::DeadlineExceeded | TransportFault::Cancelled | TransportFault::Other(_) => {
                false
            }
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFault::Unauthenticated => f.write_str("unauthenticated"),
            TransportFault::ResourceExhausted => f.write_str("resource exhausted"),
            TransportFault::Unavailable => f.write_str("unavailable"),
            TransportFault::DeadlineExceeded => f.write_str("deadline exceeded"),
            TransportFault::Cancelled => f.write_str("cancelled"),
            TransportFault::Internal(message) => write!(f, "internal: {}", message),
            TransportFault::Other(message) => write!(f, "{}", message),
        }
    }
}

/// Matches a word `rst<c>stream` where `<c>` is any single ASCII character.
fn is_stream_reset(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    lower.match_indices("rst").any(|(start, _)| {
        let sep = start + 3;
        let end = sep + 1 + "stream".len();
        end <= bytes.len()
            && bytes[sep].is_ascii()
            && &bytes[sep + 1..end] == b"stream"
            && (start == 0 || !is_word(bytes[start - 1]))
            && (end == bytes.len() || !is_word(bytes[end]))
    })
}

/// One connection to a node, able to issue unary calls.
///
/// Implementations must be cheap to share: a node hands out the same channel
/// to every concurrent attempt.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn call(
        &self,
        service: ServiceKind,
        method: &str,
        request: Bytes,
    ) -> std::result::Result<Bytes, TransportFault>;

    /// Release the underlying connection. Calls after `close` may fail.
    async fn close(&self) {}
}
