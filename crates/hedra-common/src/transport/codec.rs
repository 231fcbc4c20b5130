use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;

/// Codec for encoding/decoding wire messages.
///
/// Postcard is the default: it is compact and deterministic, which the
/// per-node payload cache relies on. JSON is kept for debugging and for
/// talking to nodes fronted by JSON gateways.
///
/// # Example
///
/// ```
/// use hedra_common::transport::Codec;
/// use hedra_common::AccountId;
///
/// let codec = Codec::default();
/// let encoded = codec.encode(&AccountId::from(3)).unwrap();
/// let decoded: AccountId = codec.decode(&encoded).unwrap();
/// assert_eq!(decoded, AccountId::from(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Postcard,
    Json,
}

impl Codec {
    /// Encode a message to bytes
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Postcard => PostcardCodec::encode(message),
            Codec::Json => JsonCodec::encode(message),
        }
    }

    /// Decode a message from bytes
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Postcard => PostcardCodec::decode(data),
            Codec::Json => JsonCodec::decode(data),
        }
    }
}

/// Postcard codec for wire messages
pub struct PostcardCodec;

impl PostcardCodec {
    pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_stdvec(message)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}

/// JSON codec for wire messages
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
