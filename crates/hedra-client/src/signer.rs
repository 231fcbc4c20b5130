use ed25519_dalek::{SigningKey, VerifyingKey};
use hedra_common::{AccountId, HedraError, Result};
use std::fmt;
use std::sync::Arc;

/// DER prefix of a PKCS#8 wrapped ed25519 private key.
const ED25519_PRIVATE_DER_PREFIX: &str = "302e020100300506032b657004220420";

/// Public key bytes identifying a signer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks an ed25519 signature made by this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(self.0.as_slice()) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
            return false;
        };
        key.verify_strict(message, &signature).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

/// Something that can sign transaction bodies.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// A [`Signer`] made from a public key and a signing function.
pub struct FnSigner<F> {
    public_key: PublicKey,
    sign: F,
}

impl<F> FnSigner<F>
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync,
{
    pub fn new(public_key: PublicKey, sign: F) -> Self {
        Self { public_key, sign }
    }
}

impl<F> Signer for FnSigner<F>
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync,
{
    fn public_key(&self) -> PublicKey {
        self.public_key.clone()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        (self.sign)(message)
    }
}

/// An ed25519 private key.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(SigningKey::from_bytes(&seed))
    }

    /// Parses a hex key: either the raw 32-byte seed or its DER encoding.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let s = s.strip_prefix(ED25519_PRIVATE_DER_PREFIX).unwrap_or(s);

        let bytes = hex::decode(s).map_err(|e| HedraError::InvalidKey(e.to_string()))?;
        let seed = <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
            HedraError::InvalidKey(format!("expected 32 key bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(seed))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.0.verifying_key().to_bytes().to_vec())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }
}

impl Signer for PrivateKey {
    fn public_key(&self) -> PublicKey {
        PrivateKey::public_key(self)
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        use ed25519_dalek::Signer as _;
        self.0.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&self.public_key()).finish()
    }
}

/// The account paying for requests sent through a client, with its key.
#[derive(Clone)]
pub struct Operator {
    pub account_id: AccountId,
    pub signer: Arc<dyn Signer>,
}

impl Operator {
    pub fn new(account_id: AccountId, signer: Arc<dyn Signer>) -> Self {
        Self { account_id, signer }
    }

    pub fn public_key(&self) -> PublicKey {
        self.signer.public_key()
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("account_id", &self.account_id)
            .field("public_key", &self.public_key())
            .finish()
    }
}
