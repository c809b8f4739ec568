//! Hashes, party keys and signatures

use crate::error::LedgerError;
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte blake3 content hash
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct Hash256(pub [u8; 32]);

/// Content-derived transaction id
pub type TxId = Hash256;

/// Content-derived attachment id
pub type AttachmentId = Hash256;

impl Hash256 {
    /// Hash arbitrary bytes
    pub fn digest(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short base58 prefix for logs
    pub fn short(&self) -> String {
        let s = bs58::encode(&self.0).into_string();
        s[..8.min(s.len())].to_string()
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.short())
    }
}

/// Ed25519 verifying key bytes; doubles as the routable peer identity
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct PartyKey(pub [u8; 32]);

impl PartyKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short base58 prefix for logs
    pub fn short(&self) -> String {
        let s = bs58::encode(&self.0).into_string();
        s[..8.min(s.len())].to_string()
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, LedgerError> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| LedgerError::InvalidKey(e.to_string()))
    }
}

impl fmt::Display for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyKey({})", self.short())
    }
}

/// A (public key, signature) pair over a transaction id
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct SignatureEntry {
    pub key: PartyKey,
    pub sig: Vec<u8>,
}

impl SignatureEntry {
    /// Check this signature over the given message bytes
    pub fn verify(&self, message: &[u8]) -> Result<(), LedgerError> {
        let vk = self.key.verifying_key()?;
        let sig = Signature::from_slice(&self.sig).map_err(|e| LedgerError::SignatureInvalid {
            key: self.key.short(),
            detail: e.to_string(),
        })?;
        vk.verify_strict(message, &sig)
            .map_err(|e| LedgerError::SignatureInvalid {
                key: self.key.short(),
                detail: e.to_string(),
            })
    }
}

/// Ed25519 keypair held by a party
#[derive(Clone)]
pub struct PartyKeypair {
    signing: SigningKey,
}

impl PartyKeypair {
    /// Generate a fresh keypair
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(bytes),
        }
    }

    pub fn public(&self) -> PartyKey {
        PartyKey(self.signing.verifying_key().to_bytes())
    }

    /// Sign arbitrary bytes
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }

    /// Sign a transaction id, producing a wire-ready entry
    pub fn sign_id(&self, id: &Hash256) -> SignatureEntry {
        SignatureEntry {
            key: self.public(),
            sig: self.sign(id.as_bytes()),
        }
    }
}

impl fmt::Debug for PartyKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyKeypair({})", self.public().short())
    }
}
