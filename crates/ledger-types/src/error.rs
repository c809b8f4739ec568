//! Ledger data-model errors

use thiserror::Error;

/// Errors from signature checks, key decoding and contract verification
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("invalid public key {0}")]
    InvalidKey(String),

    #[error("invalid signature by {key}: {detail}")]
    SignatureInvalid { key: String, detail: String },

    #[error("conflicting signature for key {0}")]
    ConflictingSignature(String),

    #[error("missing signatures for {0:?}")]
    MissingSignatures(Vec<String>),

    #[error("unknown input transaction {0}")]
    UnknownInput(String),

    #[error("input index {index} out of range for transaction {txid}")]
    BadInputIndex { txid: String, index: u32 },

    #[error("duplicate input reference {0}")]
    DuplicateInput(String),

    #[error("verification failed: {0}")]
    Verification(String),
}
