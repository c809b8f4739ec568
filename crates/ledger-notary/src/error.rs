//! Notary protocol errors
//!
//! A conflict is a first-class, cryptographically evidenced outcome, not a
//! transport failure; the two must never be conflated.

use ledger_net::NetError;
use ledger_types::{LedgerError, SignedConflicts};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotaryError {
    #[error("transaction names notary {expected}, input recorded under {got}")]
    MixedNotary { expected: String, got: String },

    #[error("transaction does not name this notary")]
    WrongNotary,

    #[error("validity window rejected: {0}")]
    TimeWindowInvalid(String),

    #[error("transaction invalid: {0}")]
    TransactionInvalid(String),

    #[error("signatures missing: {0}")]
    SignaturesMissing(String),

    #[error("signatures invalid: {0}")]
    SignaturesInvalid(String),

    #[error("input states already consumed")]
    Conflict(SignedConflicts),

    #[error("conflict evidence failed verification: {0}")]
    BadEvidence(String),

    #[error("notary returned a signature by an unexpected key")]
    WrongKey,

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
