//! Core data model for the transaction finality protocol stack
//!
//! - Content-addressed transaction bodies and accumulating signature sets
//! - State references, consumable exactly once system-wide
//! - Filtered views for privacy-preserving notarisation
//! - Notary-signed conflict evidence
//! - The opaque contract-verification seam

pub mod crypto;
pub mod error;
pub mod transaction;
pub mod verifier;

pub use crypto::{AttachmentId, Hash256, PartyKey, PartyKeypair, SignatureEntry, TxId};
pub use error::LedgerError;
pub use transaction::{
    Command, Conflict, FilteredTransaction, OutputState, SignedConflicts, SignedTransaction,
    StateRef, TimeWindow, TransactionBody,
};
pub use verifier::{AcceptAll, FnVerifier, ResolvedTransaction, TransactionVerifier};

/// Current time as unix millis
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
