//! Flow failure taxonomy
//!
//! Transport failures are retryable (fetch and notary commit are
//! idempotent, collection restarts from scratch). Protocol violations,
//! graph-ceiling aborts and structured rejections are not.

use ledger_net::{NetError, RejectReason};
use ledger_notary::NotaryError;
use ledger_store::StoreError;
use ledger_types::{Hash256, LedgerError, PartyKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error("protocol violation from {peer}: {detail}")]
    Protocol { peer: PartyKey, detail: String },

    #[error("peer {peer} lacks data for hash {hash}")]
    HashNotFound { peer: PartyKey, hash: Hash256 },

    #[error("dependency graph exceeded the configured ceiling of {max} transactions")]
    GraphTooLarge { max: usize },

    #[error("counterparty {peer} rejected: {reason}")]
    Rejected { peer: PartyKey, reason: RejectReason },

    #[error("transaction must already carry the initiator's own signature")]
    MissingOwnSignature,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notary(#[from] NotaryError),
}

impl FlowError {
    /// Whether the whole flow may be retried by the caller
    pub fn is_transport(&self) -> bool {
        match self {
            FlowError::Net(e) => e.is_transport(),
            FlowError::Notary(NotaryError::Net(e)) => e.is_transport(),
            _ => false,
        }
    }
}
