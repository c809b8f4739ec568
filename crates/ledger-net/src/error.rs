//! Transport and protocol-shape errors
//!
//! Transport failures are retryable by callers; an unexpected message shape
//! is a protocol violation and never is.

use ledger_types::PartyKey;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum NetError {
    #[error("peer {0} is not reachable")]
    UnknownPeer(PartyKey),

    #[error("timed out waiting for {0}")]
    Timeout(PartyKey),

    #[error("connection to {0} closed")]
    Disconnected(PartyKey),

    #[error("protocol violation from {peer}: expected {expected}, got {got}")]
    UnexpectedMessage {
        peer: PartyKey,
        expected: &'static str,
        got: &'static str,
    },

    #[error("codec error from {peer}: {detail}")]
    Codec { peer: PartyKey, detail: String },
}

impl NetError {
    /// Whether a caller may retry the whole exchange
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NetError::UnknownPeer(_) | NetError::Timeout(_) | NetError::Disconnected(_)
        )
    }
}
