//! Tagged wire messages
//!
//! Every payload is an enum variant; a receiver expecting one shape treats
//! any other as a protocol violation, never a value to coerce.

use crate::error::NetError;
use borsh::{BorshDeserialize, BorshSerialize};
use ledger_types::{
    FilteredTransaction, Hash256, PartyKey, SignatureEntry, SignedConflicts, SignedTransaction,
};
use serde::{Deserialize, Serialize};

/// What a fetch round is asking for
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum FetchKind {
    Transactions,
    Attachments,
}

/// Payload of a notarisation request: the full transaction for a validating
/// notary, a filtered view for a non-validating one
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum NotaryPayload {
    Full(SignedTransaction),
    Filtered(FilteredTransaction),
}

impl NotaryPayload {
    pub fn id(&self) -> Hash256 {
        match self {
            NotaryPayload::Full(stx) => stx.id(),
            NotaryPayload::Filtered(ftx) => ftx.id,
        }
    }
}

/// Structured business rejection, distinguishable from transport failure
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum RejectReason {
    /// The peer lacks data for a requested hash
    UnknownHash { hash: Hash256 },
    /// The countersigner is not in the required-signer set
    NotInvolved,
    /// A carried or returned signature failed cryptographic checks
    SignaturesInvalid { detail: String },
    /// The required signature set is incomplete
    MissingSignatures { detail: String },
    /// Full verification failed
    VerificationFailed { detail: String },
    /// The acceptance predicate declined the transaction
    Declined { detail: String },
    /// The validity window fails against the notary clock
    TimeWindowInvalid { detail: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnknownHash { hash } => write!(f, "unknown hash {}", hash.short()),
            RejectReason::NotInvolved => write!(f, "party is not a required signer"),
            RejectReason::SignaturesInvalid { detail } => write!(f, "invalid signatures: {detail}"),
            RejectReason::MissingSignatures { detail } => {
                write!(f, "missing signatures: {detail}")
            }
            RejectReason::VerificationFailed { detail } => {
                write!(f, "verification failed: {detail}")
            }
            RejectReason::Declined { detail } => write!(f, "declined: {detail}"),
            RejectReason::TimeWindowInvalid { detail } => {
                write!(f, "time window invalid: {detail}")
            }
        }
    }
}

/// Message types exchanged between peer flows
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum WireMessage {
    /// One batched round of the dependency resolver
    FetchRequest {
        kind: FetchKind,
        hashes: Vec<Hash256>,
    },
    /// Items answering a fetch round, in request order
    FetchResponse { items: Vec<Vec<u8>> },

    /// Initiator asking a counterparty to countersign
    SignatureRequest { transaction: SignedTransaction },
    /// The countersigner's signature over the transaction id
    SignatureResponse { signature: SignatureEntry },

    /// Submission to the notary consensus service
    NotarySignRequest { payload: NotaryPayload },
    /// Notary signature over the transaction id
    NotarySignResponse { signature: SignatureEntry },
    /// Notary-signed double-spend evidence
    NotaryConflict { evidence: SignedConflicts },

    /// Finality broadcast of a fully signed transaction
    BroadcastNotify { transaction: SignedTransaction },

    /// Structured business rejection
    Rejected { reason: RejectReason },
}

impl WireMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("wire message serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }

    /// Variant name for logs and shape errors
    pub fn name(&self) -> &'static str {
        match self {
            WireMessage::FetchRequest { .. } => "FetchRequest",
            WireMessage::FetchResponse { .. } => "FetchResponse",
            WireMessage::SignatureRequest { .. } => "SignatureRequest",
            WireMessage::SignatureResponse { .. } => "SignatureResponse",
            WireMessage::NotarySignRequest { .. } => "NotarySignRequest",
            WireMessage::NotarySignResponse { .. } => "NotarySignResponse",
            WireMessage::NotaryConflict { .. } => "NotaryConflict",
            WireMessage::BroadcastNotify { .. } => "BroadcastNotify",
            WireMessage::Rejected { .. } => "Rejected",
        }
    }

    /// Expect a fetch response; a `Rejected` passes through for the caller
    /// to map, anything else is a shape violation
    pub fn expect_fetch_response(
        self,
        peer: PartyKey,
    ) -> Result<Result<Vec<Vec<u8>>, RejectReason>, NetError> {
        match self {
            WireMessage::FetchResponse { items } => Ok(Ok(items)),
            WireMessage::Rejected { reason } => Ok(Err(reason)),
            other => Err(NetError::UnexpectedMessage {
                peer,
                expected: "FetchResponse",
                got: other.name(),
            }),
        }
    }

    /// Expect a countersignature or a structured rejection
    pub fn expect_signature_response(
        self,
        peer: PartyKey,
    ) -> Result<Result<SignatureEntry, RejectReason>, NetError> {
        match self {
            WireMessage::SignatureResponse { signature } => Ok(Ok(signature)),
            WireMessage::Rejected { reason } => Ok(Err(reason)),
            other => Err(NetError::UnexpectedMessage {
                peer,
                expected: "SignatureResponse",
                got: other.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_shape_checks() {
        let peer = PartyKey([1u8; 32]);
        let msg = WireMessage::FetchRequest {
            kind: FetchKind::Transactions,
            hashes: vec![Hash256::digest(b"x")],
        };
        let decoded = WireMessage::from_bytes(&msg.to_bytes()).unwrap();
        assert_eq!(decoded, msg);

        // Wrong shape is a protocol violation, not a coercion
        let err = decoded.expect_fetch_response(peer).unwrap_err();
        assert!(matches!(err, NetError::UnexpectedMessage { .. }));
        assert!(!err.is_transport());
    }

    #[test]
    fn rejection_passes_through_expect() {
        let peer = PartyKey([1u8; 32]);
        let msg = WireMessage::Rejected {
            reason: RejectReason::NotInvolved,
        };
        let inner = msg.expect_signature_response(peer).unwrap();
        assert_eq!(inner.unwrap_err(), RejectReason::NotInvolved);
    }
}
