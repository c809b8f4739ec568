//! Notary client protocol

use crate::error::NotaryError;
use ledger_net::{Connect, NotaryPayload, RejectReason, WireMessage};
use ledger_store::TransactionStore;
use ledger_types::{
    FilteredTransaction, LedgerError, PartyKey, SignatureEntry, SignedTransaction,
};

/// Client side of the uniqueness-consensus protocol for one notary identity
#[derive(Clone, Copy, Debug)]
pub struct NotaryClient {
    pub notary: PartyKey,
    /// Whether the service re-verifies the full transaction; decides the
    /// payload shape sent
    pub validating: bool,
}

impl NotaryClient {
    pub fn new(notary: PartyKey, validating: bool) -> Self {
        Self { notary, validating }
    }

    /// Obtain the notary signature for a fully business-signed transaction,
    /// or surface verified conflict evidence
    pub async fn notarize(
        &self,
        stx: &SignedTransaction,
        store: &dyn TransactionStore,
        connector: &dyn Connect,
    ) -> Result<SignatureEntry, NotaryError> {
        let id = stx.id();

        if stx.body.notary != Some(self.notary) {
            return Err(NotaryError::WrongNotary);
        }

        // Mixed-notary transactions are invalid; catching them locally
        // avoids a pointless round trip
        for input in &stx.body.inputs {
            let input_tx = store.get_transaction(&input.txid).ok_or_else(|| {
                NotaryError::TransactionInvalid(format!(
                    "unknown input transaction {}",
                    input.txid.short()
                ))
            })?;
            if input_tx.body.notary != Some(self.notary) {
                return Err(NotaryError::MixedNotary {
                    expected: self.notary.short(),
                    got: input_tx
                        .body
                        .notary
                        .map(|k| k.short())
                        .unwrap_or_else(|| "none".into()),
                });
            }
        }

        // The notary never substitutes for a missing business signature
        stx.verify_complete(true).map_err(|e| match e {
            LedgerError::MissingSignatures(keys) => {
                NotaryError::SignaturesMissing(format!("{keys:?}"))
            }
            other => NotaryError::SignaturesInvalid(other.to_string()),
        })?;

        let payload = if self.validating {
            NotaryPayload::Full(stx.clone())
        } else {
            NotaryPayload::Filtered(FilteredTransaction::from_transaction(stx))
        };

        let mut session = connector.connect(self.notary)?;
        tracing::debug!("Submitting {} to notary {}", id.short(), self.notary.short());
        let reply = session
            .send_and_receive(WireMessage::NotarySignRequest { payload })
            .await?;

        match reply {
            WireMessage::NotarySignResponse { signature } => {
                if signature.key != self.notary {
                    return Err(NotaryError::WrongKey);
                }
                signature
                    .verify(id.as_bytes())
                    .map_err(|e| NotaryError::SignaturesInvalid(e.to_string()))?;
                tracing::info!("Notarised {}", id.short());
                Ok(signature)
            }
            WireMessage::NotaryConflict { evidence } => {
                // Verify the evidence rather than trust a bare claim
                evidence
                    .verify(&self.notary)
                    .map_err(|e| NotaryError::BadEvidence(e.to_string()))?;
                tracing::info!(
                    "Notary conflict for {}: {} contested inputs",
                    id.short(),
                    evidence.conflicts.len()
                );
                Err(NotaryError::Conflict(evidence))
            }
            WireMessage::Rejected { reason } => Err(match reason {
                RejectReason::TimeWindowInvalid { detail } => {
                    NotaryError::TimeWindowInvalid(detail)
                }
                RejectReason::MissingSignatures { detail } => {
                    NotaryError::SignaturesMissing(detail)
                }
                RejectReason::SignaturesInvalid { detail } => {
                    NotaryError::SignaturesInvalid(detail)
                }
                other => NotaryError::TransactionInvalid(other.to_string()),
            }),
            other => Err(NotaryError::Net(ledger_net::NetError::UnexpectedMessage {
                peer: self.notary,
                expected: "NotarySignResponse",
                got: other.name(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ledger_net::{NetError, PeerSession};
    use ledger_store::MemoryStore;
    use ledger_types::{Command, OutputState, PartyKeypair, StateRef, TransactionBody};

    /// Connector that fails the test if any round trip is attempted
    struct NoNetwork(PartyKey);

    impl Connect for NoNetwork {
        fn local_key(&self) -> PartyKey {
            self.0
        }
        fn connect(&self, _peer: PartyKey) -> Result<Box<dyn PeerSession>, NetError> {
            panic!("local check should have fired before any round trip");
        }
    }

    /// Connector whose sessions answer every request with one fixed reply
    struct Canned(WireMessage);

    impl Connect for Canned {
        fn local_key(&self) -> PartyKey {
            PartyKey([1u8; 32])
        }
        fn connect(&self, peer: PartyKey) -> Result<Box<dyn PeerSession>, NetError> {
            Ok(Box::new(CannedSession {
                peer,
                reply: Some(self.0.clone()),
            }))
        }
    }

    struct CannedSession {
        peer: PartyKey,
        reply: Option<WireMessage>,
    }

    #[async_trait]
    impl PeerSession for CannedSession {
        fn peer(&self) -> PartyKey {
            self.peer
        }
        async fn send(&mut self, _msg: WireMessage) -> Result<(), NetError> {
            Ok(())
        }
        async fn receive(&mut self) -> Result<WireMessage, NetError> {
            self.reply.take().ok_or(NetError::Disconnected(self.peer))
        }
    }

    fn body(
        inputs: Vec<StateRef>,
        signer: PartyKey,
        notary: Option<PartyKey>,
    ) -> TransactionBody {
        TransactionBody {
            inputs,
            outputs: vec![OutputState {
                data: vec![1],
                participants: vec![signer],
            }],
            commands: vec![Command {
                data: Vec::new(),
                signers: vec![signer],
            }],
            notary,
            time_window: None,
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn mixed_notary_rejected_locally() {
        let signer = PartyKeypair::generate();
        let notary_a = PartyKey([0xaa; 32]);
        let notary_b = PartyKey([0xbb; 32]);
        let store = MemoryStore::new();

        // Parent recorded under notary B
        let parent = SignedTransaction::unsigned(body(Vec::new(), signer.public(), Some(notary_b)))
            .signed_by(&signer)
            .unwrap();
        store.record_transaction(&parent).unwrap();

        let child = SignedTransaction::unsigned(body(
            vec![StateRef {
                txid: parent.id(),
                index: 0,
            }],
            signer.public(),
            Some(notary_a),
        ))
        .signed_by(&signer)
        .unwrap();

        let client = NotaryClient::new(notary_a, false);
        let err = client
            .notarize(&child, &store, &NoNetwork(signer.public()))
            .await
            .unwrap_err();
        assert!(matches!(err, NotaryError::MixedNotary { .. }));
    }

    #[tokio::test]
    async fn signature_by_unexpected_key_is_refused() {
        let signer = PartyKeypair::generate();
        let notary = PartyKeypair::generate();
        let imposter = PartyKeypair::generate();
        let store = MemoryStore::new();

        let stx = SignedTransaction::unsigned(body(
            Vec::new(),
            signer.public(),
            Some(notary.public()),
        ))
        .signed_by(&signer)
        .unwrap();

        // Valid signature over the right id, wrong key
        let reply = WireMessage::NotarySignResponse {
            signature: imposter.sign_id(&stx.id()),
        };
        let client = NotaryClient::new(notary.public(), false);
        let err = client
            .notarize(&stx, &store, &Canned(reply))
            .await
            .unwrap_err();
        assert!(matches!(err, NotaryError::WrongKey));
    }

    #[tokio::test]
    async fn unverifiable_conflict_evidence_is_refused() {
        let signer = PartyKeypair::generate();
        let notary = PartyKeypair::generate();
        let imposter = PartyKeypair::generate();
        let store = MemoryStore::new();

        let stx = SignedTransaction::unsigned(body(
            Vec::new(),
            signer.public(),
            Some(notary.public()),
        ))
        .signed_by(&signer)
        .unwrap();

        // Evidence signed by someone other than the expected notary
        let evidence = ledger_types::SignedConflicts::sign(
            &imposter,
            vec![ledger_types::Conflict {
                state_ref: StateRef {
                    txid: stx.id(),
                    index: 0,
                },
                consumed_by: stx.id(),
            }],
        );
        let client = NotaryClient::new(notary.public(), false);
        let err = client
            .notarize(&stx, &store, &Canned(WireMessage::NotaryConflict { evidence }))
            .await
            .unwrap_err();
        assert!(matches!(err, NotaryError::BadEvidence(_)));
    }

    #[tokio::test]
    async fn missing_business_signature_rejected_locally() {
        let signer = PartyKeypair::generate();
        let notary = PartyKey([0xaa; 32]);
        let store = MemoryStore::new();

        let stx =
            SignedTransaction::unsigned(body(Vec::new(), signer.public(), Some(notary)));

        let client = NotaryClient::new(notary, false);
        let err = client
            .notarize(&stx, &store, &NoNetwork(signer.public()))
            .await
            .unwrap_err();
        assert!(matches!(err, NotaryError::SignaturesMissing(_)));
    }
}
