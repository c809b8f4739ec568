//! Signature collection and countersigning
//!
//! The initiator gathers every missing non-notary signature; each
//! counterparty independently resolves, verifies and consults its
//! acceptance predicate before committing a signature to anything.

use crate::context::FlowContext;
use crate::error::FlowError;
use crate::resolver::{resolve_for_transaction, verify_local};
use async_trait::async_trait;
use ledger_net::{PeerSession, RejectReason, WireMessage};
use ledger_types::{ResolvedTransaction, SignatureEntry, SignedTransaction};

/// Application-specific acceptance predicate consulted before a node signs
/// a transaction proposed by someone else
#[async_trait]
pub trait TransactionAcceptor: Send + Sync {
    /// Err carries the human-readable reason travelling back to the
    /// initiator as a structured rejection
    async fn accept(&self, rtx: &ResolvedTransaction) -> Result<(), String>;
}

/// Acceptor that signs anything that verified; for tests and embedding
pub struct AcceptAny;

#[async_trait]
impl TransactionAcceptor for AcceptAny {
    async fn accept(&self, _rtx: &ResolvedTransaction) -> Result<(), String> {
        Ok(())
    }
}

/// Initiator side: obtain every required signature except the notary's.
///
/// Returns the transaction with the full non-notary signature set. When no
/// signer is outstanding this returns without any network activity; the
/// short-circuit is required behaviour, self-transactions must not force a
/// round trip.
pub async fn collect_signatures(
    stx: SignedTransaction,
    ctx: &FlowContext,
) -> Result<SignedTransaction, FlowError> {
    let me = ctx.key();
    let id = stx.id();

    // Absence of our own signature is a usage error, not a network condition
    if stx.signature_from(&me).is_none() {
        return Err(FlowError::MissingOwnSignature);
    }

    stx.verify_signatures()?;
    verify_local(&stx, ctx.store.as_ref(), ctx.verifier.as_ref())?;

    let outstanding = stx.missing_business_signers();
    if outstanding.is_empty() {
        tracing::debug!("No outstanding signers for {}", id.short());
        return Ok(stx);
    }

    let mut collected: Vec<SignatureEntry> = Vec::with_capacity(outstanding.len());
    for signer in outstanding {
        let mut session = ctx.connector.connect(signer)?;
        tracing::debug!(
            "Requesting signature on {} from {}",
            id.short(),
            signer.short()
        );
        let reply = session
            .send_and_receive(WireMessage::SignatureRequest {
                transaction: stx.clone(),
            })
            .await?;

        match reply.expect_signature_response(signer)? {
            Ok(signature) => {
                // Reject a signature by the wrong key or over the wrong id
                if signature.key != signer {
                    return Err(FlowError::Protocol {
                        peer: signer,
                        detail: format!(
                            "countersignature by {}, expected {}",
                            signature.key.short(),
                            signer.short()
                        ),
                    });
                }
                signature
                    .verify(id.as_bytes())
                    .map_err(|e| FlowError::Protocol {
                        peer: signer,
                        detail: format!("invalid countersignature: {e}"),
                    })?;
                collected.push(signature);
            }
            Err(reason) => {
                tracing::info!(
                    "Signer {} rejected {}: {}",
                    signer.short(),
                    id.short(),
                    reason
                );
                return Err(FlowError::Rejected {
                    peer: signer,
                    reason,
                });
            }
        }
    }

    let stx = stx.with_signatures(collected)?;
    stx.verify_complete(true)?;
    tracing::info!(
        "Collected full signature set for {} ({} signatures)",
        id.short(),
        stx.signatures.len()
    );
    Ok(stx)
}

/// Responder side: verify a proposed transaction end to end, consult the
/// acceptance predicate, and return a signature over its id.
///
/// A refusal is a handled outcome, not a failure: the structured rejection
/// is sent and `Ok` is returned.
pub async fn countersign(
    session: &mut dyn PeerSession,
    stx: SignedTransaction,
    ctx: &FlowContext,
) -> Result<(), FlowError> {
    let peer = session.peer();
    let id = stx.id();
    let me = ctx.key();

    // Refuse to spend effort or a signing key on transactions that do not
    // involve this party
    if !stx.missing_business_signers().contains(&me) && stx.signature_from(&me).is_none() {
        return reject(session, id, RejectReason::NotInvolved).await;
    }

    if let Err(e) = stx.verify_signatures() {
        return reject(
            session,
            id,
            RejectReason::SignaturesInvalid {
                detail: e.to_string(),
            },
        )
        .await;
    }

    // Resolve the proposal's history against the initiator
    let mut back = ctx.connector.connect(peer)?;
    let rtx = match resolve_for_transaction(
        &stx,
        back.as_mut(),
        ctx.store.as_ref(),
        ctx.verifier.as_ref(),
        &ctx.resolve,
    )
    .await
    {
        Ok(rtx) => rtx,
        Err(e) => {
            return reject(
                session,
                id,
                RejectReason::VerificationFailed {
                    detail: e.to_string(),
                },
            )
            .await;
        }
    };

    if let Err(detail) = ctx.acceptor.accept(&rtx).await {
        return reject(session, id, RejectReason::Declined { detail }).await;
    }

    let signature = ctx.keypair.sign_id(&id);
    session
        .send(WireMessage::SignatureResponse { signature })
        .await?;
    tracing::info!("Countersigned {} for {}", id.short(), peer.short());
    Ok(())
}

async fn reject(
    session: &mut dyn PeerSession,
    id: ledger_types::TxId,
    reason: RejectReason,
) -> Result<(), FlowError> {
    tracing::info!("Refusing to countersign {}: {}", id.short(), reason);
    session.send(WireMessage::Rejected { reason }).await?;
    Ok(())
}
