//! Finality coordinator
//!
//! Notarise if a notary is named, record locally, then notify every other
//! participant. Recipients never trust the broadcast: they re-resolve the
//! history against the sender and re-verify before recording.

use crate::context::FlowContext;
use crate::error::FlowError;
use crate::resolver::resolve_for_transaction;
use ledger_net::{PeerSession, WireMessage};
use ledger_notary::NotaryClient;
use ledger_types::{PartyKey, SignedTransaction};

/// Drive a fully business-signed transaction to finality.
///
/// Re-running after a transport failure is safe: the notary commit is
/// idempotent for the same consuming transaction and recording merges
/// signatures instead of overwriting.
pub async fn finalize(
    stx: SignedTransaction,
    ctx: &FlowContext,
) -> Result<SignedTransaction, FlowError> {
    let id = stx.id();
    stx.verify_complete(true)?;

    let stx = match stx.body.notary {
        Some(notary) if stx.signature_from(&notary).is_none() => {
            let client = NotaryClient::new(notary, ctx.notary_validating);
            let signature = client
                .notarize(&stx, ctx.store.as_ref(), ctx.connector.as_ref())
                .await?;
            stx.with_signature(signature)?
        }
        _ => stx,
    };
    stx.verify_complete(false)?;

    ctx.store.record_transaction(&stx)?;
    tracing::info!("Recorded final transaction {}", id.short());

    broadcast(&stx, ctx).await;
    Ok(stx)
}

/// Notify every participant other than ourselves and the notary. Delivery
/// failures are logged and skipped; the ledger state is already final and
/// peers can resolve the transaction later on demand.
async fn broadcast(stx: &SignedTransaction, ctx: &FlowContext) {
    let me = ctx.key();
    let id = stx.id();

    let recipients: Vec<PartyKey> = stx
        .body
        .participants()
        .into_iter()
        .filter(|p| *p != me && Some(*p) != stx.body.notary)
        .collect();

    for peer in recipients {
        let result = async {
            let mut session = ctx.connector.connect(peer)?;
            session
                .send(WireMessage::BroadcastNotify {
                    transaction: stx.clone(),
                })
                .await
        }
        .await;
        match result {
            Ok(()) => tracing::debug!("Notified {} of {}", peer.short(), id.short()),
            Err(e) => tracing::warn!(
                "Could not notify {} of {}: {e}",
                peer.short(),
                id.short()
            ),
        }
    }
}

/// Responder side of the finality broadcast: verify the complete signature
/// set including the notary's, resolve the history against the sender, and
/// record.
pub async fn receive_finality(
    session: &mut dyn PeerSession,
    stx: SignedTransaction,
    ctx: &FlowContext,
) -> Result<(), FlowError> {
    let peer = session.peer();
    let id = stx.id();

    stx.verify_complete(false)?;

    let mut back = ctx.connector.connect(peer)?;
    resolve_for_transaction(
        &stx,
        back.as_mut(),
        ctx.store.as_ref(),
        ctx.verifier.as_ref(),
        &ctx.resolve,
    )
    .await?;

    ctx.store.record_transaction(&stx)?;
    tracing::info!("Recorded broadcast transaction {} from {}", id.short(), peer.short());
    Ok(())
}
