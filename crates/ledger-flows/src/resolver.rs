//! Dependency resolver
//!
//! Walks a transaction's causal history breadth-first against one peer,
//! one batched fetch round per frontier, bounded by a configurable ceiling
//! on distinct discovered hashes. The downloaded set is then verified and
//! persisted in dependency order, so a mid-batch failure leaves a
//! consistent prefix behind rather than a corrupted store.

use crate::error::FlowError;
use ledger_net::{FetchKind, PeerSession, RejectReason, WireMessage};
use ledger_store::TransactionStore;
use ledger_types::{
    Hash256, LedgerError, ResolvedTransaction, SignedTransaction, TransactionVerifier, TxId,
};
use std::collections::{HashMap, HashSet};

/// Default ceiling on distinct transactions discovered per resolution run
pub const DEFAULT_MAX_RESOLVE_TRANSACTIONS: usize = 5_000;

/// Resolver limits
#[derive(Clone, Copy, Debug)]
pub struct ResolveConfig {
    /// Abort with a resource-exhaustion error once more distinct hashes
    /// than this have been discovered; guards against a peer forcing
    /// unbounded graph depth
    pub max_transactions: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            max_transactions: DEFAULT_MAX_RESOLVE_TRANSACTIONS,
        }
    }
}

/// Fetch every transitively referenced transaction missing from the local
/// store, verify in dependency order, persist. Returns the newly recorded
/// ids, dependencies first.
pub async fn resolve_transactions(
    roots: Vec<TxId>,
    session: &mut dyn PeerSession,
    store: &dyn TransactionStore,
    verifier: &dyn TransactionVerifier,
    config: &ResolveConfig,
) -> Result<Vec<TxId>, FlowError> {
    let peer = session.peer();
    let downloaded = download_graph(roots, session, store, config).await?;
    if downloaded.is_empty() {
        return Ok(Vec::new());
    }

    let order = dependency_order(&downloaded);
    for id in &order {
        let stx = &downloaded[id];
        // Dependencies are finalized history; their signature sets must be
        // complete, notary included
        stx.verify_complete(false)?;
        fetch_missing_attachments(stx, session, store).await?;
        let rtx = build_resolved(stx, store)?;
        verifier.verify(&rtx)?;
        store.record_transaction(stx)?;
    }

    tracing::info!(
        "Resolved {} transactions from {}",
        order.len(),
        peer.short()
    );
    Ok(order)
}

/// Resolve everything a specific transaction depends on, fetch its own
/// missing attachments, and verify it without persisting it; the
/// transaction itself may still be partially signed.
pub async fn resolve_for_transaction(
    stx: &SignedTransaction,
    session: &mut dyn PeerSession,
    store: &dyn TransactionStore,
    verifier: &dyn TransactionVerifier,
    config: &ResolveConfig,
) -> Result<ResolvedTransaction, FlowError> {
    let roots = stx.body.inputs.iter().map(|r| r.txid).collect();
    resolve_transactions(roots, session, store, verifier, config).await?;
    fetch_missing_attachments(stx, session, store).await?;
    verify_local(stx, store, verifier)
}

/// Full verification against the local store only; every dependency must
/// already be recorded
pub fn verify_local(
    stx: &SignedTransaction,
    store: &dyn TransactionStore,
    verifier: &dyn TransactionVerifier,
) -> Result<ResolvedTransaction, FlowError> {
    let rtx = build_resolved(stx, store)?;
    verifier.verify(&rtx)?;
    Ok(rtx)
}

/// Load a transaction's input states from the store, in body order
fn build_resolved(
    stx: &SignedTransaction,
    store: &dyn TransactionStore,
) -> Result<ResolvedTransaction, FlowError> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::with_capacity(stx.body.inputs.len());
    for input in &stx.body.inputs {
        if !seen.insert(*input) {
            return Err(LedgerError::DuplicateInput(input.to_string()).into());
        }
        let parent = store
            .get_transaction(&input.txid)
            .ok_or_else(|| LedgerError::UnknownInput(input.txid.short()))?;
        let output = parent
            .body
            .outputs
            .get(input.index as usize)
            .ok_or_else(|| LedgerError::BadInputIndex {
                txid: input.txid.short(),
                index: input.index,
            })?;
        inputs.push(output.clone());
    }
    Ok(ResolvedTransaction {
        tx: stx.clone(),
        inputs,
    })
}

/// Breadth-first download of the unknown part of the dependency graph.
/// Each hash is requested exactly once across all rounds.
async fn download_graph(
    roots: Vec<TxId>,
    session: &mut dyn PeerSession,
    store: &dyn TransactionStore,
    config: &ResolveConfig,
) -> Result<HashMap<TxId, SignedTransaction>, FlowError> {
    let peer = session.peer();
    let mut downloaded: HashMap<TxId, SignedTransaction> = HashMap::new();
    let mut seen: HashSet<TxId> = HashSet::new();
    let mut frontier: Vec<TxId> = Vec::new();

    for root in roots {
        if store.get_transaction(&root).is_some() || !seen.insert(root) {
            continue;
        }
        if seen.len() > config.max_transactions {
            return Err(FlowError::GraphTooLarge {
                max: config.max_transactions,
            });
        }
        frontier.push(root);
    }

    while !frontier.is_empty() {
        let items = fetch_batch(session, FetchKind::Transactions, &frontier).await?;
        let mut next = Vec::new();

        for (hash, bytes) in frontier.iter().zip(items) {
            let stx = SignedTransaction::from_bytes(&bytes).map_err(|e| FlowError::Protocol {
                peer,
                detail: format!("undecodable transaction for {}: {e}", hash.short()),
            })?;
            if stx.id() != *hash {
                return Err(FlowError::Protocol {
                    peer,
                    detail: format!(
                        "downloaded transaction hashes to {}, requested {}",
                        stx.id().short(),
                        hash.short()
                    ),
                });
            }

            for input in &stx.body.inputs {
                let dep = input.txid;
                if downloaded.contains_key(&dep)
                    || store.get_transaction(&dep).is_some()
                    || !seen.insert(dep)
                {
                    continue;
                }
                if seen.len() > config.max_transactions {
                    return Err(FlowError::GraphTooLarge {
                        max: config.max_transactions,
                    });
                }
                next.push(dep);
            }
            downloaded.insert(*hash, stx);
        }

        frontier = next;
    }

    Ok(downloaded)
}

/// One batched fetch round; response size must match the request
async fn fetch_batch(
    session: &mut dyn PeerSession,
    kind: FetchKind,
    hashes: &[Hash256],
) -> Result<Vec<Vec<u8>>, FlowError> {
    let peer = session.peer();
    let reply = session
        .send_and_receive(WireMessage::FetchRequest {
            kind,
            hashes: hashes.to_vec(),
        })
        .await?;

    let items = match reply.expect_fetch_response(peer)? {
        Ok(items) => items,
        Err(RejectReason::UnknownHash { hash }) => {
            return Err(FlowError::HashNotFound { peer, hash })
        }
        Err(reason) => return Err(FlowError::Rejected { peer, reason }),
    };

    if items.len() != hashes.len() {
        return Err(FlowError::Protocol {
            peer,
            detail: format!(
                "fetch returned {} items for {} requested hashes",
                items.len(),
                hashes.len()
            ),
        });
    }
    Ok(items)
}

/// Fetch and import any attachment the body references that the local
/// store lacks, hash-checking each blob against the id it answers
async fn fetch_missing_attachments(
    stx: &SignedTransaction,
    session: &mut dyn PeerSession,
    store: &dyn TransactionStore,
) -> Result<(), FlowError> {
    let peer = session.peer();
    let missing: Vec<Hash256> = stx
        .body
        .attachments
        .iter()
        .filter(|id| store.get_attachment(id).is_none())
        .copied()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let items = fetch_batch(session, FetchKind::Attachments, &missing).await?;
    for (hash, blob) in missing.iter().zip(items) {
        if Hash256::digest(&blob) != *hash {
            return Err(FlowError::Protocol {
                peer,
                detail: format!("attachment does not hash to requested {}", hash.short()),
            });
        }
        store.import_attachment(blob)?;
    }
    Ok(())
}

/// Reverse-postorder over the consumed-by graph restricted to the
/// downloaded set: every transaction's inputs precede it
fn dependency_order(downloaded: &HashMap<TxId, SignedTransaction>) -> Vec<TxId> {
    let mut order = Vec::with_capacity(downloaded.len());
    let mut visited: HashSet<TxId> = HashSet::new();

    let mut roots: Vec<TxId> = downloaded.keys().copied().collect();
    roots.sort();

    for root in roots {
        if visited.contains(&root) {
            continue;
        }
        // Iterative postorder; the marker entry emits after its parents
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for input in &downloaded[&id].body.inputs {
                let parent = input.txid;
                if downloaded.contains_key(&parent) && !visited.contains(&parent) {
                    stack.push((parent, false));
                }
            }
        }
    }
    order
}
