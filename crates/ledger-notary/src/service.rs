//! Notary server: one commit skeleton, pluggable pre-commit check

use crate::error::NotaryError;
use async_trait::async_trait;
use ledger_net::{NotaryPayload, RejectReason, WireMessage};
use ledger_store::{CommitOutcome, CommitStore};
use ledger_types::{
    now_millis, PartyKey, PartyKeypair, SignedConflicts, StateRef, TimeWindow, TxId,
};
use std::sync::Arc;

/// Default allowance for clock skew between caller and notary
pub const DEFAULT_SKEW_TOLERANCE_MS: u64 = 30_000;

/// The notarisation-relevant view of a submission, identical for both
/// payload shapes
#[derive(Debug, Clone)]
pub struct NotaryRequest {
    pub requester: PartyKey,
    pub id: TxId,
    pub inputs: Vec<StateRef>,
    pub notary: Option<PartyKey>,
    pub time_window: Option<TimeWindow>,
    pub payload: NotaryPayload,
}

impl NotaryRequest {
    fn from_payload(requester: PartyKey, payload: NotaryPayload) -> Self {
        match &payload {
            NotaryPayload::Full(stx) => Self {
                requester,
                id: stx.id(),
                inputs: stx.body.inputs.clone(),
                notary: stx.body.notary,
                time_window: stx.body.time_window,
                payload,
            },
            NotaryPayload::Filtered(ftx) => Self {
                requester,
                id: ftx.id,
                inputs: ftx.inputs.clone(),
                notary: ftx.notary,
                time_window: ftx.time_window,
                payload,
            },
        }
    }
}

/// Variant-specific pre-commit verification
#[async_trait]
pub trait PreCommitCheck: Send + Sync {
    async fn check(&self, req: &NotaryRequest) -> Result<(), NotaryError>;
}

/// Trusts the caller's claimed inputs and timestamp. The filtered view keeps
/// the business content of the dependency graph away from the notary; the
/// authenticated requester identity keeps a later dispute traceable.
pub struct NonValidating;

#[async_trait]
impl PreCommitCheck for NonValidating {
    async fn check(&self, _req: &NotaryRequest) -> Result<(), NotaryError> {
        Ok(())
    }
}

/// Uniqueness-consensus server for one notary identity
pub struct NotaryService {
    keypair: PartyKeypair,
    commits: Arc<dyn CommitStore>,
    check: Arc<dyn PreCommitCheck>,
    skew_tolerance_ms: u64,
}

impl NotaryService {
    pub fn new(
        keypair: PartyKeypair,
        commits: Arc<dyn CommitStore>,
        check: Arc<dyn PreCommitCheck>,
    ) -> Self {
        Self {
            keypair,
            commits,
            check,
            skew_tolerance_ms: DEFAULT_SKEW_TOLERANCE_MS,
        }
    }

    pub fn with_skew_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.skew_tolerance_ms = tolerance_ms;
        self
    }

    pub fn key(&self) -> PartyKey {
        self.keypair.public()
    }

    /// Decide one submission: time window, pre-commit check, atomic commit,
    /// then a signature or signed conflict evidence
    pub async fn handle(&self, requester: PartyKey, payload: NotaryPayload) -> WireMessage {
        let req = NotaryRequest::from_payload(requester, payload);
        let id = req.id;

        if req.notary != Some(self.keypair.public()) {
            tracing::warn!(
                "Submission {} from {} does not name this notary",
                id.short(),
                requester.short()
            );
            return reject(RejectReason::VerificationFailed {
                detail: "transaction does not name this notary".into(),
            });
        }

        if let Some(window) = req.time_window {
            let now = now_millis();
            if !window.contains(now, self.skew_tolerance_ms) {
                tracing::info!(
                    "Rejected {} from {}: outside validity window",
                    id.short(),
                    requester.short()
                );
                return reject(RejectReason::TimeWindowInvalid {
                    detail: format!("now={now} outside window {window:?}"),
                });
            }
        }

        if let Err(e) = self.check.check(&req).await {
            tracing::info!(
                "Pre-commit check rejected {} from {}: {}",
                id.short(),
                requester.short(),
                e
            );
            return reject(reason_of(e));
        }

        match self.commits.commit(&req.inputs, id, requester) {
            Ok(CommitOutcome::Committed) => {
                tracing::info!(
                    "Notarised {} for {} ({} inputs)",
                    id.short(),
                    requester.short(),
                    req.inputs.len()
                );
                WireMessage::NotarySignResponse {
                    signature: self.keypair.sign_id(&id),
                }
            }
            Ok(CommitOutcome::Conflicts(conflicts)) => {
                tracing::info!(
                    "Conflict for {} from {}: {} contested inputs",
                    id.short(),
                    requester.short(),
                    conflicts.len()
                );
                WireMessage::NotaryConflict {
                    evidence: SignedConflicts::sign(&self.keypair, conflicts),
                }
            }
            Err(e) => {
                tracing::error!("Commit store failure for {}: {}", id.short(), e);
                reject(RejectReason::VerificationFailed {
                    detail: "internal commit failure".into(),
                })
            }
        }
    }
}

fn reject(reason: RejectReason) -> WireMessage {
    WireMessage::Rejected { reason }
}

/// Map a pre-commit failure onto the structured rejection the caller sees
fn reason_of(e: NotaryError) -> RejectReason {
    match e {
        NotaryError::TimeWindowInvalid(detail) => RejectReason::TimeWindowInvalid { detail },
        NotaryError::SignaturesMissing(detail) => RejectReason::MissingSignatures { detail },
        NotaryError::SignaturesInvalid(detail) => RejectReason::SignaturesInvalid { detail },
        other => RejectReason::VerificationFailed {
            detail: other.to_string(),
        },
    }
}
