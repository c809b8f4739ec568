//! Pre-commit check for a validating notary
//!
//! The validating variant refuses filtered submissions and re-runs the full
//! pipeline before committing: signature checks, dependency resolution
//! against the requester, contract verification.

use crate::context::FlowContext;
use crate::resolver::resolve_for_transaction;
use async_trait::async_trait;
use ledger_net::NotaryPayload;
use ledger_notary::{NotaryError, NotaryRequest, PreCommitCheck};
use ledger_types::LedgerError;
use std::sync::Arc;

/// Full re-verification before commit, using the notary node's own store,
/// verifier and connector
pub struct ValidatingCheck {
    ctx: Arc<FlowContext>,
}

impl ValidatingCheck {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PreCommitCheck for ValidatingCheck {
    async fn check(&self, req: &NotaryRequest) -> Result<(), NotaryError> {
        let stx = match &req.payload {
            NotaryPayload::Full(stx) => stx,
            NotaryPayload::Filtered(_) => {
                return Err(NotaryError::TransactionInvalid(
                    "validating notary requires the full transaction".into(),
                ));
            }
        };

        stx.verify_complete(true).map_err(|e| match e {
            LedgerError::MissingSignatures(keys) => {
                NotaryError::SignaturesMissing(format!("{keys:?}"))
            }
            other => NotaryError::SignaturesInvalid(other.to_string()),
        })?;

        // Missing history comes from whoever submitted the transaction
        let mut session = self.ctx.connector.connect(req.requester)?;
        resolve_for_transaction(
            stx,
            session.as_mut(),
            self.ctx.store.as_ref(),
            self.ctx.verifier.as_ref(),
            &self.ctx.resolve,
        )
        .await
        .map_err(|e| NotaryError::TransactionInvalid(e.to_string()))?;

        Ok(())
    }
}
