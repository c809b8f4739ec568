//! The opaque contract-verification seam
//!
//! Contract execution is external to this stack. Protocol code hands a
//! transaction with its resolved input states to an injected verifier and
//! treats the result as authoritative.

use crate::error::LedgerError;
use crate::transaction::{OutputState, SignedTransaction};

/// A transaction with its input states resolved from the local store, in
/// the order the body names them
#[derive(Clone, Debug)]
pub struct ResolvedTransaction {
    pub tx: SignedTransaction,
    pub inputs: Vec<OutputState>,
}

/// Application-specific contract verification
pub trait TransactionVerifier: Send + Sync {
    fn verify(&self, rtx: &ResolvedTransaction) -> Result<(), LedgerError>;
}

/// Verifier that accepts everything; for tests and embedding
pub struct AcceptAll;

impl TransactionVerifier for AcceptAll {
    fn verify(&self, _rtx: &ResolvedTransaction) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Closure adapter for ad-hoc verifiers
pub struct FnVerifier<F>(pub F);

impl<F> TransactionVerifier for FnVerifier<F>
where
    F: Fn(&ResolvedTransaction) -> Result<(), LedgerError> + Send + Sync,
{
    fn verify(&self, rtx: &ResolvedTransaction) -> Result<(), LedgerError> {
        (self.0)(rtx)
    }
}
