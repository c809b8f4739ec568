//! Shared collaborators every flow on a node runs against

use crate::collect::TransactionAcceptor;
use crate::resolver::ResolveConfig;
use ledger_net::Connect;
use ledger_store::TransactionStore;
use ledger_types::{PartyKey, PartyKeypair, TransactionVerifier};
use std::sync::Arc;

/// One node's identity, storage and collaborator seams
pub struct FlowContext {
    pub keypair: PartyKeypair,
    pub store: Arc<dyn TransactionStore>,
    pub verifier: Arc<dyn TransactionVerifier>,
    pub acceptor: Arc<dyn TransactionAcceptor>,
    pub connector: Arc<dyn Connect>,
    pub resolve: ResolveConfig,
    /// Whether the notary named by outgoing transactions re-validates;
    /// decides the payload shape the client sends
    pub notary_validating: bool,
}

impl FlowContext {
    pub fn key(&self) -> PartyKey {
        self.keypair.public()
    }
}
