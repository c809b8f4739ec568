//! Node assembly and service loop
//!
//! A node is its flow context plus a background task that accepts inbound
//! sessions and dispatches them to the responder flows. Every node serves
//! fetch requests, so any peer can resolve history from it; countersigning,
//! notarisation and finality handling hang off the same dispatch.

use crate::collect::{collect_signatures, countersign, AcceptAny, TransactionAcceptor};
use crate::context::FlowContext;
use crate::error::FlowError;
use crate::finality::{finalize, receive_finality};
use crate::resolver::{resolve_transactions, ResolveConfig};
use crate::validating::ValidatingCheck;
use ledger_net::{
    FetchKind, IncomingSession, MemoryNetwork, NodeEndpoint, PeerSession, RejectReason,
    WireMessage,
};
use ledger_notary::{NonValidating, NotaryService, PreCommitCheck};
use ledger_store::{CommitStore, MemoryStore, TransactionStore};
use ledger_types::{
    AcceptAll, Hash256, PartyKey, PartyKeypair, SignedTransaction, TransactionBody,
    TransactionVerifier, TxId,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Which uniqueness-consensus variant a notary node runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotaryMode {
    NonValidating,
    Validating,
}

/// Assembles a node's collaborators; defaults accept everything and keep
/// everything in memory
pub struct NodeBuilder {
    keypair: PartyKeypair,
    store: Arc<dyn TransactionStore>,
    verifier: Arc<dyn TransactionVerifier>,
    acceptor: Arc<dyn TransactionAcceptor>,
    resolve: ResolveConfig,
    notary_validating: bool,
    notary: Option<(Arc<dyn CommitStore>, NotaryMode)>,
}

impl NodeBuilder {
    pub fn new(keypair: PartyKeypair) -> Self {
        Self {
            keypair,
            store: Arc::new(MemoryStore::new()),
            verifier: Arc::new(AcceptAll),
            acceptor: Arc::new(AcceptAny),
            resolve: ResolveConfig::default(),
            notary_validating: false,
            notary: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn TransactionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn TransactionVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn acceptor(mut self, acceptor: Arc<dyn TransactionAcceptor>) -> Self {
        self.acceptor = acceptor;
        self
    }

    pub fn resolve_config(mut self, resolve: ResolveConfig) -> Self {
        self.resolve = resolve;
        self
    }

    /// Shape of the payload this node sends when it submits to a notary
    pub fn notary_validating(mut self, validating: bool) -> Self {
        self.notary_validating = validating;
        self
    }

    /// Make this node a notary backed by the given commit store
    pub fn notary(mut self, commits: Arc<dyn CommitStore>, mode: NotaryMode) -> Self {
        self.notary = Some((commits, mode));
        self
    }

    /// Register on the network and start the service loop
    pub fn spawn(self, net: &Arc<MemoryNetwork>) -> NodeHandle {
        let key = self.keypair.public();
        let endpoint = net.register(key);
        let ctx = Arc::new(FlowContext {
            keypair: self.keypair.clone(),
            store: self.store,
            verifier: self.verifier,
            acceptor: self.acceptor,
            connector: Arc::new(endpoint.connector()),
            resolve: self.resolve,
            notary_validating: self.notary_validating,
        });

        let notary = self.notary.map(|(commits, mode)| {
            let check: Arc<dyn PreCommitCheck> = match mode {
                NotaryMode::NonValidating => Arc::new(NonValidating),
                NotaryMode::Validating => Arc::new(ValidatingCheck::new(ctx.clone())),
            };
            Arc::new(NotaryService::new(self.keypair, commits, check))
        });

        let task = tokio::spawn(service_loop(endpoint, ctx.clone(), notary));
        tracing::info!("Node {} started", key.short());
        NodeHandle { ctx, task }
    }
}

/// Running node: flow entry points plus the service-loop task
pub struct NodeHandle {
    ctx: Arc<FlowContext>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn key(&self) -> PartyKey {
        self.ctx.key()
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.ctx.store
    }

    /// Sign a freshly built body with this node's key
    pub fn sign(&self, body: TransactionBody) -> Result<SignedTransaction, FlowError> {
        Ok(SignedTransaction::unsigned(body).signed_by(&self.ctx.keypair)?)
    }

    pub async fn collect_signatures(
        &self,
        stx: SignedTransaction,
    ) -> Result<SignedTransaction, FlowError> {
        collect_signatures(stx, &self.ctx).await
    }

    pub async fn finalize(
        &self,
        stx: SignedTransaction,
    ) -> Result<SignedTransaction, FlowError> {
        finalize(stx, &self.ctx).await
    }

    /// Pull the given transactions and their full history from a peer
    pub async fn resolve_from(
        &self,
        peer: PartyKey,
        roots: Vec<TxId>,
    ) -> Result<Vec<TxId>, FlowError> {
        let mut session = self.ctx.connector.connect(peer)?;
        resolve_transactions(
            roots,
            session.as_mut(),
            self.ctx.store.as_ref(),
            self.ctx.verifier.as_ref(),
            &self.ctx.resolve,
        )
        .await
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn service_loop(
    mut endpoint: NodeEndpoint,
    ctx: Arc<FlowContext>,
    notary: Option<Arc<NotaryService>>,
) {
    while let Some(inc) = endpoint.accept().await {
        let ctx = ctx.clone();
        let notary = notary.clone();
        tokio::spawn(async move {
            let peer = inc.peer;
            if let Err(e) = handle_session(inc, ctx, notary).await {
                tracing::warn!("Session from {} failed: {e}", peer.short());
            }
        });
    }
}

/// Dispatch one inbound session by its opening message
async fn handle_session(
    mut inc: IncomingSession,
    ctx: Arc<FlowContext>,
    notary: Option<Arc<NotaryService>>,
) -> Result<(), FlowError> {
    let peer = inc.peer;
    let first = inc.session.receive().await?;

    match first {
        WireMessage::FetchRequest { kind, hashes } => {
            serve_fetch_session(&mut inc.session, kind, hashes, &ctx).await
        }
        WireMessage::SignatureRequest { transaction } => {
            countersign(&mut inc.session, transaction, &ctx).await
        }
        WireMessage::NotarySignRequest { payload } => match notary {
            Some(service) => {
                let reply = service.handle(peer, payload).await;
                inc.session.send(reply).await?;
                Ok(())
            }
            None => {
                inc.session
                    .send(WireMessage::Rejected {
                        reason: RejectReason::VerificationFailed {
                            detail: "node is not a notary".into(),
                        },
                    })
                    .await?;
                Err(FlowError::Protocol {
                    peer,
                    detail: "notarisation request to a non-notary node".into(),
                })
            }
        },
        WireMessage::BroadcastNotify { transaction } => {
            receive_finality(&mut inc.session, transaction, &ctx).await
        }
        other => Err(FlowError::Protocol {
            peer,
            detail: format!("unexpected opening message {}", other.name()),
        }),
    }
}

/// Serve fetch rounds on one session until the initiator goes away. The
/// resolver batches multiple rounds over a single session, so keep reading
/// after the first; a receive timeout is the normal end of the exchange.
async fn serve_fetch_session(
    session: &mut dyn PeerSession,
    kind: FetchKind,
    hashes: Vec<Hash256>,
    ctx: &Arc<FlowContext>,
) -> Result<(), FlowError> {
    let mut round = (kind, hashes);
    loop {
        let (kind, hashes) = round;
        let reply = serve_fetch(kind, &hashes, ctx);
        session.send(reply).await?;

        round = match session.receive().await {
            Ok(WireMessage::FetchRequest { kind, hashes }) => (kind, hashes),
            Ok(other) => {
                return Err(FlowError::Protocol {
                    peer: session.peer(),
                    detail: format!("expected FetchRequest, got {}", other.name()),
                })
            }
            // Initiator finished and dropped the session
            Err(e) if e.is_transport() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
    }
}

/// All-or-nothing lookup: any unknown hash rejects the whole round, the
/// caller cannot use a partial answer anyway
fn serve_fetch(kind: FetchKind, hashes: &[Hash256], ctx: &Arc<FlowContext>) -> WireMessage {
    let mut items = Vec::with_capacity(hashes.len());
    for hash in hashes {
        let item = match kind {
            FetchKind::Transactions => {
                ctx.store.get_transaction(hash).map(|stx| stx.to_bytes())
            }
            FetchKind::Attachments => ctx.store.get_attachment(hash),
        };
        match item {
            Some(bytes) => items.push(bytes),
            None => {
                return WireMessage::Rejected {
                    reason: RejectReason::UnknownHash { hash: *hash },
                }
            }
        }
    }
    WireMessage::FetchResponse { items }
}
