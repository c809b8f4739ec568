//! In-memory network
//!
//! Routes envelopes between registered nodes by party key. Sessions are
//! correlated by (initiator key, session id); independent exchanges share no
//! ordering guarantees, only a session's own round trip is correlated.

use crate::error::NetError;
use crate::session::{Connect, PeerSession};
use crate::wire::WireMessage;
use async_trait::async_trait;
use dashmap::DashMap;
use ledger_types::PartyKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const INBOX_CAPACITY: usize = 256;
const SESSION_CAPACITY: usize = 64;

#[derive(Debug)]
struct Envelope {
    from: PartyKey,
    session: u64,
    msg: WireMessage,
}

type SessionMap = Arc<DashMap<(PartyKey, u64), mpsc::Sender<WireMessage>>>;

/// Shared router for a set of in-process nodes
pub struct MemoryNetwork {
    nodes: DashMap<PartyKey, mpsc::Sender<Envelope>>,
    next_session: AtomicU64,
    timeout: Duration,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(5))
    }

    /// Network with a custom receive timeout, for tests exercising
    /// unreachable counterparties
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            nodes: DashMap::new(),
            next_session: AtomicU64::new(1),
            timeout,
        })
    }

    /// Register a node and hand back its endpoint
    pub fn register(self: &Arc<Self>, key: PartyKey) -> NodeEndpoint {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.nodes.insert(key, tx);
        tracing::debug!("Registered node {}", key.short());
        NodeEndpoint {
            key,
            net: self.clone(),
            inbox: rx,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Drop a node's inbox; in-flight sends to it fail as disconnected
    pub fn unregister(&self, key: &PartyKey) {
        self.nodes.remove(key);
    }

    async fn deliver(&self, to: PartyKey, env: Envelope) -> Result<(), NetError> {
        let sender = self
            .nodes
            .get(&to)
            .map(|e| e.value().clone())
            .ok_or(NetError::UnknownPeer(to))?;
        sender.send(env).await.map_err(|_| NetError::Disconnected(to))
    }
}

/// A node's side of the network: an inbox plus the demux table shared with
/// its connector and sessions
pub struct NodeEndpoint {
    key: PartyKey,
    net: Arc<MemoryNetwork>,
    inbox: mpsc::Receiver<Envelope>,
    sessions: SessionMap,
}

/// A session opened by a remote initiator
pub struct IncomingSession {
    pub peer: PartyKey,
    pub session: MemorySession,
}

impl NodeEndpoint {
    pub fn key(&self) -> PartyKey {
        self.key
    }

    /// Cloneable handle for opening initiator sessions
    pub fn connector(&self) -> Connector {
        Connector {
            key: self.key,
            net: self.net.clone(),
            sessions: self.sessions.clone(),
        }
    }

    /// Drive the inbox: route envelopes for known sessions, yield each new
    /// inbound session. Returns `None` when the network drops this node.
    pub async fn accept(&mut self) -> Option<IncomingSession> {
        loop {
            let env = self.inbox.recv().await?;
            let key = (env.from, env.session);

            let existing = self.sessions.get(&key).map(|e| e.value().clone());
            if let Some(sender) = existing {
                if sender.send(env.msg).await.is_err() {
                    // Session ended locally; drop the stale route
                    self.sessions.remove(&key);
                }
                continue;
            }

            let (tx, rx) = mpsc::channel(SESSION_CAPACITY);
            tx.try_send(env.msg).expect("fresh session channel has capacity");
            self.sessions.insert(key, tx);
            return Some(IncomingSession {
                peer: env.from,
                session: MemorySession {
                    local: self.key,
                    peer: env.from,
                    id: env.session,
                    net: self.net.clone(),
                    rx,
                    sessions: self.sessions.clone(),
                },
            });
        }
    }
}

/// Cloneable initiator-session factory for one node
#[derive(Clone)]
pub struct Connector {
    key: PartyKey,
    net: Arc<MemoryNetwork>,
    sessions: SessionMap,
}

impl Connect for Connector {
    fn local_key(&self) -> PartyKey {
        self.key
    }

    fn connect(&self, peer: PartyKey) -> Result<Box<dyn PeerSession>, NetError> {
        if !self.net.nodes.contains_key(&peer) {
            return Err(NetError::UnknownPeer(peer));
        }
        let id = self.net.next_session.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SESSION_CAPACITY);
        // Replies arrive addressed by (peer, id); the node's accept loop
        // routes them into this channel
        self.sessions.insert((peer, id), tx);
        Ok(Box::new(MemorySession {
            local: self.key,
            peer,
            id,
            net: self.net.clone(),
            rx,
            sessions: self.sessions.clone(),
        }))
    }
}

/// One correlated channel pair between two nodes
pub struct MemorySession {
    local: PartyKey,
    peer: PartyKey,
    id: u64,
    net: Arc<MemoryNetwork>,
    rx: mpsc::Receiver<WireMessage>,
    sessions: SessionMap,
}

#[async_trait]
impl PeerSession for MemorySession {
    fn peer(&self) -> PartyKey {
        self.peer
    }

    async fn send(&mut self, msg: WireMessage) -> Result<(), NetError> {
        self.net
            .deliver(
                self.peer,
                Envelope {
                    from: self.local,
                    session: self.id,
                    msg,
                },
            )
            .await
    }

    async fn receive(&mut self) -> Result<WireMessage, NetError> {
        match tokio::time::timeout(self.net.timeout, self.rx.recv()).await {
            Ok(Some(msg)) => Ok(msg),
            Ok(None) => Err(NetError::Disconnected(self.peer)),
            Err(_) => Err(NetError::Timeout(self.peer)),
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.sessions.remove(&(self.peer, self.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{FetchKind, WireMessage};
    use ledger_types::Hash256;

    fn key(seed: u8) -> PartyKey {
        PartyKey([seed; 32])
    }

    /// Drive an endpoint's demux so replies reach initiator sessions;
    /// inbound sessions are dropped
    fn drive(mut endpoint: NodeEndpoint) {
        tokio::spawn(async move { while endpoint.accept().await.is_some() {} });
    }

    #[tokio::test]
    async fn round_trip_between_two_nodes() {
        let net = MemoryNetwork::new();
        let a = net.register(key(1));
        let connector = a.connector();
        drive(a);
        let mut b = net.register(key(2));

        // Responder: answer each fetch round, echoing request size
        tokio::spawn(async move {
            while let Some(mut inc) = b.accept().await {
                let msg = inc.session.receive().await.unwrap();
                let n = match msg {
                    WireMessage::FetchRequest { hashes, .. } => hashes.len(),
                    other => panic!("unexpected {}", other.name()),
                };
                inc.session
                    .send(WireMessage::FetchResponse {
                        items: vec![Vec::new(); n],
                    })
                    .await
                    .unwrap();
            }
        });

        let mut session = connector.connect(key(2)).unwrap();
        let reply = session
            .send_and_receive(WireMessage::FetchRequest {
                kind: FetchKind::Transactions,
                hashes: vec![Hash256::digest(b"h1"), Hash256::digest(b"h2")],
            })
            .await
            .unwrap();
        let items = reply.expect_fetch_response(key(2)).unwrap().unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn sessions_do_not_cross() {
        let net = MemoryNetwork::new();
        let a = net.register(key(1));
        let connector = a.connector();
        drive(a);
        let mut b = net.register(key(2));

        tokio::spawn(async move {
            // Answer each session with its own request count, second first
            let mut s1 = b.accept().await.unwrap();
            let m1 = s1.session.receive().await.unwrap();
            let mut s2 = b.accept().await.unwrap();
            let m2 = s2.session.receive().await.unwrap();

            for (inc, msg) in [(&mut s2, m2), (&mut s1, m1)] {
                let n = match msg {
                    WireMessage::FetchRequest { hashes, .. } => hashes.len(),
                    other => panic!("unexpected {}", other.name()),
                };
                inc.session
                    .send(WireMessage::FetchResponse {
                        items: vec![Vec::new(); n],
                    })
                    .await
                    .unwrap();
            }
            while b.accept().await.is_some() {}
        });

        let mut s1 = connector.connect(key(2)).unwrap();
        let mut s2 = connector.connect(key(2)).unwrap();

        s1.send(WireMessage::FetchRequest {
            kind: FetchKind::Transactions,
            hashes: vec![Hash256::digest(b"a")],
        })
        .await
        .unwrap();
        s2.send(WireMessage::FetchRequest {
            kind: FetchKind::Transactions,
            hashes: vec![Hash256::digest(b"b"), Hash256::digest(b"c")],
        })
        .await
        .unwrap();

        // Replies land on the session that asked, regardless of reply order
        let r1 = s1.receive().await.unwrap();
        let r2 = s2.receive().await.unwrap();
        assert_eq!(
            r1.expect_fetch_response(key(2)).unwrap().unwrap().len(),
            1
        );
        assert_eq!(
            r2.expect_fetch_response(key(2)).unwrap().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn unknown_peer_is_a_transport_error() {
        let net = MemoryNetwork::new();
        let a = net.register(key(1));
        let err = a.connector().connect(key(9)).unwrap_err();
        assert!(matches!(err, NetError::UnknownPeer(_)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let net = MemoryNetwork::with_timeout(Duration::from_millis(50));
        let a = net.register(key(1));
        let connector = a.connector();
        drive(a);
        let _b = net.register(key(2)); // registered, never serves

        let mut session = connector.connect(key(2)).unwrap();
        let err = session
            .send_and_receive(WireMessage::FetchRequest {
                kind: FetchKind::Transactions,
                hashes: vec![Hash256::digest(b"x")],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Timeout(_)));
    }
}
