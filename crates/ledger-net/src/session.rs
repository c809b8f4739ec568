//! Session and connection abstractions flows are written against

use crate::error::NetError;
use crate::wire::WireMessage;
use async_trait::async_trait;
use ledger_types::PartyKey;

/// One correlated exchange with a single counterparty.
///
/// `receive` and `send_and_receive` are the only suspension points a flow
/// may block on; both fail with a transport error instead of hanging when
/// the counterparty goes away.
#[async_trait]
pub trait PeerSession: Send {
    /// The counterparty this session talks to
    fn peer(&self) -> PartyKey;

    async fn send(&mut self, msg: WireMessage) -> Result<(), NetError>;

    async fn receive(&mut self) -> Result<WireMessage, NetError>;

    async fn send_and_receive(&mut self, msg: WireMessage) -> Result<WireMessage, NetError> {
        self.send(msg).await?;
        self.receive().await
    }
}

impl std::fmt::Debug for dyn PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer", &self.peer())
            .finish()
    }
}

/// Opens initiator sessions by party key. The identity-to-address directory
/// is external; implementations route however they can reach the key.
pub trait Connect: Send + Sync {
    fn local_key(&self) -> PartyKey;

    fn connect(&self, peer: PartyKey) -> Result<Box<dyn PeerSession>, NetError>;
}
