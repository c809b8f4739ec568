//! Peer messaging for the finality protocol stack
//!
//! - Tagged wire messages (borsh) with strict shape checks
//! - `PeerSession`: the send / receive / send-and-receive suspension points
//!   every flow is written against
//! - An in-memory network with correlated sessions, transport timeouts and
//!   routing by party key

pub mod error;
pub mod memory;
pub mod session;
pub mod wire;

pub use error::NetError;
pub use memory::{Connector, IncomingSession, MemoryNetwork, MemorySession, NodeEndpoint};
pub use session::{Connect, PeerSession};
pub use wire::{FetchKind, NotaryPayload, RejectReason, WireMessage};
