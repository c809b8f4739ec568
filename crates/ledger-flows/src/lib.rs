//! Protocol flows for transaction finality
//!
//! - Dependency resolver: batched, bounded fetch-and-verify of a
//!   transaction's causal history
//! - Signature collector / countersigner: gathering the missing non-notary
//!   signatures
//! - Finality coordinator: notarise, record, broadcast; recipients
//!   re-resolve before trusting anything
//! - Node service loop dispatching inbound sessions to responder flows

pub mod collect;
pub mod context;
pub mod error;
pub mod finality;
pub mod node;
pub mod resolver;
pub mod validating;

#[cfg(test)]
mod tests;

pub use collect::{collect_signatures, countersign, AcceptAny, TransactionAcceptor};
pub use context::FlowContext;
pub use error::FlowError;
pub use finality::{finalize, receive_finality};
pub use node::{NodeBuilder, NodeHandle, NotaryMode};
pub use resolver::{
    resolve_for_transaction, resolve_transactions, verify_local, ResolveConfig,
    DEFAULT_MAX_RESOLVE_TRANSACTIONS,
};
pub use validating::ValidatingCheck;
