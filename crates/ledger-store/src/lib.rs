//! Storage collaborators for the finality protocol stack
//!
//! - `TransactionStore`: durable transactions and attachments, in-memory or
//!   sled-backed
//! - `CommitStore`: the append-only consumed-state map behind the notary;
//!   its atomic multi-key insert is the system's single linearization point

pub mod commit_store;
pub mod error;
pub mod persistent;
pub mod transaction_store;

pub use commit_store::{CommitOutcome, CommitStore, MemoryCommitStore, SledCommitStore};
pub use error::StoreError;
pub use persistent::SledStore;
pub use transaction_store::{MemoryStore, TransactionStore};
