//! Notary consensus service
//!
//! Decides, atomically per transaction, whether a set of input states is
//! still unconsumed; records them as consumed and signs, or returns signed
//! conflict evidence. Two pre-commit variants share one commit skeleton:
//! non-validating trusts the caller's filtered view, validating re-verifies
//! the full dependency graph before committing.

pub mod client;
pub mod error;
pub mod service;

pub use client::NotaryClient;
pub use error::NotaryError;
pub use service::{NonValidating, NotaryRequest, NotaryService, PreCommitCheck};
