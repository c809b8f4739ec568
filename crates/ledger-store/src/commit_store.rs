//! Consumed-state commit storage
//!
//! The notary's append-only map of state reference to consuming transaction
//! id. `commit` is the single linearization point of the whole system: it
//! must be all-or-nothing per transaction, idempotent per (reference,
//! consuming id) pair, and must not serialize submissions whose input sets
//! are disjoint.

use crate::error::StoreError;
use dashmap::DashMap;
use ledger_types::{Conflict, PartyKey, StateRef, TxId};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Result of an atomic commit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every input is now recorded as consumed by the submitted id
    Committed,
    /// At least one input is owned by a different id; nothing was written
    Conflicts(Vec<Conflict>),
}

/// The commit interface the notary serves its decisions from
pub trait CommitStore: Send + Sync {
    fn commit(
        &self,
        inputs: &[StateRef],
        consuming: TxId,
        requester: PartyKey,
    ) -> Result<CommitOutcome, StoreError>;
}

const STRIPES: usize = 64;

fn stripe_of(state_ref: &StateRef) -> usize {
    let mut hasher = DefaultHasher::new();
    state_ref.hash(&mut hasher);
    (hasher.finish() as usize) % STRIPES
}

/// In-memory commit store with lock striping
///
/// A commit locks the stripes covering its input references in sorted order,
/// so overlapping submissions serialize on a shared stripe while disjoint
/// submissions proceed in parallel. Granularity is per stripe, not per
/// reference: disjoint sets whose references hash to the same stripe
/// serialize for the duration of one commit.
pub struct MemoryCommitStore {
    consumed: DashMap<StateRef, (TxId, PartyKey)>,
    stripes: Vec<Mutex<()>>,
}

impl Default for MemoryCommitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCommitStore {
    pub fn new() -> Self {
        Self {
            consumed: DashMap::new(),
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Who consumed a reference, if anyone
    pub fn owner_of(&self, state_ref: &StateRef) -> Option<TxId> {
        self.consumed.get(state_ref).map(|e| e.0)
    }

    pub fn consumed_count(&self) -> usize {
        self.consumed.len()
    }
}

impl CommitStore for MemoryCommitStore {
    fn commit(
        &self,
        inputs: &[StateRef],
        consuming: TxId,
        requester: PartyKey,
    ) -> Result<CommitOutcome, StoreError> {
        let mut stripe_idx: Vec<usize> = inputs.iter().map(stripe_of).collect();
        stripe_idx.sort_unstable();
        stripe_idx.dedup();
        // Sorted acquisition keeps overlapping commits deadlock-free
        let _guards: Vec<_> = stripe_idx.iter().map(|i| self.stripes[*i].lock()).collect();

        let mut conflicts: Vec<Conflict> = inputs
            .iter()
            .filter_map(|r| {
                let owner = self.consumed.get(r)?.0;
                (owner != consuming).then_some(Conflict {
                    state_ref: *r,
                    consumed_by: owner,
                })
            })
            .collect();

        if !conflicts.is_empty() {
            conflicts.sort();
            conflicts.dedup();
            return Ok(CommitOutcome::Conflicts(conflicts));
        }

        for r in inputs {
            self.consumed.insert(*r, (consuming, requester));
        }
        Ok(CommitOutcome::Committed)
    }
}

/// Sled-backed commit store; the multi-key check-then-insert runs inside one
/// serializable sled transaction, so a decision survives restart
pub struct SledCommitStore {
    db: sled::Db,
    consumed: sled::Tree,
}

impl SledCommitStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(&path)?;
        let consumed = db.open_tree("consumed")?;

        tracing::info!("Opened commit store at {:?}", path.as_ref());

        Ok(Self { db, consumed })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn key_of(state_ref: &StateRef) -> Vec<u8> {
        borsh::to_vec(state_ref).expect("state ref serialization should not fail")
    }
}

impl CommitStore for SledCommitStore {
    fn commit(
        &self,
        inputs: &[StateRef],
        consuming: TxId,
        requester: PartyKey,
    ) -> Result<CommitOutcome, StoreError> {
        use sled::transaction::ConflictableTransactionError;

        let result = self.consumed.transaction(|tree| {
            let mut conflicts: Vec<Conflict> = Vec::new();
            for r in inputs {
                if let Some(bytes) = tree.get(Self::key_of(r))? {
                    let (owner, _requester): (TxId, PartyKey) = bincode::deserialize(&bytes)
                        .map_err(|e| {
                            ConflictableTransactionError::Abort(StoreError::Codec(e.to_string()))
                        })?;
                    if owner != consuming {
                        conflicts.push(Conflict {
                            state_ref: *r,
                            consumed_by: owner,
                        });
                    }
                }
            }
            if !conflicts.is_empty() {
                conflicts.sort();
                conflicts.dedup();
                return Ok(CommitOutcome::Conflicts(conflicts));
            }
            for r in inputs {
                let value = bincode::serialize(&(consuming, requester)).map_err(|e| {
                    ConflictableTransactionError::Abort(StoreError::Codec(e.to_string()))
                })?;
                tree.insert(Self::key_of(r), value)?;
            }
            Ok(CommitOutcome::Committed)
        });

        match result {
            Ok(outcome) => Ok(outcome),
            Err(sled::transaction::TransactionError::Abort(e)) => Err(e),
            Err(sled::transaction::TransactionError::Storage(e)) => Err(StoreError::Db(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::Hash256;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn state_ref(seed: u8, index: u32) -> StateRef {
        StateRef {
            txid: Hash256::digest(&[seed]),
            index,
        }
    }

    fn txid(seed: u8) -> TxId {
        Hash256::digest(&[0xf0, seed])
    }

    fn requester() -> PartyKey {
        PartyKey([7u8; 32])
    }

    #[test]
    fn commit_then_idempotent_retry() {
        let store = MemoryCommitStore::new();
        let inputs = [state_ref(1, 0), state_ref(1, 1)];

        let first = store.commit(&inputs, txid(1), requester()).unwrap();
        assert_eq!(first, CommitOutcome::Committed);

        // Same id again: success, never a self-conflict
        let retry = store.commit(&inputs, txid(1), requester()).unwrap();
        assert_eq!(retry, CommitOutcome::Committed);
        assert_eq!(store.consumed_count(), 2);
    }

    #[test]
    fn conflicting_commit_names_owner_and_writes_nothing() {
        let store = MemoryCommitStore::new();
        let shared = state_ref(1, 0);
        let fresh = state_ref(2, 0);

        store.commit(&[shared], txid(1), requester()).unwrap();
        let outcome = store.commit(&[shared, fresh], txid(2), requester()).unwrap();

        match outcome {
            CommitOutcome::Conflicts(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].state_ref, shared);
                assert_eq!(conflicts[0].consumed_by, txid(1));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        // All-or-nothing: the fresh reference stayed unconsumed
        assert!(store.owner_of(&fresh).is_none());
    }

    #[test]
    fn disjoint_commits_in_parallel() {
        let store = Arc::new(MemoryCommitStore::new());
        let mut handles = Vec::new();

        for t in 0..8u8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50u32 {
                    let inputs = [state_ref(t, i * 2), state_ref(t, i * 2 + 1)];
                    let outcome = store.commit(&inputs, txid(t), requester()).unwrap();
                    assert_eq!(outcome, CommitOutcome::Committed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.consumed_count(), 8 * 100);
    }

    #[test]
    fn racing_commits_on_shared_input_pick_one_winner() {
        let store = Arc::new(MemoryCommitStore::new());
        let shared = state_ref(9, 0);

        let mut handles = Vec::new();
        for t in 0..4u8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.commit(&[shared], txid(t), requester()).unwrap()
            }));
        }

        let outcomes: Vec<CommitOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = outcomes
            .iter()
            .filter(|o| **o == CommitOutcome::Committed)
            .count();
        assert_eq!(winners, 1);

        let owner = store.owner_of(&shared).unwrap();
        for outcome in outcomes {
            if let CommitOutcome::Conflicts(conflicts) = outcome {
                assert_eq!(conflicts[0].consumed_by, owner);
            }
        }
    }

    #[test]
    fn sled_commit_survives_reopen() {
        let dir = tempdir().unwrap();
        let shared = state_ref(1, 0);

        {
            let store = SledCommitStore::open(dir.path()).unwrap();
            assert_eq!(
                store.commit(&[shared], txid(1), requester()).unwrap(),
                CommitOutcome::Committed
            );
            store.flush().unwrap();
        }

        let store = SledCommitStore::open(dir.path()).unwrap();
        let outcome = store.commit(&[shared], txid(2), requester()).unwrap();
        match outcome {
            CommitOutcome::Conflicts(conflicts) => {
                assert_eq!(conflicts[0].consumed_by, txid(1));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }
}
