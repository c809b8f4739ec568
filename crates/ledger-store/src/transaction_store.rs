//! Transaction and attachment storage

use crate::error::StoreError;
use dashmap::DashMap;
use ledger_types::{AttachmentId, Hash256, SignedTransaction, TxId};

/// Durable transaction and attachment storage consumed by the protocol flows
pub trait TransactionStore: Send + Sync {
    /// Fetch a recorded transaction by id
    fn get_transaction(&self, id: &TxId) -> Option<SignedTransaction>;

    /// Record a verified transaction; idempotent by id, signatures merge
    /// monotonically
    fn record_transaction(&self, stx: &SignedTransaction) -> Result<(), StoreError>;

    /// Fetch an attachment blob by content hash
    fn get_attachment(&self, id: &AttachmentId) -> Option<Vec<u8>>;

    /// Import an attachment blob, returning its content hash
    fn import_attachment(&self, blob: Vec<u8>) -> Result<AttachmentId, StoreError>;
}

/// Merge newly seen signatures into an already recorded transaction.
/// Existing entries win; only signatures for absent keys are added.
fn merge_signatures(existing: &mut SignedTransaction, incoming: &SignedTransaction) {
    for sig in &incoming.signatures {
        if existing.signature_from(&sig.key).is_none() {
            existing.signatures.push(sig.clone());
        }
    }
}

/// In-memory store backed by dashmap
#[derive(Default)]
pub struct MemoryStore {
    transactions: DashMap<TxId, SignedTransaction>,
    attachments: DashMap<AttachmentId, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl TransactionStore for MemoryStore {
    fn get_transaction(&self, id: &TxId) -> Option<SignedTransaction> {
        self.transactions.get(id).map(|e| e.clone())
    }

    fn record_transaction(&self, stx: &SignedTransaction) -> Result<(), StoreError> {
        self.transactions
            .entry(stx.id())
            .and_modify(|existing| merge_signatures(existing, stx))
            .or_insert_with(|| stx.clone());
        Ok(())
    }

    fn get_attachment(&self, id: &AttachmentId) -> Option<Vec<u8>> {
        self.attachments.get(id).map(|e| e.clone())
    }

    fn import_attachment(&self, blob: Vec<u8>) -> Result<AttachmentId, StoreError> {
        let id = Hash256::digest(&blob);
        self.attachments.entry(id).or_insert(blob);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::{Command, PartyKeypair, TransactionBody};

    fn sample_tx(seed: u8) -> SignedTransaction {
        let kp = PartyKeypair::generate();
        let body = TransactionBody {
            inputs: Vec::new(),
            outputs: Vec::new(),
            commands: vec![Command {
                data: vec![seed],
                signers: vec![kp.public()],
            }],
            notary: None,
            time_window: None,
            attachments: Vec::new(),
        };
        SignedTransaction::unsigned(body).signed_by(&kp).unwrap()
    }

    #[test]
    fn record_and_get() {
        let store = MemoryStore::new();
        let stx = sample_tx(1);
        store.record_transaction(&stx).unwrap();
        assert_eq!(store.get_transaction(&stx.id()).unwrap(), stx);
        assert!(store.get_transaction(&sample_tx(2).id()).is_none());
    }

    #[test]
    fn record_merges_signatures() {
        let store = MemoryStore::new();
        let stx = sample_tx(1);

        let bare = SignedTransaction::unsigned(stx.body.clone());
        store.record_transaction(&bare).unwrap();
        store.record_transaction(&stx).unwrap();

        let loaded = store.get_transaction(&stx.id()).unwrap();
        assert_eq!(loaded.signatures.len(), 1);
    }

    #[test]
    fn attachment_id_is_content_hash() {
        let store = MemoryStore::new();
        let id = store.import_attachment(vec![1, 2, 3]).unwrap();
        assert_eq!(id, Hash256::digest(&[1, 2, 3]));
        assert_eq!(store.get_attachment(&id).unwrap(), vec![1, 2, 3]);
    }
}
