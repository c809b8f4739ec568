//! Sled-backed transaction storage
//!
//! Persists recorded transactions and attachments across restarts. Values
//! are bincode-encoded; keys are the 32-byte content hashes.

use crate::error::StoreError;
use crate::transaction_store::TransactionStore;
use ledger_types::{AttachmentId, Hash256, SignedTransaction, TxId};
use std::path::Path;

/// Persistent transaction store
pub struct SledStore {
    db: sled::Db,
    transactions: sled::Tree,
    attachments: sled::Tree,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(&path)?;
        let transactions = db.open_tree("transactions")?;
        let attachments = db.open_tree("attachments")?;

        tracing::info!("Opened transaction store at {:?}", path.as_ref());

        Ok(Self {
            db,
            transactions,
            attachments,
        })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of recorded transactions
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl TransactionStore for SledStore {
    fn get_transaction(&self, id: &TxId) -> Option<SignedTransaction> {
        let bytes = self.transactions.get(id.as_bytes()).ok().flatten()?;
        bincode::deserialize(&bytes).ok()
    }

    fn record_transaction(&self, stx: &SignedTransaction) -> Result<(), StoreError> {
        let id = stx.id();
        let merged = match self.get_transaction(&id) {
            Some(mut existing) => {
                for sig in &stx.signatures {
                    if existing.signature_from(&sig.key).is_none() {
                        existing.signatures.push(sig.clone());
                    }
                }
                existing
            }
            None => stx.clone(),
        };
        let bytes = bincode::serialize(&merged)?;
        self.transactions.insert(id.as_bytes(), bytes)?;
        Ok(())
    }

    fn get_attachment(&self, id: &AttachmentId) -> Option<Vec<u8>> {
        self.attachments
            .get(id.as_bytes())
            .ok()
            .flatten()
            .map(|v| v.to_vec())
    }

    fn import_attachment(&self, blob: Vec<u8>) -> Result<AttachmentId, StoreError> {
        let id = Hash256::digest(&blob);
        self.attachments.insert(id.as_bytes(), blob)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::{Command, PartyKeypair, TransactionBody};
    use tempfile::tempdir;

    fn sample_tx() -> SignedTransaction {
        let kp = PartyKeypair::generate();
        let body = TransactionBody {
            inputs: Vec::new(),
            outputs: Vec::new(),
            commands: vec![Command {
                data: vec![7],
                signers: vec![kp.public()],
            }],
            notary: None,
            time_window: None,
            attachments: Vec::new(),
        };
        SignedTransaction::unsigned(body).signed_by(&kp).unwrap()
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let stx = sample_tx();
        let id = stx.id();

        {
            let store = SledStore::open(dir.path()).unwrap();
            store.record_transaction(&stx).unwrap();
            store.import_attachment(vec![9, 9, 9]).unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.get_transaction(&id).unwrap(), stx);
        assert_eq!(
            store.get_attachment(&Hash256::digest(&[9, 9, 9])).unwrap(),
            vec![9, 9, 9]
        );
    }

    #[test]
    fn record_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let stx = sample_tx();

        store.record_transaction(&stx).unwrap();
        store.record_transaction(&stx).unwrap();
        assert_eq!(store.transaction_count(), 1);
        assert_eq!(store.get_transaction(&stx.id()).unwrap(), stx);
    }
}
