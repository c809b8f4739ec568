//! Transaction bodies, signed transactions and notarisation evidence

use crate::crypto::{AttachmentId, Hash256, PartyKey, PartyKeypair, SignatureEntry, TxId};
use crate::error::LedgerError;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Reference to one output of one transaction, consumable at most once
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct StateRef {
    pub txid: TxId,
    pub index: u32,
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid.short(), self.index)
    }
}

/// One produced state: opaque contract payload plus the parties that track it
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct OutputState {
    pub data: Vec<u8>,
    pub participants: Vec<PartyKey>,
}

/// A command names the keys whose signatures it demands
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Command {
    pub data: Vec<u8>,
    pub signers: Vec<PartyKey>,
}

/// Validity window in unix millis; either bound may be open
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct TimeWindow {
    pub not_before: Option<u64>,
    pub not_after: Option<u64>,
}

impl TimeWindow {
    /// Whether `now` falls inside the window, widened by `tolerance_ms` of
    /// allowed clock skew on each bound
    pub fn contains(&self, now: u64, tolerance_ms: u64) -> bool {
        if let Some(nb) = self.not_before {
            if now + tolerance_ms < nb {
                return false;
            }
        }
        if let Some(na) = self.not_after {
            if now > na + tolerance_ms {
                return false;
            }
        }
        true
    }
}

/// Immutable transaction body; the id is blake3 over its canonical bytes
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct TransactionBody {
    pub inputs: Vec<StateRef>,
    pub outputs: Vec<OutputState>,
    pub commands: Vec<Command>,
    pub notary: Option<PartyKey>,
    pub time_window: Option<TimeWindow>,
    pub attachments: Vec<AttachmentId>,
}

impl TransactionBody {
    /// Content-derived id
    pub fn id(&self) -> TxId {
        let bytes = borsh::to_vec(self).expect("transaction body serialization should not fail");
        Hash256::digest(&bytes)
    }

    /// Union of all command signer keys plus the notary key when present
    pub fn required_signers(&self) -> BTreeSet<PartyKey> {
        let mut keys: BTreeSet<PartyKey> = self
            .commands
            .iter()
            .flat_map(|c| c.signers.iter().copied())
            .collect();
        if let Some(notary) = self.notary {
            keys.insert(notary);
        }
        keys
    }

    /// Parties that must learn of this transaction: output participants plus
    /// every command signer
    pub fn participants(&self) -> BTreeSet<PartyKey> {
        let mut keys: BTreeSet<PartyKey> = self
            .outputs
            .iter()
            .flat_map(|o| o.participants.iter().copied())
            .collect();
        keys.extend(self.commands.iter().flat_map(|c| c.signers.iter().copied()));
        keys
    }
}

/// A transaction body plus an accumulating, possibly incomplete signature set
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct SignedTransaction {
    pub body: TransactionBody,
    pub signatures: Vec<SignatureEntry>,
}

impl SignedTransaction {
    /// Wrap a body with no signatures yet
    pub fn unsigned(body: TransactionBody) -> Self {
        Self {
            body,
            signatures: Vec::new(),
        }
    }

    pub fn id(&self) -> TxId {
        self.body.id()
    }

    /// The signature carried for `key`, if any
    pub fn signature_from(&self, key: &PartyKey) -> Option<&SignatureEntry> {
        self.signatures.iter().find(|s| s.key == *key)
    }

    /// Required signers without a carried signature
    pub fn missing_signers(&self) -> BTreeSet<PartyKey> {
        let mut missing = self.body.required_signers();
        for sig in &self.signatures {
            missing.remove(&sig.key);
        }
        missing
    }

    /// Required non-notary signers without a carried signature
    pub fn missing_business_signers(&self) -> BTreeSet<PartyKey> {
        let mut missing = self.missing_signers();
        if let Some(notary) = self.body.notary {
            missing.remove(&notary);
        }
        missing
    }

    /// Cryptographically check every carried signature against the id
    pub fn verify_signatures(&self) -> Result<(), LedgerError> {
        let id = self.id();
        for sig in &self.signatures {
            sig.verify(id.as_bytes())?;
        }
        Ok(())
    }

    /// Check that all required signatures are present and valid, optionally
    /// still allowing the notary signature to be absent
    pub fn verify_complete(&self, allow_missing_notary: bool) -> Result<(), LedgerError> {
        self.verify_signatures()?;
        let missing = if allow_missing_notary {
            self.missing_business_signers()
        } else {
            self.missing_signers()
        };
        if !missing.is_empty() {
            return Err(LedgerError::MissingSignatures(
                missing.iter().map(|k| k.short()).collect(),
            ));
        }
        Ok(())
    }

    /// Monotonic merge of one signature; a second signature for the same key
    /// must be byte-identical
    pub fn with_signature(mut self, sig: SignatureEntry) -> Result<Self, LedgerError> {
        match self.signature_from(&sig.key) {
            Some(existing) if *existing == sig => {}
            Some(_) => return Err(LedgerError::ConflictingSignature(sig.key.short())),
            None => self.signatures.push(sig),
        }
        Ok(self)
    }

    /// Monotonic merge of many signatures
    pub fn with_signatures(
        mut self,
        sigs: impl IntoIterator<Item = SignatureEntry>,
    ) -> Result<Self, LedgerError> {
        for sig in sigs {
            self = self.with_signature(sig)?;
        }
        Ok(self)
    }

    /// Sign with the given keypair and merge
    pub fn signed_by(self, keypair: &PartyKeypair) -> Result<Self, LedgerError> {
        let sig = keypair.sign_id(&self.id());
        self.with_signature(sig)
    }

    /// Serialize for network transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("transaction serialization should not fail")
    }

    /// Deserialize from network
    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// The non-validating notary's view: just enough to decide uniqueness,
/// revealing neither outputs, commands nor signatures
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct FilteredTransaction {
    pub id: TxId,
    pub inputs: Vec<StateRef>,
    pub notary: Option<PartyKey>,
    pub time_window: Option<TimeWindow>,
}

impl FilteredTransaction {
    /// Project the notarisation-relevant fields out of a full transaction
    pub fn from_transaction(stx: &SignedTransaction) -> Self {
        Self {
            id: stx.id(),
            inputs: stx.body.inputs.clone(),
            notary: stx.body.notary,
            time_window: stx.body.time_window,
        }
    }
}

/// One state reference and the transaction id that already owns it
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshSerialize, BorshDeserialize,
    Serialize, Deserialize,
)]
pub struct Conflict {
    pub state_ref: StateRef,
    pub consumed_by: TxId,
}

/// Notary-signed conflict evidence, verifiable without trusting the bearer
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct SignedConflicts {
    pub conflicts: Vec<Conflict>,
    pub signature: SignatureEntry,
}

impl SignedConflicts {
    fn canonical_bytes(conflicts: &[Conflict]) -> Vec<u8> {
        let mut sorted = conflicts.to_vec();
        sorted.sort();
        borsh::to_vec(&sorted).expect("conflict serialization should not fail")
    }

    /// Sign sorted conflict evidence with the notary keypair
    pub fn sign(keypair: &PartyKeypair, mut conflicts: Vec<Conflict>) -> Self {
        conflicts.sort();
        let bytes = Self::canonical_bytes(&conflicts);
        Self {
            conflicts,
            signature: SignatureEntry {
                key: keypair.public(),
                sig: keypair.sign(&bytes),
            },
        }
    }

    /// Verify the evidence was signed by the expected notary
    pub fn verify(&self, notary: &PartyKey) -> Result<(), LedgerError> {
        if self.signature.key != *notary {
            return Err(LedgerError::SignatureInvalid {
                key: self.signature.key.short(),
                detail: format!("evidence not signed by notary {}", notary.short()),
            });
        }
        self.signature.verify(&Self::canonical_bytes(&self.conflicts))
    }
}
