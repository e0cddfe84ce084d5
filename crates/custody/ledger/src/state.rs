//! Versioned key-value world state with optimistic commit validation.
//!
//! Every committed transaction advances the block height by one and stamps each
//! key it writes with that height. A commit is accepted only if every key in
//! its read set still carries the version observed when it was read.

use std::collections::BTreeMap;
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

use crate::events::{LedgerEvent, LedgerEventKind};
use crate::keys;

pub type Version = u64;

/// Key -> version observed at first read (`None` = absent).
pub type ReadSet = BTreeMap<String, Option<Version>>;

/// Key -> new value.
pub type WriteSet = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("read-set conflict on key {key}")]
    Conflict { key: String },

    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: Vec<u8>,
    pub version: Version,
}

/// Everything a transaction hands to the store at commit.
#[derive(Clone, Debug, Default)]
pub struct Commit {
    pub tx_id: String,
    pub timestamp: i64,
    pub read_set: ReadSet,
    pub write_set: WriteSet,
    pub events: Vec<LedgerEventKind>,
}

/// World state consumed by the verifier and the evidence contract.
pub trait StateStore: Send + Sync {
    fn get_state(&self, key: &str) -> Result<Option<VersionedValue>, StateError>;

    /// All entries whose key starts with `prefix`, in key order.
    fn range(&self, prefix: &str) -> Result<Vec<(String, VersionedValue)>, StateError>;

    /// Validate and apply atomically; returns the new block height.
    fn commit(&self, commit: Commit) -> Result<u64, StateError>;

    fn height(&self) -> Result<u64, StateError>;

    /// Committed event journal in commit order.
    fn events(&self) -> Result<Vec<LedgerEvent>, StateError>;
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, VersionedValue>,
    height: u64,
    journal: Vec<LedgerEvent>,
}

/// In-memory multi-version store.
#[derive(Default)]
pub struct InMemoryStateStore {
    inner: RwLock<Inner>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every key and value, for state comparisons.
    pub fn dump(&self) -> Result<BTreeMap<String, Vec<u8>>, StateError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StateError::Backend("world state lock poisoned".to_string()))?;
        Ok(guard
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }
}

impl StateStore for InMemoryStateStore {
    fn get_state(&self, key: &str) -> Result<Option<VersionedValue>, StateError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StateError::Backend("world state lock poisoned".to_string()))?;
        Ok(guard.entries.get(key).cloned())
    }

    fn range(&self, prefix: &str) -> Result<Vec<(String, VersionedValue)>, StateError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StateError::Backend("world state lock poisoned".to_string()))?;
        Ok(guard
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect())
    }

    fn commit(&self, commit: Commit) -> Result<u64, StateError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StateError::Backend("world state lock poisoned".to_string()))?;

        let stale: Vec<&String> = commit
            .read_set
            .iter()
            .filter(|(key, version)| guard.entries.get(*key).map(|e| e.version) != **version)
            .map(|(key, _)| key)
            .collect();
        // A stale nonce key takes precedence so replays report as replays.
        if let Some(key) = stale
            .iter()
            .find(|key| keys::is_nonce(key))
            .or_else(|| stale.first())
        {
            debug!(tx_id = %commit.tx_id, key = %key, "Commit rejected: stale read");
            return Err(StateError::Conflict {
                key: (*key).clone(),
            });
        }

        let block = guard.height + 1;
        for (key, value) in commit.write_set {
            guard.entries.insert(
                key,
                VersionedValue {
                    value,
                    version: block,
                },
            );
        }
        for (index, event) in commit.events.into_iter().enumerate() {
            let entry = LedgerEvent::new(
                commit.tx_id.clone(),
                block,
                index as u32,
                commit.timestamp,
                event,
            );
            guard.journal.push(entry);
        }
        guard.height = block;

        Ok(block)
    }

    fn height(&self) -> Result<u64, StateError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StateError::Backend("world state lock poisoned".to_string()))?;
        Ok(guard.height)
    }

    fn events(&self) -> Result<Vec<LedgerEvent>, StateError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StateError::Backend("world state lock poisoned".to_string()))?;
        Ok(guard.journal.clone())
    }
}
