use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::events::LedgerEventKind;
use crate::state::{Commit, ReadSet, StateStore, WriteSet};

/// Identity and time supplied by the execution substrate for one invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    pub tx_id: String,
    /// Authenticated identity of the submitting client.
    pub submitter: String,
    /// Authenticated identities of the organisations that endorsed the transaction.
    #[serde(default)]
    pub endorsers: Vec<String>,
    pub timestamp: i64,
}

impl TxContext {
    pub fn new(submitter: impl Into<String>, timestamp: i64) -> Self {
        Self {
            tx_id: Uuid::new_v4().to_string(),
            submitter: submitter.into(),
            endorsers: Vec::new(),
            timestamp,
        }
    }

    pub fn with_endorsers<I, S>(mut self, endorsers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endorsers = endorsers.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of a committed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: String,
    pub block: u64,
    pub writes: usize,
    pub events: usize,
}

/// Buffered execution of one invocation against the world state.
///
/// Reads record the version they observed, writes and events stay local until
/// the ledger commits the transaction. Reads see the transaction's own writes.
pub struct Transaction<'a> {
    store: &'a dyn StateStore,
    ctx: TxContext,
    reads: ReadSet,
    writes: WriteSet,
    events: Vec<LedgerEventKind>,
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a dyn StateStore, ctx: TxContext) -> Self {
        Self {
            store,
            ctx,
            reads: ReadSet::new(),
            writes: WriteSet::new(),
            events: Vec::new(),
        }
    }

    pub fn context(&self) -> &TxContext {
        &self.ctx
    }

    pub fn get_raw(&mut self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.clone()));
        }
        let entry = self.store.get_state(key)?;
        self.reads
            .entry(key.to_string())
            .or_insert_with(|| entry.as_ref().map(|e| e.version));
        Ok(entry.map(|e| e.value))
    }

    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> LedgerResult<Option<T>> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&mut self, key: &str) -> LedgerResult<bool> {
        Ok(self.get_raw(key)?.is_some())
    }

    /// Values under `prefix`, merged with this transaction's own writes.
    pub fn scan<T: DeserializeOwned>(&mut self, prefix: &str) -> LedgerResult<Vec<T>> {
        let mut merged = std::collections::BTreeMap::new();
        for (key, entry) in self.store.range(prefix)? {
            self.reads.entry(key.clone()).or_insert(Some(entry.version));
            merged.insert(key, entry.value);
        }
        for (key, value) in self.writes.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.clone(), value.clone());
        }
        merged
            .values()
            .map(|bytes| serde_json::from_slice(bytes).map_err(Into::into))
            .collect()
    }

    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> LedgerResult<()> {
        self.writes.insert(key.into(), serde_json::to_vec(value)?);
        Ok(())
    }

    pub fn emit(&mut self, event: LedgerEventKind) {
        self.events.push(event);
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty() && self.events.is_empty()
    }

    pub fn into_commit(self) -> Commit {
        Commit {
            tx_id: self.ctx.tx_id,
            timestamp: self.ctx.timestamp,
            read_set: self.reads,
            write_set: self.writes,
            events: self.events,
        }
    }
}
