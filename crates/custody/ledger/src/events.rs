use serde::{Deserialize, Serialize};

/// Domain events emitted by committed transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEventKind {
    LedgerInitialized {
        code_identity: String,
        governance_members: usize,
    },
    EvidenceCreated {
        evidence_id: String,
        case_id: String,
        custodian: String,
        content_hash: String,
    },
    CustodyTransferred {
        evidence_id: String,
        sequence: u64,
        from: String,
        to: String,
    },
    TrustConfigUpdated {
        code_identity: String,
        approvals: usize,
    },
}

impl LedgerEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEventKind::LedgerInitialized { .. } => "LedgerInitialized",
            LedgerEventKind::EvidenceCreated { .. } => "EvidenceCreated",
            LedgerEventKind::CustodyTransferred { .. } => "CustodyTransferred",
            LedgerEventKind::TrustConfigUpdated { .. } => "TrustConfigUpdated",
        }
    }
}

/// A journaled event. Immutable once committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub tx_id: String,
    pub block: u64,
    /// Position within the transaction.
    pub index: u32,
    pub timestamp: i64,
    pub event: LedgerEventKind,
    /// BLAKE3 over every other field.
    pub integrity_hash: String,
}

impl LedgerEvent {
    pub fn new(tx_id: String, block: u64, index: u32, timestamp: i64, event: LedgerEventKind) -> Self {
        let integrity_hash = Self::compute_hash(&tx_id, block, index, timestamp, &event);
        Self {
            tx_id,
            block,
            index,
            timestamp,
            event,
            integrity_hash,
        }
    }

    pub fn verify_integrity(&self) -> bool {
        self.integrity_hash
            == Self::compute_hash(&self.tx_id, self.block, self.index, self.timestamp, &self.event)
    }

    fn compute_hash(
        tx_id: &str,
        block: u64,
        index: u32,
        timestamp: i64,
        event: &LedgerEventKind,
    ) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"custody-event-v1:");
        hasher.update(&(tx_id.len() as u32).to_le_bytes());
        hasher.update(tx_id.as_bytes());
        hasher.update(&block.to_le_bytes());
        hasher.update(&index.to_le_bytes());
        hasher.update(&timestamp.to_le_bytes());
        hasher.update(&serde_json::to_vec(event).unwrap_or_default());
        hasher.finalize().to_hex().to_string()
    }
}
