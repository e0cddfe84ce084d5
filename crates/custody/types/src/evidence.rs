use serde::{Deserialize, Serialize};

use crate::Nonce;

/// Input to the `CreateEvidence` ledger operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEvidence {
    pub id: String,
    pub case_id: String,
    pub evidence_type: String,
    pub custodian: String,
    pub content_hash: String,
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// An evidence item on the ledger. Created once, never deleted; only the
/// custodian, location and custody sequence move, and only via custody transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: String,
    pub case_id: String,
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub custodian: String,
    pub content_hash: String,
    pub location: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub created_by: String,
    /// Number of custody transfers appended so far (tail of the custody log).
    pub custody_sequence: u64,
}

impl EvidenceRecord {
    pub fn resource(&self) -> String {
        format!("evidence/{}", self.id)
    }
}

/// One link of the chain of custody. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyTransferEntry {
    pub evidence_id: String,
    pub sequence: u64,
    pub from: String,
    pub to: String,
    pub reason: String,
    pub location: String,
    pub timestamp: i64,
    pub tx_id: String,
    /// Hex SHA-256 of the permit signing input that authorized the transfer.
    pub permit_hash: String,
}

/// World-state record of a consumed nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceConsumption {
    pub nonce: Nonce,
    pub consumed_at: i64,
    pub tx_id: String,
    pub subject: String,
    pub action: String,
    pub resource: String,
}
