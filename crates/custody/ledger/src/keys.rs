//! World-state key layout.

use custody_types::Nonce;

pub const TRUST_CONFIG: &str = "TRUST_CONFIG";
pub const GOVERNANCE: &str = "GOVERNANCE";
pub const EVIDENCE_PREFIX: &str = "EVIDENCE_";
pub const NONCE_PREFIX: &str = "NONCE_";
pub const CUSTODY_PREFIX: &str = "CUSTODY_";

pub fn evidence(id: &str) -> String {
    format!("{}{}", EVIDENCE_PREFIX, id)
}

pub fn nonce(nonce: &Nonce) -> String {
    format!("{}{}", NONCE_PREFIX, nonce.encode())
}

/// Zero-padded so a lexical scan returns entries in append order.
pub fn custody(evidence_id: &str, sequence: u64) -> String {
    format!("{}{}_{:020}", CUSTODY_PREFIX, evidence_id, sequence)
}

pub fn is_nonce(key: &str) -> bool {
    key.starts_with(NONCE_PREFIX)
}
