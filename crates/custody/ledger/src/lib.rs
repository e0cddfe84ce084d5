//! Custody Ledger - the public, verifying side of the split-trust protocol.
//!
//! The ledger never sees users, roles or policy rules. It holds a trust anchor
//! (public key and oracle measurements, installed by governance) and accepts a
//! guarded operation only with a fresh, unused, correctly bound permit whose
//! signature and attestation check out against that anchor.
//!
//! Execution follows the usual endorse/commit split: an operation runs against a
//! [`Transaction`] that records read versions and buffers writes, and the
//! [`StateStore`] applies the write set only if none of the reads went stale.
//! Two transactions spending the same nonce therefore cannot both commit.

#![deny(unsafe_code)]

pub mod contract;
pub mod error;
pub mod events;
pub mod governance;
pub mod keys;
pub mod ledger;
pub mod state;
pub mod tx;
pub mod verifier;

pub use contract::{CustodyTransfer, EvidenceContract, LedgerInit};
pub use error::{LedgerError, LedgerResult};
pub use events::{LedgerEvent, LedgerEventKind};
pub use governance::GovernancePolicy;
pub use ledger::EvidenceLedger;
pub use state::{Commit, InMemoryStateStore, StateError, StateStore, VersionedValue};
pub use tx::{Transaction, TxContext, TxReceipt};
pub use verifier::{
    Expected, PermitEnvelope, PermitVerifier, TrustAnchor, VerificationError, VerificationStage,
    VerifiedPermit, VerifierConfig,
};
