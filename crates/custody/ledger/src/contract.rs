//! Evidence and custody operations, executed against one [`Transaction`].
//!
//! Guarded operations verify the attached permit first, then apply their
//! effect and record the nonce as consumed in the same write set.

use custody_types::{CustodyTransferEntry, EvidenceRecord, NewEvidence, NonceConsumption, TrustConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::events::LedgerEventKind;
use crate::governance::GovernancePolicy;
use crate::keys;
use crate::tx::Transaction;
use crate::verifier::{Expected, PermitEnvelope, PermitVerifier, TrustAnchor, VerifiedPermit};

pub const ACTION_CREATE: &str = "create";
pub const ACTION_TRANSFER: &str = "transfer";
pub const ACTION_READ: &str = "read";

/// `InitLedger` arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInit {
    pub trust: TrustConfig,
    pub governance: GovernancePolicy,
}

/// `TransferCustody` arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyTransfer {
    pub evidence_id: String,
    pub new_custodian: String,
    pub reason: String,
    pub location: String,
}

pub fn evidence_resource(id: &str) -> String {
    format!("evidence/{}", id)
}

pub fn case_resource(case_id: &str) -> String {
    format!("case/{}", case_id)
}

#[derive(Clone, Debug, Default)]
pub struct EvidenceContract {
    verifier: PermitVerifier,
}

impl EvidenceContract {
    pub fn new(verifier: PermitVerifier) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &PermitVerifier {
        &self.verifier
    }

    /// Install the trust anchor and governance policy. Only ever succeeds once.
    pub fn init_ledger(&self, tx: &mut Transaction<'_>, init: LedgerInit) -> LedgerResult<()> {
        if tx.exists(keys::TRUST_CONFIG)? {
            return Err(LedgerError::AlreadyExists("trust configuration".to_string()));
        }
        init.governance.validate()?;

        let mut trust = TrustAnchor::new(init.trust)?.config;
        trust.updated_at = tx.context().timestamp;

        tx.put(keys::TRUST_CONFIG, &trust)?;
        tx.put(keys::GOVERNANCE, &init.governance)?;
        tx.emit(LedgerEventKind::LedgerInitialized {
            code_identity: trust.code_identity.to_hex(),
            governance_members: init.governance.members.len(),
        });
        Ok(())
    }

    pub fn create_evidence(
        &self,
        tx: &mut Transaction<'_>,
        evidence: NewEvidence,
        envelope: &PermitEnvelope,
    ) -> LedgerResult<EvidenceRecord> {
        for (field, value) in [
            ("id", &evidence.id),
            ("case_id", &evidence.case_id),
            ("custodian", &evidence.custodian),
            ("content_hash", &evidence.content_hash),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidArgument(format!("{} is required", field)));
            }
        }

        let resource = evidence_resource(&evidence.id);
        let verified = self.authorize(tx, envelope, ACTION_CREATE, &resource)?;

        let key = keys::evidence(&evidence.id);
        if tx.exists(&key)? {
            return Err(LedgerError::AlreadyExists(evidence.id));
        }

        let ctx = tx.context().clone();
        let record = EvidenceRecord {
            id: evidence.id,
            case_id: evidence.case_id,
            evidence_type: evidence.evidence_type,
            custodian: evidence.custodian,
            content_hash: evidence.content_hash,
            location: evidence.location,
            description: evidence.description,
            metadata: evidence.metadata,
            created_at: ctx.timestamp,
            created_by: ctx.submitter,
            custody_sequence: 0,
        };
        tx.put(key, &record)?;
        consume_nonce(tx, &verified)?;
        tx.emit(LedgerEventKind::EvidenceCreated {
            evidence_id: record.id.clone(),
            case_id: record.case_id.clone(),
            custodian: record.custodian.clone(),
            content_hash: record.content_hash.clone(),
        });

        info!(evidence = %record.id, case = %record.case_id, custodian = %record.custodian, "Evidence created");
        Ok(record)
    }

    pub fn transfer_custody(
        &self,
        tx: &mut Transaction<'_>,
        transfer: CustodyTransfer,
        envelope: &PermitEnvelope,
    ) -> LedgerResult<CustodyTransferEntry> {
        if transfer.new_custodian.trim().is_empty() {
            return Err(LedgerError::InvalidArgument("new_custodian is required".to_string()));
        }

        let resource = evidence_resource(&transfer.evidence_id);
        let verified = self.authorize(tx, envelope, ACTION_TRANSFER, &resource)?;

        let key = keys::evidence(&transfer.evidence_id);
        let mut record: EvidenceRecord = tx
            .get(&key)?
            .ok_or_else(|| LedgerError::NotFound(transfer.evidence_id.clone()))?;

        let ctx = tx.context().clone();
        let entry = CustodyTransferEntry {
            evidence_id: record.id.clone(),
            sequence: record.custody_sequence + 1,
            from: record.custodian.clone(),
            to: transfer.new_custodian,
            reason: transfer.reason,
            location: transfer.location,
            timestamp: ctx.timestamp,
            tx_id: ctx.tx_id,
            permit_hash: verified.permit_hash.clone(),
        };

        record.custodian = entry.to.clone();
        record.location = entry.location.clone();
        record.custody_sequence = entry.sequence;

        tx.put(keys::custody(&record.id, entry.sequence), &entry)?;
        tx.put(key, &record)?;
        consume_nonce(tx, &verified)?;
        tx.emit(LedgerEventKind::CustodyTransferred {
            evidence_id: entry.evidence_id.clone(),
            sequence: entry.sequence,
            from: entry.from.clone(),
            to: entry.to.clone(),
        });

        info!(
            evidence = %entry.evidence_id,
            sequence = entry.sequence,
            from = %entry.from,
            to = %entry.to,
            "Custody transferred"
        );
        Ok(entry)
    }

    pub fn read_evidence(
        &self,
        tx: &mut Transaction<'_>,
        evidence_id: &str,
        envelope: &PermitEnvelope,
    ) -> LedgerResult<EvidenceRecord> {
        let verified = self.authorize(tx, envelope, ACTION_READ, &evidence_resource(evidence_id))?;
        let record = tx
            .get(&keys::evidence(evidence_id))?
            .ok_or_else(|| LedgerError::NotFound(evidence_id.to_string()))?;
        consume_nonce(tx, &verified)?;
        Ok(record)
    }

    pub fn query_evidence_by_case(
        &self,
        tx: &mut Transaction<'_>,
        case_id: &str,
        envelope: &PermitEnvelope,
    ) -> LedgerResult<Vec<EvidenceRecord>> {
        let verified = self.authorize(tx, envelope, ACTION_READ, &case_resource(case_id))?;
        let records = tx
            .scan::<EvidenceRecord>(keys::EVIDENCE_PREFIX)?
            .into_iter()
            .filter(|record| record.case_id == case_id)
            .collect();
        consume_nonce(tx, &verified)?;
        Ok(records)
    }

    /// Ordered chain of custody. Empty for evidence that never moved.
    pub fn get_custody_history(
        &self,
        tx: &mut Transaction<'_>,
        evidence_id: &str,
    ) -> LedgerResult<Vec<CustodyTransferEntry>> {
        let record: EvidenceRecord = tx
            .get(&keys::evidence(evidence_id))?
            .ok_or_else(|| LedgerError::NotFound(evidence_id.to_string()))?;

        (1..=record.custody_sequence)
            .map(|sequence| -> LedgerResult<CustodyTransferEntry> {
                tx.get(&keys::custody(evidence_id, sequence))?.ok_or_else(|| {
                    LedgerError::NotFound(format!("{} custody entry {}", evidence_id, sequence))
                })
            })
            .collect()
    }

    pub fn get_trust_config(&self, tx: &mut Transaction<'_>) -> LedgerResult<TrustConfig> {
        tx.get(keys::TRUST_CONFIG)?.ok_or(LedgerError::NotInitialized)
    }

    pub fn get_governance(&self, tx: &mut Transaction<'_>) -> LedgerResult<GovernancePolicy> {
        tx.get(keys::GOVERNANCE)?.ok_or(LedgerError::NotInitialized)
    }

    /// Replace the trust anchor. Requires a governance quorum of endorsers;
    /// a permit from the oracle does not count.
    pub fn update_trust_config(
        &self,
        tx: &mut Transaction<'_>,
        trust: TrustConfig,
    ) -> LedgerResult<TrustConfig> {
        self.get_trust_config(tx)?;
        let governance = self.get_governance(tx)?;
        let approvals = governance.authorize(&tx.context().endorsers)?;

        let mut trust = TrustAnchor::new(trust)?.config;
        trust.updated_at = tx.context().timestamp;
        tx.put(keys::TRUST_CONFIG, &trust)?;
        tx.emit(LedgerEventKind::TrustConfigUpdated {
            code_identity: trust.code_identity.to_hex(),
            approvals,
        });

        info!(approvals, threshold = governance.threshold, "Trust configuration updated");
        Ok(trust)
    }

    fn authorize(
        &self,
        tx: &mut Transaction<'_>,
        envelope: &PermitEnvelope,
        action: &str,
        resource: &str,
    ) -> LedgerResult<VerifiedPermit> {
        let trust = TrustAnchor::new(self.get_trust_config(tx)?)
            .map_err(|_| LedgerError::NotInitialized)?;
        let ctx = tx.context().clone();
        let expected = Expected {
            subject: &ctx.submitter,
            action,
            resource,
        };
        self.verifier
            .verify(tx, envelope, &expected, &trust, ctx.timestamp)
    }
}

fn consume_nonce(tx: &mut Transaction<'_>, verified: &VerifiedPermit) -> LedgerResult<()> {
    let ctx = tx.context();
    let consumption = NonceConsumption {
        nonce: verified.payload.nonce.clone(),
        consumed_at: ctx.timestamp,
        tx_id: ctx.tx_id.clone(),
        subject: verified.payload.sub.clone(),
        action: verified.payload.action.clone(),
        resource: verified.payload.resource.clone(),
    };
    tx.put(keys::nonce(&verified.payload.nonce), &consumption)
}
