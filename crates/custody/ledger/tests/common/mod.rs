#![allow(dead_code)]

use std::sync::Arc;

use custody_attestation::{AttestationEngine, SimulatedAttestation};
use custody_crypto::SigningKey;
use custody_ledger::{
    EvidenceLedger, GovernancePolicy, InMemoryStateStore, LedgerInit, PermitEnvelope, StateStore,
    TxContext, VerifierConfig,
};
use custody_oracle::{AuthorizationOracle, FixedClock, OracleConfig, PermitRequest};
use custody_permit::{Decision, DecisionPayload, PermitSigner};
use custody_types::{Clearance, NewEvidence, Nonce, Role, TrustConfig, User};

pub const T0: i64 = 1_700_000_000;

pub struct Harness {
    pub oracle: AuthorizationOracle,
    pub clock: Arc<FixedClock>,
    pub store: Arc<InMemoryStateStore>,
    pub ledger: EvidenceLedger,
}

impl Harness {
    /// Oracle with the standard users and an initialised ledger.
    pub fn new() -> Self {
        let harness = Self::uninitialized();
        harness
            .ledger
            .init_ledger(
                TxContext::new("admin", T0),
                LedgerInit {
                    trust: harness.oracle.trust_config(),
                    governance: governance(),
                },
            )
            .unwrap();
        harness
    }

    pub fn uninitialized() -> Self {
        let clock = Arc::new(FixedClock::new(T0));
        let config = OracleConfig::with_users(vec![
            user("admin", Role::Admin, 4),
            user("inv001", Role::Investigator, 2),
            user("inv002", Role::Investigator, 2),
            user("aud001", Role::Auditor, 3),
            user("court01", Role::Court, 4),
        ]);
        let oracle = AuthorizationOracle::with_clock(config, clock.clone()).unwrap();
        let store = Arc::new(InMemoryStateStore::new());
        let ledger = EvidenceLedger::new(
            store.clone() as Arc<dyn StateStore>,
            VerifierConfig::default(),
        );
        Self {
            oracle,
            clock,
            store,
            ledger,
        }
    }

    /// Ask the oracle for a permit and package it for the ledger.
    pub fn permit(&self, subject: &str, action: &str, resource: &str) -> PermitEnvelope {
        let nonce = Nonce::generate();
        self.permit_with_nonce(subject, action, resource, nonce)
    }

    pub fn permit_with_nonce(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
        nonce: Nonce,
    ) -> PermitEnvelope {
        let signed = self
            .oracle
            .get_signed_permit(&PermitRequest {
                subject: subject.into(),
                action: action.into(),
                resource: resource.into(),
                clearance: None,
                decision: Some(Decision::Allow),
                nonce: nonce.clone(),
            })
            .unwrap();
        PermitEnvelope::new(signed.permit, nonce, signed.attestation)
    }

    /// Transaction context at the oracle's current time.
    pub fn ctx(&self, submitter: &str) -> TxContext {
        TxContext::new(submitter, self.clock_now())
    }

    pub fn clock_now(&self) -> i64 {
        use custody_oracle::Clock;
        self.clock.now()
    }

    /// Create `id` in `case` as inv001.
    pub fn seed_evidence(&self, id: &str, case: &str) {
        let envelope = self.permit("inv001", "create", &format!("evidence/{}", id));
        self.ledger
            .create_evidence(self.ctx("inv001"), evidence(id, case, "inv001"), &envelope)
            .unwrap();
    }
}

pub fn user(id: &str, role: Role, clearance: u8) -> User {
    User::new(id, role, Clearance::new(clearance).unwrap())
}

pub fn governance() -> GovernancePolicy {
    GovernancePolicy::new(["org1", "org2", "org3"], 2)
}

pub fn evidence(id: &str, case: &str, custodian: &str) -> NewEvidence {
    NewEvidence {
        id: id.into(),
        case_id: case.into(),
        evidence_type: "disk-image".into(),
        custodian: custodian.into(),
        content_hash: "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".into(),
        location: "evidence-locker-3".into(),
        description: "Seized laptop drive".into(),
        metadata: serde_json::json!({"size_bytes": 512_000_000_000u64}),
    }
}

/// A key and simulated enclave outside any oracle, for permits the oracle
/// would never sign (deny decisions, arbitrary timestamps).
pub struct Issuer {
    pub signer: PermitSigner,
    pub attestation: SimulatedAttestation,
}

impl Issuer {
    pub fn new() -> Self {
        let key = Arc::new(SigningKey::generate().unwrap());
        Self {
            signer: PermitSigner::new(key.clone()),
            attestation: SimulatedAttestation::from_seeds("issuer-code", "issuer-signer", key),
        }
    }

    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig::new(self.signer.public_key().to_hex(), self.attestation.measure())
    }

    pub fn payload(&self, subject: &str, action: &str, resource: &str, timestamp: i64) -> DecisionPayload {
        DecisionPayload {
            sub: subject.into(),
            action: action.into(),
            resource: resource.into(),
            clearance: None,
            decision: Decision::Allow,
            timestamp,
            nonce: Nonce::generate(),
            mrenclave: self.attestation.measure().code_identity,
        }
    }

    pub fn issue(&self, payload: &DecisionPayload) -> PermitEnvelope {
        let permit = self.signer.sign(payload).unwrap();
        let attestation = self
            .attestation
            .attest(&payload.nonce, payload.timestamp)
            .unwrap();
        PermitEnvelope::new(permit, payload.nonce.clone(), attestation)
    }

    /// Ledger whose trust anchor is this issuer.
    pub fn ledger(&self) -> (Arc<InMemoryStateStore>, EvidenceLedger) {
        let store = Arc::new(InMemoryStateStore::new());
        let ledger = EvidenceLedger::new(
            store.clone() as Arc<dyn StateStore>,
            VerifierConfig::default(),
        );
        ledger
            .init_ledger(
                TxContext::new("admin", T0),
                LedgerInit {
                    trust: self.trust_config(),
                    governance: governance(),
                },
            )
            .unwrap();
        (store, ledger)
    }
}
