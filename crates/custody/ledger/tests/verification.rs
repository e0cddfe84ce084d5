mod common;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use common::{evidence, Harness, Issuer, T0};
use custody_ledger::{Expected, LedgerError, TrustAnchor, TxContext, VerificationStage};
use custody_permit::Decision;
use custody_types::{Digest32, Nonce, ReasonCode};
use proptest::prelude::*;

fn code(err: LedgerError) -> ReasonCode {
    err.code().expect("protocol failure carries a reason code")
}

#[test]
fn malformed_permit_is_rejected_first() {
    let h = Harness::new();
    let mut envelope = h.permit("inv001", "create", "evidence/EVD-1");
    envelope.permit.payload = "not base64!".into();
    let err = h
        .ledger
        .create_evidence(h.ctx("inv002"), evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::MalformedPermit);
}

#[test]
fn permit_is_bound_to_the_submitter() {
    let h = Harness::new();
    let envelope = h.permit("inv001", "create", "evidence/EVD-1");
    let err = h
        .ledger
        .create_evidence(h.ctx("inv002"), evidence("EVD-1", "C", "inv002"), &envelope)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::SubjectMismatch);
}

#[test]
fn permit_is_bound_to_action_and_resource() {
    let h = Harness::new();

    let read = h.permit("inv001", "read", "evidence/EVD-1");
    let err = h
        .ledger
        .create_evidence(h.ctx("inv001"), evidence("EVD-1", "C", "inv001"), &read)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::ActionResourceMismatch);

    let other = h.permit("inv001", "create", "evidence/EVD-2");
    let err = h
        .ledger
        .create_evidence(h.ctx("inv001"), evidence("EVD-1", "C", "inv001"), &other)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::ActionResourceMismatch);
}

#[test]
fn carried_nonce_must_match_signed_nonce() {
    let h = Harness::new();
    let mut envelope = h.permit("inv001", "create", "evidence/EVD-1");
    envelope.nonce = Nonce::generate();
    let err = h
        .ledger
        .create_evidence(h.ctx("inv001"), evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::NonceMismatch);
}

#[test]
fn replayed_permit_is_rejected_without_side_effects() {
    let h = Harness::new();
    h.seed_evidence("EVD-1", "CASE-1");

    let envelope = h.permit("inv001", "transfer", "evidence/EVD-1");
    let transfer = custody_ledger::CustodyTransfer {
        evidence_id: "EVD-1".into(),
        new_custodian: "inv002".into(),
        reason: "analysis".into(),
        location: "lab".into(),
    };
    h.ledger
        .transfer_custody(h.ctx("inv001"), transfer.clone(), &envelope)
        .unwrap();

    let state_after_first = h.store.dump().unwrap();
    let events_after_first = h.ledger.events().unwrap();

    let err = h
        .ledger
        .transfer_custody(h.ctx("inv001"), transfer, &envelope)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::NonceReplay);

    assert_eq!(h.store.dump().unwrap(), state_after_first);
    assert_eq!(h.ledger.events().unwrap(), events_after_first);
    assert_eq!(h.ledger.get_custody_history("EVD-1").unwrap().len(), 1);
}

#[test]
fn consumed_nonce_cannot_back_a_different_operation() {
    let h = Harness::new();
    let nonce = Nonce::generate();
    let create = h.permit_with_nonce("inv001", "create", "evidence/EVD-1", nonce.clone());
    h.ledger
        .create_evidence(h.ctx("inv001"), evidence("EVD-1", "C", "inv001"), &create)
        .unwrap();

    let read = h.permit_with_nonce("inv001", "read", "evidence/EVD-1", nonce);
    let err = h
        .ledger
        .read_evidence(h.ctx("inv001"), "EVD-1", &read)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::NonceReplay);
}

#[test]
fn freshness_window_is_300_seconds() {
    let h = Harness::new();

    let stale = h.permit("inv001", "create", "evidence/EVD-OLD");
    let ctx = TxContext::new("inv001", T0 + 301);
    let err = h
        .ledger
        .create_evidence(ctx, evidence("EVD-OLD", "C", "inv001"), &stale)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::PermitExpired);

    let fresh = h.permit("inv001", "create", "evidence/EVD-NEW");
    let ctx = TxContext::new("inv001", T0 + 299);
    h.ledger
        .create_evidence(ctx, evidence("EVD-NEW", "C", "inv001"), &fresh)
        .unwrap();
}

#[test]
fn future_permits_beyond_skew_are_expired() {
    let h = Harness::new();
    let envelope = h.permit("inv001", "create", "evidence/EVD-1");
    let ctx = TxContext::new("inv001", T0 - 31);
    let err = h
        .ledger
        .create_evidence(ctx, evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::PermitExpired);

    let ctx = TxContext::new("inv001", T0 - 30);
    h.ledger
        .create_evidence(ctx, evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap();
}

#[test]
fn extreme_timestamps_are_expired_not_fatal() {
    let issuer = Issuer::new();
    let (store, ledger) = issuer.ledger();

    for (id, timestamp) in [("EVD-MIN", i64::MIN), ("EVD-MAX", i64::MAX)] {
        let payload = issuer.payload("inv001", "create", &format!("evidence/{}", id), timestamp);
        let envelope = issuer.issue(&payload);
        let err = ledger
            .create_evidence(
                TxContext::new("inv001", T0),
                evidence(id, "C", "inv001"),
                &envelope,
            )
            .unwrap_err();
        assert_eq!(code(err), ReasonCode::PermitExpired);
        assert!(!store.dump().unwrap().contains_key(&format!("NONCE_{}", payload.nonce)));
    }
}

#[test]
fn signed_deny_decision_is_policy_denied() {
    let issuer = Issuer::new();
    let (_, ledger) = issuer.ledger();
    let mut payload = issuer.payload("inv001", "create", "evidence/EVD-1", T0);
    payload.decision = Decision::Deny;
    let envelope = issuer.issue(&payload);

    let err = ledger
        .create_evidence(
            TxContext::new("inv001", T0),
            evidence("EVD-1", "C", "inv001"),
            &envelope,
        )
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::PolicyDenied);
}

#[test]
fn attestation_for_another_challenge_is_rejected() {
    let h = Harness::new();
    let mut envelope = h.permit("inv001", "create", "evidence/EVD-1");
    envelope.attestation = h.oracle.get_attestation(&Nonce::generate()).unwrap();
    let err = h
        .ledger
        .create_evidence(h.ctx("inv001"), evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::AttestationMismatch);
}

#[test]
fn untrusted_code_identity_is_rejected() {
    let issuer = Issuer::new();
    let (_, ledger) = issuer.ledger();
    let mut payload = issuer.payload("inv001", "create", "evidence/EVD-1", T0);
    payload.mrenclave = Digest32([7u8; 32]);
    let envelope = issuer.issue(&payload);

    let err = ledger
        .create_evidence(
            TxContext::new("inv001", T0),
            evidence("EVD-1", "C", "inv001"),
            &envelope,
        )
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::AttestationMismatch);
}

#[test]
fn permit_from_an_untrusted_oracle_is_rejected() {
    let h = Harness::new();
    let impostor = Harness::new();
    let envelope = impostor.permit("inv001", "create", "evidence/EVD-1");
    let err = h
        .ledger
        .create_evidence(h.ctx("inv001"), evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap_err();
    // Same seeded measurements, different key: the report signature fails first.
    assert_eq!(code(err), ReasonCode::AttestationMismatch);
}

#[test]
fn tampered_payload_fails_signature_check() {
    let h = Harness::new();
    let mut envelope = h.permit("inv001", "create", "evidence/EVD-1");

    let raw = URL_SAFE_NO_PAD.decode(&envelope.permit.payload).unwrap();
    let mut payload: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    payload["clearance"] = serde_json::json!(4);
    envelope.permit.payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());

    let err = h
        .ledger
        .create_evidence(h.ctx("inv001"), evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::SignatureInvalid);
    assert!(matches!(
        err_stage(&h, &envelope),
        Some(VerificationStage::Signature)
    ));
}

fn err_stage(h: &Harness, envelope: &custody_ledger::PermitEnvelope) -> Option<VerificationStage> {
    let trust = TrustAnchor::new(h.ledger.get_trust_config().unwrap()).unwrap();
    let result = h.ledger.evaluate(|contract, tx| {
        contract.verifier().verify(
            tx,
            envelope,
            &Expected {
                subject: "inv001",
                action: "create",
                resource: "evidence/EVD-1",
            },
            &trust,
            T0,
        )
    });
    match result {
        Err(LedgerError::Verification(err)) => Some(err.stage),
        _ => None,
    }
}

#[test]
fn earliest_failing_check_decides_the_reason() {
    let h = Harness::new();
    let mut envelope = h.permit("inv001", "create", "evidence/EVD-1");
    envelope.nonce = Nonce::generate();
    // Wrong submitter, wrong nonce and expired: subject is checked first.
    let ctx = TxContext::new("inv002", T0 + 1_000);
    let err = h
        .ledger
        .create_evidence(ctx, evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap_err();
    assert_eq!(code(err), ReasonCode::SubjectMismatch);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn freshness_accepts_exactly_the_window(age in -90i64..=420) {
        let issuer = Issuer::new();
        let (_, ledger) = issuer.ledger();
        let trust = TrustAnchor::new(issuer.trust_config()).unwrap();
        let envelope = issuer.issue(&issuer.payload("inv001", "read", "evidence/E", T0));

        let result = ledger.evaluate(|contract, tx| {
            contract.verifier().verify(
                tx,
                &envelope,
                &Expected { subject: "inv001", action: "read", resource: "evidence/E" },
                &trust,
                T0 + age,
            )
        });

        let accepted = (-30..=300).contains(&age);
        match result {
            Ok(_) => prop_assert!(accepted),
            Err(err) => {
                prop_assert!(!accepted);
                prop_assert_eq!(err.code(), Some(ReasonCode::PermitExpired));
            }
        }
    }
}
