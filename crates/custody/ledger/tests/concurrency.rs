mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{evidence, Harness};
use custody_ledger::{CustodyTransfer, LedgerError};
use custody_types::{Nonce, ReasonCode};

fn transfer(id: &str, to: &str) -> CustodyTransfer {
    CustodyTransfer {
        evidence_id: id.into(),
        new_custodian: to.into(),
        reason: "courier".into(),
        location: "van-2".into(),
    }
}

#[test]
fn two_open_transactions_cannot_both_spend_one_nonce() {
    let h = Harness::new();
    let nonce = Nonce::generate();
    let envelope = h.permit_with_nonce("inv001", "create", "evidence/EVD-1", nonce);

    // Both execute against the same snapshot before either commits.
    let mut first = h.ledger.begin(h.ctx("inv001"));
    let mut second = h.ledger.begin(h.ctx("inv001"));
    h.ledger
        .contract()
        .create_evidence(&mut first, evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap();
    h.ledger
        .contract()
        .create_evidence(&mut second, evidence("EVD-1", "C", "inv001"), &envelope)
        .unwrap();

    h.ledger.commit(first).unwrap();
    let err = h.ledger.commit(second).unwrap_err();
    assert!(matches!(err, LedgerError::NonceReplay));
    assert_eq!(err.code(), Some(ReasonCode::NonceReplay));
}

#[test]
fn racing_threads_accept_a_nonce_at_most_once() {
    let h = Arc::new(Harness::new());
    h.seed_evidence("EVD-1", "CASE-1");
    let envelope = h.permit("inv001", "read", "evidence/EVD-1");

    let racers = 8;
    let barrier = Arc::new(Barrier::new(racers));
    let handles: Vec<_> = (0..racers)
        .map(|_| {
            let h = h.clone();
            let barrier = barrier.clone();
            let envelope = envelope.clone();
            thread::spawn(move || {
                let mut tx = h.ledger.begin(h.ctx("inv001"));
                let executed = h.ledger.contract().read_evidence(&mut tx, "EVD-1", &envelope);
                barrier.wait();
                executed.and_then(|_| h.ledger.commit(tx))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    for result in results.into_iter().filter_map(Result::err) {
        assert_eq!(result.code(), Some(ReasonCode::NonceReplay));
    }
}

#[test]
fn concurrent_transfers_of_one_item_are_serialized() {
    let h = Harness::new();
    h.seed_evidence("EVD-1", "CASE-1");

    let a = h.permit("inv001", "transfer", "evidence/EVD-1");
    let b = h.permit("inv002", "transfer", "evidence/EVD-1");

    let mut tx_a = h.ledger.begin(h.ctx("inv001"));
    let mut tx_b = h.ledger.begin(h.ctx("inv002"));
    let entry_a = h
        .ledger
        .contract()
        .transfer_custody(&mut tx_a, transfer("EVD-1", "inv002"), &a)
        .unwrap();
    let entry_b = h
        .ledger
        .contract()
        .transfer_custody(&mut tx_b, transfer("EVD-1", "aud001"), &b)
        .unwrap();
    // Both computed the same next sequence from the same tail.
    assert_eq!(entry_a.sequence, entry_b.sequence);

    h.ledger.commit(tx_a).unwrap();
    let err = h.ledger.commit(tx_b).unwrap_err();
    assert_eq!(err.code(), Some(ReasonCode::WriteConflict));

    let history = h.ledger.get_custody_history("EVD-1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to, "inv002");

    // The loser's nonce was never consumed; a retry on the new tail succeeds.
    let entry = h
        .ledger
        .transfer_custody(h.ctx("inv002"), transfer("EVD-1", "aud001"), &b)
        .unwrap();
    assert_eq!(entry.sequence, 2);
    assert_eq!(entry.from, "inv002");
}

#[test]
fn transfers_of_different_items_do_not_conflict() {
    let h = Harness::new();
    h.seed_evidence("EVD-1", "CASE-1");
    h.seed_evidence("EVD-2", "CASE-1");

    let a = h.permit("inv001", "transfer", "evidence/EVD-1");
    let b = h.permit("inv001", "transfer", "evidence/EVD-2");
    let mut tx_a = h.ledger.begin(h.ctx("inv001"));
    let mut tx_b = h.ledger.begin(h.ctx("inv001"));
    h.ledger
        .contract()
        .transfer_custody(&mut tx_a, transfer("EVD-1", "inv002"), &a)
        .unwrap();
    h.ledger
        .contract()
        .transfer_custody(&mut tx_b, transfer("EVD-2", "inv002"), &b)
        .unwrap();

    h.ledger.commit(tx_a).unwrap();
    h.ledger.commit(tx_b).unwrap();
}
