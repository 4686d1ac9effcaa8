//! Ledger integration tests: concurrent creation and penalties, checkpointing.

use chrono::NaiveDate;
use pix_risk_core::{
    clock::{Clock, FixedClock},
    config::{RiskConfig, ScoreConfig},
    engine::RiskEngine,
    score_ledger::{AccountStatus, ScoreLedger},
    store::RiskStore,
};
use std::sync::Arc;

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
    ))
}

/// Racing first references create exactly one record per customer.
#[test]
fn concurrent_first_reference_creates_once() {
    let ledger = ScoreLedger::new(ScoreConfig::default(), clock());
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for c in 0..50 {
                    ledger.get_or_create(&format!("cust-{c}"));
                }
            });
        }
    });
    assert_eq!(ledger.len(), 50);
    assert!(ledger.snapshot().iter().all(|r| r.score == 100 && r.total_reports == 0));
}

/// Parallel penalties and transactions on one customer never lose an update.
#[test]
fn concurrent_updates_are_serialised_per_customer() {
    let ledger = ScoreLedger::new(ScoreConfig::default(), clock());
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..3 {
                    ledger.apply_penalty("cust-hot", 1);
                    ledger.record_transaction("cust-hot", 10.0);
                }
            });
        }
    });
    let record = ledger.get("cust-hot").unwrap();
    assert_eq!(record.score, 88);
    assert_eq!(record.total_reports, 12);
    assert_eq!(record.total_transactions, 12);
    assert_eq!(record.total_amount, 120.0);
}

/// Every mutation leaves status consistent with score.
#[test]
fn status_tracks_score_through_penalties() {
    let ledger = ScoreLedger::new(ScoreConfig::default(), clock());
    let mut seen = Vec::new();
    for _ in 0..13 {
        ledger.apply_penalty("cust-1", 8);
        let r = ledger.get("cust-1").unwrap();
        assert_eq!(r.account_status, AccountStatus::derive(r.score, &ScoreConfig::default()));
        if seen.last() != Some(&r.account_status) {
            seen.push(r.account_status);
        }
    }
    assert_eq!(
        seen,
        vec![AccountStatus::Normal, AccountStatus::Monitored, AccountStatus::Blocked]
    );
}

/// A checkpoint restores into a fresh engine on the same store.
#[test]
fn checkpoint_round_trips_through_store() {
    let clock = clock();
    let store = Arc::new(RiskStore::in_memory().unwrap());
    let engine = RiskEngine::build(RiskConfig::default(), store.clone(), clock.clone(), None).unwrap();
    engine.set_score("cust-a", 55);
    engine.ledger().apply_penalty("cust-b", 8);
    assert_eq!(engine.checkpoint().unwrap(), 2);

    let restored = RiskEngine::build(RiskConfig::default(), store.clone(), clock.clone(), None).unwrap();
    assert_eq!(restored.ledger().len(), 2);
    let a = restored.score_of("cust-a");
    assert_eq!(a.score, 55);
    assert_eq!(a.account_status, AccountStatus::Monitored);
    assert_eq!(restored.score_of("cust-b").total_reports, 1);
    assert_eq!(a.last_updated, clock.now());
    assert_eq!(store.event_count(Some("ledger_checkpointed")).unwrap(), 1);
}
