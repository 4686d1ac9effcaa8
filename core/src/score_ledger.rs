//! Per-customer confidence-score ledger.
//!
//! RULE: every mutation goes through this type.
//! The outer map lock is held only long enough to find or create a
//! customer's slot; all reads and writes of a record happen under that
//! customer's own lock, so concurrent gating of unrelated customers
//! never contends and two updates to the same customer never lose one.
//!
//! Entries are created lazily with `score.inicial` and never removed.
//!
//! RULE: with a `ScoreStore` attached, every mutation is written through
//! while the customer's lock is still held, so the stored row is never
//! older than a penalty another caller has observed. A failed write is
//! logged and the in-memory value stands; `checkpoint` resyncs in bulk.

use crate::{
    clock::Clock,
    collaborator::ScoreStore,
    config::ScoreConfig,
    types::{clamp_score, CustomerId, Score},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Normal,
    Monitored,
    Blocked,
}

impl AccountStatus {
    /// Pure function of the score: Blocked below `limiteRiscoAlto`,
    /// Monitored below `limiteRiscoMedio`, Normal otherwise.
    pub fn derive(score: Score, config: &ScoreConfig) -> Self {
        let score = score as i64;
        if score < config.high_risk_limit {
            AccountStatus::Blocked
        } else if score < config.medium_risk_limit {
            AccountStatus::Monitored
        } else {
            AccountStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Normal    => "NORMAL",
            AccountStatus::Monitored => "MONITORED",
            AccountStatus::Blocked   => "BLOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NORMAL"    => Some(AccountStatus::Normal),
            "MONITORED" => Some(AccountStatus::Monitored),
            "BLOCKED"   => Some(AccountStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    pub customer_id:        CustomerId,
    pub score:              Score,
    pub total_reports:      u32,
    pub total_transactions: u32,
    pub total_amount:       f64,
    pub last_updated:       NaiveDateTime,
    pub account_status:     AccountStatus,
}

type Slot = Arc<Mutex<ScoreRecord>>;

pub struct ScoreLedger {
    config:  ScoreConfig,
    clock:   Arc<dyn Clock>,
    store:   Option<Arc<dyn ScoreStore>>,
    records: Mutex<HashMap<CustomerId, Slot>>,
}

impl ScoreLedger {
    pub fn new(config: ScoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            store: None,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Write every mutation through to `store`.
    pub fn persisting_to(mut self, store: Arc<dyn ScoreStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    /// Find or create the slot for `customer_id`. Creation happens under
    /// the map lock, so racing first references produce exactly one record.
    fn slot(&self, customer_id: &str) -> Slot {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = records.get(customer_id) {
            return Arc::clone(slot);
        }
        let score = self.config.initial_score();
        let record = ScoreRecord {
            customer_id:        customer_id.to_string(),
            score,
            total_reports:      0,
            total_transactions: 0,
            total_amount:       0.0,
            last_updated:       self.clock.now(),
            account_status:     AccountStatus::derive(score, &self.config),
        };
        log::debug!("ledger: created {customer_id} at score {score}");
        let slot = Arc::new(Mutex::new(record));
        records.insert(customer_id.to_string(), Arc::clone(&slot));
        slot
    }

    fn with_record<T>(&self, customer_id: &str, f: impl FnOnce(&mut ScoreRecord) -> T) -> T {
        let slot = self.slot(customer_id);
        let mut record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut record)
    }

    /// Like `with_record`, then persist the result before the lock drops.
    fn update<T>(&self, customer_id: &str, f: impl FnOnce(&mut ScoreRecord) -> T) -> T {
        let slot = self.slot(customer_id);
        let mut record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut record);
        if let Some(store) = &self.store {
            if let Err(e) = store.save_score(&record) {
                log::warn!("ledger: {customer_id} not persisted: {e}");
            }
        }
        out
    }

    fn touch(&self, record: &mut ScoreRecord) {
        record.account_status = AccountStatus::derive(record.score, &self.config);
        record.last_updated = self.clock.now();
    }

    /// Existing record, or a fresh one at the default score.
    pub fn get_or_create(&self, customer_id: &str) -> ScoreRecord {
        self.with_record(customer_id, |r| r.clone())
    }

    pub fn score(&self, customer_id: &str) -> Score {
        self.with_record(customer_id, |r| r.score)
    }

    /// Read without creating.
    pub fn get(&self, customer_id: &str) -> Option<ScoreRecord> {
        let slot = {
            let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            records.get(customer_id).cloned()
        }?;
        let record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(record.clone())
    }

    /// `score = max(0, score - points)`, one more report on the record.
    /// Returns the new score. Unknown customers are created first.
    pub fn apply_penalty(&self, customer_id: &str, points: u32) -> Score {
        self.update(customer_id, |r| {
            let before = r.score;
            r.score = clamp_score(r.score as i64 - points as i64);
            r.total_reports = r.total_reports.saturating_add(1);
            self.touch(r);
            log::info!(
                "ledger: {customer_id} penalised {points} pts ({before} -> {}, {})",
                r.score,
                r.account_status.as_str()
            );
            r.score
        })
    }

    /// Count a committed transfer. Never moves the score.
    pub fn record_transaction(&self, customer_id: &str, amount: f64) {
        self.update(customer_id, |r| {
            r.total_transactions = r.total_transactions.saturating_add(1);
            r.total_amount += amount;
            r.last_updated = self.clock.now();
        })
    }

    /// Analyst override. The value is clamped onto the score scale.
    pub fn set_score(&self, customer_id: &str, score: i64) -> ScoreRecord {
        self.update(customer_id, |r| {
            r.score = clamp_score(score);
            self.touch(r);
            log::info!("ledger: {customer_id} score set to {}", r.score);
            r.clone()
        })
    }

    /// Rebuild a score from the number of reports on file:
    /// `inicial - reports * reducaoDenuncia`.
    pub fn recalculate_from_reports(&self, customer_id: &str, report_count: u32) -> Score {
        let rebuilt = self.config.initial - report_count as i64 * self.config.report_penalty;
        self.update(customer_id, |r| {
            r.score = clamp_score(rebuilt);
            r.total_reports = report_count;
            self.touch(r);
            r.score
        })
    }

    /// Copy of every record, ordered by customer id.
    pub fn snapshot(&self) -> Vec<ScoreRecord> {
        let slots: Vec<Slot> = {
            let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            records.values().cloned().collect()
        };
        let mut out: Vec<ScoreRecord> = slots
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        out.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
        out
    }

    /// Load checkpointed records. Existing entries for the same customer
    /// are overwritten; status is re-derived rather than trusted.
    pub fn restore(&self, records: Vec<ScoreRecord>) {
        let mut map = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        for mut record in records {
            record.account_status = AccountStatus::derive(record.score, &self.config);
            map.insert(record.customer_id.clone(), Arc::new(Mutex::new(record)));
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 2).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn ledger() -> (ScoreLedger, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(start()));
        (ScoreLedger::new(ScoreConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn status_steps_down_at_70_and_40() {
        let config = ScoreConfig::default();
        assert_eq!(AccountStatus::derive(100, &config), AccountStatus::Normal);
        assert_eq!(AccountStatus::derive(70, &config), AccountStatus::Normal);
        assert_eq!(AccountStatus::derive(69, &config), AccountStatus::Monitored);
        assert_eq!(AccountStatus::derive(40, &config), AccountStatus::Monitored);
        assert_eq!(AccountStatus::derive(39, &config), AccountStatus::Blocked);
        assert_eq!(AccountStatus::derive(0, &config), AccountStatus::Blocked);
    }

    #[test]
    fn status_is_monotonic_in_score() {
        let config = ScoreConfig::default();
        let rank = |s: AccountStatus| match s {
            AccountStatus::Blocked => 0,
            AccountStatus::Monitored => 1,
            AccountStatus::Normal => 2,
        };
        for score in 0..100u8 {
            let lo = rank(AccountStatus::derive(score, &config));
            let hi = rank(AccountStatus::derive(score + 1, &config));
            assert!(lo <= hi, "status went backwards between {score} and {}", score + 1);
        }
    }

    #[test]
    fn first_reference_uses_default_score() {
        let (ledger, _) = ledger();
        let record = ledger.get_or_create("c-1");
        assert_eq!(record.score, 100);
        assert_eq!(record.account_status, AccountStatus::Normal);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get("c-2").is_none());
    }

    #[test]
    fn penalties_floor_at_zero() {
        let (ledger, _) = ledger();
        let mut last = 100;
        for _ in 0..20 {
            let next = ledger.apply_penalty("c-1", 8);
            assert!(next <= last);
            last = next;
        }
        let record = ledger.get("c-1").unwrap();
        assert_eq!(record.score, 0);
        assert_eq!(record.total_reports, 20);
        assert_eq!(record.account_status, AccountStatus::Blocked);
    }

    #[test]
    fn transactions_do_not_move_score() {
        let (ledger, clock) = ledger();
        ledger.get_or_create("c-1");
        let later = clock.advance(Duration::hours(3));
        ledger.record_transaction("c-1", 250.0);
        ledger.record_transaction("c-1", 50.5);
        let record = ledger.get("c-1").unwrap();
        assert_eq!(record.score, 100);
        assert_eq!(record.total_transactions, 2);
        assert!((record.total_amount - 300.5).abs() < 1e-9);
        assert_eq!(record.last_updated, later);
    }

    #[test]
    fn override_and_recalculate_clamp() {
        let (ledger, _) = ledger();
        assert_eq!(ledger.set_score("c-1", 140).score, 100);
        assert_eq!(ledger.set_score("c-1", -3).score, 0);
        assert_eq!(ledger.recalculate_from_reports("c-1", 3), 76);
        assert_eq!(ledger.get("c-1").unwrap().total_reports, 3);
        assert_eq!(ledger.recalculate_from_reports("c-1", 30), 0);
    }

    #[test]
    fn restore_rederives_status() {
        let (ledger, _) = ledger();
        let mut record = ledger.get_or_create("c-9");
        record.score = 35;
        record.account_status = AccountStatus::Normal;
        ledger.restore(vec![record]);
        assert_eq!(ledger.get("c-9").unwrap().account_status, AccountStatus::Blocked);
    }

    /// Keeps every row it is handed; optionally refuses them all.
    #[derive(Default)]
    struct RecordingStore {
        rows:    Mutex<Vec<ScoreRecord>>,
        offline: bool,
    }

    impl ScoreStore for RecordingStore {
        fn save_score(&self, record: &ScoreRecord) -> crate::error::RiskResult<()> {
            if self.offline {
                return Err(crate::error::RiskError::Other(anyhow::anyhow!("score table locked")));
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn mutations_are_written_through() {
        let (ledger, _) = ledger();
        let store = Arc::new(RecordingStore::default());
        let ledger = ledger.persisting_to(store.clone());

        ledger.get_or_create("c-1");
        assert!(store.rows.lock().unwrap().is_empty());

        ledger.apply_penalty("c-1", 8);
        ledger.record_transaction("c-1", 40.0);
        ledger.set_score("c-2", 55);
        ledger.recalculate_from_reports("c-3", 2);

        let rows = store.rows.lock().unwrap();
        let written: Vec<(&str, u8)> = rows.iter().map(|r| (r.customer_id.as_str(), r.score)).collect();
        assert_eq!(written, vec![("c-1", 92), ("c-1", 92), ("c-2", 55), ("c-3", 84)]);
        assert_eq!(rows[1].total_transactions, 1);
        assert_eq!(rows[2].account_status, AccountStatus::Monitored);
    }

    #[test]
    fn failed_write_keeps_the_penalty() {
        let (ledger, _) = ledger();
        let store = Arc::new(RecordingStore { offline: true, ..Default::default() });
        let ledger = ledger.persisting_to(store);
        assert_eq!(ledger.apply_penalty("c-1", 8), 92);
        assert_eq!(ledger.get("c-1").unwrap().total_reports, 1);
    }
}
