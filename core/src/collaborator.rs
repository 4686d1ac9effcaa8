//! Capabilities the engine consumes from the outside world.
//!
//! RULE: the core never talks to storage directly.
//! It sees accounts, history, the transaction journal, report
//! persistence, score rows and the audit trail only through these traits.
//! `RiskStore` implements all of them over SQLite; tests swap in
//! failing or counting implementations where needed.

use crate::{
    error::RiskResult,
    event::RiskEvent,
    report::{NewReport, Report, ReportStatus},
    risk_gate::Decision,
    score_ledger::ScoreRecord,
    transaction::Transaction,
    types::{AccountId, CustomerId},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Value types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountProfile {
    pub account_id:  AccountId,
    pub customer_id: CustomerId,
    pub holder_name: String,
    pub opened_at:   NaiveDateTime,
}

impl AccountProfile {
    /// Whole days the account has existed at `now`. Never negative.
    pub fn age_days(&self, now: NaiveDateTime) -> u32 {
        (now - self.opened_at).num_days().max(0) as u32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportStats {
    /// Reports ever filed against the account.
    pub total:          u32,
    /// Reports filed since the window start.
    pub recent:         u32,
    pub last_report_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReceiptStats {
    pub count:        u32,
    pub total_amount: f64,
}

// ── Capabilities ───────────────────────────────────────────────────

pub trait AccountDirectory: Send + Sync {
    fn account(&self, account_id: &str) -> RiskResult<Option<AccountProfile>>;
}

pub trait ActivityHistory: Send + Sync {
    fn report_stats(&self, account_id: &str, since: NaiveDateTime) -> RiskResult<ReportStats>;

    /// Completed transfers received by the account since `since`.
    fn receipt_stats(&self, account_id: &str, since: NaiveDateTime) -> RiskResult<ReceiptStats>;

    /// Timestamps of transfers sent or received by the account since `since`.
    fn transaction_timestamps(
        &self,
        account_id: &str,
        since: NaiveDateTime,
    ) -> RiskResult<Vec<NaiveDateTime>>;
}

pub trait TransactionJournal: Send + Sync {
    fn commit_transaction(&self, transaction: &Transaction) -> RiskResult<()>;
    fn record_decision(&self, decision: &Decision) -> RiskResult<()>;
    fn find_decision(&self, transaction_id: &str) -> RiskResult<Option<Decision>>;
}

pub trait ReportSink: Send + Sync {
    /// Persist a report. The sink assigns id and protocol.
    fn file_report(&self, report: &NewReport) -> RiskResult<Report>;
    fn report(&self, report_id: i64) -> RiskResult<Option<Report>>;
    fn set_report_status(&self, report_id: i64, status: ReportStatus) -> RiskResult<()>;
}

/// Durable home of the score ledger.
pub trait ScoreStore: Send + Sync {
    /// Upsert one customer's row.
    fn save_score(&self, record: &ScoreRecord) -> RiskResult<()>;
}

pub trait AuditTrail: Send + Sync {
    fn append_event(&self, at: NaiveDateTime, event: &RiskEvent) -> RiskResult<()>;
}

/// Everything the gate needs besides report filing.
pub trait GateBackend: AccountDirectory + ActivityHistory + TransactionJournal + AuditTrail {}

impl<T> GateBackend for T where T: AccountDirectory + ActivityHistory + TransactionJournal + AuditTrail {}

/// Append an audit event, logging instead of failing.
pub fn audit<T: AuditTrail + ?Sized>(trail: &T, at: NaiveDateTime, event: RiskEvent) {
    if let Err(e) = trail.append_event(at, &event) {
        log::warn!("audit: dropped {} event: {e}", event.event_type());
    }
}
