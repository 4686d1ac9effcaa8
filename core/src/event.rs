//! Audit events.
//!
//! RULE: every side effect of a gating decision leaves an event.
//! Events are appended to `event_log` as tagged JSON. Writing them is
//! fail-open: an audit failure is logged and never changes a decision.

use crate::types::{AccountId, CustomerId, Score, TransactionId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Variants are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RiskEvent {
    // ── Gate ───────────────────────────────────────
    DecisionRecorded {
        transaction_id: TransactionId,
        action:         String,
        score:          Score,
        risk_level:     String,
    },
    GateFailedClosed {
        transaction_id: TransactionId,
        reason:         String,
    },

    // ── Reports ────────────────────────────────────
    ReportFiled {
        report_id:      i64,
        protocol:       String,
        target_account: AccountId,
        report_type:    String,
        transaction_id: Option<TransactionId>,
    },
    ReportFilingFailed {
        target_account: AccountId,
        transaction_id: Option<TransactionId>,
        reason:         String,
    },
    ReportStatusChanged {
        report_id: i64,
        from:      String,
        to:        String,
    },

    // ── Ledger ─────────────────────────────────────
    PenaltyApplied {
        customer_id: CustomerId,
        points:      u32,
        new_score:   Score,
    },
    ScoresRecalculated {
        customers: usize,
    },
    LedgerCheckpointed {
        records: usize,
    },
}

impl RiskEvent {
    /// Stable name of the variant, stored alongside the payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            RiskEvent::DecisionRecorded { .. }    => "decision_recorded",
            RiskEvent::GateFailedClosed { .. }    => "gate_failed_closed",
            RiskEvent::ReportFiled { .. }         => "report_filed",
            RiskEvent::ReportFilingFailed { .. }  => "report_filing_failed",
            RiskEvent::ReportStatusChanged { .. } => "report_status_changed",
            RiskEvent::PenaltyApplied { .. }      => "penalty_applied",
            RiskEvent::ScoresRecalculated { .. }  => "scores_recalculated",
            RiskEvent::LedgerCheckpointed { .. }  => "ledger_checkpointed",
        }
    }

    /// Component that emitted the event.
    pub fn source(&self) -> &'static str {
        match self {
            RiskEvent::DecisionRecorded { .. } | RiskEvent::GateFailedClosed { .. } => "gate",
            RiskEvent::ReportFiled { .. }
            | RiskEvent::ReportFilingFailed { .. }
            | RiskEvent::ReportStatusChanged { .. } => "reports",
            RiskEvent::PenaltyApplied { .. }
            | RiskEvent::ScoresRecalculated { .. }
            | RiskEvent::LedgerCheckpointed { .. } => "ledger",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub source:     String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized RiskEvent
    pub created_at: NaiveDateTime,
}

impl EventLogEntry {
    pub fn new(event: &RiskEvent, created_at: NaiveDateTime) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id:         None,
            source:     event.source().to_string(),
            event_type: event.event_type().to_string(),
            payload:    serde_json::to_string(event)?,
            created_at,
        })
    }

    pub fn decode(&self) -> Result<RiskEvent, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn payload_is_tagged_and_decodes() {
        let at = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let event = RiskEvent::PenaltyApplied {
            customer_id: "c-1".into(),
            points:      8,
            new_score:   17,
        };
        let entry = EventLogEntry::new(&event, at).unwrap();
        assert_eq!(entry.source, "ledger");
        assert_eq!(entry.event_type, "penalty_applied");
        assert!(entry.payload.contains(r#""type":"penalty_applied""#));
        assert_eq!(entry.decode().unwrap(), event);
    }
}
