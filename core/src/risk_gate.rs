//! Real-time transfer gate.
//!
//! RULE: one decision per transaction id, ever.
//! The first `evaluate` for an id decides and performs side effects;
//! every later call, in this process or after a restart, returns the
//! recorded decision untouched. That includes a fail-closed Blocked: a
//! transfer refused on a transient fault stays refused, and the client
//! retries under a new transaction id.
//!
//! The in-memory slot for an id only lives while that id is being
//! decided. Once the decision is journaled the slot is dropped and the
//! journal answers replays; a decision the journal refused keeps its
//! slot so this process still replays it.
//!
//! Tiers, on `m = min(origin score, destination score)`:
//!
//!   m <= critical  Blocked, AUTO_CRITICAL report on the triggering side
//!   m <= high      Suspicious, AUTO_HIGH_RISK report on the origin
//!   m <= medium    classifier on the origin's behaviour:
//!                    suspend              -> Suspicious (no report)
//!                    amount > manual limit -> PendingManualApproval
//!                    otherwise            -> MonitoredApproved
//!   otherwise      Approved
//!
//! The decision is fail-closed: any internal error yields Blocked.
//! Report filing and auditing are fail-open: their errors are logged
//! and never change a decision already made.

use crate::{
    clock::Clock,
    collaborator::{
        audit, AccountDirectory, AccountProfile, ActivityHistory, GateBackend, TransactionJournal,
    },
    config::{GateConfig, RiskConfig},
    error::RiskResult,
    event::RiskEvent,
    report::{NewReport, ReportDesk, ReportType},
    score_ledger::ScoreLedger,
    suspicion_classifier::{BehavioralSnapshot, SuspicionClassifier, SuspicionResult},
    transaction::{Transaction, TransactionStatus, TransferRequest},
    types::{AccountId, CustomerId, Score, TransactionId},
};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

// ── Decision ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateAction {
    Approved,
    MonitoredApproved,
    PendingManualApproval,
    Suspicious,
    Blocked,
}

impl GateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateAction::Approved              => "APPROVED",
            GateAction::MonitoredApproved     => "MONITORED_APPROVED",
            GateAction::PendingManualApproval => "PENDING_MANUAL_APPROVAL",
            GateAction::Suspicious            => "SUSPICIOUS",
            GateAction::Blocked               => "BLOCKED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn classify(score: Score, gate: &GateConfig) -> Self {
        let score = score as i64;
        if score <= gate.critical_score {
            RiskLevel::Critical
        } else if score <= gate.high_score {
            RiskLevel::High
        } else if score <= gate.medium_score {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High     => "HIGH",
            RiskLevel::Medium   => "MEDIUM",
            RiskLevel::Low      => "LOW",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub transaction_id:           TransactionId,
    pub action:                   GateAction,
    pub blocked:                  bool,
    pub suspicious:               bool,
    pub requires_manual_approval: bool,
    /// The transfer may proceed.
    pub allowed:                  bool,
    /// Lower of the two account scores at decision time.
    pub score:                    Score,
    pub risk_level:               RiskLevel,
    pub risk_level_label:         String,
    pub report_protocol:          Option<String>,
    pub risk_factors:             Vec<String>,
    pub classification:           Option<SuspicionResult>,
    pub decided_at:               NaiveDateTime,
}

impl Decision {
    fn new(
        transaction_id: &str,
        action: GateAction,
        score: Score,
        risk_level: RiskLevel,
        decided_at: NaiveDateTime,
    ) -> Self {
        Self {
            transaction_id:           transaction_id.to_string(),
            action,
            blocked:                  action == GateAction::Blocked,
            suspicious:               action == GateAction::Suspicious,
            requires_manual_approval: action == GateAction::PendingManualApproval,
            allowed:                  matches!(action, GateAction::Approved | GateAction::MonitoredApproved),
            score,
            risk_level,
            risk_level_label:         risk_level.label().to_string(),
            report_protocol:          None,
            risk_factors:             Vec::new(),
            classification:           None,
            decided_at,
        }
    }
}

// ── Gate ───────────────────────────────────────────────────────────

/// One side of a transfer, resolved to its owner and current score.
struct Party {
    account_id:  AccountId,
    customer_id: CustomerId,
    profile:     Option<AccountProfile>,
    score:       Score,
}

type DecisionSlot = Arc<Mutex<Option<Decision>>>;

pub struct RiskGate {
    config:     RiskConfig,
    backend:    Arc<dyn GateBackend>,
    desk:       Arc<ReportDesk>,
    ledger:     Arc<ScoreLedger>,
    classifier: Arc<SuspicionClassifier>,
    clock:      Arc<dyn Clock>,
    decided:    Mutex<HashMap<TransactionId, DecisionSlot>>,
}

impl RiskGate {
    pub fn new(
        config: RiskConfig,
        backend: Arc<dyn GateBackend>,
        desk: Arc<ReportDesk>,
        ledger: Arc<ScoreLedger>,
        classifier: Arc<SuspicionClassifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            backend,
            desk,
            ledger,
            classifier,
            clock,
            decided: Mutex::new(HashMap::new()),
        }
    }

    /// Per-transaction slot. Holding its lock serialises concurrent
    /// submissions of the same id.
    fn slot(&self, transaction_id: &str) -> DecisionSlot {
        let mut decided = self.decided.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(decided.entry(transaction_id.to_string()).or_default())
    }

    /// Drop a settled slot, unless another caller has already replaced it.
    fn release(&self, transaction_id: &str, slot: &DecisionSlot) {
        let mut decided = self.decided.lock().unwrap_or_else(PoisonError::into_inner);
        if decided.get(transaction_id).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            decided.remove(transaction_id);
        }
    }

    /// Slots still held in memory: in-flight ids plus unjournaled decisions.
    pub fn pending_slots(&self) -> usize {
        self.decided.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Decide the fate of a validated transfer request. Never fails.
    pub fn evaluate(&self, request: &TransferRequest) -> Decision {
        let slot = self.slot(&request.transaction_id);
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(decision) = cached.as_ref() {
            log::debug!("gate: tx={} already decided ({})", request.transaction_id, decision.action.as_str());
            return decision.clone();
        }

        let (decision, durable) = match self.backend.find_decision(&request.transaction_id) {
            Ok(Some(previous)) => {
                log::debug!("gate: tx={} restored from journal", request.transaction_id);
                (previous, true)
            }
            lookup => {
                let decision = lookup
                    .and_then(|_| self.try_evaluate(request))
                    .unwrap_or_else(|e| self.fail_closed(request, &e.to_string()));
                let durable = self.record(&decision);
                (decision, durable)
            }
        };
        *cached = Some(decision.clone());
        if durable {
            self.release(&request.transaction_id, &slot);
        }
        decision
    }

    fn try_evaluate(&self, request: &TransferRequest) -> RiskResult<Decision> {
        let now = self.clock.now();
        let gate = &self.config.gate;
        let origin = self.party(&request.origin_account)?;
        let destination = self.party(&request.destination_account)?;

        let m = origin.score.min(destination.score);
        let level = RiskLevel::classify(m, gate);
        let mut factors = self.risk_factors(request, &origin, &destination);

        let mut decision = if m as i64 <= gate.critical_score {
            let trigger = if origin.score as i64 <= gate.critical_score { &origin } else { &destination };
            self.commit(request, TransactionStatus::Blocked, m)?;
            let mut d = Decision::new(&request.transaction_id, GateAction::Blocked, m, level, now);
            d.report_protocol = self.auto_report(request, trigger, ReportType::AutoCritical, m, now);
            d
        } else if m as i64 <= gate.high_score {
            self.commit(request, TransactionStatus::Suspicious, m)?;
            let mut d = Decision::new(&request.transaction_id, GateAction::Suspicious, m, level, now);
            d.report_protocol = self.auto_report(request, &origin, ReportType::AutoHighRisk, m, now);
            d
        } else if m as i64 <= gate.medium_score {
            let snapshot = self.behavioral_snapshot(&origin, now)?;
            let result = self.classifier.classify(&snapshot);
            factors.extend(result.fired_rules.iter().map(|r| r.describe().to_string()));

            let action = if result.should_suspend {
                self.commit(request, TransactionStatus::Suspicious, m)?;
                GateAction::Suspicious
            } else if request.amount > gate.manual_approval_amount {
                GateAction::PendingManualApproval
            } else {
                self.commit(request, TransactionStatus::Completed, m)?;
                self.ledger.record_transaction(&origin.customer_id, request.amount);
                GateAction::MonitoredApproved
            };
            let mut d = Decision::new(&request.transaction_id, action, m, level, now);
            d.classification = Some(result);
            d
        } else {
            self.commit(request, TransactionStatus::Completed, m)?;
            self.ledger.record_transaction(&origin.customer_id, request.amount);
            Decision::new(&request.transaction_id, GateAction::Approved, m, level, now)
        };
        decision.risk_factors = factors;

        log::info!(
            "gate: tx={} {} -> {} score={m} level={} amount={:.2}",
            request.transaction_id,
            request.origin_account,
            decision.action.as_str(),
            decision.risk_level_label,
            request.amount
        );
        Ok(decision)
    }

    fn party(&self, account_id: &str) -> RiskResult<Party> {
        let profile = self.backend.account(account_id)?;
        let customer_id = match &profile {
            Some(p) => p.customer_id.clone(),
            None => {
                log::warn!("gate: account {account_id} unknown, scoring under account id");
                account_id.to_string()
            }
        };
        let score = self.ledger.score(&customer_id);
        Ok(Party {
            account_id: account_id.to_string(),
            customer_id,
            profile,
            score,
        })
    }

    fn risk_factors(&self, request: &TransferRequest, origin: &Party, destination: &Party) -> Vec<String> {
        let gate = &self.config.gate;
        let mut factors = Vec::new();
        for (side, party) in [("origin", origin), ("destination", destination)] {
            if party.profile.is_none() {
                factors.push(format!("{side} account not registered"));
            }
            match RiskLevel::classify(party.score, gate) {
                RiskLevel::Critical => factors.push(format!("{side} score critical ({})", party.score)),
                RiskLevel::High     => factors.push(format!("{side} score high risk ({})", party.score)),
                RiskLevel::Medium   => factors.push(format!("{side} account under monitoring ({})", party.score)),
                RiskLevel::Low      => {}
            }
        }
        if request.amount > self.config.transaction.high_value_amount {
            factors.push("high-value transfer".to_string());
        }
        if request.amount > gate.manual_approval_amount {
            factors.push("amount exceeds manual-approval threshold".to_string());
        }
        factors
    }

    /// Recent behaviour of one account, as the classifier sees it.
    fn behavioral_snapshot(&self, party: &Party, now: NaiveDateTime) -> RiskResult<BehavioralSnapshot> {
        let limits = &self.config.transaction;
        let window = limits.history_window_days.max(1);
        let since = now - Duration::days(window);

        let reports = self.backend.report_stats(&party.account_id, since)?;
        let receipts = self.backend.receipt_stats(&party.account_id, since)?;
        let days_since_last_report = match reports.last_report_at {
            Some(at) => (now - at).num_days().max(0) as u32,
            None => limits.safe_report_gap_days.max(0) as u32,
        };

        Ok(BehavioralSnapshot {
            report_count:           reports.total,
            days_since_last_report,
            report_frequency:       reports.recent as f64 / window as f64,
            receipt_count:          receipts.count,
            total_received_amount:  receipts.total_amount,
            account_age_days:       party.profile.as_ref().map(|p| p.age_days(now)).unwrap_or(0),
        })
    }

    fn commit(&self, request: &TransferRequest, status: TransactionStatus, score: Score) -> RiskResult<()> {
        self.backend.commit_transaction(&Transaction::commit(request, status, score))
    }

    /// File an automatic report. Failures are swallowed; the desk has
    /// already logged and audited them.
    fn auto_report(
        &self,
        request: &TransferRequest,
        target: &Party,
        report_type: ReportType,
        score: Score,
        now: NaiveDateTime,
    ) -> Option<String> {
        let reason = match report_type {
            ReportType::AutoCritical => format!(
                "Automatic report: transfer {} blocked, account score {} at or below the critical limit",
                request.transaction_id, target.score
            ),
            _ => format!(
                "Automatic report: transfer {} flagged suspicious, lowest account score {score}",
                request.transaction_id
            ),
        };
        let report = NewReport {
            target_account: target.account_id.clone(),
            transaction_id: Some(request.transaction_id.clone()),
            reason,
            report_type,
            priority:       report_type.default_priority(),
            reporter:       None,
            created_at:     now,
        };
        self.desk.file(report).ok().map(|filed| filed.report.protocol)
    }

    /// Journal and audit a fresh decision. Returns whether the journal took it.
    fn record(&self, decision: &Decision) -> bool {
        let journaled = match self.backend.record_decision(decision) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("gate: tx={} decision not journaled: {e}", decision.transaction_id);
                false
            }
        };
        audit(self.backend.as_ref(), decision.decided_at, RiskEvent::DecisionRecorded {
            transaction_id: decision.transaction_id.clone(),
            action:         decision.action.as_str().to_string(),
            score:          decision.score,
            risk_level:     decision.risk_level_label.clone(),
        });
        journaled
    }

    fn fail_closed(&self, request: &TransferRequest, reason: &str) -> Decision {
        let now = self.clock.now();
        log::error!("gate: tx={} failed closed: {reason}", request.transaction_id);
        let mut decision = Decision::new(&request.transaction_id, GateAction::Blocked, 0, RiskLevel::Critical, now);
        decision.risk_factors.push(format!("internal error: {reason}"));
        audit(self.backend.as_ref(), now, RiskEvent::GateFailedClosed {
            transaction_id: request.transaction_id.clone(),
            reason:         reason.to_string(),
        });
        decision
    }
}
