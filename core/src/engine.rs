//! The risk engine: one handle over every component.
//!
//! WIRING (fixed):
//!   1. Config validated
//!   2. Store migrated, ledger restored from its stored rows and
//!      attached to the store for write-through
//!   3. Classifier (external model if one loads, rules otherwise)
//!   4. Report desk (sink + directory + audit + ledger)
//!   5. Gate
//!
//! RULES:
//!   - Requests are validated here, before they reach the gate.
//!   - The engine owns no state of its own; the ledger and store do.

use crate::{
    clock::Clock,
    collaborator::{audit, ActivityHistory},
    config::RiskConfig,
    error::RiskResult,
    event::RiskEvent,
    report::{
        catalogue_stats, CatalogueStats, FiledReport, ManualReportRequest, Report, ReportBreakdown,
        ReportDesk, ReportStatus,
    },
    risk_gate::{Decision, RiskGate},
    score_ledger::{ScoreLedger, ScoreRecord},
    store::RiskStore,
    suspicion_classifier::{BehavioralSnapshot, ExternalModel, SuspicionClassifier, SuspicionResult},
    temporal_features::{extract_features, TemporalFeatureSet},
    transaction::TransferRequest,
};
use chrono::{Duration, NaiveDateTime};
use std::sync::Arc;

/// Widest history `analyze_account_timing` will look back over.
pub const MAX_TIMING_WINDOW_DAYS: i64 = 3_650;

pub struct RiskEngine {
    config:     RiskConfig,
    store:      Arc<RiskStore>,
    clock:      Arc<dyn Clock>,
    ledger:     Arc<ScoreLedger>,
    classifier: Arc<SuspicionClassifier>,
    desk:       Arc<ReportDesk>,
    gate:       RiskGate,
}

impl RiskEngine {
    /// Build a fully wired engine. With no model the classifier runs on
    /// its rule engine for the life of the process.
    pub fn build(
        config: RiskConfig,
        store: Arc<RiskStore>,
        clock: Arc<dyn Clock>,
        model: Option<Box<dyn ExternalModel>>,
    ) -> RiskResult<Self> {
        let classifier = match model {
            Some(model) => SuspicionClassifier::with_model(&config, model),
            None => {
                log::info!("classifier: no external model configured, using rule engine");
                SuspicionClassifier::rules_only(&config)
            }
        };
        Self::build_with_classifier(config, store, clock, classifier)
    }

    /// Build with a model loader that runs exactly once.
    pub fn build_with_model_loader<F>(
        config: RiskConfig,
        store: Arc<RiskStore>,
        clock: Arc<dyn Clock>,
        load: F,
    ) -> RiskResult<Self>
    where
        F: FnOnce() -> anyhow::Result<Box<dyn ExternalModel>>,
    {
        let classifier = SuspicionClassifier::with_model_loader(&config, load);
        Self::build_with_classifier(config, store, clock, classifier)
    }

    pub fn build_with_classifier(
        config: RiskConfig,
        store: Arc<RiskStore>,
        clock: Arc<dyn Clock>,
        classifier: SuspicionClassifier,
    ) -> RiskResult<Self> {
        config.validate()?;
        store.migrate()?;

        let ledger = Arc::new(
            ScoreLedger::new(config.score.clone(), Arc::clone(&clock)).persisting_to(store.clone()),
        );
        let restored = store.load_ledger()?;
        if !restored.is_empty() {
            log::info!("engine: restored {} ledger records", restored.len());
        }
        ledger.restore(restored);

        let classifier = Arc::new(classifier);
        let desk = Arc::new(ReportDesk::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::clone(&ledger),
            Arc::clone(&clock),
        ));
        let gate = RiskGate::new(
            config.clone(),
            store.clone(),
            Arc::clone(&desk),
            Arc::clone(&ledger),
            Arc::clone(&classifier),
            Arc::clone(&clock),
        );

        Ok(Self { config, store, clock, ledger, classifier, desk, gate })
    }

    // ── Gating ─────────────────────────────────────────────────

    /// Validate and gate one transfer. Only malformed requests error;
    /// everything past validation yields a decision.
    pub fn evaluate(&self, request: &TransferRequest) -> RiskResult<Decision> {
        request.validate()?;
        Ok(self.gate.evaluate(request))
    }

    pub fn classify(&self, snapshot: &BehavioralSnapshot) -> SuspicionResult {
        self.classifier.classify(snapshot)
    }

    pub fn classifier_model_active(&self) -> bool {
        self.classifier.model_active()
    }

    // ── Temporal analysis ──────────────────────────────────────

    pub fn extract_features(&self, timestamps: &[NaiveDateTime]) -> TemporalFeatureSet {
        extract_features(timestamps)
    }

    /// Features over the account's transfers in the last `days` days,
    /// clamped to `1..=MAX_TIMING_WINDOW_DAYS`.
    pub fn analyze_account_timing(&self, account_id: &str, days: i64) -> RiskResult<TemporalFeatureSet> {
        let days = days.clamp(1, MAX_TIMING_WINDOW_DAYS);
        let since = self
            .clock
            .now()
            .checked_sub_signed(Duration::days(days))
            .unwrap_or(NaiveDateTime::MIN);
        let timestamps = self.store.transaction_timestamps(account_id, since)?;
        let features = extract_features(&timestamps);
        log::info!(
            "temporal: {account_id} over {days}d: {} transfers, score {} ({})",
            features.transaction_count,
            features.temporal_risk_score,
            features.risk_band().as_str()
        );
        Ok(features)
    }

    // ── Reports ────────────────────────────────────────────────

    pub fn file_report(&self, request: ManualReportRequest) -> RiskResult<FiledReport> {
        self.desk.file_manual(request)
    }

    pub fn transition_report(&self, report_id: i64, status: ReportStatus) -> RiskResult<Report> {
        self.desk.transition(report_id, status)
    }

    pub fn report_breakdown(&self) -> RiskResult<ReportBreakdown> {
        self.store.report_breakdown()
    }

    pub fn catalogue_stats(&self) -> CatalogueStats {
        catalogue_stats()
    }

    // ── Scores ─────────────────────────────────────────────────

    pub fn score_of(&self, customer_id: &str) -> ScoreRecord {
        self.ledger.get_or_create(customer_id)
    }

    pub fn score_of_account(&self, account_id: &str) -> ScoreRecord {
        self.ledger.get_or_create(&self.desk.customer_for(account_id))
    }

    pub fn set_score(&self, customer_id: &str, score: i64) -> ScoreRecord {
        self.ledger.set_score(customer_id, score)
    }

    /// Persist the whole ledger in one transaction. Mutations are already
    /// written through one row at a time; this resyncs any row whose
    /// write failed. Returns the number of records written.
    pub fn checkpoint(&self) -> RiskResult<usize> {
        let records = self.ledger.snapshot();
        self.store.save_ledger(&records)?;
        audit(self.store.as_ref(), self.clock.now(), RiskEvent::LedgerCheckpointed { records: records.len() });
        log::info!("engine: checkpointed {} ledger records", records.len());
        Ok(records.len())
    }

    /// Rebuild every reported customer's score from the reports on file.
    pub fn recalculate_scores(&self) -> RiskResult<usize> {
        let counts = self.store.report_counts_by_customer()?;
        for (customer_id, count) in &counts {
            let score = self.ledger.recalculate_from_reports(customer_id, *count);
            log::debug!("engine: {customer_id} recalculated from {count} reports -> {score}");
        }
        audit(self.store.as_ref(), self.clock.now(), RiskEvent::ScoresRecalculated { customers: counts.len() });
        Ok(counts.len())
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn store(&self) -> &RiskStore {
        &self.store
    }

    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}
