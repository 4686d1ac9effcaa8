//! Suspicion classifier.
//!
//! Two independent computations run on every call:
//!
//!   1. Classification: the external model when one is loaded, otherwise
//!      the rule engine. A model that fails to load, or fails on any call,
//!      is disabled for the rest of the process. There is no retry.
//!   2. Security score: a 0–100 figure computed from the raw snapshot,
//!      never from the classification outcome.

use crate::{
    config::{ClassifierConfig, RiskConfig, ScoreConfig, TransactionConfig},
    types::{clamp_score, Score},
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

// ── Input / output ─────────────────────────────────────────────────

/// Behavioural summary of one account, fed to the classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BehavioralSnapshot {
    pub report_count:            u32,
    /// Days since the most recent report.
    pub days_since_last_report:  u32,
    /// Reports per day over the history window.
    pub report_frequency:        f64,
    pub receipt_count:           u32,
    pub total_received_amount:   f64,
    pub account_age_days:        u32,
}

impl BehavioralSnapshot {
    /// Feature order expected by the external model.
    pub fn to_vector(&self) -> [f64; 6] {
        [
            self.report_count as f64,
            self.days_since_last_report as f64,
            self.report_frequency,
            self.receipt_count as f64,
            self.total_received_amount,
            self.account_age_days as f64,
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Model,
    Rules,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SuspicionRule {
    /// Many reports in a short time.
    ReportBurst,
    /// Report frequency above the high limit.
    HighReportFrequency,
    /// New account receiving an unusual number of transfers.
    NewAccountVolume,
    /// New account receiving an unusual amount.
    NewAccountValue,
    /// Many reports at a sustained frequency.
    SustainedReporting,
}

impl SuspicionRule {
    pub fn confidence(&self) -> f64 {
        match self {
            SuspicionRule::ReportBurst         => 0.85,
            SuspicionRule::HighReportFrequency => 0.80,
            SuspicionRule::NewAccountVolume    => 0.75,
            SuspicionRule::NewAccountValue     => 0.90,
            SuspicionRule::SustainedReporting  => 0.70,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            SuspicionRule::ReportBurst         => "several recent reports against the account",
            SuspicionRule::HighReportFrequency => "reported more than once a day",
            SuspicionRule::NewAccountVolume    => "new account receiving many transfers",
            SuspicionRule::NewAccountValue     => "new account receiving a large total",
            SuspicionRule::SustainedReporting  => "sustained stream of reports",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuspicionResult {
    pub suspicious:     bool,
    /// In [0, 1].
    pub confidence:     f64,
    pub should_suspend: bool,
    pub security_score: Score,
    pub method:         ClassificationMethod,
    /// Class label: "Yes" or "No".
    pub label:          String,
    /// Rules that fired; empty when the model answered.
    pub fired_rules:    Vec<SuspicionRule>,
}

// ── External model capability ──────────────────────────────────────

/// Raw answer from an external model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrediction {
    pub label:         String,
    /// `[P(No), P(Yes)]`.
    pub probabilities: [f64; 2],
}

/// An externally trained classifier over the six snapshot features.
pub trait ExternalModel: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, features: &[f64; 6]) -> anyhow::Result<ModelPrediction>;
}

/// Either path that can answer "does this look like a known bad pattern".
pub trait ClassificationPath: Send + Sync {
    fn classify(&self, snapshot: &BehavioralSnapshot) -> anyhow::Result<Classification>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub suspicious:  bool,
    pub confidence:  f64,
    pub method:      ClassificationMethod,
    pub fired_rules: Vec<SuspicionRule>,
}

/// Adapts an [`ExternalModel`] to the classification path.
pub struct ModelPath {
    model: Box<dyn ExternalModel>,
}

impl ModelPath {
    pub fn new(model: Box<dyn ExternalModel>) -> Self {
        Self { model }
    }
}

impl ClassificationPath for ModelPath {
    fn classify(&self, snapshot: &BehavioralSnapshot) -> anyhow::Result<Classification> {
        let prediction = self.model.predict(&snapshot.to_vector())?;
        let [p_no, p_yes] = prediction.probabilities;
        if !(p_no.is_finite() && p_yes.is_finite()) {
            anyhow::bail!("model {} returned non-finite probabilities", self.model.name());
        }
        Ok(Classification {
            suspicious:  prediction.label == "Yes",
            confidence:  p_no.max(p_yes).clamp(0.0, 1.0),
            method:      ClassificationMethod::Model,
            fired_rules: Vec::new(),
        })
    }
}

// ── Rule engine ────────────────────────────────────────────────────

/// Deterministic fallback. Five independent rules; the verdict is
/// suspicious when any fires and the confidence is the highest fired.
pub struct RuleEngine {
    limits: TransactionConfig,
}

impl RuleEngine {
    pub fn new(limits: TransactionConfig) -> Self {
        Self { limits }
    }

    pub fn fired_rules(&self, s: &BehavioralSnapshot) -> Vec<SuspicionRule> {
        let l = &self.limits;
        let reports = s.report_count as i64;
        let gap = s.days_since_last_report as i64;
        let age = s.account_age_days as i64;
        let mut fired = Vec::new();

        if reports >= l.pattern_report_count && gap < l.suspicious_report_gap_days {
            fired.push(SuspicionRule::ReportBurst);
        }
        if s.report_frequency > l.high_report_frequency {
            fired.push(SuspicionRule::HighReportFrequency);
        }
        if age < l.new_account_days && s.receipt_count as i64 > l.new_account_receipt_limit {
            fired.push(SuspicionRule::NewAccountVolume);
        }
        if age < l.new_account_value_days && s.total_received_amount > l.new_account_value_limit {
            fired.push(SuspicionRule::NewAccountValue);
        }
        if reports >= l.pattern_report_count && s.report_frequency > l.pattern_report_frequency {
            fired.push(SuspicionRule::SustainedReporting);
        }
        fired
    }

    pub fn evaluate(&self, snapshot: &BehavioralSnapshot) -> Classification {
        let fired = self.fired_rules(snapshot);
        let confidence = fired.iter().map(|r| r.confidence()).fold(0.0, f64::max);
        Classification {
            suspicious: !fired.is_empty(),
            confidence,
            method: ClassificationMethod::Rules,
            fired_rules: fired,
        }
    }
}

impl ClassificationPath for RuleEngine {
    fn classify(&self, snapshot: &BehavioralSnapshot) -> anyhow::Result<Classification> {
        Ok(self.evaluate(snapshot))
    }
}

// ── Security score ─────────────────────────────────────────────────

/// How far the raw behaviour should move an account's numeric score.
pub fn security_score(
    s: &BehavioralSnapshot,
    score: &ScoreConfig,
    limits: &TransactionConfig,
) -> Score {
    let reports = s.report_count as i64;
    let gap = s.days_since_last_report as i64;
    let age = s.account_age_days as i64;
    let freq = s.report_frequency;

    let mut value = score.initial;
    value -= reports * score.report_penalty;

    if freq > limits.high_report_frequency {
        value -= (freq * score.frequency_penalty as f64) as i64;
    } else if freq > limits.medium_report_frequency {
        value -= (freq * score.frequency_penalty as f64 / 2.0) as i64;
    }

    if gap < limits.suspicious_report_gap_days && reports > 1 {
        value -= (limits.suspicious_report_gap_days - gap) / score.recency_divisor.max(1);
    }

    if age < limits.new_account_days && s.receipt_count as i64 > limits.new_account_receipt_limit {
        value -= score.new_account_volume_penalty;
    }
    if age < limits.new_account_value_days && s.total_received_amount > limits.new_account_value_limit {
        value -= score.new_account_value_penalty;
    }
    if reports >= limits.pattern_report_count && freq > limits.pattern_report_frequency {
        value -= score.pattern_penalty;
    }

    clamp_score(value)
}

// ── Classifier ─────────────────────────────────────────────────────

pub struct SuspicionClassifier {
    settings:       ClassifierConfig,
    score:          ScoreConfig,
    limits:         TransactionConfig,
    model:          Option<ModelPath>,
    model_disabled: AtomicBool,
    rules:          RuleEngine,
}

impl SuspicionClassifier {
    /// Rule engine only.
    pub fn rules_only(config: &RiskConfig) -> Self {
        Self {
            settings:       config.classifier.clone(),
            score:          config.score.clone(),
            limits:         config.transaction.clone(),
            model:          None,
            model_disabled: AtomicBool::new(true),
            rules:          RuleEngine::new(config.transaction.clone()),
        }
    }

    /// Try the loader once. A load failure is logged and the classifier
    /// runs on rules for the rest of the process.
    pub fn with_model_loader<F>(config: &RiskConfig, load: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Box<dyn ExternalModel>>,
    {
        let mut classifier = Self::rules_only(config);
        match load() {
            Ok(model) => {
                log::info!("classifier: external model '{}' loaded", model.name());
                classifier.model = Some(ModelPath::new(model));
                classifier.model_disabled = AtomicBool::new(false);
            }
            Err(e) => {
                log::warn!(
                    "classifier: model '{}' unavailable, using rule engine: {e}",
                    config.classifier.model_name
                );
            }
        }
        classifier
    }

    pub fn with_model(config: &RiskConfig, model: Box<dyn ExternalModel>) -> Self {
        Self::with_model_loader(config, || Ok(model))
    }

    /// True while the external model is still in use.
    pub fn model_active(&self) -> bool {
        self.model.is_some() && !self.model_disabled.load(Ordering::Acquire)
    }

    fn classify_path(&self, snapshot: &BehavioralSnapshot) -> Classification {
        if let Some(model) = self.model.as_ref().filter(|_| self.model_active()) {
            match model.classify(snapshot) {
                Ok(c) => return c,
                Err(e) => {
                    // Only the first failing call logs.
                    if !self.model_disabled.swap(true, Ordering::AcqRel) {
                        log::warn!("classifier: model failed, switching to rules permanently: {e}");
                    }
                }
            }
        }
        self.rules.evaluate(snapshot)
    }

    pub fn classify(&self, snapshot: &BehavioralSnapshot) -> SuspicionResult {
        let c = self.classify_path(snapshot);
        let security_score = security_score(snapshot, &self.score, &self.limits);
        let should_suspend = c.suspicious && c.confidence >= self.settings.confidence_threshold;
        log::debug!(
            "classifier: suspicious={} confidence={:.2} method={:?} security_score={security_score}",
            c.suspicious, c.confidence, c.method
        );
        SuspicionResult {
            suspicious: c.suspicious,
            confidence: c.confidence,
            should_suspend,
            security_score,
            method: c.method,
            label: if c.suspicious { "Yes" } else { "No" }.to_string(),
            fired_rules: c.fired_rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutral() -> BehavioralSnapshot {
        BehavioralSnapshot {
            report_count:           0,
            days_since_last_report: 180,
            report_frequency:       0.0,
            receipt_count:          3,
            total_received_amount:  450.0,
            account_age_days:       400,
        }
    }

    fn config() -> RiskConfig {
        RiskConfig::default()
    }

    #[test]
    fn neutral_snapshot_is_clean() {
        let result = SuspicionClassifier::rules_only(&config()).classify(&neutral());
        assert!(!result.suspicious);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.should_suspend);
        assert_eq!(result.security_score, 100);
        assert_eq!(result.label, "No");
    }

    #[test]
    fn each_rule_fires_alone() {
        let engine = RuleEngine::new(TransactionConfig::default());
        let cases = [
            (BehavioralSnapshot { report_count: 5, days_since_last_report: 14, ..neutral() },
             SuspicionRule::ReportBurst),
            (BehavioralSnapshot { report_frequency: 1.01, ..neutral() },
             SuspicionRule::HighReportFrequency),
            (BehavioralSnapshot { account_age_days: 59, receipt_count: 101, ..neutral() },
             SuspicionRule::NewAccountVolume),
            (BehavioralSnapshot { account_age_days: 89, total_received_amount: 100_000.01, ..neutral() },
             SuspicionRule::NewAccountValue),
        ];
        for (snapshot, rule) in cases {
            assert_eq!(engine.fired_rules(&snapshot), vec![rule]);
        }
    }

    #[test]
    fn confidence_is_max_of_fired_rules() {
        let snapshot = BehavioralSnapshot {
            report_count: 6,
            days_since_last_report: 3,
            report_frequency: 0.4,
            account_age_days: 30,
            total_received_amount: 250_000.0,
            ..neutral()
        };
        let c = RuleEngine::new(TransactionConfig::default()).evaluate(&snapshot);
        assert!(c.suspicious);
        assert_eq!(c.confidence, 0.90);
        assert_eq!(c.fired_rules.len(), 3);
    }

    #[test]
    fn boundaries_do_not_fire() {
        let engine = RuleEngine::new(TransactionConfig::default());
        let at_limits = BehavioralSnapshot {
            report_count: 4,
            days_since_last_report: 15,
            report_frequency: 1.0,
            receipt_count: 100,
            total_received_amount: 100_000.0,
            account_age_days: 60,
        };
        assert!(engine.fired_rules(&at_limits).is_empty());
    }

    #[test]
    fn security_score_subtracts_each_penalty() {
        let s = ScoreConfig::default();
        let l = TransactionConfig::default();
        // 2 reports, 0.75/day, last report 5 days ago.
        let snapshot = BehavioralSnapshot {
            report_count: 2,
            days_since_last_report: 5,
            report_frequency: 0.75,
            ..neutral()
        };
        // 100 - 16 - trunc(0.75 * 7.5 = 5.625) - (15 - 5) / 2
        assert_eq!(security_score(&snapshot, &s, &l), 100 - 16 - 5 - 5);

        let heavy = BehavioralSnapshot {
            report_count: 6,
            days_since_last_report: 1,
            report_frequency: 2.0,
            receipt_count: 150,
            total_received_amount: 200_000.0,
            account_age_days: 10,
        };
        assert_eq!(security_score(&heavy, &s, &l), 0);
    }

    #[test]
    fn security_score_ignores_classification_outcome() {
        let snapshot = BehavioralSnapshot { report_count: 1, ..neutral() };
        let rules = SuspicionClassifier::rules_only(&config()).classify(&snapshot);
        let model = SuspicionClassifier::with_model(&config(), Box::new(AlwaysYes)).classify(&snapshot);
        assert_ne!(rules.suspicious, model.suspicious);
        assert_eq!(rules.security_score, model.security_score);
        assert_eq!(model.security_score, 92);
    }

    struct AlwaysYes;

    impl ExternalModel for AlwaysYes {
        fn name(&self) -> &str {
            "always-yes"
        }
        fn predict(&self, _features: &[f64; 6]) -> anyhow::Result<ModelPrediction> {
            Ok(ModelPrediction { label: "Yes".into(), probabilities: [0.2, 0.8] })
        }
    }
}
