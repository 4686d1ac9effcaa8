//! Classifier integration tests: rule engine verdicts and model fallback.

use pix_risk_core::{
    config::RiskConfig,
    suspicion_classifier::{
        BehavioralSnapshot, ClassificationMethod, ExternalModel, ModelPrediction, SuspicionClassifier,
        SuspicionRule,
    },
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn neutral() -> BehavioralSnapshot {
    BehavioralSnapshot {
        report_count:           0,
        days_since_last_report: 180,
        report_frequency:       0.0,
        receipt_count:          12,
        total_received_amount:  2_400.0,
        account_age_days:       720,
    }
}

/// Six reports, the last five days ago: R1 fires alone.
#[test]
fn recent_report_burst_is_suspicious() {
    let classifier = SuspicionClassifier::rules_only(&RiskConfig::default());
    let result = classifier.classify(&BehavioralSnapshot {
        report_count: 6,
        days_since_last_report: 5,
        ..neutral()
    });
    assert!(result.suspicious);
    assert_eq!(result.confidence, 0.85);
    assert!(result.should_suspend);
    assert_eq!(result.method, ClassificationMethod::Rules);
    assert_eq!(result.fired_rules, vec![SuspicionRule::ReportBurst]);
    assert_eq!(result.label, "Yes");
    // 100 - 6*8 - (15 - 5) / 2
    assert_eq!(result.security_score, 47);
}

/// Sustained reporting alone (0.70) reaches the default suspension threshold.
#[test]
fn suspension_threshold_is_inclusive() {
    let classifier = SuspicionClassifier::rules_only(&RiskConfig::default());
    let result = classifier.classify(&BehavioralSnapshot {
        report_count: 5,
        days_since_last_report: 40,
        report_frequency: 0.35,
        ..neutral()
    });
    assert_eq!(result.fired_rules, vec![SuspicionRule::SustainedReporting]);
    assert_eq!(result.confidence, 0.70);
    assert!(result.should_suspend);

    let mut strict = RiskConfig::default();
    strict.classifier.confidence_threshold = 0.8;
    let result = SuspicionClassifier::rules_only(&strict).classify(&BehavioralSnapshot {
        report_count: 5,
        days_since_last_report: 40,
        report_frequency: 0.35,
        ..neutral()
    });
    assert!(result.suspicious && !result.should_suspend);
}

struct CountingModel {
    calls: Arc<AtomicUsize>,
    fail:  bool,
}

impl ExternalModel for CountingModel {
    fn name(&self) -> &str {
        "counting"
    }

    fn predict(&self, features: &[f64; 6]) -> anyhow::Result<ModelPrediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("model crashed");
        }
        let label = if features[0] >= 3.0 { "Yes" } else { "No" };
        Ok(ModelPrediction { label: label.into(), probabilities: [0.35, 0.65] })
    }
}

/// A healthy model answers; confidence is the larger probability.
#[test]
fn model_answers_when_available() {
    let calls = Arc::new(AtomicUsize::new(0));
    let classifier = SuspicionClassifier::with_model(
        &RiskConfig::default(),
        Box::new(CountingModel { calls: calls.clone(), fail: false }),
    );
    let result = classifier.classify(&BehavioralSnapshot { report_count: 3, ..neutral() });
    assert_eq!(result.method, ClassificationMethod::Model);
    assert!(result.suspicious);
    assert_eq!(result.confidence, 0.65);
    assert!(!result.should_suspend);
    assert!(result.fired_rules.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(classifier.model_active());
}

/// One model failure switches to rules for good; the model is never called again.
#[test]
fn model_failure_falls_back_permanently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let classifier = SuspicionClassifier::with_model(
        &RiskConfig::default(),
        Box::new(CountingModel { calls: calls.clone(), fail: true }),
    );
    for _ in 0..5 {
        let result = classifier.classify(&neutral());
        assert_eq!(result.method, ClassificationMethod::Rules);
        assert!(!result.suspicious);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!classifier.model_active());
}

/// A loader that fails leaves the rule engine in charge from the start.
#[test]
fn failed_load_uses_rules() {
    let classifier = SuspicionClassifier::with_model_loader(&RiskConfig::default(), || {
        anyhow::bail!("model file missing")
    });
    assert!(!classifier.model_active());
    let result = classifier.classify(&BehavioralSnapshot { report_frequency: 1.5, ..neutral() });
    assert_eq!(result.method, ClassificationMethod::Rules);
    assert_eq!(result.confidence, 0.80);
}

/// Rule and model paths share one security score for the same input.
#[test]
fn security_score_is_path_independent() {
    let snapshot = BehavioralSnapshot {
        report_count: 2,
        days_since_last_report: 3,
        report_frequency: 2.0,
        ..neutral()
    };
    let rules = SuspicionClassifier::rules_only(&RiskConfig::default()).classify(&snapshot);
    let model = SuspicionClassifier::with_model(
        &RiskConfig::default(),
        Box::new(CountingModel { calls: Arc::new(AtomicUsize::new(0)), fail: false }),
    )
    .classify(&snapshot);
    // 100 - 2*8 - 2.0*15 - (15 - 3)/2
    assert_eq!(rules.security_score, 48);
    assert_eq!(rules.security_score, model.security_score);
}
