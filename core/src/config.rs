//! Engine configuration.
//!
//! Built once at startup (from JSON or defaults) and handed to each
//! component's constructor. Nothing reads configuration from a global.
//! Key names follow the operator-facing file format (`score.inicial`,
//! `transacao.valorAlto`, `ia.limiteConfianca`, ...).

use crate::{
    error::{RiskError, RiskResult},
    types::Score,
};
use serde::{Deserialize, Serialize};

// ── Score section ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreConfig {
    /// Score given to a customer on first reference.
    #[serde(rename = "inicial")]
    pub initial: i64,
    /// Points removed per filed report.
    #[serde(rename = "reducaoDenuncia")]
    pub report_penalty: i64,
    /// Below this the account is Blocked.
    #[serde(rename = "limiteRiscoAlto")]
    pub high_risk_limit: i64,
    /// Below this the account is Monitored.
    #[serde(rename = "limiteRiscoMedio")]
    pub medium_risk_limit: i64,
    #[serde(rename = "penalizacaoFrequencia")]
    pub frequency_penalty: i64,
    /// Divisor applied to the report-recency gap.
    #[serde(rename = "penalizacaoTempo")]
    pub recency_divisor: i64,
    #[serde(rename = "penalizacaoContaNova")]
    pub new_account_volume_penalty: i64,
    #[serde(rename = "penalizacaoValorAlto")]
    pub new_account_value_penalty: i64,
    #[serde(rename = "penalizacaoPadrao")]
    pub pattern_penalty: i64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            initial: 100,
            report_penalty: 8,
            high_risk_limit: 40,
            medium_risk_limit: 70,
            frequency_penalty: 15,
            recency_divisor: 2,
            new_account_volume_penalty: 20,
            new_account_value_penalty: 25,
            pattern_penalty: 20,
        }
    }
}

impl ScoreConfig {
    pub fn initial_score(&self) -> Score {
        crate::types::clamp_score(self.initial)
    }

    pub fn penalty_points(&self) -> u32 {
        self.report_penalty.max(0) as u32
    }
}

// ── Transaction / history section ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransactionConfig {
    /// Transfers above this are flagged as high value.
    #[serde(rename = "valorAlto")]
    pub high_value_amount: f64,
    /// Look-back window for report and receipt history.
    #[serde(rename = "diasAnaliseHistorico")]
    pub history_window_days: i64,
    /// Recency assumed when an account has never been reported.
    #[serde(rename = "tempoEntreDenunciasSeguro")]
    pub safe_report_gap_days: i64,
    #[serde(rename = "tempoEntreDenunciasSuspeito")]
    pub suspicious_report_gap_days: i64,
    #[serde(rename = "limiteFrequenciaDenunciaAlta")]
    pub high_report_frequency: f64,
    #[serde(rename = "limiteFrequenciaDenunciaMedia")]
    pub medium_report_frequency: f64,
    #[serde(rename = "diasContaNova")]
    pub new_account_days: i64,
    #[serde(rename = "limiteRecebimentosContaNova")]
    pub new_account_receipt_limit: i64,
    #[serde(rename = "valorLimiteContaNova")]
    pub new_account_value_limit: f64,
    #[serde(rename = "diasContaNovaValorAlto")]
    pub new_account_value_days: i64,
    #[serde(rename = "limiteDenunciasPadrao")]
    pub pattern_report_count: i64,
    #[serde(rename = "limiteFrequenciaPadrao")]
    pub pattern_report_frequency: f64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            high_value_amount: 10_000.0,
            history_window_days: 30,
            safe_report_gap_days: 180,
            suspicious_report_gap_days: 15,
            high_report_frequency: 1.0,
            medium_report_frequency: 0.5,
            new_account_days: 60,
            new_account_receipt_limit: 100,
            new_account_value_limit: 100_000.0,
            new_account_value_days: 90,
            pattern_report_count: 5,
            pattern_report_frequency: 0.3,
        }
    }
}

// ── Classifier section ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum confidence for a suspicious verdict to suspend a transfer.
    #[serde(rename = "limiteConfianca")]
    pub confidence_threshold: f64,
    /// Informational name of the external model.
    #[serde(rename = "modelo")]
    pub model_name: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            model_name: "J48".into(),
        }
    }
}

// ── Gate section ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub critical_score: i64,
    pub high_score: i64,
    pub medium_score: i64,
    /// Mid-risk transfers above this wait for an analyst.
    pub manual_approval_amount: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            critical_score: 30,
            high_score: 50,
            medium_score: 70,
            manual_approval_amount: 1_000.0,
        }
    }
}

// ── Root ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub score: ScoreConfig,
    #[serde(rename = "transacao")]
    pub transaction: TransactionConfig,
    #[serde(rename = "ia")]
    pub classifier: ClassifierConfig,
    pub gate: GateConfig,
}

impl RiskConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: RiskConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> RiskResult<Self> {
        let config: RiskConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks on every tunable, plus threshold ordering.
    pub fn validate(&self) -> RiskResult<()> {
        let s = &self.score;
        check_range("score.inicial", s.initial, 0, 100)?;
        check_range("score.reducaoDenuncia", s.report_penalty, 1, 50)?;
        check_range("score.limiteRiscoAlto", s.high_risk_limit, 0, 100)?;
        check_range("score.limiteRiscoMedio", s.medium_risk_limit, 0, 100)?;
        check_range("score.penalizacaoFrequencia", s.frequency_penalty, 1, 50)?;
        check_range("score.penalizacaoTempo", s.recency_divisor, 1, 50)?;
        check_range("score.penalizacaoContaNova", s.new_account_volume_penalty, 1, 100)?;
        check_range("score.penalizacaoValorAlto", s.new_account_value_penalty, 1, 100)?;
        check_range("score.penalizacaoPadrao", s.pattern_penalty, 1, 100)?;
        if s.high_risk_limit > s.medium_risk_limit {
            return Err(RiskError::validation(
                "score.limiteRiscoAlto",
                "must not exceed score.limiteRiscoMedio",
            ));
        }

        let t = &self.transaction;
        check_min_f64("transacao.valorAlto", t.high_value_amount, 100.0)?;
        check_range("transacao.diasAnaliseHistorico", t.history_window_days, 1, 365)?;
        check_range("transacao.tempoEntreDenunciasSeguro", t.safe_report_gap_days, 1, 180)?;
        check_range("transacao.tempoEntreDenunciasSuspeito", t.suspicious_report_gap_days, 1, 90)?;
        check_range_f64("transacao.limiteFrequenciaDenunciaAlta", t.high_report_frequency, 0.1, 5.0)?;
        check_range_f64("transacao.limiteFrequenciaDenunciaMedia", t.medium_report_frequency, 0.1, 5.0)?;
        check_range("transacao.diasContaNova", t.new_account_days, 1, 365)?;
        check_range("transacao.limiteRecebimentosContaNova", t.new_account_receipt_limit, 10, 1000)?;
        check_min_f64("transacao.valorLimiteContaNova", t.new_account_value_limit, 1000.0)?;
        check_range("transacao.diasContaNovaValorAlto", t.new_account_value_days, 1, 365)?;
        check_range("transacao.limiteDenunciasPadrao", t.pattern_report_count, 1, 50)?;
        check_range_f64("transacao.limiteFrequenciaPadrao", t.pattern_report_frequency, 0.1, 1.0)?;

        check_range_f64("ia.limiteConfianca", self.classifier.confidence_threshold, 0.01, 0.99)?;

        let g = &self.gate;
        check_range("gate.critical_score", g.critical_score, 0, 100)?;
        check_range("gate.high_score", g.high_score, 0, 100)?;
        check_range("gate.medium_score", g.medium_score, 0, 100)?;
        if !(g.critical_score < g.high_score && g.high_score < g.medium_score) {
            return Err(RiskError::validation(
                "gate",
                "thresholds must satisfy critical < high < medium",
            ));
        }
        check_min_f64("gate.manual_approval_amount", g.manual_approval_amount, 0.0)?;
        Ok(())
    }
}

fn check_range(field: &str, value: i64, min: i64, max: i64) -> RiskResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(RiskError::validation(field, format!("{value} outside [{min}, {max}]")))
    }
}

fn check_range_f64(field: &str, value: f64, min: f64, max: f64) -> RiskResult<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(RiskError::validation(field, format!("{value} outside [{min}, {max}]")))
    }
}

fn check_min_f64(field: &str, value: f64, min: f64) -> RiskResult<()> {
    if value.is_finite() && value >= min {
        Ok(())
    } else {
        Err(RiskError::validation(field, format!("{value} below {min}")))
    }
}
