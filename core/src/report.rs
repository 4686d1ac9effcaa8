//! Fraud reports: catalogue, lifecycle and filing.
//!
//! RULE: every filed report moves a score.
//! `ReportDesk::file` is the only way a report enters the system, and a
//! successful filing always applies `score.reducaoDenuncia` to the
//! customer owning the target account. A failed filing applies nothing.

use crate::{
    clock::Clock,
    collaborator::{audit, AccountDirectory, AuditTrail, ReportSink},
    error::{RiskError, RiskResult},
    event::RiskEvent,
    score_ledger::ScoreLedger,
    types::{AccountId, CustomerId, Score, TransactionId},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ── Scam catalogue ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ScamCategory {
    Relationship,
    Financial,
    Identity,
    Commercial,
    Technological,
    Prize,
    Government,
    Social,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ScamSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ScamSeverity {
    pub fn level(&self) -> u8 {
        match self {
            ScamSeverity::Low      => 1,
            ScamSeverity::Medium   => 2,
            ScamSeverity::High     => 3,
            ScamSeverity::Critical => 4,
        }
    }

    pub fn default_priority(&self) -> ReportPriority {
        match self {
            ScamSeverity::Low      => ReportPriority::Low,
            ScamSeverity::Medium   => ReportPriority::Medium,
            ScamSeverity::High     => ReportPriority::High,
            ScamSeverity::Critical => ReportPriority::Urgent,
        }
    }
}

/// Known instant-payment scam patterns. Order matches `SCAM_TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ScamType {
    FakeKidnapping,
    RelativeInNeed,
    Romance,
    IntimateBlackmail,
    FakeInvestment,
    FakeBetting,
    FakeLoan,
    FakeCreditCard,
    FakeConsortium,
    CelebrityImpersonation,
    FakeBankEmployee,
    FakeGovernmentEmployee,
    FakeLawyer,
    FakeSale,
    FakeDelivery,
    FakeMarketplace,
    FakeRental,
    Phishing,
    MessagingCloning,
    FakeApp,
    MaliciousQrCode,
    FakePrizeDraw,
    FakePrize,
    FakeRaffle,
    FakeEmergencyAid,
    FakeFine,
    FakeDonation,
    Other,
}

#[derive(Debug, Serialize)]
pub struct ScamInfo {
    pub scam:        ScamType,
    pub code:        &'static str,
    pub name:        &'static str,
    pub description: &'static str,
    pub category:    ScamCategory,
    pub severity:    ScamSeverity,
}

macro_rules! scam {
    ($scam:ident, $code:literal, $name:literal, $desc:literal, $cat:ident, $sev:ident) => {
        ScamInfo {
            scam:        ScamType::$scam,
            code:        $code,
            name:        $name,
            description: $desc,
            category:    ScamCategory::$cat,
            severity:    ScamSeverity::$sev,
        }
    };
}

pub static SCAM_TABLE: [ScamInfo; 28] = [
    scam!(FakeKidnapping, "SEQ001", "Fake kidnapping",
          "Caller poses as a kidnapper and demands a ransom transfer", Relationship, Critical),
    scam!(RelativeInNeed, "PAR001", "Relative in need",
          "Caller poses as a family member in an emergency asking for money", Relationship, High),
    scam!(Romance, "NAM001", "Online romance",
          "Fake relationship built to request transfers", Relationship, Medium),
    scam!(IntimateBlackmail, "CHA001", "Intimate blackmail",
          "Threat to leak intimate content unless paid", Relationship, Critical),
    scam!(FakeInvestment, "INV001", "Fake investment",
          "Promise of outsized returns paid in by instant transfer", Financial, High),
    scam!(FakeBetting, "APO001", "Fake betting house",
          "Betting platform that never allows withdrawals", Financial, High),
    scam!(FakeLoan, "EMP001", "Fake loan",
          "Loan offer that requires an up-front fee or deposit", Financial, Medium),
    scam!(FakeCreditCard, "CAR001", "Fake credit card",
          "Card offer that charges a sign-up fee", Financial, Medium),
    scam!(FakeConsortium, "CON001", "Fake consortium",
          "Pre-awarded consortium letter sold for a transfer", Financial, Medium),
    scam!(CelebrityImpersonation, "FAM001", "Celebrity impersonation",
          "Scammer poses as a celebrity or influencer", Identity, Medium),
    scam!(FakeBankEmployee, "BAN001", "Fake bank employee",
          "Scammer poses as bank staff asking for a transfer", Identity, High),
    scam!(FakeGovernmentEmployee, "GOV001", "Fake government employee",
          "Scammer poses as a public official demanding payment", Identity, High),
    scam!(FakeLawyer, "ADV001", "Fake lawyer",
          "Scammer poses as a lawyer charging fees", Identity, Medium),
    scam!(FakeSale, "VEN001", "Fake sale",
          "Product or service that does not exist", Commercial, Medium),
    scam!(FakeDelivery, "ENT001", "Fake delivery",
          "Fake courier charging an extra delivery fee", Commercial, Low),
    scam!(FakeMarketplace, "MAR001", "Fake marketplace",
          "Online shop that only accepts instant transfers", Commercial, Medium),
    scam!(FakeRental, "ALU001", "Fake rental",
          "Property listing that asks for a deposit", Commercial, Medium),
    scam!(Phishing, "PHI001", "Phishing",
          "Fake link that captures banking credentials", Technological, High),
    scam!(MessagingCloning, "WHT001", "Messaging account cloning",
          "Cloned messaging account asks contacts for money", Technological, High),
    scam!(FakeApp, "APP001", "Fake app",
          "Fraudulent app that initiates transfers", Technological, High),
    scam!(MaliciousQrCode, "QRC001", "Malicious QR code",
          "QR code that points to a fraudulent payee", Technological, Medium),
    scam!(FakePrizeDraw, "SOR001", "Fake prize draw",
          "Prize draw that asks for a fee to release the prize", Prize, Medium),
    scam!(FakePrize, "PRE001", "Fake prize",
          "Prize notification that requires a payment", Prize, Medium),
    scam!(FakeRaffle, "RIF001", "Fake raffle",
          "Raffle that does not exist", Prize, Low),
    scam!(FakeEmergencyAid, "AUX001", "Fake emergency aid",
          "Government aid offer that requires a payment", Government, High),
    scam!(FakeFine, "MUL001", "Fake fine",
          "Collection of a fine that does not exist", Government, Medium),
    scam!(FakeDonation, "DOA001", "Fake donation",
          "Donation request for a cause that does not exist", Social, Low),
    scam!(Other, "OUT001", "Other",
          "Scam not covered by the other categories", Other, Medium),
];

impl ScamType {
    pub fn info(&self) -> &'static ScamInfo {
        &SCAM_TABLE[*self as usize]
    }

    pub fn code(&self) -> &'static str {
        self.info().code
    }

    pub fn severity(&self) -> ScamSeverity {
        self.info().severity
    }

    pub fn category(&self) -> ScamCategory {
        self.info().category
    }

    /// Unknown codes map to `Other`.
    pub fn from_code(code: &str) -> Self {
        SCAM_TABLE
            .iter()
            .find(|info| info.code.eq_ignore_ascii_case(code.trim()))
            .map(|info| info.scam)
            .unwrap_or(ScamType::Other)
    }

    pub fn all() -> impl Iterator<Item = ScamType> {
        SCAM_TABLE.iter().map(|info| info.scam)
    }
}

/// Catalogue entries matching both filters, in table order. `None` matches all.
pub fn catalogue(
    category: Option<ScamCategory>,
    severity: Option<ScamSeverity>,
) -> impl Iterator<Item = &'static ScamInfo> {
    SCAM_TABLE.iter().filter(move |info| {
        category.map_or(true, |c| info.category == c) && severity.map_or(true, |s| info.severity == s)
    })
}

/// How the scam catalogue spreads over categories and severities.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CatalogueStats {
    pub total:       usize,
    pub by_category: BTreeMap<ScamCategory, usize>,
    pub by_severity: BTreeMap<ScamSeverity, usize>,
}

pub fn catalogue_stats() -> CatalogueStats {
    let mut stats = CatalogueStats {
        total:       SCAM_TABLE.len(),
        by_category: BTreeMap::new(),
        by_severity: BTreeMap::new(),
    };
    for info in &SCAM_TABLE {
        *stats.by_category.entry(info.category).or_default() += 1;
        *stats.by_severity.entry(info.severity).or_default() += 1;
    }
    stats
}

impl From<ScamType> for String {
    fn from(s: ScamType) -> String {
        s.code().to_string()
    }
}

impl From<String> for ScamType {
    fn from(code: String) -> Self {
        ScamType::from_code(&code)
    }
}

// ── Report metadata ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ReportType {
    /// Filed by the gate on a critical-score transfer.
    AutoCritical,
    /// Filed by the gate on a high-risk transfer.
    AutoHighRisk,
    /// Filed by a person, classified by scam pattern.
    Scam(ScamType),
}

impl ReportType {
    pub fn code(&self) -> &'static str {
        match self {
            ReportType::AutoCritical => "AUTO_CRITICAL",
            ReportType::AutoHighRisk => "AUTO_HIGH_RISK",
            ReportType::Scam(s)      => s.code(),
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "AUTO_CRITICAL"  => ReportType::AutoCritical,
            "AUTO_HIGH_RISK" => ReportType::AutoHighRisk,
            other            => ReportType::Scam(ScamType::from_code(other)),
        }
    }

    pub fn is_automatic(&self) -> bool {
        !matches!(self, ReportType::Scam(_))
    }

    pub fn default_priority(&self) -> ReportPriority {
        match self {
            ReportType::AutoCritical => ReportPriority::Urgent,
            ReportType::AutoHighRisk => ReportPriority::High,
            ReportType::Scam(s)      => s.severity().default_priority(),
        }
    }
}

impl From<ReportType> for String {
    fn from(t: ReportType) -> String {
        t.code().to_string()
    }
}

impl From<String> for ReportType {
    fn from(code: String) -> Self {
        ReportType::from_code(&code)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl ReportPriority {
    pub const ALL: [ReportPriority; 4] =
        [ReportPriority::Low, ReportPriority::Medium, ReportPriority::High, ReportPriority::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPriority::Low    => "LOW",
            ReportPriority::Medium => "MEDIUM",
            ReportPriority::High   => "HIGH",
            ReportPriority::Urgent => "URGENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW"    => Some(ReportPriority::Low),
            "MEDIUM" => Some(ReportPriority::Medium),
            "HIGH"   => Some(ReportPriority::High),
            "URGENT" => Some(ReportPriority::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    InReview,
    Resolved,
    Archived,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] =
        [ReportStatus::Pending, ReportStatus::InReview, ReportStatus::Resolved, ReportStatus::Archived];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending  => "PENDING",
            ReportStatus::InReview => "IN_REVIEW",
            ReportStatus::Resolved => "RESOLVED",
            ReportStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING"   => Some(ReportStatus::Pending),
            "IN_REVIEW" => Some(ReportStatus::InReview),
            "RESOLVED"  => Some(ReportStatus::Resolved),
            "ARCHIVED"  => Some(ReportStatus::Archived),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Pending, InReview)
                | (Pending, Archived)
                | (InReview, Resolved)
                | (InReview, Archived)
                | (InReview, Pending)
                | (Resolved, Archived)
        )
    }
}

// ── Report records ─────────────────────────────────────────────────

/// A report about to be filed. The sink assigns id and protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewReport {
    pub target_account: AccountId,
    pub transaction_id: Option<TransactionId>,
    pub reason:         String,
    pub report_type:    ReportType,
    pub priority:       ReportPriority,
    pub reporter:       Option<String>,
    pub created_at:     NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub id:             i64,
    pub protocol:       String,
    pub target_account: AccountId,
    pub transaction_id: Option<TransactionId>,
    pub reason:         String,
    pub report_type:    ReportType,
    pub priority:       ReportPriority,
    pub status:         ReportStatus,
    pub reporter:       Option<String>,
    pub created_at:     NaiveDateTime,
}

/// Counts of every report on file. Status and priority list every value,
/// zero included; types list only the codes that occur.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportBreakdown {
    pub total:       u64,
    pub by_status:   BTreeMap<String, u64>,
    pub by_type:     BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
}

/// `PROT-{millis % 100000}-{8 upper-case hex chars}`.
pub fn generate_protocol(now: NaiveDateTime) -> String {
    let millis = now.and_utc().timestamp_millis().rem_euclid(100_000);
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!("PROT-{millis}-{suffix}")
}

/// Report filed by a person through the operator console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManualReportRequest {
    pub target_account: AccountId,
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    pub reason:         String,
    /// Scam catalogue code; unknown or missing codes file as `OUT001`.
    #[serde(default)]
    pub scam_code:      Option<String>,
    #[serde(default)]
    pub priority:       Option<ReportPriority>,
    #[serde(default)]
    pub reporter:       Option<String>,
}

impl ManualReportRequest {
    pub fn validate(&self) -> RiskResult<()> {
        if self.target_account.trim().is_empty() {
            return Err(RiskError::validation("target_account", "must not be empty"));
        }
        let len = self.reason.trim().chars().count();
        if !(10..=1000).contains(&len) {
            return Err(RiskError::validation(
                "reason",
                format!("must be 10 to 1000 characters, got {len}"),
            ));
        }
        Ok(())
    }
}

// ── Report desk ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FiledReport {
    pub report:      Report,
    pub customer_id: CustomerId,
    pub new_score:   Score,
}

pub struct ReportDesk {
    sink:      Arc<dyn ReportSink>,
    directory: Arc<dyn AccountDirectory>,
    audit:     Arc<dyn AuditTrail>,
    ledger:    Arc<ScoreLedger>,
    clock:     Arc<dyn Clock>,
}

impl ReportDesk {
    pub fn new(
        sink: Arc<dyn ReportSink>,
        directory: Arc<dyn AccountDirectory>,
        audit: Arc<dyn AuditTrail>,
        ledger: Arc<ScoreLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { sink, directory, audit, ledger, clock }
    }

    /// Owner of `account_id`. Unknown accounts are scored under their own id.
    pub fn customer_for(&self, account_id: &str) -> CustomerId {
        match self.directory.account(account_id) {
            Ok(Some(profile)) => profile.customer_id,
            Ok(None) => {
                log::warn!("reports: account {account_id} unknown, scoring under account id");
                account_id.to_string()
            }
            Err(e) => {
                log::warn!("reports: account lookup for {account_id} failed ({e}), scoring under account id");
                account_id.to_string()
            }
        }
    }

    /// Persist `report`, then penalise the target's owner.
    pub fn file(&self, report: NewReport) -> RiskResult<FiledReport> {
        let now = self.clock.now();
        let stored = match self.sink.file_report(&report) {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!(
                    "reports: filing {} against {} failed: {e}",
                    report.report_type.code(),
                    report.target_account
                );
                audit(self.audit.as_ref(), now, RiskEvent::ReportFilingFailed {
                    target_account: report.target_account.clone(),
                    transaction_id: report.transaction_id.clone(),
                    reason:         e.to_string(),
                });
                return Err(RiskError::ReportFiling {
                    target: report.target_account,
                    reason: e.to_string(),
                });
            }
        };

        let customer_id = self.customer_for(&stored.target_account);
        let points = self.ledger.config().penalty_points();
        let new_score = self.ledger.apply_penalty(&customer_id, points);

        log::info!(
            "reports: {} filed against {} ({}), {customer_id} now at {new_score}",
            stored.protocol,
            stored.target_account,
            stored.report_type.code()
        );
        audit(self.audit.as_ref(), now, RiskEvent::ReportFiled {
            report_id:      stored.id,
            protocol:       stored.protocol.clone(),
            target_account: stored.target_account.clone(),
            report_type:    stored.report_type.code().to_string(),
            transaction_id: stored.transaction_id.clone(),
        });
        audit(self.audit.as_ref(), now, RiskEvent::PenaltyApplied {
            customer_id: customer_id.clone(),
            points,
            new_score,
        });

        Ok(FiledReport { report: stored, customer_id, new_score })
    }

    pub fn file_manual(&self, request: ManualReportRequest) -> RiskResult<FiledReport> {
        request.validate()?;
        let scam = request
            .scam_code
            .as_deref()
            .map(ScamType::from_code)
            .unwrap_or(ScamType::Other);
        let report_type = ReportType::Scam(scam);
        self.file(NewReport {
            target_account: request.target_account.trim().to_string(),
            transaction_id: request.transaction_id,
            reason:         request.reason.trim().to_string(),
            report_type,
            priority:       request.priority.unwrap_or_else(|| report_type.default_priority()),
            reporter:       request.reporter,
            created_at:     self.clock.now(),
        })
    }

    /// Move a report through its review lifecycle.
    pub fn transition(&self, report_id: i64, next: ReportStatus) -> RiskResult<Report> {
        let mut report = self
            .sink
            .report(report_id)?
            .ok_or_else(|| RiskError::not_found("report", report_id.to_string()))?;
        if !report.status.can_transition_to(next) {
            return Err(RiskError::validation(
                "status",
                format!("cannot move report {report_id} from {} to {}", report.status.as_str(), next.as_str()),
            ));
        }
        self.sink.set_report_status(report_id, next)?;
        audit(self.audit.as_ref(), self.clock.now(), RiskEvent::ReportStatusChanged {
            report_id,
            from: report.status.as_str().to_string(),
            to:   next.as_str().to_string(),
        });
        report.status = next;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn table_order_matches_enum() {
        for (i, info) in SCAM_TABLE.iter().enumerate() {
            assert_eq!(info.scam as usize, i, "{} out of place", info.code);
        }
        assert_eq!(ScamType::all().count(), 28);
    }

    #[test]
    fn catalogue_groups_by_category_and_severity() {
        let stats = catalogue_stats();
        assert_eq!(stats.total, 28);
        assert_eq!(stats.by_category.values().sum::<usize>(), 28);
        assert_eq!(stats.by_category[&ScamCategory::Technological], 4);
        assert_eq!(stats.by_category[&ScamCategory::Other], 1);
        assert_eq!(stats.by_severity[&ScamSeverity::Critical], 2);
        assert_eq!(stats.by_severity[&ScamSeverity::Low], 3);

        let codes: Vec<&str> = catalogue(Some(ScamCategory::Relationship), Some(ScamSeverity::Critical))
            .map(|info| info.code)
            .collect();
        assert_eq!(codes, vec!["SEQ001", "CHA001"]);
        assert_eq!(catalogue(None, None).count(), 28);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_category"]["financial"], 5);
        assert_eq!(json["by_severity"]["high"], 9);
    }

    #[test]
    fn codes_resolve_with_fallback() {
        assert_eq!(ScamType::from_code("SEQ001"), ScamType::FakeKidnapping);
        assert_eq!(ScamType::from_code("wht001"), ScamType::MessagingCloning);
        assert_eq!(ScamType::from_code("ZZZ999"), ScamType::Other);
        assert_eq!(ReportType::from_code("AUTO_HIGH_RISK"), ReportType::AutoHighRisk);
        assert_eq!(ReportType::from_code("PHI001"), ReportType::Scam(ScamType::Phishing));
    }

    #[test]
    fn severity_drives_default_priority() {
        assert_eq!(ReportType::Scam(ScamType::FakeKidnapping).default_priority(), ReportPriority::Urgent);
        assert_eq!(ReportType::Scam(ScamType::FakeRaffle).default_priority(), ReportPriority::Low);
        assert_eq!(ReportType::AutoCritical.default_priority(), ReportPriority::Urgent);
        assert_eq!(ReportType::AutoHighRisk.default_priority(), ReportPriority::High);
    }

    #[test]
    fn report_type_serializes_as_code() {
        let json = serde_json::to_string(&ReportType::Scam(ScamType::FakeFine)).unwrap();
        assert_eq!(json, r#""MUL001""#);
        let back: ReportType = serde_json::from_str(r#""AUTO_CRITICAL""#).unwrap();
        assert_eq!(back, ReportType::AutoCritical);
    }

    #[test]
    fn status_lifecycle() {
        use ReportStatus::*;
        assert!(Pending.can_transition_to(InReview));
        assert!(InReview.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Archived));
        assert!(!Resolved.can_transition_to(Pending));
        assert!(!Archived.can_transition_to(InReview));
        assert!(!Pending.can_transition_to(Resolved));
    }

    #[test]
    fn protocol_shape() {
        let now = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_milli_opt(12, 0, 1, 234).unwrap();
        let protocol = generate_protocol(now);
        let parts: Vec<&str> = protocol.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PROT");
        assert!(parts[1].parse::<u32>().unwrap() < 100_000);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn manual_reason_length_enforced() {
        let mut request = ManualReportRequest {
            target_account: "acc-1".into(),
            transaction_id: None,
            reason:         "too short".into(),
            scam_code:      None,
            priority:       None,
            reporter:       None,
        };
        assert!(request.validate().is_err());
        request.reason = "asked for a deposit then vanished".into();
        request.validate().unwrap();
        request.reason = "x".repeat(1001);
        assert!(request.validate().is_err());
    }
}
