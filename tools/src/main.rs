//! risk-runner: headless front end for the pix risk engine.
//!
//! Usage:
//!   risk-runner --seed 12345 --transfers 500 --db run.db
//!   risk-runner --config risk_config.json --ipc-mode

mod demo;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use pix_risk_core::{
    clock::{Clock, FixedClock, SystemClock},
    config::RiskConfig,
    engine::RiskEngine,
    report::{catalogue, ManualReportRequest, ReportStatus, ScamCategory, ScamSeverity},
    store::RiskStore,
    suspicion_classifier::BehavioralSnapshot,
    temporal_features::TemporalFeatureSet,
    transaction::{TransactionStatus, TransferRequest},
};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Random customers seeded on top of the four tier anchors.
const DEMO_EXTRA_CUSTOMERS: usize = 24;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Evaluate(TransferRequest),
    Classify(BehavioralSnapshot),
    ExtractFeatures {
        timestamps: Vec<NaiveDateTime>,
    },
    AnalyzeAccount {
        account_id: String,
        #[serde(default = "default_days")]
        days: i64,
    },
    FileReport(ManualReportRequest),
    TransitionReport {
        report_id: i64,
        status: ReportStatus,
    },
    ReportStats,
    Catalogue {
        #[serde(default)]
        category: Option<ScamCategory>,
        #[serde(default)]
        severity: Option<ScamSeverity>,
    },
    Score {
        #[serde(default)]
        customer_id: Option<String>,
        #[serde(default)]
        account_id: Option<String>,
    },
    Checkpoint,
    Quit,
}

fn default_days() -> i64 {
    30
}

#[derive(Serialize)]
struct FeaturesReply<'a> {
    features: &'a TemporalFeatureSet,
    band:     &'static str,
    findings: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let transfers = parse_arg(&args, "--transfers", 250u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config = match flag_value(&args, "--config") {
        Some(path) => RiskConfig::load(path)?,
        None => RiskConfig::default(),
    };

    let store = Arc::new(if db == ":memory:" {
        RiskStore::in_memory()?
    } else {
        RiskStore::open(db)?
    });

    if ipc_mode {
        let engine = RiskEngine::build(config, store, Arc::new(SystemClock), None)?;
        run_ipc_loop(&engine)?;
        engine.checkpoint()?;
        return Ok(());
    }

    println!("pix risk engine: risk-runner");
    println!("  seed:       {seed}");
    println!("  transfers:  {transfers}");
    println!("  db:         {db}");
    println!();

    let start = demo_start();
    let clock = Arc::new(FixedClock::new(start));
    let engine = RiskEngine::build(config, store.clone(), clock.clone(), None)?;
    let mut rng = demo::DemoRng::new(seed);
    let accounts = demo::seed_population(&engine, &store, &mut rng, DEMO_EXTRA_CUSTOMERS, start)?;
    let outcome = demo::run_transfers(&engine, &clock, &mut rng, &accounts, transfers)?;
    engine.checkpoint()?;
    print_summary(&engine, &store, &outcome, &accounts)?;
    Ok(())
}

fn demo_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 6)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .unwrap_or_default()
}

fn run_ipc_loop(engine: &RiskEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_command(engine, cmd) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("ipc: command failed: {e}");
                serde_json::json!({ "error": e.to_string() })
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(engine: &RiskEngine, cmd: IpcCommand) -> Result<serde_json::Value> {
    let value = match cmd {
        IpcCommand::Evaluate(request) => serde_json::to_value(engine.evaluate(&request)?)?,
        IpcCommand::Classify(snapshot) => serde_json::to_value(engine.classify(&snapshot))?,
        IpcCommand::ExtractFeatures { timestamps } => {
            features_reply(&engine.extract_features(&timestamps))?
        }
        IpcCommand::AnalyzeAccount { account_id, days } => {
            features_reply(&engine.analyze_account_timing(&account_id, days)?)?
        }
        IpcCommand::FileReport(request) => serde_json::to_value(engine.file_report(request)?)?,
        IpcCommand::TransitionReport { report_id, status } => {
            serde_json::to_value(engine.transition_report(report_id, status)?)?
        }
        IpcCommand::ReportStats => serde_json::json!({
            "reports":   engine.report_breakdown()?,
            "catalogue": engine.catalogue_stats(),
        }),
        IpcCommand::Catalogue { category, severity } => {
            serde_json::to_value(catalogue(category, severity).collect::<Vec<_>>())?
        }
        IpcCommand::Score { customer_id: Some(customer), .. } => {
            serde_json::to_value(engine.score_of(&customer))?
        }
        IpcCommand::Score { account_id: Some(account), .. } => {
            serde_json::to_value(engine.score_of_account(&account))?
        }
        IpcCommand::Score { .. } => anyhow::bail!("score needs customer_id or account_id"),
        IpcCommand::Checkpoint => serde_json::json!({ "records": engine.checkpoint()? }),
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn features_reply(features: &TemporalFeatureSet) -> Result<serde_json::Value> {
    let reply = FeaturesReply {
        features,
        band:     features.risk_band().as_str(),
        findings: features.findings().iter().map(|f| f.describe()).collect(),
    };
    Ok(serde_json::to_value(reply)?)
}

fn print_summary(
    engine: &RiskEngine,
    store: &RiskStore,
    outcome: &demo::DemoOutcome,
    accounts: &[demo::DemoAccount],
) -> Result<()> {
    println!("=== RUN SUMMARY ===");
    println!("  accounts:        {}", accounts.len());
    println!("  decisions:       {}", store.decision_count()?);
    for (action, count) in &outcome.actions {
        println!("    {action:<24} {count}");
    }
    println!("  committed:       {}", store.transaction_count(None)?);
    for status in [TransactionStatus::Completed, TransactionStatus::Suspicious, TransactionStatus::Blocked] {
        println!("    {:<24} {}", status.as_str(), store.transaction_count(Some(status))?);
    }
    println!("  auto reports:    {}", outcome.reports);
    println!("  reports on file: {}", store.report_count()?);
    println!("  audit events:    {}", store.event_count(None)?);
    println!("  final clock:     {}", engine.clock().now());

    println!();
    println!("=== LOWEST SCORES ===");
    let mut records = engine.ledger().snapshot();
    records.sort_by_key(|r| (r.score, r.customer_id.clone()));
    for r in records.iter().take(8) {
        println!(
            "  {:<12} score {:>3}  {:<9} reports {:>3}  transfers {:>4}  volume {:>12.2}",
            r.customer_id,
            r.score,
            r.account_status.as_str(),
            r.total_reports,
            r.total_transactions,
            r.total_amount
        );
    }

    if !outcome.blocked_by.is_empty() {
        println!();
        println!("=== MOST BLOCKED ORIGINS ===");
        let mut blocked: Vec<_> = outcome.blocked_by.iter().collect();
        blocked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (account, count) in blocked.into_iter().take(5) {
            let timing = engine.analyze_account_timing(account, 30)?;
            println!(
                "  {account:<12} blocked {count:>3}  temporal score {:>3} ({})",
                timing.temporal_risk_score,
                timing.risk_band().as_str()
            );
        }
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
