//! Synthetic demo population and transfer stream.
//!
//! RULE: everything here is a pure function of the seed.
//! Randomness comes from one Pcg64Mcg stream; the clock is a FixedClock
//! advanced by drawn gaps, so two runs with the same seed produce the
//! same decisions, reports and scores.

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use pix_risk_core::{
    clock::FixedClock,
    collaborator::AccountProfile,
    engine::RiskEngine,
    risk_gate::{Decision, GateAction},
    store::RiskStore,
    transaction::TransferRequest,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::BTreeMap;

/// Anchor customers, one per risk tier.
const ANCHORS: [(&str, i64); 4] = [
    ("critical", 15),
    ("high", 40),
    ("medium", 65),
    ("low", 85),
];

const FIRST_NAMES: [&str; 12] = [
    "Ana", "Bruno", "Carla", "Diego", "Elisa", "Felipe",
    "Gabriela", "Hugo", "Isabela", "João", "Larissa", "Marcos",
];

const LAST_NAMES: [&str; 10] = [
    "Silva", "Santos", "Oliveira", "Souza", "Lima",
    "Pereira", "Costa", "Rodrigues", "Almeida", "Nunes",
];

const DESCRIPTIONS: [&str; 6] = ["rent", "groceries", "dinner split", "invoice", "gift", ""];

/// Seeded generator for the demo.
pub struct DemoRng {
    inner: Pcg64Mcg,
}

impl DemoRng {
    pub fn new(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15) }
    }

    pub fn below(&mut self, n: usize) -> usize {
        self.inner.gen_range(0..n)
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.inner.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Heavy-tailed amount: most transfers are small, a few are large.
    pub fn pareto(&mut self, x_min: f64, alpha: f64) -> f64 {
        let u: f64 = self.inner.gen_range(1e-10..1.0);
        x_min * u.powf(-1.0 / alpha)
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len())]
    }
}

#[derive(Debug, Clone)]
pub struct DemoAccount {
    pub account_id:  String,
    pub customer_id: String,
}

/// Tallies of one demo run.
#[derive(Debug, Default)]
pub struct DemoOutcome {
    pub actions:    BTreeMap<&'static str, u64>,
    pub reports:    u64,
    pub blocked_by: BTreeMap<String, u64>,
}

impl DemoOutcome {
    fn record(&mut self, request: &TransferRequest, decision: &Decision) {
        *self.actions.entry(decision.action.as_str()).or_default() += 1;
        if decision.report_protocol.is_some() {
            self.reports += 1;
        }
        if decision.action == GateAction::Blocked {
            *self.blocked_by.entry(request.origin_account.clone()).or_default() += 1;
        }
    }
}

/// Register the anchors plus `extra` random customers and set their scores.
pub fn seed_population(
    engine: &RiskEngine,
    store: &RiskStore,
    rng: &mut DemoRng,
    extra: usize,
    now: NaiveDateTime,
) -> Result<Vec<DemoAccount>> {
    let mut accounts = Vec::new();
    let tiers = ANCHORS.iter().map(|&(tier, score)| (tier.to_string(), score));
    let randoms = (0..extra).map(|i| {
        let score = match rng.below(10) {
            0 => 20 + rng.below(11) as i64,
            1 | 2 => 31 + rng.below(20) as i64,
            3 | 4 | 5 => 51 + rng.below(20) as i64,
            _ => 71 + rng.below(30) as i64,
        };
        (format!("{i:03}"), score)
    });
    let population: Vec<(String, i64)> = tiers.chain(randoms).collect();

    for (tag, score) in population {
        let customer_id = format!("cust-{tag}");
        let account_id = format!("acc-{tag}");
        let opened_days = if rng.chance(0.2) { 5 + rng.below(50) } else { 90 + rng.below(1500) };
        store.insert_account(&AccountProfile {
            account_id:  account_id.clone(),
            customer_id: customer_id.clone(),
            holder_name: format!("{} {}", rng.pick(&FIRST_NAMES), rng.pick(&LAST_NAMES)),
            opened_at:   now - Duration::days(opened_days as i64),
        })?;
        engine.set_score(&customer_id, score);
        accounts.push(DemoAccount { account_id, customer_id });
    }
    log::info!("demo: seeded {} accounts", accounts.len());
    Ok(accounts)
}

/// Push `count` random transfers through the gate, advancing the clock
/// between them.
pub fn run_transfers(
    engine: &RiskEngine,
    clock: &FixedClock,
    rng: &mut DemoRng,
    accounts: &[DemoAccount],
    count: u64,
) -> Result<DemoOutcome> {
    let mut outcome = DemoOutcome::default();
    if accounts.len() < 2 {
        log::warn!("demo: fewer than two accounts, no transfers to run");
        return Ok(outcome);
    }

    for n in 0..count {
        let origin = rng.below(accounts.len());
        let mut destination = rng.below(accounts.len() - 1);
        if destination >= origin {
            destination += 1;
        }
        let gap = if rng.chance(0.1) { 1 + rng.below(20) } else { 60 + rng.below(7_200) };
        let requested_at = clock.advance(Duration::seconds(gap as i64));
        let amount = (rng.pareto(15.0, 1.3).min(60_000.0) * 100.0).round() / 100.0;

        let request = TransferRequest {
            transaction_id:      format!("demo-{n:06}"),
            origin_account:      accounts[origin].account_id.clone(),
            destination_account: accounts[destination].account_id.clone(),
            amount,
            description:         rng.pick(&DESCRIPTIONS).to_string(),
            requested_at,
        };
        let decision = engine.evaluate(&request)?;
        outcome.record(&request, &decision);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pix_risk_core::config::RiskConfig;
    use std::sync::Arc;

    fn start() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 1, 6).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn run(seed: u64) -> (DemoOutcome, Vec<(String, u8)>) {
        let clock = Arc::new(FixedClock::new(start()));
        let store = Arc::new(RiskStore::in_memory().unwrap());
        let engine = RiskEngine::build(RiskConfig::default(), store.clone(), clock.clone(), None).unwrap();
        let mut rng = DemoRng::new(seed);
        let accounts = seed_population(&engine, &store, &mut rng, 12, start()).unwrap();
        let outcome = run_transfers(&engine, &clock, &mut rng, &accounts, 80).unwrap();
        let scores = engine.ledger().snapshot().into_iter().map(|r| (r.customer_id, r.score)).collect();
        (outcome, scores)
    }

    /// Same seed, same run.
    #[test]
    fn runs_are_reproducible() {
        let (a, scores_a) = run(7);
        let (b, scores_b) = run(7);
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.reports, b.reports);
        assert_eq!(scores_a, scores_b);
        assert_eq!(a.actions.values().sum::<u64>(), 80);
    }

    /// The critical anchor never gets a transfer through.
    #[test]
    fn critical_anchor_is_always_blocked() {
        let clock = Arc::new(FixedClock::new(start()));
        let store = Arc::new(RiskStore::in_memory().unwrap());
        let engine = RiskEngine::build(RiskConfig::default(), store.clone(), clock.clone(), None).unwrap();
        let mut rng = DemoRng::new(99);
        let accounts = seed_population(&engine, &store, &mut rng, 0, start()).unwrap();
        let outcome = run_transfers(&engine, &clock, &mut rng, &accounts, 40).unwrap();
        assert_eq!(accounts.len(), 4);
        assert!(outcome.actions.get("APPROVED").is_none());
        assert!(outcome.actions.get("BLOCKED").copied().unwrap_or(0) > 0);
    }
}
