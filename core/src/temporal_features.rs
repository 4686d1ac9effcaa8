//! Temporal behaviour features over a set of transfer timestamps.
//!
//! RULE: pure function of its input.
//! No clock, no store, no configuration. Input order does not matter;
//! timestamps are sorted before any interval is measured.
//!
//! The score rewards signs of automation: night-time activity, tight
//! bursts, clock-aligned timestamps and low hour entropy. Transfers in
//! commercial hours pull it back down. An empty history scores 0.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ── Thresholds ─────────────────────────────────────────────────────

const MADRUGADA_HOURS:  std::ops::RangeInclusive<u32> = 0..=5;
const COMMERCIAL_HOURS: std::ops::RangeInclusive<u32> = 8..=18;
const NIGHT_HOURS:      std::ops::RangeInclusive<u32> = 19..=23;

const VERY_FAST_SECS:   i64 = 10;
const FAST_SECS:        i64 = 60;
const QUICK_SECS:       i64 = 300;
const BURST_GAP_SECS:   i64 = 30;
const BURST_MIN_RUN:    u32 = 3;

const MONTH_START_LAST_DAY: u32 = 5;
const MONTH_END_FIRST_DAY:  u32 = 25;

const MINUTE_CONCENTRATION: f64 = 0.30;
const SECOND_CONCENTRATION: f64 = 0.40;
const LOW_ENTROPY:          f64 = 0.5;
const DEFAULT_HOUR:         u32 = 12;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Fixed-date national holidays as (month, day).
const HOLIDAYS: [(u32, u32); 7] = [
    (1, 1),
    (4, 21),
    (9, 7),
    (10, 12),
    (11, 2),
    (11, 15),
    (12, 25),
];

// ── Output ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourProfile {
    pub histogram:        [u32; 24],
    pub predominant_hour: u32,
    pub mean_hour:        f64,
    pub std_dev_hour:     f64,
    pub pct_madrugada:    f64,
    pub pct_commercial:   f64,
    pub pct_night:        f64,
    /// Shannon entropy (bits) of the histogram.
    pub entropy:          f64,
    pub distinct_hours:   u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekdayProfile {
    /// Monday first.
    pub histogram:       [u32; 7],
    pub pct_weekend:     f64,
    pub pct_weekday:     f64,
    pub entropy:         f64,
    pub most_active_day: Weekday,
    pub distinct_days:   u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VelocityProfile {
    pub within_10s:         u32,
    pub within_60s:         u32,
    pub within_300s:        u32,
    pub burst_count:        u32,
    pub mean_interval_secs: f64,
    pub min_interval_secs:  Option<i64>,
    pub max_interval_secs:  Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CalendarProfile {
    pub pct_holiday:     f64,
    pub pct_month_start: f64,
    pub pct_month_end:   f64,
    /// Days from first to last transfer, inclusive.
    pub span_days:       i64,
    pub active_dates:    u32,
    pub first:           Option<NaiveDateTime>,
    pub last:            Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoboticProfile {
    /// 60 buckets.
    pub minute_histogram:       Vec<u32>,
    /// 60 buckets.
    pub second_histogram:       Vec<u32>,
    pub minute_concentration:   bool,
    pub second_concentration:   bool,
    pub artificial_timestamps:  u32,
    pub distinct_minutes:       u32,
    pub distinct_seconds:       u32,
    /// HH:MM values seen on more than one transfer.
    pub repeated_clock_times:   u32,
}

impl RoboticProfile {
    pub fn has_artificial_timestamps(&self) -> bool {
        self.artificial_timestamps > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalFeatureSet {
    pub transaction_count:   u32,
    pub hours:               HourProfile,
    pub weekdays:            WeekdayProfile,
    pub velocity:            VelocityProfile,
    pub calendar:            CalendarProfile,
    pub robotic:             RoboticProfile,
    /// 0–100, higher means more automation-like.
    pub temporal_risk_score: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalRiskBand {
    Normal,
    Low,
    Medium,
    High,
    Critical,
}

impl TemporalRiskBand {
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => TemporalRiskBand::Critical,
            60.. => TemporalRiskBand::High,
            40.. => TemporalRiskBand::Medium,
            20.. => TemporalRiskBand::Low,
            _    => TemporalRiskBand::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalRiskBand::Normal   => "NORMAL",
            TemporalRiskBand::Low      => "LOW",
            TemporalRiskBand::Medium   => "MEDIUM",
            TemporalRiskBand::High     => "HIGH",
            TemporalRiskBand::Critical => "CRITICAL",
        }
    }
}

/// Analyst-facing observations derived from a feature set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemporalFinding {
    HeavyNightActivity { pct: f64 },
    ModerateNightActivity { pct: f64 },
    ManyFastTransfers { count: u32 },
    SomeFastTransfers { count: u32 },
    Bursts { count: u32 },
    MinuteConcentration,
    ArtificialTimestamps { count: u32 },
    WeekendHeavy { pct: f64 },
    HolidayHeavy { pct: f64 },
    CommercialHoursDominant { pct: f64 },
    RiskBand { band: TemporalRiskBand },
}

impl TemporalFinding {
    pub fn describe(&self) -> String {
        match self {
            TemporalFinding::HeavyNightActivity { pct } =>
                format!("{pct:.1}% of transfers between 00:00 and 05:59"),
            TemporalFinding::ModerateNightActivity { pct } =>
                format!("{pct:.1}% of transfers in the early morning"),
            TemporalFinding::ManyFastTransfers { count } =>
                format!("{count} transfers less than a minute apart"),
            TemporalFinding::SomeFastTransfers { count } =>
                format!("{count} transfers in quick succession"),
            TemporalFinding::Bursts { count } =>
                format!("{count} burst(s) of back-to-back transfers"),
            TemporalFinding::MinuteConcentration =>
                "transfers concentrated on the same minute of the hour".to_string(),
            TemporalFinding::ArtificialTimestamps { count } =>
                format!("{count} clock-aligned timestamp(s)"),
            TemporalFinding::WeekendHeavy { pct } =>
                format!("{pct:.1}% of transfers on weekends"),
            TemporalFinding::HolidayHeavy { pct } =>
                format!("{pct:.1}% of transfers on public holidays"),
            TemporalFinding::CommercialHoursDominant { pct } =>
                format!("{pct:.1}% of transfers in commercial hours"),
            TemporalFinding::RiskBand { band } =>
                format!("temporal risk {}", band.as_str()),
        }
    }
}

impl TemporalFeatureSet {
    pub fn risk_band(&self) -> TemporalRiskBand {
        TemporalRiskBand::from_score(self.temporal_risk_score)
    }

    pub fn findings(&self) -> Vec<TemporalFinding> {
        let mut out = Vec::new();
        if self.transaction_count == 0 {
            return out;
        }
        let h = &self.hours;
        if h.pct_madrugada > 30.0 {
            out.push(TemporalFinding::HeavyNightActivity { pct: h.pct_madrugada });
        } else if h.pct_madrugada > 15.0 {
            out.push(TemporalFinding::ModerateNightActivity { pct: h.pct_madrugada });
        }
        let fast = self.velocity.within_60s;
        if fast > 5 {
            out.push(TemporalFinding::ManyFastTransfers { count: fast });
        } else if fast > 2 {
            out.push(TemporalFinding::SomeFastTransfers { count: fast });
        }
        if self.velocity.burst_count > 0 {
            out.push(TemporalFinding::Bursts { count: self.velocity.burst_count });
        }
        if self.robotic.minute_concentration {
            out.push(TemporalFinding::MinuteConcentration);
        }
        if self.robotic.has_artificial_timestamps() {
            out.push(TemporalFinding::ArtificialTimestamps { count: self.robotic.artificial_timestamps });
        }
        if self.weekdays.pct_weekend > 50.0 {
            out.push(TemporalFinding::WeekendHeavy { pct: self.weekdays.pct_weekend });
        }
        if self.calendar.pct_holiday > 20.0 {
            out.push(TemporalFinding::HolidayHeavy { pct: self.calendar.pct_holiday });
        }
        if h.pct_commercial > 80.0 {
            out.push(TemporalFinding::CommercialHoursDominant { pct: h.pct_commercial });
        }
        out.push(TemporalFinding::RiskBand { band: self.risk_band() });
        out
    }
}

// ── Extraction ─────────────────────────────────────────────────────

pub fn extract_features(timestamps: &[NaiveDateTime]) -> TemporalFeatureSet {
    let mut sorted = timestamps.to_vec();
    sorted.sort();

    let hours = hour_profile(&sorted);
    let weekdays = weekday_profile(&sorted);
    let velocity = velocity_profile(&sorted);
    let calendar = calendar_profile(&sorted);
    let robotic = robotic_profile(&sorted);
    let temporal_risk_score = if sorted.is_empty() {
        0
    } else {
        risk_score(&hours, &velocity, &robotic)
    };

    log::debug!(
        "temporal: n={} madrugada={:.1}% bursts={} artificial={} score={temporal_risk_score}",
        sorted.len(),
        hours.pct_madrugada,
        velocity.burst_count,
        robotic.artificial_timestamps
    );

    TemporalFeatureSet {
        transaction_count: sorted.len() as u32,
        hours,
        weekdays,
        velocity,
        calendar,
        robotic,
        temporal_risk_score,
    }
}

fn risk_score(hours: &HourProfile, velocity: &VelocityProfile, robotic: &RoboticProfile) -> u32 {
    let mut score = (2.0 * hours.pct_madrugada) as i64;
    score += 10 * velocity.within_60s as i64;
    score += 15 * velocity.burst_count as i64;
    if robotic.has_artificial_timestamps() {
        score += 25;
    }
    if robotic.minute_concentration {
        score += 20;
    }
    if hours.entropy < LOW_ENTROPY {
        score += 15;
    }
    score -= (0.5 * hours.pct_commercial) as i64;
    score.clamp(0, 100) as u32
}

fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

/// Base-2 Shannon entropy of a histogram.
fn entropy(histogram: &[u32]) -> f64 {
    let total: u32 = histogram.iter().sum();
    if total == 0 {
        return 0.0;
    }
    histogram
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Index of the largest bucket; ties go to the lowest index.
fn mode(histogram: &[u32]) -> Option<usize> {
    let max = *histogram.iter().max()?;
    if max == 0 {
        return None;
    }
    histogram.iter().position(|&c| c == max)
}

fn hour_profile(ts: &[NaiveDateTime]) -> HourProfile {
    let mut histogram = [0u32; 24];
    for t in ts {
        histogram[t.hour() as usize] += 1;
    }
    let n = ts.len();
    let (mean_hour, std_dev_hour) = if n == 0 {
        (0.0, 0.0)
    } else {
        let mean = ts.iter().map(|t| t.hour() as f64).sum::<f64>() / n as f64;
        let var = ts.iter().map(|t| (t.hour() as f64 - mean).powi(2)).sum::<f64>() / n as f64;
        (mean, var.sqrt())
    };
    let in_band = |band: &std::ops::RangeInclusive<u32>| ts.iter().filter(|t| band.contains(&t.hour())).count();

    HourProfile {
        predominant_hour: mode(&histogram).map(|h| h as u32).unwrap_or(DEFAULT_HOUR),
        mean_hour,
        std_dev_hour,
        pct_madrugada: pct(in_band(&MADRUGADA_HOURS), n),
        pct_commercial: pct(in_band(&COMMERCIAL_HOURS), n),
        pct_night: pct(in_band(&NIGHT_HOURS), n),
        entropy: entropy(&histogram),
        distinct_hours: histogram.iter().filter(|&&c| c > 0).count() as u32,
        histogram,
    }
}

fn weekday_profile(ts: &[NaiveDateTime]) -> WeekdayProfile {
    let mut histogram = [0u32; 7];
    for t in ts {
        histogram[t.weekday().num_days_from_monday() as usize] += 1;
    }
    let n = ts.len();
    let weekend = (histogram[5] + histogram[6]) as usize;
    let most_active_day = mode(&histogram).map(|i| WEEK[i]).unwrap_or(Weekday::Mon);

    WeekdayProfile {
        pct_weekend: pct(weekend, n),
        pct_weekday: pct(n - weekend, n),
        entropy: entropy(&histogram),
        most_active_day,
        distinct_days: histogram.iter().filter(|&&c| c > 0).count() as u32,
        histogram,
    }
}

fn velocity_profile(sorted: &[NaiveDateTime]) -> VelocityProfile {
    let deltas: Vec<i64> = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds())
        .collect();
    if deltas.is_empty() {
        return VelocityProfile::default();
    }

    let within = |limit: i64| deltas.iter().filter(|&&d| d <= limit).count() as u32;

    let mut burst_count = 0;
    let mut run = 0;
    for &d in &deltas {
        if d <= BURST_GAP_SECS {
            run += 1;
        } else {
            if run >= BURST_MIN_RUN {
                burst_count += 1;
            }
            run = 0;
        }
    }
    if run >= BURST_MIN_RUN {
        burst_count += 1;
    }

    VelocityProfile {
        within_10s: within(VERY_FAST_SECS),
        within_60s: within(FAST_SECS),
        within_300s: within(QUICK_SECS),
        burst_count,
        mean_interval_secs: deltas.iter().sum::<i64>() as f64 / deltas.len() as f64,
        min_interval_secs: deltas.iter().copied().min(),
        max_interval_secs: deltas.iter().copied().max(),
    }
}

fn calendar_profile(sorted: &[NaiveDateTime]) -> CalendarProfile {
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return CalendarProfile::default(),
    };
    let n = sorted.len();
    let holidays = sorted
        .iter()
        .filter(|t| HOLIDAYS.contains(&(t.month(), t.day())))
        .count();
    let month_start = sorted.iter().filter(|t| t.day() <= MONTH_START_LAST_DAY).count();
    let month_end = sorted.iter().filter(|t| t.day() >= MONTH_END_FIRST_DAY).count();
    let dates: HashSet<_> = sorted.iter().map(|t| t.date()).collect();

    CalendarProfile {
        pct_holiday: pct(holidays, n),
        pct_month_start: pct(month_start, n),
        pct_month_end: pct(month_end, n),
        span_days: (last.date() - first.date()).num_days() + 1,
        active_dates: dates.len() as u32,
        first: Some(first),
        last: Some(last),
    }
}

/// Clock-aligned or self-similar timestamps rarely come from people.
fn is_artificial(t: &NaiveDateTime) -> bool {
    let (h, m, s) = (t.hour(), t.minute(), t.second());
    (m == 0 && s == 0) || s == m || (h == m && m < 12)
}

fn robotic_profile(ts: &[NaiveDateTime]) -> RoboticProfile {
    let mut minute_histogram = vec![0u32; 60];
    let mut second_histogram = vec![0u32; 60];
    let mut clock_times: HashMap<(u32, u32), u32> = HashMap::new();
    for t in ts {
        minute_histogram[t.minute() as usize] += 1;
        // Leap seconds report 60.
        second_histogram[t.second().min(59) as usize] += 1;
        *clock_times.entry((t.hour(), t.minute())).or_default() += 1;
    }
    let n = ts.len();
    let share = |hist: &[u32]| {
        if n == 0 {
            0.0
        } else {
            hist.iter().copied().max().unwrap_or(0) as f64 / n as f64
        }
    };

    RoboticProfile {
        minute_concentration: share(&minute_histogram) > MINUTE_CONCENTRATION,
        second_concentration: share(&second_histogram) > SECOND_CONCENTRATION,
        artificial_timestamps: ts.iter().filter(|t| is_artificial(t)).count() as u32,
        distinct_minutes: minute_histogram.iter().filter(|&&c| c > 0).count() as u32,
        distinct_seconds: second_histogram.iter().filter(|&&c| c > 0).count() as u32,
        repeated_clock_times: clock_times.values().filter(|&&c| c > 1).count() as u32,
        minute_histogram,
        second_histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn entropy_of_uniform_and_single_bucket() {
        assert_eq!(entropy(&[5, 0, 0]), 0.0);
        assert!((entropy(&[1, 1, 1, 1]) - 2.0).abs() < 1e-12);
        assert_eq!(entropy(&[0, 0]), 0.0);
    }

    #[test]
    fn bursts_need_three_tight_gaps() {
        let base = at(2025, 3, 4, 14, 7, 13);
        // Gaps: 5, 5, 5 (burst) | 600 | 5, 5 (too short) | 600 | 10, 10, 10, 10 (burst, trailing).
        let offsets = [0, 5, 10, 15, 615, 620, 625, 1225, 1235, 1245, 1255, 1265];
        let ts: Vec<_> = offsets.iter().map(|&o| base + Duration::seconds(o)).collect();
        let v = velocity_profile(&ts);
        assert_eq!(v.burst_count, 2);
        assert_eq!(v.within_10s, 9);
        assert_eq!(v.min_interval_secs, Some(5));
        assert_eq!(v.max_interval_secs, Some(600));
    }

    #[test]
    fn input_order_is_irrelevant() {
        let a = at(2025, 3, 4, 9, 13, 41);
        let b = a + Duration::seconds(20);
        let c = a + Duration::hours(2);
        assert_eq!(extract_features(&[c, a, b]), extract_features(&[a, b, c]));
    }

    #[test]
    fn artificial_timestamp_rules() {
        assert!(is_artificial(&at(2025, 1, 6, 14, 0, 0)));
        assert!(is_artificial(&at(2025, 1, 6, 14, 37, 37)));
        assert!(is_artificial(&at(2025, 1, 6, 7, 7, 52)));
        assert!(!is_artificial(&at(2025, 1, 6, 14, 14, 52)));
        assert!(!is_artificial(&at(2025, 1, 6, 14, 37, 12)));
    }

    #[test]
    fn calendar_flags_holidays_and_month_edges() {
        let ts = [
            at(2024, 12, 25, 10, 3, 17),
            at(2025, 1, 1, 10, 4, 18),
            at(2025, 1, 3, 10, 5, 19),
            at(2025, 1, 14, 10, 6, 21),
        ];
        let c = calendar_profile(&ts);
        assert_eq!(c.pct_holiday, 50.0);
        assert_eq!(c.pct_month_start, 50.0);
        assert_eq!(c.pct_month_end, 25.0);
        assert_eq!(c.span_days, 21);
        assert_eq!(c.active_dates, 4);
    }

    #[test]
    fn office_hours_spread_scores_low() {
        // One transfer per weekday at varied office hours, days apart.
        let ts: Vec<_> = (0..10)
            .map(|i| at(2025, 4, 1 + i * 2, 9 + (i % 8), 13 + i * 3, 50 - i))
            .collect();
        let f = extract_features(&ts);
        assert_eq!(f.hours.pct_commercial, 100.0);
        assert_eq!(f.velocity.within_60s, 0);
        assert_eq!(f.temporal_risk_score, 0);
        assert_eq!(f.risk_band(), TemporalRiskBand::Normal);
    }

    #[test]
    fn band_edges() {
        assert_eq!(TemporalRiskBand::from_score(19), TemporalRiskBand::Normal);
        assert_eq!(TemporalRiskBand::from_score(20), TemporalRiskBand::Low);
        assert_eq!(TemporalRiskBand::from_score(40), TemporalRiskBand::Medium);
        assert_eq!(TemporalRiskBand::from_score(60), TemporalRiskBand::High);
        assert_eq!(TemporalRiskBand::from_score(80), TemporalRiskBand::Critical);
    }
}
