//! Report filter defaults and clamping.
//!
//! Every knob treats zero/negative/missing as "use the default"; the raw
//! caller-facing [`ReportFilter`] is resolved into a fully-populated
//! [`EffectiveFilter`] before any query runs. Defaults are plain data, not
//! process-wide state.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::store::{Thresholds, TimeWindow};

pub const DEFAULT_SLOW_MS: i64 = 1000;
pub const DEFAULT_FREQ_SLOW_MS: i64 = 500;
pub const DEFAULT_FREQ_COUNT: i64 = 100;
pub const DEFAULT_ANOMALY_LIMIT: i64 = 500;
pub const ANOMALY_LIMIT_CAP: i64 = 5000;
pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_TOP_PATTERNS: usize = 20;
pub const MAX_TOP_PATTERNS: usize = 200;
pub const MAX_PERCENTILE_FRACTIONS: usize = 10;
pub const DEFAULT_PERCENTILE_FRACTIONS: [f64; 5] = [0.50, 0.75, 0.90, 0.95, 0.99];

/// Caller-supplied report parameters. Anything left `None` (or out of
/// range) falls back to the default when resolved.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub database: Option<String>,
    pub limit: Option<i64>,
    pub limit_cap: Option<i64>,
    pub slow_ms: Option<i64>,
    pub freq_slow_ms: Option<i64>,
    pub freq_count: Option<i64>,
    pub fractions: Vec<f64>,
    pub top_patterns: Option<usize>,
}

/// A filter with every default applied; what the analyzer actually runs.
#[derive(Debug, Clone)]
pub struct EffectiveFilter {
    pub window: TimeWindow,
    pub database: Option<String>,
    pub limit: i64,
    pub thresholds: Thresholds,
    pub fractions: Vec<f64>,
    pub top_patterns: usize,
}

impl ReportFilter {
    pub fn resolve(&self, now: DateTime<Utc>) -> EffectiveFilter {
        let from = self
            .from
            .unwrap_or_else(|| now - Duration::days(DEFAULT_WINDOW_DAYS));
        let mut to = self.to.unwrap_or(now);
        if from > to {
            to = now;
        }

        let database = self
            .database
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let cap = self.limit_cap.filter(|v| *v > 0).unwrap_or(ANOMALY_LIMIT_CAP);
        let limit = match self.limit {
            Some(n) if n > 0 => n.min(cap),
            _ => DEFAULT_ANOMALY_LIMIT,
        };

        let thresholds = Thresholds {
            slow_ms: positive_or(self.slow_ms, DEFAULT_SLOW_MS),
            freq_slow_ms: positive_or(self.freq_slow_ms, DEFAULT_FREQ_SLOW_MS),
            freq_count: positive_or(self.freq_count, DEFAULT_FREQ_COUNT),
        };

        let mut fractions = if self.fractions.is_empty() {
            DEFAULT_PERCENTILE_FRACTIONS.to_vec()
        } else {
            self.fractions.clone()
        };
        fractions.truncate(MAX_PERCENTILE_FRACTIONS);
        let fractions = sanitize_fractions(&fractions);

        let top_patterns = self
            .top_patterns
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TOP_PATTERNS)
            .min(MAX_TOP_PATTERNS);

        EffectiveFilter {
            window: TimeWindow { from, to },
            database,
            limit,
            thresholds,
            fractions,
            top_patterns,
        }
    }
}

fn positive_or(value: Option<i64>, default: i64) -> i64 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date. A date-only
/// upper bound is extended to the end of its day so the range stays
/// inclusive.
pub fn parse_time_bound(s: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let t = if end_of_day {
            d.and_hms_nano_opt(23, 59, 59, 999_999_999)
        } else {
            d.and_hms_opt(0, 0, 0)
        }
        .expect("valid time of day");
        return Ok(Utc.from_utc_datetime(&t));
    }
    Err(format!("must be RFC3339 or YYYY-MM-DD: {s:?}"))
}

/// Clamps fractions into [0, 1], rounds to 2-decimal granularity,
/// deduplicates and sorts ascending.
pub fn sanitize_fractions(input: &[f64]) -> Vec<f64> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(input.len());
    for &v in input {
        let clamped = v.clamp(0.0, 1.0);
        let key = (clamped * 100.0 + 0.5).floor() as i64;
        if seen.insert(key) {
            out.push(key as f64 / 100.0);
        }
    }
    out.sort_by(|a, b| a.partial_cmp(b).expect("fractions are finite"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    #[test]
    fn test_resolve_applies_all_defaults() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let f = ReportFilter::default().resolve(now);
        assert_eq!(f.window.to, now);
        assert_eq!(f.window.from, now - Duration::days(7));
        assert_eq!(f.limit, DEFAULT_ANOMALY_LIMIT);
        assert_eq!(f.thresholds.slow_ms, 1000);
        assert_eq!(f.thresholds.freq_slow_ms, 500);
        assert_eq!(f.thresholds.freq_count, 100);
        assert_eq!(f.fractions, vec![0.50, 0.75, 0.90, 0.95, 0.99]);
        assert_eq!(f.top_patterns, 20);
    }

    #[test]
    fn test_resolve_inverted_window_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let filter = ReportFilter {
            from: Some(at("2025-05-10T00:00:00Z")),
            to: Some(at("2025-05-01T00:00:00Z")),
            ..Default::default()
        };
        let f = filter.resolve(now);
        assert_eq!(f.window.from, at("2025-05-10T00:00:00Z"));
        assert_eq!(f.window.to, now);
    }

    #[test]
    fn test_limit_clamped_to_cap() {
        let now = Utc::now();
        let filter = ReportFilter {
            limit: Some(999_999),
            ..Default::default()
        };
        assert_eq!(filter.resolve(now).limit, ANOMALY_LIMIT_CAP);

        let filter = ReportFilter {
            limit: Some(999_999),
            limit_cap: Some(1000),
            ..Default::default()
        };
        assert_eq!(filter.resolve(now).limit, 1000);

        let filter = ReportFilter {
            limit: Some(-3),
            ..Default::default()
        };
        assert_eq!(filter.resolve(now).limit, DEFAULT_ANOMALY_LIMIT);
    }

    #[test]
    fn test_negative_thresholds_use_defaults() {
        let filter = ReportFilter {
            slow_ms: Some(-1),
            freq_slow_ms: Some(0),
            freq_count: Some(250),
            ..Default::default()
        };
        let f = filter.resolve(Utc::now());
        assert_eq!(f.thresholds.slow_ms, DEFAULT_SLOW_MS);
        assert_eq!(f.thresholds.freq_slow_ms, DEFAULT_FREQ_SLOW_MS);
        assert_eq!(f.thresholds.freq_count, 250);
    }

    #[test]
    fn test_sanitize_fractions_clamps_dedups_sorts() {
        let out = sanitize_fractions(&[0.99, -0.5, 1.7, 0.5, 0.501, 0.75]);
        assert_eq!(out, vec![0.0, 0.5, 0.75, 0.99, 1.0]);
    }

    #[test]
    fn test_fraction_count_capped() {
        let many: Vec<f64> = (0..30).map(|i| i as f64 / 100.0).collect();
        let filter = ReportFilter {
            fractions: many,
            ..Default::default()
        };
        let f = filter.resolve(Utc::now());
        assert_eq!(f.fractions.len(), MAX_PERCENTILE_FRACTIONS);
    }

    #[test]
    fn test_top_patterns_bounds() {
        let now = Utc::now();
        let f = ReportFilter {
            top_patterns: Some(10_000),
            ..Default::default()
        }
        .resolve(now);
        assert_eq!(f.top_patterns, MAX_TOP_PATTERNS);

        let f = ReportFilter {
            top_patterns: Some(0),
            ..Default::default()
        }
        .resolve(now);
        assert_eq!(f.top_patterns, DEFAULT_TOP_PATTERNS);
    }

    #[test]
    fn test_parse_time_bound() {
        let t = parse_time_bound("2025-03-01T10:30:00Z", false).unwrap();
        assert_eq!(t, at("2025-03-01T10:30:00Z"));

        let from = parse_time_bound("2025-03-01", false).unwrap();
        assert_eq!(from, at("2025-03-01T00:00:00Z"));

        let to = parse_time_bound("2025-03-01", true).unwrap();
        assert_eq!(to, at("2025-03-01T23:59:59.999999999Z"));

        assert!(parse_time_bound("yesterday", false).is_err());
    }

    #[test]
    fn test_blank_database_filter_ignored() {
        let f = ReportFilter {
            database: Some("   ".into()),
            ..Default::default()
        }
        .resolve(Utc::now());
        assert!(f.database.is_none());
    }
}
