//! Percentile distributions and frequent-pattern mining.
//!
//! Percentiles use nearest-rank (discrete) semantics: the reported value is
//! always one that was actually observed, never an interpolated midpoint.
//! Patterns are normalized SQL shapes: structurally identical queries that
//! differ only in literal values collapse to one pattern.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::models::LogRecord;

/// Placeholder substituted for every volatile literal.
const PLACEHOLDER: &str = "?";

// Canonicalization steps, applied in this exact order after lowercasing:
// string literals, UUIDs, ISO dates/date-times, numbers, whitespace.
static RE_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("string regex"));
static RE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("uuid regex")
});
static RE_DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}(?:[ t]\d{2}:\d{2}:\d{2}(?:\.\d+)?)?\b")
        .expect("datetime regex")
});
static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("number regex"));
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Reduces a SQL text to its structural shape. Deterministic and
/// idempotent.
pub fn normalize_sql(sql: &str) -> String {
    let text = sql.to_lowercase();
    let text = RE_STRING.replace_all(&text, PLACEHOLDER);
    let text = RE_UUID.replace_all(&text, PLACEHOLDER);
    let text = RE_DATETIME.replace_all(&text, PLACEHOLDER);
    let text = RE_NUMBER.replace_all(&text, PLACEHOLDER);
    let text = RE_WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// One percentile label and its observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentilePoint {
    pub percent: u8,
    pub value: i64,
}

/// Ordered percentile points. Serialized as a `"pNN" -> value` map only at
/// the export boundary; internally the shape stays a typed list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PercentileSet(pub Vec<PercentilePoint>);

impl PercentileSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `p50=30,p75=40` rendering used by the CSV and PDF exports.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|p| format!("p{}={}", p.percent, p.value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Serialize for PercentileSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for point in &self.0 {
            map.serialize_entry(&format!("p{}", point.percent), &point.value)?;
        }
        map.end()
    }
}

/// Percentile sets for both observed metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Percentiles {
    #[serde(rename = "exec_time_ms")]
    pub exec_time: PercentileSet,
    #[serde(rename = "exec_count")]
    pub exec_count: PercentileSet,
}

impl Percentiles {
    pub fn is_empty(&self) -> bool {
        self.exec_time.is_empty() && self.exec_count.is_empty()
    }
}

/// Nearest-rank selection: the smallest observed value whose rank is at
/// least `ceil(fraction * n)`.
pub fn nearest_rank(sorted: &[i64], fraction: f64) -> Option<i64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (fraction * n as f64).ceil() as usize;
    let rank = rank.clamp(1, n);
    Some(sorted[rank - 1])
}

fn percentile_set(values: &mut [i64], fractions: &[f64]) -> PercentileSet {
    values.sort_unstable();
    let points = fractions
        .iter()
        .filter_map(|&f| {
            nearest_rank(values, f).map(|value| PercentilePoint {
                percent: (f * 100.0 + 0.5) as u8,
                value,
            })
        })
        .collect();
    PercentileSet(points)
}

/// Percentiles of `exec_time_ms` and `exec_count` over one record set.
pub fn metric_percentiles(records: &[&LogRecord], fractions: &[f64]) -> Percentiles {
    let mut times: Vec<i64> = records.iter().map(|r| r.exec_time_ms).collect();
    let mut counts: Vec<i64> = records.iter().map(|r| r.exec_count).collect();
    Percentiles {
        exec_time: percentile_set(&mut times, fractions),
        exec_count: percentile_set(&mut counts, fractions),
    }
}

/// One normalized SQL shape and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternStat {
    pub pattern: String,
    pub occurrences: i64,
}

/// Groups SQL texts by normalized pattern, ranked by occurrences
/// descending, pattern text ascending on ties, capped at `limit`.
pub fn top_patterns<'a, I>(sql_texts: I, limit: usize) -> Vec<PatternStat>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, i64> = HashMap::new();
    for sql in sql_texts {
        *counts.entry(normalize_sql(sql)).or_insert(0) += 1;
    }
    let mut stats: Vec<PatternStat> = counts
        .into_iter()
        .map(|(pattern, occurrences)| PatternStat {
            pattern,
            occurrences,
        })
        .collect();
    stats.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.pattern.cmp(&b.pattern))
    });
    stats.truncate(limit);
    stats
}

/// Groups records by database name, preserving record order per group.
pub fn group_by_database<'a>(records: &'a [LogRecord]) -> BTreeMap<&'a str, Vec<&'a LogRecord>> {
    let mut groups: BTreeMap<&str, Vec<&LogRecord>> = BTreeMap::new();
    for rec in records {
        groups.entry(rec.db_name.as_str()).or_default().push(rec);
    }
    groups
}
