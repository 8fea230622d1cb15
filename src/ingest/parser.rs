//! Line parser for uploaded SQL log files.
//!
//! Expected line format (single line):
//! `DB:<name>,sql:<query>,exec_time_ms:<int>,exec_count:<int>`
//!
//! The SQL query may itself contain commas, so the query field is matched
//! non-greedily and the parse anchors on the numeric `exec_time_ms` and
//! `exec_count` fields at the end of the line.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::NewLogRecord;

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^DB:([^,]*),sql:(.*?),exec_time_ms:(-?\d+),exec_count:(-?\d+)\s*$")
        .expect("line regex")
});

/// Which constraint a log line violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("empty line")]
    EmptyLine,
    #[error("invalid line format")]
    MalformedFormat,
    #[error("invalid numeric field")]
    InvalidNumber,
    #[error("negative values not allowed")]
    NegativeValue,
    #[error("db or sql is empty")]
    MissingField,
}

/// A rejected line together with the reason it was rejected.
#[derive(Debug, Clone, Error)]
#[error("parse: {kind}; line={line:?}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: String,
}

impl ParseError {
    fn new(kind: ParseErrorKind, line: &str) -> Self {
        Self {
            kind,
            line: line.to_string(),
        }
    }
}

/// Parses one log line into a [`NewLogRecord`].
///
/// Never panics; on failure the record is not partially populated.
pub fn parse_line(raw: &str) -> Result<NewLogRecord, ParseError> {
    let line = raw.trim();
    if line.is_empty() {
        return Err(ParseError::new(ParseErrorKind::EmptyLine, raw));
    }

    let caps = LINE_RE
        .captures(line)
        .ok_or_else(|| ParseError::new(ParseErrorKind::MalformedFormat, raw))?;

    let db_name = caps[1].trim();
    let sql_query = caps[2].trim();
    if db_name.is_empty() || sql_query.is_empty() {
        return Err(ParseError::new(ParseErrorKind::MissingField, raw));
    }

    let exec_time_ms: i64 = caps[3]
        .parse()
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber, raw))?;
    let exec_count: i64 = caps[4]
        .parse()
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber, raw))?;
    if exec_time_ms < 0 || exec_count < 0 {
        return Err(ParseError::new(ParseErrorKind::NegativeValue, raw));
    }

    Ok(NewLogRecord {
        db_name: db_name.to_string(),
        sql_query: sql_query.to_string(),
        exec_time_ms,
        exec_count,
    })
}

/// Renders a record back into the line format accepted by [`parse_line`].
pub fn format_line(rec: &NewLogRecord) -> String {
    format!(
        "DB:{},sql:{},exec_time_ms:{},exec_count:{}",
        rec.db_name, rec.sql_query, rec.exec_time_ms, rec.exec_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let rec = parse_line("DB:sales,sql:SELECT * FROM orders,exec_time_ms:1200,exec_count:5")
            .unwrap();
        assert_eq!(rec.db_name, "sales");
        assert_eq!(rec.sql_query, "SELECT * FROM orders");
        assert_eq!(rec.exec_time_ms, 1200);
        assert_eq!(rec.exec_count, 5);
    }

    #[test]
    fn test_parse_query_with_commas() {
        let rec = parse_line(
            "DB:crm,sql:SELECT a, b, c FROM t WHERE x IN (1, 2),exec_time_ms:10,exec_count:2",
        )
        .unwrap();
        assert_eq!(rec.sql_query, "SELECT a, b, c FROM t WHERE x IN (1, 2)");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let rec =
            parse_line("  DB: sales ,sql: SELECT 1 ,exec_time_ms:3,exec_count:4  ").unwrap();
        assert_eq!(rec.db_name, "sales");
        assert_eq!(rec.sql_query, "SELECT 1");
    }

    #[test]
    fn test_parse_empty_line() {
        let err = parse_line("   ").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyLine);
    }

    #[test]
    fn test_parse_missing_field_count() {
        let err = parse_line("DB:sales,sql:SELECT 1,exec_time_ms:5").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedFormat);
    }

    #[test]
    fn test_parse_negative_exec_time() {
        let err =
            parse_line("DB:sales,sql:SELECT 1,exec_time_ms:-5,exec_count:1").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NegativeValue);
    }

    #[test]
    fn test_parse_non_numeric_count() {
        let err =
            parse_line("DB:sales,sql:SELECT 1,exec_time_ms:5,exec_count:abc").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedFormat);
    }

    #[test]
    fn test_parse_overflowing_number() {
        let err = parse_line(
            "DB:sales,sql:SELECT 1,exec_time_ms:99999999999999999999999,exec_count:1",
        )
        .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidNumber);
    }

    #[test]
    fn test_parse_empty_db_name() {
        let err = parse_line("DB: ,sql:SELECT 1,exec_time_ms:5,exec_count:1").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingField);
    }

    #[test]
    fn test_error_carries_original_line() {
        let err = parse_line("garbage").unwrap_err();
        assert_eq!(err.line, "garbage");
        assert!(err.to_string().contains("garbage"));
    }

    #[test]
    fn test_round_trip() {
        let rec = NewLogRecord {
            db_name: "inventory".into(),
            sql_query: "SELECT id, qty FROM stock WHERE sku = 'A-1'".into(),
            exec_time_ms: 42,
            exec_count: 7,
        };
        let parsed = parse_line(&format_line(&rec)).unwrap();
        assert_eq!(parsed, rec);
    }
}
