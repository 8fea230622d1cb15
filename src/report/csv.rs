//! CSV rendering of a [`Report`].
//!
//! Layout mirrors the JSON report as one flat document: a key/value summary
//! block, percentile blocks, top-pattern blocks, then the anomaly table.
//! Blocks have different widths, hence the flexible writer.

use std::io::Write;

use csv::WriterBuilder;

use super::{ExportError, Report};

fn kv<W: Write>(w: &mut csv::Writer<W>, key: &str, value: &str) -> csv::Result<()> {
    w.write_record([key, value])
}

fn spacer<W: Write>(w: &mut csv::Writer<W>) -> csv::Result<()> {
    w.write_record([""])
}

pub fn render(report: &Report) -> Result<Vec<u8>, ExportError> {
    let mut w = WriterBuilder::new().flexible(true).from_writer(Vec::new());

    // Summary as key,value pairs.
    kv(&mut w, "key", "value")?;
    kv(&mut w, "generated_at", &report.generated_at.to_rfc3339())?;
    kv(&mut w, "timezone", &report.timezone)?;
    kv(&mut w, "from", &report.summary.from.to_rfc3339())?;
    kv(&mut w, "to", &report.summary.to.to_rfc3339())?;
    kv(
        &mut w,
        "total_queries",
        &report.summary.total_queries.to_string(),
    )?;
    kv(
        &mut w,
        "anomaly_count",
        &report.summary.anomaly_count.to_string(),
    )?;
    kv(
        &mut w,
        "suggestion_count",
        &report.summary.suggestion_count.to_string(),
    )?;
    if !report.summary.by_db.is_empty() {
        let parts: Vec<String> = report
            .summary
            .by_db
            .iter()
            .map(|(db, count)| format!("{db}={count}"))
            .collect();
        kv(&mut w, "by_db", &parts.join("; "))?;
    }

    // Percentiles (overall).
    if !report.percentiles_overall.is_empty() {
        spacer(&mut w)?;
        kv(
            &mut w,
            "percentiles_overall_exec_time_ms",
            &report.percentiles_overall.exec_time.render(),
        )?;
        kv(
            &mut w,
            "percentiles_overall_exec_count",
            &report.percentiles_overall.exec_count.render(),
        )?;
    }

    // Percentiles per database, name ascending.
    if !report.percentiles_by_db.is_empty() {
        spacer(&mut w)?;
        for (db, pcts) in &report.percentiles_by_db {
            kv(
                &mut w,
                &format!("percentiles_db_exec_time_ms[{db}]"),
                &pcts.exec_time.render(),
            )?;
            kv(
                &mut w,
                &format!("percentiles_db_exec_count[{db}]"),
                &pcts.exec_count.render(),
            )?;
        }
    }

    // Top patterns (overall).
    if !report.top_patterns_overall.is_empty() {
        spacer(&mut w)?;
        kv(
            &mut w,
            "top_patterns_overall_count",
            &report.top_patterns_overall.len().to_string(),
        )?;
        kv(&mut w, "pattern", "occurrences")?;
        for p in &report.top_patterns_overall {
            kv(&mut w, &p.pattern, &p.occurrences.to_string())?;
        }
    }

    // Top patterns per database, name ascending, blank-line separated.
    if !report.top_patterns_by_db.is_empty() {
        spacer(&mut w)?;
        for (db, patterns) in &report.top_patterns_by_db {
            kv(
                &mut w,
                &format!("top_patterns_db[{db}]"),
                &patterns.len().to_string(),
            )?;
            kv(&mut w, "pattern", "occurrences")?;
            for p in patterns {
                kv(&mut w, &p.pattern, &p.occurrences.to_string())?;
            }
            spacer(&mut w)?;
        }
    }

    spacer(&mut w)?;

    // Anomaly table.
    w.write_record([
        "db_name",
        "exec_time_ms",
        "exec_count",
        "reasons",
        "suggestions",
        "sql_query",
    ])?;
    for a in &report.anomalies {
        let reasons = a
            .reasons
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let suggestions = a
            .suggestions
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("|");
        // Keep SQL single-line for CSV safety.
        let sql_one_line = a.sql_query.replace('\n', " ");
        let exec_time = a.exec_time_ms.to_string();
        let exec_count = a.exec_count.to_string();
        w.write_record([
            a.db_name.as_str(),
            exec_time.as_str(),
            exec_count.as_str(),
            reasons.as_str(),
            suggestions.as_str(),
            sql_one_line.as_str(),
        ])?;
    }

    w.flush()?;
    w.into_inner()
        .map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))
}
