//! PDF rendering of a [`Report`].
//!
//! Single-column A4 portrait document: title, generation metadata, summary,
//! percentile and top-pattern subsections, then a bordered anomaly table.
//! printpdf's coordinate origin is the bottom-left corner, so the layout
//! keeps a top-down cursor and converts when placing marks. Built-in fonts
//! carry no width tables; wrapping approximates Helvetica's average glyph
//! width from the font size.

use std::io::BufWriter;

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};

use super::{AnomalyDetail, ExportError, Report};

const PAGE_W: f64 = 210.0;
const PAGE_H: f64 = 297.0;
const MARGIN: f64 = 10.0;
/// Last usable y position, measured from the top of the page.
const PAGE_BOTTOM: f64 = 287.0;
const LINE_H: f64 = 5.0;

/// DB, Exec Time, Exec Count, Reasons, Suggestions, SQL.
const COL_WIDTHS: [f64; 6] = [20.0, 28.0, 22.0, 33.0, 32.0, 55.0];
const TABLE_HEADERS: [&str; 6] = [
    "DB",
    "Exec Time (ms)",
    "Exec Count",
    "Reasons",
    "Suggestions",
    "SQL",
];

/// Millimetres per point; Helvetica averages roughly half the font size
/// per glyph.
const MM_PER_PT: f64 = 0.3528;
const AVG_GLYPH_FRACTION: f64 = 0.5;

pub fn render(report: &Report) -> Result<Vec<u8>, ExportError> {
    let mut page = Layout::new("SQL Log Report")?;

    // Title.
    page.write_line("SQL Log Report", 16.0, true, 10.0);
    page.space(2.0);

    // Timestamp and range.
    page.write_line(
        &format!(
            "Generated at: {} ({})",
            report.generated_at.to_rfc3339(),
            report.timezone
        ),
        11.0,
        false,
        6.0,
    );
    page.write_line(
        &format!(
            "Range: {}  to  {}",
            report.summary.from.to_rfc3339(),
            report.summary.to.to_rfc3339()
        ),
        11.0,
        false,
        6.0,
    );
    page.space(2.0);

    // Summary stats.
    page.write_line("Summary", 12.0, true, 7.0);
    page.labelled_value("Total queries:", &report.summary.total_queries.to_string());
    page.labelled_value("Anomaly count:", &report.summary.anomaly_count.to_string());
    page.labelled_value(
        "Suggestion count:",
        &report.summary.suggestion_count.to_string(),
    );
    if !report.summary.by_db.is_empty() {
        page.space(2.0);
        page.write_line("By DB:", 11.0, false, 6.0);
        for (db, count) in &report.summary.by_db {
            page.ensure_space(6.0);
            page.labelled_value(&format!(" - {db}:"), &count.to_string());
        }
    }
    page.space(6.0);

    // Percentiles.
    if !report.percentiles_overall.is_empty() {
        page.ensure_space(20.0);
        page.write_line("Percentiles (Overall)", 12.0, true, 7.0);
        page.write_line(
            &format!("exec_time_ms: {}", report.percentiles_overall.exec_time.render()),
            11.0,
            false,
            6.0,
        );
        page.write_line(
            &format!("exec_count:   {}", report.percentiles_overall.exec_count.render()),
            11.0,
            false,
            6.0,
        );
        page.space(2.0);
    }
    if !report.percentiles_by_db.is_empty() {
        page.ensure_space(20.0);
        page.write_line("Percentiles (By DB)", 12.0, true, 7.0);
        for (db, pcts) in &report.percentiles_by_db {
            page.ensure_space(18.0);
            page.write_line(&format!("DB: {db}"), 11.0, false, 6.0);
            page.write_line(
                &format!(" - exec_time_ms: {}", pcts.exec_time.render()),
                11.0,
                false,
                6.0,
            );
            page.write_line(
                &format!(" - exec_count:   {}", pcts.exec_count.render()),
                11.0,
                false,
                6.0,
            );
        }
        page.space(2.0);
    }

    // Top patterns.
    if !report.top_patterns_overall.is_empty() {
        page.ensure_space(20.0);
        page.write_line("Top Patterns (Overall)", 12.0, true, 7.0);
        page.pattern_rows(&report.top_patterns_overall);
        page.space(3.0);
    }
    if !report.top_patterns_by_db.is_empty() {
        page.ensure_space(20.0);
        page.write_line("Top Patterns (By DB)", 12.0, true, 7.0);
        for (db, patterns) in &report.top_patterns_by_db {
            page.ensure_space(14.0);
            page.write_line(&format!("DB: {db}"), 11.0, true, 7.0);
            page.pattern_rows(patterns);
            page.space(3.0);
        }
    }

    // Anomaly table; header reprints after every page break.
    if page.y + 20.0 > PAGE_BOTTOM {
        page.add_page();
    }
    page.table_header();
    for anomaly in &report.anomalies {
        page.table_row(anomaly);
    }

    page.finish()
}

struct Layout {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Cursor, in mm from the top of the current page.
    y: f64,
}

impl Layout {
    fn new(title: &str) -> Result<Self, ExportError> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "page");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);
        layer.set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        layer.set_outline_thickness(0.2);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: MARGIN,
        })
    }

    fn add_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "page");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.layer
            .set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        self.layer.set_outline_thickness(0.2);
        self.y = MARGIN;
    }

    fn ensure_space(&mut self, needed: f64) {
        if self.y + needed > PAGE_BOTTOM {
            self.add_page();
        }
    }

    fn space(&mut self, h: f64) {
        self.y += h;
    }

    /// Places `text` at an absolute position without moving the cursor.
    fn text_at(&self, text: &str, size: f64, x: f64, y_top: f64, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        // Baseline sits near the bottom of the occupied row.
        let baseline = PAGE_H - (y_top + LINE_H - 1.2);
        self.layer.use_text(text, size, Mm(x), Mm(baseline), font);
    }

    /// Writes one full-width line and advances the cursor.
    fn write_line(&mut self, text: &str, size: f64, bold: bool, advance: f64) {
        self.text_at(text, size, MARGIN, self.y, bold);
        self.y += advance;
    }

    /// `label` in a fixed 60 mm column, `value` after it, one line.
    fn labelled_value(&mut self, label: &str, value: &str) {
        self.text_at(label, 11.0, MARGIN, self.y, false);
        self.text_at(value, 11.0, MARGIN + 60.0, self.y, false);
        self.y += 6.0;
    }

    /// Pattern/occurrence listing shared by the overall and per-DB blocks.
    fn pattern_rows(&mut self, patterns: &[super::stats::PatternStat]) {
        self.ensure_space(6.0);
        self.text_at("Pattern", 10.0, MARGIN, self.y, true);
        self.text_at("Occurrences", 10.0, MARGIN + 140.0, self.y, true);
        self.y += 6.0;
        for p in patterns {
            self.ensure_space(6.0);
            self.text_at(&truncate_one_line(&p.pattern, 160), 9.0, MARGIN, self.y, false);
            self.text_at(&p.occurrences.to_string(), 9.0, MARGIN + 140.0, self.y, false);
            self.y += 6.0;
        }
    }

    fn rect(&self, x: f64, y_top: f64, w: f64, h: f64) {
        let bottom = PAGE_H - (y_top + h);
        let top = PAGE_H - y_top;
        let outline = Line {
            points: vec![
                (Point::new(Mm(x), Mm(bottom)), false),
                (Point::new(Mm(x + w), Mm(bottom)), false),
                (Point::new(Mm(x + w), Mm(top)), false),
                (Point::new(Mm(x), Mm(top)), false),
            ],
            is_closed: true,
            has_fill: false,
            has_stroke: true,
            is_clipping_path: false,
        };
        self.layer.add_shape(outline);
    }

    /// Draws one bordered table row: cells word-wrapped, row height taken
    /// from the tallest wrapped cell.
    fn bordered_row(&mut self, cells: &[String; 6], size: f64, bold: bool) {
        let wrapped: Vec<Vec<String>> = cells
            .iter()
            .zip(COL_WIDTHS)
            .map(|(text, width)| wrap_text(text, width - 2.0, size))
            .collect();
        let max_lines = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let row_h = max_lines as f64 * LINE_H;

        if self.y + row_h > PAGE_BOTTOM {
            self.add_page();
            if !bold {
                self.table_header();
            }
        }

        let mut x = MARGIN;
        for (lines, width) in wrapped.iter().zip(COL_WIDTHS) {
            self.rect(x, self.y, width, row_h);
            for (i, line) in lines.iter().enumerate() {
                self.text_at(line, size, x + 1.0, self.y + i as f64 * LINE_H, bold);
            }
            x += width;
        }
        self.y += row_h;
    }

    fn table_header(&mut self) {
        let cells: [String; 6] = TABLE_HEADERS.map(String::from);
        self.bordered_row(&cells, 10.0, true);
    }

    fn table_row(&mut self, anomaly: &AnomalyDetail) {
        let reasons = anomaly
            .reasons
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let suggestions = anomaly
            .suggestions
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let cells = [
            anomaly.db_name.clone(),
            anomaly.exec_time_ms.to_string(),
            anomaly.exec_count.to_string(),
            reasons,
            suggestions,
            anomaly.sql_query.replace('\n', " "),
        ];
        self.bordered_row(&cells, 9.0, false);
    }

    fn finish(self) -> Result<Vec<u8>, ExportError> {
        let mut buf = Vec::new();
        {
            let mut writer = BufWriter::new(&mut buf);
            self.doc
                .save(&mut writer)
                .map_err(|e| ExportError::Pdf(e.to_string()))?;
        }
        Ok(buf)
    }
}

/// How many characters fit in `width_mm` at `font_size` points.
fn max_chars(width_mm: f64, font_size: f64) -> usize {
    let glyph_mm = font_size * MM_PER_PT * AVG_GLYPH_FRACTION;
    ((width_mm / glyph_mm).floor() as usize).max(1)
}

/// Word-wraps `text` to the column width; words longer than a full line
/// are hard-split.
fn wrap_text(text: &str, width_mm: f64, font_size: f64) -> Vec<String> {
    let limit = max_chars(width_mm, font_size);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > limit {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if word_len > limit {
            // Hard-split an overlong token across as many lines as needed.
            for ch in word.chars() {
                if current_len == limit {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push(ch);
                current_len += 1;
            }
        } else {
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Flattens to one line and truncates with an ellipsis. Only used for bare
/// labels; table cells wrap instead.
fn truncate_one_line(s: &str, max: usize) -> String {
    let one = s.replace('\n', " ");
    if one.chars().count() <= max {
        return one;
    }
    if max <= 3 {
        return one.chars().take(max).collect();
    }
    let mut out: String = one.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_limit() {
        let lines = wrap_text("select id from orders where customer_id = ?", 20.0, 9.0);
        let limit = max_chars(20.0, 9.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.chars().count() <= limit, "line too long: {line:?}");
        }
    }

    #[test]
    fn test_wrap_hard_splits_long_token() {
        let token = "x".repeat(100);
        let lines = wrap_text(&token, 20.0, 9.0);
        let limit = max_chars(20.0, 9.0);
        assert!(lines.len() >= 100 / limit);
        assert_eq!(
            lines.iter().map(|l| l.chars().count()).sum::<usize>(),
            100
        );
    }

    #[test]
    fn test_wrap_empty_text_yields_one_blank_line() {
        assert_eq!(wrap_text("", 20.0, 9.0), vec![String::new()]);
    }

    #[test]
    fn test_truncate_one_line() {
        assert_eq!(truncate_one_line("short", 10), "short");
        assert_eq!(truncate_one_line("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_one_line("a\nb", 10), "a b");
    }
}
