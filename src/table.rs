//! Response-to-table normalization.
//!
//! The model is asked for tab-separated text, but some models answer with a JSON list of
//! `{row, column, text}` cells instead. Both shapes end up as a rectangular [`Table`]: every row
//! is padded on the right with empty cells up to the widest row. Normalization never fails;
//! anything that is not a valid cell list is read as TSV.

use std::fmt;

use serde::Deserialize;
use tracing::debug;

/// Largest grid the record form may describe. Bigger indices are treated as garbage.
const MAX_RECORD_CELLS: usize = 100_000;

/// One cell of the structured response form. Indices are 1-based.
#[derive(Debug, Deserialize)]
struct CellRecord {
    row: u32,
    column: u32,
    text: String,
}

/// Rectangular grid of string cells built from one model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a rectangular table from a raw model response.
    pub fn normalize(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }

        let rows = match parse_records(raw) {
            Some(rows) => {
                debug!(rows = rows.len(), "Response parsed as cell records");
                rows
            }
            None => parse_tsv(raw),
        };

        Self::from_ragged(rows)
    }

    fn from_ragged(mut rows: Vec<Vec<String>>) -> Self {
        let max_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(max_cols, String::new());
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at 0-based `(row, column)`, if inside the grid.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Serializes the table as tab-separated text, ready to paste into a spreadsheet.
    pub fn to_tsv(&self) -> String {
        self.rows
            .iter()
            .map(|row| row.join("\t"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parses the `[{row, column, text}, ...]` form into a grid.
/// Returns `None` when the input is not such a list, an index is zero, or the grid would exceed
/// [`MAX_RECORD_CELLS`].
fn parse_records(raw: &str) -> Option<Vec<Vec<String>>> {
    let records: Vec<CellRecord> = serde_json::from_str(raw).ok()?;
    if records.iter().any(|r| r.row == 0 || r.column == 0) {
        debug!("Cell record with zero index, falling back to TSV");
        return None;
    }

    let max_row = records.iter().map(|r| r.row).max().unwrap_or(0) as usize;
    let max_col = records.iter().map(|r| r.column).max().unwrap_or(0) as usize;
    match max_row.checked_mul(max_col) {
        Some(cells) if cells <= MAX_RECORD_CELLS => {}
        _ => {
            debug!(max_row, max_col, "Cell records describe an oversized grid, falling back to TSV");
            return None;
        }
    }
    let mut grid = vec![vec![String::new(); max_col]; max_row];

    // Later records overwrite earlier ones at the same coordinate.
    for record in records {
        grid[record.row as usize - 1][record.column as usize - 1] = flatten_cell(&record.text);
    }
    Some(grid)
}

/// Tabs and line breaks would split the cell once serialized as TSV; they become spaces.
fn flatten_cell(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\t', '\r', '\n'], " ")
}

/// Splits tab-separated text into rows, skipping blank lines.
/// Tab-only lines are kept: they are rows of empty cells.
fn parse_tsv(raw: &str) -> Vec<Vec<String>> {
    raw.lines()
        .filter(|line| !is_blank_line(line))
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

fn is_blank_line(line: &str) -> bool {
    line.chars().all(|c| c.is_whitespace() && c != '\t')
}

impl fmt::Display for Table {
    /// Renders an aligned grid with `Column N` headings.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(empty table)");
        }

        let headings: Vec<String> = (1..=self.column_count())
            .map(|i| format!("Column {i}"))
            .collect();
        let widths: Vec<usize> = headings
            .iter()
            .enumerate()
            .map(|(col, heading)| {
                self.rows
                    .iter()
                    .map(|row| row[col].chars().count())
                    .chain(std::iter::once(heading.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write_row(f, &headings, &widths)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_row(f, &rule, &widths)?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_cells(f, row, &widths)?;
        }
        Ok(())
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, cells: &[String], widths: &[usize]) -> fmt::Result {
    write_cells(f, cells, widths)?;
    writeln!(f)
}

fn write_cells(f: &mut fmt::Formatter<'_>, cells: &[String], widths: &[usize]) -> fmt::Result {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ");
    write!(f, "{}", line.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_tsv_ragged_rows_are_padded() {
        let table = Table::normalize("a\tb\nc\td\te");
        assert_eq!(table.rows(), grid(&[&["a", "b", ""], &["c", "d", "e"]]));
        assert_eq!(table.column_count(), 3);
    }

    #[test]
    fn test_records_fill_grid() {
        let raw = r#"[{"row":1,"column":1,"text":"X"},{"row":2,"column":3,"text":"Y"}]"#;
        let table = Table::normalize(raw);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.rows(), grid(&[&["X", "", ""], &["", "", "Y"]]));
    }

    #[test]
    fn test_duplicate_records_last_wins() {
        let raw = r#"[
            {"row":1,"column":2,"text":"first"},
            {"row":1,"column":2,"text":"second"}
        ]"#;
        let table = Table::normalize(raw);
        assert_eq!(table.rows(), grid(&[&["", "second"]]));
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(Table::normalize("").is_empty());
        assert!(Table::normalize("  \n\t\n  ").is_empty());
        assert_eq!(Table::normalize("").column_count(), 0);
    }

    #[test]
    fn test_empty_record_list_is_empty_table() {
        assert!(Table::normalize("[]").is_empty());
    }

    #[test]
    fn test_malformed_records_fall_back_to_tsv() {
        let missing_text = r#"[{"row":1,"column":1}]"#;
        assert_eq!(Table::normalize(missing_text).rows(), grid(&[&[missing_text]]));

        let zero_index = r#"[{"row":0,"column":1,"text":"x"}]"#;
        assert_eq!(Table::normalize(zero_index).row_count(), 1);

        let not_json = "{not json";
        assert_eq!(Table::normalize(not_json).rows(), grid(&[&["{not json"]]));
    }

    #[test]
    fn test_blank_lines_skipped_and_crlf_handled() {
        let table = Table::normalize("a\tb\r\n\r\n   \nc\td\r\n");
        assert_eq!(table.rows(), grid(&[&["a", "b"], &["c", "d"]]));
    }

    #[test]
    fn test_tab_only_line_is_empty_row() {
        let table = Table::normalize("a\tb\n\t\nc\td");
        assert_eq!(table.rows(), grid(&[&["a", "b"], &["", ""], &["c", "d"]]));
    }

    #[test]
    fn test_oversized_record_grid_falls_back_to_tsv() {
        let raw = r#"[{"row":100000,"column":100000,"text":"x"}]"#;
        assert_eq!(Table::normalize(raw).rows(), grid(&[&[raw]]));

        let overflow = r#"[{"row":4294967295,"column":4294967295,"text":"x"}]"#;
        assert_eq!(Table::normalize(overflow).row_count(), 1);

        let at_limit = r#"[{"row":1000,"column":100,"text":"x"}]"#;
        let table = Table::normalize(at_limit);
        assert_eq!((table.row_count(), table.column_count()), (1000, 100));
        assert_eq!(table.cell(999, 99), Some("x"));
    }

    #[test]
    fn test_record_text_line_breaks_and_tabs_become_spaces() {
        let raw = r#"[{"row":1,"column":1,"text":"a\nb"},{"row":1,"column":2,"text":"c\td\r\ne"}]"#;
        assert_eq!(Table::normalize(raw).rows(), grid(&[&["a b", "c d e"]]));
    }

    #[test]
    fn test_tsv_round_trip() {
        let inputs = [
            "a\tb\nc\td\te",
            r#"[{"row":1,"column":1,"text":"X"},{"row":3,"column":2,"text":"Y"}]"#,
            "\tleading\n x \t ilegible ",
            r#"[{"row":1,"column":1,"text":"a\nb"},{"row":1,"column":2,"text":"c\td\r\ne"}]"#,
        ];
        for raw in inputs {
            let table = Table::normalize(raw);
            assert_eq!(Table::normalize(&table.to_tsv()), table, "input: {raw:?}");
        }
    }

    #[test]
    fn test_cell_lookup() {
        let table = Table::normalize("a\tb\nc");
        assert_eq!(table.cell(1, 0), Some("c"));
        assert_eq!(table.cell(1, 1), Some(""));
        assert_eq!(table.cell(2, 0), None);
    }

    #[test]
    fn test_display_has_headings() {
        let rendered = Table::normalize("qty\tprice\n4\t9.93").to_string();
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("Column 1 | Column 2"));
        assert_eq!(lines.next(), Some("-------- | --------"));
        assert_eq!(lines.next(), Some("qty      | price"));
        assert_eq!(lines.next(), Some("4        | 9.93"));
    }
}
