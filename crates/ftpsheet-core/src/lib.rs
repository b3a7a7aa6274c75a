//! Core domain model, fixed constants, and the error taxonomy for ftpsheet.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "ftpsheet-core";

/// Columns A..Z. Anything past this is dropped before it reaches the sheet.
pub const MAX_COLUMNS: usize = 26;

/// Top-left cell of the write window.
pub const WINDOW_ANCHOR: &str = "A1";

/// Extensions (lowercase, without the dot) the pipeline will consider.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["csv", "txt", "xls", "xlsx"];

/// Default worksheet title when none is configured.
pub const DEFAULT_WORKSHEET_NAME: &str = "OOCL_import";

/// One entry of a remote directory listing that passed the size query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileDescriptor {
    pub name: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub size: u64,
}

impl RemoteFileDescriptor {
    pub fn new(name: impl Into<String>, modified_at: Option<DateTime<Utc>>, size: u64) -> Self {
        Self {
            name: name.into(),
            modified_at,
            size,
        }
    }
}

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Cell {
    Text(String),
    Number(f64),
    /// Canonical placeholder for missing or non-finite values.
    #[default]
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// String rendering used for headers and previews. The empty marker renders as "".
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Empty => String::new(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Rectangular table: every row holds exactly `column_count()` cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Builds a table whose width is the header width. Short rows are padded with
    /// [`Cell::Empty`], long rows are truncated; retained cells keep their order.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Cell>>) {
        (self.headers, self.rows)
    }
}

/// Destination sheet and the fixed write window inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub spreadsheet_id: String,
    pub worksheet_name: String,
    pub anchor: String,
    pub max_columns: usize,
}

impl SyncTarget {
    pub fn new(spreadsheet_id: impl Into<String>, worksheet_name: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            worksheet_name: worksheet_name.into(),
            anchor: WINDOW_ANCHOR.to_string(),
            max_columns: MAX_COLUMNS,
        }
    }

    /// Window spanning every row of the first `max_columns` columns, e.g. `A1:Z`.
    pub fn window_range(&self) -> String {
        format!("{}:{}", self.anchor, column_letter(self.max_columns.saturating_sub(1)))
    }
}

/// Observable outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub filename: String,
    pub rows_written: usize,
    pub columns_written: usize,
    pub timestamp: String,
}

/// Spreadsheet column letters for a 0-based index: 0 -> A, 25 -> Z, 26 -> AA.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Lowercased extension of a remote or local file name, without the dot.
pub fn file_extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// The five destination mutations, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SyncStep {
    Clear,
    Resize,
    Write,
    InsertBlankRow,
    Annotate,
}

impl SyncStep {
    pub const ORDER: [SyncStep; 5] = [
        SyncStep::Clear,
        SyncStep::Resize,
        SyncStep::Write,
        SyncStep::InsertBlankRow,
        SyncStep::Annotate,
    ];

    /// 1-based position in the mutation sequence.
    pub fn index(self) -> usize {
        match self {
            SyncStep::Clear => 1,
            SyncStep::Resize => 2,
            SyncStep::Write => 3,
            SyncStep::InsertBlankRow => 4,
            SyncStep::Annotate => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SyncStep::Clear => "clear write window",
            SyncStep::Resize => "resize worksheet",
            SyncStep::Write => "write table",
            SyncStep::InsertBlankRow => "insert blank row",
            SyncStep::Annotate => "annotate",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.index(), self.label())
    }
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not parse {filename}: {reason}")]
    UnparsableFormat { filename: String, reason: String },
    #[error("no candidate files found in remote directory")]
    NoCandidateFiles,
    #[error("destination worksheet {worksheet:?} unavailable")]
    DestinationUnavailable {
        worksheet: String,
        #[source]
        source: BoxError,
    },
    #[error("write failed at {step}")]
    WriteFailed {
        step: SyncStep,
        #[source]
        source: BoxError,
    },
    #[error("remote file source unavailable while {action}")]
    SourceUnavailable {
        action: String,
        #[source]
        source: BoxError,
    },
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn unparsable(filename: impl Into<String>, reason: impl fmt::Display) -> Self {
        SyncError::UnparsableFormat {
            filename: filename.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write_failed(step: SyncStep, source: impl Into<BoxError>) -> Self {
        SyncError::WriteFailed {
            step,
            source: source.into(),
        }
    }

    /// Step index for `WriteFailed`, otherwise `None`.
    pub fn failed_step(&self) -> Option<SyncStep> {
        match self {
            SyncError::WriteFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Renders an error and its whole `source()` chain on one line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_rows_are_padded_and_long_rows_truncated() {
        let table = Table::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![
                vec![Cell::text("1")],
                vec![
                    Cell::text("1"),
                    Cell::text("2"),
                    Cell::text("3"),
                    Cell::text("4"),
                ],
            ],
        );
        assert_eq!(table.column_count(), 3);
        assert_eq!(
            table.rows()[0],
            vec![Cell::text("1"), Cell::Empty, Cell::Empty]
        );
        assert_eq!(
            table.rows()[1],
            vec![Cell::text("1"), Cell::text("2"), Cell::text("3")]
        );
    }

    #[test]
    fn column_letters_follow_spreadsheet_convention() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(3), "D");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
    }

    #[test]
    fn window_range_spans_configured_columns() {
        let target = SyncTarget::new("sheet-id", "OOCL_import");
        assert_eq!(target.window_range(), "A1:Z");
    }

    #[test]
    fn extension_is_lowercased_and_requires_a_stem() {
        assert_eq!(file_extension("Report.CSV").as_deref(), Some("csv"));
        assert_eq!(file_extension("dir/data.xlsx").as_deref(), Some("xlsx"));
        assert_eq!(file_extension(".csv"), None);
        assert_eq!(file_extension("README"), None);
    }

    #[test]
    fn steps_are_numbered_in_execution_order() {
        let indexes: Vec<_> = SyncStep::ORDER.iter().map(|s| s.index()).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
        assert_eq!(SyncStep::Write.to_string(), "step 3 (write table)");
    }

    #[test]
    fn numbers_display_without_trailing_zero() {
        assert_eq!(Cell::Number(3.0).display(), "3");
        assert_eq!(Cell::Number(2.5).display(), "2.5");
        assert_eq!(Cell::Empty.display(), "");
    }
}
