//! Tabular format adapters: raw bytes + filename hint -> rectangular [`Table`].

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use ftpsheet_core::{file_extension, Cell, SyncError, Table};
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "ftpsheet-adapters";

/// Closed set of formats the parser understands, resolved once from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    DelimitedText,
    SpreadsheetBinary,
}

impl TabularFormat {
    /// `.xls`/`.xlsx` are spreadsheet-binary; everything else, including unknown or
    /// missing extensions, is delimited text.
    pub fn for_filename(filename: &str) -> Self {
        match file_extension(filename).as_deref() {
            Some("xls") | Some("xlsx") => TabularFormat::SpreadsheetBinary,
            Some("csv") | Some("txt") => TabularFormat::DelimitedText,
            _ => TabularFormat::DelimitedText,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub delimiter: u8,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("input is not valid UTF-8 at byte {valid_up_to}")]
    Decode { valid_up_to: usize },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoWorksheet,
    #[error("no header row")]
    EmptyInput,
    #[error("{first}; retry as windows-1252 failed: {retry}")]
    FallbackExhausted {
        first: Box<AdapterError>,
        retry: Box<AdapterError>,
    },
}

pub trait FormatAdapter: Send + Sync {
    fn format(&self) -> TabularFormat;

    fn parse(&self, bytes: &[u8]) -> Result<Table, AdapterError>;
}

#[derive(Debug, Clone, Copy)]
pub struct DelimitedTextAdapter {
    delimiter: u8,
}

impl DelimitedTextAdapter {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn parse_text(&self, text: &str) -> Result<Table, AdapterError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => record?,
            None => return Err(AdapterError::EmptyInput),
        };
        let headers = clean_headers(header.iter().map(str::to_string).collect());

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(delimited_cell)
                    .collect(),
            );
        }
        Ok(Table::new(headers, rows))
    }
}

/// Field spellings read as missing values.
const MISSING_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Missing-value tokens become empty cells and infinities become non-finite
/// numbers so normalization blanks them. Everything else stays text.
fn delimited_cell(field: &str) -> Cell {
    if MISSING_TOKENS.contains(&field) {
        return Cell::Empty;
    }
    let unsigned = field.strip_prefix(['+', '-']).unwrap_or(field);
    if unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity") {
        return if field.starts_with('-') {
            Cell::Number(f64::NEG_INFINITY)
        } else {
            Cell::Number(f64::INFINITY)
        };
    }
    Cell::Text(field.to_string())
}

impl Default for DelimitedTextAdapter {
    fn default() -> Self {
        Self::new(ParseOptions::default().delimiter)
    }
}

impl FormatAdapter for DelimitedTextAdapter {
    fn format(&self) -> TabularFormat {
        TabularFormat::DelimitedText
    }

    /// UTF-8 first; on any failure retry once as Windows-1252, which maps every byte.
    fn parse(&self, bytes: &[u8]) -> Result<Table, AdapterError> {
        let first = match std::str::from_utf8(bytes) {
            Ok(text) => match self.parse_text(text) {
                Ok(table) => return Ok(table),
                Err(err) => err,
            },
            Err(err) => AdapterError::Decode {
                valid_up_to: err.valid_up_to(),
            },
        };

        warn!(error = %first, "utf-8 parse failed; retrying as windows-1252");
        let (decoded, _had_errors) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
        self.parse_text(&decoded)
            .map_err(|retry| AdapterError::FallbackExhausted {
                first: Box::new(first),
                retry: Box::new(retry),
            })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetBinaryAdapter;

impl FormatAdapter for SpreadsheetBinaryAdapter {
    fn format(&self) -> TabularFormat {
        TabularFormat::SpreadsheetBinary
    }

    /// Reads the first worksheet. No encoding retry: the container is self-describing.
    fn parse(&self, bytes: &[u8]) -> Result<Table, AdapterError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(AdapterError::NoWorksheet)??;

        let mut rows = range.rows();
        let header = rows.next().ok_or(AdapterError::EmptyInput)?;
        let headers = clean_headers(header.iter().map(|v| data_to_cell(v).display()).collect());
        let rows = rows
            .map(|row| row.iter().map(data_to_cell).collect())
            .collect();
        Ok(Table::new(headers, rows))
    }
}

fn data_to_cell(value: &Data) -> Cell {
    match value {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::text(if *b { "TRUE" } else { "FALSE" }),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::Text(naive.to_string()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

/// Blank headers become `Unnamed: <index>`; repeats get a `.<n>` suffix.
fn clean_headers(raw: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut name = if name.trim().is_empty() {
                format!("Unnamed: {idx}")
            } else {
                name
            };
            let mut seen = counts.get(&name).copied().unwrap_or(0);
            while seen > 0 {
                counts.insert(name.clone(), seen + 1);
                name = format!("{name}.{seen}");
                seen = counts.get(&name).copied().unwrap_or(0);
            }
            counts.insert(name.clone(), seen + 1);
            name
        })
        .collect()
}

pub fn adapter_for_format(format: TabularFormat, options: &ParseOptions) -> Box<dyn FormatAdapter> {
    match format {
        TabularFormat::DelimitedText => Box::new(DelimitedTextAdapter::new(options.delimiter)),
        TabularFormat::SpreadsheetBinary => Box::new(SpreadsheetBinaryAdapter),
    }
}

/// Parses with default options (comma-delimited text).
pub fn parse(filename: &str, bytes: &[u8]) -> Result<Table, SyncError> {
    parse_with_options(filename, bytes, &ParseOptions::default())
}

pub fn parse_with_options(
    filename: &str,
    bytes: &[u8],
    options: &ParseOptions,
) -> Result<Table, SyncError> {
    let format = TabularFormat::for_filename(filename);
    debug!(filename, ?format, bytes = bytes.len(), "parsing remote file");
    adapter_for_format(format, options)
        .parse(bytes)
        .map_err(|err| SyncError::unparsable(filename, err))
}
