//! Remote collaborators: the FTP report drop and the destination spreadsheet.
//!
//! The sync engine only talks to the two traits below; `ftp` and `sheets`
//! hold the production implementations.

use chrono::{DateTime, Utc};
use ftpsheet_core::Cell;
use thiserror::Error;

pub mod auth;
pub mod ftp;
pub mod retry;
pub mod sheets;

pub use auth::{Credentials, ServiceAccountKey};
pub use ftp::{FtpConfig, FtpFileSource};
pub use retry::{BackoffPolicy, RetryDisposition};
pub use sheets::{SheetsClient, SheetsClientConfig};

pub const CRATE_NAME: &str = "ftpsheet-remote";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: suppaftp::FtpError,
    },
    #[error(transparent)]
    Ftp(#[from] suppaftp::FtpError),
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("signing token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Unavailable(String),
}

/// Read side of the remote report drop. Calls are blocking and run in sequence.
pub trait RemoteFileSource {
    fn list_names(&mut self) -> Result<Vec<String>, SourceError>;

    /// Size in bytes. An error here makes the file ineligible, never fails the run.
    fn size(&mut self, name: &str) -> Result<u64, SourceError>;

    /// Last modification time, `None` when the server can't tell.
    fn modified_at(&mut self, name: &str) -> Option<DateTime<Utc>>;

    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>, SourceError>;

    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetHandle {
    pub spreadsheet_id: String,
    pub sheet_id: i64,
    pub title: String,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetHandle {
    pub spreadsheet_id: String,
    pub worksheets: Vec<WorksheetHandle>,
}

impl SpreadsheetHandle {
    pub fn worksheet(&self, title: &str) -> Option<&WorksheetHandle> {
        self.worksheets.iter().find(|ws| ws.title == title)
    }
}

/// Mutation primitives on the destination spreadsheet.
pub trait SheetService {
    fn open_spreadsheet(&mut self, spreadsheet_id: &str) -> Result<SpreadsheetHandle, SheetError>;

    fn get_or_create_worksheet(
        &mut self,
        spreadsheet: &SpreadsheetHandle,
        title: &str,
        min_rows: usize,
        max_columns: usize,
    ) -> Result<WorksheetHandle, SheetError>;

    fn clear_range(&mut self, worksheet: &WorksheetHandle, range: &str) -> Result<(), SheetError>;

    fn values_clear_fallback(
        &mut self,
        worksheet: &WorksheetHandle,
        range: &str,
    ) -> Result<(), SheetError>;

    fn write_range(
        &mut self,
        worksheet: &WorksheetHandle,
        anchor: &str,
        rows: &[Vec<Cell>],
    ) -> Result<(), SheetError>;

    /// Inserts an empty row of `width` cells at 1-based `position`, shifting rows down.
    fn insert_blank_row(
        &mut self,
        worksheet: &WorksheetHandle,
        position: usize,
        width: usize,
    ) -> Result<(), SheetError>;

    /// Grows the worksheet to at least `rows` rows.
    fn ensure_row_count(&mut self, worksheet: &WorksheetHandle, rows: usize) -> Result<(), SheetError>;
}

/// A1 reference qualified with a quoted sheet title: `'My Sheet'!A1:Z`.
pub fn qualified_range(title: &str, range: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), range)
}
