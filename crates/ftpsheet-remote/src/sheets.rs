//! Google Sheets v4 REST implementation of [`SheetService`].
//!
//! Metadata reads and token exchange go through the retry policy. Mutations are
//! sent exactly once; the caller decides what a failed mutation means.

use std::time::Duration;

use ftpsheet_core::Cell;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::blocking::Client;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use crate::auth::{Credentials, TokenCache};
use crate::retry::{send_json, BackoffPolicy};
use crate::{qualified_range, SheetError, SheetService, SpreadsheetHandle, WorksheetHandle};

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

#[derive(Debug, Clone)]
pub struct SheetsClientConfig {
    pub api_base: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub backoff: BackoffPolicy,
}

impl Default for SheetsClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_SHEETS_API_BASE.to_string(),
            timeout: Duration::from_secs(60),
            user_agent: concat!("ftpsheet/", env!("CARGO_PKG_VERSION")).to_string(),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct SheetsClient {
    http: Client,
    api_base: String,
    tokens: TokenCache,
    backoff: BackoffPolicy,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
}

impl SheetProperties {
    fn into_handle(self, spreadsheet_id: &str) -> WorksheetHandle {
        WorksheetHandle {
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_id: self.sheet_id,
            title: self.title,
            row_count: self.grid_properties.row_count,
            column_count: self.grid_properties.column_count,
        }
    }
}

fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string()
}

fn cell_to_json(cell: &Cell) -> JsonValue {
    match cell {
        Cell::Text(s) => JsonValue::String(s.clone()),
        Cell::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(String::new())),
        Cell::Empty => JsonValue::String(String::new()),
    }
}

fn rows_to_json(rows: &[Vec<Cell>]) -> JsonValue {
    JsonValue::Array(
        rows.iter()
            .map(|row| JsonValue::Array(row.iter().map(cell_to_json).collect()))
            .collect(),
    )
}

impl SheetsClient {
    pub fn new(config: SheetsClientConfig, credentials: Credentials) -> Result<Self, SheetError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            tokens: TokenCache::new(credentials),
            backoff: config.backoff,
        })
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str) -> String {
        format!("{}/spreadsheets/{}", self.api_base, encode_segment(spreadsheet_id))
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(spreadsheet_id),
            encode_segment(range)
        )
    }

    fn bearer(&mut self) -> Result<String, SheetError> {
        self.tokens.bearer(&self.http, &self.backoff)
    }

    fn read(&mut self, url: &str, query: &[(&str, &str)]) -> Result<JsonValue, SheetError> {
        let token = self.bearer()?;
        send_json(&self.backoff, || {
            self.http.get(url).bearer_auth(&token).query(query)
        })
    }

    fn mutate(
        &mut self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: &JsonValue,
    ) -> Result<JsonValue, SheetError> {
        let token = self.bearer()?;
        debug!(%method, url, "sheets mutation");
        send_json(&BackoffPolicy::none(), || {
            self.http
                .request(method.clone(), url)
                .bearer_auth(&token)
                .query(query)
                .json(body)
        })
    }

    fn batch_update(&mut self, spreadsheet_id: &str, requests: JsonValue) -> Result<JsonValue, SheetError> {
        let url = format!("{}:batchUpdate", self.spreadsheet_url(spreadsheet_id));
        self.mutate(Method::POST, &url, &[], &json!({ "requests": requests }))
    }
}

impl SheetService for SheetsClient {
    fn open_spreadsheet(&mut self, spreadsheet_id: &str) -> Result<SpreadsheetHandle, SheetError> {
        let url = self.spreadsheet_url(spreadsheet_id);
        let body = self.read(&url, &[("fields", "sheets.properties")])?;
        let meta: SpreadsheetMeta = serde_json::from_value(body)?;
        Ok(SpreadsheetHandle {
            spreadsheet_id: spreadsheet_id.to_string(),
            worksheets: meta
                .sheets
                .into_iter()
                .map(|s| s.properties.into_handle(spreadsheet_id))
                .collect(),
        })
    }

    fn get_or_create_worksheet(
        &mut self,
        spreadsheet: &SpreadsheetHandle,
        title: &str,
        min_rows: usize,
        max_columns: usize,
    ) -> Result<WorksheetHandle, SheetError> {
        if let Some(existing) = spreadsheet.worksheet(title) {
            return Ok(existing.clone());
        }

        info!(title, rows = min_rows, columns = max_columns, "creating worksheet");
        let reply = self.batch_update(
            &spreadsheet.spreadsheet_id,
            json!([{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": min_rows, "columnCount": max_columns }
                    }
                }
            }]),
        )?;
        let properties = reply
            .pointer("/replies/0/addSheet/properties")
            .cloned()
            .ok_or_else(|| SheetError::MalformedResponse("addSheet reply without properties".into()))?;
        let properties: SheetProperties = serde_json::from_value(properties)?;
        Ok(properties.into_handle(&spreadsheet.spreadsheet_id))
    }

    fn clear_range(&mut self, worksheet: &WorksheetHandle, range: &str) -> Result<(), SheetError> {
        let url = format!("{}/values:batchClear", self.spreadsheet_url(&worksheet.spreadsheet_id));
        let body = json!({ "ranges": [qualified_range(&worksheet.title, range)] });
        self.mutate(Method::POST, &url, &[], &body)?;
        Ok(())
    }

    fn values_clear_fallback(
        &mut self,
        worksheet: &WorksheetHandle,
        range: &str,
    ) -> Result<(), SheetError> {
        let url = format!(
            "{}:clear",
            self.values_url(&worksheet.spreadsheet_id, &qualified_range(&worksheet.title, range))
        );
        self.mutate(Method::POST, &url, &[], &json!({}))?;
        Ok(())
    }

    fn write_range(
        &mut self,
        worksheet: &WorksheetHandle,
        anchor: &str,
        rows: &[Vec<Cell>],
    ) -> Result<(), SheetError> {
        let range = qualified_range(&worksheet.title, anchor);
        let url = self.values_url(&worksheet.spreadsheet_id, &range);
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows_to_json(rows),
        });
        self.mutate(Method::PUT, &url, &[("valueInputOption", "RAW")], &body)?;
        Ok(())
    }

    fn insert_blank_row(
        &mut self,
        worksheet: &WorksheetHandle,
        position: usize,
        width: usize,
    ) -> Result<(), SheetError> {
        let position = position.max(1);
        self.batch_update(
            &worksheet.spreadsheet_id,
            json!([{
                "insertDimension": {
                    "range": {
                        "sheetId": worksheet.sheet_id,
                        "dimension": "ROWS",
                        "startIndex": position - 1,
                        "endIndex": position,
                    },
                    "inheritFromBefore": false
                }
            }]),
        )?;
        let blank = vec![vec![Cell::Text(String::new()); width]];
        self.write_range(worksheet, &format!("A{position}"), &blank)
    }

    fn ensure_row_count(&mut self, worksheet: &WorksheetHandle, rows: usize) -> Result<(), SheetError> {
        if worksheet.row_count >= rows {
            return Ok(());
        }
        let missing = rows - worksheet.row_count;
        info!(title = %worksheet.title, missing, "appending rows");
        self.batch_update(
            &worksheet.spreadsheet_id,
            json!([{
                "appendDimension": {
                    "sheetId": worksheet.sheet_id,
                    "dimension": "ROWS",
                    "length": missing,
                }
            }]),
        )?;
        Ok(())
    }
}
