//! The five-step replacement of the destination write window.
//!
//! Each step runs once (the clear step has one fallback). The first failure
//! aborts the remaining steps and is reported as `WriteFailed` for that step;
//! whatever the completed steps changed stays visible on the worksheet.

use ftpsheet_core::{column_letter, error_chain, Cell, SyncError, SyncResult, SyncStep, SyncTarget, Table};
use ftpsheet_remote::{SheetError, SheetService, WorksheetHandle};
use tracing::{error, info, warn};

/// Floor for the row count of a freshly created worksheet.
pub const MIN_NEW_WORKSHEET_ROWS: usize = 100;
/// Extra rows granted to a new worksheet beyond what the table needs.
pub const NEW_WORKSHEET_HEADROOM: usize = 10;
/// 0-based column of the source-file annotation on the metadata row (D).
pub const SOURCE_ANNOTATION_COLUMN: usize = 3;

pub const SYNCED_AT_PREFIX: &str = "Report synced at ";
pub const SOURCE_FILE_PREFIX: &str = "Source file name: ";

/// Row count for a worksheet created to hold `table` plus its header.
pub fn new_worksheet_rows(table: &Table) -> usize {
    (table.row_count() + 1 + NEW_WORKSHEET_HEADROOM).max(MIN_NEW_WORKSHEET_ROWS)
}

/// Replaces the write window of `target` with `table` and annotates row 1.
pub fn sync(
    sheets: &mut dyn SheetService,
    target: &SyncTarget,
    table: &Table,
    source_filename: &str,
    now_display: &str,
) -> Result<SyncResult, SyncError> {
    let worksheet = resolve_worksheet(sheets, target, table)?;
    let width = table.column_count().min(target.max_columns);
    let window = target.window_range();

    info!(
        worksheet = %worksheet.title,
        rows = table.row_count(),
        columns = width,
        window = %window,
        "replacing write window"
    );

    // 1. clear
    if let Err(err) = sheets.clear_range(&worksheet, &window) {
        warn!(error = %error_chain(&err), "batch clear failed; falling back to values clear");
        sheets
            .values_clear_fallback(&worksheet, &window)
            .map_err(|err| step_failed(SyncStep::Clear, err))?;
    }

    // 2. resize
    let needed_rows = table.row_count() + 1;
    if worksheet.row_count < needed_rows {
        sheets
            .ensure_row_count(&worksheet, needed_rows)
            .map_err(|err| step_failed(SyncStep::Resize, err))?;
    }

    // 3. write
    let block = window_block(table, target.max_columns);
    sheets
        .write_range(&worksheet, &target.anchor, &block)
        .map_err(|err| step_failed(SyncStep::Write, err))?;

    // 4. blank metadata row
    sheets
        .insert_blank_row(&worksheet, 1, target.max_columns)
        .map_err(|err| step_failed(SyncStep::InsertBlankRow, err))?;

    // 5. annotate
    let synced_at = vec![vec![Cell::text(format!("{SYNCED_AT_PREFIX}{now_display}"))]];
    let source = vec![vec![Cell::text(format!("{SOURCE_FILE_PREFIX}{source_filename}"))]];
    let source_anchor = format!("{}1", column_letter(SOURCE_ANNOTATION_COLUMN));
    sheets
        .write_range(&worksheet, "A1", &synced_at)
        .map_err(|err| step_failed(SyncStep::Annotate, err))?;
    sheets
        .write_range(&worksheet, &source_anchor, &source)
        .map_err(|err| step_failed(SyncStep::Annotate, err))?;

    info!(worksheet = %worksheet.title, file = source_filename, "write window replaced");
    Ok(SyncResult {
        filename: source_filename.to_string(),
        rows_written: table.row_count(),
        columns_written: width,
        timestamp: now_display.to_string(),
    })
}

fn resolve_worksheet(
    sheets: &mut dyn SheetService,
    target: &SyncTarget,
    table: &Table,
) -> Result<WorksheetHandle, SyncError> {
    let unavailable = |err: SheetError| {
        error!(
            spreadsheet = %target.spreadsheet_id,
            worksheet = %target.worksheet_name,
            error = %error_chain(&err),
            "destination unavailable"
        );
        SyncError::DestinationUnavailable {
            worksheet: target.worksheet_name.clone(),
            source: Box::new(err),
        }
    };

    let spreadsheet = sheets.open_spreadsheet(&target.spreadsheet_id).map_err(unavailable)?;
    sheets
        .get_or_create_worksheet(
            &spreadsheet,
            &target.worksheet_name,
            new_worksheet_rows(table),
            target.max_columns,
        )
        .map_err(unavailable)
}

/// Header row followed by data rows, every row cut to `max_columns`.
fn window_block(table: &Table, max_columns: usize) -> Vec<Vec<Cell>> {
    let header: Vec<Cell> = table
        .headers()
        .iter()
        .take(max_columns)
        .map(|h| Cell::text(h.as_str()))
        .collect();
    std::iter::once(header)
        .chain(
            table
                .rows()
                .iter()
                .map(|row| row.iter().take(max_columns).cloned().collect()),
        )
        .collect()
}

fn step_failed(step: SyncStep, err: SheetError) -> SyncError {
    error!(%step, error = %error_chain(&err), "sheet mutation failed; aborting remaining steps");
    SyncError::write_failed(step, err)
}
