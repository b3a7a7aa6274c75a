//! One sync run: pick the newest report on the FTP drop, normalize it, and
//! replace the write window of the destination worksheet.

use std::path::Path;

use chrono::{DateTime, FixedOffset, Utc};
use ftpsheet_adapters::{parse_with_options, ParseOptions};
use ftpsheet_core::{error_chain, RemoteFileDescriptor, SyncError, SyncResult, SyncTarget};
use ftpsheet_remote::{
    Credentials, FtpConfig, FtpFileSource, RemoteFileSource, SheetService, SheetsClient,
    SheetsClientConfig,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

pub mod clock;
pub mod config;
pub mod normalize;
pub mod orchestrate;
pub mod schedule;
pub mod select;

pub use clock::display_timestamp;
pub use config::{ConfigError, FileConfig, SelectionStrategyKind, SyncConfig};
pub use normalize::normalize;
pub use orchestrate::sync;
pub use schedule::run_scheduled;
pub use select::{
    discover_candidates, select_latest, select_with, strategy_for, SelectionStrategy,
    TimestampOnly, TimestampThenName,
};

pub const CRATE_NAME: &str = "ftpsheet-sync";

/// Collaborators for one run, built by the caller and lent to the pipeline.
pub struct SyncContext<'a> {
    pub run_id: Uuid,
    pub source: &'a mut dyn RemoteFileSource,
    pub sheets: &'a mut dyn SheetService,
}

impl<'a> SyncContext<'a> {
    pub fn new(source: &'a mut dyn RemoteFileSource, sheets: &'a mut dyn SheetService) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source,
            sheets,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: RemoteFileDescriptor,
    pub content_sha256: String,
    pub result: SyncResult,
}

#[derive(Debug, Clone, Serialize)]
pub enum RunOutcome {
    Synced(RunReport),
    /// Nothing eligible on the drop; the run is a no-op.
    NoCandidates,
}

impl RunOutcome {
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Synced(report) => format!(
                "synced {} ({} rows x {} columns) at {}",
                report.result.filename,
                report.result.rows_written,
                report.result.columns_written,
                report.result.timestamp
            ),
            RunOutcome::NoCandidates => "no candidate files; nothing to sync".to_string(),
        }
    }
}

pub struct SyncPipeline {
    target: SyncTarget,
    strategy: Box<dyn SelectionStrategy>,
    parse_options: ParseOptions,
    utc_offset: FixedOffset,
}

impl SyncPipeline {
    pub fn new(target: SyncTarget, utc_offset: FixedOffset) -> Self {
        Self {
            target,
            strategy: Box::new(TimestampThenName),
            parse_options: ParseOptions::default(),
            utc_offset,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.target.clone(), config.utc_offset)
            .with_strategy(strategy_for(config.selection))
            .with_parse_options(ParseOptions {
                delimiter: config.csv_delimiter,
            })
    }

    pub fn with_strategy(mut self, strategy: Box<dyn SelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Runs discover, select, retrieve, parse, normalize and sync in order.
    /// Nothing is written to the sheet unless the file parsed.
    pub fn run_once(&self, ctx: SyncContext<'_>, now: DateTime<Utc>) -> Result<RunOutcome, SyncError> {
        let SyncContext {
            run_id,
            source,
            sheets,
        } = ctx;
        let span = info_span!("sync_run", %run_id);
        let _entered = span.enter();

        let candidates = discover_candidates(&mut *source)?;
        let chosen = match select_with(self.strategy.as_ref(), &candidates) {
            Ok(chosen) => chosen,
            Err(SyncError::NoCandidateFiles) => {
                info!(strategy = self.strategy.name(), "no candidate files; nothing to do");
                if let Err(err) = source.close() {
                    warn!(error = %error_chain(&err), "closing remote session failed");
                }
                return Ok(RunOutcome::NoCandidates);
            }
            Err(err) => return Err(err),
        };
        info!(
            file = %chosen.name,
            modified_at = ?chosen.modified_at,
            size = chosen.size,
            strategy = self.strategy.name(),
            "selected remote file"
        );

        let bytes = source.retrieve(&chosen.name).map_err(|err| {
            error!(file = %chosen.name, error = %error_chain(&err), "retrieving file failed");
            SyncError::SourceUnavailable {
                action: format!("retrieving {}", chosen.name),
                source: Box::new(err),
            }
        })?;
        if let Err(err) = source.close() {
            warn!(error = %error_chain(&err), "closing remote session failed");
        }
        let content_sha256 = hex::encode(Sha256::digest(&bytes));
        info!(file = %chosen.name, bytes = bytes.len(), sha256 = %content_sha256, "retrieved file");

        let table = parse_with_options(&chosen.name, &bytes, &self.parse_options).map_err(|err| {
            error!(error = %error_chain(&err), "parse failed; nothing written");
            err
        })?;
        let table = normalize(table, self.target.max_columns);
        let now_display = display_timestamp(now, self.utc_offset);

        let result = sync(sheets, &self.target, &table, &chosen.name, &now_display)?;
        Ok(RunOutcome::Synced(RunReport {
            run_id,
            source: chosen,
            content_sha256,
            result,
        }))
    }
}

/// Loads configuration (file at `path`, then environment) and runs once.
pub fn run_sync_once_from_env(path: Option<&Path>) -> Result<RunOutcome, SyncError> {
    let config = SyncConfig::load(path).map_err(|err| {
        error!(error = %error_chain(&err), "configuration incomplete; aborting");
        SyncError::from(err)
    })?;
    run_sync_once(&config)
}

/// Connects the production collaborators described by `config` and runs once.
pub fn run_sync_once(config: &SyncConfig) -> Result<RunOutcome, SyncError> {
    let mut source = connect_source(&config.ftp)?;
    let mut sheets = SheetsClient::new(
        SheetsClientConfig {
            api_base: config.sheets_api_base.clone(),
            ..SheetsClientConfig::default()
        },
        Credentials::ServiceAccount(config.service_account.clone()),
    )
    .map_err(|err| SyncError::DestinationUnavailable {
        worksheet: config.target.worksheet_name.clone(),
        source: Box::new(err),
    })?;

    let pipeline = SyncPipeline::from_config(config);
    pipeline.run_once(SyncContext::new(&mut source, &mut sheets), Utc::now())
}

/// Eligible files on the drop and the one `kind` would pick. Never touches the sheet.
pub fn inspect_candidates(
    ftp: &FtpConfig,
    kind: SelectionStrategyKind,
) -> Result<(Vec<RemoteFileDescriptor>, Option<RemoteFileDescriptor>), SyncError> {
    let mut source = connect_source(ftp)?;
    let candidates = discover_candidates(&mut source)?;
    let chosen = strategy_for(kind).select(&candidates).cloned();
    if let Err(err) = source.close() {
        warn!(error = %error_chain(&err), "closing remote session failed");
    }
    Ok((candidates, chosen))
}

fn connect_source(ftp: &FtpConfig) -> Result<FtpFileSource, SyncError> {
    FtpFileSource::connect(ftp).map_err(|err| {
        error!(host = %ftp.host, error = %error_chain(&err), "ftp connection failed");
        SyncError::SourceUnavailable {
            action: format!("connecting to {}:{}", ftp.host, ftp.port),
            source: Box::new(err),
        }
    })
}
