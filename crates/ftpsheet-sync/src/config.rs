//! Run configuration: environment variables over an optional YAML file.
//!
//! Secrets (`FTP_PASS`, `GOOGLE_SERVICE_ACCOUNT_JSON`) are read from the
//! environment only.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use ftpsheet_core::{SyncError, SyncTarget, DEFAULT_WORKSHEET_NAME};
use ftpsheet_remote::sheets::DEFAULT_SHEETS_API_BASE;
use ftpsheet_remote::{FtpConfig, ServiceAccountKey};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_FTP_PORT: u16 = 21;
pub const DEFAULT_FTP_TIMEOUT_SECS: u64 = 60;
/// UTC+07:00 (Asia/Ho_Chi_Minh, no DST).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 7 * 60;
/// Top of every hour. Six fields: seconds come first.
pub const DEFAULT_SYNC_CRON: &str = "0 0 * * * *";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategyKind {
    #[default]
    TimestampThenName,
    TimestampOnly,
}

impl FromStr for SelectionStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp-then-name" => Ok(SelectionStrategyKind::TimestampThenName),
            "timestamp-only" => Ok(SelectionStrategyKind::TimestampOnly),
            other => Err(format!(
                "unknown strategy {other:?} (expected timestamp-then-name or timestamp-only)"
            )),
        }
    }
}

/// Non-secret settings that may come from a YAML file. Keys mirror the env names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub ftp_host: Option<String>,
    pub ftp_port: Option<u16>,
    pub ftp_user: Option<String>,
    pub ftp_dir: Option<String>,
    pub ftp_timeout_secs: Option<u64>,
    pub spreadsheet_id: Option<String>,
    pub worksheet_name: Option<String>,
    pub sync_utc_offset_minutes: Option<i32>,
    pub selection_strategy: Option<String>,
    pub csv_delimiter: Option<String>,
    pub sync_cron: Option<String>,
    pub sheets_api_base: Option<String>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Environment first, then the file value. Empty strings count as unset.
struct Layered<'a, E> {
    lookup: E,
    file: &'a FileConfig,
}

impl<E> Layered<'_, E>
where
    E: Fn(&str) -> Option<String>,
{
    fn env(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &'static str, file: &Option<String>) -> Option<String> {
        self.env(key)
            .or_else(|| file.clone().filter(|v| !v.trim().is_empty()))
    }

    fn required(&self, key: &'static str, file: &Option<String>) -> Result<String, ConfigError> {
        self.string(key, file).ok_or(ConfigError::Missing(key))
    }

    fn secret(&self, key: &'static str) -> Result<String, ConfigError> {
        self.env(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed<T>(&self, key: &'static str, file: Option<T>) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.env(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|err: T::Err| ConfigError::Invalid {
                    key,
                    reason: err.to_string(),
                }),
            None => Ok(file),
        }
    }
}

#[derive(Clone)]
pub struct SyncConfig {
    pub ftp: FtpConfig,
    pub target: SyncTarget,
    pub service_account: ServiceAccountKey,
    pub sheets_api_base: String,
    pub utc_offset: FixedOffset,
    pub selection: SelectionStrategyKind,
    pub csv_delimiter: u8,
    pub sync_cron: String,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("ftp", &self.ftp)
            .field("target", &self.target)
            .field("service_account", &self.service_account)
            .field("sheets_api_base", &self.sheets_api_base)
            .field("utc_offset", &self.utc_offset)
            .field("selection", &self.selection)
            .field("csv_delimiter", &(self.csv_delimiter as char))
            .field("sync_cron", &self.sync_cron)
            .finish()
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(&FileConfig::default(), |key| std::env::var(key).ok())
    }

    /// Reads `path` (if any) and layers the process environment over it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(&file, |key| std::env::var(key).ok())
    }

    pub fn resolve(
        file: &FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let layered = Layered { lookup: env, file };
        let ftp = resolve_ftp_layered(&layered)?;

        let spreadsheet_id = layered.required("SPREADSHEET_ID", &file.spreadsheet_id)?;
        let worksheet_name = layered
            .string("WORKSHEET_NAME", &file.worksheet_name)
            .unwrap_or_else(|| DEFAULT_WORKSHEET_NAME.to_string());

        let key_blob = layered.secret("GOOGLE_SERVICE_ACCOUNT_JSON")?;
        let service_account =
            ServiceAccountKey::from_json(&key_blob).map_err(|err| ConfigError::Invalid {
                key: "GOOGLE_SERVICE_ACCOUNT_JSON",
                reason: format!("not a service-account JSON document: {err}"),
            })?;

        let offset_minutes = layered
            .parsed("SYNC_UTC_OFFSET_MINUTES", file.sync_utc_offset_minutes)?
            .unwrap_or(DEFAULT_UTC_OFFSET_MINUTES);
        let utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::Invalid {
                key: "SYNC_UTC_OFFSET_MINUTES",
                reason: format!("{offset_minutes} is outside +/-24h"),
            })?;

        let selection = match layered.string("SELECTION_STRATEGY", &file.selection_strategy) {
            Some(raw) => raw.parse::<SelectionStrategyKind>().map_err(|reason| ConfigError::Invalid {
                key: "SELECTION_STRATEGY",
                reason,
            })?,
            None => SelectionStrategyKind::default(),
        };

        let csv_delimiter = match layered.string("CSV_DELIMITER", &file.csv_delimiter) {
            Some(raw) => parse_delimiter(&raw)?,
            None => b',',
        };

        Ok(Self {
            ftp,
            target: SyncTarget::new(spreadsheet_id, worksheet_name),
            service_account,
            sheets_api_base: layered
                .string("SHEETS_API_BASE", &file.sheets_api_base)
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            utc_offset,
            selection,
            csv_delimiter,
            sync_cron: layered
                .string("SYNC_CRON", &file.sync_cron)
                .unwrap_or_else(|| DEFAULT_SYNC_CRON.to_string()),
        })
    }
}

/// FTP settings alone, for commands that never touch the spreadsheet.
pub fn resolve_ftp(
    file: &FileConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<FtpConfig, ConfigError> {
    resolve_ftp_layered(&Layered { lookup: env, file })
}

pub fn load_ftp(path: Option<&Path>) -> Result<FtpConfig, ConfigError> {
    let file = match path {
        Some(path) => FileConfig::from_path(path)?,
        None => FileConfig::default(),
    };
    resolve_ftp(&file, |key| std::env::var(key).ok())
}

fn resolve_ftp_layered<E>(layered: &Layered<'_, E>) -> Result<FtpConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let file = layered.file;
    Ok(FtpConfig {
        host: layered.required("FTP_HOST", &file.ftp_host)?,
        port: layered
            .parsed("FTP_PORT", file.ftp_port)?
            .unwrap_or(DEFAULT_FTP_PORT),
        user: layered.required("FTP_USER", &file.ftp_user)?,
        password: layered.secret("FTP_PASS")?,
        directory: layered.required("FTP_DIR", &file.ftp_dir)?,
        timeout: Duration::from_secs(
            layered
                .parsed("FTP_TIMEOUT_SECS", file.ftp_timeout_secs)?
                .unwrap_or(DEFAULT_FTP_TIMEOUT_SECS),
        ),
    })
}

fn parse_delimiter(raw: &str) -> Result<u8, ConfigError> {
    match raw {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        _ if raw.len() == 1 && raw.is_ascii() => Ok(raw.as_bytes()[0]),
        _ => Err(ConfigError::Invalid {
            key: "CSV_DELIMITER",
            reason: format!("{raw:?} is not a single ASCII character"),
        }),
    }
}
