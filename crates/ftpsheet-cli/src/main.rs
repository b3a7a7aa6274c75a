use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ftpsheet_adapters::{parse_with_options, ParseOptions};
use ftpsheet_core::{error_chain, MAX_COLUMNS};
use ftpsheet_sync::config::load_ftp;
use ftpsheet_sync::{
    inspect_candidates, normalize, run_scheduled, run_sync_once_from_env, SelectionStrategyKind,
    SyncConfig,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ftpsheet")]
#[command(about = "Sync the newest FTP report into a Google Sheets worksheet")]
struct Cli {
    /// YAML file with non-secret settings; environment variables win over it.
    #[arg(long, global = true, env = "FTPSHEET_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync and exit.
    Sync,
    /// Run a sync on every SYNC_CRON tick until Ctrl-C.
    Schedule,
    /// List eligible remote files and the one that would be synced.
    Candidates {
        #[arg(long, default_value = "timestamp-then-name")]
        strategy: SelectionStrategyKind,
    },
    /// Parse and normalize a local file without touching any remote.
    Preview {
        path: PathBuf,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone();

    let result = match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => sync_once(config_path).await,
        Commands::Schedule => {
            let config = load_config(config_path.as_deref())?;
            run_scheduled(config).await
        }
        Commands::Candidates { strategy } => candidates(config_path, strategy).await,
        Commands::Preview { path, delimiter } => preview(&path, delimiter),
    };

    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "ftpsheet failed");
    }
    result
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    SyncConfig::load(path).map_err(|err| {
        error!(error = %error_chain(&err), "configuration incomplete; aborting");
        err.into()
    })
}

async fn sync_once(config_path: Option<PathBuf>) -> Result<()> {
    let outcome = tokio::task::spawn_blocking(move || run_sync_once_from_env(config_path.as_deref()))
        .await
        .context("sync task panicked")??;
    info!(summary = %outcome.summary(), "sync complete");
    println!("{}", outcome.summary());
    Ok(())
}

async fn candidates(config_path: Option<PathBuf>, strategy: SelectionStrategyKind) -> Result<()> {
    let ftp = load_ftp(config_path.as_deref())?;
    let (files, chosen) = tokio::task::spawn_blocking(move || inspect_candidates(&ftp, strategy))
        .await
        .context("listing task panicked")??;

    for file in &files {
        let modified = file
            .modified_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<40} {:>12} {}", file.name, file.size, modified);
    }
    match chosen {
        Some(file) => println!("selected: {}", file.name),
        None => println!("selected: none"),
    }
    Ok(())
}

fn preview(path: &Path, delimiter: char) -> Result<()> {
    let delimiter = u8::try_from(delimiter).context("delimiter must be a single ASCII character")?;
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let table = parse_with_options(&filename, &bytes, &ParseOptions { delimiter })?;
    let table = normalize(table, MAX_COLUMNS);
    println!("columns ({}): {}", table.column_count(), table.headers().join(" | "));
    println!("rows: {}", table.row_count());
    for row in table.rows().iter().take(5) {
        let cells: Vec<String> = row.iter().map(|c| c.display()).collect();
        println!("  {}", cells.join(" | "));
    }
    Ok(())
}
