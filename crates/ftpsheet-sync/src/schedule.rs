use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use ftpsheet_core::error_chain;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::run_sync_once;

/// Clears the in-flight flag when a run finishes, panics included.
pub struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Claims the run slot. `None` while another run still holds its guard.
pub fn try_begin_run(in_flight: &Arc<AtomicBool>) -> Option<RunGuard> {
    if in_flight.swap(true, Ordering::SeqCst) {
        return None;
    }
    Some(RunGuard(Arc::clone(in_flight)))
}

/// Cron job that runs one blocking sync per tick, skipping ticks that overlap a run.
pub fn sync_job(cron: &str, config: Arc<SyncConfig>, in_flight: Arc<AtomicBool>) -> Result<Job> {
    Job::new_async(cron, move |_uuid, _l| {
        let config = Arc::clone(&config);
        let in_flight = Arc::clone(&in_flight);
        Box::pin(async move {
            let Some(guard) = try_begin_run(&in_flight) else {
                warn!("previous sync still running; skipping this tick");
                return;
            };
            let outcome = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                run_sync_once(&config)
            })
            .await;
            match outcome {
                Ok(Ok(outcome)) => info!(summary = %outcome.summary(), "scheduled sync finished"),
                Ok(Err(err)) => error!(error = %error_chain(&err), "scheduled sync failed"),
                Err(join_err) => error!(error = %join_err, "scheduled sync task panicked"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))
}

/// Runs one sync per cron tick until Ctrl-C. Runs never overlap.
pub async fn run_scheduled(config: SyncConfig) -> Result<()> {
    let cron = config.sync_cron.clone();
    let job = sync_job(&cron, Arc::new(config), Arc::new(AtomicBool::new(false)))?;

    let mut sched = JobScheduler::new().await.context("creating scheduler")?;
    sched.add(job).await.context("adding scheduler job")?;

    sched.start().await.context("starting scheduler")?;
    info!(cron = %cron, "scheduler started; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("stopping scheduler");
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, DEFAULT_SYNC_CRON};

    fn config() -> SyncConfig {
        SyncConfig::resolve(&FileConfig::default(), |key: &str| {
            let value = match key {
                "FTP_HOST" => "ftp.example.com",
                "FTP_USER" => "reports",
                "FTP_PASS" => "hunter2",
                "FTP_DIR" => "/outbound",
                "SPREADSHEET_ID" => "sheet123",
                "GOOGLE_SERVICE_ACCOUNT_JSON" => {
                    r#"{"client_email":"svc@demo.iam.gserviceaccount.com","private_key":"pem"}"#
                }
                _ => return None,
            };
            Some(value.to_string())
        })
        .expect("config")
    }

    #[test]
    fn second_run_is_refused_while_first_holds_the_guard() {
        let in_flight = Arc::new(AtomicBool::new(false));

        let first = try_begin_run(&in_flight).expect("first run starts");
        assert!(try_begin_run(&in_flight).is_none());

        drop(first);
        assert!(!in_flight.load(Ordering::SeqCst));
        assert!(try_begin_run(&in_flight).is_some());
    }

    #[tokio::test]
    async fn default_cron_builds_a_job() {
        let config = config();
        assert_eq!(config.sync_cron, DEFAULT_SYNC_CRON);
        let job = sync_job(
            &config.sync_cron,
            Arc::new(config.clone()),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(job.is_ok(), "{:?}", job.err());
    }

    #[tokio::test]
    async fn malformed_cron_is_reported() {
        let err = sync_job("every hour", Arc::new(config()), Arc::new(AtomicBool::new(false)))
            .err()
            .expect("bad cron");
        assert!(err.to_string().contains("every hour"));
    }
}
