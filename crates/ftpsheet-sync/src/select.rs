//! Remote file eligibility and latest-file selection.

use ftpsheet_core::{error_chain, file_extension, RemoteFileDescriptor, SyncError, SUPPORTED_EXTENSIONS};
use ftpsheet_remote::RemoteFileSource;
use tracing::{debug, error, info};

use crate::config::SelectionStrategyKind;

/// Supported extension and not a `.`/`..` directory marker.
pub fn is_eligible_name(name: &str) -> bool {
    if name == "." || name == ".." {
        return false;
    }
    file_extension(name)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Lists the remote directory and builds descriptors for every eligible file.
///
/// Names are filtered before any per-file query; a failed size query drops the
/// file, a failed timestamp query leaves `modified_at` empty.
pub fn discover_candidates(
    source: &mut dyn RemoteFileSource,
) -> Result<Vec<RemoteFileDescriptor>, SyncError> {
    let names = source.list_names().map_err(|err| {
        error!(error = %error_chain(&err), "listing remote directory failed");
        SyncError::SourceUnavailable {
            action: "listing directory".to_string(),
            source: Box::new(err),
        }
    })?;

    let mut candidates = Vec::new();
    for name in names {
        if !is_eligible_name(&name) {
            continue;
        }
        let size = match source.size(&name) {
            Ok(size) => size,
            Err(err) => {
                debug!(name = %name, error = %err, "size query failed; skipping");
                continue;
            }
        };
        let modified_at = source.modified_at(&name);
        candidates.push(RemoteFileDescriptor::new(name, modified_at, size));
    }
    info!(count = candidates.len(), "eligible remote files");
    Ok(candidates)
}

/// Picks one descriptor out of a candidate set.
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select<'a>(&self, candidates: &'a [RemoteFileDescriptor]) -> Option<&'a RemoteFileDescriptor>;
}

/// Newest modification time wins, ties go to the greatest name. When no file has
/// a timestamp the greatest name wins, so date-stamped names still sort correctly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampThenName;

impl SelectionStrategy for TimestampThenName {
    fn name(&self) -> &'static str {
        "timestamp-then-name"
    }

    fn select<'a>(&self, candidates: &'a [RemoteFileDescriptor]) -> Option<&'a RemoteFileDescriptor> {
        if candidates.iter().any(|c| c.modified_at.is_some()) {
            candidates
                .iter()
                .filter(|c| c.modified_at.is_some())
                .max_by(|a, b| (a.modified_at, &a.name).cmp(&(b.modified_at, &b.name)))
        } else {
            candidates.iter().max_by(|a, b| a.name.cmp(&b.name))
        }
    }
}

/// Only files with a known modification time are considered; no name fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampOnly;

impl SelectionStrategy for TimestampOnly {
    fn name(&self) -> &'static str {
        "timestamp-only"
    }

    fn select<'a>(&self, candidates: &'a [RemoteFileDescriptor]) -> Option<&'a RemoteFileDescriptor> {
        candidates
            .iter()
            .filter(|c| c.modified_at.is_some())
            .max_by(|a, b| (a.modified_at, &a.name).cmp(&(b.modified_at, &b.name)))
    }
}

pub fn strategy_for(kind: SelectionStrategyKind) -> Box<dyn SelectionStrategy> {
    match kind {
        SelectionStrategyKind::TimestampThenName => Box::new(TimestampThenName),
        SelectionStrategyKind::TimestampOnly => Box::new(TimestampOnly),
    }
}

pub fn select_with(
    strategy: &dyn SelectionStrategy,
    candidates: &[RemoteFileDescriptor],
) -> Result<RemoteFileDescriptor, SyncError> {
    strategy
        .select(candidates)
        .cloned()
        .ok_or(SyncError::NoCandidateFiles)
}

/// Two-tier default selection (timestamp, then name).
pub fn select_latest(candidates: &[RemoteFileDescriptor]) -> Result<RemoteFileDescriptor, SyncError> {
    select_with(&TimestampThenName, candidates)
}
