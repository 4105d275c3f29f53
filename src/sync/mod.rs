//! Sync orchestration
//!
//! A sync runs against a working copy of the device state. Sessions and
//! summaries must both merge for anything to be kept; title names are best
//! effort. Only a fully merged result is persisted and swapped in, so a
//! failed sync leaves the device on its pre-sync data.

pub mod worker;

pub use worker::SyncWorker;

use std::fmt;

use thiserror::Error;
use tokio::sync::watch;

use crate::backup::SnapshotId;
use crate::merge::{merge_title_names, recompute_totals, MergeError, RecordMerge};
use crate::network::{NetError, Role, SyncPeer};
use crate::record::{Session, Summary, TitleName};
use crate::storage::{DeviceState, StorageError, Workspace};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sync worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Short text for a status bar.
    pub fn status_line(&self) -> String {
        match self {
            SyncError::Net(NetError::Cancelled) => "Sync cancelled".to_string(),
            SyncError::Storage(_) => "SD save failed".to_string(),
            _ => "Sync failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Connecting,
    ExchangingSessions,
    ExchangingSummaries,
    ExchangingNames,
    Recomputing,
    Saving,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncPhase::Connecting => "Connecting...",
            SyncPhase::ExchangingSessions => "Exchanging sessions...",
            SyncPhase::ExchangingSummaries => "Syncing app list...",
            SyncPhase::ExchangingNames => "Exchanging title names...",
            SyncPhase::Recomputing => "Recomputing totals...",
            SyncPhase::Saving => "Saving...",
            SyncPhase::Done => "Sync complete",
            SyncPhase::Failed => "Sync failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub role: Role,
    /// Sessions the peer had that this device did not.
    pub new_sessions: usize,
    /// Titles the peer had that this device did not.
    pub new_titles: usize,
    /// `None` when the name exchange failed.
    pub new_names: Option<usize>,
    pub total_sessions: usize,
    pub total_titles: usize,
    /// Backup of the merged snapshot as it was before this sync.
    pub backup: Option<SnapshotId>,
    pub sync_count: u32,
}

impl SyncReport {
    pub fn status_line(&self) -> String {
        format!(
            "Synced: +{} sess +{} apps",
            self.new_sessions, self.new_titles
        )
    }
}

fn report_phase(phase: Option<&watch::Sender<SyncPhase>>, next: SyncPhase) {
    if let Some(tx) = phase {
        tx.send_replace(next);
    }
    log::debug!("sync phase: {}", next);
}

/// Run one full sync with `peer` and swap the merged result into `state`.
///
/// On error `state` is unchanged and nothing has been persisted, except
/// that a storage failure after the merged file was written is possible.
pub async fn run_sync(
    state: &mut DeviceState,
    peer: &mut SyncPeer,
    workspace: &Workspace,
    cancel: &mut watch::Receiver<bool>,
    phase: Option<&watch::Sender<SyncPhase>>,
) -> Result<SyncReport, SyncError> {
    let result = sync_steps(state, peer, workspace, cancel, phase).await;
    peer.shutdown();
    match &result {
        Ok(report) => {
            report_phase(phase, SyncPhase::Done);
            log::info!("{}", report.status_line());
        }
        Err(e) => {
            report_phase(phase, SyncPhase::Failed);
            log::warn!("Sync failed: {}", e);
        }
    }
    result
}

async fn sync_steps(
    state: &mut DeviceState,
    peer: &mut SyncPeer,
    workspace: &Workspace,
    cancel: &mut watch::Receiver<bool>,
    phase: Option<&watch::Sender<SyncPhase>>,
) -> Result<SyncReport, SyncError> {
    report_phase(phase, SyncPhase::Connecting);
    peer.connect(cancel).await?;

    let mut working = state.clone();

    report_phase(phase, SyncPhase::ExchangingSessions);
    let remote: Vec<Session> = peer
        .exchange(working.store.sessions.as_slice(), cancel)
        .await?;
    let new_sessions = working.store.sessions.reconcile(&remote[..])?;

    report_phase(phase, SyncPhase::ExchangingSummaries);
    let remote: Vec<Summary> = peer
        .exchange(&working.store.summaries.live(), cancel)
        .await?;
    let new_titles = working.store.summaries.reconcile(&remote[..])?;

    report_phase(phase, SyncPhase::ExchangingNames);
    let new_names = match peer
        .exchange::<TitleName>(working.names.as_slice(), cancel)
        .await
    {
        Ok(remote) => Some(merge_title_names(&mut working.names, &remote)),
        Err(NetError::Cancelled) => return Err(NetError::Cancelled.into()),
        Err(e) => {
            log::warn!("Title name exchange failed, continuing without: {}", e);
            None
        }
    };

    report_phase(phase, SyncPhase::Recomputing);
    recompute_totals(&mut working.store.summaries, &working.store.sessions);

    report_phase(phase, SyncPhase::Saving);
    let backup = workspace.persist(&working.store).await?;
    if new_names.is_some() {
        if let Err(e) = workspace.save_names(&working.names).await {
            log::warn!("Could not save title names: {}", e);
        }
    }
    working.sync_count = working.sync_count.saturating_add(1);
    workspace.save_sync_count(working.sync_count).await?;

    let report = SyncReport {
        role: peer.role(),
        new_sessions,
        new_titles,
        new_names,
        total_sessions: working.store.sessions.len(),
        total_titles: working.store.summaries.len(),
        backup,
        sync_count: working.sync_count,
    };
    *state = working;
    Ok(report)
}
