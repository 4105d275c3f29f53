//! Background sync task
//!
//! The worker owns the device state for the whole sync and hands it back
//! from [`SyncWorker::join`]. The caller can watch the phase and cancel,
//! but cannot touch the state while the sync runs.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::NetConfig;
use crate::network::{Role, SyncPeer};
use crate::storage::{DeviceState, Workspace};

use super::{run_sync, SyncError, SyncPhase, SyncReport};

type Outcome = (DeviceState, Result<SyncReport, SyncError>);

pub struct SyncWorker {
    phase: watch::Receiver<SyncPhase>,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<Outcome>,
}

impl SyncWorker {
    pub fn spawn(
        mut state: DeviceState,
        role: Role,
        config: NetConfig,
        workspace: Workspace,
    ) -> Self {
        let (phase_tx, phase) = watch::channel(SyncPhase::Connecting);
        let (cancel, mut cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut peer = SyncPeer::new(role, config);
            let result = run_sync(
                &mut state,
                &mut peer,
                &workspace,
                &mut cancel_rx,
                Some(&phase_tx),
            )
            .await;
            (state, result)
        });

        Self {
            phase,
            cancel,
            handle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// A receiver that sees every phase change.
    pub fn phases(&self) -> watch::Receiver<SyncPhase> {
        self.phase.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the sync to stop. Open sockets are closed at the next await.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for the sync and take the device state back.
    pub async fn join(self) -> Result<Outcome, SyncError> {
        self.handle
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))
    }
}
