//! Cooperative pause/cancel gates for an engine run.
//!
//! Every transfer checks `checkpoint` before issuing a request and between
//! chunks. Pause blocks the caller at the gate until resume or cancel;
//! cancel always unblocks and surfaces as a `Cancelled` transfer error.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::retry::TransferError;

pub struct DownloadControl {
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Default for DownloadControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused,
            cancel: CancellationToken::new(),
        }
    }

    /// Block all gates. In-flight transfers park at their next checkpoint.
    pub fn pause(&self) {
        self.paused.send_replace(true);
        tracing::info!("downloads paused");
    }

    /// Reopen the gates; parked transfers continue where they stopped.
    pub fn resume(&self) {
        self.paused.send_replace(false);
        tracing::info!("downloads resumed");
    }

    /// Cancel the run. Unblocks paused gates first so nothing stays parked.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.paused.send_replace(false);
        tracing::info!("downloads cancelled");
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Suspend while paused; fail with `Cancelled` once cancel is requested.
    pub async fn checkpoint(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        if !self.is_paused() {
            return Ok(());
        }
        let mut gate = self.paused.subscribe();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
            changed = gate.wait_for(|paused| !*paused) => match changed {
                Ok(_) => Ok(()),
                // Sender dropped: the run is being torn down.
                Err(_) => Err(TransferError::Cancelled),
            },
        }
    }
}
