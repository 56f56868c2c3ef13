//! Background heartbeats for a held task lock.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::LockCoordinator;
use crate::util::blocking;
use crate::{twlog_debug, twlog_error};

/// Keeps a task lock fresh while long-running work proceeds.
///
/// Dropping the handle stops the loop after its current tick.
pub struct HeartbeatHandle {
    issue: u64,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn issue(&self) -> u64 {
        self.issue
    }

    /// True once the loop has ended, either stopped or after a failed heartbeat.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

impl LockCoordinator {
    /// Heartbeat the lock for `issue` every `interval` on the current tokio runtime.
    ///
    /// The loop ends on the first failed heartbeat (lock lost or local I/O
    /// error); the failure is logged and [`HeartbeatHandle::is_finished`]
    /// turns true.
    pub fn spawn_heartbeat(&self, issue: u64, interval: Duration) -> HeartbeatHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let coordinator = self.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {
                        let c = coordinator.clone();
                        match blocking(move || c.heartbeat(issue)).await {
                            Ok(()) => twlog_debug!("Heartbeat written for issue #{}", issue),
                            Err(e) => {
                                twlog_error!("Heartbeat for issue #{} failed: {}", issue, e);
                                break;
                            }
                        }
                    }
                }
            }
        });

        HeartbeatHandle {
            issue,
            stop: Some(stop_tx),
            task,
        }
    }
}
