//! Caller-side handle to a running shard

use super::{ConnectionPhase, GatewayCommand};
use crate::error::CommandError;
use crate::session::ShardInfo;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

pub(crate) type CommandReply = oneshot::Sender<Result<(), CommandError>>;
pub(crate) type CommandRequest = (GatewayCommand, CommandReply);

/// Handle to a shard's controller task
///
/// Dropping the handle stops the shard.
#[derive(Debug)]
pub struct ShardHandle {
    shard: ShardInfo,
    phase: watch::Receiver<ConnectionPhase>,
    commands: mpsc::Sender<CommandRequest>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ShardHandle {
    pub(crate) fn new(
        shard: ShardInfo,
        phase: watch::Receiver<ConnectionPhase>,
        commands: mpsc::Sender<CommandRequest>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            shard,
            phase,
            commands,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub const fn shard(&self) -> ShardInfo {
        self.shard
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// Subscribe to phase changes
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.clone()
    }

    /// Wait until the shard reaches `target`
    ///
    /// Fails with [`CommandError::Stopped`] if the shard stops first.
    pub async fn wait_for_phase(&self, target: ConnectionPhase) -> Result<(), CommandError> {
        let mut phase = self.phase.clone();
        phase
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| CommandError::Stopped)
    }

    /// Send a command; only succeeds while the shard is connected
    pub async fn send(&self, command: GatewayCommand) -> Result<(), CommandError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send((command, reply))
            .await
            .map_err(|_| CommandError::Stopped)?;
        outcome.await.map_err(|_| CommandError::Stopped)?
    }

    /// Ask the shard to stop without waiting for it
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Stop the shard and wait for its task to finish
    ///
    /// The socket is closed with a normal closure code, ending the session.
    pub async fn shutdown(&self) {
        self.request_shutdown();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(shard_id = self.shard.id, error = %e, "Shard task failed");
            }
        }
    }

    /// Whether the controller task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.lock().as_ref().map_or(true, JoinHandle::is_finished)
    }
}
