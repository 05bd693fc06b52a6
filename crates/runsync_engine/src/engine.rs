use std::sync::Arc;
use std::time::Duration;

use runsync_core::{FeedbackAction, RunId};
use runsync_logging::{sync_debug, sync_info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::poller::{poll_run, PollSchedule};
use crate::{EngineEvent, RunBackend, StartRunRequest};

struct PollTask {
    run_id: RunId,
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Executes backend IO on the ambient tokio runtime and reports results as
/// [`EngineEvent`]s. At most one polling schedule exists at a time.
pub struct EngineHandle {
    backend: Arc<dyn RunBackend>,
    event_tx: UnboundedSender<EngineEvent>,
    poll_interval: Duration,
    poll: Option<PollTask>,
}

impl EngineHandle {
    /// Must be called within a tokio runtime.
    pub fn new(
        backend: Arc<dyn RunBackend>,
        poll_interval: Duration,
    ) -> (Self, UnboundedReceiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = Self {
            backend,
            event_tx,
            poll_interval,
            poll: None,
        };
        (handle, event_rx)
    }

    pub fn start_run(&self, request: StartRunRequest) {
        let backend = self.backend.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = backend.start_run(&request).await;
            let _ = event_tx.send(EngineEvent::RunStartCompleted { request, result });
        });
    }

    /// Replaces any current schedule with one for `run_id`.
    pub fn start_polling(&mut self, run_id: RunId, generation: u64) {
        self.cancel_poll();
        sync_info!(
            "Polling run {} every {:?} (generation {})",
            run_id,
            self.poll_interval,
            generation
        );
        let cancel = CancellationToken::new();
        let schedule = PollSchedule {
            run_id: run_id.clone(),
            generation,
            interval: self.poll_interval,
        };
        let handle = tokio::spawn(poll_run(
            self.backend.clone(),
            schedule,
            cancel.clone(),
            self.event_tx.clone(),
        ));
        self.poll = Some(PollTask {
            run_id,
            generation,
            cancel,
            handle,
        });
    }

    /// Stops the schedule if it still belongs to `generation`.
    pub fn stop_polling(&mut self, generation: u64) {
        if self
            .poll
            .as_ref()
            .is_some_and(|task| task.generation == generation)
        {
            self.cancel_poll();
        }
    }

    /// Whether a schedule is still running.
    pub fn is_polling(&self) -> bool {
        self.poll
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub fn send_feedback(&self, run_id: RunId, action: FeedbackAction) {
        let backend = self.backend.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = backend.send_feedback(&run_id, action).await;
            let _ = event_tx.send(EngineEvent::FeedbackCompleted {
                run_id,
                action,
                result,
            });
        });
    }

    /// Tears down the polling schedule. Outstanding results are discarded.
    pub fn shutdown(&mut self) {
        self.cancel_poll();
    }

    fn cancel_poll(&mut self) {
        if let Some(task) = self.poll.take() {
            sync_debug!(
                "Cancelling poll of run {} (generation {})",
                task.run_id,
                task.generation
            );
            task.cancel.cancel();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel_poll();
    }
}
