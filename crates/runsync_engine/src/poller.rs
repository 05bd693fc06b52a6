use std::sync::Arc;
use std::time::Duration;

use runsync_core::{RunId, STATUS_IN_PROGRESS};
use runsync_logging::{sync_debug, sync_trace};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::{EngineEvent, RunBackend};

/// Reference interval between status checks of a running run.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    pub run_id: RunId,
    pub generation: u64,
    pub interval: Duration,
}

/// Checks the run's status now and then every `interval` until a result
/// other than in-progress arrives, the receiver is gone, or `cancel` fires.
///
/// Checks are chained: the next one is only scheduled once the previous one
/// resolved, so at most one request per run is in flight. A request already
/// in flight when `cancel` fires is allowed to finish; its result is dropped.
pub async fn poll_run(
    backend: Arc<dyn RunBackend>,
    schedule: PollSchedule,
    cancel: CancellationToken,
    events: UnboundedSender<EngineEvent>,
) {
    let PollSchedule {
        run_id,
        generation,
        interval,
    } = schedule;

    while !cancel.is_cancelled() {
        sync_trace!("Checking status of run {} (generation {})", run_id, generation);
        let result = backend.run_status(&run_id).await;
        if cancel.is_cancelled() {
            sync_debug!("Dropping status of run {} after cancellation", run_id);
            return;
        }

        let in_progress = matches!(&result, Ok(reply) if reply.code == STATUS_IN_PROGRESS);
        let event = EngineEvent::StatusChecked {
            run_id: run_id.clone(),
            generation,
            result,
        };
        if events.send(event).is_err() || !in_progress {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
