use runsync_logging::{sync_debug, sync_info, sync_warn};

use crate::reducer::{failure, reduce, CANCELLED_MESSAGE};
use crate::{AppState, Effect, FeedbackAction, Msg, RunMetadata, RunStatus};

const MISSING_RUN_ID: &str = "Missing run identifier from backend response.";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::HistoryRestored(entries) => {
            state.restore_history(entries);
            Vec::new()
        }
        Msg::RunStarted {
            run_id,
            query,
            report_length,
            created_at,
        } => {
            if run_id.trim().is_empty() {
                state.set_start_error(MISSING_RUN_ID.to_string());
                return (state, Vec::new());
            }
            let previous = state.active().map(|handle| handle.generation);
            let handle = state.start_run(&run_id, &query, created_at);
            sync_info!("Tracking new run {} (generation {})", run_id, handle.generation);

            let mut effects = Vec::with_capacity(4);
            if let Some(generation) = previous {
                effects.push(Effect::StopPolling { generation });
            }
            effects.push(Effect::PersistRunMetadata(RunMetadata::new(
                run_id.clone(),
                query,
                report_length,
                created_at,
            )));
            effects.push(Effect::PersistHistory);
            effects.push(Effect::StartPolling {
                run_id,
                generation: handle.generation,
            });
            effects
        }
        Msg::RunStartFailed { error } => {
            state.set_start_error(error);
            Vec::new()
        }
        Msg::ResumeRequested { metadata, at } => resume(&mut state, metadata, at),
        Msg::StatusChecked {
            run_id,
            generation,
            response,
            at,
        } => {
            if !state.accepts(&run_id, generation) {
                sync_debug!(
                    "Discarding stale status result for run {} (generation {})",
                    run_id,
                    generation
                );
                return (state, Vec::new());
            }
            let last_progress = state.history().last_progress(&run_id);
            let reduction = reduce(&response, last_progress, at);
            let terminal = reduction.is_terminal();
            state.apply_reduction(&run_id, reduction);

            let mut effects = vec![Effect::PersistHistory];
            if terminal {
                sync_info!("Run {} reached {}", run_id, state.polling().status);
                effects.push(Effect::ClearRunMetadata { run_id });
                effects.push(Effect::StopPolling { generation });
            }
            effects
        }
        Msg::FeedbackRequested { run_id, action } => {
            if state.tracked_run(&run_id).is_none() {
                sync_warn!("Cannot send {} event: run {} is not tracked", action, run_id);
                return (state, Vec::new());
            }
            state.set_feedback_error(None);
            vec![Effect::SendFeedback { run_id, action }]
        }
        Msg::FeedbackSent { run_id, action, at } => {
            state.answer_feedback(&run_id);
            if action != FeedbackAction::Cancel {
                return (state, Vec::new());
            }
            let Some(handle) = state.tracked_run(&run_id).cloned() else {
                return (state, Vec::new());
            };
            let last_progress = state.history().last_progress(&run_id);
            state.apply_reduction(&run_id, failure(CANCELLED_MESSAGE, last_progress, at));
            sync_info!("Run {} cancelled by user", run_id);
            vec![
                Effect::PersistHistory,
                Effect::ClearRunMetadata { run_id },
                Effect::StopPolling {
                    generation: handle.generation,
                },
            ]
        }
        Msg::FeedbackFailed {
            run_id,
            action,
            error,
        } => {
            sync_warn!("Feedback {} for run {} failed: {}", action, run_id, error);
            state.set_feedback_error(Some(format!("Failed to send {action} event: {error}")));
            Vec::new()
        }
        Msg::RemoveConfirmed { run_id } => {
            let removal = state.remove_run(&run_id);
            let mut effects = Vec::with_capacity(3);
            if removal.removed {
                effects.push(Effect::PersistHistory);
            }
            if let Some(handle) = removal.stopped {
                effects.push(Effect::StopPolling {
                    generation: handle.generation,
                });
            }
            effects.push(Effect::ClearRunMetadata { run_id });
            effects
        }
        Msg::Shutdown => match state.detach() {
            Some(handle) => vec![Effect::StopPolling {
                generation: handle.generation,
            }],
            None => Vec::new(),
        },
    };

    (state, effects)
}

fn resume(state: &mut AppState, metadata: RunMetadata, at: crate::Timestamp) -> Vec<Effect> {
    if let Some(active) = state.active() {
        // Only one schedule may drive a run; an explicit start also wins over a resume.
        sync_debug!(
            "Ignoring resume of {}: run {} is already tracked",
            metadata.run_id,
            active.run_id
        );
        return Vec::new();
    }

    let settled = state
        .history()
        .get(&metadata.run_id)
        .is_some_and(|entry| entry.status.is_terminal());
    if settled {
        sync_info!(
            "Run {} already settled in history; dropping stale metadata",
            metadata.run_id
        );
        return vec![Effect::ClearRunMetadata {
            run_id: metadata.run_id,
        }];
    }

    let (handle, synthesized) = state.resume_run(&metadata, at);
    sync_info!(
        "Resuming run {} (generation {}, restored entry: {})",
        handle.run_id,
        handle.generation,
        synthesized
    );
    debug_assert_eq!(state.polling().status, RunStatus::Running);

    let mut effects = Vec::with_capacity(2);
    if synthesized {
        effects.push(Effect::PersistHistory);
    }
    effects.push(Effect::StartPolling {
        run_id: handle.run_id,
        generation: handle.generation,
    });
    effects
}
