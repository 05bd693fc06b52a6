use runsync_core::{AppState, Effect, Msg, StatusResponse, Timestamp};
use runsync_engine::{EngineEvent, EngineHandle, KeyValueStore, RunStores, StartRunRequest};
use runsync_logging::{sync_debug, sync_info, sync_warn};

/// Executes the effects produced by `update` against the stores and the engine.
pub struct EffectRunner<S> {
    stores: RunStores<S>,
    engine: EngineHandle,
}

impl<S: KeyValueStore> EffectRunner<S> {
    pub fn new(stores: RunStores<S>, engine: EngineHandle) -> Self {
        Self { stores, engine }
    }

    pub fn stores(&self) -> &RunStores<S> {
        &self.stores
    }

    pub fn start_run(&self, request: StartRunRequest) {
        sync_info!(
            "Starting {} run (query_len={})",
            request.report_length,
            request.query.len()
        );
        self.engine.start_run(request);
    }

    /// Effects are executed in order; `state` is the state they were produced with.
    pub fn run(&mut self, effects: Vec<Effect>, state: &AppState) {
        for effect in effects {
            match effect {
                Effect::PersistRunMetadata(metadata) => {
                    self.stores.save_run_metadata(&metadata);
                }
                Effect::ClearRunMetadata { run_id } => {
                    if !self.stores.clear_run_metadata_for(&run_id) {
                        sync_debug!("Run metadata does not belong to {}; kept", run_id);
                    }
                }
                Effect::PersistHistory => {
                    self.stores.save_history(state.history().entries());
                }
                Effect::StartPolling { run_id, generation } => {
                    self.engine.start_polling(run_id, generation);
                }
                Effect::StopPolling { generation } => {
                    self.engine.stop_polling(generation);
                }
                Effect::SendFeedback { run_id, action } => {
                    sync_info!("Sending {} for run {}", action, run_id);
                    self.engine.send_feedback(run_id, action);
                }
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.engine.shutdown();
    }
}

/// Translates an engine result into the message the core understands.
pub fn map_event(event: EngineEvent, at: Timestamp) -> Msg {
    match event {
        EngineEvent::RunStartCompleted { request, result } => match result {
            Ok(started) => Msg::RunStarted {
                run_id: started.run_id,
                query: request.query,
                report_length: request.report_length,
                created_at: started.created_at,
            },
            Err(err) => {
                sync_warn!("Run start failed ({}): {}", err.kind, err);
                Msg::RunStartFailed {
                    error: err.to_string(),
                }
            }
        },
        EngineEvent::StatusChecked {
            run_id,
            generation,
            result,
        } => {
            let response = match result {
                Ok(reply) => StatusResponse::Reply {
                    code: reply.code,
                    body: reply.body,
                },
                Err(err) => {
                    sync_warn!("Status check for run {} failed ({}): {}", run_id, err.kind, err);
                    StatusResponse::TransportFailed(err.to_string())
                }
            };
            Msg::StatusChecked {
                run_id,
                generation,
                response,
                at,
            }
        }
        EngineEvent::FeedbackCompleted {
            run_id,
            action,
            result,
        } => match result {
            Ok(()) => Msg::FeedbackSent { run_id, action, at },
            Err(err) => Msg::FeedbackFailed {
                run_id,
                action,
                error: err.to_string(),
            },
        },
    }
}
