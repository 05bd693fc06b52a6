use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use runsync_core::{update, AppState, FeedbackAction, Msg, RunId};
use runsync_engine::{
    EngineEvent, EngineHandle, KeyValueStore, RunBackend, RunStores, StartRunRequest,
};
use runsync_logging::{sync_debug, sync_info};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::effects::{map_event, EffectRunner};
use crate::render::Renderer;

/// Why [`Session::watch`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The tracked run reached a terminal state (or nothing was tracked).
    Settled,
    /// The user left; the run keeps going on the backend and can be resumed.
    Detached,
}

/// One process-lifetime of run tracking: owns the state and drives its effects.
pub struct Session<S> {
    state: AppState,
    runner: EffectRunner<S>,
    events: UnboundedReceiver<EngineEvent>,
    renderer: Renderer,
}

impl<S: KeyValueStore> Session<S> {
    /// Must be called within a tokio runtime. Restores the durable history.
    pub fn open(stores: RunStores<S>, backend: Arc<dyn RunBackend>, poll_interval: Duration) -> Self {
        let (engine, events) = EngineHandle::new(backend, poll_interval);
        let history = stores.load_history();
        let mut session = Self {
            state: AppState::new(),
            runner: EffectRunner::new(stores, engine),
            events,
            renderer: Renderer::default(),
        };
        session.dispatch(Msg::HistoryRestored(history));
        session
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn stores(&self) -> &RunStores<S> {
        self.runner.stores()
    }

    /// Resumes the run recorded in durable metadata. Returns whether a run is now tracked.
    pub fn resume(&mut self) -> bool {
        let Some(metadata) = self.stores().load_run_metadata() else {
            sync_debug!("No run metadata to resume");
            return false;
        };
        self.dispatch(Msg::ResumeRequested {
            metadata,
            at: Utc::now(),
        });
        self.state.active().is_some()
    }

    /// Starts a run and waits for the backend to accept it.
    pub async fn start(&mut self, request: StartRunRequest) -> Result<RunId> {
        self.runner.start_run(request);
        loop {
            let event = self
                .events
                .recv()
                .await
                .ok_or_else(|| anyhow!("engine stopped before the run was accepted"))?;
            let is_start = matches!(event, EngineEvent::RunStartCompleted { .. });
            self.dispatch(map_event(event, Utc::now()));
            if is_start {
                break;
            }
        }

        match (self.state.active(), self.state.start_error()) {
            (_, Some(error)) => Err(anyhow!("{error}")),
            (Some(handle), None) => Ok(handle.run_id.clone()),
            (None, None) => Err(anyhow!("run was not started")),
        }
    }

    /// Follows the tracked run until it settles, printing status changes to `out`.
    ///
    /// Lines read from `input` answer a pending feedback prompt (`continue`,
    /// `cancel`) or leave (`quit`). Ctrl-C also leaves. Leaving keeps the run
    /// metadata so a later session can resume.
    pub async fn watch<R>(&mut self, input: R, out: &mut impl Write) -> Result<WatchOutcome>
    where
        R: AsyncBufRead + Unpin,
    {
        print(out, self.rendered_lines())?;

        let mut lines = input.lines();
        let mut input_open = true;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        while self.state.active().is_some() {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    if self.dispatch(map_event(event, Utc::now())) {
                        print(out, self.rendered_lines())?;
                    }
                }
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => {
                        if !self.handle_command(line.trim(), out)? {
                            self.shutdown();
                            return Ok(WatchOutcome::Detached);
                        }
                    }
                    Ok(None) | Err(_) => input_open = false,
                },
                _ = &mut ctrl_c => {
                    writeln!(out, "Interrupted; run `runsync resume` to continue watching.")?;
                    self.shutdown();
                    return Ok(WatchOutcome::Detached);
                }
            }
        }
        Ok(WatchOutcome::Settled)
    }

    /// Removes a history entry after the caller confirmed it. Returns whether it existed.
    pub fn remove(&mut self, run_id: &str) -> bool {
        let existed = self.state.history().contains(run_id);
        self.dispatch(Msg::RemoveConfirmed {
            run_id: run_id.to_string(),
        });
        existed
    }

    /// Stops tracking. Durable metadata is left in place.
    pub fn shutdown(&mut self) {
        self.dispatch(Msg::Shutdown);
        self.runner.shutdown();
    }

    /// Returns `false` when the user asked to leave.
    fn handle_command(&mut self, command: &str, out: &mut impl Write) -> Result<bool> {
        let action = match command {
            "" => return Ok(true),
            "quit" | "exit" => {
                writeln!(out, "Leaving; run `runsync resume` to continue watching.")?;
                return Ok(false);
            }
            other => match other.parse::<FeedbackAction>() {
                Ok(action) => action,
                Err(_) => {
                    writeln!(out, "Unknown command {other:?}; use continue, cancel or quit.")?;
                    return Ok(true);
                }
            },
        };

        let Some(run_id) = self.state.polling().run_id.clone() else {
            return Ok(true);
        };
        if self.state.polling().human_feedback.is_none() {
            writeln!(out, "No input is requested right now.")?;
            return Ok(true);
        }
        sync_info!("User chose {} for run {}", action, run_id);
        self.dispatch(Msg::FeedbackRequested { run_id, action });
        Ok(true)
    }

    /// Applies `msg`, runs its effects, and reports whether the view changed.
    fn dispatch(&mut self, msg: Msg) -> bool {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.runner.run(effects, &self.state);
        self.state.consume_dirty()
    }

    fn rendered_lines(&mut self) -> Vec<String> {
        let view = self.state.view();
        self.renderer.render(&view)
    }
}

fn print(out: &mut impl Write, lines: Vec<String>) -> Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}
