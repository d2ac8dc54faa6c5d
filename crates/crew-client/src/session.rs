//! Per-session state fed by dispatcher events and the command API.

use crate::commands::{CommandClient, CommandError};
use crew_core::activity::{ActivityLevel, ActivityLog, Notification};
use crew_core::api::{CommandReply, CrewStatus, OutputsReply};
use crew_core::dispatch::{ClientEvent, CloseInfo, Dispatcher, EventName, ListenerId};
use crew_core::outputs::OutputStore;
use crew_core::progress::ProgressTracker;
use crew_core::protocol::{CrewMessage, WorkflowKind};
use crew_core::run::{RunGuard, RunRejection};
use crew_core::workflow::{OutputCategory, TaskSequence};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Rejected(#[from] RunRejection),
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug)]
pub struct SessionState {
    pub tracker: ProgressTracker,
    pub outputs: OutputStore,
    pub activity: ActivityLog,
    pub run: RunGuard,
    pub connected: bool,
    pub notification: Option<Notification>,
    pub last_status: Option<Value>,
    pub last_close: Option<CloseInfo>,
    /// Artifact the operator should be shown next, taken by the UI.
    pub focus: Option<OutputCategory>,
}

impl SessionState {
    pub fn new(sequence: TaskSequence) -> Self {
        Self {
            tracker: ProgressTracker::new(sequence.clone()),
            outputs: OutputStore::new(sequence),
            activity: ActivityLog::default(),
            run: RunGuard::new(),
            connected: false,
            notification: None,
            last_status: None,
            last_close: None,
            focus: None,
        }
    }

    pub fn notify(&mut self, level: ActivityLevel, text: impl Into<String>) {
        self.notification = Some(Notification::new(level, text));
    }

    /// Client count from the server's last `status` reply.
    pub fn server_connections(&self) -> Option<u64> {
        self.last_status
            .as_ref()
            .and_then(|status| status.get("connections"))
            .and_then(Value::as_u64)
    }

    pub fn apply_event(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::Connected => {
                self.connected = true;
                self.activity.push(ActivityLevel::Success, "WebSocket connected");
            }
            ClientEvent::Disconnected(close) => {
                self.connected = false;
                self.last_close = Some(close.clone());
                self.activity
                    .push(ActivityLevel::Warning, "WebSocket disconnected");
            }
            ClientEvent::Error(detail) => {
                self.activity
                    .push(ActivityLevel::Error, format!("WebSocket error: {detail}"));
            }
            ClientEvent::Status(value) => {
                self.last_status = Some(value.clone());
            }
            ClientEvent::CrewUpdate(message) => self.apply_crew_update(message),
        }
    }

    pub fn apply_crew_update(&mut self, message: &CrewMessage) {
        let agent = message.agent_name();
        let task = message.task_name();
        match message.kind {
            WorkflowKind::AgentStart => {
                self.activity.push(
                    ActivityLevel::Info,
                    format!("{agent} started working on {task}"),
                );
            }
            WorkflowKind::AgentThinking => {
                self.activity.push(
                    ActivityLevel::Info,
                    format!(
                        "{agent} is thinking: {}",
                        message.thought().unwrap_or_default()
                    ),
                );
            }
            WorkflowKind::AgentOutput => {
                self.activity
                    .push(ActivityLevel::Success, format!("{agent} completed {task}"));
                if let Some(output) = message.output() {
                    self.outputs
                        .update(agent, task, &output.output, output.output_type.as_deref());
                }
            }
            WorkflowKind::TaskComplete => {
                self.activity.push(
                    ActivityLevel::Success,
                    format!("Task {task} completed by {agent}"),
                );
            }
            WorkflowKind::CrewComplete => {
                self.run.finish();
                let outcome = message.crew_outcome();
                if outcome.success {
                    self.activity.push(
                        ActivityLevel::Success,
                        format!(
                            "Crew execution completed successfully in {:.2}s",
                            outcome.execution_time.unwrap_or_default()
                        ),
                    );
                    self.notify(
                        ActivityLevel::Success,
                        "Crew execution completed successfully!",
                    );
                    if outcome.final_result.is_some() {
                        self.activity.push(
                            ActivityLevel::Success,
                            "Final HTML output generated and ready for preview!",
                        );
                        self.focus = Some(OutputCategory::Html);
                    }
                } else {
                    self.activity.push(
                        ActivityLevel::Error,
                        format!(
                            "Crew execution failed: {}",
                            outcome.error_message.as_deref().unwrap_or("Unknown error")
                        ),
                    );
                    self.notify(ActivityLevel::Error, "Crew execution failed");
                }
            }
            WorkflowKind::Error => {
                self.activity.push(
                    ActivityLevel::Error,
                    format!("Error: {}", message.error_text()),
                );
            }
        }
        self.tracker.apply(message);
    }

    /// Checks the request and, if accepted, resets the views for a new run.
    pub fn begin_start(&mut self, text: &str) -> Result<String, RunRejection> {
        let request = match self.run.begin(text) {
            Ok(request) => request.to_string(),
            Err(rejection) => {
                self.notify(rejection_level(&rejection), rejection.to_string());
                return Err(rejection);
            }
        };
        self.outputs.clear_all();
        self.tracker.reset();
        self.activity.clear();
        self.activity
            .push(ActivityLevel::Info, "Starting crew execution...");
        Ok(request)
    }

    pub fn start_succeeded(&mut self, reply: &CommandReply) {
        self.run.accept();
        self.activity.push(
            ActivityLevel::Success,
            format!("Crew execution started: {}", reply.message),
        );
    }

    pub fn start_failed(&mut self, err: &CommandError) {
        self.run.rollback();
        self.activity
            .push(ActivityLevel::Error, format!("Error starting crew: {err}"));
        self.notify(ActivityLevel::Error, "Failed to start crew execution");
    }

    pub fn check_stop(&mut self) -> Result<(), RunRejection> {
        self.run.ensure_stoppable().map_err(|rejection| {
            self.notify(rejection_level(&rejection), rejection.to_string());
            rejection
        })
    }

    pub fn stop_succeeded(&mut self, reply: &CommandReply) {
        self.activity.push(
            ActivityLevel::Warning,
            format!("Crew execution stopped: {}", reply.message),
        );
    }

    pub fn stop_failed(&mut self, err: &CommandError) {
        self.activity
            .push(ActivityLevel::Error, format!("Error stopping crew: {err}"));
        self.notify(ActivityLevel::Error, "Failed to stop crew execution");
    }

    pub fn clear(&mut self) -> Result<(), RunRejection> {
        if let Err(rejection) = self.run.ensure_clearable() {
            self.notify(rejection_level(&rejection), rejection.to_string());
            return Err(rejection);
        }
        self.outputs.clear_all();
        self.tracker.reset();
        self.activity.clear();
        self.focus = None;
        self.activity.push(ActivityLevel::Info, "All data cleared");
        self.notify(ActivityLevel::Success, "All data cleared");
        Ok(())
    }

    pub fn apply_status(&mut self, status: &CrewStatus) {
        self.run.sync(status.is_running);
    }

    /// Fills the output store from the server's copy. Returns how many
    /// outputs landed in a category.
    pub fn backfill_outputs(&mut self, reply: &OutputsReply) -> usize {
        reply
            .entries()
            .filter(|(task, agent, stored)| {
                self.outputs
                    .update(agent, task, &stored.output, stored.output_type.as_deref())
                    .is_some()
            })
            .count()
    }
}

fn rejection_level(rejection: &RunRejection) -> ActivityLevel {
    match rejection {
        RunRejection::EmptyRequest | RunRejection::RequestTooShort => ActivityLevel::Error,
        _ => ActivityLevel::Warning,
    }
}

/// Shared session handle. Dispatcher handlers, the UI and spawned command
/// tasks all work on the same [`SessionState`].
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    commands: CommandClient,
}

impl Session {
    pub fn new(sequence: TaskSequence, commands: CommandClient) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new(sequence))),
            commands,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn commands(&self) -> &CommandClient {
        &self.commands
    }

    /// Registers one handler per event name that feeds this session.
    pub fn subscribe(&self, dispatcher: &mut Dispatcher) -> Vec<(EventName, ListenerId)> {
        [
            EventName::Connected,
            EventName::Disconnected,
            EventName::Error,
            EventName::Status,
            EventName::CrewUpdate,
        ]
        .into_iter()
        .map(|name| {
            let state = self.state.clone();
            let id = dispatcher.on(name, move |event| {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .apply_event(event);
            });
            (name, id)
        })
        .collect()
    }

    pub async fn start_run(&self, text: &str) -> Result<CommandReply, ControlError> {
        let request = self.state().begin_start(text)?;
        info!("start_crew: chars={}", request.chars().count());
        match self.commands.start_crew(&request).await {
            Ok(reply) => {
                self.state().start_succeeded(&reply);
                Ok(reply)
            }
            Err(err) => {
                warn!("start_crew_error: {err}");
                self.state().start_failed(&err);
                Err(err.into())
            }
        }
    }

    pub async fn stop_run(&self) -> Result<CommandReply, ControlError> {
        self.state().check_stop()?;
        match self.commands.stop_crew().await {
            Ok(reply) => {
                self.state().stop_succeeded(&reply);
                Ok(reply)
            }
            Err(err) => {
                warn!("stop_crew_error: {err}");
                self.state().stop_failed(&err);
                Err(err.into())
            }
        }
    }

    pub fn clear(&self) -> Result<(), RunRejection> {
        self.state().clear()
    }

    pub async fn sync_status(&self) -> Result<CrewStatus, CommandError> {
        let status = self.commands.status().await.map_err(|err| {
            warn!("status_sync_error: {err}");
            err
        })?;
        self.state().apply_status(&status);
        Ok(status)
    }

    pub async fn sync_outputs(&self) -> Result<usize, CommandError> {
        let reply = self.commands.outputs().await.map_err(|err| {
            warn!("outputs_sync_error: {err}");
            err
        })?;
        Ok(self.state().backfill_outputs(&reply))
    }

    /// Re-reads run state and artifacts after a (re)connect.
    pub async fn resync(&self) {
        let _ = self.sync_status().await;
        let _ = self.sync_outputs().await;
    }
}
