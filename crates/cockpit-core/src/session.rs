use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use cockpit_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use cockpit_types::{
    ActivePanel, AgentAction, AgentRun, AgentThought, Conversation, LivenessSnapshot, Message,
    Notification, PanelVisibility, RunId, RunStatus,
};
use cockpit_wire::{ReportedAction, RunAgentRequest, RunKind, RunOutcome, RunPayload};

use crate::correlator::{failed_feed, ActionCorrelator};
use crate::error::{CockpitError, Result};
use crate::event_bus::{EventBus, SessionEvent};
use crate::gateway::AgentBackend;

pub const STOPPED_MESSAGE: &str = "Agent has been stopped.";
pub const BLANK_PREVIEW_URL: &str = "about:blank";

struct SessionState {
    conversation: Conversation,
    run: Option<AgentRun>,
    cancel: Option<CancellationToken>,
    actions: Vec<AgentAction>,
    thoughts: Vec<AgentThought>,
    active_panel: ActivePanel,
    visibility: PanelVisibility,
    command_output: String,
}

impl SessionState {
    fn status(&self) -> RunStatus {
        self.run.as_ref().map(|r| r.status).unwrap_or(RunStatus::Idle)
    }

    /// Whether `run_id` is still the live run. Results for anything else are
    /// stale and must not touch the session.
    fn is_current(&self, run_id: RunId) -> bool {
        self.run
            .as_ref()
            .map(|r| r.id == run_id && r.status.is_active())
            .unwrap_or(false)
    }
}

/// Read-only projection of a session for display surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: RunStatus,
    pub run: Option<AgentRun>,
    pub messages: Vec<Message>,
    pub actions: Vec<AgentAction>,
    pub thoughts: Vec<AgentThought>,
    pub active_panel: ActivePanel,
    pub visibility: PanelVisibility,
    pub command_output: String,
}

impl SessionSnapshot {
    pub fn run_id(&self) -> Option<RunId> {
        self.run.as_ref().map(|r| r.id)
    }

    pub fn is_running(&self) -> bool {
        self.status.is_active()
    }

    /// The browser view is live only while a run is active and the service
    /// reports a browser.
    pub fn browser_is_live(&self, liveness: &LivenessSnapshot) -> bool {
        self.is_running() && liveness.browser_available
    }

    pub fn preview_url<'a>(&self, liveness: &LivenessSnapshot, live_url: &'a str) -> &'a str {
        if self.browser_is_live(liveness) {
            live_url
        } else {
            BLANK_PREVIEW_URL
        }
    }
}

/// Handle to a submitted run. Dropping it does not cancel the run.
#[derive(Debug)]
pub struct RunTicket {
    pub run_id: RunId,
    handle: JoinHandle<()>,
}

impl RunTicket {
    /// Waits until the run's background task has finished, including the
    /// case where a stop made it discard its result.
    pub async fn finished(self) {
        let _ = self.handle.await;
    }
}

/// Everything applied to the session when a run resolves.
struct RunResolution {
    status: RunStatus,
    message: Message,
    notification: Notification,
    actions: Option<Vec<AgentAction>>,
    thoughts: Option<Vec<AgentThought>>,
    panel: Option<ActivePanel>,
    command_output: Option<String>,
    error_code: Option<&'static str>,
}

impl RunResolution {
    fn from_outcome(outcome: RunOutcome, actions: Option<Vec<AgentAction>>) -> Self {
        let kind = outcome.kind();
        match outcome {
            RunOutcome::Error { message, payload } => Self {
                status: RunStatus::Failed,
                message: Message::system(format!("Error: {message}")),
                notification: Notification::error("Task Failed", message),
                actions,
                thoughts: payload.thoughts,
                panel: None,
                command_output: None,
                error_code: Some("run_error"),
            },
            outcome => {
                let RunPayload {
                    output, thoughts, ..
                } = outcome.into_payload();
                let (panel, command_output) = match kind {
                    RunKind::BrowserAutomation
                        if actions.as_ref().is_some_and(|a| !a.is_empty()) =>
                    {
                        (Some(ActivePanel::Browser), None)
                    }
                    RunKind::Sandbox => {
                        (Some(ActivePanel::Sandbox), Some(output.clone()))
                    }
                    _ => (None, None),
                };
                Self {
                    status: RunStatus::Completed,
                    notification: Notification::success("Task Completed", output.clone()),
                    message: Message::assistant(output),
                    actions,
                    thoughts,
                    panel,
                    command_output,
                    error_code: None,
                }
            }
        }
    }

    fn from_error(
        error: CockpitError,
        actions: Option<Vec<AgentAction>>,
        thoughts: Option<Vec<AgentThought>>,
    ) -> Self {
        Self {
            status: RunStatus::Failed,
            message: Message::system(format!("Error: {error}")),
            notification: Notification::error("Error", error.to_string()),
            actions,
            thoughts,
            panel: None,
            command_output: None,
            error_code: Some(error.code()),
        }
    }
}

struct SessionInner {
    backend: Arc<dyn AgentBackend>,
    correlator: ActionCorrelator,
    state: Mutex<SessionState>,
    events: EventBus<SessionEvent>,
}

/// The single owner of "is a run active" and of everything a run writes.
///
/// State lives behind one async mutex that is never held across a network
/// call. Every change is published on the session's event bus in the order it
/// was applied.
#[derive(Clone)]
pub struct AgentSession {
    inner: Arc<SessionInner>,
}

impl AgentSession {
    pub fn new(backend: Arc<dyn AgentBackend>, greeting: Option<&str>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                correlator: ActionCorrelator::new(backend.clone()),
                backend,
                state: Mutex::new(SessionState {
                    conversation: Conversation::with_greeting(greeting),
                    run: None,
                    cancel: None,
                    actions: Vec::new(),
                    thoughts: Vec::new(),
                    active_panel: ActivePanel::default(),
                    visibility: PanelVisibility::default(),
                    command_output: String::new(),
                }),
                events: EventBus::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn status(&self) -> RunStatus {
        self.inner.state.lock().await.status()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock().await;
        SessionSnapshot {
            status: state.status(),
            run: state.run.clone(),
            messages: state.conversation.messages().to_vec(),
            actions: state.actions.clone(),
            thoughts: state.thoughts.clone(),
            active_panel: state.active_panel,
            visibility: state.visibility,
            command_output: state.command_output.clone(),
        }
    }

    /// Starts a run for `task`. The request is dispatched on a background
    /// task; the returned ticket identifies the run.
    ///
    /// A blank task is rejected without touching the session. A submission
    /// while another run is starting or running is rejected with
    /// [`CockpitError::RunInProgress`].
    pub async fn submit(
        &self,
        task: &str,
        additional_info: Option<String>,
    ) -> Result<RunTicket> {
        let task = task.trim();
        if task.is_empty() {
            return Err(CockpitError::Validation("Task must not be empty".to_string()));
        }

        let events = &self.inner.events;
        let mut state = self.inner.state.lock().await;
        if !state.status().accepts_submit() {
            return Err(CockpitError::RunInProgress);
        }

        let mut run = AgentRun::new(task.to_string(), additional_info);
        let run_id = run.id;
        let request = RunAgentRequest {
            task: run.task.clone(),
            additional_info: run.additional_info.clone(),
        };
        let token = CancellationToken::new();

        let user = Message::user(task);
        state.conversation.push(user.clone());
        state.run = Some(run.clone());
        state.cancel = Some(token.clone());
        events.publish(SessionEvent::StatusChanged {
            run_id: Some(run_id),
            status: RunStatus::Starting,
        });
        events.publish(SessionEvent::MessageAppended(user));
        events.publish(SessionEvent::Notification(Notification::info(
            "Agent Starting",
            format!("Running task: {task}"),
        )));

        // Dispatch: the placeholder goes up together with the Running state.
        state.conversation.begin_processing();
        if let Some(placeholder) = state.conversation.last().cloned() {
            events.publish(SessionEvent::MessageAppended(placeholder));
        }
        run.status = RunStatus::Running;
        state.run = Some(run);
        events.publish(SessionEvent::StatusChanged {
            run_id: Some(run_id),
            status: RunStatus::Running,
        });
        drop(state);

        let redacted = redact_text(task);
        let run_ref = run_id.to_string();
        emit_event(
            Level::INFO,
            ProcessKind::Core,
            ObservabilityEvent {
                event: "run.submitted",
                component: "session",
                run_id: Some(&run_ref),
                status: Some("running"),
                detail: Some(&redacted),
                ..Default::default()
            },
        );

        let session = self.clone();
        let handle = tokio::spawn(async move {
            session.drive_run(run_id, request, token).await;
        });

        Ok(RunTicket { run_id, handle })
    }

    /// Stops the active run.
    ///
    /// The local transition is immediate and authoritative: the run is
    /// cancelled, its placeholder removed and "Agent has been stopped."
    /// appended before the service is asked to stop. A late response for the
    /// stopped run is discarded. The remote call is best effort; its failure
    /// is notified and recorded in the conversation but leaves the session
    /// stopped.
    pub async fn stop(&self) -> Result<()> {
        let events = &self.inner.events;
        let stopped_run = {
            let mut state = self.inner.state.lock().await;
            if state.status().is_active() {
                if let Some(token) = state.cancel.take() {
                    token.cancel();
                }
                if state.conversation.clear_processing() {
                    events.publish(SessionEvent::PlaceholderRemoved);
                }
                let message = Message::system(STOPPED_MESSAGE);
                state.conversation.push(message.clone());
                events.publish(SessionEvent::MessageAppended(message));

                let run_id = state.run.as_mut().map(|run| {
                    run.finish(RunStatus::Stopped);
                    run.id
                });
                events.publish(SessionEvent::StatusChanged {
                    run_id,
                    status: RunStatus::Stopped,
                });
                run_id
            } else {
                None
            }
        };

        let run_ref = stopped_run.map(|id| id.to_string());
        match self.inner.backend.stop_agent().await {
            Ok(()) => {
                emit_event(
                    Level::INFO,
                    ProcessKind::Core,
                    ObservabilityEvent {
                        event: "run.stopped",
                        component: "session",
                        run_id: run_ref.as_deref(),
                        status: Some("stopped"),
                        ..Default::default()
                    },
                );
                events.publish(SessionEvent::Notification(Notification::info(
                    "Agent stopped",
                    "The agent has been stopped",
                )));
                Ok(())
            }
            Err(err) => {
                let detail = err.to_string();
                {
                    let mut state = self.inner.state.lock().await;
                    let message = Message::system(format!("Error: {detail}"));
                    state.conversation.note(message.clone());
                    events.publish(SessionEvent::MessageAppended(message));
                }
                emit_event(
                    Level::WARN,
                    ProcessKind::Core,
                    ObservabilityEvent {
                        event: "run.stop.failed",
                        component: "session",
                        run_id: run_ref.as_deref(),
                        status: Some("stop_failed"),
                        error_code: Some(err.code()),
                        detail: Some(&detail),
                        ..Default::default()
                    },
                );
                events.publish(SessionEvent::Notification(Notification::error(
                    "Error", detail,
                )));
                Err(err)
            }
        }
    }

    pub async fn set_active_panel(&self, panel: ActivePanel) {
        let mut state = self.inner.state.lock().await;
        if state.active_panel != panel {
            state.active_panel = panel;
            self.inner.events.publish(SessionEvent::PanelSwitched(panel));
        }
    }

    pub async fn set_browser_visible(&self, visible: bool) {
        self.update_visibility(|v| v.browser = visible).await;
    }

    pub async fn set_sandbox_visible(&self, visible: bool) {
        self.update_visibility(|v| v.sandbox = visible).await;
    }

    async fn update_visibility(&self, apply: impl FnOnce(&mut PanelVisibility)) {
        let mut state = self.inner.state.lock().await;
        let before = state.visibility;
        apply(&mut state.visibility);
        if state.visibility != before {
            self.inner
                .events
                .publish(SessionEvent::VisibilityChanged(state.visibility));
        }
    }

    async fn drive_run(&self, run_id: RunId, request: RunAgentRequest, token: CancellationToken) {
        let response = tokio::select! {
            _ = token.cancelled() => return,
            response = self.inner.backend.run_agent(request) => response,
        };

        let resolution = match response {
            Ok(outcome) => match self.correlate(run_id, outcome, &token).await {
                Some(resolution) => resolution,
                None => return,
            },
            Err(err) => RunResolution::from_error(err, None, None),
        };

        self.apply(run_id, &token, resolution).await;
    }

    /// Confirms browser actions for a successful outcome. `None` means the
    /// run was cancelled while correlating.
    async fn correlate(
        &self,
        run_id: RunId,
        outcome: RunOutcome,
        token: &CancellationToken,
    ) -> Option<RunResolution> {
        if outcome.kind() != RunKind::BrowserAutomation {
            let inline: Option<Vec<AgentAction>> = outcome
                .payload()
                .actions
                .clone()
                .map(|actions| actions.into_iter().map(ReportedAction::inline).collect());
            return Some(RunResolution::from_outcome(outcome, inline));
        }

        let reported = outcome.payload().actions.clone().unwrap_or_default();
        match self
            .inner
            .correlator
            .correlate(run_id, reported.clone(), token)
            .await
        {
            Ok(actions) => Some(RunResolution::from_outcome(outcome, Some(actions))),
            Err(CockpitError::Cancelled) => None,
            Err(err) => {
                let feed = match &err {
                    CockpitError::BrowserAutomation { index, message, .. } => {
                        Some(failed_feed(reported, *index, message))
                    }
                    _ => None,
                };
                let thoughts = outcome.into_payload().thoughts;
                Some(RunResolution::from_error(err, feed, thoughts))
            }
        }
    }

    async fn apply(&self, run_id: RunId, token: &CancellationToken, resolution: RunResolution) {
        let events = &self.inner.events;
        let mut state = self.inner.state.lock().await;
        if token.is_cancelled() || !state.is_current(run_id) {
            tracing::debug!(run_id = %run_id, "discarding result for stale run");
            return;
        }

        if state.conversation.clear_processing() {
            events.publish(SessionEvent::PlaceholderRemoved);
        }
        state.conversation.push(resolution.message.clone());
        events.publish(SessionEvent::MessageAppended(resolution.message));

        if let Some(actions) = resolution.actions {
            state.actions = actions.clone();
            events.publish(SessionEvent::ActionsReplaced(actions));
        }
        if let Some(thoughts) = resolution.thoughts {
            state.thoughts = thoughts.clone();
            events.publish(SessionEvent::ThoughtsReplaced(thoughts));
        }

        match resolution.panel {
            Some(ActivePanel::Browser) => {
                if !state.visibility.browser {
                    state.visibility.browser = true;
                    events.publish(SessionEvent::VisibilityChanged(state.visibility));
                }
                if state.active_panel != ActivePanel::Browser {
                    state.active_panel = ActivePanel::Browser;
                    events.publish(SessionEvent::PanelSwitched(ActivePanel::Browser));
                }
            }
            Some(ActivePanel::Sandbox) => {
                if state.active_panel != ActivePanel::Sandbox {
                    state.active_panel = ActivePanel::Sandbox;
                    events.publish(SessionEvent::PanelSwitched(ActivePanel::Sandbox));
                }
            }
            None => {}
        }
        if let Some(output) = resolution.command_output {
            state.command_output = output.clone();
            events.publish(SessionEvent::CommandOutput(output));
        }

        if let Some(run) = state.run.as_mut() {
            run.finish(resolution.status);
        }
        state.cancel = None;
        events.publish(SessionEvent::StatusChanged {
            run_id: Some(run_id),
            status: resolution.status,
        });
        events.publish(SessionEvent::Notification(resolution.notification));
        drop(state);

        let run_ref = run_id.to_string();
        emit_event(
            if resolution.error_code.is_some() {
                Level::WARN
            } else {
                Level::INFO
            },
            ProcessKind::Core,
            ObservabilityEvent {
                event: "run.finished",
                component: "session",
                run_id: Some(&run_ref),
                status: Some(resolution.status.as_str()),
                error_code: resolution.error_code,
                ..Default::default()
            },
        );
    }
}
