use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::Level;

use cockpit_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use cockpit_types::{Message, Notification, SandboxInvocation};
use cockpit_wire::SandboxExecuteRequest;

use crate::error::{CockpitError, Result};
use crate::event_bus::{EventBus, SandboxEvent};
use crate::gateway::AgentBackend;

pub const EXECUTING_TEXT: &str = "Executing command...";

/// Where a sandbox terminal lives. Each slot keeps its own output and log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxSlot {
    Inline,
    Fullscreen,
}

impl SandboxSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxSlot::Inline => "inline",
            SandboxSlot::Fullscreen => "fullscreen",
        }
    }
}

#[derive(Default)]
struct RunnerState {
    output: String,
    log: Vec<Message>,
    /// Sequence number of the most recently issued invocation.
    latest_seq: u64,
}

/// Runs ad-hoc shell commands for one terminal slot.
///
/// Invocations are independent requests with no queue. Every result lands in
/// the log; only the most recently issued one may replace the output pane.
#[derive(Clone)]
pub struct SandboxRunner {
    slot: SandboxSlot,
    backend: Arc<dyn AgentBackend>,
    default_timeout: Option<u64>,
    state: Arc<Mutex<RunnerState>>,
    seq: Arc<AtomicU64>,
    events: EventBus<SandboxEvent>,
}

impl SandboxRunner {
    pub fn new(
        slot: SandboxSlot,
        backend: Arc<dyn AgentBackend>,
        default_timeout: Option<u64>,
        events: EventBus<SandboxEvent>,
    ) -> Self {
        Self {
            slot,
            backend,
            default_timeout,
            state: Arc::new(Mutex::new(RunnerState::default())),
            seq: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    pub fn slot(&self) -> SandboxSlot {
        self.slot
    }

    pub async fn output(&self) -> String {
        self.state.lock().await.output.clone()
    }

    pub async fn log(&self) -> Vec<Message> {
        self.state.lock().await.log.clone()
    }

    /// Appends an entry to this terminal's log without running anything.
    pub async fn record(&self, message: Message) {
        self.state.lock().await.log.push(message);
    }

    pub async fn execute(&self, command: &str, timeout: Option<u64>) -> Result<SandboxInvocation> {
        let command = command.trim();
        if command.is_empty() {
            return Err(CockpitError::Validation(
                "Command must not be empty".to_string(),
            ));
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock().await;
            state.latest_seq = seq;
            state.output = EXECUTING_TEXT.to_string();
        }
        self.events.publish(SandboxEvent::Started {
            slot: self.slot,
            seq,
            command: command.to_string(),
        });
        self.publish_output(EXECUTING_TEXT.to_string());

        let request = SandboxExecuteRequest {
            command: command.to_string(),
            timeout: timeout.or(self.default_timeout),
        };
        let result = self.backend.execute_sandbox(request).await;

        let mut state = self.state.lock().await;
        let is_latest = state.latest_seq == seq;
        state.log.push(Message::user(format!("Command: {command}")));

        match result {
            Ok(invocation) => {
                state.log.push(Message::system(invocation.log_text()));
                if is_latest {
                    state.output = invocation.terminal_text();
                }
                drop(state);

                self.report(seq, command, Some(invocation.exit_code), None);
                if is_latest {
                    self.publish_output(invocation.terminal_text());
                }
                self.events.publish(SandboxEvent::Finished {
                    slot: self.slot,
                    seq,
                    invocation: invocation.clone(),
                });
                Ok(invocation)
            }
            Err(err) => {
                let text = format!("Failed to execute command: {err}");
                state.log.push(Message::system(text.clone()));
                if is_latest {
                    state.output = text.clone();
                }
                drop(state);

                self.report(seq, command, None, Some(&err));
                if is_latest {
                    self.publish_output(text);
                }
                self.events.publish(SandboxEvent::Failed {
                    slot: self.slot,
                    seq,
                    error: err.to_string(),
                });
                self.events.publish(SandboxEvent::Notification {
                    slot: Some(self.slot),
                    notification: Notification::error("Error", err.to_string()),
                });
                Err(err)
            }
        }
    }

    fn publish_output(&self, output: String) {
        self.events.publish(SandboxEvent::OutputChanged {
            slot: self.slot,
            output,
        });
    }

    fn report(&self, seq: u64, command: &str, exit_code: Option<i32>, err: Option<&CockpitError>) {
        let redacted = redact_text(command);
        let status = match (exit_code, err) {
            (Some(0), None) => "ok".to_string(),
            (Some(code), None) => format!("exit_{code}"),
            _ => "error".to_string(),
        };
        let detail = match err {
            Some(err) => format!(
                "slot={} seq={seq} command={redacted} error={err}",
                self.slot.as_str()
            ),
            None => format!("slot={} seq={seq} command={redacted}", self.slot.as_str()),
        };
        emit_event(
            if err.is_some() { Level::WARN } else { Level::INFO },
            ProcessKind::Core,
            ObservabilityEvent {
                event: "sandbox.execute.finished",
                component: "sandbox",
                status: Some(&status),
                error_code: err.map(CockpitError::code),
                detail: Some(&detail),
                ..Default::default()
            },
        );
    }
}
