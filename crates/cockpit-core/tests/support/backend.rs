use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use cockpit_core::{AgentBackend, CockpitError, Result};
use cockpit_types::{LivenessSnapshot, SandboxInvocation};
use cockpit_wire::{
    ActionStatusResponse, RunAgentRequest, RunAgentResponse, RunOutcome, SandboxExecuteRequest,
    SandboxExecuteResponse, SandboxSettings, SettingsAck,
};

/// One queued answer, optionally held back until the test releases it.
struct Scripted<T> {
    gate: Option<oneshot::Receiver<()>>,
    result: Result<T>,
}

impl<T> Scripted<T> {
    async fn resolve(self) -> Result<T> {
        if let Some(gate) = self.gate {
            let _ = gate.await;
        }
        self.result
    }
}

/// In-memory agent service. Answers come from per-endpoint queues and every
/// call is recorded in order.
#[derive(Default)]
pub struct ScriptedBackend {
    runs: Mutex<VecDeque<Scripted<RunOutcome>>>,
    action_statuses: Mutex<HashMap<String, Result<ActionStatusResponse>>>,
    action_gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    statuses: Mutex<VecDeque<Result<LivenessSnapshot>>>,
    sandbox: Mutex<VecDeque<Scripted<SandboxInvocation>>>,
    stop: Mutex<Option<CockpitError>>,
    calls: Mutex<Vec<String>>,
    run_requests: Mutex<Vec<RunAgentRequest>>,
    sandbox_requests: Mutex<Vec<SandboxExecuteRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_run(&self, result: Result<RunOutcome>) {
        self.runs.lock().unwrap().push_back(Scripted { gate: None, result });
    }

    /// Queues a run answer that is only delivered once the returned sender
    /// fires (or is dropped).
    pub fn push_gated_run(&self, result: Result<RunOutcome>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.runs.lock().unwrap().push_back(Scripted {
            gate: Some(rx),
            result,
        });
        tx
    }

    pub fn set_action_status(&self, id: &str, success: bool, error: Option<&str>) {
        self.action_statuses.lock().unwrap().insert(
            id.to_string(),
            Ok(ActionStatusResponse {
                success,
                error: error.map(|e| Value::String(e.to_string())),
            }),
        );
    }

    /// Holds back the status answer for `id` until the returned sender fires
    /// (or is dropped).
    pub fn gate_action_status(&self, id: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.action_gates.lock().unwrap().insert(id.to_string(), rx);
        tx
    }

    pub fn fail_action_lookup(&self, id: &str, err: CockpitError) {
        self.action_statuses
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(err));
    }

    pub fn push_status(&self, result: Result<LivenessSnapshot>) {
        self.statuses.lock().unwrap().push_back(result);
    }

    pub fn push_sandbox(&self, result: Result<SandboxInvocation>) {
        self.sandbox
            .lock()
            .unwrap()
            .push_back(Scripted { gate: None, result });
    }

    pub fn push_gated_sandbox(&self, result: Result<SandboxInvocation>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.sandbox.lock().unwrap().push_back(Scripted {
            gate: Some(rx),
            result,
        });
        tx
    }

    pub fn fail_stop(&self, err: CockpitError) {
        *self.stop.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }

    pub fn run_requests(&self) -> Vec<RunAgentRequest> {
        self.run_requests.lock().unwrap().clone()
    }

    pub fn sandbox_requests(&self) -> Vec<SandboxExecuteRequest> {
        self.sandbox_requests.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

fn unscripted(operation: &'static str) -> CockpitError {
    CockpitError::Transport {
        operation,
        message: "no scripted response".to_string(),
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn run_agent(&self, request: RunAgentRequest) -> Result<RunOutcome> {
        self.record("run_agent");
        self.run_requests.lock().unwrap().push(request);
        let next = self.runs.lock().unwrap().pop_front();
        match next {
            Some(scripted) => scripted.resolve().await,
            None => Err(unscripted("run agent")),
        }
    }

    async fn action_status(&self, action_id: &str) -> Result<ActionStatusResponse> {
        self.record(format!("action_status:{action_id}"));
        let gate = self.action_gates.lock().unwrap().remove(action_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.action_statuses
            .lock()
            .unwrap()
            .get(action_id)
            .cloned()
            .unwrap_or_else(|| Err(unscripted("get action status")))
    }

    async fn stop_agent(&self) -> Result<()> {
        self.record("stop_agent");
        match self.stop.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn agent_status(&self) -> Result<LivenessSnapshot> {
        self.record("agent_status");
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("get agent status")))
    }

    async fn execute_sandbox(&self, request: SandboxExecuteRequest) -> Result<SandboxInvocation> {
        self.record(format!("execute_sandbox:{}", request.command));
        self.sandbox_requests.lock().unwrap().push(request);
        let next = self.sandbox.lock().unwrap().pop_front();
        match next {
            Some(scripted) => scripted.resolve().await,
            None => Err(unscripted("execute sandbox command")),
        }
    }

    async fn sandbox_settings(&self) -> Result<SandboxSettings> {
        self.record("sandbox_settings");
        Ok(SandboxSettings::default())
    }

    async fn update_sandbox_settings(&self, _settings: &SandboxSettings) -> Result<SettingsAck> {
        self.record("update_sandbox_settings");
        Ok(SettingsAck::default())
    }

    async fn llm_settings(&self) -> Result<Value> {
        self.record("llm_settings");
        Ok(Value::Null)
    }

    async fn update_llm_settings(&self, _settings: &Value) -> Result<SettingsAck> {
        self.record("update_llm_settings");
        Ok(SettingsAck::default())
    }

    async fn browser_settings(&self) -> Result<Value> {
        self.record("browser_settings");
        Ok(Value::Null)
    }

    async fn update_browser_settings(&self, _settings: &Value) -> Result<SettingsAck> {
        self.record("update_browser_settings");
        Ok(SettingsAck::default())
    }
}

/// Resolves a `/run-agent` body exactly as the HTTP gateway would.
pub fn outcome(body: Value) -> RunOutcome {
    serde_json::from_value::<RunAgentResponse>(body)
        .expect("valid run body")
        .resolve()
}

/// Builds an invocation from a `/sandbox/execute` body.
pub fn invocation(command: &str, body: Value) -> SandboxInvocation {
    serde_json::from_value::<SandboxExecuteResponse>(body)
        .expect("valid sandbox body")
        .into_invocation(command)
}

pub fn liveness(status: &str, browser: bool, sandbox: bool) -> LivenessSnapshot {
    LivenessSnapshot {
        status: status.to_string(),
        agent_status: status.to_string(),
        browser_available: browser,
        sandbox_available: sandbox,
        fetched_at: None,
    }
}

pub fn remote_error(operation: &'static str) -> CockpitError {
    CockpitError::Remote {
        operation,
        status: 500,
        status_text: "Internal Server Error".to_string(),
    }
}
