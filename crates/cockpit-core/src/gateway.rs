use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::Level;

use cockpit_observability::{emit_event, ObservabilityEvent, ProcessKind};
use cockpit_types::{LivenessSnapshot, SandboxInvocation};
use cockpit_wire::{
    ActionStatusResponse, AgentStatusResponse, RunAgentRequest, RunAgentResponse, RunOutcome,
    SandboxExecuteRequest, SandboxExecuteResponse, SandboxSettings, SettingsAck,
    SettingsEnvelope, SettingsSection,
};

use crate::config::CockpitConfig;
use crate::error::{CockpitError, Result};

/// One remote operation of the agent service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    RunAgent,
    ActionStatus(String),
    StopAgent,
    AgentStatus,
    SandboxExecute,
    GetSettings(SettingsSection),
    UpdateSettings(SettingsSection),
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::ActionStatus(_) | Endpoint::AgentStatus | Endpoint::GetSettings(_) => {
                Method::GET
            }
            Endpoint::RunAgent
            | Endpoint::StopAgent
            | Endpoint::SandboxExecute
            | Endpoint::UpdateSettings(_) => Method::POST,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Endpoint::RunAgent => "/run-agent".to_string(),
            Endpoint::ActionStatus(id) => format!("/browser/action-status/{id}"),
            Endpoint::StopAgent => "/agent/stop".to_string(),
            Endpoint::AgentStatus => "/agent/status".to_string(),
            Endpoint::SandboxExecute => "/sandbox/execute".to_string(),
            Endpoint::GetSettings(section) | Endpoint::UpdateSettings(section) => {
                format!("/settings/{}", section.as_str())
            }
        }
    }

    /// Verb phrase used in error messages, e.g. "Failed to run agent".
    pub fn operation(&self) -> &'static str {
        match self {
            Endpoint::RunAgent => "run agent",
            Endpoint::ActionStatus(_) => "get action status",
            Endpoint::StopAgent => "stop agent",
            Endpoint::AgentStatus => "get agent status",
            Endpoint::SandboxExecute => "execute sandbox command",
            Endpoint::GetSettings(SettingsSection::Llm) => "get LLM settings",
            Endpoint::GetSettings(SettingsSection::Browser) => "get browser settings",
            Endpoint::GetSettings(SettingsSection::Sandbox) => "get sandbox settings",
            Endpoint::UpdateSettings(SettingsSection::Llm) => "update LLM settings",
            Endpoint::UpdateSettings(SettingsSection::Browser) => "update browser settings",
            Endpoint::UpdateSettings(SettingsSection::Sandbox) => "update sandbox settings",
        }
    }
}

/// Everything the coordinator needs from the agent service.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn run_agent(&self, request: RunAgentRequest) -> Result<RunOutcome>;
    async fn action_status(&self, action_id: &str) -> Result<ActionStatusResponse>;
    async fn stop_agent(&self) -> Result<()>;
    async fn agent_status(&self) -> Result<LivenessSnapshot>;
    async fn execute_sandbox(&self, request: SandboxExecuteRequest) -> Result<SandboxInvocation>;
    async fn sandbox_settings(&self) -> Result<SandboxSettings>;
    async fn update_sandbox_settings(&self, settings: &SandboxSettings) -> Result<SettingsAck>;
    async fn llm_settings(&self) -> Result<Value>;
    async fn update_llm_settings(&self, settings: &Value) -> Result<SettingsAck>;
    async fn browser_settings(&self) -> Result<Value>;
    async fn update_browser_settings(&self, settings: &Value) -> Result<SettingsAck>;
}

/// HTTP client for the agent service. Stateless apart from the connection
/// pool, so clones can be used from any task.
#[derive(Debug, Clone)]
pub struct CommandGateway {
    client: Client,
    base_url: String,
}

impl CommandGateway {
    pub fn new(config: &CockpitConfig) -> Result<Self> {
        Self::with_base_url(&config.api_base_url, config.request_timeout())
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CockpitError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues one request. No retries.
    pub async fn call<B, T>(&self, endpoint: &Endpoint, payload: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let url = format!("{}{}", self.base_url, endpoint.path());
        tracing::debug!("{} {}", endpoint.method(), url);

        let mut request = self.client.request(endpoint.method(), &url);
        if let Some(body) = payload {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let err = CockpitError::Transport {
                operation: endpoint.operation(),
                message: e.to_string(),
            };
            report_failure(endpoint, &err, None);
            err
        })?;

        self.handle_response(endpoint, response).await
    }

    async fn handle_response<T: DeserializeOwned + Send>(
        &self,
        endpoint: &Endpoint,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let url = response.url().to_string();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Request to {} failed ({}): {}", url, status, truncate(&body, 500));
            let err = CockpitError::Remote {
                operation: endpoint.operation(),
                status: status.as_u16(),
                status_text: status
                    .canonical_reason()
                    .unwrap_or("Unknown status")
                    .to_string(),
            };
            report_failure(endpoint, &err, Some(status.as_str()));
            return Err(err);
        }

        let body = response.text().await.map_err(|e| {
            let err = CockpitError::Transport {
                operation: endpoint.operation(),
                message: format!("Failed to read response body: {}", e),
            };
            report_failure(endpoint, &err, Some(status.as_str()));
            err
        })?;

        tracing::debug!("Response from {}: {}", url, truncate(&body, 500));

        // Acknowledgement endpoints may answer with an empty body.
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };

        serde_json::from_str(body).map_err(|e| {
            tracing::error!("Failed to parse response from {}: {}", url, e);
            let err = CockpitError::Decode {
                operation: endpoint.operation(),
                message: format!("{}. Body: {}", e, truncate(body, 200)),
            };
            report_failure(endpoint, &err, Some(status.as_str()));
            err
        })
    }

    async fn get_settings<T: DeserializeOwned + Send>(&self, section: SettingsSection) -> Result<T> {
        let envelope: SettingsEnvelope<T> = self
            .call::<(), _>(&Endpoint::GetSettings(section), None)
            .await?;
        Ok(envelope.into_inner())
    }

    async fn post_settings<B: Serialize + ?Sized + Sync>(
        &self,
        section: SettingsSection,
        settings: &B,
    ) -> Result<SettingsAck> {
        let ack: Option<SettingsAck> = self
            .call(&Endpoint::UpdateSettings(section), Some(settings))
            .await?;
        Ok(ack.unwrap_or_default())
    }
}

#[async_trait]
impl AgentBackend for CommandGateway {
    async fn run_agent(&self, request: RunAgentRequest) -> Result<RunOutcome> {
        let response: RunAgentResponse = self.call(&Endpoint::RunAgent, Some(&request)).await?;
        Ok(response.resolve())
    }

    async fn action_status(&self, action_id: &str) -> Result<ActionStatusResponse> {
        self.call::<(), _>(&Endpoint::ActionStatus(action_id.to_string()), None)
            .await
    }

    async fn stop_agent(&self) -> Result<()> {
        let _: Value = self.call::<(), _>(&Endpoint::StopAgent, None).await?;
        Ok(())
    }

    async fn agent_status(&self) -> Result<LivenessSnapshot> {
        let status: AgentStatusResponse =
            self.call::<(), _>(&Endpoint::AgentStatus, None).await?;
        Ok(status.into_snapshot())
    }

    async fn execute_sandbox(&self, request: SandboxExecuteRequest) -> Result<SandboxInvocation> {
        let response: SandboxExecuteResponse = self
            .call(&Endpoint::SandboxExecute, Some(&request))
            .await?;
        Ok(response.into_invocation(&request.command))
    }

    async fn sandbox_settings(&self) -> Result<SandboxSettings> {
        self.get_settings(SettingsSection::Sandbox).await
    }

    async fn update_sandbox_settings(&self, settings: &SandboxSettings) -> Result<SettingsAck> {
        self.post_settings(SettingsSection::Sandbox, settings).await
    }

    async fn llm_settings(&self) -> Result<Value> {
        self.get_settings(SettingsSection::Llm).await
    }

    async fn update_llm_settings(&self, settings: &Value) -> Result<SettingsAck> {
        self.post_settings(SettingsSection::Llm, settings).await
    }

    async fn browser_settings(&self) -> Result<Value> {
        self.get_settings(SettingsSection::Browser).await
    }

    async fn update_browser_settings(&self, settings: &Value) -> Result<SettingsAck> {
        self.post_settings(SettingsSection::Browser, settings).await
    }
}

fn report_failure(endpoint: &Endpoint, err: &CockpitError, status: Option<&str>) {
    let path = endpoint.path();
    let detail = err.to_string();
    emit_event(
        Level::WARN,
        ProcessKind::Core,
        ObservabilityEvent {
            event: "gateway.call.failed",
            component: "gateway",
            endpoint: Some(&path),
            status,
            error_code: Some(err.code()),
            detail: Some(&detail),
            ..Default::default()
        },
    );
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
