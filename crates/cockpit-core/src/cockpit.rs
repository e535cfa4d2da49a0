use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use cockpit_types::{LivenessSnapshot, Message, Notification, SandboxInvocation};
use cockpit_wire::SandboxExecuteRequest;

use crate::config::CockpitConfig;
use crate::error::Result;
use crate::event_bus::{EventBus, SandboxEvent};
use crate::gateway::{AgentBackend, CommandGateway};
use crate::poller::StatusPoller;
use crate::sandbox::{SandboxRunner, SandboxSlot};
use crate::session::{AgentSession, SessionSnapshot};

pub const WARM_UP_COMMAND: &str = "echo 'Initializing sandbox environment'";

/// Combined projection handed to display surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct CockpitView {
    pub session: SessionSnapshot,
    pub liveness: LivenessSnapshot,
    pub browser_is_live: bool,
    pub preview_url: String,
}

/// Owns one gateway-backed session, the liveness poller and both sandbox
/// terminals, and ties their lifetimes together.
pub struct Cockpit {
    config: CockpitConfig,
    backend: Arc<dyn AgentBackend>,
    session: AgentSession,
    poller: StatusPoller,
    inline_sandbox: SandboxRunner,
    fullscreen_sandbox: SandboxRunner,
    sandbox_events: EventBus<SandboxEvent>,
    warm_up: Mutex<Option<JoinHandle<()>>>,
}

impl Cockpit {
    pub fn new(config: CockpitConfig) -> Result<Self> {
        let gateway = CommandGateway::new(&config)?;
        Ok(Self::with_backend(config, Arc::new(gateway)))
    }

    pub fn with_backend(config: CockpitConfig, backend: Arc<dyn AgentBackend>) -> Self {
        let sandbox_events = EventBus::new();
        let runner = |slot| {
            SandboxRunner::new(
                slot,
                backend.clone(),
                config.sandbox_timeout_secs,
                sandbox_events.clone(),
            )
        };
        let inline_sandbox = runner(SandboxSlot::Inline);
        let fullscreen_sandbox = runner(SandboxSlot::Fullscreen);

        Self {
            session: AgentSession::new(backend.clone(), config.greeting.as_deref()),
            poller: StatusPoller::new(backend.clone(), config.poll_interval()),
            inline_sandbox,
            fullscreen_sandbox,
            sandbox_events,
            warm_up: Mutex::new(None),
            backend,
            config,
        }
    }

    pub fn config(&self) -> &CockpitConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn AgentBackend> {
        self.backend.clone()
    }

    pub fn session(&self) -> &AgentSession {
        &self.session
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub fn sandbox(&self, slot: SandboxSlot) -> &SandboxRunner {
        match slot {
            SandboxSlot::Inline => &self.inline_sandbox,
            SandboxSlot::Fullscreen => &self.fullscreen_sandbox,
        }
    }

    pub fn subscribe_sandbox(&self) -> broadcast::Receiver<SandboxEvent> {
        self.sandbox_events.subscribe()
    }

    /// Starts liveness polling and, when configured, warms the sandbox in the
    /// background. A failed warm-up is recorded in the inline terminal's log.
    pub async fn activate(&self) {
        self.poller.start().await;

        if !self.config.warm_sandbox {
            return;
        }
        let mut warm_up = self.warm_up.lock().await;
        if warm_up.is_some() {
            return;
        }
        let backend = self.backend.clone();
        let events = self.sandbox_events.clone();
        let timeout = self.config.sandbox_timeout_secs;
        let inline = self.inline_sandbox.clone();
        *warm_up = Some(tokio::spawn(async move {
            if let Err(err) = warm_sandbox(backend.as_ref(), &events, timeout).await {
                inline
                    .record(Message::system(format!(
                        "Sandbox initialization failed: {err}"
                    )))
                    .await;
            }
        }));
    }

    /// Stops polling and any pending warm-up. An in-flight run is left to
    /// the session.
    pub async fn teardown(&self) {
        self.poller.stop().await;
        if let Some(task) = self.warm_up.lock().await.take() {
            task.abort();
        }
    }

    pub async fn view(&self) -> CockpitView {
        let session = self.session.snapshot().await;
        let liveness = self.poller.latest();
        CockpitView {
            browser_is_live: session.browser_is_live(&liveness),
            preview_url: session
                .preview_url(&liveness, &self.config.browser_preview_url)
                .to_string(),
            session,
            liveness,
        }
    }
}

/// Runs the warm-up command directly against the service and announces the
/// result. Neither terminal is touched.
pub async fn warm_sandbox(
    backend: &dyn AgentBackend,
    events: &EventBus<SandboxEvent>,
    timeout: Option<u64>,
) -> Result<SandboxInvocation> {
    let result = backend
        .execute_sandbox(SandboxExecuteRequest {
            command: WARM_UP_COMMAND.to_string(),
            timeout,
        })
        .await;

    let notification = match &result {
        Ok(_) => Notification::success(
            "Sandbox Initialized",
            "The sandbox environment is now ready to use",
        ),
        Err(e) => {
            tracing::warn!("Failed to initialize sandbox: {}", e);
            Notification::error(
                "Sandbox Initialization Failed",
                "Could not start the sandbox environment",
            )
        }
    };
    events.publish(SandboxEvent::Notification {
        slot: None,
        notification,
    });
    result
}
