use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use cockpit_types::LivenessSnapshot;

use crate::error::Result;
use crate::gateway::AgentBackend;

/// Shortest interval the loop will tick at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct PollerState {
    running: bool,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Background liveness poll of the agent service.
///
/// Each tick replaces the published snapshot as a whole. A failed fetch is
/// logged and the previous snapshot stays in place.
pub struct StatusPoller {
    backend: Arc<dyn AgentBackend>,
    interval: Duration,
    state: Mutex<PollerState>,
    tx: Arc<watch::Sender<LivenessSnapshot>>,
}

impl StatusPoller {
    /// `interval` is raised to [`MIN_POLL_INTERVAL`] when shorter.
    pub fn new(backend: Arc<dyn AgentBackend>, interval: Duration) -> Self {
        let (tx, _) = watch::channel(LivenessSnapshot::unknown());
        Self {
            backend,
            interval: interval.max(MIN_POLL_INTERVAL),
            state: Mutex::new(PollerState {
                running: false,
                stop_tx: None,
                task: None,
            }),
            tx: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LivenessSnapshot> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> LivenessSnapshot {
        self.tx.borrow().clone()
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// One fetch outside the loop. Publishes the snapshot on success.
    pub async fn poll_once(&self) -> Result<LivenessSnapshot> {
        let snapshot = self.backend.agent_status().await?;
        self.tx.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    /// Starts the loop; the first check happens immediately. Returns `false`
    /// when already running.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.running {
            return false;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tick.tick() => {}
                }

                let fetched = tokio::select! {
                    _ = &mut stop_rx => break,
                    fetched = backend.agent_status() => fetched,
                };

                match fetched {
                    Ok(snapshot) => {
                        tracing::debug!(
                            status = %snapshot.status,
                            browser = snapshot.browser_available,
                            sandbox = snapshot.sandbox_available,
                            "liveness updated"
                        );
                        tx.send_replace(snapshot);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to check agent status: {}", e);
                    }
                }
            }
        });

        state.running = true;
        state.stop_tx = Some(stop_tx);
        state.task = Some(task);
        true
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(stop_tx) = state.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = state.task.take() {
            let _ = task.await;
        }
        state.running = false;
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_lock() {
            if let Some(task) = state.task.take() {
                task.abort();
            }
        }
    }
}
