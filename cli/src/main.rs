mod render;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use cockpit_core::{AgentBackend, Cockpit, CockpitConfig, SandboxSlot};
use cockpit_observability::{
    canonical_logs_dir_from_root, emit_event, init_process_logging, ObservabilityEvent,
    ProcessKind,
};
use cockpit_types::RunStatus;
use cockpit_wire::{SandboxSettings, SettingsAck};

#[derive(Parser, Debug)]
#[command(name = "cockpit")]
#[command(about = "Drive a remote browser/sandbox agent from the terminal")]
struct Cli {
    /// Base URL of the agent service.
    #[arg(long, global = true, env = "COCKPIT_API_URL")]
    api_url: Option<String>,
    /// JSON config file. Defaults to the platform config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a task and follow the run until it finishes. Ctrl-C stops it.
    Run {
        task: String,
        #[arg(long)]
        info: Option<String>,
    },
    /// Show agent, browser and sandbox liveness.
    Status {
        #[arg(long)]
        watch: bool,
        /// Print the full cockpit view as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Execute a shell command in the sandbox.
    Exec {
        command: String,
        /// Seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Read or update a settings section on the service.
    Settings {
        #[arg(value_enum)]
        section: SettingsArg,
        /// JSON body to store instead of reading the current settings.
        #[arg(long)]
        set: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SettingsArg {
    Llm,
    Browser,
    Sandbox,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logs_dir = resolve_logs_dir(cli.logs_dir.clone());
    let (_log_guard, log_info) = init_process_logging(ProcessKind::Cli, &logs_dir, 14)?;
    emit_event(
        tracing::Level::INFO,
        ProcessKind::Cli,
        ObservabilityEvent {
            event: "logging.initialized",
            component: "cli.main",
            status: Some("ok"),
            detail: Some("cli jsonl logging initialized"),
            ..Default::default()
        },
    );
    info!("cli logging initialized: {:?}", log_info);

    let config = load_config(&cli).await?;
    info!(api_base_url = %config.api_base_url, "using agent service");

    match cli.command {
        Command::Run { task, info } => run_task(config, &task, info).await,
        Command::Status { watch, json } => show_status(config, watch, json).await,
        Command::Exec { command, timeout } => exec_command(config, &command, timeout).await,
        Command::Settings { section, set } => settings(config, section, set.as_deref()).await,
    }
}

async fn run_task(config: CockpitConfig, task: &str, info: Option<String>) -> anyhow::Result<()> {
    let cockpit = Cockpit::new(config)?;
    let mut session_events = cockpit.session().subscribe();
    let mut sandbox_events = cockpit.subscribe_sandbox();
    cockpit.activate().await;

    let ticket = match cockpit.session().submit(task, info).await {
        Ok(ticket) => ticket,
        Err(err) => {
            cockpit.teardown().await;
            return Err(err.into());
        }
    };
    info!(run_id = %ticket.run_id, "run submitted");

    let finished = ticket.finished();
    tokio::pin!(finished);
    let mut stopping = false;
    loop {
        tokio::select! {
            _ = &mut finished => break,
            event = session_events.recv() => match event {
                Ok(event) => render::session_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "session events lagged"),
                Err(RecvError::Closed) => break,
            },
            event = sandbox_events.recv() => {
                if let Ok(event) = event {
                    render::sandbox_event(&event);
                }
            }
            signal = tokio::signal::ctrl_c(), if !stopping => {
                signal.context("failed to listen for ctrl-c")?;
                stopping = true;
                if let Err(err) = cockpit.session().stop().await {
                    warn!("stop request failed: {}", err);
                }
            }
        }
    }
    while let Ok(event) = session_events.try_recv() {
        render::session_event(&event);
    }

    let status = cockpit.session().status().await;
    cockpit.teardown().await;
    if status == RunStatus::Failed {
        bail!("agent run failed");
    }
    Ok(())
}

async fn show_status(config: CockpitConfig, watch: bool, json: bool) -> anyhow::Result<()> {
    let cockpit = Cockpit::new(config)?;
    let poller = cockpit.poller();

    if !watch {
        let snapshot = poller.poll_once().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&cockpit.view().await)?);
        } else {
            render::liveness(&snapshot);
        }
        return Ok(());
    }

    let mut rx = poller.subscribe();
    poller.start().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    render::liveness(&snapshot);
                }
            }
        }
    }
    poller.stop().await;
    Ok(())
}

async fn exec_command(
    config: CockpitConfig,
    command: &str,
    timeout: Option<u64>,
) -> anyhow::Result<()> {
    let cockpit = Cockpit::new(config)?;
    let runner = cockpit.sandbox(SandboxSlot::Inline);
    let result = runner.execute(command, timeout).await;
    for message in runner.log().await {
        render::print_message(&message);
    }
    let invocation = result?;
    if !invocation.success {
        bail!("command exited with code {}", invocation.exit_code);
    }
    Ok(())
}

async fn settings(
    config: CockpitConfig,
    section: SettingsArg,
    update: Option<&str>,
) -> anyhow::Result<()> {
    let cockpit = Cockpit::new(config)?;
    let backend = cockpit.backend();

    let Some(raw) = update else {
        let current = match section {
            SettingsArg::Llm => backend.llm_settings().await?,
            SettingsArg::Browser => backend.browser_settings().await?,
            SettingsArg::Sandbox => serde_json::to_value(backend.sandbox_settings().await?)?,
        };
        println!("{}", serde_json::to_string_pretty(&current)?);
        return Ok(());
    };

    let body: serde_json::Value =
        serde_json::from_str(raw).context("--set must be a JSON object")?;
    let ack = match section {
        SettingsArg::Llm => backend.update_llm_settings(&body).await?,
        SettingsArg::Browser => backend.update_browser_settings(&body).await?,
        SettingsArg::Sandbox => {
            let settings: SandboxSettings =
                serde_json::from_value(body).context("invalid sandbox settings")?;
            backend.update_sandbox_settings(&settings).await?
        }
    };
    report_ack(ack)
}

fn report_ack(ack: SettingsAck) -> anyhow::Result<()> {
    let message = ack.message.unwrap_or_else(|| "Settings updated".to_string());
    if ack.success == Some(false) {
        bail!("settings update rejected: {}", message);
    }
    println!("{message}");
    Ok(())
}

async fn load_config(cli: &Cli) -> anyhow::Result<CockpitConfig> {
    let path = cli.config.clone().or_else(default_config_path);
    let mut config = CockpitConfig::load(path.as_deref()).await?;
    if let Some(url) = cli.api_url.as_deref() {
        config.api_base_url = url.to_string();
        config.validate()?;
    }
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cockpit").join("config.json"))
}

fn resolve_logs_dir(flag: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir;
    }
    let root = dirs::data_local_dir()
        .map(|dir| dir.join("cockpit"))
        .unwrap_or_else(|| PathBuf::from(".cockpit"));
    canonical_logs_dir_from_root(&root)
}
