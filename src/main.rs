use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vigil::config::SupervisorConfig;

/// Vigil - fire-and-forget supervisor for a single long-running command.
/// Launches the command, watches its output for signs of life, restarts it
/// under a bounded policy when it stalls or fails, and exits cleanly when
/// it succeeds or the restart budget runs out.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Session identifier (falls back to VIGIL_SESSION_ID)
    #[arg(long)]
    session_id: Option<String>,

    /// Command to supervise (falls back to VIGIL_COMMAND)
    #[arg(long)]
    command: Option<String>,

    /// Config file path (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory for the child
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Stream-silence timeout in seconds
    #[arg(long)]
    stream_timeout: Option<u64>,

    /// Maximum number of restart attempts
    #[arg(long)]
    max_restarts: Option<u32>,

    /// Delay before a scheduled restart in seconds
    #[arg(long)]
    restart_delay: Option<u64>,

    /// Status server port
    #[arg(long)]
    port: Option<u16>,

    /// Status server bind address
    #[arg(long)]
    bind: Option<String>,
}

fn build_config(cli: Cli) -> anyhow::Result<SupervisorConfig> {
    let mut config = match &cli.config {
        Some(path) => SupervisorConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SupervisorConfig::default(),
    };

    if let Some(session_id) = cli.session_id {
        config.session_id = session_id;
    }
    if let Some(command) = cli.command {
        config.command = command;
    }
    if let Some(cwd) = cli.cwd {
        config.cwd = Some(cwd);
    }
    if let Some(stream_timeout) = cli.stream_timeout {
        config.stream_timeout_secs = stream_timeout;
    }
    if let Some(max_restarts) = cli.max_restarts {
        config.max_restarts = max_restarts;
    }
    if let Some(restart_delay) = cli.restart_delay {
        config.restart_delay_secs = restart_delay;
    }
    if let Some(port) = cli.port {
        config.status_port = port;
    }
    if let Some(bind) = cli.bind {
        config.status_bind = bind;
    }

    config.resolve_startup_inputs();

    Ok(config)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigil=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match build_config(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    match vigil::supervise::run(config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
    }
}
