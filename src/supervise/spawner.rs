use crate::config::{SupervisorConfig, SESSION_ENV_VAR};
use crate::error::{Result, VigilError};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Metadata returned when spawning the supervised command
#[derive(Debug)]
pub struct SpawnedChild {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS
    pub pid: u32,
}

/// Spawn the supervised command based on the provided configuration
///
/// The command string is run through the configured shell with its fixed
/// invocation flags, in the configured working directory, with both output
/// channels captured as pipes. The session identifier is exported into the
/// child's environment for correlation.
///
/// # Arguments
/// * `config` - Supervisor configuration containing all spawn settings
///
/// # Returns
/// * `Ok(SpawnedChild)` - Successfully spawned child with its pid
/// * `Err(VigilError)` - Failed to spawn the command
pub async fn spawn_child(config: &SupervisorConfig) -> Result<SpawnedChild> {
    let mut command = Command::new(&config.shell);

    command.args(&config.shell_args);
    command.arg(&config.command);

    if let Some(ref cwd) = config.cwd {
        command.current_dir(cwd);
    }

    command.env(SESSION_ENV_VAR, &config.session_id);

    // Capture both output channels; stdin is never forwarded
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let child = command.spawn().map_err(|e| {
        VigilError::SpawnError(format!("Failed to spawn '{}': {}", config.command, e))
    })?;

    let pid = child.id().ok_or_else(|| {
        VigilError::SpawnError(format!("Failed to get PID for '{}'", config.command))
    })?;

    Ok(SpawnedChild { child, pid })
}
