use crate::error::{Result, VigilError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when `--session-id` is not given
pub const SESSION_ENV_VAR: &str = "VIGIL_SESSION_ID";

/// Environment variable consulted when `--command` is not given
pub const COMMAND_ENV_VAR: &str = "VIGIL_COMMAND";

/// Supervisor configuration with all settings for one supervised command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Opaque correlation identifier for this supervision run
    #[serde(default)]
    pub session_id: String,

    /// The command line to supervise (run through the configured shell)
    #[serde(default)]
    pub command: String,

    /// Working directory for the child process
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Shell used to run the command
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Fixed flags passed to the shell ahead of the command string
    #[serde(default = "default_shell_args")]
    pub shell_args: Vec<String>,

    /// Maximum silence on both output channels before the child is
    /// considered hung (in seconds)
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,

    /// Interval between hang-detector checks (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum number of restart attempts
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Delay before a scheduled restart (in seconds)
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,

    /// Trailing window over which restart attempts are counted (in seconds)
    #[serde(default = "default_restart_window")]
    pub restart_window_secs: u64,

    /// Absolute bound on shutdown cleanup before final exit (in seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Grace period between the terminate and kill signals (in seconds)
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,

    /// Bind address for the status server
    #[serde(default = "default_status_bind")]
    pub status_bind: String,

    /// Port for the status server (0 picks an ephemeral port)
    #[serde(default = "default_status_port")]
    pub status_port: u16,
}

// Default value functions for serde
fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_shell_args() -> Vec<String> {
    vec!["-c".to_string()]
}

fn default_stream_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    15
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_delay() -> u64 {
    5
}

fn default_restart_window() -> u64 {
    900
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_kill_grace() -> u64 {
    10
}

fn default_status_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_status_port() -> u16 {
    8466
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            command: String::new(),
            cwd: None,
            shell: default_shell(),
            shell_args: default_shell_args(),
            stream_timeout_secs: default_stream_timeout(),
            poll_interval_secs: default_poll_interval(),
            max_restarts: default_max_restarts(),
            restart_delay_secs: default_restart_delay(),
            restart_window_secs: default_restart_window(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            kill_grace_secs: default_kill_grace(),
            status_bind: default_status_bind(),
            status_port: default_status_port(),
        }
    }
}

impl SupervisorConfig {
    /// Load the configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<SupervisorConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| VigilError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| VigilError::InvalidConfig(format!("Failed to parse TOML: {}", e))),
            "json" => serde_json::from_str(&contents)
                .map_err(|e| VigilError::InvalidConfig(format!("Failed to parse JSON: {}", e))),
            _ => Err(VigilError::InvalidConfig(format!(
                "Unsupported file format: {}. Use .toml or .json",
                extension
            ))),
        }
    }

    /// Fill the two required startup inputs from the environment when they
    /// were not supplied by other means
    pub fn resolve_startup_inputs(&mut self) {
        if self.session_id.is_empty() {
            if let Ok(value) = std::env::var(SESSION_ENV_VAR) {
                self.session_id = value;
            }
        }
        if self.command.is_empty() {
            if let Ok(value) = std::env::var(COMMAND_ENV_VAR) {
                self.command = value;
            }
        }
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Ok(())` - Configuration is usable
    /// * `Err(VigilError)` - A required input is missing or a value is out of range
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(VigilError::MissingInput("session id".to_string()));
        }

        if self.command.trim().is_empty() {
            return Err(VigilError::MissingInput("command".to_string()));
        }

        if self.shell.is_empty() {
            return Err(VigilError::ConfigValidationError(
                "shell must not be empty".to_string(),
            ));
        }

        if self.max_restarts == 0 {
            return Err(VigilError::ConfigValidationError(
                "max_restarts must be at least 1".to_string(),
            ));
        }

        if self.stream_timeout_secs == 0 {
            return Err(VigilError::ConfigValidationError(
                "stream_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(VigilError::ConfigValidationError(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }

        // The overall shutdown bound must outlast the per-step kill grace,
        // otherwise the forced-kill step can never run before final exit.
        if self.kill_grace_secs >= self.shutdown_timeout_secs {
            return Err(VigilError::ConfigValidationError(format!(
                "kill_grace_secs ({}) must be shorter than shutdown_timeout_secs ({})",
                self.kill_grace_secs, self.shutdown_timeout_secs
            )));
        }

        if let Some(ref cwd) = self.cwd {
            if !cwd.exists() {
                return Err(VigilError::ConfigValidationError(format!(
                    "Working directory does not exist: {}",
                    cwd.display()
                )));
            }
            if !cwd.is_dir() {
                return Err(VigilError::ConfigValidationError(format!(
                    "Working directory is not a directory: {}",
                    cwd.display()
                )));
            }
        }

        Ok(())
    }

    /// Get stream-silence timeout as Duration
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Get hang-detector poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Get inter-restart delay as Duration
    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    /// Get restart-eligibility window as Duration
    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    /// Get overall shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Get forced-kill grace delay as Duration
    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}
