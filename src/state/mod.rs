// Supervisor state - the single in-memory record of a supervision run

use crate::config::SupervisorConfig;
use crate::supervise::activity::ActivityTracker;
use crate::supervise::restart::RestartHistory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime};

/// The dispatcher's view of the currently live child process.
///
/// The `tokio::process::Child` itself is owned by the per-generation waiter
/// task; signalling goes by pid. Replaced wholesale on each spawn.
#[derive(Debug, Clone, Copy)]
pub struct ChildHandle {
    pub pid: u32,
    pub generation: u64,
}

/// All mutable supervision state, constructed once at startup and owned
/// exclusively by the dispatcher task.
#[derive(Debug)]
pub struct SupervisorState {
    /// Opaque correlation identifier; immutable after construction
    pub session_id: String,
    /// The supervised command; immutable after construction
    pub command: String,
    /// Wall-clock start of this supervision run
    pub start_time: SystemTime,
    /// Monotonic counterpart of `start_time`
    started: Instant,
    /// Liveness record for the child's output streams
    pub activity: ActivityTracker,
    /// Currently live child, if any
    pub child: Option<ChildHandle>,
    /// Number of restarts actually attempted
    pub restart_count: u32,
    /// Append-only record of attempted-restart instants
    pub restart_history: RestartHistory,
    /// Monotonic shutdown latch; once true, never reset
    pub shutting_down: bool,
    /// Exit code chosen at the moment shutdown was requested
    pub final_exit_code: Option<i32>,
    /// Child generation counter; bumped on every spawn
    generation: u64,
}

impl SupervisorState {
    pub fn new(session_id: String, command: String) -> Self {
        Self {
            session_id,
            command,
            start_time: SystemTime::now(),
            started: Instant::now(),
            activity: ActivityTracker::new(),
            child: None,
            restart_count: 0,
            restart_history: RestartHistory::new(),
            shutting_down: false,
            final_exit_code: None,
            generation: 0,
        }
    }

    /// Allocate the next child generation number
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// How long this supervision run has been up
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether `generation` refers to the currently live child
    pub fn is_current_child(&self, generation: u64) -> bool {
        self.child.map(|c| c.generation) == Some(generation)
    }

    /// Produce a read-only point-in-time snapshot for the status server
    pub fn snapshot(&self, config: &SupervisorConfig) -> StatusSnapshot {
        StatusSnapshot {
            pid: std::process::id(),
            child_pid: self.child.map(|c| c.pid),
            alive: self.child.is_some(),
            uptime_secs: self.uptime().as_secs(),
            started_at: DateTime::<Utc>::from(self.start_time),
            last_output_at: DateTime::<Utc>::from(self.activity.last_output_at()),
            last_output_snippet: self.activity.last_snippet().to_string(),
            stream_active: self.activity.stream_active,
            silence_secs: self.activity.silence().as_secs(),
            stream_timeout_secs: config.stream_timeout_secs,
            restart_count: self.restart_count,
            max_restarts: config.max_restarts,
            restart_history: self
                .restart_history
                .timestamps()
                .iter()
                .map(|&at| DateTime::<Utc>::from(at))
                .collect(),
            session_id: self.session_id.clone(),
            command: self.command.clone(),
            shutting_down: self.shutting_down,
            final_exit_code: self.final_exit_code,
        }
    }
}

/// Read-only snapshot served by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub pid: u32,
    pub child_pid: Option<u32>,
    pub alive: bool,
    pub uptime_secs: u64,
    pub started_at: DateTime<Utc>,
    pub last_output_at: DateTime<Utc>,
    pub last_output_snippet: String,
    pub stream_active: bool,
    pub silence_secs: u64,
    pub stream_timeout_secs: u64,
    pub restart_count: u32,
    pub max_restarts: u32,
    pub restart_history: Vec<DateTime<Utc>>,
    pub session_id: String,
    pub command: String,
    pub shutting_down: bool,
    pub final_exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> SupervisorState {
        SupervisorState::new("session-9".to_string(), "sleep 1".to_string())
    }

    #[test]
    fn test_new_state() {
        let state = test_state();

        assert!(state.child.is_none());
        assert_eq!(state.restart_count, 0);
        assert!(state.restart_history.is_empty());
        assert!(!state.shutting_down);
        assert!(state.final_exit_code.is_none());
    }

    #[test]
    fn test_generation_counter_increments() {
        let mut state = test_state();

        assert_eq!(state.next_generation(), 1);
        assert_eq!(state.next_generation(), 2);

        state.child = Some(ChildHandle {
            pid: 1234,
            generation: 2,
        });

        assert!(state.is_current_child(2));
        assert!(!state.is_current_child(1));
    }

    #[test]
    fn test_is_current_child_without_child() {
        let state = test_state();
        assert!(!state.is_current_child(1));
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let config = SupervisorConfig {
            session_id: "session-9".to_string(),
            command: "sleep 1".to_string(),
            ..SupervisorConfig::default()
        };
        let mut state = test_state();

        state.child = Some(ChildHandle {
            pid: 4321,
            generation: 1,
        });
        state.activity.record(b"latest output");
        state.restart_count = 2;
        state.restart_history.record(SystemTime::now());
        state.restart_history.record(SystemTime::now());

        let snapshot = state.snapshot(&config);

        assert_eq!(snapshot.pid, std::process::id());
        assert_eq!(snapshot.child_pid, Some(4321));
        assert!(snapshot.alive);
        assert_eq!(snapshot.last_output_snippet, "latest output");
        assert!(snapshot.stream_active);
        assert_eq!(snapshot.restart_count, 2);
        assert_eq!(snapshot.restart_history.len(), 2);
        assert_eq!(snapshot.session_id, "session-9");
        assert_eq!(snapshot.command, "sleep 1");
        assert!(!snapshot.shutting_down);
        assert_eq!(snapshot.final_exit_code, None);
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let config = SupervisorConfig {
            session_id: "session-9".to_string(),
            command: "sleep 1".to_string(),
            ..SupervisorConfig::default()
        };
        let state = test_state();

        let json = serde_json::to_value(state.snapshot(&config)).unwrap();

        assert!(json.get("pid").is_some());
        assert!(json.get("alive").is_some());
        assert!(json.get("silence_secs").is_some());
        assert!(json.get("restart_history").is_some());
        assert_eq!(json["session_id"], "session-9");
        assert_eq!(json["child_pid"], serde_json::Value::Null);
    }
}
