use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::server::{self, ServerHandle};
use crate::signals;
use crate::state::{ChildHandle, SupervisorState};
use crate::supervise::events::{self, Event, EventReceiver, EventSender, OutputChannel};
use crate::supervise::hang;
use crate::supervise::restart::RestartPolicy;
use crate::supervise::shutdown;
use crate::supervise::spawner;
use std::os::unix::process::ExitStatusExt;
use std::time::SystemTime;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Run a full supervision pass: validate, start the status server and the
/// signal listener, then drive the dispatcher until shutdown settles.
///
/// # Returns
/// * `Ok(code)` - The process exit code chosen by the shutdown coordinator
/// * `Err(VigilError)` - Startup validation or server bind failed before
///   anything was spawned
pub async fn run(config: SupervisorConfig) -> Result<i32> {
    config.validate()?;

    let mut supervisor = Supervisor::new(config);

    let server = server::spawn(supervisor.config(), supervisor.event_sender()).await?;
    supervisor.attach_server(server);
    signals::spawn_listener(supervisor.event_sender());

    Ok(supervisor.run().await)
}

/// The supervision dispatcher.
///
/// Owns the supervisor state exclusively and consumes the event queue one
/// event at a time, so every reaction below runs to completion before the
/// next one starts. Reader tasks, the exit waiter, timers, the signal
/// listener and the status server communicate with it only through events.
pub struct Supervisor {
    config: SupervisorConfig,
    policy: RestartPolicy,
    state: SupervisorState,
    events: EventReceiver,
    sender: EventSender,
    /// Present while hang polling is active for the current generation
    hang_timer: Option<JoinHandle<()>>,
    /// Mirrors child liveness for the shutdown coordinator's exit race
    child_live: watch::Sender<bool>,
    server: Option<ServerHandle>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (sender, events) = events::channel();
        let policy = RestartPolicy::from_config(&config);
        let state = SupervisorState::new(config.session_id.clone(), config.command.clone());
        let (child_live, _) = watch::channel(false);

        Self {
            config,
            policy,
            state,
            events,
            sender,
            hang_timer: None,
            child_live,
            server: None,
        }
    }

    /// Clone of the event queue's sending half, for wiring up collaborators
    pub fn event_sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn attach_server(&mut self, server: ServerHandle) {
        self.server = Some(server);
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Drive the supervision loop until shutdown cleanup settles.
    ///
    /// # Returns
    /// The final process exit code
    pub async fn run(&mut self) -> i32 {
        info!(
            "Supervising '{}' (session: {})",
            self.state.command, self.state.session_id
        );

        self.start_child().await;
        self.arm_hang_timer();

        while let Some(event) = self.events.recv().await {
            match event {
                Event::ChildOutput {
                    generation,
                    channel,
                    bytes,
                } => self.handle_output(generation, channel, &bytes),
                Event::ChildExited {
                    generation,
                    code,
                    signal,
                } => self.handle_child_exited(generation, code, signal),
                Event::SpawnFailed { error } => self.handle_spawn_failed(&error),
                Event::HangTick => self.handle_hang_tick(),
                Event::RestartDue => self.handle_restart_due().await,
                Event::Signal(name) => self.request_shutdown(0, name),
                Event::Fault(detail) => {
                    error!("Uncaught fault: {}", detail);
                    self.request_shutdown(1, &detail);
                }
                Event::StatusQuery { reply } => {
                    let _ = reply.send(self.state.snapshot(&self.config));
                }
                Event::CleanupDone => {
                    if self.state.shutting_down {
                        break;
                    }
                }
            }
        }

        let code = self.state.final_exit_code.unwrap_or(0);
        info!("Supervision finished (exit code {})", code);
        code
    }

    /// Launch a new child generation and wire its output channels and exit
    /// event into the queue. A spawn failure is fed back as an event so it
    /// travels the same failure path as a non-zero exit.
    async fn start_child(&mut self) {
        let generation = self.state.next_generation();

        match spawner::spawn_child(&self.config).await {
            Ok(mut spawned) => {
                info!(
                    "Spawned child (PID: {}, generation {})",
                    spawned.pid, generation
                );

                if let Some(stdout) = spawned.child.stdout.take() {
                    tokio::spawn(read_stream(
                        stdout,
                        OutputChannel::Stdout,
                        generation,
                        self.sender.clone(),
                    ));
                }
                if let Some(stderr) = spawned.child.stderr.take() {
                    tokio::spawn(read_stream(
                        stderr,
                        OutputChannel::Stderr,
                        generation,
                        self.sender.clone(),
                    ));
                }

                // The waiter task owns the handle; the dispatcher only ever
                // sees the pid
                let events = self.sender.clone();
                let mut child = spawned.child;
                tokio::spawn(async move {
                    let (code, signal) = match child.wait().await {
                        Ok(status) => (status.code(), status.signal()),
                        Err(e) => {
                            warn!("Failed to wait on child: {}", e);
                            (None, None)
                        }
                    };
                    let _ = events.send(Event::ChildExited {
                        generation,
                        code,
                        signal,
                    });
                });

                self.state.child = Some(ChildHandle {
                    pid: spawned.pid,
                    generation,
                });
                self.state.activity.reset();
                let _ = self.child_live.send(true);
            }
            Err(e) => {
                let _ = self.sender.send(Event::SpawnFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Output on either channel counts as liveness
    fn handle_output(&mut self, generation: u64, channel: OutputChannel, bytes: &[u8]) {
        if !self.state.is_current_child(generation) {
            return;
        }
        tracing::debug!("Child {} produced {} bytes", channel, bytes.len());
        self.state.activity.record(bytes);
    }

    fn handle_child_exited(&mut self, generation: u64, code: Option<i32>, signal: Option<i32>) {
        if !self.state.is_current_child(generation) {
            return;
        }

        self.state.activity.stream_active = false;
        self.state.child = None;
        let _ = self.child_live.send(false);

        // During shutdown the coordinator is already driving termination
        if self.state.shutting_down {
            return;
        }

        if code == Some(0) {
            info!("Child completed successfully");
            self.request_shutdown(0, "command completed successfully");
            return;
        }

        let reason = match (code, signal) {
            (Some(c), _) => format!("exit code {}", c),
            (None, Some(s)) => format!("killed by signal {}", s),
            (None, None) => "unknown exit status".to_string(),
        };
        warn!("Child failed ({})", reason);
        self.handle_failure(&reason);
    }

    fn handle_spawn_failed(&mut self, error: &str) {
        if self.state.shutting_down {
            return;
        }
        warn!("{}", error);
        self.handle_failure(error);
    }

    /// The single failure/restart decision point for exits, signal deaths
    /// and spawn errors
    fn handle_failure(&mut self, reason: &str) {
        let now = SystemTime::now();
        let eligible =
            self.policy
                .can_restart(self.state.restart_count, &self.state.restart_history, now);

        if eligible {
            let delay = self.config.restart_delay();
            info!(
                "Scheduling restart attempt {} of {} in {:?}",
                self.state.restart_count + 1,
                self.config.max_restarts,
                delay
            );
            let events = self.sender.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = events.send(Event::RestartDue);
            });
        } else {
            self.request_shutdown(
                1,
                &format!(
                    "restart budget exhausted after {} attempts (last failure: {})",
                    self.state.restart_count, reason
                ),
            );
        }
    }

    async fn handle_restart_due(&mut self) {
        // A shutdown requested during the delay cancels the attempt
        if self.state.shutting_down {
            return;
        }

        self.state.restart_history.record(SystemTime::now());
        self.state.restart_count += 1;
        info!(
            "Restarting command (attempt {} of {})",
            self.state.restart_count, self.config.max_restarts
        );

        self.start_child().await;
        self.arm_hang_timer();
    }

    fn handle_hang_tick(&mut self) {
        if self.state.shutting_down {
            return;
        }
        // No live child: keep polling, a restart may be pending
        let Some(child) = self.state.child else {
            return;
        };

        let silence = self.state.activity.silence();
        if silence > self.config.stream_timeout() {
            warn!(
                "No output for {:?} (limit {:?}), killing hung child (PID: {})",
                silence,
                self.config.stream_timeout(),
                child.pid
            );
            hang::kill_cascade(child.pid, self.config.kill_grace());

            // Single-shot per generation: a hang always ends the current
            // child, so polling resumes with the next spawn
            if let Some(timer) = self.hang_timer.take() {
                timer.abort();
            }
        }
    }

    fn arm_hang_timer(&mut self) {
        if let Some(timer) = self.hang_timer.take() {
            timer.abort();
        }
        self.hang_timer = Some(hang::spawn_ticker(
            self.config.poll_interval(),
            self.sender.clone(),
        ));
    }

    /// Latch shutdown and start the cleanup and its absolute timeout guard.
    /// Idempotent: only the first call's exit code and reason are honored.
    fn request_shutdown(&mut self, exit_code: i32, reason: &str) {
        if self.state.shutting_down {
            return;
        }

        info!("Shutdown requested (exit code {}): {}", exit_code, reason);
        self.state.shutting_down = true;
        self.state.final_exit_code = Some(exit_code);

        if let Some(timer) = self.hang_timer.take() {
            timer.abort();
        }

        let server = self.server.take();
        let child_pid = self.state.child.map(|c| c.pid);
        tokio::spawn(shutdown::run_cleanup(
            server,
            child_pid,
            self.child_live.subscribe(),
            self.config.kill_grace(),
            self.sender.clone(),
        ));
        shutdown::spawn_timeout_guard(self.config.shutdown_timeout(), self.sender.clone());
    }
}

/// Forward chunks from one child output channel into the event queue until
/// the pipe closes
async fn read_stream<R>(
    mut reader: R,
    channel: OutputChannel,
    generation: u64,
    events: EventSender,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                // EOF - the child closed this channel
                break;
            }
            Ok(n) => {
                let sent = events.send(Event::ChildOutput {
                    generation,
                    channel,
                    bytes: buf[..n].to_vec(),
                });
                if sent.is_err() {
                    break;
                }
            }
            Err(_) => {
                // Read error - the child is likely gone
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_supervisor(command: &str) -> Supervisor {
        Supervisor::new(SupervisorConfig {
            session_id: "controller-test".to_string(),
            command: command.to_string(),
            max_restarts: 2,
            restart_delay_secs: 1,
            shutdown_timeout_secs: 5,
            kill_grace_secs: 1,
            ..SupervisorConfig::default()
        })
    }

    #[tokio::test]
    async fn test_request_shutdown_first_call_wins() {
        let mut supervisor = test_supervisor("sleep 1");

        supervisor.request_shutdown(1, "first");
        supervisor.request_shutdown(0, "second");

        assert!(supervisor.state.shutting_down);
        assert_eq!(supervisor.state.final_exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_stale_generation_output_is_ignored() {
        let mut supervisor = test_supervisor("sleep 1");
        supervisor.state.child = Some(ChildHandle {
            pid: 999,
            generation: 3,
        });

        supervisor.handle_output(2, OutputChannel::Stdout, b"old generation");
        assert_eq!(supervisor.state.activity.last_snippet(), "");

        supervisor.handle_output(3, OutputChannel::Stderr, b"current generation");
        assert_eq!(
            supervisor.state.activity.last_snippet(),
            "current generation"
        );
    }

    #[tokio::test]
    async fn test_stale_generation_exit_is_ignored() {
        let mut supervisor = test_supervisor("sleep 1");
        supervisor.state.child = Some(ChildHandle {
            pid: 999,
            generation: 3,
        });

        supervisor.handle_child_exited(2, Some(0), None);

        assert!(supervisor.state.child.is_some());
        assert!(!supervisor.state.shutting_down);
    }

    #[tokio::test]
    async fn test_failure_past_budget_requests_shutdown() {
        let mut supervisor = test_supervisor("sleep 1");
        supervisor.state.restart_count = 2;

        supervisor.handle_failure("exit code 1");

        assert!(supervisor.state.shutting_down);
        assert_eq!(supervisor.state.final_exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_restart_due_after_shutdown_is_inert() {
        let mut supervisor = test_supervisor("sleep 1");
        supervisor.request_shutdown(0, "test");

        supervisor.handle_restart_due().await;

        assert_eq!(supervisor.state.restart_count, 0);
        assert!(supervisor.state.restart_history.is_empty());
        assert!(supervisor.state.child.is_none());
    }

    #[tokio::test]
    async fn test_hang_tick_without_child_is_inert() {
        let mut supervisor = test_supervisor("sleep 1");
        supervisor.state.activity.reset();

        supervisor.handle_hang_tick();

        assert!(!supervisor.state.shutting_down);
    }
}
