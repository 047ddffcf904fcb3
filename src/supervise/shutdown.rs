use crate::server::ServerHandle;
use crate::supervise::events::{Event, EventSender};
use crate::supervise::probe;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

/// Run the ordered, settle-all shutdown cleanup.
///
/// Both steps run concurrently and each failure is recorded without
/// blocking the other; once everything has settled a `CleanupDone` event is
/// sent. The absolute timeout guard spawned alongside this task makes sure
/// final exit happens even if a step never settles.
pub async fn run_cleanup(
    server: Option<ServerHandle>,
    child_pid: Option<u32>,
    child_live: watch::Receiver<bool>,
    kill_grace: Duration,
    events: EventSender,
) {
    let close_server = async {
        if let Some(handle) = server {
            if let Err(e) = handle.close().await {
                warn!("Status server did not close cleanly: {}", e);
            }
        }
    };

    let stop_child = async {
        if let Some(pid) = child_pid {
            terminate_child(pid, child_live, kill_grace).await;
        }
    };

    tokio::join!(close_server, stop_child);

    let _ = events.send(Event::CleanupDone);
}

/// Spawn the independent absolute bound on shutdown cleanup.
///
/// Fires `CleanupDone` after `shutdown_timeout` regardless of whether the
/// cleanup task has settled; the dispatcher honors whichever arrives first.
pub fn spawn_timeout_guard(shutdown_timeout: Duration, events: EventSender) {
    tokio::spawn(async move {
        sleep(shutdown_timeout).await;
        warn!(
            "Shutdown cleanup exceeded {:?}, forcing final exit",
            shutdown_timeout
        );
        let _ = events.send(Event::CleanupDone);
    });
}

/// Gracefully stop the child: SIGTERM, then race its exit against the
/// forced-kill timer. Whichever is observed first wins; the forced kill is
/// suppressed by a liveness check in case the exit lands during the grace
/// delay.
async fn terminate_child(
    pid: u32,
    mut child_live: watch::Receiver<bool>,
    kill_grace: Duration,
) {
    let nix_pid = Pid::from_raw(pid as i32);

    info!("Gracefully stopping child (PID: {}) with SIGTERM", pid);
    if let Err(e) = signal::kill(nix_pid, Signal::SIGTERM) {
        // Most likely the child exited just before the signal
        warn!("Failed to send SIGTERM to PID {}: {}", pid, e);
    }

    tokio::select! {
        result = child_live.wait_for(|live| !*live) => {
            match result {
                Ok(_) => info!("Child (PID: {}) exited after SIGTERM", pid),
                // Dispatcher gone; nothing left to wait for
                Err(_) => {}
            }
        }
        _ = sleep(kill_grace) => {
            if probe::is_process_alive(pid) {
                warn!(
                    "Child (PID: {}) did not exit within {:?}, sending SIGKILL",
                    pid, kill_grace
                );
                if let Err(e) = signal::kill(nix_pid, Signal::SIGKILL) {
                    warn!("Failed to send SIGKILL to PID {}: {}", pid, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervise::events;
    use std::time::Instant;

    #[tokio::test]
    async fn test_cleanup_with_nothing_to_do_settles_immediately() {
        let (tx, mut rx) = events::channel();
        let (_live_tx, live_rx) = watch::channel(false);

        run_cleanup(None, None, live_rx, Duration::from_secs(1), tx).await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::CleanupDone));
    }

    #[tokio::test]
    async fn test_terminate_child_observes_exit_before_grace() {
        let mut child = tokio::process::Command::new("/bin/sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let (live_tx, live_rx) = watch::channel(true);

        // Mirror the dispatcher: flip the flag when the child exits
        tokio::spawn(async move {
            let _ = child.wait().await;
            let _ = live_tx.send(false);
        });

        let start = Instant::now();
        terminate_child(pid, live_rx, Duration::from_secs(10)).await;

        // sleep dies to SIGTERM, so the exit branch wins well before the grace
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_terminate_child_forces_kill_after_grace() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        // Nothing flips the flag, so only the grace branch can resolve
        let (_live_tx, live_rx) = watch::channel(true);
        terminate_child(pid, live_rx, Duration::from_secs(1)).await;

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("child should be force-killed")
            .unwrap();
        assert_eq!(status.signal(), Some(9));
    }

    #[tokio::test]
    async fn test_timeout_guard_fires() {
        let (tx, mut rx) = events::channel();

        spawn_timeout_guard(Duration::from_millis(50), tx);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("guard should fire")
            .unwrap();
        assert!(matches!(event, Event::CleanupDone));
    }
}
