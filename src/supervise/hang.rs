use crate::supervise::events::{Event, EventSender};
use crate::supervise::probe;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Spawn the recurring hang-detector timer.
///
/// The task only emits ticks; the silence comparison and the decision to
/// kill run in the dispatcher, which owns the activity tracker. The handle
/// is kept so the dispatcher can stop this timer instance once a cascade
/// fires or shutdown begins.
pub fn spawn_ticker(poll_interval: Duration, events: EventSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(poll_interval).await;
            debug!("hang detector tick");
            if events.send(Event::HangTick).is_err() {
                break;
            }
        }
    })
}

/// Kill a hung child: graceful-terminate now, forced-kill after the grace
/// delay if it is still around.
///
/// Does not wait for the exit and does not drive restart logic - the exit
/// event observed by the dispatcher continues the failure flow, so a
/// hung-then-killed child looks exactly like one that died on its own.
pub fn kill_cascade(pid: u32, kill_grace: Duration) {
    let nix_pid = Pid::from_raw(pid as i32);

    warn!("Sending SIGTERM to hung child (PID: {})", pid);
    if let Err(e) = signal::kill(nix_pid, Signal::SIGTERM) {
        warn!("Failed to send SIGTERM to PID {}: {}", pid, e);
        return;
    }

    tokio::spawn(async move {
        sleep(kill_grace).await;

        // Suppression check: the child may have exited during the grace delay
        if !probe::is_process_alive(pid) {
            return;
        }

        warn!(
            "Child (PID: {}) did not exit within {:?}, sending SIGKILL",
            pid, kill_grace
        );
        if let Err(e) = signal::kill(nix_pid, Signal::SIGKILL) {
            warn!("Failed to send SIGKILL to PID {}: {}", pid, e);
        }
    });
}
