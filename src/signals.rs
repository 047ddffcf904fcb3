// OS signal handling - both conventional termination signals request a
// clean shutdown with exit code 0

use crate::supervise::events::{Event, EventSender};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

/// Listen for SIGTERM and SIGINT and forward the first one received as a
/// shutdown-requesting event.
pub fn spawn_listener(events: EventSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");

        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };

        tracing::info!("Received {}", name);
        let _ = events.send(Event::Signal(name));
    })
}
