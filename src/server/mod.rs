// Status server - read-only HTTP snapshot of the supervision run

use crate::config::SupervisorConfig;
use crate::error::{Result, VigilError};
use crate::state::StatusSnapshot;
use crate::supervise::events::{Event, EventSender};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle to the running status server, used by the shutdown coordinator to
/// close it and by tests to learn the bound address.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    pub local_addr: SocketAddr,
}

impl ServerHandle {
    /// Trigger graceful shutdown and wait for the server task to finish
    pub async fn close(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| VigilError::ServerError(format!("server task failed: {}", e)))
    }
}

/// Bind the status server and start serving.
///
/// The server never touches supervisor state directly: every request is
/// answered from a point-in-time snapshot obtained over the event queue. An
/// unexpected serve failure is reported as a fault so the supervisor can
/// shut down instead of running blind.
pub async fn spawn(config: &SupervisorConfig, events: EventSender) -> Result<ServerHandle> {
    let app = router(events.clone());

    let addr = format!("{}:{}", config.status_bind, config.status_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| VigilError::ServerError(format!("Failed to bind {}: {}", addr, e)))?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Status server listening on {}", local_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;

        if let Err(e) = result {
            let _ = events.send(Event::Fault(format!("status server failed: {}", e)));
        }
    });

    Ok(ServerHandle {
        shutdown: shutdown_tx,
        task,
        local_addr,
    })
}

/// Build the status router: one GET route, 405 on other methods, 404
/// everywhere else
pub fn router(events: EventSender) -> Router {
    Router::new()
        .route("/status", get(status))
        .fallback(not_found)
        .with_state(events)
}

async fn status(
    State(events): State<EventSender>,
) -> std::result::Result<Json<StatusSnapshot>, StatusCode> {
    let (reply_tx, reply_rx) = oneshot::channel();

    events
        .send(Event::StatusQuery { reply: reply_tx })
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let snapshot = reply_rx
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(snapshot))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
