use crate::state::StatusSnapshot;
use tokio::sync::{mpsc, oneshot};

/// Sending half of the supervisor event queue
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving half of the supervisor event queue
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create the supervisor event queue
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Which output channel of the child produced a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChannel {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputChannel::Stdout => write!(f, "stdout"),
            OutputChannel::Stderr => write!(f, "stderr"),
        }
    }
}

/// Everything the dispatcher reacts to.
///
/// All state transitions happen as discrete reactions to these events,
/// consumed one at a time by the supervisor loop. Timer tasks, reader tasks,
/// the exit waiter, the signal listener and the status server only ever send.
#[derive(Debug)]
pub enum Event {
    /// A chunk arrived on one of the child's output channels
    ChildOutput {
        generation: u64,
        channel: OutputChannel,
        bytes: Vec<u8>,
    },

    /// The child's wait() resolved
    ChildExited {
        generation: u64,
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// The child could not be launched at all
    SpawnFailed { error: String },

    /// Recurring hang-detector check is due
    HangTick,

    /// The inter-restart delay has elapsed
    RestartDue,

    /// An OS termination signal was received
    Signal(&'static str),

    /// An unexpected failure in a component task
    Fault(String),

    /// A status query wants a point-in-time snapshot
    StatusQuery {
        reply: oneshot::Sender<StatusSnapshot>,
    },

    /// Shutdown cleanup settled (or its absolute timeout fired)
    CleanupDone,
}
