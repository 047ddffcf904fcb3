// Supervision core: state machine, hang detection, restart policy,
// kill cascade and shutdown coordination

pub mod activity;
pub mod controller;
pub mod events;
pub mod hang;
pub mod probe;
pub mod restart;
pub mod shutdown;
pub mod spawner;

pub use controller::{run, Supervisor};
pub use events::{Event, EventSender, OutputChannel};
pub use restart::{RestartHistory, RestartPolicy};
