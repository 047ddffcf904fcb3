use std::time::{Duration, Instant, SystemTime};

/// Maximum number of trailing characters kept from the latest output event
pub const MAX_SNIPPET_CHARS: usize = 100;

/// Records the most recent sign of life observed on the child's output
/// channels.
///
/// Pure state: mutated only by the supervisor dispatcher, reset on every
/// spawn. Both stdout and stderr feed it: a command that only writes to
/// stderr is still alive.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    /// Monotonic instant of the most recent output event (or spawn)
    last_output: Instant,
    /// Wall-clock counterpart, for the status snapshot
    last_output_at: SystemTime,
    /// Trailing snippet of the most recent output event
    last_snippet: String,
    /// Whether the output streams are considered live
    pub stream_active: bool,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last_output: Instant::now(),
            last_output_at: SystemTime::now(),
            last_snippet: String::new(),
            stream_active: false,
        }
    }

    /// Reset for a new child generation: last-seen becomes "now", the
    /// snippet is cleared and the stream is considered active.
    pub fn reset(&mut self) {
        self.last_output = Instant::now();
        self.last_output_at = SystemTime::now();
        self.last_snippet.clear();
        self.stream_active = true;
    }

    /// Record an output event from either channel
    pub fn record(&mut self, bytes: &[u8]) {
        self.last_output = Instant::now();
        self.last_output_at = SystemTime::now();
        self.last_snippet = trailing_snippet(bytes);
        self.stream_active = true;
    }

    /// How long the child has been silent
    pub fn silence(&self) -> Duration {
        self.last_output.elapsed()
    }

    /// Wall-clock time of the most recent output event
    pub fn last_output_at(&self) -> SystemTime {
        self.last_output_at
    }

    /// Trailing snippet of the most recent output event
    pub fn last_snippet(&self) -> &str {
        &self.last_snippet
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the trailing portion of an output chunk, at most
/// [`MAX_SNIPPET_CHARS`] characters, on character boundaries.
fn trailing_snippet(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let char_count = text.chars().count();
    if char_count <= MAX_SNIPPET_CHARS {
        text.into_owned()
    } else {
        text.chars().skip(char_count - MAX_SNIPPET_CHARS).collect()
    }
}
