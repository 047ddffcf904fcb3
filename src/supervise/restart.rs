use crate::config::SupervisorConfig;
use std::time::{Duration, SystemTime};

/// Restart eligibility policy
///
/// Pure decision function over the restart count and history; it never
/// mutates anything.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Lifetime cap on restart attempts
    pub max_restarts: u32,
    /// Trailing window over which attempts are counted
    pub window: Duration,
}

impl RestartPolicy {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            max_restarts: config.max_restarts,
            window: config.restart_window(),
        }
    }

    /// Check whether another restart attempt is allowed at `now`.
    ///
    /// Allowed iff BOTH hold: the lifetime count is under `max_restarts`,
    /// and the number of attempts inside the trailing window is under
    /// `max_restarts`. The two bounds overlap when the window is wide, but
    /// they diverge when configured independently, so both are always
    /// evaluated.
    pub fn can_restart(
        &self,
        restart_count: u32,
        history: &RestartHistory,
        now: SystemTime,
    ) -> bool {
        let under_lifetime_cap = restart_count < self.max_restarts;
        let recent = history.recent_count(self.window, now);
        let under_window_cap = recent < self.max_restarts as usize;

        under_lifetime_cap && under_window_cap
    }
}

/// Append-only log of attempted-restart instants.
///
/// Never pruned; the policy reads it as a sliding window.
#[derive(Debug, Clone, Default)]
pub struct RestartHistory {
    attempts: Vec<SystemTime>,
}

impl RestartHistory {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    /// Record a restart attempt at `at`
    pub fn record(&mut self, at: SystemTime) {
        self.attempts.push(at);
    }

    /// Total number of attempts ever recorded
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Count attempts within `window` of `now`
    pub fn recent_count(&self, window: Duration, now: SystemTime) -> usize {
        self.attempts
            .iter()
            .filter(|&&at| {
                now.duration_since(at)
                    .map(|elapsed| elapsed < window)
                    .unwrap_or(false)
            })
            .count()
    }

    /// All recorded attempt instants, oldest first
    pub fn timestamps(&self) -> &[SystemTime] {
        &self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_restarts: u32, window_secs: u64) -> RestartPolicy {
        RestartPolicy {
            max_restarts,
            window: Duration::from_secs(window_secs),
        }
    }

    #[test]
    fn test_can_restart_under_both_bounds() {
        let policy = policy(3, 60);
        let mut history = RestartHistory::new();
        let now = SystemTime::now();

        assert!(policy.can_restart(0, &history, now));

        history.record(now - Duration::from_secs(10));
        assert!(policy.can_restart(1, &history, now));
    }

    #[test]
    fn test_lifetime_cap_blocks_regardless_of_history() {
        let policy = policy(3, 60);
        let now = SystemTime::now();

        // Empty history: the window check passes, the lifetime cap does not
        assert!(!policy.can_restart(3, &RestartHistory::new(), now));
        assert!(!policy.can_restart(7, &RestartHistory::new(), now));
    }

    #[test]
    fn test_window_cap_blocks_even_under_lifetime_cap() {
        let policy = policy(3, 60);
        let mut history = RestartHistory::new();
        let now = SystemTime::now();

        history.record(now - Duration::from_secs(5));
        history.record(now - Duration::from_secs(4));
        history.record(now - Duration::from_secs(3));

        // The caller's counter is below the cap, but three attempts landed
        // inside the window
        assert!(!policy.can_restart(1, &history, now));
    }

    #[test]
    fn test_old_attempts_age_out_of_window() {
        let policy = policy(3, 60);
        let mut history = RestartHistory::new();
        let now = SystemTime::now();

        history.record(now - Duration::from_secs(600));
        history.record(now - Duration::from_secs(500));
        history.record(now - Duration::from_secs(400));

        // All attempts fell out of the window; only the lifetime cap applies
        assert_eq!(history.recent_count(policy.window, now), 0);
        assert!(policy.can_restart(2, &history, now));
        assert!(!policy.can_restart(3, &history, now));
    }

    #[test]
    fn test_history_is_append_only() {
        let mut history = RestartHistory::new();
        let now = SystemTime::now();

        assert!(history.is_empty());

        history.record(now - Duration::from_secs(3600));
        history.record(now);
        assert_eq!(history.len(), 2);
        assert_eq!(history.timestamps().len(), 2);

        // Entries outside the window still count toward the total
        assert_eq!(history.recent_count(Duration::from_secs(60), now), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_future_timestamps_do_not_count() {
        let mut history = RestartHistory::new();
        let now = SystemTime::now();

        history.record(now + Duration::from_secs(100));
        assert_eq!(history.recent_count(Duration::from_secs(60), now), 0);
    }

    #[test]
    fn test_from_config() {
        let config = SupervisorConfig {
            session_id: "s".to_string(),
            command: "c".to_string(),
            max_restarts: 7,
            restart_window_secs: 120,
            ..SupervisorConfig::default()
        };

        let policy = RestartPolicy::from_config(&config);
        assert_eq!(policy.max_restarts, 7);
        assert_eq!(policy.window, Duration::from_secs(120));
    }
}
