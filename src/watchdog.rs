// Command staleness watchdog
// Without it, a crashed command source would leave the base driving at its last speed.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    timeout: Duration,
    last_command: Option<Instant>,
}

impl Watchdog {
    /// Starts stale until the first command is fed
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_command: None,
        }
    }

    /// Record an accepted command
    pub fn feed(&mut self, now: Instant) {
        self.last_command = Some(now);
    }

    /// True when more than `timeout` has passed since the last command
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.last_command {
            Some(at) => now.saturating_duration_since(at) > self.timeout,
            None => true,
        }
    }

    /// Age of the last command, `None` before the first one
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_command.map(|at| now.saturating_duration_since(at))
    }
}
