use std::time::Duration;
use tokio::time::Instant;

/// Bounded retry schedule: a maximum attempt count, a fixed delay between
/// attempts, and an optional overall time budget.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
    time_budget: Option<Duration>,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            time_budget: None,
        }
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget.filter(|duration| !duration.is_zero());
        self
    }

    pub fn handle(&self) -> RetryHandle {
        self.handle_from(Instant::now())
    }

    pub fn handle_from(&self, start: Instant) -> RetryHandle {
        let deadline = self
            .time_budget
            .and_then(|budget| start.checked_add(budget));
        RetryHandle {
            policy: self.clone(),
            attempts: 1,
            deadline,
        }
    }
}

/// Tracks one retry sequence. Starts counting at the first attempt.
pub struct RetryHandle {
    policy: RetryPolicy,
    attempts: usize,
    deadline: Option<Instant>,
}

impl RetryHandle {
    /// Delay before the next attempt, or `None` once attempts are exhausted
    /// or the next attempt would start past the deadline.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay;
        if let Some(deadline) = self.deadline {
            match Instant::now().checked_add(delay) {
                Some(next_start) if next_start < deadline => {}
                _ => return None,
            }
        }
        self.attempts += 1;
        Some(delay)
    }

    /// The 1-based number of the attempt in progress.
    pub fn attempt(&self) -> usize {
        self.attempts
    }
}
