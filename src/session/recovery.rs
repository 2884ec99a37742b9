use std::time::Duration;

pub const CONNECTION_LOST_NOTICE: &str = "⚠️ Connection lost… reconnecting.";
pub const RECONNECTED_NOTICE: &str = "✅ Reconnected.";
pub const GAVE_UP_NOTICE: &str = "❌ Could not reconnect. Please connect again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    Idle,
    /// Running attempt `attempt` (0-based) of the schedule
    Recovering { attempt: usize },
}

/// Outcome of a failed reconnection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Try again after this delay
    Retry(Duration),
    /// Schedule exhausted; the controller is idle again
    Exhausted,
}

/// Backoff schedule bookkeeping for reconnection.
///
/// Only tracks where recovery stands; teardown, sleeping and renegotiation
/// are driven by the session actor.
#[derive(Debug)]
pub struct RecoveryController {
    schedule: Vec<Duration>,
    phase: RecoveryPhase,
}

impl RecoveryController {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self {
            schedule,
            phase: RecoveryPhase::Idle,
        }
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self.phase, RecoveryPhase::Recovering { .. })
    }

    pub fn schedule_len(&self) -> usize {
        self.schedule.len()
    }

    /// Start a recovery episode and return the first delay.
    ///
    /// `None` while an episode is already in flight, or when the schedule is
    /// empty and there is nothing to try.
    pub fn try_begin(&mut self) -> Option<Duration> {
        if self.is_recovering() {
            return None;
        }
        let delay = *self.schedule.first()?;
        self.phase = RecoveryPhase::Recovering { attempt: 0 };
        Some(delay)
    }

    /// Current attempt index, 0-based
    pub fn attempt(&self) -> Option<usize> {
        match self.phase {
            RecoveryPhase::Recovering { attempt } => Some(attempt),
            RecoveryPhase::Idle => None,
        }
    }

    pub fn attempt_failed(&mut self) -> RecoveryStep {
        let next = match self.phase {
            RecoveryPhase::Recovering { attempt } => attempt + 1,
            RecoveryPhase::Idle => return RecoveryStep::Exhausted,
        };

        match self.schedule.get(next) {
            Some(delay) => {
                self.phase = RecoveryPhase::Recovering { attempt: next };
                RecoveryStep::Retry(*delay)
            }
            None => {
                self.phase = RecoveryPhase::Idle;
                RecoveryStep::Exhausted
            }
        }
    }

    pub fn succeeded(&mut self) {
        self.phase = RecoveryPhase::Idle;
    }

    /// Abandon any episode in flight
    pub fn cancel(&mut self) {
        self.phase = RecoveryPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn test_second_trigger_is_ignored() {
        let mut recovery = RecoveryController::new(ms(&[250, 500]));
        assert_eq!(recovery.try_begin(), Some(Duration::from_millis(250)));
        assert_eq!(recovery.try_begin(), None);
        assert!(recovery.is_recovering());
    }

    #[test]
    fn test_walks_schedule_then_exhausts() {
        let mut recovery = RecoveryController::new(ms(&[250, 500, 1000, 2000, 4000]));
        recovery.try_begin();

        let mut delays = Vec::new();
        loop {
            match recovery.attempt_failed() {
                RecoveryStep::Retry(d) => delays.push(d.as_millis()),
                RecoveryStep::Exhausted => break,
            }
        }

        assert_eq!(delays, vec![500, 1000, 2000, 4000]);
        assert_eq!(recovery.phase(), RecoveryPhase::Idle);
        assert!(recovery.try_begin().is_some());
    }

    #[test]
    fn test_success_returns_to_idle() {
        let mut recovery = RecoveryController::new(ms(&[10, 20]));
        recovery.try_begin();
        recovery.attempt_failed();
        assert_eq!(recovery.attempt(), Some(1));

        recovery.succeeded();
        assert_eq!(recovery.attempt(), None);
        assert!(!recovery.is_recovering());
    }

    #[test]
    fn test_empty_schedule_never_recovers() {
        let mut recovery = RecoveryController::new(Vec::new());
        assert_eq!(recovery.try_begin(), None);
        assert!(!recovery.is_recovering());
    }
}
