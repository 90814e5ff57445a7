//! Retry hysteresis for status transitions.
//!
//! A transient failure must not flap a monitor to `down`: only after the
//! configured number of consecutive down-classified checks does the official
//! status flip and a transition event fire. Recovery and degradation report
//! immediately.

use super::types::MonitorStatus;

/// An official, externally visible status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Confirmed down after exhausting retries
    Down,
    /// First up-classified check after an official down
    Recovered,
    /// Service responding but slower than its threshold
    Degraded,
}

/// Per-monitor in-memory state, owned by the monitor's scheduler task.
///
/// Reset (via a fresh instance) whenever a monitor is added, enabled or
/// reconfigured.
#[derive(Debug)]
pub struct MonitorState {
    official: MonitorStatus,
    consecutive_failures: u32,
}

impl MonitorState {
    pub fn new() -> Self {
        Self { official: MonitorStatus::Pending, consecutive_failures: 0 }
    }

    /// Officially reported status, as the outside world sees it
    pub fn official(&self) -> MonitorStatus {
        self.official
    }

    /// Fold one classified check into the state machine.
    ///
    /// Returns the official transition to report, if any. `retries` is the
    /// number of consecutive down-classified checks required before the
    /// official status flips to down.
    pub fn apply(&mut self, classified: MonitorStatus, retries: u32) -> Option<StatusTransition> {
        match classified {
            MonitorStatus::Down => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= retries.max(1)
                    && self.official != MonitorStatus::Down
                {
                    self.official = MonitorStatus::Down;
                    return Some(StatusTransition::Down);
                }
                None
            }
            MonitorStatus::Degraded => {
                // Non-fatal, informational: no hysteresis, but only the
                // change itself is an event.
                self.consecutive_failures = 0;
                if self.official != MonitorStatus::Degraded {
                    self.official = MonitorStatus::Degraded;
                    return Some(StatusTransition::Degraded);
                }
                None
            }
            MonitorStatus::Up => {
                self.consecutive_failures = 0;
                let was_down = self.official == MonitorStatus::Down;
                self.official = MonitorStatus::Up;
                if was_down {
                    return Some(StatusTransition::Recovered);
                }
                None
            }
            // Pending is never produced by classification
            MonitorStatus::Pending => None,
        }
    }

    /// A maintenance-suppressed cycle: no probing, no transition evaluation.
    /// The next live check starts hysteresis fresh.
    pub fn note_maintenance(&mut self) {
        self.consecutive_failures = 0;
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_transition_waits_for_retry_threshold() {
        let mut state = MonitorState::new();
        assert_eq!(state.apply(MonitorStatus::Up, 3), None);
        assert_eq!(state.official(), MonitorStatus::Up);

        assert_eq!(state.apply(MonitorStatus::Down, 3), None);
        assert_eq!(state.apply(MonitorStatus::Down, 3), None);
        assert_eq!(state.official(), MonitorStatus::Up);

        assert_eq!(state.apply(MonitorStatus::Down, 3), Some(StatusTransition::Down));
        assert_eq!(state.official(), MonitorStatus::Down);

        // Staying down emits nothing further
        assert_eq!(state.apply(MonitorStatus::Down, 3), None);
    }

    #[test]
    fn up_resets_failure_streak() {
        let mut state = MonitorState::new();
        state.apply(MonitorStatus::Up, 3);
        state.apply(MonitorStatus::Down, 3);
        state.apply(MonitorStatus::Down, 3);
        assert_eq!(state.apply(MonitorStatus::Up, 3), None);

        // Streak restarted: two more downs are still absorbed
        assert_eq!(state.apply(MonitorStatus::Down, 3), None);
        assert_eq!(state.apply(MonitorStatus::Down, 3), None);
        assert_eq!(state.official(), MonitorStatus::Up);
    }

    #[test]
    fn recovery_is_immediate() {
        let mut state = MonitorState::new();
        for _ in 0..3 {
            state.apply(MonitorStatus::Down, 3);
        }
        assert_eq!(state.official(), MonitorStatus::Down);

        assert_eq!(state.apply(MonitorStatus::Up, 3), Some(StatusTransition::Recovered));
        assert_eq!(state.official(), MonitorStatus::Up);
    }

    #[test]
    fn degraded_reports_immediately_and_once() {
        let mut state = MonitorState::new();
        state.apply(MonitorStatus::Up, 3);

        assert_eq!(state.apply(MonitorStatus::Degraded, 3), Some(StatusTransition::Degraded));
        assert_eq!(state.apply(MonitorStatus::Degraded, 3), None);
        assert_eq!(state.official(), MonitorStatus::Degraded);
    }

    #[test]
    fn pending_monitor_reports_first_confirmed_down() {
        let mut state = MonitorState::new();
        assert_eq!(state.apply(MonitorStatus::Down, 2), None);
        assert_eq!(state.apply(MonitorStatus::Down, 2), Some(StatusTransition::Down));
    }

    #[test]
    fn first_degraded_from_pending_reports_immediately() {
        let mut state = MonitorState::new();
        assert_eq!(state.apply(MonitorStatus::Degraded, 3), Some(StatusTransition::Degraded));
        assert_eq!(state.official(), MonitorStatus::Degraded);
    }

    #[test]
    fn first_up_from_pending_is_not_a_recovery() {
        let mut state = MonitorState::new();
        assert_eq!(state.apply(MonitorStatus::Up, 3), None);
        assert_eq!(state.official(), MonitorStatus::Up);
    }

    #[test]
    fn maintenance_clears_failure_streak() {
        let mut state = MonitorState::new();
        state.apply(MonitorStatus::Up, 3);
        state.apply(MonitorStatus::Down, 3);
        state.apply(MonitorStatus::Down, 3);

        state.note_maintenance();

        assert_eq!(state.apply(MonitorStatus::Down, 3), None);
        assert_eq!(state.apply(MonitorStatus::Down, 3), None);
        assert_eq!(state.apply(MonitorStatus::Down, 3), Some(StatusTransition::Down));
    }

    #[test]
    fn zero_retries_is_treated_as_one() {
        let mut state = MonitorState::new();
        state.apply(MonitorStatus::Up, 0);
        assert_eq!(state.apply(MonitorStatus::Down, 0), Some(StatusTransition::Down));
    }
}
