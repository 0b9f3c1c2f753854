//! Hysteresis state machine deciding which link owns the default route.

use log::debug;
use std::fmt;

use crate::monitor::ProbeEvent;

/// Consecutive Bad events on the preferred link that trigger failover.
pub const DEFAULT_BAD_MAX: u32 = 2;

/// Consecutive Good events while on backup that trigger failback.
pub const DEFAULT_GOOD_MIN: u32 = 3;

/// Which link currently carries the active default route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    Preferred,
    Backup,
}

impl fmt::Display for FailoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailoverState::Preferred => write!(f, "preferred"),
            FailoverState::Backup => write!(f, "backup"),
        }
    }
}

/// A state change the machine wants carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move traffic from the preferred link to the backup link
    Demote,
    /// Move traffic back to the preferred link
    Promote,
}

impl Transition {
    /// State the machine is in once this transition is committed.
    pub fn target(&self) -> FailoverState {
        match self {
            Transition::Demote => FailoverState::Backup,
            Transition::Promote => FailoverState::Preferred,
        }
    }
}

/// Tracks probe history and decides when to switch links.
///
/// Deciding and committing are separate: [`observe`](Self::observe) only
/// updates counters and reports a transition once a threshold is reached;
/// the state and counters move only when the caller reports success through
/// [`commit`](Self::commit). A failed switch therefore leaves the counters
/// primed, and the next event in the same direction retries.
#[derive(Debug, Clone)]
pub struct FailoverMachine {
    state: FailoverState,
    bad_count: u32,
    good_count: u32,
    bad_max: u32,
    good_min: u32,
}

impl Default for FailoverMachine {
    fn default() -> Self {
        Self::new(DEFAULT_BAD_MAX, DEFAULT_GOOD_MIN)
    }
}

impl FailoverMachine {
    /// Start in [`FailoverState::Preferred`] with zeroed counters.
    pub fn new(bad_max: u32, good_min: u32) -> Self {
        FailoverMachine {
            state: FailoverState::Preferred,
            bad_count: 0,
            good_count: 0,
            bad_max: bad_max.max(1),
            good_min: good_min.max(1),
        }
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }

    pub fn bad_count(&self) -> u32 {
        self.bad_count
    }

    pub fn good_count(&self) -> u32 {
        self.good_count
    }

    /// Record one probe event, returning the transition to perform if a
    /// threshold has been reached.
    pub fn observe(&mut self, event: ProbeEvent) -> Option<Transition> {
        match (self.state, event) {
            (FailoverState::Preferred, ProbeEvent::Bad) => {
                self.bad_count = self.bad_count.saturating_add(1);
                debug!("Preferred link bad ({}/{})", self.bad_count, self.bad_max);
                (self.bad_count >= self.bad_max).then_some(Transition::Demote)
            }
            (FailoverState::Preferred, ProbeEvent::Good) => {
                self.bad_count = 0;
                None
            }
            (FailoverState::Backup, ProbeEvent::Good) => {
                self.good_count = self.good_count.saturating_add(1);
                debug!("Preferred link good ({}/{})", self.good_count, self.good_min);
                (self.good_count >= self.good_min).then_some(Transition::Promote)
            }
            (FailoverState::Backup, ProbeEvent::Bad) => {
                self.good_count = 0;
                None
            }
        }
    }

    /// Apply a transition whose route switch succeeded.
    pub fn commit(&mut self, transition: Transition) {
        self.state = transition.target();
        self.bad_count = 0;
        self.good_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ProbeEvent::{Bad, Good};

    #[test]
    fn bad_max_below_one_is_clamped() {
        let mut machine = FailoverMachine::new(0, 0);
        assert_eq!(machine.observe(Bad), Some(Transition::Demote));
    }

    #[test]
    fn commit_zeroes_counters() {
        let mut machine = FailoverMachine::default();
        machine.observe(Bad);
        machine.commit(Transition::Demote);
        assert_eq!(machine.state(), FailoverState::Backup);
        assert_eq!((machine.bad_count(), machine.good_count()), (0, 0));

        machine.observe(Good);
        machine.commit(Transition::Promote);
        assert_eq!(machine.state(), FailoverState::Preferred);
        assert_eq!((machine.bad_count(), machine.good_count()), (0, 0));
    }
}
