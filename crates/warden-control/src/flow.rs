//! Validated state tracking for access flows.
//!
//! Every flow walks the same template:
//!
//! ```text
//!              ┌──────────────┐
//!   ┌─────────►│ WaitTrigger  │◄───────────────────────────┐
//!   │          └──────┬───────┘                            │
//!   │                 │ wake                               │
//!   │          ┌──────▼───────┐   local verdict            │
//!   │          │  ReadSensor  ├──────────────┐             │
//!   │          └──────┬───────┘              │             │
//!   │          ┌──────▼───────┐              │             │
//!   │          │ SendRequest  ├──────────────┼─────────────┤ no reply needed
//!   │          └──────┬───────┘              │             │
//!   │          ┌──────▼───────┐        ┌─────▼─────┐       │
//!   │          │ WaitResponse ├───────►│  Grant    │       │
//!   │          └──────┬───────┘        └─────┬─────┘       │
//!   │          ┌──────▼───────┐        ┌─────▼─────┐       │
//!   └──────────┤    Deny      │        │ WaitClose ├───────┘
//!              └──────────────┘        └───────────┘
//! ```
//!
//! The vault adds `Enroll`, entered from `WaitTrigger` when an enrollment
//! is pending. Any state may return to `WaitTrigger` through
//! [`FlowMachine::reset`] after a transient failure.
//!
//! # Example
//!
//! ```
//! use warden_control::flow::{FlowMachine, FlowState};
//!
//! let mut machine = FlowMachine::new("room_entry");
//! machine.transition_to(FlowState::ReadSensor).unwrap();
//! assert!(machine.transition_to(FlowState::Grant).is_ok());
//! assert!(machine.transition_to(FlowState::Deny).is_err());
//! ```

use crate::error::{ControlError, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Transitions kept for diagnostics.
const MAX_HISTORY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Waiting on the trigger monitor or timer.
    WaitTrigger,
    /// Reading the flow's sensor.
    ReadSensor,
    /// Handing a request or record to the storage service.
    SendRequest,
    /// Timed receive loop on the flow's response channel.
    WaitResponse,
    /// Access granted; the servo is being opened.
    Grant,
    /// Access refused or an alarm condition was found.
    Deny,
    /// Door open, waiting for its reed switch.
    WaitClose,
    /// Three-step fingerprint enrollment.
    Enroll,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitTrigger => "WaitTrigger",
            Self::ReadSensor => "ReadSensor",
            Self::SendRequest => "SendRequest",
            Self::WaitResponse => "WaitResponse",
            Self::Grant => "Grant",
            Self::Deny => "Deny",
            Self::WaitClose => "WaitClose",
            Self::Enroll => "Enroll",
        };
        f.write_str(name)
    }
}

impl FlowState {
    pub fn can_transition_to(&self, target: &FlowState) -> bool {
        use FlowState::*;
        matches!(
            (self, target),
            (WaitTrigger, ReadSensor | Enroll)
                | (ReadSensor, SendRequest | Grant | Deny | WaitTrigger)
                | (SendRequest, WaitResponse | WaitTrigger)
                | (WaitResponse, Grant | Deny | WaitTrigger)
                | (Grant, WaitClose)
                | (WaitClose, WaitTrigger)
                | (Deny, WaitTrigger)
                | (Enroll, WaitTrigger)
        )
    }
}

/// One recorded transition.
#[derive(Debug, Clone, Serialize)]
pub struct FlowTransition {
    pub from: FlowState,
    pub to: FlowState,
    #[serde(skip)]
    pub at: Instant,
}

/// Current state of one flow plus a bounded transition history.
#[derive(Debug)]
pub struct FlowMachine {
    flow: &'static str,
    state: FlowState,
    entered_at: Instant,
    history: VecDeque<FlowTransition>,
}

impl FlowMachine {
    pub fn new(flow: &'static str) -> Self {
        Self {
            flow,
            state: FlowState::WaitTrigger,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Oldest first.
    pub fn history(&self) -> &VecDeque<FlowTransition> {
        &self.history
    }

    /// Move to `next` if the template allows it.
    ///
    /// # Errors
    /// Returns `ControlError::InvalidStateTransition` otherwise; the state
    /// is left unchanged.
    pub fn transition_to(&mut self, next: FlowState) -> Result<FlowTransition> {
        if !self.state.can_transition_to(&next) {
            return Err(ControlError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        Ok(self.record(next))
    }

    /// Like [`transition_to`](Self::transition_to), but an out-of-sequence
    /// move is logged and applied anyway.
    pub fn advance(&mut self, next: FlowState) {
        if let Err(e) = self.transition_to(next) {
            warn!(flow = self.flow, error = %e, "flow transition out of sequence");
            self.record(next);
        }
    }

    /// Return to `WaitTrigger` from anywhere.
    pub fn reset(&mut self) -> FlowTransition {
        self.record(FlowState::WaitTrigger)
    }

    fn record(&mut self, next: FlowState) -> FlowTransition {
        let transition = FlowTransition {
            from: self.state,
            to: next,
            at: Instant::now(),
        };
        trace!(flow = self.flow, from = %transition.from, to = %transition.to, "flow transition");
        self.state = next;
        self.entered_at = transition.at;
        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use FlowState::*;

    #[rstest]
    #[case(&[ReadSensor, SendRequest, WaitResponse, Grant, WaitClose, WaitTrigger])]
    #[case(&[ReadSensor, SendRequest, WaitResponse, Deny, WaitTrigger])]
    #[case(&[ReadSensor, Grant, WaitClose, WaitTrigger])]
    #[case(&[ReadSensor, SendRequest, WaitTrigger])]
    #[case(&[Enroll, WaitTrigger])]
    fn test_valid_paths(#[case] path: &[FlowState]) {
        let mut machine = FlowMachine::new("t");
        for state in path {
            machine.transition_to(*state).unwrap();
        }
        assert_eq!(machine.state(), WaitTrigger);
        assert_eq!(machine.history().len(), path.len());
    }

    #[rstest]
    #[case(WaitTrigger, Grant)]
    #[case(Grant, WaitTrigger)]
    #[case(Deny, Grant)]
    #[case(WaitClose, Deny)]
    fn test_invalid_transitions(#[case] from: FlowState, #[case] to: FlowState) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let mut machine = FlowMachine::new("t");
        let err = machine.transition_to(WaitClose).unwrap_err();
        assert!(matches!(err, ControlError::InvalidStateTransition { .. }));
        assert_eq!(machine.state(), WaitTrigger);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut machine = FlowMachine::new("t");
        for _ in 0..MAX_HISTORY_SIZE {
            machine.transition_to(ReadSensor).unwrap();
            machine.transition_to(WaitTrigger).unwrap();
        }
        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(machine.history().back().unwrap().to, WaitTrigger);
    }

    #[test]
    fn test_reset_from_anywhere() {
        let mut machine = FlowMachine::new("t");
        machine.transition_to(ReadSensor).unwrap();
        machine.transition_to(SendRequest).unwrap();
        machine.transition_to(WaitResponse).unwrap();
        let transition = machine.reset();
        assert_eq!(transition.from, WaitResponse);
        assert_eq!(machine.state(), WaitTrigger);
    }
}
