//! Mock GPIO lines.

use crate::error::{HardwareError, Result};
use crate::traits::{InputPin, OutputPin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct OutputState {
    history: Mutex<Vec<bool>>,
    failing: AtomicBool,
}

/// Output pin that records every level written.
#[derive(Debug)]
pub struct MockOutputPin {
    state: Arc<OutputState>,
}

/// Test-side view of a [`MockOutputPin`].
#[derive(Debug, Clone)]
pub struct MockOutputPinHandle {
    state: Arc<OutputState>,
}

impl MockOutputPin {
    pub fn new() -> (Self, MockOutputPinHandle) {
        let state = Arc::new(OutputState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            MockOutputPinHandle { state },
        )
    }
}

impl MockOutputPinHandle {
    /// Last written level, `None` if never written.
    pub fn level(&self) -> Option<bool> {
        self.history().last().copied()
    }

    pub fn history(&self) -> Vec<bool> {
        self.state
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Make writes fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }
}

impl OutputPin for MockOutputPin {
    fn write(&mut self, high: bool) -> Result<()> {
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(HardwareError::communication("mock pin write failed"));
        }
        self.state
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(high);
        Ok(())
    }
}

/// Input pin whose level is set by the test.
#[derive(Debug)]
pub struct MockInputPin {
    level: Arc<AtomicBool>,
}

/// Test-side view of a [`MockInputPin`].
#[derive(Debug, Clone)]
pub struct MockInputPinHandle {
    level: Arc<AtomicBool>,
}

impl MockInputPin {
    pub fn new(initial: bool) -> (Self, MockInputPinHandle) {
        let level = Arc::new(AtomicBool::new(initial));
        (
            Self {
                level: Arc::clone(&level),
            },
            MockInputPinHandle { level },
        )
    }
}

impl MockInputPinHandle {
    pub fn set_level(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }
}

impl InputPin for MockInputPin {
    fn read(&mut self) -> Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_history() {
        let (mut pin, handle) = MockOutputPin::new();
        assert_eq!(handle.level(), None);
        pin.write(true).unwrap();
        pin.write(false).unwrap();
        assert_eq!(handle.history(), vec![true, false]);
        assert_eq!(handle.level(), Some(false));
    }

    #[test]
    fn test_failing_output() {
        let (mut pin, handle) = MockOutputPin::new();
        handle.set_failing(true);
        assert!(pin.write(true).is_err());
        assert!(handle.history().is_empty());
    }

    #[test]
    fn test_input_level() {
        let (mut pin, handle) = MockInputPin::new(false);
        assert!(!pin.read().unwrap());
        handle.set_level(true);
        assert!(pin.read().unwrap());
    }
}
