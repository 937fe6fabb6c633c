//! Mock PWM channel.

use crate::error::{HardwareError, Result};
use crate::traits::PwmChannel;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct PwmState {
    period: Option<Duration>,
    duty_history: Vec<Duration>,
    enabled: bool,
    failing: bool,
}

/// PWM channel that records period, duty cycles and enable state.
#[derive(Debug)]
pub struct MockPwm {
    state: Arc<Mutex<PwmState>>,
}

/// Test-side view of a [`MockPwm`].
#[derive(Debug, Clone)]
pub struct MockPwmHandle {
    state: Arc<Mutex<PwmState>>,
}

fn lock(state: &Mutex<PwmState>) -> MutexGuard<'_, PwmState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockPwm {
    pub fn new() -> (Self, MockPwmHandle) {
        let state = Arc::new(Mutex::new(PwmState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockPwmHandle { state },
        )
    }
}

impl MockPwmHandle {
    pub fn period(&self) -> Option<Duration> {
        lock(&self.state).period
    }

    pub fn duty_cycle(&self) -> Option<Duration> {
        lock(&self.state).duty_history.last().copied()
    }

    pub fn duty_history(&self) -> Vec<Duration> {
        lock(&self.state).duty_history.clone()
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }
}

impl PwmChannel for MockPwm {
    fn set_period(&mut self, period: Duration) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(HardwareError::communication("mock pwm failed"));
        }
        state.period = Some(period);
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty: Duration) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(HardwareError::communication("mock pwm failed"));
        }
        if state.period.is_some_and(|period| duty > period) {
            return Err(HardwareError::out_of_range(format!(
                "duty {duty:?} exceeds period"
            )));
        }
        state.duty_history.push(duty);
        Ok(())
    }

    fn enable(&mut self, enabled: bool) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(HardwareError::communication("mock pwm failed"));
        }
        state.enabled = enabled;
        Ok(())
    }
}
