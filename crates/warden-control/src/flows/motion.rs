use super::FlowLinks;
use crate::flow::{FlowMachine, FlowState};
use crate::monitor::{EventMonitor, WaitOutcome};
use crate::worker::StopToken;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::{ActuatorId, LogRecord, LogType};
use warden_hardware::BoxedInputPin;
use warden_ipc::{AuthResponse, Channel, Command, DatabaseMsg, DbPayload};

/// Raises the alarm when the PIR sees motion while nobody is checked in.
pub struct MotionFlow {
    trigger: Arc<EventMonitor>,
    pir: Option<BoxedInputPin>,
    responses: Channel<AuthResponse>,
    links: FlowLinks,
    machine: FlowMachine,
}

impl MotionFlow {
    /// `pir` is re-read on every wake when present.
    pub fn new(
        trigger: Arc<EventMonitor>,
        pir: Option<BoxedInputPin>,
        responses: Channel<AuthResponse>,
        links: FlowLinks,
    ) -> Self {
        Self {
            trigger,
            pir,
            responses,
            links,
            machine: FlowMachine::new("motion"),
        }
    }

    pub fn run(mut self, token: StopToken) {
        info!(flow = "motion", "flow running");
        while !token.is_stopped() {
            if self.trigger.wait(self.links.wait) == WaitOutcome::Signaled && !token.is_stopped() {
                self.on_motion(&token);
            }
        }
        info!(flow = "motion", "flow stopped");
    }

    fn motion_present(&mut self) -> bool {
        let Some(pir) = self.pir.as_mut() else {
            return true;
        };
        match pir.read() {
            Ok(level) => level,
            // An unreadable pin is treated as motion.
            Err(e) => {
                warn!(error = %e, "PIR re-check failed");
                true
            }
        }
    }

    fn on_motion(&mut self, token: &StopToken) {
        self.machine.advance(FlowState::ReadSensor);
        if !self.motion_present() {
            debug!("motion interrupt without PIR level, ignored");
            self.machine.advance(FlowState::WaitTrigger);
            return;
        }

        self.machine.advance(FlowState::SendRequest);
        self.links.discard_stale(&self.responses);
        if !self.links.request(&DatabaseMsg::new(Command::QueryUserPresent, DbPayload::Empty)) {
            self.machine.reset();
            return;
        }

        self.machine.advance(FlowState::WaitResponse);
        let Some(response) = self.links.await_response(&self.responses, token) else {
            self.machine.reset();
            return;
        };
        let occupied = response.as_authorization().is_some_and(|auth| auth.authorized);
        if occupied {
            debug!("motion with users inside");
            self.machine.reset();
            return;
        }

        self.machine.advance(FlowState::Deny);
        warn!("motion detected in empty room, raising alarm");
        self.links.actuate(ActuatorId::Alarm, 1);
        self.links.log(
            LogRecord::new(LogType::Alert, 0)
                .with_values(1.0, 0.0)
                .with_description("motion detected with nobody inside"),
        );
        self.machine.advance(FlowState::WaitTrigger);
    }
}
