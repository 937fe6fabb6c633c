//! Access-control flows, one per worker.

mod environment;
mod inventory;
mod motion;
mod room;
mod vault;

pub use environment::EnvironmentFlow;
pub use inventory::InventoryFlow;
pub use motion::MotionFlow;
pub use room::{Direction, RoomFlow};
pub use vault::VaultFlow;

use crate::monitor::{EventMonitor, WaitOutcome};
use crate::worker::StopToken;
use std::time::Duration;
use tracing::warn;
use warden_core::config::{AccessConfig, TimingConfig};
use warden_core::{ActuatorId, LogRecord};
use warden_ipc::{ActuatorCmd, AuthResponse, Channel, ChannelSet, Command, DatabaseMsg};

/// Channels and timing shared by every flow.
#[derive(Debug, Clone)]
pub struct FlowLinks {
    pub db: Channel<DatabaseMsg>,
    pub actuator: Channel<ActuatorCmd>,
    /// Bound on every monitor wait.
    pub wait: Duration,
    /// Bound on every response receive.
    pub poll: Duration,
}

impl FlowLinks {
    pub fn new(channels: &ChannelSet, timing: &TimingConfig) -> Self {
        Self {
            db: channels.db.clone(),
            actuator: channels.actuator.clone(),
            wait: timing.monitor_wait(),
            poll: timing.response_poll(),
        }
    }

    /// Queue a storage request. A full channel drops it with a warning.
    pub(crate) fn request(&self, msg: &DatabaseMsg) -> bool {
        match self.db.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!(command = ?msg.command, error = %e, "storage request dropped");
                false
            }
        }
    }

    pub(crate) fn log(&self, record: LogRecord) {
        self.request(&DatabaseMsg::log(record));
    }

    pub(crate) fn actuate(&self, actuator: ActuatorId, value: u8) {
        if let Err(e) = self.actuator.try_send(&ActuatorCmd::new(actuator, value)) {
            warn!(actuator = %actuator, value, error = %e, "actuator command dropped");
        }
    }

    /// Drop replies still queued on `channel`. Routing has no correlation
    /// ids, so anything there before a request belongs to an earlier one.
    pub(crate) fn discard_stale(&self, channel: &Channel<AuthResponse>) {
        let mut dropped = 0usize;
        loop {
            match channel.try_recv() {
                Ok(Some(_)) => dropped += 1,
                Ok(None) => break,
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "response drain failed");
                    break;
                }
            }
        }
        if dropped > 0 {
            warn!(channel = channel.name(), dropped, "discarded stale responses");
        }
    }

    /// Poll `channel` until a reply arrives. `None` on stop, on a `Stop`
    /// sentinel or on a receive failure.
    pub(crate) fn await_response(
        &self,
        channel: &Channel<AuthResponse>,
        token: &StopToken,
    ) -> Option<AuthResponse> {
        while !token.is_stopped() {
            match channel.recv_timeout(self.poll) {
                Ok(Some(response)) if response.command == Command::Stop => return None,
                Ok(Some(response)) => return Some(response),
                Ok(None) => {}
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "response receive failed");
                    return None;
                }
            }
        }
        None
    }

    /// Wait for the door's reed switch, or for stop.
    pub(crate) fn wait_close(&self, door: &EventMonitor, token: &StopToken) {
        while !token.is_stopped() {
            if door.wait(self.wait) == WaitOutcome::Signaled {
                return;
            }
        }
    }
}

/// Servo positions for open and closed doors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoAngles {
    pub open: u8,
    pub closed: u8,
}

impl From<&AccessConfig> for ServoAngles {
    fn from(access: &AccessConfig) -> Self {
        Self {
            open: access.servo_open_angle,
            closed: access.servo_closed_angle,
        }
    }
}
