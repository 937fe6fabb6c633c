use super::{FlowLinks, ServoAngles};
use crate::flow::{FlowMachine, FlowState};
use crate::monitor::{EventMonitor, WaitOutcome};
use crate::worker::StopToken;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_biometric::{FingerprintReader, MatchResult};
use warden_core::{ActuatorId, LogRecord, LogType, UserId};
use warden_hardware::Sensor;
use warden_ipc::{AuthResponse, Channel, Command};

/// Enrollment requested by the storage service, applied on the next wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEnrollment {
    pub user_id: UserId,
    pub level: u8,
}

/// Fingerprint-controlled vault door.
///
/// Verdicts are local: any template match opens the vault. Enrollment and
/// deletion requests arrive on the command channel, which is drained before
/// every fingerprint wait.
pub struct VaultFlow {
    reader: FingerprintReader,
    trigger: Arc<EventMonitor>,
    door: Arc<EventMonitor>,
    commands: Channel<AuthResponse>,
    links: FlowLinks,
    servo: ServoAngles,
    pending: Option<PendingEnrollment>,
    machine: FlowMachine,
}

impl VaultFlow {
    pub fn new(
        reader: FingerprintReader,
        trigger: Arc<EventMonitor>,
        door: Arc<EventMonitor>,
        commands: Channel<AuthResponse>,
        links: FlowLinks,
        servo: ServoAngles,
    ) -> Self {
        Self {
            reader,
            trigger,
            door,
            commands,
            links,
            servo,
            pending: None,
            machine: FlowMachine::new("vault"),
        }
    }

    pub fn init(&mut self) -> warden_hardware::Result<()> {
        self.reader.init()
    }

    pub fn pending(&self) -> Option<PendingEnrollment> {
        self.pending
    }

    pub fn run(mut self, token: StopToken) {
        info!(flow = "vault", "flow running");
        while !token.is_stopped() {
            if !self.drain_commands() {
                break;
            }
            if self.trigger.wait(self.links.wait) == WaitOutcome::Signaled && !token.is_stopped() {
                self.on_finger(&token);
            }
        }
        info!(flow = "vault", "flow stopped");
    }

    /// Apply every queued command. Returns false on `Stop`.
    fn drain_commands(&mut self) -> bool {
        loop {
            let command = match self.commands.try_recv() {
                Ok(Some(command)) => command,
                Ok(None) => return true,
                Err(e) => {
                    warn!(error = %e, "vault command receive failed");
                    return true;
                }
            };
            match (command.command, command.as_authorization()) {
                (Command::Stop, _) => return false,
                (Command::EnrollUser, Some(auth)) => {
                    info!(user_id = %auth.user_id, level = auth.access_level, "enrollment armed");
                    self.pending = Some(PendingEnrollment {
                        user_id: auth.user_id,
                        level: auth.access_level,
                    });
                }
                (Command::DeleteUser, Some(auth)) => self.delete(auth.user_id),
                (other, _) => debug!(command = ?other, "ignoring vault command"),
            }
        }
    }

    fn delete(&mut self, user_id: UserId) {
        match self.reader.delete_user(user_id.as_u16()) {
            Ok(()) => info!(user_id = %user_id, "fingerprint deleted"),
            Err(e) => warn!(user_id = %user_id, error = %e, "fingerprint delete failed"),
        }
    }

    fn on_finger(&mut self, token: &StopToken) {
        if let Some(pending) = self.pending.take() {
            self.enroll(pending);
        } else {
            self.identify(token);
        }
    }

    fn enroll(&mut self, pending: PendingEnrollment) {
        self.machine.advance(FlowState::Enroll);
        let user = pending.user_id.as_u16();
        let outcome = self.reader.enroll(user, pending.level);
        let description = match &outcome {
            Ok(()) => {
                info!(user_id = user, "fingerprint enrolled");
                format!("fingerprint enrolled for user {user}")
            }
            Err(e) => {
                warn!(user_id = user, error = %e, "fingerprint enrollment failed");
                format!("fingerprint enrollment failed for user {user}")
            }
        };
        self.links.log(
            LogRecord::new(LogType::Enrollment, i32::from(user))
                .with_values(if outcome.is_ok() { 1.0 } else { 0.0 }, f32::from(pending.level))
                .with_description(&description),
        );
        self.machine.advance(FlowState::WaitTrigger);
    }

    fn identify(&mut self, token: &StopToken) {
        self.machine.advance(FlowState::ReadSensor);
        match self.reader.read() {
            Ok(MatchResult::Matched(found)) => {
                self.machine.advance(FlowState::Grant);
                info!(user_id = found.user_id, level = found.level, "vault access granted");
                self.links.actuate(ActuatorId::VaultServo, self.servo.open);
                self.links.log(
                    LogRecord::new(LogType::Access, i32::from(found.user_id))
                        .with_values(f32::from(found.level), 0.0)
                        .with_description(&format!("user {} opened vault", found.user_id)),
                );
                self.machine.advance(FlowState::WaitClose);
                self.links.wait_close(&self.door, token);
                self.links.actuate(ActuatorId::VaultServo, self.servo.closed);
                self.machine.advance(FlowState::WaitTrigger);
            }
            Ok(MatchResult::NoMatch) => {
                self.machine.advance(FlowState::Deny);
                warn!("vault access denied, fingerprint not recognized");
                self.links.log(
                    LogRecord::new(LogType::AccessDenied, 0)
                        .with_description("vault fingerprint not recognized"),
                );
                self.machine.advance(FlowState::WaitTrigger);
            }
            Err(e) => {
                warn!(error = %e, "fingerprint match failed");
                self.machine.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::links;
    use rstest::rstest;
    use std::sync::Mutex;
    use std::time::Duration;
    use warden_biometric::FingerprintTimeouts;
    use warden_hardware::mock::{MockUart, MockUartHandle};
    use warden_ipc::{ChannelSet, DbPayload};
    use warden_protocol::fingerprint::{FingerprintFrame, command};

    fn flow() -> (VaultFlow, ChannelSet, MockUartHandle) {
        let (channels, links) = links();
        let (uart, handle) = MockUart::new();
        let timeouts = FingerprintTimeouts {
            match_timeout: Duration::from_millis(100),
            enroll_step_timeout: Duration::from_millis(100),
            delete_timeout: Duration::from_millis(100),
        };
        let reader = FingerprintReader::new(Box::new(uart), 19_200).with_timeouts(timeouts);
        let flow = VaultFlow::new(
            reader,
            Arc::new(EventMonitor::new("fp")),
            Arc::new(EventMonitor::new("vault_reed")),
            channels.vault_cmd.clone(),
            links,
            ServoAngles { open: 0, closed: 90 },
        );
        (flow, channels, handle)
    }

    fn logs(channels: &ChannelSet) -> Vec<LogRecord> {
        let mut out = Vec::new();
        while let Some(msg) = channels.db.try_recv().unwrap() {
            if let DbPayload::Log(record) = msg.payload {
                out.push(record);
            }
        }
        out
    }

    /// Echo each request's command with a fixed status byte.
    fn ack_all(handle: &MockUartHandle, status: u8) -> Arc<Mutex<Vec<u8>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        handle.set_responder(move |written| {
            let request = FingerprintFrame::decode(written).unwrap();
            record.lock().unwrap().push(request.command);
            FingerprintFrame::new(request.command, [0, 0, status]).encode().to_vec()
        });
        seen
    }

    #[test]
    fn test_enroll_command_consumes_next_wake() {
        let (mut flow, channels, handle) = flow();
        channels.vault_cmd.send(&AuthResponse::enroll(UserId::new(12), 2)).unwrap();
        assert!(flow.drain_commands());
        assert_eq!(
            flow.pending(),
            Some(PendingEnrollment {
                user_id: UserId::new(12),
                level: 2
            })
        );

        let seen = ack_all(&handle, 0x00);
        flow.on_finger(&StopToken::new());
        assert_eq!(flow.pending(), None);
        assert_eq!(*seen.lock().unwrap(), vec![command::ADD_1, command::ADD_2, command::ADD_3]);

        let logs = logs(&channels);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, LogType::Enrollment);
        assert_eq!(logs[0].entity_id, 12);
        assert_eq!(logs[0].value, 1.0);
    }

    #[test]
    fn test_failed_enrollment_logged_once() {
        let (mut flow, channels, handle) = flow();
        channels.vault_cmd.send(&AuthResponse::enroll(UserId::new(3), 1)).unwrap();
        flow.drain_commands();
        // Second capture reports a failure; the third must not be attempted.
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        handle.set_responder(move |written| {
            let request = FingerprintFrame::decode(written).unwrap();
            record.lock().unwrap().push(request.command);
            let status = if request.command == command::ADD_2 { 0x01 } else { 0x00 };
            FingerprintFrame::new(request.command, [0, 0, status]).encode().to_vec()
        });
        flow.on_finger(&StopToken::new());
        assert_eq!(*seen.lock().unwrap(), vec![command::ADD_1, command::ADD_2]);
        let logs = logs(&channels);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].value, 0.0);
        assert_eq!(flow.machine.state(), FlowState::WaitTrigger);
    }

    #[rstest]
    #[case::no_reply(None)]
    #[case::sensor_timeout(Some(0x08))]
    fn test_enrollment_step_timeout_aborts_enrollment(#[case] second_step: Option<u8>) {
        let (mut flow, channels, handle) = flow();
        channels.vault_cmd.send(&AuthResponse::enroll(UserId::new(4), 2)).unwrap();
        flow.drain_commands();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        handle.set_responder(move |written| {
            let request = FingerprintFrame::decode(written).unwrap();
            record.lock().unwrap().push(request.command);
            match (request.command, second_step) {
                (command::ADD_2, None) => Vec::new(),
                (command::ADD_2, Some(status)) => {
                    FingerprintFrame::new(command::ADD_2, [0, 0, status]).encode().to_vec()
                }
                (cmd, _) => FingerprintFrame::new(cmd, [0, 0, 0]).encode().to_vec(),
            }
        });

        flow.on_finger(&StopToken::new());
        assert_eq!(*seen.lock().unwrap(), vec![command::ADD_1, command::ADD_2]);
        assert_eq!(flow.pending(), None);
        let logs = logs(&channels);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, LogType::Enrollment);
        assert_eq!(logs[0].entity_id, 4);
        assert_eq!(logs[0].value, 0.0);
    }

    #[test]
    fn test_delete_applied_immediately() {
        let (mut flow, channels, handle) = flow();
        let seen = ack_all(&handle, 0x00);
        channels.vault_cmd.send(&AuthResponse::delete(UserId::new(5))).unwrap();
        assert!(flow.drain_commands());
        assert_eq!(*seen.lock().unwrap(), vec![command::DELETE_USER]);
        assert_eq!(flow.pending(), None);
    }

    #[test]
    fn test_stop_command_ends_drain() {
        let (mut flow, channels, _handle) = flow();
        channels.vault_cmd.send(&AuthResponse::stop()).unwrap();
        assert!(!flow.drain_commands());
    }

    #[test]
    fn test_no_match_logs_denial() {
        let (mut flow, channels, handle) = flow();
        ack_all(&handle, 0x05);
        flow.on_finger(&StopToken::new());
        let logs = logs(&channels);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, LogType::AccessDenied);
        assert!(channels.actuator.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_communication_failure_only_warns() {
        let (mut flow, channels, _handle) = flow();
        // No responder: the match times out.
        flow.on_finger(&StopToken::new());
        assert!(logs(&channels).is_empty());
        assert_eq!(flow.machine.state(), FlowState::WaitTrigger);
    }

    #[test]
    fn test_match_opens_and_closes_vault() {
        let (mut flow, channels, handle) = flow();
        handle.set_responder(|_| {
            FingerprintFrame::new(command::MATCH_1N, [0, 9, 2]).encode().to_vec()
        });
        let token = StopToken::new();
        // Door never reports closed; stop ends the wait and still closes.
        token.stop();
        flow.on_finger(&token);

        let open = channels.actuator.try_recv().unwrap().unwrap();
        let close = channels.actuator.try_recv().unwrap().unwrap();
        assert_eq!((open.actuator_id, open.value), (ActuatorId::VaultServo.to_u8(), 0));
        assert_eq!((close.actuator_id, close.value), (ActuatorId::VaultServo.to_u8(), 90));
        let logs = logs(&channels);
        assert_eq!(logs[0].log_type, LogType::Access);
        assert_eq!(logs[0].entity_id, 9);
    }
}
