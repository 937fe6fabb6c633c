use super::{FlowLinks, ServoAngles};
use crate::flow::{FlowMachine, FlowState};
use crate::monitor::{EventMonitor, WaitOutcome};
use crate::worker::StopToken;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::{ActuatorId, LogRecord, LogType, TagId};
use warden_hardware::Sensor;
use warden_ipc::{AuthResponse, Channel, Command, DatabaseMsg, DbPayload};
use warden_rfid::LfReader;

/// Which side of the room door a reader sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    fn command(self) -> Command {
        match self {
            Self::Entry => Command::EnterRoomByRfid,
            Self::Exit => Command::LeaveRoomByRfid,
        }
    }

    fn flow_name(self) -> &'static str {
        match self {
            Self::Entry => "room_entry",
            Self::Exit => "room_exit",
        }
    }
}

/// Badge-controlled room door, one instance per reader.
///
/// Entry denials are counted; reaching `max_failures` in a row raises the
/// alarm once and starts the count over. Any grant resets it.
pub struct RoomFlow {
    direction: Direction,
    reader: LfReader,
    trigger: Arc<EventMonitor>,
    door: Arc<EventMonitor>,
    responses: Channel<AuthResponse>,
    links: FlowLinks,
    servo: ServoAngles,
    max_failures: u32,
    failures: u32,
    machine: FlowMachine,
}

impl RoomFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        direction: Direction,
        reader: LfReader,
        trigger: Arc<EventMonitor>,
        door: Arc<EventMonitor>,
        responses: Channel<AuthResponse>,
        links: FlowLinks,
        servo: ServoAngles,
        max_failures: u32,
    ) -> Self {
        Self {
            direction,
            reader,
            trigger,
            door,
            responses,
            links,
            servo,
            max_failures,
            failures: 0,
            machine: FlowMachine::new(direction.flow_name()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.direction.flow_name()
    }

    /// Configure the reader.
    pub fn init(&mut self) -> warden_hardware::Result<()> {
        self.reader.init()
    }

    pub fn run(mut self, token: StopToken) {
        info!(flow = self.name(), "flow running");
        while !token.is_stopped() {
            if self.trigger.wait(self.links.wait) == WaitOutcome::Signaled && !token.is_stopped() {
                self.handle_badge(&token);
            }
        }
        info!(flow = self.name(), "flow stopped");
    }

    fn handle_badge(&mut self, token: &StopToken) {
        self.machine.advance(FlowState::ReadSensor);
        let tag = match self.reader.read() {
            Ok(tag) => tag,
            Err(e) => {
                warn!(flow = self.name(), error = %e, "badge read failed");
                self.machine.reset();
                return;
            }
        };

        self.machine.advance(FlowState::SendRequest);
        self.links.discard_stale(&self.responses);
        let request = DatabaseMsg::new(self.direction.command(), DbPayload::Rfid(tag.clone()));
        if !self.links.request(&request) {
            self.machine.reset();
            return;
        }

        self.machine.advance(FlowState::WaitResponse);
        let Some(response) = self.links.await_response(&self.responses, token) else {
            self.machine.reset();
            return;
        };
        match response.as_authorization() {
            Some(auth) if auth.authorized => {
                self.grant(&tag, auth.user_id.as_u16(), auth.access_level, token)
            }
            _ => self.deny(&tag),
        }
    }

    fn grant(&mut self, tag: &TagId, user_id: u16, level: u8, token: &StopToken) {
        self.machine.advance(FlowState::Grant);
        self.failures = 0;
        info!(flow = self.name(), tag = %tag, user_id, "access granted");
        self.links.actuate(ActuatorId::RoomServo, self.servo.open);
        let action = match self.direction {
            Direction::Entry => "entered",
            Direction::Exit => "left",
        };
        self.links.log(
            LogRecord::new(LogType::Access, i32::from(user_id))
                .with_values(f32::from(level), 0.0)
                .with_description(&format!("user {user_id} {action} room with {tag}")),
        );

        self.machine.advance(FlowState::WaitClose);
        self.links.wait_close(&self.door, token);
        self.links.actuate(ActuatorId::RoomServo, self.servo.closed);
        debug!(flow = self.name(), "room door closed");
        self.machine.advance(FlowState::WaitTrigger);
    }

    fn deny(&mut self, tag: &TagId) {
        self.machine.advance(FlowState::Deny);
        warn!(flow = self.name(), tag = %tag, "access denied");
        self.links.log(
            LogRecord::new(LogType::AccessDenied, 0)
                .with_description(&format!("room {} denied for {tag}", self.direction_label())),
        );

        if self.direction == Direction::Entry {
            self.failures += 1;
            if self.failures >= self.max_failures {
                warn!(failures = self.failures, "repeated entry denials, raising alarm");
                self.links.actuate(ActuatorId::Alarm, 1);
                self.links.log(
                    LogRecord::new(LogType::Alert, 0)
                        .with_values(self.failures as f32, 0.0)
                        .with_description(&format!("{} failed entry attempts", self.failures)),
                );
                self.failures = 0;
            }
        }
        self.machine.advance(FlowState::WaitTrigger);
    }

    fn direction_label(&self) -> &'static str {
        match self.direction {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }

    /// Consecutive entry denials since the last alarm or grant.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn machine(&self) -> &FlowMachine {
        &self.machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::{answer, links, next_actuator, spawn};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;
    use warden_core::UserId;
    use warden_hardware::mock::{MockUart, MockUartHandle};
    use warden_ipc::ChannelSet;
    use warden_protocol::lf::encode_lf_frame;

    const ANGLES: ServoAngles = ServoAngles { open: 0, closed: 90 };

    struct Rig {
        channels: ChannelSet,
        uart: MockUartHandle,
        trigger: Arc<EventMonitor>,
        door: Arc<EventMonitor>,
    }

    fn flow(direction: Direction) -> (RoomFlow, Rig) {
        let (channels, links) = links();
        let (uart, handle) = MockUart::new();
        let reader = LfReader::new(Box::new(uart), 9600).with_start_wait(Duration::from_millis(50));
        let trigger = Arc::new(EventMonitor::new("rfid"));
        let door = Arc::new(EventMonitor::new("door"));
        let responses = match direction {
            Direction::Entry => channels.entry_auth.clone(),
            Direction::Exit => channels.exit_auth.clone(),
        };
        let mut flow = RoomFlow::new(
            direction,
            reader,
            Arc::clone(&trigger),
            Arc::clone(&door),
            responses,
            links,
            ANGLES,
            3,
        );
        flow.init().unwrap();
        (
            flow,
            Rig {
                channels,
                uart: handle,
                trigger,
                door,
            },
        )
    }

    fn present(rig: &Rig, tag: &str) {
        rig.uart.push_rx(&encode_lf_frame(tag).unwrap());
    }

    fn responses(rig: &Rig, command: Command) -> &Channel<AuthResponse> {
        match command {
            Command::EnterRoomByRfid => &rig.channels.entry_auth,
            _ => &rig.channels.exit_auth,
        }
    }

    fn authorization(command: Command, authorized: bool) -> AuthResponse {
        AuthResponse::authorization(command, authorized, UserId::new(7), 1)
    }

    fn reply(rig: &Rig, command: Command, authorized: bool) {
        responses(rig, command)
            .send(&authorization(command, authorized))
            .unwrap();
    }

    /// Present `tag`, answer its request once it reaches storage and run one
    /// badge cycle. Returns the storage messages seen before the answer.
    fn badge(
        flow: &mut RoomFlow,
        rig: &Rig,
        tag: &str,
        command: Command,
        authorized: bool,
    ) -> Vec<DatabaseMsg> {
        present(rig, tag);
        let storage = answer(
            &rig.channels,
            responses(rig, command),
            command,
            authorization(command, authorized),
        );
        flow.handle_badge(&StopToken::new());
        storage.join().unwrap()
    }

    fn door_closer(rig: &Rig) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
        let done = Arc::new(AtomicBool::new(false));
        let door = Arc::clone(&rig.door);
        let flag = Arc::clone(&done);
        let closer = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(10));
                door.signal();
            }
        });
        (done, closer)
    }

    #[test]
    fn test_three_denials_raise_one_alarm() {
        let (mut flow, rig) = flow(Direction::Entry);
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.extend(badge(&mut flow, &rig, "0000000001", Command::EnterRoomByRfid, false));
        }
        assert_eq!(flow.failures(), 0);

        let mut alarms = Vec::new();
        while let Some(cmd) = rig.channels.actuator.try_recv().unwrap() {
            alarms.push(cmd);
        }
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].actuator_id, ActuatorId::Alarm.to_u8());
        assert_eq!(alarms[0].value, 1);

        // Three requests, three denial logs, one alert.
        while let Some(msg) = rig.channels.db.try_recv().unwrap() {
            seen.push(msg);
        }
        let requests = seen
            .iter()
            .filter(|msg| msg.command == Command::EnterRoomByRfid)
            .count();
        assert_eq!(requests, 3);
        let logs: Vec<LogType> = seen
            .into_iter()
            .filter_map(|msg| match msg.payload {
                DbPayload::Log(record) => Some(record.log_type),
                _ => None,
            })
            .collect();
        assert_eq!(
            logs,
            vec![LogType::AccessDenied, LogType::AccessDenied, LogType::AccessDenied, LogType::Alert]
        );
        assert_eq!(flow.machine().state(), FlowState::WaitTrigger);
    }

    #[test]
    fn test_grant_resets_failures() {
        let (mut flow, rig) = flow(Direction::Entry);
        for _ in 0..2 {
            badge(&mut flow, &rig, "0000000001", Command::EnterRoomByRfid, false);
        }
        assert_eq!(flow.failures(), 2);

        let (done, closer) = door_closer(&rig);
        badge(&mut flow, &rig, "A1B2C3D4E5", Command::EnterRoomByRfid, true);
        done.store(true, Ordering::SeqCst);
        closer.join().unwrap();
        assert_eq!(flow.failures(), 0);
    }

    #[test]
    fn test_leftover_grant_does_not_open_door() {
        let (mut flow, rig) = flow(Direction::Entry);
        // Reply to a request abandoned before this badge was presented.
        reply(&rig, Command::EnterRoomByRfid, true);

        badge(&mut flow, &rig, "0000000001", Command::EnterRoomByRfid, false);
        assert_eq!(flow.failures(), 1);
        assert!(rig.channels.entry_auth.try_recv().unwrap().is_none());
        while let Some(cmd) = rig.channels.actuator.try_recv().unwrap() {
            assert_ne!(cmd.actuator_id, ActuatorId::RoomServo.to_u8());
        }
    }

    #[test]
    fn test_exit_denials_do_not_count() {
        let (mut flow, rig) = flow(Direction::Exit);
        for _ in 0..4 {
            badge(&mut flow, &rig, "0000000001", Command::LeaveRoomByRfid, false);
        }
        assert_eq!(flow.failures(), 0);
        assert!(rig.channels.actuator.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_read_failure_returns_to_wait() {
        let (mut flow, rig) = flow(Direction::Entry);
        rig.uart.push_rx(&[0x41]);
        flow.handle_badge(&StopToken::new());
        assert_eq!(flow.machine().state(), FlowState::WaitTrigger);
        assert!(rig.channels.db.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_stop_during_wait_close_still_closes_servo() {
        let (flow, rig) = flow(Direction::Entry);
        let mut worker = spawn("room", move |token| flow.run(token));

        present(&rig, "A1B2C3D4E5");
        // A signal landing between two waits is lost; repeat until heard.
        let request = loop {
            rig.trigger.signal();
            if let Some(msg) = rig.channels.db.recv_timeout(Duration::from_millis(30)).unwrap() {
                break msg;
            }
        };
        assert_eq!(request.command, Command::EnterRoomByRfid);
        reply(&rig, Command::EnterRoomByRfid, true);

        let open = next_actuator(&rig.channels);
        assert_eq!((open.actuator_id, open.value), (ActuatorId::RoomServo.to_u8(), 0));

        worker.request_stop();
        worker.join();
        let close = next_actuator(&rig.channels);
        assert_eq!((close.actuator_id, close.value), (ActuatorId::RoomServo.to_u8(), 90));
    }
}
