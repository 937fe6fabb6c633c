//! Actuator command executor and the alarm auto-off timer.
//!
//! The executor is the only owner of the [`ActuatorBank`]. Flows never touch
//! a device directly; they queue [`ActuatorCmd`]s and the executor applies
//! them in arrival order, logging each applied command.

use crate::error::{ControlError, Result};
use crate::flows::FlowLinks;
use crate::worker::StopToken;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use warden_core::{ActuatorId, LogRecord, LogType};
use warden_hardware::ActuatorBank;
use warden_ipc::{ActuatorCmd, Channel};

#[derive(Debug, Default)]
struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    changed: Condvar,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One-shot timer that switches the alarm off.
///
/// Arming while armed replaces the deadline. On expiry the timer queues
/// `{alarm, 0}` on the actuator channel, so the executor applies it like
/// any other command. The timer thread is joined on drop.
///
/// ```no_run
/// use std::time::Duration;
/// use warden_control::executor::AlarmTimer;
/// # fn demo(actuator: warden_ipc::Channel<warden_ipc::ActuatorCmd>) -> warden_control::Result<()> {
/// let timer = AlarmTimer::spawn(Duration::from_secs(30), actuator)?;
/// timer.arm();
/// assert!(timer.is_armed());
/// timer.disarm();
/// # Ok(())
/// # }
/// ```
pub struct AlarmTimer {
    shared: Arc<TimerShared>,
    duration: Duration,
    handle: Option<JoinHandle<()>>,
}

impl AlarmTimer {
    /// Start the timer thread, disarmed.
    ///
    /// # Errors
    /// `ControlError::Spawn` if the thread cannot be created.
    pub fn spawn(duration: Duration, actuator: Channel<ActuatorCmd>) -> Result<Self> {
        let shared = Arc::new(TimerShared::default());
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("alarm_timer".to_string())
            .spawn(move || timer_loop(&thread_shared, &actuator))
            .map_err(|source| ControlError::Spawn {
                worker: "alarm_timer".to_string(),
                source,
            })?;
        Ok(Self {
            shared,
            duration,
            handle: Some(handle),
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Expire `duration` from now, replacing any pending deadline.
    pub fn arm(&self) {
        self.shared.lock().deadline = Some(Instant::now() + self.duration);
        self.shared.changed.notify_all();
        debug!(secs = self.duration.as_secs_f32(), "alarm timer armed");
    }

    pub fn disarm(&self) {
        self.shared.lock().deadline = None;
        self.shared.changed.notify_all();
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }
}

impl Drop for AlarmTimer {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.changed.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("alarm timer thread panicked");
            }
        }
    }
}

fn timer_loop(shared: &TimerShared, actuator: &Channel<ActuatorCmd>) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }
        match state.deadline {
            None => {
                state = shared.changed.wait(state).unwrap_or_else(|e| e.into_inner());
            }
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    state = shared
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                    continue;
                }
                state.deadline = None;
                drop(state);
                info!("alarm timer expired, switching alarm off");
                if let Err(e) = actuator.try_send(&ActuatorCmd::new(ActuatorId::Alarm, 0)) {
                    warn!(error = %e, "alarm off command dropped");
                }
                state = shared.lock();
            }
        }
    }
}

/// Single consumer of the actuator channel.
pub struct ActuatorExecutor {
    bank: ActuatorBank,
    commands: Channel<ActuatorCmd>,
    links: FlowLinks,
    timer: AlarmTimer,
    last_timestamp: i64,
}

impl ActuatorExecutor {
    /// Build the executor and its alarm timer.
    ///
    /// # Errors
    /// `ControlError::Spawn` if the timer thread cannot be created.
    pub fn new(bank: ActuatorBank, links: FlowLinks, alarm_duration: Duration) -> Result<Self> {
        let timer = AlarmTimer::spawn(alarm_duration, links.actuator.clone())?;
        Ok(Self {
            bank,
            commands: links.actuator.clone(),
            links,
            timer,
            last_timestamp: 0,
        })
    }

    /// Put every actuator in its resting state.
    pub fn init(&mut self) -> Result<()> {
        self.bank.init_all()?;
        Ok(())
    }

    pub fn timer(&self) -> &AlarmTimer {
        &self.timer
    }

    pub fn run(mut self, token: StopToken) {
        info!("actuator executor running");
        while !token.is_stopped() {
            match self.commands.recv_timeout(self.links.wait) {
                Ok(Some(command)) => self.execute(command),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "actuator receive failed");
                    thread::sleep(self.links.wait);
                }
            }
        }
        self.timer.disarm();
        self.bank.stop_all();
        info!("actuator executor stopped");
    }

    fn execute(&mut self, command: ActuatorCmd) {
        let id = match ActuatorId::from_u8(command.actuator_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "rejecting actuator command");
                return;
            }
        };
        let device = self.bank.get_mut(id);
        if let Err(e) = device.set_value(command.value) {
            warn!(actuator = %id, value = command.value, error = %e, "actuator command failed");
            return;
        }
        let description = device.describe(command.value);
        debug!(actuator = %id, value = command.value, "{description}");

        if id == ActuatorId::Alarm {
            if command.value != 0 {
                self.timer.arm();
            } else {
                self.timer.disarm();
            }
        }

        let record = LogRecord::new(LogType::Actuator, i32::from(id.to_u8()))
            .with_values(f32::from(command.value), 0.0)
            .with_description(&description);
        // Two commands inside one clock tick still get distinct timestamps.
        let timestamp = record.timestamp.max(self.last_timestamp + 1);
        self.last_timestamp = timestamp;
        self.links.log(record.with_timestamp(timestamp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::{links, spawn};
    use warden_hardware::{MockPeripherals, Peripherals};
    use warden_ipc::{ChannelSet, DbPayload};

    fn executor(alarm: Duration) -> (ActuatorExecutor, ChannelSet, MockPeripherals) {
        let (channels, links) = links();
        let (peripherals, handles) = Peripherals::mock();
        let mut executor = ActuatorExecutor::new(peripherals.actuators, links, alarm).unwrap();
        executor.init().unwrap();
        (executor, channels, handles)
    }

    fn actuator_logs(channels: &ChannelSet) -> Vec<LogRecord> {
        let mut out = Vec::new();
        while let Some(msg) = channels.db.try_recv().unwrap() {
            if let DbPayload::Log(record) = msg.payload {
                assert_eq!(record.log_type, LogType::Actuator);
                out.push(record);
            }
        }
        out
    }

    #[test]
    fn test_commands_applied_and_logged_in_order() {
        let (mut executor, channels, handles) = executor(Duration::from_secs(30));
        executor.execute(ActuatorCmd::new(ActuatorId::RoomServo, 0));
        executor.execute(ActuatorCmd::new(ActuatorId::RoomServo, 90));
        executor.execute(ActuatorCmd::new(ActuatorId::Fan, 1));

        let logs = actuator_logs(&channels);
        let applied: Vec<(i32, f32)> = logs.iter().map(|r| (r.entity_id, r.value)).collect();
        assert_eq!(applied, vec![(0, 0.0), (0, 90.0), (2, 1.0)]);
        assert!(logs.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(handles.room_servo.duty_cycle(), Some(Duration::from_micros(1500)));
        assert_eq!(handles.fan.level(), Some(true));
    }

    #[test]
    fn test_unknown_actuator_rejected() {
        let (mut executor, channels, _handles) = executor(Duration::from_secs(30));
        executor.execute(ActuatorCmd {
            actuator_id: 9,
            value: 1,
        });
        assert!(actuator_logs(&channels).is_empty());
    }

    #[test]
    fn test_failed_device_not_logged() {
        let (mut executor, channels, handles) = executor(Duration::from_secs(30));
        handles.fan.set_failing(true);
        executor.execute(ActuatorCmd::new(ActuatorId::Fan, 1));
        assert!(actuator_logs(&channels).is_empty());
    }

    #[test]
    fn test_alarm_arms_and_zero_disarms() {
        let (mut executor, _channels, handles) = executor(Duration::from_secs(30));
        executor.execute(ActuatorCmd::new(ActuatorId::Alarm, 1));
        assert!(executor.timer().is_armed());
        assert_eq!(handles.alarm_led.level(), Some(true));
        executor.execute(ActuatorCmd::new(ActuatorId::Alarm, 0));
        assert!(!executor.timer().is_armed());
        assert_eq!(handles.alarm_buzzer.level(), Some(false));
    }

    #[test]
    fn test_timer_sends_single_off_command() {
        let (channels, _links) = links();
        let timer = AlarmTimer::spawn(Duration::from_millis(40), channels.actuator.clone()).unwrap();
        timer.arm();
        let off = channels
            .actuator
            .recv_timeout(Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert_eq!((off.actuator_id, off.value), (ActuatorId::Alarm.to_u8(), 0));
        assert!(!timer.is_armed());
        assert!(channels.actuator.recv_timeout(Duration::from_millis(150)).unwrap().is_none());
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let (channels, _links) = links();
        let timer = AlarmTimer::spawn(Duration::from_millis(150), channels.actuator.clone()).unwrap();
        let first = Instant::now();
        timer.arm();
        thread::sleep(Duration::from_millis(100));
        timer.arm();
        let off = channels
            .actuator
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .unwrap();
        assert_eq!(off.value, 0);
        assert!(first.elapsed() >= Duration::from_millis(240));
        assert!(channels.actuator.recv_timeout(Duration::from_millis(200)).unwrap().is_none());
    }

    #[test]
    fn test_disarm_cancels_expiry() {
        let (channels, _links) = links();
        let timer = AlarmTimer::spawn(Duration::from_millis(40), channels.actuator.clone()).unwrap();
        timer.arm();
        timer.disarm();
        assert!(channels.actuator.recv_timeout(Duration::from_millis(150)).unwrap().is_none());
    }

    #[test]
    fn test_running_executor_turns_alarm_off_after_duration() {
        let (executor, channels, handles) = executor(Duration::from_millis(60));
        let mut worker = spawn("executor", move |token| executor.run(token));
        channels.actuator.send(&ActuatorCmd::new(ActuatorId::Alarm, 1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while handles.alarm_led.history() != vec![false, true, false] && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handles.alarm_led.history(), vec![false, true, false]);

        worker.request_stop();
        worker.join();
        // Stop leaves every output released.
        assert_eq!(handles.alarm_led.level(), Some(false));
        assert!(!handles.room_servo.is_enabled());
    }
}
