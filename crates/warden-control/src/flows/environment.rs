use super::FlowLinks;
use crate::flow::{FlowMachine, FlowState};
use crate::worker::StopToken;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use warden_core::{ActuatorId, LogRecord, LogType, Settings};
use warden_hardware::{ClimateReading, ClimateSensor, Sensor};
use warden_ipc::{AuthPayload, AuthResponse, Channel, Command, DatabaseMsg, DbPayload};

/// Periodic climate sampling with threshold logging and fan hysteresis.
///
/// Starts on the configured defaults and asks the storage service for the
/// stored settings; any `Settings` push on the command channel replaces
/// them.
pub struct EnvironmentFlow {
    sensor: ClimateSensor,
    commands: Channel<AuthResponse>,
    links: FlowLinks,
    settings: Settings,
    last_logged: Option<ClimateReading>,
    fan_on: bool,
    machine: FlowMachine,
}

impl EnvironmentFlow {
    pub fn new(
        sensor: ClimateSensor,
        commands: Channel<AuthResponse>,
        links: FlowLinks,
        settings: Settings,
    ) -> Self {
        Self {
            sensor,
            commands,
            links,
            settings,
            last_logged: None,
            fan_on: false,
            machine: FlowMachine::new("environment"),
        }
    }

    pub fn init(&mut self) -> warden_hardware::Result<()> {
        self.sensor.init()
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.settings.sample_interval_secs))
    }

    pub fn run(mut self, token: StopToken) {
        info!(flow = "environment", interval_secs = self.settings.sample_interval_secs, "flow running");
        self.links
            .request(&DatabaseMsg::new(Command::GetSettingsForThread, DbPayload::Empty));

        let mut next_sample = Instant::now();
        while !token.is_stopped() {
            let now = Instant::now();
            if now >= next_sample {
                self.sample();
                next_sample = now + self.interval();
                continue;
            }
            let wait = self.links.wait.min(next_sample - now);
            match self.commands.recv_timeout(wait) {
                Ok(Some(command)) => {
                    if !self.apply(command) {
                        break;
                    }
                    next_sample = next_sample.min(Instant::now() + self.interval());
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "environment command receive failed");
                    thread::sleep(wait);
                }
            }
        }
        info!(flow = "environment", "flow stopped");
    }

    /// Returns false on `Stop`.
    fn apply(&mut self, command: AuthResponse) -> bool {
        match (command.command, command.payload) {
            (Command::Stop, _) => false,
            (_, AuthPayload::Settings(settings)) => {
                match settings.validate() {
                    Ok(()) => {
                        info!(?settings, "environment settings updated");
                        self.settings = settings;
                    }
                    Err(e) => warn!(error = %e, "rejected environment settings"),
                }
                true
            }
            (other, _) => {
                debug!(command = ?other, "ignoring environment command");
                true
            }
        }
    }

    fn should_log(&self, reading: &ClimateReading) -> bool {
        match &self.last_logged {
            None => true,
            Some(last) => {
                (reading.temperature - last.temperature).abs() > self.settings.temperature_threshold
                    || (reading.humidity - last.humidity).abs() > self.settings.humidity_threshold
            }
        }
    }

    /// Desired fan state, holding the current one inside the band.
    fn fan_wanted(&self, temperature: f32) -> bool {
        if temperature >= self.settings.fan_on_temperature {
            true
        } else if temperature <= self.settings.fan_off_temperature {
            false
        } else {
            self.fan_on
        }
    }

    fn sample(&mut self) {
        self.machine.advance(FlowState::ReadSensor);
        let reading = match self.sensor.read() {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "climate read failed");
                self.machine.reset();
                return;
            }
        };
        debug!(temperature = reading.temperature, humidity = reading.humidity, "climate sample");

        if self.should_log(&reading) {
            self.machine.advance(FlowState::SendRequest);
            self.links.log(
                LogRecord::new(LogType::Sensor, 0)
                    .with_values(reading.temperature, reading.humidity)
                    .with_description(&format!(
                        "{:.1} C, {:.1} %RH",
                        reading.temperature, reading.humidity
                    )),
            );
            self.last_logged = Some(reading);
        }

        let wanted = self.fan_wanted(reading.temperature);
        if wanted != self.fan_on {
            info!(fan_on = wanted, temperature = reading.temperature, "fan state change");
            self.links.actuate(ActuatorId::Fan, u8::from(wanted));
            self.fan_on = wanted;
        }
        self.machine.advance(FlowState::WaitTrigger);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::{links, next_db, spawn};
    use warden_hardware::mock::{MockI2c, MockI2cHandle};
    use warden_ipc::ChannelSet;

    /// AHT20 measurement frame for the given values.
    fn frame(temperature: f32, humidity: f32) -> [u8; 7] {
        let scale = (1u32 << 20) as f32;
        let h = (humidity / 100.0 * scale) as u32;
        let t = ((temperature + 50.0) / 200.0 * scale) as u32;
        [
            0x1C,
            (h >> 12) as u8,
            (h >> 4) as u8,
            (((h & 0x0F) << 4) | ((t >> 16) & 0x0F)) as u8,
            (t >> 8) as u8,
            t as u8,
            0,
        ]
    }

    fn flow() -> (EnvironmentFlow, ChannelSet, MockI2cHandle) {
        let (channels, links) = links();
        let (bus, handle) = MockI2c::new();
        let sensor = ClimateSensor::new(Box::new(bus)).with_measurement_delay(Duration::ZERO);
        let flow = EnvironmentFlow::new(sensor, channels.env_cmd.clone(), links, Settings::default());
        (flow, channels, handle)
    }

    fn drain_logs(channels: &ChannelSet) -> Vec<LogRecord> {
        let mut out = Vec::new();
        while let Some(msg) = channels.db.try_recv().unwrap() {
            if let DbPayload::Log(record) = msg.payload {
                out.push(record);
            }
        }
        out
    }

    fn fan_commands(channels: &ChannelSet) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(cmd) = channels.actuator.try_recv().unwrap() {
            assert_eq!(cmd.actuator_id, ActuatorId::Fan.to_u8());
            out.push(cmd.value);
        }
        out
    }

    #[test]
    fn test_first_sample_always_logged() {
        let (mut flow, channels, bus) = flow();
        bus.set_raw_response(&frame(22.0, 40.0));
        flow.sample();
        let logs = drain_logs(&channels);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, LogType::Sensor);
        assert!((logs[0].value - 22.0).abs() < 0.01);
        assert!((logs[0].value2 - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_small_changes_not_logged() {
        let (mut flow, channels, bus) = flow();
        bus.set_raw_response(&frame(22.0, 40.0));
        flow.sample();
        bus.set_raw_response(&frame(22.3, 41.0));
        flow.sample();
        assert_eq!(drain_logs(&channels).len(), 1);

        bus.set_raw_response(&frame(22.7, 41.0));
        flow.sample();
        let logs = drain_logs(&channels);
        assert_eq!(logs.len(), 1);
        assert!((logs[0].value - 22.7).abs() < 0.01);
    }

    #[test]
    fn test_humidity_change_logged() {
        let (mut flow, channels, bus) = flow();
        bus.set_raw_response(&frame(22.0, 40.0));
        flow.sample();
        bus.set_raw_response(&frame(22.0, 43.0));
        flow.sample();
        assert_eq!(drain_logs(&channels).len(), 2);
    }

    #[test]
    fn test_fan_hysteresis() {
        let (mut flow, channels, bus) = flow();
        for temperature in [24.0, 26.5, 28.5, 29.0, 26.5, 24.9, 24.0, 26.5] {
            bus.set_raw_response(&frame(temperature, 40.0));
            flow.sample();
        }
        // On past 28, held through 26.5, off below 25, held through 26.5.
        assert_eq!(fan_commands(&channels), vec![1, 0]);
    }

    #[test]
    fn test_settings_push_replaces_defaults() {
        let (mut flow, _channels, _bus) = flow();
        let settings = Settings {
            fan_on_temperature: 30.0,
            ..Settings::default()
        };
        assert!(flow.apply(AuthResponse::settings(Command::UpdateSettings, settings)));
        assert_eq!(flow.settings(), settings);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let (mut flow, _channels, _bus) = flow();
        let settings = Settings {
            fan_on_temperature: 20.0,
            fan_off_temperature: 26.0,
            ..Settings::default()
        };
        assert!(flow.apply(AuthResponse::settings(Command::UpdateSettings, settings)));
        assert_eq!(flow.settings(), Settings::default());
    }

    #[test]
    fn test_read_failure_skips_sample() {
        let (mut flow, channels, bus) = flow();
        bus.set_failing(true);
        flow.sample();
        assert!(drain_logs(&channels).is_empty());
        assert_eq!(flow.machine.state(), FlowState::WaitTrigger);
    }

    #[test]
    fn test_run_requests_settings_and_stops_on_sentinel() {
        let (flow, channels, bus) = flow();
        bus.set_raw_response(&frame(22.0, 40.0));
        let mut worker = spawn("environment", move |token| flow.run(token));

        assert_eq!(next_db(&channels).command, Command::GetSettingsForThread);
        let first = next_db(&channels);
        assert!(matches!(first.payload, DbPayload::Log(ref r) if r.log_type == LogType::Sensor));

        channels.env_cmd.send(&AuthResponse::stop()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while worker.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!worker.is_running());
        worker.join();
    }
}
