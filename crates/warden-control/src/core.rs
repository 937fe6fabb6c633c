//! Composition root: builds every worker from one configuration and owns
//! their lifecycle.

use crate::dispatcher::InterruptDispatcher;
use crate::error::{ControlError, Result};
use crate::executor::ActuatorExecutor;
use crate::flows::{
    Direction, EnvironmentFlow, FlowLinks, InventoryFlow, MotionFlow, RoomFlow, ServoAngles,
    VaultFlow,
};
use crate::interrupt::BoxedInterruptBus;
use crate::monitor::{EventMonitor, Monitors};
use crate::worker::{Priority, WorkerUnit};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use warden_biometric::{FingerprintReader, FingerprintTimeouts};
use warden_core::config::WardenConfig;
use warden_hardware::{BoxedUart, ClimateSensor, Peripherals};
use warden_ipc::{AuthResponse, Channel, ChannelSet};
use warden_rfid::{LfReader, UhfReader, UhfScanConfig};

/// The running control core.
///
/// Devices and the interrupt bus are handed over at construction and moved
/// into their workers by [`start`](Self::start). Workers start in a fixed
/// order (executor first, dispatcher last) and are joined in reverse.
///
/// Dropping a started core shuts it down.
pub struct ControlCore {
    config: WardenConfig,
    channels: ChannelSet,
    monitors: Monitors,
    devices: Option<(Peripherals, BoxedInterruptBus)>,
    workers: Vec<WorkerUnit>,
    shut_down: bool,
}

impl ControlCore {
    pub fn new(
        config: WardenConfig,
        channels: ChannelSet,
        peripherals: Peripherals,
        bus: BoxedInterruptBus,
    ) -> Self {
        Self {
            config,
            channels,
            monitors: Monitors::new(),
            devices: Some((peripherals, bus)),
            workers: Vec::new(),
            shut_down: false,
        }
    }

    pub fn monitors(&self) -> &Monitors {
        &self.monitors
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Names of the started workers, in start order.
    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.iter().map(WorkerUnit::name).collect()
    }

    fn rt_priority(&self) -> Priority {
        if self.config.access.realtime {
            Priority::RealTime(self.config.access.rt_priority)
        } else {
            Priority::Normal
        }
    }

    /// Initialize every device and start every worker.
    ///
    /// Nothing runs until all devices initialized. If a worker fails to
    /// start, the ones already running are shut down and the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// - `ControlError::AlreadyStarted` on a second call
    /// - `ControlError::Hardware` if a device fails to initialize
    /// - `ControlError::Scheduling` / `ControlError::Spawn` from a worker
    pub fn start(&mut self) -> Result<()> {
        let (peripherals, bus) = self
            .devices
            .take()
            .ok_or_else(|| ControlError::AlreadyStarted("control core".to_string()))?;
        let units = self.build(peripherals, bus)?;

        for mut unit in units {
            let started = unit.start();
            let name = unit.name().to_string();
            self.workers.push(unit);
            if let Err(e) = started {
                error!(worker = %name, error = %e, "worker failed to start, rolling back");
                self.shutdown();
                return Err(e);
            }
        }
        info!(workers = self.workers.len(), "control core started");
        Ok(())
    }

    fn build(&self, p: Peripherals, bus: BoxedInterruptBus) -> Result<Vec<WorkerUnit>> {
        let timing = &self.config.timing;
        let access = &self.config.access;
        let devices = &self.config.devices;
        let monitors = &self.monitors;
        let channels = &self.channels;
        let links = FlowLinks::new(channels, timing);
        let servo = ServoAngles::from(access);
        let lf_stall = Duration::from_millis(timing.lf_stall_budget_ms);

        let mut executor = ActuatorExecutor::new(p.actuators, links.clone(), timing.alarm_duration())?;
        executor.init()?;

        let mut environment = EnvironmentFlow::new(
            ClimateSensor::new(p.climate),
            channels.env_cmd.clone(),
            links.clone(),
            self.config.environment,
        );
        environment.init()?;

        let scanner = UhfReader::new(p.uhf, p.uhf_enable, devices.uhf_baud_rate)
            .with_config(UhfScanConfig::from_timing(timing, access.uhf_rf_power_dbm));
        let mut inventory =
            InventoryFlow::new(monitors.vault_reed.clone(), p.vault_reed, scanner, links.clone());
        inventory.init()?;

        let motion = MotionFlow::new(monitors.motion.clone(), p.pir, channels.motion.clone(), links.clone());

        let fingerprint = FingerprintReader::new(p.fingerprint, devices.fingerprint_baud_rate)
            .with_timeouts(FingerprintTimeouts::from(timing));
        let mut vault = VaultFlow::new(
            fingerprint,
            monitors.fingerprint.clone(),
            monitors.vault_reed.clone(),
            channels.vault_cmd.clone(),
            links.clone(),
            servo,
        );
        vault.init()?;

        let room = |direction: Direction,
                    uart: BoxedUart,
                    trigger: Arc<EventMonitor>,
                    responses: Channel<AuthResponse>| {
            let reader = LfReader::new(uart, devices.lf_baud_rate)
                .with_start_wait(timing.monitor_wait())
                .with_stall_budget(lf_stall);
            RoomFlow::new(
                direction,
                reader,
                trigger,
                monitors.room_reed.clone(),
                responses,
                links.clone(),
                servo,
                access.max_consecutive_failures,
            )
        };
        let mut room_exit = room(
            Direction::Exit,
            p.exit_rfid,
            monitors.exit_rfid.clone(),
            channels.exit_auth.clone(),
        );
        room_exit.init()?;
        let mut room_entry = room(
            Direction::Entry,
            p.entry_rfid,
            monitors.entry_rfid.clone(),
            channels.entry_auth.clone(),
        );
        room_entry.init()?;

        let dispatcher = InterruptDispatcher::new(bus, monitors.clone(), timing.monitor_wait());
        let rt = self.rt_priority();

        Ok(vec![
            WorkerUnit::new("actuator_executor", rt, move |token| executor.run(token)),
            WorkerUnit::new("environment", Priority::Normal, move |token| environment.run(token)),
            WorkerUnit::new("inventory", Priority::Normal, move |token| inventory.run(token)),
            WorkerUnit::new("motion", Priority::Normal, move |token| motion.run(token)),
            WorkerUnit::new("vault", Priority::Normal, move |token| vault.run(token)),
            WorkerUnit::new("room_exit", Priority::Normal, move |token| room_exit.run(token)),
            WorkerUnit::new("room_entry", Priority::Normal, move |token| room_entry.run(token)),
            WorkerUnit::new("irq_dispatcher", rt, move |token| dispatcher.run(token)),
        ])
    }

    /// Stop every worker, wake every monitor, join in reverse start order,
    /// then release the channels. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!("control core shutting down");
        for worker in &self.workers {
            worker.request_stop();
        }
        self.monitors.broadcast_all();
        for worker in self.workers.iter_mut().rev() {
            worker.join();
        }
        self.channels.release();
        info!("control core stopped");
    }
}

impl Drop for ControlCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
