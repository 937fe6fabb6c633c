use super::FlowLinks;
use crate::flow::{FlowMachine, FlowState};
use crate::monitor::{EventMonitor, WaitOutcome};
use crate::worker::StopToken;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::{LogRecord, LogType, TagList};
use warden_hardware::{BoxedInputPin, Sensor};
use warden_ipc::{Command, DatabaseMsg, DbPayload};
use warden_rfid::UhfReader;

/// Scans the vault's UHF tags each time its door closes.
pub struct InventoryFlow {
    trigger: Arc<EventMonitor>,
    /// Vault reed line; high means the door is closed.
    reed: Option<BoxedInputPin>,
    scanner: UhfReader,
    links: FlowLinks,
    machine: FlowMachine,
}

impl InventoryFlow {
    pub fn new(
        trigger: Arc<EventMonitor>,
        reed: Option<BoxedInputPin>,
        scanner: UhfReader,
        links: FlowLinks,
    ) -> Self {
        Self {
            trigger,
            reed,
            scanner,
            links,
            machine: FlowMachine::new("inventory"),
        }
    }

    pub fn init(&mut self) -> warden_hardware::Result<()> {
        self.scanner.init()
    }

    pub fn run(mut self, token: StopToken) {
        info!(flow = "inventory", "flow running");
        while !token.is_stopped() {
            if self.trigger.wait(self.links.wait) == WaitOutcome::Signaled && !token.is_stopped() {
                self.on_reed();
            }
        }
        info!(flow = "inventory", "flow stopped");
    }

    fn door_closed(&mut self) -> bool {
        match self.reed.as_mut().map(|pin| pin.read()) {
            None => true,
            Some(Ok(closed)) => closed,
            Some(Err(e)) => {
                warn!(error = %e, "vault reed re-check failed, skipping scan");
                false
            }
        }
    }

    fn on_reed(&mut self) {
        if !self.door_closed() {
            debug!("vault door open, inventory deferred");
            return;
        }

        self.machine.advance(FlowState::ReadSensor);
        let tags = match self.scanner.read() {
            Ok(tags) => tags,
            Err(e) => {
                warn!(error = %e, "inventory scan failed");
                self.machine.reset();
                return;
            }
        };
        self.machine.advance(FlowState::SendRequest);
        self.report(&tags);
        self.machine.advance(FlowState::WaitTrigger);
    }

    fn report(&self, tags: &TagList) {
        info!(count = tags.len(), "vault inventory scanned");
        let update = DatabaseMsg::new(Command::UpdateAssetInventory, DbPayload::Inventory(tags.clone()));
        self.links.request(&update);
        self.links.log(
            LogRecord::new(LogType::Inventory, 0)
                .with_values(tags.len() as f32, 0.0)
                .with_description(&format!("{} assets in vault", tags.len())),
        );
    }
}
