//! Control core of the Warden appliance.
//!
//! One worker thread per access flow, an interrupt dispatcher that wakes
//! them through event monitors, and a single actuator executor that owns
//! every output device. [`ControlCore`] wires it all from a
//! [`WardenConfig`](warden_core::config::WardenConfig).

pub mod core;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod flow;
pub mod flows;
pub mod interrupt;
pub mod monitor;
pub mod worker;

pub use crate::core::ControlCore;
pub use dispatcher::InterruptDispatcher;
pub use error::{ControlError, Result};
pub use executor::{ActuatorExecutor, AlarmTimer};
pub use flow::{FlowMachine, FlowState, FlowTransition};
pub use flows::{
    Direction, EnvironmentFlow, FlowLinks, InventoryFlow, MotionFlow, RoomFlow, ServoAngles,
    VaultFlow,
};
pub use interrupt::{
    BoxedInterruptBus, ChannelInterruptBus, InterruptBus, InterruptEvent, InterruptInjector,
    InterruptLine, SignalInterruptBus, block_signals,
};
pub use monitor::{EventMonitor, Monitors, WaitOutcome};
pub use worker::{Priority, StopToken, WorkerUnit};
