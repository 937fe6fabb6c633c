//! Interrupt dispatcher: turns bus events into monitor signals.

use crate::interrupt::BoxedInterruptBus;
use crate::monitor::Monitors;
use crate::worker::StopToken;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct InterruptDispatcher {
    bus: BoxedInterruptBus,
    monitors: Monitors,
    wait: Duration,
}

impl InterruptDispatcher {
    pub fn new(bus: BoxedInterruptBus, monitors: Monitors, wait: Duration) -> Self {
        Self { bus, monitors, wait }
    }

    /// Run until stopped. Returns at once if the bus cannot be subscribed.
    pub fn run(mut self, token: StopToken) {
        if let Err(e) = self.bus.subscribe() {
            error!(error = %e, "interrupt subscription failed, dispatcher exiting");
            return;
        }
        info!("interrupt dispatcher running");
        while !token.is_stopped() {
            match self.bus.next_event(self.wait) {
                Ok(Some(event)) => {
                    debug!(line = %event.line, pin = event.pin, "interrupt");
                    self.monitors.for_line(event.line).signal();
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "interrupt wait failed");
                    thread::sleep(self.wait);
                }
            }
        }
        info!("interrupt dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{ChannelInterruptBus, InterruptLine, SignalInterruptBus};
    use crate::monitor::WaitOutcome;
    use crate::worker::{Priority, WorkerUnit};
    use std::time::Instant;

    #[test]
    fn test_event_signals_matching_monitor_only() {
        let monitors = Monitors::new();
        let (bus, injector) = ChannelInterruptBus::new();
        let dispatcher = InterruptDispatcher::new(Box::new(bus), monitors.clone(), Duration::from_millis(20));
        let mut worker = WorkerUnit::new("irq", Priority::Normal, move |token| dispatcher.run(token));
        worker.start().unwrap();

        let motion = {
            let m = monitors.clone();
            thread::spawn(move || m.motion.wait(Duration::from_secs(2)))
        };
        let fingerprint = {
            let m = monitors.clone();
            thread::spawn(move || m.fingerprint.wait(Duration::from_millis(200)))
        };
        thread::sleep(Duration::from_millis(50));
        injector.fire(InterruptLine::Motion, 27);

        assert_eq!(motion.join().unwrap(), WaitOutcome::Signaled);
        assert_eq!(fingerprint.join().unwrap(), WaitOutcome::TimedOut);
        worker.request_stop();
        worker.join();
    }

    #[test]
    fn test_subscribe_failure_ends_dispatcher() {
        let dispatcher = InterruptDispatcher::new(
            Box::new(SignalInterruptBus::new("/nonexistent/warden_irq")),
            Monitors::new(),
            Duration::from_millis(20),
        );
        let start = Instant::now();
        dispatcher.run(StopToken::new());
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
