//! Mock I2C bus.

use crate::error::{HardwareError, Result};
use crate::traits::I2cBus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct BusState {
    writes: Vec<(u8, Vec<u8>)>,
    registers: HashMap<u8, Vec<u8>>,
    raw: Vec<u8>,
    failing: bool,
}

/// I2C bus returning canned responses.
///
/// `read_raw` copies from the raw response; `read_register` from the bytes
/// stored for that register. Missing bytes read as zero.
#[derive(Debug)]
pub struct MockI2c {
    state: Arc<Mutex<BusState>>,
}

/// Test-side view of a [`MockI2c`].
#[derive(Debug, Clone)]
pub struct MockI2cHandle {
    state: Arc<Mutex<BusState>>,
}

fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn copy_into(src: &[u8], buf: &mut [u8]) {
    for (i, slot) in buf.iter_mut().enumerate() {
        *slot = src.get(i).copied().unwrap_or(0);
    }
}

impl MockI2c {
    pub fn new() -> (Self, MockI2cHandle) {
        let state = Arc::new(Mutex::new(BusState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockI2cHandle { state },
        )
    }
}

impl MockI2cHandle {
    pub fn set_raw_response(&self, bytes: &[u8]) {
        lock(&self.state).raw = bytes.to_vec();
    }

    pub fn set_register(&self, register: u8, bytes: &[u8]) {
        lock(&self.state).registers.insert(register, bytes.to_vec());
    }

    /// Register writes in order, as `(register, data)`.
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        lock(&self.state).writes.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }
}

impl I2cBus for MockI2c {
    fn write_register(&mut self, register: u8, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(HardwareError::communication("mock i2c nack"));
        }
        state.writes.push((register, data.to_vec()));
        Ok(())
    }

    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> Result<()> {
        let state = lock(&self.state);
        if state.failing {
            return Err(HardwareError::communication("mock i2c nack"));
        }
        copy_into(
            state.registers.get(&register).map_or(&[][..], Vec::as_slice),
            buf,
        );
        Ok(())
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        let state = lock(&self.state);
        if state.failing {
            return Err(HardwareError::communication("mock i2c nack"));
        }
        copy_into(&state.raw, buf);
        Ok(())
    }
}
