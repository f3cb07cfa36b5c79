//! In-memory ports for virtual devices.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Direction, PortDriver, PortDriverFactory, PortError};

#[derive(Debug, Default)]
struct LoopbackState {
    name: String,
    capable: [bool; 2],
    stuck: [bool; 2],
    open: [bool; 2],
    open_calls: usize,
    close_calls: usize,
}

/// Virtual port pair whose behaviour is scripted by the owner.
///
/// Clones share state, so a handle kept outside the registry observes the
/// driver the device owns.
#[derive(Debug, Clone, Default)]
pub struct LoopbackPortDriver {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackPortDriver {
    pub fn new(name: impl Into<String>, input: bool, output: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopbackState {
                name: name.into(),
                capable: [input, output],
                ..LoopbackState::default()
            })),
        }
    }

    pub fn set_capable(&self, direction: Direction, capable: bool) {
        let mut state = self.state.lock();
        state.capable[direction.index()] = capable;
        if !capable {
            state.open[direction.index()] = false;
        }
    }

    /// A stuck port ignores open/close requests and keeps its current state.
    pub fn set_stuck(&self, direction: Direction, stuck: bool) {
        self.state.lock().stuck[direction.index()] = stuck;
    }

    pub fn open_calls(&self) -> usize {
        self.state.lock().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    pub fn reset_counters(&self) {
        let mut state = self.state.lock();
        state.open_calls = 0;
        state.close_calls = 0;
    }
}

impl PortDriver for LoopbackPortDriver {
    fn open_port(&mut self, direction: Direction) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.open_calls += 1;
        let idx = direction.index();
        if state.stuck[idx] {
            return Ok(());
        }
        if !state.capable[idx] {
            return Err(PortError::Refused {
                name: state.name.clone(),
                direction,
            });
        }
        state.open[idx] = true;
        Ok(())
    }

    fn close_port(&mut self, direction: Direction) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        let idx = direction.index();
        if !state.stuck[idx] {
            state.open[idx] = false;
        }
        Ok(())
    }

    fn is_port_open(&self, direction: Direction) -> bool {
        self.state.lock().open[direction.index()]
    }
}

/// Hands out loopback drivers, fully capable unless preset otherwise.
#[derive(Debug, Clone, Default)]
pub struct LoopbackDriverFactory {
    drivers: Arc<Mutex<HashMap<String, LoopbackPortDriver>>>,
}

impl LoopbackDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset the driver used when a device called `name` is created.
    pub fn with_device(self, name: &str, input: bool, output: bool) -> Self {
        self.drivers
            .lock()
            .insert(name.to_string(), LoopbackPortDriver::new(name, input, output));
        self
    }

    /// Handle to the driver created (or preset) for `name`.
    pub fn driver(&self, name: &str) -> Option<LoopbackPortDriver> {
        self.drivers.lock().get(name).cloned()
    }
}

impl PortDriverFactory for LoopbackDriverFactory {
    fn create(&self, device_name: &str) -> Box<dyn PortDriver> {
        let driver = self
            .drivers
            .lock()
            .entry(device_name.to_string())
            .or_insert_with(|| LoopbackPortDriver::new(device_name, true, true))
            .clone();
        Box::new(driver)
    }
}
