//! Port driver seam between devices and the platform MIDI layer.

pub mod loopback;
pub mod system;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub use loopback::{LoopbackDriverFactory, LoopbackPortDriver};
pub use system::{MidiPacket, MidirDriverFactory, MidirPortDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Input, Direction::Output];

    /// Bit used for this direction in active/capable masks.
    pub fn bit(self) -> u8 {
        match self {
            Direction::Input => 0b01,
            Direction::Output => 0b10,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::Input => 0,
            Direction::Output => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PortError {
    #[error("MIDI backend unavailable: {0}")]
    Init(String),
    #[error("no {direction} port named `{name}`")]
    NotFound { name: String, direction: Direction },
    #[error("failed to connect {direction} port `{name}`: {reason}")]
    Connect {
        name: String,
        direction: Direction,
        reason: String,
    },
    #[error("{direction} port `{name}` refused to open")]
    Refused { name: String, direction: Direction },
}

/// Opens and closes the ports of a single device.
///
/// Callers never trust the returned `Result` alone: the state reported by
/// [`PortDriver::is_port_open`] after a request is authoritative.
pub trait PortDriver: Send {
    fn open_port(&mut self, direction: Direction) -> Result<(), PortError>;
    fn close_port(&mut self, direction: Direction) -> Result<(), PortError>;
    fn is_port_open(&self, direction: Direction) -> bool;
}

/// Builds the driver for a newly registered device.
pub trait PortDriverFactory: Send {
    fn create(&self, device_name: &str) -> Box<dyn PortDriver>;
}
