use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tokio::sync::broadcast;

use super::{Direction, PortDriver, PortDriverFactory, PortError};

/// Raw bytes received on an input port, tagged with the device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPacket {
    pub device: String,
    pub bytes: Vec<u8>,
}

/// Driver backed by the system MIDI API through `midir`.
///
/// Ports are located by exact name match against the device name.
pub struct MidirPortDriver {
    device_name: String,
    client_name: String,
    listener: Option<broadcast::Sender<MidiPacket>>,
    input: Option<MidiInputConnection<()>>,
    output: Option<MidiOutputConnection>,
}

impl MidirPortDriver {
    pub fn new(client_name: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            client_name: client_name.into(),
            listener: None,
            input: None,
            output: None,
        }
    }

    /// Forward incoming messages to `sender` while the input port is open.
    pub fn with_listener(mut self, sender: broadcast::Sender<MidiPacket>) -> Self {
        self.listener = Some(sender);
        self
    }

    /// Send raw bytes through the open output port.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        let Some(output) = self.output.as_mut() else {
            return Err(PortError::NotFound {
                name: self.device_name.clone(),
                direction: Direction::Output,
            });
        };
        output.send(bytes).map_err(|err| PortError::Connect {
            name: self.device_name.clone(),
            direction: Direction::Output,
            reason: err.to_string(),
        })
    }

    fn open_input(&mut self) -> Result<(), PortError> {
        let mut midi_in =
            MidiInput::new(&self.client_name).map_err(|err| PortError::Init(err.to_string()))?;
        midi_in.ignore(Ignore::None);

        let port = midi_in
            .ports()
            .into_iter()
            .find(|port| midi_in.port_name(port).ok().as_deref() == Some(self.device_name.as_str()))
            .ok_or_else(|| PortError::NotFound {
                name: self.device_name.clone(),
                direction: Direction::Input,
            })?;

        let listener = self.listener.clone();
        let device = self.device_name.clone();
        let connection = midi_in
            .connect(
                &port,
                "midimesh-in",
                move |_, message, _| {
                    tracing::trace!(device = %device, ?message, "midi in");
                    if let Some(listener) = &listener {
                        let _ = listener.send(MidiPacket {
                            device: device.clone(),
                            bytes: message.to_vec(),
                        });
                    }
                },
                (),
            )
            .map_err(|err| PortError::Connect {
                name: self.device_name.clone(),
                direction: Direction::Input,
                reason: err.to_string(),
            })?;
        self.input = Some(connection);
        Ok(())
    }

    fn open_output(&mut self) -> Result<(), PortError> {
        let midi_out =
            MidiOutput::new(&self.client_name).map_err(|err| PortError::Init(err.to_string()))?;

        let port = midi_out
            .ports()
            .into_iter()
            .find(|port| {
                midi_out.port_name(port).ok().as_deref() == Some(self.device_name.as_str())
            })
            .ok_or_else(|| PortError::NotFound {
                name: self.device_name.clone(),
                direction: Direction::Output,
            })?;

        let connection = midi_out
            .connect(&port, "midimesh-out")
            .map_err(|err| PortError::Connect {
                name: self.device_name.clone(),
                direction: Direction::Output,
                reason: err.to_string(),
            })?;
        self.output = Some(connection);
        Ok(())
    }
}

impl PortDriver for MidirPortDriver {
    fn open_port(&mut self, direction: Direction) -> Result<(), PortError> {
        if self.is_port_open(direction) {
            return Ok(());
        }
        match direction {
            Direction::Input => self.open_input(),
            Direction::Output => self.open_output(),
        }
    }

    fn close_port(&mut self, direction: Direction) -> Result<(), PortError> {
        match direction {
            Direction::Input => {
                if let Some(connection) = self.input.take() {
                    connection.close();
                }
            }
            Direction::Output => {
                if let Some(connection) = self.output.take() {
                    connection.close();
                }
            }
        }
        Ok(())
    }

    fn is_port_open(&self, direction: Direction) -> bool {
        match direction {
            Direction::Input => self.input.is_some(),
            Direction::Output => self.output.is_some(),
        }
    }
}

pub struct MidirDriverFactory {
    client_name: String,
    listener: Option<broadcast::Sender<MidiPacket>>,
}

impl MidirDriverFactory {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, sender: broadcast::Sender<MidiPacket>) -> Self {
        self.listener = Some(sender);
        self
    }
}

impl PortDriverFactory for MidirDriverFactory {
    fn create(&self, device_name: &str) -> Box<dyn PortDriver> {
        let driver = MidirPortDriver::new(self.client_name.as_str(), device_name);
        match &self.listener {
            Some(sender) => Box::new(driver.with_listener(sender.clone())),
            None => Box::new(driver),
        }
    }
}

/// Names of all ports currently visible to the system MIDI API.
pub fn list_port_names(client_name: &str, direction: Direction) -> Result<Vec<String>, PortError> {
    match direction {
        Direction::Input => {
            let midi_in =
                MidiInput::new(client_name).map_err(|err| PortError::Init(err.to_string()))?;
            Ok(midi_in
                .ports()
                .iter()
                .filter_map(|port| midi_in.port_name(port).ok())
                .collect())
        }
        Direction::Output => {
            let midi_out =
                MidiOutput::new(client_name).map_err(|err| PortError::Init(err.to_string()))?;
            Ok(midi_out
                .ports()
                .iter()
                .filter_map(|port| midi_out.port_name(port).ok())
                .collect())
        }
    }
}
