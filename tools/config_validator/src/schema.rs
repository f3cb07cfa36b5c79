use serde::{Deserialize, Serialize};

/// Bits of `DeviceRecord::active` that carry meaning.
pub const ACTIVE_MASK: u8 = 0b11;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
    #[serde(default)]
    pub collections: Vec<CollectionSpec>,
}

/// Persisted state of one MIDI device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    /// Bit 0 is input, bit 1 is output.
    #[serde(default)]
    pub active: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thru: String,
}

impl DeviceRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    #[serde(default)]
    pub bindings: Vec<BindingSpec>,
}

#[derive(Debug, Deserialize)]
pub struct BindingSpec {
    pub name: String,
    #[serde(default)]
    pub messages: Vec<MessageSpec>,
}

#[derive(Debug, Deserialize)]
pub struct MessageSpec {
    #[serde(default)]
    pub device: String,
}
