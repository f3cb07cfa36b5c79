//! Device lifecycle for a MIDI control surface: port activation, capability
//! probing, and keeping binding messages pointed at the right device.

pub mod app;
pub mod binding;
pub mod config;
pub mod device;
pub mod events;
pub mod midi;
pub mod registry;
pub mod watch;

pub use app::{AppState, AppStateError};
pub use binding::{Binding, BindingCollection, BindingGraph, Message, RefreshPolicy};
pub use config::{load_from_path, load_from_str, Diagnostic, DiagnosticSeverity, LoadError, LoadedConfig};
pub use config_validator::schema::DeviceRecord;
pub use device::{Device, DeviceError, DeviceId};
pub use events::{DeviceEvent, EventSink, RecordingEventSink, TracingEventSink};
pub use midi::{
    Direction, LoopbackDriverFactory, LoopbackPortDriver, MidirDriverFactory, MidirPortDriver,
    PortDriver, PortDriverFactory, PortError,
};
pub use registry::{DeviceRegistry, DUMMY_DEVICE_NAME};
pub use watch::{watch_config, ReloadEvent, WatchHandle};
