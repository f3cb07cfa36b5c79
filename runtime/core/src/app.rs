use std::path::PathBuf;

use config_validator::schema::DeviceRecord;
use thiserror::Error;
use tracing::info;

use crate::binding::BindingGraph;
use crate::config::{load_from_path, Diagnostic, LoadError, LoadedConfig};
use crate::device::DeviceError;
use crate::events::EventSink;
use crate::midi::{Direction, PortDriverFactory};
use crate::registry::DeviceRegistry;

/// Loaded configuration together with the live devices and bindings it
/// describes.
#[derive(Debug)]
pub struct AppState {
    config_path: PathBuf,
    pub loaded: LoadedConfig,
    registry: DeviceRegistry,
    graph: Option<BindingGraph>,
}

#[derive(Debug, Error)]
pub enum AppStateError {
    #[error("Failed to load config: {0}")]
    Load(#[from] LoadError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

impl AppState {
    pub fn initialize(
        config_path: impl Into<PathBuf>,
        drivers: impl PortDriverFactory + 'static,
        events: impl EventSink + 'static,
    ) -> Result<Self, AppStateError> {
        let path = config_path.into();
        let loaded = load_from_path(&path)?;
        let mut registry = DeviceRegistry::with_placeholder(drivers, events);
        let mut graph = loaded.binding_graph();
        apply_records(&mut registry, loaded.device_records(), &mut graph);
        info!(
            path = %path.display(),
            devices = registry.len(),
            "configuration loaded"
        );
        Ok(Self {
            config_path: path,
            loaded,
            registry,
            graph: Some(graph),
        })
    }

    /// Re-read the config file. Known devices are updated in place; the
    /// binding graph is rebuilt and re-linked against every registered
    /// device, including ones the new file no longer lists.
    pub fn reload(&mut self) -> Result<(), AppStateError> {
        let loaded = load_from_path(&self.config_path)?;
        let mut graph = loaded.binding_graph();
        apply_records(&mut self.registry, loaded.device_records(), &mut graph);
        self.registry.relink(&mut graph);
        self.loaded = loaded;
        self.graph = Some(graph);
        info!(path = %self.config_path.display(), "configuration reloaded");
        Ok(())
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.loaded.diagnostics
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn graph(&self) -> Option<&BindingGraph> {
        self.graph.as_ref()
    }

    pub fn add_device(&mut self, record: &DeviceRecord) {
        self.registry.add(record, self.graph.as_mut());
    }

    pub fn set_active(
        &mut self,
        name: &str,
        direction: Direction,
        active: bool,
    ) -> Result<bool, AppStateError> {
        Ok(self
            .registry
            .set_active(name, direction, active, self.graph.as_mut())?)
    }

    pub fn check_capable(&mut self, name: &str) -> Result<(), AppStateError> {
        Ok(self.registry.check_capable(name, self.graph.as_mut())?)
    }

    pub fn check_all(&mut self) {
        self.registry.check_all(self.graph.as_mut());
    }

    pub fn records(&self) -> Vec<DeviceRecord> {
        self.registry.records()
    }
}

fn apply_records(registry: &mut DeviceRegistry, records: &[DeviceRecord], graph: &mut BindingGraph) {
    for record in records {
        registry.add(record, Some(&mut *graph));
    }
}
