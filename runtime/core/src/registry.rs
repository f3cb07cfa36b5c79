//! Uniquely named set of devices, kept consistent with the binding graph.

use config_validator::schema::DeviceRecord;
use tracing::{debug, trace};

use crate::binding::{BindingGraph, RefreshPolicy};
use crate::device::{Device, DeviceError, DeviceId};
use crate::events::EventSink;
use crate::midi::{Direction, PortDriverFactory};

/// Name of the placeholder shown while no real device is known.
pub const DUMMY_DEVICE_NAME: &str = "Dummy";

pub struct DeviceRegistry {
    devices: Vec<Device>,
    next_id: u64,
    drivers: Box<dyn PortDriverFactory>,
    events: Box<dyn EventSink>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    pub fn new(
        drivers: impl PortDriverFactory + 'static,
        events: impl EventSink + 'static,
    ) -> Self {
        Self {
            devices: Vec::new(),
            next_id: 0,
            drivers: Box::new(drivers),
            events: Box::new(events),
        }
    }

    /// Registry holding only the placeholder device.
    pub fn with_placeholder(
        drivers: impl PortDriverFactory + 'static,
        events: impl EventSink + 'static,
    ) -> Self {
        let mut registry = Self::new(drivers, events);
        let id = registry.allocate_id();
        let driver = registry.drivers.create(DUMMY_DEVICE_NAME);
        registry
            .devices
            .push(Device::placeholder(id, DUMMY_DEVICE_NAME, driver));
        registry
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> + '_ {
        self.devices.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == id)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.name() == name)
    }

    fn allocate_id(&mut self) -> DeviceId {
        let id = DeviceId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create or update the device named by `record`.
    ///
    /// A known name is updated in place. An unknown name evicts the
    /// placeholder, gets a freshly probed device, and is inserted. Either way
    /// the binding graph, when present, has its message handles repaired and
    /// every binding mentioning the device refreshed.
    pub fn add(&mut self, record: &DeviceRecord, mut graph: Option<&mut BindingGraph>) -> &Device {
        let idx = match self.position(&record.name) {
            Some(idx) => {
                self.devices[idx].update(record, graph.as_deref_mut(), self.events.as_ref());
                debug!(device = %record.name, "updated device");
                idx
            }
            None => {
                if let Some(dummy) = self.position(DUMMY_DEVICE_NAME) {
                    self.devices.remove(dummy);
                    debug!("removed placeholder device");
                }

                let id = self.allocate_id();
                let driver = self.drivers.create(&record.name);
                let mut device = Device::new(id, record.name.clone(), driver);
                device.check_capable(graph.as_deref_mut(), self.events.as_ref());
                device.update(record, graph.as_deref_mut(), self.events.as_ref());
                debug!(device = %record.name, id = id.raw(), "added device");

                self.devices.push(device);
                self.devices.len() - 1
            }
        };

        self.sync_bindings(idx, graph);
        &self.devices[idx]
    }

    /// [`DeviceRegistry::add`] with a record carrying only `name`.
    pub fn add_named(&mut self, name: &str, graph: Option<&mut BindingGraph>) -> &Device {
        self.add(&DeviceRecord::named(name), graph)
    }

    fn sync_bindings(&self, idx: usize, graph: Option<&mut BindingGraph>) {
        let device = &self.devices[idx];
        let Some(graph) = graph else {
            trace!(device = %device.name(), "no binding graph loaded");
            return;
        };

        let repaired = graph.repair_references(device.name(), device.id(), |id| {
            self.get(id).map(Device::name)
        });
        let refreshed = graph.refresh_bindings(device.name(), RefreshPolicy::AnyMessage);
        debug!(device = %device.name(), repaired, refreshed, "synchronized bindings");
    }

    /// Link `graph` against every registered device, in registry order.
    ///
    /// Used when a graph is rebuilt while devices it does not list are still
    /// registered.
    pub fn relink(&self, graph: &mut BindingGraph) {
        for idx in 0..self.devices.len() {
            self.sync_bindings(idx, Some(&mut *graph));
        }
    }

    /// Names of devices whose last probe found `direction` usable, in
    /// registry order.
    pub fn capable_devices(&self, direction: Direction) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| d.is_capable(direction))
            .map(|d| d.name().to_string())
            .collect()
    }

    pub fn set_active(
        &mut self,
        name: &str,
        direction: Direction,
        active: bool,
        graph: Option<&mut BindingGraph>,
    ) -> Result<bool, DeviceError> {
        let idx = self
            .position(name)
            .ok_or_else(|| DeviceError::UnknownDevice(name.to_string()))?;
        self.devices[idx].set_active(direction, active, graph, self.events.as_ref())
    }

    /// Re-probe one device. Its open ports are closed for the duration.
    pub fn check_capable(
        &mut self,
        name: &str,
        graph: Option<&mut BindingGraph>,
    ) -> Result<(), DeviceError> {
        let idx = self
            .position(name)
            .ok_or_else(|| DeviceError::UnknownDevice(name.to_string()))?;
        self.devices[idx].check_capable(graph, self.events.as_ref());
        Ok(())
    }

    pub fn check_all(&mut self, mut graph: Option<&mut BindingGraph>) {
        for device in &mut self.devices {
            device.check_capable(graph.as_deref_mut(), self.events.as_ref());
        }
    }

    pub fn records(&self) -> Vec<DeviceRecord> {
        self.devices
            .iter()
            .filter(|d| d.is_editable())
            .map(Device::to_record)
            .collect()
    }
}
