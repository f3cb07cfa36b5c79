//! A single named MIDI endpoint and its per-direction port state.

use std::fmt;

use config_validator::schema::{DeviceRecord, ACTIVE_MASK};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::binding::{BindingGraph, RefreshPolicy};
use crate::events::{DeviceEvent, EventSink};
use crate::midi::{Direction, PortDriver};

/// Registry-issued handle, stable for the lifetime of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("cannot change {direction} port state of `{device}` (requested open: {requested})")]
    PortStateMismatch {
        device: String,
        direction: Direction,
        requested: bool,
    },
    #[error("no device named `{0}`")]
    UnknownDevice(String),
}

pub struct Device {
    id: DeviceId,
    name: String,
    capable: u8,
    active: u8,
    thru: String,
    editable: bool,
    driver: Box<dyn PortDriver>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capable", &self.capable)
            .field("active", &self.active)
            .field("thru", &self.thru)
            .field("editable", &self.editable)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub(crate) fn new(id: DeviceId, name: impl Into<String>, driver: Box<dyn PortDriver>) -> Self {
        Self {
            id,
            name: name.into(),
            capable: 0,
            active: 0,
            thru: String::new(),
            editable: true,
            driver,
        }
    }

    /// Stand-in shown while no real device is registered. Its state is frozen.
    pub(crate) fn placeholder(
        id: DeviceId,
        name: impl Into<String>,
        driver: Box<dyn PortDriver>,
    ) -> Self {
        Self {
            editable: false,
            ..Self::new(id, name, driver)
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pass-through target device name; empty when unset.
    pub fn thru(&self) -> &str {
        &self.thru
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Active state as stored in records: bit 0 input, bit 1 output.
    pub fn active_mask(&self) -> u8 {
        self.active
    }

    pub fn is_active(&self, direction: Direction) -> bool {
        self.active & direction.bit() != 0
    }

    pub fn is_any_active(&self) -> bool {
        self.active != 0
    }

    /// Result of the last capability probe.
    pub fn is_capable(&self, direction: Direction) -> bool {
        self.capable & direction.bit() != 0
    }

    fn set_capable(&mut self, direction: Direction, capable: bool) {
        if capable {
            self.capable |= direction.bit();
        } else {
            self.capable &= !direction.bit();
        }
    }

    /// Apply the active bitmask and thru target from `record`.
    ///
    /// Directions that fail to switch are logged and left as they were.
    pub fn update(
        &mut self,
        record: &DeviceRecord,
        mut graph: Option<&mut BindingGraph>,
        events: &dyn EventSink,
    ) {
        let wanted = record.active & ACTIVE_MASK;
        for direction in Direction::ALL {
            let active = wanted & direction.bit() != 0;
            if let Err(err) = self.set_active(direction, active, graph.as_deref_mut(), events) {
                warn!(device = %self.name, "{err}");
            }
        }
        self.thru = record.thru.clone();
    }

    /// Open or close the port for `direction`.
    ///
    /// Returns `Ok(false)` without touching the driver when the device is not
    /// editable, already in the requested state, or not capable in that
    /// direction. The flip only happens when the driver reports the requested
    /// state afterwards; otherwise a [`DeviceEvent::PortStateMismatch`] is
    /// reported and the error returned.
    ///
    /// Activation refreshes bindings whose first message names this device.
    pub fn set_active(
        &mut self,
        direction: Direction,
        active: bool,
        graph: Option<&mut BindingGraph>,
        events: &dyn EventSink,
    ) -> Result<bool, DeviceError> {
        if !self.editable || self.is_active(direction) == active || !self.is_capable(direction) {
            return Ok(false);
        }

        let request = if active {
            self.driver.open_port(direction)
        } else {
            self.driver.close_port(direction)
        };
        if let Err(err) = request {
            debug!(device = %self.name, %direction, "driver: {err}");
        }

        if self.driver.is_port_open(direction) != active {
            events.report(DeviceEvent::PortStateMismatch {
                device: self.name.clone(),
                direction,
                requested: active,
            });
            return Err(DeviceError::PortStateMismatch {
                device: self.name.clone(),
                direction,
                requested: active,
            });
        }

        self.active ^= direction.bit();
        info!(device = %self.name, %direction, active, "port state changed");

        if active {
            if let Some(graph) = graph {
                let refreshed = graph.refresh_bindings(&self.name, RefreshPolicy::FirstMessage);
                debug!(device = %self.name, refreshed, "refreshed bindings after activation");
            }
        }
        Ok(true)
    }

    /// Re-probe which directions can actually be opened.
    ///
    /// Every open port is closed while probing. Previously active directions
    /// are re-activated afterwards, including when the probe unwinds.
    pub fn check_capable(&mut self, graph: Option<&mut BindingGraph>, events: &dyn EventSink) {
        let mut probe = CapabilityProbe::begin(self);
        probe.probe();
        probe.restore(graph, events);
    }

    /// Record form of the device: name, active bitmask, thru when set.
    pub fn to_record(&self) -> DeviceRecord {
        DeviceRecord {
            name: self.name.clone(),
            active: self.active,
            thru: self.thru.clone(),
        }
    }
}

/// Probe and restore phases of [`Device::check_capable`].
struct CapabilityProbe<'a> {
    device: &'a mut Device,
    saved: u8,
    restored: bool,
}

impl<'a> CapabilityProbe<'a> {
    fn begin(device: &'a mut Device) -> Self {
        let saved = device.active;
        device.active = 0;
        info!(device = %device.name, "checking device capabilities");
        let mut probe = Self {
            device,
            saved,
            restored: false,
        };
        probe.close_all();
        probe
    }

    fn probe(&mut self) {
        for direction in Direction::ALL {
            if let Err(err) = self.device.driver.open_port(direction) {
                debug!(device = %self.device.name, %direction, "probe: {err}");
            }
            let capable = self.device.driver.is_port_open(direction);
            self.device.set_capable(direction, capable);
        }
        self.close_all();
    }

    fn restore(mut self, mut graph: Option<&mut BindingGraph>, events: &dyn EventSink) {
        self.restored = true;
        info!(
            device = %self.device.name,
            capable = self.device.capable,
            "device capabilities checked, re-opening active ports"
        );
        for direction in Direction::ALL {
            let active = self.saved & direction.bit() != 0;
            if let Err(err) = self
                .device
                .set_active(direction, active, graph.as_deref_mut(), events)
            {
                warn!(device = %self.device.name, "{err}");
            }
        }
    }

    fn close_all(&mut self) {
        for direction in Direction::ALL {
            if let Err(err) = self.device.driver.close_port(direction) {
                debug!(device = %self.device.name, %direction, "close: {err}");
            }
        }
    }
}

impl Drop for CapabilityProbe<'_> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        // Unwound before the restore phase: reopen what was active without
        // touching bindings.
        for direction in Direction::ALL {
            if self.saved & direction.bit() == 0 || !self.device.is_capable(direction) {
                continue;
            }
            if let Err(err) = self.device.driver.open_port(direction) {
                debug!(device = %self.device.name, %direction, "restore: {err}");
            }
            if self.device.driver.is_port_open(direction) {
                self.device.active |= direction.bit();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Binding, BindingCollection, Message};
    use crate::events::RecordingEventSink;
    use crate::midi::{LoopbackPortDriver, PortError};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Loopback driver whose next `open_port` panics once armed.
    struct FaultyDriver {
        inner: LoopbackPortDriver,
        armed: Arc<AtomicBool>,
    }

    impl PortDriver for FaultyDriver {
        fn open_port(&mut self, direction: Direction) -> Result<(), PortError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                panic!("driver fault while opening {direction}");
            }
            self.inner.open_port(direction)
        }

        fn close_port(&mut self, direction: Direction) -> Result<(), PortError> {
            self.inner.close_port(direction)
        }

        fn is_port_open(&self, direction: Direction) -> bool {
            self.inner.is_port_open(direction)
        }
    }

    fn device(input: bool, output: bool) -> (Device, LoopbackPortDriver) {
        let driver = LoopbackPortDriver::new("Synth", input, output);
        let mut device = Device::new(DeviceId::new(1), "Synth", Box::new(driver.clone()));
        device.check_capable(None, &RecordingEventSink::new());
        driver.reset_counters();
        (device, driver)
    }

    #[test]
    fn update_applies_each_bit() {
        let sink = RecordingEventSink::new();
        for mask in 0..=3u8 {
            let (mut device, _) = device(true, true);
            device.update(
                &DeviceRecord {
                    name: "Synth".into(),
                    active: mask,
                    thru: String::new(),
                },
                None,
                &sink,
            );
            assert_eq!(device.is_active(Direction::Input), mask & 0b01 != 0);
            assert_eq!(device.is_active(Direction::Output), mask & 0b10 != 0);
            assert_eq!(device.is_any_active(), mask != 0);
            assert_eq!(device.active_mask(), mask);
        }
        assert!(sink.events().is_empty());
    }

    #[test]
    fn update_is_idempotent_and_masks_high_bits() {
        let sink = RecordingEventSink::new();
        let (mut device, driver) = device(true, true);
        let record = DeviceRecord {
            name: "Synth".into(),
            active: 0b101,
            thru: "Mixer".into(),
        };
        device.update(&record, None, &sink);
        device.update(&record, None, &sink);
        assert_eq!(device.active_mask(), 0b01);
        assert_eq!(device.thru(), "Mixer");
        assert_eq!(driver.open_calls(), 1);
    }

    #[test]
    fn second_activation_does_not_touch_driver() {
        let sink = RecordingEventSink::new();
        let (mut device, driver) = device(true, true);
        assert_eq!(device.set_active(Direction::Output, true, None, &sink), Ok(true));
        assert_eq!(device.set_active(Direction::Output, true, None, &sink), Ok(false));
        assert!(device.is_active(Direction::Output));
        assert_eq!(driver.open_calls(), 1);
    }

    #[test]
    fn incapable_direction_is_never_opened() {
        let sink = RecordingEventSink::new();
        let (mut device, driver) = device(true, false);
        assert!(!device.is_capable(Direction::Output));
        assert_eq!(device.set_active(Direction::Output, true, None, &sink), Ok(false));
        assert!(!device.is_active(Direction::Output));
        assert_eq!(driver.open_calls(), 0);
    }

    #[test]
    fn mismatch_keeps_state_and_reports_once() {
        let sink = RecordingEventSink::new();
        let (mut device, driver) = device(true, true);
        driver.set_stuck(Direction::Input, true);

        let err = device
            .set_active(Direction::Input, true, None, &sink)
            .unwrap_err();
        assert!(matches!(err, DeviceError::PortStateMismatch { requested: true, .. }));
        assert!(!device.is_active(Direction::Input));
        assert_eq!(
            sink.events(),
            vec![DeviceEvent::PortStateMismatch {
                device: "Synth".into(),
                direction: Direction::Input,
                requested: true,
            }]
        );
    }

    #[test]
    fn placeholder_ignores_activation() {
        let sink = RecordingEventSink::new();
        let driver = LoopbackPortDriver::new("Dummy", true, true);
        let mut dummy = Device::placeholder(DeviceId::new(0), "Dummy", Box::new(driver.clone()));
        dummy.check_capable(None, &sink);
        driver.reset_counters();
        assert_eq!(dummy.set_active(Direction::Input, true, None, &sink), Ok(false));
        assert_eq!(driver.open_calls(), 0);
    }

    #[test]
    fn check_capable_restores_active_directions() {
        let sink = RecordingEventSink::new();
        let (mut device, driver) = device(true, true);
        device
            .set_active(Direction::Input, true, None, &sink)
            .expect("activate");

        device.check_capable(None, &sink);

        assert!(device.is_capable(Direction::Input));
        assert!(device.is_capable(Direction::Output));
        assert!(device.is_active(Direction::Input));
        assert!(!device.is_active(Direction::Output));
        assert!(driver.is_port_open(Direction::Input));
        assert!(!driver.is_port_open(Direction::Output));
        assert!(driver.close_calls() >= 2);
    }

    #[test]
    fn check_capable_restores_after_driver_panic() {
        let sink = RecordingEventSink::new();
        let inner = LoopbackPortDriver::new("Synth", true, true);
        let armed = Arc::new(AtomicBool::new(false));
        let mut device = Device::new(
            DeviceId::new(1),
            "Synth",
            Box::new(FaultyDriver {
                inner: inner.clone(),
                armed: armed.clone(),
            }),
        );
        device.check_capable(None, &sink);
        device
            .set_active(Direction::Input, true, None, &sink)
            .expect("activate");

        armed.store(true, Ordering::SeqCst);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| device.check_capable(None, &sink)));

        assert!(outcome.is_err());
        assert!(device.is_active(Direction::Input));
        assert!(!device.is_active(Direction::Output));
        assert_eq!(device.active_mask(), 0b01);
        assert!(inner.is_port_open(Direction::Input));
        assert!(!inner.is_port_open(Direction::Output));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn check_capable_drops_lost_direction() {
        let sink = RecordingEventSink::new();
        let (mut device, driver) = device(true, true);
        device.set_active(Direction::Output, true, None, &sink).expect("activate");

        driver.set_capable(Direction::Output, false);
        device.check_capable(None, &sink);

        assert!(!device.is_capable(Direction::Output));
        assert!(!device.is_active(Direction::Output));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn activation_refreshes_first_message_bindings_only() {
        let sink = RecordingEventSink::new();
        let (mut device, _) = device(true, true);
        let mut graph = BindingGraph::new();
        graph.push(
            BindingCollection::new("Main")
                .with_binding(Binding::new("lead", vec![Message::new("Synth")]))
                .with_binding(Binding::new(
                    "trailing",
                    vec![Message::new("Pads"), Message::new("Pads"), Message::new("Synth")],
                )),
        );

        device
            .set_active(Direction::Input, true, Some(&mut graph), &sink)
            .expect("activate");
        device
            .set_active(Direction::Input, false, Some(&mut graph), &sink)
            .expect("deactivate");

        assert_eq!(graph.binding("lead").unwrap().refresh_count(), 1);
        assert_eq!(graph.binding("trailing").unwrap().refresh_count(), 0);
    }

    #[test]
    fn record_reflects_current_state() {
        let sink = RecordingEventSink::new();
        let (mut device, _) = device(true, true);
        assert_eq!(device.to_record(), DeviceRecord::named("Synth"));

        device.update(
            &DeviceRecord {
                name: "Synth".into(),
                active: 2,
                thru: "Mixer".into(),
            },
            None,
            &sink,
        );
        let record = device.to_record();
        assert_eq!(record.active, 2);
        assert_eq!(record.thru, "Mixer");
    }
}
