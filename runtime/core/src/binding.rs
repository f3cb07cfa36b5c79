//! Binding graph: collections of bindings, each an ordered list of messages
//! that refer to devices by name.
//!
//! A message keeps the device name as its durable key and a [`DeviceId`]
//! handle as a cache of the registry entry carrying that name. The walks at
//! the bottom of this module keep the two in step.

use config_validator::schema::{BindingSpec, CollectionSpec};

use crate::device::DeviceId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    device: Option<DeviceId>,
    device_name: String,
}

impl Message {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device: None,
            device_name: device_name.into(),
        }
    }

    pub fn device(&self) -> Option<DeviceId> {
        self.device
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Point the cached handle at `id`. An empty durable name adopts `name`.
    pub fn set_device(&mut self, id: DeviceId, name: &str) {
        self.device = Some(id);
        if self.device_name.is_empty() {
            self.device_name = name.to_string();
        }
    }

    pub fn clear_device(&mut self) {
        self.device = None;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Binding {
    name: String,
    messages: Vec<Message>,
    linked_device: Option<DeviceId>,
    refreshes: u64,
}

impl Binding {
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            linked_device: None,
            refreshes: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut [Message] {
        &mut self.messages
    }

    /// Device the binding is currently connected through, as of the last refresh.
    pub fn linked_device(&self) -> Option<DeviceId> {
        self.linked_device
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }

    /// Re-derive the connected device from the messages' handles.
    pub fn refresh(&mut self) {
        self.linked_device = self.messages.iter().find_map(Message::device);
        self.refreshes += 1;
        tracing::trace!(binding = %self.name, linked = ?self.linked_device, "binding refreshed");
    }
}

impl From<&BindingSpec> for Binding {
    fn from(spec: &BindingSpec) -> Self {
        Binding::new(
            spec.name.clone(),
            spec.messages
                .iter()
                .map(|message| Message::new(message.device.clone()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct BindingCollection {
    pub name: String,
    pub bindings: Vec<Binding>,
}

impl BindingCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }
}

impl From<&CollectionSpec> for BindingCollection {
    fn from(spec: &CollectionSpec) -> Self {
        Self {
            name: spec.name.clone(),
            bindings: spec.bindings.iter().map(Binding::from).collect(),
        }
    }
}

/// Which bindings a device change should refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Only bindings whose first message names the device. Used on activation.
    FirstMessage,
    /// Bindings where any message names the device. Used when the registry
    /// adds or updates a device.
    AnyMessage,
}

impl RefreshPolicy {
    fn selects(self, binding: &Binding, device_name: &str) -> bool {
        match self {
            RefreshPolicy::FirstMessage => binding
                .messages
                .first()
                .is_some_and(|message| message.device_name == device_name),
            RefreshPolicy::AnyMessage => binding
                .messages
                .iter()
                .any(|message| message.device_name == device_name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BindingGraph {
    collections: Vec<BindingCollection>,
}

impl BindingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[CollectionSpec]) -> Self {
        Self {
            collections: specs.iter().map(BindingCollection::from).collect(),
        }
    }

    pub fn push(&mut self, collection: BindingCollection) {
        self.collections.push(collection);
    }

    pub fn collections(&self) -> &[BindingCollection] {
        &self.collections
    }

    pub fn collections_mut(&mut self) -> &mut [BindingCollection] {
        &mut self.collections
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> + '_ {
        self.collections.iter().flat_map(|c| c.bindings.iter())
    }

    pub fn bindings_mut(&mut self) -> impl Iterator<Item = &mut Binding> + '_ {
        self.collections.iter_mut().flat_map(|c| c.bindings.iter_mut())
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> + '_ {
        self.bindings().flat_map(|b| b.messages.iter())
    }

    /// First binding called `name`, searching collections in order.
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings().find(|binding| binding.name == name)
    }

    /// Refresh every binding `policy` selects for `device_name`. Returns how
    /// many were refreshed.
    pub fn refresh_bindings(&mut self, device_name: &str, policy: RefreshPolicy) -> usize {
        let mut refreshed = 0;
        for binding in self.bindings_mut() {
            if policy.selects(binding, device_name) {
                binding.refresh();
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Point stale message handles at device `id` named `device_name`.
    ///
    /// A message is repaired when its handle is unset or no longer resolves,
    /// when the handle resolves to a device called `device_name`, or when its
    /// durable name is `device_name`. `resolve` maps a live handle to its
    /// device name. Returns how many messages changed.
    pub fn repair_references<'n, F>(&mut self, device_name: &str, id: DeviceId, resolve: F) -> usize
    where
        F: Fn(DeviceId) -> Option<&'n str>,
    {
        let mut repaired = 0;
        for binding in self.bindings_mut() {
            for message in binding.messages.iter_mut() {
                let stale = match message.device.map(&resolve) {
                    None | Some(None) => true,
                    Some(Some(current)) => current == device_name,
                };
                if (stale || message.device_name == device_name) && message.device != Some(id) {
                    message.set_device(id, device_name);
                    repaired += 1;
                }
            }
        }
        repaired
    }
}
