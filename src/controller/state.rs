//! Per-device state arena.

use super::LogicalDeviceId;
use crate::error::UnknownControllerError;
use crate::manifest::{ActionSelection, ResolvedAction};
use crate::native::{AnalogSample, ControllerHandle, MotionSample};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Everything the bridge remembers about one attached controller.
///
/// `selection` always names a set declared in the manifest. The previous-value
/// maps only ever hold actions relevant under the committed selection.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub handle: ControllerHandle,
    pub(crate) selection: ActionSelection,
    pub(crate) pending: Option<ActionSelection>,
    pub(crate) relevant: Vec<ResolvedAction>,
    pub(crate) digital: HashMap<String, bool>,
    /// Last emitted value per analog/joystick action.
    pub(crate) analog: HashMap<String, AnalogSample>,
    /// Last emitted value per motion action.
    pub(crate) motion: HashMap<String, MotionSample>,
    /// Next key-repeat deadline per held digital action.
    pub(crate) repeat_at: HashMap<String, Duration>,
}

impl ControllerState {
    /// A fresh state whose `selection` is applied at the next poll cycle.
    pub fn new(handle: ControllerHandle, selection: ActionSelection) -> Self {
        Self {
            handle,
            selection: selection.clone(),
            pending: Some(selection),
            relevant: Vec::new(),
            digital: HashMap::new(),
            analog: HashMap::new(),
            motion: HashMap::new(),
            repeat_at: HashMap::new(),
        }
    }

    /// Committed selection.
    pub fn selection(&self) -> &ActionSelection {
        &self.selection
    }

    /// Selection that will be committed at the next poll cycle, if any.
    pub fn pending(&self) -> Option<&ActionSelection> {
        self.pending.as_ref()
    }

    /// Pending selection if one is queued, the committed one otherwise.
    pub fn requested(&self) -> &ActionSelection {
        self.pending.as_ref().unwrap_or(&self.selection)
    }

    pub fn relevant_actions(&self) -> &[ResolvedAction] {
        &self.relevant
    }

    pub fn is_pressed(&self, action: &str) -> bool {
        self.digital.get(action).copied().unwrap_or(false)
    }

    /// Drops diff state for actions that are no longer relevant.
    pub(crate) fn retain_relevant(&mut self) {
        let relevant = &self.relevant;
        let in_scope = |name: &String| relevant.iter().any(|action| action.name == *name);
        self.digital.retain(|name, _| in_scope(name));
        self.analog.retain(|name, _| in_scope(name));
        self.motion.retain(|name, _| in_scope(name));
        self.repeat_at.retain(|name, _| in_scope(name));
    }
}

/// Arena of controller states keyed by logical device id.
///
/// Iteration is in ascending id order, which is the order the poller
/// emits per-device events in.
#[derive(Debug, Default)]
pub struct DeviceStates {
    states: BTreeMap<LogicalDeviceId, ControllerState>,
}

impl DeviceStates {
    pub fn insert(&mut self, device: LogicalDeviceId, state: ControllerState) {
        self.states.insert(device, state);
    }

    pub fn remove(&mut self, device: LogicalDeviceId) -> Option<ControllerState> {
        self.states.remove(&device)
    }

    pub fn get(&self, device: LogicalDeviceId) -> Result<&ControllerState, UnknownControllerError> {
        self.states
            .get(&device)
            .ok_or(UnknownControllerError::Device(device))
    }

    pub fn get_mut(
        &mut self,
        device: LogicalDeviceId,
    ) -> Result<&mut ControllerState, UnknownControllerError> {
        self.states
            .get_mut(&device)
            .ok_or(UnknownControllerError::Device(device))
    }

    pub fn contains(&self, device: LogicalDeviceId) -> bool {
        self.states.contains_key(&device)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalDeviceId, &ControllerState)> {
        self.states.iter().map(|(device, state)| (*device, state))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (LogicalDeviceId, &mut ControllerState)> {
        self.states.iter_mut().map(|(device, state)| (*device, state))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
