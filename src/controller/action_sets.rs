//! Action set controller
//!
//! Switch requests are validated against the manifest right away but only
//! queued on the device; [`ActionSetController::apply`] commits them at the
//! start of the next poll cycle. The native layer is re-synchronised every
//! cycle (base set, then layers in ascending precedence) so a device that
//! lost its activation natively gets it back.

use super::{ControllerState, DeviceStates, LogicalDeviceId};
use crate::error::{InputError, UnknownActionSetError};
use crate::manifest::{ActionManifest, ActionSelection};
use crate::native::{read_action, ControllerHandle, NativeError, NativeInput};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ActionSetController {
    manifest: Arc<ActionManifest>,
    default_set: String,
}

impl ActionSetController {
    /// Uses `default_set`, or the first declared set when `None`.
    pub fn new(
        manifest: Arc<ActionManifest>,
        default_set: Option<&str>,
    ) -> Result<Self, UnknownActionSetError> {
        let default_set = match default_set {
            Some(name) => manifest.check_set(name)?.name.clone(),
            None => manifest
                .default_set()
                .map(|set| set.name.clone())
                .ok_or_else(|| UnknownActionSetError {
                    name: String::new(),
                })?,
        };
        debug!("Default action set is {}", default_set);
        Ok(Self {
            manifest,
            default_set,
        })
    }

    pub fn default_set(&self) -> &str {
        &self.default_set
    }

    /// Creates the state for a newly attached device on the default set.
    pub fn on_attached(
        &self,
        states: &mut DeviceStates,
        device: LogicalDeviceId,
        handle: ControllerHandle,
    ) {
        states.insert(
            device,
            ControllerState::new(handle, ActionSelection::base(&self.default_set)),
        );
    }

    pub fn on_detached(&self, states: &mut DeviceStates, device: LogicalDeviceId) {
        if states.remove(device).is_some() {
            debug!("Purged state of device {}", device);
        }
    }

    /// Queues `set` plus `layers` (in order) for `device`.
    pub fn switch_to(
        &self,
        states: &mut DeviceStates,
        device: LogicalDeviceId,
        set: &str,
        layers: &[&str],
    ) -> Result<(), InputError> {
        self.manifest.check_set(set)?;
        for layer in layers {
            self.manifest.check_layer(set, layer)?;
        }
        let state = states.get_mut(device)?;

        let selection = ActionSelection::new(set, layers.iter().map(|l| l.to_string()).collect());
        info!(
            "Device {} switching to action set {} with layers {:?}",
            device, selection.set, selection.layers
        );
        state.pending = Some(selection);
        Ok(())
    }

    /// Queues `layer` on top of the requested stack; an active layer moves to the top.
    pub fn push_layer(
        &self,
        states: &mut DeviceStates,
        device: LogicalDeviceId,
        layer: &str,
    ) -> Result<(), InputError> {
        let state = states.get_mut(device)?;
        let mut selection = state.requested().clone();
        self.manifest.check_layer(&selection.set, layer)?;

        selection.layers.retain(|active| active != layer);
        selection.layers.push(layer.to_string());
        info!("Device {} pushing layer {}", device, layer);
        state.pending = Some(selection);
        Ok(())
    }

    /// Queues removal of `layer`. Removing a layer that is not active is a no-op.
    pub fn remove_layer(
        &self,
        states: &mut DeviceStates,
        device: LogicalDeviceId,
        layer: &str,
    ) -> Result<(), InputError> {
        let state = states.get_mut(device)?;
        let mut selection = state.requested().clone();
        self.manifest.check_layer(&selection.set, layer)?;

        if !selection.layers.iter().any(|active| active == layer) {
            debug!("Layer {} not active on device {}", layer, device);
            return Ok(());
        }
        selection.layers.retain(|active| active != layer);
        info!("Device {} removing layer {}", device, layer);
        state.pending = Some(selection);
        Ok(())
    }

    /// Commits queued selections and activates every device's selection natively.
    ///
    /// Returns the devices whose native activation failed.
    pub fn apply(
        &self,
        states: &mut DeviceStates,
        native: &mut dyn NativeInput,
    ) -> Vec<(LogicalDeviceId, NativeError)> {
        let mut failures = Vec::new();

        for (device, state) in states.iter_mut() {
            if let Some(selection) = state.pending.take() {
                state.relevant = self.manifest.resolve(&selection);
                state.selection = selection;
                state.retain_relevant();
                debug!(
                    "Device {} now polls {} actions under {}",
                    device,
                    state.relevant.len(),
                    state.selection.set
                );
            }

            if let Err(err) = self.activate(state, native) {
                failures.push((device, err));
            }
        }

        failures
    }

    /// Activates the default set on `handle` and reads every action in it,
    /// as the first frame after an attach would.
    pub fn trial_read(
        &self,
        native: &mut dyn NativeInput,
        handle: ControllerHandle,
    ) -> Result<(), NativeError> {
        let state = ControllerState::new(handle, ActionSelection::base(&self.default_set));
        self.activate(&state, native)?;
        for action in self.manifest.resolve(state.selection()) {
            read_action(native, handle, action.handle, action.kind)?;
        }
        Ok(())
    }

    fn activate(
        &self,
        state: &ControllerState,
        native: &mut dyn NativeInput,
    ) -> Result<(), NativeError> {
        let set = self.manifest.check_set(&state.selection.set).map_err(|err| {
            NativeError::CallFailed(err.to_string())
        })?;
        native.activate_action_set(state.handle, set.handle)?;
        native.deactivate_all_layers(state.handle)?;
        for layer in self.manifest.layer_stack(&state.selection) {
            native.activate_layer(state.handle, layer.handle)?;
        }
        Ok(())
    }
}
