//! Scriptable in-memory controllers.
//!
//! [`VirtualInput`] is cheap to clone and every clone shares the same state,
//! so a test (or a headless host) can keep one copy for scripting while the
//! bridge owns another. The native manifest is declared up front with
//! [`VirtualInput::declare_action_set`] and [`VirtualInput::declare_action`].

use super::{
    ActionHandle, ActionKind, ActionOrigin, ActionSetHandle, AnalogSample, ControllerHandle,
    ControllerType, HapticPad, MotionSample, NativeError, NativeInput,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct VirtualController {
    handle: ControllerHandle,
    controller_type: Option<ControllerType>,
    digital: HashMap<String, bool>,
    analog: HashMap<String, AnalogSample>,
    motion: HashMap<String, MotionSample>,
    failing: bool,
    active_set: Option<ActionSetHandle>,
    layers: Vec<ActionSetHandle>,
}

#[derive(Debug, Default)]
struct VirtualState {
    init_failure: Option<String>,
    initialized: bool,
    shutdown_calls: usize,
    frames: u64,
    action_sets: Vec<String>,
    actions: Vec<(String, ActionKind)>,
    controllers: Vec<VirtualController>,
    origins: HashMap<String, Vec<ActionOrigin>>,
    glyphs: HashMap<(String, ControllerType), String>,
    haptics: Vec<(ControllerHandle, HapticPad, u16)>,
}

impl VirtualState {
    fn controller(&self, handle: ControllerHandle) -> Result<&VirtualController, NativeError> {
        let controller = self
            .controllers
            .iter()
            .find(|c| c.handle == handle)
            .ok_or(NativeError::Disconnected(handle))?;

        if controller.failing {
            return Err(NativeError::ReadFailed {
                controller: handle,
                reason: "scripted read failure".to_string(),
            });
        }
        Ok(controller)
    }

    fn controller_mut(
        &mut self,
        handle: ControllerHandle,
    ) -> Result<&mut VirtualController, NativeError> {
        self.controllers
            .iter_mut()
            .find(|c| c.handle == handle)
            .ok_or(NativeError::Disconnected(handle))
    }

    fn action_name(&self, action: ActionHandle) -> Result<&str, NativeError> {
        let index = (action.0 as usize)
            .checked_sub(1)
            .ok_or_else(|| NativeError::CallFailed(format!("invalid action handle {}", action.0)))?;
        self.actions
            .get(index)
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| NativeError::CallFailed(format!("invalid action handle {}", action.0)))
    }

    fn set_name(&self, set: ActionSetHandle) -> Option<&str> {
        (set.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.action_sets.get(index))
            .map(String::as_str)
    }
}

/// In-memory native layer with shared, scriptable state.
#[derive(Debug, Clone, Default)]
pub struct VirtualInput {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `init` fail with `reason`.
    pub fn fail_init(&self, reason: impl Into<String>) {
        self.state().init_failure = Some(reason.into());
    }

    pub fn declare_action_set(&self, name: impl Into<String>) -> &Self {
        let name = name.into();
        let mut state = self.state();
        if !state.action_sets.contains(&name) {
            state.action_sets.push(name);
        }
        drop(state);
        self
    }

    pub fn declare_action(&self, name: impl Into<String>, kind: ActionKind) -> &Self {
        let name = name.into();
        let mut state = self.state();
        if !state.actions.iter().any(|(existing, _)| *existing == name) {
            state.actions.push((name, kind));
        }
        drop(state);
        self
    }

    /// Plugs in a controller. Re-connecting a known handle is a no-op.
    pub fn connect(&self, handle: ControllerHandle, controller_type: ControllerType) {
        let mut state = self.state();
        if state.controllers.iter().any(|c| c.handle == handle) {
            return;
        }
        debug!("Virtual controller {} connected", handle);
        state.controllers.push(VirtualController {
            handle,
            controller_type: Some(controller_type),
            ..Default::default()
        });
    }

    pub fn disconnect(&self, handle: ControllerHandle) {
        debug!("Virtual controller {} disconnected", handle);
        self.state().controllers.retain(|c| c.handle != handle);
    }

    pub fn set_controller_type(&self, handle: ControllerHandle, controller_type: ControllerType) {
        if let Ok(controller) = self.state().controller_mut(handle) {
            controller.controller_type = Some(controller_type);
        }
    }

    pub fn set_digital(&self, handle: ControllerHandle, action: &str, pressed: bool) {
        if let Ok(controller) = self.state().controller_mut(handle) {
            controller.digital.insert(action.to_string(), pressed);
        }
    }

    pub fn set_analog(&self, handle: ControllerHandle, action: &str, x: f32, y: f32) {
        if let Ok(controller) = self.state().controller_mut(handle) {
            controller
                .analog
                .insert(action.to_string(), AnalogSample::new(x, y));
        }
    }

    pub fn set_motion(&self, handle: ControllerHandle, action: &str, sample: MotionSample) {
        if let Ok(controller) = self.state().controller_mut(handle) {
            controller.motion.insert(action.to_string(), sample);
        }
    }

    /// Makes every read on `handle` fail until cleared, while it stays enumerated.
    pub fn fail_reads(&self, handle: ControllerHandle, failing: bool) {
        if let Ok(controller) = self.state().controller_mut(handle) {
            controller.failing = failing;
        }
    }

    pub fn set_origins(&self, action: &str, origins: Vec<ActionOrigin>) {
        self.state().origins.insert(action.to_string(), origins);
    }

    pub fn set_glyph(
        &self,
        origin: &str,
        controller_type: ControllerType,
        glyph: impl Into<String>,
    ) {
        self.state()
            .glyphs
            .insert((origin.to_string(), controller_type), glyph.into());
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    pub fn shutdown_calls(&self) -> usize {
        self.state().shutdown_calls
    }

    pub fn frames(&self) -> u64 {
        self.state().frames
    }

    /// Name of the action set the native layer has active on `handle`.
    pub fn active_action_set(&self, handle: ControllerHandle) -> Option<String> {
        let state = self.state();
        let controller = state.controllers.iter().find(|c| c.handle == handle)?;
        let set = controller.active_set?;
        state.set_name(set).map(str::to_string)
    }

    /// Names of the layers active on `handle`, in activation order.
    pub fn active_layers(&self, handle: ControllerHandle) -> Vec<String> {
        let state = self.state();
        state
            .controllers
            .iter()
            .find(|c| c.handle == handle)
            .map(|controller| {
                controller
                    .layers
                    .iter()
                    .filter_map(|layer| state.set_name(*layer).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn haptic_pulses(&self) -> Vec<(ControllerHandle, HapticPad, u16)> {
        self.state().haptics.clone()
    }
}

impl NativeInput for VirtualInput {
    fn init(&mut self) -> Result<(), NativeError> {
        let mut state = self.state();
        if let Some(reason) = state.init_failure.take() {
            return Err(NativeError::Unavailable(reason));
        }
        state.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut state = self.state();
        state.initialized = false;
        state.shutdown_calls += 1;
    }

    fn run_frame(&mut self) {
        self.state().frames += 1;
    }

    fn connected_controllers(&mut self) -> Result<Vec<ControllerHandle>, NativeError> {
        let state = self.state();
        if !state.initialized {
            return Err(NativeError::Unavailable("not initialized".to_string()));
        }
        Ok(state.controllers.iter().map(|c| c.handle).collect())
    }

    fn controller_type(&self, controller: ControllerHandle) -> ControllerType {
        self.state()
            .controllers
            .iter()
            .find(|c| c.handle == controller)
            .and_then(|c| c.controller_type)
            .unwrap_or(ControllerType::Unknown)
    }

    fn action_set_handle(&mut self, name: &str) -> Option<ActionSetHandle> {
        self.state()
            .action_sets
            .iter()
            .position(|set| set == name)
            .map(|index| ActionSetHandle(index as u64 + 1))
    }

    fn action_handle(&mut self, name: &str, kind: ActionKind) -> Option<ActionHandle> {
        self.state()
            .actions
            .iter()
            .position(|(action, declared)| action == name && *declared == kind)
            .map(|index| ActionHandle(index as u64 + 1))
    }

    fn activate_action_set(
        &mut self,
        controller: ControllerHandle,
        set: ActionSetHandle,
    ) -> Result<(), NativeError> {
        self.state().controller_mut(controller)?.active_set = Some(set);
        Ok(())
    }

    fn deactivate_all_layers(&mut self, controller: ControllerHandle) -> Result<(), NativeError> {
        self.state().controller_mut(controller)?.layers.clear();
        Ok(())
    }

    fn activate_layer(
        &mut self,
        controller: ControllerHandle,
        layer: ActionSetHandle,
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        let layers = &mut state.controller_mut(controller)?.layers;
        layers.retain(|active| *active != layer);
        layers.push(layer);
        Ok(())
    }

    fn digital_state(
        &mut self,
        controller: ControllerHandle,
        action: ActionHandle,
    ) -> Result<bool, NativeError> {
        let state = self.state();
        let name = state.action_name(action)?;
        let controller = state.controller(controller)?;
        Ok(controller.digital.get(name).copied().unwrap_or(false))
    }

    fn analog_state(
        &mut self,
        controller: ControllerHandle,
        action: ActionHandle,
    ) -> Result<AnalogSample, NativeError> {
        let state = self.state();
        let name = state.action_name(action)?;
        let controller = state.controller(controller)?;
        Ok(controller.analog.get(name).copied().unwrap_or_default())
    }

    fn motion_state(
        &mut self,
        controller: ControllerHandle,
        action: ActionHandle,
    ) -> Result<MotionSample, NativeError> {
        let state = self.state();
        let name = state.action_name(action)?;
        let controller = state.controller(controller)?;
        Ok(controller.motion.get(name).copied().unwrap_or_default())
    }

    fn action_origins(
        &mut self,
        _controller: ControllerHandle,
        _set: ActionSetHandle,
        action: ActionHandle,
    ) -> Vec<ActionOrigin> {
        let state = self.state();
        state
            .action_name(action)
            .ok()
            .and_then(|name| state.origins.get(name).cloned())
            .unwrap_or_default()
    }

    fn origin_glyph(
        &self,
        origin: &ActionOrigin,
        controller_type: ControllerType,
    ) -> Option<String> {
        self.state()
            .glyphs
            .get(&(origin.name.clone(), controller_type))
            .cloned()
    }

    fn trigger_haptic_pulse(
        &mut self,
        controller: ControllerHandle,
        pad: HapticPad,
        duration_us: u16,
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        state.controller(controller)?;
        state.haptics.push((controller, pad, duration_us));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted() -> VirtualInput {
        let input = VirtualInput::new();
        input
            .declare_action_set("Gameplay")
            .declare_action_set("Menu")
            .declare_action("Jump", ActionKind::Digital)
            .declare_action("Move", ActionKind::Joystick);
        input
    }

    #[test]
    fn clones_share_state() {
        let input = scripted();
        let mut native = input.clone();
        native.init().unwrap();

        input.connect(ControllerHandle(7), ControllerType::XboxOne);
        assert_eq!(
            native.connected_controllers().unwrap(),
            vec![ControllerHandle(7)]
        );
    }

    #[test]
    fn handles_require_matching_kind() {
        let mut native = scripted();
        assert_eq!(
            native.action_handle("Jump", ActionKind::Digital),
            Some(ActionHandle(1))
        );
        assert_eq!(native.action_handle("Jump", ActionKind::Analog), None);
        assert_eq!(native.action_set_handle("Menu"), Some(ActionSetHandle(2)));
        assert_eq!(native.action_set_handle("Combat"), None);
    }

    #[test]
    fn failing_controller_reports_read_error() {
        let input = scripted();
        let mut native = input.clone();
        native.init().unwrap();
        input.connect(ControllerHandle(1), ControllerType::PS5);
        input.fail_reads(ControllerHandle(1), true);

        let jump = native.action_handle("Jump", ActionKind::Digital).unwrap();
        assert!(matches!(
            native.digital_state(ControllerHandle(1), jump),
            Err(NativeError::ReadFailed { .. })
        ));
        assert_eq!(
            native.digital_state(ControllerHandle(2), jump),
            Err(NativeError::Disconnected(ControllerHandle(2)))
        );
    }

    #[test]
    fn layer_activation_moves_layer_to_top() {
        let input = scripted();
        let mut native = input.clone();
        native.init().unwrap();
        input.connect(ControllerHandle(1), ControllerType::SteamDeck);

        native
            .activate_layer(ControllerHandle(1), ActionSetHandle(1))
            .unwrap();
        native
            .activate_layer(ControllerHandle(1), ActionSetHandle(2))
            .unwrap();
        native
            .activate_layer(ControllerHandle(1), ActionSetHandle(1))
            .unwrap();

        assert_eq!(
            input.active_layers(ControllerHandle(1)),
            vec!["Menu".to_string(), "Gameplay".to_string()]
        );
    }
}
