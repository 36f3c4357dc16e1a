//! Desktop gamepads through `gilrs`.
//!
//! `gilrs` has no notion of actions, so this backend carries its own native
//! manifest: a binding table from action name to a gilrs control name
//! (`"South"`, `"RightTrigger2"`, `"LeftStick"`, ...). Action sets and
//! layers are accepted by name and only tracked, since every binding is
//! live regardless of the active set. Motion is not available.

use super::{
    ActionHandle, ActionKind, ActionOrigin, ActionSetHandle, AnalogSample, ControllerHandle,
    ControllerType, HapticPad, MotionSample, NativeError, NativeInput,
};
use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Replay, Ticks};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

// Physical control an action is bound to
#[derive(Debug, Clone, Copy, PartialEq)]
enum GilrsControl {
    Button(Button),
    Axis(Axis),
    Stick { x: Axis, y: Axis },
}

#[derive(Debug, Clone)]
struct GilrsBinding {
    action: String,
    control_name: String,
    control: GilrsControl,
}

/// `NativeInput` over `gilrs`.
pub struct GilrsInput {
    gilrs: Option<Gilrs>,
    bindings: Vec<GilrsBinding>,
    action_sets: Vec<String>,
    gamepads: HashMap<ControllerHandle, GamepadId>,
    active_sets: HashMap<ControllerHandle, (ActionSetHandle, Vec<ActionSetHandle>)>,
    effects: HashMap<(ControllerHandle, HapticPad), Effect>,
}

impl GilrsInput {
    /// Builds the backend from `action name -> control name` bindings.
    ///
    /// Unknown control names are skipped with a warning; the manifest loader
    /// then reports the affected actions as unresolvable.
    pub fn new(bindings: &BTreeMap<String, String>) -> Self {
        let bindings = bindings
            .iter()
            .filter_map(|(action, control_name)| match parse_control(control_name) {
                Some(control) => {
                    debug!("Bound action {} to gilrs control {}", action, control_name);
                    Some(GilrsBinding {
                        action: action.clone(),
                        control_name: control_name.clone(),
                        control,
                    })
                }
                None => {
                    warn!(
                        "Ignoring binding {} -> {}: unknown gilrs control",
                        action, control_name
                    );
                    None
                }
            })
            .collect::<Vec<_>>();

        info!("Created gilrs backend with {} bindings", bindings.len());
        Self {
            gilrs: None,
            bindings,
            action_sets: Vec::new(),
            gamepads: HashMap::new(),
            active_sets: HashMap::new(),
            effects: HashMap::new(),
        }
    }

    fn gilrs(&self) -> Result<&Gilrs, NativeError> {
        self.gilrs
            .as_ref()
            .ok_or_else(|| NativeError::Unavailable("gilrs not initialized".to_string()))
    }

    fn gamepad(&self, controller: ControllerHandle) -> Result<Gamepad<'_>, NativeError> {
        let id = self
            .gamepads
            .get(&controller)
            .copied()
            .ok_or(NativeError::Disconnected(controller))?;
        self.gilrs()?
            .connected_gamepad(id)
            .ok_or(NativeError::Disconnected(controller))
    }

    fn binding(&self, action: ActionHandle) -> Result<&GilrsBinding, NativeError> {
        (action.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.bindings.get(index))
            .ok_or_else(|| NativeError::CallFailed(format!("invalid action handle {}", action.0)))
    }
}

impl NativeInput for GilrsInput {
    fn init(&mut self) -> Result<(), NativeError> {
        info!("Initializing gilrs controller interface");
        match Gilrs::new() {
            Ok(gilrs) => {
                info!("Successfully initialized gilrs");
                self.gilrs = Some(gilrs);
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                Err(NativeError::Unavailable(e.to_string()))
            }
        }
    }

    fn shutdown(&mut self) {
        info!("Shutting down gilrs backend");
        self.effects.clear();
        self.gamepads.clear();
        self.active_sets.clear();
        self.gilrs = None;
    }

    fn run_frame(&mut self) {
        let Some(gilrs) = self.gilrs.as_mut() else {
            return;
        };

        // Drain the queue so gilrs updates its cached gamepad state
        while let Some(Event { id, event, .. }) = gilrs.next_event() {
            match event {
                EventType::Connected => info!("Gamepad {} connected", id),
                EventType::Disconnected => warn!("Gamepad {} disconnected", id),
                _ => debug!("gilrs event on {}: {:?}", id, event),
            }
        }
    }

    fn connected_controllers(&mut self) -> Result<Vec<ControllerHandle>, NativeError> {
        let gilrs = self
            .gilrs
            .as_ref()
            .ok_or_else(|| NativeError::Unavailable("gilrs not initialized".to_string()))?;

        let connected = gilrs
            .gamepads()
            .map(|(id, _)| (ControllerHandle(usize::from(id) as u64), id))
            .collect::<Vec<_>>();

        self.gamepads = connected.iter().copied().collect();
        Ok(connected.into_iter().map(|(handle, _)| handle).collect())
    }

    fn controller_type(&self, controller: ControllerHandle) -> ControllerType {
        match self.gamepad(controller) {
            Ok(gamepad) => classify(gamepad.vendor_id(), gamepad.product_id()),
            Err(_) => ControllerType::Unknown,
        }
    }

    fn action_set_handle(&mut self, name: &str) -> Option<ActionSetHandle> {
        let index = match self.action_sets.iter().position(|set| set == name) {
            Some(index) => index,
            None => {
                self.action_sets.push(name.to_string());
                self.action_sets.len() - 1
            }
        };
        Some(ActionSetHandle(index as u64 + 1))
    }

    fn action_handle(&mut self, name: &str, kind: ActionKind) -> Option<ActionHandle> {
        let index = self.bindings.iter().position(|b| b.action == name)?;
        let fits = match (kind, self.bindings[index].control) {
            (ActionKind::Digital, GilrsControl::Button(_)) => true,
            (ActionKind::Analog, GilrsControl::Button(_) | GilrsControl::Axis(_)) => true,
            (ActionKind::Joystick, GilrsControl::Stick { .. }) => true,
            _ => false,
        };

        if !fits {
            warn!(
                "Binding for {} ({}) cannot serve a {} action",
                name, self.bindings[index].control_name, kind
            );
            return None;
        }
        Some(ActionHandle(index as u64 + 1))
    }

    fn activate_action_set(
        &mut self,
        controller: ControllerHandle,
        set: ActionSetHandle,
    ) -> Result<(), NativeError> {
        self.gamepad(controller)?;
        self.active_sets
            .entry(controller)
            .and_modify(|(active, _)| *active = set)
            .or_insert((set, Vec::new()));
        Ok(())
    }

    fn deactivate_all_layers(&mut self, controller: ControllerHandle) -> Result<(), NativeError> {
        self.gamepad(controller)?;
        if let Some((_, layers)) = self.active_sets.get_mut(&controller) {
            layers.clear();
        }
        Ok(())
    }

    fn activate_layer(
        &mut self,
        controller: ControllerHandle,
        layer: ActionSetHandle,
    ) -> Result<(), NativeError> {
        self.gamepad(controller)?;
        if let Some((_, layers)) = self.active_sets.get_mut(&controller) {
            layers.retain(|active| *active != layer);
            layers.push(layer);
        }
        Ok(())
    }

    fn digital_state(
        &mut self,
        controller: ControllerHandle,
        action: ActionHandle,
    ) -> Result<bool, NativeError> {
        let binding = self.binding(action)?;
        let gamepad = self.gamepad(controller)?;
        match binding.control {
            GilrsControl::Button(button) => Ok(gamepad.is_pressed(button)),
            _ => Err(NativeError::CallFailed(format!(
                "{} is not a button",
                binding.control_name
            ))),
        }
    }

    fn analog_state(
        &mut self,
        controller: ControllerHandle,
        action: ActionHandle,
    ) -> Result<AnalogSample, NativeError> {
        let binding = self.binding(action)?;
        let gamepad = self.gamepad(controller)?;
        let sample = match binding.control {
            GilrsControl::Button(button) => AnalogSample::new(
                gamepad
                    .button_data(button)
                    .map(|data| data.value())
                    .unwrap_or(0.0),
                0.0,
            ),
            GilrsControl::Axis(axis) => AnalogSample::new(gamepad.value(axis), 0.0),
            GilrsControl::Stick { x, y } => AnalogSample::new(gamepad.value(x), gamepad.value(y)),
        };
        Ok(sample)
    }

    fn motion_state(
        &mut self,
        controller: ControllerHandle,
        _action: ActionHandle,
    ) -> Result<MotionSample, NativeError> {
        self.gamepad(controller)?;
        Ok(MotionSample::default())
    }

    fn action_origins(
        &mut self,
        _controller: ControllerHandle,
        _set: ActionSetHandle,
        action: ActionHandle,
    ) -> Vec<ActionOrigin> {
        self.binding(action)
            .map(|binding| vec![ActionOrigin::new(binding.control_name.clone())])
            .unwrap_or_default()
    }

    fn origin_glyph(
        &self,
        _origin: &ActionOrigin,
        _controller_type: ControllerType,
    ) -> Option<String> {
        None
    }

    fn trigger_haptic_pulse(
        &mut self,
        controller: ControllerHandle,
        pad: HapticPad,
        duration_us: u16,
    ) -> Result<(), NativeError> {
        let id = {
            let gamepad = self.gamepad(controller)?;
            if !gamepad.is_ff_supported() {
                debug!("Gamepad {} has no force feedback", controller);
                return Ok(());
            }
            gamepad.id()
        };

        let kind = match pad {
            HapticPad::Left => BaseEffectType::Strong {
                magnitude: u16::MAX,
            },
            HapticPad::Right => BaseEffectType::Weak {
                magnitude: u16::MAX,
            },
        };
        let duration_ms = (u32::from(duration_us) / 1000).max(1);

        let gilrs = self
            .gilrs
            .as_mut()
            .ok_or_else(|| NativeError::Unavailable("gilrs not initialized".to_string()))?;
        let effect = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind,
                scheduling: Replay {
                    play_for: Ticks::from_ms(duration_ms),
                    ..Default::default()
                },
                envelope: Default::default(),
            })
            .gamepads(&[id])
            .finish(gilrs)
            .map_err(|e| NativeError::CallFailed(e.to_string()))?;
        effect
            .play()
            .map_err(|e| NativeError::CallFailed(e.to_string()))?;

        // Dropping an effect stops it, so keep the latest one per pad alive
        self.effects.insert((controller, pad), effect);
        Ok(())
    }
}

fn parse_control(name: &str) -> Option<GilrsControl> {
    let button = match name {
        "South" | "A" => Some(Button::South),
        "East" | "B" => Some(Button::East),
        "North" | "X" => Some(Button::North),
        "West" | "Y" => Some(Button::West),
        "C" => Some(Button::C),
        "Z" => Some(Button::Z),
        "LeftTrigger" | "LeftBumper" => Some(Button::LeftTrigger),
        "LeftTrigger2" => Some(Button::LeftTrigger2),
        "RightTrigger" | "RightBumper" => Some(Button::RightTrigger),
        "RightTrigger2" => Some(Button::RightTrigger2),
        "Select" => Some(Button::Select),
        "Start" => Some(Button::Start),
        "Mode" | "Guide" => Some(Button::Mode),
        "LeftThumb" => Some(Button::LeftThumb),
        "RightThumb" => Some(Button::RightThumb),
        "DPadUp" => Some(Button::DPadUp),
        "DPadDown" => Some(Button::DPadDown),
        "DPadLeft" => Some(Button::DPadLeft),
        "DPadRight" => Some(Button::DPadRight),
        _ => None,
    };
    if let Some(button) = button {
        return Some(GilrsControl::Button(button));
    }

    let control = match name {
        "LeftStickX" => GilrsControl::Axis(Axis::LeftStickX),
        "LeftStickY" => GilrsControl::Axis(Axis::LeftStickY),
        "LeftZ" => GilrsControl::Axis(Axis::LeftZ),
        "RightStickX" => GilrsControl::Axis(Axis::RightStickX),
        "RightStickY" => GilrsControl::Axis(Axis::RightStickY),
        "RightZ" => GilrsControl::Axis(Axis::RightZ),
        "DPadX" => GilrsControl::Axis(Axis::DPadX),
        "DPadY" => GilrsControl::Axis(Axis::DPadY),
        "LeftStick" => GilrsControl::Stick {
            x: Axis::LeftStickX,
            y: Axis::LeftStickY,
        },
        "RightStick" => GilrsControl::Stick {
            x: Axis::RightStickX,
            y: Axis::RightStickY,
        },
        "DPad" => GilrsControl::Stick {
            x: Axis::DPadX,
            y: Axis::DPadY,
        },
        _ => return None,
    };
    Some(control)
}

// USB vendor/product ids of the common controller families
fn classify(vendor: Option<u16>, product: Option<u16>) -> ControllerType {
    match (vendor, product) {
        (Some(0x28de), Some(0x1205)) => ControllerType::SteamDeck,
        (Some(0x28de), _) => ControllerType::SteamController,
        (Some(0x045e), Some(0x028e)) => ControllerType::Xbox360,
        (Some(0x045e), _) => ControllerType::XboxOne,
        (Some(0x054c), Some(0x0ce6 | 0x0df2)) => ControllerType::PS5,
        (Some(0x054c), _) => ControllerType::PS4,
        (Some(0x057e), _) => ControllerType::SwitchPro,
        (Some(_), _) => ControllerType::Generic,
        (None, _) => ControllerType::Unknown,
    }
}
