//! Native controller API surface
//!
//! Everything above this module talks to controllers through [`NativeInput`].
//! The trait mirrors the shape of an action-based controller API: controllers
//! are enumerated as opaque [`ControllerHandle`]s, actions and action sets are
//! looked up by name once and then addressed by handle, and state is read per
//! controller per action.
//!
//! # Backends
//!
//! - [`gilrs_backend::GilrsInput`] - desktop gamepads through `gilrs`, with a
//!   binding table standing in for the native action manifest
//! - [`virtual_backend::VirtualInput`] - scriptable in-memory controllers used
//!   by tests and headless hosts
//!
//! All calls are synchronous and expected to return quickly. A call that
//! cannot complete is reported as a [`NativeError`] for that frame.

pub mod gilrs_backend;
pub mod virtual_backend;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier the native layer hands out for a physical controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControllerHandle(pub u64);

impl fmt::Display for ControllerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// Native handle of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionHandle(pub u64);

/// Native handle of an action set or action set layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionSetHandle(pub u64);

impl fmt::Display for ActionSetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// Kind of an action, which decides how it is read and diffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// On/off button.
    Digital,
    /// Single analog axis (trigger, throttle).
    Analog,
    /// Two analog axes (stick, trackpad, mouse-like input).
    Joystick,
    /// Orientation and acceleration sample.
    Motion,
}

impl ActionKind {
    pub fn is_two_dimensional(&self) -> bool {
        matches!(self, ActionKind::Joystick)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Digital => write!(f, "digital"),
            ActionKind::Analog => write!(f, "analog"),
            ActionKind::Joystick => write!(f, "joystick"),
            ActionKind::Motion => write!(f, "motion"),
        }
    }
}

/// Analog reading. One-dimensional actions only use `x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalogSample {
    pub x: f32,
    pub y: f32,
}

impl AnalogSample {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Largest per-axis absolute difference to `other`.
    pub fn max_delta(&self, other: &AnalogSample) -> f32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

/// Motion reading: orientation quaternion, linear acceleration, angular velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub rotation: [f32; 4],
    pub acceleration: [f32; 3],
    pub angular_velocity: [f32; 3],
}

impl Default for MotionSample {
    fn default() -> Self {
        Self {
            rotation: [0.0, 0.0, 0.0, 1.0],
            acceleration: [0.0; 3],
            angular_velocity: [0.0; 3],
        }
    }
}

impl MotionSample {
    /// Largest component-wise absolute difference to `other`.
    pub fn max_delta(&self, other: &MotionSample) -> f32 {
        let rotation = self.rotation.iter().zip(other.rotation.iter());
        let acceleration = self.acceleration.iter().zip(other.acceleration.iter());
        let angular = self
            .angular_velocity
            .iter()
            .zip(other.angular_velocity.iter());

        rotation
            .chain(acceleration)
            .chain(angular)
            .fold(0.0_f32, |acc, (a, b)| acc.max((a - b).abs()))
    }
}

/// A single action reading, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionValue {
    Digital(bool),
    Analog(AnalogSample),
    Motion(MotionSample),
}

/// Controller model as reported by the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerType {
    Unknown,
    SteamController,
    SteamDeck,
    Xbox360,
    XboxOne,
    PS4,
    PS5,
    SwitchPro,
    Generic,
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::str::FromStr for ControllerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let controller_type = match s {
            "Unknown" => ControllerType::Unknown,
            "SteamController" => ControllerType::SteamController,
            "SteamDeck" => ControllerType::SteamDeck,
            "Xbox360" => ControllerType::Xbox360,
            "XboxOne" => ControllerType::XboxOne,
            "PS4" => ControllerType::PS4,
            "PS5" => ControllerType::PS5,
            "SwitchPro" => ControllerType::SwitchPro,
            "Generic" => ControllerType::Generic,
            other => return Err(format!("unknown controller type {other}")),
        };
        Ok(controller_type)
    }
}

/// Physical control an action is bound to (e.g. `"South"`, `"LeftStick"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionOrigin {
    pub name: String,
}

impl ActionOrigin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Side of the controller a haptic pulse is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HapticPad {
    Left,
    Right,
}

/// Failures reported by a native backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NativeError {
    #[error("Native input layer unavailable: {0}")]
    Unavailable(String),

    #[error("Controller {0} disconnected")]
    Disconnected(ControllerHandle),

    #[error("Failed to read controller {controller}: {reason}")]
    ReadFailed {
        controller: ControllerHandle,
        reason: String,
    },

    #[error("Native call failed: {0}")]
    CallFailed(String),
}

/// Capability consumed by the session, registry, poller and action set controller.
pub trait NativeInput: Send {
    /// Starts the native session.
    fn init(&mut self) -> Result<(), NativeError>;

    /// Releases every native resource. Called at most once per successful `init`.
    fn shutdown(&mut self);

    /// Pumps the native layer once per frame, before enumeration.
    fn run_frame(&mut self) {}

    /// Currently attached controllers, in native enumeration order.
    fn connected_controllers(&mut self) -> Result<Vec<ControllerHandle>, NativeError>;

    fn controller_type(&self, controller: ControllerHandle) -> ControllerType;

    /// Looks up an action set or layer by name. `None` if the native manifest lacks it.
    fn action_set_handle(&mut self, name: &str) -> Option<ActionSetHandle>;

    /// Looks up an action by name. `None` if the native manifest lacks it or the kind does not fit.
    fn action_handle(&mut self, name: &str, kind: ActionKind) -> Option<ActionHandle>;

    fn activate_action_set(
        &mut self,
        controller: ControllerHandle,
        set: ActionSetHandle,
    ) -> Result<(), NativeError>;

    fn deactivate_all_layers(&mut self, controller: ControllerHandle) -> Result<(), NativeError>;

    fn activate_layer(
        &mut self,
        controller: ControllerHandle,
        layer: ActionSetHandle,
    ) -> Result<(), NativeError>;

    fn digital_state(
        &mut self,
        controller: ControllerHandle,
        action: ActionHandle,
    ) -> Result<bool, NativeError>;

    fn analog_state(
        &mut self,
        controller: ControllerHandle,
        action: ActionHandle,
    ) -> Result<AnalogSample, NativeError>;

    fn motion_state(
        &mut self,
        controller: ControllerHandle,
        action: ActionHandle,
    ) -> Result<MotionSample, NativeError>;

    /// Physical origins bound to `action` while `set` is active.
    fn action_origins(
        &mut self,
        controller: ControllerHandle,
        set: ActionSetHandle,
        action: ActionHandle,
    ) -> Vec<ActionOrigin>;

    /// Icon the native layer ships for an origin, if any.
    fn origin_glyph(&self, origin: &ActionOrigin, controller_type: ControllerType)
        -> Option<String>;

    fn trigger_haptic_pulse(
        &mut self,
        controller: ControllerHandle,
        pad: HapticPad,
        duration_us: u16,
    ) -> Result<(), NativeError>;
}

/// Reads one action, dispatching on its kind.
pub fn read_action(
    native: &mut dyn NativeInput,
    controller: ControllerHandle,
    action: ActionHandle,
    kind: ActionKind,
) -> Result<ActionValue, NativeError> {
    match kind {
        ActionKind::Digital => native
            .digital_state(controller, action)
            .map(ActionValue::Digital),
        ActionKind::Analog | ActionKind::Joystick => native
            .analog_state(controller, action)
            .map(ActionValue::Analog),
        ActionKind::Motion => native
            .motion_state(controller, action)
            .map(ActionValue::Motion),
    }
}
