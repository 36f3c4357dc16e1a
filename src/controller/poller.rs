//! Per-frame poller
//!
//! For every attached device (ascending id) the poller reads each action
//! relevant under the committed selection, then diffs against what it
//! remembers:
//!
//! - digital: `false -> true` is `Pressed`, `true -> false` is `Released`
//! - analog/joystick/motion: a change is emitted when any component moved by
//!   at least the kind's threshold since the last *emitted* value
//!
//! Reads happen before anything is generated. A device whose read fails is
//! skipped for the frame without touching its state and is reported back to
//! the caller for an immediate detach.

use super::{ControllerState, DeviceStates, LogicalDeviceId};
use crate::event::{EventValue, FrameEvents, FrameStamp, InputEvent, InputEventKind};
use crate::manifest::ResolvedAction;
use crate::native::{read_action, ActionKind, ActionValue, NativeError, NativeInput};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Held-button repeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRepeat {
    pub initial_delay: Duration,
    pub repeat_delay: Duration,
}

impl Default for KeyRepeat {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            repeat_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollerSettings {
    pub analog_threshold: f32,
    pub motion_threshold: f32,
    pub key_repeat: Option<KeyRepeat>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            analog_threshold: 0.05,
            motion_threshold: 0.01,
            key_repeat: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Poller {
    settings: PollerSettings,
}

impl Poller {
    pub fn new(settings: PollerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    /// Polls every device in `states`, appending events to `events`.
    ///
    /// Returns the devices whose reads failed; their state is unchanged.
    pub fn poll(
        &self,
        states: &mut DeviceStates,
        native: &mut dyn NativeInput,
        frame: FrameStamp,
        events: &mut FrameEvents,
    ) -> Vec<(LogicalDeviceId, NativeError)> {
        let mut failures = Vec::new();

        for (device, state) in states.iter_mut() {
            let readings = match Self::read_all(state, native) {
                Ok(readings) => readings,
                Err(err) => {
                    warn!("Poll of device {} failed: {}", device, err);
                    failures.push((device, err));
                    continue;
                }
            };

            let (device_events, commit) = self.diff(device, state, &readings, frame);
            commit.apply(state);
            events.extend(device_events);
        }

        failures
    }

    fn read_all(
        state: &ControllerState,
        native: &mut dyn NativeInput,
    ) -> Result<Vec<ActionValue>, NativeError> {
        state
            .relevant
            .iter()
            .map(|action| read_action(native, state.handle, action.handle, action.kind))
            .collect()
    }

    /// Generates this frame's events without mutating `state`.
    fn diff(
        &self,
        device: LogicalDeviceId,
        state: &ControllerState,
        readings: &[ActionValue],
        frame: FrameStamp,
    ) -> (FrameEvents, Commit) {
        let mut events = FrameEvents::default();
        let mut commit = Commit::default();

        for (action, value) in state.relevant.iter().zip(readings) {
            match *value {
                ActionValue::Digital(pressed) => {
                    self.diff_digital(device, state, action, pressed, frame, &mut events, &mut commit)
                }
                ActionValue::Analog(sample) => {
                    let baseline = state.analog.get(&action.name).copied().unwrap_or_default();
                    let delta = sample.max_delta(&baseline);
                    let emitted = if exceeds(delta, self.settings.analog_threshold) {
                        let value = if action.kind == ActionKind::Joystick {
                            EventValue::Axis2D(sample)
                        } else {
                            EventValue::Axis(sample.x)
                        };
                        debug!("Device {} {} -> {:?}", device, action.name, value);
                        events.push(InputEvent::analog(device, &action.name, value, frame));
                        sample
                    } else {
                        baseline
                    };
                    commit.analog.insert(action.name.clone(), emitted);
                }
                ActionValue::Motion(sample) => {
                    let baseline = state.motion.get(&action.name).copied().unwrap_or_default();
                    let delta = sample.max_delta(&baseline);
                    let emitted = if exceeds(delta, self.settings.motion_threshold) {
                        events.push(InputEvent::motion(device, &action.name, sample, frame));
                        sample
                    } else {
                        baseline
                    };
                    commit.motion.insert(action.name.clone(), emitted);
                }
            }
        }

        (events, commit)
    }

    #[allow(clippy::too_many_arguments)]
    fn diff_digital(
        &self,
        device: LogicalDeviceId,
        state: &ControllerState,
        action: &ResolvedAction,
        pressed: bool,
        frame: FrameStamp,
        events: &mut FrameEvents,
        commit: &mut Commit,
    ) {
        let name = action.name.as_str();
        let previous = state.is_pressed(name);
        commit.digital.insert(name.to_string(), pressed);

        match (previous, pressed) {
            (false, true) => {
                debug!("Device {} {} pressed", device, name);
                events.push(InputEvent::digital(
                    device,
                    name,
                    InputEventKind::Pressed,
                    true,
                    frame,
                ));
                if let Some(repeat) = self.settings.key_repeat {
                    commit
                        .repeat_at
                        .insert(name.to_string(), frame.elapsed + repeat.initial_delay);
                }
            }
            (true, false) => {
                debug!("Device {} {} released", device, name);
                events.push(InputEvent::digital(
                    device,
                    name,
                    InputEventKind::Released,
                    false,
                    frame,
                ));
            }
            (true, true) => {
                let (Some(repeat), Some(deadline)) =
                    (self.settings.key_repeat, state.repeat_at.get(name))
                else {
                    return;
                };
                if frame.elapsed >= *deadline {
                    events.push(InputEvent::digital(
                        device,
                        name,
                        InputEventKind::Repeated,
                        true,
                        frame,
                    ));
                    commit
                        .repeat_at
                        .insert(name.to_string(), frame.elapsed + repeat.repeat_delay);
                } else {
                    commit.repeat_at.insert(name.to_string(), *deadline);
                }
            }
            (false, false) => {}
        }
    }
}

/// Zero movement never counts, even with a zero threshold.
fn exceeds(delta: f32, threshold: f32) -> bool {
    delta > 0.0 && delta >= threshold
}

/// New previous-value maps for one device, built from relevant actions only.
#[derive(Debug, Default)]
struct Commit {
    digital: HashMap<String, bool>,
    analog: HashMap<String, crate::native::AnalogSample>,
    motion: HashMap<String, crate::native::MotionSample>,
    repeat_at: HashMap<String, Duration>,
}

impl Commit {
    fn apply(self, state: &mut ControllerState) {
        state.digital = self.digital;
        state.analog = self.analog;
        state.motion = self.motion;
        state.repeat_at = self.repeat_at;
    }
}
