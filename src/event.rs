//! Internal event records produced each frame.
//!
//! An [`InputEvent`] is created by the registry (attach/detach) or the poller
//! (edges and value changes) and handed over to the event sink by value.
//! [`FrameEvents`] keeps one frame's records grouped by category so the sink
//! drains them lifecycle first, then digital edges, then analog and motion
//! changes, each group in emission order.

use crate::controller::LogicalDeviceId;
use crate::native::{AnalogSample, ControllerType, MotionSample};
use std::time::Duration;

/// Host-provided frame identity. `elapsed` is monotonic time since the bridge started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameStamp {
    pub index: u64,
    pub elapsed: Duration,
}

impl FrameStamp {
    pub fn new(index: u64, elapsed: Duration) -> Self {
        Self { index, elapsed }
    }
}

/// Why a device left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    /// No longer enumerated by the native layer.
    Unplugged,
    /// A native call failed mid-frame.
    PollFailure,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEventKind {
    Attached { controller_type: ControllerType },
    Detached { reason: DetachReason },
    Pressed,
    Released,
    /// Held digital action crossed its key-repeat deadline.
    Repeated,
    AnalogChanged,
    MotionChanged,
}

/// Value carried by an event; lifecycle events carry none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventValue {
    None,
    Digital(bool),
    Axis(f32),
    Axis2D(AnalogSample),
    Motion(MotionSample),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub device: LogicalDeviceId,
    /// Action name; `None` for attach/detach.
    pub action: Option<String>,
    pub kind: InputEventKind,
    pub value: EventValue,
    pub frame: FrameStamp,
}

impl InputEvent {
    pub fn attached(
        device: LogicalDeviceId,
        controller_type: ControllerType,
        frame: FrameStamp,
    ) -> Self {
        Self {
            device,
            action: None,
            kind: InputEventKind::Attached { controller_type },
            value: EventValue::None,
            frame,
        }
    }

    pub fn detached(device: LogicalDeviceId, reason: DetachReason, frame: FrameStamp) -> Self {
        Self {
            device,
            action: None,
            kind: InputEventKind::Detached { reason },
            value: EventValue::None,
            frame,
        }
    }

    pub fn digital(
        device: LogicalDeviceId,
        action: &str,
        kind: InputEventKind,
        pressed: bool,
        frame: FrameStamp,
    ) -> Self {
        Self {
            device,
            action: Some(action.to_string()),
            kind,
            value: EventValue::Digital(pressed),
            frame,
        }
    }

    pub fn analog(
        device: LogicalDeviceId,
        action: &str,
        value: EventValue,
        frame: FrameStamp,
    ) -> Self {
        Self {
            device,
            action: Some(action.to_string()),
            kind: InputEventKind::AnalogChanged,
            value,
            frame,
        }
    }

    pub fn motion(
        device: LogicalDeviceId,
        action: &str,
        sample: MotionSample,
        frame: FrameStamp,
    ) -> Self {
        Self {
            device,
            action: Some(action.to_string()),
            kind: InputEventKind::MotionChanged,
            value: EventValue::Motion(sample),
            frame,
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind,
            InputEventKind::Attached { .. } | InputEventKind::Detached { .. }
        )
    }

    pub fn is_digital(&self) -> bool {
        matches!(
            self.kind,
            InputEventKind::Pressed | InputEventKind::Released | InputEventKind::Repeated
        )
    }
}

/// One frame's events, grouped for ordered draining.
#[derive(Debug, Default)]
pub struct FrameEvents {
    lifecycle: Vec<InputEvent>,
    digital: Vec<InputEvent>,
    continuous: Vec<InputEvent>,
}

impl FrameEvents {
    pub fn push(&mut self, event: InputEvent) {
        if event.is_lifecycle() {
            self.lifecycle.push(event);
        } else if event.is_digital() {
            self.digital.push(event);
        } else {
            self.continuous.push(event);
        }
    }

    pub fn extend(&mut self, other: FrameEvents) {
        self.lifecycle.extend(other.lifecycle);
        self.digital.extend(other.digital);
        self.continuous.extend(other.continuous);
    }

    pub fn len(&self) -> usize {
        self.lifecycle.len() + self.digital.len() + self.continuous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lifecycle, then digital, then analog/motion.
    pub fn into_ordered(self) -> Vec<InputEvent> {
        let mut ordered = self.lifecycle;
        ordered.extend(self.digital);
        ordered.extend(self.continuous);
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_lifecycle_then_digital_then_continuous() {
        let frame = FrameStamp::new(3, Duration::from_millis(48));
        let device = LogicalDeviceId(1);
        let mut events = FrameEvents::default();

        events.push(InputEvent::analog(
            device,
            "Move",
            EventValue::Axis2D(AnalogSample::new(0.5, 0.0)),
            frame,
        ));
        events.push(InputEvent::digital(
            device,
            "Jump",
            InputEventKind::Pressed,
            true,
            frame,
        ));
        events.push(InputEvent::detached(
            LogicalDeviceId(2),
            DetachReason::Unplugged,
            frame,
        ));
        events.push(InputEvent::digital(
            device,
            "Fire",
            InputEventKind::Released,
            false,
            frame,
        ));

        let kinds = events
            .into_ordered()
            .into_iter()
            .map(|e| (e.kind, e.action))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                (
                    InputEventKind::Detached {
                        reason: DetachReason::Unplugged
                    },
                    None
                ),
                (InputEventKind::Pressed, Some("Jump".to_string())),
                (InputEventKind::Released, Some("Fire".to_string())),
                (InputEventKind::AnalogChanged, Some("Move".to_string())),
            ]
        );
    }

    #[test]
    fn empty_frame_drains_to_nothing() {
        let events = FrameEvents::default();
        assert!(events.is_empty());
        assert!(events.into_ordered().is_empty());
    }
}
