//! Event sink adapter
//!
//! Converts one frame's [`InputEvent`]s into the host-facing
//! [`EngineInputEvent`] shape and hands the whole batch to an
//! [`InputDispatch`] in one call. Nothing is kept between frames.
//!
//! Two-dimensional actions are split into `<name>_AxisX` / `<name>_AxisY`
//! axis events when `split_axes` is on.

pub mod channel;

use crate::controller::LogicalDeviceId;
use crate::event::{EventValue, InputEvent, InputEventKind};
use crate::native::{ControllerType, MotionSample};
use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::debug;

pub use channel::ChannelDispatch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEventKind {
    DeviceConnected { controller_type: ControllerType },
    DeviceDisconnected,
    ButtonPressed,
    ButtonReleased,
    ButtonRepeated,
    Axis(f32),
    Axis2D { x: f32, y: f32 },
    Motion(MotionSample),
}

/// Host-facing input event.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInputEvent {
    pub device: LogicalDeviceId,
    /// Control name (`None` for connect/disconnect).
    pub control: Option<String>,
    pub kind: EngineEventKind,
    pub frame: u64,
    pub elapsed: Duration,
    pub dispatched_at: DateTime<Local>,
}

/// Host input dispatch for one frame's batch.
pub trait InputDispatch {
    fn dispatch(&mut self, batch: Vec<EngineInputEvent>);
}

impl<F> InputDispatch for F
where
    F: FnMut(Vec<EngineInputEvent>),
{
    fn dispatch(&mut self, batch: Vec<EngineInputEvent>) {
        self(batch)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EventSinkAdapter {
    split_axes: bool,
}

impl Default for EventSinkAdapter {
    fn default() -> Self {
        Self { split_axes: true }
    }
}

impl EventSinkAdapter {
    pub fn new(split_axes: bool) -> Self {
        Self { split_axes }
    }

    /// Translates `events` preserving their order.
    pub fn translate(&self, events: Vec<InputEvent>) -> Vec<EngineInputEvent> {
        let dispatched_at = Local::now();
        let mut batch = Vec::with_capacity(events.len());

        for event in events {
            let base = |control: Option<String>, kind: EngineEventKind| EngineInputEvent {
                device: event.device,
                control,
                kind,
                frame: event.frame.index,
                elapsed: event.frame.elapsed,
                dispatched_at,
            };

            match (event.kind, event.value) {
                (InputEventKind::Attached { controller_type }, _) => {
                    batch.push(base(None, EngineEventKind::DeviceConnected { controller_type }))
                }
                (InputEventKind::Detached { .. }, _) => {
                    batch.push(base(None, EngineEventKind::DeviceDisconnected))
                }
                (InputEventKind::Pressed, _) => {
                    batch.push(base(event.action.clone(), EngineEventKind::ButtonPressed))
                }
                (InputEventKind::Released, _) => {
                    batch.push(base(event.action.clone(), EngineEventKind::ButtonReleased))
                }
                (InputEventKind::Repeated, _) => {
                    batch.push(base(event.action.clone(), EngineEventKind::ButtonRepeated))
                }
                (_, EventValue::Axis(value)) => {
                    batch.push(base(event.action.clone(), EngineEventKind::Axis(value)))
                }
                (_, EventValue::Axis2D(sample)) if self.split_axes => {
                    let name = event.action.clone().unwrap_or_default();
                    batch.push(base(
                        Some(format!("{name}_AxisX")),
                        EngineEventKind::Axis(sample.x),
                    ));
                    batch.push(base(
                        Some(format!("{name}_AxisY")),
                        EngineEventKind::Axis(sample.y),
                    ));
                }
                (_, EventValue::Axis2D(sample)) => batch.push(base(
                    event.action.clone(),
                    EngineEventKind::Axis2D {
                        x: sample.x,
                        y: sample.y,
                    },
                )),
                (_, EventValue::Motion(sample)) => {
                    batch.push(base(event.action.clone(), EngineEventKind::Motion(sample)))
                }
                (kind, value) => debug!("Dropping event {:?} with value {:?}", kind, value),
            }
        }

        batch
    }

    /// Translates and dispatches one frame's events; empty frames dispatch an empty batch.
    pub fn deliver(&self, events: Vec<InputEvent>, dispatch: &mut dyn InputDispatch) {
        let batch = self.translate(events);
        if !batch.is_empty() {
            debug!("Dispatching {} input events", batch.len());
        }
        dispatch.dispatch(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DetachReason, FrameStamp};
    use crate::native::AnalogSample;

    fn frame() -> FrameStamp {
        FrameStamp::new(7, Duration::from_millis(112))
    }

    fn stick(device: u32) -> InputEvent {
        InputEvent::analog(
            LogicalDeviceId(device),
            "Move",
            EventValue::Axis2D(AnalogSample::new(0.5, -0.25)),
            frame(),
        )
    }

    #[test]
    fn joystick_splits_into_named_axes() {
        let batch = EventSinkAdapter::new(true).translate(vec![stick(1)]);
        let controls = batch
            .iter()
            .map(|e| (e.control.as_deref(), e.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            controls,
            vec![
                (Some("Move_AxisX"), EngineEventKind::Axis(0.5)),
                (Some("Move_AxisY"), EngineEventKind::Axis(-0.25)),
            ]
        );
        assert!(batch.iter().all(|e| e.frame == 7));
    }

    #[test]
    fn joystick_stays_whole_without_splitting() {
        let batch = EventSinkAdapter::new(false).translate(vec![stick(1)]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, EngineEventKind::Axis2D { x: 0.5, y: -0.25 });
    }

    #[test]
    fn order_is_preserved() {
        let events = vec![
            InputEvent::detached(LogicalDeviceId(2), DetachReason::Unplugged, frame()),
            InputEvent::digital(
                LogicalDeviceId(1),
                "Jump",
                InputEventKind::Pressed,
                true,
                frame(),
            ),
        ];
        let batch = EventSinkAdapter::default().translate(events);
        assert_eq!(batch[0].kind, EngineEventKind::DeviceDisconnected);
        assert_eq!(batch[1].kind, EngineEventKind::ButtonPressed);
        assert_eq!(batch[1].control.as_deref(), Some("Jump"));
    }

    #[test]
    fn empty_frame_dispatches_empty_batch() {
        let mut batches = Vec::new();
        let mut record = |batch: Vec<EngineInputEvent>| batches.push(batch);
        EventSinkAdapter::default().deliver(Vec::new(), &mut record);
        assert_eq!(batches, vec![Vec::<EngineInputEvent>::new()]);
    }
}
