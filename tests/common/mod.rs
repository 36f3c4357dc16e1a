#![allow(dead_code)]

use std::time::Duration;
use steam_input_bridge::native::virtual_backend::VirtualInput;
use steam_input_bridge::native::ActionKind;
use steam_input_bridge::{
    BridgeSettings, EngineEventKind, EngineInputEvent, FrameStamp, InputBridge, ManifestSource,
};

pub const MANIFEST: &str = r#"
[[action_sets]]
name = "Gameplay"
actions = [
  { name = "Jump", type = "digital" },
  { name = "Move", type = "joystick" },
  { name = "Throttle", type = "analog" },
  { name = "Tilt", type = "motion" },
]

[[action_sets]]
name = "Menu"
actions = [ { name = "Select", type = "digital" } ]

[[layers]]
name = "Aiming"
base = "Gameplay"
priority = 10
actions = [ { name = "Zoom", type = "analog" } ]
"#;

pub fn virtual_input() -> VirtualInput {
    let input = VirtualInput::new();
    input
        .declare_action_set("Gameplay")
        .declare_action_set("Menu")
        .declare_action_set("Aiming")
        .declare_action("Jump", ActionKind::Digital)
        .declare_action("Move", ActionKind::Joystick)
        .declare_action("Throttle", ActionKind::Analog)
        .declare_action("Tilt", ActionKind::Motion)
        .declare_action("Select", ActionKind::Digital)
        .declare_action("Zoom", ActionKind::Analog);
    input
}

pub fn start(input: &VirtualInput, settings: BridgeSettings) -> InputBridge {
    InputBridge::start(
        Box::new(input.clone()),
        ManifestSource::Text(MANIFEST.to_string()),
        &settings,
    )
    .expect("bridge starts")
}

pub fn frame(index: u64) -> FrameStamp {
    FrameStamp::new(index, Duration::from_millis(index * 16))
}

/// `(control, kind)` pairs of a batch, lifecycle events excluded.
pub fn input_events(batch: &[EngineInputEvent]) -> Vec<(String, EngineEventKind)> {
    batch
        .iter()
        .filter_map(|event| event.control.clone().map(|control| (control, event.kind)))
        .collect()
}
