//! Action-based controller input bridge.
//!
//! Polls an action-based native controller API once per frame and turns its
//! state into ordered, host-facing input events. See [`bridge::InputBridge`]
//! for the per-frame entry point and [`runtime::BridgeHandle`] for running it
//! on its own task.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod glyph;
pub mod manifest;
pub mod native;
pub mod runtime;
pub mod session;
pub mod sink;

pub use bridge::{ForceFeedback, InputBridge, ManifestSource};
pub use config::BridgeSettings;
pub use controller::LogicalDeviceId;
pub use error::InputError;
pub use event::FrameStamp;
pub use glyph::GlyphReference;
pub use sink::{EngineEventKind, EngineInputEvent, InputDispatch};
