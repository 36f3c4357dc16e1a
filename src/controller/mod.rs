//! Controller subsystem: per-device bookkeeping and per-frame polling
//!
//! Runs once per tick in a fixed order:
//!
//! 1. [`registry`] - enumerate controllers, attach and detach logical devices
//! 2. [`action_sets`] - commit pending set/layer switches, sync the native layer
//! 3. [`poller`] - read relevant actions, diff against the previous frame
//!
//! ```text
//! Native ──► Registry ──► ActionSetController ──► Poller ──► FrameEvents
//!            (notices)    (selection per device)  (edges/changes)
//! ```
//!
//! Per-device mutable state lives in [`state::DeviceStates`], an arena keyed
//! by [`LogicalDeviceId`]. Detaching a device removes its entry, nothing else
//! holds on to it.

pub mod action_sets;
pub mod poller;
pub mod registry;
pub mod state;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use action_sets::ActionSetController;
pub use poller::{KeyRepeat, Poller, PollerSettings};
pub use registry::{ControllerRegistry, DeviceNotice, ReattachPolicy};
pub use state::{ControllerState, DeviceStates};

/// Session-stable identifier of an attached controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalDeviceId(pub u32);

impl fmt::Display for LogicalDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
