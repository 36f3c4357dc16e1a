//! Error taxonomy of the bridge.
//!
//! Startup failures ([`SessionError`], [`ManifestError`]) are fatal for the
//! whole input module. Lookup failures ([`UnknownControllerError`],
//! [`UnknownActionSetError`], [`UnknownLayerError`]) are caller mistakes and
//! are returned as-is. [`GlyphNotFoundError`] never leaves the glyph resolver.

use crate::controller::LogicalDeviceId;
use crate::native::{ActionKind, ControllerHandle, ControllerType, NativeError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Native input session could not start: {0}")]
    Unavailable(#[source] NativeError),

    #[error("Native input session is not active")]
    Inactive,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Manifest declares no action sets")]
    Empty,

    #[error("Unknown action type '{value}' for action {action} in {scope}")]
    UnknownActionType {
        scope: String,
        action: String,
        value: String,
    },

    #[error("Duplicate action {action} in {scope}")]
    DuplicateAction { scope: String, action: String },

    #[error("Duplicate action set or layer name {0}")]
    DuplicateSet(String),

    #[error("Layer {layer} references unknown base action set {base}")]
    UnknownBaseSet { layer: String, base: String },

    #[error("Native layer has no {kind} action named {action}")]
    UnresolvedAction { action: String, kind: ActionKind },

    #[error("Native layer has no action set named {0}")]
    UnresolvedActionSet(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnknownControllerError {
    #[error("Controller handle {0} is not registered")]
    Handle(ControllerHandle),

    #[error("Logical device {0} is not attached")]
    Device(LogicalDeviceId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Action set {name} is not declared in the manifest")]
pub struct UnknownActionSetError {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Layer {layer} is not declared for action set {set}")]
pub struct UnknownLayerError {
    pub layer: String,
    pub set: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No glyph for action {action} on {controller_type}")]
pub struct GlyphNotFoundError {
    pub action: String,
    pub controller_type: ControllerType,
}

/// Aggregate error returned by the bridge's public operations.
#[derive(Debug, Error)]
pub enum InputError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    UnknownController(#[from] UnknownControllerError),

    #[error(transparent)]
    UnknownActionSet(#[from] UnknownActionSetError),

    #[error(transparent)]
    UnknownLayer(#[from] UnknownLayerError),

    #[error("Native call failed: {0}")]
    Native(#[from] NativeError),
}
