//! TOML manifest loader.
//!
//! Loading is eager and total: structure is validated first (types,
//! duplicates, layer bases), then every set, layer and action is resolved
//! against the native layer. The first problem aborts the load.

use super::{ActionBinding, ActionLayer, ActionManifest, ActionSet};
use crate::error::ManifestError;
use crate::native::{ActionKind, NativeInput};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    action_sets: Vec<RawActionSet>,
    #[serde(default)]
    layers: Vec<RawLayer>,
}

#[derive(Debug, Deserialize)]
struct RawActionSet {
    name: String,
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawLayer {
    name: String,
    base: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Reads and loads a manifest file.
pub fn load_file(path: &Path, native: &mut dyn NativeInput) -> Result<ActionManifest, ManifestError> {
    info!("Loading action manifest from {}", path.display());
    let source = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load(&source, native)
}

/// Parses, validates and resolves a manifest.
pub fn load(source: &str, native: &mut dyn NativeInput) -> Result<ActionManifest, ManifestError> {
    let file: ManifestFile = toml::from_str(source)?;

    if file.action_sets.is_empty() {
        return Err(ManifestError::Empty);
    }

    let mut names = HashSet::new();
    let mut sets = Vec::with_capacity(file.action_sets.len());
    for raw in &file.action_sets {
        if !names.insert(raw.name.as_str()) {
            return Err(ManifestError::DuplicateSet(raw.name.clone()));
        }
        sets.push((raw.name.as_str(), parse_actions(&raw.name, &raw.actions)?));
    }

    let mut layers = Vec::with_capacity(file.layers.len());
    for raw in &file.layers {
        if !names.insert(raw.name.as_str()) {
            return Err(ManifestError::DuplicateSet(raw.name.clone()));
        }
        if !file.action_sets.iter().any(|set| set.name == raw.base) {
            return Err(ManifestError::UnknownBaseSet {
                layer: raw.name.clone(),
                base: raw.base.clone(),
            });
        }
        layers.push((raw, parse_actions(&raw.name, &raw.actions)?));
    }

    let mut resolved_sets = Vec::with_capacity(sets.len());
    for (name, actions) in sets {
        let handle = native
            .action_set_handle(name)
            .ok_or_else(|| ManifestError::UnresolvedActionSet(name.to_string()))?;
        debug!("Resolved action set {} -> {}", name, handle);
        resolved_sets.push(ActionSet {
            name: name.to_string(),
            handle,
            actions: resolve_actions(actions, native)?,
        });
    }

    let mut resolved_layers = Vec::with_capacity(layers.len());
    for (raw, actions) in layers {
        let handle = native
            .action_set_handle(&raw.name)
            .ok_or_else(|| ManifestError::UnresolvedActionSet(raw.name.clone()))?;
        debug!(
            "Resolved layer {} (base {}, priority {}) -> {}",
            raw.name, raw.base, raw.priority, handle
        );
        resolved_layers.push(ActionLayer {
            name: raw.name.clone(),
            base: raw.base.clone(),
            priority: raw.priority,
            handle,
            actions: resolve_actions(actions, native)?,
        });
    }

    info!(
        "Loaded action manifest: {} action sets, {} layers",
        resolved_sets.len(),
        resolved_layers.len()
    );
    Ok(ActionManifest::from_parts(resolved_sets, resolved_layers))
}

fn parse_actions<'a>(
    scope: &str,
    actions: &'a [RawAction],
) -> Result<Vec<(&'a str, ActionKind)>, ManifestError> {
    let mut seen = HashSet::new();
    actions
        .iter()
        .map(|action| {
            if !seen.insert(action.name.as_str()) {
                return Err(ManifestError::DuplicateAction {
                    scope: scope.to_string(),
                    action: action.name.clone(),
                });
            }
            let kind =
                parse_kind(&action.kind).ok_or_else(|| ManifestError::UnknownActionType {
                    scope: scope.to_string(),
                    action: action.name.clone(),
                    value: action.kind.clone(),
                })?;
            Ok((action.name.as_str(), kind))
        })
        .collect()
}

fn resolve_actions(
    actions: Vec<(&str, ActionKind)>,
    native: &mut dyn NativeInput,
) -> Result<Vec<ActionBinding>, ManifestError> {
    actions
        .into_iter()
        .map(|(name, kind)| {
            let handle =
                native
                    .action_handle(name, kind)
                    .ok_or_else(|| ManifestError::UnresolvedAction {
                        action: name.to_string(),
                        kind,
                    })?;
            Ok(ActionBinding {
                name: name.to_string(),
                kind,
                handle,
            })
        })
        .collect()
}

fn parse_kind(value: &str) -> Option<ActionKind> {
    match value.to_ascii_lowercase().as_str() {
        "digital" | "button" => Some(ActionKind::Digital),
        "analog" => Some(ActionKind::Analog),
        "joystick" | "mouse_input" => Some(ActionKind::Joystick),
        "motion" => Some(ActionKind::Motion),
        _ => None,
    }
}
