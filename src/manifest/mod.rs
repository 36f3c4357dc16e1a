//! Action manifest
//!
//! Declarative mapping from action names to native action handles, grouped
//! into action sets and layers. Loaded once at startup by [`loader`] and
//! immutable afterwards; shared read-only (behind an `Arc`) by every
//! controller state.
//!
//! # Layer precedence
//!
//! A selection is a base set plus an ordered list of layers. Layers are
//! applied in ascending manifest `priority`; equal priorities keep the order
//! of the selection, later entries on top. When two sources bind the same
//! action name, the one applied last wins.

pub mod loader;

use crate::error::{UnknownActionSetError, UnknownLayerError};
use crate::native::{ActionHandle, ActionKind, ActionSetHandle};
use std::path::Path;

pub use loader::{load, load_file};

/// One action as declared in a set or layer, with its resolved native handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBinding {
    pub name: String,
    pub kind: ActionKind,
    pub handle: ActionHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSet {
    pub name: String,
    pub handle: ActionSetHandle,
    pub actions: Vec<ActionBinding>,
}

/// Additive overlay on a base action set.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLayer {
    pub name: String,
    pub base: String,
    pub priority: i32,
    pub handle: ActionSetHandle,
    pub actions: Vec<ActionBinding>,
}

/// Base set plus layer stack requested for one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSelection {
    pub set: String,
    pub layers: Vec<String>,
}

impl ActionSelection {
    pub fn new(set: impl Into<String>, layers: Vec<String>) -> Self {
        Self {
            set: set.into(),
            layers,
        }
    }

    pub fn base(set: impl Into<String>) -> Self {
        Self::new(set, Vec::new())
    }
}

/// An action relevant under a selection, after layer precedence.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    pub name: String,
    pub kind: ActionKind,
    pub handle: ActionHandle,
    /// Layer that supplied the binding, `None` for the base set.
    pub layer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionManifest {
    sets: Vec<ActionSet>,
    layers: Vec<ActionLayer>,
}

impl ActionManifest {
    pub(crate) fn from_parts(sets: Vec<ActionSet>, layers: Vec<ActionLayer>) -> Self {
        Self { sets, layers }
    }

    /// Parses and validates `source`, resolving every handle against `native`.
    pub fn load(
        source: &str,
        native: &mut dyn crate::native::NativeInput,
    ) -> Result<Self, crate::error::ManifestError> {
        loader::load(source, native)
    }

    pub fn load_file(
        path: &Path,
        native: &mut dyn crate::native::NativeInput,
    ) -> Result<Self, crate::error::ManifestError> {
        loader::load_file(path, native)
    }

    pub fn action_sets(&self) -> &[ActionSet] {
        &self.sets
    }

    pub fn layers(&self) -> &[ActionLayer] {
        &self.layers
    }

    pub fn action_set(&self, name: &str) -> Option<&ActionSet> {
        self.sets.iter().find(|set| set.name == name)
    }

    pub fn layer(&self, name: &str) -> Option<&ActionLayer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// First declared action set.
    pub fn default_set(&self) -> Option<&ActionSet> {
        self.sets.first()
    }

    /// Name of a set or layer handle, or its hex form when the manifest does not know it.
    pub fn set_name(&self, handle: ActionSetHandle) -> String {
        self.sets
            .iter()
            .map(|set| (&set.name, set.handle))
            .chain(self.layers.iter().map(|layer| (&layer.name, layer.handle)))
            .find(|(_, candidate)| *candidate == handle)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| handle.to_string())
    }

    pub fn check_set(&self, set: &str) -> Result<&ActionSet, UnknownActionSetError> {
        self.action_set(set).ok_or_else(|| UnknownActionSetError {
            name: set.to_string(),
        })
    }

    /// A layer is usable only on top of the base set it was declared for.
    pub fn check_layer(&self, set: &str, layer: &str) -> Result<&ActionLayer, UnknownLayerError> {
        self.layer(layer)
            .filter(|candidate| candidate.base == set)
            .ok_or_else(|| UnknownLayerError {
                layer: layer.to_string(),
                set: set.to_string(),
            })
    }

    /// Layers of `selection` in application order, lowest precedence first.
    pub fn layer_stack(&self, selection: &ActionSelection) -> Vec<&ActionLayer> {
        let mut stack = selection
            .layers
            .iter()
            .enumerate()
            .filter_map(|(position, name)| {
                self.check_layer(&selection.set, name)
                    .ok()
                    .map(|layer| (position, layer))
            })
            .collect::<Vec<_>>();
        stack.sort_by_key(|(position, layer)| (layer.priority, *position));
        stack.into_iter().map(|(_, layer)| layer).collect()
    }

    /// Actions relevant under `selection`, base declaration order first.
    ///
    /// Unknown set or layer names contribute nothing; callers validate with
    /// [`check_set`](Self::check_set) and [`check_layer`](Self::check_layer) first.
    pub fn resolve(&self, selection: &ActionSelection) -> Vec<ResolvedAction> {
        let Some(base) = self.action_set(&selection.set) else {
            return Vec::new();
        };

        let mut resolved = base
            .actions
            .iter()
            .map(|binding| ResolvedAction {
                name: binding.name.clone(),
                kind: binding.kind,
                handle: binding.handle,
                layer: None,
            })
            .collect::<Vec<_>>();

        for layer in self.layer_stack(selection) {
            for binding in &layer.actions {
                let overlay = ResolvedAction {
                    name: binding.name.clone(),
                    kind: binding.kind,
                    handle: binding.handle,
                    layer: Some(layer.name.clone()),
                };
                match resolved.iter_mut().find(|r| r.name == binding.name) {
                    Some(existing) => *existing = overlay,
                    None => resolved.push(overlay),
                }
            }
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(name: &str, kind: ActionKind, handle: u64) -> ActionBinding {
        ActionBinding {
            name: name.to_string(),
            kind,
            handle: ActionHandle(handle),
        }
    }

    fn manifest() -> ActionManifest {
        ActionManifest::from_parts(
            vec![
                ActionSet {
                    name: "Gameplay".to_string(),
                    handle: ActionSetHandle(1),
                    actions: vec![
                        binding("Jump", ActionKind::Digital, 1),
                        binding("Fire", ActionKind::Digital, 2),
                    ],
                },
                ActionSet {
                    name: "Menu".to_string(),
                    handle: ActionSetHandle(2),
                    actions: vec![binding("Select", ActionKind::Digital, 3)],
                },
            ],
            vec![
                ActionLayer {
                    name: "Aiming".to_string(),
                    base: "Gameplay".to_string(),
                    priority: 10,
                    handle: ActionSetHandle(3),
                    actions: vec![
                        binding("Fire", ActionKind::Analog, 4),
                        binding("Zoom", ActionKind::Analog, 5),
                    ],
                },
                ActionLayer {
                    name: "Vehicle".to_string(),
                    base: "Gameplay".to_string(),
                    priority: 0,
                    handle: ActionSetHandle(4),
                    actions: vec![binding("Fire", ActionKind::Digital, 6)],
                },
            ],
        )
    }

    #[test]
    fn base_set_resolves_in_declaration_order() {
        let resolved = manifest().resolve(&ActionSelection::base("Gameplay"));
        let names = resolved.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Jump", "Fire"]);
        assert!(resolved.iter().all(|r| r.layer.is_none()));
    }

    #[test]
    fn highest_priority_layer_wins_collisions() {
        // Aiming has the higher priority even though it is listed first
        let selection = ActionSelection::new(
            "Gameplay",
            vec!["Aiming".to_string(), "Vehicle".to_string()],
        );
        let resolved = manifest().resolve(&selection);

        let fire = resolved.iter().find(|r| r.name == "Fire").unwrap();
        assert_eq!(fire.handle, ActionHandle(4));
        assert_eq!(fire.layer.as_deref(), Some("Aiming"));
        assert!(resolved.iter().any(|r| r.name == "Zoom"));
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn layers_for_another_base_are_rejected() {
        let manifest = manifest();
        assert!(manifest.check_layer("Gameplay", "Aiming").is_ok());
        assert_eq!(
            manifest.check_layer("Menu", "Aiming").unwrap_err(),
            UnknownLayerError {
                layer: "Aiming".to_string(),
                set: "Menu".to_string()
            }
        );
        assert!(manifest.check_set("Combat").is_err());
    }

    #[test]
    fn unknown_handles_render_as_hex() {
        let manifest = manifest();
        assert_eq!(manifest.set_name(ActionSetHandle(3)), "Aiming");
        assert_eq!(manifest.set_name(ActionSetHandle(99)), "0x0000000000000063");
    }
}
