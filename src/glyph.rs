//! Glyph resolver
//!
//! Maps an action on a given device to an icon reference for UI prompts.
//! Lookups are cached by `(action, controller type)`, so controllers of the
//! same model share entries. A device whose detected type changes between
//! observations invalidates the entries of both its old and new type.
//!
//! Resolution never fails: a missing icon resolves to the configured
//! default glyph.

use crate::controller::LogicalDeviceId;
use crate::error::GlyphNotFoundError;
use crate::native::{ActionOrigin, ControllerType};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Configured icons per controller type and origin name.
pub type GlyphTable = HashMap<ControllerType, HashMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlyphReference {
    Icon(String),
    /// Fallback used when no icon is known.
    Default(String),
}

impl GlyphReference {
    pub fn path(&self) -> &str {
        match self {
            GlyphReference::Icon(path) | GlyphReference::Default(path) => path,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, GlyphReference::Default(_))
    }
}

/// Per-device view the resolver queries on a cache miss.
pub trait GlyphSource {
    fn controller_type(&self) -> ControllerType;

    /// Origins bound to `action` under the device's active selection.
    fn origins(&mut self, action: &str) -> Vec<ActionOrigin>;

    /// Icon shipped by the native layer for `origin`.
    fn native_glyph(&self, origin: &ActionOrigin, controller_type: ControllerType)
        -> Option<String>;
}

#[derive(Debug)]
pub struct GlyphResolver {
    table: GlyphTable,
    default_glyph: String,
    cache: HashMap<(String, ControllerType), String>,
    observed: HashMap<LogicalDeviceId, ControllerType>,
}

impl GlyphResolver {
    pub fn new(table: GlyphTable, default_glyph: impl Into<String>) -> Self {
        Self {
            table,
            default_glyph: default_glyph.into(),
            cache: HashMap::new(),
            observed: HashMap::new(),
        }
    }

    pub fn default_glyph(&self) -> GlyphReference {
        GlyphReference::Default(self.default_glyph.clone())
    }

    /// Records the type detected for `device`, invalidating on change.
    pub fn observe(&mut self, device: LogicalDeviceId, controller_type: ControllerType) {
        match self.observed.insert(device, controller_type) {
            Some(previous) if previous != controller_type => {
                info!(
                    "Device {} changed type from {} to {}, invalidating glyphs",
                    device, previous, controller_type
                );
                self.cache
                    .retain(|(_, cached), _| *cached != previous && *cached != controller_type);
            }
            _ => {}
        }
    }

    pub fn forget(&mut self, device: LogicalDeviceId) {
        self.observed.remove(&device);
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Icon for `action` on `device`.
    ///
    /// A cache entry is filled from the origin bound under whatever set and
    /// layers the filling device had active; later devices of the same type
    /// get that entry even if their own selection binds the action elsewhere.
    pub fn resolve(
        &mut self,
        action: &str,
        device: LogicalDeviceId,
        source: &mut dyn GlyphSource,
    ) -> GlyphReference {
        let controller_type = source.controller_type();
        self.observe(device, controller_type);

        let key = (action.to_string(), controller_type);
        if let Some(path) = self.cache.get(&key) {
            return GlyphReference::Icon(path.clone());
        }

        match self.lookup(action, controller_type, source) {
            Ok(path) => {
                debug!("Glyph for {} on {}: {}", action, controller_type, path);
                self.cache.insert(key, path.clone());
                GlyphReference::Icon(path)
            }
            Err(err) => {
                debug!("{}, using default glyph", err);
                self.default_glyph()
            }
        }
    }

    /// Glyph for a device the bridge does not know.
    pub fn unknown_device(&self, action: &str, device: LogicalDeviceId) -> GlyphReference {
        warn!(
            "Glyph requested for {} on unknown device {}, using default",
            action, device
        );
        self.default_glyph()
    }

    fn lookup(
        &self,
        action: &str,
        controller_type: ControllerType,
        source: &mut dyn GlyphSource,
    ) -> Result<String, GlyphNotFoundError> {
        let not_found = || GlyphNotFoundError {
            action: action.to_string(),
            controller_type,
        };

        let origins = source.origins(action);
        let origin = origins.first().ok_or_else(not_found)?;

        source
            .native_glyph(origin, controller_type)
            .or_else(|| {
                self.table
                    .get(&controller_type)
                    .and_then(|icons| icons.get(&origin.name))
                    .cloned()
            })
            .ok_or_else(not_found)
    }
}
