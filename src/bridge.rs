//! Input bridge
//!
//! Owns the native session and every per-device component, and runs them
//! once per host tick:
//!
//! ```text
//! run_frame ──► Registry.refresh ──► ActionSets.apply ──► Poller.poll ──► Sink
//!               (attach/detach)      (queued switches)    (edges/changes)
//! ```
//!
//! Native failures inside a tick never escape it: enumeration failures are
//! logged and a device whose activation or read fails is detached on the
//! spot, while every other device keeps producing input.

use crate::config::BridgeSettings;
use crate::controller::{
    ActionSetController, ControllerRegistry, ControllerState, DeviceNotice, DeviceStates,
    LogicalDeviceId, Poller,
};
use crate::error::{InputError, UnknownControllerError};
use crate::event::{DetachReason, FrameEvents, FrameStamp, InputEvent};
use crate::glyph::{GlyphReference, GlyphResolver, GlyphSource};
use crate::manifest::{ActionManifest, ActionSelection};
use crate::native::{
    ActionOrigin, ControllerHandle, ControllerType, HapticPad, NativeError, NativeInput,
};
use crate::session::SessionManager;
use crate::sink::{EngineInputEvent, EventSinkAdapter, InputDispatch};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Microseconds of haptic pulse per unit of force feedback.
const PULSE_US_PER_UNIT: f32 = 4000.0;

/// Where the action manifest comes from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    Text(String),
    File(PathBuf),
}

/// Rumble strength per side, `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceFeedback {
    pub left_large: f32,
    pub right_large: f32,
}

pub struct InputBridge {
    session: SessionManager,
    manifest: Arc<ActionManifest>,
    registry: ControllerRegistry,
    states: DeviceStates,
    action_sets: ActionSetController,
    poller: Poller,
    glyphs: GlyphResolver,
    sink: EventSinkAdapter,
}

impl InputBridge {
    /// Starts the native session and loads the manifest against it.
    ///
    /// Any failure is fatal; the session is shut down again before the
    /// error is returned.
    pub fn start(
        native: Box<dyn NativeInput>,
        source: ManifestSource,
        settings: &BridgeSettings,
    ) -> Result<Self, InputError> {
        let mut session = SessionManager::initialize(native)?;

        let manifest = {
            let native = session.native()?;
            match &source {
                ManifestSource::Text(text) => ActionManifest::load(text, native),
                ManifestSource::File(path) => ActionManifest::load_file(path, native),
            }
        };
        let manifest = match manifest {
            Ok(manifest) => Arc::new(manifest),
            Err(err) => {
                warn!("Action manifest rejected: {}", err);
                session.shutdown();
                return Err(err.into());
            }
        };

        let action_sets =
            ActionSetController::new(manifest.clone(), settings.default_action_set.as_deref())?;

        info!(
            "Input bridge started, default action set {}",
            action_sets.default_set()
        );
        Ok(Self {
            session,
            manifest,
            registry: ControllerRegistry::new(
                settings.reattach_policy,
                settings.reattach_grace_frames,
            ),
            states: DeviceStates::default(),
            action_sets,
            poller: Poller::new(settings.poller()),
            glyphs: GlyphResolver::new(settings.glyph_table(), settings.default_glyph.clone()),
            sink: EventSinkAdapter::new(settings.split_axes),
        })
    }

    /// Runs one frame and returns its translated batch.
    pub fn tick(&mut self, frame: FrameStamp) -> Vec<EngineInputEvent> {
        let events = self.run_frame(frame);
        self.sink.translate(events)
    }

    /// Runs one frame and hands its batch to `dispatch`.
    pub fn tick_into(&mut self, frame: FrameStamp, dispatch: &mut dyn InputDispatch) {
        let events = self.run_frame(frame);
        self.sink.deliver(events, dispatch);
    }

    fn run_frame(&mut self, frame: FrameStamp) -> Vec<InputEvent> {
        let Self {
            session,
            registry,
            states,
            action_sets,
            poller,
            glyphs,
            ..
        } = self;

        let Ok(native) = session.native() else {
            debug!("Frame {} skipped, session is closed", frame.index);
            return Vec::new();
        };
        native.run_frame();

        let mut events = FrameEvents::default();
        let mut devices = Devices {
            registry,
            states,
            action_sets,
            glyphs,
            events: &mut events,
            frame,
        };

        let suspended = devices.registry.suspended().to_vec();
        for handle in suspended {
            match devices.action_sets.trial_read(native, handle) {
                Ok(()) => {
                    devices.registry.resume(handle);
                }
                Err(err) => debug!("Controller {} still failing: {}", handle, err),
            }
        }

        match devices.registry.refresh(native, frame.index) {
            Ok(notices) => notices.into_iter().for_each(|notice| devices.record(notice)),
            Err(err) => warn!("Controller enumeration failed: {}", err),
        }

        let failures = devices.action_sets.apply(devices.states, native);
        devices.detach_failed(failures);

        let failures = poller.poll(devices.states, native, frame, devices.events);
        devices.detach_failed(failures);

        if !events.is_empty() {
            debug!("Frame {} produced {} events", frame.index, events.len());
        }
        events.into_ordered()
    }

    /// Queues a switch to `set` with `layers` for `device`, applied next frame.
    pub fn switch_to(
        &mut self,
        device: LogicalDeviceId,
        set: &str,
        layers: &[&str],
    ) -> Result<(), InputError> {
        self.action_sets
            .switch_to(&mut self.states, device, set, layers)
    }

    pub fn push_layer(&mut self, device: LogicalDeviceId, layer: &str) -> Result<(), InputError> {
        self.action_sets
            .push_layer(&mut self.states, device, layer)
    }

    pub fn remove_layer(&mut self, device: LogicalDeviceId, layer: &str) -> Result<(), InputError> {
        self.action_sets
            .remove_layer(&mut self.states, device, layer)
    }

    /// Committed selection of `device`.
    pub fn selection(&self, device: LogicalDeviceId) -> Result<ActionSelection, InputError> {
        Ok(self.states.get(device)?.selection().clone())
    }

    pub fn resolve(&self, handle: ControllerHandle) -> Result<LogicalDeviceId, UnknownControllerError> {
        self.registry.resolve(handle)
    }

    pub fn devices(&self) -> Vec<LogicalDeviceId> {
        self.registry.devices()
    }

    pub fn controller_type(
        &self,
        device: LogicalDeviceId,
    ) -> Result<ControllerType, UnknownControllerError> {
        self.registry.controller_type(device)
    }

    /// Whether `device` is a controller currently attached through this bridge.
    pub fn is_managed(&self, device: LogicalDeviceId) -> bool {
        self.session.is_active() && self.registry.is_attached(device)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn manifest(&self) -> &ActionManifest {
        &self.manifest
    }

    /// Icon for `action` on `device`; never fails.
    pub fn resolve_glyph(&mut self, action: &str, device: LogicalDeviceId) -> GlyphReference {
        let Ok(state) = self.states.get(device) else {
            return self.glyphs.unknown_device(action, device);
        };
        let Ok(native) = self.session.native() else {
            return self.glyphs.unknown_device(action, device);
        };

        let mut source = DeviceGlyphSource {
            native,
            manifest: &self.manifest,
            state,
        };
        self.glyphs.resolve(action, device, &mut source)
    }

    /// Sends one haptic pulse per side with a positive strength.
    pub fn set_vibration(
        &mut self,
        device: LogicalDeviceId,
        feedback: ForceFeedback,
    ) -> Result<(), InputError> {
        let handle = self.registry.handle_of(device)?;
        let native = self.session.native()?;

        for (pad, strength) in [
            (HapticPad::Left, feedback.left_large),
            (HapticPad::Right, feedback.right_large),
        ] {
            if !(strength > 0.0) {
                continue;
            }
            let duration = (strength.min(1.0) * PULSE_US_PER_UNIT) as u16;
            debug!("Device {} {:?} pulse {}us", device, pad, duration);
            native.trigger_haptic_pulse(handle, pad, duration)?;
        }
        Ok(())
    }

    /// Purges every device and closes the session. Later ticks yield empty batches.
    pub fn shutdown(&mut self) {
        if !self.session.is_active() {
            return;
        }
        info!(
            "Shutting down input bridge with {} attached devices",
            self.registry.len()
        );
        self.states.clear();
        self.registry.clear();
        self.session.shutdown();
    }
}

/// Mutable per-device components borrowed for one frame.
struct Devices<'a> {
    registry: &'a mut ControllerRegistry,
    states: &'a mut DeviceStates,
    action_sets: &'a ActionSetController,
    glyphs: &'a mut GlyphResolver,
    events: &'a mut FrameEvents,
    frame: FrameStamp,
}

impl Devices<'_> {
    fn record(&mut self, notice: DeviceNotice) {
        match notice {
            DeviceNotice::Attached {
                device,
                handle,
                controller_type,
            } => {
                self.action_sets.on_attached(self.states, device, handle);
                self.glyphs.observe(device, controller_type);
                self.events
                    .push(InputEvent::attached(device, controller_type, self.frame));
            }
            DeviceNotice::Detached { device, reason, .. } => {
                self.action_sets.on_detached(self.states, device);
                self.glyphs.forget(device);
                self.events
                    .push(InputEvent::detached(device, reason, self.frame));
            }
        }
    }

    fn detach_failed(&mut self, failures: Vec<(LogicalDeviceId, NativeError)>) {
        for (device, err) in failures {
            warn!("Detaching device {} after native failure: {}", device, err);
            if let Some(notice) =
                self.registry
                    .detach(device, DetachReason::PollFailure, self.frame.index)
            {
                self.record(notice);
            }
        }
    }
}

struct DeviceGlyphSource<'a> {
    native: &'a mut dyn NativeInput,
    manifest: &'a ActionManifest,
    state: &'a ControllerState,
}

impl GlyphSource for DeviceGlyphSource<'_> {
    fn controller_type(&self) -> ControllerType {
        self.native.controller_type(self.state.handle)
    }

    fn origins(&mut self, action: &str) -> Vec<ActionOrigin> {
        let Some(resolved) = self
            .state
            .relevant_actions()
            .iter()
            .find(|candidate| candidate.name == action)
        else {
            return Vec::new();
        };

        let set = match &resolved.layer {
            Some(layer) => self.manifest.layer(layer).map(|layer| layer.handle),
            None => self
                .manifest
                .action_set(&self.state.selection().set)
                .map(|set| set.handle),
        };
        set.map(|set| {
            self.native
                .action_origins(self.state.handle, set, resolved.handle)
        })
        .unwrap_or_default()
    }

    fn native_glyph(
        &self,
        origin: &ActionOrigin,
        controller_type: ControllerType,
    ) -> Option<String> {
        self.native.origin_glyph(origin, controller_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::virtual_backend::VirtualInput;
    use crate::native::ActionKind;
    use crate::sink::EngineEventKind;
    use std::time::Duration;

    const MANIFEST: &str = r#"
[[action_sets]]
name = "Gameplay"
actions = [ { name = "Jump", type = "digital" }, { name = "Move", type = "joystick" } ]

[[action_sets]]
name = "Menu"
actions = [ { name = "Select", type = "digital" } ]
"#;

    const PAD: ControllerHandle = ControllerHandle(0x20);

    fn input() -> VirtualInput {
        let input = VirtualInput::new();
        input
            .declare_action_set("Gameplay")
            .declare_action_set("Menu")
            .declare_action("Jump", ActionKind::Digital)
            .declare_action("Move", ActionKind::Joystick)
            .declare_action("Select", ActionKind::Digital);
        input
    }

    fn start(input: &VirtualInput) -> InputBridge {
        InputBridge::start(
            Box::new(input.clone()),
            ManifestSource::Text(MANIFEST.to_string()),
            &BridgeSettings::default(),
        )
        .unwrap()
    }

    fn frame(index: u64) -> FrameStamp {
        FrameStamp::new(index, Duration::from_millis(index * 16))
    }

    #[test]
    fn bad_manifest_shuts_session_down() {
        let input = input();
        let result = InputBridge::start(
            Box::new(input.clone()),
            ManifestSource::Text("[[action_sets]]\nname = \"Combat\"".to_string()),
            &BridgeSettings::default(),
        );
        assert!(matches!(result, Err(InputError::Manifest(_))));
        assert!(!input.is_initialized());
        assert_eq!(input.shutdown_calls(), 1);
    }

    #[test]
    fn unknown_default_set_is_fatal() {
        let input = input();
        let settings = BridgeSettings {
            default_action_set: Some("Combat".to_string()),
            ..BridgeSettings::default()
        };
        let result = InputBridge::start(
            Box::new(input.clone()),
            ManifestSource::Text(MANIFEST.to_string()),
            &settings,
        );
        assert!(matches!(result, Err(InputError::UnknownActionSet(_))));
        assert!(!input.is_initialized());
    }

    #[test]
    fn attach_activates_default_set_in_same_frame() {
        let input = input();
        let mut bridge = start(&input);
        input.connect(PAD, ControllerType::SteamDeck);
        input.set_digital(PAD, "Jump", true);

        let batch = bridge.tick(frame(0));
        let kinds = batch.iter().map(|e| e.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                EngineEventKind::DeviceConnected {
                    controller_type: ControllerType::SteamDeck
                },
                EngineEventKind::ButtonPressed,
            ]
        );
        assert_eq!(input.active_action_set(PAD).as_deref(), Some("Gameplay"));
        assert_eq!(input.frames(), 1);
        assert!(bridge.is_managed(LogicalDeviceId(1)));
    }

    #[test]
    fn vibration_maps_strength_to_pulse_length() {
        let input = input();
        let mut bridge = start(&input);
        input.connect(PAD, ControllerType::SteamController);
        bridge.tick(frame(0));

        bridge
            .set_vibration(
                LogicalDeviceId(1),
                ForceFeedback {
                    left_large: 0.5,
                    right_large: 0.0,
                },
            )
            .unwrap();
        assert_eq!(input.haptic_pulses(), vec![(PAD, HapticPad::Left, 2000)]);

        let err = bridge
            .set_vibration(LogicalDeviceId(7), ForceFeedback::default())
            .unwrap_err();
        assert!(matches!(err, InputError::UnknownController(_)));
    }

    #[test]
    fn glyph_follows_active_set_origins() {
        let input = input();
        input.set_origins("Jump", vec![ActionOrigin::new("South")]);
        input.set_glyph("South", ControllerType::PS5, "steam/ps5_cross.svg");
        let mut bridge = start(&input);
        input.connect(PAD, ControllerType::PS5);
        bridge.tick(frame(0));

        assert_eq!(
            bridge.resolve_glyph("Jump", LogicalDeviceId(1)),
            GlyphReference::Icon("steam/ps5_cross.svg".to_string())
        );
        // not relevant under Gameplay
        assert!(bridge
            .resolve_glyph("Select", LogicalDeviceId(1))
            .is_default());
        assert!(bridge.resolve_glyph("Jump", LogicalDeviceId(9)).is_default());
    }

    #[test]
    fn shutdown_is_idempotent_and_stops_frames() {
        let input = input();
        let mut bridge = start(&input);
        input.connect(PAD, ControllerType::Generic);
        bridge.tick(frame(0));

        bridge.shutdown();
        bridge.shutdown();
        assert_eq!(input.shutdown_calls(), 1);
        assert!(!bridge.is_managed(LogicalDeviceId(1)));
        assert!(bridge.tick(frame(1)).is_empty());
        assert_eq!(input.frames(), 1);
    }

    #[test]
    fn dropping_the_bridge_releases_the_session() {
        let input = input();
        {
            let _bridge = start(&input);
        }
        assert_eq!(input.shutdown_calls(), 1);
    }
}
