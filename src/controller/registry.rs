//! Controller registry
//!
//! Maps native [`ControllerHandle`]s to [`LogicalDeviceId`]s. Every id is
//! minted once per session; under [`ReattachPolicy::ReuseRecent`] a handle
//! that comes back shortly after detaching may get its own previous id back,
//! but an id is never given to a different handle.
//!
//! A handle detached because its reads failed is suspended: it is not
//! re-attached while it stays enumerated until the caller [`resume`]s it
//! after a successful trial read. A handle that leaves the enumeration is
//! no longer suspended.
//!
//! [`resume`]: ControllerRegistry::resume

use super::LogicalDeviceId;
use crate::error::UnknownControllerError;
use crate::event::DetachReason;
use crate::native::{ControllerHandle, ControllerType, NativeError, NativeInput};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// What happens when a handle re-appears after a detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReattachPolicy {
    /// Always mint a fresh id.
    #[default]
    NewId,
    /// Give the handle its previous id back if it returns within the grace window.
    ReuseRecent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceNotice {
    Attached {
        device: LogicalDeviceId,
        handle: ControllerHandle,
        controller_type: ControllerType,
    },
    Detached {
        device: LogicalDeviceId,
        handle: ControllerHandle,
        reason: DetachReason,
    },
}

#[derive(Debug, Clone)]
struct Registration {
    device: LogicalDeviceId,
    handle: ControllerHandle,
    controller_type: ControllerType,
}

#[derive(Debug, Clone, Copy)]
struct Retired {
    device: LogicalDeviceId,
    frame: u64,
}

#[derive(Debug)]
pub struct ControllerRegistry {
    policy: ReattachPolicy,
    grace_frames: u64,
    next_id: u32,
    attached: Vec<Registration>,
    retired: HashMap<ControllerHandle, Retired>,
    suspended: Vec<ControllerHandle>,
}

impl ControllerRegistry {
    pub fn new(policy: ReattachPolicy, grace_frames: u64) -> Self {
        Self {
            policy,
            grace_frames,
            next_id: 1,
            attached: Vec::new(),
            retired: HashMap::new(),
            suspended: Vec::new(),
        }
    }

    /// Diffs the native enumeration against the registered set.
    ///
    /// Detach notices come first (registration order), then attach notices
    /// in native enumeration order. Suspended handles are skipped. On
    /// enumeration failure the registry is left untouched.
    pub fn refresh(
        &mut self,
        native: &mut dyn NativeInput,
        frame: u64,
    ) -> Result<Vec<DeviceNotice>, NativeError> {
        let current = native.connected_controllers()?;
        let mut notices = Vec::new();

        let gone = self
            .attached
            .iter()
            .filter(|registration| !current.contains(&registration.handle))
            .map(|registration| registration.device)
            .collect::<Vec<_>>();
        for device in gone {
            notices.extend(self.detach(device, DetachReason::Unplugged, frame));
        }

        self.suspended.retain(|handle| {
            let present = current.contains(handle);
            if !present {
                debug!("Suspended controller {} left the enumeration", handle);
            }
            present
        });

        for handle in current {
            if self.resolve(handle).is_ok() || self.suspended.contains(&handle) {
                continue;
            }
            let controller_type = native.controller_type(handle);
            let device = self.assign_id(handle, frame);
            info!(
                "Controller {} attached as device {} ({})",
                handle, device, controller_type
            );
            self.attached.push(Registration {
                device,
                handle,
                controller_type,
            });
            notices.push(DeviceNotice::Attached {
                device,
                handle,
                controller_type,
            });
        }

        self.prune_retired(frame);
        Ok(notices)
    }

    /// Removes a device right away, e.g. after a failed read.
    pub fn detach(
        &mut self,
        device: LogicalDeviceId,
        reason: DetachReason,
        frame: u64,
    ) -> Option<DeviceNotice> {
        let index = self
            .attached
            .iter()
            .position(|registration| registration.device == device)?;
        let registration = self.attached.remove(index);
        info!(
            "Controller {} detached from device {} ({:?})",
            registration.handle, device, reason
        );
        self.retired.insert(
            registration.handle,
            Retired {
                device,
                frame,
            },
        );
        if reason == DetachReason::PollFailure && !self.suspended.contains(&registration.handle) {
            self.suspended.push(registration.handle);
        }
        Some(DeviceNotice::Detached {
            device,
            handle: registration.handle,
            reason,
        })
    }

    pub fn resolve(&self, handle: ControllerHandle) -> Result<LogicalDeviceId, UnknownControllerError> {
        self.attached
            .iter()
            .find(|registration| registration.handle == handle)
            .map(|registration| registration.device)
            .ok_or(UnknownControllerError::Handle(handle))
    }

    pub fn handle_of(&self, device: LogicalDeviceId) -> Result<ControllerHandle, UnknownControllerError> {
        self.registration(device).map(|registration| registration.handle)
    }

    /// Type observed when the device attached.
    pub fn controller_type(
        &self,
        device: LogicalDeviceId,
    ) -> Result<ControllerType, UnknownControllerError> {
        self.registration(device)
            .map(|registration| registration.controller_type)
    }

    pub fn is_attached(&self, device: LogicalDeviceId) -> bool {
        self.registration(device).is_ok()
    }

    /// Attached devices in attach order.
    pub fn devices(&self) -> Vec<LogicalDeviceId> {
        self.attached
            .iter()
            .map(|registration| registration.device)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    /// Handles held back after a failed read, oldest first.
    pub fn suspended(&self) -> &[ControllerHandle] {
        &self.suspended
    }

    /// Lets a suspended handle attach again on the next refresh.
    pub fn resume(&mut self, handle: ControllerHandle) -> bool {
        let Some(index) = self.suspended.iter().position(|h| *h == handle) else {
            return false;
        };
        self.suspended.remove(index);
        info!("Controller {} recovered, attaching on refresh", handle);
        true
    }

    /// Forgets every device without emitting notices.
    pub fn clear(&mut self) {
        self.attached.clear();
        self.retired.clear();
        self.suspended.clear();
    }

    fn registration(&self, device: LogicalDeviceId) -> Result<&Registration, UnknownControllerError> {
        self.attached
            .iter()
            .find(|registration| registration.device == device)
            .ok_or(UnknownControllerError::Device(device))
    }

    fn assign_id(&mut self, handle: ControllerHandle, frame: u64) -> LogicalDeviceId {
        if self.policy == ReattachPolicy::ReuseRecent {
            if let Some(retired) = self.retired.remove(&handle) {
                if frame.saturating_sub(retired.frame) <= self.grace_frames {
                    debug!(
                        "Reusing device {} for returning controller {}",
                        retired.device, handle
                    );
                    return retired.device;
                }
            }
        }

        let device = LogicalDeviceId(self.next_id);
        self.next_id += 1;
        device
    }

    fn prune_retired(&mut self, frame: u64) {
        match self.policy {
            ReattachPolicy::NewId => self.retired.clear(),
            ReattachPolicy::ReuseRecent => {
                let grace = self.grace_frames;
                self.retired
                    .retain(|_, retired| frame.saturating_sub(retired.frame) <= grace);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::virtual_backend::VirtualInput;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn started() -> VirtualInput {
        let mut input = VirtualInput::new();
        input.init().unwrap();
        input
    }

    #[test]
    fn attach_then_detach() {
        let mut input = started();
        let mut registry = ControllerRegistry::new(ReattachPolicy::NewId, 1);

        input.connect(ControllerHandle(10), ControllerType::PS5);
        let notices = registry.refresh(&mut input, 0).unwrap();
        assert_eq!(
            notices,
            vec![DeviceNotice::Attached {
                device: LogicalDeviceId(1),
                handle: ControllerHandle(10),
                controller_type: ControllerType::PS5,
            }]
        );
        assert_eq!(registry.resolve(ControllerHandle(10)), Ok(LogicalDeviceId(1)));

        // steady state produces nothing
        assert!(registry.refresh(&mut input, 1).unwrap().is_empty());

        input.disconnect(ControllerHandle(10));
        let notices = registry.refresh(&mut input, 2).unwrap();
        assert_eq!(
            notices,
            vec![DeviceNotice::Detached {
                device: LogicalDeviceId(1),
                handle: ControllerHandle(10),
                reason: DetachReason::Unplugged,
            }]
        );
        assert_eq!(
            registry.resolve(ControllerHandle(10)),
            Err(UnknownControllerError::Handle(ControllerHandle(10)))
        );
    }

    #[test]
    fn new_id_policy_never_reuses() {
        let mut input = started();
        let mut registry = ControllerRegistry::new(ReattachPolicy::NewId, 5);

        input.connect(ControllerHandle(7), ControllerType::XboxOne);
        registry.refresh(&mut input, 0).unwrap();
        input.disconnect(ControllerHandle(7));
        registry.refresh(&mut input, 1).unwrap();
        input.connect(ControllerHandle(7), ControllerType::XboxOne);
        registry.refresh(&mut input, 2).unwrap();

        assert_eq!(registry.resolve(ControllerHandle(7)), Ok(LogicalDeviceId(2)));
    }

    #[test]
    fn reuse_recent_within_grace_window() {
        let mut input = started();
        let mut registry = ControllerRegistry::new(ReattachPolicy::ReuseRecent, 1);

        input.connect(ControllerHandle(7), ControllerType::SteamDeck);
        registry.refresh(&mut input, 0).unwrap();
        input.disconnect(ControllerHandle(7));
        registry.refresh(&mut input, 1).unwrap();
        input.connect(ControllerHandle(7), ControllerType::SteamDeck);
        registry.refresh(&mut input, 2).unwrap();
        assert_eq!(registry.resolve(ControllerHandle(7)), Ok(LogicalDeviceId(1)));

        // outside the window a fresh id is minted
        input.disconnect(ControllerHandle(7));
        registry.refresh(&mut input, 3).unwrap();
        registry.refresh(&mut input, 4).unwrap();
        registry.refresh(&mut input, 5).unwrap();
        input.connect(ControllerHandle(7), ControllerType::SteamDeck);
        registry.refresh(&mut input, 6).unwrap();
        assert_eq!(registry.resolve(ControllerHandle(7)), Ok(LogicalDeviceId(2)));
    }

    #[test]
    fn immediate_detach_is_reported_once() {
        let mut input = started();
        let mut registry = ControllerRegistry::new(ReattachPolicy::NewId, 1);
        input.connect(ControllerHandle(1), ControllerType::Generic);
        registry.refresh(&mut input, 0).unwrap();

        let notice = registry.detach(LogicalDeviceId(1), DetachReason::PollFailure, 0);
        assert!(matches!(
            notice,
            Some(DeviceNotice::Detached {
                reason: DetachReason::PollFailure,
                ..
            })
        ));
        assert!(registry
            .detach(LogicalDeviceId(1), DetachReason::PollFailure, 0)
            .is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn failed_handle_stays_out_until_resumed() {
        let mut input = started();
        let mut registry = ControllerRegistry::new(ReattachPolicy::NewId, 1);
        input.connect(ControllerHandle(3), ControllerType::PS4);
        registry.refresh(&mut input, 0).unwrap();
        registry.detach(LogicalDeviceId(1), DetachReason::PollFailure, 0);

        for frame in 1..5 {
            assert!(registry.refresh(&mut input, frame).unwrap().is_empty());
        }
        assert_eq!(registry.suspended(), &[ControllerHandle(3)]);

        assert!(registry.resume(ControllerHandle(3)));
        assert!(!registry.resume(ControllerHandle(3)));
        let notices = registry.refresh(&mut input, 5).unwrap();
        assert!(matches!(
            notices.as_slice(),
            [DeviceNotice::Attached {
                device: LogicalDeviceId(2),
                ..
            }]
        ));
    }

    #[test]
    fn suspension_ends_when_handle_leaves() {
        let mut input = started();
        let mut registry = ControllerRegistry::new(ReattachPolicy::NewId, 1);
        input.connect(ControllerHandle(3), ControllerType::PS4);
        registry.refresh(&mut input, 0).unwrap();
        registry.detach(LogicalDeviceId(1), DetachReason::PollFailure, 0);

        input.disconnect(ControllerHandle(3));
        registry.refresh(&mut input, 1).unwrap();
        assert!(registry.suspended().is_empty());

        input.connect(ControllerHandle(3), ControllerType::PS4);
        assert_eq!(registry.refresh(&mut input, 2).unwrap().len(), 1);
    }

    #[test]
    fn enumeration_failure_leaves_registry_untouched() {
        let mut input = VirtualInput::new();
        let mut registry = ControllerRegistry::new(ReattachPolicy::NewId, 1);
        assert!(registry.refresh(&mut input, 0).is_err());
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn ids_are_unique_and_stable(
            script in proptest::collection::vec((0u64..4, any::<bool>()), 1..64),
            reuse in any::<bool>(),
        ) {
            let policy = if reuse { ReattachPolicy::ReuseRecent } else { ReattachPolicy::NewId };
            let mut input = started();
            let mut registry = ControllerRegistry::new(policy, 1);
            let mut owner: HashMap<LogicalDeviceId, ControllerHandle> = HashMap::new();
            let mut previous: HashMap<ControllerHandle, LogicalDeviceId> = HashMap::new();

            for (frame, (handle, connect)) in script.into_iter().enumerate() {
                let handle = ControllerHandle(handle);
                if connect {
                    input.connect(handle, ControllerType::Generic);
                } else {
                    input.disconnect(handle);
                }
                registry.refresh(&mut input, frame as u64).unwrap();

                let mut seen = HashSet::new();
                for device in registry.devices() {
                    prop_assert!(seen.insert(device));
                    let handle = registry.handle_of(device).unwrap();
                    // an id always belongs to the same handle
                    prop_assert_eq!(*owner.entry(device).or_insert(handle), handle);
                    // an attached handle keeps its id between frames
                    if let Some(last) = previous.get(&handle) {
                        if registry.is_attached(*last) {
                            prop_assert_eq!(*last, device);
                        }
                    }
                    previous.insert(handle, device);
                }
            }
        }
    }
}
