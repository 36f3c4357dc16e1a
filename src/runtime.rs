//! Dedicated-task driver
//!
//! Ticks an [`InputBridge`] on its own tokio task and publishes each
//! non-empty frame batch over an mpsc channel. Shutdown is cooperative:
//! cancelling lets the frame in progress finish, starts no new one, then
//! closes the native session.

use crate::bridge::InputBridge;
use crate::config::BridgeSettings;
use crate::event::FrameStamp;
use crate::sink::{ChannelDispatch, EngineInputEvent, InputDispatch};
use color_eyre::eyre::{eyre, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Frames' worth of time given to queued batches on the way out.
const FLUSH_FRAMES: u32 = 4;

pub struct BridgeHandle {
    token: CancellationToken,
    task: Option<JoinHandle<u64>>,
}

impl BridgeHandle {
    /// Spawns the tick loop. Must be called from within a tokio runtime.
    pub fn spawn(
        bridge: InputBridge,
        settings: &BridgeSettings,
        sender: mpsc::Sender<Vec<EngineInputEvent>>,
    ) -> Self {
        let token = CancellationToken::new();
        let period = settings.tick_interval();
        info!("Spawning input bridge driver with {:?} frames", period);

        let task = tokio::spawn(run_bridge_loop(
            bridge,
            period,
            ChannelDispatch::new(sender),
            token.clone(),
        ));
        debug!("Driver task spawned: {:?}", task);

        Self {
            token,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the driver and waits for it. Returns the number of frames run.
    pub async fn shutdown(&mut self) -> Result<u64> {
        self.token.cancel();
        let Some(task) = self.task.take() else {
            return Ok(0);
        };
        let frames = task
            .await
            .map_err(|e| eyre!("Input bridge driver task failed: {}", e))?;
        info!("Input bridge driver stopped after {} frames", frames);
        Ok(frames)
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_bridge_loop(
    mut bridge: InputBridge,
    period: Duration,
    mut dispatch: ChannelDispatch,
    token: CancellationToken,
) -> u64 {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let mut index = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Driver cancelled before frame {}", index);
                break;
            }
            _ = interval.tick() => {
                let frame = FrameStamp::new(index, started.elapsed());
                index += 1;
                let batch = bridge.tick(frame);
                dispatch.dispatch(batch);
                if dispatch.is_closed() {
                    info!("Input consumer closed, stopping driver");
                    break;
                }
            }
        }
    }

    if dispatch.pending() > 0
        && tokio::time::timeout(period * FLUSH_FRAMES, dispatch.flush())
            .await
            .is_err()
    {
        info!(
            "Driver stopped with {} input batches still queued",
            dispatch.pending()
        );
    }
    bridge.shutdown();
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ManifestSource;
    use crate::native::virtual_backend::VirtualInput;
    use crate::native::{ActionKind, ControllerHandle, ControllerType};
    use crate::sink::EngineEventKind;

    fn bridge(input: &VirtualInput) -> InputBridge {
        input
            .declare_action_set("Gameplay")
            .declare_action("Jump", ActionKind::Digital);
        InputBridge::start(
            Box::new(input.clone()),
            ManifestSource::Text(
                "[[action_sets]]\nname = \"Gameplay\"\nactions = [ { name = \"Jump\", type = \"digital\" } ]"
                    .to_string(),
            ),
            &BridgeSettings {
                tick_interval_ms: 1,
                ..BridgeSettings::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn batches_arrive_and_shutdown_closes_session() {
        let input = VirtualInput::new();
        let bridge = bridge(&input);
        input.connect(ControllerHandle(1), ControllerType::SteamDeck);

        let (sender, mut receiver) = mpsc::channel(16);
        let mut handle = BridgeHandle::spawn(
            bridge,
            &BridgeSettings {
                tick_interval_ms: 1,
                ..BridgeSettings::default()
            },
            sender,
        );

        let first = receiver.recv().await.unwrap();
        assert!(matches!(
            first[0].kind,
            EngineEventKind::DeviceConnected { .. }
        ));

        input.set_digital(ControllerHandle(1), "Jump", true);
        let pressed = receiver.recv().await.unwrap();
        assert_eq!(pressed[0].kind, EngineEventKind::ButtonPressed);

        let frames = handle.shutdown().await.unwrap();
        assert!(frames >= 2);
        assert!(!handle.is_running());
        assert!(!input.is_initialized());
        assert_eq!(input.shutdown_calls(), 1);

        // no frames after shutdown
        let pumped = input.frames();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(input.frames(), pumped);
        assert_eq!(handle.shutdown().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn slow_consumer_still_sees_every_edge() {
        let input = VirtualInput::new();
        let bridge = bridge(&input);
        input.connect(ControllerHandle(1), ControllerType::Generic);

        let (sender, mut receiver) = mpsc::channel(1);
        let mut handle = BridgeHandle::spawn(
            bridge,
            &BridgeSettings {
                tick_interval_ms: 1,
                ..BridgeSettings::default()
            },
            sender,
        );

        tokio::time::sleep(Duration::from_millis(5)).await;
        input.set_digital(ControllerHandle(1), "Jump", true);
        tokio::time::sleep(Duration::from_millis(5)).await;
        input.set_digital(ControllerHandle(1), "Jump", false);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let batch = receiver.recv().await.unwrap();
            kinds.extend(batch.into_iter().map(|event| event.kind));
        }
        assert_eq!(
            kinds,
            vec![
                EngineEventKind::DeviceConnected {
                    controller_type: ControllerType::Generic
                },
                EngineEventKind::ButtonPressed,
                EngineEventKind::ButtonReleased,
            ]
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn closed_consumer_stops_the_driver() {
        let input = VirtualInput::new();
        let bridge = bridge(&input);
        input.connect(ControllerHandle(1), ControllerType::Generic);

        let (sender, receiver) = mpsc::channel(16);
        drop(receiver);
        let mut handle = BridgeHandle::spawn(bridge, &BridgeSettings::default(), sender);

        handle.shutdown().await.unwrap();
        assert_eq!(input.shutdown_calls(), 1);
    }
}
