//! Batch handoff to another task over a bounded tokio channel.
//!
//! One message is one complete frame batch, so a receiver never observes
//! half a frame. When the channel is full the batch is queued locally and
//! flushed in order ahead of later frames; the tick never waits on the
//! receiver and no edge is lost.

use super::{EngineInputEvent, InputDispatch};
use std::collections::VecDeque;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct ChannelDispatch {
    sender: mpsc::Sender<Vec<EngineInputEvent>>,
    backlog: VecDeque<Vec<EngineInputEvent>>,
}

impl ChannelDispatch {
    pub fn new(sender: mpsc::Sender<Vec<EngineInputEvent>>) -> Self {
        Self {
            sender,
            backlog: VecDeque::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Batches waiting for room in the channel.
    pub fn pending(&self) -> usize {
        self.backlog.len()
    }

    /// Waits until every queued batch is in the channel.
    pub async fn flush(&mut self) {
        while let Some(batch) = self.backlog.pop_front() {
            if self.sender.send(batch).await.is_err() {
                debug!("Input consumer is gone, discarding queued batches");
                self.backlog.clear();
                return;
            }
        }
    }

    fn drain(&mut self) {
        while let Some(batch) = self.backlog.pop_front() {
            match self.sender.try_send(batch) {
                Ok(()) => {}
                Err(TrySendError::Full(batch)) => {
                    self.backlog.push_front(batch);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Input consumer is gone");
                    self.backlog.clear();
                    return;
                }
            }
        }
    }
}

impl InputDispatch for ChannelDispatch {
    fn dispatch(&mut self, batch: Vec<EngineInputEvent>) {
        if !batch.is_empty() {
            self.backlog.push_back(batch);
        }
        self.drain();

        if !self.backlog.is_empty() {
            warn!(
                "Input consumer is behind, {} batches queued",
                self.backlog.len()
            );
        }
    }
}
