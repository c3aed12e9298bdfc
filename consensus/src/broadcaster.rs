// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus Broadcaster
//!
//! Outbound side of the peer-to-peer transport. Broadcasting is a
//! non-blocking push: the engine never waits on the network.

use istanbul_types::ConsensusMessage;
use parking_lot::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Outbound channel closed")]
    ChannelClosed,
}

pub type BroadcastResult<T> = Result<T, BroadcastError>;

/// Sends consensus messages to every other validator.
pub trait ConsensusBroadcaster: Send + Sync {
    fn broadcast(&self, message: ConsensusMessage) -> BroadcastResult<()>;
}

/// Hands messages to a transport task through an unbounded queue.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: mpsc::UnboundedSender<ConsensusMessage>,
}

impl ChannelBroadcaster {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConsensusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConsensusBroadcaster for ChannelBroadcaster {
    fn broadcast(&self, message: ConsensusMessage) -> BroadcastResult<()> {
        self.tx
            .send(message)
            .map_err(|_| BroadcastError::ChannelClosed)
    }
}

/// Drops everything. For single-validator networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpBroadcaster;

impl ConsensusBroadcaster for NoOpBroadcaster {
    fn broadcast(&self, _message: ConsensusMessage) -> BroadcastResult<()> {
        Ok(())
    }
}

/// Records broadcast messages for inspection in tests.
#[derive(Debug, Default)]
pub struct MockBroadcaster {
    sent: Mutex<Vec<ConsensusMessage>>,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ConsensusMessage> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<ConsensusMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl ConsensusBroadcaster for MockBroadcaster {
    fn broadcast(&self, message: ConsensusMessage) -> BroadcastResult<()> {
        self.sent.lock().push(message);
        Ok(())
    }
}
