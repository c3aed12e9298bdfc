// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Round timer.
//!
//! At most one round timeout is outstanding. Each timeout is a tokio task
//! that sleeps and then enqueues [`ConsensusEvent::RoundExpiry`] into the
//! engine mailbox; scheduling a new one aborts the previous task.

use istanbul_types::ConsensusRoundIdentifier;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::events::ConsensusEvent;

/// Timeout of `round`: grows linearly, `base × (round + 1)`.
pub fn round_timeout(base: Duration, round: u32) -> Duration {
    base.saturating_mul(round.saturating_add(1))
}

pub struct RoundTimer {
    current: Option<(ConsensusRoundIdentifier, JoinHandle<()>)>,
    /// Weak so that a pending timer does not keep the mailbox open.
    events: mpsc::WeakSender<ConsensusEvent>,
}

impl RoundTimer {
    pub fn new(events: mpsc::WeakSender<ConsensusEvent>) -> Self {
        Self {
            current: None,
            events,
        }
    }

    /// Arm the timer for `round`, cancelling any outstanding timeout.
    pub fn schedule(&mut self, round: ConsensusRoundIdentifier, after: Duration) {
        self.cancel();

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            trace!(%round, "Round timer fired");
            if let Some(tx) = events.upgrade() {
                // Engine gone means nobody cares about the expiry.
                let _ = tx.send(ConsensusEvent::RoundExpiry(round)).await;
            }
        });

        debug!(%round, ?after, "Round timer set");
        self.current = Some((round, handle));
    }

    /// If no timer is running this is a no-op.
    pub fn cancel(&mut self) {
        if let Some((round, handle)) = self.current.take() {
            handle.abort();
            trace!(%round, "Round timer cancelled");
        }
    }

    pub fn current_round(&self) -> Option<ConsensusRoundIdentifier> {
        self.current.as_ref().map(|(round, _)| *round)
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
