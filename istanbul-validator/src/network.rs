// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! In-process transport between validators.
//!
//! Each validator broadcasts through a `ChannelBroadcaster`; one routing
//! task per validator drains that queue and delivers every message to all
//! other validators' engine handles. Silenced validators still receive but
//! their outbound messages are discarded.

use consensus::EngineHandle;
use istanbul_types::{Address, ConsensusMessage};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A validator as seen by the transport.
#[derive(Debug, Clone)]
pub struct Peer {
    pub address: Address,
    pub handle: EngineHandle,
}

pub struct LocalNetwork {
    routes: Vec<JoinHandle<()>>,
}

impl LocalNetwork {
    /// Start routing. `outbound` pairs each validator with its outbound queue.
    pub fn connect(
        peers: Vec<Peer>,
        outbound: Vec<(Address, mpsc::UnboundedReceiver<ConsensusMessage>)>,
        silent: &HashSet<Address>,
    ) -> Self {
        let peers = Arc::new(peers);
        let routes = outbound
            .into_iter()
            .map(|(from, rx)| {
                let peers = Arc::clone(&peers);
                let silenced = silent.contains(&from);
                tokio::spawn(route(from, rx, peers, silenced))
            })
            .collect();
        Self { routes }
    }

    /// Stop every routing task.
    pub fn shutdown(self) {
        for route in self.routes {
            route.abort();
        }
    }
}

async fn route(
    from: Address,
    mut rx: mpsc::UnboundedReceiver<ConsensusMessage>,
    peers: Arc<Vec<Peer>>,
    silenced: bool,
) {
    while let Some(message) = rx.recv().await {
        if silenced {
            trace!(%from, kind = %message.kind(), "Discarding message from silenced validator");
            continue;
        }
        for peer in peers.iter().filter(|p| p.address != from) {
            if peer.handle.deliver(message.clone()).await.is_err() {
                debug!(to = %peer.address, "Peer mailbox closed");
            }
        }
    }
    trace!(%from, "Outbound queue closed");
}
