// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Bounded buffer for messages that arrive ahead of the local node.
//!
//! Keyed by height (controller) or round (height manager). When full, the
//! messages furthest in the future are evicted first.

use istanbul_types::ConsensusMessage;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug)]
pub struct FutureMessageBuffer<K> {
    limit: usize,
    len: usize,
    messages: BTreeMap<K, Vec<ConsensusMessage>>,
}

impl<K: Ord + Copy + std::fmt::Debug> FutureMessageBuffer<K> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            len: 0,
            messages: BTreeMap::new(),
        }
    }

    /// Buffer `message` under `key`. Returns false if it was dropped.
    pub fn push(&mut self, key: K, message: ConsensusMessage) -> bool {
        if self.limit == 0 {
            return false;
        }
        if self.len >= self.limit {
            let Some(highest) = self.messages.keys().next_back().copied() else {
                return false;
            };
            if key >= highest {
                trace!(?key, "Future buffer full, dropping message");
                return false;
            }
            self.evict(highest);
        }
        self.messages.entry(key).or_default().push(message);
        self.len += 1;
        true
    }

    fn evict(&mut self, key: K) {
        if let Some(bucket) = self.messages.get_mut(&key) {
            bucket.pop();
            self.len -= 1;
            if bucket.is_empty() {
                self.messages.remove(&key);
            }
            trace!(?key, "Evicted buffered message");
        }
    }

    /// Remove and return the messages buffered under `key`.
    pub fn take(&mut self, key: K) -> Vec<ConsensusMessage> {
        let taken = self.messages.remove(&key).unwrap_or_default();
        self.len -= taken.len();
        taken
    }

    /// Drop every message keyed below `key`.
    pub fn discard_below(&mut self, key: K) {
        let kept = self.messages.split_off(&key);
        let dropped: usize = self.messages.values().map(Vec::len).sum();
        self.messages = kept;
        self.len -= dropped;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
