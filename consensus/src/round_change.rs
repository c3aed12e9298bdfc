// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Round-change tally for the current height.
//!
//! Collects at most one ROUND_CHANGE per author and target round. A quorum
//! for a round above the local one moves the node there; a quorum for the
//! local round lets its proposer build the round-change certificate.

use istanbul_types::{Address, RoundChangeCertificate, RoundChangePayload, Signed};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct RoundChangeManager {
    quorum: usize,
    requests: BTreeMap<u32, BTreeMap<Address, Signed<RoundChangePayload>>>,
}

impl RoundChangeManager {
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum,
            requests: BTreeMap::new(),
        }
    }

    /// Record a request. Returns false if the author already asked for
    /// this round.
    pub fn add(&mut self, round_change: Signed<RoundChangePayload>) -> bool {
        let round = round_change.payload.round.round;
        let by_author = self.requests.entry(round).or_default();
        if by_author.contains_key(&round_change.author) {
            return false;
        }
        by_author.insert(round_change.author, round_change);
        true
    }

    pub fn count(&self, round: u32) -> usize {
        self.requests.get(&round).map_or(0, BTreeMap::len)
    }

    pub fn has_quorum(&self, round: u32) -> bool {
        self.count(round) >= self.quorum
    }

    /// The certificate for `round`, once a quorum asked for it.
    pub fn certificate(&self, round: u32) -> Option<RoundChangeCertificate> {
        if !self.has_quorum(round) {
            return None;
        }
        let round_changes = self.requests.get(&round)?.values().cloned().collect();
        Some(RoundChangeCertificate { round_changes })
    }

    /// Forget requests for rounds below `round`.
    pub fn discard_below(&mut self, round: u32) {
        self.requests = self.requests.split_off(&round);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use istanbul_types::{ConsensusRoundIdentifier, Signature};

    fn rc(author: u8, round: u32) -> Signed<RoundChangePayload> {
        Signed {
            payload: RoundChangePayload {
                round: ConsensusRoundIdentifier::new(1, round),
                prepared: None,
            },
            author: Address::new([author; 20]),
            signature: Signature::from_bytes(&[author; 64]),
        }
    }

    #[test]
    fn test_quorum_per_round() {
        let mut manager = RoundChangeManager::new(3);
        assert!(manager.add(rc(1, 1)));
        assert!(manager.add(rc(2, 1)));
        assert!(manager.add(rc(3, 2)));
        assert!(!manager.has_quorum(1));
        assert!(manager.certificate(1).is_none());

        assert!(manager.add(rc(3, 1)));
        let cert = manager.certificate(1).unwrap();
        assert_eq!(cert.round_changes.len(), 3);
        assert!(cert.round_changes.iter().all(|r| r.payload.round.round == 1));
    }

    #[test]
    fn test_one_request_per_author_and_round() {
        let mut manager = RoundChangeManager::new(3);
        assert!(manager.add(rc(1, 1)));
        assert!(!manager.add(rc(1, 1)));
        assert!(manager.add(rc(1, 2)));
        assert_eq!(manager.count(1), 1);
    }

    #[test]
    fn test_discard_below() {
        let mut manager = RoundChangeManager::new(1);
        manager.add(rc(1, 1));
        manager.add(rc(1, 3));
        manager.discard_below(2);
        assert_eq!(manager.count(1), 0);
        assert_eq!(manager.count(3), 1);
    }
}
