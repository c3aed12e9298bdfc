// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Rotating Proposer Election
//!
//! Round-robin proposer rotation over one height's validator snapshot.

use istanbul_types::{Address, ConsensusRoundIdentifier};
use std::sync::Arc;

use super::proposer_election::{select_proposer, ProposerElection};
use crate::validator_set::ValidatorSet;

/// Rotating proposer election using round-robin rotation.
///
/// The rotation algorithm:
/// ```text
/// proposer_index = (height + round) % num_validators
/// ```
///
/// Consecutive heights and consecutive rounds both advance the rotation,
/// so a failed proposer is skipped by the next round and does not
/// necessarily lead the next height.
#[derive(Debug, Clone)]
pub struct RotatingProposer {
    validators: Arc<ValidatorSet>,
}

impl RotatingProposer {
    pub fn new(validators: Arc<ValidatorSet>) -> Self {
        Self { validators }
    }

    pub fn validators(&self) -> &Arc<ValidatorSet> {
        &self.validators
    }
}

impl ProposerElection for RotatingProposer {
    fn get_valid_proposer(&self, round: &ConsensusRoundIdentifier) -> Address {
        select_proposer(round, &self.validators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election(n: u8) -> RotatingProposer {
        let set = ValidatorSet::new((1..=n).map(|b| Address::new([b; 20])).collect()).unwrap();
        RotatingProposer::new(Arc::new(set))
    }

    #[test]
    fn test_rotating_proposer_basic() {
        let election = election(3);
        let v = election.validators().as_slice().to_vec();

        let at = |r| election.get_valid_proposer(&ConsensusRoundIdentifier::new(3, r));
        assert_eq!(at(0), v[0]);
        assert_eq!(at(1), v[1]);
        assert_eq!(at(2), v[2]);
        assert_eq!(at(3), v[0]); // Wraps around
    }

    #[test]
    fn test_is_valid_proposer() {
        let election = election(3);
        let v = election.validators().as_slice().to_vec();
        let round = ConsensusRoundIdentifier::new(1, 0);

        assert!(election.is_valid_proposer(&v[1], &round));
        assert!(!election.is_valid_proposer(&v[0], &round));
        assert!(election.is_valid_proposer(&v[2], &round.next_round()));
    }

    #[test]
    fn test_single_proposer() {
        let election = election(1);
        let only = election.validators().as_slice()[0];
        for round in 0..10 {
            let id = ConsensusRoundIdentifier::new(round as u64 * 3, round);
            assert_eq!(election.get_valid_proposer(&id), only);
        }
    }
}
