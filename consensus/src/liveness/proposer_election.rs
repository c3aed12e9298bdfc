// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Proposer Election Trait
//!
//! Defines how the proposer of a round is chosen. Different election
//! strategies can be implemented by implementing the `ProposerElection` trait.

use istanbul_types::{Address, ConsensusRoundIdentifier};

use crate::validator_set::ValidatorSet;

/// ProposerElection incorporates the logic of choosing a leader among the
/// validators of a height.
///
/// The proposer of a round is responsible for:
/// 1. Building (or re-proposing) the block for the round
/// 2. Justifying proposals above round 0 with a round-change certificate
/// 3. Broadcasting the PROPOSAL together with its own PREPARE
pub trait ProposerElection: Send + Sync {
    /// Check if a given validator is the proposer for a given round.
    fn is_valid_proposer(&self, author: &Address, round: &ConsensusRoundIdentifier) -> bool {
        self.get_valid_proposer(round) == *author
    }

    /// Return the proposer for a given round.
    fn get_valid_proposer(&self, round: &ConsensusRoundIdentifier) -> Address;
}

/// Deterministic proposer: index `(height + round) mod n` into the set.
pub fn select_proposer(round: &ConsensusRoundIdentifier, validators: &ValidatorSet) -> Address {
    let n = validators.len() as u128;
    let index = (u128::from(round.height) + u128::from(round.round)) % n;
    validators.as_slice()[index as usize]
}
