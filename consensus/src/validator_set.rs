// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Validator Set Management
//!
//! The ordered set of validators active at a height. Order is insertion
//! order and drives proposer rotation, so every honest node must derive the
//! identical list. Sets are immutable: applying a vote yields a new set.

use istanbul_types::Address;
use std::collections::HashSet;
use tracing::warn;

use crate::error::{ConsensusError, ConsensusResult};
use crate::extra_data::VoteType;
use crate::header_vote::ValidatorVote;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<Address>,
}

impl ValidatorSet {
    /// Build a set from an ordered list. Later duplicates are ignored.
    pub fn new(validators: Vec<Address>) -> ConsensusResult<Self> {
        if validators.is_empty() {
            return Err(ConsensusError::EmptyValidatorSet);
        }
        let mut seen = HashSet::with_capacity(validators.len());
        let validators = validators.into_iter().filter(|v| seen.insert(*v)).collect();
        Ok(Self { validators })
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Always false: an empty set cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.validators.contains(address)
    }

    pub fn index_of(&self, address: &Address) -> Option<usize> {
        self.validators.iter().position(|v| v == address)
    }

    pub fn get(&self, index: usize) -> Option<&Address> {
        self.validators.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.validators.iter()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.validators
    }

    pub fn to_vec(&self) -> Vec<Address> {
        self.validators.clone()
    }

    /// Minimum number of distinct validators for a certificate: `⌊2n/3⌋ + 1`.
    ///
    /// Any two quorums share more than `max_faulty()` members.
    pub fn quorum_size(&self) -> usize {
        self.len() * 2 / 3 + 1
    }

    /// Number of byzantine validators tolerated: `⌊(n-1)/3⌋`.
    pub fn max_faulty(&self) -> usize {
        (self.len() - 1) / 3
    }

    /// True if applying the vote would leave the set unchanged.
    pub fn is_redundant(&self, subject: &Address, vote_type: VoteType) -> bool {
        match vote_type {
            VoteType::Add => self.contains(subject),
            VoteType::Drop => !self.contains(subject),
        }
    }

    /// Apply a vote, returning the resulting set.
    ///
    /// Redundant votes are no-ops. A drop that would empty the set is
    /// discarded.
    pub fn apply_vote(&self, vote: &ValidatorVote) -> ValidatorSet {
        if self.is_redundant(&vote.subject, vote.vote_type) {
            return self.clone();
        }
        match vote.vote_type {
            VoteType::Add => {
                let mut validators = self.validators.clone();
                validators.push(vote.subject);
                ValidatorSet { validators }
            }
            VoteType::Drop => {
                if self.len() == 1 {
                    warn!(
                        subject = %vote.subject,
                        proposer = %vote.proposer,
                        "Ignoring vote that would drop the last validator"
                    );
                    return self.clone();
                }
                let validators = self
                    .validators
                    .iter()
                    .copied()
                    .filter(|v| *v != vote.subject)
                    .collect();
                ValidatorSet { validators }
            }
        }
    }
}
