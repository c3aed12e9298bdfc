// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Locally requested validator votes.
//!
//! The operator asks the node to vote for adding or dropping validators;
//! every block this node proposes carries the first request that would
//! still change the set.

use istanbul_types::Address;
use std::collections::BTreeMap;
use tracing::info;

use crate::extra_data::{Vote, VoteType};
use crate::validator_set::ValidatorSet;

#[derive(Debug, Default)]
pub struct VoteProposer {
    votes: BTreeMap<Address, VoteType>,
}

impl VoteProposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote request, replacing any previous one for `subject`.
    pub fn insert(&mut self, subject: Address, vote_type: VoteType) {
        info!(%subject, %vote_type, "Validator vote requested");
        self.votes.insert(subject, vote_type);
    }

    pub fn discard(&mut self, subject: &Address) {
        if self.votes.remove(subject).is_some() {
            info!(%subject, "Validator vote discarded");
        }
    }

    /// The vote to place in a block proposed on top of `validators`.
    pub fn get_vote(&self, validators: &ValidatorSet) -> Option<Vote> {
        self.votes
            .iter()
            .find(|(subject, vote_type)| !validators.is_redundant(subject, **vote_type))
            .map(|(subject, vote_type)| Vote::new(*subject, *vote_type))
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn test_skips_redundant_votes() {
        let validators = ValidatorSet::new(vec![addr(1), addr(2)]).unwrap();
        let mut votes = VoteProposer::new();
        votes.insert(addr(1), VoteType::Add);
        votes.insert(addr(9), VoteType::Drop);
        assert_eq!(votes.get_vote(&validators), None);

        votes.insert(addr(5), VoteType::Add);
        assert_eq!(votes.get_vote(&validators), Some(Vote::new(addr(5), VoteType::Add)));
    }

    #[test]
    fn test_discard_and_replace() {
        let validators = ValidatorSet::new(vec![addr(1), addr(2)]).unwrap();
        let mut votes = VoteProposer::new();
        votes.insert(addr(2), VoteType::Add);
        votes.insert(addr(2), VoteType::Drop);
        assert_eq!(votes.len(), 1);
        assert_eq!(votes.get_vote(&validators), Some(Vote::new(addr(2), VoteType::Drop)));

        votes.discard(&addr(2));
        assert!(votes.is_empty());
        assert_eq!(votes.get_vote(&validators), None);
    }
}
