// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Validator votes carried in block headers.
//!
//! A header casts at most one vote through two fields: `coinbase` names the
//! subject and `nonce` carries the polarity. The all-zero coinbase means no
//! vote, in which case the nonce is written as the DROP value.

use istanbul_types::{Address, BlockHeader};

use crate::extra_data::{ExtraData, ExtraDataError, Vote, VoteType};

/// Nonce of a header voting to add its coinbase.
pub const ADD_NONCE: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Nonce of a header voting to drop its coinbase, or casting no vote.
pub const DROP_NONCE: u64 = 0x0;

const VOTE_NONCES: [(VoteType, u64); 2] = [(VoteType::Add, ADD_NONCE), (VoteType::Drop, DROP_NONCE)];

pub fn nonce_for(vote_type: VoteType) -> u64 {
    VOTE_NONCES
        .iter()
        .find(|(t, _)| *t == vote_type)
        .map(|(_, nonce)| *nonce)
        .unwrap_or(DROP_NONCE)
}

pub fn vote_type_for(nonce: u64) -> Option<VoteType> {
    VOTE_NONCES
        .iter()
        .find(|(_, n)| *n == nonce)
        .map(|(t, _)| *t)
}

/// A vote cast by a block proposer, interpreted against the parent's set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidatorVote {
    pub vote_type: VoteType,
    pub proposer: Address,
    pub subject: Address,
}

#[derive(Debug, thiserror::Error)]
pub enum HeaderVoteError {
    #[error("Nonce {0:#x} is not a vote value")]
    InvalidNonce(u64),

    #[error("Extra-data vote {extra:?} does not match header vote fields {carried:?}")]
    Mismatch {
        extra: Option<Vote>,
        carried: Option<Vote>,
    },

    #[error(transparent)]
    ExtraData(#[from] ExtraDataError),
}

/// The vote encoded in `coinbase`/`nonce`, without attribution.
///
/// A nonce outside the vote table is invalid even when no vote is cast.
pub fn carried_vote(header: &BlockHeader) -> Result<Option<Vote>, HeaderVoteError> {
    let vote_type = vote_type_for(header.nonce).ok_or(HeaderVoteError::InvalidNonce(header.nonce))?;
    if header.coinbase.is_zero() {
        return Ok(None);
    }
    Ok(Some(Vote::new(header.coinbase, vote_type)))
}

/// Read the vote cast by `proposer` in `header`.
pub fn extract_vote(
    header: &BlockHeader,
    proposer: Address,
) -> Result<Option<ValidatorVote>, HeaderVoteError> {
    Ok(carried_vote(header)?.map(|vote| ValidatorVote {
        vote_type: vote.vote_type,
        proposer,
        subject: vote.subject,
    }))
}

/// Write `vote` into the header's vote fields.
pub fn apply_vote_to_header(header: &mut BlockHeader, vote: Option<Vote>) {
    match vote {
        Some(vote) => {
            header.coinbase = vote.subject;
            header.nonce = nonce_for(vote.vote_type);
        }
        None => {
            header.coinbase = Address::ZERO;
            header.nonce = DROP_NONCE;
        }
    }
}

/// The extra-data vote and the header vote fields must agree.
pub fn check_vote_consistency(
    header: &BlockHeader,
    extra: &ExtraData,
) -> Result<(), HeaderVoteError> {
    let carried = carried_vote(header)?;
    if carried != extra.vote {
        return Err(HeaderVoteError::Mismatch {
            extra: extra.vote,
            carried,
        });
    }
    Ok(())
}
