// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Header rules for proposed and committed blocks.

use istanbul_types::{Address, BlockHeader, Hash, SignatureVerifier};

use crate::extra_data::{block_hash, ExtraData, ExtraDataError};
use crate::header_vote::{check_vote_consistency, HeaderVoteError};
use crate::validator_set::ValidatorSet;

#[derive(Debug, thiserror::Error)]
pub enum HeaderValidationError {
    #[error("Expected block #{expected}, got #{got}")]
    NumberMismatch { expected: u64, got: u64 },

    #[error("Parent hash {got} does not match parent {expected}")]
    ParentMismatch { expected: Hash, got: Hash },

    #[error("Timestamp {got} precedes parent timestamp {parent}")]
    TimestampRegression { parent: u64, got: u64 },

    #[error("Extra-data validators do not match the active set")]
    ValidatorMismatch,

    #[error("Extra-data round {got} does not match round {expected}")]
    RoundMismatch { expected: u32, got: u32 },

    #[error("Proposed header already carries {0} seals")]
    UnexpectedSeals(usize),

    #[error("Only {got} committed seals, {need} required")]
    InsufficientSeals { got: usize, need: usize },

    #[error("Committed seal {0} is not from an active validator")]
    InvalidSeal(usize),

    #[error("Validator {0} sealed the block twice")]
    DuplicateSeal(Address),

    #[error(transparent)]
    ExtraData(#[from] ExtraDataError),

    #[error(transparent)]
    Vote(#[from] HeaderVoteError),
}

/// Check an unsealed header proposed for `round` on top of `parent`.
///
/// Returns the decoded extra-data.
pub fn validate_proposed_header(
    header: &BlockHeader,
    parent: &BlockHeader,
    parent_hash: &Hash,
    validators: &ValidatorSet,
    round: u32,
) -> Result<ExtraData, HeaderValidationError> {
    if header.number != parent.number + 1 {
        return Err(HeaderValidationError::NumberMismatch {
            expected: parent.number + 1,
            got: header.number,
        });
    }
    if header.parent_hash != *parent_hash {
        return Err(HeaderValidationError::ParentMismatch {
            expected: *parent_hash,
            got: header.parent_hash,
        });
    }
    if header.timestamp < parent.timestamp {
        return Err(HeaderValidationError::TimestampRegression {
            parent: parent.timestamp,
            got: header.timestamp,
        });
    }

    let extra = ExtraData::decode_from_header(header)?;
    if extra.validators != validators.as_slice() {
        return Err(HeaderValidationError::ValidatorMismatch);
    }
    if extra.round != round {
        return Err(HeaderValidationError::RoundMismatch {
            expected: round,
            got: extra.round,
        });
    }
    if !extra.seals.is_empty() {
        return Err(HeaderValidationError::UnexpectedSeals(extra.seals.len()));
    }
    check_vote_consistency(header, &extra)?;
    Ok(extra)
}

/// Attribute every committed seal of `header` to a distinct validator.
pub fn committed_seal_signers(
    header: &BlockHeader,
    validators: &ValidatorSet,
    verifier: &dyn SignatureVerifier,
) -> Result<Vec<Address>, HeaderValidationError> {
    let extra = ExtraData::decode_from_header(header)?;
    let digest = block_hash(header)?;

    let mut signers: Vec<Address> = Vec::with_capacity(extra.seals.len());
    for (index, seal) in extra.seals.iter().enumerate() {
        let signer = validators
            .iter()
            .find(|v| verifier.verify(v, &digest, seal))
            .copied()
            .ok_or(HeaderValidationError::InvalidSeal(index))?;
        if signers.contains(&signer) {
            return Err(HeaderValidationError::DuplicateSeal(signer));
        }
        signers.push(signer);
    }
    Ok(signers)
}

/// A block is final only with seals from a quorum of the active set.
pub fn validate_committed_header(
    header: &BlockHeader,
    validators: &ValidatorSet,
    verifier: &dyn SignatureVerifier,
) -> Result<Vec<Address>, HeaderValidationError> {
    let extra = ExtraData::decode_from_header(header)?;
    if extra.validators != validators.as_slice() {
        return Err(HeaderValidationError::ValidatorMismatch);
    }
    check_vote_consistency(header, &extra)?;

    let signers = committed_seal_signers(header, validators, verifier)?;
    if signers.len() < validators.quorum_size() {
        return Err(HeaderValidationError::InsufficientSeals {
            got: signers.len(),
            need: validators.quorum_size(),
        });
    }
    Ok(signers)
}
