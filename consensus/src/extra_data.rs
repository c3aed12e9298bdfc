// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Header Extra-Data Codec
//!
//! Every block header carries a consensus payload in `extra_data`:
//!
//! ```text
//! ┌────────────────────┬──────────────────────┬──────────┬─────────────────┐
//! │ validators         │ vote                 │ round    │ seals           │
//! │ Vec<Address>       │ Option<Vote>         │ u32      │ Vec<Signature>  │
//! └────────────────────┴──────────────────────┴──────────┴─────────────────┘
//! ```
//!
//! encoded with bcs. The block digest is computed over the header with the
//! extra-data re-encoded with `seals` cleared and `round` set to 0, so the
//! same block sealed by different quorums, or re-proposed in a later round,
//! keeps one identity.

use istanbul_types::{Address, BlockHeader, Hash, IstanbulError, Signature};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Polarity of a validator vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoteType {
    Add,
    Drop,
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteType::Add => f.write_str("ADD"),
            VoteType::Drop => f.write_str("DROP"),
        }
    }
}

/// The vote recorded in extra-data. Mirrors the header's coinbase/nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vote {
    pub subject: Address,
    pub vote_type: VoteType,
}

impl Vote {
    pub fn new(subject: Address, vote_type: VoteType) -> Self {
        Self { subject, vote_type }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtraDataError {
    #[error("Malformed extra data: {0}")]
    Malformed(bcs::Error),

    #[error("Extra data encoding failed: {0}")]
    Encoding(bcs::Error),

    #[error("Extra data lists no validators")]
    EmptyValidators,

    #[error("Validator {0} listed twice in extra data")]
    DuplicateValidator(Address),

    #[error("Header hashing failed: {0}")]
    Hashing(#[from] IstanbulError),
}

pub type ExtraDataResult<T> = Result<T, ExtraDataError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraData {
    pub validators: Vec<Address>,
    pub vote: Option<Vote>,
    pub round: u32,
    pub seals: Vec<Signature>,
}

impl ExtraData {
    /// Extra-data of an unsealed header.
    pub fn new(validators: Vec<Address>, vote: Option<Vote>, round: u32) -> Self {
        Self {
            validators,
            vote,
            round,
            seals: Vec::new(),
        }
    }

    pub fn encode(&self) -> ExtraDataResult<Vec<u8>> {
        bcs::to_bytes(self).map_err(ExtraDataError::Encoding)
    }

    /// Decode and check structural rules.
    ///
    /// bcs rejects both truncated input and trailing bytes.
    pub fn decode(bytes: &[u8]) -> ExtraDataResult<Self> {
        let extra: ExtraData = bcs::from_bytes(bytes).map_err(ExtraDataError::Malformed)?;
        if extra.validators.is_empty() {
            return Err(ExtraDataError::EmptyValidators);
        }
        let mut seen = HashSet::with_capacity(extra.validators.len());
        for validator in &extra.validators {
            if !seen.insert(*validator) {
                return Err(ExtraDataError::DuplicateValidator(*validator));
            }
        }
        Ok(extra)
    }

    pub fn decode_from_header(header: &BlockHeader) -> ExtraDataResult<Self> {
        Self::decode(&header.extra_data)
    }

    /// Encoding used for the block digest.
    fn digest_encoding(&self) -> ExtraDataResult<Vec<u8>> {
        let normalized = ExtraData {
            validators: self.validators.clone(),
            vote: self.vote,
            round: 0,
            seals: Vec::new(),
        };
        normalized.encode()
    }
}

/// The block digest: what PREPARE/COMMIT reference, what seals sign and
/// what children use as `parent_hash`.
pub fn block_hash(header: &BlockHeader) -> ExtraDataResult<Hash> {
    let extra = ExtraData::decode_from_header(header)?;
    Ok(header.hash_with_extra(&extra.digest_encoding()?)?)
}

/// Copy of `header` stamped with `round`. Seals are cleared.
pub fn replace_round(header: &BlockHeader, round: u32) -> ExtraDataResult<BlockHeader> {
    let mut extra = ExtraData::decode_from_header(header)?;
    extra.round = round;
    extra.seals.clear();
    let mut updated = header.clone();
    updated.extra_data = extra.encode()?;
    Ok(updated)
}

/// Copy of `header` carrying the given committed seals.
pub fn with_seals(header: &BlockHeader, seals: Vec<Signature>) -> ExtraDataResult<BlockHeader> {
    let mut extra = ExtraData::decode_from_header(header)?;
    extra.seals = seals;
    let mut updated = header.clone();
    updated.extra_data = extra.encode()?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    fn header_with(extra: &ExtraData) -> BlockHeader {
        BlockHeader {
            parent_hash: Hash::ZERO,
            number: 7,
            timestamp: 42,
            coinbase: Address::ZERO,
            nonce: 0,
            state_root: Hash::ZERO,
            transactions_root: Hash::ZERO,
            extra_data: extra.encode().unwrap(),
        }
    }

    #[test]
    fn test_encode_decode() {
        let extra = ExtraData {
            validators: vec![addr(1), addr(2), addr(3)],
            vote: Some(Vote::new(addr(9), VoteType::Add)),
            round: 4,
            seals: vec![Signature::from_bytes(&[7; 64])],
        };
        let decoded = ExtraData::decode(&extra.encode().unwrap()).unwrap();
        assert_eq!(decoded, extra);
    }

    #[test]
    fn test_decode_rejects_truncated_and_trailing() {
        let bytes = ExtraData::new(vec![addr(1), addr(2)], None, 0).encode().unwrap();

        let truncated = &bytes[..bytes.len() - 1];
        assert!(matches!(
            ExtraData::decode(truncated),
            Err(ExtraDataError::Malformed(_))
        ));

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            ExtraData::decode(&trailing),
            Err(ExtraDataError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_validator_lists() {
        let empty = ExtraData::new(vec![], None, 0).encode().unwrap();
        assert!(matches!(
            ExtraData::decode(&empty),
            Err(ExtraDataError::EmptyValidators)
        ));

        let dup = ExtraData::new(vec![addr(1), addr(2), addr(1)], None, 0)
            .encode()
            .unwrap();
        assert!(matches!(
            ExtraData::decode(&dup),
            Err(ExtraDataError::DuplicateValidator(a)) if a == addr(1)
        ));
    }

    #[test]
    fn test_block_hash_ignores_seals_and_round() {
        let header = header_with(&ExtraData::new(vec![addr(1), addr(2)], None, 0));
        let base = block_hash(&header).unwrap();

        let sealed = with_seals(&header, vec![Signature::from_bytes(&[1; 64])]).unwrap();
        assert_eq!(block_hash(&sealed).unwrap(), base);

        let later = replace_round(&header, 3).unwrap();
        assert_eq!(ExtraData::decode_from_header(&later).unwrap().round, 3);
        assert_eq!(block_hash(&later).unwrap(), base);
    }

    #[test]
    fn test_block_hash_covers_validators_and_vote() {
        let plain = header_with(&ExtraData::new(vec![addr(1), addr(2)], None, 0));
        let voting = header_with(&ExtraData::new(
            vec![addr(1), addr(2)],
            Some(Vote::new(addr(3), VoteType::Add)),
            0,
        ));
        let other_set = header_with(&ExtraData::new(vec![addr(2), addr(1)], None, 0));

        let h = block_hash(&plain).unwrap();
        assert_ne!(h, block_hash(&voting).unwrap());
        assert_ne!(h, block_hash(&other_set).unwrap());
    }

    #[test]
    fn test_replace_round_clears_seals() {
        let header = header_with(&ExtraData::new(vec![addr(1)], None, 0));
        let sealed = with_seals(&header, vec![Signature::from_bytes(&[1; 64])]).unwrap();
        let moved = replace_round(&sealed, 2).unwrap();
        assert!(ExtraData::decode_from_header(&moved).unwrap().seals.is_empty());
    }
}
