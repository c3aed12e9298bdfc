// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Block and header types.
//!
//! The consensus engine treats the body as opaque; only the header fields
//! it owns (`coinbase`, `nonce`, `extra_data`) carry consensus meaning.

use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Hash};

/// An opaque transaction as handed over by the execution layer.
pub type Transaction = Vec<u8>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_hash: Hash,
    pub number: u64,
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    /// Vote subject, or the zero address when the block casts no vote.
    pub coinbase: Address,
    /// Vote polarity sentinel.
    pub nonce: u64,
    pub state_root: Hash,
    pub transactions_root: Hash,
    /// Consensus payload, see the consensus crate's extra-data codec.
    pub extra_data: Vec<u8>,
}

impl BlockHeader {
    /// Hash of all header fields with `extra_data` replaced by `extra`.
    ///
    /// Callers pass a normalized extra-data encoding so that the digest is
    /// independent of the parts that vary after sealing.
    pub fn hash_with_extra(&self, extra: &[u8]) -> crate::IstanbulResult<Hash> {
        Hash::of_encoded(&(
            &self.parent_hash,
            self.number,
            self.timestamp,
            &self.coinbase,
            self.nonce,
            &self.state_root,
            &self.transactions_root,
            extra,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockBody {
    pub transactions: Vec<Transaction>,
}

impl BlockBody {
    pub fn transactions_root(&self) -> crate::IstanbulResult<Hash> {
        Hash::of_encoded(&self.transactions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn new(header: BlockHeader, body: BlockBody) -> Self {
        Self { header, body }
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            parent_hash: Hash::ZERO,
            number: 1,
            timestamp: 1_000,
            coinbase: Address::ZERO,
            nonce: 0,
            state_root: Hash::ZERO,
            transactions_root: Hash::ZERO,
            extra_data: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_hash_with_extra_ignores_stored_extra() {
        let a = header();
        let mut b = header();
        b.extra_data = vec![9, 9];
        assert_eq!(a.hash_with_extra(&[5]).unwrap(), b.hash_with_extra(&[5]).unwrap());
        assert_ne!(a.hash_with_extra(&[5]).unwrap(), a.hash_with_extra(&[6]).unwrap());
    }

    #[test]
    fn test_hash_covers_vote_fields() {
        let a = header();
        let mut b = header();
        b.nonce = u64::MAX;
        assert_ne!(a.hash_with_extra(&[]).unwrap(), b.hash_with_extra(&[]).unwrap());
    }
}
