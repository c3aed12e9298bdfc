// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Block construction: genesis blocks and proposal candidates.

use istanbul_types::{Address, Block, BlockBody, BlockHeader, Hash};
use std::sync::Arc;

use crate::backend::{ExecutionBackend, ExecutionError};
use crate::error::ConsensusResult;
use crate::extra_data::{ExtraData, ExtraDataError, Vote};
use crate::header_vote::{apply_vote_to_header, DROP_NONCE};
use crate::validator_set::ValidatorSet;

/// Genesis block listing the initial validators, in order.
pub fn genesis_block(validators: &[Address], timestamp: u64) -> Result<Block, ExtraDataError> {
    if validators.is_empty() {
        return Err(ExtraDataError::EmptyValidators);
    }
    let body = BlockBody::default();
    let header = BlockHeader {
        parent_hash: Hash::ZERO,
        number: 0,
        timestamp,
        coinbase: Address::ZERO,
        nonce: DROP_NONCE,
        state_root: Hash::ZERO,
        transactions_root: body.transactions_root()?,
        extra_data: ExtraData::new(validators.to_vec(), None, 0).encode()?,
    };
    // Round-trip through the decoder so duplicate entries are refused here.
    ExtraData::decode_from_header(&header)?;
    Ok(Block::new(header, body))
}

/// Turns execution candidates into consensus blocks.
pub struct BlockCreator {
    execution: Arc<dyn ExecutionBackend>,
}

impl BlockCreator {
    pub fn new(execution: Arc<dyn ExecutionBackend>) -> Self {
        Self { execution }
    }

    /// Build the block for `round` on top of `parent`, stamping the
    /// consensus-owned header fields.
    pub fn create_block(
        &self,
        parent: &BlockHeader,
        parent_hash: Hash,
        round: u32,
        validators: &ValidatorSet,
        vote: Option<Vote>,
    ) -> ConsensusResult<Block> {
        let mut block = self.execution.build_candidate_block(parent)?;
        let header = &mut block.header;
        header.parent_hash = parent_hash;
        header.number = parent.number + 1;
        header.timestamp = header.timestamp.max(parent.timestamp);
        apply_vote_to_header(header, vote);
        header.extra_data = ExtraData::new(validators.to_vec(), vote, round).encode()?;
        Ok(block)
    }

    pub fn validate_block(&self, parent: &BlockHeader, block: &Block) -> Result<(), ExecutionError> {
        self.execution.validate_block(parent, block)
    }
}
