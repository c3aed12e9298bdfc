// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Collaborator interfaces of the consensus engine and in-memory
//! implementations for development networks and tests.
//!
//! - [`ExecutionBackend`] builds and validates block bodies
//! - [`BlockImporter`] appends committed blocks and tracks the chain head

use async_trait::async_trait;
use istanbul_types::{Block, BlockBody, BlockHeader, Hash};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::extra_data::block_hash;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("Block building failed: {0}")]
    BuildFailed(String),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),
}

/// The execution engine as seen by consensus.
///
/// Consensus overwrites the header fields it owns (`parent_hash`, `number`,
/// `coinbase`, `nonce`, `extra_data`) on candidate blocks.
pub trait ExecutionBackend: Send + Sync {
    /// Build a candidate block on top of `parent`.
    fn build_candidate_block(&self, parent: &BlockHeader) -> Result<Block, ExecutionError>;

    /// Check a proposed block's body and execution results.
    fn validate_block(&self, parent: &BlockHeader, block: &Block) -> Result<(), ExecutionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportResult {
    Accepted,
    Rejected(String),
}

/// The append-only block store.
#[async_trait]
pub trait BlockImporter: Send + Sync {
    async fn import_block(&self, block: Block) -> ImportResult;

    async fn chain_head(&self) -> BlockHeader;

    async fn header_by_number(&self, number: u64) -> Option<BlockHeader>;
}

/// Execution backend producing empty blocks.
///
/// Timestamps advance by one millisecond per block so that runs are
/// reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBlockBuilder;

impl ExecutionBackend for EmptyBlockBuilder {
    fn build_candidate_block(&self, parent: &BlockHeader) -> Result<Block, ExecutionError> {
        let body = BlockBody::default();
        let transactions_root = body
            .transactions_root()
            .map_err(|e| ExecutionError::BuildFailed(e.to_string()))?;
        let header = BlockHeader {
            parent_hash: Hash::ZERO,
            number: parent.number + 1,
            timestamp: parent.timestamp + 1,
            coinbase: Default::default(),
            nonce: 0,
            state_root: parent.state_root,
            transactions_root,
            extra_data: Vec::new(),
        };
        Ok(Block::new(header, body))
    }

    fn validate_block(&self, parent: &BlockHeader, block: &Block) -> Result<(), ExecutionError> {
        let root = block
            .body
            .transactions_root()
            .map_err(|e| ExecutionError::InvalidBlock(e.to_string()))?;
        if root != block.header.transactions_root {
            return Err(ExecutionError::InvalidBlock("transactions root mismatch".into()));
        }
        if block.header.state_root != parent.state_root {
            return Err(ExecutionError::InvalidBlock("unexpected state root".into()));
        }
        Ok(())
    }
}

/// Block store kept in memory. Accepts only children of the current head.
#[derive(Debug)]
pub struct InMemoryBlockStore {
    genesis: Block,
    /// Blocks above genesis, in order.
    blocks: RwLock<Vec<Block>>,
}

impl InMemoryBlockStore {
    pub fn new(genesis: Block) -> Self {
        Self {
            genesis,
            blocks: RwLock::new(Vec::new()),
        }
    }

    pub fn height(&self) -> u64 {
        self.blocks
            .read()
            .last()
            .map(|b| b.number())
            .unwrap_or(self.genesis.number())
    }

    pub fn block(&self, number: u64) -> Option<Block> {
        let offset = number.checked_sub(self.genesis.number())?;
        if offset == 0 {
            return Some(self.genesis.clone());
        }
        self.blocks.read().get(offset as usize - 1).cloned()
    }

    /// The whole chain, genesis first.
    pub fn blocks(&self) -> Vec<Block> {
        let mut chain = vec![self.genesis.clone()];
        chain.extend(self.blocks.read().iter().cloned());
        chain
    }

    fn check_link(head: &Block, block: &Block) -> Result<(), String> {
        if block.number() != head.number() + 1 {
            return Err(format!(
                "block #{} does not extend head #{}",
                block.number(),
                head.number()
            ));
        }
        let head_hash = block_hash(&head.header).map_err(|e| e.to_string())?;
        if block.header.parent_hash != head_hash {
            return Err(format!(
                "parent hash {} does not match head {}",
                block.header.parent_hash, head_hash
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BlockImporter for InMemoryBlockStore {
    async fn import_block(&self, block: Block) -> ImportResult {
        let mut blocks = self.blocks.write();
        let head = blocks.last().unwrap_or(&self.genesis);
        if let Err(reason) = Self::check_link(head, &block) {
            warn!(number = block.number(), %reason, "Rejecting block import");
            return ImportResult::Rejected(reason);
        }
        debug!(number = block.number(), "Block imported");
        blocks.push(block);
        ImportResult::Accepted
    }

    async fn chain_head(&self) -> BlockHeader {
        let blocks = self.blocks.read();
        blocks.last().unwrap_or(&self.genesis).header.clone()
    }

    async fn header_by_number(&self, number: u64) -> Option<BlockHeader> {
        self.block(number).map(|b| b.header)
    }
}
