// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Istanbul BFT Consensus Module
//!
//! This module implements Istanbul Byzantine Fault Tolerant consensus for a
//! permissioned validator set. It includes:
//! - The three-phase round protocol (PROPOSAL, PREPARE, COMMIT)
//! - Round change with prepared and round-change certificates
//! - Validator-set changes voted through block headers
//! - Round-robin proposer election over `(height + round)`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ConsensusEngine                          │
//! │   mailbox ◀── EngineHandle (peers, host, RoundTimer)         │
//! │      │                                                       │
//! │  ┌───▼──────────────────────────────────────────────┐       │
//! │  │                 IbftController                    │       │
//! │  │  - future-height buffer                           │       │
//! │  │  - ValidatorSetProvider (LRU by block digest)     │       │
//! │  │  - VoteProposer                                   │       │
//! │  │  ┌─────────────────────────────────────────────┐  │       │
//! │  │  │               HeightManager                 │  │       │
//! │  │  │  RoundState · RoundChangeManager            │  │       │
//! │  │  │  MessageValidator · ProposerElection        │  │       │
//! │  │  └─────────────────────────────────────────────┘  │       │
//! │  └───────────────────────┬──────────────────────────┘       │
//! │                          │ Vec<Action>                       │
//! │     Broadcast ─▶ ConsensusBroadcaster                        │
//! │     Schedule/CancelRoundTimeout ─▶ RoundTimer                │
//! │     ImportBlock ─▶ BlockImporter                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod block_creator;
pub mod broadcaster;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod extra_data;
pub mod future_buffer;
pub mod header_vote;
pub mod height_manager;
pub mod liveness;
pub mod message_factory;
pub mod round_change;
pub mod round_state;
pub mod validation;
pub mod validator_provider;
pub mod validator_set;
pub mod vote_proposer;

// Re-export main types
pub use backend::{
    BlockImporter, EmptyBlockBuilder, ExecutionBackend, ExecutionError, ImportResult,
    InMemoryBlockStore,
};
pub use block_creator::{genesis_block, BlockCreator};
pub use broadcaster::{
    BroadcastError, BroadcastResult, ChannelBroadcaster, ConsensusBroadcaster, MockBroadcaster,
    NoOpBroadcaster,
};
pub use controller::IbftController;
pub use engine::{ConsensusEngine, EngineHandle};
pub use error::{ConsensusError, ConsensusResult, MessageRejection};
pub use events::{Action, ConsensusEvent};
pub use extra_data::{
    block_hash, replace_round, with_seals, ExtraData, ExtraDataError, ExtraDataResult, Vote,
    VoteType,
};
pub use header_vote::{
    apply_vote_to_header, extract_vote, HeaderVoteError, ValidatorVote, ADD_NONCE, DROP_NONCE,
};
pub use message_factory::MessageFactory;
pub use round_state::RoundPhase;
pub use validation::{
    validate_committed_header, Admission, HeaderValidationError, MessageValidator,
};
pub use validator_provider::ValidatorSetProvider;
pub use validator_set::ValidatorSet;
pub use vote_proposer::VoteProposer;

// Re-export liveness types
pub use liveness::{
    round_timeout, select_proposer, ProposerElection, RotatingProposer, RoundTimer,
};
