// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Inputs and outputs of the consensus state machine.
//!
//! Every input arrives as a [`ConsensusEvent`] through the engine mailbox.
//! Every side effect leaves as an [`Action`] returned from a transition and
//! executed by the engine once the transition has completed.

use istanbul_types::{Address, Block, BlockHeader, ConsensusMessage, ConsensusRoundIdentifier};
use std::time::Duration;

use crate::extra_data::VoteType;

#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    /// A message received from a peer.
    Message(ConsensusMessage),
    /// The round timer for this round fired.
    RoundExpiry(ConsensusRoundIdentifier),
    /// A block was appended to the canonical chain.
    NewChainHead(BlockHeader),
    /// Start voting for a validator change in blocks we propose.
    ProposeVote { subject: Address, vote_type: VoteType },
    /// Stop voting about `subject`.
    DiscardVote { subject: Address },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send to every other validator.
    Broadcast(ConsensusMessage),
    /// Replace the round timer.
    ScheduleRoundTimeout {
        round: ConsensusRoundIdentifier,
        after: Duration,
    },
    CancelRoundTimeout,
    /// Hand a committed block to the block importer.
    ImportBlock(Block),
}
