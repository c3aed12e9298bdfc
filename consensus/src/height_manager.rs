// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus for a single height.
//!
//! ## Round flow
//!
//! ```text
//!  start ─▶ round 0 ─┬─ PROPOSAL ─▶ PREPARE ─▶ quorum ─▶ COMMIT ─▶ quorum ─▶ ImportBlock
//!                    │
//!                    └─ timeout / ROUND_CHANGE quorum above ─▶ round r+1 (RC broadcast)
//!                                                              │
//!                        proposer with RC quorum for r+1 ◀─────┘
//!                        re-proposes the latest prepared block or builds a new one
//! ```
//!
//! The manager never performs I/O: every transition appends the resulting
//! side effects to an [`Action`] list.

use istanbul_types::{
    Address, Block, BlockHeader, CommitPayload, ConsensusConfig, ConsensusMessage,
    ConsensusRoundIdentifier, Hash, PreparePayload, PreparedCertificate, ProposalMessage,
    RoundChangePayload, Signed,
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::block_creator::BlockCreator;
use crate::error::{ConsensusError, ConsensusResult, MessageRejection};
use crate::events::Action;
use crate::extra_data::{block_hash, replace_round};
use crate::future_buffer::FutureMessageBuffer;
use crate::liveness::{round_timeout, ProposerElection, RotatingProposer};
use crate::message_factory::MessageFactory;
use crate::round_change::RoundChangeManager;
use crate::round_state::{RoundPhase, RoundState};
use crate::validation::{Admission, MessageValidator, RoundView};
use crate::validator_set::ValidatorSet;
use crate::vote_proposer::VoteProposer;

/// Collaborators shared by every height, borrowed for one transition.
pub struct HeightContext<'a> {
    pub config: &'a ConsensusConfig,
    pub messages: &'a MessageFactory,
    pub validator: &'a MessageValidator,
    pub blocks: &'a BlockCreator,
    pub votes: &'a VoteProposer,
}

pub struct HeightManager {
    parent: BlockHeader,
    parent_hash: Hash,
    election: RotatingProposer,
    local: Address,
    is_validator: bool,
    round_state: RoundState,
    /// Highest prepared certificate this node reached at this height.
    latest_prepared: Option<PreparedCertificate>,
    round_changes: RoundChangeManager,
    future_rounds: FutureMessageBuffer<u32>,
}

impl HeightManager {
    pub fn new(
        parent: BlockHeader,
        parent_hash: Hash,
        validators: Arc<ValidatorSet>,
        local: Address,
        future_message_limit: usize,
    ) -> Self {
        let round = ConsensusRoundIdentifier::new(parent.number + 1, 0);
        let quorum = validators.quorum_size();
        let election = RotatingProposer::new(validators);
        let is_validator = election.validators().contains(&local);
        let round_state = RoundState::new(round, election.get_valid_proposer(&round), quorum);
        Self {
            parent,
            parent_hash,
            election,
            local,
            is_validator,
            round_state,
            latest_prepared: None,
            round_changes: RoundChangeManager::new(quorum),
            future_rounds: FutureMessageBuffer::new(future_message_limit),
        }
    }

    pub fn height(&self) -> u64 {
        self.parent.number + 1
    }

    pub fn current_round(&self) -> ConsensusRoundIdentifier {
        self.round_state.round()
    }

    pub fn phase(&self) -> RoundPhase {
        self.round_state.phase()
    }

    pub fn validators(&self) -> &Arc<ValidatorSet> {
        self.election.validators()
    }

    pub fn is_validator(&self) -> bool {
        self.is_validator
    }

    pub fn parent_hash(&self) -> Hash {
        self.parent_hash
    }

    /// Digest of the block this node committed at this height.
    pub fn committed_digest(&self) -> Option<Hash> {
        match self.phase() {
            RoundPhase::Committed => self.round_state.proposal_digest(),
            _ => None,
        }
    }

    pub fn latest_prepared(&self) -> Option<&PreparedCertificate> {
        self.latest_prepared.as_ref()
    }

    /// Enter round 0: arm the timer and propose if it is our turn.
    pub fn start(&mut self, ctx: &HeightContext<'_>) -> ConsensusResult<Vec<Action>> {
        let round = self.current_round();
        let mut actions = vec![schedule_timeout(ctx.config, round)];
        debug!(
            %round,
            proposer = %self.round_state.proposer(),
            local_is_proposer = self.is_local_proposer(),
            "Round started"
        );
        self.try_propose(ctx, &mut actions)?;
        Ok(actions)
    }

    pub fn handle_message(
        &mut self,
        message: ConsensusMessage,
        ctx: &HeightContext<'_>,
    ) -> ConsensusResult<Vec<Action>> {
        let mut actions = Vec::new();
        self.process(message, ctx, &mut actions)?;
        Ok(actions)
    }

    /// Abandon the current round if `round` is still current and undecided.
    pub fn handle_round_expiry(
        &mut self,
        round: ConsensusRoundIdentifier,
        ctx: &HeightContext<'_>,
    ) -> ConsensusResult<Vec<Action>> {
        let mut actions = Vec::new();
        if round != self.current_round() || self.phase() == RoundPhase::Committed {
            trace!(%round, current = %self.current_round(), "Ignoring stale round expiry");
            return Ok(actions);
        }
        info!(%round, phase = ?self.phase(), "Round timed out");
        self.advance_to_round(round.round.saturating_add(1), ctx, &mut actions)?;
        Ok(actions)
    }

    fn is_local_proposer(&self) -> bool {
        self.is_validator
            && self
                .election
                .is_valid_proposer(&self.local, &self.round_state.round())
    }

    fn process(
        &mut self,
        message: ConsensusMessage,
        ctx: &HeightContext<'_>,
        actions: &mut Vec<Action>,
    ) -> ConsensusResult<()> {
        let view = RoundView {
            round: self.current_round(),
            validators: self.election.validators(),
            election: &self.election,
            proposal_digest: self.round_state.proposal_digest(),
        };
        match ctx.validator.validate(&message, &view) {
            Admission::Accept => {}
            Admission::Stale => {
                trace!(kind = %message.kind(), round = %message.round_identifier(), "Dropping stale message");
                return Ok(());
            }
            Admission::Future => {
                let round = message.round_identifier().round;
                if !self.future_rounds.push(round, message) {
                    debug!(round, "Future round buffer full, message dropped");
                }
                return Ok(());
            }
            Admission::Reject(reason) => {
                debug!(
                    kind = %message.kind(),
                    author = %message.author(),
                    %reason,
                    "Message rejected"
                );
                return Ok(());
            }
        }

        match message {
            ConsensusMessage::Proposal(proposal) => self.on_proposal(proposal, ctx, actions),
            ConsensusMessage::Prepare(prepare) => self.on_prepare(prepare, ctx, actions),
            ConsensusMessage::Commit(commit) => self.on_commit(commit, ctx, actions),
            ConsensusMessage::RoundChange(rc) => self.on_round_change(rc, ctx, actions),
        }
    }

    fn on_proposal(
        &mut self,
        proposal: ProposalMessage,
        ctx: &HeightContext<'_>,
        actions: &mut Vec<Action>,
    ) -> ConsensusResult<()> {
        let round = self.current_round();
        if let Some(existing) = self.round_state.proposal_digest() {
            match block_hash(&proposal.signed.payload.block.header) {
                Ok(digest) if digest != existing => {
                    let reason = MessageRejection::ConflictingProposal(round);
                    warn!(author = %proposal.signed.author, %digest, %reason, "Proposal ignored");
                }
                _ => trace!(%round, "Duplicate proposal"),
            }
            return Ok(());
        }

        let digest = match ctx.validator.validate_proposal(
            &proposal,
            &self.parent,
            &self.parent_hash,
            self.election.validators(),
            ctx.blocks,
        ) {
            Ok(digest) => digest,
            Err(reason) => {
                warn!(%round, author = %proposal.signed.author, %reason, "Invalid proposal");
                return Ok(());
            }
        };
        self.accept_proposal(proposal, digest, ctx, actions)
    }

    /// Adopt the round's proposal and cast our PREPARE for it.
    fn accept_proposal(
        &mut self,
        proposal: ProposalMessage,
        digest: Hash,
        ctx: &HeightContext<'_>,
        actions: &mut Vec<Action>,
    ) -> ConsensusResult<()> {
        let round = self.current_round();
        debug!(%round, %digest, author = %proposal.signed.author, "Proposal accepted");
        self.round_state.set_proposal(proposal, digest);

        if self.is_validator {
            let prepare = ctx.messages.create_prepare(round, digest)?;
            self.round_state.add_prepare(prepare.clone());
            actions.push(Action::Broadcast(ConsensusMessage::Prepare(prepare)));
        }
        self.check_quorums(ctx, actions)
    }

    fn on_prepare(
        &mut self,
        prepare: Signed<PreparePayload>,
        ctx: &HeightContext<'_>,
        actions: &mut Vec<Action>,
    ) -> ConsensusResult<()> {
        if !self.round_state.add_prepare(prepare) {
            return Ok(());
        }
        self.check_quorums(ctx, actions)
    }

    fn on_commit(
        &mut self,
        commit: Signed<CommitPayload>,
        ctx: &HeightContext<'_>,
        actions: &mut Vec<Action>,
    ) -> ConsensusResult<()> {
        if !self.round_state.add_commit(commit) {
            return Ok(());
        }
        self.check_quorums(ctx, actions)
    }

    fn check_quorums(&mut self, ctx: &HeightContext<'_>, actions: &mut Vec<Action>) -> ConsensusResult<()> {
        let round = self.current_round();

        if let (Some(digest), Some(certificate)) =
            (self.round_state.proposal_digest(), self.round_state.mark_prepared())
        {
            info!(%round, %digest, prepares = certificate.prepares.len(), "Prepared");
            self.latest_prepared = Some(certificate);
            if self.is_validator {
                let commit = ctx.messages.create_commit(round, digest)?;
                self.round_state.add_commit(commit.clone());
                actions.push(Action::Broadcast(ConsensusMessage::Commit(commit)));
            }
        }

        if let Some(block) = self.round_state.mark_committed(self.election.validators())? {
            info!(
                %round,
                digest = %block_hash(&block.header)?,
                "Block committed"
            );
            // Commit is the only cancel point. A prepared round whose COMMITs are lost
            // must still time out and carry its certificate into the next round.
            actions.push(Action::CancelRoundTimeout);
            actions.push(Action::ImportBlock(block));
        }
        Ok(())
    }

    fn on_round_change(
        &mut self,
        round_change: Signed<RoundChangePayload>,
        ctx: &HeightContext<'_>,
        actions: &mut Vec<Action>,
    ) -> ConsensusResult<()> {
        if self.phase() == RoundPhase::Committed {
            return Ok(());
        }
        let target = round_change.payload.round.round;
        let author = round_change.author;
        if !self.round_changes.add(round_change) {
            return Ok(());
        }
        trace!(%author, target, count = self.round_changes.count(target), "Round change recorded");

        let current = self.current_round().round;
        if target > current && self.round_changes.has_quorum(target) {
            info!(from = current, to = target, "Round change quorum for a later round");
            self.advance_to_round(target, ctx, actions)
        } else if target == current {
            self.try_propose(ctx, actions)
        } else {
            Ok(())
        }
    }

    /// Leave the current round for `target`: announce it, reset round
    /// state, re-arm the timer and replay what was buffered for it.
    fn advance_to_round(
        &mut self,
        target: u32,
        ctx: &HeightContext<'_>,
        actions: &mut Vec<Action>,
    ) -> ConsensusResult<()> {
        let next = self.current_round().with_round(target);

        if self.is_validator {
            let rc = ctx
                .messages
                .create_round_change(next, self.latest_prepared.clone())?;
            self.round_changes.add(rc.clone());
            actions.push(Action::Broadcast(ConsensusMessage::RoundChange(rc)));
        }

        let proposer = self.election.get_valid_proposer(&next);
        self.round_state = RoundState::new(next, proposer, self.validators().quorum_size());
        self.round_changes.discard_below(target);
        actions.push(schedule_timeout(ctx.config, next));
        debug!(
            round = %next,
            %proposer,
            prepared = self.latest_prepared.is_some(),
            "Entered round"
        );

        self.try_propose(ctx, actions)?;

        self.future_rounds.discard_below(target);
        for message in self.future_rounds.take(target) {
            self.process(message, ctx, actions)?;
        }
        Ok(())
    }

    /// Propose if we lead the round, have not yet proposed, and (above
    /// round 0) hold a round-change certificate.
    fn try_propose(&mut self, ctx: &HeightContext<'_>, actions: &mut Vec<Action>) -> ConsensusResult<()> {
        if !self.is_local_proposer() || self.round_state.proposal().is_some() {
            return Ok(());
        }
        let round = self.current_round();

        let (block, certificate) = if round.round == 0 {
            match self.build_block(round, ctx)? {
                Some(block) => (block, None),
                None => return Ok(()),
            }
        } else {
            let Some(certificate) = self.round_changes.certificate(round.round) else {
                return Ok(());
            };
            let block = match certificate.latest_prepared() {
                Some(prepared) => {
                    let block = prepared.block();
                    debug!(
                        %round,
                        prepared_round = %prepared.prepared_round(),
                        "Re-proposing prepared block"
                    );
                    Block::new(replace_round(&block.header, round.round)?, block.body.clone())
                }
                None => match self.build_block(round, ctx)? {
                    Some(block) => block,
                    None => return Ok(()),
                },
            };
            (block, Some(certificate))
        };

        let digest = block_hash(&block.header)?;
        let proposal = ctx.messages.create_proposal(round, block, certificate)?;
        info!(%round, %digest, "Proposing block");
        actions.push(Action::Broadcast(ConsensusMessage::Proposal(proposal.clone())));
        self.accept_proposal(proposal, digest, ctx, actions)
    }

    /// A fresh block on top of the parent. Execution failures skip this
    /// proposal and leave the round to time out.
    fn build_block(
        &self,
        round: ConsensusRoundIdentifier,
        ctx: &HeightContext<'_>,
    ) -> ConsensusResult<Option<Block>> {
        let validators = self.validators();
        match ctx.blocks.create_block(
            &self.parent,
            self.parent_hash,
            round.round,
            validators,
            ctx.votes.get_vote(validators),
        ) {
            Ok(block) => Ok(Some(block)),
            Err(ConsensusError::Execution(e)) => {
                warn!(%round, error = %e, "Failed to build block, skipping proposal");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn schedule_timeout(config: &ConsensusConfig, round: ConsensusRoundIdentifier) -> Action {
    Action::ScheduleRoundTimeout {
        round,
        after: round_timeout(config.round_timeout_base(), round.round),
    }
}
