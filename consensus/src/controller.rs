// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Multi-height driver of the consensus state machine.
//!
//! The controller owns the [`HeightManager`] of the height being decided,
//! routes events to it, buffers messages for upcoming heights and starts the
//! next height whenever the canonical chain advances. It is synchronous and
//! deterministic: the same events in the same order produce the same
//! actions.

use istanbul_types::{
    Address, BlockHeader, ConsensusConfig, ConsensusMessage, ConsensusRoundIdentifier, Hash,
    NodeSigner, Payload, SignatureVerifier,
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::backend::ExecutionBackend;
use crate::block_creator::BlockCreator;
use crate::error::{ConsensusError, ConsensusResult};
use crate::events::{Action, ConsensusEvent};
use crate::extra_data::block_hash;
use crate::future_buffer::FutureMessageBuffer;
use crate::height_manager::{HeightContext, HeightManager};
use crate::message_factory::MessageFactory;
use crate::validation::{validate_committed_header, MessageValidator};
use crate::validator_provider::ValidatorSetProvider;
use crate::validator_set::ValidatorSet;
use crate::vote_proposer::VoteProposer;

pub struct IbftController {
    config: Arc<ConsensusConfig>,
    messages: MessageFactory,
    validator: MessageValidator,
    blocks: BlockCreator,
    votes: VoteProposer,
    validator_sets: ValidatorSetProvider,
    future_heights: FutureMessageBuffer<u64>,
    height: Option<HeightManager>,
}

impl IbftController {
    pub fn new(
        config: Arc<ConsensusConfig>,
        signer: Arc<dyn NodeSigner>,
        verifier: Arc<dyn SignatureVerifier>,
        execution: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            validator_sets: ValidatorSetProvider::new(config.validator_cache_size),
            future_heights: FutureMessageBuffer::new(config.future_message_limit),
            messages: MessageFactory::new(signer),
            validator: MessageValidator::new(verifier),
            blocks: BlockCreator::new(execution),
            votes: VoteProposer::new(),
            height: None,
            config,
        }
    }

    pub fn local_address(&self) -> Address {
        self.messages.local_address()
    }

    /// Round currently being decided, once started.
    pub fn current_round(&self) -> Option<ConsensusRoundIdentifier> {
        self.height.as_ref().map(HeightManager::current_round)
    }

    pub fn current_validators(&self) -> Option<&Arc<ValidatorSet>> {
        self.height.as_ref().map(HeightManager::validators)
    }

    /// Check a canonical chain, genesis first, before consensus starts.
    pub fn verify_chain(&mut self, headers: &[BlockHeader]) -> ConsensusResult<()> {
        self.validator_sets
            .replay_chain(headers, self.validator.verifier())?;
        Ok(())
    }

    /// Begin deciding the block after `head`.
    pub fn start(&mut self, head: BlockHeader) -> ConsensusResult<Vec<Action>> {
        let validators = self.validator_sets.validators_after(&head)?;
        if validators.contains(&self.local_address()) {
            self.check_signer()?;
        }
        self.start_height(head)
    }

    /// A validator whose signatures its peers cannot verify would stall
    /// every round it leads.
    fn check_signer(&self) -> ConsensusResult<()> {
        let sample = self
            .messages
            .create_prepare(ConsensusRoundIdentifier::default(), Hash::ZERO)?;
        let digest = sample.payload.signing_digest()?;
        if !self
            .validator
            .verifier()
            .verify(&sample.author, &digest, &sample.signature)
        {
            return Err(ConsensusError::SignerUnusable(sample.author));
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: ConsensusEvent) -> ConsensusResult<Vec<Action>> {
        match event {
            ConsensusEvent::Message(message) => self.on_message(message),
            ConsensusEvent::RoundExpiry(round) => self.on_round_expiry(round),
            ConsensusEvent::NewChainHead(header) => self.on_new_chain_head(header),
            ConsensusEvent::ProposeVote { subject, vote_type } => {
                self.votes.insert(subject, vote_type);
                Ok(Vec::new())
            }
            ConsensusEvent::DiscardVote { subject } => {
                self.votes.discard(&subject);
                Ok(Vec::new())
            }
            ConsensusEvent::Shutdown => Ok(Vec::new()),
        }
    }

    fn on_message(&mut self, message: ConsensusMessage) -> ConsensusResult<Vec<Action>> {
        let Some(current) = self.height.as_ref().map(HeightManager::height) else {
            trace!("Consensus not started, dropping message");
            return Ok(Vec::new());
        };
        let height = message.height();

        if height < current {
            trace!(height, current, kind = %message.kind(), "Dropping message for past height");
            return Ok(Vec::new());
        }
        if height > current {
            if height - current > self.config.future_height_window {
                debug!(height, current, "Dropping message beyond future height window");
            } else if !self.future_heights.push(height, message) {
                debug!(height, "Future height buffer full, message dropped");
            }
            return Ok(Vec::new());
        }

        let (ctx, manager) = self.split();
        match manager {
            Some(manager) => manager.handle_message(message, &ctx),
            None => Ok(Vec::new()),
        }
    }

    fn on_round_expiry(&mut self, round: ConsensusRoundIdentifier) -> ConsensusResult<Vec<Action>> {
        let (ctx, manager) = self.split();
        match manager {
            Some(manager) if manager.height() == round.height => {
                manager.handle_round_expiry(round, &ctx)
            }
            _ => {
                trace!(%round, "Round expiry for another height");
                Ok(Vec::new())
            }
        }
    }

    /// Heads must arrive one height at a time. A head is trusted without
    /// checks only when it is the block this node just committed.
    fn on_new_chain_head(&mut self, header: BlockHeader) -> ConsensusResult<Vec<Action>> {
        let Some(manager) = &self.height else {
            trace!(number = header.number, "Consensus not started, ignoring chain head");
            return Ok(Vec::new());
        };
        let height = manager.height();
        if header.number < height {
            trace!(number = header.number, "Chain head already known");
            return Ok(Vec::new());
        }
        if header.number > height {
            // The validator set active at that height is unknown here.
            warn!(number = header.number, current = height, "Ignoring chain head beyond the current height");
            return Ok(Vec::new());
        }

        let digest = match block_hash(&header) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(number = header.number, error = %e, "Ignoring undecodable chain head");
                return Ok(Vec::new());
            }
        };
        if manager.committed_digest() != Some(digest) {
            if header.parent_hash != manager.parent_hash() {
                warn!(number = header.number, %digest, "Ignoring chain head on another parent");
                return Ok(Vec::new());
            }
            if let Err(e) =
                validate_committed_header(&header, manager.validators(), self.validator.verifier())
            {
                warn!(number = header.number, error = %e, "Ignoring chain head with invalid seals");
                return Ok(Vec::new());
            }
            info!(number = header.number, %digest, "Adopting chain head decided elsewhere");
        }
        self.start_height(header)
    }

    /// The shared collaborators next to the current height's manager.
    fn split(&mut self) -> (HeightContext<'_>, Option<&mut HeightManager>) {
        let ctx = HeightContext {
            config: &self.config,
            messages: &self.messages,
            validator: &self.validator,
            blocks: &self.blocks,
            votes: &self.votes,
        };
        (ctx, self.height.as_mut())
    }

    fn start_height(&mut self, head: BlockHeader) -> ConsensusResult<Vec<Action>> {
        let parent_hash = block_hash(&head).map_err(|e| ConsensusError::InvalidCanonicalHeader {
            number: head.number,
            reason: e.to_string(),
        })?;
        let validators = self.validator_sets.validators_after(&head)?;
        let height = head.number + 1;
        let local = self.messages.local_address();
        info!(
            height,
            validators = validators.len(),
            is_validator = validators.contains(&local),
            "Starting height"
        );

        let mut manager = HeightManager::new(
            head,
            parent_hash,
            validators,
            local,
            self.config.future_message_limit,
        );
        let ctx = HeightContext {
            config: &self.config,
            messages: &self.messages,
            validator: &self.validator,
            blocks: &self.blocks,
            votes: &self.votes,
        };
        let mut actions = manager.start(&ctx)?;

        self.future_heights.discard_below(height);
        for message in self.future_heights.take(height) {
            actions.extend(manager.handle_message(message, &ctx)?);
        }
        self.height = Some(manager);
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmptyBlockBuilder;
    use crate::block_creator::genesis_block;
    use crate::extra_data::{with_seals, ExtraData, VoteType};
    use istanbul_keys::{KeyRegistry, NodeKeyPair};
    use istanbul_types::Block;

    struct Fixture {
        controllers: Vec<IbftController>,
        genesis: Block,
    }

    fn fixture(n: u32) -> Fixture {
        let keys: Vec<_> = (0..n).map(NodeKeyPair::dev).collect();
        let registry: Arc<KeyRegistry> = Arc::new(keys.iter().map(|k| k.public()).collect());
        let addresses: Vec<_> = keys.iter().map(|k| k.address()).collect();
        let config = Arc::new(ConsensusConfig::default());
        let controllers = keys
            .into_iter()
            .map(|k| {
                IbftController::new(
                    Arc::clone(&config),
                    Arc::new(k),
                    registry.clone(),
                    Arc::new(EmptyBlockBuilder),
                )
            })
            .collect();
        Fixture {
            controllers,
            genesis: genesis_block(&addresses, 0).unwrap(),
        }
    }

    fn imported(actions: &[Action]) -> Option<Block> {
        actions.iter().find_map(|a| match a {
            Action::ImportBlock(b) => Some(b.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_single_validator_commits_immediately() {
        let mut f = fixture(1);
        let node = &mut f.controllers[0];
        let actions = node.start(f.genesis.header.clone()).unwrap();
        let block = imported(&actions).unwrap();
        assert_eq!(block.number(), 1);
        assert_eq!(ExtraData::decode_from_header(&block.header).unwrap().seals.len(), 1);

        let actions = node.handle_event(ConsensusEvent::NewChainHead(block.header)).unwrap();
        assert_eq!(node.current_round(), Some(ConsensusRoundIdentifier::new(2, 0)));
        assert_eq!(imported(&actions).unwrap().number(), 2);
    }

    #[test]
    fn test_unverifiable_signer_is_fatal() {
        let keys: Vec<_> = (0..4).map(NodeKeyPair::dev).collect();
        let addresses: Vec<_> = keys.iter().map(|k| k.address()).collect();
        // The registry lacks validator 0's key.
        let registry: KeyRegistry = keys.iter().skip(1).map(|k| k.public()).collect();
        let mut node = IbftController::new(
            Arc::new(ConsensusConfig::default()),
            Arc::new(NodeKeyPair::dev(0)),
            Arc::new(registry),
            Arc::new(EmptyBlockBuilder),
        );
        let genesis = genesis_block(&addresses, 0).unwrap();
        assert!(matches!(
            node.start(genesis.header),
            Err(ConsensusError::SignerUnusable(_))
        ));
    }

    #[test]
    fn test_messages_before_start_are_dropped() {
        let mut f = fixture(4);
        let prepare = MessageFactory::new(Arc::new(NodeKeyPair::dev(1)))
            .create_prepare(ConsensusRoundIdentifier::new(1, 0), Hash::ZERO)
            .unwrap();
        let actions = f.controllers[0]
            .handle_event(ConsensusEvent::Message(ConsensusMessage::Prepare(prepare)))
            .unwrap();
        assert!(actions.is_empty());
        assert!(f.controllers[0].current_round().is_none());
    }

    #[test]
    fn test_future_height_messages_are_buffered_within_window() {
        let mut f = fixture(4);
        let genesis = f.genesis.header.clone();
        let node = &mut f.controllers[0];
        node.start(genesis).unwrap();

        let factory = MessageFactory::new(Arc::new(NodeKeyPair::dev(2)));
        let near = factory
            .create_prepare(ConsensusRoundIdentifier::new(3, 0), Hash::ZERO)
            .unwrap();
        let far = factory
            .create_prepare(ConsensusRoundIdentifier::new(100, 0), Hash::ZERO)
            .unwrap();
        node.handle_event(ConsensusEvent::Message(ConsensusMessage::Prepare(near)))
            .unwrap();
        node.handle_event(ConsensusEvent::Message(ConsensusMessage::Prepare(far)))
            .unwrap();
        assert_eq!(node.future_heights.len(), 1);
    }

    /// Block 1 on top of genesis, sealed by the given validators.
    fn sealed_block_one(f: &Fixture, signers: &[u32]) -> BlockHeader {
        let addresses: Vec<_> = (0..4).map(|i| NodeKeyPair::dev(i).address()).collect();
        let validators = ValidatorSet::new(addresses).unwrap();
        let block = BlockCreator::new(Arc::new(EmptyBlockBuilder))
            .create_block(
                &f.genesis.header,
                block_hash(&f.genesis.header).unwrap(),
                0,
                &validators,
                None,
            )
            .unwrap();
        let digest = block_hash(&block.header).unwrap();
        let seals = signers.iter().map(|i| NodeKeyPair::dev(*i).sign(&digest)).collect();
        with_seals(&block.header, seals).unwrap()
    }

    #[test]
    fn test_foreign_chain_head_needs_seal_quorum() {
        let mut f = fixture(4);
        let genesis = f.genesis.header.clone();
        let short = sealed_block_one(&f, &[1, 2]);
        let node = &mut f.controllers[0];
        node.start(genesis.clone()).unwrap();

        let mut forged = genesis.clone();
        forged.number = 1;
        forged.parent_hash = block_hash(&genesis).unwrap();
        let actions = node.handle_event(ConsensusEvent::NewChainHead(forged)).unwrap();
        assert!(actions.is_empty());

        let actions = node.handle_event(ConsensusEvent::NewChainHead(short)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(node.current_round(), Some(ConsensusRoundIdentifier::new(1, 0)));
    }

    #[test]
    fn test_sealed_chain_head_from_peers_is_adopted() {
        let mut f = fixture(4);
        let genesis = f.genesis.header.clone();
        let head = sealed_block_one(&f, &[1, 2, 3]);
        let node = &mut f.controllers[0];
        node.start(genesis).unwrap();

        node.handle_event(ConsensusEvent::NewChainHead(head)).unwrap();
        assert_eq!(node.current_round(), Some(ConsensusRoundIdentifier::new(2, 0)));
        assert_eq!(node.current_validators().unwrap().len(), 4);
    }

    #[test]
    fn test_chain_head_beyond_current_height_is_ignored() {
        let mut f = fixture(4);
        let genesis = f.genesis.header.clone();
        let node = &mut f.controllers[0];
        node.start(genesis.clone()).unwrap();

        // Unsealed, unlinked, and naming a validator set of its own.
        let intruder = Address::new([0xAA; 20]);
        let mut forged = genesis_block(&[intruder], 0).unwrap().header;
        forged.number = 5;
        forged.parent_hash = Hash::ZERO;

        let actions = node.handle_event(ConsensusEvent::NewChainHead(forged)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(node.current_round(), Some(ConsensusRoundIdentifier::new(1, 0)));
        let validators = node.current_validators().unwrap();
        assert_eq!(validators.len(), 4);
        assert!(!validators.contains(&intruder));
    }

    #[test]
    fn test_committed_node_ignores_other_block_at_same_height() {
        let mut f = fixture(1);
        let node = &mut f.controllers[0];
        let block = imported(&node.start(f.genesis.header.clone()).unwrap()).unwrap();

        // Same seals, different contents: the seals no longer match.
        let mut other = block.header.clone();
        other.timestamp += 1;
        let actions = node.handle_event(ConsensusEvent::NewChainHead(other)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(node.current_round(), Some(ConsensusRoundIdentifier::new(1, 0)));

        node.handle_event(ConsensusEvent::NewChainHead(block.header)).unwrap();
        assert_eq!(node.current_round(), Some(ConsensusRoundIdentifier::new(2, 0)));
    }

    #[test]
    fn test_chain_head_before_start_is_ignored() {
        let mut f = fixture(4);
        let head = sealed_block_one(&f, &[0, 1, 2]);
        let node = &mut f.controllers[0];
        let actions = node.handle_event(ConsensusEvent::NewChainHead(head)).unwrap();
        assert!(actions.is_empty());
        assert!(node.current_round().is_none());
    }

    #[test]
    fn test_vote_requests_reach_proposals() {
        let mut f = fixture(1);
        let newcomer = Address::new([9; 20]);
        let node = &mut f.controllers[0];
        node.handle_event(ConsensusEvent::ProposeVote {
            subject: newcomer,
            vote_type: VoteType::Add,
        })
        .unwrap();

        let block = imported(&node.start(f.genesis.header.clone()).unwrap()).unwrap();
        let extra = ExtraData::decode_from_header(&block.header).unwrap();
        assert_eq!(extra.vote.map(|v| v.subject), Some(newcomer));

        node.handle_event(ConsensusEvent::NewChainHead(block.header)).unwrap();
        assert_eq!(node.current_validators().unwrap().len(), 2);
    }
}
