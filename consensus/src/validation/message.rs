// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Admission of inbound consensus messages.
//!
//! Checks run in a fixed order: signature, membership, proposer identity,
//! round position, then digest and seal consistency. Validation never
//! mutates state; the caller acts on the returned [`Admission`].

use istanbul_types::{BlockHeader, ConsensusMessage, ConsensusRoundIdentifier, Hash, ProposalMessage, SignatureVerifier};
use std::sync::Arc;

use super::certificate::{check_reproposal, validate_round_change_certificate, validate_round_change_payload};
use super::header::validate_proposed_header;
use super::verify_signed;
use crate::block_creator::BlockCreator;
use crate::error::MessageRejection;
use crate::extra_data::block_hash;
use crate::liveness::ProposerElection;
use crate::validator_set::ValidatorSet;

#[derive(Debug)]
pub enum Admission {
    /// Process now.
    Accept,
    /// For a later round or height; buffer and replay on entry.
    Future,
    /// For an earlier round or height; drop silently.
    Stale,
    Reject(MessageRejection),
}

/// What the validator needs to know about the local round.
#[derive(Clone, Copy)]
pub struct RoundView<'a> {
    pub round: ConsensusRoundIdentifier,
    pub validators: &'a ValidatorSet,
    pub election: &'a dyn ProposerElection,
    /// Digest of the current round's proposal, once known.
    pub proposal_digest: Option<Hash>,
}

pub struct MessageValidator {
    verifier: Arc<dyn SignatureVerifier>,
}

impl MessageValidator {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &dyn SignatureVerifier {
        self.verifier.as_ref()
    }

    pub fn validate(&self, message: &ConsensusMessage, view: &RoundView<'_>) -> Admission {
        match self.check(message, view) {
            Ok(admission) => admission,
            Err(rejection) => Admission::Reject(rejection),
        }
    }

    fn check(
        &self,
        message: &ConsensusMessage,
        view: &RoundView<'_>,
    ) -> Result<Admission, MessageRejection> {
        let verifier = self.verifier();

        // Signature and membership.
        match message {
            ConsensusMessage::Proposal(p) => verify_signed(&p.signed, view.validators, verifier)?,
            ConsensusMessage::Prepare(m) => verify_signed(m, view.validators, verifier)?,
            ConsensusMessage::Commit(m) => verify_signed(m, view.validators, verifier)?,
            ConsensusMessage::RoundChange(m) => verify_signed(m, view.validators, verifier)?,
        }

        if let ConsensusMessage::Proposal(p) = message {
            let round = p.signed.round_identifier();
            if !view.election.is_valid_proposer(&p.signed.author, &round) {
                return Err(MessageRejection::NotProposer {
                    author: p.signed.author,
                    expected: view.election.get_valid_proposer(&round),
                    round,
                });
            }
            if p.signed.payload.block.number() != round.height {
                return Err(MessageRejection::HeightMismatch {
                    expected: round.height,
                    got: p.signed.payload.block.number(),
                });
            }
        }

        let round = message.round_identifier();
        if round.height < view.round.height {
            return Ok(Admission::Stale);
        }
        if round.height > view.round.height {
            return Ok(Admission::Future);
        }
        if round.round < view.round.round {
            return Ok(Admission::Stale);
        }
        let is_round_change = matches!(message, ConsensusMessage::RoundChange(_));
        if round.round > view.round.round && !is_round_change {
            return Ok(Admission::Future);
        }

        match message {
            ConsensusMessage::Proposal(_) => {}
            ConsensusMessage::Prepare(m) => {
                check_digest(view.proposal_digest, m.payload.digest)?;
            }
            ConsensusMessage::Commit(m) => {
                check_digest(view.proposal_digest, m.payload.digest)?;
                if !verifier.verify(&m.author, &m.payload.digest, &m.payload.seal) {
                    return Err(MessageRejection::InvalidSeal(m.author));
                }
            }
            ConsensusMessage::RoundChange(m) => {
                validate_round_change_payload(m, view.validators, verifier)?;
            }
        }
        Ok(Admission::Accept)
    }

    /// Full checks for an admitted proposal: header rules, round-change
    /// justification and execution. Returns the block digest.
    pub fn validate_proposal(
        &self,
        proposal: &ProposalMessage,
        parent: &BlockHeader,
        parent_hash: &Hash,
        validators: &ValidatorSet,
        blocks: &BlockCreator,
    ) -> Result<Hash, MessageRejection> {
        let round = proposal.signed.round_identifier();
        let block = &proposal.signed.payload.block;

        validate_proposed_header(&block.header, parent, parent_hash, validators, round.round)?;

        match (&proposal.round_change_certificate, round.round) {
            (None, 0) => {}
            (Some(_), 0) => return Err(MessageRejection::UnexpectedCertificate),
            (None, _) => return Err(MessageRejection::MissingCertificate(round)),
            (Some(cert), _) => {
                validate_round_change_certificate(cert, round, validators, self.verifier())?;
                check_reproposal(cert, block)?;
            }
        }

        blocks.validate_block(parent, block)?;
        Ok(block_hash(&block.header)?)
    }
}

fn check_digest(expected: Option<Hash>, got: Hash) -> Result<(), MessageRejection> {
    match expected {
        Some(expected) if expected != got => Err(MessageRejection::DigestMismatch { expected, got }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmptyBlockBuilder;
    use crate::block_creator::genesis_block;
    use crate::liveness::RotatingProposer;
    use crate::message_factory::MessageFactory;
    use istanbul_keys::{KeyRegistry, NodeKeyPair};
    use istanbul_types::{Block, CommitPayload, NodeSigner, Payload, RoundChangeCertificate, Signed};

    struct Fixture {
        factories: Vec<MessageFactory>,
        validator: MessageValidator,
        validators: ValidatorSet,
        election: RotatingProposer,
        genesis: Block,
        blocks: BlockCreator,
    }

    fn fixture() -> Fixture {
        let keys: Vec<_> = (0..4).map(NodeKeyPair::dev).collect();
        let registry: KeyRegistry = keys.iter().map(|k| k.public()).collect();
        let addresses: Vec<_> = keys.iter().map(|k| k.address()).collect();
        Fixture {
            validators: ValidatorSet::new(addresses.clone()).unwrap(),
            election: RotatingProposer::new(Arc::new(ValidatorSet::new(addresses.clone()).unwrap())),
            genesis: genesis_block(&addresses, 0).unwrap(),
            factories: keys
                .into_iter()
                .map(|k| MessageFactory::new(Arc::new(k)))
                .collect(),
            validator: MessageValidator::new(Arc::new(registry)),
            blocks: BlockCreator::new(Arc::new(EmptyBlockBuilder)),
        }
    }

    impl Fixture {
        fn view(&self, round: ConsensusRoundIdentifier, digest: Option<Hash>) -> RoundView<'_> {
            RoundView {
                round,
                validators: &self.validators,
                election: &self.election,
                proposal_digest: digest,
            }
        }

        fn proposer_index(&self, round: ConsensusRoundIdentifier) -> usize {
            let proposer = self.election.get_valid_proposer(&round);
            self.validators.index_of(&proposer).unwrap()
        }

        fn block(&self, round: u32) -> Block {
            self.blocks
                .create_block(
                    &self.genesis.header,
                    block_hash(&self.genesis.header).unwrap(),
                    round,
                    &self.validators,
                    None,
                )
                .unwrap()
        }

        fn proposal(
            &self,
            round: ConsensusRoundIdentifier,
            cert: Option<RoundChangeCertificate>,
        ) -> ProposalMessage {
            self.factories[self.proposer_index(round)]
                .create_proposal(round, self.block(round.round), cert)
                .unwrap()
        }

        fn parent_hash(&self) -> Hash {
            block_hash(&self.genesis.header).unwrap()
        }
    }

    #[test]
    fn test_accepts_current_round_messages() {
        let f = fixture();
        let round = ConsensusRoundIdentifier::new(1, 0);
        let proposal = f.proposal(round, None);
        let msg = ConsensusMessage::Proposal(proposal);
        assert!(matches!(f.validator.validate(&msg, &f.view(round, None)), Admission::Accept));

        let digest = f.parent_hash();
        let prepare = ConsensusMessage::Prepare(f.factories[0].create_prepare(round, digest).unwrap());
        assert!(matches!(f.validator.validate(&prepare, &f.view(round, None)), Admission::Accept));
    }

    #[test]
    fn test_rejects_bad_signature_and_outsiders() {
        let f = fixture();
        let round = ConsensusRoundIdentifier::new(1, 0);

        let mut forged = f.factories[0].create_prepare(round, Hash::ZERO).unwrap();
        forged.author = f.factories[1].local_address();
        let msg = ConsensusMessage::Prepare(forged);
        assert!(matches!(
            f.validator.validate(&msg, &f.view(round, None)),
            Admission::Reject(MessageRejection::InvalidSignature(_))
        ));

        let outsider = MessageFactory::new(Arc::new(NodeKeyPair::dev(50)));
        let msg = ConsensusMessage::Prepare(outsider.create_prepare(round, Hash::ZERO).unwrap());
        assert!(matches!(
            f.validator.validate(&msg, &f.view(round, None)),
            Admission::Reject(_)
        ));
    }

    #[test]
    fn test_rejects_proposal_from_non_proposer() {
        let f = fixture();
        let round = ConsensusRoundIdentifier::new(1, 0);
        let wrong = (f.proposer_index(round) + 1) % 4;
        let proposal = f.factories[wrong]
            .create_proposal(round, f.block(0), None)
            .unwrap();
        assert!(matches!(
            f.validator.validate(&ConsensusMessage::Proposal(proposal), &f.view(round, None)),
            Admission::Reject(MessageRejection::NotProposer { .. })
        ));
    }

    #[test]
    fn test_round_position() {
        let f = fixture();
        let current = ConsensusRoundIdentifier::new(1, 2);
        let prepare_at = |r: ConsensusRoundIdentifier| {
            ConsensusMessage::Prepare(f.factories[0].create_prepare(r, Hash::ZERO).unwrap())
        };

        assert!(matches!(
            f.validator.validate(&prepare_at(current.with_round(1)), &f.view(current, None)),
            Admission::Stale
        ));
        assert!(matches!(
            f.validator.validate(&prepare_at(current.with_round(3)), &f.view(current, None)),
            Admission::Future
        ));
        assert!(matches!(
            f.validator.validate(&prepare_at(ConsensusRoundIdentifier::new(0, 9)), &f.view(current, None)),
            Admission::Stale
        ));
        assert!(matches!(
            f.validator.validate(&prepare_at(ConsensusRoundIdentifier::new(2, 0)), &f.view(current, None)),
            Admission::Future
        ));

        // Round changes for later rounds are processed immediately.
        let rc = ConsensusMessage::RoundChange(
            f.factories[0].create_round_change(current.with_round(5), None).unwrap(),
        );
        assert!(matches!(f.validator.validate(&rc, &f.view(current, None)), Admission::Accept));
    }

    #[test]
    fn test_digest_and_seal_checks() {
        let f = fixture();
        let round = ConsensusRoundIdentifier::new(1, 0);
        let digest = Hash::of(b"proposal");

        let other = ConsensusMessage::Prepare(f.factories[0].create_prepare(round, Hash::ZERO).unwrap());
        assert!(matches!(
            f.validator.validate(&other, &f.view(round, Some(digest))),
            Admission::Reject(MessageRejection::DigestMismatch { .. })
        ));

        let commit = f.factories[1].create_commit(round, digest).unwrap();
        assert!(matches!(
            f.validator.validate(&ConsensusMessage::Commit(commit), &f.view(round, Some(digest))),
            Admission::Accept
        ));

        // Properly signed message carrying someone else's seal.
        let author = NodeKeyPair::dev(1);
        let payload = CommitPayload {
            round,
            digest,
            seal: f.factories[2].create_commit(round, digest).unwrap().payload.seal,
        };
        let signature = author.sign(&payload.signing_digest().unwrap());
        let borrowed_seal = Signed {
            payload,
            author: author.address(),
            signature,
        };
        assert!(matches!(
            f.validator.validate(&ConsensusMessage::Commit(borrowed_seal), &f.view(round, Some(digest))),
            Admission::Reject(MessageRejection::InvalidSeal(_))
        ));
    }

    #[test]
    fn test_validate_round_zero_proposal() {
        let f = fixture();
        let round = ConsensusRoundIdentifier::new(1, 0);
        let proposal = f.proposal(round, None);
        let digest = f
            .validator
            .validate_proposal(&proposal, &f.genesis.header, &f.parent_hash(), &f.validators, &f.blocks)
            .unwrap();
        assert_eq!(digest, block_hash(&proposal.signed.payload.block.header).unwrap());

        let with_cert = f.proposal(round, Some(RoundChangeCertificate { round_changes: vec![] }));
        assert!(matches!(
            f.validator.validate_proposal(&with_cert, &f.genesis.header, &f.parent_hash(), &f.validators, &f.blocks),
            Err(MessageRejection::UnexpectedCertificate)
        ));
    }

    #[test]
    fn test_later_round_proposal_needs_certificate() {
        let f = fixture();
        let round = ConsensusRoundIdentifier::new(1, 1);
        let bare = f.proposal(round, None);
        assert!(matches!(
            f.validator.validate_proposal(&bare, &f.genesis.header, &f.parent_hash(), &f.validators, &f.blocks),
            Err(MessageRejection::MissingCertificate(_))
        ));

        let cert = RoundChangeCertificate {
            round_changes: (0..3)
                .map(|i| f.factories[i].create_round_change(round, None).unwrap())
                .collect(),
        };
        let justified = f.proposal(round, Some(cert));
        assert!(f
            .validator
            .validate_proposal(&justified, &f.genesis.header, &f.parent_hash(), &f.validators, &f.blocks)
            .is_ok());
    }
}
