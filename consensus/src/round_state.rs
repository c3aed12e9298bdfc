// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! State of a single round: the proposal and the PREPARE/COMMIT tallies.
//!
//! ```text
//!   NewRound ──(quorum PREPARE)──▶ Prepared ──(quorum COMMIT)──▶ Committed
//! ```
//!
//! PREPAREs and COMMITs that arrive before the proposal are kept and
//! counted once a proposal with a matching digest is known.

use istanbul_types::{
    Address, Block, CommitPayload, ConsensusRoundIdentifier, Hash, PreparePayload,
    PreparedCertificate, ProposalMessage, Signed,
};
use std::collections::BTreeMap;

use crate::extra_data::{with_seals, ExtraDataResult};
use crate::validator_set::ValidatorSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    NewRound,
    Prepared,
    Committed,
}

#[derive(Debug)]
pub struct RoundState {
    round: ConsensusRoundIdentifier,
    proposer: Address,
    quorum: usize,
    phase: RoundPhase,
    proposal: Option<ProposalMessage>,
    proposal_digest: Option<Hash>,
    prepares: BTreeMap<Address, Signed<PreparePayload>>,
    commits: BTreeMap<Address, Signed<CommitPayload>>,
}

impl RoundState {
    pub fn new(round: ConsensusRoundIdentifier, proposer: Address, quorum: usize) -> Self {
        Self {
            round,
            proposer,
            quorum,
            phase: RoundPhase::NewRound,
            proposal: None,
            proposal_digest: None,
            prepares: BTreeMap::new(),
            commits: BTreeMap::new(),
        }
    }

    pub fn round(&self) -> ConsensusRoundIdentifier {
        self.round
    }

    pub fn proposer(&self) -> Address {
        self.proposer
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn proposal(&self) -> Option<&ProposalMessage> {
        self.proposal.as_ref()
    }

    pub fn proposal_digest(&self) -> Option<Hash> {
        self.proposal_digest
    }

    /// Record the round's proposal. Only the first one is kept.
    pub fn set_proposal(&mut self, proposal: ProposalMessage, digest: Hash) -> bool {
        if self.proposal.is_some() {
            return false;
        }
        self.proposal = Some(proposal);
        self.proposal_digest = Some(digest);
        true
    }

    /// One PREPARE per author; returns false for repeats.
    pub fn add_prepare(&mut self, prepare: Signed<PreparePayload>) -> bool {
        if self.prepares.contains_key(&prepare.author) {
            return false;
        }
        self.prepares.insert(prepare.author, prepare);
        true
    }

    /// One COMMIT per author; returns false for repeats.
    pub fn add_commit(&mut self, commit: Signed<CommitPayload>) -> bool {
        if self.commits.contains_key(&commit.author) {
            return false;
        }
        self.commits.insert(commit.author, commit);
        true
    }

    fn matching_prepares(&self) -> impl Iterator<Item = &Signed<PreparePayload>> {
        let digest = self.proposal_digest;
        self.prepares
            .values()
            .filter(move |p| Some(p.payload.digest) == digest)
    }

    fn matching_commits(&self) -> impl Iterator<Item = &Signed<CommitPayload>> {
        let digest = self.proposal_digest;
        self.commits
            .values()
            .filter(move |c| Some(c.payload.digest) == digest)
    }

    pub fn prepare_count(&self) -> usize {
        self.matching_prepares().count()
    }

    pub fn commit_count(&self) -> usize {
        self.matching_commits().count()
    }

    pub fn is_prepared_quorum(&self) -> bool {
        self.phase == RoundPhase::NewRound
            && self.proposal.is_some()
            && self.prepare_count() >= self.quorum
    }

    /// A commit quorum implies a prepare quorum elsewhere, so it is honoured
    /// even if this node has not prepared.
    pub fn is_commit_quorum(&self) -> bool {
        self.phase != RoundPhase::Committed
            && self.proposal.is_some()
            && self.commit_count() >= self.quorum
    }

    /// Enter `Prepared`, returning the certificate that justifies it.
    pub fn mark_prepared(&mut self) -> Option<PreparedCertificate> {
        if !self.is_prepared_quorum() {
            return None;
        }
        let proposal = self.proposal.as_ref()?;
        let certificate = PreparedCertificate {
            proposal: proposal.signed.clone(),
            prepares: self.matching_prepares().cloned().collect(),
        };
        self.phase = RoundPhase::Prepared;
        Some(certificate)
    }

    /// Enter `Committed`, returning the proposal block sealed with the
    /// matching commit seals in validator-set order.
    pub fn mark_committed(&mut self, validators: &ValidatorSet) -> ExtraDataResult<Option<Block>> {
        if !self.is_commit_quorum() {
            return Ok(None);
        }
        let Some(proposal) = self.proposal.as_ref() else {
            return Ok(None);
        };
        let seals = validators
            .iter()
            .filter_map(|v| self.commits.get(v))
            .filter(|c| Some(c.payload.digest) == self.proposal_digest)
            .map(|c| c.payload.seal)
            .collect();
        let block = &proposal.signed.payload.block;
        let header = with_seals(&block.header, seals)?;
        self.phase = RoundPhase::Committed;
        Ok(Some(Block::new(header, block.body.clone())))
    }
}
