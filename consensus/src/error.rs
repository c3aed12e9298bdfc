// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus error types.
//!
//! [`MessageRejection`] describes why a single inbound message was dropped
//! and never leaves the state machine. [`ConsensusError`] is fatal: it halts
//! the engine.

use istanbul_types::{Address, ConsensusRoundIdentifier, Hash, IstanbulError};

use crate::backend::ExecutionError;
use crate::extra_data::ExtraDataError;
use crate::header_vote::HeaderVoteError;
use crate::validation::HeaderValidationError;

pub type ConsensusResult<T> = Result<T, ConsensusError>;

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Validator set cannot be empty")]
    EmptyValidatorSet,

    #[error("Invalid canonical header #{number}: {reason}")]
    InvalidCanonicalHeader { number: u64, reason: String },

    #[error("Local signer {0} produced an unverifiable signature")]
    SignerUnusable(Address),

    #[error("Encoding error: {0}")]
    Encoding(#[from] IstanbulError),

    #[error("Extra data error: {0}")]
    ExtraData(#[from] ExtraDataError),

    #[error("Header vote error: {0}")]
    HeaderVote(#[from] HeaderVoteError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Engine mailbox closed")]
    MailboxClosed,
}

/// Reasons an inbound message is refused.
#[derive(Debug, thiserror::Error)]
pub enum MessageRejection {
    #[error("Signature does not verify for {0}")]
    InvalidSignature(Address),

    #[error("Author {0} is not in the validator set")]
    UnknownAuthor(Address),

    #[error("Proposal from {author} but {expected} is the proposer of {round}")]
    NotProposer {
        author: Address,
        expected: Address,
        round: ConsensusRoundIdentifier,
    },

    #[error("Digest {got} does not match proposal {expected}")]
    DigestMismatch { expected: Hash, got: Hash },

    #[error("Committed seal from {0} does not verify")]
    InvalidSeal(Address),

    #[error("Block #{got} proposed for height {expected}")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("Proposal for {0} lacks a round-change certificate")]
    MissingCertificate(ConsensusRoundIdentifier),

    #[error("Round 0 proposal carries a round-change certificate")]
    UnexpectedCertificate,

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Proposal does not re-propose the latest prepared block {expected}")]
    BadReproposal { expected: Hash, got: Hash },

    #[error("Conflicting proposal for {0}")]
    ConflictingProposal(ConsensusRoundIdentifier),

    #[error("Invalid header: {0}")]
    InvalidHeader(#[from] HeaderValidationError),

    #[error("Block rejected by execution: {0}")]
    BlockRejected(#[from] ExecutionError),

    #[error("Malformed message: {0}")]
    Malformed(String),
}

impl From<ExtraDataError> for MessageRejection {
    fn from(e: ExtraDataError) -> Self {
        MessageRejection::InvalidHeader(HeaderValidationError::ExtraData(e))
    }
}

impl From<IstanbulError> for MessageRejection {
    fn from(e: IstanbulError) -> Self {
        MessageRejection::Malformed(e.to_string())
    }
}
