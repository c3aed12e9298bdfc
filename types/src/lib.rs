// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Istanbul Types
//!
//! Data shared between the consensus engine and its collaborators:
//! primitives, blocks, consensus messages, crypto capabilities and the
//! consensus configuration.

pub mod block;
pub mod consensus;
pub mod crypto;
pub mod primitives;

pub use block::{Block, BlockBody, BlockHeader, Transaction};
pub use consensus::{
    CommitPayload, ConsensusConfig, ConsensusMessage, ConsensusRoundIdentifier, MessageKind,
    Payload, PreparePayload, PreparedCertificate, ProposalMessage, ProposalPayload,
    RoundChangeCertificate, RoundChangePayload, Signed,
};
pub use crypto::{NodeSigner, SignatureVerifier};
pub use primitives::{Address, Hash, Signature, ADDRESS_LENGTH, HASH_LENGTH, SIGNATURE_LENGTH};

// Error types
pub type IstanbulResult<T> = Result<T, IstanbulError>;

#[derive(Debug, thiserror::Error)]
pub enum IstanbulError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] bcs::Error),

    #[error("Invalid {what} length: expected {expected}, got {got}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
