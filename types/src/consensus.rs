// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus protocol types: round identifiers, signed payloads,
//! certificates and the wire-level message sum type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::block::Block;
use crate::primitives::{Address, Hash, Signature};
use crate::IstanbulResult;

/// `(height, round)`, ordered by height first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ConsensusRoundIdentifier {
    pub height: u64,
    pub round: u32,
}

impl ConsensusRoundIdentifier {
    pub const fn new(height: u64, round: u32) -> Self {
        Self { height, round }
    }

    /// The identifier of the following round at the same height.
    pub fn next_round(&self) -> Self {
        Self::new(self.height, self.round.saturating_add(1))
    }

    pub fn with_round(&self, round: u32) -> Self {
        Self::new(self.height, round)
    }
}

impl fmt::Display for ConsensusRoundIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.height, self.round)
    }
}

impl fmt::Debug for ConsensusRoundIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Round({})", self)
    }
}

/// Discriminant of a consensus message, mixed into every signing digest so a
/// signature over one kind can never be replayed as another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Proposal,
    Prepare,
    Commit,
    RoundChange,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Proposal => "PROPOSAL",
            MessageKind::Prepare => "PREPARE",
            MessageKind::Commit => "COMMIT",
            MessageKind::RoundChange => "ROUND_CHANGE",
        };
        f.write_str(name)
    }
}

/// A payload that can be signed by a validator.
pub trait Payload: Serialize {
    const KIND: MessageKind;

    fn round_identifier(&self) -> ConsensusRoundIdentifier;

    /// Digest the author signs.
    fn signing_digest(&self) -> IstanbulResult<Hash> {
        Hash::of_encoded(&(Self::KIND, self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalPayload {
    pub round: ConsensusRoundIdentifier,
    pub block: Block,
}

impl Payload for ProposalPayload {
    const KIND: MessageKind = MessageKind::Proposal;

    fn round_identifier(&self) -> ConsensusRoundIdentifier {
        self.round
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparePayload {
    pub round: ConsensusRoundIdentifier,
    pub digest: Hash,
}

impl Payload for PreparePayload {
    const KIND: MessageKind = MessageKind::Prepare;

    fn round_identifier(&self) -> ConsensusRoundIdentifier {
        self.round
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPayload {
    pub round: ConsensusRoundIdentifier,
    pub digest: Hash,
    /// The author's committed seal over `digest`.
    pub seal: Signature,
}

impl Payload for CommitPayload {
    const KIND: MessageKind = MessageKind::Commit;

    fn round_identifier(&self) -> ConsensusRoundIdentifier {
        self.round
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundChangePayload {
    /// The round the author wants to move to.
    pub round: ConsensusRoundIdentifier,
    /// The author's latest prepared certificate at this height, if any.
    pub prepared: Option<PreparedCertificate>,
}

impl Payload for RoundChangePayload {
    const KIND: MessageKind = MessageKind::RoundChange;

    fn round_identifier(&self) -> ConsensusRoundIdentifier {
        self.round
    }
}

/// A payload together with its author and the author's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed<P> {
    pub payload: P,
    pub author: Address,
    pub signature: Signature,
}

impl<P: Payload> Signed<P> {
    pub fn round_identifier(&self) -> ConsensusRoundIdentifier {
        self.payload.round_identifier()
    }
}

/// Proof that a quorum accepted a proposal in some round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedCertificate {
    pub proposal: Signed<ProposalPayload>,
    pub prepares: Vec<Signed<PreparePayload>>,
}

impl PreparedCertificate {
    pub fn prepared_round(&self) -> ConsensusRoundIdentifier {
        self.proposal.payload.round
    }

    pub fn block(&self) -> &Block {
        &self.proposal.payload.block
    }
}

/// A quorum of round-change requests for the same target round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundChangeCertificate {
    pub round_changes: Vec<Signed<RoundChangePayload>>,
}

impl RoundChangeCertificate {
    /// The prepared certificate with the highest prepared round, if any
    /// round-change in the certificate carries one.
    pub fn latest_prepared(&self) -> Option<&PreparedCertificate> {
        self.round_changes
            .iter()
            .filter_map(|rc| rc.payload.prepared.as_ref())
            .max_by_key(|cert| cert.prepared_round())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMessage {
    pub signed: Signed<ProposalPayload>,
    /// Justification for proposals in rounds above zero.
    pub round_change_certificate: Option<RoundChangeCertificate>,
}

/// Every message exchanged by the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Proposal(ProposalMessage),
    Prepare(Signed<PreparePayload>),
    Commit(Signed<CommitPayload>),
    RoundChange(Signed<RoundChangePayload>),
}

impl ConsensusMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ConsensusMessage::Proposal(_) => MessageKind::Proposal,
            ConsensusMessage::Prepare(_) => MessageKind::Prepare,
            ConsensusMessage::Commit(_) => MessageKind::Commit,
            ConsensusMessage::RoundChange(_) => MessageKind::RoundChange,
        }
    }

    pub fn author(&self) -> Address {
        match self {
            ConsensusMessage::Proposal(m) => m.signed.author,
            ConsensusMessage::Prepare(m) => m.author,
            ConsensusMessage::Commit(m) => m.author,
            ConsensusMessage::RoundChange(m) => m.author,
        }
    }

    pub fn round_identifier(&self) -> ConsensusRoundIdentifier {
        match self {
            ConsensusMessage::Proposal(m) => m.signed.round_identifier(),
            ConsensusMessage::Prepare(m) => m.round_identifier(),
            ConsensusMessage::Commit(m) => m.round_identifier(),
            ConsensusMessage::RoundChange(m) => m.round_identifier(),
        }
    }

    pub fn height(&self) -> u64 {
        self.round_identifier().height
    }
}

/// Consensus configuration, built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Timeout of round 0; round `r` waits `(r + 1)` times this.
    pub round_timeout_base_ms: u64,
    /// Capacity of the engine mailbox.
    pub mailbox_capacity: usize,
    /// Maximum number of buffered messages for future heights or rounds.
    pub future_message_limit: usize,
    /// Messages further than this many heights ahead of the chain head are dropped.
    pub future_height_window: u64,
    /// Number of derived validator sets kept in memory.
    pub validator_cache_size: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            round_timeout_base_ms: 2_000,
            mailbox_capacity: 1_000,
            future_message_limit: 1_000,
            future_height_window: 10,
            validator_cache_size: 128,
        }
    }
}

impl ConsensusConfig {
    pub fn round_timeout_base(&self) -> Duration {
        Duration::from_millis(self.round_timeout_base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockBody, BlockHeader};

    fn sig(b: u8) -> Signature {
        Signature::from_bytes(&[b; 64])
    }

    fn proposal(round: u32) -> Signed<ProposalPayload> {
        let header = BlockHeader {
            parent_hash: Hash::ZERO,
            number: 5,
            timestamp: 0,
            coinbase: Address::ZERO,
            nonce: 0,
            state_root: Hash::ZERO,
            transactions_root: Hash::ZERO,
            extra_data: vec![],
        };
        Signed {
            payload: ProposalPayload {
                round: ConsensusRoundIdentifier::new(5, round),
                block: Block::new(header, BlockBody::default()),
            },
            author: Address::new([1; 20]),
            signature: sig(1),
        }
    }

    #[test]
    fn test_round_identifier_ordering() {
        let a = ConsensusRoundIdentifier::new(1, 9);
        let b = ConsensusRoundIdentifier::new(2, 0);
        assert!(a < b);
        assert!(a < a.next_round());
        assert_eq!(a.next_round().round, 10);
    }

    #[test]
    fn test_signing_digest_is_kind_separated() {
        let round = ConsensusRoundIdentifier::new(1, 0);
        let prepare = PreparePayload { round, digest: Hash::ZERO };
        let commit = CommitPayload { round, digest: Hash::ZERO, seal: sig(0) };
        assert_ne!(
            prepare.signing_digest().unwrap(),
            commit.signing_digest().unwrap()
        );
    }

    #[test]
    fn test_latest_prepared_picks_highest_round() {
        let rc = |prepared_round: Option<u32>| Signed {
            payload: RoundChangePayload {
                round: ConsensusRoundIdentifier::new(5, 3),
                prepared: prepared_round.map(|r| PreparedCertificate {
                    proposal: proposal(r),
                    prepares: vec![],
                }),
            },
            author: Address::new([2; 20]),
            signature: sig(2),
        };
        let cert = RoundChangeCertificate {
            round_changes: vec![rc(Some(0)), rc(None), rc(Some(2))],
        };
        assert_eq!(cert.latest_prepared().unwrap().prepared_round().round, 2);

        let empty = RoundChangeCertificate { round_changes: vec![rc(None)] };
        assert!(empty.latest_prepared().is_none());
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: ConsensusConfig =
            serde_json::from_str(r#"{ "round_timeout_base_ms": 500 }"#).unwrap();
        assert_eq!(config.round_timeout_base(), Duration::from_millis(500));
        assert_eq!(config.mailbox_capacity, ConsensusConfig::default().mailbox_capacity);
    }
}
