// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Creates messages signed by the local validator.

use istanbul_types::{
    Address, Block, CommitPayload, ConsensusRoundIdentifier, Hash, NodeSigner, Payload,
    PreparePayload, PreparedCertificate, ProposalMessage, ProposalPayload,
    RoundChangeCertificate, RoundChangePayload, Signed,
};
use std::sync::Arc;

use crate::error::ConsensusResult;

pub struct MessageFactory {
    signer: Arc<dyn NodeSigner>,
}

impl MessageFactory {
    pub fn new(signer: Arc<dyn NodeSigner>) -> Self {
        Self { signer }
    }

    pub fn local_address(&self) -> Address {
        self.signer.address()
    }

    fn sign<P: Payload>(&self, payload: P) -> ConsensusResult<Signed<P>> {
        let digest = payload.signing_digest()?;
        Ok(Signed {
            signature: self.signer.sign(&digest),
            author: self.signer.address(),
            payload,
        })
    }

    pub fn create_proposal(
        &self,
        round: ConsensusRoundIdentifier,
        block: Block,
        round_change_certificate: Option<RoundChangeCertificate>,
    ) -> ConsensusResult<ProposalMessage> {
        Ok(ProposalMessage {
            signed: self.sign(ProposalPayload { round, block })?,
            round_change_certificate,
        })
    }

    pub fn create_prepare(
        &self,
        round: ConsensusRoundIdentifier,
        digest: Hash,
    ) -> ConsensusResult<Signed<PreparePayload>> {
        self.sign(PreparePayload { round, digest })
    }

    /// COMMIT carrying our committed seal over the block digest.
    pub fn create_commit(
        &self,
        round: ConsensusRoundIdentifier,
        digest: Hash,
    ) -> ConsensusResult<Signed<CommitPayload>> {
        let seal = self.signer.sign(&digest);
        self.sign(CommitPayload { round, digest, seal })
    }

    pub fn create_round_change(
        &self,
        round: ConsensusRoundIdentifier,
        prepared: Option<PreparedCertificate>,
    ) -> ConsensusResult<Signed<RoundChangePayload>> {
        self.sign(RoundChangePayload { round, prepared })
    }
}
