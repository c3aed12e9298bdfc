// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Prepared and round-change certificate rules.

use istanbul_types::{
    Address, Block, ConsensusRoundIdentifier, Hash, PreparedCertificate, RoundChangeCertificate,
    RoundChangePayload, Signed, SignatureVerifier,
};
use std::collections::HashSet;

use super::verify_signed;
use crate::error::MessageRejection;
use crate::extra_data::block_hash;
use crate::liveness::select_proposer;
use crate::validator_set::ValidatorSet;

fn invalid(reason: impl Into<String>) -> MessageRejection {
    MessageRejection::InvalidCertificate(reason.into())
}

/// Check a prepared certificate for `height`, returning the digest of the
/// prepared block.
pub fn validate_prepared_certificate(
    cert: &PreparedCertificate,
    height: u64,
    validators: &ValidatorSet,
    verifier: &dyn SignatureVerifier,
) -> Result<Hash, MessageRejection> {
    let round = cert.prepared_round();
    if round.height != height {
        return Err(invalid(format!(
            "prepared certificate for height {} used at height {}",
            round.height, height
        )));
    }

    verify_signed(&cert.proposal, validators, verifier)?;
    let proposer = select_proposer(&round, validators);
    if cert.proposal.author != proposer {
        return Err(invalid(format!(
            "prepared proposal signed by {} instead of proposer {}",
            cert.proposal.author, proposer
        )));
    }
    if cert.block().number() != height {
        return Err(invalid("prepared block has the wrong number"));
    }
    let digest = block_hash(&cert.block().header)?;

    let mut authors: HashSet<Address> = HashSet::with_capacity(cert.prepares.len());
    for prepare in &cert.prepares {
        verify_signed(prepare, validators, verifier)?;
        if prepare.payload.round != round {
            return Err(invalid(format!(
                "prepare for {} inside certificate for {}",
                prepare.payload.round, round
            )));
        }
        if prepare.payload.digest != digest {
            return Err(invalid("prepare digest differs from prepared block"));
        }
        if !authors.insert(prepare.author) {
            return Err(invalid(format!("duplicate prepare from {}", prepare.author)));
        }
    }
    if authors.len() < validators.quorum_size() {
        return Err(invalid(format!(
            "{} prepares, {} required",
            authors.len(),
            validators.quorum_size()
        )));
    }
    Ok(digest)
}

/// Check the prepared certificate embedded in a round-change request.
///
/// The author's signature is checked by the caller.
pub fn validate_round_change_payload(
    round_change: &Signed<RoundChangePayload>,
    validators: &ValidatorSet,
    verifier: &dyn SignatureVerifier,
) -> Result<(), MessageRejection> {
    let target = round_change.payload.round;
    if let Some(prepared) = &round_change.payload.prepared {
        validate_prepared_certificate(prepared, target.height, validators, verifier)?;
        if prepared.prepared_round().round >= target.round {
            return Err(invalid(format!(
                "prepared round {} is not below target round {}",
                prepared.prepared_round().round,
                target.round
            )));
        }
    }
    Ok(())
}

/// Check a quorum of round-change requests justifying a proposal at `target`.
pub fn validate_round_change_certificate(
    cert: &RoundChangeCertificate,
    target: ConsensusRoundIdentifier,
    validators: &ValidatorSet,
    verifier: &dyn SignatureVerifier,
) -> Result<(), MessageRejection> {
    let mut authors: HashSet<Address> = HashSet::with_capacity(cert.round_changes.len());
    for round_change in &cert.round_changes {
        if round_change.payload.round != target {
            return Err(invalid(format!(
                "round change for {} inside certificate for {}",
                round_change.payload.round, target
            )));
        }
        verify_signed(round_change, validators, verifier)?;
        validate_round_change_payload(round_change, validators, verifier)?;
        if !authors.insert(round_change.author) {
            return Err(invalid(format!(
                "duplicate round change from {}",
                round_change.author
            )));
        }
    }
    if authors.len() < validators.quorum_size() {
        return Err(invalid(format!(
            "{} round changes, {} required",
            authors.len(),
            validators.quorum_size()
        )));
    }
    Ok(())
}

/// A proposal justified by `cert` must carry the block of the highest
/// prepared certificate in it, if there is one.
pub fn check_reproposal(cert: &RoundChangeCertificate, block: &Block) -> Result<(), MessageRejection> {
    if let Some(prepared) = cert.latest_prepared() {
        let expected = block_hash(&prepared.block().header)?;
        let got = block_hash(&block.header)?;
        if expected != got {
            return Err(MessageRejection::BadReproposal { expected, got });
        }
    }
    Ok(())
}
