// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Message Validation
//!
//! - [`message`]: admission of inbound messages into the state machine
//! - [`certificate`]: prepared and round-change certificates
//! - [`header`]: proposed and committed header rules

pub mod certificate;
pub mod header;
pub mod message;

pub use certificate::{
    check_reproposal, validate_prepared_certificate, validate_round_change_certificate,
    validate_round_change_payload,
};
pub use header::{
    committed_seal_signers, validate_committed_header, validate_proposed_header,
    HeaderValidationError,
};
pub use message::{Admission, MessageValidator, RoundView};

use istanbul_types::{Payload, Signed, SignatureVerifier};

use crate::error::MessageRejection;
use crate::validator_set::ValidatorSet;

/// Authenticate a signed payload and check that its author is active.
pub(crate) fn verify_signed<P: Payload>(
    signed: &Signed<P>,
    validators: &ValidatorSet,
    verifier: &dyn SignatureVerifier,
) -> Result<(), MessageRejection> {
    let digest = signed.payload.signing_digest()?;
    if !verifier.verify(&signed.author, &digest, &signed.signature) {
        return Err(MessageRejection::InvalidSignature(signed.author));
    }
    if !validators.contains(&signed.author) {
        return Err(MessageRejection::UnknownAuthor(signed.author));
    }
    Ok(())
}
