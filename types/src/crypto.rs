// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Signing capabilities injected into the consensus engine.
//!
//! The engine never touches key material; it asks a [`NodeSigner`] to sign
//! digests and a [`SignatureVerifier`] to check them against a validator
//! address.

use crate::primitives::{Address, Hash, Signature};

/// The local validator's signing capability.
pub trait NodeSigner: Send + Sync {
    /// Address of the local validator.
    fn address(&self) -> Address;

    /// Sign a 32-byte digest.
    fn sign(&self, digest: &Hash) -> Signature;
}

/// Verifies signatures against known validator identities.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true if `signature` over `digest` was produced by `signer`.
    /// Unknown signers never verify.
    fn verify(&self, signer: &Address, digest: &Hash, signature: &Signature) -> bool;
}
