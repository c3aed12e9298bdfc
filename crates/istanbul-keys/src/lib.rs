// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Validator key management.
//!
//! Provides the ed25519 implementations of the signing capabilities the
//! consensus engine consumes:
//!
//! - [`NodeKeyPair`] implements [`NodeSigner`] for the local validator
//! - [`KeyRegistry`] implements [`SignatureVerifier`] over the known
//!   validators' public keys
//!
//! A validator address is the last 20 bytes of the blake3 hash of its
//! public key.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use istanbul_types::{Address, Hash, NodeSigner, Signature, SignatureVerifier, ADDRESS_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use zeroize::Zeroizing;

pub type KeyResult<T> = Result<T, KeyError>;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keystore format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Keystore address {stored} does not match key address {derived}")]
    AddressMismatch { stored: String, derived: Address },
}

/// Derive the validator address of a public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let digest = Hash::of(key.as_bytes());
    let mut bytes = [0u8; ADDRESS_LENGTH];
    bytes.copy_from_slice(&digest.as_bytes()[32 - ADDRESS_LENGTH..]);
    Address::new(bytes)
}

/// An ed25519 validator key.
#[derive(Clone)]
pub struct NodeKeyPair {
    signing: SigningKey,
    address: Address,
}

impl NodeKeyPair {
    /// Generate a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    /// Deterministic development key for validator `index`.
    ///
    /// Only meant for local networks and tests.
    pub fn dev(index: u32) -> Self {
        let seed = Hash::of(format!("istanbul-dev-validator-{}", index).as_bytes());
        Self::from_seed(seed.as_bytes())
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let address = address_of(&signing.verifying_key());
        Self { signing, address }
    }

    pub fn public(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }
}

impl NodeSigner for NodeKeyPair {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, digest: &Hash) -> Signature {
        Signature::from_bytes(&self.signing.sign(digest.as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for NodeKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Public keys of the validators this node knows about.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    keys: HashMap<Address, VerifyingKey>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a public key, returning its address.
    pub fn insert(&mut self, key: VerifyingKey) -> Address {
        let address = address_of(&key);
        self.keys.insert(address, key);
        address
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.keys.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<VerifyingKey> for KeyRegistry {
    fn from_iter<I: IntoIterator<Item = VerifyingKey>>(iter: I) -> Self {
        let mut registry = KeyRegistry::new();
        for key in iter {
            registry.insert(key);
        }
        registry
    }
}

impl SignatureVerifier for KeyRegistry {
    fn verify(&self, signer: &Address, digest: &Hash, signature: &Signature) -> bool {
        let Some(key) = self.keys.get(signer) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&signature.to_bytes());
        key.verify_strict(digest.as_bytes(), &signature).is_ok()
    }
}

/// On-disk keystore layout.
#[derive(Serialize, Deserialize)]
struct KeystoreFile {
    address: String,
    secret_key: String,
}

/// Write a keypair to a JSON keystore file.
pub fn save_keypair(path: impl AsRef<Path>, keypair: &NodeKeyPair) -> KeyResult<()> {
    let secret = Zeroizing::new(hex::encode(keypair.signing.to_bytes()));
    let file = KeystoreFile {
        address: keypair.address.to_string(),
        secret_key: secret.to_string(),
    };
    std::fs::write(path, serde_json::to_vec_pretty(&file)?)?;
    Ok(())
}

/// Load a keypair from a JSON keystore file written by [`save_keypair`].
pub fn load_keypair(path: impl AsRef<Path>) -> KeyResult<NodeKeyPair> {
    let contents = std::fs::read(path)?;
    let file: KeystoreFile = serde_json::from_slice(&contents)?;
    let secret = Zeroizing::new(
        hex::decode(file.secret_key.trim_start_matches("0x"))
            .map_err(|e| KeyError::InvalidKey(format!("Invalid hex: {}", e)))?,
    );
    let seed: [u8; 32] = secret
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidKey(format!("expected 32 bytes, got {}", secret.len())))?;
    let keypair = NodeKeyPair::from_seed(&seed);

    if file.address.parse::<Address>().ok() != Some(keypair.address) {
        return Err(KeyError::AddressMismatch {
            stored: file.address,
            derived: keypair.address,
        });
    }
    Ok(keypair)
}
