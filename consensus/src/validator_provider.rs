// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Validator sets derived from the canonical chain.
//!
//! Every header records the set that produced it in its extra-data. The set
//! for the next height is that set with the header's vote applied; the
//! genesis vote fields are never interpreted. Derived sets are cached by
//! block digest.

use istanbul_types::{BlockHeader, ConsensusRoundIdentifier, Hash, SignatureVerifier};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ConsensusError, ConsensusResult};
use crate::extra_data::{block_hash, ExtraData};
use crate::header_vote::extract_vote;
use crate::liveness::select_proposer;
use crate::validation::validate_committed_header;
use crate::validator_set::ValidatorSet;

fn invalid(header: &BlockHeader, reason: impl ToString) -> ConsensusError {
    ConsensusError::InvalidCanonicalHeader {
        number: header.number,
        reason: reason.to_string(),
    }
}

pub struct ValidatorSetProvider {
    cache: LruCache<Hash, Arc<ValidatorSet>>,
}

impl ValidatorSetProvider {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// The validator set of height `parent.number + 1`.
    pub fn validators_after(&mut self, parent: &BlockHeader) -> ConsensusResult<Arc<ValidatorSet>> {
        let digest = block_hash(parent).map_err(|e| invalid(parent, e))?;
        if let Some(set) = self.cache.get(&digest) {
            return Ok(Arc::clone(set));
        }

        let extra = ExtraData::decode_from_header(parent).map_err(|e| invalid(parent, e))?;
        let recorded = ValidatorSet::new(extra.validators)?;
        let next = if parent.number == 0 {
            recorded
        } else {
            let round = ConsensusRoundIdentifier::new(parent.number, extra.round);
            let proposer = select_proposer(&round, &recorded);
            match extract_vote(parent, proposer).map_err(|e| invalid(parent, e))? {
                Some(vote) => {
                    let next = recorded.apply_vote(&vote);
                    if next.len() != recorded.len() {
                        info!(
                            height = parent.number + 1,
                            subject = %vote.subject,
                            vote = %vote.vote_type,
                            validators = next.len(),
                            "Validator set changed"
                        );
                    }
                    next
                }
                None => recorded,
            }
        };

        let next = Arc::new(next);
        self.cache.put(digest, Arc::clone(&next));
        Ok(next)
    }

    /// Check that `headers`, starting at genesis, form a linked chain whose
    /// blocks carry their set and a quorum of valid committed seals.
    /// Returns the set of the height after the last header.
    pub fn replay_chain(
        &mut self,
        headers: &[BlockHeader],
        verifier: &dyn SignatureVerifier,
    ) -> ConsensusResult<Arc<ValidatorSet>> {
        let (genesis, rest) = headers
            .split_first()
            .ok_or_else(|| ConsensusError::InvalidCanonicalHeader {
                number: 0,
                reason: "empty chain".to_string(),
            })?;
        if genesis.number != 0 {
            return Err(invalid(genesis, "chain does not start at genesis"));
        }

        let mut parent = genesis;
        let mut validators = self.validators_after(genesis)?;
        for header in rest {
            if header.number != parent.number + 1 {
                return Err(invalid(header, format!("follows #{}", parent.number)));
            }
            let parent_hash = block_hash(parent).map_err(|e| invalid(parent, e))?;
            if header.parent_hash != parent_hash {
                return Err(invalid(header, "parent hash does not link"));
            }
            validate_committed_header(header, &validators, verifier)
                .map_err(|e| invalid(header, e))?;
            validators = self.validators_after(header)?;
            parent = header;
        }
        debug!(head = parent.number, validators = validators.len(), "Verified canonical chain");
        Ok(validators)
    }
}
