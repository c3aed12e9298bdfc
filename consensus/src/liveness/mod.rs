// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Liveness Module
//!
//! Proposer election and round timeouts. Together they guarantee that a
//! stalled round is abandoned and that the next round is led by a
//! different validator.
//!
//! ## Components
//!
//! - **ProposerElection**: Core trait defining the leader election interface
//! - **RotatingProposer**: Round-robin rotation over `(height + round)`
//! - **RoundTimer**: The single outstanding round timeout
//!
//! ## Usage
//!
//! ```ignore
//! use consensus::liveness::{ProposerElection, RotatingProposer};
//!
//! let election = RotatingProposer::new(validators);
//! let proposer = election.get_valid_proposer(&ConsensusRoundIdentifier::new(1, 0));
//! ```

mod proposer_election;
mod rotating_proposer_election;
mod round_timer;

pub use proposer_election::{select_proposer, ProposerElection};
pub use rotating_proposer_election::RotatingProposer;
pub use round_timer::{round_timeout, RoundTimer};
