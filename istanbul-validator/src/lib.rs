// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Istanbul Validator
//!
//! Node-side wiring around the consensus engine:
//! - [`config`]: TOML and environment configuration
//! - [`network`]: in-process transport between engines
//! - [`devnet`]: run a set of validators in one process

pub mod config;
pub mod devnet;
pub mod network;

pub use config::{ConfigError, DevnetConfig, NodeConfig};
pub use devnet::{run_devnet, DevnetReport};
pub use network::{LocalNetwork, Peer};
