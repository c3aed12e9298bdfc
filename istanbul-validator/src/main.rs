// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Istanbul Validator - Main entry point
//!
//! # Example
//!
//! ```bash
//! # Four validators, ten blocks
//! istanbul-validator devnet
//!
//! # Exercise round changes by silencing validator 1
//! istanbul-validator devnet --validators 4 --blocks 5 --silent 1
//!
//! # Create a keystore
//! istanbul-validator keygen --output validator.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use istanbul_keys::{load_keypair, save_keypair, NodeKeyPair};
use istanbul_types::NodeSigner;
use istanbul_validator::{run_devnet, NodeConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Istanbul BFT validator node
#[derive(Parser, Debug)]
#[command(name = "istanbul-validator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run several validators in this process
    Devnet {
        /// Number of validators
        #[arg(short = 'v', long)]
        validators: Option<u32>,

        /// Number of blocks to produce
        #[arg(short = 'b', long)]
        blocks: Option<u64>,

        /// Validators whose outbound messages are discarded
        #[arg(long, value_delimiter = ',')]
        silent: Vec<u32>,

        /// Base round timeout in milliseconds
        #[arg(long)]
        round_timeout_ms: Option<u64>,
    },

    /// Generate a validator keystore
    Keygen {
        /// Keystore file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Derive the deterministic development key with this index
        #[arg(long)]
        dev_index: Option<u32>,
    },

    /// Print the address stored in a keystore
    Inspect {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Devnet {
            validators,
            blocks,
            silent,
            round_timeout_ms,
        } => {
            let mut config = NodeConfig::load(cli.config.as_deref())
                .context("failed to load configuration")?;
            if let Some(validators) = validators {
                config.devnet.validators = validators;
            }
            if let Some(blocks) = blocks {
                config.devnet.blocks = blocks;
            }
            if !silent.is_empty() {
                config.devnet.silent = silent;
            }
            if let Some(ms) = round_timeout_ms {
                config.consensus.round_timeout_base_ms = ms;
            }

            let report = run_devnet(&config).await?;
            let rounds = report.rounds();
            info!(
                validators = report.validators.len(),
                heights = ?report.heights,
                round_changes = rounds.iter().filter(|r| **r > 0).count(),
                "Devnet complete"
            );
            for (block, round) in report.chain.iter().skip(1).zip(rounds) {
                println!(
                    "#{:<6} round {:<3} digest {}",
                    block.number(),
                    round,
                    consensus::block_hash(&block.header)?
                );
            }
        }

        Command::Keygen { output, dev_index } => {
            let keypair = match dev_index {
                Some(index) => NodeKeyPair::dev(index),
                None => NodeKeyPair::generate(),
            };
            save_keypair(&output, &keypair)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(address = %keypair.address(), path = %output.display(), "Keystore written");
            println!("{}", keypair.address());
        }

        Command::Inspect { path } => {
            let keypair = load_keypair(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            println!("address:    {}", keypair.address());
            println!("public key: {}", hex::encode(keypair.public().as_bytes()));
        }
    }

    Ok(())
}
