// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Local devnet: several validators in one process.
//!
//! Validators use deterministic development keys, an in-memory block store
//! each and the [`LocalNetwork`] transport. The run stops once every node
//! has imported the requested number of blocks, then checks that all
//! chains agree.

use anyhow::{bail, Context};
use consensus::{
    block_hash, genesis_block, ChannelBroadcaster, ConsensusEngine, ConsensusResult,
    EmptyBlockBuilder, EngineHandle, ExtraData, InMemoryBlockStore,
};
use istanbul_keys::{KeyRegistry, NodeKeyPair};
use istanbul_types::{Address, Block, NodeSigner};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::network::{LocalNetwork, Peer};

/// Outcome of a devnet run.
#[derive(Debug, Clone)]
pub struct DevnetReport {
    pub validators: Vec<Address>,
    /// Height reached by each validator.
    pub heights: Vec<u64>,
    /// The agreed chain, genesis first.
    pub chain: Vec<Block>,
}

impl DevnetReport {
    /// Round in which each non-genesis block was decided.
    pub fn rounds(&self) -> Vec<u32> {
        self.chain
            .iter()
            .skip(1)
            .filter_map(|b| ExtraData::decode_from_header(&b.header).ok())
            .map(|extra| extra.round)
            .collect()
    }
}

struct Node {
    address: Address,
    store: Arc<InMemoryBlockStore>,
    handle: EngineHandle,
    task: JoinHandle<ConsensusResult<()>>,
}

pub async fn run_devnet(config: &NodeConfig) -> anyhow::Result<DevnetReport> {
    config.validate()?;
    let devnet = &config.devnet;

    let keys: Vec<_> = (0..devnet.validators).map(NodeKeyPair::dev).collect();
    let validators: Vec<Address> = keys.iter().map(|k| k.address()).collect();
    let registry: Arc<KeyRegistry> = Arc::new(keys.iter().map(|k| k.public()).collect());
    let genesis = genesis_block(&validators, 0).context("failed to build genesis")?;
    let silent: HashSet<Address> = devnet
        .silent
        .iter()
        .map(|i| validators[*i as usize])
        .collect();

    info!(
        validators = validators.len(),
        silent = silent.len(),
        target = devnet.blocks,
        "Starting devnet"
    );

    let mut nodes = Vec::with_capacity(keys.len());
    let mut outbound = Vec::with_capacity(keys.len());
    for key in keys {
        let address = key.address();
        let store = Arc::new(InMemoryBlockStore::new(genesis.clone()));
        let (broadcaster, rx) = ChannelBroadcaster::new();
        let (engine, handle) = ConsensusEngine::new(
            config.consensus.clone(),
            Arc::new(key),
            registry.clone(),
            Arc::new(EmptyBlockBuilder),
            store.clone(),
            Arc::new(broadcaster),
        );
        outbound.push((address, rx));
        nodes.push(Node {
            address,
            store,
            handle,
            task: tokio::spawn(engine.run()),
        });
    }

    let peers = nodes
        .iter()
        .map(|n| Peer {
            address: n.address,
            handle: n.handle.clone(),
        })
        .collect();
    let network = LocalNetwork::connect(peers, outbound, &silent);

    let target = devnet.blocks;
    let reached = tokio::time::timeout(Duration::from_secs(devnet.timeout_secs), async {
        while !nodes.iter().all(|n| n.store.height() >= target) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok();

    for node in &nodes {
        if node.handle.shutdown().await.is_err() {
            warn!(address = %node.address, "Engine already stopped");
        }
    }
    network.shutdown();

    let mut heights = Vec::with_capacity(nodes.len());
    let mut chains = Vec::with_capacity(nodes.len());
    for node in nodes {
        node.task
            .await
            .context("engine task panicked")?
            .with_context(|| format!("engine {} failed", node.address))?;
        heights.push(node.store.height());
        chains.push(node.store.blocks());
    }

    if !reached {
        bail!(
            "devnet did not reach height {} within {}s (heights: {:?})",
            target,
            devnet.timeout_secs,
            heights
        );
    }

    let chain = check_agreement(&chains)?;
    info!(height = chain.len() - 1, "Devnet finished");
    Ok(DevnetReport {
        validators,
        heights,
        chain,
    })
}

/// Every pair of chains must hold the same blocks at common heights.
/// Returns the longest chain.
fn check_agreement(chains: &[Vec<Block>]) -> anyhow::Result<Vec<Block>> {
    let Some(longest) = chains.iter().max_by_key(|c| c.len()) else {
        bail!("no chains to compare");
    };
    for (index, chain) in chains.iter().enumerate() {
        for (ours, theirs) in chain.iter().zip(longest) {
            if block_hash(&ours.header)? != block_hash(&theirs.header)? {
                bail!(
                    "validator {} diverged at height {}",
                    index,
                    ours.number()
                );
            }
        }
    }
    Ok(longest.clone())
}
