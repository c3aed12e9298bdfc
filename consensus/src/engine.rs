// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus Engine
//!
//! The async shell around [`IbftController`]. A single task owns all
//! consensus state and consumes the mailbox one event at a time.
//!
//! ## Main Flow
//!
//! 1. On start, the canonical chain is read from the block importer and
//!    replayed from genesis to check links and committed seals
//! 2. The controller starts the height after the chain head
//! 3. Peers, timers and the host push [`ConsensusEvent`]s through an
//!    [`EngineHandle`]
//! 4. Each event yields a list of [`Action`]s that the engine executes in
//!    order: broadcasts, timer changes and block imports
//! 5. An accepted import becomes the new chain head once the mailbox has
//!    been drained, and the next height begins

use istanbul_types::{
    Address, BlockHeader, ConsensusConfig, ConsensusMessage, NodeSigner, SignatureVerifier,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend::{BlockImporter, ExecutionBackend, ImportResult};
use crate::broadcaster::ConsensusBroadcaster;
use crate::controller::IbftController;
use crate::error::{ConsensusError, ConsensusResult};
use crate::events::{Action, ConsensusEvent};
use crate::extra_data::VoteType;
use crate::liveness::RoundTimer;

/// Producer side of the engine mailbox.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<ConsensusEvent>,
}

impl EngineHandle {
    /// Enqueue an event, waiting for mailbox capacity.
    pub async fn send(&self, event: ConsensusEvent) -> ConsensusResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ConsensusError::MailboxClosed)
    }

    pub async fn deliver(&self, message: ConsensusMessage) -> ConsensusResult<()> {
        self.send(ConsensusEvent::Message(message)).await
    }

    pub async fn new_chain_head(&self, header: BlockHeader) -> ConsensusResult<()> {
        self.send(ConsensusEvent::NewChainHead(header)).await
    }

    pub async fn propose_vote(&self, subject: Address, vote_type: VoteType) -> ConsensusResult<()> {
        self.send(ConsensusEvent::ProposeVote { subject, vote_type })
            .await
    }

    pub async fn discard_vote(&self, subject: Address) -> ConsensusResult<()> {
        self.send(ConsensusEvent::DiscardVote { subject }).await
    }

    pub async fn shutdown(&self) -> ConsensusResult<()> {
        self.send(ConsensusEvent::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct ConsensusEngine {
    controller: IbftController,
    importer: Arc<dyn BlockImporter>,
    broadcaster: Arc<dyn ConsensusBroadcaster>,
    timer: RoundTimer,
    mailbox: mpsc::Receiver<ConsensusEvent>,
    /// Header of a block we imported, applied once pending events ran.
    pending_head: Option<BlockHeader>,
}

impl ConsensusEngine {
    pub fn new(
        config: ConsensusConfig,
        signer: Arc<dyn NodeSigner>,
        verifier: Arc<dyn SignatureVerifier>,
        execution: Arc<dyn ExecutionBackend>,
        importer: Arc<dyn BlockImporter>,
        broadcaster: Arc<dyn ConsensusBroadcaster>,
    ) -> (Self, EngineHandle) {
        let (tx, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let timer = RoundTimer::new(tx.downgrade());
        let controller = IbftController::new(Arc::new(config), signer, verifier, execution);
        let engine = Self {
            controller,
            importer,
            broadcaster,
            timer,
            mailbox,
            pending_head: None,
        };
        (engine, EngineHandle { tx })
    }

    pub fn local_address(&self) -> Address {
        self.controller.local_address()
    }

    /// Run until `Shutdown` arrives, every handle is dropped, or a fatal
    /// error occurs.
    pub async fn run(mut self) -> ConsensusResult<()> {
        let head = self.importer.chain_head().await;
        self.verify_canonical_chain(&head).await?;
        info!(
            address = %self.local_address(),
            head = head.number,
            "Consensus engine started"
        );

        let actions = self.controller.start(head)?;
        self.execute(actions).await;

        loop {
            let event = match self.pending_head.take() {
                Some(head) => match self.mailbox.try_recv() {
                    Ok(event) => {
                        self.pending_head = Some(head);
                        event
                    }
                    Err(_) => {
                        tokio::task::yield_now().await;
                        ConsensusEvent::NewChainHead(head)
                    }
                },
                None => match self.mailbox.recv().await {
                    Some(event) => event,
                    None => {
                        info!("Engine mailbox closed");
                        break;
                    }
                },
            };

            if matches!(event, ConsensusEvent::Shutdown) {
                info!("Consensus engine shutting down");
                break;
            }

            let actions = self.controller.handle_event(event).map_err(|e| {
                error!(error = %e, "Fatal consensus error");
                e
            })?;
            self.execute(actions).await;
        }

        self.timer.cancel();
        Ok(())
    }

    async fn verify_canonical_chain(&mut self, head: &BlockHeader) -> ConsensusResult<()> {
        let mut headers = Vec::new();
        for number in 0..head.number {
            let header = self.importer.header_by_number(number).await.ok_or_else(|| {
                ConsensusError::InvalidCanonicalHeader {
                    number,
                    reason: "missing from block store".to_string(),
                }
            })?;
            headers.push(header);
        }
        headers.push(head.clone());
        self.controller.verify_chain(&headers)
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast(message) => {
                    if let Err(e) = self.broadcaster.broadcast(message) {
                        warn!(error = %e, "Failed to broadcast consensus message");
                    }
                }
                Action::ScheduleRoundTimeout { round, after } => self.timer.schedule(round, after),
                Action::CancelRoundTimeout => self.timer.cancel(),
                Action::ImportBlock(block) => {
                    let header = block.header.clone();
                    match self.importer.import_block(block).await {
                        ImportResult::Accepted => {
                            debug!(number = header.number, "Committed block accepted");
                            self.pending_head = Some(header);
                        }
                        ImportResult::Rejected(reason) => {
                            error!(number = header.number, %reason, "Committed block rejected by importer");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EmptyBlockBuilder, InMemoryBlockStore};
    use crate::block_creator::genesis_block;
    use crate::broadcaster::NoOpBroadcaster;
    use istanbul_keys::{KeyRegistry, NodeKeyPair};
    use std::time::Duration;

    fn single_validator() -> (ConsensusEngine, EngineHandle, Arc<InMemoryBlockStore>) {
        let key = NodeKeyPair::dev(0);
        let registry: KeyRegistry = std::iter::once(key.public()).collect();
        let genesis = genesis_block(&[key.address()], 0).unwrap();
        let store = Arc::new(InMemoryBlockStore::new(genesis));
        let (engine, handle) = ConsensusEngine::new(
            ConsensusConfig::default(),
            Arc::new(key),
            Arc::new(registry),
            Arc::new(EmptyBlockBuilder),
            store.clone(),
            Arc::new(NoOpBroadcaster),
        );
        (engine, handle, store)
    }

    #[tokio::test]
    async fn test_single_validator_builds_chain() {
        let (engine, handle, store) = single_validator();
        let task = tokio::spawn(engine.run());

        for _ in 0..200 {
            if store.height() >= 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.height() >= 5);

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_observer_stops_when_handles_dropped() {
        let validator = NodeKeyPair::dev(0);
        let registry: KeyRegistry = std::iter::once(validator.public()).collect();
        let genesis = genesis_block(&[validator.address()], 0).unwrap();
        let (engine, handle) = ConsensusEngine::new(
            ConsensusConfig::default(),
            Arc::new(NodeKeyPair::dev(7)),
            Arc::new(registry),
            Arc::new(EmptyBlockBuilder),
            Arc::new(InMemoryBlockStore::new(genesis)),
            Arc::new(NoOpBroadcaster),
        );
        drop(handle);
        let result = tokio::time::timeout(Duration::from_secs(5), engine.run()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    /// Claims a head at `claimed` while holding only genesis.
    struct Headless {
        store: InMemoryBlockStore,
        claimed: u64,
    }

    #[async_trait::async_trait]
    impl BlockImporter for Headless {
        async fn import_block(&self, block: istanbul_types::Block) -> ImportResult {
            self.store.import_block(block).await
        }

        async fn chain_head(&self) -> BlockHeader {
            let mut head = self.store.chain_head().await;
            head.number = self.claimed;
            head
        }

        async fn header_by_number(&self, number: u64) -> Option<BlockHeader> {
            self.store.header_by_number(number).await
        }
    }

    async fn run_on_headless_store(claimed: u64) -> ConsensusResult<()> {
        let key = NodeKeyPair::dev(0);
        let registry: KeyRegistry = std::iter::once(key.public()).collect();
        let genesis = genesis_block(&[key.address()], 0).unwrap();
        let (engine, _handle) = ConsensusEngine::new(
            ConsensusConfig::default(),
            Arc::new(key),
            Arc::new(registry),
            Arc::new(EmptyBlockBuilder),
            Arc::new(Headless {
                store: InMemoryBlockStore::new(genesis),
                claimed,
            }),
            Arc::new(NoOpBroadcaster),
        );
        engine.run().await
    }

    #[tokio::test]
    async fn test_corrupt_store_is_fatal() {
        assert!(matches!(
            run_on_headless_store(3).await,
            Err(ConsensusError::InvalidCanonicalHeader { number: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_absurd_head_number_is_reported_not_panicking() {
        assert!(matches!(
            run_on_headless_store(u64::MAX).await,
            Err(ConsensusError::InvalidCanonicalHeader { number: 1, .. })
        ));
    }
}
