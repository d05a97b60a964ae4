//! Applies downloaded blocks to local state one at a time.
//!
//! The first block that is not accepted ends the batch: nothing after it
//! is evaluated, and local state is left as it was before that block.

use std::sync::Arc;

use stakenode_common::{
    ports::{
        BlockProcessor, BlockRepository, Broadcaster, ChainStateReader, FatalHandler,
        NodeSyncState, RevertBlockHandler, RoundStore, TransactionPool,
    },
    FullBlock, NodeState, ProcessOutcome,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::configuration::BlockProcessingConfig;
use crate::pipeline_error::PipelineError;
use crate::pipeline_state::PipelineState;

/// Collaborators the pipeline drives
#[derive(Clone)]
pub struct PipelinePorts {
    pub chain: Arc<dyn ChainStateReader>,
    pub processor: Arc<dyn BlockProcessor>,
    pub repository: Arc<dyn BlockRepository>,
    pub revert: Arc<dyn RevertBlockHandler>,
    pub rounds: Arc<dyn RoundStore>,
    pub sync: Arc<dyn NodeSyncState>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub pool: Arc<dyn TransactionPool>,
    pub fatal: Arc<dyn FatalHandler>,
}

/// How a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing was pending
    Idle,

    /// Every block was handled; `count` of them were stored
    Applied { count: usize },

    /// A block equal to our tip was met; the rest was dropped
    AlreadyKnown,

    /// Dropped without touching state
    Discarded,

    /// A block failed validation and its application was undone
    Rejected,

    /// A competing chain was detected and handed to fork recovery
    ForkDetected,

    /// Storing a block failed and its application was undone
    StorageFailure,

    /// State may be inconsistent; the pipeline accepts no more work
    Halted,
}

/// Why a revert was needed, which decides what is handed back to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RevertCause {
    Rejected,
    StorageFailure,
}

pub struct BlockProcessingPipeline {
    config: BlockProcessingConfig,
    ports: PipelinePorts,
    state: PipelineState,
    halted: bool,
}

impl BlockProcessingPipeline {
    pub fn new(
        config: BlockProcessingConfig,
        ports: PipelinePorts,
        last_applied_height: u64,
    ) -> Self {
        Self {
            config,
            ports,
            state: PipelineState::new(last_applied_height),
            halted: false,
        }
    }

    pub fn last_applied_height(&self) -> u64 {
        self.state.last_applied_height()
    }

    pub fn pending(&self) -> usize {
        self.state.pending()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Queue a batch. Refused while a previous batch is unfinished.
    pub fn enqueue(&mut self, blocks: Vec<FullBlock>) -> Result<(), PipelineError> {
        if self.halted {
            return Err(PipelineError::Halted);
        }
        if !self.state.is_idle() {
            return Err(PipelineError::Busy {
                pending: self.state.pending(),
            });
        }
        self.state.push_batch(blocks);
        Ok(())
    }

    /// Process everything pending
    pub async fn handle(&mut self) -> BatchOutcome {
        if self.halted {
            return BatchOutcome::Halted;
        }
        if self.state.is_idle() {
            return BatchOutcome::Idle;
        }

        let span = info_span!("process_blocks", blocks = self.state.pending());
        self.process_pending().instrument(span).await
    }

    async fn process_pending(&mut self) -> BatchOutcome {
        let mut stored = 0;
        let mut first = true;

        while let Some(block) = self.state.next_block() {
            let tip = match self.ports.chain.get_last_block().await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!("Cannot read chain tip, discarding batch: {e:#}");
                    self.abort_batch();
                    return BatchOutcome::Discarded;
                }
            };

            if block.id() == tip.id {
                info!(
                    "Block {} at height {} is our tip already, discarding the rest",
                    block.id(),
                    block.height()
                );
                self.abort_batch();
                return BatchOutcome::AlreadyKnown;
            }

            if first && !block.header.is_chained_to(&tip) {
                let outcome = self.ports.processor.validate_generator(&block).await;
                if outcome != ProcessOutcome::Accepted {
                    info!(
                        "Block at height {} does not extend our tip at {} and its generator \
                         is not confirmed ({outcome:?}), discarding batch",
                        block.height(),
                        tip.height
                    );
                    self.abort_batch();
                    return BatchOutcome::Discarded;
                }
            }
            first = false;

            match self.ports.processor.process(&block).await {
                ProcessOutcome::Accepted => {
                    let saved = self.ports.repository.save_blocks(std::slice::from_ref(&block)).await;
                    if let Err(e) = saved {
                        error!(
                            "Failed to store block at height {}: {e:#}. Reverting",
                            block.height()
                        );
                        return self.revert(&block, RevertCause::StorageFailure).await;
                    }
                    self.state.record_stored(block.height());
                    self.ports.sync.set_last_stored_block_height(block.height());
                    stored += 1;
                    debug!("Stored block {}", block.header);
                    self.broadcast_if_fresh(&block).await;
                }
                ProcessOutcome::DiscardedButCanBeBroadcasted => {
                    debug!("Block {} already known, not stored", block.header);
                    self.broadcast_if_fresh(&block).await;
                }
                ProcessOutcome::Rejected => {
                    warn!("Block {} rejected", block.header);
                    return self.revert(&block, RevertCause::Rejected).await;
                }
                ProcessOutcome::Reverted => {
                    warn!("Block {} was reverted by the processor", block.header);
                    self.abort_batch();
                    return BatchOutcome::Rejected;
                }
                ProcessOutcome::Rollback => {
                    info!("Block {} is on a competing chain, starting fork recovery", block.header);
                    self.state.discard_pending();
                    self.ports.sync.clear_queue();
                    self.ports.sync.fork_block(&block);
                    return BatchOutcome::ForkDetected;
                }
                ProcessOutcome::Corrupted => {
                    return self.halt(&format!("processing block {} corrupted state", block.header));
                }
            }
        }

        info!("Batch done, stored {stored} block(s)");
        BatchOutcome::Applied { count: stored }
    }

    /// Undo the in-memory application of `block`, repair round data and
    /// drop the rest of the batch
    async fn revert(&mut self, block: &FullBlock, cause: RevertCause) -> BatchOutcome {
        if self.ports.revert.execute(block).await == ProcessOutcome::Corrupted {
            return self.halt(&format!("reverting block {} corrupted state", block.header));
        }

        let round = self.config.chain.round_info(block.height().saturating_sub(1));
        if let Err(e) = self.ports.rounds.delete_round(round.next_round).await {
            return self.halt(&format!("deleting round {} failed: {e:#}", round.next_round));
        }
        if let Err(e) = self.ports.rounds.restore_current_round().await {
            return self.halt(&format!("restoring current round failed: {e:#}"));
        }

        if cause == RevertCause::StorageFailure {
            if let Err(e) = self.ports.pool.readd_transactions(&block.transactions).await {
                warn!("Could not return transactions of block {} to the pool: {e:#}", block.header);
            }
        }

        self.abort_batch();
        info!(
            "Reverted block {}, last stored height {}",
            block.header,
            self.state.last_applied_height()
        );
        match cause {
            RevertCause::Rejected => BatchOutcome::Rejected,
            RevertCause::StorageFailure => BatchOutcome::StorageFailure,
        }
    }

    async fn broadcast_if_fresh(&self, block: &FullBlock) {
        if self.config.broadcast_fresh_blocks
            && self.ports.sync.is_started()
            && self.ports.sync.get_state() == NodeState::NewBlock
        {
            self.ports.broadcaster.broadcast_block(block).await;
        }
    }

    /// Drop the rest of the batch and point downloading back at our tip
    fn abort_batch(&mut self) {
        let dropped = self.state.discard_pending();
        if dropped > 0 {
            debug!("Discarded {dropped} pending block(s)");
        }
        self.ports.sync.clear_queue();
        self.ports.sync.reset_last_downloaded_block();
    }

    fn halt(&mut self, reason: &str) -> BatchOutcome {
        error!("{reason}");
        self.state.discard_pending();
        self.halted = true;
        self.ports.sync.clear_queue();
        self.ports.fatal.fatal(reason);
        BatchOutcome::Halted
    }
}
