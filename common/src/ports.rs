//! Collaborators the integrity core consumes but does not implement.
//!
//! Everything here is injected at construction as a trait object; the
//! networking transport, storage engine, consensus rules and node state
//! machine all live elsewhere.

use crate::hash::{BlockId, PublicKey};
use crate::types::{
    BlockHeader, CommonBlock, FullBlock, NodeState, PeerId, ProcessOutcome, Transaction,
};
use anyhow::Result;
use async_trait::async_trait;
use tracing::error;

/// Requests we can make of a remote peer
#[async_trait]
pub trait PeerCommunicator: Send + Sync {
    /// Up to `limit` of the peer's headers, starting at `from_height` and
    /// ascending. An empty reply means the peer has nothing at that height.
    async fn get_peer_blocks(
        &self,
        peer: &PeerId,
        from_height: u64,
        limit: u64,
    ) -> Result<Vec<BlockHeader>>;

    /// The highest of `ids` the peer holds on its chain, if any
    async fn has_common_blocks(&self, peer: &PeerId, ids: &[BlockId])
        -> Result<Option<CommonBlock>>;
}

/// Read access to the local chain
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    async fn get_last_height(&self) -> Result<u64>;

    /// Current tip
    async fn get_last_block(&self) -> Result<BlockHeader>;

    /// The most recent blocks kept in memory, ascending by height
    async fn get_last_blocks(&self) -> Result<Vec<BlockHeader>>;

    /// `{height, id}` for each requested height we hold
    async fn get_blocks_by_height(&self, heights: &[u64]) -> Result<Vec<CommonBlock>>;
}

/// Who was allowed to forge at a given height
#[async_trait]
pub trait DelegateLookup: Send + Sync {
    /// Ordered active delegate set for the round containing `height`
    async fn get_active_delegates(&self, height: u64) -> Result<Vec<PublicKey>>;
}

/// Structural and consensus validation; applies acceptable blocks to
/// in-memory state
#[async_trait]
pub trait BlockProcessor: Send + Sync {
    async fn process(&self, block: &FullBlock) -> ProcessOutcome;

    async fn validate_generator(&self, block: &FullBlock) -> ProcessOutcome;
}

/// Durable block storage
#[async_trait]
pub trait BlockRepository: Send + Sync {
    async fn save_blocks(&self, blocks: &[FullBlock]) -> Result<()>;
}

/// Undoes the in-memory application of a block
#[async_trait]
pub trait RevertBlockHandler: Send + Sync {
    async fn execute(&self, block: &FullBlock) -> ProcessOutcome;
}

/// Round-level aggregates
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Reload the current round's aggregates from durable state
    async fn restore_current_round(&self) -> Result<()>;

    async fn delete_round(&self, round: u64) -> Result<()>;
}

/// The node's sync state machine, as far as block processing needs it
pub trait NodeSyncState: Send + Sync {
    fn is_started(&self) -> bool;

    fn set_last_stored_block_height(&self, height: u64);

    /// Drop everything the networking layer still has queued for processing
    fn clear_queue(&self);

    /// Point "last downloaded" back at the last applied block
    fn reset_last_downloaded_block(&self);

    fn get_state(&self) -> NodeState;

    /// Hand over to fork recovery, with the block that exposed the fork
    fn fork_block(&self, block: &FullBlock);
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_block(&self, block: &FullBlock);
}

/// Narrow view of the transaction pool
#[async_trait]
pub trait TransactionPool: Send + Sync {
    /// Return transactions of a reverted block to the pool
    async fn readd_transactions(&self, transactions: &[Transaction]) -> Result<()>;
}

/// Called when state can no longer be trusted
pub trait FatalHandler: Send + Sync {
    fn fatal(&self, reason: &str);
}

/// Production fatal handler: log and terminate the process
pub struct ExitProcess;

impl FatalHandler for ExitProcess {
    fn fatal(&self, reason: &str) {
        error!("Fatal: {reason}. Terminating to avoid diverging memory and storage");
        std::process::exit(1);
    }
}
