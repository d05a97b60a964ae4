use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use stakenode_common::{
    ports::PeerCommunicator, BlockHeader, BlockId, CommonBlock, FullBlock, PeerClaimedState,
    PeerId,
};

/// Scriptable remote peer serving a fixed chain
pub struct FakePeer {
    chain: Mutex<Vec<BlockHeader>>,
    delay: Option<Duration>,
    failing: AtomicBool,
    common_reply: Mutex<Option<Option<CommonBlock>>>,
    queued_common_replies: Mutex<VecDeque<Option<CommonBlock>>>,
    get_blocks_calls: AtomicUsize,
    common_blocks_calls: AtomicUsize,
}

impl FakePeer {
    pub fn new(blocks: &[FullBlock]) -> Self {
        Self {
            chain: Mutex::new(blocks.iter().map(|b| b.header.clone()).collect()),
            delay: None,
            failing: AtomicBool::new(false),
            common_reply: Mutex::new(None),
            queued_common_replies: Mutex::new(VecDeque::new()),
            get_blocks_calls: AtomicUsize::new(0),
            common_blocks_calls: AtomicUsize::new(0),
        }
    }

    /// Answer every request only after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every following request
    pub fn fail_requests(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Answer every common-blocks query with `reply`, whatever was asked
    pub fn reply_to_common_blocks(&self, reply: Option<CommonBlock>) {
        *self.common_reply.lock().unwrap() = Some(reply);
    }

    /// Answer the next common-blocks queries with `replies`, one each,
    /// before falling back to the usual answer
    pub fn queue_common_replies(&self, replies: Vec<Option<CommonBlock>>) {
        self.queued_common_replies.lock().unwrap().extend(replies);
    }

    /// Change the header served at `height`
    pub fn tamper(&self, height: u64, change: impl FnOnce(&mut BlockHeader)) {
        let mut chain = self.chain.lock().unwrap();
        if let Some(header) = chain.iter_mut().find(|h| h.height == height) {
            change(header);
        }
    }

    /// What the peer reports about its tip
    pub fn claimed_state(&self) -> PeerClaimedState {
        let chain = self.chain.lock().unwrap();
        let header = chain.last().cloned().expect("peer has no blocks");
        PeerClaimedState {
            height: header.height,
            header,
            forging_allowed: false,
            current_slot: 0,
        }
    }

    pub fn get_blocks_calls(&self) -> usize {
        self.get_blocks_calls.load(Ordering::SeqCst)
    }

    pub fn common_blocks_calls(&self) -> usize {
        self.common_blocks_calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("connection reset by peer");
        }
        Ok(())
    }
}

#[async_trait]
impl PeerCommunicator for FakePeer {
    async fn get_peer_blocks(
        &self,
        _peer: &PeerId,
        from_height: u64,
        limit: u64,
    ) -> Result<Vec<BlockHeader>> {
        self.get_blocks_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        let chain = self.chain.lock().unwrap();
        Ok(chain
            .iter()
            .filter(|h| h.height >= from_height)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn has_common_blocks(
        &self,
        _peer: &PeerId,
        ids: &[BlockId],
    ) -> Result<Option<CommonBlock>> {
        self.common_blocks_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        if let Some(reply) = self.queued_common_replies.lock().unwrap().pop_front() {
            return Ok(reply);
        }
        if let Some(reply) = *self.common_reply.lock().unwrap() {
            return Ok(reply);
        }
        let chain = self.chain.lock().unwrap();
        Ok(chain
            .iter()
            .filter(|h| ids.contains(&h.id))
            .max_by_key(|h| h.height)
            .map(BlockHeader::common_block))
    }
}
