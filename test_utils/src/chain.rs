use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use stakenode_common::{
    crypto::{compute_payload_hash, sign_header},
    ports::{BlockRepository, ChainStateReader, DelegateLookup},
    BlockHeader, BlockId, ChainParams, CommonBlock, FullBlock, PublicKey, Signature,
    Transaction, TxId,
};

use crate::journal::{Event, Journal};
use crate::keyring::Keyring;

/// Forges signed chains. The block at height `h` occupies slot
/// `h + slot_offset` and is signed by the key scheduled for that slot,
/// so every block passes the strict delegate check against
/// `FixedDelegates::new(keyring.public_keys())`.
pub struct ChainBuilder {
    params: ChainParams,
    keyring: Keyring,
}

impl ChainBuilder {
    pub fn new(params: ChainParams, keyring: Keyring) -> Self {
        Self { params, keyring }
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Chain of `length` blocks starting at genesis
    pub fn chain(&self, length: u64) -> Vec<FullBlock> {
        self.extend(&[], length, 0)
    }

    /// `base` continued up to `to_height`. Different offsets over the same
    /// base give competing branches.
    pub fn extend(&self, base: &[FullBlock], to_height: u64, slot_offset: u64) -> Vec<FullBlock> {
        let mut blocks = base.to_vec();
        while (blocks.len() as u64) < to_height {
            let height = blocks.len() as u64 + 1;
            let previous = blocks.last().map(FullBlock::id);
            blocks.push(self.forge(height, previous, height + slot_offset));
        }
        blocks
    }

    pub fn forge(&self, height: u64, previous: Option<BlockId>, slot: u64) -> FullBlock {
        let key = self.keyring.key_for_slot(slot);
        let mut tx_id = [0u8; 32];
        tx_id[..8].copy_from_slice(&height.to_be_bytes());
        tx_id[8..16].copy_from_slice(&slot.to_be_bytes());
        let transactions = vec![Transaction {
            id: TxId::new(tx_id),
            sender_public_key: PublicKey::new(key.verifying_key().to_bytes()),
            amount: height * 10,
            fee: 1,
        }];

        let header = BlockHeader {
            height,
            id: BlockId::default(),
            previous_block_id: previous,
            generator_public_key: PublicKey::default(),
            timestamp: slot * self.params.block_time,
            payload_hash: compute_payload_hash(&transactions),
            number_of_transactions: transactions.len() as u32,
            block_signature: Signature::default(),
        };
        FullBlock {
            header: sign_header(header, key),
            transactions,
        }
    }
}

/// Local chain held in memory. Saving appends to it, so the tip moves
/// the way durable storage would move it.
pub struct InMemoryChain {
    blocks: Mutex<Vec<FullBlock>>,
    recent: usize,
    height_lookups: AtomicUsize,
    fail_saves: AtomicBool,
    journal: Journal,
}

impl InMemoryChain {
    pub fn new(blocks: Vec<FullBlock>) -> Self {
        Self {
            blocks: Mutex::new(blocks),
            recent: 5,
            height_lookups: AtomicUsize::new(0),
            fail_saves: AtomicBool::new(false),
            journal: Journal::new(),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Make every following `save_blocks` fail
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Calls to `get_blocks_by_height`
    pub fn height_lookups(&self) -> usize {
        self.height_lookups.load(Ordering::SeqCst)
    }

    pub fn height(&self) -> u64 {
        self.blocks.lock().unwrap().len() as u64
    }

    pub fn tip(&self) -> Option<FullBlock> {
        self.blocks.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChainStateReader for InMemoryChain {
    async fn get_last_height(&self) -> Result<u64> {
        Ok(self.height())
    }

    async fn get_last_block(&self) -> Result<BlockHeader> {
        self.tip().map(|b| b.header).ok_or_else(|| anyhow!("chain is empty"))
    }

    async fn get_last_blocks(&self) -> Result<Vec<BlockHeader>> {
        let blocks = self.blocks.lock().unwrap();
        let skip = blocks.len().saturating_sub(self.recent);
        Ok(blocks.iter().skip(skip).map(|b| b.header.clone()).collect())
    }

    async fn get_blocks_by_height(&self, heights: &[u64]) -> Result<Vec<CommonBlock>> {
        self.height_lookups.fetch_add(1, Ordering::SeqCst);
        let blocks = self.blocks.lock().unwrap();
        Ok(heights
            .iter()
            .filter_map(|h| blocks.iter().find(|b| b.height() == *h))
            .map(|b| b.header.common_block())
            .collect())
    }
}

#[async_trait]
impl BlockRepository for InMemoryChain {
    async fn save_blocks(&self, blocks: &[FullBlock]) -> Result<()> {
        for block in blocks {
            self.journal.record(Event::Save(block.height()));
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("no space left on device");
        }
        self.blocks.lock().unwrap().extend(blocks.iter().cloned());
        Ok(())
    }
}

/// Same active set for every round
pub struct FixedDelegates {
    keys: Vec<PublicKey>,
    delay: Option<Duration>,
    lookups: AtomicUsize,
}

impl FixedDelegates {
    pub fn new(keys: Vec<PublicKey>) -> Self {
        Self {
            keys,
            delay: None,
            lookups: AtomicUsize::new(0),
        }
    }

    /// Answer every lookup only after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DelegateLookup for FixedDelegates {
    async fn get_active_delegates(&self, _height: u64) -> Result<Vec<PublicKey>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.keys.clone())
    }
}
