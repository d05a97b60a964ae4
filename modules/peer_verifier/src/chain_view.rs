//! Read-only lookups over the local chain

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use stakenode_common::{ports::ChainStateReader, CommonBlock};

/// Our chain as the verifier sees it. Never mutates state.
#[derive(Clone)]
pub struct ChainView {
    reader: Arc<dyn ChainStateReader>,
}

impl ChainView {
    pub fn new(reader: Arc<dyn ChainStateReader>) -> Self {
        Self { reader }
    }

    pub async fn last_height(&self) -> Result<u64> {
        self.reader.get_last_height().await
    }

    /// Our block at `height`, if we have one. The recent in-memory blocks
    /// are tried before going to storage.
    pub async fn block_at(&self, height: u64) -> Result<Option<CommonBlock>> {
        let recent = self.reader.get_last_blocks().await?;
        if let Some(header) = recent.iter().find(|h| h.height == height) {
            return Ok(Some(header.common_block()));
        }

        let found = self.reader.get_blocks_by_height(&[height]).await?;
        Ok(found.into_iter().find(|b| b.height == height))
    }

    /// Our blocks at each of `heights`, in the same order. Fails if any
    /// of them is missing.
    pub async fn blocks_at(&self, heights: &[u64]) -> Result<Vec<CommonBlock>> {
        let found: HashMap<u64, CommonBlock> = self
            .reader
            .get_blocks_by_height(heights)
            .await?
            .into_iter()
            .map(|b| (b.height, b))
            .collect();

        let mut blocks = Vec::with_capacity(heights.len());
        for height in heights {
            match found.get(height) {
                Some(block) => blocks.push(*block),
                None => bail!("local chain has no block at height {height}"),
            }
        }
        Ok(blocks)
    }
}
