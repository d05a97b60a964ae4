//! Locate the highest block our chain shares with a peer's chain.
//!
//! The common block lies in `[1, min(claimed height, our height)]`. Each
//! round trip sends the peer our ids at up to `n` evenly spaced heights
//! of the current window and narrows the window to the gap above the
//! highest id the peer recognises. Round trips, not comparisons, are
//! the cost here, so an n-ary search beats a binary one.

use std::sync::Arc;
use std::time::Duration;

use stakenode_common::{ports::PeerCommunicator, BlockId, CommonBlock, PeerId};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::chain_view::ChainView;
use crate::deadline::{call_local, call_peer};
use crate::verify_error::PeerVerifyError;

pub struct CommonBlockFinder {
    chain: ChainView,
    communicator: Arc<dyn PeerCommunicator>,
    n_ary: usize,
    request_timeout: Duration,
}

impl CommonBlockFinder {
    pub fn new(
        chain: ChainView,
        communicator: Arc<dyn PeerCommunicator>,
        n_ary: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            communicator,
            n_ary: n_ary.max(2),
            request_timeout,
        }
    }

    /// Highest common block, or `None` if it could not be determined.
    /// Timeouts and bogus replies are logged and reported as `None`.
    pub async fn find(
        &self,
        peer: &PeerId,
        claimed_height: u64,
        our_height: u64,
        deadline: Instant,
    ) -> Option<CommonBlock> {
        match self.try_find(peer, claimed_height, our_height, deadline).await {
            Ok(Some(common)) => {
                debug!("Highest common block with {peer}: {common:?}");
                Some(common)
            }
            Ok(None) => {
                info!("Could not determine a common block with {peer}");
                None
            }
            Err(e) => {
                info!("Could not determine a common block with {peer}: {e}");
                None
            }
        }
    }

    pub async fn try_find(
        &self,
        peer: &PeerId,
        claimed_height: u64,
        our_height: u64,
        deadline: Instant,
    ) -> Result<Option<CommonBlock>, PeerVerifyError> {
        let mut low = 1;
        let mut high = claimed_height.min(our_height);
        let mut confirmed: Option<CommonBlock> = None;

        while low <= high {
            let heights = probe_heights(low, high, self.n_ary);
            let covered = heights.len() as u64 == high - low + 1;

            let Some(found) = self.probe(peer, &heights, deadline).await? else {
                return match confirmed {
                    // The peer recognised this block one round trip ago
                    Some(_) => Err(PeerVerifyError::CommonBlockWithdrawn { height: low }),
                    None => Ok(None),
                };
            };

            if covered || found.height == high {
                return Ok(Some(found));
            }
            let Some(next) = heights.iter().copied().find(|h| *h > found.height) else {
                return Ok(Some(found));
            };

            confirmed = Some(found);
            low = found.height;
            high = next - 1;
            if low == high {
                return Ok(confirmed);
            }
        }

        Ok(confirmed)
    }

    /// Ask the peer which of our blocks at `heights` it has, and check the
    /// answer names one of them at the height we hold it
    async fn probe(
        &self,
        peer: &PeerId,
        heights: &[u64],
        deadline: Instant,
    ) -> Result<Option<CommonBlock>, PeerVerifyError> {
        let ours = call_local(deadline, self.chain.blocks_at(heights)).await?;
        let ids: Vec<BlockId> = ours.iter().map(|b| b.id).collect();

        debug!(
            "Probing {peer} for common blocks in [{}, {}]",
            heights.first().copied().unwrap_or_default(),
            heights.last().copied().unwrap_or_default()
        );

        let reply = call_peer(
            deadline,
            self.request_timeout,
            self.communicator.has_common_blocks(peer, &ids),
        )
        .await?;

        let Some(reply) = reply else {
            return Ok(None);
        };
        let Some(ours) = ours.iter().find(|b| b.id == reply.id) else {
            return Err(PeerVerifyError::UnrequestedCommonBlock { id: reply.id });
        };
        if ours.height != reply.height {
            return Err(PeerVerifyError::CommonBlockHeightMismatch {
                id: reply.id,
                claimed: reply.height,
                ours: ours.height,
            });
        }
        Ok(Some(*ours))
    }
}

/// Up to `n` ascending heights spread over `[low, high]`, always
/// including both ends. Every height when the window is small enough.
pub fn probe_heights(low: u64, high: u64, n: usize) -> Vec<u64> {
    if high < low {
        return Vec::new();
    }
    let span = high - low;
    let n = n.max(2) as u64;
    if span < n {
        return (low..=high).collect();
    }
    (0..n).map(|i| low + span * i / (n - 1)).collect()
}
