//! Stakenode peer chain verifier
//!
//! Decides whether a chain a peer claims to have is our own chain, a
//! legitimate fork of it, or something we cannot vouch for. Six cases,
//! comparing the peer's claimed height P with our height L:
//!
//! 1. P > L, our tip is on the peer's chain: peer is ahead, not forked.
//! 2. P > L, our tip is not on the peer's chain: forked below our tip.
//! 3. P == L, same tip id: identical chains, nothing to fetch.
//! 4. P == L, different tip id: forked.
//! 5. P < L, peer's tip is in our chain: peer is lagging, nothing to fetch.
//! 6. P < L, peer's tip is not in our chain: forked.
//!
//! Whenever fetching is needed, every peer block above the common block
//! up to P is authenticated before a verdict is given.

mod block_authenticator;
pub mod chain_view;
pub mod common_block_finder;
pub mod configuration;
mod deadline;
pub mod verify_error;

use std::sync::Arc;

use stakenode_common::{
    crypto::verify_header,
    ports::{ChainStateReader, DelegateLookup, PeerCommunicator},
    BlockId, CappedSet, CommonBlock, PeerClaimedState, PeerId, PeerVerificationResult,
    VerificationVerdict,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, info_span, Instrument};

use crate::block_authenticator::BlockAuthenticator;
use crate::deadline::{call_local, call_peer, remaining};

pub use crate::chain_view::ChainView;
pub use crate::common_block_finder::CommonBlockFinder;
pub use crate::configuration::PeerVerifierConfig;
pub use crate::verify_error::PeerVerifyError;

/// Ids of peer blocks that already passed crypto and delegate checks.
/// Shared by every verifier in the process.
pub type VerifiedCache = Arc<Mutex<CappedSet<BlockId>>>;

pub fn verified_cache(config: &PeerVerifierConfig) -> VerifiedCache {
    Arc::new(Mutex::new(CappedSet::new(config.verified_cache_size)))
}

/// Verifies claimed chain states of one peer
pub struct PeerChainVerifier {
    peer: PeerId,
    config: PeerVerifierConfig,
    chain: ChainView,
    communicator: Arc<dyn PeerCommunicator>,
    delegates: Arc<dyn DelegateLookup>,
    finder: CommonBlockFinder,
    verified: VerifiedCache,
}

impl PeerChainVerifier {
    pub fn new(
        peer: PeerId,
        config: PeerVerifierConfig,
        chain: Arc<dyn ChainStateReader>,
        communicator: Arc<dyn PeerCommunicator>,
        delegates: Arc<dyn DelegateLookup>,
        verified: VerifiedCache,
    ) -> Self {
        let chain = ChainView::new(chain);
        let finder = CommonBlockFinder::new(
            chain.clone(),
            communicator.clone(),
            config.n_ary,
            config.common_blocks_timeout(),
        );
        Self {
            peer,
            config,
            chain,
            communicator,
            delegates,
            finder,
            verified,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Verdict on the peer's claimed state. Anything that could not be
    /// verified before `deadline` is `Inconclusive`.
    pub async fn check_state(
        &self,
        claimed: &PeerClaimedState,
        deadline: Instant,
    ) -> VerificationVerdict {
        match self.verify(claimed, deadline).await {
            Some(result) => result.verdict(),
            None => VerificationVerdict::Inconclusive,
        }
    }

    /// Heights behind the verdict, or `None` if the claim could not be
    /// verified
    pub async fn verify(
        &self,
        claimed: &PeerClaimedState,
        deadline: Instant,
    ) -> Option<PeerVerificationResult> {
        let span = info_span!(
            "peer_verify",
            peer = %self.peer,
            claimed_height = claimed.height
        );
        async {
            match self.try_verify(claimed, deadline).await {
                Ok(result) => {
                    debug!(
                        "Verified: our height {}, his height {}, highest common height {}{}",
                        result.my_height,
                        result.his_height,
                        result.highest_common_height,
                        if result.forked() { ", forked" } else { "" }
                    );
                    Some(result)
                }
                Err(e) => {
                    info!("Peer verification failed: {e}");
                    None
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_verify(
        &self,
        claimed: &PeerClaimedState,
        deadline: Instant,
    ) -> Result<PeerVerificationResult, PeerVerifyError> {
        if claimed.height != claimed.header.height {
            return Err(PeerVerifyError::MalformedClaim {
                claimed: claimed.height,
                header: claimed.header.height,
            });
        }

        let my_height = call_local(deadline, self.chain.last_height()).await?;
        let his_height = claimed.height;

        if self.we_have_peers_highest_block(claimed, my_height, deadline).await? {
            remaining(deadline)?;
            return Ok(PeerVerificationResult {
                my_height,
                his_height,
                highest_common_height: his_height,
            });
        }

        // Never fork on the strength of a tip we cannot authenticate
        verify_header(&claimed.header).map_err(|source| PeerVerifyError::Crypto {
            height: his_height,
            source,
        })?;

        let Some(common) = self.finder.find(&self.peer, his_height, my_height, deadline).await
        else {
            return Err(PeerVerifyError::NoCommonBlock);
        };

        self.verify_peer_blocks(common, claimed, deadline).await?;
        // A verdict reached after the deadline is not a verdict
        remaining(deadline)?;

        Ok(PeerVerificationResult {
            my_height,
            his_height,
            highest_common_height: common.height,
        })
    }

    /// True if the peer's claimed tip is a block of our chain
    async fn we_have_peers_highest_block(
        &self,
        claimed: &PeerClaimedState,
        my_height: u64,
        deadline: Instant,
    ) -> Result<bool, PeerVerifyError> {
        let his_height = claimed.height;
        if his_height > my_height {
            debug!(
                "Peer's claimed chain is {} block(s) higher than ours",
                his_height - my_height
            );
            return Ok(false);
        }

        let ours = call_local(deadline, self.chain.block_at(his_height))
            .await?
            .ok_or(PeerVerifyError::MissingLocalBlock { height: his_height })?;

        if ours.id == claimed.header.id {
            if his_height == my_height {
                debug!("Peer's latest block is our latest block, identical chains");
            } else {
                debug!(
                    "Peer's latest block is part of our chain, peer is {} block(s) behind",
                    my_height - his_height
                );
            }
            return Ok(true);
        }

        info!(
            "Peer's latest block {} differs from ours {} at height {his_height}, peer has {} different chain",
            claimed.header.id,
            ours.id,
            if his_height < my_height { "a shorter and" } else { "an equal-height but" }
        );
        Ok(false)
    }

    /// Fetch and authenticate the peer's blocks in `(common.height, P]`,
    /// checking they link up and end at the claimed tip
    async fn verify_peer_blocks(
        &self,
        common: CommonBlock,
        claimed: &PeerClaimedState,
        deadline: Instant,
    ) -> Result<(), PeerVerifyError> {
        let mut authenticator = BlockAuthenticator::new(
            self.config.chain,
            self.config.strict_slot_schedule,
            self.delegates.clone(),
            self.verified.clone(),
            deadline,
        );

        let end = claimed.height;
        let page_size = self.config.page_size.max(1);
        let mut next = common.height + 1;
        let mut parent = common.id;

        while next <= end {
            let limit = (end - next + 1).min(page_size);
            let page = call_peer(
                deadline,
                self.config.get_blocks_timeout(),
                self.communicator.get_peer_blocks(&self.peer, next, limit),
            )
            .await?;

            if page.is_empty() {
                return Err(PeerVerifyError::EmptyReply { height: next });
            }
            debug!("Fetched {} block(s) from height {next}", page.len());

            for header in page.iter().take(limit as usize) {
                if header.height != next {
                    return Err(PeerVerifyError::UnexpectedHeight {
                        expected: next,
                        got: header.height,
                    });
                }
                if header.previous_block_id != Some(parent) {
                    return Err(PeerVerifyError::Discontinuity { height: next });
                }
                authenticator.authenticate(header).await?;
                parent = header.id;
                next += 1;
            }
        }

        if parent != claimed.header.id {
            return Err(PeerVerifyError::ClaimedTipMismatch {
                height: end,
                fetched: parent,
                claimed: claimed.header.id,
            });
        }
        Ok(())
    }
}
