//! Reasons a peer's claimed state could not be verified.
//!
//! Every variant ends the verification as Inconclusive; the variants only
//! exist so the log says why.

use stakenode_common::{crypto::BlockVerificationError, BlockId, PublicKey};

#[derive(Debug, thiserror::Error)]
pub enum PeerVerifyError {
    #[error("timeout elapsed before successful completion of the verification")]
    DeadlineElapsed,

    #[error("peer did not answer within {0:?}")]
    PeerTimeout(std::time::Duration),

    #[error("request to peer failed: {0:#}")]
    PeerRequest(anyhow::Error),

    #[error("reading our own chain failed: {0:#}")]
    LocalChain(anyhow::Error),

    #[error("our chain has no block at height {height}")]
    MissingLocalBlock { height: u64 },

    #[error("claimed height {claimed} differs from claimed header height {header}")]
    MalformedClaim { claimed: u64, header: u64 },

    #[error("bogus reply for common blocks: peer replied with block id {id} which we did not ask for")]
    UnrequestedCommonBlock { id: BlockId },

    #[error(
        "bogus reply for common blocks: peer pretends to have block {id} at height {claimed}, \
         we have it at height {ours}"
    )]
    CommonBlockHeightMismatch { id: BlockId, claimed: u64, ours: u64 },

    #[error("peer no longer recognises common block at height {height}")]
    CommonBlockWithdrawn { height: u64 },

    #[error("could not determine a common block")]
    NoCommonBlock,

    #[error("peer returned no blocks starting at height {height}")]
    EmptyReply { height: u64 },

    #[error("asked for block at height {expected}, but got height {got}")]
    UnexpectedHeight { expected: u64, got: u64 },

    #[error("block at height {height} does not link to the previous block")]
    Discontinuity { height: u64 },

    #[error("block at height {height} does not pass crypto-validation: {source}")]
    Crypto {
        height: u64,
        source: BlockVerificationError,
    },

    #[error("no active delegates known for height {height}")]
    NoActiveDelegates { height: u64 },

    #[error("block at height {height} forged by {generator}, slot belongs to {scheduled}")]
    WrongSlotDelegate {
        height: u64,
        generator: PublicKey,
        scheduled: PublicKey,
    },

    #[error("block at height {height} forged by {generator}, not an active delegate")]
    NotActiveDelegate { height: u64, generator: PublicKey },

    #[error("block at claimed height {height} is {fetched}, peer claimed {claimed}")]
    ClaimedTipMismatch {
        height: u64,
        fetched: BlockId,
        claimed: BlockId,
    },
}
