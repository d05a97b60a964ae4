//! Stakenode chain-integrity types

use crate::hash::{BlockId, PublicKey, Signature, TxId};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::declare_hash_type!(
    /// Blake2b-256 over the ids of a block's transactions, in order.
    PayloadHash,
    32
);

/// Block header
///
/// Immutable once produced: `id` and `block_signature` are derived from
/// the other fields by [`crate::crypto::sign_header`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height, genesis is 1
    pub height: u64,

    /// Content hash of this header
    pub id: BlockId,

    /// Id of the parent block, `None` only for genesis
    pub previous_block_id: Option<BlockId>,

    /// Key of the delegate which forged the block
    pub generator_public_key: PublicKey,

    /// Seconds since the network epoch
    pub timestamp: u64,

    /// Commitment to the transaction list
    pub payload_hash: PayloadHash,

    /// Number of transactions carried by the full block
    pub number_of_transactions: u32,

    /// Generator's signature over `id`
    pub block_signature: Signature,
}

impl BlockHeader {
    /// The `{height, id}` pair identifying this header on its chain
    pub fn common_block(&self) -> CommonBlock {
        CommonBlock {
            height: self.height,
            id: self.id,
        }
    }

    /// True if `self` directly extends `parent`
    pub fn is_chained_to(&self, parent: &BlockHeader) -> bool {
        self.height == parent.height + 1 && self.previous_block_id == Some(parent.id)
    }
}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ height={}, id={} }}", self.height, self.id)
    }
}

/// Transaction carried in a block. Business rules live elsewhere, the
/// core only moves these around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub sender_public_key: PublicKey,
    pub amount: u64,
    pub fee: u64,
}

/// Header plus ordered transactions.
///
/// Owned by whichever stage currently processes it; stages hand it on
/// by value rather than sharing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullBlock {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl FullBlock {
    pub fn id(&self) -> BlockId {
        self.header.id
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }
}

/// Network address of a remote peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

/// Chain state a peer claims to have. Untrusted until verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerClaimedState {
    pub height: u64,
    pub header: BlockHeader,
    pub forging_allowed: bool,
    pub current_slot: u64,
}

/// A block both chains hold at the same height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommonBlock {
    pub height: u64,
    pub id: BlockId,
}

/// Answer to "is this peer's claimed chain a legitimate continuation of ours?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationVerdict {
    /// Our chain and the peer's agree up to the lower of the two tips
    NotForked,

    /// The chains diverge below the comparison height, and the peer's
    /// side of the divergence was authenticated
    Forked,

    /// The evidence could not be authenticated (bad signature, wrong
    /// delegate, timeout, bogus reply). Never treated as either of the above.
    Inconclusive,
}

/// Detailed outcome of a successful peer verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerVerificationResult {
    pub my_height: u64,
    pub his_height: u64,
    pub highest_common_height: u64,
}

impl PeerVerificationResult {
    /// Forked when the highest common block is neither tip
    pub fn forked(&self) -> bool {
        self.highest_common_height != self.my_height
            && self.highest_common_height != self.his_height
    }

    pub fn verdict(&self) -> VerificationVerdict {
        if self.forked() {
            VerificationVerdict::Forked
        } else {
            VerificationVerdict::NotForked
        }
    }
}

/// Result of handing a block to the block processor or revert handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessOutcome {
    /// Applied to in-memory state, ready to persist
    Accepted,

    /// Already forged or known; nothing applied but peers may still want it
    DiscardedButCanBeBroadcasted,

    /// Failed structural or consensus checks
    Rejected,

    /// Belongs to a competing chain segment; fork recovery is needed
    Rollback,

    /// The processor undid its own partial application
    Reverted,

    /// In-memory and durable state may disagree. Terminal.
    Corrupted,
}

/// Node state-machine state as exposed to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    /// A freshly forged block arrived from the network
    NewBlock,

    /// Replaying a batch downloaded during catch-up
    DownloadFinished,
    Syncing,
    Idle,
    Forked,
}

/// Round boundaries for a height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub round: u64,
    /// Height of the first block in the round
    pub round_height: u64,
    pub next_round: u64,
    pub max_delegates: u64,
}

impl RoundInfo {
    /// Height of the last block in the round
    pub fn last_height(&self) -> u64 {
        self.round_height + self.max_delegates - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: u64, id: u8, previous: Option<u8>) -> BlockHeader {
        BlockHeader {
            height,
            id: BlockId::new([id; 32]),
            previous_block_id: previous.map(|p| BlockId::new([p; 32])),
            generator_public_key: PublicKey::default(),
            timestamp: height * 8,
            payload_hash: PayloadHash::default(),
            number_of_transactions: 0,
            block_signature: Signature::default(),
        }
    }

    #[test]
    fn chained_requires_height_and_parent_id() {
        let parent = header(5, 5, Some(4));
        assert!(header(6, 6, Some(5)).is_chained_to(&parent));
        assert!(!header(7, 6, Some(5)).is_chained_to(&parent));
        assert!(!header(6, 6, Some(9)).is_chained_to(&parent));
    }

    #[test]
    fn result_is_forked_only_below_both_tips() {
        let ahead = PeerVerificationResult {
            my_height: 15,
            his_height: 18,
            highest_common_height: 15,
        };
        assert!(!ahead.forked());
        assert_eq!(ahead.verdict(), VerificationVerdict::NotForked);

        let behind = PeerVerificationResult {
            my_height: 15,
            his_height: 12,
            highest_common_height: 12,
        };
        assert!(!behind.forked());

        let diverged = PeerVerificationResult {
            my_height: 15,
            his_height: 18,
            highest_common_height: 14,
        };
        assert_eq!(diverged.verdict(), VerificationVerdict::Forked);
    }
}
