//! Round and slot arithmetic
//!
//! A round is `active_delegates` consecutive heights sharing one active
//! delegate set. Round 1 starts at height 1. Slots are fixed windows of
//! `block_time` seconds counted from the network epoch.

use crate::configuration::ChainParams;
use crate::hash::PublicKey;
use crate::types::RoundInfo;

impl ChainParams {
    /// Round containing `height`. Height 0 is treated as height 1.
    pub fn round_info(&self, height: u64) -> RoundInfo {
        let max_delegates = self.active_delegates.max(1);
        let round = height.saturating_sub(1) / max_delegates + 1;
        RoundInfo {
            round,
            round_height: (round - 1) * max_delegates + 1,
            next_round: round + 1,
            max_delegates,
        }
    }

    /// True if `height` is the last block of its round
    pub fn is_new_round(&self, height: u64) -> bool {
        height % self.active_delegates.max(1) == 0
    }

    pub fn slot_number(&self, timestamp: u64) -> u64 {
        timestamp / self.block_time.max(1)
    }

    /// Delegate scheduled to forge the slot containing `timestamp`, given
    /// the ordered active set for that block's round
    pub fn scheduled_delegate<'a>(
        &self,
        active_set: &'a [PublicKey],
        timestamp: u64,
    ) -> Option<&'a PublicKey> {
        if active_set.is_empty() {
            return None;
        }
        let index = self.slot_number(timestamp) % active_set.len() as u64;
        active_set.get(index as usize)
    }
}
