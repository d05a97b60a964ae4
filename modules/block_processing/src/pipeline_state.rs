use std::collections::VecDeque;

use stakenode_common::FullBlock;

/// Blocks waiting to be applied and the height of the last one stored.
/// Owned by exactly one pipeline.
#[derive(Debug, Default)]
pub struct PipelineState {
    pending: VecDeque<FullBlock>,
    last_applied_height: u64,
}

impl PipelineState {
    pub fn new(last_applied_height: u64) -> Self {
        Self {
            pending: VecDeque::new(),
            last_applied_height,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push_batch(&mut self, blocks: Vec<FullBlock>) {
        self.pending.extend(blocks);
    }

    pub fn next_block(&mut self) -> Option<FullBlock> {
        self.pending.pop_front()
    }

    /// Drop every pending block, returning how many there were
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn last_applied_height(&self) -> u64 {
        self.last_applied_height
    }

    /// Only called once a block is durably stored
    pub fn record_stored(&mut self, height: u64) {
        self.last_applied_height = height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakenode_test_utils::{ChainBuilder, Keyring};

    #[test]
    fn blocks_come_out_in_batch_order() {
        let blocks = ChainBuilder::new(Default::default(), Keyring::new(2)).chain(3);
        let mut state = PipelineState::new(0);
        state.push_batch(blocks);
        let heights: Vec<u64> =
            std::iter::from_fn(|| state.next_block()).map(|b| b.height()).collect();
        assert_eq!(heights, vec![1, 2, 3]);
        assert!(state.is_idle());
    }

    #[test]
    fn discarding_keeps_last_applied_height() {
        let blocks = ChainBuilder::new(Default::default(), Keyring::new(2)).chain(4);
        let mut state = PipelineState::new(7);
        state.push_batch(blocks);
        state.next_block();
        assert_eq!(state.discard_pending(), 3);
        assert_eq!(state.pending(), 0);
        assert_eq!(state.last_applied_height(), 7);
    }
}
