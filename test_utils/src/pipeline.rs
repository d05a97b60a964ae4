use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use stakenode_common::{
    ports::{
        BlockProcessor, Broadcaster, FatalHandler, NodeSyncState, RevertBlockHandler, RoundStore,
        TransactionPool,
    },
    FullBlock, NodeState, ProcessOutcome, Transaction,
};

use crate::chain::InMemoryChain;
use crate::journal::{Event, Journal};

/// Block processor answering from a script keyed by height. Unscripted
/// heights are `Accepted`.
pub struct ScriptedProcessor {
    journal: Journal,
    outcomes: Mutex<HashMap<u64, ProcessOutcome>>,
    generator_outcome: Mutex<ProcessOutcome>,
}

impl ScriptedProcessor {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            outcomes: Mutex::new(HashMap::new()),
            generator_outcome: Mutex::new(ProcessOutcome::Accepted),
        }
    }

    pub fn set_outcome(&self, height: u64, outcome: ProcessOutcome) {
        self.outcomes.lock().unwrap().insert(height, outcome);
    }

    pub fn set_generator_outcome(&self, outcome: ProcessOutcome) {
        *self.generator_outcome.lock().unwrap() = outcome;
    }
}

#[async_trait]
impl BlockProcessor for ScriptedProcessor {
    async fn process(&self, block: &FullBlock) -> ProcessOutcome {
        self.journal.record(Event::Process(block.height()));
        self.outcomes
            .lock()
            .unwrap()
            .get(&block.height())
            .copied()
            .unwrap_or(ProcessOutcome::Accepted)
    }

    async fn validate_generator(&self, block: &FullBlock) -> ProcessOutcome {
        self.journal.record(Event::ValidateGenerator(block.height()));
        *self.generator_outcome.lock().unwrap()
    }
}

pub struct RecordingRevert {
    journal: Journal,
    outcome: Mutex<ProcessOutcome>,
}

impl RecordingRevert {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            outcome: Mutex::new(ProcessOutcome::Reverted),
        }
    }

    pub fn set_outcome(&self, outcome: ProcessOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }
}

#[async_trait]
impl RevertBlockHandler for RecordingRevert {
    async fn execute(&self, block: &FullBlock) -> ProcessOutcome {
        self.journal.record(Event::Revert(block.height()));
        *self.outcome.lock().unwrap()
    }
}

pub struct RecordingRounds {
    journal: Journal,
}

impl RecordingRounds {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl RoundStore for RecordingRounds {
    async fn restore_current_round(&self) -> Result<()> {
        self.journal.record(Event::RestoreRound);
        Ok(())
    }

    async fn delete_round(&self, round: u64) -> Result<()> {
        self.journal.record(Event::DeleteRound(round));
        Ok(())
    }
}

pub struct RecordingSyncState {
    journal: Journal,
    started: AtomicBool,
    state: Mutex<NodeState>,
}

impl RecordingSyncState {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            started: AtomicBool::new(true),
            state: Mutex::new(NodeState::NewBlock),
        }
    }

    pub fn set_started(&self, started: bool) {
        self.started.store(started, Ordering::SeqCst);
    }

    pub fn set_state(&self, state: NodeState) {
        *self.state.lock().unwrap() = state;
    }
}

impl NodeSyncState for RecordingSyncState {
    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn set_last_stored_block_height(&self, height: u64) {
        self.journal.record(Event::LastStored(height));
    }

    fn clear_queue(&self) {
        self.journal.record(Event::ClearQueue);
    }

    fn reset_last_downloaded_block(&self) {
        self.journal.record(Event::ResetLastDownloaded);
    }

    fn get_state(&self) -> NodeState {
        *self.state.lock().unwrap()
    }

    fn fork_block(&self, block: &FullBlock) {
        self.journal.record(Event::Fork(block.height()));
    }
}

pub struct RecordingBroadcaster {
    journal: Journal,
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast_block(&self, block: &FullBlock) {
        self.journal.record(Event::Broadcast(block.height()));
    }
}

pub struct RecordingPool {
    journal: Journal,
}

#[async_trait]
impl TransactionPool for RecordingPool {
    async fn readd_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        self.journal
            .record(Event::Readd(transactions.iter().map(|tx| tx.id).collect()));
        Ok(())
    }
}

/// Records the reason instead of exiting
pub struct RecordingFatal {
    journal: Journal,
}

impl FatalHandler for RecordingFatal {
    fn fatal(&self, reason: &str) {
        self.journal.record(Event::Fatal(reason.to_string()));
    }
}

/// One of every pipeline collaborator, all writing to the same journal
pub struct PipelineFakes {
    pub journal: Journal,
    pub chain: Arc<InMemoryChain>,
    pub processor: Arc<ScriptedProcessor>,
    pub revert: Arc<RecordingRevert>,
    pub rounds: Arc<RecordingRounds>,
    pub sync: Arc<RecordingSyncState>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub pool: Arc<RecordingPool>,
    pub fatal: Arc<RecordingFatal>,
}

impl PipelineFakes {
    /// Fakes over a local chain holding `blocks`
    pub fn new(blocks: Vec<FullBlock>) -> Self {
        let journal = Journal::new();
        Self {
            chain: Arc::new(InMemoryChain::new(blocks).with_journal(journal.clone())),
            processor: Arc::new(ScriptedProcessor::new(journal.clone())),
            revert: Arc::new(RecordingRevert::new(journal.clone())),
            rounds: Arc::new(RecordingRounds::new(journal.clone())),
            sync: Arc::new(RecordingSyncState::new(journal.clone())),
            broadcaster: Arc::new(RecordingBroadcaster {
                journal: journal.clone(),
            }),
            pool: Arc::new(RecordingPool {
                journal: journal.clone(),
            }),
            fatal: Arc::new(RecordingFatal {
                journal: journal.clone(),
            }),
            journal,
        }
    }
}
