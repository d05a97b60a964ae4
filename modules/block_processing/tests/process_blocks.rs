//! Batch processing against recording collaborators

use stakenode_common::{ChainParams, FullBlock, NodeState, ProcessOutcome, TxId};
use stakenode_module_block_processing::{
    BatchOutcome, BlockProcessingConfig, BlockProcessingPipeline, PipelineError, PipelinePorts,
    PipelineWorker,
};
use stakenode_test_utils::{init_logging, ChainBuilder, Event, Keyring, PipelineFakes};

struct Harness {
    fakes: PipelineFakes,
    incoming: Vec<FullBlock>,
}

impl Harness {
    /// Local chain of 10 blocks and a downloaded batch of 11..=13
    fn new() -> Self {
        init_logging();
        let builder = ChainBuilder::new(ChainParams::default(), Keyring::new(5));
        let local = builder.chain(10);
        let incoming = builder.extend(&local, 13, 0)[10..].to_vec();
        Self {
            fakes: PipelineFakes::new(local),
            incoming,
        }
    }

    fn pipeline(&self, config: BlockProcessingConfig) -> BlockProcessingPipeline {
        let f = &self.fakes;
        let ports = PipelinePorts {
            chain: f.chain.clone(),
            processor: f.processor.clone(),
            repository: f.chain.clone(),
            revert: f.revert.clone(),
            rounds: f.rounds.clone(),
            sync: f.sync.clone(),
            broadcaster: f.broadcaster.clone(),
            pool: f.pool.clone(),
            fatal: f.fatal.clone(),
        };
        BlockProcessingPipeline::new(config, ports, f.chain.height())
    }

    async fn run(&self, blocks: Vec<FullBlock>) -> (BatchOutcome, BlockProcessingPipeline) {
        let mut pipeline = self.pipeline(BlockProcessingConfig::default());
        pipeline.enqueue(blocks).unwrap();
        let outcome = pipeline.handle().await;
        (outcome, pipeline)
    }

    fn count(&self, event: Event) -> usize {
        self.fakes.journal.count(|e| *e == event)
    }

    fn position(&self, event: Event) -> Option<usize> {
        self.fakes.journal.position(|e| *e == event)
    }
}

#[tokio::test]
async fn accepted_batch_is_stored_in_order() {
    let h = Harness::new();
    let (outcome, pipeline) = h.run(h.incoming.clone()).await;

    assert_eq!(outcome, BatchOutcome::Applied { count: 3 });
    assert_eq!(pipeline.last_applied_height(), 13);
    assert_eq!(h.fakes.chain.height(), 13);
    assert_eq!(
        h.fakes.journal.events(),
        vec![
            Event::Process(11),
            Event::Save(11),
            Event::LastStored(11),
            Event::Broadcast(11),
            Event::Process(12),
            Event::Save(12),
            Event::LastStored(12),
            Event::Broadcast(12),
            Event::Process(13),
            Event::Save(13),
            Event::LastStored(13),
            Event::Broadcast(13),
        ]
    );
}

#[tokio::test]
async fn block_equal_to_tip_is_a_no_op() {
    let h = Harness::new();
    let tip = h.fakes.chain.tip().unwrap();
    let mut batch = vec![tip];
    batch.extend(h.incoming.clone());

    let (outcome, pipeline) = h.run(batch).await;

    assert_eq!(outcome, BatchOutcome::AlreadyKnown);
    assert_eq!(pipeline.pending(), 0);
    assert_eq!(pipeline.last_applied_height(), 10);
    assert_eq!(
        h.fakes.journal.events(),
        vec![Event::ClearQueue, Event::ResetLastDownloaded]
    );
}

#[tokio::test]
async fn rejection_stops_the_batch_after_earlier_blocks_are_stored() {
    let h = Harness::new();
    h.fakes.processor.set_outcome(12, ProcessOutcome::Rejected);

    let (outcome, pipeline) = h.run(h.incoming.clone()).await;

    assert_eq!(outcome, BatchOutcome::Rejected);
    assert!(h.position(Event::Save(11)) < h.position(Event::Process(12)));
    assert_eq!(h.count(Event::Process(13)), 0);
    assert_eq!(h.count(Event::Revert(12)), 1);
    assert_eq!(pipeline.last_applied_height(), 11);

    let events = h.fakes.journal.events();
    let revert = h.position(Event::Revert(12)).unwrap();
    assert_eq!(
        events[revert..],
        [
            Event::Revert(12),
            Event::DeleteRound(2),
            Event::RestoreRound,
            Event::ClearQueue,
            Event::ResetLastDownloaded,
        ]
    );
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Readd(_))), 0);
}

#[tokio::test]
async fn storage_failure_reverts_once_and_keeps_height() {
    let h = Harness::new();
    h.fakes.chain.fail_saves(true);

    let (outcome, pipeline) = h.run(h.incoming.clone()).await;

    assert_eq!(outcome, BatchOutcome::StorageFailure);
    assert_eq!(pipeline.last_applied_height(), 10);
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Revert(_))), 1);
    assert_eq!(h.count(Event::Process(12)), 0);
    assert_eq!(h.count(Event::LastStored(11)), 0);

    let returned: Vec<TxId> = h.incoming[0].transactions.iter().map(|tx| tx.id).collect();
    assert_eq!(h.count(Event::Readd(returned)), 1);
    assert_eq!(h.count(Event::ClearQueue), 1);
    assert_eq!(h.count(Event::ResetLastDownloaded), 1);
}

#[tokio::test]
async fn corrupted_revert_is_fatal() {
    let h = Harness::new();
    h.fakes.chain.fail_saves(true);
    h.fakes.revert.set_outcome(ProcessOutcome::Corrupted);

    let (outcome, mut pipeline) = h.run(h.incoming.clone()).await;

    assert_eq!(outcome, BatchOutcome::Halted);
    assert!(pipeline.is_halted());
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Fatal(_))), 1);
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::DeleteRound(_))), 0);
    let fatal = h.fakes.journal.position(|e| matches!(e, Event::Fatal(_)));
    assert_eq!(h.count(Event::ClearQueue), 1);
    assert!(h.position(Event::ClearQueue) < fatal);
    assert_eq!(pipeline.enqueue(h.incoming.clone()), Err(PipelineError::Halted));
    assert_eq!(pipeline.handle().await, BatchOutcome::Halted);
}

#[tokio::test]
async fn corrupted_processing_is_fatal_without_revert() {
    let h = Harness::new();
    h.fakes.processor.set_outcome(11, ProcessOutcome::Corrupted);

    let (outcome, pipeline) = h.run(h.incoming.clone()).await;

    assert_eq!(outcome, BatchOutcome::Halted);
    assert_eq!(pipeline.pending(), 0);
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Revert(_))), 0);
    assert_eq!(h.count(Event::Process(12)), 0);
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Fatal(_))), 1);
    // Queued downloads must not run against a halted node
    let fatal = h.fakes.journal.position(|e| matches!(e, Event::Fatal(_)));
    assert_eq!(h.count(Event::ClearQueue), 1);
    assert!(h.position(Event::ClearQueue) < fatal);
}

#[tokio::test]
async fn rollback_hands_over_to_fork_recovery() {
    let h = Harness::new();
    h.fakes.processor.set_outcome(12, ProcessOutcome::Rollback);

    let (outcome, pipeline) = h.run(h.incoming.clone()).await;

    assert_eq!(outcome, BatchOutcome::ForkDetected);
    assert_eq!(pipeline.last_applied_height(), 11);
    assert_eq!(h.count(Event::Fork(12)), 1);
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Revert(_))), 0);
    assert_eq!(h.count(Event::Process(13)), 0);
}

#[tokio::test]
async fn processor_revert_drops_batch_without_revert_handler() {
    let h = Harness::new();
    h.fakes.processor.set_outcome(11, ProcessOutcome::Reverted);

    let (outcome, _) = h.run(h.incoming.clone()).await;

    assert_eq!(outcome, BatchOutcome::Rejected);
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Revert(_))), 0);
    assert_eq!(h.count(Event::ClearQueue), 1);
    assert_eq!(h.count(Event::ResetLastDownloaded), 1);
}

#[tokio::test]
async fn known_block_is_broadcast_but_not_stored() {
    let h = Harness::new();
    h.fakes.processor.set_outcome(11, ProcessOutcome::DiscardedButCanBeBroadcasted);

    let (outcome, _) = h.run(h.incoming[..1].to_vec()).await;

    assert_eq!(outcome, BatchOutcome::Applied { count: 0 });
    assert_eq!(h.count(Event::Broadcast(11)), 1);
    assert_eq!(h.count(Event::Save(11)), 0);
}

#[tokio::test]
async fn unchained_batch_needs_a_confirmed_generator() {
    let h = Harness::new();
    h.fakes.processor.set_generator_outcome(ProcessOutcome::Rejected);

    let (outcome, _) = h.run(h.incoming[2..].to_vec()).await;

    assert_eq!(outcome, BatchOutcome::Discarded);
    assert_eq!(h.count(Event::ValidateGenerator(13)), 1);
    assert_eq!(h.count(Event::Process(13)), 0);
    assert_eq!(h.count(Event::ResetLastDownloaded), 1);
}

#[tokio::test]
async fn unchained_batch_with_confirmed_generator_is_processed() {
    let h = Harness::new();
    h.fakes.processor.set_outcome(13, ProcessOutcome::Rollback);

    let (outcome, _) = h.run(h.incoming[2..].to_vec()).await;

    assert_eq!(outcome, BatchOutcome::ForkDetected);
    assert!(h.position(Event::ValidateGenerator(13)) < h.position(Event::Process(13)));
}

#[tokio::test]
async fn replayed_blocks_are_not_broadcast() {
    let h = Harness::new();
    h.fakes.sync.set_state(NodeState::DownloadFinished);
    let (outcome, _) = h.run(h.incoming.clone()).await;
    assert_eq!(outcome, BatchOutcome::Applied { count: 3 });
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Broadcast(_))), 0);

    let h = Harness::new();
    h.fakes.sync.set_started(false);
    h.run(h.incoming.clone()).await;
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Broadcast(_))), 0);

    let h = Harness::new();
    let mut pipeline = h.pipeline(BlockProcessingConfig {
        broadcast_fresh_blocks: false,
        ..Default::default()
    });
    pipeline.enqueue(h.incoming.clone()).unwrap();
    pipeline.handle().await;
    assert_eq!(h.fakes.journal.count(|e| matches!(e, Event::Broadcast(_))), 0);
}

#[tokio::test]
async fn second_batch_is_refused_while_first_is_pending() {
    let h = Harness::new();
    let mut pipeline = h.pipeline(BlockProcessingConfig::default());

    assert_eq!(pipeline.handle().await, BatchOutcome::Idle);
    pipeline.enqueue(h.incoming.clone()).unwrap();
    assert_eq!(
        pipeline.enqueue(h.incoming.clone()),
        Err(PipelineError::Busy { pending: 3 })
    );
    pipeline.handle().await;
    assert!(pipeline.enqueue(Vec::new()).is_ok());
}

#[tokio::test]
async fn worker_serialises_submitted_batches() {
    let h = Harness::new();
    let (worker, handle) = PipelineWorker::new(h.pipeline(BlockProcessingConfig::default()), 4);
    let task = tokio::spawn(worker.run());

    let first = handle.submit(h.incoming[..2].to_vec()).await;
    let second = handle.submit(h.incoming[2..].to_vec()).await;
    assert_eq!(first, Ok(BatchOutcome::Applied { count: 2 }));
    assert_eq!(second, Ok(BatchOutcome::Applied { count: 1 }));

    drop(handle);
    let pipeline = task.await.unwrap().unwrap();
    assert_eq!(pipeline.last_applied_height(), 13);
}

#[tokio::test]
async fn halted_worker_refuses_batches() {
    let h = Harness::new();
    h.fakes.processor.set_outcome(11, ProcessOutcome::Corrupted);
    let (worker, handle) = PipelineWorker::new(h.pipeline(BlockProcessingConfig::default()), 4);
    tokio::spawn(worker.run());

    assert_eq!(
        handle.submit(h.incoming.clone()).await,
        Ok(BatchOutcome::Halted)
    );
    assert_eq!(
        handle.submit(h.incoming.clone()).await,
        Err(PipelineError::Halted)
    );
}
