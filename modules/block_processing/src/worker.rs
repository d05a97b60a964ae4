//! Single consumer task owning the pipeline

use anyhow::Result;
use stakenode_common::FullBlock;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::pipeline::{BatchOutcome, BlockProcessingPipeline};
use crate::pipeline_error::PipelineError;

struct Batch {
    blocks: Vec<FullBlock>,
    reply: Option<oneshot::Sender<Result<BatchOutcome, PipelineError>>>,
}

/// Cheap to clone; every clone feeds the same worker
#[derive(Clone)]
pub struct PipelineHandle {
    batches: mpsc::Sender<Batch>,
}

impl PipelineHandle {
    /// Queue a batch and wait for it to be processed
    pub async fn submit(&self, blocks: Vec<FullBlock>) -> Result<BatchOutcome, PipelineError> {
        let (reply, outcome) = oneshot::channel();
        self.batches
            .send(Batch {
                blocks,
                reply: Some(reply),
            })
            .await
            .map_err(|_| PipelineError::WorkerStopped)?;
        outcome.await.map_err(|_| PipelineError::WorkerStopped)?
    }

    /// Queue a batch without waiting for the outcome
    pub async fn push(&self, blocks: Vec<FullBlock>) -> Result<(), PipelineError> {
        self.batches
            .send(Batch {
                blocks,
                reply: None,
            })
            .await
            .map_err(|_| PipelineError::WorkerStopped)
    }
}

pub struct PipelineWorker {
    pipeline: BlockProcessingPipeline,
    batches: mpsc::Receiver<Batch>,
}

impl PipelineWorker {
    pub fn new(pipeline: BlockProcessingPipeline, queue_capacity: usize) -> (Self, PipelineHandle) {
        let (sender, batches) = mpsc::channel(queue_capacity.max(1));
        (
            Self { pipeline, batches },
            PipelineHandle { batches: sender },
        )
    }

    /// Process batches until every handle is dropped
    pub async fn run(mut self) -> Result<BlockProcessingPipeline> {
        while let Some(batch) = self.batches.recv().await {
            let outcome = self.on_batch(batch.blocks).await;
            if let Err(e) = &outcome {
                warn!("Batch refused: {e}");
            }
            if let Some(reply) = batch.reply {
                let _ = reply.send(outcome);
            }
        }

        info!("All pipeline handles dropped, worker stopping");
        Ok(self.pipeline)
    }

    async fn on_batch(&mut self, blocks: Vec<FullBlock>) -> Result<BatchOutcome, PipelineError> {
        self.pipeline.enqueue(blocks)?;
        Ok(self.pipeline.handle().await)
    }
}
