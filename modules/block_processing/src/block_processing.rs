//! Stakenode block processing
//!
//! Downloaded or freshly forged blocks are applied strictly in order by a
//! single writer. A failure anywhere in a batch undoes that block and
//! drops the rest; corruption halts the pipeline for good.

pub mod configuration;
pub mod pipeline;
pub mod pipeline_error;
pub mod pipeline_state;
pub mod worker;

pub use crate::configuration::BlockProcessingConfig;
pub use crate::pipeline::{BatchOutcome, BlockProcessingPipeline, PipelinePorts};
pub use crate::pipeline_error::PipelineError;
pub use crate::pipeline_state::PipelineState;
pub use crate::worker::{PipelineHandle, PipelineWorker};
