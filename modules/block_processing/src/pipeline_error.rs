use thiserror::Error;

/// Why a batch was not accepted for processing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("previous batch still has {pending} block(s) pending")]
    Busy { pending: usize },

    #[error("block processing halted after unrecoverable state corruption")]
    Halted,

    #[error("block processing worker has stopped")]
    WorkerStopped,
}
