// crates/plume-core/src/error.rs

use thiserror::Error;

/// Raised while shaping one transform job. A structurally unusable payload
/// is reported back to the caller instead of taking down the shared worker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("flow payload carried no position samples")]
    EmptyPositionIndex,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transform worker mailbox is closed")]
    WorkerGone,

    #[error("transform job failed: {0}")]
    JobFailed(String),

    #[error("pending call evicted after exceeding its deadline")]
    Evicted,

    #[error("response stream closed before the terminal chunk")]
    ChannelClosed,
}

/// Storage gateway errors, kept free of any concrete backend so the core
/// only ever sees the contract.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
