use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeatsimError {
    /// Process grid shape does not match the process count, or the
    /// process-group join failed.
    #[error("topology error: {0}")]
    Topology(String),

    /// Point-to-point failure during initial scatter or final gather.
    #[error("transfer error: {0}")]
    Transfer(String),

    /// One of the eight per-step halo operations failed, or the batched
    /// wait failed. Fatal: a partial halo would silently corrupt the
    /// next local update.
    #[error("halo exchange failed at step {step}: {detail}")]
    Exchange { step: usize, detail: String },

    /// A grid buffer could not be sized or allocated.
    #[error("allocation error: {0}")]
    Allocation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HeatsimError>;
