use thiserror::Error;

/// Failures the ingestion pipeline distinguishes between.
///
/// `ProviderUnavailable` is recovered per player by the fetcher. `MalformedRecord` aborts the
/// engineering stage of the current cycle only.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provider unavailable for player {player_id}: {reason}")]
    ProviderUnavailable { player_id: u32, reason: String },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl PipelineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        PipelineError::MalformedRecord(msg.into())
    }
}
