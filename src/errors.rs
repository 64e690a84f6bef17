use thiserror::Error;

/// Error kinds surfaced by the indexer pipeline.
///
/// `Config` is fatal at startup; `Db` and `Rpc` are transient and retried by
/// redelivery (the driver event stays unprocessed); `MalformedPayload` is
/// logged and skipped by the replayer; `Invariant` aborts the transaction
/// and leaves the driver event pending for an operator.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("projection invariant violated: {0}")]
    Invariant(String),
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        IndexerError::Rpc(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
